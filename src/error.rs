use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while normalizing a dataset.
///
/// Only [`NormalizeError::Configuration`] is run-fatal. Source and ledger
/// failures are scoped to one dataset, and every per-record failure is folded
/// into an empty ledger entry by the dispatcher.
#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Source for dataset '{dataset}' not found at {}", path.display())]
    SourceUnavailable { dataset: String, path: PathBuf },

    #[error("Source error: {0}")]
    Source(String),

    #[error("Ledger error at {}: {message}", path.display())]
    Ledger { path: PathBuf, message: String },

    #[error("Throttled by external service: {0}")]
    Throttled(String),

    #[error("Maximum number of retries ({retries}) exceeded: {source}")]
    RetriesExhausted {
        retries: u32,
        #[source]
        source: Box<NormalizeError>,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("External service error: {0}")]
    External(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl NormalizeError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn ledger(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Ledger {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether this error must abort the whole run rather than one record or dataset.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    pub fn is_throttled(&self) -> bool {
        matches!(self, Self::Throttled(_))
    }

    /// Process exit code used when this error terminates the binary.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 2,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, NormalizeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_configuration_is_fatal() {
        assert!(NormalizeError::config("missing key").is_fatal());
        assert!(!NormalizeError::Throttled("429".into()).is_fatal());
        assert!(!NormalizeError::External("boom".into()).is_fatal());
        assert!(!NormalizeError::SourceUnavailable {
            dataset: "vulgate".into(),
            path: PathBuf::from("data/vulgate.csv"),
        }
        .is_fatal());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(NormalizeError::config("x").exit_code(), 2);
        assert_eq!(NormalizeError::Parse("x".into()).exit_code(), 1);
    }

    #[test]
    fn test_retries_exhausted_carries_cause() {
        let err = NormalizeError::RetriesExhausted {
            retries: 5,
            source: Box::new(NormalizeError::Throttled("RESOURCE_EXHAUSTED".into())),
        };
        let msg = err.to_string();
        assert!(msg.contains("(5)"));
        assert!(msg.contains("RESOURCE_EXHAUSTED"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
