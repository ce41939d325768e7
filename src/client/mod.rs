//! Decomposition client
//!
//! Renders the prompt for a verse, calls the external service through the
//! retry policy, and parses the reply into propositions. Output that cannot be
//! parsed is not an error here: it becomes an empty proposition list, which
//! the ledger records as an unresolved verse.

pub mod gemini;
pub mod prompt;
pub mod response;

pub use gemini::{GeminiService, ServiceConfig, API_KEY_ENV};
pub use prompt::{PromptTemplate, VERSE_PLACEHOLDER};
pub use response::{parse_propositions, strip_fences};

use crate::error::{NormalizeError, Result};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// The external text-decomposition service
///
/// Implementations return the raw textual reply, or `None` when the service
/// answered without any text. Rate limiting must be reported as
/// [`NormalizeError::Throttled`] and rejected credentials as
/// [`NormalizeError::Configuration`].
#[async_trait]
pub trait DecompositionService: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<Option<String>>;
}

/// Turns verse text into propositions
pub struct DecompositionClient {
    service: Arc<dyn DecompositionService>,
    template: PromptTemplate,
    retry: RetryPolicy,
}

impl DecompositionClient {
    pub fn new(
        service: Arc<dyn DecompositionService>,
        template: PromptTemplate,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            service,
            template,
            retry,
        }
    }

    /// Decompose one verse
    ///
    /// Returns an empty list for absent or unparseable replies. Errors are
    /// limited to what the service raised and the retry policy did not
    /// resolve: `RetriesExhausted`, unclassified failures, and run-fatal
    /// `Configuration` errors.
    pub async fn decompose(&self, verse_text: &str) -> Result<Vec<String>> {
        let prompt = self.template.render(verse_text);

        let reply = self
            .retry
            .run(NormalizeError::is_throttled, || self.service.generate(&prompt))
            .await?;

        let Some(raw) = reply else {
            warn!("Empty response from decomposition service");
            return Ok(Vec::new());
        };

        match parse_propositions(&raw) {
            Ok(propositions) => {
                debug!("Parsed {} propositions", propositions.len());
                Ok(propositions)
            }
            Err(e) => {
                warn!(error = %e, "Discarding unparseable response: {:?}", raw);
                Ok(Vec::new())
            }
        }
    }
}
