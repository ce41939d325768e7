//! Prompt template with a single verse placeholder

use crate::error::{NormalizeError, Result};
use std::path::Path;

/// Placeholder substituted with the verse text
pub const VERSE_PLACEHOLDER: &str = "{verse_text}";

/// A prompt template loaded once per run and reused for every record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    /// Build a template, requiring exactly one placeholder
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        match template.matches(VERSE_PLACEHOLDER).count() {
            1 => Ok(Self { template }),
            0 => Err(NormalizeError::config(format!(
                "prompt template has no {} placeholder",
                VERSE_PLACEHOLDER
            ))),
            n => Err(NormalizeError::config(format!(
                "prompt template has {} {} placeholders, expected exactly one",
                n, VERSE_PLACEHOLDER
            ))),
        }
    }

    /// Load a template from disk. A missing file is run-fatal.
    pub fn load(path: &Path) -> Result<Self> {
        let template = std::fs::read_to_string(path).map_err(|e| {
            NormalizeError::config(format!(
                "failed to read prompt template {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::new(template)
    }

    pub fn render(&self, verse_text: &str) -> String {
        self.template.replacen(VERSE_PLACEHOLDER, verse_text, 1)
    }
}
