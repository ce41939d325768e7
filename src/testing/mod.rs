//! Testing utilities and fixtures
//!
//! Provides a scripted [`DecompositionService`] and helpers for building
//! source tables and prompt files in temporary directories.

use crate::client::DecompositionService;
use crate::error::{NormalizeError, Result};
use crate::record::Record;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

/// One scripted reply of the mock service
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Reply with a JSON array of these propositions
    Propositions(Vec<String>),
    /// Reply with this exact text
    Raw(String),
    /// Reply without any text
    Empty,
    /// Fail as rate limited
    Throttled,
    /// Fail with an unclassified error
    Failure(String),
    /// Fail as if the API key was rejected
    Unauthorized,
    /// Wait before producing the inner reply
    Delayed(Duration, Box<ScriptedReply>),
}

impl ScriptedReply {
    pub fn propositions<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Propositions(items.into_iter().map(Into::into).collect())
    }

    pub fn raw(text: impl Into<String>) -> Self {
        Self::Raw(text.into())
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure(message.into())
    }

    pub fn delayed(delay: Duration, reply: ScriptedReply) -> Self {
        Self::Delayed(delay, Box::new(reply))
    }
}

/// Mock decomposition service driven by per-verse scripts
///
/// A prompt is matched to the first script whose key it contains; each call
/// pops the next reply. Unmatched prompts, and scripts that ran dry, succeed
/// with a single proposition echoing the prompt.
#[derive(Default)]
pub struct ScriptedService {
    scripts: Mutex<Vec<(String, VecDeque<ScriptedReply>)>>,
    calls: Mutex<Vec<String>>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue replies for prompts containing `key`
    pub fn reply_for(self, key: impl Into<String>, replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        self.lock_scripts()
            .push((key.into(), replies.into_iter().collect()));
        self
    }

    /// Delay every reply by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Every prompt received, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.lock_calls().clone()
    }

    /// Number of calls whose prompt contained `key`
    pub fn call_count(&self, key: &str) -> usize {
        self.lock_calls().iter().filter(|p| p.contains(key)).count()
    }

    pub fn total_calls(&self) -> usize {
        self.lock_calls().len()
    }

    /// Most calls ever running at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn lock_scripts(&self) -> std::sync::MutexGuard<'_, Vec<(String, VecDeque<ScriptedReply>)>> {
        self.scripts.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_reply(&self, prompt: &str) -> ScriptedReply {
        self.lock_calls().push(prompt.to_string());
        self.lock_scripts()
            .iter_mut()
            .find(|(key, _)| prompt.contains(key.as_str()))
            .and_then(|(_, replies)| replies.pop_front())
            .unwrap_or_else(|| ScriptedReply::propositions([prompt]))
    }
}

#[async_trait]
impl DecompositionService for ScriptedService {
    async fn generate(&self, prompt: &str) -> Result<Option<String>> {
        let mut reply = self.next_reply(prompt);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        while let ScriptedReply::Delayed(delay, inner) = reply {
            tokio::time::sleep(delay).await;
            reply = *inner;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        reply.into_result()
    }
}

impl ScriptedReply {
    fn into_result(self) -> Result<Option<String>> {
        match self {
            ScriptedReply::Propositions(items) => Ok(Some(serde_json::to_string(&items)?)),
            ScriptedReply::Raw(text) => Ok(Some(text)),
            ScriptedReply::Empty => Ok(None),
            ScriptedReply::Throttled => Err(NormalizeError::Throttled(
                "429 Too Many Requests: RESOURCE_EXHAUSTED".to_string(),
            )),
            ScriptedReply::Failure(message) => Err(NormalizeError::External(message)),
            ScriptedReply::Unauthorized => {
                Err(NormalizeError::config("API key rejected (401 Unauthorized)"))
            }
            ScriptedReply::Delayed(_, inner) => inner.into_result(),
        }
    }
}

/// Temporary workspace with source tables and a prompt file
pub struct TestWorkspace {
    pub temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            temp_dir: TempDir::new()?,
        })
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Write a source table with the standard columns
    pub fn write_source(&self, name: &str, records: &[Record]) -> std::io::Result<PathBuf> {
        let path = self.create_parent(name)?;
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(["book_name", "chapter", "verse", "text"])?;
        for record in records {
            let chapter = record.chapter.to_string();
            let verse = record.verse.to_string();
            writer.write_record([
                record.book_name.as_str(),
                chapter.as_str(),
                verse.as_str(),
                record.text.as_str(),
            ])?;
        }
        writer.flush()?;
        Ok(path)
    }

    pub fn write_prompt(&self, name: &str, template: &str) -> std::io::Result<PathBuf> {
        let path = self.create_parent(name)?;
        std::fs::write(&path, template)?;
        Ok(path)
    }

    fn create_parent(&self, name: &str) -> std::io::Result<PathBuf> {
        let path = self.path(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(path)
    }
}

/// Genesis 1:1-3 with texts `verse A`, `verse B` and `verse C`
pub fn abc_records() -> Vec<Record> {
    ["A", "B", "C"]
        .iter()
        .zip(1u32..)
        .map(|(text, verse)| Record::new("Genesis", 1, verse, format!("verse {}", text)))
        .collect()
}
