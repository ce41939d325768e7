//! # verse-normalizer
//!
//! Resumable, concurrent decomposition of scripture verses into atomic
//! propositions through an external text-generation service.
//!
//! ## Usage
//!
//! ```bash
//! verse-normalizer [-v] [-c normalizer.toml] [-d vulgate] [-j 4] [--compact] [--plan]
//! ```
//!
//! ## Modules
//!
//! - `app` - Logging setup and fatal error handling for the binary
//! - `client` - Prompt rendering, the external service seam, and reply parsing
//! - `config` - Layered run configuration (defaults, TOML, environment)
//! - `dispatcher` - Bounded worker pool feeding the ledger writer
//! - `ledger` - Append-only CSV ledger of outcomes, with retention policies
//! - `pipeline` - Per-dataset load, plan, and dispatch
//! - `planner` - Pure resume planning against the ledger
//! - `record` - Verse records and their identity
//! - `retry` - Exponential backoff with jitter for throttled calls
//! - `source` - Dataset source tables and filters
//! - `testing` - Scripted service and fixtures for tests
pub mod app;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod ledger;
pub mod pipeline;
pub mod planner;
pub mod record;
pub mod retry;
pub mod source;

pub mod testing;

pub use error::{NormalizeError, Result};
