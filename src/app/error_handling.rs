//! Error handling utilities
//!
//! This module provides centralized error handling for the application.

use crate::error::NormalizeError;
use tracing::error;

/// Exit code for an error that ends the process
pub fn exit_code_for(error: &anyhow::Error) -> i32 {
    error
        .downcast_ref::<NormalizeError>()
        .map(NormalizeError::exit_code)
        .unwrap_or(1)
}

/// Handle fatal errors and exit with appropriate status code
///
/// `NormalizeError::Configuration` exits with 2, anything else with 1. With
/// `verbose >= 1` the full error chain is printed.
pub fn handle_fatal_error(error: anyhow::Error, verbose: u8) -> ! {
    error!("Fatal error: {:#}", error);

    eprintln!("Error: {error}");
    if verbose >= 1 {
        eprintln!("\nError chain:");
        for (i, cause) in error.chain().enumerate() {
            eprintln!("  {}: {}", i, cause);
        }
    }

    std::process::exit(exit_code_for(&error))
}
