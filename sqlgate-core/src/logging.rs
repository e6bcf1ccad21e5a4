//! Logging setup for processes embedding the gateway.
//!
//! Library code only emits `tracing` events; the host process decides where
//! they go by calling one of these initializers once at startup.

use crate::Result;
use crate::error::GatewayError;
use tracing_subscriber::EnvFilter;

/// Maps CLI-style verbosity flags onto a tracing level.
fn level_for(verbose: u8, quiet: bool) -> tracing::Level {
    match (quiet, verbose) {
        (true, _) => tracing::Level::ERROR,
        (false, 0) => tracing::Level::INFO,
        (false, 1) => tracing::Level::DEBUG,
        (false, _) => tracing::Level::TRACE,
    }
}

/// Initializes human-readable logging based on verbosity level.
///
/// # Arguments
/// * `verbose` - Verbosity level (0=INFO, 1=DEBUG, 2+=TRACE)
/// * `quiet` - If true, only show ERROR level logs
///
/// # Example
/// ```rust,no_run
/// use sqlgate_core::logging::init_logging;
///
/// init_logging(1, false).expect("Failed to initialize logging");
/// ```
pub fn init_logging(verbose: u8, quiet: bool) -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(level_for(verbose, quiet))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .map_err(|e| GatewayError::internal(format!("Failed to initialize logging: {}", e)))?;

    Ok(())
}

/// Initializes JSON-lines logging filtered by `RUST_LOG`, falling back to
/// `default_directive` when the variable is unset or invalid.
pub fn init_json_logging(default_directive: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .map_err(|e| GatewayError::internal(format!("Invalid log filter: {}", e)))?;

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_current_span(true)
        .try_init()
        .map_err(|e| GatewayError::internal(format!("Failed to initialize logging: {}", e)))?;

    Ok(())
}
