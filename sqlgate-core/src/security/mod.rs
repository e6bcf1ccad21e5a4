//! Security utilities for credential protection.
//!
//! # Security Guarantees
//! - Credentials are stored in `Zeroizing` containers for automatic memory clearing
//! - Debug output never includes a password
//! - Connection strings are redacted by [`crate::error::redact_database_url`]
//!   before they reach logs or error messages

mod credentials;

pub use credentials::Credentials;
