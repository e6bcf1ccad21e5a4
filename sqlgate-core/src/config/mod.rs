//! Configuration types.
//!
//! - `GatewaySettings`: pool, query and validator settings loaded once at startup
//! - `ConnectionConfig`: per-URL connection settings derived from a connection string
//!
//! # Security
//! Settings never carry credentials. Passwords only exist inside a
//! `ConnectionConfig`, which keeps them in zeroizing storage.

mod connection;
mod settings;

pub use connection::ConnectionConfig;
pub use settings::{GatewaySettings, PoolSettings, QuerySettings, ValidatorSettings};
