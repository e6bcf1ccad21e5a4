//! Gateway-wide settings.
//!
//! Settings are plain serde values so a host process can load them from any
//! source it likes; [`GatewaySettings::from_json_str`] covers the common case.

use crate::Result;
use crate::error::GatewayError;
use crate::validator::DEFAULT_DENIED_FUNCTIONS;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Connection pool sizing and lifetimes, applied to every pool an adapter
/// creates unless the connection URL overrides the sizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Connections kept open per pool (>= 1)
    pub min_pool_size: u32,
    /// Upper bound on connections per pool (>= min_pool_size, <= 100)
    pub max_pool_size: u32,
    /// How long `acquire` waits before reporting `PoolExhausted`
    pub acquire_timeout_secs: u64,
    /// Idle connections above `min_pool_size` are closed after this long
    pub idle_timeout_secs: u64,
    /// Connections are recycled after this long
    pub max_lifetime_secs: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            min_pool_size: 1,
            max_pool_size: 5,
            acquire_timeout_secs: 30,
            idle_timeout_secs: 600,
            max_lifetime_secs: 3600,
        }
    }
}

impl PoolSettings {
    /// Validates pool sizing.
    ///
    /// # Errors
    /// Returns error unless `1 <= min_pool_size <= max_pool_size <= 100`
    /// and the acquire timeout is non-zero.
    pub fn validate(&self) -> Result<()> {
        validate_pool_bounds(self.min_pool_size, self.max_pool_size)?;

        if self.acquire_timeout_secs == 0 {
            return Err(GatewayError::configuration(
                "acquire_timeout_secs must be greater than 0",
            ));
        }

        Ok(())
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }
}

/// Checks a min/max pool pair.
pub(crate) fn validate_pool_bounds(min: u32, max: u32) -> Result<()> {
    if min == 0 {
        return Err(GatewayError::configuration(
            "min_pool_size must be greater than 0",
        ));
    }
    if max > 100 {
        return Err(GatewayError::configuration(
            "max_pool_size should not exceed 100 for safety",
        ));
    }
    if min > max {
        return Err(GatewayError::configuration(format!(
            "min_pool_size ({}) must not exceed max_pool_size ({})",
            min, max
        )));
    }
    Ok(())
}

/// Execution limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    /// Row cap injected into unbounded SELECTs
    pub max_rows: u64,
    /// Server-side statement timeout in milliseconds
    pub statement_timeout_ms: u64,
    /// Ask the LLM collaborator to review results after execution
    pub enable_result_validation: bool,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            max_rows: 1000,
            statement_timeout_ms: 30_000,
            enable_result_validation: true,
        }
    }
}

impl QuerySettings {
    /// Validates execution limits.
    pub fn validate(&self) -> Result<()> {
        if !(1..=100_000).contains(&self.max_rows) {
            return Err(GatewayError::configuration(
                "max_rows must be between 1 and 100000",
            ));
        }
        if !(1_000..=300_000).contains(&self.statement_timeout_ms) {
            return Err(GatewayError::configuration(
                "statement_timeout_ms must be between 1000 and 300000",
            ));
        }
        Ok(())
    }

    pub fn statement_timeout(&self) -> Duration {
        Duration::from_millis(self.statement_timeout_ms)
    }
}

/// Safety validator settings.
///
/// The denylist is best-effort: it names known filesystem, large-object,
/// external-link and server-program functions, and can be extended here
/// without a code change when a backend grows new ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorSettings {
    /// Base denylist; replaces the built-in list when set
    pub denied_functions: Vec<String>,
    /// Additional names appended to `denied_functions`
    pub extra_denied_functions: Vec<String>,
}

impl Default for ValidatorSettings {
    fn default() -> Self {
        Self {
            denied_functions: DEFAULT_DENIED_FUNCTIONS
                .iter()
                .map(|name| (*name).to_string())
                .collect(),
            extra_denied_functions: Vec::new(),
        }
    }
}

impl ValidatorSettings {
    /// Effective denylist, lowercased.
    pub fn denylist(&self) -> BTreeSet<String> {
        self.denied_functions
            .iter()
            .chain(&self.extra_denied_functions)
            .map(|name| name.trim().to_lowercase())
            .filter(|name| !name.is_empty())
            .collect()
    }
}

/// All gateway settings.
///
/// # Example
/// ```rust
/// use sqlgate_core::config::GatewaySettings;
///
/// let settings = GatewaySettings::from_json_str(
///     r#"{ "pool": { "max_pool_size": 10 }, "query": { "max_rows": 500 } }"#,
/// )
/// .unwrap();
///
/// assert_eq!(settings.pool.max_pool_size, 10);
/// assert_eq!(settings.pool.min_pool_size, 1);
/// assert_eq!(settings.query.max_rows, 500);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    pub pool: PoolSettings,
    pub query: QuerySettings,
    pub validator: ValidatorSettings,
}

impl GatewaySettings {
    /// Validates every section.
    pub fn validate(&self) -> Result<()> {
        self.pool.validate()?;
        self.query.validate()?;
        Ok(())
    }

    /// Parses and validates settings from JSON; missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)
            .map_err(|e| GatewayError::configuration(format!("Malformed settings: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_defaults_are_valid() {
        let settings = GatewaySettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.pool.min_pool_size, 1);
        assert_eq!(settings.pool.max_pool_size, 5);
        assert_eq!(settings.query.max_rows, 1000);
        assert_eq!(settings.query.statement_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_pool_bounds() {
        assert!(validate_pool_bounds(1, 1).is_ok());
        assert!(validate_pool_bounds(2, 10).is_ok());
        assert!(validate_pool_bounds(0, 5).is_err());
        assert!(validate_pool_bounds(6, 5).is_err());
        assert!(validate_pool_bounds(1, 101).is_err());

        let pool = PoolSettings {
            min_pool_size: 4,
            max_pool_size: 2,
            ..Default::default()
        };
        let error = pool.validate().unwrap_err();
        assert_eq!(error.code(), ErrorCode::InternalError);
        assert!(error.to_string().contains("min_pool_size (4)"));
    }

    #[test]
    fn test_query_limits() {
        let query = QuerySettings {
            max_rows: 0,
            ..Default::default()
        };
        assert!(query.validate().is_err());

        let query = QuerySettings {
            statement_timeout_ms: 500,
            ..Default::default()
        };
        assert!(query.validate().is_err());
    }

    #[test]
    fn test_denylist_merges_and_lowercases() {
        let validator = ValidatorSettings {
            extra_denied_functions: vec!["  My_Func ".to_string(), String::new()],
            ..Default::default()
        };
        let denylist = validator.denylist();

        assert!(denylist.contains("pg_read_file"));
        assert!(denylist.contains("dblink_exec"));
        assert!(denylist.contains("my_func"));
        assert!(!denylist.contains(""));
    }

    #[test]
    fn test_from_json_rejects_invalid_pool() {
        let error =
            GatewaySettings::from_json_str(r#"{ "pool": { "min_pool_size": 9, "max_pool_size": 3 } }"#)
                .unwrap_err();
        assert!(error.to_string().contains("min_pool_size"));

        assert!(GatewaySettings::from_json_str("not json").is_err());
    }
}
