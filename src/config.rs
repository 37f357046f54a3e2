//! Configuration for the totals cache and the warm-up procedure.
//!
//! Defaults match production: entries live one day, the warm-up marker one
//! hour, and schema verification is attempted three times. Tests usually shrink
//! the entry timeout to a second or less:
//!
//! ```
//! use owner_totals::config::TotalsConfig;
//! use std::time::Duration;
//!
//! let config = TotalsConfig::default().with_timeout(Duration::from_secs(1));
//! assert_eq!(config.timeout, Duration::from_secs(1));
//! ```

use crate::error::{Error, Result};
use crate::totals::EntityKind;
use std::time::Duration;

/// Default lifetime of a per-owner totals entry (one day).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(86_400);

/// Default lifetime of the warm-up marker (one hour).
pub const DEFAULT_MARKER_TTL: Duration = Duration::from_secs(3_600);

/// Default number of schema verification attempts per trigger.
pub const DEFAULT_SCHEMA_ATTEMPTS: u32 = 3;

/// Tuning for [`OwnerTotalsCache`](crate::cache::OwnerTotalsCache) and
/// [`WarmUpCoordinator`](crate::warmup::WarmUpCoordinator).
#[derive(Clone, Debug)]
pub struct TotalsConfig {
    /// Lifetime of each `user_totals_<owner>` entry and of the owner index.
    pub timeout: Duration,
    /// Lifetime of the warm-up marker.
    pub warmup_marker_ttl: Duration,
    /// Schema verification attempts before a trigger is deferred.
    pub schema_check_attempts: u32,
    /// Relational layout used for counting and for the table check.
    pub schema: SchemaConfig,
}

impl Default for TotalsConfig {
    fn default() -> Self {
        TotalsConfig {
            timeout: DEFAULT_TIMEOUT,
            warmup_marker_ttl: DEFAULT_MARKER_TTL,
            schema_check_attempts: DEFAULT_SCHEMA_ATTEMPTS,
            schema: SchemaConfig::default(),
        }
    }
}

impl TotalsConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_marker_ttl(mut self, ttl: Duration) -> Self {
        self.warmup_marker_ttl = ttl;
        self
    }

    /// At least one attempt is always made.
    pub fn with_schema_attempts(mut self, attempts: u32) -> Self {
        self.schema_check_attempts = attempts.max(1);
        self
    }

    pub fn with_schema(mut self, schema: SchemaConfig) -> Self {
        self.schema = schema;
        self
    }

    /// Defaults overridden by environment variables:
    ///
    /// - `OWNER_TOTALS_TIMEOUT_SECS`
    /// - `OWNER_TOTALS_MARKER_TTL_SECS`
    /// - `OWNER_TOTALS_SCHEMA_ATTEMPTS`
    ///
    /// # Errors
    /// Returns `Error::ConfigError` if a variable is set but not a valid number.
    pub fn from_env() -> Result<Self> {
        let mut config = TotalsConfig::default();

        if let Some(secs) = env_u64("OWNER_TOTALS_TIMEOUT_SECS")? {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("OWNER_TOTALS_MARKER_TTL_SECS")? {
            config.warmup_marker_ttl = Duration::from_secs(secs);
        }
        if let Some(attempts) = env_u64("OWNER_TOTALS_SCHEMA_ATTEMPTS")? {
            let attempts = u32::try_from(attempts).map_err(|_| {
                Error::ConfigError(format!(
                    "OWNER_TOTALS_SCHEMA_ATTEMPTS out of range: {}",
                    attempts
                ))
            })?;
            config = config.with_schema_attempts(attempts);
        }

        Ok(config)
    }
}

fn env_u64(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| Error::ConfigError(format!("{} = {:?}: {}", name, raw, e))),
        Err(_) => Ok(None),
    }
}

/// Table and column names of the relational store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchemaConfig {
    pub users_table: String,
    pub units_table: String,
    pub products_table: String,
    pub recipes_table: String,
    /// Foreign key column referencing the owner in each counted table.
    pub owner_column: String,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        SchemaConfig {
            users_table: "users_user".to_string(),
            units_table: "recetario_unidad".to_string(),
            products_table: "recetario_producto".to_string(),
            recipes_table: "recetario_receta".to_string(),
            owner_column: "user_id".to_string(),
        }
    }
}

impl SchemaConfig {
    /// Table counted for `kind`.
    pub fn table_for(&self, kind: EntityKind) -> &str {
        match kind {
            EntityKind::Unit => &self.units_table,
            EntityKind::Product => &self.products_table,
            EntityKind::Recipe => &self.recipes_table,
        }
    }

    /// Tables that must exist before warm-up may run.
    pub fn required_tables(&self) -> Vec<String> {
        vec![
            self.users_table.clone(),
            self.units_table.clone(),
            self.products_table.clone(),
            self.recipes_table.clone(),
        ]
    }

    /// Count query for `kind`, parameterised by owner id (`$1`).
    pub fn count_query(&self, kind: EntityKind) -> String {
        format!(
            "SELECT COUNT(*) FROM {} WHERE {} = $1",
            self.table_for(kind),
            self.owner_column
        )
    }
}
