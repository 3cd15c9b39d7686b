//! Connection string parsing.
//!
//! # Responsibility
//! - Turn an ADO-style `key=value;` connection string into typed settings.
//!
//! # Invariants
//! - Keys are matched case-insensitively with inner whitespace ignored.
//! - `Data Source` is required; everything else has a default.
//! - Unknown keys are rejected instead of silently ignored.
//! - `Max Pool Size` caps open connections, idle and checked out together.

use crate::db::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_MAX_POOL_SIZE: usize = 8;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 15;
pub const MEMORY_DATA_SOURCE: &str = ":memory:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    pub data_source: String,
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: usize,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    /// How long a caller waits for a pooled connection.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_max_pool_size() -> usize {
    DEFAULT_MAX_POOL_SIZE
}

fn default_command_timeout_secs() -> u64 {
    DEFAULT_COMMAND_TIMEOUT_SECS
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

impl ConnectionSettings {
    pub fn new(data_source: impl Into<String>) -> Self {
        Self {
            data_source: data_source.into(),
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MEMORY_DATA_SOURCE)
    }

    /// Parses `Data Source=...;Max Pool Size=...;Command Timeout=...;Connect Timeout=...`.
    pub fn parse(connection_string: &str) -> DbResult<Self> {
        let mut data_source: Option<String> = None;
        let mut max_pool_size = DEFAULT_MAX_POOL_SIZE;
        let mut command_timeout_secs = DEFAULT_COMMAND_TIMEOUT_SECS;
        let mut connect_timeout_secs = DEFAULT_CONNECT_TIMEOUT_SECS;

        for segment in connection_string.split(';') {
            if segment.trim().is_empty() {
                continue;
            }
            let (key, value) = segment.split_once('=').ok_or_else(|| {
                DbError::InvalidConnectionString(format!(
                    "segment `{}` is not a key=value pair",
                    segment.trim()
                ))
            })?;
            let value = value.trim();

            match normalize_key(key).as_str() {
                "datasource" | "server" => data_source = Some(value.to_string()),
                "maxpoolsize" => max_pool_size = parse_number(key, value)?,
                "commandtimeout" => command_timeout_secs = parse_number(key, value)?,
                "connecttimeout" | "connectiontimeout" => {
                    connect_timeout_secs = parse_number(key, value)?
                }
                _ => {
                    return Err(DbError::InvalidConnectionString(format!(
                        "unsupported keyword `{}`",
                        key.trim()
                    )))
                }
            }
        }

        let data_source = data_source.unwrap_or_default();
        let settings = Self {
            data_source,
            max_pool_size,
            command_timeout_secs,
            connect_timeout_secs,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Checks values that `parse` and deserialization can both produce.
    pub fn validate(&self) -> DbResult<()> {
        if self.data_source.is_empty() {
            return Err(DbError::InvalidConnectionString(
                "`Data Source` is required".to_string(),
            ));
        }
        if self.max_pool_size == 0 || u32::try_from(self.max_pool_size).is_err() {
            return Err(DbError::InvalidConnectionString(format!(
                "`Max Pool Size` must be between 1 and {}, got {}",
                u32::MAX,
                self.max_pool_size
            )));
        }
        if self.connect_timeout_secs == 0 {
            return Err(DbError::InvalidConnectionString(
                "`Connect Timeout` must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_memory(&self) -> bool {
        self.data_source == MEMORY_DATA_SOURCE
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase()
}

fn parse_number<N: std::str::FromStr>(key: &str, value: &str) -> DbResult<N> {
    value.parse().map_err(|_| {
        DbError::InvalidConnectionString(format!(
            "`{}` expects a non-negative integer, got `{value}`",
            key.trim()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::{ConnectionSettings, DEFAULT_COMMAND_TIMEOUT_SECS, DEFAULT_MAX_POOL_SIZE};
    use crate::db::DbError;
    use std::time::Duration;

    #[test]
    fn parse_applies_defaults() {
        let settings = ConnectionSettings::parse("Data Source=/var/lib/app.db").unwrap();
        assert_eq!(settings.data_source, "/var/lib/app.db");
        assert_eq!(settings.max_pool_size, DEFAULT_MAX_POOL_SIZE);
        assert_eq!(settings.command_timeout(), Duration::from_secs(600));
        assert_eq!(settings.command_timeout_secs, DEFAULT_COMMAND_TIMEOUT_SECS);
        assert_eq!(settings.connect_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn parse_accepts_case_and_spacing_variants() {
        let settings =
            ConnectionSettings::parse(
                " data source = :memory: ; MAXPOOLSIZE=2;Command Timeout=30;Connection Timeout=3",
            )
                .unwrap();
        assert!(settings.is_memory());
        assert_eq!(settings.max_pool_size, 2);
        assert_eq!(settings.command_timeout_secs, 30);
        assert_eq!(settings.connect_timeout_secs, 3);
    }

    #[test]
    fn parse_rejects_bad_input() {
        for input in [
            "",
            "Max Pool Size=3",
            "Data Source=x;Pooling",
            "Data Source=x;Encrypt=true",
            "Data Source=x;Command Timeout=soon",
            "Data Source=x;Max Pool Size=0",
            "Data Source=x;Connect Timeout=0",
        ] {
            let err = ConnectionSettings::parse(input).unwrap_err();
            assert!(
                matches!(err, DbError::InvalidConnectionString(_)),
                "input `{input}` gave {err}"
            );
        }
    }
}
