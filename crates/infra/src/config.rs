//! Process configuration read from the environment.

use std::net::SocketAddr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be set when USE_PERSISTENT_STORES=true")]
    Missing { name: &'static str },

    #[error("invalid value for {name}: {value:?} ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    InMemory,
    Postgres {
        database_url: String,
        max_connections: u32,
        run_migrations: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub store: StoreConfig,
}

impl AppConfig {
    pub const DEFAULT_BIND_ADDR: &'static str = "0.0.0.0:8080";
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any key lookup (the process environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_raw = lookup("BIND_ADDR").unwrap_or_else(|| Self::DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw.parse().map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
            name: "BIND_ADDR",
            value: bind_raw.clone(),
            reason: e.to_string(),
        })?;

        let store = if parse_bool("USE_PERSISTENT_STORES", lookup("USE_PERSISTENT_STORES"), false)? {
            let database_url = lookup("DATABASE_URL")
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing { name: "DATABASE_URL" })?;
            let max_connections = match lookup("DB_MAX_CONNECTIONS") {
                None => Self::DEFAULT_MAX_CONNECTIONS,
                Some(raw) => match raw.trim().parse::<u32>() {
                    Ok(n) if n > 0 => n,
                    _ => {
                        return Err(ConfigError::Invalid {
                            name: "DB_MAX_CONNECTIONS",
                            value: raw,
                            reason: "expected a positive integer".to_string(),
                        });
                    }
                },
            };
            StoreConfig::Postgres {
                database_url,
                max_connections,
                run_migrations: parse_bool("RUN_MIGRATIONS", lookup("RUN_MIGRATIONS"), true)?,
            }
        } else {
            StoreConfig::InMemory
        };

        Ok(Self { bind_addr, store })
    }
}

fn parse_bool(name: &'static str, raw: Option<String>, default: bool) -> Result<bool, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value: raw,
            reason: "expected a boolean".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_to_in_memory_on_8080() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.bind_addr.port(), 8080);
        assert_eq!(cfg.store, StoreConfig::InMemory);
    }

    #[test]
    fn persistent_requires_database_url() {
        let err = config(&[("USE_PERSISTENT_STORES", "true")]).unwrap_err();
        assert_eq!(err, ConfigError::Missing { name: "DATABASE_URL" });
    }

    #[test]
    fn persistent_reads_pool_settings() {
        let cfg = config(&[
            ("USE_PERSISTENT_STORES", "true"),
            ("DATABASE_URL", "postgres://localhost/netfab"),
            ("DB_MAX_CONNECTIONS", "4"),
            ("RUN_MIGRATIONS", "false"),
        ])
        .unwrap();
        assert_eq!(
            cfg.store,
            StoreConfig::Postgres {
                database_url: "postgres://localhost/netfab".to_string(),
                max_connections: 4,
                run_migrations: false,
            }
        );
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            config(&[("BIND_ADDR", "nope")]),
            Err(ConfigError::Invalid { name: "BIND_ADDR", .. })
        ));
        assert!(matches!(
            config(&[("USE_PERSISTENT_STORES", "maybe")]),
            Err(ConfigError::Invalid { name: "USE_PERSISTENT_STORES", .. })
        ));
    }
}
