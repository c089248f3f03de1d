//! Process configuration read from the environment.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;
use tracing::warn;

pub const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} is required when {reason}")]
    Missing { name: &'static str, reason: &'static str },

    #[error("{name} has an invalid value '{value}': {expected}")]
    Invalid {
        name: &'static str,
        value: String,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub storage: StorageMode,
    pub database_url: Option<String>,
    pub ged_root: PathBuf,
    pub default_tenant_fallback: bool,
    pub base_domain: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same rules as [`AppConfig::from_env`], reading from any source.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| get(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = match var("ATELIER_BIND_ADDR") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                name: "ATELIER_BIND_ADDR",
                value: raw,
                expected: "host:port",
            })?,
            None => SocketAddr::from(([0, 0, 0, 0], 8080)),
        };

        let jwt_secret = var("JWT_SECRET").unwrap_or_else(|| {
            warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        let storage = match var("ATELIER_STORAGE").map(|s| s.to_lowercase()) {
            None => StorageMode::Memory,
            Some(s) if s == "memory" => StorageMode::Memory,
            Some(s) if s == "postgres" => StorageMode::Postgres,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "ATELIER_STORAGE",
                    value: other,
                    expected: "memory or postgres",
                });
            }
        };

        let database_url = var("DATABASE_URL");
        if storage == StorageMode::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing {
                name: "DATABASE_URL",
                reason: "ATELIER_STORAGE=postgres",
            });
        }

        let default_tenant_fallback = match var("ATELIER_DEFAULT_TENANT_FALLBACK") {
            None => true,
            Some(raw) => parse_bool(&raw).ok_or(ConfigError::Invalid {
                name: "ATELIER_DEFAULT_TENANT_FALLBACK",
                value: raw,
                expected: "true or false",
            })?,
        };

        Ok(Self {
            bind_addr,
            jwt_secret,
            storage,
            database_url,
            ged_root: var("ATELIER_GED_ROOT").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("./ged")),
            default_tenant_fallback,
            base_domain: var("ATELIER_BASE_DOMAIN").map(|d| d.trim_start_matches('.').to_lowercase()),
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_apply_to_an_empty_environment() {
        let config = load(&[]).unwrap();
        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.jwt_secret, DEV_JWT_SECRET);
        assert_eq!(config.storage, StorageMode::Memory);
        assert_eq!(config.ged_root, PathBuf::from("./ged"));
        assert!(config.default_tenant_fallback);
        assert_eq!(config.base_domain, None);
    }

    #[test]
    fn postgres_needs_a_database_url() {
        assert_eq!(
            load(&[("ATELIER_STORAGE", "postgres")]).unwrap_err(),
            ConfigError::Missing {
                name: "DATABASE_URL",
                reason: "ATELIER_STORAGE=postgres"
            }
        );
        let config = load(&[("ATELIER_STORAGE", "Postgres"), ("DATABASE_URL", "postgres://db/atelier")]).unwrap();
        assert_eq!(config.storage, StorageMode::Postgres);
    }

    #[test]
    fn bad_values_are_typed_errors() {
        assert!(matches!(
            load(&[("ATELIER_BIND_ADDR", "nowhere")]),
            Err(ConfigError::Invalid { name: "ATELIER_BIND_ADDR", .. })
        ));
        assert!(matches!(
            load(&[("ATELIER_DEFAULT_TENANT_FALLBACK", "maybe")]),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(load(&[("ATELIER_STORAGE", "redis")]), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn base_domain_is_normalised() {
        let config = load(&[("ATELIER_BASE_DOMAIN", ".Atelier.Example"), ("ATELIER_DEFAULT_TENANT_FALLBACK", "no")])
            .unwrap();
        assert_eq!(config.base_domain.as_deref(), Some("atelier.example"));
        assert!(!config.default_tenant_fallback);
    }
}
