//! Service configuration, read from `DAPODIK_*` environment variables.

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}' - {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Parse error for {key}: {message}")]
    ParseError { key: String, message: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub session_ttl_secs: u64,
    /// Cookie signing key. `None` means a random key per process.
    pub session_secret: Option<String>,
    pub session_purge_interval_secs: u64,
    pub seed_admin: Option<(String, String)>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if e.not_found() {
                log::info!("No .env file found, using environment variables only");
            } else {
                log::warn!("Error loading .env file: {}", e);
            }
        }

        let host = env_or("DAPODIK_HOST", "127.0.0.1");
        let port = env_parse("DAPODIK_PORT", 3000u16)?;
        let listen_addr = format!("{}:{}", host, port)
            .parse()
            .map_err(|e| ConfigError::InvalidValue {
                key: "DAPODIK_HOST/PORT".to_string(),
                value: format!("{}:{}", host, port),
                reason: format!("Invalid socket address: {}", e),
            })?;

        let session_secret = env::var("DAPODIK_SESSION_SECRET").ok();
        if let Some(secret) = &session_secret {
            if secret.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "DAPODIK_SESSION_SECRET".to_string(),
                    value: String::new(),
                    reason: "signing secret must not be empty".to_string(),
                });
            }
        }

        let seed_admin = match (
            env::var("DAPODIK_ADMIN_USERNAME"),
            env::var("DAPODIK_ADMIN_PASSWORD"),
        ) {
            (Ok(user), Ok(password)) if !user.is_empty() => Some((user, password)),
            _ => None,
        };

        Ok(Config {
            listen_addr,
            database_url: env::var("DATABASE_URL")
                .ok()
                .or_else(|| env::var("DAPODIK_DATABASE_URL").ok()),
            db_max_connections: env_parse("DAPODIK_DB_MAX_CONNECTIONS", 10u32)?,
            session_ttl_secs: env_parse("DAPODIK_SESSION_TTL", 600u64)?,
            session_secret,
            session_purge_interval_secs: env_parse("DAPODIK_SESSION_PURGE_INTERVAL", 60u64)?,
            seed_admin,
        })
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn session_purge_interval(&self) -> Duration {
        Duration::from_secs(self.session_purge_interval_secs.max(1))
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(value) => value.parse().map_err(|e| ConfigError::ParseError {
            key: key.to_string(),
            message: format!("{}", e),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_parse_falls_back_to_default() {
        let port = env_parse("DAPODIK_TEST_UNSET_PORT", 3000u16).unwrap();
        assert_eq!(port, 3000);
    }

    #[test]
    fn env_parse_reports_bad_values() {
        env::set_var("DAPODIK_TEST_BAD_TTL", "ten minutes");
        let err = env_parse("DAPODIK_TEST_BAD_TTL", 600u64).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { ref key, .. } if key == "DAPODIK_TEST_BAD_TTL"));
        env::remove_var("DAPODIK_TEST_BAD_TTL");
    }

    #[test]
    fn env_or_reads_set_values() {
        env::set_var("DAPODIK_TEST_HOST", "0.0.0.0");
        assert_eq!(env_or("DAPODIK_TEST_HOST", "127.0.0.1"), "0.0.0.0");
        env::remove_var("DAPODIK_TEST_HOST");
    }
}
