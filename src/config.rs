//! Startup configuration: read once from the environment, validated eagerly.
//!
//! Mirrors the teacher's `util::env` helpers (`env_req`/`env_parse`/
//! `preflight_check`), narrowed to the variables this engine actually reads.
//! Any failure here is a `ConfigError` and aborts the process before any
//! connection pool or worker pool is constructed.

use std::env;
use std::time::Duration;

use tracing::info;

use crate::errors::ConfigError;

#[derive(Debug, Clone)]
pub struct Config {
    pub db_name: String,
    pub db_user: String,
    pub db_password: String,
    pub db_host: String,
    pub db_port: u16,

    pub offset: i64,
    pub num_satellites: i64,
    pub start_time_min: f64,
    pub stop_time_min: f64,
    pub step_size_min: f64,

    pub pool_acquire_timeout: Duration,
}

impl Config {
    /// Loads configuration from the process environment. Does not call
    /// `dotenv` itself; callers invoke `dotenv::dotenv().ok()` once at the
    /// top of `main` before calling this, matching the teacher's bootstrap
    /// order in `src/bin/db_migrate.rs`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let db_name = env_req("DB_NAME")?;
        let db_user = env_req("DB_USER")?;
        let db_password = env_req("DB_PASSWORD")?;
        let db_host = env_req("DB_HOST")?;
        let db_port = env_parse_required::<u16>("DB_PORT")?;

        let offset = env_parse("OFFSET", 0i64);
        let num_satellites = env_parse("NUM_SATELLITES", 11390i64);
        let start_time_min = env_parse("START_TIME", 0.0f64);
        let stop_time_min = env_parse("STOP_TIME", 180.0f64);
        let step_size_min = env_parse("STEP_SIZE", 1.0f64);

        let pool_acquire_timeout_ms = env_parse("DB_POOL_ACQUIRE_TIMEOUT_MS", 1000u64);

        let cfg = Config {
            db_name,
            db_user,
            db_password,
            db_host,
            db_port,
            offset,
            num_satellites,
            start_time_min,
            stop_time_min,
            step_size_min,
            pool_acquire_timeout: Duration::from_millis(pool_acquire_timeout_ms),
        };

        info!(
            db_host = %cfg.db_host,
            db_port = cfg.db_port,
            db_name = %cfg.db_name,
            offset = cfg.offset,
            num_satellites = cfg.num_satellites,
            step_size_min = cfg.step_size_min,
            "configuration loaded"
        );

        Ok(cfg)
    }

    /// Composed `postgres://` connection string. Never logged verbatim —
    /// callers log the individual fields instead (see `from_env`).
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{user}:{password}@{host}:{port}/{db}",
            user = urlencode(&self.db_user),
            password = urlencode(&self.db_password),
            host = self.db_host,
            port = self.db_port,
            db = self.db_name,
        )
    }
}

fn urlencode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

fn env_req(key: &'static str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVar(key))
}

fn env_parse_required<T: std::str::FromStr>(key: &'static str) -> Result<T, ConfigError> {
    let raw = env_req(key)?;
    raw.parse::<T>().map_err(|_| ConfigError::InvalidValue {
        var: key,
        value: raw,
    })
}

fn env_parse<T: std::str::FromStr>(key: &'static str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|raw| raw.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urlencode_escapes_reserved_characters() {
        assert_eq!(urlencode("p@ss:word"), "p%40ss%3Aword");
        assert_eq!(urlencode("plain-value_1.0~"), "plain-value_1.0~");
    }

    #[test]
    fn env_parse_falls_back_to_default_on_missing_or_invalid() {
        std::env::remove_var("CONJ_TEST_NUM");
        assert_eq!(env_parse::<i64>("CONJ_TEST_NUM", 42), 42);

        std::env::set_var("CONJ_TEST_NUM", "not-a-number");
        assert_eq!(env_parse::<i64>("CONJ_TEST_NUM", 42), 42);

        std::env::set_var("CONJ_TEST_NUM", "7");
        assert_eq!(env_parse::<i64>("CONJ_TEST_NUM", 42), 7);
        std::env::remove_var("CONJ_TEST_NUM");
    }
}
