//! Typed error kinds for the propagation-and-conjunction engine.
//!
//! Each enum matches one error class from the error-handling design:
//! `ConfigError` aborts the process at startup; the rest are soft failures
//! caught at a task boundary, logged with the relevant satellite/pair id,
//! and converted to "skip and continue".

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connection pool exhausted within timeout")]
    AcquireTimeout,
    #[error("connection pool is shutting down")]
    ShuttingDown,
    #[error("broken connection: {0}")]
    Broken(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum SqlError {
    #[error("a transaction is already in flight on this connection")]
    TransactionAlreadyOpen,
    #[error("no transaction is in flight on this connection")]
    NoTransactionOpen,
    #[error("sql error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("tle_line1 too short to contain an epoch (need 32 chars, got {0})")]
    LineTooShort(usize),
    #[error("could not parse epoch year field: {0}")]
    InvalidYear(String),
    #[error("could not parse epoch day-of-year field: {0}")]
    InvalidDayOfYear(String),
    #[error("json field missing or malformed: {0}")]
    Json(String),
}

#[derive(Debug, Error)]
pub enum PropagationError {
    #[error("sgp4 element parse failed: {0}")]
    ElementParse(String),
    #[error("sgp4 propagation failed at t={tsince_min} min: {reason}")]
    Propagate { tsince_min: f64, reason: String },
    #[error("propagation window out of bounds: stop_time_min={0} (must be in (0, 1440])")]
    WindowOutOfBounds(f64),
    #[error("propagator output exceeded the 100MB cap ({0} bytes)")]
    OutputTooLarge(usize),
}

#[derive(Debug, Error)]
pub enum IncompleteRecord {
    #[error("row at tsince_min={0} missing required field(s)")]
    MissingField(f64),
}
