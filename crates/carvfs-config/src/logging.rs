//! Structured logging utilities for carvfs components.
//!
//! Provides consistent logging with component prefixes and structured fields.
//!
//! # Usage
//!
//! ```ignore
//! use carvfs_config::log_stack_debug;
//!
//! log_stack_debug!("Level extended", level = 1);
//! ```

/// Component identifiers for log filtering
pub struct Component;

impl Component {
    pub const CARVPATH: &'static str = "CARVPATH";
    pub const STACK: &'static str = "STACK";
    pub const OHASH: &'static str = "OHASH";
    pub const REPO: &'static str = "REPO";
}

/// Log levels for runtime configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

// === CARVPATH logging macros ===

#[macro_export]
macro_rules! log_path_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "CARVPATH", $($key = $value,)* $msg)
    };
}

// === STACK logging macros ===

#[macro_export]
macro_rules! log_stack_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "STACK", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_stack_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "STACK", $($key = $value,)* $msg)
    };
}

// === OHASH logging macros ===

#[macro_export]
macro_rules! log_ohash_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "OHASH", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_ohash_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "OHASH", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_ohash_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "OHASH", $($key = $value,)* $msg)
    };
}

// === REPO logging macros ===

#[macro_export]
macro_rules! log_repo_error {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::error!(component = "REPO", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_repo_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "REPO", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_repo_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "REPO", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_repo_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "REPO", $($key = $value,)* $msg)
    };
}

/// Initialize logging with the given level filter.
/// Call this once at application startup; `RUST_LOG` takes precedence.
pub fn init_logging(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter()));

    // A second init (e.g. from several tests) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}
