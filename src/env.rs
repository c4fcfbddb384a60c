//! Environment variable names used by this crate for configuring the
//! pipeline from the outside.
//!
//! Every setting can be overridden with `APP_` followed by its dotted key,
//! nesting separated by a double underscore, e.g.
//! `APP_LOG__SENTRY__DSN=https://key@sentry.example/1`.

/// Prefix shared by all configuration overrides.
pub const CONFIG_ENV_PREFIX: &str = "APP_";

/// Separator between nesting levels inside an override name.
pub const CONFIG_ENV_SPLIT: &str = "__";

/// Optional path of a JSON or YAML configuration file.
pub const CONFIG_FILE_ENV: &str = "APP_CONFIG_FILE";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
