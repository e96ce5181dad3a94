//! Application configuration for the hosted application.
//!
//! Configuration is accumulated through queued builder callbacks and frozen
//! into an immutable [`AppConfig`] when the host is built. Handlers read it
//! back through an `Extension<AppConfig>` layer, the moral equivalent of an
//! injected configuration root.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use crate::error::FixtureError;

/// Well-known environment names.
pub mod environment {
    pub const DEVELOPMENT: &str = "development";
    pub const PRODUCTION: &str = "production";
}

/// Immutable configuration snapshot owned by a built host.
#[derive(Clone, Debug)]
pub struct AppConfig {
    environment: String,
    values: BTreeMap<String, String>,
}

impl AppConfig {
    /// The environment name the host was built with.
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Looks up a raw configuration value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Looks up a raw configuration value, falling back to a default.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Parses a configuration value into `T`.
    ///
    /// Returns `Ok(None)` when the key is absent. A present but unparseable
    /// value is an error rather than a silent `None`.
    pub fn get_parsed<T>(&self, key: &str) -> Result<Option<T>, FixtureError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw.parse().map(Some).map_err(|e: T::Err| FixtureError::Config {
                key: key.to_string(),
                value: raw.to_string(),
                message: e.to_string(),
            }),
        }
    }

    /// Parses a duration value of the form `<n>[ms|s|m|h|d]`, defaulting to
    /// seconds when no suffix is given.
    pub fn get_duration(&self, key: &str) -> Result<Option<chrono::Duration>, FixtureError> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => parse_duration(raw).map(Some).map_err(|message| FixtureError::Config {
                key: key.to_string(),
                value: raw.to_string(),
                message,
            }),
        }
    }
}

/// Mutable configuration under construction.
///
/// Seeded by [`Startup::configure_defaults`](crate::host::Startup), then each
/// queued `having_config` callback is replayed in registration order, so
/// later writes to the same key win.
#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    values: BTreeMap<String, String>,
}

impl AppConfigBuilder {
    /// Sets a configuration value, replacing any previous one for the key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Sets every entry of an iterator of key/value pairs.
    pub fn set_all<I, K, V>(&mut self, entries: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in entries {
            self.set(key, value);
        }
        self
    }

    /// Removes a configuration value.
    pub fn remove(&mut self, key: &str) -> &mut Self {
        self.values.remove(key);
        self
    }

    pub(crate) fn freeze(self, environment: String) -> AppConfig {
        AppConfig {
            environment,
            values: self.values,
        }
    }
}

fn parse_duration(raw: &str) -> Result<chrono::Duration, String> {
    let trimmed = raw.trim();
    let digits_end = trimmed
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || (*i == 0 && *c == '-')))
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());
    let (number, suffix) = trimmed.split_at(digits_end);
    let value: i64 = number
        .parse()
        .map_err(|_| format!("expected a number before the unit in {trimmed:?}"))?;

    match suffix {
        "" | "s" => Ok(chrono::Duration::seconds(value)),
        "ms" => Ok(chrono::Duration::milliseconds(value)),
        "m" => Ok(chrono::Duration::minutes(value)),
        "h" => Ok(chrono::Duration::hours(value)),
        "d" => Ok(chrono::Duration::days(value)),
        other => Err(format!("unknown duration unit {other:?}")),
    }
}
