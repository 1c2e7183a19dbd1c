//! Connection strings.
//!
//! Format: `host[?key=value[&key=value...]]`. Parsing never fails; option
//! problems are reported when the options are turned into a
//! [`SessionConfig`], which only happens for an accepted host.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::str::FromStr;
use std::time::Duration;

use tracing::debug;

use crate::error::ConnectionStringError;

const TICK_RATE: &str = "tick_rate";
const REGISTRY: &str = "registry";

/// A parsed connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    host: String,
    options: BTreeMap<String, String>,
    malformed: Vec<String>,
}

/// Session settings taken from a connection string's options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Target time between the starts of two ticks.
    pub tick_rate: Duration,
    /// Registry name; generated when absent.
    pub registry_name: Option<String>,
}

impl ConnectionString {
    /// Split a connection string into host and options. A repeated key keeps
    /// its last value; empty segments are ignored.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let (host, query) = input.split_once('?').unwrap_or((input, ""));
        let mut options = BTreeMap::new();
        let mut malformed = Vec::new();

        for segment in query.split('&').filter(|segment| !segment.is_empty()) {
            match segment.split_once('=') {
                Some((key, value)) if !key.is_empty() => {
                    options.insert(key.to_string(), value.to_string());
                }
                _ => malformed.push(segment.to_string()),
            }
        }

        Self {
            host: host.to_string(),
            options,
            malformed,
        }
    }

    /// The host part.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The value of option `key`, if present.
    #[must_use]
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Interpret the options.
    ///
    /// # Errors
    ///
    /// Fails on a malformed segment, or if `tick_rate` is missing, not an
    /// integer, or zero.
    pub fn session_config(&self) -> Result<SessionConfig, ConnectionStringError> {
        if let Some(segment) = self.malformed.first() {
            return Err(ConnectionStringError::MalformedOption(segment.clone()));
        }

        for key in self.options.keys() {
            if key != TICK_RATE && key != REGISTRY {
                debug!(option = %key, "ignoring unknown connection option");
            }
        }

        let raw = self
            .option(TICK_RATE)
            .ok_or(ConnectionStringError::MissingOption(TICK_RATE))?;
        let millis = raw
            .parse::<u64>()
            .ok()
            .filter(|&millis| millis > 0)
            .ok_or_else(|| ConnectionStringError::InvalidValue {
                key: TICK_RATE,
                value: raw.to_string(),
            })?;

        let registry_name = match self.option(REGISTRY) {
            Some("") => {
                return Err(ConnectionStringError::InvalidValue {
                    key: REGISTRY,
                    value: String::new(),
                });
            }
            other => other.map(str::to_string),
        };

        Ok(SessionConfig {
            tick_rate: Duration::from_millis(millis),
            registry_name,
        })
    }
}

impl FromStr for ConnectionString {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}
