//! Configuration
//!
//! Settings come from a `KEY=value` file read once at startup. Secrets come
//! from the process environment (optionally seeded from a `.env` file by the
//! binaries).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use pocket_types::{parse_bool, ConsumerConfig, Error, Result, REQUEST_QUEUE, RESPONSE_QUEUE};
use tracing::{debug, info};

/// Default settings file location
pub const DEFAULT_SETTINGS_PATH: &str = "cfg/.cfg";

/// Default secrets file location
pub const DEFAULT_ENV_PATH: &str = "cfg/.env";

/// Model every prompt is sent to unless configured otherwise
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

pub mod keys {
    pub const BROKER_URL: &str = "BROKER_URL";
    pub const REQUEST_QUEUE: &str = "BROKER_REQUEST_QUEUE";
    pub const RESPONSE_QUEUE: &str = "BROKER_RESPONSE_QUEUE";
    pub const PUBLISH_TIMEOUT_SECS: &str = "BROKER_PUBLISH_TIMEOUT_SECS";
    pub const CONSUMER_AUTO_ACK: &str = "BROKER_CONSUMER_AUTO_ACK";
    pub const CONSUMER_EXCLUSIVE: &str = "BROKER_CONSUMER_EXCLUSIVE";
    pub const CONSUMER_NO_LOCAL: &str = "BROKER_CONSUMER_NO_LOCAL";
    pub const CONSUMER_NO_WAIT: &str = "BROKER_CONSUMER_NO_WAIT";
    pub const CONSUMER_TAG: &str = "BROKER_CONSUMER_TAG";
    pub const MAX_IN_FLIGHT: &str = "RELAY_MAX_IN_FLIGHT";
    pub const SHUTDOWN_GRACE_SECS: &str = "RELAY_SHUTDOWN_GRACE_SECS";
    pub const AI_MODEL: &str = "AI_MODEL";
    pub const AI_TIMEOUT_SECS: &str = "AI_TIMEOUT_SECS";
    pub const AI_API_URL: &str = "AI_API_URL";
    pub const TELEGRAM_API_URL: &str = "TELEGRAM_API_URL";
}

/// Immutable view of the settings file
#[derive(Debug, Clone, Default)]
pub struct Settings {
    values: HashMap<String, String>,
    source: Option<PathBuf>,
}

impl Settings {
    /// Read a `KEY=value` file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let iter = dotenvy::from_path_iter(path)
            .map_err(|e| Error::Config(format!("unable to open {}: {e}", path.display())))?;

        let mut values = HashMap::new();
        for item in iter {
            let (key, value) = item
                .map_err(|e| Error::Config(format!("malformed line in {}: {e}", path.display())))?;
            values.insert(key, value);
        }

        info!(path = %path.display(), keys = values.len(), "Configuration file loaded");
        Ok(Self {
            values,
            source: Some(path.to_path_buf()),
        })
    }

    /// Build settings from in-memory pairs
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            source: None,
        }
    }

    /// File the settings were read from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Value that must be present
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| Error::Config(format!("parameter {key} is not found")))
    }

    /// Boolean that must be present and parse
    pub fn require_bool(&self, key: &str) -> Result<bool> {
        let raw = self.require(key)?;
        parse_bool(raw)
            .ok_or_else(|| Error::Config(format!("unable to parse bool parameter {key}={raw}")))
    }

    /// Optional value with a fallback; present but unparsable is an error
    pub fn get_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("unable to parse {key}={raw}: {e}"))),
        }
    }

    /// Resolve the consumer options
    ///
    /// Called for every subscription that is opened; every option must be
    /// present and well formed.
    pub fn consumer_config(&self) -> Result<ConsumerConfig> {
        let config = ConsumerConfig {
            auto_ack: self.require_bool(keys::CONSUMER_AUTO_ACK)?,
            exclusive: self.require_bool(keys::CONSUMER_EXCLUSIVE)?,
            no_local: self.require_bool(keys::CONSUMER_NO_LOCAL)?,
            no_wait: self.require_bool(keys::CONSUMER_NO_WAIT)?,
            consumer_tag: self.require(keys::CONSUMER_TAG)?.to_string(),
        };
        debug!(?config, "Consumer options resolved");
        Ok(config)
    }
}

/// Startup configuration shared by both services
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address of the intermediary
    pub broker_url: String,
    /// Queue carrying prompts towards the solver
    pub request_queue: String,
    /// Queue carrying answers back to the front door
    pub response_queue: String,
    /// Deadline for a single publish
    pub publish_timeout: Duration,
    /// Units of work allowed in flight per role
    pub max_in_flight: usize,
    /// How long shutdown waits for in-flight work
    pub shutdown_grace: Duration,
    /// Model every prompt is sent to
    pub model: String,
    /// Optional deadline for one solver call
    pub solver_timeout: Option<Duration>,
}

impl RelayConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let max_in_flight = settings.get_or(keys::MAX_IN_FLIGHT, 32usize)?;
        if max_in_flight == 0 {
            return Err(Error::Config(format!(
                "{} must be at least 1",
                keys::MAX_IN_FLIGHT
            )));
        }

        // 0 or absent: solver calls run without a deadline
        let solver_timeout = match settings.get_or(keys::AI_TIMEOUT_SECS, 0u64)? {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(Self {
            broker_url: settings.require(keys::BROKER_URL)?.to_string(),
            request_queue: settings
                .get(keys::REQUEST_QUEUE)
                .unwrap_or(REQUEST_QUEUE)
                .to_string(),
            response_queue: settings
                .get(keys::RESPONSE_QUEUE)
                .unwrap_or(RESPONSE_QUEUE)
                .to_string(),
            publish_timeout: Duration::from_secs(settings.get_or(keys::PUBLISH_TIMEOUT_SECS, 5u64)?),
            max_in_flight,
            shutdown_grace: Duration::from_secs(settings.get_or(keys::SHUTDOWN_GRACE_SECS, 10u64)?),
            model: settings
                .get(keys::AI_MODEL)
                .unwrap_or(DEFAULT_MODEL)
                .to_string(),
            solver_timeout,
        })
    }
}

/// Read a secret from the environment
pub fn secret(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(Error::Config(format!("{name} env variable not found"))),
    }
}
