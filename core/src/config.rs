//! Client configuration: request timeout and default headers.
//!
//! # Design
//! A `Client` owns its `Config` behind a lock and hands out clones, so a
//! request is always built from one consistent snapshot even while another
//! thread is updating the defaults.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::http::Headers;

/// Environment variable overriding the default timeout, in whole seconds.
pub const TIMEOUT_ENV: &str = "COURIER_TIMEOUT_SECS";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Defaults applied to every request a client builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub timeout: Duration,
    pub headers: Headers,
}

impl Default for Config {
    fn default() -> Self {
        let mut headers = Headers::new();
        headers.append("Accept", "application/json");
        Self {
            timeout: DEFAULT_TIMEOUT,
            headers,
        }
    }
}

impl Config {
    /// Defaults, with the timeout taken from `COURIER_TIMEOUT_SECS` when it
    /// holds a valid number of seconds.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(secs) = std::env::var(TIMEOUT_ENV)
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            config.timeout = Duration::from_secs(secs);
        }
        config
    }
}

/// Shared, lock-guarded configuration.
#[derive(Debug, Clone, Default)]
pub(crate) struct SharedConfig(Arc<RwLock<Config>>);

impl SharedConfig {
    pub(crate) fn new(config: Config) -> Self {
        Self(Arc::new(RwLock::new(config)))
    }

    pub(crate) fn snapshot(&self) -> Config {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut Config)) {
        let mut guard = self.0.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard);
    }
}
