use crate::like::{FailureAction, ReconcilePolicy};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const ENV_PREFIX: &str = "HUEPHORIA_";

/// Four posts per row, three rows per page.
pub const DEFAULT_PAGE_SIZE: usize = 12;
pub const DEFAULT_SCROLL_THRESHOLD: f64 = 100.0;
pub const DEFAULT_LIKE_DEBOUNCE_MS: u64 = 600;
pub const DEFAULT_UNKNOWN_AUTHOR: &str = "Unknown";
pub const DEFAULT_RECONCILE_BACKOFF_MS: u64 = 250;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
}

/// Client tuning, read from `HUEPHORIA_`-prefixed environment variables.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Distance from the bottom of the document at which the next page is requested.
    #[serde(default = "default_scroll_threshold")]
    pub scroll_threshold: f64,
    #[serde(default = "default_like_debounce_ms")]
    pub like_debounce_ms: u64,
    /// Shown as the author of posts whose owner has no user document.
    #[serde(default = "default_unknown_author")]
    pub unknown_author: String,
    #[serde(default)]
    pub reconcile_retries: u32,
    #[serde(default = "default_reconcile_backoff_ms")]
    pub reconcile_backoff_ms: u64,
    #[serde(default)]
    pub reconcile_on_failure: FailureAction,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_scroll_threshold() -> f64 {
    DEFAULT_SCROLL_THRESHOLD
}

fn default_like_debounce_ms() -> u64 {
    DEFAULT_LIKE_DEBOUNCE_MS
}

fn default_unknown_author() -> String {
    DEFAULT_UNKNOWN_AUTHOR.to_owned()
}

fn default_reconcile_backoff_ms() -> u64 {
    DEFAULT_RECONCILE_BACKOFF_MS
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            scroll_threshold: DEFAULT_SCROLL_THRESHOLD,
            like_debounce_ms: DEFAULT_LIKE_DEBOUNCE_MS,
            unknown_author: DEFAULT_UNKNOWN_AUTHOR.to_owned(),
            reconcile_retries: 0,
            reconcile_backoff_ms: DEFAULT_RECONCILE_BACKOFF_MS,
            reconcile_on_failure: FailureAction::default(),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(envy::prefixed(ENV_PREFIX).from_env()?)
    }

    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Ok(envy::prefixed(ENV_PREFIX).from_iter(vars)?)
    }

    #[must_use]
    pub fn like_debounce(&self) -> Duration {
        Duration::from_millis(self.like_debounce_ms)
    }

    #[must_use]
    pub fn reconcile_policy(&self) -> ReconcilePolicy {
        ReconcilePolicy {
            retries: self.reconcile_retries,
            backoff: Duration::from_millis(self.reconcile_backoff_ms),
            on_failure: self.reconcile_on_failure,
        }
    }
}

/// Loads `.env` into the process environment if there is one.
pub fn load_dotenv() -> Result<(), ConfigError> {
    if let Err(e) = dotenvy::dotenv() {
        if e.not_found() {
            debug!("No .env file found");
        } else {
            return Err(e.into());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::{
        config::{ClientConfig, DEFAULT_PAGE_SIZE},
        like::FailureAction,
    };
    use std::time::Duration;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn defaults_without_variables() {
        let config = ClientConfig::from_vars(Vec::new()).unwrap();

        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.like_debounce(), Duration::from_millis(600));
        assert_eq!(config.reconcile_policy().on_failure, FailureAction::KeepOptimistic);
    }

    #[test]
    fn prefixed_overrides() {
        let config = ClientConfig::from_vars(vars(&[
            ("HUEPHORIA_PAGE_SIZE", "24"),
            ("HUEPHORIA_LIKE_DEBOUNCE_MS", "250"),
            ("HUEPHORIA_RECONCILE_ON_FAILURE", "rollback"),
            ("HUEPHORIA_RECONCILE_RETRIES", "2"),
            ("PAGE_SIZE", "99"),
        ]))
        .unwrap();

        assert_eq!(config.page_size, 24);
        assert_eq!(config.like_debounce(), Duration::from_millis(250));
        let policy = config.reconcile_policy();
        assert_eq!(policy.on_failure, FailureAction::Rollback);
        assert_eq!(policy.retries, 2);
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(ClientConfig::from_vars(vars(&[("HUEPHORIA_PAGE_SIZE", "many")])).is_err());
    }
}
