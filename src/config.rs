use std::{collections::HashMap, fs, path::Path};

use serde::Deserialize;

use crate::{Result, RuleflowError};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// tracker config
    #[serde(default)]
    pub tracker: TrackerConfig,
    /// store config
    #[serde(default)]
    pub store: StoreConfig,
    /// variables for `{{$NAME$}}` placeholders
    #[serde(default)]
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// number of async worker threads, range [1, 32768), defaults to 16
    pub async_worker_thread_number: u16,
    /// delay before a retry attempt when the rule sets none, in milliseconds
    pub retry_interval_ms: u64,
    /// events and log lines kept per rule, the oldest are pruned when a run completes
    pub history_limit: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            async_worker_thread_number: 16,
            retry_interval_ms: 0,
            history_limit: 1000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    /// store type
    #[serde(default)]
    pub store_type: StoreType,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    #[default]
    Mem,
}

impl Config {
    pub fn create<T: AsRef<Path>>(path: T) -> Result<Self> {
        let data = fs::read_to_string(path.as_ref()).map_err(|err| RuleflowError::Config(format!("failed to load config file {:?}: {}", path.as_ref(), err)))?;

        Self::load_from_str(data.as_str())
    }

    pub fn load_from_str(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str::<Config>(toml_str)?)
    }
}
