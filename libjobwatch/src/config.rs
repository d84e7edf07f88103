//! Tunables for an [`EventAggregator`](crate::aggregate::EventAggregator).
//! Every field has a default, so an empty config file is a valid one.

use std::path::Path;
use std::time::Duration;

use color_eyre::eyre::{Result, WrapErr};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;

use crate::log::*;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("`{0}` must be greater than zero.")]
    MustBePositive(&'static str),
}

/// Which end of a batch gets digested first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrainOrder {
    /// Arrival order.
    #[default]
    Oldest,
    /// Most recent arrival first, for feeds that deliver batches newest-last
    /// but want the latest state rendered first.
    Newest,
}

pub fn default_max_rows() -> usize {
    200
}

pub fn default_drain_interval_ms() -> u64 {
    300
}

#[derive(Getters, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Host results kept for the active task.
    #[serde(default = "self::default_max_rows")]
    host_results_max_rows: usize,
    /// Hosts kept in the job-wide host summary list.
    #[serde(default = "self::default_max_rows")]
    host_summaries_max_rows: usize,
    /// Tasks rendered for the active play.
    #[serde(default = "self::default_max_rows")]
    tasks_max_rows: usize,
    /// Plays rendered.
    #[serde(default = "self::default_max_rows")]
    plays_max_rows: usize,
    #[serde(default = "self::default_drain_interval_ms")]
    drain_interval_ms: u64,
    #[serde(default)]
    drain_order: DrainOrder,
}

impl AggregatorConfig {
    pub fn with_max_rows(mut self, rows: usize) -> Self {
        self.host_results_max_rows = rows;
        self.host_summaries_max_rows = rows;
        self.tasks_max_rows = rows;
        self.plays_max_rows = rows;
        self
    }

    pub fn with_drain_interval_ms(mut self, drain_interval_ms: u64) -> Self {
        self.drain_interval_ms = drain_interval_ms;
        self
    }

    pub fn with_drain_order(mut self, drain_order: DrainOrder) -> Self {
        self.drain_order = drain_order;
        self
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }

    /// Reject configs that would make the aggregator keep nothing or spin.
    pub fn validate(self) -> std::result::Result<Self, ConfigError> {
        let rows = [
            ("host_results_max_rows", self.host_results_max_rows),
            ("host_summaries_max_rows", self.host_summaries_max_rows),
            ("tasks_max_rows", self.tasks_max_rows),
            ("plays_max_rows", self.plays_max_rows),
        ];
        if let Some((name, _)) = rows.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::MustBePositive(name));
        }
        if self.drain_interval_ms == 0 {
            return Err(ConfigError::MustBePositive("drain_interval_ms"));
        }
        Ok(self)
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            host_results_max_rows: default_max_rows(),
            host_summaries_max_rows: default_max_rows(),
            tasks_max_rows: default_max_rows(),
            plays_max_rows: default_max_rows(),
            drain_interval_ms: default_drain_interval_ms(),
            drain_order: DrainOrder::default(),
        }
    }
}

/// Read, deserialize and validate a YAML config file.
#[tracing::instrument]
pub async fn load_config<P: AsRef<Path> + std::fmt::Debug>(path: P) -> Result<AggregatorConfig> {
    let raw = fs::read_to_string(path.as_ref())
        .await
        .wrap_err_with(|| format!("Failed reading config file {}", path.as_ref().display()))?;
    let config: AggregatorConfig =
        serde_yaml::from_str(raw.as_str()).wrap_err("deserializing aggregator config")?;
    let config = config.validate()?;
    debug!("loaded config: {:?}", config);
    Ok(config)
}
