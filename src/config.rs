//! Simulator configuration: defaults, JSON file, then environment overrides.

use crate::bus::DEFAULT_CAPACITY;
use crate::calibration::CalibrationConfig;
use crate::core::sequence::MAX_STEP_DELAY;
use crate::core::{SimError, SimResult};
use crate::generator::GeneratorPlan;
use crate::monitor::{DEFAULT_HISTORY_PER_ID, DEFAULT_RECENT_CAPACITY};
use crate::playback::PlaybackConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Per-subscriber queue depth
    pub bus_capacity: usize,
    pub generator: GeneratorPlan,
    /// Start the traffic generator on construction
    pub autostart_generator: bool,
    pub calibration: CalibrationConfig,
    pub playback: PlaybackConfig,
    pub monitor: MonitorConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub history_per_id: usize,
    pub recent_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            history_per_id: DEFAULT_HISTORY_PER_ID,
            recent_capacity: DEFAULT_RECENT_CAPACITY,
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            bus_capacity: DEFAULT_CAPACITY,
            generator: GeneratorPlan::default(),
            autostart_generator: true,
            calibration: CalibrationConfig::default(),
            playback: PlaybackConfig::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

impl SimulatorConfig {
    /// Load a JSON config file; missing fields keep their defaults
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;
        let config: Self = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse config in {:?}", path))?;
        Ok(config)
    }

    /// Defaults or `path`, then environment overrides, then validation
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        let overrides = config.apply_env_overrides()?;
        if !overrides.is_empty() {
            tracing::info!(?overrides, "configuration overridden from environment");
        }
        config.validate()?;
        Ok(config)
    }

    /// Apply `MESSAGE_RATE`, `GENERATOR_JITTER`, `GENERATOR_SENDERS`,
    /// `GENERATOR_SEED`, `CALIBRATION_WINDOW_SECS` and `BUS_CAPACITY`.
    /// Returns the names of the variables that were applied.
    pub fn apply_env_overrides(&mut self) -> SimResult<Vec<String>> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> SimResult<Vec<String>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut applied = Vec::new();

        if let Some(v) = parse_var(&lookup, "MESSAGE_RATE", &mut applied)? {
            self.generator.rate = v;
        }
        if let Some(v) = parse_var(&lookup, "GENERATOR_JITTER", &mut applied)? {
            self.generator.jitter = v;
        }
        if let Some(v) = parse_var(&lookup, "GENERATOR_SENDERS", &mut applied)? {
            self.generator.sender_count = v;
        }
        if let Some(v) = parse_var(&lookup, "GENERATOR_SEED", &mut applied)? {
            self.generator.seed = v;
        }
        if let Some(v) = parse_var(&lookup, "CALIBRATION_WINDOW_SECS", &mut applied)? {
            self.calibration.window_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "BUS_CAPACITY", &mut applied)? {
            self.bus_capacity = v;
        }

        Ok(applied)
    }

    pub fn validate(&self) -> SimResult<()> {
        self.generator.validate()?;
        if self.bus_capacity == 0 {
            return Err(SimError::InvalidConfig("bus_capacity must be at least 1".into()));
        }
        let window = self.calibration.window_secs;
        if !window.is_finite() || window <= 0.0 || window > MAX_STEP_DELAY {
            return Err(SimError::InvalidConfig(format!(
                "calibration window must be between 0 and {} seconds, got {}",
                MAX_STEP_DELAY, window
            )));
        }
        if self.calibration.max_candidates == 0 {
            return Err(SimError::InvalidConfig("max_candidates must be at least 1".into()));
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str, applied: &mut Vec<String>) -> SimResult<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let value = raw
        .trim()
        .parse()
        .map_err(|_| SimError::InvalidConfig(format!("{} has invalid value {:?}", key, raw)))?;
    applied.push(key.to_string());
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = SimulatorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.calibration.window_secs, 5.0);
        assert_eq!(config.playback.progress_interval_ms, 250);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = SimulatorConfig::default();
        let applied = config
            .apply_overrides_from(lookup(&[("MESSAGE_RATE", "20"), ("BUS_CAPACITY", "64")]))
            .unwrap();

        assert_eq!(applied, vec!["MESSAGE_RATE", "BUS_CAPACITY"]);
        assert_eq!(config.generator.rate, 20.0);
        assert_eq!(config.bus_capacity, 64);
    }

    #[test]
    fn test_bad_env_value_rejected() {
        let mut config = SimulatorConfig::default();
        let err = config
            .apply_overrides_from(lookup(&[("GENERATOR_SENDERS", "many")]))
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidConfig");
    }

    #[test]
    fn test_validation_catches_bad_window() {
        let mut config = SimulatorConfig::default();
        config.calibration.window_secs = 0.0;
        assert!(config.validate().is_err());
        config.calibration.window_secs = 1e20;
        assert!(config.validate().is_err());
    }
}
