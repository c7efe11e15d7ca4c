use crate::error::BusError;
use crate::frame_log::FRAME_LOG_CAPACITY;
use crate::vehicle::dynamics::DYNAMICS_PERIOD_MS;
use crate::vehicle::store::ENGINE_START_DELAY_MS;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

pub const DEFAULT_TCP_PORT: u16 = 8080;

const POWERTRAIN_PERIOD_MS: u64 = 50;
const BODY_PERIOD_MS: u64 = 500;
const INFOTAINMENT_PERIOD_MS: u64 = 1000;
const SNAPSHOT_INTERVAL_MS: u64 = 100;

/// Runtime tuning for the bus. Every field falls back to its default when
/// missing from a config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub dynamics_period_ms: u64,
    pub powertrain_period_ms: u64,
    pub body_period_ms: u64,
    pub infotainment_period_ms: u64,
    pub engine_start_delay_ms: u64,
    pub snapshot_interval_ms: u64,
    pub frame_log_capacity: usize,
    pub tcp_port: u16,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            dynamics_period_ms: DYNAMICS_PERIOD_MS,
            powertrain_period_ms: POWERTRAIN_PERIOD_MS,
            body_period_ms: BODY_PERIOD_MS,
            infotainment_period_ms: INFOTAINMENT_PERIOD_MS,
            engine_start_delay_ms: ENGINE_START_DELAY_MS,
            snapshot_interval_ms: SNAPSHOT_INTERVAL_MS,
            frame_log_capacity: FRAME_LOG_CAPACITY,
            tcp_port: DEFAULT_TCP_PORT,
        }
    }
}

impl SimulationConfig {
    pub fn from_json_str(json: &str) -> Result<Self, BusError> {
        let config: SimulationConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, BusError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading simulation config");
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), BusError> {
        let periods = [
            self.dynamics_period_ms,
            self.powertrain_period_ms,
            self.body_period_ms,
            self.infotainment_period_ms,
            self.snapshot_interval_ms,
        ];
        if periods.contains(&0) {
            return Err(BusError::InvalidConfig("task periods must be non-zero"));
        }
        if self.frame_log_capacity == 0 || self.frame_log_capacity > FRAME_LOG_CAPACITY {
            return Err(BusError::InvalidConfig(
                "frame log capacity must be between 1 and 1000",
            ));
        }
        Ok(())
    }
}
