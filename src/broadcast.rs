//! Broadcast groups: which signals each periodic publisher puts on the bus
//! and how often.
//!
//! Every group reads the vehicle state once per iteration and emits a small
//! batch of frames. The delay before the next iteration is recomputed from
//! the simulation speed seen at the start of the current one, so a speed
//! change takes effect on the next publish and never retroactively.

use crate::codec::{Frame, Signal};
use crate::config::SimulationConfig;
use crate::vehicle::{Ignition, VehicleState, MIN_SIMULATION_SPEED};
use heapless::Vec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Largest number of frames any group emits in one iteration.
pub const MAX_BATCH_FRAMES: usize = 4;

pub type FrameBatch = Vec<Frame, MAX_BATCH_FRAMES>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastGroup {
    Powertrain,
    Body,
    Infotainment,
}

impl BroadcastGroup {
    pub const ALL: [BroadcastGroup; 3] = [
        BroadcastGroup::Powertrain,
        BroadcastGroup::Body,
        BroadcastGroup::Infotainment,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BroadcastGroup::Powertrain => "powertrain",
            BroadcastGroup::Body => "body",
            BroadcastGroup::Infotainment => "infotainment",
        }
    }

    /// Publish period at simulation speed 1.0.
    pub fn base_period_ms(self, config: &SimulationConfig) -> u64 {
        match self {
            BroadcastGroup::Powertrain => config.powertrain_period_ms,
            BroadcastGroup::Body => config.body_period_ms,
            BroadcastGroup::Infotainment => config.infotainment_period_ms,
        }
    }

    /// Signals this group would publish for `state`, in emission order.
    pub fn signals(self, state: &VehicleState) -> Vec<Signal, MAX_BATCH_FRAMES> {
        if state.ignition == Ignition::Off {
            return Vec::new();
        }

        match self {
            BroadcastGroup::Powertrain => state
                .engine_running
                .then(|| Signal::engine_speed(state.rpm))
                .into_iter()
                .chain([
                    Signal::vehicle_speed(state.speed_kmh),
                    Signal::ThrottlePosition {
                        percent: state.accelerator,
                    },
                    Signal::GearStatus {
                        selector: state.gear_selector,
                        active_gear: state.active_gear,
                    },
                ])
                .collect(),
            BroadcastGroup::Body => [
                Signal::DoorStatus { doors: state.doors },
                Signal::LightsStatus {
                    headlights: state.lights.headlights,
                    high_beams: state.lights.high_beams,
                },
                Signal::TurnSignals {
                    left: state.lights.left_turn,
                    right: state.lights.right_turn,
                    hazards: state.lights.hazards,
                },
            ]
            .into_iter()
            .collect(),
            BroadcastGroup::Infotainment => [Signal::InfotainmentStatus {
                volume: state.infotainment.volume,
                source: state.infotainment.source,
            }]
            .into_iter()
            .collect(),
        }
    }

    /// Encodes this group's signals into frames stamped with `timestamp_ms`.
    /// Empty while ignition is off.
    pub fn frames(self, state: &VehicleState, timestamp_ms: u64) -> FrameBatch {
        self.signals(state)
            .iter()
            .map(|signal| signal.encode(timestamp_ms))
            .collect()
    }
}

impl core::fmt::Display for BroadcastGroup {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delay until the next publish: base period divided by simulation speed.
pub fn next_delay(base_period_ms: u64, simulation_speed: f64) -> Duration {
    let speed = if simulation_speed.is_finite() {
        simulation_speed.max(MIN_SIMULATION_SPEED)
    } else {
        1.0
    };
    Duration::from_secs_f64(base_period_ms as f64 / 1000.0 / speed)
}
