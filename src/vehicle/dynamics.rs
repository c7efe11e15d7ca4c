use super::{GearSelector, VehicleState, IDLE_RPM, MAX_GEAR, MIN_GEAR, REDLINE_RPM};
use serde::{Deserialize, Serialize};

/// Real-time period between integration steps. Simulation speed scales the
/// size of each step, never this period.
pub const DYNAMICS_PERIOD_MS: u64 = 50;

// Index 0 is neutral, 1..=6 are the forward gears
const GEAR_RATIOS: [f64; 7] = [0.0, 3.5, 2.5, 1.8, 1.4, 1.0, 0.8];
const FINAL_DRIVE: f64 = 3.5;

const UPSHIFT_RPM: f64 = 4500.0;
const DOWNSHIFT_RPM: f64 = 1500.0;

const RPM_PER_PEDAL_PERCENT: f64 = 60.0;
const FREE_REV_SMOOTHING: f64 = 0.1;

const TOP_SPEED_CONSTANT: f64 = 300.0;
const SPEED_TO_RPM_CONSTANT: f64 = 25.0;
const ACCELERATION_PER_PEDAL_PERCENT: f64 = 0.02;
const DRAG_PER_TICK: f64 = 0.01;
const BRAKING_PER_PEDAL_PERCENT: f64 = 0.2;

const RPM_COMMIT_EPSILON: f64 = 1.0;
const SPEED_COMMIT_EPSILON: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DynamicsUpdate {
    pub rpm: f64,
    pub speed_kmh: f64,
    pub active_gear: u8,
}

impl DynamicsUpdate {
    fn differs_from(&self, state: &VehicleState) -> bool {
        (self.rpm - state.rpm).abs() > RPM_COMMIT_EPSILON
            || (self.speed_kmh - state.speed_kmh).abs() > SPEED_COMMIT_EPSILON
            || self.active_gear != state.active_gear
    }
}

pub fn gear_ratio(gear: u8) -> f64 {
    GEAR_RATIOS[usize::from(gear.clamp(MIN_GEAR, MAX_GEAR))]
}

/// Gear ratio multiplied through the final drive.
pub fn effective_ratio(gear: u8) -> f64 {
    gear_ratio(gear) * FINAL_DRIVE
}

#[derive(Debug, Default)]
pub struct DynamicsSimulator {
    ticks: u64,
    commits: u64,
}

impl DynamicsSimulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs one tick against `state`. Returns the update to commit, or `None`
    /// when the engine is off or nothing moved past the commit thresholds.
    pub fn step(&mut self, state: &VehicleState) -> Option<DynamicsUpdate> {
        self.ticks += 1;

        if !state.engine_running {
            return None;
        }

        let update = Self::integrate(state);
        if !update.differs_from(state) {
            return None;
        }

        self.commits += 1;
        Some(update)
    }

    /// One integration step with no commit filtering.
    pub fn integrate(state: &VehicleState) -> DynamicsUpdate {
        let sim = state.simulation_speed;
        let accelerator = f64::from(state.accelerator);

        let mut rpm = state.rpm;
        let mut speed = state.speed_kmh;
        let mut gear = state.active_gear.clamp(MIN_GEAR, MAX_GEAR);

        if state.gear_selector == GearSelector::D {
            if rpm > UPSHIFT_RPM && gear < MAX_GEAR {
                let previous = gear;
                gear += 1;
                rpm *= gear_ratio(gear) / gear_ratio(previous);
            } else if rpm < DOWNSHIFT_RPM && gear > MIN_GEAR {
                let previous = gear;
                gear -= 1;
                rpm *= gear_ratio(gear) / gear_ratio(previous);
            }
        }

        if state.gear_selector.is_engaged() {
            // Reverse shares the forward model
            let ratio = effective_ratio(gear);
            let target_speed = accelerator / 100.0 * (TOP_SPEED_CONSTANT / ratio);

            if speed < target_speed {
                speed += accelerator * ACCELERATION_PER_PEDAL_PERCENT * sim / f64::from(gear);
            }
            if state.accelerator == 0 {
                speed *= 1.0 - DRAG_PER_TICK * sim;
            }
            if state.brake > 0 {
                speed -= f64::from(state.brake) * BRAKING_PER_PEDAL_PERCENT * sim;
            }
            speed = speed.max(0.0);

            rpm = (speed * ratio * SPEED_TO_RPM_CONSTANT).max(IDLE_RPM);
        } else {
            let target_rpm = IDLE_RPM + accelerator * RPM_PER_PEDAL_PERCENT;
            rpm += (target_rpm - rpm) * FREE_REV_SMOOTHING * sim;
        }

        DynamicsUpdate {
            rpm: rpm.min(REDLINE_RPM),
            speed_kmh: speed,
            active_gear: gear,
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn commits(&self) -> u64 {
        self.commits
    }
}
