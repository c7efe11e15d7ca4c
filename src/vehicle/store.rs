use super::{
    AudioSource, DoorPosition, DynamicsUpdate, GearSelector, Ignition, VehicleState, IDLE_RPM,
    MAX_GEAR, MAX_PEDAL_PERCENT, MAX_SIMULATION_SPEED, MAX_VOLUME, MIN_GEAR,
    MIN_SIMULATION_SPEED, REDLINE_RPM,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Real-time delay between turning the key to START and the engine catching.
/// Deliberately not scaled by simulation speed.
pub const ENGINE_START_DELAY_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Control {
    Accelerator,
    Brake,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Light {
    Headlights,
    HighBeams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnSignal {
    Left,
    Right,
    Hazards,
    Off,
}

/// Closed set of operations that mutate [`VehicleState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum VehicleCommand {
    SetIgnition { mode: Ignition },
    StartEngine,
    StopEngine,
    SetGearSelector { gear: GearSelector },
    SetControl { control: Control, value: i32 },
    ToggleLight { light: Light },
    SetTurnSignal { signal: TurnSignal },
    SetSimulationSpeed { factor: f64 },
    SetInfotainment {
        #[serde(default)]
        volume: Option<i32>,
        #[serde(default)]
        source: Option<AudioSource>,
    },
    ToggleDoor { door: DoorPosition },
    // Only the dynamics task issues this; never accepted off the wire
    #[serde(skip)]
    ApplyDynamicsTick(DynamicsUpdate),
    #[serde(other)]
    Unknown,
}

/// Identifies one pending engine start so a stale timer cannot complete a
/// start that was superseded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StartToken(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandEffect {
    Applied,
    /// The command left the state untouched.
    Ignored,
    /// Caller must invoke [`VehicleStore::complete_engine_start`] after
    /// [`ENGINE_START_DELAY_MS`].
    ScheduleEngineStart(StartToken),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub commands_applied: u64,
    pub commands_ignored: u64,
    pub dynamics_commits: u64,
    pub engine_starts: u64,
}

#[derive(Debug, Default)]
pub struct VehicleStore {
    state: VehicleState,
    pending_start: Option<StartToken>,
    next_start_token: u64,
    stats: StoreStats,
}

impl VehicleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &VehicleState {
        &self.state
    }

    pub fn stats(&self) -> StoreStats {
        self.stats
    }

    pub fn pending_engine_start(&self) -> Option<StartToken> {
        self.pending_start
    }

    pub fn apply(&mut self, command: VehicleCommand) -> CommandEffect {
        let mut effect = CommandEffect::Applied;
        let mut applied = true;

        match command {
            VehicleCommand::SetIgnition { mode } => {
                effect = self.set_ignition(mode);
            }
            VehicleCommand::StartEngine => {
                applied = self.start_engine();
            }
            VehicleCommand::StopEngine => {
                self.stop_engine();
            }
            VehicleCommand::SetGearSelector { gear } => {
                self.state.gear_selector = gear;
                self.state.active_gear = MIN_GEAR;
            }
            VehicleCommand::SetControl { control, value } => {
                let value = value.clamp(0, i32::from(MAX_PEDAL_PERCENT)) as u8;
                match control {
                    Control::Accelerator => self.state.accelerator = value,
                    Control::Brake => self.state.brake = value,
                }
            }
            VehicleCommand::ToggleLight { light } => {
                let lights = &mut self.state.lights;
                match light {
                    Light::Headlights => lights.headlights = !lights.headlights,
                    Light::HighBeams => lights.high_beams = !lights.high_beams,
                }
            }
            VehicleCommand::SetTurnSignal { signal } => {
                self.set_turn_signal(signal);
            }
            VehicleCommand::SetSimulationSpeed { factor } => {
                if factor.is_finite() {
                    self.state.simulation_speed =
                        factor.clamp(MIN_SIMULATION_SPEED, MAX_SIMULATION_SPEED);
                } else {
                    applied = false;
                }
            }
            VehicleCommand::SetInfotainment { volume, source } => {
                if let Some(volume) = volume {
                    self.state.infotainment.volume = volume.clamp(0, i32::from(MAX_VOLUME)) as u8;
                }
                if let Some(source) = source {
                    self.state.infotainment.source = source;
                }
            }
            VehicleCommand::ToggleDoor { door } => {
                self.state.doors.toggle(door);
            }
            VehicleCommand::ApplyDynamicsTick(update) => {
                applied = self.apply_dynamics(update);
            }
            VehicleCommand::Unknown => {
                applied = false;
            }
        }

        if applied {
            self.stats.commands_applied += 1;
            self.normalize();
        } else {
            self.stats.commands_ignored += 1;
            effect = CommandEffect::Ignored;
            debug!("vehicle command ignored");
        }

        debug_assert!(
            self.state.check_invariants().is_ok(),
            "vehicle state invariant broken: {:?}",
            self.state.check_invariants()
        );

        effect
    }

    /// Finishes a START transition once its delay has elapsed. Returns false
    /// if `token` no longer names the pending start.
    pub fn complete_engine_start(&mut self, token: StartToken) -> bool {
        if self.pending_start != Some(token) {
            return false;
        }
        self.pending_start = None;

        if !self.state.engine_running {
            self.state.engine_running = true;
            self.state.rpm = IDLE_RPM;
        }
        self.state.ignition = Ignition::On;
        self.stats.engine_starts += 1;
        info!("engine started");
        true
    }

    fn set_ignition(&mut self, mode: Ignition) -> CommandEffect {
        self.state.ignition = mode;

        if mode == Ignition::Start {
            let token = StartToken(self.next_start_token);
            self.next_start_token = self.next_start_token.wrapping_add(1);
            self.pending_start = Some(token);
            debug!(?token, "engine start scheduled");
            return CommandEffect::ScheduleEngineStart(token);
        }

        self.pending_start = None;
        match mode {
            Ignition::Off => self.stop_engine(),
            // ACC cuts the engine but leaves rpm and speed where they were
            Ignition::Acc if self.state.engine_running => {
                self.state.engine_running = false;
                info!("engine stopped");
            }
            _ => {}
        }
        CommandEffect::Applied
    }

    fn start_engine(&mut self) -> bool {
        if self.state.engine_running || !self.state.ignition.powers_engine() {
            return false;
        }
        self.state.engine_running = true;
        self.state.rpm = IDLE_RPM;
        self.stats.engine_starts += 1;
        info!("engine started");
        true
    }

    fn stop_engine(&mut self) {
        if self.state.engine_running {
            info!("engine stopped");
        }
        self.state.engine_running = false;
        self.state.rpm = 0.0;
        self.state.speed_kmh = 0.0;
    }

    fn set_turn_signal(&mut self, signal: TurnSignal) {
        let lights = &mut self.state.lights;
        match signal {
            TurnSignal::Off => {
                lights.left_turn = false;
                lights.right_turn = false;
                lights.hazards = false;
            }
            TurnSignal::Hazards => {
                lights.hazards = !lights.hazards;
                lights.left_turn = false;
                lights.right_turn = false;
            }
            TurnSignal::Left => {
                lights.left_turn = !lights.left_turn;
                lights.right_turn = false;
                lights.hazards = false;
            }
            TurnSignal::Right => {
                lights.right_turn = !lights.right_turn;
                lights.left_turn = false;
                lights.hazards = false;
            }
        }
    }

    fn apply_dynamics(&mut self, update: DynamicsUpdate) -> bool {
        // A tick computed before the engine stopped must not revive it
        if !self.state.engine_running {
            return false;
        }
        self.state.rpm = if update.rpm.is_finite() { update.rpm } else { IDLE_RPM };
        self.state.speed_kmh = if update.speed_kmh.is_finite() { update.speed_kmh } else { 0.0 };
        self.state.active_gear = update.active_gear.clamp(MIN_GEAR, MAX_GEAR);
        self.stats.dynamics_commits += 1;
        true
    }

    fn normalize(&mut self) {
        let state = &mut self.state;
        state.rpm = state.rpm.clamp(0.0, REDLINE_RPM);
        if state.engine_running && state.gear_selector.is_engaged() {
            state.rpm = state.rpm.max(IDLE_RPM);
        }
        state.speed_kmh = state.speed_kmh.max(0.0);
    }
}
