pub mod dynamics;
pub mod store;

pub use dynamics::{DynamicsSimulator, DynamicsUpdate};
pub use store::{CommandEffect, StartToken, StoreStats, VehicleStore};

use serde::{Deserialize, Serialize};

pub const IDLE_RPM: f64 = 800.0;
pub const REDLINE_RPM: f64 = 7000.0;
pub const MIN_GEAR: u8 = 1;
pub const MAX_GEAR: u8 = 6;
pub const MAX_PEDAL_PERCENT: u8 = 100;
pub const MAX_VOLUME: u8 = 30;
pub const MIN_SIMULATION_SPEED: f64 = 0.1;
pub const MAX_SIMULATION_SPEED: f64 = 2.0;

const DEFAULT_VOLUME: u8 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Ignition {
    Off,
    Acc,
    On,
    Start,
}

impl Ignition {
    /// Ignition positions in which the engine is allowed to run.
    pub fn powers_engine(self) -> bool {
        matches!(self, Ignition::On | Ignition::Start)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GearSelector {
    P,
    R,
    N,
    D,
}

impl GearSelector {
    /// Index carried on the wire in the gear status frame.
    pub fn wire_index(self) -> u8 {
        match self {
            GearSelector::P => 0,
            GearSelector::R => 1,
            GearSelector::N => 2,
            GearSelector::D => 3,
        }
    }

    pub fn from_wire_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(GearSelector::P),
            1 => Some(GearSelector::R),
            2 => Some(GearSelector::N),
            3 => Some(GearSelector::D),
            _ => None,
        }
    }

    /// True for selector positions that couple the engine to the wheels.
    pub fn is_engaged(self) -> bool {
        matches!(self, GearSelector::R | GearSelector::D)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GearSelector::P => "P",
            GearSelector::R => "R",
            GearSelector::N => "N",
            GearSelector::D => "D",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AudioSource {
    Fm,
    Bt,
    Aux,
}

impl AudioSource {
    pub fn wire_index(self) -> u8 {
        match self {
            AudioSource::Fm => 0,
            AudioSource::Bt => 1,
            AudioSource::Aux => 2,
        }
    }

    pub fn from_wire_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(AudioSource::Fm),
            1 => Some(AudioSource::Bt),
            2 => Some(AudioSource::Aux),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AudioSource::Fm => "FM",
            AudioSource::Bt => "BT",
            AudioSource::Aux => "AUX",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoorPosition {
    Fl,
    Fr,
    Rl,
    Rr,
}

impl DoorPosition {
    pub const ALL: [DoorPosition; 4] = [
        DoorPosition::Fl,
        DoorPosition::Fr,
        DoorPosition::Rl,
        DoorPosition::Rr,
    ];

    /// Bit carried in the door status frame.
    pub fn mask(self) -> u8 {
        match self {
            DoorPosition::Fl => 0x01,
            DoorPosition::Fr => 0x02,
            DoorPosition::Rl => 0x04,
            DoorPosition::Rr => 0x08,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DoorPosition::Fl => "FL",
            DoorPosition::Fr => "FR",
            DoorPosition::Rl => "RL",
            DoorPosition::Rr => "RR",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lights {
    pub headlights: bool,
    pub high_beams: bool,
    pub left_turn: bool,
    pub right_turn: bool,
    pub hazards: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Doors {
    pub fl: bool,
    pub fr: bool,
    pub rl: bool,
    pub rr: bool,
}

impl Doors {
    pub fn is_open(&self, door: DoorPosition) -> bool {
        match door {
            DoorPosition::Fl => self.fl,
            DoorPosition::Fr => self.fr,
            DoorPosition::Rl => self.rl,
            DoorPosition::Rr => self.rr,
        }
    }

    pub fn toggle(&mut self, door: DoorPosition) {
        let flag = match door {
            DoorPosition::Fl => &mut self.fl,
            DoorPosition::Fr => &mut self.fr,
            DoorPosition::Rl => &mut self.rl,
            DoorPosition::Rr => &mut self.rr,
        };
        *flag = !*flag;
    }

    pub fn open_doors(&self) -> impl Iterator<Item = DoorPosition> + '_ {
        DoorPosition::ALL.into_iter().filter(|door| self.is_open(*door))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Infotainment {
    pub volume: u8,
    pub source: AudioSource,
}

impl Default for Infotainment {
    fn default() -> Self {
        Self {
            volume: DEFAULT_VOLUME,
            source: AudioSource::Fm,
        }
    }
}

/// The single authoritative snapshot of the simulated vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    pub ignition: Ignition,
    pub engine_running: bool,
    pub rpm: f64,
    pub speed_kmh: f64,
    pub gear_selector: GearSelector,
    pub active_gear: u8,
    pub accelerator: u8,
    pub brake: u8,
    pub simulation_speed: f64,
    pub lights: Lights,
    pub doors: Doors,
    pub infotainment: Infotainment,
}

impl Default for VehicleState {
    fn default() -> Self {
        Self {
            ignition: Ignition::Off,
            engine_running: false,
            rpm: 0.0,
            speed_kmh: 0.0,
            gear_selector: GearSelector::P,
            active_gear: MIN_GEAR,
            accelerator: 0,
            brake: 0,
            simulation_speed: 1.0,
            lights: Lights::default(),
            doors: Doors::default(),
            infotainment: Infotainment::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvariantViolation {
    ActiveGearOutOfRange,
    RpmOutOfRange,
    RpmBelowIdleInGear,
    NegativeSpeed,
    PedalOutOfRange,
    SimulationSpeedOutOfRange,
    VolumeOutOfRange,
    TurnSignalConflict,
    EngineRunningWithoutIgnition,
}

impl VehicleState {
    /// Returns the first invariant this state breaks, if any.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if !(MIN_GEAR..=MAX_GEAR).contains(&self.active_gear) {
            return Err(InvariantViolation::ActiveGearOutOfRange);
        }
        if !(0.0..=REDLINE_RPM).contains(&self.rpm) {
            return Err(InvariantViolation::RpmOutOfRange);
        }
        if self.engine_running && self.gear_selector.is_engaged() && self.rpm < IDLE_RPM {
            return Err(InvariantViolation::RpmBelowIdleInGear);
        }
        if self.speed_kmh.is_nan() || self.speed_kmh < 0.0 {
            return Err(InvariantViolation::NegativeSpeed);
        }
        if self.accelerator > MAX_PEDAL_PERCENT || self.brake > MAX_PEDAL_PERCENT {
            return Err(InvariantViolation::PedalOutOfRange);
        }
        if !(MIN_SIMULATION_SPEED..=MAX_SIMULATION_SPEED).contains(&self.simulation_speed) {
            return Err(InvariantViolation::SimulationSpeedOutOfRange);
        }
        if self.infotainment.volume > MAX_VOLUME {
            return Err(InvariantViolation::VolumeOutOfRange);
        }
        let active_signals = [self.lights.left_turn, self.lights.right_turn, self.lights.hazards]
            .iter()
            .filter(|on| **on)
            .count();
        if active_signals > 1 {
            return Err(InvariantViolation::TurnSignalConflict);
        }
        if self.engine_running && !self.ignition.powers_engine() {
            return Err(InvariantViolation::EngineRunningWithoutIgnition);
        }
        Ok(())
    }

    /// Dashboard warning lamp: ignition on but engine not turning.
    pub fn check_engine_lamp(&self) -> bool {
        self.ignition != Ignition::Off && !self.engine_running
    }
}
