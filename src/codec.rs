//! Frame codec: maps logical vehicle signals to 8-byte bus frames and back.
//!
//! Every broadcast frame carries one signal in its first bytes; the rest of
//! the payload is zero filled. Decoding is the exact inverse for the eight
//! broadcast signals. Other identifiers in the catalogue are known by name
//! only, and anything outside it decodes as [`Decoded::Unrecognized`].

use crate::error::CodecError;
use crate::vehicle::{AudioSource, DoorPosition, Doors, GearSelector};
use core::fmt;
use heapless::Vec;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use static_assertions::{const_assert, const_assert_eq};

pub const MAX_DLC: usize = 8;
pub const MAX_CAN_ID: u16 = 0x7FF;

const_assert_eq!(MAX_DLC, 8);
const_assert!(MAX_CAN_ID as u32 == (1 << 11) - 1);

pub type Payload = Vec<u8, MAX_DLC>;

/// 11-bit standard frame identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct CanId(u16);

impl CanId {
    pub const ENGINE_RPM: CanId = CanId(0x180);
    pub const THROTTLE_POSITION: CanId = CanId(0x182);
    pub const STEERING_ANGLE: CanId = CanId(0x190);
    pub const GEAR_STATUS: CanId = CanId(0x192);
    pub const VEHICLE_SPEED: CanId = CanId(0x200);
    pub const BRAKE_PRESSURE: CanId = CanId(0x202);
    pub const TURN_SIGNALS: CanId = CanId(0x300);
    pub const LIGHTS_STATUS: CanId = CanId(0x302);
    pub const DOOR_STATUS: CanId = CanId(0x400);
    pub const FUEL_LEVEL: CanId = CanId(0x500);
    pub const BATTERY_VOLTAGE: CanId = CanId(0x502);
    pub const INFOTAINMENT_STATUS: CanId = CanId(0x550);
    pub const ODOMETER: CanId = CanId(0x600);

    pub const fn new(raw: u16) -> Option<Self> {
        if raw <= MAX_CAN_ID {
            Some(CanId(raw))
        } else {
            None
        }
    }

    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Catalogue name, or `UNKNOWN` for identifiers outside it.
    pub fn name(self) -> &'static str {
        match self {
            CanId::ENGINE_RPM => "ENGINE_RPM",
            CanId::THROTTLE_POSITION => "THROTTLE_POSITION",
            CanId::STEERING_ANGLE => "STEERING_ANGLE",
            CanId::GEAR_STATUS => "GEAR_STATUS",
            CanId::VEHICLE_SPEED => "VEHICLE_SPEED",
            CanId::BRAKE_PRESSURE => "BRAKE_PRESSURE",
            CanId::TURN_SIGNALS => "TURN_SIGNALS",
            CanId::LIGHTS_STATUS => "LIGHTS_STATUS",
            CanId::DOOR_STATUS => "DOOR_STATUS",
            CanId::FUEL_LEVEL => "FUEL_LEVEL",
            CanId::BATTERY_VOLTAGE => "BATTERY_VOLTAGE",
            CanId::INFOTAINMENT_STATUS => "INFOTAINMENT_STATUS",
            CanId::ODOMETER => "ODOMETER",
            _ => "UNKNOWN",
        }
    }

    pub fn system(self) -> System {
        match self.0 {
            0x100..=0x1FF => System::Powertrain,
            0x200..=0x2FF => System::Chassis,
            0x300..=0x4FF => System::Body,
            0x500..=0x5FF => System::Infotainment,
            _ => System::Adas,
        }
    }
}

impl TryFrom<u16> for CanId {
    type Error = CodecError;

    fn try_from(raw: u16) -> Result<Self, Self::Error> {
        CanId::new(raw).ok_or(CodecError::InvalidIdentifier(raw))
    }
}

impl From<CanId> for u16 {
    fn from(id: CanId) -> u16 {
        id.0
    }
}

impl fmt::Display for CanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:03X}", self.0)
    }
}

/// ECU domain an identifier belongs to, by identifier range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum System {
    Powertrain,
    Chassis,
    Body,
    Infotainment,
    Adas,
}

impl System {
    pub fn as_str(self) -> &'static str {
        match self {
            System::Powertrain => "POWERTRAIN",
            System::Chassis => "CHASSIS",
            System::Body => "BODY",
            System::Infotainment => "INFOTAINMENT",
            System::Adas => "ADAS",
        }
    }
}

/// A single bus frame. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    id: CanId,
    timestamp_ms: u64,
    #[serde(serialize_with = "serialize_payload", deserialize_with = "deserialize_payload")]
    payload: Payload,
}

impl Frame {
    pub fn new(id: CanId, timestamp_ms: u64, data: &[u8]) -> Result<Self, CodecError> {
        let payload = Payload::from_slice(data).map_err(|()| CodecError::PayloadTooLong(data.len()))?;
        Ok(Self {
            id,
            timestamp_ms,
            payload,
        })
    }

    /// Full-length frame; `data` beyond eight bytes is cut, missing bytes are zero.
    pub fn padded(id: CanId, timestamp_ms: u64, data: &[u8]) -> Self {
        let mut bytes = [0u8; MAX_DLC];
        let used = data.len().min(MAX_DLC);
        bytes[..used].copy_from_slice(&data[..used]);
        Self {
            id,
            timestamp_ms,
            payload: Payload::from_iter(bytes),
        }
    }

    pub fn id(&self) -> CanId {
        self.id
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    /// Data length code.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

fn serialize_payload<S: Serializer>(payload: &Payload, serializer: S) -> Result<S::Ok, S::Error> {
    serde_bytes::serialize(payload.as_slice(), serializer)
}

fn deserialize_payload<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Payload, D::Error> {
    let bytes = serde_bytes::ByteBuf::deserialize(deserializer)?;
    Payload::from_slice(&bytes)
        .map_err(|()| D::Error::custom(CodecError::PayloadTooLong(bytes.len())))
}

/// A logical signal value, as carried by one broadcast frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    EngineSpeed { rpm: u16 },
    /// Hundredths of km/h.
    VehicleSpeed { centi_kmh: u16 },
    ThrottlePosition { percent: u8 },
    GearStatus { selector: GearSelector, active_gear: u8 },
    DoorStatus { doors: Doors },
    LightsStatus { headlights: bool, high_beams: bool },
    TurnSignals { left: bool, right: bool, hazards: bool },
    InfotainmentStatus { volume: u8, source: AudioSource },
}

impl Signal {
    /// Whole rpm, fractional part dropped.
    pub fn engine_speed(rpm: f64) -> Self {
        Signal::EngineSpeed {
            rpm: saturate_u16(rpm.floor()),
        }
    }

    /// Quantizes to hundredths of km/h, dropping anything finer.
    pub fn vehicle_speed(kmh: f64) -> Self {
        Signal::VehicleSpeed {
            centi_kmh: saturate_u16((kmh * 100.0).floor()),
        }
    }

    pub fn id(&self) -> CanId {
        match self {
            Signal::EngineSpeed { .. } => CanId::ENGINE_RPM,
            Signal::VehicleSpeed { .. } => CanId::VEHICLE_SPEED,
            Signal::ThrottlePosition { .. } => CanId::THROTTLE_POSITION,
            Signal::GearStatus { .. } => CanId::GEAR_STATUS,
            Signal::DoorStatus { .. } => CanId::DOOR_STATUS,
            Signal::LightsStatus { .. } => CanId::LIGHTS_STATUS,
            Signal::TurnSignals { .. } => CanId::TURN_SIGNALS,
            Signal::InfotainmentStatus { .. } => CanId::INFOTAINMENT_STATUS,
        }
    }

    pub fn payload(&self) -> [u8; MAX_DLC] {
        let mut bytes = [0u8; MAX_DLC];
        match *self {
            Signal::EngineSpeed { rpm } => bytes[..2].copy_from_slice(&rpm.to_be_bytes()),
            Signal::VehicleSpeed { centi_kmh } => {
                bytes[..2].copy_from_slice(&centi_kmh.to_be_bytes());
            }
            Signal::ThrottlePosition { percent } => bytes[0] = percent,
            Signal::GearStatus {
                selector,
                active_gear,
            } => {
                bytes[0] = selector.wire_index();
                bytes[1] = active_gear;
            }
            Signal::DoorStatus { doors } => {
                bytes[0] = doors.open_doors().fold(0, |mask, door| mask | door.mask());
            }
            Signal::LightsStatus {
                headlights,
                high_beams,
            } => {
                bytes[0] = u8::from(headlights) | u8::from(high_beams) << 1;
            }
            Signal::TurnSignals {
                left,
                right,
                hazards,
            } => {
                bytes[0] = u8::from(left) | u8::from(right) << 1 | u8::from(hazards) << 2;
            }
            Signal::InfotainmentStatus { volume, source } => {
                bytes[0] = volume;
                bytes[1] = source.wire_index();
            }
        }
        bytes
    }

    pub fn encode(&self, timestamp_ms: u64) -> Frame {
        Frame {
            id: self.id(),
            timestamp_ms,
            payload: Payload::from_iter(self.payload()),
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Signal::EngineSpeed { rpm } => write!(f, "RPM: {rpm}"),
            Signal::VehicleSpeed { centi_kmh } => {
                write!(f, "Speed: {:.2} km/h", f64::from(centi_kmh) / 100.0)
            }
            Signal::ThrottlePosition { percent } => write!(f, "Throttle: {percent}%"),
            Signal::GearStatus {
                selector,
                active_gear,
            } => write!(f, "Gear: {} ({active_gear})", selector.as_str()),
            Signal::DoorStatus { doors } => {
                let open: std::vec::Vec<&str> = doors.open_doors().map(DoorPosition::label).collect();
                write_list(f, "Doors Open", &open, "None")
            }
            Signal::LightsStatus {
                headlights,
                high_beams,
            } => {
                let mut on = std::vec::Vec::new();
                if headlights {
                    on.push("Headlights");
                }
                if high_beams {
                    on.push("High Beams");
                }
                write_list(f, "Lights", &on, "Off")
            }
            Signal::TurnSignals {
                left,
                right,
                hazards,
            } => {
                let mut on = std::vec::Vec::new();
                if left {
                    on.push("Left");
                }
                if right {
                    on.push("Right");
                }
                if hazards {
                    on.push("Hazards");
                }
                write_list(f, "Signal", &on, "Off")
            }
            Signal::InfotainmentStatus { volume, source } => {
                write!(f, "Vol: {volume} | Src: {}", source.as_str())
            }
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, label: &str, items: &[&str], empty: &str) -> fmt::Result {
    if items.is_empty() {
        write!(f, "{label}: {empty}")
    } else {
        write!(f, "{label}: {}", items.join(", "))
    }
}

fn saturate_u16(value: f64) -> u16 {
    if value.is_nan() || value <= 0.0 {
        0
    } else if value >= f64::from(u16::MAX) {
        u16::MAX
    } else {
        value as u16
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    Signal(Signal),
    /// Known identifier whose payload is too short or carries an undefined enum index.
    Malformed,
    Unrecognized,
}

pub fn decode(frame: &Frame) -> Decoded {
    let data = frame.payload();
    let byte = |index: usize| data.get(index).copied();
    let word = || Some(u16::from_be_bytes([byte(0)?, byte(1)?]));

    let signal = match frame.id() {
        CanId::ENGINE_RPM => word().map(|rpm| Signal::EngineSpeed { rpm }),
        CanId::VEHICLE_SPEED => word().map(|centi_kmh| Signal::VehicleSpeed { centi_kmh }),
        CanId::THROTTLE_POSITION => byte(0).map(|percent| Signal::ThrottlePosition { percent }),
        CanId::GEAR_STATUS => byte(0)
            .and_then(GearSelector::from_wire_index)
            .zip(byte(1))
            .map(|(selector, active_gear)| Signal::GearStatus {
                selector,
                active_gear,
            }),
        CanId::DOOR_STATUS => byte(0).map(|mask| {
            let mut doors = Doors::default();
            for door in DoorPosition::ALL {
                if mask & door.mask() != 0 {
                    doors.toggle(door);
                }
            }
            Signal::DoorStatus { doors }
        }),
        CanId::LIGHTS_STATUS => byte(0).map(|mask| Signal::LightsStatus {
            headlights: mask & 0x01 != 0,
            high_beams: mask & 0x02 != 0,
        }),
        CanId::TURN_SIGNALS => byte(0).map(|mask| Signal::TurnSignals {
            left: mask & 0x01 != 0,
            right: mask & 0x02 != 0,
            hazards: mask & 0x04 != 0,
        }),
        CanId::INFOTAINMENT_STATUS => byte(0)
            .zip(byte(1).and_then(AudioSource::from_wire_index))
            .map(|(volume, source)| Signal::InfotainmentStatus { volume, source }),
        _ => return Decoded::Unrecognized,
    };

    signal.map_or(Decoded::Malformed, Decoded::Signal)
}

/// Uppercase hex pairs separated by single spaces, e.g. `0B B8 00 00`.
pub fn format_payload(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 3);
    for (index, byte) in data.iter().enumerate() {
        if index > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{byte:02X}"));
    }
    out
}

/// Human-readable rendering of one frame for log consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDescription {
    pub id: CanId,
    pub timestamp_ms: u64,
    pub name: String,
    pub system: System,
    pub data: String,
    pub detail: Option<String>,
}

pub fn describe(frame: &Frame) -> FrameDescription {
    let detail = match decode(frame) {
        Decoded::Signal(signal) => Some(signal.to_string()),
        Decoded::Malformed | Decoded::Unrecognized => None,
    };

    FrameDescription {
        id: frame.id(),
        timestamp_ms: frame.timestamp_ms(),
        name: frame.id().name().to_string(),
        system: frame.id().system(),
        data: format_payload(frame.payload()),
        detail,
    }
}
