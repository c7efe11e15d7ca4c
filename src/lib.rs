//! # Vehicle CAN Bus Simulator
//!
//! Simulates the electronic control units of a car sharing a CAN-style bus.
//! A simulated vehicle is advanced over time from driver controls, and three
//! independently clocked broadcasters encode slices of its state into 8-byte
//! frames collected in a bounded, inspectable frame log.
//!
//! ## Features
//!
//! - **Vehicle state store**: ignition, engine, automatic transmission, body
//!   electronics and infotainment driven by a closed command set
//! - **Dynamics**: fixed-period integration of rpm, speed and gear selection
//! - **Frame codec**: 11-bit identifiers, fixed signal layouts, decoding and
//!   human-readable descriptions
//! - **Broadcast scheduling**: powertrain, body and infotainment publishers
//!   paced by the simulation speed
//! - **Frame log**: most-recent-first, bounded, with pause and clear
//!
//! ## Quick Start
//!
//! ```no_run
//! use carbus::{Ignition, SimulationConfig, VehicleBus, VehicleCommand};
//!
//! # async fn demo() -> Result<(), carbus::BusError> {
//! let bus = VehicleBus::start(SimulationConfig::default())?;
//! let handle = bus.handle();
//!
//! handle
//!     .execute(VehicleCommand::SetIgnition { mode: Ignition::Start })
//!     .await;
//!
//! let snapshot = handle.log_snapshot();
//! println!("{} frames logged", snapshot.message_count);
//!
//! bus.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`vehicle`] - State aggregate, command application and dynamics
//! - [`codec`] - Frame identifiers, signal encoding and decoding
//! - [`broadcast`] - What each periodic publisher emits and when
//! - [`frame_log`] - Bounded log of emitted frames
//! - [`bus`] - Async runtime tying the above together
//! - [`protocol`] - Line-delimited JSON protocol used by the daemon

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::trivially_copy_pass_by_ref)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::iter_without_into_iter)]
#![cfg_attr(test, allow(clippy::float_cmp))]

pub mod broadcast;
pub mod bus;
pub mod codec;
pub mod config;
pub mod error;
pub mod frame_log;
pub mod protocol;
pub mod vehicle;

// Re-export main public types for convenience
pub use bus::{BusHandle, VehicleBus};
pub use codec::{CanId, Frame, Signal};
pub use config::SimulationConfig;
pub use error::BusError;
pub use frame_log::{FrameLog, LogSnapshot};
pub use vehicle::store::VehicleCommand;
pub use vehicle::{GearSelector, Ignition, VehicleState, VehicleStore};
