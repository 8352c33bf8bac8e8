//! Host-side client for the DYNAMIXEL Protocol 2.0 servo bus.
//!
//! [`Controller`] owns the connection and hands out [`Device`] handles for
//! individual servos; [`Device`] exposes the control-table primitives
//! (ping, read/write, indirect addressing) and the free functions in
//! [`device`] cover the broadcast/group operations (sync read/write, bulk
//! read/write) that don't belong to a single device.

#[macro_use]
mod log;

mod bytestuff;
mod codec;
mod crc;
mod endian;
mod engine;
mod error;
mod indirect;
mod reassembler;

pub mod controller;
pub mod device;
pub mod model;
pub mod registry;
pub mod transport;

pub use codec::{instruction_id, packet_id};
pub use controller::{Config, ConnectionKind, Controller, Event};
pub use device::{ClearKind, Device, FactoryResetKind, PingResponse, Readout};
pub use engine::{CancelHandle, Engine};
pub use error::{
	DeviceError, InvalidChecksum, InvalidHeaderPrefix, InvalidInstruction, InvalidPacketId, InvalidParameterCount, MotorError, ParamTooLarge, ProtocolError,
	ReadError, ShortFrame, TransactionError, TransportError, UsageError, WriteError,
};
pub use registry::{Access, ControlTableItem, ControlTableRegistry};
pub use transport::{Transport, DEFAULT_BAUD_RATE, DEFAULT_HIGH_WATER_MARK};

/// Frame construction/parsing, exposed only so integration tests can play
/// the part of a device without hardware; not part of the supported API.
#[doc(hidden)]
pub mod wire {
	pub use crate::codec::{build_instruction, parse_status, StatusPacket};
}
