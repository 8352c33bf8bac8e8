//! Static control-table registry: maps item names to `(address, width, access)`.
//!
//! This is the union of entries the core operations need, not a full
//! per-model catalog (see SPEC_FULL.md §1, "motor profile catalogs... out of
//! scope"). Addresses match the ROBOTIS X-series Protocol 2.0 control table.

/// Whether an item can only be read, or also written.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Access {
	R,
	RW,
}

/// One entry in a device's control table.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ControlTableItem {
	pub name: &'static str,
	pub address: u16,
	pub width: u8,
	pub access: Access,
}

/// Number of one-byte `INDIRECT_DATA` slots (and matching `INDIRECT_ADDRESS`
/// slots, two bytes each) a device exposes.
pub const MAX_INDIRECT: usize = 20;

/// First address of the `INDIRECT_ADDRESS` window (20 consecutive u16 slots).
pub const INDIRECT_ADDRESS_BASE: u16 = 168;
/// First address of the `INDIRECT_DATA` window (20 consecutive one-byte slots).
pub const INDIRECT_DATA_BASE: u16 = 224;

/// Sentinel value for an unmapped `INDIRECT_ADDRESS` slot.
pub const NO_MAPPING: u16 = 0xFFFF;

pub mod items {
	use super::{Access, ControlTableItem};

	pub const OPERATING_MODE: ControlTableItem = ControlTableItem { name: "OPERATING_MODE", address: 11, width: 1, access: Access::RW };
	pub const TORQUE_ENABLE: ControlTableItem = ControlTableItem { name: "TORQUE_ENABLE", address: 64, width: 1, access: Access::RW };
	pub const LED: ControlTableItem = ControlTableItem { name: "LED", address: 65, width: 1, access: Access::RW };
	pub const GOAL_VELOCITY: ControlTableItem = ControlTableItem { name: "GOAL_VELOCITY", address: 104, width: 4, access: Access::RW };
	pub const GOAL_POSITION: ControlTableItem = ControlTableItem { name: "GOAL_POSITION", address: 116, width: 4, access: Access::RW };
	pub const PRESENT_VELOCITY: ControlTableItem = ControlTableItem { name: "PRESENT_VELOCITY", address: 128, width: 4, access: Access::R };
	pub const PRESENT_POSITION: ControlTableItem = ControlTableItem { name: "PRESENT_POSITION", address: 132, width: 4, access: Access::R };
	pub const PRESENT_INPUT_VOLTAGE: ControlTableItem = ControlTableItem { name: "PRESENT_INPUT_VOLTAGE", address: 144, width: 2, access: Access::R };
	pub const PRESENT_TEMPERATURE: ControlTableItem = ControlTableItem { name: "PRESENT_TEMPERATURE", address: 146, width: 1, access: Access::R };

	pub const ALL: &[ControlTableItem] = &[
		OPERATING_MODE,
		TORQUE_ENABLE,
		LED,
		GOAL_VELOCITY,
		GOAL_POSITION,
		PRESENT_VELOCITY,
		PRESENT_POSITION,
		PRESENT_INPUT_VOLTAGE,
		PRESENT_TEMPERATURE,
	];
}

/// Lookup table consulted by the device façade for address/width/access.
#[derive(Debug, Default, Copy, Clone)]
pub struct ControlTableRegistry;

impl ControlTableRegistry {
	pub fn lookup(&self, name: &str) -> Option<&'static ControlTableItem> {
		items::ALL.iter().find(|item| item.name == name)
	}

	/// The address of the `i`-th `INDIRECT_ADDRESS` slot (`i < MAX_INDIRECT`).
	pub fn indirect_address_slot(i: usize) -> u16 {
		INDIRECT_ADDRESS_BASE + (i as u16) * 2
	}

	/// The address of the `i`-th `INDIRECT_DATA` slot (`i < MAX_INDIRECT`).
	pub fn indirect_data_slot(i: usize) -> u16 {
		INDIRECT_DATA_BASE + i as u16
	}
}
