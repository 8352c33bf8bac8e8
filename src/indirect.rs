//! Indirect addressing: aliasing a contiguous window of slots to a
//! scattered set of named control-table entries. See SPEC_FULL.md §3/§4.5.
//!
//! This module is the pure bookkeeping (layout, offsets, capacity
//! accounting); the wire reads/writes that actually program a device live
//! on [`crate::device::Device`].

use crate::error::UsageError;
use crate::registry::{ControlTableRegistry, MAX_INDIRECT};

/// One item's placement within an indirect block's data window.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct IndirectItem {
	pub name: &'static str,
	/// Byte offset of this item within the block's `INDIRECT_DATA` window.
	pub offset: usize,
	pub width: u8,
}

/// The layout of a block: which items occupy it, and in how many bytes.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct IndirectLayout {
	pub items: Vec<IndirectItem>,
	pub total_size: usize,
}

/// Compute the layout for a list of control-table item names, packed back to
/// back starting at offset 0. Fails with [`UsageError::UnknownItem`] on the
/// first name the registry doesn't recognize.
pub fn layout(names: &[&str], registry: &ControlTableRegistry) -> Result<IndirectLayout, UsageError> {
	let mut items = Vec::with_capacity(names.len());
	let mut offset = 0usize;
	for &name in names {
		let item = registry.lookup(name).ok_or_else(|| UsageError::UnknownItem(name.to_string()))?;
		items.push(IndirectItem { name: item.name, offset, width: item.width });
		offset += item.width as usize;
	}
	Ok(IndirectLayout { items, total_size: offset })
}

/// The target control-table address for every `INDIRECT_ADDRESS` slot this
/// layout occupies, in slot order (one entry per byte, not per item).
pub fn target_addresses(layout: &IndirectLayout, registry: &ControlTableRegistry) -> Vec<u16> {
	let mut addresses = Vec::with_capacity(layout.total_size);
	for item in &layout.items {
		let control_table_item = registry.lookup(item.name).expect("layout items are always registry entries");
		for byte in 0..item.width {
			addresses.push(control_table_item.address + u16::from(byte));
		}
	}
	addresses
}

/// Check that `read_block_size + write_block_sizes` fits within `MAX_INDIRECT`.
pub fn check_capacity(read_block_size: usize, write_block_sizes: impl Iterator<Item = usize>) -> Result<(), UsageError> {
	let total: usize = read_block_size + write_block_sizes.sum::<usize>();
	if total > MAX_INDIRECT {
		Err(UsageError::ExceedsMax { total, max: MAX_INDIRECT })
	} else {
		Ok(())
	}
}

/// Read-block state: consumes slots `0..total_size`.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct IndirectReadBlock {
	pub layout: IndirectLayout,
}

impl IndirectReadBlock {
	pub fn start_slot(&self) -> usize {
		0
	}

	pub fn total_size(&self) -> usize {
		self.layout.total_size
	}
}

/// A named write-block; its `start_slot` is wherever the read block and any
/// previously-installed write blocks leave off.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct IndirectWriteBlock {
	pub name: String,
	pub start_slot: usize,
	pub layout: IndirectLayout,
}

impl IndirectWriteBlock {
	pub fn total_size(&self) -> usize {
		self.layout.total_size
	}
}
