//! The device façade: typed control-table accessors, ping, discovery, and
//! the indirect-addressing and group-operation helpers built on top of them.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use crate::codec::{instruction_id, packet_id};
use crate::endian::{read_u16_le, read_u32_le, read_u8_le, write_u16_le};
use crate::engine::{CancelHandle, Engine};
use crate::error::{DeviceError, MotorError, TransactionError, UsageError};
use crate::indirect::{self, IndirectReadBlock, IndirectWriteBlock};
use crate::registry::{self, ControlTableRegistry};
use crate::transport::Transport;

/// The outcome of a primitive that reached the device: the data (or `()` for
/// a write) plus whatever the device's error byte said. A non-zero error
/// does not fail the call: per SPEC_FULL.md §7 it's the caller's choice
/// whether to treat `!error.is_ok()` as a failure.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Readout<V> {
	pub value: V,
	pub error: MotorError,
}

/// Result of a `PING`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PingResponse {
	pub id: u8,
	pub model_number: u16,
	pub model_name: &'static str,
	pub firmware_version: u8,
	pub error: MotorError,
}

/// Argument to [`Device::factory_reset`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FactoryResetKind {
	ResetAll = 0xFF,
	KeepId = 0x01,
	KeepIdAndBaudRate = 0x02,
}

/// Argument to [`Device::clear`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ClearKind {
	MultiTurnCounter,
}

/// A handle to one device on the bus.
///
/// Cheap to hold many of: it's an id plus a shared reference to the bus's
/// [`Engine`], not an owner of the transport itself (see SPEC_FULL.md §9,
/// "per-device state with cross-references").
pub struct Device<T: Transport> {
	id: u8,
	model_number: u16,
	model_name: &'static str,
	engine: Rc<RefCell<Engine<T>>>,
	registry: ControlTableRegistry,
	default_timeout: Duration,
	refuse_indirect_setup_with_torque_enabled: bool,
	indirect_read_block: Option<IndirectReadBlock>,
	indirect_write_blocks: HashMap<String, IndirectWriteBlock>,
}

impl<T: Transport> Device<T> {
	pub fn new(id: u8, model_number: u16, engine: Rc<RefCell<Engine<T>>>, default_timeout: Duration) -> Self {
		Self {
			id,
			model_number,
			model_name: crate::model::model_name(model_number),
			engine,
			registry: ControlTableRegistry::default(),
			default_timeout,
			refuse_indirect_setup_with_torque_enabled: false,
			indirect_read_block: None,
			indirect_write_blocks: HashMap::new(),
		}
	}

	pub fn id(&self) -> u8 {
		self.id
	}

	pub fn model_number(&self) -> u16 {
		self.model_number
	}

	pub fn model_name(&self) -> &'static str {
		self.model_name
	}

	/// A handle that can cancel whatever transaction is currently in flight
	/// on the shared engine, including one started by another `Device` or
	/// the owning `Controller`.
	pub fn cancel_handle(&self) -> CancelHandle {
		self.engine.borrow().cancel_handle()
	}

	/// See SPEC_FULL.md §9: if set, indirect block setup refuses with
	/// `UsageError::TorqueEnabled` instead of letting the device reject the
	/// write. Off by default, matching "the façade SHOULD NOT toggle torque
	/// implicitly".
	pub fn set_refuse_indirect_setup_with_torque_enabled(&mut self, refuse: bool) {
		self.refuse_indirect_setup_with_torque_enabled = refuse;
	}

	// ---- primitives --------------------------------------------------

	pub fn ping(&mut self) -> Result<PingResponse, DeviceError> {
		ping_id(&mut self.engine.borrow_mut(), self.id, self.default_timeout)
	}

	pub fn read_bytes(&mut self, address: u16, width: u8) -> Result<Readout<Vec<u8>>, DeviceError> {
		let mut params = [0u8; 4];
		write_u16_le(&mut params[0..2], address);
		write_u16_le(&mut params[2..4], u16::from(width));
		let status = self
			.engine
			.borrow_mut()
			.transfer_single(self.id, instruction_id::READ, &params, self.default_timeout)?;
		Ok(Readout { value: status.params.clone(), error: status.error() })
	}

	pub fn read_u8(&mut self, address: u16) -> Result<Readout<u8>, DeviceError> {
		Ok(decode_sized(self.read_bytes(address, 1)?, 1, read_u8_le))
	}

	pub fn read_u16(&mut self, address: u16) -> Result<Readout<u16>, DeviceError> {
		Ok(decode_sized(self.read_bytes(address, 2)?, 2, read_u16_le))
	}

	pub fn read_u32(&mut self, address: u16) -> Result<Readout<u32>, DeviceError> {
		Ok(decode_sized(self.read_bytes(address, 4)?, 4, read_u32_le))
	}

	pub fn write_bytes(&mut self, address: u16, data: &[u8]) -> Result<Readout<()>, DeviceError> {
		let mut params = Vec::with_capacity(2 + data.len());
		let mut addr_bytes = [0u8; 2];
		write_u16_le(&mut addr_bytes, address);
		params.extend_from_slice(&addr_bytes);
		params.extend_from_slice(data);
		let status = self
			.engine
			.borrow_mut()
			.transfer_single(self.id, instruction_id::WRITE, &params, self.default_timeout)?;
		Ok(Readout { value: (), error: status.error() })
	}

	pub fn reg_write_bytes(&mut self, address: u16, data: &[u8]) -> Result<Readout<()>, DeviceError> {
		let mut params = Vec::with_capacity(2 + data.len());
		let mut addr_bytes = [0u8; 2];
		write_u16_le(&mut addr_bytes, address);
		params.extend_from_slice(&addr_bytes);
		params.extend_from_slice(data);
		let status = self
			.engine
			.borrow_mut()
			.transfer_single(self.id, instruction_id::REG_WRITE, &params, self.default_timeout)?;
		Ok(Readout { value: (), error: status.error() })
	}

	pub fn action(&mut self) -> Result<Readout<()>, DeviceError> {
		let status = self.engine.borrow_mut().transfer_single(self.id, instruction_id::ACTION, &[], self.default_timeout)?;
		Ok(Readout { value: (), error: status.error() })
	}

	pub fn reboot(&mut self) -> Result<Readout<()>, DeviceError> {
		let status = self.engine.borrow_mut().transfer_single(self.id, instruction_id::REBOOT, &[], self.default_timeout)?;
		Ok(Readout { value: (), error: status.error() })
	}

	pub fn factory_reset(&mut self, kind: FactoryResetKind) -> Result<Readout<()>, DeviceError> {
		let status = self
			.engine
			.borrow_mut()
			.transfer_single(self.id, instruction_id::FACTORY_RESET, &[kind as u8], self.default_timeout)?;
		Ok(Readout { value: (), error: status.error() })
	}

	pub fn clear(&mut self, kind: ClearKind) -> Result<Readout<()>, DeviceError> {
		let params: &[u8] = match kind {
			// The magic bytes the official SDK sends to reset the multi-turn counter.
			ClearKind::MultiTurnCounter => &[0x01, 0x44, 0x58, 0x4C, 0x22],
		};
		let status = self.engine.borrow_mut().transfer_single(self.id, instruction_id::CLEAR, params, self.default_timeout)?;
		Ok(Readout { value: (), error: status.error() })
	}

	// ---- typed item accessors -----------------------------------------

	pub fn read_item_u8(&mut self, name: &str) -> Result<Readout<u8>, DeviceError> {
		let item = self.registry.lookup(name).ok_or_else(|| UsageError::UnknownItem(name.to_string()))?;
		self.read_u8(item.address)
	}

	pub fn read_item_u16(&mut self, name: &str) -> Result<Readout<u16>, DeviceError> {
		let item = self.registry.lookup(name).ok_or_else(|| UsageError::UnknownItem(name.to_string()))?;
		self.read_u16(item.address)
	}

	pub fn read_item_u32(&mut self, name: &str) -> Result<Readout<u32>, DeviceError> {
		let item = self.registry.lookup(name).ok_or_else(|| UsageError::UnknownItem(name.to_string()))?;
		self.read_u32(item.address)
	}

	pub fn write_item_u8(&mut self, name: &str, value: u8) -> Result<Readout<()>, DeviceError> {
		let item = self.registry.lookup(name).ok_or_else(|| UsageError::UnknownItem(name.to_string()))?;
		self.write_bytes(item.address, &[value])
	}

	pub fn write_item_u16(&mut self, name: &str, value: u16) -> Result<Readout<()>, DeviceError> {
		let item = self.registry.lookup(name).ok_or_else(|| UsageError::UnknownItem(name.to_string()))?;
		let mut bytes = [0u8; 2];
		write_u16_le(&mut bytes, value);
		self.write_bytes(item.address, &bytes)
	}

	pub fn write_item_u32(&mut self, name: &str, value: u32) -> Result<Readout<()>, DeviceError> {
		let item = self.registry.lookup(name).ok_or_else(|| UsageError::UnknownItem(name.to_string()))?;
		let mut bytes = [0u8; 4];
		crate::endian::write_u32_le(&mut bytes, value);
		self.write_bytes(item.address, &bytes)
	}

	// ---- indirect addressing -------------------------------------------

	fn check_torque_disabled(&mut self) -> Result<(), DeviceError> {
		if !self.refuse_indirect_setup_with_torque_enabled {
			return Ok(());
		}
		let readout = self.read_item_u8(registry::items::TORQUE_ENABLE.name)?;
		if readout.value != 0 {
			return Err(UsageError::TorqueEnabled.into());
		}
		Ok(())
	}

	fn write_indirect_address_slots(&mut self, start_slot: usize, addresses: &[u16]) -> Result<(), DeviceError> {
		let mut data = Vec::with_capacity(addresses.len() * 2);
		for &address in addresses {
			let mut bytes = [0u8; 2];
			write_u16_le(&mut bytes, address);
			data.extend_from_slice(&bytes);
		}
		let slot_address = ControlTableRegistry::indirect_address_slot(start_slot);
		self.write_bytes(slot_address, &data)?;
		Ok(())
	}

	fn clear_indirect_slots(&mut self, start_slot: usize, count: usize) -> Result<(), DeviceError> {
		let addresses = vec![registry::NO_MAPPING; count];
		self.write_indirect_address_slots(start_slot, &addresses)
	}

	pub fn setup_indirect_read_block(&mut self, names: &[&str]) -> Result<(), DeviceError> {
		let layout = indirect::layout(names, &self.registry)?;
		let write_sizes: Vec<usize> = self.indirect_write_blocks.values().map(IndirectWriteBlock::total_size).collect();
		indirect::check_capacity(layout.total_size, write_sizes.into_iter())?;
		self.check_torque_disabled()?;

		if let Some(previous) = self.indirect_read_block.take() {
			self.clear_indirect_slots(previous.start_slot(), previous.total_size())?;
		}
		let addresses = indirect::target_addresses(&layout, &self.registry);
		self.write_indirect_address_slots(0, &addresses)?;
		self.indirect_read_block = Some(IndirectReadBlock { layout });
		Ok(())
	}

	pub fn setup_indirect_write_block(&mut self, name: &str, names: &[&str]) -> Result<(), DeviceError> {
		let layout = indirect::layout(names, &self.registry)?;
		let read_size = self.indirect_read_block.as_ref().map(IndirectReadBlock::total_size).unwrap_or(0);
		let other_write_sizes: Vec<usize> = self
			.indirect_write_blocks
			.iter()
			.filter(|(existing_name, _)| existing_name.as_str() != name)
			.map(|(_, block)| block.total_size())
			.collect();
		indirect::check_capacity(read_size, other_write_sizes.into_iter().chain(std::iter::once(layout.total_size)))?;
		self.check_torque_disabled()?;

		if let Some(previous) = self.indirect_write_blocks.remove(name) {
			self.clear_indirect_slots(previous.start_slot, previous.total_size())?;
		}
		let start_slot = read_size + self.indirect_write_blocks.values().map(IndirectWriteBlock::total_size).sum::<usize>();
		let addresses = indirect::target_addresses(&layout, &self.registry);
		self.write_indirect_address_slots(start_slot, &addresses)?;
		self.indirect_write_blocks.insert(name.to_string(), IndirectWriteBlock { name: name.to_string(), start_slot, layout });
		Ok(())
	}

	pub fn clear_indirect_read_block(&mut self) -> Result<(), DeviceError> {
		if let Some(block) = self.indirect_read_block.take() {
			self.clear_indirect_slots(block.start_slot(), block.total_size())?;
		}
		Ok(())
	}

	pub fn clear_indirect_write_block(&mut self, name: &str) -> Result<(), DeviceError> {
		if let Some(block) = self.indirect_write_blocks.remove(name) {
			self.clear_indirect_slots(block.start_slot, block.total_size())?;
		}
		Ok(())
	}

	pub fn read_indirect_block(&mut self) -> Result<HashMap<String, Vec<u8>>, DeviceError> {
		let block = self.indirect_read_block.as_ref().ok_or_else(|| UsageError::BlockNotFound("read".to_string()))?;
		let start_slot = block.start_slot();
		let total_size = block.total_size();
		let items = block.layout.items.clone();
		let address = ControlTableRegistry::indirect_data_slot(start_slot);
		let readout = self.read_bytes(address, total_size as u8)?;

		let mut result = HashMap::new();
		if readout.value.len() != total_size {
			return Ok(result);
		}
		for item in &items {
			let bytes = readout.value[item.offset..item.offset + item.width as usize].to_vec();
			result.insert(item.name.to_string(), bytes);
		}
		Ok(result)
	}

	/// `values` must cover exactly the named write block's items.
	pub fn write_indirect_block(&mut self, name: &str, values: &[(&str, &[u8])]) -> Result<Readout<()>, DeviceError> {
		let block = self
			.indirect_write_blocks
			.get(name)
			.cloned()
			.ok_or_else(|| UsageError::BlockNotFound(name.to_string()))?;

		let mut buffer = vec![0u8; block.total_size()];
		let mut seen = std::collections::HashSet::new();
		for &(item_name, bytes) in values {
			let item = block
				.layout
				.items
				.iter()
				.find(|item| item.name == item_name)
				.ok_or_else(|| UsageError::UnknownItem(item_name.to_string()))?;
			if bytes.len() != item.width as usize {
				return Err(UsageError::MissingValue(item_name.to_string()).into());
			}
			buffer[item.offset..item.offset + item.width as usize].copy_from_slice(bytes);
			seen.insert(item_name);
		}
		for item in &block.layout.items {
			if !seen.contains(item.name) {
				return Err(UsageError::MissingValue(item.name.to_string()).into());
			}
		}

		let address = ControlTableRegistry::indirect_data_slot(block.start_slot);
		self.write_bytes(address, &buffer)
	}
}

fn decode_sized<R>(readout: Readout<Vec<u8>>, width: usize, decode: impl FnOnce(&[u8]) -> R) -> Readout<R>
where
	R: Default,
{
	if readout.value.len() == width {
		Readout { value: decode(&readout.value), error: readout.error }
	} else {
		Readout { value: R::default(), error: readout.error }
	}
}

/// Stand-alone `PING`, usable before a [`Device`] handle exists (discovery).
pub fn ping_id<T: Transport>(engine: &mut Engine<T>, id: u8, timeout: Duration) -> Result<PingResponse, DeviceError> {
	let status = engine.transfer_single(id, instruction_id::PING, &[], timeout)?;
	if status.params.len() != 3 {
		return Err(TransactionError::Protocol(crate::error::ProtocolError::InvalidParameterCount(crate::error::InvalidParameterCount {
			actual: status.params.len(),
			expected: 3,
		}))
		.into());
	}
	let model_number = read_u16_le(&status.params[0..2]);
	Ok(PingResponse {
		id: status.id,
		model_number,
		model_name: crate::model::model_name(model_number),
		firmware_version: status.params[2],
		error: status.error(),
	})
}

/// Sweep `ids`, pinging each with `per_id_timeout`. Used by
/// [`crate::controller::Controller::discover`].
pub fn discover<T: Transport>(
	engine: &mut Engine<T>,
	ids: impl Iterator<Item = u8>,
	per_id_timeout: Duration,
	mut progress: Option<&mut dyn FnMut(usize, usize, u8)>,
) -> Result<Vec<PingResponse>, DeviceError> {
	let ids: Vec<u8> = ids.collect();
	let total = ids.len();
	let mut found = Vec::new();
	for (i, &id) in ids.iter().enumerate() {
		if let Some(callback) = progress.as_deref_mut() {
			callback(i + 1, total, id);
		}
		match ping_id(engine, id, per_id_timeout) {
			Ok(response) => found.push(response),
			Err(DeviceError::Transaction(TransactionError::Timeout)) => continue,
			Err(e) => return Err(e),
		}
	}
	Ok(found)
}

/// Broadcast `PING` to `0xFE` and collect whatever responds within `window`;
/// collisions that garble a frame's CRC are dropped by the engine, not
/// surfaced here (SPEC_FULL.md §4.6).
pub fn broadcast_ping<T: Transport>(engine: &mut Engine<T>, window: Duration) -> Result<Vec<PingResponse>, DeviceError> {
	let responses = engine.collect_responses(packet_id::BROADCAST, instruction_id::PING, &[], &[], window)?;
	let mut found: Vec<PingResponse> = responses
		.into_values()
		.filter_map(|status| {
			if status.params.len() != 3 {
				return None;
			}
			let model_number = read_u16_le(&status.params[0..2]);
			Some(PingResponse {
				id: status.id,
				model_number,
				model_name: crate::model::model_name(model_number),
				firmware_version: status.params[2],
				error: status.error(),
			})
		})
		.collect();
	found.sort_by_key(|response| response.id);
	Ok(found)
}

pub fn broadcast_action<T: Transport>(engine: &mut Engine<T>) -> Result<(), DeviceError> {
	engine.transfer_no_response(packet_id::BROADCAST, instruction_id::ACTION, &[])?;
	Ok(())
}

pub fn broadcast_reboot<T: Transport>(engine: &mut Engine<T>) -> Result<(), DeviceError> {
	engine.transfer_no_response(packet_id::BROADCAST, instruction_id::REBOOT, &[])?;
	Ok(())
}

/// Group Sync Read: one broadcast instruction, identical `address`/`width`
/// across `ids`. `fast` selects `FAST_SYNC_READ` over `SYNC_READ`. Missing
/// ids after `window` map to `None`.
pub fn group_sync_read<T: Transport>(
	engine: &mut Engine<T>,
	ids: &[u8],
	address: u16,
	width: u8,
	window: Duration,
	fast: bool,
) -> Result<HashMap<u8, Option<Readout<Vec<u8>>>>, DeviceError> {
	let mut params = Vec::with_capacity(4 + ids.len());
	let mut addr_bytes = [0u8; 2];
	write_u16_le(&mut addr_bytes, address);
	params.extend_from_slice(&addr_bytes);
	let mut len_bytes = [0u8; 2];
	write_u16_le(&mut len_bytes, u16::from(width));
	params.extend_from_slice(&len_bytes);
	params.extend_from_slice(ids);

	let instruction = if fast { instruction_id::FAST_SYNC_READ } else { instruction_id::SYNC_READ };
	let responses = engine.collect_responses(packet_id::BROADCAST, instruction, &params, ids, window)?;

	let mut result = HashMap::with_capacity(ids.len());
	for &id in ids {
		let entry = responses.get(&id).map(|status| Readout { value: status.params.clone(), error: status.error() });
		result.insert(id, entry);
	}
	Ok(result)
}

/// Group Sync Write: one packet, `data[i].len()` must equal `width` for every `i`.
pub fn group_sync_write<T: Transport>(engine: &mut Engine<T>, address: u16, width: u8, items: &[(u8, &[u8])]) -> Result<(), DeviceError> {
	for &(motor_id, data) in items {
		if data.len() != width as usize {
			return Err(UsageError::LengthMismatch { motor_id }.into());
		}
	}

	let mut params = Vec::with_capacity(4 + items.len() * (1 + width as usize));
	let mut addr_bytes = [0u8; 2];
	write_u16_le(&mut addr_bytes, address);
	params.extend_from_slice(&addr_bytes);
	let mut len_bytes = [0u8; 2];
	write_u16_le(&mut len_bytes, u16::from(width));
	params.extend_from_slice(&len_bytes);
	for &(motor_id, data) in items {
		params.push(motor_id);
		params.extend_from_slice(data);
	}

	engine.transfer_no_response(packet_id::BROADCAST, instruction_id::SYNC_WRITE, &params)?;
	Ok(())
}

/// Bulk Read: like sync read, but each device may read a different address/width.
pub fn bulk_read<T: Transport>(engine: &mut Engine<T>, items: &[(u8, u16, u8)], window: Duration) -> Result<HashMap<u8, Option<Readout<Vec<u8>>>>, DeviceError> {
	let mut params = Vec::with_capacity(items.len() * 5);
	let ids: Vec<u8> = items.iter().map(|(id, _, _)| *id).collect();
	for &(id, address, width) in items {
		params.push(id);
		let mut addr_bytes = [0u8; 2];
		write_u16_le(&mut addr_bytes, address);
		params.extend_from_slice(&addr_bytes);
		let mut len_bytes = [0u8; 2];
		write_u16_le(&mut len_bytes, u16::from(width));
		params.extend_from_slice(&len_bytes);
	}

	let responses = engine.collect_responses(packet_id::BROADCAST, instruction_id::BULK_READ, &params, &ids, window)?;
	let mut result = HashMap::with_capacity(ids.len());
	for &id in &ids {
		let entry = responses.get(&id).map(|status| Readout { value: status.params.clone(), error: status.error() });
		result.insert(id, entry);
	}
	Ok(result)
}

/// Bulk Write: like sync write, but each device may write a different address/slice.
pub fn bulk_write<T: Transport>(engine: &mut Engine<T>, items: &[(u8, u16, &[u8])]) -> Result<(), DeviceError> {
	let mut params = Vec::new();
	for &(id, address, data) in items {
		params.push(id);
		let mut addr_bytes = [0u8; 2];
		write_u16_le(&mut addr_bytes, address);
		params.extend_from_slice(&addr_bytes);
		let mut len_bytes = [0u8; 2];
		write_u16_le(&mut len_bytes, data.len() as u16);
		params.extend_from_slice(&len_bytes);
		params.extend_from_slice(data);
	}
	engine.transfer_no_response(packet_id::BROADCAST, instruction_id::BULK_WRITE, &params)?;
	Ok(())
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::codec;
	use assert2::assert;
	use std::time::Instant;

	#[derive(Default)]
	struct LoopbackTransport {
		inbox: std::collections::VecDeque<u8>,
		baud_rate: u32,
		sent: Vec<u8>,
	}

	impl Transport for LoopbackTransport {
		fn send(&mut self, bytes: &[u8]) -> Result<(), crate::error::TransportError> {
			self.sent = bytes.to_vec();
			Ok(())
		}

		fn read(&mut self, buffer: &mut [u8], _deadline: Instant) -> Result<usize, crate::error::TransportError> {
			if self.inbox.is_empty() {
				return Err(crate::error::TransportError::Timeout);
			}
			let mut n = 0;
			while n < buffer.len() {
				match self.inbox.pop_front() {
					Some(byte) => {
						buffer[n] = byte;
						n += 1;
					}
					None => break,
				}
			}
			Ok(n)
		}

		fn discard_input_buffer(&mut self) -> Result<(), crate::error::TransportError> {
			Ok(())
		}

		fn baud_rate(&self) -> u32 {
			self.baud_rate
		}

		fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), crate::error::TransportError> {
			self.baud_rate = baud_rate;
			Ok(())
		}
	}

	fn device_with_reply(reply: Vec<u8>) -> Device<LoopbackTransport> {
		let mut transport = LoopbackTransport::default();
		transport.inbox.extend(reply);
		let engine = Rc::new(RefCell::new(Engine::new(transport)));
		Device::new(1, 1020, engine, Duration::from_millis(50))
	}

	#[test]
	fn s3_ping_response_decodes_model_and_firmware() {
		// model 1200 = 0x04B0, firmware 52 = 0x34
		let reply = codec::build_instruction(1, instruction_id::STATUS, &[0x00, 0xB0, 0x04, 0x34]).unwrap();
		let mut device = device_with_reply(reply);
		let response = device.ping().unwrap();
		assert!(response.model_number == 1200);
		assert!(response.firmware_version == 52);
		assert!(response.error.is_ok());
	}

	#[test]
	fn s5_read_present_position_decodes_u32() {
		let reply = codec::build_instruction(1, instruction_id::STATUS, &[0x00, 0xF8, 0x06, 0x00, 0x00]).unwrap();
		let mut device = device_with_reply(reply);
		let readout = device.read_item_u32(registry::items::PRESENT_POSITION.name).unwrap();
		assert!(readout.value == 1784);
		assert!(readout.error.is_ok());
	}

	#[test]
	fn write_item_surfaces_device_error_without_failing() {
		let reply = codec::build_instruction(1, instruction_id::STATUS, &[0x04]).unwrap(); // data range error
		let mut device = device_with_reply(reply);
		let readout = device.write_item_u8(registry::items::LED.name, 2).unwrap();
		assert!(readout.error.data_range_error());
	}

	#[test]
	fn unknown_item_is_a_usage_error() {
		let mut device = device_with_reply(Vec::new());
		let result = device.read_item_u8("NOT_REAL");
		assert!(let Err(DeviceError::Usage(UsageError::UnknownItem(_))) = result);
	}

	#[test]
	fn group_sync_write_validates_lengths() {
		let mut engine = Engine::new(LoopbackTransport::default());
		let items: Vec<(u8, &[u8])> = vec![(1, &[0, 0, 0, 0]), (2, &[0, 0])];
		let result = group_sync_write(&mut engine, registry::items::GOAL_POSITION.address, 4, &items);
		assert!(let Err(DeviceError::Usage(UsageError::LengthMismatch { motor_id: 2 })) = result);
	}

	#[test]
	fn s6_group_sync_read_param_layout() {
		// S6: FF FF FD 00 FE L0 L1 8A 84 00 04 00 01 02 03 <crc>
		let mut engine = Engine::new(LoopbackTransport::default());
		let result = group_sync_read(&mut engine, &[1, 2, 3], registry::items::PRESENT_POSITION.address, 4, Duration::from_millis(10), true);
		let result = result.unwrap();
		assert!(result.len() == 3);
		assert!(result[&1].is_none());

		let sent = engine.transport().sent.clone();
		assert!(sent[0..5].to_vec() == vec![0xFF, 0xFF, 0xFD, 0x00, 0xFE]);
		assert!(sent[7] == instruction_id::FAST_SYNC_READ);
		assert!(sent[8..15].to_vec() == vec![0x84, 0x00, 0x04, 0x00, 0x01, 0x02, 0x03]);

		let crc = crate::crc::calculate_checksum(&sent[..sent.len() - 2]);
		let mut crc_bytes = [0u8; 2];
		write_u16_le(&mut crc_bytes, crc);
		assert!(sent[sent.len() - 2..].to_vec() == crc_bytes.to_vec());
	}

	#[test]
	fn indirect_setup_then_read_round_trip() {
		let registry = ControlTableRegistry::default();
		let layout = indirect::layout(&["PRESENT_POSITION"], &registry).unwrap();
		assert!(layout.total_size == 4);

		// setup_indirect_read_block writes INDIRECT_ADDRESS then we fabricate a
		// read response for INDIRECT_DATA to check the decode path end-to-end.
		let setup_reply = codec::build_instruction(1, instruction_id::STATUS, &[0x00]).unwrap();
		let mut device = device_with_reply(setup_reply);
		device.setup_indirect_read_block(&["PRESENT_POSITION"]).unwrap();

		let data_reply = codec::build_instruction(1, instruction_id::STATUS, &[0x00, 0x78, 0x56, 0x34, 0x12]).unwrap();
		device.engine.borrow_mut().transport_mut().inbox.extend(data_reply);
		let values = device.read_indirect_block().unwrap();
		assert!(values.get("PRESENT_POSITION") == Some(&vec![0x78, 0x56, 0x34, 0x12]));
	}

	#[test]
	fn s7_indirect_capacity_scenario() {
		let setup_reply = codec::build_instruction(1, instruction_id::STATUS, &[0x00]).unwrap();
		let mut device = device_with_reply(setup_reply);
		device.setup_indirect_read_block(&["PRESENT_POSITION", "PRESENT_VELOCITY"]).unwrap();

		let names = ["GOAL_POSITION"; 13];
		let result = device.setup_indirect_write_block("too_big", &names);
		assert!(let Err(DeviceError::Usage(UsageError::ExceedsMax { total: 60, max: 20 })) = result);
		// Prior state (the read block) must be untouched.
		assert!(device.indirect_read_block.is_some());
	}
}
