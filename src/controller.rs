//! The top-level entry point: owns a connection, hands out [`Device`] handles
//! that share it, and runs bus discovery and broadcast operations.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use crate::device::{self, Device, PingResponse};
use crate::engine::{CancelHandle, Engine};
use crate::error::{DeviceError, TransportError, UsageError};
use crate::transport::serial2::Serial2Transport;
use crate::transport::usb::{NullUsbLocator, UsbPortLocator, U2D2_PRODUCT_ID, U2D2_VENDOR_ID};
use crate::transport::{Transport, DEFAULT_BAUD_RATE, DEFAULT_HIGH_WATER_MARK};

/// How the controller should establish its link to the bus.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ConnectionKind {
	/// Try USB first, then fall back to the configured serial path.
	Auto,
	Serial,
	Usb,
	/// No native transport is available (e.g. compiled for a browser);
	/// the caller must supply one via [`Controller::with_transport`].
	BrowserSerial,
}

/// Explicit configuration record; replaces the loose options-bag pattern
/// some host SDKs use for this (see SPEC_FULL.md §9).
#[derive(Debug, Clone)]
pub struct Config {
	pub connection_kind: ConnectionKind,
	pub port_path: Option<String>,
	pub baud_rate: u32,
	pub timeout: Duration,
	pub high_water_mark: usize,
	pub debug: bool,
	pub refuse_indirect_setup_with_torque_enabled: bool,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			connection_kind: ConnectionKind::Auto,
			port_path: None,
			baud_rate: DEFAULT_BAUD_RATE,
			timeout: Duration::from_millis(100),
			high_water_mark: DEFAULT_HIGH_WATER_MARK,
			debug: false,
			refuse_indirect_setup_with_torque_enabled: false,
		}
	}
}

/// Per-id quick-scan and full-scan ranges used by [`Controller::discover`].
const QUICK_SCAN_RANGE: std::ops::RangeInclusive<u8> = 1..=20;
const FULL_SCAN_RANGE: std::ops::RangeInclusive<u8> = 1..=252;
const DISCOVERY_TIMEOUT: Duration = Duration::from_millis(50);

/// Notifications a caller can subscribe to with [`Controller::on_event`].
#[derive(Debug, Clone)]
pub enum Event {
	Connected,
	Disconnected,
	Error(String),
}

/// Owns the bus connection and the set of devices discovered or added on it.
///
/// Holds a `Box<dyn Transport>` rather than being generic over the concrete
/// adapter: `connection_kind` is chosen at runtime from [`Config`], and every
/// [`Device`] handle needs to share the same engine, so a fixed trait object
/// is simpler than threading a transport type parameter through the whole
/// public API (see SPEC_FULL.md §4, "Transport redesign").
pub struct Controller {
	engine: Option<Rc<RefCell<Engine<Box<dyn Transport>>>>>,
	config: Config,
	devices: HashMap<u8, Device<Box<dyn Transport>>>,
	usb_locator: Box<dyn UsbPortLocator>,
	listeners: Vec<Box<dyn FnMut(&Event)>>,
}

impl Controller {
	pub fn new(config: Config) -> Self {
		Self {
			engine: None,
			config,
			devices: HashMap::new(),
			usb_locator: Box::new(NullUsbLocator),
			listeners: Vec::new(),
		}
	}

	/// Supply a USB locator (e.g. a `udev`-backed one); without this,
	/// `ConnectionKind::Usb`/`Auto` can never resolve a port.
	pub fn set_usb_locator(&mut self, locator: Box<dyn UsbPortLocator>) {
		self.usb_locator = locator;
	}

	pub fn on_event(&mut self, listener: impl FnMut(&Event) + 'static) {
		self.listeners.push(Box::new(listener));
	}

	fn emit(&mut self, event: Event) {
		for listener in &mut self.listeners {
			listener(&event);
		}
	}

	pub fn is_connected(&self) -> bool {
		self.engine.is_some()
	}

	/// Open the configured connection. Idempotent: calling this while already
	/// connected disconnects first.
	pub fn connect(&mut self) -> Result<(), TransportError> {
		if self.engine.is_some() {
			self.disconnect();
		}
		let transport = self.open_transport()?;
		let engine = Engine::with_high_water_mark(transport, self.config.high_water_mark);
		self.engine = Some(Rc::new(RefCell::new(engine)));
		self.emit(Event::Connected);
		Ok(())
	}

	/// Use an already-constructed transport instead of one `connect` would
	/// build itself; the only way to connect under `ConnectionKind::BrowserSerial`.
	pub fn with_transport(&mut self, transport: impl Transport + 'static) {
		if self.engine.is_some() {
			self.disconnect();
		}
		let engine = Engine::with_high_water_mark(Box::new(transport) as Box<dyn Transport>, self.config.high_water_mark);
		self.engine = Some(Rc::new(RefCell::new(engine)));
		self.emit(Event::Connected);
	}

	fn open_transport(&mut self) -> Result<Box<dyn Transport>, TransportError> {
		match self.config.connection_kind {
			ConnectionKind::Serial => self.open_serial(),
			ConnectionKind::Usb => self.open_usb(),
			ConnectionKind::Auto => self.open_usb().or_else(|_| self.open_serial()),
			ConnectionKind::BrowserSerial => Err(TransportError::Unsupported("no native transport; call with_transport")),
		}
	}

	fn open_serial(&self) -> Result<Box<dyn Transport>, TransportError> {
		let path = self.config.port_path.as_deref().ok_or(TransportError::Unsupported("no port_path configured"))?;
		let transport = Serial2Transport::open(path, self.config.baud_rate)?;
		Ok(Box::new(transport))
	}

	fn open_usb(&self) -> Result<Box<dyn Transport>, TransportError> {
		let path = self
			.usb_locator
			.find_port(U2D2_VENDOR_ID, U2D2_PRODUCT_ID)
			.ok_or(TransportError::Unsupported("no U2D2 adapter found"))?;
		let path = path.to_str().ok_or(TransportError::Unsupported("non-UTF-8 device path"))?;
		let transport = Serial2Transport::open(path, self.config.baud_rate)?;
		Ok(Box::new(transport))
	}

	/// Cancels whatever transaction is in flight, then drops the connection.
	/// Any `transfer_single`/`collect_responses` call blocked on the engine
	/// resolves with `TransactionError::Cancelled`.
	pub fn disconnect(&mut self) {
		if let Some(engine) = self.engine.take() {
			engine.borrow().cancel_handle().cancel();
			self.devices.clear();
			self.emit(Event::Disconnected);
		}
	}

	/// A handle that can cancel whatever transaction is currently in flight,
	/// without disconnecting. See [`CancelHandle::cancel`].
	pub fn cancel_handle(&self) -> Result<CancelHandle, UsageError> {
		Ok(self.engine()?.borrow().cancel_handle())
	}

	fn engine(&self) -> Result<&Rc<RefCell<Engine<Box<dyn Transport>>>>, UsageError> {
		self.engine.as_ref().ok_or(UsageError::NotConnected)
	}

	/// Sweep for responders and register a [`Device`] handle for each.
	/// `full` selects the 1..=252 range (default is the 1..=20 quick scan).
	pub fn discover(&mut self, full: bool, mut progress: Option<&mut dyn FnMut(usize, usize, u8)>) -> Result<Vec<PingResponse>, DeviceError> {
		let engine_handle = self.engine().map_err(DeviceError::from)?.clone();
		let ids: Box<dyn Iterator<Item = u8>> = if full { Box::new(FULL_SCAN_RANGE) } else { Box::new(QUICK_SCAN_RANGE) };
		let responses = {
			let mut engine = engine_handle.borrow_mut();
			device::discover(&mut *engine, ids, DISCOVERY_TIMEOUT, progress.as_deref_mut())?
		};
		for response in &responses {
			self.register_device(response.id, response.model_number);
		}
		Ok(responses)
	}

	/// Broadcast ping; see [`device::broadcast_ping`].
	pub fn broadcast_ping(&mut self, window: Duration) -> Result<Vec<PingResponse>, DeviceError> {
		let engine_handle = self.engine().map_err(DeviceError::from)?.clone();
		let responses = device::broadcast_ping(&mut *engine_handle.borrow_mut(), window)?;
		for response in &responses {
			self.register_device(response.id, response.model_number);
		}
		Ok(responses)
	}

	fn register_device(&mut self, id: u8, model_number: u16) {
		if self.devices.contains_key(&id) {
			return;
		}
		if let Some(engine) = &self.engine {
			let mut device = Device::new(id, model_number, engine.clone(), self.config.timeout);
			device.set_refuse_indirect_setup_with_torque_enabled(self.config.refuse_indirect_setup_with_torque_enabled);
			self.devices.insert(id, device);
		}
	}

	/// Register a device by id without discovery, e.g. when `id` is already known.
	pub fn add_device(&mut self, id: u8, model_number: u16) -> Result<(), UsageError> {
		self.engine()?;
		self.register_device(id, model_number);
		Ok(())
	}

	pub fn remove_device(&mut self, id: u8) {
		self.devices.remove(&id);
	}

	pub fn get_device(&mut self, id: u8) -> Option<&mut Device<Box<dyn Transport>>> {
		self.devices.get_mut(&id)
	}

	pub fn device_ids(&self) -> Vec<u8> {
		let mut ids: Vec<u8> = self.devices.keys().copied().collect();
		ids.sort_unstable();
		ids
	}

	/// Ping a specific id directly, bypassing any registered [`Device`].
	pub fn ping(&mut self, id: u8, timeout: Duration) -> Result<PingResponse, DeviceError> {
		let engine_handle = self.engine().map_err(DeviceError::from)?.clone();
		device::ping_id(&mut *engine_handle.borrow_mut(), id, timeout)
	}

	pub fn group_sync_read(&mut self, ids: &[u8], address: u16, width: u8, fast: bool) -> Result<HashMap<u8, Option<device::Readout<Vec<u8>>>>, DeviceError> {
		let engine_handle = self.engine().map_err(DeviceError::from)?.clone();
		device::group_sync_read(&mut *engine_handle.borrow_mut(), ids, address, width, self.config.timeout, fast)
	}

	pub fn group_sync_write(&mut self, address: u16, width: u8, items: &[(u8, &[u8])]) -> Result<(), DeviceError> {
		let engine_handle = self.engine().map_err(DeviceError::from)?.clone();
		device::group_sync_write(&mut *engine_handle.borrow_mut(), address, width, items)
	}

	pub fn bulk_read(&mut self, items: &[(u8, u16, u8)]) -> Result<HashMap<u8, Option<device::Readout<Vec<u8>>>>, DeviceError> {
		let engine_handle = self.engine().map_err(DeviceError::from)?.clone();
		device::bulk_read(&mut *engine_handle.borrow_mut(), items, self.config.timeout)
	}

	pub fn bulk_write(&mut self, items: &[(u8, u16, &[u8])]) -> Result<(), DeviceError> {
		let engine_handle = self.engine().map_err(DeviceError::from)?.clone();
		device::bulk_write(&mut *engine_handle.borrow_mut(), items)
	}

	pub fn broadcast_action(&mut self) -> Result<(), DeviceError> {
		let engine_handle = self.engine().map_err(DeviceError::from)?.clone();
		device::broadcast_action(&mut *engine_handle.borrow_mut())
	}

	pub fn broadcast_reboot(&mut self) -> Result<(), DeviceError> {
		let engine_handle = self.engine().map_err(DeviceError::from)?.clone();
		device::broadcast_reboot(&mut *engine_handle.borrow_mut())
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::codec::{self, instruction_id};
	use assert2::assert;
	use std::time::Instant;

	#[derive(Default)]
	struct LoopbackTransport {
		inbox: std::collections::VecDeque<u8>,
		baud_rate: u32,
	}

	impl Transport for LoopbackTransport {
		fn send(&mut self, _bytes: &[u8]) -> Result<(), TransportError> {
			Ok(())
		}

		fn read(&mut self, buffer: &mut [u8], _deadline: Instant) -> Result<usize, TransportError> {
			if self.inbox.is_empty() {
				return Err(TransportError::Timeout);
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

		fn discard_input_buffer(&mut self) -> Result<(), TransportError> {
			Ok(())
		}

		fn baud_rate(&self) -> u32 {
			self.baud_rate
		}

		fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), TransportError> {
			self.baud_rate = baud_rate;
			Ok(())
		}
	}

	#[test]
	fn operations_before_connect_fail_with_not_connected() {
		let mut controller = Controller::new(Config::default());
		let result = controller.ping(1, Duration::from_millis(10));
		assert!(let Err(DeviceError::Usage(UsageError::NotConnected)) = result);
	}

	#[test]
	fn with_transport_allows_immediate_use() {
		let mut controller = Controller::new(Config::default());
		let mut transport = LoopbackTransport::default();
		transport.inbox.extend(codec::build_instruction(9, instruction_id::STATUS, &[0x00, 0x00, 0x04, 0x01]).unwrap());
		controller.with_transport(transport);
		assert!(controller.is_connected());

		let response = controller.ping(9, Duration::from_millis(50)).unwrap();
		assert!(response.id == 9);
		assert!(response.model_number == 1024);
	}

	#[test]
	fn discover_registers_a_device_handle_per_responder() {
		let mut controller = Controller::new(Config::default());
		let mut transport = LoopbackTransport::default();
		// id=1 responds to the first ping in the quick-scan sweep, everyone else times out.
		transport.inbox.extend(codec::build_instruction(1, instruction_id::STATUS, &[0x00, 0xFC, 0x03, 0x01]).unwrap());
		controller.with_transport(transport);

		let responses = controller.discover(false, None).unwrap();
		assert!(responses.len() == 1);
		assert!(responses[0].id == 1);
		assert!(controller.get_device(1).is_some());
	}

	#[test]
	fn disconnect_clears_registered_devices() {
		let mut controller = Controller::new(Config::default());
		controller.with_transport(LoopbackTransport::default());
		controller.add_device(1, 1020).unwrap();
		assert!(controller.get_device(1).is_some());

		controller.disconnect();
		assert!(!controller.is_connected());
		assert!(controller.get_device(1).is_none());
	}

	#[test]
	fn cancel_handle_requires_a_connection() {
		let controller = Controller::new(Config::default());
		assert!(let Err(UsageError::NotConnected) = controller.cancel_handle());
	}

	/// A transport whose `read` blocks briefly and then reports a timeout, so a
	/// transaction waiting on it actually spends time inside `recv_frame` for a
	/// cancel on another thread to land in.
	#[derive(Default)]
	struct SlowTransport;

	impl Transport for SlowTransport {
		fn send(&mut self, _bytes: &[u8]) -> Result<(), TransportError> {
			Ok(())
		}

		fn read(&mut self, _buffer: &mut [u8], _deadline: Instant) -> Result<usize, TransportError> {
			std::thread::sleep(Duration::from_millis(5));
			Err(TransportError::Timeout)
		}

		fn discard_input_buffer(&mut self) -> Result<(), TransportError> {
			Ok(())
		}

		fn baud_rate(&self) -> u32 {
			0
		}

		fn set_baud_rate(&mut self, _baud_rate: u32) -> Result<(), TransportError> {
			Ok(())
		}
	}

	#[test]
	fn cancel_handle_resolves_a_pending_ping_with_cancelled() {
		let mut controller = Controller::new(Config::default());
		controller.with_transport(SlowTransport::default());

		let handle = controller.cancel_handle().unwrap();
		std::thread::spawn(move || {
			std::thread::sleep(Duration::from_millis(20));
			handle.cancel();
		});

		let result = controller.ping(1, Duration::from_secs(5));
		assert!(let Err(DeviceError::Transaction(crate::error::TransactionError::Cancelled)) = result);
	}

	#[test]
	fn events_fire_on_connect_and_disconnect() {
		let events = Rc::new(RefCell::new(Vec::new()));
		let mut controller = Controller::new(Config::default());
		let recorder = events.clone();
		controller.on_event(move |event| recorder.borrow_mut().push(format!("{:?}", event)));

		controller.with_transport(LoopbackTransport::default());
		controller.disconnect();

		let recorded = events.borrow();
		assert!(recorded.len() == 2);
		assert!(recorded[0] == "Connected");
		assert!(recorded[1] == "Disconnected");
	}
}
