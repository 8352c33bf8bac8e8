//! A pair of in-memory transports that write into each other's read buffer,
//! used to drive a `Controller` against a scripted "device" without hardware.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dynamixel2::{Transport, TransportError};

#[derive(Clone, Default)]
pub struct SharedBuffer {
	buffer: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn write(&self, data: &[u8]) {
		self.buffer.lock().unwrap().extend_from_slice(data);
	}

	pub fn drain(&self, out: &mut [u8]) -> usize {
		let mut buffer = self.buffer.lock().unwrap();
		let len = buffer.len().min(out.len());
		out[..len].copy_from_slice(&buffer[..len]);
		buffer.drain(..len);
		len
	}
}

pub struct MockTransport {
	pub inbound: SharedBuffer,
	pub outbound: SharedBuffer,
	baud_rate: u32,
}

impl MockTransport {
	pub fn new(inbound: SharedBuffer, outbound: SharedBuffer) -> Self {
		Self { inbound, outbound, baud_rate: 57600 }
	}
}

impl Transport for MockTransport {
	fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
		self.outbound.write(bytes);
		Ok(())
	}

	fn read(&mut self, buffer: &mut [u8], deadline: Instant) -> Result<usize, TransportError> {
		loop {
			let len = self.inbound.drain(buffer);
			if len > 0 {
				return Ok(len);
			}
			if Instant::now() >= deadline {
				return Err(TransportError::Timeout);
			}
			std::thread::sleep(Duration::from_millis(1));
		}
	}

	fn discard_input_buffer(&mut self) -> Result<(), TransportError> {
		let mut scratch = [0u8; 256];
		while self.inbound.drain(&mut scratch) > 0 {}
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
