//! Native serial transport backed by the `serial2` crate.

use std::time::Instant;

use crate::error::TransportError;
use crate::transport::Transport;

/// Re-exported in case callers need to tweak serial port settings directly.
pub use ::serial2;

/// A [`Transport`] over a local serial device (e.g. `/dev/ttyUSB0`, `COM3`).
pub struct Serial2Transport {
	port: serial2::SerialPort,
	baud_rate: u32,
}

impl Serial2Transport {
	/// Open `path` at `baud_rate`, 8N1, no flow control.
	pub fn open(path: &str, baud_rate: u32) -> Result<Self, TransportError> {
		let port = serial2::SerialPort::open(path, baud_rate)?;
		Ok(Self { port, baud_rate })
	}

	/// Wrap an already-open `serial2::SerialPort`.
	pub fn new(port: serial2::SerialPort, baud_rate: u32) -> Self {
		Self { port, baud_rate }
	}
}

impl Transport for Serial2Transport {
	fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
		self.port.write_all(bytes)?;
		Ok(())
	}

	fn read(&mut self, buffer: &mut [u8], deadline: Instant) -> Result<usize, TransportError> {
		let remaining = deadline.saturating_duration_since(Instant::now());
		if remaining.is_zero() {
			return Err(TransportError::Timeout);
		}
		self.port.set_read_timeout(remaining)?;
		match self.port.read(buffer) {
			Ok(count) => Ok(count),
			Err(e) => Err(e.into()),
		}
	}

	fn discard_input_buffer(&mut self) -> Result<(), TransportError> {
		self.port.discard_input_buffer()?;
		Ok(())
	}

	fn baud_rate(&self) -> u32 {
		self.baud_rate
	}

	fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), TransportError> {
		let mut settings = self.port.get_configuration()?;
		settings.set_baud_rate(baud_rate)?;
		self.port.set_configuration(&settings)?;
		self.baud_rate = baud_rate;
		Ok(())
	}
}
