//! Transport contract shared by every concrete link: native serial, a
//! USB-hub locator on top of it, and (in tests) an in-memory loopback.

pub mod serial2;
pub mod usb;

use std::time::{Duration, Instant};

use crate::error::TransportError;

/// A half-duplex byte link. Adapters block on `read` up to a deadline; they
/// do not themselves enforce the per-transaction timeout, that's the
/// engine's job (see [`crate::engine`]).
pub trait Transport {
	/// Write `bytes` to the link. Must not interleave with another in-flight
	/// `send`; the engine already guarantees only one call is outstanding.
	fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

	/// Read whatever bytes are currently available, blocking until at least
	/// one byte arrives or `deadline` passes.
	fn read(&mut self, buffer: &mut [u8], deadline: Instant) -> Result<usize, TransportError>;

	/// Discard any bytes sitting in the OS receive buffer. A no-op for
	/// adapters that have no such buffer (e.g. the in-memory mock).
	fn discard_input_buffer(&mut self) -> Result<(), TransportError>;

	fn baud_rate(&self) -> u32;

	fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), TransportError>;
}

/// Lets a `Controller` hold a dynamically-chosen adapter behind one type
/// (`Box<dyn Transport>`) instead of being generic over it; see
/// [`crate::controller::Controller`].
impl Transport for Box<dyn Transport> {
	fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
		(**self).send(bytes)
	}

	fn read(&mut self, buffer: &mut [u8], deadline: Instant) -> Result<usize, TransportError> {
		(**self).read(buffer, deadline)
	}

	fn discard_input_buffer(&mut self) -> Result<(), TransportError> {
		(**self).discard_input_buffer()
	}

	fn baud_rate(&self) -> u32 {
		(**self).baud_rate()
	}

	fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), TransportError> {
		(**self).set_baud_rate(baud_rate)
	}
}

/// Compute a deadline `timeout` from now.
pub fn make_deadline(timeout: Duration) -> Instant {
	Instant::now() + timeout
}

/// Standard serial baud rates this protocol is commonly run at.
pub const SUPPORTED_BAUD_RATES: &[u32] = &[9600, 57600, 115200, 1_000_000, 2_000_000, 3_000_000, 4_000_000, 4_500_000];

pub const DEFAULT_BAUD_RATE: u32 = 57600;

/// Default cap on how many unresolved bytes the frame reassembler keeps
/// around. Valid configured range is roughly 4096..262144.
pub const DEFAULT_HIGH_WATER_MARK: usize = 65536;
