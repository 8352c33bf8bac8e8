//! The transaction engine: serializes requests onto the half-duplex bus,
//! matches inbound frames to the request that's waiting for them, and
//! enforces timeouts. This is the only place that talks to the transport.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::codec::{self, StatusPacket};
use crate::error::{TransactionError, TransportError};
use crate::reassembler::FrameReassembler;
use crate::transport::{self, Transport};

/// A cloneable handle that can cancel whatever transaction is currently
/// in flight on the engine it was obtained from. Late frames for a
/// cancelled transaction are simply dropped once the next transaction starts,
/// since the reassembler is flushed before every new request.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
	pub fn cancel(&self) {
		self.0.store(true, Ordering::SeqCst);
	}
}

/// Owns the transport and the byte-level reassembly state. All request/response
/// traffic for a bus goes through one `Engine`; `&mut self` on every method is
/// what gives the "at most one transaction in flight" guarantee from SPEC_FULL.md §4.4.
pub struct Engine<T: Transport> {
	transport: T,
	reassembler: FrameReassembler,
	scratch: [u8; 1024],
	cancelled: Arc<AtomicBool>,
}

impl<T: Transport> Engine<T> {
	pub fn new(transport: T) -> Self {
		Self {
			transport,
			reassembler: FrameReassembler::new(),
			scratch: [0; 1024],
			cancelled: Arc::new(AtomicBool::new(false)),
		}
	}

	pub fn with_high_water_mark(transport: T, high_water_mark: usize) -> Self {
		Self {
			transport,
			reassembler: FrameReassembler::with_high_water_mark(high_water_mark),
			scratch: [0; 1024],
			cancelled: Arc::new(AtomicBool::new(false)),
		}
	}

	pub fn transport(&self) -> &T {
		&self.transport
	}

	pub fn transport_mut(&mut self) -> &mut T {
		&mut self.transport
	}

	pub fn cancel_handle(&self) -> CancelHandle {
		CancelHandle(self.cancelled.clone())
	}

	fn take_cancel(&self) -> bool {
		self.cancelled.swap(false, Ordering::SeqCst)
	}

	fn send_frame(&mut self, id: u8, instruction: u8, params: &[u8]) -> Result<(), TransactionError> {
		self.reassembler.flush();
		let _ = self.transport.discard_input_buffer();
		let frame = codec::build_instruction(id, instruction, params)?;
		self.transport.send(&frame).map_err(TransactionError::from)
	}

	/// Wait for the next well-formed frame, or `Ok(None)` on timeout.
	///
	/// Frames that fail to parse (bad CRC, garbage) are logged and skipped;
	/// per SPEC_FULL.md §7 a protocol error on the wire is local and does not
	/// fail the transaction unless it eats the whole deadline.
	fn recv_frame(&mut self, deadline: Instant) -> Result<Option<StatusPacket>, TransactionError> {
		loop {
			if let Some(frame) = self.reassembler.next_frame() {
				match codec::parse_status(&frame) {
					Ok(Some(status)) => return Ok(Some(status)),
					Ok(None) => unreachable!("reassembler only yields complete frames"),
					Err(e) => {
						warn!("dropping malformed frame: {}", e);
						continue;
					}
				}
			}

			if self.take_cancel() {
				return Err(TransactionError::Cancelled);
			}
			if Instant::now() >= deadline {
				return Ok(None);
			}

			match self.transport.read(&mut self.scratch, deadline) {
				Ok(0) => continue,
				Ok(n) => self.reassembler.push(&self.scratch[..n]),
				Err(TransportError::Timeout) => return Ok(None),
				Err(e) => return Err(TransactionError::TransportFailed(e)),
			}
		}
	}

	/// Send a unicast instruction and wait for the matching status frame.
	pub fn transfer_single(&mut self, id: u8, instruction: u8, params: &[u8], timeout: Duration) -> Result<StatusPacket, TransactionError> {
		self.send_frame(id, instruction, params)?;
		let deadline = transport::make_deadline(timeout);
		loop {
			match self.recv_frame(deadline)? {
				Some(status) if status.id == id => return Ok(status),
				Some(other) => {
					trace!("ignoring response from unexpected id {}", other.id);
					continue;
				}
				None => return Err(TransactionError::Timeout),
			}
		}
	}

	/// Send an instruction that never gets a status response (a write or
	/// action addressed to the broadcast id).
	pub fn transfer_no_response(&mut self, id: u8, instruction: u8, params: &[u8]) -> Result<(), TransactionError> {
		self.send_frame(id, instruction, params)
	}

	/// Send a broadcast instruction and collect every status frame that
	/// arrives within `window`. If `expected_ids` is non-empty, collection
	/// stops early once every id in it has reported.
	pub fn collect_responses(
		&mut self,
		target_id: u8,
		instruction: u8,
		params: &[u8],
		expected_ids: &[u8],
		window: Duration,
	) -> Result<HashMap<u8, StatusPacket>, TransactionError> {
		self.send_frame(target_id, instruction, params)?;
		let deadline = transport::make_deadline(window);
		let expected: HashSet<u8> = expected_ids.iter().copied().collect();
		let mut collected = HashMap::new();
		loop {
			if !expected.is_empty() && expected.iter().all(|id| collected.contains_key(id)) {
				return Ok(collected);
			}
			match self.recv_frame(deadline) {
				Ok(Some(status)) => {
					collected.insert(status.id, status);
				}
				Ok(None) => return Ok(collected),
				Err(e) => return Err(e),
			}
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::codec::instruction_id;
	use assert2::assert;

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
	fn transfer_single_times_out_with_no_reply() {
		let mut engine = Engine::new(LoopbackTransport::default());
		let result = engine.transfer_single(1, instruction_id::PING, &[], Duration::from_millis(10));
		assert!(let Err(TransactionError::Timeout) = result);
	}

	#[test]
	fn transfer_single_matches_the_expected_id() {
		let mut transport = LoopbackTransport::default();
		let frame = codec::build_instruction(5, instruction_id::STATUS, &[0]).unwrap();
		transport.inbox.extend(frame);
		let mut engine = Engine::new(transport);
		let status = engine.transfer_single(5, instruction_id::PING, &[], Duration::from_millis(50)).unwrap();
		assert!(status.id == 5);
		assert!(status.error == 0);
	}

	#[test]
	fn collect_responses_stops_early_once_all_expected_ids_report() {
		let mut transport = LoopbackTransport::default();
		transport.inbox.extend(codec::build_instruction(1, instruction_id::STATUS, &[0]).unwrap());
		transport.inbox.extend(codec::build_instruction(2, instruction_id::STATUS, &[0]).unwrap());
		let mut engine = Engine::new(transport);
		let responses = engine
			.collect_responses(codec::packet_id::BROADCAST, instruction_id::PING, &[], &[1, 2], Duration::from_millis(200))
			.unwrap();
		assert!(responses.len() == 2);
		assert!(responses.contains_key(&1));
		assert!(responses.contains_key(&2));
	}

	/// A transport whose `read` blocks briefly and then reports a timeout,
	/// so a transaction waiting on it actually spends time inside `recv_frame`
	/// for a cancel on another thread to land in.
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
	fn cancel_resolves_a_pending_transfer_single_with_cancelled() {
		let mut engine = Engine::new(SlowTransport);
		let handle = engine.cancel_handle();
		std::thread::spawn(move || {
			std::thread::sleep(Duration::from_millis(20));
			handle.cancel();
		});
		let result = engine.transfer_single(1, instruction_id::PING, &[], Duration::from_secs(5));
		assert!(let Err(TransactionError::Cancelled) = result);
	}

	#[test]
	fn cancel_resolves_pending_collect_responses_with_cancelled() {
		let mut engine = Engine::new(SlowTransport);
		let handle = engine.cancel_handle();
		std::thread::spawn(move || {
			std::thread::sleep(Duration::from_millis(20));
			handle.cancel();
		});
		let result = engine.collect_responses(codec::packet_id::BROADCAST, instruction_id::PING, &[], &[], Duration::from_secs(5));
		assert!(let Err(TransactionError::Cancelled) = result);
	}

	#[test]
	fn collect_responses_reports_partial_set_on_timeout() {
		let mut transport = LoopbackTransport::default();
		transport.inbox.extend(codec::build_instruction(1, instruction_id::STATUS, &[0]).unwrap());
		let mut engine = Engine::new(transport);
		let responses = engine
			.collect_responses(codec::packet_id::BROADCAST, instruction_id::PING, &[], &[1, 2], Duration::from_millis(20))
			.unwrap();
		assert!(responses.len() == 1);
		assert!(responses.contains_key(&1));
	}
}
