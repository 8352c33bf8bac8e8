//! The wire codec: packet framing, instruction ids, building requests and
//! parsing status responses. Everything here is a pure function over byte
//! slices; statefulness (buffering partial frames) lives in [`crate::reassembler`].

use crate::bytestuff;
use crate::crc::calculate_checksum;
use crate::endian::{read_u16_le, write_u16_le};
use crate::error::{InvalidHeaderPrefix, InvalidInstruction, ParamTooLarge, ProtocolError, ShortFrame};

/// The fixed four-byte header every packet starts with.
pub const HEADER_PREFIX: [u8; 4] = [0xFF, 0xFF, 0xFD, 0x00];

/// Bytes before the length field's own two bytes: header + id + length.
const HEADER_SIZE: usize = 7;

/// Smallest possible complete frame: header(4) + id(1) + length(2) + instruction(1) + crc(2).
const MIN_FRAME_LEN: usize = 10;

pub mod instruction_id {
	pub const PING: u8 = 0x01;
	pub const READ: u8 = 0x02;
	pub const WRITE: u8 = 0x03;
	pub const REG_WRITE: u8 = 0x04;
	pub const ACTION: u8 = 0x05;
	pub const FACTORY_RESET: u8 = 0x06;
	pub const REBOOT: u8 = 0x08;
	pub const CLEAR: u8 = 0x10;
	pub const STATUS: u8 = 0x55;
	pub const SYNC_READ: u8 = 0x82;
	pub const SYNC_WRITE: u8 = 0x83;
	pub const FAST_SYNC_READ: u8 = 0x8A;
	pub const BULK_READ: u8 = 0x92;
	pub const BULK_WRITE: u8 = 0x93;
}

pub mod packet_id {
	pub const BROADCAST: u8 = 0xFE;
}

/// Build a complete, byte-stuffed, CRC-checked packet.
///
/// `instruction` is the instruction id for requests, or
/// [`instruction_id::STATUS`] to build a status frame (in which case the
/// first byte of `params` is the status error byte).
pub fn build_instruction(id: u8, instruction: u8, params: &[u8]) -> Result<Vec<u8>, ParamTooLarge> {
	let max_stuffed = bytestuff::maximum_stuffed_len(params.len());
	let mut stuff_buffer = vec![0u8; max_stuffed];
	stuff_buffer[..params.len()].copy_from_slice(params);
	let stuffed_len = bytestuff::stuff_inplace(&mut stuff_buffer, params.len()).expect("buffer sized by maximum_stuffed_len");
	stuff_buffer.truncate(stuffed_len);

	let length_value = stuffed_len + 3;
	if length_value > 0xFFFF {
		return Err(ParamTooLarge { len: params.len() });
	}

	let mut frame = Vec::with_capacity(HEADER_SIZE + length_value);
	frame.extend_from_slice(&HEADER_PREFIX);
	frame.push(id);
	let mut length_bytes = [0u8; 2];
	write_u16_le(&mut length_bytes, length_value as u16);
	frame.extend_from_slice(&length_bytes);
	frame.push(instruction);
	frame.extend_from_slice(&stuff_buffer);

	let crc = calculate_checksum(&frame);
	let mut crc_bytes = [0u8; 2];
	write_u16_le(&mut crc_bytes, crc);
	frame.extend_from_slice(&crc_bytes);

	Ok(frame)
}

/// Given the head of a byte stream starting at a candidate header, return
/// the total expected frame length, or `0` if that can't yet be decided
/// (too few bytes, or the header doesn't match).
pub fn probe_length(buffer: &[u8]) -> usize {
	if buffer.len() < HEADER_SIZE {
		return 0;
	}
	if buffer[0..4] != HEADER_PREFIX {
		return 0;
	}
	let length_value = read_u16_le(&buffer[5..7]) as usize;
	HEADER_SIZE + length_value
}

/// A parsed status response.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StatusPacket {
	pub id: u8,
	pub error: u8,
	pub params: Vec<u8>,
}

impl StatusPacket {
	pub fn error(&self) -> crate::error::MotorError {
		crate::error::MotorError(self.error)
	}
}

/// Parse a status frame out of `buffer`.
///
/// Returns `Ok(None)` if `buffer` doesn't yet contain a complete frame
/// (either too short to read the length field, or the declared length
/// hasn't fully arrived). Returns `Err` for a frame that is complete but
/// invalid (bad header, wrong instruction marker, or CRC mismatch).
pub fn parse_status(buffer: &[u8]) -> Result<Option<StatusPacket>, ProtocolError> {
	if buffer.len() < HEADER_SIZE {
		return Ok(None);
	}
	InvalidHeaderPrefix::check(&buffer[0..4], HEADER_PREFIX)?;

	let id = buffer[4];
	let length_value = read_u16_le(&buffer[5..7]) as usize;
	let total_len = HEADER_SIZE + length_value;
	if buffer.len() < total_len {
		return Ok(None);
	}
	if total_len < MIN_FRAME_LEN {
		return Err(ProtocolError::ShortFrame(ShortFrame {
			actual: total_len,
			minimum: MIN_FRAME_LEN,
		}));
	}

	let instruction = buffer[7];
	InvalidInstruction::check(instruction, instruction_id::STATUS)?;

	let error = buffer[8];
	let mut params = buffer[9..total_len - 2].to_vec();
	let unstuffed_len = bytestuff::unstuff_inplace(&mut params);
	params.truncate(unstuffed_len);

	let crc_claimed = read_u16_le(&buffer[total_len - 2..total_len]);
	let crc_computed = calculate_checksum(&buffer[0..total_len - 2]);
	crate::error::InvalidChecksum::check(crc_claimed, crc_computed)?;

	Ok(Some(StatusPacket { id, error, params }))
}
