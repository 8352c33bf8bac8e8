//! Error types for every layer of the crate: wire-level protocol errors,
//! device-reported errors, transaction-engine failures and caller misuse.

use std::fmt::Formatter;

/// A malformed or unexpected value encountered while decoding a frame.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ProtocolError {
	BadHeader(InvalidHeaderPrefix),
	CrcMismatch(InvalidChecksum),
	InvalidPacketId(InvalidPacketId),
	UnknownInstruction(InvalidInstruction),
	InvalidParameterCount(InvalidParameterCount),
	ParamTooLarge(ParamTooLarge),
	ShortFrame(ShortFrame),
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct InvalidHeaderPrefix {
	pub actual: [u8; 4],
	pub expected: [u8; 4],
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct InvalidChecksum {
	pub actual: u16,
	pub expected: u16,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct InvalidPacketId {
	pub actual: u8,
	pub expected: u8,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct InvalidInstruction {
	pub actual: u8,
	pub expected: u8,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct InvalidParameterCount {
	pub actual: usize,
	pub expected: usize,
}

/// The parameter block of a built instruction exceeds the 16-bit length field.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ParamTooLarge {
	pub len: usize,
}

/// Fewer bytes are available than the minimum possible frame (10 bytes).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ShortFrame {
	pub actual: usize,
	pub minimum: usize,
}

impl InvalidHeaderPrefix {
	pub fn check(actual: &[u8], expected: [u8; 4]) -> Result<(), Self> {
		if actual == expected {
			Ok(())
		} else {
			Err(Self {
				actual: [actual[0], actual[1], actual[2], actual[3]],
				expected,
			})
		}
	}
}

impl InvalidChecksum {
	pub fn check(actual: u16, expected: u16) -> Result<(), Self> {
		if actual == expected {
			Ok(())
		} else {
			Err(Self { actual, expected })
		}
	}
}

impl InvalidPacketId {
	pub fn check(actual: u8, expected: u8) -> Result<(), Self> {
		if actual == expected {
			Ok(())
		} else {
			Err(Self { actual, expected })
		}
	}
}

impl InvalidInstruction {
	pub fn check(actual: u8, expected: u8) -> Result<(), Self> {
		if actual == expected {
			Ok(())
		} else {
			Err(Self { actual, expected })
		}
	}
}

impl InvalidParameterCount {
	pub fn check(actual: usize, expected: usize) -> Result<(), Self> {
		if actual == expected {
			Ok(())
		} else {
			Err(Self { actual, expected })
		}
	}
}

macro_rules! impl_from_and_error {
	($leaf:ty => $enum:ident :: $variant:ident) => {
		impl std::error::Error for $leaf {}

		impl From<$leaf> for $enum {
			fn from(other: $leaf) -> Self {
				Self::$variant(other)
			}
		}
	};
}

impl_from_and_error!(InvalidHeaderPrefix => ProtocolError::BadHeader);
impl_from_and_error!(InvalidChecksum => ProtocolError::CrcMismatch);
impl_from_and_error!(InvalidPacketId => ProtocolError::InvalidPacketId);
impl_from_and_error!(InvalidInstruction => ProtocolError::UnknownInstruction);
impl_from_and_error!(InvalidParameterCount => ProtocolError::InvalidParameterCount);
impl_from_and_error!(ParamTooLarge => ProtocolError::ParamTooLarge);
impl_from_and_error!(ShortFrame => ProtocolError::ShortFrame);

impl std::error::Error for ProtocolError {}

impl std::fmt::Display for ProtocolError {
	fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
		match self {
			Self::BadHeader(e) => write!(f, "{}", e),
			Self::CrcMismatch(e) => write!(f, "{}", e),
			Self::InvalidPacketId(e) => write!(f, "{}", e),
			Self::UnknownInstruction(e) => write!(f, "{}", e),
			Self::InvalidParameterCount(e) => write!(f, "{}", e),
			Self::ParamTooLarge(e) => write!(f, "{}", e),
			Self::ShortFrame(e) => write!(f, "{}", e),
		}
	}
}

impl std::fmt::Display for InvalidHeaderPrefix {
	fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
		write!(f, "invalid header prefix, expected {:02X?}, got {:02X?}", self.expected, self.actual)
	}
}

impl std::fmt::Display for InvalidChecksum {
	fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
		write!(f, "invalid checksum, message claims {:#06X}, computed {:#06X}", self.actual, self.expected)
	}
}

impl std::fmt::Display for InvalidPacketId {
	fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
		write!(f, "invalid packet ID, expected {:#04X}, got {:#04X}", self.expected, self.actual)
	}
}

impl std::fmt::Display for InvalidInstruction {
	fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
		write!(f, "invalid instruction ID, expected {:#04X}, got {:#04X}", self.expected, self.actual)
	}
}

impl std::fmt::Display for InvalidParameterCount {
	fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
		write!(f, "invalid parameter count, expected {}, got {}", self.expected, self.actual)
	}
}

impl std::fmt::Display for ParamTooLarge {
	fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
		write!(f, "parameter block of {} bytes does not fit in the 16-bit length field", self.len)
	}
}

impl std::fmt::Display for ShortFrame {
	fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
		write!(f, "frame of {} bytes is shorter than the minimum of {} bytes", self.actual, self.minimum)
	}
}

/// The `error` byte of a status packet: bits 0..6 are a numeric error code, bit 7 is the hardware alert flag.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct MotorError(pub u8);

impl MotorError {
	pub fn raw(self) -> u8 {
		self.0
	}

	pub fn code(self) -> u8 {
		self.0 & !0x80
	}

	pub fn alert(self) -> bool {
		self.0 & 0x80 != 0
	}

	pub fn is_ok(self) -> bool {
		self.code() == 0
	}

	pub fn result_fail(self) -> bool {
		self.code() == 0x01
	}

	pub fn instruction_error(self) -> bool {
		self.code() == 0x02
	}

	pub fn crc_error(self) -> bool {
		self.code() == 0x03
	}

	pub fn data_range_error(self) -> bool {
		self.code() == 0x04
	}

	pub fn data_length_error(self) -> bool {
		self.code() == 0x05
	}

	pub fn data_limit_error(self) -> bool {
		self.code() == 0x06
	}

	pub fn access_error(self) -> bool {
		self.code() == 0x07
	}
}

impl std::fmt::Display for MotorError {
	fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
		if self.is_ok() && !self.alert() {
			return write!(f, "no error");
		}
		let name = match self.code() {
			0x00 => "none",
			0x01 => "result fail",
			0x02 => "instruction error",
			0x03 => "crc error",
			0x04 => "data range error",
			0x05 => "data length error",
			0x06 => "data limit error",
			0x07 => "access error",
			other => return write!(f, "unknown error code {:#04X}{}", other, if self.alert() { " (+ hardware alert)" } else { "" }),
		};
		if self.alert() {
			write!(f, "{} (+ hardware alert)", name)
		} else {
			write!(f, "{}", name)
		}
	}
}

impl std::error::Error for MotorError {}

/// Failure of a read over the transport + codec layer.
#[derive(Debug)]
pub enum ReadError<E> {
	Io(E),
	Protocol(ProtocolError),
}

impl<E> From<ProtocolError> for ReadError<E> {
	fn from(other: ProtocolError) -> Self {
		Self::Protocol(other)
	}
}

impl<E: std::fmt::Debug + std::fmt::Display> std::fmt::Display for ReadError<E> {
	fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
		match self {
			Self::Io(e) => write!(f, "{}", e),
			Self::Protocol(e) => write!(f, "{}", e),
		}
	}
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for ReadError<E> {}

/// Failure of a write over the transport + codec layer.
#[derive(Debug)]
pub enum WriteError<E> {
	Io(E),
	Protocol(ProtocolError),
}

impl<E> From<ProtocolError> for WriteError<E> {
	fn from(other: ProtocolError) -> Self {
		Self::Protocol(other)
	}
}

impl<E: std::fmt::Debug + std::fmt::Display> std::fmt::Display for WriteError<E> {
	fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
		match self {
			Self::Io(e) => write!(f, "{}", e),
			Self::Protocol(e) => write!(f, "{}", e),
		}
	}
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for WriteError<E> {}

/// A single transport-level failure, independent of which concrete adapter produced it.
#[derive(Debug)]
pub enum TransportError {
	Io(std::io::Error),
	Timeout,
	Unsupported(&'static str),
}

impl std::fmt::Display for TransportError {
	fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
		match self {
			Self::Io(e) => write!(f, "{}", e),
			Self::Timeout => write!(f, "operation timed out"),
			Self::Unsupported(what) => write!(f, "unsupported on this platform: {}", what),
		}
	}
}

impl std::error::Error for TransportError {}

impl From<std::io::Error> for TransportError {
	fn from(other: std::io::Error) -> Self {
		if other.kind() == std::io::ErrorKind::TimedOut {
			Self::Timeout
		} else {
			Self::Io(other)
		}
	}
}

/// Failure of a whole transaction submitted to the engine.
#[derive(Debug)]
pub enum TransactionError {
	Timeout,
	Cancelled,
	TransportFailed(TransportError),
	Protocol(ProtocolError),
}

impl From<TransportError> for TransactionError {
	fn from(other: TransportError) -> Self {
		Self::TransportFailed(other)
	}
}

impl From<ProtocolError> for TransactionError {
	fn from(other: ProtocolError) -> Self {
		Self::Protocol(other)
	}
}

impl std::fmt::Display for TransactionError {
	fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
		match self {
			Self::Timeout => write!(f, "transaction timed out"),
			Self::Cancelled => write!(f, "transaction was cancelled"),
			Self::TransportFailed(e) => write!(f, "transport failure: {}", e),
			Self::Protocol(e) => write!(f, "protocol error: {}", e),
		}
	}
}

impl std::error::Error for TransactionError {}

/// Caller misuse: bad arguments, unknown control-table items, capacity overruns.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum UsageError {
	NotConnected,
	UnknownItem(String),
	ExceedsMax { total: usize, max: usize },
	MissingValue(String),
	LengthMismatch { motor_id: u8 },
	BlockNotFound(String),
	TorqueEnabled,
}

impl std::fmt::Display for UsageError {
	fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
		match self {
			Self::NotConnected => write!(f, "controller is not connected"),
			Self::UnknownItem(name) => write!(f, "unknown control table item {:?}", name),
			Self::ExceedsMax { total, max } => write!(f, "indirect block of {} bytes exceeds capacity of {} bytes", total, max),
			Self::MissingValue(name) => write!(f, "missing value for item {:?}", name),
			Self::LengthMismatch { motor_id } => write!(f, "data length mismatch for motor {}", motor_id),
			Self::BlockNotFound(name) => write!(f, "no indirect block named {:?}", name),
			Self::TorqueEnabled => write!(f, "refusing indirect block setup while torque is enabled"),
		}
	}
}

impl std::error::Error for UsageError {}

/// Top-level error returned by the device façade: either the request never completed,
/// or it completed and the device itself reported an error.
#[derive(Debug)]
pub enum DeviceError {
	Transaction(TransactionError),
	Usage(UsageError),
}

impl From<TransactionError> for DeviceError {
	fn from(other: TransactionError) -> Self {
		Self::Transaction(other)
	}
}

impl From<UsageError> for DeviceError {
	fn from(other: UsageError) -> Self {
		Self::Usage(other)
	}
}

impl std::fmt::Display for DeviceError {
	fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
		match self {
			Self::Transaction(e) => write!(f, "{}", e),
			Self::Usage(e) => write!(f, "{}", e),
		}
	}
}

impl std::error::Error for DeviceError {}
