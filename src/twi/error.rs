use std::fmt;

use failure::Fail;

// bits 0..7
const KIND_MASK: u32 = 0x0000_00ff;
// bits 8..15: bus step in the low nibble, word half in the high nibble
const BUS_STAGE_MASK: u32 = 0x0000_0f00;
const WORD_STAGE_MASK: u32 = 0x0000_f000;
// bits 16..23
const STEP_MASK: u32 = 0x00ff_0000;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum ErrorKind {
	BusCollision = 1,
	WriteBufferCollision = 2,
	DeviceNotResponding = 3,
	ReadBufferOverflow = 4,
	ReadTimeout = 5,
	/// bus recovery couldn't release the lines
	FatalBusError = 6,
	/// a bounded wait for the bus engine ran out
	BusTimeout = 7,
}

impl ErrorKind {
	pub fn from_code(code: u8) -> Option<Self> {
		Some(match code {
			1 => ErrorKind::BusCollision,
			2 => ErrorKind::WriteBufferCollision,
			3 => ErrorKind::DeviceNotResponding,
			4 => ErrorKind::ReadBufferOverflow,
			5 => ErrorKind::ReadTimeout,
			6 => ErrorKind::FatalBusError,
			7 => ErrorKind::BusTimeout,
			_ => return None,
		})
	}

	pub fn code(self) -> u8 {
		self as u8
	}

	pub fn description(self) -> &'static str {
		match self {
			ErrorKind::BusCollision => "bus collision",
			ErrorKind::WriteBufferCollision => "write buffer collision",
			ErrorKind::DeviceNotResponding => "device not responding",
			ErrorKind::ReadBufferOverflow => "read buffer overflow",
			ErrorKind::ReadTimeout => "read timeout",
			ErrorKind::FatalBusError => "fatal bus error",
			ErrorKind::BusTimeout => "bus timeout",
		}
	}
}

impl fmt::Display for ErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.write_str(self.description())
	}
}

/// Protocol step tag; OR'd into an `ErrorCode` by every level a failure
/// passes through.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Stage(pub u32);

impl Stage {
	pub const START1: Stage = Stage(0x100);
	pub const START2: Stage = Stage(0x200);
	pub const RESTART: Stage = Stage(0x300);
	pub const SEND: Stage = Stage(0x400);
	pub const STOP: Stage = Stage(0x500);
	pub const SEND_ACK: Stage = Stage(0x600);

	pub const WORD_SEND_HIGH: Stage = Stage(0x1000);
	pub const WORD_SEND_LOW: Stage = Stage(0x2000);

	pub const WRITE_START: Stage = Stage(0x1_0000);
	pub const WRITE_CALL: Stage = Stage(0x2_0000);
	pub const WRITE_ADDR: Stage = Stage(0x3_0000);
	pub const WRITE_SEND: Stage = Stage(0x4_0000);
	pub const WRITE_STOP: Stage = Stage(0x5_0000);
	pub const READ_START: Stage = Stage(0x6_0000);
	pub const READ_CALL: Stage = Stage(0x7_0000);
	pub const READ_ADDR: Stage = Stage(0x8_0000);
	pub const READ_RESTART: Stage = Stage(0x9_0000);
	pub const READ_READ_ADDR: Stage = Stage(0xA_0000);
	pub const READ_NACK: Stage = Stage(0xB_0000);
	pub const READ_END: Stage = Stage(0xC_0000);
	pub const POLL_START: Stage = Stage(0xD_0000);
	pub const POLL_SEND: Stage = Stage(0xE_0000);
	pub const POLL_STOP: Stage = Stage(0xF_0000);

	pub fn name(self) -> Option<&'static str> {
		Some(match self {
			Stage::START1 => "start (entering)",
			Stage::START2 => "start (waiting)",
			Stage::RESTART => "restart",
			Stage::SEND => "send",
			Stage::STOP => "stop",
			Stage::SEND_ACK => "send ack",
			Stage::WORD_SEND_HIGH => "word high byte",
			Stage::WORD_SEND_LOW => "word low byte",
			Stage::WRITE_START => "write start",
			Stage::WRITE_CALL => "write call",
			Stage::WRITE_ADDR => "write address",
			Stage::WRITE_SEND => "write data",
			Stage::WRITE_STOP => "write stop",
			Stage::READ_START => "read start",
			Stage::READ_CALL => "read call",
			Stage::READ_ADDR => "read address",
			Stage::READ_RESTART => "read restart",
			Stage::READ_READ_ADDR => "read device address",
			Stage::READ_NACK => "read data",
			Stage::READ_END => "read end",
			Stage::POLL_START => "poll start",
			Stage::POLL_SEND => "poll send",
			Stage::POLL_STOP => "poll stop",
			_ => return None,
		})
	}
}

impl fmt::Debug for Stage {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self.name() {
			Some(name) => write!(f, "0x{:05x} ({})", self.0, name),
			None => write!(f, "0x{:05x}", self.0),
		}
	}
}

/// Composite failure code: kind in the low byte, stage tags above.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ErrorCode(pub u32);

impl ErrorCode {
	pub fn new(kind: ErrorKind) -> Self {
		ErrorCode(u32::from(kind.code()))
	}

	pub fn with(self, stage: Stage) -> Self {
		ErrorCode(self.0 | stage.0)
	}

	pub fn kind(&self) -> Option<ErrorKind> {
		ErrorKind::from_code(self.error())
	}

	pub fn is(&self, kind: ErrorKind) -> bool {
		self.error() == kind.code()
	}

	/// bits 0..7
	pub fn error(&self) -> u8 {
		(self.0 & KIND_MASK) as u8
	}

	/// bits 8..15
	pub fn error2(&self) -> u8 {
		(self.0 >> 8) as u8
	}

	/// bits 16..23
	pub fn error3(&self) -> u8 {
		((self.0 & STEP_MASK) >> 16) as u8
	}

	pub fn bus_stage(&self) -> Option<Stage> {
		match self.0 & BUS_STAGE_MASK {
			0 => None,
			s => Some(Stage(s)),
		}
	}

	pub fn word_stage(&self) -> Option<Stage> {
		match self.0 & WORD_STAGE_MASK {
			0 => None,
			s => Some(Stage(s)),
		}
	}

	pub fn step(&self) -> Option<Stage> {
		match self.0 & STEP_MASK {
			0 => None,
			s => Some(Stage(s)),
		}
	}
}

impl fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self.kind() {
			Some(kind) => write!(f, "{}", kind)?,
			None => write!(f, "unknown error {}", self.error())?,
		}
		let stages = [self.step(), self.word_stage(), self.bus_stage()];
		for stage in stages.iter().filter_map(|s| *s) {
			match stage.name() {
				Some(name) => write!(f, " in {}", name)?,
				None => write!(f, " in stage 0x{:05x}", stage.0)?,
			}
		}
		write!(f, " (0x{:06x})", self.0)
	}
}

impl fmt::Debug for ErrorCode {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "0x{:06x} (kind: {:?}", self.0, self.kind())?;
		if let Some(s) = self.step() { write!(f, ", step: {:?}", s)?; }
		if let Some(s) = self.word_stage() { write!(f, ", word: {:?}", s)?; }
		if let Some(s) = self.bus_stage() { write!(f, ", bus: {:?}", s)?; }
		write!(f, ")")
	}
}

impl Fail for ErrorCode {}

/// Last failure seen by a driver. Only written on failing paths; a later
/// success leaves the previous code in place.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct ErrorState {
	last: ErrorCode,
}

impl ErrorState {
	pub fn record(&mut self, code: ErrorCode) {
		self.last = code;
	}

	pub fn code(&self) -> ErrorCode {
		self.last
	}

	pub fn error(&self) -> u8 {
		self.last.error()
	}

	pub fn error2(&self) -> u8 {
		self.last.error2()
	}

	pub fn error3(&self) -> u8 {
		self.last.error3()
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn compose_and_decode() {
		let code = ErrorCode::new(ErrorKind::BusCollision)
			.with(Stage::SEND)
			.with(Stage::WORD_SEND_LOW)
			.with(Stage::READ_ADDR);
		assert_eq!(code.0, 0x8_2401);
		assert_eq!(code.kind(), Some(ErrorKind::BusCollision));
		assert_eq!(code.error(), 1);
		assert_eq!(code.error2(), 0x24);
		assert_eq!(code.error3(), 0x08);
		assert_eq!(code.bus_stage(), Some(Stage::SEND));
		assert_eq!(code.word_stage(), Some(Stage::WORD_SEND_LOW));
		assert_eq!(code.step(), Some(Stage::READ_ADDR));
	}

	#[test]
	fn display_names_stages() {
		let code = ErrorCode::new(ErrorKind::DeviceNotResponding).with(Stage::WRITE_CALL);
		assert_eq!(code.to_string(), "device not responding in write call (0x020003)");
		assert_eq!(ErrorCode(0x42).to_string(), "unknown error 66 (0x000042)");
	}

	#[test]
	fn state_keeps_last_failure() {
		let mut state = ErrorState::default();
		assert_eq!(state.code(), ErrorCode(0));
		state.record(ErrorCode::new(ErrorKind::ReadTimeout).with(Stage::READ_NACK));
		state.record(ErrorCode::new(ErrorKind::BusCollision).with(Stage::STOP).with(Stage::POLL_STOP));
		assert_eq!(state.error(), ErrorKind::BusCollision.code());
		assert_eq!(state.error2(), 0x05);
		assert_eq!(state.error3(), 0x0f);
	}
}
