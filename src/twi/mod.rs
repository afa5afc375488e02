//! Two-wire bus master for 24xx serial EEPROMs.
//!
//! The bus engine (baud rate generator, condition generators, shift
//! registers and status flags) is provided through `Hardware`; `Bus` adds
//! the sequencing on top:
//! - start / repeated start / stop conditions, each checked for bus
//!   collisions
//! - recovery of a bus held low by a slave that lost track of the
//!   transfer (up to 10 clocks, then a stop condition)
//! - byte transmit with ack status, byte receive, ack generation
//! - 16-bit words as two bytes, high byte first
//!
//! Failures are reported as composite `ErrorCode`s; each level adds a
//! stage tag on the way up.

mod config;
mod error;
mod hardware;
mod low_level;
mod transport;

pub use self::config::{
	BusConfig,
	Pin,
	ReceiveWait,
	StopCollisionPolicy,
	parse_number,
};

pub use self::error::{
	ErrorCode,
	ErrorKind,
	ErrorState,
	Stage,
};

pub use self::hardware::{
	Ack,
	Condition,
	Direction,
	Hardware,
	Line,
	reliable_sleep,
};

pub use self::low_level::Bus;
