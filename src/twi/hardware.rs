use std::thread;
use std::time::{
	Duration,
	Instant,
};

pub fn reliable_sleep(mut duration: Duration) {
	loop {
		let now = Instant::now();
		thread::sleep(duration);
		let elapsed = now.elapsed();
		if elapsed >= duration {
			return;
		}
		duration -= elapsed;
	}
}

/// Acknowledgment bit as driven by the receiver after each byte
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Ack {
	/// bit 0: continue
	Ack,
	/// bit 1: terminate
	Nack,
}

impl Ack {
	pub fn bit(self) -> u8 {
		match self {
			Ack::Ack => 0,
			Ack::Nack => 1,
		}
	}
}

impl From<bool> for Ack {
	// the hardware status bit is set for NACK
	fn from(nack: bool) -> Self {
		match nack {
			false => Ack::Ack,
			true => Ack::Nack,
		}
	}
}

/// Sequences the bus engine generates autonomously once triggered
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Condition {
	Start,
	Restart,
	Stop,
	Receive,
	Acknowledge,
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Line {
	Clock,
	Data,
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Direction {
	/// released; an external pull-up keeps the line high
	Input,
	Output,
}

/// Everything the transaction engine needs from the bus peripheral.
///
/// Flags are polled, never cached: the engine samples each of them at
/// every decision point, as the hardware may set the collision flag at any
/// time.
pub trait Hardware {
	fn set_baud_rate(&mut self, divisor: u16);
	fn set_enabled(&mut self, enabled: bool);

	fn trigger(&mut self, condition: Condition);
	// true until the engine finished the condition
	fn is_pending(&mut self, condition: Condition) -> bool;
	fn cancel(&mut self, condition: Condition);

	fn transmit(&mut self, data: u8);
	fn is_transmitting(&mut self) -> bool;
	// ack received for the last transmitted byte
	fn ack_status(&mut self) -> Ack;

	fn is_receive_full(&mut self) -> bool;
	fn is_receive_overflow(&mut self) -> bool;
	fn receive(&mut self) -> u8;

	// ack to send with the next `Condition::Acknowledge`
	fn set_ack_data(&mut self, ack: Ack);

	fn bus_collision(&mut self) -> bool;
	fn clear_bus_collision(&mut self);
	fn write_collision(&mut self) -> bool;
	fn clear_write_collision(&mut self);

	// raw line access, only used while the engine is disabled
	fn set_line_direction(&mut self, line: Line, direction: Direction);
	fn set_line(&mut self, line: Line, high: bool);
	fn read_line(&mut self, line: Line) -> bool;

	fn delay_us(&mut self, us: u32) {
		reliable_sleep(Duration::from_micros(u64::from(us)));
	}
}

impl<'a, H: ?Sized + Hardware> Hardware for &'a mut H {
	fn set_baud_rate(&mut self, divisor: u16) {
		H::set_baud_rate(*self, divisor)
	}
	fn set_enabled(&mut self, enabled: bool) {
		H::set_enabled(*self, enabled)
	}

	fn trigger(&mut self, condition: Condition) {
		H::trigger(*self, condition)
	}
	fn is_pending(&mut self, condition: Condition) -> bool {
		H::is_pending(*self, condition)
	}
	fn cancel(&mut self, condition: Condition) {
		H::cancel(*self, condition)
	}

	fn transmit(&mut self, data: u8) {
		H::transmit(*self, data)
	}
	fn is_transmitting(&mut self) -> bool {
		H::is_transmitting(*self)
	}
	fn ack_status(&mut self) -> Ack {
		H::ack_status(*self)
	}

	fn is_receive_full(&mut self) -> bool {
		H::is_receive_full(*self)
	}
	fn is_receive_overflow(&mut self) -> bool {
		H::is_receive_overflow(*self)
	}
	fn receive(&mut self) -> u8 {
		H::receive(*self)
	}

	fn set_ack_data(&mut self, ack: Ack) {
		H::set_ack_data(*self, ack)
	}

	fn bus_collision(&mut self) -> bool {
		H::bus_collision(*self)
	}
	fn clear_bus_collision(&mut self) {
		H::clear_bus_collision(*self)
	}
	fn write_collision(&mut self) -> bool {
		H::write_collision(*self)
	}
	fn clear_write_collision(&mut self) {
		H::clear_write_collision(*self)
	}

	fn set_line_direction(&mut self, line: Line, direction: Direction) {
		H::set_line_direction(*self, line, direction)
	}
	fn set_line(&mut self, line: Line, high: bool) {
		H::set_line(*self, line, high)
	}
	fn read_line(&mut self, line: Line) -> bool {
		H::read_line(*self, line)
	}

	fn delay_us(&mut self, us: u32) {
		H::delay_us(*self, us)
	}
}
