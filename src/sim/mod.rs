//! Simulated bus with 24xx EEPROMs attached.
//!
//! Implements `Hardware` so the transaction engine can run without a
//! board; faults can be injected to drive every failure path.

use crate::twi::{
	Ack,
	Condition,
	Direction,
	Hardware,
	Line,
};

const MEMORY_SIZE: usize = 0x1_0000;
// polls until a triggered condition or transmission completes
const LATENCY: u32 = 1;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Event {
	Start,
	Restart,
	Stop,
	/// byte transmitted by the master and the ack it got
	Byte(u8, Ack),
	/// byte shifted in by the master
	Received(u8),
	/// ack sent by the master
	Acknowledged(Ack),
	/// stop condition bit-banged during bus recovery
	RecoveryStop,
}

/// Byte counts are relative to the moment the fault is injected.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Fault {
	/// collision flag is found set at the next sample
	PendingCollision,
	/// collision when the condition is triggered next
	CollisionOn(Condition),
	/// collision when the condition completes next
	CollisionAfter(Condition),
	/// condition never completes
	Stuck(Condition),
	CollisionOnByte(usize),
	NackByte(usize),
	/// transmission never completes
	StuckTransmit,
	ReceiveOverflow,
	ReceiveNeverFills,
	WriteCollisionOnStart,
	/// a slave keeps SDA low for that many clock pulses
	HoldData { clocks: u32 },
	/// something keeps SCL low for good
	HoldClock,
}

struct Device {
	select: u8,
	memory: Vec<u8>,
	pointer: usize,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Phase {
	Idle,
	Control,
	AddressHigh(usize),
	AddressLow(usize, u8),
	Writing(usize),
	Reading(usize),
	// not addressed; bytes are not acknowledged
	Ignored,
}

fn line_index(line: Line) -> usize {
	match line {
		Line::Clock => 0,
		Line::Data => 1,
	}
}

pub struct SimulatedBus {
	devices: Vec<Device>,
	phase: Phase,
	events: Vec<Event>,
	faults: Vec<Fault>,
	sent: usize,

	enabled: bool,
	divisor: u16,
	pending: Option<(Condition, u32)>,
	transmitting: u32,
	stuck_transmit: bool,
	last_ack: Ack,
	ack_data: Ack,
	receive_buffer: Option<u8>,
	bus_collision: bool,
	write_collision: bool,

	latch: [bool; 2],
	output: [bool; 2],
	hold_data: u32,
	hold_clock: bool,
	clock_pulses: u32,
}

impl Default for SimulatedBus {
	fn default() -> Self {
		SimulatedBus::new()
	}
}

impl SimulatedBus {
	pub fn new() -> Self {
		SimulatedBus {
			devices: Vec::new(),
			phase: Phase::Idle,
			events: Vec::new(),
			faults: Vec::new(),
			sent: 0,
			enabled: false,
			divisor: 0,
			pending: None,
			transmitting: 0,
			stuck_transmit: false,
			last_ack: Ack::Nack,
			ack_data: Ack::Ack,
			receive_buffer: None,
			bus_collision: false,
			write_collision: false,
			latch: [true, true],
			output: [false, false],
			hold_data: 0,
			hold_clock: false,
			clock_pulses: 0,
		}
	}

	/// Attach an erased device with chip select `select` (0..7)
	pub fn attach(&mut self, select: u8) {
		self.attach_with(select, vec![0xff; MEMORY_SIZE]);
	}

	/// Attach a device with initial contents (padded with 0xff)
	pub fn attach_with(&mut self, select: u8, mut memory: Vec<u8>) {
		assert!(select < 8);
		memory.resize(MEMORY_SIZE, 0xff);
		self.devices.retain(|d| d.select != select);
		self.devices.push(Device {
			select,
			memory,
			pointer: 0,
		});
	}

	pub fn memory(&self, select: u8) -> Option<&[u8]> {
		self.devices.iter().find(|d| d.select == select).map(|d| &d.memory[..])
	}

	pub fn load(&mut self, select: u8, address: u16, data: &[u8]) -> crate::AResult<()> {
		let device = match self.devices.iter_mut().find(|d| d.select == select) {
			Some(d) => d,
			None => bail!("no device {} attached", select),
		};
		let start = usize::from(address);
		ensure!(start + data.len() <= MEMORY_SIZE, "{} bytes at 0x{:04x} don't fit", data.len(), address);
		device.memory[start..start + data.len()].copy_from_slice(data);
		Ok(())
	}

	pub fn inject(&mut self, fault: Fault) {
		match fault {
			Fault::CollisionOnByte(n) => self.faults.push(Fault::CollisionOnByte(self.sent + n)),
			Fault::NackByte(n) => self.faults.push(Fault::NackByte(self.sent + n)),
			Fault::StuckTransmit => self.stuck_transmit = true,
			Fault::HoldData { clocks } => self.hold_data = clocks,
			Fault::HoldClock => self.hold_clock = true,
			fault => self.faults.push(fault),
		}
	}

	pub fn events(&self) -> &[Event] {
		&self.events
	}

	pub fn clock_pulses(&self) -> u32 {
		self.clock_pulses
	}

	pub fn is_enabled(&self) -> bool {
		self.enabled
	}

	pub fn baud_rate(&self) -> u16 {
		self.divisor
	}

	// remove a one-shot fault
	fn take(&mut self, fault: Fault) -> bool {
		match self.faults.iter().position(|f| *f == fault) {
			Some(pos) => {
				self.faults.remove(pos);
				true
			},
			None => false,
		}
	}

	fn has(&self, fault: Fault) -> bool {
		self.faults.contains(&fault)
	}

	fn device_for(&self, control: u8) -> Option<usize> {
		if control & 0xf0 != 0xa0 {
			return None;
		}
		let select = (control >> 1) & 0x7;
		self.devices.iter().position(|d| d.select == select)
	}

	// slave side of a transmitted byte
	fn deliver(&mut self, data: u8) -> Ack {
		let (phase, ack) = match self.phase {
			Phase::Control => match self.device_for(data) {
				Some(d) if data & 1 == 1 => (Phase::Reading(d), Ack::Ack),
				Some(d) => (Phase::AddressHigh(d), Ack::Ack),
				None => (Phase::Ignored, Ack::Nack),
			},
			Phase::AddressHigh(d) => (Phase::AddressLow(d, data), Ack::Ack),
			Phase::AddressLow(d, high) => {
				self.devices[d].pointer = (usize::from(high) << 8) | usize::from(data);
				(Phase::Writing(d), Ack::Ack)
			},
			Phase::Writing(d) => {
				let device = &mut self.devices[d];
				device.memory[device.pointer] = data;
				device.pointer = (device.pointer + 1) % MEMORY_SIZE;
				(Phase::Writing(d), Ack::Ack)
			},
			phase => (phase, Ack::Nack),
		};
		self.phase = phase;
		ack
	}

	fn shift_in(&mut self) -> u8 {
		match self.phase {
			Phase::Reading(d) => {
				let device = &mut self.devices[d];
				let data = device.memory[device.pointer];
				device.pointer = (device.pointer + 1) % MEMORY_SIZE;
				data
			},
			// nobody drives SDA
			_ => 0xff,
		}
	}

	fn level(&self, line: Line) -> bool {
		let i = line_index(line);
		let held = match line {
			Line::Clock => self.hold_clock,
			Line::Data => self.hold_data > 0,
		};
		!held && (!self.output[i] || self.latch[i])
	}

	// update raw line state and watch for edges
	fn drive(&mut self, line: Line, update: impl FnOnce(&mut Self)) {
		let before = self.level(line);
		update(self);
		let after = self.level(line);
		if before || !after {
			return;
		}
		match line {
			Line::Clock => {
				self.clock_pulses += 1;
				if self.hold_data > 0 {
					self.hold_data -= 1;
				}
			},
			Line::Data => {
				if self.level(Line::Clock) {
					self.events.push(Event::RecoveryStop);
					self.phase = Phase::Idle;
				}
			},
		}
	}
}

impl Hardware for SimulatedBus {
	fn set_baud_rate(&mut self, divisor: u16) {
		self.divisor = divisor;
	}

	fn set_enabled(&mut self, enabled: bool) {
		self.enabled = enabled;
	}

	fn trigger(&mut self, condition: Condition) {
		if self.take(Fault::CollisionOn(condition)) {
			self.bus_collision = true;
			// a stop still completes
			if condition != Condition::Stop {
				return;
			}
		}

		match condition {
			Condition::Start => {
				if self.take(Fault::WriteCollisionOnStart) {
					self.write_collision = true;
					return;
				}
				self.phase = Phase::Control;
				self.events.push(Event::Start);
			},
			Condition::Restart => {
				self.phase = Phase::Control;
				self.events.push(Event::Restart);
			},
			Condition::Stop => {
				self.phase = Phase::Idle;
				self.events.push(Event::Stop);
			},
			Condition::Receive => {
				if self.has(Fault::ReceiveNeverFills) {
					return;
				}
				let data = self.shift_in();
				self.receive_buffer = Some(data);
				self.events.push(Event::Received(data));
			},
			Condition::Acknowledge => {
				self.events.push(Event::Acknowledged(self.ack_data));
				if self.ack_data == Ack::Nack {
					if let Phase::Reading(_) = self.phase {
						self.phase = Phase::Ignored;
					}
				}
			},
		}
		self.pending = Some((condition, LATENCY));
	}

	fn is_pending(&mut self, condition: Condition) -> bool {
		if self.has(Fault::Stuck(condition)) {
			return true;
		}
		match self.pending {
			Some((c, polls)) if c == condition => {
				if polls > 0 {
					self.pending = Some((c, polls - 1));
					return true;
				}
				self.pending = None;
				if self.take(Fault::CollisionAfter(condition)) {
					self.bus_collision = true;
				}
				false
			},
			_ => false,
		}
	}

	fn cancel(&mut self, condition: Condition) {
		if let Some((c, _)) = self.pending {
			if c == condition {
				self.pending = None;
			}
		}
	}

	fn transmit(&mut self, data: u8) {
		let index = self.sent;
		self.sent += 1;
		self.transmitting = LATENCY;

		let ack = if self.take(Fault::CollisionOnByte(index)) {
			self.bus_collision = true;
			self.phase = Phase::Ignored;
			Ack::Nack
		} else if self.take(Fault::NackByte(index)) {
			Ack::Nack
		} else {
			self.deliver(data)
		};
		self.last_ack = ack;
		self.events.push(Event::Byte(data, ack));
	}

	fn is_transmitting(&mut self) -> bool {
		if self.stuck_transmit {
			return true;
		}
		if self.transmitting > 0 {
			self.transmitting -= 1;
			return true;
		}
		false
	}

	fn ack_status(&mut self) -> Ack {
		self.last_ack
	}

	fn is_receive_full(&mut self) -> bool {
		self.receive_buffer.is_some()
	}

	fn is_receive_overflow(&mut self) -> bool {
		self.take(Fault::ReceiveOverflow)
	}

	fn receive(&mut self) -> u8 {
		self.receive_buffer.take().unwrap_or(0xff)
	}

	fn set_ack_data(&mut self, ack: Ack) {
		self.ack_data = ack;
	}

	fn bus_collision(&mut self) -> bool {
		if self.take(Fault::PendingCollision) {
			self.bus_collision = true;
		}
		self.bus_collision
	}

	fn clear_bus_collision(&mut self) {
		self.bus_collision = false;
	}

	fn write_collision(&mut self) -> bool {
		self.write_collision
	}

	fn clear_write_collision(&mut self) {
		self.write_collision = false;
	}

	fn set_line_direction(&mut self, line: Line, direction: Direction) {
		let i = line_index(line);
		self.drive(line, |bus| bus.output[i] = direction == Direction::Output);
	}

	fn set_line(&mut self, line: Line, high: bool) {
		let i = line_index(line);
		self.drive(line, |bus| bus.latch[i] = high);
	}

	fn read_line(&mut self, line: Line) -> bool {
		self.level(line)
	}

	fn delay_us(&mut self, _us: u32) {
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn addressed_write_and_read() {
		let mut sim = SimulatedBus::new();
		sim.attach(2);
		sim.trigger(Condition::Start);
		for &b in &[0xa4, 0x00, 0x08, 0x11, 0x22] {
			sim.transmit(b);
			assert_eq!(sim.ack_status(), Ack::Ack);
		}
		sim.trigger(Condition::Stop);
		assert_eq!(&sim.memory(2).unwrap()[0x08..0x0a], &[0x11, 0x22]);

		sim.trigger(Condition::Start);
		sim.transmit(0xa5);
		sim.trigger(Condition::Receive);
		assert!(sim.is_receive_full());
		// pointer continues after the written bytes
		assert_eq!(sim.receive(), 0xff);
		assert!(!sim.is_receive_full());
	}

	#[test]
	fn unknown_device_nacks() {
		let mut sim = SimulatedBus::new();
		sim.attach(0);
		sim.trigger(Condition::Start);
		sim.transmit(0xa2);
		assert_eq!(sim.ack_status(), Ack::Nack);
		sim.transmit(0x00);
		assert_eq!(sim.ack_status(), Ack::Nack);
	}

	#[test]
	fn conditions_complete_after_latency() {
		let mut sim = SimulatedBus::new();
		sim.trigger(Condition::Start);
		assert!(sim.is_pending(Condition::Start));
		assert!(!sim.is_pending(Condition::Start));
		assert!(!sim.is_pending(Condition::Stop));
	}

	#[test]
	fn held_data_line() {
		let mut sim = SimulatedBus::new();
		sim.inject(Fault::HoldData { clocks: 2 });
		sim.set_line_direction(Line::Clock, Direction::Output);
		assert!(!sim.read_line(Line::Data));
		for _ in 0..2 {
			sim.set_line(Line::Clock, false);
			assert!(!sim.read_line(Line::Clock));
			sim.set_line(Line::Clock, true);
		}
		assert!(sim.read_line(Line::Data));
		assert_eq!(sim.clock_pulses(), 2);
	}
}
