/* Register layout of the PIC24F I2C module and GPIO ports (DS39881) */

use std::fmt;

use super::Mapped;
use crate::twi::{
	Ack,
	BusConfig,
	Condition,
	Direction,
	Hardware,
	Line,
	Pin,
};

// SFR offsets
const I2C1_BASE: usize = 0x0200;
const I2C_STRIDE: usize = 0x0010;
const I2C_RCV: usize = 0x0;
const I2C_TRN: usize = 0x2;
const I2C_BRG: usize = 0x4;
const I2C_CON: usize = 0x6;
const I2C_STAT: usize = 0x8;

const PORTA_BASE: usize = 0x02c0;
const PORT_STRIDE: usize = 0x0008;
const PORT_TRIS: usize = 0x0;
const PORT_PORT: usize = 0x2;
const PORT_LAT: usize = 0x4;

/// Size of the SFR window covering I2C and port registers
pub const REGISTER_WINDOW: usize = 0x0400;

// I2CxCON
const CON_I2CEN: u16 = 0x8000;
const CON_ACKDT: u16 = 0x0020;
const CON_ACKEN: u16 = 0x0010;
const CON_RCEN: u16 = 0x0008;
const CON_PEN: u16 = 0x0004;
const CON_RSEN: u16 = 0x0002;
const CON_SEN: u16 = 0x0001;

// I2CxSTAT
const STAT_ACKSTAT: u16 = 0x8000;
const STAT_TRSTAT: u16 = 0x4000;
const STAT_BCL: u16 = 0x0400;
const STAT_IWCOL: u16 = 0x0080;
const STAT_I2COV: u16 = 0x0040;
const STAT_RBF: u16 = 0x0002;

fn condition_bit(condition: Condition) -> u16 {
	match condition {
		Condition::Start => CON_SEN,
		Condition::Restart => CON_RSEN,
		Condition::Stop => CON_PEN,
		Condition::Receive => CON_RCEN,
		Condition::Acknowledge => CON_ACKEN,
	}
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct I2cStatus(pub u16);

impl I2cStatus {
	pub fn is_nack(&self) -> bool {
		0 != self.0 & STAT_ACKSTAT
	}
	pub fn is_transmitting(&self) -> bool {
		0 != self.0 & STAT_TRSTAT
	}
	pub fn is_bus_collision(&self) -> bool {
		0 != self.0 & STAT_BCL
	}
	pub fn is_write_collision(&self) -> bool {
		0 != self.0 & STAT_IWCOL
	}
	pub fn is_overflow(&self) -> bool {
		0 != self.0 & STAT_I2COV
	}
	pub fn is_receive_full(&self) -> bool {
		0 != self.0 & STAT_RBF
	}
}

impl fmt::Debug for I2cStatus {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "0x{:04x} (", self.0)?;
		if self.is_nack() { write!(f, " [ACKSTAT]")?; }
		if self.is_transmitting() { write!(f, " [TRSTAT]")?; }
		if self.is_bus_collision() { write!(f, " [BCL]")?; }
		if self.is_write_collision() { write!(f, " [IWCOL]")?; }
		if self.is_overflow() { write!(f, " [I2COV]")?; }
		if self.is_receive_full() { write!(f, " [RBF]")?; }
		write!(f, " )")
	}
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
struct PortPin {
	base: usize,
	mask: u16,
}

impl PortPin {
	fn new(pin: Pin) -> Self {
		PortPin {
			base: PORTA_BASE + PORT_STRIDE * usize::from(pin.port),
			mask: pin.mask(),
		}
	}
}

/// I2C module `bus` of a PIC24 whose SFR space is mapped at offset 0
pub struct Pic24Bus {
	regs: Mapped,
	base: usize,
	scl: PortPin,
	sda: PortPin,
}

impl Pic24Bus {
	pub fn new(regs: Mapped, config: &BusConfig) -> crate::AResult<Self> {
		ensure!(config.bus >= 1 && config.bus <= 3, "PIC24 has no I2C module {}", config.bus);
		ensure!(config.scl.port < 8 && config.sda.port < 8, "invalid port for {} / {}", config.scl, config.sda);
		ensure!(regs.len() >= REGISTER_WINDOW, "register window too small: 0x{:x}", regs.len());
		Ok(Pic24Bus {
			regs,
			base: I2C1_BASE + I2C_STRIDE * usize::from(config.bus - 1),
			scl: PortPin::new(config.scl),
			sda: PortPin::new(config.sda),
		})
	}

	fn read(&self, reg: usize) -> u16 {
		self.regs.read_word(self.base + reg)
	}

	fn write(&mut self, reg: usize, data: u16) {
		let base = self.base;
		self.regs.write_word(base + reg, data);
	}

	fn modify(&mut self, offset: usize, mask: u16, set: bool) {
		let value = self.regs.read_word(offset);
		let value = if set { value | mask } else { value & !mask };
		self.regs.write_word(offset, value);
	}

	fn con_modify(&mut self, mask: u16, set: bool) {
		let offset = self.base + I2C_CON;
		self.modify(offset, mask, set);
	}

	fn stat_clear(&mut self, mask: u16) {
		let offset = self.base + I2C_STAT;
		self.modify(offset, mask, false);
	}

	pub fn status(&self) -> I2cStatus {
		I2cStatus(self.read(I2C_STAT))
	}

	fn pin(&self, line: Line) -> PortPin {
		match line {
			Line::Clock => self.scl,
			Line::Data => self.sda,
		}
	}
}

impl Hardware for Pic24Bus {
	fn set_baud_rate(&mut self, divisor: u16) {
		self.write(I2C_BRG, divisor);
	}

	fn set_enabled(&mut self, enabled: bool) {
		self.con_modify(CON_I2CEN, enabled);
	}

	fn trigger(&mut self, condition: Condition) {
		self.con_modify(condition_bit(condition), true);
	}

	fn is_pending(&mut self, condition: Condition) -> bool {
		0 != self.read(I2C_CON) & condition_bit(condition)
	}

	fn cancel(&mut self, condition: Condition) {
		self.con_modify(condition_bit(condition), false);
	}

	fn transmit(&mut self, data: u8) {
		self.write(I2C_TRN, u16::from(data));
	}

	fn is_transmitting(&mut self) -> bool {
		self.status().is_transmitting()
	}

	fn ack_status(&mut self) -> Ack {
		Ack::from(self.status().is_nack())
	}

	fn is_receive_full(&mut self) -> bool {
		self.status().is_receive_full()
	}

	fn is_receive_overflow(&mut self) -> bool {
		self.status().is_overflow()
	}

	fn receive(&mut self) -> u8 {
		self.read(I2C_RCV) as u8
	}

	fn set_ack_data(&mut self, ack: Ack) {
		self.con_modify(CON_ACKDT, ack == Ack::Nack);
	}

	fn bus_collision(&mut self) -> bool {
		self.status().is_bus_collision()
	}

	fn clear_bus_collision(&mut self) {
		self.stat_clear(STAT_BCL);
	}

	fn write_collision(&mut self) -> bool {
		self.status().is_write_collision()
	}

	fn clear_write_collision(&mut self) {
		self.stat_clear(STAT_IWCOL);
	}

	fn set_line_direction(&mut self, line: Line, direction: Direction) {
		let pin = self.pin(line);
		// TRIS bit set = input
		self.modify(pin.base + PORT_TRIS, pin.mask, direction == Direction::Input);
	}

	fn set_line(&mut self, line: Line, high: bool) {
		let pin = self.pin(line);
		self.modify(pin.base + PORT_LAT, pin.mask, high);
	}

	fn read_line(&mut self, line: Line) -> bool {
		let pin = self.pin(line);
		0 != self.regs.read_word(pin.base + PORT_PORT) & pin.mask
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn status_flags() {
		let stat = I2cStatus(STAT_ACKSTAT | STAT_BCL | STAT_RBF);
		assert!(stat.is_nack());
		assert!(stat.is_bus_collision());
		assert!(stat.is_receive_full());
		assert!(!stat.is_transmitting());
		assert!(!stat.is_write_collision());
		assert_eq!(format!("{:?}", stat), "0x8402 ( [ACKSTAT] [BCL] [RBF] )");
	}

	#[test]
	fn pin_registers() {
		let rb8 = PortPin::new(Pin { port: 1, bit: 8 });
		assert_eq!(rb8.base, 0x02c8);
		assert_eq!(rb8.mask, 0x0100);
		assert_eq!(condition_bit(Condition::Restart), 0x0002);
	}
}
