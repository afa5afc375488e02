use std::fmt;
use std::str::FromStr;

/// What to do when a collision shows up while generating a stop condition
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum StopCollisionPolicy {
	/// fail the transaction
	Abort,
	/// remember the error in the error state, but report success
	Record,
}

impl FromStr for StopCollisionPolicy {
	type Err = failure::Error;

	fn from_str(s: &str) -> crate::AResult<Self> {
		match s {
			"abort" => Ok(StopCollisionPolicy::Abort),
			"record" => Ok(StopCollisionPolicy::Record),
			_ => bail!("invalid stop policy {:?} (expected abort or record)", s),
		}
	}
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum ReceiveWait {
	/// fail with `ReadTimeout` after polling the buffer that many times
	Bounded(u32),
	Unbounded,
}

impl FromStr for ReceiveWait {
	type Err = failure::Error;

	fn from_str(s: &str) -> crate::AResult<Self> {
		if s == "none" {
			return Ok(ReceiveWait::Unbounded);
		}
		Ok(ReceiveWait::Bounded(parse_number(s)?))
	}
}

/// Port letter and bit of a bus line (A = 0)
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pin {
	pub port: u8,
	pub bit: u8,
}

impl Pin {
	pub fn mask(self) -> u16 {
		1 << (self.bit & 0xf)
	}
}

impl fmt::Display for Pin {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "R{}{}", (b'A' + self.port) as char, self.bit)
	}
}

impl fmt::Debug for Pin {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		fmt::Display::fmt(self, f)
	}
}

impl FromStr for Pin {
	type Err = failure::Error;

	// "RB9" or "B9"
	fn from_str(s: &str) -> crate::AResult<Self> {
		let s = s.trim_start_matches('R');
		let mut chars = s.chars();
		let port = match chars.next() {
			Some(c) if c.is_ascii_uppercase() => c as u8 - b'A',
			_ => bail!("invalid pin {:?}: expected port letter", s),
		};
		let bit: u8 = chars.as_str().parse()?;
		ensure!(bit < 16, "invalid pin {:?}: bit out of range", s);
		Ok(Pin { port, bit })
	}
}

/// Runtime bus configuration handed to the driver at construction
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BusConfig {
	/// peripheral instance (1-based)
	pub bus: u8,
	pub scl: Pin,
	pub sda: Pin,
	/// target SCL frequency in Hz
	pub clock_rate: u32,
	/// instruction cycle frequency the baud rate generator runs from
	pub instruction_clock: u32,
	/// bound for condition/transmit/ack waits; `None` waits forever
	pub wait_polls: Option<u32>,
	pub receive_wait: ReceiveWait,
	pub stop_collision: StopCollisionPolicy,
}

impl Default for BusConfig {
	fn default() -> Self {
		BusConfig {
			bus: 1,
			// I2C1 on PIC24FJ64GA002
			scl: Pin { port: 1, bit: 8 },
			sda: Pin { port: 1, bit: 9 },
			clock_rate: 100_000,
			instruction_clock: 4_000_000,
			wait_polls: Some(0xffff),
			receive_wait: ReceiveWait::Bounded(0xffff),
			stop_collision: StopCollisionPolicy::Record,
		}
	}
}

impl BusConfig {
	/// I2CxBRG = FCY/FSCL - FCY/10_000_000 - 1
	pub fn baud_rate_divisor(&self) -> u16 {
		let fcy = u64::from(self.instruction_clock);
		let rate = u64::from(self.clock_rate.max(1));
		let divisor = (fcy / rate).saturating_sub(fcy / 10_000_000).saturating_sub(1);
		if divisor > u64::from(u16::max_value()) {
			u16::max_value()
		} else {
			divisor as u16
		}
	}
}

pub fn parse_number(s: &str) -> crate::AResult<u32> {
	if s.starts_with("0x") {
		Ok(u32::from_str_radix(&s[2..], 16)?)
	} else {
		Ok(s.parse()?)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn divisor() {
		let mut config = BusConfig::default();
		assert_eq!(config.baud_rate_divisor(), 39);
		config.clock_rate = 400_000;
		assert_eq!(config.baud_rate_divisor(), 9);
		config.clock_rate = 1;
		assert_eq!(config.baud_rate_divisor(), u16::max_value());
	}

	#[test]
	fn parse_pins() {
		assert_eq!("RB9".parse::<Pin>().unwrap(), Pin { port: 1, bit: 9 });
		assert_eq!("A0".parse::<Pin>().unwrap(), Pin { port: 0, bit: 0 });
		assert_eq!(Pin { port: 2, bit: 15 }.to_string(), "RC15");
		assert!("RB16".parse::<Pin>().is_err());
		assert!("9".parse::<Pin>().is_err());
	}

	#[test]
	fn parse_policies() {
		assert_eq!("abort".parse::<StopCollisionPolicy>().unwrap(), StopCollisionPolicy::Abort);
		assert!("ignore".parse::<StopCollisionPolicy>().is_err());
		assert_eq!("none".parse::<ReceiveWait>().unwrap(), ReceiveWait::Unbounded);
		assert_eq!("0x100".parse::<ReceiveWait>().unwrap(), ReceiveWait::Bounded(256));
	}
}
