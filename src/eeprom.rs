/* 24xx family two-wire serial EEPROMs (24LC256, 24AA512, ...) */

use crate::twi::{
	Ack,
	Bus,
	BusConfig,
	ErrorCode,
	ErrorKind,
	ErrorState,
	Hardware,
	Stage,
	StopCollisionPolicy,
};

mod consts {
	// control byte: 0b1010 device code, 3 chip select bits, R/W
	pub const CONTROL_WRITE: u8 = 0xa0;
	pub const CONTROL_READ: u8 = 0xa1;

	// chip select pins A2..A0
	pub const MAX_DEVICES: u8 = 8;

	// terminator stored in place of a matched delimiter
	pub const TERMINATOR: u8 = 0x00;
}

use self::consts::*;

pub fn write_address(device: u8) -> u8 {
	CONTROL_WRITE | (device << 1)
}

pub fn read_address(device: u8) -> u8 {
	CONTROL_READ | (device << 1)
}

/// Steps to tag a failing address preamble with
struct Preamble {
	start: Stage,
	call: Stage,
	address: Stage,
}

const WRITE_PREAMBLE: Preamble = Preamble {
	start: Stage::WRITE_START,
	call: Stage::WRITE_CALL,
	address: Stage::WRITE_ADDR,
};

const READ_PREAMBLE: Preamble = Preamble {
	start: Stage::READ_START,
	call: Stage::READ_CALL,
	address: Stage::READ_ADDR,
};

fn nack(step: Stage) -> ErrorCode {
	ErrorCode::new(ErrorKind::DeviceNotResponding).with(step)
}

pub struct Eeprom<H: Hardware> {
	bus: Bus<H>,
	errors: ErrorState,
}

impl<H: Hardware> Eeprom<H> {
	pub fn new(hardware: H, config: BusConfig) -> Self {
		Eeprom {
			bus: Bus::new(hardware, config),
			errors: ErrorState::default(),
		}
	}

	pub fn into_hardware(self) -> H {
		self.bus.into_hardware()
	}

	/// Program the baud rate generator and enable the bus engine.
	pub fn begin(&mut self) {
		self.bus.begin();
	}

	/// Code of the last failed operation (not reset by later successes)
	pub fn last_error(&self) -> ErrorCode {
		self.errors.code()
	}

	/// error kind (bits 0..7 of the last error)
	pub fn error(&self) -> u8 {
		self.errors.error()
	}

	/// low-level bus/word stage (bits 8..15 of the last error)
	pub fn error2(&self) -> u8 {
		self.errors.error2()
	}

	/// operation step (bits 16..23 of the last error)
	pub fn error3(&self) -> u8 {
		self.errors.error3()
	}

	fn fail<T>(&mut self, code: ErrorCode) -> Result<T, ErrorCode> {
		debug!("transaction failed: {}", code);
		self.errors.record(code);
		Err(code)
	}

	// start, control byte for writing and memory address
	fn address(&mut self, preamble: &Preamble, mem_address: u16, device: u8) -> Result<(), ErrorCode> {
		self.bus.start().map_err(|e| e.with(preamble.start))?;

		match self.bus.send_byte(write_address(device)) {
			Err(e) => return Err(e.with(preamble.call)),
			Ok(Ack::Nack) => return Err(nack(preamble.call)),
			Ok(Ack::Ack) => (),
		}

		match self.bus.send_word(mem_address) {
			Err(e) => Err(e.with(preamble.address)),
			Ok(0) => Ok(()),
			Ok(_) => Err(nack(preamble.address)),
		}
	}

	fn send_data(&mut self, data: u8) -> Result<(), ErrorCode> {
		match self.bus.send_byte(data) {
			Err(e) => Err(e.with(Stage::WRITE_SEND)),
			Ok(Ack::Nack) => Err(nack(Stage::WRITE_SEND)),
			Ok(Ack::Ack) => Ok(()),
		}
	}

	fn send_read_call(&mut self, device: u8) -> Result<(), ErrorCode> {
		match self.bus.send_byte(read_address(device)) {
			Err(e) => Err(e.with(Stage::READ_READ_ADDR)),
			Ok(Ack::Nack) => Err(nack(Stage::READ_READ_ADDR)),
			Ok(Ack::Ack) => Ok(()),
		}
	}

	// stop condition; a collision fails the transaction only with
	// `StopCollisionPolicy::Abort`
	fn finish(&mut self, step: Stage) -> Result<(), ErrorCode> {
		let code = match self.bus.stop() {
			Ok(()) => return Ok(()),
			Err(e) => e.with(step),
		};
		if code.is(ErrorKind::BusCollision) && self.bus.config().stop_collision == StopCollisionPolicy::Record {
			warn!("ignoring {}", code);
			self.errors.record(code);
			return Ok(());
		}
		Err(code)
	}

	fn write_transaction(&mut self, data: &[u8], mem_address: u16, device: u8) -> Result<usize, ErrorCode> {
		self.address(&WRITE_PREAMBLE, mem_address, device)?;
		for &b in data {
			self.send_data(b)?;
		}
		self.finish(Stage::WRITE_STOP)?;
		Ok(data.len())
	}

	pub fn write(&mut self, data: u8, mem_address: u16, device: u8) -> Result<(), ErrorCode> {
		debug!("write 0x{:02x} @ {}:0x{:04x}", data, device, mem_address);
		match self.write_transaction(&[data], mem_address, device) {
			Ok(_) => Ok(()),
			Err(e) => self.fail(e),
		}
	}

	/// Write consecutive bytes in one transaction; the device advances its
	/// address pointer after each byte.
	///
	/// Returns the number of bytes written. The caller is responsible for
	/// staying within one device page.
	pub fn write_page(&mut self, data: &[u8], mem_address: u16, device: u8) -> Result<usize, ErrorCode> {
		debug!("write {} bytes @ {}:0x{:04x}", data.len(), device, mem_address);
		match self.write_transaction(data, mem_address, device) {
			Ok(count) => Ok(count),
			Err(e) => self.fail(e),
		}
	}

	fn read_transaction(&mut self, mem_address: u16, device: u8) -> Result<u8, ErrorCode> {
		self.address(&READ_PREAMBLE, mem_address, device)?;
		self.bus.restart().map_err(|e| e.with(Stage::READ_RESTART))?;
		self.send_read_call(device)?;
		let data = self.bus.receive_byte().map_err(|e| e.with(Stage::READ_NACK))?;
		self.bus.send_ack(Ack::Nack).map_err(|e| e.with(Stage::READ_NACK))?;
		self.finish(Stage::READ_END)?;
		Ok(data)
	}

	pub fn read(&mut self, mem_address: u16, device: u8) -> Result<u8, ErrorCode> {
		debug!("read @ {}:0x{:04x}", device, mem_address);
		match self.read_transaction(mem_address, device) {
			Ok(data) => Ok(data),
			Err(e) => self.fail(e),
		}
	}

	fn read_delimited_transaction(&mut self, buf: &mut [u8], delimiters: &[u8], mem_address: u16, device: u8) -> Result<usize, ErrorCode> {
		self.address(&READ_PREAMBLE, mem_address, device)?;

		if let Err(e) = self.bus.restart() {
			// the device keeps the address pointer: a stop followed by a
			// fresh start works as well
			warn!("repeated start failed ({}), trying stop and start", e);
			self.finish(Stage::READ_RESTART)?;
			self.bus.start().map_err(|e| e.with(Stage::READ_RESTART))?;
		}

		self.send_read_call(device)?;

		let size = buf.len();
		let mut count = 0;
		while count < size {
			let data = self.bus.receive_byte().map_err(|e| e.with(Stage::READ_NACK))?;
			let delimited = delimiters.contains(&data);
			buf[count] = if delimited { TERMINATOR } else { data };

			let ack = if delimited || count + 1 == size { Ack::Nack } else { Ack::Ack };
			self.bus.send_ack(ack).map_err(|e| e.with(Stage::READ_NACK))?;
			if delimited {
				break;
			}
			count += 1;
		}

		self.finish(Stage::READ_END)?;
		Ok(count)
	}

	/// Read up to `buf.len()` bytes, stopping early at the first byte
	/// contained in `delimiters`.
	///
	/// A matched delimiter is replaced by a zero byte in `buf` and not
	/// counted. Returns the number of bytes read before the delimiter.
	pub fn read_delimited(&mut self, buf: &mut [u8], delimiters: &[u8], mem_address: u16, device: u8) -> Result<usize, ErrorCode> {
		debug!("read up to {} bytes @ {}:0x{:04x} (delimiters {:?})", buf.len(), device, mem_address, delimiters);
		match self.read_delimited_transaction(buf, delimiters, mem_address, device) {
			Ok(count) => Ok(count),
			Err(e) => self.fail(e),
		}
	}

	/// Read exactly `buf.len()` bytes.
	pub fn read_string(&mut self, buf: &mut [u8], mem_address: u16, device: u8) -> Result<usize, ErrorCode> {
		self.read_delimited(buf, &[], mem_address, device)
	}

	/// Poll a device: start, control byte, stop. No data is transferred.
	pub fn is_present(&mut self, device: u8) -> Result<bool, ErrorCode> {
		if let Err(e) = self.bus.start() {
			return self.fail(e.with(Stage::POLL_START));
		}

		let sent = self.bus.send_byte(write_address(device));
		// stop in any case, a NACK or collision still leaves the bus claimed
		let stopped = self.finish(Stage::POLL_STOP);

		let ack = match sent {
			Ok(ack) => ack,
			Err(e) => return self.fail(e.with(Stage::POLL_SEND)),
		};
		if let Err(e) = stopped {
			return self.fail(e);
		}
		trace!("poll device {}: {:?}", device, ack);
		Ok(ack == Ack::Ack)
	}

	/// Device selects (0..7) that answer a poll
	pub fn scan(&mut self) -> Result<Vec<u8>, ErrorCode> {
		let mut found = Vec::new();
		for device in 0..MAX_DEVICES {
			if self.is_present(device)? {
				found.push(device);
			}
		}
		Ok(found)
	}
}
