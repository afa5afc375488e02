use super::{
	Ack,
	Bus,
	Condition,
	ErrorCode,
	ErrorKind,
	Hardware,
	ReceiveWait,
	Stage,
};

impl<H: Hardware> Bus<H> {
	/// Shift out one byte; returns the ack the receiver answered with.
	///
	/// A NACK is not an error at this level, callers decide whether the
	/// protocol step allows it.
	pub fn send_byte(&mut self, data: u8) -> Result<Ack, ErrorCode> {
		self.hardware.clear_bus_collision();
		self.hardware.transmit(data);
		self.wait_transmit()?;
		if self.hardware.bus_collision() {
			return Err(ErrorCode::new(ErrorKind::BusCollision).with(Stage::SEND));
		}
		let ack = self.hardware.ack_status();
		trace!("sent 0x{:02x}: {:?}", data, ack);
		Ok(ack)
	}

	/// Send a 16-bit value, high byte first. Returns the ack bits packed as
	/// `high << 1 | low`; zero means both bytes were acknowledged.
	pub fn send_word(&mut self, data: u16) -> Result<u8, ErrorCode> {
		let high = self.send_byte((data >> 8) as u8).map_err(|e| e.with(Stage::WORD_SEND_HIGH))?;
		let low = self.send_byte(data as u8).map_err(|e| e.with(Stage::WORD_SEND_LOW))?;
		Ok((high.bit() << 1) | low.bit())
	}

	pub fn receive_byte(&mut self) -> Result<u8, ErrorCode> {
		self.hardware.trigger(Condition::Receive);
		let limit = match self.config.receive_wait {
			ReceiveWait::Bounded(polls) => Some(polls),
			ReceiveWait::Unbounded => None,
		};
		let mut polls = 0u32;
		loop {
			if self.hardware.is_receive_full() {
				break;
			}
			if let Some(limit) = limit {
				if polls >= limit {
					warn!("receive buffer didn't fill after {} polls", limit);
					return Err(ErrorCode::new(ErrorKind::ReadTimeout));
				}
			}
			polls = polls.saturating_add(1);
		}
		let data = self.hardware.receive();
		trace!("received 0x{:02x}", data);
		Ok(data)
	}

	pub fn send_ack(&mut self, ack: Ack) -> Result<(), ErrorCode> {
		self.hardware.set_ack_data(ack);
		self.hardware.trigger(Condition::Acknowledge);
		if self.hardware.is_receive_overflow() {
			return Err(ErrorCode::new(ErrorKind::ReadBufferOverflow).with(Stage::SEND_ACK));
		}
		self.wait_condition(Condition::Acknowledge, Stage::SEND_ACK)?;
		trace!("acknowledged: {:?}", ack);
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::sim::{
		Event,
		Fault,
		SimulatedBus,
	};
	use crate::twi::BusConfig;

	fn bus(sim: &mut SimulatedBus) -> Bus<&mut SimulatedBus> {
		let mut bus = Bus::new(sim, BusConfig::default());
		bus.begin();
		bus
	}

	#[test]
	fn send_byte_reports_ack() {
		let mut sim = SimulatedBus::new();
		sim.attach(0);
		let mut bus = bus(&mut sim);
		bus.start().unwrap();
		assert_eq!(bus.send_byte(0xa0).unwrap(), Ack::Ack);
		bus.stop().unwrap();
		bus.start().unwrap();
		// nobody answers to device select 3
		assert_eq!(bus.send_byte(0xa6).unwrap(), Ack::Nack);
	}

	#[test]
	fn send_byte_collision() {
		let mut sim = SimulatedBus::new();
		sim.attach(0);
		sim.inject(Fault::CollisionOnByte(0));
		let mut bus = bus(&mut sim);
		bus.start().unwrap();
		let err = bus.send_byte(0xa0).unwrap_err();
		assert_eq!(err, ErrorCode::new(ErrorKind::BusCollision).with(Stage::SEND));
	}

	#[test]
	fn send_word_packs_acks() {
		let mut sim = SimulatedBus::new();
		sim.attach(0);
		sim.inject(Fault::NackByte(1));
		let mut bus = bus(&mut sim);
		bus.start().unwrap();
		assert_eq!(bus.send_byte(0xa0).unwrap(), Ack::Ack);
		assert_eq!(bus.send_word(0x1234).unwrap(), 0b10);
		drop(bus);
		let sent: Vec<u8> = sim.events().iter().filter_map(|e| match e {
			Event::Byte(b, _) => Some(*b),
			_ => None,
		}).collect();
		assert_eq!(sent, vec![0xa0, 0x12, 0x34]);
	}

	#[test]
	fn send_word_tags_failing_half() {
		let mut sim = SimulatedBus::new();
		sim.attach(0);
		sim.inject(Fault::CollisionOnByte(1));
		let mut bus = bus(&mut sim);
		bus.start().unwrap();
		let err = bus.send_word(0x0102).unwrap_err();
		assert_eq!(err.bus_stage(), Some(Stage::SEND));
		assert_eq!(err.word_stage(), Some(Stage::WORD_SEND_LOW));
	}

	#[test]
	fn receive_times_out_when_bounded() {
		let mut sim = SimulatedBus::new();
		sim.inject(Fault::ReceiveNeverFills);
		let mut config = BusConfig::default();
		config.receive_wait = ReceiveWait::Bounded(16);
		let mut bus = Bus::new(&mut sim, config);
		bus.begin();
		let err = bus.receive_byte().unwrap_err();
		assert_eq!(err, ErrorCode::new(ErrorKind::ReadTimeout));
	}

	#[test]
	fn overflow_aborts_ack() {
		let mut sim = SimulatedBus::new();
		sim.inject(Fault::ReceiveOverflow);
		let err = bus(&mut sim).send_ack(Ack::Nack).unwrap_err();
		assert_eq!(err, ErrorCode::new(ErrorKind::ReadBufferOverflow).with(Stage::SEND_ACK));
	}

	#[test]
	fn stuck_ack_times_out() {
		let mut sim = SimulatedBus::new();
		sim.inject(Fault::Stuck(Condition::Acknowledge));
		let mut config = BusConfig::default();
		config.wait_polls = Some(8);
		let mut bus = Bus::new(&mut sim, config);
		bus.begin();
		let err = bus.send_ack(Ack::Ack).unwrap_err();
		assert_eq!(err, ErrorCode::new(ErrorKind::BusTimeout).with(Stage::SEND_ACK));
	}

	#[test]
	fn stuck_transmit_times_out() {
		let mut sim = SimulatedBus::new();
		sim.inject(Fault::StuckTransmit);
		let mut config = BusConfig::default();
		config.wait_polls = Some(8);
		let mut bus = Bus::new(&mut sim, config);
		bus.begin();
		let err = bus.send_byte(0xa0).unwrap_err();
		assert_eq!(err, ErrorCode::new(ErrorKind::BusTimeout).with(Stage::SEND));
	}
}
