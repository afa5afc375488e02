use super::{
	BusConfig,
	Condition,
	Direction,
	ErrorCode,
	ErrorKind,
	Hardware,
	Line,
	Stage,
};

// settle time for raw line changes during recovery
const RECOVERY_DELAY_US: u32 = 10;
// a slave stuck mid-byte needs at most 9 clocks to release SDA
const RECOVERY_CLOCKS: usize = 10;

trait HardwareWaitExt: Hardware {
	// returns false if `limit` polls passed without `done` becoming true
	fn wait_until<F>(&mut self, limit: Option<u32>, mut done: F) -> bool
	where
		F: FnMut(&mut Self) -> bool,
	{
		match limit {
			None => {
				while !done(self) {}
				true
			},
			Some(limit) => {
				for _ in 0..limit {
					if done(self) {
						return true;
					}
				}
				done(self)
			},
		}
	}
}

impl<H: Hardware + ?Sized> HardwareWaitExt for H {}

/// Two-wire bus master: condition generation, collision recovery and
/// byte transport on top of a `Hardware` implementation.
pub struct Bus<H: Hardware> {
	pub(super) hardware: H,
	pub(super) config: BusConfig,
}

impl<H: Hardware> Bus<H> {
	pub fn new(hardware: H, config: BusConfig) -> Self {
		Bus { hardware, config }
	}

	pub fn config(&self) -> &BusConfig {
		&self.config
	}

	pub fn into_hardware(self) -> H {
		self.hardware
	}

	pub fn begin(&mut self) {
		let divisor = self.config.baud_rate_divisor();
		debug!("bus {}: {} Hz (divisor {})", self.config.bus, self.config.clock_rate, divisor);
		self.hardware.set_baud_rate(divisor);
		self.hardware.set_enabled(true);
		self.hardware.clear_bus_collision();
	}

	// wait for the engine to finish `condition`; BusTimeout tagged with `stage`
	pub(super) fn wait_condition(&mut self, condition: Condition, stage: Stage) -> Result<(), ErrorCode> {
		let limit = self.config.wait_polls;
		if self.hardware.wait_until(limit, |hw| !hw.is_pending(condition)) {
			Ok(())
		} else {
			warn!("timeout waiting for {:?} to complete", condition);
			Err(ErrorCode::new(ErrorKind::BusTimeout).with(stage))
		}
	}

	pub(super) fn wait_transmit(&mut self) -> Result<(), ErrorCode> {
		let limit = self.config.wait_polls;
		if self.hardware.wait_until(limit, |hw| !hw.is_transmitting()) {
			Ok(())
		} else {
			warn!("timeout waiting for transmission to complete");
			Err(ErrorCode::new(ErrorKind::BusTimeout).with(Stage::SEND))
		}
	}

	pub fn start(&mut self) -> Result<(), ErrorCode> {
		if self.hardware.bus_collision() {
			warn!("bus collision pending before start, recovering bus");
			self.recover()?;
			self.hardware.clear_bus_collision();
		}

		self.hardware.trigger(Condition::Start);

		if self.hardware.bus_collision() {
			warn!("bus collision while asserting start, recovering bus");
			self.hardware.cancel(Condition::Start);
			self.recover().map_err(|e| e.with(Stage::START1))?;
			self.hardware.clear_bus_collision();
			return Err(ErrorCode::new(ErrorKind::BusCollision).with(Stage::START1));
		}
		if self.hardware.write_collision() {
			self.hardware.clear_write_collision();
			return Err(ErrorCode::new(ErrorKind::WriteBufferCollision).with(Stage::START1));
		}

		self.wait_condition(Condition::Start, Stage::START2)?;

		if self.hardware.bus_collision() {
			return Err(ErrorCode::new(ErrorKind::BusCollision).with(Stage::START2));
		}
		trace!("start");
		Ok(())
	}

	pub fn restart(&mut self) -> Result<(), ErrorCode> {
		self.hardware.clear_bus_collision();
		self.hardware.trigger(Condition::Restart);
		if self.hardware.bus_collision() {
			return Err(ErrorCode::new(ErrorKind::BusCollision).with(Stage::RESTART));
		}
		self.wait_condition(Condition::Restart, Stage::RESTART)?;
		trace!("restart");
		Ok(())
	}

	/// Generates a stop condition. A collision is reported only after the
	/// stop completed, so the caller may decide to ignore it.
	pub fn stop(&mut self) -> Result<(), ErrorCode> {
		self.hardware.clear_bus_collision();
		self.hardware.trigger(Condition::Stop);
		let collision = self.hardware.bus_collision();
		self.wait_condition(Condition::Stop, Stage::STOP)?;
		if collision || self.hardware.bus_collision() {
			return Err(ErrorCode::new(ErrorKind::BusCollision).with(Stage::STOP));
		}
		trace!("stop");
		Ok(())
	}

	/// Clock a wedged bus free. A slave interrupted mid-transfer keeps SDA
	/// low until it got the clocks it is waiting for; afterwards a stop
	/// condition resets its state machine.
	pub fn recover(&mut self) -> Result<(), ErrorCode> {
		let fatal = ErrorCode::new(ErrorKind::FatalBusError);
		let hw = &mut self.hardware;

		hw.cancel(Condition::Receive);
		hw.clear_write_collision();
		hw.clear_bus_collision();

		hw.set_enabled(false);
		hw.set_line(Line::Data, true);
		hw.set_line(Line::Clock, true);
		hw.set_line_direction(Line::Data, Direction::Input);
		hw.set_line_direction(Line::Clock, Direction::Output);
		hw.delay_us(RECOVERY_DELAY_US);

		if !hw.read_line(Line::Clock) {
			error!("bus recovery failed: SCL held low");
			return Err(fatal);
		}

		for _ in 0..RECOVERY_CLOCKS {
			if hw.read_line(Line::Data) {
				break;
			}
			hw.set_line(Line::Clock, false);
			hw.delay_us(RECOVERY_DELAY_US);
			hw.set_line(Line::Clock, true);
			hw.delay_us(RECOVERY_DELAY_US);
		}

		if !hw.read_line(Line::Clock) || !hw.read_line(Line::Data) {
			error!("bus recovery failed: lines not released after {} clocks", RECOVERY_CLOCKS);
			return Err(fatal);
		}

		// synthetic stop: SDA rises while SCL is high
		hw.set_line(Line::Data, false);
		hw.set_line_direction(Line::Data, Direction::Output);
		hw.delay_us(RECOVERY_DELAY_US);
		hw.set_line(Line::Data, true);
		hw.delay_us(RECOVERY_DELAY_US);

		hw.set_line_direction(Line::Data, Direction::Input);
		hw.set_line_direction(Line::Clock, Direction::Input);
		hw.set_enabled(true);
		info!("bus {}: recovered", self.config.bus);
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

	fn bus(sim: &mut SimulatedBus) -> Bus<&mut SimulatedBus> {
		let mut bus = Bus::new(sim, BusConfig::default());
		bus.begin();
		bus
	}

	#[test]
	fn start_restart_stop() {
		let mut sim = SimulatedBus::new();
		{
			let mut bus = bus(&mut sim);
			bus.start().unwrap();
			bus.restart().unwrap();
			bus.stop().unwrap();
		}
		assert_eq!(sim.events(), &[Event::Start, Event::Restart, Event::Stop]);
	}

	#[test]
	fn recovery_releases_stuck_data_line() {
		let mut sim = SimulatedBus::new();
		sim.inject(Fault::HoldData { clocks: 4 });
		bus(&mut sim).recover().unwrap();
		assert_eq!(sim.clock_pulses(), 4);
		assert!(sim.is_enabled());
		assert_eq!(sim.events().last(), Some(&Event::RecoveryStop));
	}

	#[test]
	fn recovery_gives_up_after_ten_clocks() {
		let mut sim = SimulatedBus::new();
		sim.inject(Fault::HoldData { clocks: 11 });
		let err = bus(&mut sim).recover().unwrap_err();
		assert_eq!(err, ErrorCode::new(ErrorKind::FatalBusError));
		assert_eq!(sim.clock_pulses(), 10);
		assert!(!sim.is_enabled());
	}

	#[test]
	fn recovery_fails_on_stuck_clock() {
		let mut sim = SimulatedBus::new();
		sim.inject(Fault::HoldClock);
		let err = bus(&mut sim).recover().unwrap_err();
		assert!(err.is(ErrorKind::FatalBusError));
		assert_eq!(sim.clock_pulses(), 0);
	}

	#[test]
	fn pending_collision_is_recovered_before_start() {
		let mut sim = SimulatedBus::new();
		sim.inject(Fault::PendingCollision);
		sim.inject(Fault::HoldData { clocks: 2 });
		bus(&mut sim).start().unwrap();
		assert_eq!(sim.events(), &[Event::RecoveryStop, Event::Start]);
	}

	#[test]
	fn collision_while_asserting_start() {
		let mut sim = SimulatedBus::new();
		sim.inject(Fault::CollisionOn(Condition::Start));
		let err = bus(&mut sim).start().unwrap_err();
		assert_eq!(err, ErrorCode::new(ErrorKind::BusCollision).with(Stage::START1));
		assert!(!sim.bus_collision());
	}

	#[test]
	fn write_collision_on_start() {
		let mut sim = SimulatedBus::new();
		sim.inject(Fault::WriteCollisionOnStart);
		let err = bus(&mut sim).start().unwrap_err();
		assert_eq!(err, ErrorCode::new(ErrorKind::WriteBufferCollision).with(Stage::START1));
	}

	#[test]
	fn collision_after_start() {
		let mut sim = SimulatedBus::new();
		sim.inject(Fault::CollisionAfter(Condition::Start));
		let err = bus(&mut sim).start().unwrap_err();
		assert_eq!(err, ErrorCode::new(ErrorKind::BusCollision).with(Stage::START2));
	}

	#[test]
	fn stuck_conditions_time_out() {
		let mut sim = SimulatedBus::new();
		sim.inject(Fault::Stuck(Condition::Stop));
		let err = bus(&mut sim).stop().unwrap_err();
		assert_eq!(err, ErrorCode::new(ErrorKind::BusTimeout).with(Stage::STOP));

		let mut sim = SimulatedBus::new();
		sim.inject(Fault::Stuck(Condition::Restart));
		let err = bus(&mut sim).restart().unwrap_err();
		assert_eq!(err, ErrorCode::new(ErrorKind::BusTimeout).with(Stage::RESTART));

		let mut sim = SimulatedBus::new();
		sim.inject(Fault::Stuck(Condition::Start));
		let err = bus(&mut sim).start().unwrap_err();
		assert_eq!(err, ErrorCode::new(ErrorKind::BusTimeout).with(Stage::START2));
	}

	#[test]
	fn collision_during_stop_still_completes() {
		let mut sim = SimulatedBus::new();
		sim.inject(Fault::CollisionOn(Condition::Stop));
		let err = bus(&mut sim).stop().unwrap_err();
		assert_eq!(err, ErrorCode::new(ErrorKind::BusCollision).with(Stage::STOP));
		assert_eq!(sim.events(), &[Event::Stop]);
	}
}
