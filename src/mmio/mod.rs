mod mapped;
mod pic24;

use self::mapped::Mapped;

pub use self::pic24::{
	I2cStatus,
	Pic24Bus,
	REGISTER_WINDOW,
};

use crate::twi::BusConfig;

/// Map the SFR window starting at `offset` in `path` (`/dev/mem`, a UIO
/// node, ...) and bind the I2C module selected in `config`.
pub fn open_registers(path: &str, offset: u64, config: &BusConfig) -> crate::AResult<Pic24Bus> {
	let regs = with_context!(("failed to map {} at 0x{:x}", path, offset), {
		Ok(mapped::inner_open(path, offset, REGISTER_WINDOW)?)
	})?;
	debug!("mapped 0x{:x} bytes of {} at 0x{:x}", regs.len(), path, offset);
	Pic24Bus::new(regs, config)
}
