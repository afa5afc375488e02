#[macro_use]
extern crate clap;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

extern crate twi_eeprom;
use twi_eeprom::*;

use failure::ResultExt;
use std::fs;
use std::io::{
	self,
	Write,
};
use std::process::exit;

use twi_eeprom::twi::{
	BusConfig,
	Hardware,
	parse_number,
};

fn get_param<T>(matches: &clap::ArgMatches, name: &str) -> AResult<T>
where
	T: std::str::FromStr,
	failure::Error: From<<T as std::str::FromStr>::Err>,
{
	let param = match matches.value_of(name) {
		Some(p) => p,
		None => bail!("missing parameter {}", name),
	};
	param.parse::<T>().map_err(|e| {
		let e = failure::Error::from(e);
		let msg = format!("invalid parameter {}: {}", name, e);
		e.context(msg).into()
	})
}

fn get_number(matches: &clap::ArgMatches, name: &str) -> AResult<u32> {
	match matches.value_of(name) {
		Some(p) => parse_number(p).map_err(|e| {
			let msg = format!("invalid parameter {}: {}", name, e);
			e.context(msg).into()
		}),
		None => bail!("missing parameter {}", name),
	}
}

fn get_u16(matches: &clap::ArgMatches, name: &str) -> AResult<u16> {
	let value = get_number(matches, name)?;
	ensure!(value <= 0xffff, "parameter {} out of range: 0x{:x}", name, value);
	Ok(value as u16)
}

fn bus_config(matches: &clap::ArgMatches) -> AResult<BusConfig> {
	let mut config = BusConfig::default();
	if matches.is_present("bus") {
		config.bus = get_param(matches, "bus")?;
	}
	if matches.is_present("scl") {
		config.scl = get_param(matches, "scl")?;
	}
	if matches.is_present("sda") {
		config.sda = get_param(matches, "sda")?;
	}
	if matches.is_present("rate") {
		config.clock_rate = get_number(matches, "rate")?;
	}
	if matches.is_present("fcy") {
		config.instruction_clock = get_number(matches, "fcy")?;
	}
	if let Some(polls) = matches.value_of("wait_polls") {
		config.wait_polls = match polls {
			"none" => None,
			polls => Some(parse_number(polls)?),
		};
	}
	if matches.is_present("receive_polls") {
		config.receive_wait = get_param(matches, "receive_polls")?;
	}
	if matches.is_present("stop_policy") {
		config.stop_collision = get_param(matches, "stop_policy")?;
	}
	Ok(config)
}

fn hexdump(offset: usize, data: &[u8]) {
	for (i, chunk) in data.chunks(16).enumerate() {
		print!("{:04x} ", offset + 16 * i);
		for (j, b) in chunk.iter().enumerate() {
			if 8 == j {
				print!(" ");
			}
			print!(" {:02x}", b);
		}
		println!("");
	}
}

fn probe<H: Hardware>(ee: &mut Eeprom<H>, device: u8) -> AResult<()> {
	if ee.is_present(device)? {
		println!("device {} present", device);
	} else {
		println!("device {} not responding", device);
	}
	Ok(())
}

fn scan<H: Hardware>(ee: &mut Eeprom<H>) -> AResult<()> {
	for device in ee.scan()? {
		println!("{} (0x{:02x})", device, eeprom::write_address(device));
	}
	Ok(())
}

fn read<H: Hardware>(ee: &mut Eeprom<H>, device: u8, sub_m: &clap::ArgMatches) -> AResult<()> {
	let address = get_u16(sub_m, "ADDRESS")?;
	let count = if sub_m.is_present("COUNT") { get_number(sub_m, "COUNT")? as usize } else { 1 };
	let mut data = Vec::with_capacity(count);
	for i in 0..count {
		data.push(ee.read(address.wrapping_add(i as u16), device)?);
	}
	hexdump(usize::from(address), &data);
	Ok(())
}

fn read_string<H: Hardware>(ee: &mut Eeprom<H>, device: u8, sub_m: &clap::ArgMatches) -> AResult<()> {
	let address = get_u16(sub_m, "ADDRESS")?;
	let size = get_number(sub_m, "SIZE")? as usize;
	let delimiters = sub_m.value_of("delimiters").unwrap_or("").as_bytes();
	let mut buf = vec![0u8; size];
	let count = ee.read_delimited(&mut buf, delimiters, address, device)?;
	println!("{}", String::from_utf8_lossy(&buf[..count]));
	Ok(())
}

fn write<H: Hardware>(ee: &mut Eeprom<H>, device: u8, sub_m: &clap::ArgMatches) -> AResult<()> {
	let address = get_u16(sub_m, "ADDRESS")?;
	let data = match sub_m.values_of("DATA") {
		Some(values) => values.map(|v| -> AResult<u8> {
			let b = parse_number(v)?;
			ensure!(b <= 0xff, "not a byte: {}", v);
			Ok(b as u8)
		}).collect::<AResult<Vec<u8>>>()?,
		None => bail!("missing parameter DATA"),
	};

	if data.len() == 1 {
		ee.write(data[0], address, device)?;
	} else {
		let count = ee.write_page(&data, address, device)?;
		info!("wrote {} bytes at 0x{:04x}", count, address);
	}
	Ok(())
}

fn dump<H: Hardware>(ee: &mut Eeprom<H>, device: u8, sub_m: &clap::ArgMatches) -> AResult<()> {
	let address = get_u16(sub_m, "ADDRESS")?;
	let length = get_number(sub_m, "LENGTH")? as usize;
	let binary = sub_m.is_present("binary");

	let mut image = vec![0u8; length];
	let mut offset = 0;
	for chunk in image.chunks_mut(64) {
		let count = ee.read_string(chunk, address.wrapping_add(offset as u16), device)?;
		ensure!(count == chunk.len(), "short read at 0x{:04x}", offset);
		offset += count;
	}

	if binary {
		io::stdout().write_all(&image)?;
	} else {
		hexdump(usize::from(address), &image);
	}
	Ok(())
}

fn run<H: Hardware>(ee: &mut Eeprom<H>, matches: &clap::ArgMatches) -> AResult<()> {
	let device = get_param::<u8>(matches, "device")?;
	ensure!(device < 8, "device select out of range: {}", device);

	ee.begin();
	let result = match matches.subcommand() {
		("probe", _) => probe(ee, device),
		("scan", _) => scan(ee),
		("read", Some(sub_m)) => read(ee, device, sub_m),
		("read_string", Some(sub_m)) => read_string(ee, device, sub_m),
		("write", Some(sub_m)) => write(ee, device, sub_m),
		("dump", Some(sub_m)) => dump(ee, device, sub_m),
		("", _) => bail!("no subcommand"),
		(cmd, _) => bail!("not implemented subcommand {:?}", cmd),
	};

	if result.is_err() && ee.error() != 0 {
		debug!("last error: {:?} (error {}, stage 0x{:02x}, step 0x{:02x})",
			ee.last_error(), ee.error(), ee.error2(), ee.error3());
	}
	result
}

fn run_simulated(matches: &clap::ArgMatches) -> AResult<()> {
	let config = bus_config(matches)?;
	let device = get_param::<u8>(matches, "device")?;
	ensure!(device < 8, "device select out of range: {}", device);
	let image_path = matches.value_of("sim_image");

	let mut sim = sim::SimulatedBus::new();
	match image_path {
		Some(path) if fs::metadata(path).is_ok() => {
			let image = fs::read(path).context(format!("failed to read {}", path))?;
			sim.attach_with(device, image);
		},
		_ => sim.attach(device),
	}

	let mut ee = Eeprom::new(&mut sim, config);
	let result = run(&mut ee, matches);

	if let Some(path) = image_path {
		if let Some(memory) = sim.memory(device) {
			fs::write(path, memory).context(format!("failed to write {}", path))?;
		}
	}
	result
}

fn run_registers(matches: &clap::ArgMatches, path: &str) -> AResult<()> {
	let config = bus_config(matches)?;
	let offset = if matches.is_present("offset") { u64::from(get_number(matches, "offset")?) } else { 0 };
	let bus = mmio::open_registers(path, offset, &config)?;
	let mut ee = Eeprom::new(bus, config);
	run(&mut ee, matches)
}

fn main_app() -> AResult<()> {
	let matches = clap_app!(@app (app_from_crate!())
		(@setting SubcommandRequiredElseHelp)
		(global_setting: clap::AppSettings::VersionlessSubcommands)
		(@arg registers: -r --registers +takes_value conflicts_with[sim] "device file to map PIC24 SFRs from")
		(@arg offset: --offset +takes_value "offset of the SFR window in the register file")
		(@arg sim: --sim "use a simulated bus (default)")
		(@arg sim_image: --sim_image +takes_value "file backing the simulated EEPROM")
		(@arg device: -d --device +takes_value default_value("0") "device select (0-7)")
		(@arg bus: --bus +takes_value "I2C module (1-based)")
		(@arg scl: --scl +takes_value "SCL pin (e.g. RB8)")
		(@arg sda: --sda +takes_value "SDA pin (e.g. RB9)")
		(@arg rate: --rate +takes_value "bus clock in Hz")
		(@arg fcy: --fcy +takes_value "instruction clock in Hz")
		(@arg wait_polls: --wait_polls +takes_value "poll limit for bus waits ('none' waits forever)")
		(@arg receive_polls: --receive_polls +takes_value "poll limit for receiving a byte ('none' waits forever)")
		(@arg stop_policy: --stop_policy +takes_value possible_value[abort record] "handling of collisions during stop")
		(@subcommand probe =>
			(about: "check whether the device acknowledges its address")
		)
		(@subcommand scan =>
			(about: "list responding device selects")
		)
		(@subcommand read =>
			(about: "read bytes one at a time")
			(@arg ADDRESS: +required "memory address")
			(@arg COUNT: "number of bytes")
		)
		(@subcommand read_string =>
			(about: "sequential read up to SIZE bytes or a delimiter")
			(@arg delimiters: --delim +takes_value "delimiter characters")
			(@arg ADDRESS: +required "memory address")
			(@arg SIZE: +required "maximum number of bytes")
		)
		(@subcommand write =>
			(about: "write bytes (page write for more than one)")
			(@arg ADDRESS: +required "memory address")
			(@arg DATA: +required +multiple "bytes to write")
		)
		(@subcommand dump =>
			(about: "dump memory")
			(@arg binary: -b --binary "write raw bytes to stdout")
			(@arg ADDRESS: +required "memory address")
			(@arg LENGTH: +required "number of bytes")
		)
	).get_matches();

	match matches.value_of("registers") {
		Some(path) => run_registers(&matches, path),
		None => run_simulated(&matches),
	}
}

fn main() {
	env_logger::from_env(env_logger::Env::default().default_filter_or("info")).init();

	if let Err(e) = main_app() {
		error!("Error: {}", e);
		exit(1);
	}
}
