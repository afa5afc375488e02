use std::ffi::CString;
use std::fs;
use std::io;
use std::os::unix::io::{
	FromRawFd,
};
use std::ptr;

use libc::{
	MAP_SHARED,
	O_CLOEXEC,
	O_RDWR,
	O_SYNC,
	PROT_READ,
	PROT_WRITE,
	c_void,
	mmap,
	munmap,
	off_t,
	open,
};

/// Register window mapped from a device file
#[derive(Debug)]
pub struct Mapped {
	ptr: ptr::NonNull<u8>, // u8 instead of void for easier offset operations
	len: usize,
}

impl Drop for Mapped {
	fn drop(&mut self) {
		unsafe {
			let res = munmap(
				self.ptr.as_ptr() as *mut c_void,
				self.len,
			);
			if 0 != res {
				panic!("munmap failed: {}", io::Error::last_os_error());
			}
		}
	}
}

impl Mapped {
	pub fn len(&self) -> usize {
		self.len
	}

	pub fn read_word(&self, offset: usize) -> u16 {
		assert!(offset & 1 == 0);
		assert!(offset + 1 < self.len);
		u16::from_le(unsafe { ptr::read_volatile(self.ptr.as_ptr().add(offset) as *const u16) })
	}

	pub fn write_word(&mut self, offset: usize, data: u16) {
		assert!(offset & 1 == 0);
		assert!(offset + 1 < self.len);
		unsafe { ptr::write_volatile(self.ptr.as_ptr().add(offset) as *mut u16, data.to_le()) }
	}
}

// TODO: exclusive open / file locking?
pub fn inner_open(path: &str, offset: u64, len: usize) -> io::Result<Mapped> {
	let open_flags = O_RDWR | O_CLOEXEC | O_SYNC;
	let mmap_prot_flags = PROT_WRITE | PROT_READ;

	let path = CString::new(path)?;

	let fd = unsafe { open(path.as_ptr(), open_flags) };
	if -1 == fd {
		return Err(io::Error::last_os_error());
	}
	// now get fd managed to prevent resource leak
	let f = unsafe { fs::File::from_raw_fd(fd) };

	// sysfs/uio nodes report their size, /dev/mem doesn't
	let size = f.metadata()?.len();
	if size != 0 && offset + len as u64 > size {
		return Err(io::Error::new(io::ErrorKind::InvalidInput, format!(
			"register window 0x{:x}+0x{:x} exceeds file size 0x{:x}", offset, len, size,
		)));
	}

	let area = unsafe {
		mmap(
			ptr::null_mut(),
			len,
			mmap_prot_flags,
			MAP_SHARED,
			fd,
			offset as off_t,
		)
	};

	if area as usize == !0usize {
		return Err(io::Error::last_os_error());
	}
	match ptr::NonNull::new(area as *mut u8) {
		None => panic!("mmap shouldn't return NULL ever"),
		Some(area) => Ok(Mapped{
			ptr: area,
			len,
		}),
	}
}
