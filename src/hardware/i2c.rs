//! `embedded-hal` I2C bus over Linux `/dev/i2c-N`.

use std::{
    fs::{File, OpenOptions},
    io::{Read, Write},
    os::fd::AsRawFd,
    path::Path,
};

use embedded_hal::i2c::{ErrorType, I2c, Operation, SevenBitAddress};

use super::sysfs::SysfsError;
use crate::error::Result;

/// `ioctl` request selecting the target address (linux/i2c-dev.h).
const I2C_SLAVE: libc::c_ulong = 0x0703;

#[derive(Debug)]
pub struct LinuxI2c {
    file: File,
    address: Option<u8>,
}

impl LinuxI2c {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self {
            file,
            address: None,
        })
    }

    fn select(&mut self, address: u8) -> std::result::Result<(), SysfsError> {
        if self.address == Some(address) {
            return Ok(());
        }
        // SAFETY: the descriptor is owned by `self.file` and stays open for
        // the call; I2C_SLAVE takes the address by value and touches no
        // user memory.
        let rc = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                I2C_SLAVE as _,
                libc::c_ulong::from(address),
            )
        };
        if rc < 0 {
            return Err(SysfsError(std::io::Error::last_os_error()));
        }
        self.address = Some(address);
        Ok(())
    }
}

impl ErrorType for LinuxI2c {
    type Error = SysfsError;
}

impl I2c<SevenBitAddress> for LinuxI2c {
    fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> std::result::Result<(), Self::Error> {
        self.select(address)?;
        for op in operations {
            match op {
                Operation::Write(bytes) => self.file.write_all(bytes)?,
                Operation::Read(buf) => self.file.read_exact(buf)?,
            }
        }
        Ok(())
    }
}
