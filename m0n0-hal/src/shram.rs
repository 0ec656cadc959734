//! Shutdown RAM.
//!
//! 4 KiB of SRAM in the always-on domain. Its contents survive a timed
//! shutdown but not a VBAT power-on reset; check
//! [`System::is_vbat_por`](crate::system::System::is_vbat_por) before
//! trusting them. The bus is word-wide, byte access is emulated.

use embedded_storage::{ReadStorage, Storage};

use crate::regs::{RegisterDriver, RegisterWindow};

/// Size of the SHRAM in bytes.
pub const SHRAM_SIZE: u32 = 4096;

/// SHRAM access error.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// `[offset, offset + len)` does not fit in the SHRAM.
    OutOfRange { offset: u32, len: u32 },
    /// Word access to an offset that is not a multiple of 4.
    Misaligned { offset: u32 },
}

/// SHRAM window, addressed by byte offset.
pub struct Shram<D> {
    regs: RegisterWindow<D>,
}

impl<D: RegisterDriver> Shram<D> {
    pub fn new(regs: RegisterWindow<D>) -> Self {
        Self { regs }
    }

    /// Check that `len` bytes starting at `offset` fit in the SHRAM.
    pub fn check_range(offset: u32, len: u32) -> Result<(), Error> {
        match offset.checked_add(len) {
            Some(end) if end <= SHRAM_SIZE => Ok(()),
            _ => Err(Error::OutOfRange { offset, len }),
        }
    }

    fn check_word(offset: u32) -> Result<(), Error> {
        if offset % 4 != 0 {
            return Err(Error::Misaligned { offset });
        }
        Self::check_range(offset, 4)
    }

    pub fn read_word(&self, offset: u32) -> Result<u32, Error> {
        Self::check_word(offset)?;
        Ok(self.regs.read(offset))
    }

    pub fn write_word(&self, offset: u32, value: u32) -> Result<(), Error> {
        Self::check_word(offset)?;
        self.regs.write(offset, value);
        Ok(())
    }

    /// Copy `buf.len()` bytes starting at `offset` into `buf`.
    pub fn read_bytes(&self, offset: u32, buf: &mut [u8]) -> Result<(), Error> {
        Self::check_range(offset, buf.len() as u32)?;
        for (i, byte) in buf.iter_mut().enumerate() {
            let addr = offset + i as u32;
            let word = self.regs.read(addr & !3);
            *byte = (word >> ((addr & 3) * 8)) as u8;
        }
        Ok(())
    }

    /// Store `bytes` starting at `offset`, merging partial words.
    pub fn write_bytes(&self, offset: u32, bytes: &[u8]) -> Result<(), Error> {
        Self::check_range(offset, bytes.len() as u32)?;
        for (i, &byte) in bytes.iter().enumerate() {
            let addr = offset + i as u32;
            let shift = (addr & 3) * 8;
            let word = self.regs.read(addr & !3);
            let word = (word & !(0xFF << shift)) | (byte as u32) << shift;
            self.regs.write(addr & !3, word);
        }
        Ok(())
    }
}

impl<D: RegisterDriver> ReadStorage for Shram<D> {
    type Error = Error;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        self.read_bytes(offset, bytes)
    }

    fn capacity(&self) -> usize {
        SHRAM_SIZE as usize
    }
}

impl<D: RegisterDriver> Storage for Shram<D> {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        self.write_bytes(offset, bytes)
    }
}
