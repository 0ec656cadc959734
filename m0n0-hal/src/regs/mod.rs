//! Register access layer.
//!
//! Every hardware access in this crate goes through a [`RegisterWindow`]: a
//! [`RegisterDriver`] (the bus) composed with a [`RegisterWindowConfig`]
//! describing the address range, the addressing mode and the permitted access
//! direction. The window configurations for the memory-mapped peripherals are
//! generated from the register model into [`crate::pac`].
//!
//! ```no_run
//! use m0n0_hal::pac;
//! use m0n0_hal::regs::{Mmio, RegisterWindow};
//!
//! let status = RegisterWindow::new(pac::status::WINDOW, Mmio);
//! let deve = status.read_masked(pac::status::STATUS7, pac::status::status7::DEVE_CORE);
//! ```

use core::ptr;

/// Register access error.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The address lies outside of the window.
    OutOfRange { addr: u32 },
    /// The window does not permit reads.
    NotReadable { addr: u32 },
    /// The window does not permit writes.
    NotWritable { addr: u32 },
}

/// Access direction permitted by a window.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Access {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl Access {
    #[inline]
    pub const fn readable(self) -> bool {
        matches!(self, Access::ReadOnly | Access::ReadWrite)
    }

    #[inline]
    pub const fn writable(self) -> bool {
        matches!(self, Access::WriteOnly | Access::ReadWrite)
    }
}

/// How addresses passed to a window are interpreted.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Addressing {
    /// Callers pass full bus addresses in `[base, base + size]`.
    Absolute,
    /// Callers pass offsets in `[0, size]`; the window adds `base`.
    Relative,
}

/// Static description of a register window.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegisterWindowConfig {
    pub base: u32,
    pub size: u32,
    pub addressing: Addressing,
    pub access: Access,
}

/// Word-wide bus access.
///
/// Implementations only move data; range and direction checks are done by
/// [`RegisterWindow`].
pub trait RegisterDriver {
    fn read(&self, addr: u32) -> u32;
    fn write(&self, addr: u32, value: u32);
}

impl<T: RegisterDriver + ?Sized> RegisterDriver for &T {
    #[inline]
    fn read(&self, addr: u32) -> u32 {
        (**self).read(addr)
    }

    #[inline]
    fn write(&self, addr: u32, value: u32) {
        (**self).write(addr, value)
    }
}

/// Volatile memory-mapped bus of the chip.
#[derive(Debug, Copy, Clone, Default)]
pub struct Mmio;

impl RegisterDriver for Mmio {
    #[inline]
    fn read(&self, addr: u32) -> u32 {
        unsafe { ptr::read_volatile(addr as usize as *const u32) }
    }

    #[inline]
    fn write(&self, addr: u32, value: u32) {
        unsafe { ptr::write_volatile(addr as usize as *mut u32, value) }
    }
}

/// Bit position of the lowest set bit of `mask`.
#[inline]
pub const fn mask_shift(mask: u32) -> u32 {
    if mask == 0 {
        0
    } else {
        mask.trailing_zeros()
    }
}

/// Extract the bit group selected by `mask`, shifted down to bit 0.
#[inline]
pub const fn field_get(value: u32, mask: u32) -> u32 {
    (value & mask) >> mask_shift(mask)
}

/// Replace the bit group selected by `mask` with `field`.
///
/// Bits of `field` that do not fit the mask are dropped.
#[inline]
pub const fn field_set(value: u32, mask: u32, field: u32) -> u32 {
    (value & !mask) | ((field << mask_shift(mask)) & mask)
}

/// A driver bound to an address window.
#[derive(Debug, Clone, Copy)]
pub struct RegisterWindow<D> {
    config: RegisterWindowConfig,
    driver: D,
}

impl<D: RegisterDriver> RegisterWindow<D> {
    pub const fn new(config: RegisterWindowConfig, driver: D) -> Self {
        Self { config, driver }
    }

    pub fn config(&self) -> &RegisterWindowConfig {
        &self.config
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Translate a caller address into a bus address, checking the range.
    fn resolve(&self, addr: u32) -> Result<u32, Error> {
        let RegisterWindowConfig { base, size, addressing, .. } = self.config;
        match addressing {
            Addressing::Absolute => {
                if addr < base || addr - base > size {
                    return Err(Error::OutOfRange { addr });
                }
                Ok(addr)
            }
            Addressing::Relative => {
                if addr > size {
                    return Err(Error::OutOfRange { addr });
                }
                Ok(base.wrapping_add(addr))
            }
        }
    }

    pub fn try_read(&self, addr: u32) -> Result<u32, Error> {
        if !self.config.access.readable() {
            return Err(Error::NotReadable { addr });
        }
        let bus_addr = self.resolve(addr)?;
        Ok(self.driver.read(bus_addr))
    }

    pub fn try_read_masked(&self, addr: u32, mask: u32) -> Result<u32, Error> {
        Ok(field_get(self.try_read(addr)?, mask))
    }

    pub fn try_write(&self, addr: u32, value: u32) -> Result<(), Error> {
        if !self.config.access.writable() {
            return Err(Error::NotWritable { addr });
        }
        let bus_addr = self.resolve(addr)?;
        self.driver.write(bus_addr, value);
        Ok(())
    }

    /// Read-modify-write of the bit group selected by `mask`.
    ///
    /// Needs both directions: a write-only window cannot do masked writes.
    pub fn try_write_masked(&self, addr: u32, mask: u32, field: u32) -> Result<(), Error> {
        if !self.config.access.writable() {
            return Err(Error::NotWritable { addr });
        }
        let current = self.try_read(addr)?;
        self.try_write(addr, field_set(current, mask, field))
    }

    /// Like [`try_read`](Self::try_read), but an invalid access is fatal.
    #[track_caller]
    pub fn read(&self, addr: u32) -> u32 {
        match self.try_read(addr) {
            Ok(v) => v,
            Err(e) => fatal(e),
        }
    }

    #[track_caller]
    pub fn read_masked(&self, addr: u32, mask: u32) -> u32 {
        match self.try_read_masked(addr, mask) {
            Ok(v) => v,
            Err(e) => fatal(e),
        }
    }

    #[track_caller]
    pub fn write(&self, addr: u32, value: u32) {
        if let Err(e) = self.try_write(addr, value) {
            fatal(e)
        }
    }

    #[track_caller]
    pub fn write_masked(&self, addr: u32, mask: u32, field: u32) {
        if let Err(e) = self.try_write_masked(addr, mask, field) {
            fatal(e)
        }
    }
}

#[cold]
#[track_caller]
fn fatal(e: Error) -> ! {
    error!("register access failed: {:?}", e);
    panic!("register access failed: {:?}", e)
}

#[cfg(test)]
mod tests;
