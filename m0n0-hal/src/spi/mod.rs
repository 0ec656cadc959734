//! SPI master and the PCSM link.
//!
//! The controller drives up to four slaves. The power control state machine
//! (PCSM) sits behind [`PCSM_SLAVE`] and is programmed with 4-byte frames:
//! an 8-bit register index followed by 24 bits of data, MSB first.
//!
//! When the autosample engine is enabled it owns the bus and clocks the
//! sensor on [`AUTOSAMPLE_SLAVE`] by itself. Every manual transfer or
//! configuration write is refused until autosampling has been disabled; see
//! [`crate::interrupt::AutosampleControl`].

use crate::interrupt::{AutosampleControl, AutosampleState};
use crate::pac;
use crate::regs::{RegisterDriver, RegisterWindow};

/// Chip select, one-hot.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SlaveSelect {
    Deselect = 0,
    Ss0 = 1,
    Ss1 = 2,
    Ss2 = 4,
    Ss3 = 8,
}

impl SlaveSelect {
    pub const fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0 => Some(SlaveSelect::Deselect),
            1 => Some(SlaveSelect::Ss0),
            2 => Some(SlaveSelect::Ss1),
            4 => Some(SlaveSelect::Ss2),
            8 => Some(SlaveSelect::Ss3),
            _ => None,
        }
    }

    pub const fn bits(self) -> u32 {
        self as u32
    }
}

/// Slave wired to the power control state machine.
pub const PCSM_SLAVE: SlaveSelect = SlaveSelect::Ss3;
/// Slave sampled by the autosample engine.
pub const AUTOSAMPLE_SLAVE: SlaveSelect = SlaveSelect::Ss2;
/// Largest payload of a PCSM frame.
pub const PCSM_DATA_MAX: u32 = 0x00FF_FFFF;

/// Clock polarity and phase.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// CPOL = 0, CPHA = 0
    Mode0,
    /// CPOL = 0, CPHA = 1
    Mode1,
    /// CPOL = 1, CPHA = 0
    Mode2,
    /// CPOL = 1, CPHA = 1
    Mode3,
}

impl Mode {
    const fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            0 => Mode::Mode0,
            1 => Mode::Mode1,
            2 => Mode::Mode2,
            _ => Mode::Mode3,
        }
    }

    const fn bits(self) -> u32 {
        match self {
            Mode::Mode0 => 0,
            Mode::Mode1 => 1,
            Mode::Mode2 => 2,
            Mode::Mode3 => 3,
        }
    }
}

/// Set or clear the autosample engine enable bit.
///
/// This bypasses the ownership check; it is used by the autosample interrupt
/// to stop the engine.
pub(crate) fn write_autosample_enable<D: RegisterDriver>(regs: &RegisterWindow<D>, enable: bool) {
    regs.write_masked(pac::spi::CONTROL, pac::spi::control::ENABLE_AUTO_SAMPLE, enable as u32);
}

/// A few cycles for the controller to raise STATUS after a command.
#[inline(always)]
fn settle() {
    #[cfg(all(target_arch = "arm", target_os = "none"))]
    {
        cortex_m::asm::nop();
        cortex_m::asm::nop();
    }
}

/// SPI master driver.
pub struct Spi<'a, D> {
    regs: RegisterWindow<D>,
    autosample: &'a AutosampleControl,
}

impl<'a, D: RegisterDriver> Spi<'a, D> {
    pub fn new(regs: RegisterWindow<D>, autosample: &'a AutosampleControl) -> Self {
        Self { regs, autosample }
    }

    pub fn regs(&self) -> &RegisterWindow<D> {
        &self.regs
    }

    #[track_caller]
    fn ensure_owned(&self) {
        assert!(
            !self.autosample.is_active(),
            "SPI accessed while the autosample engine owns the bus"
        );
    }

    pub fn set_clock_divider(&mut self, divider: u32) {
        self.ensure_owned();
        self.regs.write(pac::spi::CLK_DIVIDE, divider);
    }

    pub fn clock_divider(&self) -> u32 {
        self.regs.read(pac::spi::CLK_DIVIDE)
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.ensure_owned();
        self.regs
            .write_masked(pac::spi::CONTROL, pac::spi::control::CLK_POLARITY_PHASE, mode.bits());
    }

    pub fn mode(&self) -> Mode {
        Mode::from_bits(self.regs.read_masked(pac::spi::CONTROL, pac::spi::control::CLK_POLARITY_PHASE))
    }

    /// Select `slave`. [`SlaveSelect::Deselect`] releases all chip selects.
    pub fn set_slave(&mut self, slave: SlaveSelect) {
        self.ensure_owned();
        self.select(slave);
    }

    fn select(&self, slave: SlaveSelect) {
        let enable = slave != SlaveSelect::Deselect;
        self.regs
            .write_masked(pac::spi::CONTROL, pac::spi::control::ENABLE_MASK, enable as u32);
        self.regs
            .write_masked(pac::spi::CONTROL, pac::spi::control::CHIP_SELECT, slave.bits());
    }

    /// Currently selected slave. A multi-hot chip select reads as deselected.
    pub fn slave(&self) -> SlaveSelect {
        let bits = self.regs.read_masked(pac::spi::CONTROL, pac::spi::control::CHIP_SELECT);
        SlaveSelect::from_bits(bits).unwrap_or(SlaveSelect::Deselect)
    }

    /// Chip select polarity of `slave`. Only SS0 to SS2 are configurable.
    pub fn set_cs_active_low(&mut self, slave: SlaveSelect, active_low: bool) {
        self.ensure_owned();
        let mask = match slave {
            SlaveSelect::Ss0 => pac::spi::control::CS_ACTIVE_LOW_SS0,
            SlaveSelect::Ss1 => pac::spi::control::CS_ACTIVE_LOW_SS1,
            SlaveSelect::Ss2 => pac::spi::control::CS_ACTIVE_LOW_SS2,
            _ => panic!("chip select polarity is fixed for {:?}", slave),
        };
        self.regs.write_masked(pac::spi::CONTROL, mask, active_low as u32);
    }

    pub fn set_lsb_first(&mut self, lsb_first: bool) {
        self.ensure_owned();
        self.regs
            .write_masked(pac::spi::CONTROL, pac::spi::control::LSB_FIRST, lsb_first as u32);
    }

    fn wait_idle(&self) {
        while self.regs.read(pac::spi::STATUS) != 0 {}
    }

    fn transfer_byte(&self, byte: u8) -> u8 {
        self.regs.write(pac::spi::DATA_WRITE, byte as u32);
        self.regs.write(pac::spi::COMMAND, 1);
        settle();
        self.wait_idle();
        let rx = self.regs.read(pac::spi::DATA_READ) as u8;
        self.wait_idle();
        rx
    }

    /// Shift `byte` out to the selected slave and return the byte clocked in.
    pub fn write_byte(&mut self, byte: u8) -> u8 {
        self.ensure_owned();
        self.transfer_byte(byte)
    }

    pub fn write_byte_to(&mut self, slave: SlaveSelect, byte: u8) -> u8 {
        self.set_slave(slave);
        self.write_byte(byte)
    }

    /// Write `data` to PCSM register `addr`.
    ///
    /// The frame is sent in mode 0 on [`PCSM_SLAVE`]; the previous mode and
    /// slave selection are restored afterwards.
    #[track_caller]
    pub fn pcsm_write(&mut self, addr: u8, data: u32) {
        assert!(data <= PCSM_DATA_MAX, "PCSM data {:#x} wider than 24 bits", data);
        self.ensure_owned();

        let mode = self.mode();
        let slave = self.slave();

        self.set_mode(Mode::Mode0);
        self.select(PCSM_SLAVE);
        for byte in [addr, (data >> 16) as u8, (data >> 8) as u8, data as u8] {
            self.transfer_byte(byte);
        }
        self.select(SlaveSelect::Deselect);
        self.set_mode(mode);
        if slave != SlaveSelect::Deselect {
            self.select(slave);
        }
        trace!("pcsm[{:#x}] <- {:#x}", addr, data);
    }

    /// Hand the bus to the autosample engine.
    ///
    /// Ignored while the engine is running, including while a disable is
    /// still pending.
    pub fn enable_autosampling(&mut self) {
        match self.autosample.state() {
            AutosampleState::Disabled => {}
            AutosampleState::Enabled => return,
            AutosampleState::DisableRequested => {
                warn!("autosampling enable ignored, disable pending");
                return;
            }
        }
        write_autosample_enable(&self.regs, true);
        self.select(AUTOSAMPLE_SLAVE);
        self.autosample.mark_enabled();
        debug!("autosampling enabled");
    }

    /// Stop the autosample engine immediately, without waiting for the
    /// sample in flight.
    pub fn disable_autosampling(&mut self) {
        // The autosample IRQ must not observe the state and the enable bit
        // out of step.
        critical_section::with(|_| {
            self.autosample.mark_disabled();
            write_autosample_enable(&self.regs, false);
        });
        debug!("autosampling disabled");
    }

    pub fn is_autosampling(&self) -> bool {
        self.autosample.is_active()
    }
}

impl<'a, D: RegisterDriver> embedded_hal_1::spi::ErrorType for Spi<'a, D> {
    type Error = core::convert::Infallible;
}

impl<'a, D: RegisterDriver> embedded_hal_1::spi::SpiBus<u8> for Spi<'a, D> {
    fn read(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        for word in words {
            *word = self.write_byte(0);
        }
        Ok(())
    }

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        for &word in words {
            self.write_byte(word);
        }
        Ok(())
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        let len = read.len().max(write.len());
        for i in 0..len {
            let rx = self.write_byte(write.get(i).copied().unwrap_or(0));
            if let Some(slot) = read.get_mut(i) {
                *slot = rx;
            }
        }
        Ok(())
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        for word in words {
            *word = self.write_byte(*word);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.wait_idle();
        Ok(())
    }
}

#[cfg(test)]
mod tests;
