//! Debug console over the STDOUT/STDIN FIFOs.
//!
//! The FIFOs are drained by the ADP debug transport. Nothing drains STDOUT
//! when no host is attached, so every output path first checks the DEVE bit
//! in STATUS7 and drops the text when it is clear; writing regardless would
//! eventually block forever on a full FIFO.

use core::fmt;

use crate::pac;
use crate::regs::{RegisterDriver, RegisterWindow};

/// Marker that prefixes every ADP transaction keyword.
pub const ADP_COMMAND_ID: &str = "3d7db2ae";

/// Console log severity.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    const fn prefix(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG: ",
            LogLevel::Info => "INFO:  ",
            LogLevel::Warn => "WARN:  ",
            LogLevel::Error => "ERROR: ",
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

/// Text console of the chip.
pub struct Console<D> {
    stdout: RegisterWindow<D>,
    stdin: RegisterWindow<D>,
    status: RegisterWindow<D>,
    level: LogLevel,
}

impl<D: RegisterDriver + Clone> Console<D> {
    pub fn new(driver: D, level: LogLevel) -> Self {
        Self {
            stdout: RegisterWindow::new(pac::stdout::WINDOW, driver.clone()),
            stdin: RegisterWindow::new(pac::stdin::WINDOW, driver.clone()),
            status: RegisterWindow::new(pac::status::WINDOW, driver),
            level,
        }
    }
}

impl<D: RegisterDriver> Console<D> {
    /// Whether a debug environment is attached (STATUS7 DEVE).
    pub fn is_enabled(&self) -> bool {
        self.status
            .read_masked(pac::status::STATUS7, pac::status::status7::DEVE_CORE)
            != 0
    }

    pub fn set_log_level(&mut self, level: LogLevel) {
        self.level = level;
    }

    pub fn log_level(&self) -> LogLevel {
        self.level
    }

    fn put(&self, byte: u8) {
        while self.stdout.read_masked(pac::stdout::STATUS, pac::stdout::status::TXF) != 0 {}
        self.stdout.write(pac::stdout::WDATA, byte as u32);
    }

    fn put_str(&self, s: &str) {
        for byte in s.bytes() {
            self.put(byte);
        }
    }

    /// Print formatted text.
    ///
    /// Returns the number of bytes written, or `None` when the console is
    /// disabled.
    pub fn print(&mut self, args: fmt::Arguments) -> Option<usize> {
        if !self.is_enabled() {
            return None;
        }
        let mut out = Counted { console: self, written: 0 };
        // `Counted` never fails.
        let _ = fmt::write(&mut out, args);
        Some(out.written)
    }

    /// Print one line prefixed with the severity.
    ///
    /// Returns `None` when `level` is below the minimum or the console is
    /// disabled.
    pub fn log(&mut self, level: LogLevel, args: fmt::Arguments) -> Option<usize> {
        if level < self.level || !self.is_enabled() {
            return None;
        }
        let mut out = Counted { console: self, written: 0 };
        let _ = fmt::Write::write_str(&mut out, level.prefix());
        let _ = fmt::write(&mut out, args);
        let _ = fmt::Write::write_str(&mut out, "\n");
        Some(out.written)
    }

    pub fn debug(&mut self, args: fmt::Arguments) -> Option<usize> {
        self.log(LogLevel::Debug, args)
    }

    pub fn info(&mut self, args: fmt::Arguments) -> Option<usize> {
        self.log(LogLevel::Info, args)
    }

    pub fn warn(&mut self, args: fmt::Arguments) -> Option<usize> {
        self.log(LogLevel::Warn, args)
    }

    pub fn error(&mut self, args: fmt::Arguments) -> Option<usize> {
        self.log(LogLevel::Error, args)
    }

    /// Whether STDIN holds at least one byte.
    pub fn has_input(&self) -> bool {
        self.stdin.read_masked(pac::stdin::STATUS, pac::stdin::status::RXE) == 0
    }

    /// Block until a byte arrives on STDIN.
    pub fn read_byte(&mut self) -> u8 {
        while !self.has_input() {}
        self.stdin.read_masked(pac::stdin::RDATA, pac::stdin::rdata::READ_CHAR) as u8
    }

    /// Open an ADP transaction named `name`.
    ///
    /// The transaction is closed by [`AdpTransaction::end`] or on drop.
    pub fn transaction<'c>(&'c mut self, name: &'c str) -> AdpTransaction<'c, D> {
        self.info(format_args!("Starting TX..."));
        self.print(format_args!("\n{}_tx_start<<{}>>", ADP_COMMAND_ID, name));
        AdpTransaction { console: self, name }
    }
}

struct Counted<'c, D> {
    console: &'c Console<D>,
    written: usize,
}

impl<'c, D: RegisterDriver> fmt::Write for Counted<'c, D> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.console.put_str(s);
        self.written += s.len();
        Ok(())
    }
}

impl<D: RegisterDriver> fmt::Write for Console<D> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.is_enabled() {
            self.put_str(s);
        }
        Ok(())
    }
}

impl<D: RegisterDriver> embedded_io::ErrorType for Console<D> {
    type Error = core::convert::Infallible;
}

impl<D: RegisterDriver> embedded_io::Write for Console<D> {
    /// Output is discarded, not refused, while the console is disabled.
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if self.is_enabled() {
            for &byte in buf {
                self.put(byte);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl<D: RegisterDriver> embedded_io::Read for Console<D> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let Some((first, rest)) = buf.split_first_mut() else {
            return Ok(0);
        };
        *first = self.read_byte();
        let mut n = 1;
        for slot in rest {
            if !self.has_input() {
                break;
            }
            *slot = self.read_byte();
            n += 1;
        }
        Ok(n)
    }
}

/// An open ADP transaction.
///
/// Text printed between [`Console::transaction`] and
/// [`end_of_params`](Self::end_of_params) is the parameter section, text
/// after it is the payload.
pub struct AdpTransaction<'c, D: RegisterDriver> {
    console: &'c mut Console<D>,
    name: &'c str,
}

impl<'c, D: RegisterDriver> AdpTransaction<'c, D> {
    pub fn end_of_params(&mut self) {
        self.console.print(format_args!("\n{}_params_end", ADP_COMMAND_ID));
    }

    pub fn print(&mut self, args: fmt::Arguments) -> Option<usize> {
        self.console.print(args)
    }

    pub fn console(&mut self) -> &mut Console<D> {
        &mut *self.console
    }

    pub fn end(self) {}
}

impl<'c, D: RegisterDriver> Drop for AdpTransaction<'c, D> {
    fn drop(&mut self) {
        self.console
            .print(format_args!("\n{}_tx_end<<{}>>\n", ADP_COMMAND_ID, self.name));
        self.console.info(format_args!("Ended transaction"));
    }
}
