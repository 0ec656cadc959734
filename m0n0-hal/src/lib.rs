#![no_std]
#![doc = include_str!("../README.md")]
#![allow(unsafe_op_in_unsafe_fn)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

mod utils;

pub mod regs;
pub mod cpu;
pub mod pmu;
pub mod interrupt;
pub mod rtc;
pub mod spi;
pub mod shram;
pub mod console;
pub mod circular_buf;
pub mod system;
pub mod adp;

#[cfg(test)]
mod testing;

// Reexports
pub use console::{Console, LogLevel};
pub use regs::{Mmio, RegisterDriver, RegisterWindow};
pub use system::System;

/// HAL configuration for M0N0
pub mod config {
    use crate::console::LogLevel;

    /// HAL configuration passed when initializing.
    #[non_exhaustive]
    pub struct Config {
        /// Threshold below which console log messages are dropped.
        pub log_level: LogLevel,
        /// Apply the recommended PCSM analog settings during bring-up.
        pub recommended_settings: bool,
        /// SPI clock divider, or `None` to keep the reset value.
        pub spi_clock_divider: Option<u32>,
    }

    impl Default for Config {
        fn default() -> Self {
            Self {
                log_level: LogLevel::Info,
                recommended_settings: true,
                spi_clock_divider: None,
            }
        }
    }
}
pub use config::Config;

/// Generated register map of the selected chip.
pub mod pac {
    #![allow(dead_code)]
    #![allow(unused_imports)]
    #![allow(non_snake_case)]
    #![allow(missing_docs)]
    #![allow(clippy::all)]

    include!(concat!(env!("OUT_DIR"), "/_generated.rs"));
}

#[cfg(all(target_arch = "arm", target_os = "none"))]
static INITIALIZED: portable_atomic::AtomicBool = portable_atomic::AtomicBool::new(false);

/// Initialize the `m0n0-hal` with the provided configuration.
///
/// This returns the [`System`] handle that owns every memory-mapped block of
/// the chip together with the core peripherals it needs.
///
/// This should only be called once at startup, otherwise it panics.
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub fn init(config: Config) -> System<'static, Mmio, cpu::CortexM33> {
    use portable_atomic::Ordering;

    // Do this first, so that it panics if user is calling `init` a second time
    // before doing anything important.
    if INITIALIZED.swap(true, Ordering::AcqRel) {
        panic!("m0n0_hal::init called more than once");
    }
    let cp = match cortex_m::Peripherals::take() {
        Some(cp) => cp,
        None => panic!("core peripherals already taken"),
    };

    let cpu = cpu::CortexM33::new(cp.SCB, cp.SYST);
    System::new(Mmio, cpu, &interrupt::HANDLERS, config)
}
