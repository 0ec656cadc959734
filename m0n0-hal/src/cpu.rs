//! Core-side operations used by the power and interrupt code.
//!
//! [`Cpu`] is the seam between the chip logic and the Cortex-M33 core: WFI,
//! the SLEEPDEEP bit, NVIC masking and SysTick. [`CortexM33`] implements it on
//! the bare-metal target.

use crate::pac::Interrupt;

/// Snapshot of the configurable fault status registers.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FaultStatus {
    pub cfsr: u32,
    pub hfsr: u32,
    pub mmfar: u32,
    pub bfar: u32,
}

pub trait Cpu {
    /// Execute `WFI`.
    fn wait_for_interrupt(&mut self);
    /// Set or clear `SCB.SCR.SLEEPDEEP`.
    fn set_sleep_deep(&mut self, enable: bool);
    fn is_sleep_deep(&self) -> bool;
    /// Unmask a device interrupt line in the NVIC.
    fn unmask(&mut self, irq: Interrupt);
    /// Mask a device interrupt line in the NVIC.
    fn mask(&mut self, irq: Interrupt);
    /// Restart SysTick from `reload`, counting on the core clock.
    fn start_systick(&mut self, reload: u32, interrupt: bool);
    fn stop_systick(&mut self);
    fn systick_value(&self) -> u32;
    fn cpuid(&self) -> u32;
    fn fault_status(&self) -> FaultStatus;
}

/// Largest SysTick reload value (24-bit counter).
pub const SYSTICK_MAX_RELOAD: u32 = 0x00FF_FFFF;

cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "arm", target_os = "none"))] {
        use cortex_m::peripheral::syst::SystClkSource;
        use cortex_m::peripheral::{CPUID, SCB, SYST};
        use embassy_hal_internal::interrupt::InterruptExt;

        /// The Cortex-M33 core of the chip.
        pub struct CortexM33 {
            scb: SCB,
            syst: SYST,
        }

        impl CortexM33 {
            pub fn new(scb: SCB, syst: SYST) -> Self {
                Self { scb, syst }
            }
        }

        impl Cpu for CortexM33 {
            #[inline]
            fn wait_for_interrupt(&mut self) {
                cortex_m::asm::wfi();
            }

            fn set_sleep_deep(&mut self, enable: bool) {
                if enable {
                    self.scb.set_sleepdeep();
                } else {
                    self.scb.clear_sleepdeep();
                }
            }

            fn is_sleep_deep(&self) -> bool {
                // SCR.SLEEPDEEP is bit 2
                self.scb.scr.read() & (1 << 2) != 0
            }

            fn unmask(&mut self, irq: Interrupt) {
                unsafe { irq.enable() };
            }

            fn mask(&mut self, irq: Interrupt) {
                irq.disable();
            }

            fn start_systick(&mut self, reload: u32, interrupt: bool) {
                assert!(reload <= SYSTICK_MAX_RELOAD, "SysTick reload exceeds 24 bits");
                self.syst.disable_counter();
                self.syst.set_reload(reload);
                self.syst.clear_current();
                self.syst.set_clock_source(SystClkSource::Core);
                if interrupt {
                    self.syst.enable_interrupt();
                } else {
                    self.syst.disable_interrupt();
                }
                self.syst.enable_counter();
            }

            fn stop_systick(&mut self) {
                self.syst.disable_counter();
                self.syst.disable_interrupt();
            }

            fn systick_value(&self) -> u32 {
                SYST::get_current()
            }

            fn cpuid(&self) -> u32 {
                unsafe { (*CPUID::PTR).base.read() }
            }

            fn fault_status(&self) -> FaultStatus {
                read_fault_status()
            }
        }

        /// Read the fault status registers without owning the SCB.
        pub(crate) fn read_fault_status() -> FaultStatus {
            let scb = unsafe { &*SCB::PTR };
            FaultStatus {
                cfsr: scb.cfsr.read(),
                hfsr: scb.hfsr.read(),
                mmfar: scb.mmfar.read(),
                bfar: scb.bfar.read(),
            }
        }
    }
}
