//! Interrupt dispatch.
//!
//! The vector table routes each chip interrupt to a fixed handler in this
//! crate. That handler bumps a diagnostic counter and forwards to the user
//! callback registered for its [`Source`] in a [`Handlers`] table. Each source
//! holds at most one callback; registering a new one replaces the old.
//!
//! The autosample line also drives the [`AutosampleControl`] state machine:
//! a disable requested from thread mode is carried out by the next autosample
//! interrupt, after the sample in flight has finished with the SPI bus.
//!
//! ```text
//!              enable             request_disable          next IRQ
//!  Disabled ------------> Enabled ---------------> DisableRequested ---> Disabled
//!     ^                      |
//!     +----------------------+  disable (fast path)
//! ```

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use portable_atomic::{AtomicU32, AtomicU8, Ordering};

use crate::pac::Interrupt;
use crate::regs::{RegisterDriver, RegisterWindow};
use crate::spi;

#[cfg(all(feature = "rt", target_arch = "arm", target_os = "none"))]
mod handlers;

/// User callback invoked from interrupt context.
pub type Handler = fn();

/// Interrupt sources that accept a user callback.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Source {
    /// External wake pin.
    ExtWake,
    /// Cortex-M SysTick exception.
    SysTick,
    /// PCSM interrupt timer.
    PcsmTimer,
    /// SPI autosample complete.
    Autosample,
}

impl Source {
    pub const ALL: [Source; 4] = [Source::ExtWake, Source::SysTick, Source::PcsmTimer, Source::Autosample];

    const fn index(self) -> usize {
        self as usize
    }

    /// NVIC line of the source; `None` for core exceptions.
    pub const fn interrupt(self) -> Option<Interrupt> {
        match self {
            Source::ExtWake => Some(Interrupt::Interrupt6),
            Source::SysTick => None,
            Source::PcsmTimer => Some(Interrupt::Interrupt5),
            Source::Autosample => Some(Interrupt::Interrupt1),
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Source::ExtWake => "extwake",
            Source::SysTick => "systick",
            Source::PcsmTimer => "inttimer",
            Source::Autosample => "autosample",
        }
    }
}

/// State of the SPI autosample engine as seen by software.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum AutosampleState {
    Disabled = 0,
    Enabled = 1,
    /// Thread mode asked the next autosample interrupt to turn the engine off.
    DisableRequested = 2,
}

impl AutosampleState {
    const fn from_bits(bits: u8) -> Self {
        match bits {
            1 => AutosampleState::Enabled,
            2 => AutosampleState::DisableRequested,
            _ => AutosampleState::Disabled,
        }
    }
}

/// Lock-free rendezvous between thread mode and the autosample interrupt.
///
/// While the state is anything but [`AutosampleState::Disabled`] the SPI bus
/// belongs to the autosample engine and every manual transfer is refused.
pub struct AutosampleControl {
    state: AtomicU8,
}

impl AutosampleControl {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(AutosampleState::Disabled as u8),
        }
    }

    pub fn state(&self) -> AutosampleState {
        AutosampleState::from_bits(self.state.load(Ordering::SeqCst))
    }

    /// Whether the SPI bus currently belongs to the autosample engine.
    pub fn is_active(&self) -> bool {
        self.state() != AutosampleState::Disabled
    }

    pub(crate) fn mark_enabled(&self) {
        self.state.store(AutosampleState::Enabled as u8, Ordering::SeqCst);
    }

    pub(crate) fn mark_disabled(&self) {
        self.state.store(AutosampleState::Disabled as u8, Ordering::SeqCst);
    }

    /// `Enabled -> DisableRequested`. Returns `false` if autosampling was not
    /// running (nothing to wait for).
    pub(crate) fn request_disable(&self) -> bool {
        match self.state.compare_exchange(
            AutosampleState::Enabled as u8,
            AutosampleState::DisableRequested as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => true,
            Err(current) => current == AutosampleState::DisableRequested as u8,
        }
    }

    fn is_disable_requested(&self) -> bool {
        self.state() == AutosampleState::DisableRequested
    }
}

impl Default for AutosampleControl {
    fn default() -> Self {
        Self::new()
    }
}

type Slot = Mutex<CriticalSectionRawMutex, Cell<Option<Handler>>>;

/// One callback slot and one diagnostic counter per interrupt source.
pub struct Handlers {
    slots: [Slot; 4],
    counters: [AtomicU32; 4],
    gpio_count: AtomicU32,
    autosample: AutosampleControl,
}

impl Handlers {
    pub const fn new() -> Self {
        Self {
            slots: [
                Mutex::new(Cell::new(None)),
                Mutex::new(Cell::new(None)),
                Mutex::new(Cell::new(None)),
                Mutex::new(Cell::new(None)),
            ],
            counters: [AtomicU32::new(0), AtomicU32::new(0), AtomicU32::new(0), AtomicU32::new(0)],
            gpio_count: AtomicU32::new(0),
            autosample: AutosampleControl::new(),
        }
    }

    /// Register `handler` for `source`, replacing any previous one.
    pub fn set(&self, source: Source, handler: Handler) {
        self.slots[source.index()].lock(|slot| slot.set(Some(handler)));
    }

    pub fn clear(&self, source: Source) {
        self.slots[source.index()].lock(|slot| slot.set(None));
    }

    pub fn handler(&self, source: Source) -> Option<Handler> {
        self.slots[source.index()].lock(|slot| slot.get())
    }

    /// Times the interrupt of `source` has fired.
    pub fn count(&self, source: Source) -> u32 {
        self.counters[source.index()].load(Ordering::Relaxed)
    }

    /// Times the GPIO interrupt has fired. It has no callback slot.
    pub fn gpio_count(&self) -> u32 {
        self.gpio_count.load(Ordering::Relaxed)
    }

    pub fn autosample(&self) -> &AutosampleControl {
        &self.autosample
    }

    /// Interrupt entry for `source`: count, then run the callback if any.
    pub fn dispatch(&self, source: Source) {
        self.counters[source.index()].fetch_add(1, Ordering::Relaxed);
        self.invoke(source);
    }

    /// Interrupt entry for the autosample line.
    ///
    /// A pending disable request is served here, in place of the user
    /// callback: the engine is stopped through `spi` and the state machine
    /// moves to [`AutosampleState::Disabled`].
    pub fn dispatch_autosample<D: RegisterDriver>(&self, spi: &RegisterWindow<D>) {
        self.counters[Source::Autosample.index()].fetch_add(1, Ordering::Relaxed);
        if self.autosample.is_disable_requested() {
            spi::write_autosample_enable(spi, false);
            self.autosample.mark_disabled();
            return;
        }
        self.invoke(Source::Autosample);
    }

    pub fn record_gpio(&self) {
        self.gpio_count.fetch_add(1, Ordering::Relaxed);
    }

    fn invoke(&self, source: Source) {
        match self.handler(source) {
            Some(handler) => handler(),
            None => debug!("{} handler null", source.name()),
        }
    }
}

impl Default for Handlers {
    fn default() -> Self {
        Self::new()
    }
}

/// Handler table served by the chip's interrupt vectors.
pub static HANDLERS: Handlers = Handlers::new();

#[cfg(test)]
mod tests;
