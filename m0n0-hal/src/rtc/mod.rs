//! Real-time clock and RTC-based timing.
//!
//! The always-on RTC runs from a ~33 kHz oscillator and keeps counting
//! through timed shutdowns (but not through a deep shutdown). Its 44-bit
//! counter is split over STATUS2 (low word) and STATUS4 (high 12 bits).

use crate::cpu::Cpu;
use crate::interrupt::Source;
use crate::pac;
use crate::pmu::PerfLevel;
use crate::regs::{RegisterDriver, RegisterWindow};
use crate::system::System;

/// RTC tick rate.
pub const RTC_FREQUENCY_HZ: u32 = 33_000;
/// RTC ticks in one millisecond.
pub const RTC_TICKS_PER_MS: u64 = 33;
/// Approximate length of one tick, for display only.
pub const RTC_PERIOD_US: f32 = 30.303_03;
/// Largest interval the PCSM wakeup registers can hold.
pub const RTC_MAX_WAKEUP_TICKS: u64 = (1 << 48) - 1;

/// Exact tick to microsecond conversion, rounded down.
///
/// Saturates at `u64::MAX` for counts past about 6.1e17 ticks.
pub const fn ticks_to_micros(ticks: u64) -> u64 {
    // 1_000_000 / 33_000 == 1_000 / 33
    let micros = ticks as u128 * 1_000 / 33;
    if micros > u64::MAX as u128 {
        u64::MAX
    } else {
        micros as u64
    }
}

pub const fn ms_to_ticks(ms: u32) -> u64 {
    ms as u64 * RTC_TICKS_PER_MS
}

/// Read side of the RTC.
pub struct Rtc<D> {
    status: RegisterWindow<D>,
}

impl<D: RegisterDriver> Rtc<D> {
    pub fn new(status: RegisterWindow<D>) -> Self {
        Self { status }
    }

    /// Current counter value.
    ///
    /// The two halves cannot be latched together, so the low word is read on
    /// both sides of the high word; if it wrapped in between, the high word may
    /// belong to either side and the read is repeated.
    pub fn ticks(&self) -> u64 {
        loop {
            let low = self.status.read(pac::status::STATUS2);
            let high = self
                .status
                .read_masked(pac::status::STATUS4, pac::status::status4::RTC_MSBS);
            let low_again = self.status.read(pac::status::STATUS2);
            if low_again >= low {
                return (high as u64) << 32 | low as u64;
            }
        }
    }

    /// Current counter value in microseconds, lossy.
    pub fn micros(&self) -> f32 {
        self.ticks() as f32 * RTC_PERIOD_US
    }

    /// Whether the RTC oscillator is trimmed to real time.
    pub fn is_real_time(&self) -> bool {
        self.status
            .read_masked(pac::status::STATUS7, pac::status::status7::REAL_TIME_FLAG)
            != 0
    }

    /// Busy-wait for `ticks` RTC ticks at the current performance level.
    pub fn sleep_ticks(&self, ticks: u64) {
        let start = self.ticks();
        while self.ticks().wrapping_sub(start) < ticks {}
    }

    pub fn sleep_ms(&self, ms: u32) {
        self.sleep_ticks(ms_to_ticks(ms));
    }
}

/// Software interval timer on top of the RTC.
///
/// Holds a start snapshot and an interval. Three blocking waits are offered,
/// trading wake-up latency for power:
///
/// - [`wait`](Self::wait) spins at the current performance level,
/// - [`wait_low_power`](Self::wait_low_power) spins at [`PerfLevel::MIN`],
/// - [`wait_low_power_sleep`](Self::wait_low_power_sleep) sleeps on `WFI`
///   until the PCSM interrupt timer fires, also at [`PerfLevel::MIN`].
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RtcTimer {
    start: u64,
    interval: u64,
}

impl RtcTimer {
    pub const fn new(interval_ticks: u64) -> Self {
        Self {
            start: 0,
            interval: interval_ticks,
        }
    }

    /// Restart the interval from now.
    pub fn reset<D: RegisterDriver>(&mut self, rtc: &Rtc<D>) {
        self.start = rtc.ticks();
    }

    /// Ticks since the last reset.
    pub fn elapsed_ticks<D: RegisterDriver>(&self, rtc: &Rtc<D>) -> u64 {
        rtc.ticks().wrapping_sub(self.start)
    }

    pub fn elapsed_micros<D: RegisterDriver>(&self, rtc: &Rtc<D>) -> f32 {
        self.elapsed_ticks(rtc) as f32 * RTC_PERIOD_US
    }

    pub fn set_interval(&mut self, ticks: u64) {
        self.interval = ticks;
    }

    pub fn set_interval_ms(&mut self, ms: u32) {
        self.interval = ms_to_ticks(ms);
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Whether the interval has elapsed since the last reset.
    pub fn check_interval<D: RegisterDriver>(&self, rtc: &Rtc<D>) -> bool {
        self.elapsed_ticks(rtc) >= self.interval
    }

    /// Spin until one interval has elapsed from this call.
    pub fn wait<D: RegisterDriver>(&mut self, rtc: &Rtc<D>) {
        self.reset(rtc);
        while !self.check_interval(rtc) {}
    }

    /// Like [`wait`](Self::wait), at the lowest performance level.
    ///
    /// The level change is applied by the PCSM asynchronously, so part of the
    /// interval may still run at the original speed.
    pub fn wait_low_power<D, C>(&mut self, sys: &mut System<'_, D, C>)
    where
        D: RegisterDriver + Clone,
        C: Cpu,
    {
        self.reset(sys.rtc());
        let original = sys.perf();
        sys.set_perf(PerfLevel::MIN);
        while !self.check_interval(sys.rtc()) {}
        if let Some(level) = original {
            sys.set_perf(level);
        }
    }

    /// Sleep for one interval with the PCSM interrupt timer as wake source.
    ///
    /// The CPU deep-sleep flag is cleared first so that `WFI` idles the core
    /// instead of shutting the chip down. Any other enabled interrupt ends the
    /// sleep early. No callback runs on the wake: a handler registered for
    /// [`Source::PcsmTimer`] is dropped.
    pub fn wait_low_power_sleep<D, C>(&mut self, sys: &mut System<'_, D, C>)
    where
        D: RegisterDriver + Clone,
        C: Cpu,
    {
        self.reset(sys.rtc());
        sys.handlers().clear(Source::PcsmTimer);
        sys.arm_pcsm_interrupt_timer(self.interval);
        let original = sys.perf();
        sys.set_perf(PerfLevel::MIN);
        sys.clear_cpu_deep_sleep();
        sys.wait_for_interrupt();
        sys.disable_pcsm_interrupt_timer();
        if let Some(level) = original {
            sys.set_perf(level);
        }
    }
}

#[cfg(test)]
mod tests;
