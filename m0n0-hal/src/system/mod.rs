//! Power, clock and wake control.
//!
//! [`System`] is the hardware context of the chip. It owns the register
//! windows and drivers, the core, and a reference to the interrupt
//! [`Handlers`]; every power-state operation goes through it.
//!
//! # Power states
//!
//! - **Run**: the core executes at one of 16 DVFS [`PerfLevel`]s.
//! - **Sleep**: `WFI` with SLEEPDEEP clear. Any enabled interrupt resumes
//!   execution after the `WFI`.
//! - **Timed shutdown**: `WFI` with SLEEPDEEP set and a non-zero RTC wakeup
//!   programmed in the PCSM. Only the always-on domain stays powered (RTC,
//!   PCSM, SHRAM); after the interval the chip boots again from reset.
//! - **Deep shutdown**: like a timed shutdown with the wakeup cleared. The RTC
//!   stops and only the external wake pin can boot the chip.
//!
//! A VBAT power-on reset loses all of the above. It is detected on
//! construction from the ROM wakeup delay in STATUS7, which reads its reset
//! value of 32 only until the first [`System`] programs it.

use crate::console::{Console, LogLevel};
use crate::cpu::{Cpu, SYSTICK_MAX_RELOAD};
use crate::interrupt::{Handler, Handlers, Source};
use crate::pac;
use crate::pac::Interrupt;
use crate::pmu::dvfs::is_valid_raw;
use crate::pmu::PerfLevel;
use crate::regs::{field_get, field_set, RegisterDriver, RegisterWindow};
use crate::rtc::{ms_to_ticks, Rtc, RTC_MAX_WAKEUP_TICKS, RTC_PERIOD_US, RTC_TICKS_PER_MS};
use crate::shram::Shram;
use crate::spi::{Spi, PCSM_DATA_MAX};
use crate::utils::blocking_wait_timeout;
use crate::Config;

/// STATUS7 ROM_WAKEUP_DELAY after a VBAT power-on reset.
pub const VBAT_POR_ROM_WAKEUP_DELAY: u32 = 32;
/// ROM power-on delay programmed at start-up.
pub const ROM_PWR_ON_DELAY: u32 = 5;
/// PCSM RTC_CTRL1 reset value.
const RTC_CTRL1_RESET: u32 = 0x27;
/// SysTick reload used by [`System::estimate_tcro`].
const TCRO_SYSTICK_RELOAD: u32 = 10_000_000;
/// Width of the [`System::estimate_tcro`] window.
const TCRO_WINDOW_TICKS: u64 = 10 * RTC_TICKS_PER_MS;

/// Power-state error.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The autosample interrupt did not serve a disable request in time.
    /// The request stays pending.
    AutosampleDisableTimeout,
}

/// Parsed view of STATUS7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Status7 {
    /// A debug environment is attached.
    pub deve: bool,
    pub batmon_refrdy: bool,
    /// Battery below the lower monitor threshold.
    pub batmon_under: bool,
    /// Battery above the upper monitor threshold.
    pub batmon_over: bool,
    /// Raw DVFS identifier currently applied.
    pub perf_raw: u8,
    pub real_time: bool,
    /// The last boot was caused by the external wake pin.
    pub ext_wake: bool,
    pub memory_remap: u8,
    pub rom_wakeup_delay: u8,
    /// Unparsed register value.
    pub raw: u32,
}

impl Status7 {
    pub fn from_bits(raw: u32) -> Self {
        use pac::status::status7 as f;
        Self {
            deve: field_get(raw, f::DEVE_CORE) != 0,
            batmon_refrdy: field_get(raw, f::BATMON_REFRDY) != 0,
            batmon_under: field_get(raw, f::BATMON_UNDER) != 0,
            batmon_over: field_get(raw, f::BATMON_OVER) != 0,
            perf_raw: field_get(raw, f::PERF) as u8,
            real_time: field_get(raw, f::REAL_TIME_FLAG) != 0,
            ext_wake: field_get(raw, f::EXT_WAKE) != 0,
            memory_remap: field_get(raw, f::MEMORY_REMAP) as u8,
            rom_wakeup_delay: field_get(raw, f::ROM_WAKEUP_DELAY) as u8,
            raw,
        }
    }

    /// The applied performance level, if the raw identifier is valid.
    pub fn perf(&self) -> Option<PerfLevel> {
        PerfLevel::from_raw(self.perf_raw)
    }
}

/// The chip.
pub struct System<'a, D, C> {
    ctrl: RegisterWindow<D>,
    status: RegisterWindow<D>,
    rtc: Rtc<D>,
    spi: Spi<'a, D>,
    shram: Shram<D>,
    console: Console<D>,
    cpu: C,
    handlers: &'a Handlers,
    vbat_por: bool,
}

impl<'a, D, C> System<'a, D, C>
where
    D: RegisterDriver + Clone,
    C: Cpu,
{
    /// Take control of the chip through `driver`.
    ///
    /// Latches the VBAT power-on reset flag, then programs the ROM power-on
    /// delay (keeping the memory remap) so that a later boot can tell a
    /// shutdown wakeup from a power-on reset.
    pub fn new(driver: D, cpu: C, handlers: &'a Handlers, config: Config) -> Self {
        let status = RegisterWindow::new(pac::status::WINDOW, driver.clone());
        let vbat_por = status.read_masked(pac::status::STATUS7, pac::status::status7::ROM_WAKEUP_DELAY)
            == VBAT_POR_ROM_WAKEUP_DELAY;

        let mut sys = Self {
            ctrl: RegisterWindow::new(pac::control::WINDOW, driver.clone()),
            rtc: Rtc::new(RegisterWindow::new(pac::status::WINDOW, driver.clone())),
            spi: Spi::new(
                RegisterWindow::new(pac::spi::WINDOW, driver.clone()),
                handlers.autosample(),
            ),
            shram: Shram::new(RegisterWindow::new(pac::shram::WINDOW, driver.clone())),
            console: Console::new(driver, config.log_level),
            status,
            cpu,
            handlers,
            vbat_por,
        };

        let remap = sys
            .status
            .read_masked(pac::status::STATUS7, pac::status::status7::MEMORY_REMAP);
        let code_ctrl = field_set(
            field_set(0, pac::pcsm::code_ctrl::MEMORY_REMAP, remap),
            pac::pcsm::code_ctrl::ROM_PWR_ON_DELAY,
            ROM_PWR_ON_DELAY,
        );
        sys.spi.pcsm_write(pac::pcsm::CODE_CTRL, code_ctrl);

        if config.recommended_settings {
            sys.set_recommended_settings();
        }
        if let Some(divider) = config.spi_clock_divider {
            sys.spi.set_clock_divider(divider);
        }
        debug!("system up, vbat por: {}", vbat_por);
        sys
    }

    pub fn ctrl(&self) -> &RegisterWindow<D> {
        &self.ctrl
    }

    pub fn status(&self) -> &RegisterWindow<D> {
        &self.status
    }

    pub fn rtc(&self) -> &Rtc<D> {
        &self.rtc
    }

    pub fn spi(&mut self) -> &mut Spi<'a, D> {
        &mut self.spi
    }

    pub fn shram(&self) -> &Shram<D> {
        &self.shram
    }

    pub fn console(&mut self) -> &mut Console<D> {
        &mut self.console
    }

    pub fn cpu(&mut self) -> &mut C {
        &mut self.cpu
    }

    pub fn handlers(&self) -> &'a Handlers {
        self.handlers
    }

    // Performance

    /// Request performance level `level`.
    ///
    /// The PCSM ramps voltage and frequency asynchronously; [`perf`](Self::perf)
    /// may report the previous level for a while.
    pub fn set_perf(&mut self, level: PerfLevel) {
        debug!("perf -> {}", level.level());
        self.set_raw_perf(level.raw());
    }

    #[track_caller]
    pub fn set_raw_perf(&mut self, raw: u8) {
        assert!(is_valid_raw(raw), "invalid raw perf {}", raw);
        self.spi.pcsm_write(pac::pcsm::PERF_CTRL, raw as u32);
    }

    pub fn raw_perf(&self) -> u8 {
        self.status
            .read_masked(pac::status::STATUS7, pac::status::status7::PERF) as u8
    }

    /// Applied performance level, `None` if the raw identifier is invalid.
    pub fn perf(&self) -> Option<PerfLevel> {
        PerfLevel::from_raw(self.raw_perf())
    }

    // Timing

    pub fn sleep_ticks(&self, ticks: u64) {
        self.rtc.sleep_ticks(ticks);
    }

    pub fn sleep_ms(&self, ms: u32) {
        self.rtc.sleep_ms(ms);
    }

    /// Poll `condition` until it turns false, for at most `timeout` RTC ticks.
    pub fn blocking_wait_timeout<F: FnMut() -> bool>(&self, condition: F, timeout: u64) -> Result<(), ()> {
        blocking_wait_timeout(&self.rtc, condition, timeout)
    }

    // Shutdown

    /// Program the PCSM wakeup interval. Zero means no timed wakeup.
    #[track_caller]
    pub fn set_rtc_wakeup(&mut self, ticks: u64) {
        assert!(ticks <= RTC_MAX_WAKEUP_TICKS, "RTC wakeup {} exceeds 48 bits", ticks);
        self.spi
            .pcsm_write(pac::pcsm::RTC_WKUP1, (ticks >> 24) as u32 & PCSM_DATA_MAX);
        self.spi.pcsm_write(pac::pcsm::RTC_WKUP0, ticks as u32 & PCSM_DATA_MAX);
    }

    pub fn clear_rtc_wakeup(&mut self) {
        self.spi.pcsm_write(pac::pcsm::RTC_WKUP1, 0);
        self.spi.pcsm_write(pac::pcsm::RTC_WKUP0, 0);
    }

    /// Release the SPI bus before the chip powers down under it.
    fn shutdown_cleanup(&mut self) {
        if self.spi.is_autosampling() {
            self.disable_autosampling();
        }
    }

    fn enter_shutdown(&mut self) {
        self.cpu.set_sleep_deep(true);
        self.cpu.wait_for_interrupt();
    }

    /// Power down and boot again from reset after `ticks` RTC ticks.
    ///
    /// Only SHRAM and the PCSM keep their contents. On hardware this does not
    /// return.
    #[track_caller]
    pub fn timed_shutdown(&mut self, ticks: u64) {
        assert!(ticks != 0, "timed shutdown needs a non-zero wakeup");
        self.shutdown_cleanup();
        self.set_rtc_wakeup(ticks);
        debug!("timed shutdown: {} rtc ticks", ticks);
        self.enter_shutdown();
    }

    #[track_caller]
    pub fn timed_shutdown_ms(&mut self, ms: u32) {
        assert!(ms != 0, "timed shutdown needs a non-zero wakeup");
        debug!("timed shutdown: {} ms", ms);
        self.timed_shutdown(ms_to_ticks(ms));
    }

    /// Power down until the external wake pin is asserted. The RTC stops.
    pub fn deep_shutdown(&mut self) {
        self.shutdown_cleanup();
        debug!("deep shutdown");
        self.clear_rtc_wakeup();
        self.enter_shutdown();
    }

    pub fn set_cpu_deep_sleep(&mut self) {
        self.cpu.set_sleep_deep(true);
    }

    /// Make `WFI` idle the core instead of shutting the chip down.
    pub fn clear_cpu_deep_sleep(&mut self) {
        self.cpu.set_sleep_deep(false);
    }

    /// Execute `WFI`; whether this sleeps or shuts down depends on SLEEPDEEP.
    pub fn wait_for_interrupt(&mut self) {
        self.cpu.wait_for_interrupt();
    }

    // Status

    /// Whether this boot followed a VBAT power-on reset, i.e. SHRAM and PCSM
    /// contents are not to be trusted.
    pub fn is_vbat_por(&self) -> bool {
        self.vbat_por
    }

    pub fn is_extwake(&self) -> bool {
        self.status
            .read_masked(pac::status::STATUS7, pac::status::status7::EXT_WAKE)
            != 0
    }

    pub fn is_rtc_real_time(&self) -> bool {
        self.rtc.is_real_time()
    }

    pub fn is_deve(&self) -> bool {
        self.console.is_enabled()
    }

    pub fn status7(&self) -> Status7 {
        Status7::from_bits(self.status.read(pac::status::STATUS7))
    }

    pub fn power_off_roms(&mut self) {
        self.ctrl.write(pac::control::CTRL2, 0);
    }

    /// RTC forward body bias on, one wait state for SHRAM and data RAM.
    pub fn set_recommended_settings(&mut self) {
        debug!("applying recommended settings");
        self.spi.pcsm_write(
            pac::pcsm::RTC_CTRL1,
            field_set(RTC_CTRL1_RESET, pac::pcsm::rtc_ctrl1::EN_FBB, 1),
        );
        self.ctrl
            .write_masked(pac::control::CTRL4, pac::control::ctrl4::SHRAM_DELAY, 1);
        self.ctrl
            .write_masked(pac::control::CTRL4, pac::control::ctrl4::DATARAM_DELAY, 1);
    }

    /// Estimate the core clock in kHz by counting SysTick over 10 ms of RTC.
    ///
    /// Stops any running SysTick and drops its handler.
    pub fn estimate_tcro(&mut self) -> u32 {
        self.disable_systick();
        self.cpu.start_systick(TCRO_SYSTICK_RELOAD, false);
        let start = self.rtc.ticks();
        while self.rtc.ticks() < start + TCRO_WINDOW_TICKS {}
        let elapsed = TCRO_SYSTICK_RELOAD - self.cpu.systick_value();
        self.cpu.stop_systick();
        ((elapsed as u64 * 100) / 1000) as u32
    }

    /// Dump the chip state to the console.
    pub fn print_info(&mut self) {
        let status7 = self.status7();
        let cpuid = self.cpu.cpuid();
        let cfsr = self.cpu.fault_status().cfsr;
        let perf = self.perf().map(|p| p.level());
        let rtc = self.rtc.ticks();
        let rtc_us = (rtc as f32 * RTC_PERIOD_US) as u32;
        let ctrl2 = self.ctrl.read(pac::control::CTRL2);
        let vbat_por = self.vbat_por;

        let c = &mut self.console;
        c.info(format_args!("Sys status:"));
        c.info(format_args!("CPUID: {:#X}", cpuid));
        c.info(format_args!("DEVE?: {}", status7.deve as u8));
        match perf {
            Some(level) => c.info(format_args!("DVFS Level: {}, HW ID: {}", level, status7.perf_raw)),
            None => c.info(format_args!("DVFS Level: invalid, HW ID: {}", status7.perf_raw)),
        };
        c.debug(format_args!("Fault Status Register, CFSR: {:X}", cfsr));
        c.info(format_args!(
            "is RTC real-time?: {}, VBAT PoR?: {}",
            status7.real_time as u8, vbat_por as u8
        ));
        c.info(format_args!(
            "RTC Cycles: {:#X} ({} us, {} seconds)",
            rtc,
            rtc_us,
            rtc_us / 1_000_000
        ));
        c.info(format_args!("Memory Remap: {}", status7.memory_remap));
        c.info(format_args!("CTRL2 (rom power status): {:#X}", ctrl2));
        c.info(format_args!(
            "Battery Monitor: [under: {}, over: {}]",
            status7.batmon_under as u8, status7.batmon_over as u8
        ));
        c.info(format_args!("Status 7: {:#X}", status7.raw));
    }

    pub fn set_log_level(&mut self, level: LogLevel) {
        self.console.set_log_level(level);
    }

    // Interrupt sources

    pub fn enable_extwake_interrupt(&mut self, handler: Handler) {
        self.handlers.set(Source::ExtWake, handler);
        self.cpu.unmask(Interrupt::Interrupt6);
    }

    pub fn disable_extwake_interrupt(&mut self) {
        self.cpu.mask(Interrupt::Interrupt6);
        self.handlers.clear(Source::ExtWake);
    }

    /// Run `handler` every `ticks` core clock cycles.
    #[track_caller]
    pub fn enable_systick(&mut self, ticks: u32, handler: Handler) {
        assert!(ticks <= SYSTICK_MAX_RELOAD, "SysTick reload {} exceeds 24 bits", ticks);
        self.handlers.set(Source::SysTick, handler);
        self.cpu.start_systick(ticks, true);
    }

    pub fn disable_systick(&mut self) {
        self.cpu.stop_systick();
        self.handlers.clear(Source::SysTick);
    }

    /// Program the PCSM interrupt timer period. 0 stops the timer.
    #[track_caller]
    pub fn set_inttimer(&mut self, ticks: u64) {
        match ticks {
            0 => self.spi.pcsm_write(pac::pcsm::INTTIMER0, 0),
            1 => panic!("interrupt timer period must be 0 or at least 2 ticks"),
            _ => {
                assert!(
                    ticks - 1 <= PCSM_DATA_MAX as u64,
                    "interrupt timer period {} exceeds 24 bits",
                    ticks
                );
                self.spi.pcsm_write(pac::pcsm::INTTIMER0, (ticks - 1) as u32);
            }
        }
    }

    pub fn enable_pcsm_interrupt_timer_ms(&mut self, ms: u32, handler: Handler) {
        self.enable_pcsm_interrupt_timer_ticks(ms_to_ticks(ms), handler);
    }

    pub fn enable_pcsm_interrupt_timer_ticks(&mut self, ticks: u64, handler: Handler) {
        self.handlers.set(Source::PcsmTimer, handler);
        self.arm_pcsm_interrupt_timer(ticks);
    }

    /// Start the PCSM interrupt timer without touching its handler slot.
    pub(crate) fn arm_pcsm_interrupt_timer(&mut self, ticks: u64) {
        self.set_inttimer(ticks);
        self.cpu.unmask(Interrupt::Interrupt5);
    }

    pub fn disable_pcsm_interrupt_timer(&mut self) {
        self.cpu.mask(Interrupt::Interrupt5);
        self.set_inttimer(0);
        self.handlers.clear(Source::PcsmTimer);
    }

    // Autosampling

    pub fn enable_autosampling_ms(&mut self, ms: u32, handler: Handler) {
        self.enable_autosampling_ticks(ms_to_ticks(ms), handler);
    }

    /// Let the autosample engine read the sensor every `ticks` RTC ticks and
    /// call `handler` after each sample.
    ///
    /// The SPI bus belongs to the engine until autosampling is disabled.
    #[track_caller]
    pub fn enable_autosampling_ticks(&mut self, ticks: u64, handler: Handler) {
        assert!(ticks >= 2, "autosample period must be at least 2 ticks");
        self.handlers.set(Source::Autosample, handler);
        self.set_inttimer(ticks);
        self.cpu.unmask(Interrupt::Interrupt1);
        self.spi.enable_autosampling();
    }

    fn finish_autosample_disable(&mut self) {
        self.cpu.mask(Interrupt::Interrupt1);
        self.set_inttimer(0);
        self.handlers.clear(Source::Autosample);
        debug!("autosampling disabled");
    }

    /// Stop autosampling at the next sample boundary.
    ///
    /// The autosample interrupt turns the engine off on its next run, so no
    /// sample is cut short. Blocks until then: if the interrupt can no longer
    /// fire this never returns; see
    /// [`disable_autosampling_timeout`](Self::disable_autosampling_timeout).
    pub fn disable_autosampling_wait(&mut self) {
        let control = self.handlers.autosample();
        if control.request_disable() {
            debug!("disabling autosampling, waiting for next irq");
            while control.is_active() {}
        }
        self.finish_autosample_disable();
    }

    /// Like [`disable_autosampling_wait`](Self::disable_autosampling_wait),
    /// giving up after `ticks` RTC ticks.
    ///
    /// On timeout the request stays pending and the engine keeps the bus;
    /// [`disable_autosampling`](Self::disable_autosampling) can still force it
    /// off.
    pub fn disable_autosampling_timeout(&mut self, ticks: u64) -> Result<(), Error> {
        let control = self.handlers.autosample();
        if control.request_disable() {
            debug!("disabling autosampling, waiting up to {} ticks", ticks);
            blocking_wait_timeout(&self.rtc, || control.is_active(), ticks)
                .map_err(|_| Error::AutosampleDisableTimeout)?;
        }
        self.finish_autosample_disable();
        Ok(())
    }

    /// Stop autosampling now.
    ///
    /// A sample already in flight may be cut short; only call this between
    /// the last sample and the next use of the SPI bus.
    pub fn disable_autosampling(&mut self) {
        self.spi.disable_autosampling();
        self.finish_autosample_disable();
    }
}
