//! Host-driven test case execution.
//!
//! The host strobes CTRL5 over the debug transport to select a numbered
//! test routine, optionally with a repeat delay for power measurements:
//!
//! ```text
//! CTRL5  [31:16] repeat delay / 4096 (RTC ticks)  [15:8] test case  [0] strobe
//! ```

use crate::cpu::Cpu;
use crate::pac;
use crate::regs::{field_get, RegisterDriver};
use crate::rtc::ms_to_ticks;
use crate::system::System;

/// Runs per RTC check in the repeat loop.
const REPEAT_BATCH: usize = 10;
/// CTRL5 repeat delay unit, in RTC ticks.
const REPEAT_DELAY_SHIFT: u32 = 12;

/// A decoded host command.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HostCommand {
    pub testcase: u8,
    /// RTC ticks to loop the test case for before the reported run.
    pub repeat_delay_ticks: u64,
}

impl HostCommand {
    /// Decode CTRL5; `None` while the strobe is low.
    pub fn decode(ctrl5: u32) -> Option<Self> {
        use pac::control::ctrl5 as f;
        if field_get(ctrl5, f::STROBE) == 0 {
            return None;
        }
        Some(Self {
            testcase: field_get(ctrl5, f::TESTCASE_ID) as u8,
            repeat_delay_ticks: (field_get(ctrl5, f::RTC_REPEAT) as u64) << REPEAT_DELAY_SHIFT,
        })
    }
}

/// Registry of numbered test routines.
pub trait Testcase<D, C> {
    /// Run test case `id`. Returns whether it passed; unknown ids fail.
    fn run(&mut self, sys: &mut System<'_, D, C>, id: u8, verbose: bool) -> bool;
}

impl<D, C, F> Testcase<D, C> for F
where
    F: FnMut(&mut System<'_, D, C>, u8, bool) -> bool,
{
    fn run(&mut self, sys: &mut System<'_, D, C>, id: u8, verbose: bool) -> bool {
        self(sys, id, verbose)
    }
}

impl<'a, D, C> System<'a, D, C>
where
    D: RegisterDriver + Clone,
    C: Cpu,
{
    /// Run test case `id` once and report the verdict on the console.
    ///
    /// With a non-zero `repeat_delay` (RTC ticks) the test case first runs
    /// quietly in batches until the delay has elapsed, so that its power draw
    /// can be measured.
    pub fn run_testcase<T: Testcase<D, C>>(&mut self, tc: &mut T, id: u8, verbose: bool, repeat_delay: u64) -> bool {
        debug!("testcase {}, repeat delay {}", id, repeat_delay);
        self.console().print(format_args!("\n--- TCID: {} ---\n", id));
        if repeat_delay > 0 {
            let start = self.rtc().ticks();
            self.console()
                .print(format_args!("Repeat delay: {:#x}, RTC Start: {:#x}\n", repeat_delay, start));
            let mut passed = 0u32;
            let now = loop {
                for _ in 0..REPEAT_BATCH {
                    passed += tc.run(self, id, false) as u32;
                }
                let now = self.rtc().ticks();
                if now.wrapping_sub(start) > repeat_delay {
                    break now;
                }
            };
            self.console()
                .print(format_args!("Finished power loop, rtc_cur: {:#x}\n", now));
            self.console().print(format_args!("Passed runs: {}\n", passed));
        }

        let passed = tc.run(self, id, verbose);
        let verdict = if passed { "TCPASS" } else { "TCFAIL" };
        self.console().print(format_args!("\nTC STATUS:{}\n", verdict));
        passed
    }

    /// Serve host commands from CTRL5.
    ///
    /// With `timeout_ms` of zero this never returns. Otherwise it returns
    /// after `timeout_ms` unless a command arrived first, in which case it
    /// keeps serving forever.
    pub fn wait_for_adp<T: Testcase<D, C>>(&mut self, timeout_ms: u32, verbose: bool, tc: &mut T) {
        self.ctrl().write(pac::control::CTRL5, 0);
        let timeout = ms_to_ticks(timeout_ms);
        let start = self.rtc().ticks();
        let mut armed = timeout_ms > 0;
        self.console().print(format_args!("Waiting for ADP direction...\n"));

        loop {
            let ctrl5 = self.ctrl().read(pac::control::CTRL5);
            if let Some(cmd) = HostCommand::decode(ctrl5) {
                armed = false;
                self.console().print(format_args!(
                    "Strobe. TCID: {}, Repeat Delay: {:#x}\n",
                    cmd.testcase, cmd.repeat_delay_ticks
                ));
                self.run_testcase(tc, cmd.testcase, verbose, cmd.repeat_delay_ticks);
                self.ctrl().write(pac::control::CTRL5, 0);
                self.console().print(format_args!("Waiting for ADP direction...\n"));
            }
            if armed && self.rtc().ticks().wrapping_sub(start) >= timeout {
                self.console().print(format_args!("Exiting WFADP\n"));
                return;
            }
        }
    }
}
