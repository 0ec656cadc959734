//! Host-side stand-ins for the chip, used by the unit tests.

#![allow(dead_code)]

extern crate std;

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::string::String;
use std::sync::Mutex;
use std::vec::Vec;

use crate::cpu::{Cpu, FaultStatus};
use crate::pac;
use crate::pac::Interrupt;
use crate::regs::{field_get, field_set, RegisterDriver};

/// VBAT power-on-reset value of STATUS7.ROM_WAKEUP_DELAY.
pub(crate) const POR_ROM_WAKEUP_DELAY: u32 = 32;

struct ChipState {
    mem: BTreeMap<u32, u32>,
    pcsm: BTreeMap<u8, u32>,
    pcsm_log: Vec<(u8, u32)>,
    pcsm_frame: Vec<u8>,
    spi_log: Vec<(u32, u8)>,
    autosample_collisions: u32,
    miso: u8,
    stdout: Vec<u8>,
    stdin: VecDeque<u8>,
    rtc: u64,
    rtc_step: u64,
}

/// In-memory register file of an M0N0 chip.
///
/// Models the parts of the hardware the drivers observe: the RTC counter,
/// the SPI controller with the PCSM behind slave select 3, the STDOUT/STDIN
/// FIFOs, STATUS7 side effects of PCSM writes, and plain memory for the rest
/// (SHRAM included). Register contents persist across [`crate::System`]
/// instances, like the VBAT domain does across a timed shutdown.
pub(crate) struct MockChip {
    state: Mutex<ChipState>,
}

impl MockChip {
    pub(crate) fn new() -> Self {
        let mut mem = BTreeMap::new();
        let mut status7 = 0;
        status7 = field_set(status7, pac::status::status7::DEVE_CORE, 1);
        status7 = field_set(status7, pac::status::status7::ROM_WAKEUP_DELAY, POR_ROM_WAKEUP_DELAY);
        status7 = field_set(status7, pac::status::status7::PERF, 19);
        mem.insert(pac::status::STATUS7, status7);

        Self {
            state: Mutex::new(ChipState {
                mem,
                pcsm: BTreeMap::new(),
                pcsm_log: Vec::new(),
                pcsm_frame: Vec::new(),
                spi_log: Vec::new(),
                autosample_collisions: 0,
                miso: 0,
                stdout: Vec::new(),
                stdin: VecDeque::new(),
                rtc: 0,
                rtc_step: 1,
            }),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut ChipState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub(crate) fn peek(&self, addr: u32) -> u32 {
        self.with(|s| s.mem.get(&addr).copied().unwrap_or(0))
    }

    pub(crate) fn poke(&self, addr: u32, value: u32) {
        self.with(|s| {
            s.mem.insert(addr, value);
        })
    }

    pub(crate) fn set_status7_field(&self, mask: u32, value: u32) {
        self.with(|s| {
            let v = s.mem.get(&pac::status::STATUS7).copied().unwrap_or(0);
            s.mem.insert(pac::status::STATUS7, field_set(v, mask, value));
        })
    }

    pub(crate) fn status7_field(&self, mask: u32) -> u32 {
        field_get(self.peek(pac::status::STATUS7), mask)
    }

    pub(crate) fn set_deve(&self, enabled: bool) {
        self.set_status7_field(pac::status::status7::DEVE_CORE, enabled as u32);
    }

    pub(crate) fn set_rtc(&self, ticks: u64) {
        self.with(|s| s.rtc = ticks)
    }

    pub(crate) fn rtc(&self) -> u64 {
        self.with(|s| s.rtc)
    }

    /// Ticks the RTC advances on every read of its low word.
    pub(crate) fn set_rtc_step(&self, step: u64) {
        self.with(|s| s.rtc_step = step)
    }

    pub(crate) fn pcsm(&self, addr: u8) -> Option<u32> {
        self.with(|s| s.pcsm.get(&addr).copied())
    }

    pub(crate) fn pcsm_writes(&self) -> Vec<(u8, u32)> {
        self.with(|s| s.pcsm_log.clone())
    }

    pub(crate) fn clear_pcsm_writes(&self) {
        self.with(|s| s.pcsm_log.clear())
    }

    /// Bytes shifted out to slaves other than the PCSM, with their chip select.
    pub(crate) fn spi_bytes(&self) -> Vec<(u32, u8)> {
        self.with(|s| s.spi_log.clone())
    }

    pub(crate) fn set_miso(&self, byte: u8) {
        self.with(|s| s.miso = byte)
    }

    /// Manual transfers started while the autosample engine owned the bus.
    pub(crate) fn autosample_collisions(&self) -> u32 {
        self.with(|s| s.autosample_collisions)
    }

    pub(crate) fn stdout(&self) -> String {
        self.with(|s| String::from_utf8_lossy(&s.stdout).into_owned())
    }

    pub(crate) fn clear_stdout(&self) {
        self.with(|s| s.stdout.clear())
    }

    pub(crate) fn push_stdin(&self, bytes: &[u8]) {
        self.with(|s| s.stdin.extend(bytes.iter().copied()))
    }
}

impl ChipState {
    fn spi_transfer(&mut self) {
        let control = self.mem.get(&pac::spi::CONTROL).copied().unwrap_or(0);
        let byte = self.mem.get(&pac::spi::DATA_WRITE).copied().unwrap_or(0) as u8;
        if field_get(control, pac::spi::control::ENABLE_AUTO_SAMPLE) != 0 {
            self.autosample_collisions += 1;
        }
        let slave = field_get(control, pac::spi::control::CHIP_SELECT);
        if slave == 8 {
            self.pcsm_frame.push(byte);
            if self.pcsm_frame.len() == 4 {
                let addr = self.pcsm_frame[0];
                let data = (self.pcsm_frame[1] as u32) << 16
                    | (self.pcsm_frame[2] as u32) << 8
                    | self.pcsm_frame[3] as u32;
                self.pcsm_frame.clear();
                self.pcsm_write(addr, data);
            }
        } else {
            self.spi_log.push((slave, byte));
        }
        self.mem.insert(pac::spi::DATA_READ, self.miso as u32);
    }

    fn pcsm_write(&mut self, addr: u8, data: u32) {
        self.pcsm.insert(addr, data);
        self.pcsm_log.push((addr, data));

        let status7 = self.mem.get(&pac::status::STATUS7).copied().unwrap_or(0);
        let status7 = match addr {
            pac::pcsm::CODE_CTRL => {
                let delay = field_get(data, pac::pcsm::code_ctrl::ROM_PWR_ON_DELAY);
                let remap = field_get(data, pac::pcsm::code_ctrl::MEMORY_REMAP);
                let v = field_set(status7, pac::status::status7::ROM_WAKEUP_DELAY, delay);
                field_set(v, pac::status::status7::MEMORY_REMAP, remap)
            }
            pac::pcsm::PERF_CTRL => field_set(
                status7,
                pac::status::status7::PERF,
                field_get(data, pac::pcsm::perf_ctrl::PERF),
            ),
            _ => status7,
        };
        self.mem.insert(pac::status::STATUS7, status7);
    }
}

impl RegisterDriver for MockChip {
    fn read(&self, addr: u32) -> u32 {
        self.with(|s| match addr {
            pac::status::STATUS2 => {
                let low = s.rtc as u32;
                s.rtc += s.rtc_step;
                low
            }
            pac::status::STATUS4 => ((s.rtc >> 32) & 0xFFF) as u32,
            pac::spi::STATUS => 0,
            pac::stdout::STATUS => 0,
            pac::stdin::STATUS => s.stdin.is_empty() as u32,
            pac::stdin::RDATA => s.stdin.pop_front().unwrap_or(0) as u32,
            _ => s.mem.get(&addr).copied().unwrap_or(0),
        })
    }

    fn write(&self, addr: u32, value: u32) {
        self.with(|s| match addr {
            pac::spi::COMMAND if value & 0x3 == 1 => s.spi_transfer(),
            pac::spi::CONTROL => {
                if field_get(value, pac::spi::control::CHIP_SELECT) != 8 {
                    s.pcsm_frame.clear();
                }
                s.mem.insert(addr, value);
            }
            pac::stdout::WDATA => s.stdout.push(value as u8),
            _ => {
                s.mem.insert(addr, value);
            }
        })
    }
}

/// Core model that records what the drivers asked of it.
#[derive(Default)]
pub(crate) struct MockCpu {
    pub(crate) sleep_deep: bool,
    pub(crate) wfi_count: u32,
    /// `WFI`s issued with SLEEPDEEP set, i.e. shutdowns.
    pub(crate) deep_wfi_count: u32,
    pub(crate) unmasked: BTreeSet<u16>,
    pub(crate) systick: Option<(u32, bool)>,
    /// SysTick counts elapsed since the last start, reported by `systick_value`.
    pub(crate) systick_elapsed: u32,
}

impl MockCpu {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_unmasked(&self, irq: Interrupt) -> bool {
        self.unmasked.contains(&(irq as u16))
    }
}

impl Cpu for MockCpu {
    fn wait_for_interrupt(&mut self) {
        self.wfi_count += 1;
        if self.sleep_deep {
            self.deep_wfi_count += 1;
        }
    }

    fn set_sleep_deep(&mut self, enable: bool) {
        self.sleep_deep = enable;
    }

    fn is_sleep_deep(&self) -> bool {
        self.sleep_deep
    }

    fn unmask(&mut self, irq: Interrupt) {
        self.unmasked.insert(irq as u16);
    }

    fn mask(&mut self, irq: Interrupt) {
        self.unmasked.remove(&(irq as u16));
    }

    fn start_systick(&mut self, reload: u32, interrupt: bool) {
        self.systick = Some((reload, interrupt));
    }

    fn stop_systick(&mut self) {
        self.systick = None;
    }

    fn systick_value(&self) -> u32 {
        match self.systick {
            Some((reload, _)) => reload.saturating_sub(self.systick_elapsed),
            None => 0,
        }
    }

    fn cpuid(&self) -> u32 {
        0x410F_D210
    }

    fn fault_status(&self) -> FaultStatus {
        FaultStatus::default()
    }
}
