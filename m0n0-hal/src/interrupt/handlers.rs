//! Vector table entries.
//!
//! Chip interrupts are bound by symbol name to the `__INTERRUPTS` table
//! generated in `pac`; core exceptions go through `cortex-m-rt`.

use cortex_m_rt::{exception, ExceptionFrame};

use super::{Source, HANDLERS};
use crate::console::{Console, LogLevel};
use crate::cpu::read_fault_status;
use crate::pac;
use crate::regs::{Mmio, RegisterWindow};

#[allow(non_snake_case)]
#[no_mangle]
unsafe extern "C" fn Interrupt0() {
    HANDLERS.record_gpio();
}

#[allow(non_snake_case)]
#[no_mangle]
unsafe extern "C" fn Interrupt1() {
    HANDLERS.dispatch_autosample(&RegisterWindow::new(pac::spi::WINDOW, Mmio));
}

#[allow(non_snake_case)]
#[no_mangle]
unsafe extern "C" fn Interrupt5() {
    HANDLERS.dispatch(Source::PcsmTimer);
}

#[allow(non_snake_case)]
#[no_mangle]
unsafe extern "C" fn Interrupt6() {
    HANDLERS.dispatch(Source::ExtWake);
}

#[exception]
fn SysTick() {
    HANDLERS.dispatch(Source::SysTick);
}

/// Dump the fault registers to STDOUT when a debug environment is attached.
fn report(name: &str, frame: Option<&ExceptionFrame>) {
    let mut console = Console::new(Mmio, LogLevel::Debug);
    if !console.is_enabled() {
        return;
    }
    let fault = read_fault_status();
    console.print(format_args!("{}()\n", name));
    console.print(format_args!(
        "CFSR: {:#010X}  HFSR: {:#010X}  MMFAR: {:#010X}  BFAR: {:#010X}\n",
        fault.cfsr, fault.hfsr, fault.mmfar, fault.bfar
    ));
    if let Some(frame) = frame {
        console.print(format_args!(
            "PC: {:#010X}  LR: {:#010X}  xPSR: {:#010X}\n",
            frame.pc(),
            frame.lr(),
            frame.xpsr()
        ));
    }
}

#[exception]
unsafe fn HardFault(frame: &ExceptionFrame) -> ! {
    report("HardFault", Some(frame));
    loop {}
}

#[exception]
fn MemoryManagement() -> ! {
    report("MemManage", None);
    loop {}
}

#[exception]
fn BusFault() -> ! {
    report("BusFault", None);
    loop {}
}

#[exception]
fn UsageFault() -> ! {
    report("UsageFault", None);
    loop {}
}

#[exception]
unsafe fn DefaultHandler(irqn: i16) -> ! {
    let mut console = Console::new(Mmio, LogLevel::Debug);
    if console.is_enabled() {
        console.print(format_args!("unhandled exception {}\n", irqn));
    }
    loop {}
}
