use embedded_hal_1::spi::SpiBus;

use super::*;
use crate::interrupt::{AutosampleControl, AutosampleState};
use crate::testing::MockChip;

fn spi<'a>(chip: &'a MockChip, autosample: &'a AutosampleControl) -> Spi<'a, &'a MockChip> {
    Spi::new(RegisterWindow::new(pac::spi::WINDOW, chip), autosample)
}

#[test]
fn slave_select_sets_enable_mask() {
    let chip = MockChip::new();
    let control = AutosampleControl::new();
    let mut spi = spi(&chip, &control);

    spi.set_slave(SlaveSelect::Ss1);
    assert_eq!(spi.slave(), SlaveSelect::Ss1);
    assert_eq!(
        field_of(&chip, pac::spi::control::ENABLE_MASK),
        1,
        "selecting a slave enables the chip select mask"
    );

    spi.set_slave(SlaveSelect::Deselect);
    assert_eq!(spi.slave(), SlaveSelect::Deselect);
    assert_eq!(field_of(&chip, pac::spi::control::ENABLE_MASK), 0);
}

fn field_of(chip: &MockChip, mask: u32) -> u32 {
    crate::regs::field_get(chip.peek(pac::spi::CONTROL), mask)
}

#[test]
fn write_byte_returns_miso() {
    let chip = MockChip::new();
    let control = AutosampleControl::new();
    let mut spi = spi(&chip, &control);

    chip.set_miso(0xA5);
    assert_eq!(spi.write_byte_to(SlaveSelect::Ss0, 0x3C), 0xA5);
    assert_eq!(chip.spi_bytes(), [(1, 0x3C)]);
}

#[test]
fn pcsm_write_sends_frame_and_restores_bus() {
    let chip = MockChip::new();
    let control = AutosampleControl::new();
    let mut spi = spi(&chip, &control);

    spi.set_mode(Mode::Mode3);
    spi.set_slave(SlaveSelect::Ss1);

    spi.pcsm_write(pac::pcsm::PERF_CTRL, 0x00_0013);

    assert_eq!(chip.pcsm_writes(), [(pac::pcsm::PERF_CTRL, 0x13)]);
    assert_eq!(spi.mode(), Mode::Mode3);
    assert_eq!(spi.slave(), SlaveSelect::Ss1);
    // No PCSM byte leaked to the user's slave.
    assert!(chip.spi_bytes().is_empty());
}

#[test]
fn pcsm_write_msb_first() {
    let chip = MockChip::new();
    let control = AutosampleControl::new();
    let mut spi = spi(&chip, &control);

    spi.pcsm_write(pac::pcsm::RTC_WKUP0, 0x12_3456);
    assert_eq!(chip.pcsm(pac::pcsm::RTC_WKUP0), Some(0x12_3456));
    assert_eq!(spi.slave(), SlaveSelect::Deselect);
}

#[test]
#[should_panic]
fn pcsm_write_rejects_wide_data() {
    let chip = MockChip::new();
    let control = AutosampleControl::new();
    let mut spi = spi(&chip, &control);

    spi.pcsm_write(pac::pcsm::RTC_WKUP0, 0x0100_0000);
}

#[test]
fn autosampling_takes_the_bus() {
    let chip = MockChip::new();
    let control = AutosampleControl::new();
    let mut spi = spi(&chip, &control);

    spi.enable_autosampling();
    assert!(spi.is_autosampling());
    assert_eq!(control.state(), AutosampleState::Enabled);
    assert_eq!(spi.slave(), AUTOSAMPLE_SLAVE);
    assert_eq!(field_of(&chip, pac::spi::control::ENABLE_AUTO_SAMPLE), 1);

    spi.disable_autosampling();
    assert!(!spi.is_autosampling());
    assert_eq!(field_of(&chip, pac::spi::control::ENABLE_AUTO_SAMPLE), 0);

    spi.write_byte(0x00);
    assert_eq!(chip.autosample_collisions(), 0);
}

#[test]
fn enable_while_disable_pending_is_ignored() {
    let chip = MockChip::new();
    let control = AutosampleControl::new();
    let mut spi = spi(&chip, &control);

    spi.enable_autosampling();
    assert!(control.request_disable());
    // The autosample IRQ has already stopped the engine.
    write_autosample_enable(&RegisterWindow::new(pac::spi::WINDOW, &chip), false);

    spi.enable_autosampling();
    assert_eq!(control.state(), AutosampleState::DisableRequested);
    assert_eq!(field_of(&chip, pac::spi::control::ENABLE_AUTO_SAMPLE), 0);
}

#[test]
#[should_panic]
fn manual_transfer_refused_while_autosampling() {
    let chip = MockChip::new();
    let control = AutosampleControl::new();
    let mut spi = spi(&chip, &control);

    spi.enable_autosampling();
    spi.write_byte(0x00);
}

#[test]
#[should_panic]
fn pcsm_write_refused_while_disable_pending() {
    let chip = MockChip::new();
    let control = AutosampleControl::new();
    let mut spi = spi(&chip, &control);

    spi.enable_autosampling();
    assert!(control.request_disable());
    spi.pcsm_write(pac::pcsm::PERF_CTRL, 0x13);
}

#[test]
fn spi_bus_transfer_pads_short_side() {
    let chip = MockChip::new();
    let control = AutosampleControl::new();
    let mut spi = spi(&chip, &control);
    spi.set_slave(SlaveSelect::Ss0);
    chip.set_miso(0x77);

    let mut rx = [0u8; 3];
    spi.transfer(&mut rx, &[0x01]).unwrap();
    assert_eq!(rx, [0x77; 3]);
    assert_eq!(chip.spi_bytes(), [(1, 0x01), (1, 0x00), (1, 0x00)]);
}
