use super::*;
use crate::pac;
use crate::testing::MockChip;

const WINDOW: RegisterWindowConfig = RegisterWindowConfig {
    base: 0x4000_0000,
    size: 0x10,
    addressing: Addressing::Absolute,
    access: Access::ReadWrite,
};

#[test]
fn mask_shift_counts_trailing_zeros() {
    assert_eq!(mask_shift(0x0000_0001), 0);
    assert_eq!(mask_shift(0x0000_01F0), 4);
    assert_eq!(mask_shift(0x01F8_0000), 19);
    assert_eq!(mask_shift(0x8000_0000), 31);
    assert_eq!(mask_shift(0), 0);
}

#[test]
fn field_helpers_shift_and_clip() {
    assert_eq!(field_get(0x0000_0150, 0x0000_01F0), 0x15);
    assert_eq!(field_set(0xFFFF_FFFF, 0x0000_00F0, 0x1), 0xFFFF_FF1F);
    // Bits beyond the mask width are dropped.
    assert_eq!(field_set(0, 0x0000_000F, 0x31), 0x1);
}

#[test]
fn absolute_window_accepts_inclusive_range() {
    let chip = MockChip::new();
    let regs = RegisterWindow::new(WINDOW, &chip);

    regs.write(0x4000_0000, 1);
    regs.write(0x4000_0010, 2);
    assert_eq!(regs.read(0x4000_0000), 1);
    assert_eq!(regs.read(0x4000_0010), 2);

    assert_eq!(regs.try_read(0x4000_0014), Err(Error::OutOfRange { addr: 0x4000_0014 }));
    assert_eq!(regs.try_read(0x3FFF_FFFC), Err(Error::OutOfRange { addr: 0x3FFF_FFFC }));
    assert_eq!(regs.try_write(0x4000_0020, 0), Err(Error::OutOfRange { addr: 0x4000_0020 }));
}

#[test]
fn relative_window_adds_base() {
    let chip = MockChip::new();
    let shram = RegisterWindow::new(pac::shram::WINDOW, &chip);

    shram.write(0x8, 0xDEAD_BEEF);
    assert_eq!(chip.peek(0x3000_0008), 0xDEAD_BEEF);
    assert_eq!(shram.read(0x8), 0xDEAD_BEEF);
    assert_eq!(shram.try_read(0x1004), Err(Error::OutOfRange { addr: 0x1004 }));
}

#[test]
fn access_direction_is_enforced() {
    let chip = MockChip::new();
    let status = RegisterWindow::new(pac::status::WINDOW, &chip);
    assert_eq!(
        status.try_write(pac::status::STATUS7, 0),
        Err(Error::NotWritable { addr: pac::status::STATUS7 })
    );

    let write_only = RegisterWindow::new(
        RegisterWindowConfig { access: Access::WriteOnly, ..WINDOW },
        &chip,
    );
    assert_eq!(write_only.try_write(0x4000_0004, 7), Ok(()));
    assert_eq!(write_only.try_read(0x4000_0004), Err(Error::NotReadable { addr: 0x4000_0004 }));
    // A masked write needs the read half too.
    assert_eq!(
        write_only.try_write_masked(0x4000_0004, 0xF0, 1),
        Err(Error::NotReadable { addr: 0x4000_0004 })
    );
}

#[test]
fn masked_write_preserves_other_bits() {
    let chip = MockChip::new();
    let regs = RegisterWindow::new(WINDOW, &chip);

    regs.write(0x4000_0008, 0xABCD_1234);
    regs.write_masked(0x4000_0008, 0x0000_0F00, 0x7);
    assert_eq!(regs.read(0x4000_0008), 0xABCD_1734);
    assert_eq!(regs.read_masked(0x4000_0008, 0xFFFF_0000), 0xABCD);
}

#[test]
#[should_panic]
fn infallible_read_out_of_range_is_fatal() {
    let chip = MockChip::new();
    let regs = RegisterWindow::new(WINDOW, &chip);
    regs.read(0x5000_0000);
}
