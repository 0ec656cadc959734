use super::*;
use crate::testing::MockChip;

fn rtc(chip: &MockChip) -> Rtc<&MockChip> {
    Rtc::new(RegisterWindow::new(pac::status::WINDOW, chip))
}

#[test]
fn ticks_joins_both_halves() {
    let chip = MockChip::new();
    chip.set_rtc_step(0);
    chip.set_rtc(0x0ABC_1234_5678);
    assert_eq!(rtc(&chip).ticks(), 0x0ABC_1234_5678);
}

#[test]
fn ticks_retries_across_low_word_wrap() {
    let chip = MockChip::new();
    chip.set_rtc(0x4_FFFF_FFFF);
    // First pass sees low 0xFFFF_FFFF, high 5 and low 0: inconsistent.
    assert_eq!(rtc(&chip).ticks(), 0x5_0000_0000);
}

#[test]
fn ticks_without_wrap_keeps_first_low_word() {
    let chip = MockChip::new();
    chip.set_rtc(0x2_FFFF_FFFD);
    assert_eq!(rtc(&chip).ticks(), 0x2_FFFF_FFFD);
}

#[test]
fn conversions() {
    assert_eq!(ticks_to_micros(0), 0);
    assert_eq!(ticks_to_micros(1), 30);
    assert_eq!(ticks_to_micros(33), 1_000);
    assert_eq!(ticks_to_micros(RTC_FREQUENCY_HZ as u64), 1_000_000);
    assert_eq!(ticks_to_micros(RTC_MAX_WAKEUP_TICKS), 8_529_544_748_807_727);
    assert_eq!(ms_to_ticks(10), 330);
    assert_eq!(ms_to_ticks(u32::MAX), u32::MAX as u64 * 33);
}

#[test]
fn huge_tick_counts_saturate() {
    assert_eq!(ticks_to_micros(u64::MAX), u64::MAX);
    assert_eq!(ticks_to_micros(u64::MAX / 2), u64::MAX);
    // Just below the saturation point the result is still exact.
    assert_eq!(ticks_to_micros(u64::MAX / 1_000 * 33), 18_446_744_073_709_551_000);
}

#[test]
fn real_time_flag() {
    let chip = MockChip::new();
    assert!(!rtc(&chip).is_real_time());
    chip.set_status7_field(pac::status::status7::REAL_TIME_FLAG, 1);
    assert!(rtc(&chip).is_real_time());
}

#[test]
fn check_interval_false_until_interval_elapsed() {
    let chip = MockChip::new();
    chip.set_rtc_step(0);
    chip.set_rtc(1_000);
    let rtc = rtc(&chip);

    let mut timer = RtcTimer::new(10);
    timer.reset(&rtc);
    assert!(!timer.check_interval(&rtc));

    chip.set_rtc(1_009);
    assert!(!timer.check_interval(&rtc));
    assert_eq!(timer.elapsed_ticks(&rtc), 9);

    chip.set_rtc(1_010);
    assert!(timer.check_interval(&rtc));
}

#[test]
fn check_interval_after_reset_for_any_interval() {
    let chip = MockChip::new();
    chip.set_rtc_step(0);
    chip.set_rtc(77);
    let rtc = rtc(&chip);

    for interval in [1, 2, 33, 1 << 40] {
        let mut timer = RtcTimer::new(interval);
        timer.reset(&rtc);
        assert!(!timer.check_interval(&rtc), "interval {}", interval);
    }
}

#[test]
fn wait_measures_from_the_call() {
    let chip = MockChip::new();
    chip.set_rtc(500);
    let rtc = rtc(&chip);

    let mut timer = RtcTimer::new(0);
    timer.set_interval_ms(1);
    assert_eq!(timer.interval(), 33);

    let before = chip.rtc();
    timer.wait(&rtc);
    assert!(chip.rtc() - before >= 33);
    assert!(timer.check_interval(&rtc));
}

#[test]
fn sleep_ticks_busy_waits() {
    let chip = MockChip::new();
    chip.set_rtc_step(3);
    let rtc = rtc(&chip);

    rtc.sleep_ms(2);
    assert!(chip.rtc() >= 66);
}
