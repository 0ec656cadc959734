use crate::regs::RegisterDriver;
use crate::rtc::Rtc;

/// Blocks until a condition becomes false, or fails once `timeout` RTC ticks
/// have passed.
#[inline]
pub fn blocking_wait_timeout<D, F>(rtc: &Rtc<D>, mut condition: F, timeout: u64) -> Result<(), ()>
where
    D: RegisterDriver,
    F: FnMut() -> bool,
{
    let start = rtc.ticks();

    while condition() {
        if rtc.ticks().wrapping_sub(start) >= timeout {
            return Err(());
        }
    }

    Ok(())
}
