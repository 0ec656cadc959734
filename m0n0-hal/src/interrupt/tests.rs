use portable_atomic::{AtomicU32, Ordering};

use super::*;
use crate::pac;
use crate::regs::{field_get, RegisterWindow};
use crate::testing::MockChip;

#[test]
fn dispatch_runs_registered_handler() {
    static HITS: AtomicU32 = AtomicU32::new(0);
    fn on_timer() {
        HITS.fetch_add(1, Ordering::Relaxed);
    }

    let handlers = Handlers::new();
    handlers.dispatch(Source::PcsmTimer);
    assert_eq!(HITS.load(Ordering::Relaxed), 0);
    assert_eq!(handlers.count(Source::PcsmTimer), 1);

    handlers.set(Source::PcsmTimer, on_timer);
    handlers.dispatch(Source::PcsmTimer);
    handlers.dispatch(Source::PcsmTimer);
    assert_eq!(HITS.load(Ordering::Relaxed), 2);
    assert_eq!(handlers.count(Source::PcsmTimer), 3);
    assert_eq!(handlers.count(Source::ExtWake), 0);
}

#[test]
fn registering_replaces_previous_handler() {
    static FIRST: AtomicU32 = AtomicU32::new(0);
    static SECOND: AtomicU32 = AtomicU32::new(0);
    fn first() {
        FIRST.fetch_add(1, Ordering::Relaxed);
    }
    fn second() {
        SECOND.fetch_add(1, Ordering::Relaxed);
    }

    let handlers = Handlers::new();
    handlers.set(Source::ExtWake, first);
    handlers.set(Source::ExtWake, second);
    handlers.dispatch(Source::ExtWake);
    assert_eq!(FIRST.load(Ordering::Relaxed), 0);
    assert_eq!(SECOND.load(Ordering::Relaxed), 1);

    handlers.clear(Source::ExtWake);
    assert!(handlers.handler(Source::ExtWake).is_none());
}

#[test]
fn source_lines() {
    assert_eq!(Source::ExtWake.interrupt(), Some(pac::Interrupt::Interrupt6));
    assert_eq!(Source::PcsmTimer.interrupt(), Some(pac::Interrupt::Interrupt5));
    assert_eq!(Source::Autosample.interrupt(), Some(pac::Interrupt::Interrupt1));
    assert_eq!(Source::SysTick.interrupt(), None);
}

#[test]
fn autosample_request_only_from_enabled() {
    let control = AutosampleControl::new();
    assert!(!control.request_disable());
    assert_eq!(control.state(), AutosampleState::Disabled);

    control.mark_enabled();
    assert!(control.request_disable());
    assert_eq!(control.state(), AutosampleState::DisableRequested);
    assert!(control.is_active());
    // A second request while one is pending is still pending.
    assert!(control.request_disable());
}

#[test]
fn autosample_irq_serves_disable_request() {
    static SAMPLES: AtomicU32 = AtomicU32::new(0);
    fn on_sample() {
        SAMPLES.fetch_add(1, Ordering::Relaxed);
    }

    let chip = MockChip::new();
    let spi = RegisterWindow::new(pac::spi::WINDOW, &chip);
    let handlers = Handlers::new();
    handlers.set(Source::Autosample, on_sample);

    crate::spi::write_autosample_enable(&spi, true);
    handlers.autosample().mark_enabled();

    handlers.dispatch_autosample(&spi);
    assert_eq!(SAMPLES.load(Ordering::Relaxed), 1);

    assert!(handlers.autosample().request_disable());
    handlers.dispatch_autosample(&spi);

    // The request is consumed in place of the callback.
    assert_eq!(SAMPLES.load(Ordering::Relaxed), 1);
    assert_eq!(handlers.count(Source::Autosample), 2);
    assert_eq!(handlers.autosample().state(), AutosampleState::Disabled);
    assert_eq!(
        field_get(chip.peek(pac::spi::CONTROL), pac::spi::control::ENABLE_AUTO_SAMPLE),
        0
    );
}

#[test]
fn gpio_is_counted_only() {
    let handlers = Handlers::new();
    handlers.record_gpio();
    handlers.record_gpio();
    assert_eq!(handlers.gpio_count(), 2);
}
