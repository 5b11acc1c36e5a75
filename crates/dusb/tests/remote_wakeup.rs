use dusb::{UsbHandshake, UsbSpeed};

mod util;

use util::{attached_bus, control_in, control_no_data, setup, WAKEUP_INTERVAL_MS};

const DEVICE_REMOTE_WAKEUP: u16 = 0x0001;

fn device_status(bus: &mut dusb::VirtualBus) -> u16 {
    let data = control_in(bus, setup(0x80, 0x00, 0, 0, 2)).unwrap();
    u16::from_le_bytes([data[0], data[1]])
}

fn enable_remote_wakeup(bus: &mut dusb::VirtualBus) {
    assert!(control_no_data(bus, setup(0x00, 0x03, DEVICE_REMOTE_WAKEUP, 0, 0)).is_ack());
}

#[test]
fn get_status_reflects_remote_wakeup_feature() {
    let mut bus = attached_bus(UsbSpeed::High);
    assert_eq!(device_status(&mut bus), 0);

    enable_remote_wakeup(&mut bus);
    assert_eq!(device_status(&mut bus), 1 << 1);

    assert!(control_no_data(&mut bus, setup(0x00, 0x01, DEVICE_REMOTE_WAKEUP, 0, 0)).is_ack());
    assert_eq!(device_status(&mut bus), 0);
}

#[test]
fn no_wakeup_is_signalled_unless_enabled() {
    let mut bus = attached_bus(UsbSpeed::High);
    bus.advance_ms(5 * WAKEUP_INTERVAL_MS);
    assert!(bus.host().wakeups().is_empty());
    // The timer keeps running so enabling the feature later takes effect.
    assert!(bus.device().unwrap().wakeup_scheduler().armed_timer().is_some());
}

#[test]
fn wakeup_is_signalled_every_interval_while_enabled() {
    let mut bus = attached_bus(UsbSpeed::High);
    enable_remote_wakeup(&mut bus);

    bus.advance_ms(3 * WAKEUP_INTERVAL_MS);
    let wakeups = bus.host().wakeups();
    assert_eq!(wakeups.len(), 3);
    for (i, signal) in wakeups.iter().enumerate() {
        assert_eq!(signal.at_ms, (i as u64 + 1) * WAKEUP_INTERVAL_MS);
        assert_eq!(signal.endpoint.raw(), 0x81);
    }
}

#[test]
fn detached_device_does_not_signal_but_keeps_its_timer() {
    let mut bus = attached_bus(UsbSpeed::High);
    enable_remote_wakeup(&mut bus);

    bus.detach();
    bus.advance_ms(2 * WAKEUP_INTERVAL_MS);
    assert!(bus.host().wakeups().is_empty());
    assert_eq!(bus.host().pending_timers(), 1);

    bus.reconnect();
    bus.advance_ms(WAKEUP_INTERVAL_MS);
    assert_eq!(bus.host().wakeups().len(), 1);
}

#[test]
fn detached_device_rejects_transfers() {
    let mut bus = attached_bus(UsbSpeed::High);
    bus.detach();
    assert_eq!(
        control_no_data(&mut bus, setup(0x00, 0x05, 3, 0, 0)),
        UsbHandshake::Stall
    );
    assert_eq!(bus.device().unwrap().state().address, 0);
}

#[test]
fn disabling_remote_wakeup_stops_signals() {
    let mut bus = attached_bus(UsbSpeed::Super);
    enable_remote_wakeup(&mut bus);
    bus.advance_ms(WAKEUP_INTERVAL_MS);
    assert_eq!(bus.host_mut().take_wakeups().len(), 1);

    assert!(control_no_data(&mut bus, setup(0x00, 0x01, DEVICE_REMOTE_WAKEUP, 0, 0)).is_ack());
    bus.advance_ms(4 * WAKEUP_INTERVAL_MS);
    assert!(bus.host().wakeups().is_empty());
}

#[test]
fn unknown_device_feature_stalls() {
    let mut bus = attached_bus(UsbSpeed::High);
    // TEST_MODE is not supported.
    assert_eq!(
        control_no_data(&mut bus, setup(0x00, 0x03, 0x0002, 0, 0)),
        UsbHandshake::Stall
    );
    assert_eq!(device_status(&mut bus), 0);
}
