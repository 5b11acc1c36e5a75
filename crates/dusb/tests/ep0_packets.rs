use dusb::{DeviceTimer, DusbDevice, SetupPacket, TimerEvent, UsbHandshake, UsbSpeed, VirtualHost};

mod util;

use util::{setup, test_config, IN_INTERVAL_MS};

fn realize(speed: UsbSpeed) -> (VirtualHost, DusbDevice) {
    let mut host = VirtualHost::new(speed);
    let dev = DusbDevice::realize(&mut host, speed, test_config()).unwrap();
    (host, dev)
}

fn control_no_data(dev: &mut DusbDevice, host: &mut VirtualHost, setup: SetupPacket) {
    dev.handle_setup(host, setup);
    let mut buf = [0u8; 0];
    assert_eq!(dev.handle_in(0, &mut buf), UsbHandshake::Ack { bytes: 0 });
}

fn control_in(
    dev: &mut DusbDevice,
    host: &mut VirtualHost,
    setup: SetupPacket,
    max_packet: usize,
) -> Vec<u8> {
    dev.handle_setup(host, setup);

    let mut out = Vec::new();
    let mut buf = vec![0u8; max_packet];
    loop {
        match dev.handle_in(0, &mut buf) {
            UsbHandshake::Ack { bytes } => {
                out.extend_from_slice(&buf[..bytes]);
                if bytes < max_packet {
                    break;
                }
            }
            other => panic!("unexpected handshake during data stage: {other:?}"),
        }
    }

    assert_eq!(dev.handle_out(host, 0, &[]), UsbHandshake::Ack { bytes: 0 });
    out
}

#[test]
fn device_descriptor_is_read_in_max_packet_chunks() {
    let (mut host, mut dev) = realize(UsbSpeed::Full);
    let desc = control_in(&mut dev, &mut host, setup(0x80, 0x06, 0x0100, 0, 18), 8);
    assert_eq!(desc.len(), 18);
    assert_eq!(desc[0], 18);
    assert_eq!(desc[1], 0x01);
}

#[test]
fn set_address_completes_in_the_status_stage() {
    let (mut host, mut dev) = realize(UsbSpeed::High);
    control_no_data(&mut dev, &mut host, setup(0x00, 0x05, 7, 0, 0));
    assert_eq!(dev.state().address, 7);

    // Addresses above 127 are rejected.
    dev.handle_setup(&mut host, setup(0x00, 0x05, 200, 0, 0));
    assert_eq!(dev.handle_in(0, &mut []), UsbHandshake::Stall);
    assert_eq!(dev.state().address, 7);
}

#[test]
fn set_address_takes_effect_after_the_status_stage() {
    let (mut host, mut dev) = realize(UsbSpeed::High);
    dev.handle_setup(&mut host, setup(0x00, 0x05, 9, 0, 0));
    assert_eq!(dev.state().address, 0);

    assert_eq!(dev.handle_in(0, &mut []), UsbHandshake::Ack { bytes: 0 });
    assert_eq!(dev.state().address, 9);
}

#[test]
fn new_setup_abandons_pending_set_address() {
    let (mut host, mut dev) = realize(UsbSpeed::High);
    dev.handle_setup(&mut host, setup(0x00, 0x05, 9, 0, 0));

    // The status stage never completes; the host starts a new transfer instead.
    let status = control_in(&mut dev, &mut host, setup(0x80, 0x00, 0, 0, 2), 64);
    assert_eq!(status, vec![0, 0]);
    assert_eq!(dev.state().address, 0);

    // Nothing left to commit once the pipe is idle.
    assert_eq!(dev.handle_in(0, &mut []), UsbHandshake::Nak);
    assert_eq!(dev.state().address, 0);
}

#[test]
fn new_setup_abandons_pending_set_configuration() {
    let (mut host, mut dev) = realize(UsbSpeed::High);
    dev.handle_setup(&mut host, setup(0x00, 0x09, 1, 0, 0));
    assert_eq!(dev.state().configuration, 0);

    let config = control_in(&mut dev, &mut host, setup(0x80, 0x08, 0, 0, 1), 64);
    assert_eq!(config, vec![0]);
    assert_eq!(dev.state().configuration, 0);

    control_no_data(&mut dev, &mut host, setup(0x00, 0x09, 1, 0, 0));
    assert_eq!(dev.state().configuration, 1);
}

#[test]
fn reset_drops_pending_set_address() {
    let (mut host, mut dev) = realize(UsbSpeed::High);
    dev.handle_setup(&mut host, setup(0x00, 0x05, 9, 0, 0));
    dev.handle_reset(&mut host);

    assert_eq!(dev.handle_in(0, &mut []), UsbHandshake::Nak);
    assert_eq!(dev.state().address, 0);
}

#[test]
fn set_sel_consumes_its_data_stage() {
    let (mut host, mut dev) = realize(UsbSpeed::Super);
    dev.handle_setup(&mut host, SetupPacket::from_request_code(0x0030, 0, 0, 6));

    // Nothing to read before the data stage arrives.
    assert_eq!(dev.handle_in(0, &mut [0u8; 8]), UsbHandshake::Nak);
    assert_eq!(
        dev.handle_out(&mut host, 0, &[0x0a, 0x00, 0xff, 0x07]),
        UsbHandshake::Ack { bytes: 4 }
    );
    assert_eq!(
        dev.handle_out(&mut host, 0, &[0x00, 0x00]),
        UsbHandshake::Ack { bytes: 2 }
    );
    assert_eq!(dev.handle_in(0, &mut []), UsbHandshake::Ack { bytes: 0 });
}

#[test]
fn set_sel_with_wrong_length_stalls() {
    let (mut host, mut dev) = realize(UsbSpeed::Super);
    dev.handle_setup(&mut host, SetupPacket::from_request_code(0x0030, 0, 0, 4));
    assert_eq!(dev.handle_out(&mut host, 0, &[0; 4]), UsbHandshake::Stall);
    assert_eq!(dev.handle_in(0, &mut []), UsbHandshake::Stall);
}

#[test]
fn unsupported_request_stalls_the_data_stage() {
    let (mut host, mut dev) = realize(UsbSpeed::High);
    // Vendor-specific IN request.
    dev.handle_setup(&mut host, setup(0xc0, 0x01, 0, 0, 4));
    assert_eq!(dev.handle_in(0, &mut [0u8; 4]), UsbHandshake::Stall);

    // A fresh SETUP clears the stall.
    let status = control_in(&mut dev, &mut host, setup(0x80, 0x00, 0, 0, 2), 64);
    assert_eq!(status, vec![0, 0]);
}

#[test]
fn non_control_endpoints_route_to_the_data_engine() {
    let (mut host, mut dev) = realize(UsbSpeed::High);
    assert_eq!(
        dev.handle_out(&mut host, 3, &[1, 2, 3]),
        UsbHandshake::Ack { bytes: 3 }
    );
    assert_eq!(dev.handle_in(3, &mut [0u8; 64]), UsbHandshake::Stall);

    control_no_data(&mut dev, &mut host, setup(0x01, 0x0b, 1, 0, 0));
    assert!(dev.producer().is_armed());
    assert_eq!(dev.handle_in(1, &mut [0u8; 64]), UsbHandshake::Nak);

    let event = TimerEvent {
        id: dev.producer().armed_timer().unwrap(),
        deadline_ms: IN_INTERVAL_MS,
        payload: DeviceTimer::InData,
    };
    dev.handle_timer(&mut host, &event);
    assert_eq!(dev.handle_in(1, &mut [0u8; 64]), UsbHandshake::Ack { bytes: 64 });
    assert_eq!(dev.handle_out(&mut host, 1, &[0]), UsbHandshake::Stall);
}
