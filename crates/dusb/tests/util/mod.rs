#![allow(dead_code)]

use dusb::{DusbConfig, SetupPacket, UsbDirection, UsbHandshake, UsbSpeed, VirtualBus};

pub const WAKEUP_INTERVAL_MS: u64 = 100;
pub const IN_INTERVAL_MS: u64 = 10;

pub fn test_config() -> DusbConfig {
    DusbConfig {
        wakeup_interval_ms: WAKEUP_INTERVAL_MS,
        in_interval_ms: IN_INTERVAL_MS,
    }
}

/// Bus with a freshly realized and attached device.
pub fn attached_bus(speed: UsbSpeed) -> VirtualBus {
    let mut bus = VirtualBus::new(speed);
    bus.attach(test_config())
        .unwrap_or_else(|err| panic!("attach failed: {err}"));
    bus
}

pub fn setup(
    bm_request_type: u8,
    b_request: u8,
    w_value: u16,
    w_index: u16,
    w_length: u16,
) -> SetupPacket {
    SetupPacket {
        bm_request_type,
        b_request,
        w_value,
        w_index,
        w_length,
    }
}

pub fn control_no_data(bus: &mut VirtualBus, setup: SetupPacket) -> UsbHandshake {
    bus.control(setup, &mut [])
}

pub fn control_in(bus: &mut VirtualBus, setup: SetupPacket) -> Option<Vec<u8>> {
    let mut buf = vec![0u8; setup.w_length as usize];
    match bus.control(setup, &mut buf) {
        UsbHandshake::Ack { bytes } => {
            buf.truncate(bytes);
            Some(buf)
        }
        UsbHandshake::Nak | UsbHandshake::Stall => None,
    }
}

pub fn set_interface(bus: &mut VirtualBus, alt: u16) -> UsbHandshake {
    control_no_data(bus, setup(0x01, 0x0b, alt, 0, 0))
}

pub fn set_endpoint_halt(bus: &mut VirtualBus, endpoint: u8, halted: bool) -> UsbHandshake {
    let request = if halted { 0x03 } else { 0x01 };
    control_no_data(bus, setup(0x02, request, 0, u16::from(endpoint), 0))
}

pub fn endpoint_status(bus: &mut VirtualBus, endpoint: u8) -> Option<u16> {
    let data = control_in(bus, setup(0x82, 0x00, 0, u16::from(endpoint), 2))?;
    Some(u16::from_le_bytes([data[0], data[1]]))
}

pub fn read_in(bus: &mut VirtualBus, endpoint: u8, len: usize) -> (UsbHandshake, Vec<u8>) {
    let mut buf = vec![0u8; len];
    let result = bus.data(endpoint, UsbDirection::In, &mut buf);
    buf.truncate(result.actual_length());
    (result, buf)
}

pub fn write_out(bus: &mut VirtualBus, endpoint: u8, data: &[u8]) -> UsbHandshake {
    let mut buf = data.to_vec();
    bus.data(endpoint, UsbDirection::Out, &mut buf)
}

/// Staged byte count for `endpoint`.
pub fn staged_len(bus: &VirtualBus, endpoint: u8) -> usize {
    bus.device()
        .and_then(|dev| dev.state().in_staging(endpoint))
        .map(|buf| buf.valid_len())
        .unwrap_or(0)
}
