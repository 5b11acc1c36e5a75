//! Data engine for the functional (non-control) endpoints.

use core::fmt::Write as _;

use tracing::{trace, Level};

use crate::descriptor::{
    endpoint_transfer_type, ALT_SETTING_IN, ALT_SETTING_OUT, INTERFACE_NUMBER,
};
use crate::state::DeviceState;
use crate::usb::{EndpointAddress, UsbDirection, UsbHandshake};

const HEX_PREVIEW_BYTES: usize = 32;

fn hex_preview(data: &[u8]) -> String {
    let mut out = String::with_capacity(HEX_PREVIEW_BYTES * 3 + 3);
    for (i, b) in data.iter().take(HEX_PREVIEW_BYTES).enumerate() {
        if i != 0 {
            out.push(' ');
        }
        let _ = write!(out, "{b:02x}");
    }
    if data.len() > HEX_PREVIEW_BYTES {
        out.push_str(" ..");
    }
    out
}

/// Alternate setting under which `direction` is serviced on the functional endpoints.
fn required_alt_setting(direction: UsbDirection) -> u8 {
    match direction {
        UsbDirection::Out => ALT_SETTING_OUT,
        UsbDirection::In => ALT_SETTING_IN,
    }
}

/// Runs one data transaction against `ep`.
///
/// For OUT, `buf` holds the host payload and is consumed whole. For IN, up to `buf.len()`
/// staged bytes are copied into it.
pub(crate) fn transfer(
    state: &mut DeviceState,
    ep: EndpointAddress,
    buf: &mut [u8],
) -> UsbHandshake {
    let number = ep.number();
    if number == 0 || endpoint_transfer_type(number).is_none() {
        return UsbHandshake::Stall;
    }

    if state.endpoint_halted(ep) != Some(false) {
        trace!(endpoint = ?ep, "transfer on halted endpoint");
        return UsbHandshake::Stall;
    }

    if state.alt_setting(INTERFACE_NUMBER) != Some(required_alt_setting(ep.direction())) {
        trace!(endpoint = ?ep, "endpoint inactive in current alternate setting");
        return UsbHandshake::Stall;
    }

    match ep.direction() {
        UsbDirection::Out => {
            if tracing::enabled!(Level::TRACE) {
                trace!(endpoint = ?ep, len = buf.len(), data = %hex_preview(buf), "OUT payload");
            }
            UsbHandshake::Ack { bytes: buf.len() }
        }
        UsbDirection::In => {
            let Some(staging) = state.in_staging_mut(number) else {
                return UsbHandshake::Stall;
            };
            match staging.take_into(buf) {
                Some(bytes) => {
                    trace!(endpoint = ?ep, bytes, "IN payload delivered");
                    UsbHandshake::Ack { bytes }
                }
                None => UsbHandshake::Nak,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_preview_truncates_long_payloads() {
        assert_eq!(hex_preview(&[0x00, 0xab, 0x10]), "00 ab 10");
        let long = vec![0x11; 40];
        let preview = hex_preview(&long);
        assert!(preview.ends_with(" .."));
        assert_eq!(preview.matches("11").count(), HEX_PREVIEW_BYTES);
    }

    #[test]
    fn out_is_accepted_only_in_the_out_alternate() {
        let mut state = DeviceState::new();
        let mut payload = [1u8, 2, 3];
        let ep = EndpointAddress::new(3, UsbDirection::Out);
        assert_eq!(transfer(&mut state, ep, &mut payload), UsbHandshake::Ack { bytes: 3 });

        state.set_alt_setting(0, ALT_SETTING_IN);
        assert_eq!(transfer(&mut state, ep, &mut payload), UsbHandshake::Stall);
    }

    #[test]
    fn control_and_unknown_endpoints_stall() {
        let mut state = DeviceState::new();
        let mut buf = [0u8; 8];
        for raw in [0x00, 0x80, 0x04, 0x8f] {
            assert_eq!(
                transfer(&mut state, EndpointAddress::from_raw(raw), &mut buf),
                UsbHandshake::Stall
            );
        }
    }

    #[test]
    fn halt_takes_precedence_over_alt_gating() {
        let mut state = DeviceState::new();
        state.set_alt_setting(0, ALT_SETTING_IN);
        let ep = EndpointAddress::new(1, UsbDirection::In);
        state.in_staging_mut(1).unwrap().stage(vec![7; 4]);
        state.set_endpoint_halted(ep, true);

        let mut buf = [0u8; 8];
        assert_eq!(transfer(&mut state, ep, &mut buf), UsbHandshake::Stall);
        // Staged data survives the stalled attempt.
        assert_eq!(state.in_staging(1).unwrap().valid_len(), 4);
    }
}
