//! Control-transfer dispatcher.
//!
//! Requests are resolved in priority order: the BOS short-circuit, the descriptor store, then
//! the [`ROUTES`] table keyed by `(bRequest, recipient, direction)`. Anything the table does not
//! name stalls.

use bitflags::bitflags;
use tracing::debug;

use crate::descriptor::{
    self, ALT_SETTING_IN, CONFIGURATION_VALUE, NUM_ALT_SETTINGS, NUM_INTERFACES,
};
use crate::host::UsbHost;
use crate::producer::PeriodicInProducer;
use crate::state::DeviceState;
use crate::usb::{
    clamp_response, ControlResponse, EndpointAddress, RequestDirection, RequestRecipient,
    RequestType, SetupPacket, UsbSpeed, USB_FEATURE_DEVICE_REMOTE_WAKEUP,
    USB_FEATURE_ENDPOINT_HALT, USB_REQUEST_CLEAR_FEATURE, USB_REQUEST_GET_CONFIGURATION,
    USB_REQUEST_GET_INTERFACE, USB_REQUEST_GET_STATUS, USB_REQUEST_SET_ADDRESS,
    USB_REQUEST_SET_CONFIGURATION, USB_REQUEST_SET_FEATURE, USB_REQUEST_SET_INTERFACE,
    USB_REQUEST_SET_SEL,
};

const SET_SEL_LENGTH: u16 = 6;

bitflags! {
    /// Device GET_STATUS word (USB 2.0 section 9.4.5).
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct DeviceStatus: u16 {
        const SELF_POWERED = 1 << 0;
        const REMOTE_WAKEUP = 1 << 1;
    }
}

/// Address and configuration changes accepted by a request but not yet in effect. They are
/// committed once the control transfer's status stage completes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct PendingCommit {
    pub address: Option<u8>,
    pub configuration: Option<u8>,
}

impl PendingCommit {
    pub(crate) fn apply(self, state: &mut DeviceState) {
        if let Some(address) = self.address {
            state.address = address;
            debug!(address, "set address");
        }
        if let Some(configuration) = self.configuration {
            state.configuration = configuration;
            debug!(configuration, "set configuration");
        }
    }
}

/// Everything a route handler may touch.
pub(crate) struct ControlContext<'a> {
    pub state: &'a mut DeviceState,
    pub producer: &'a mut PeriodicInProducer,
    pub host: &'a mut dyn UsbHost,
    pub speed: UsbSpeed,
    pub pending: PendingCommit,
}

type RouteHandler = fn(&mut ControlContext<'_>, &SetupPacket, &[u8]) -> ControlResponse;

pub(crate) struct ControlRoute {
    pub request: u8,
    pub recipient: RequestRecipient,
    pub direction: RequestDirection,
    pub handler: RouteHandler,
}

const fn route(
    request: u8,
    recipient: RequestRecipient,
    direction: RequestDirection,
    handler: RouteHandler,
) -> ControlRoute {
    ControlRoute {
        request,
        recipient,
        direction,
        handler,
    }
}

use RequestDirection::{DeviceToHost as In, HostToDevice as Out};
use RequestRecipient::{Device, Endpoint, Interface};

pub(crate) static ROUTES: &[ControlRoute] = &[
    route(USB_REQUEST_GET_STATUS, Device, In, get_status_device),
    route(USB_REQUEST_GET_STATUS, Interface, In, get_status_interface),
    route(USB_REQUEST_GET_STATUS, Endpoint, In, get_status_endpoint),
    route(USB_REQUEST_CLEAR_FEATURE, Device, Out, clear_feature_device),
    route(USB_REQUEST_CLEAR_FEATURE, Endpoint, Out, clear_feature_endpoint),
    route(USB_REQUEST_SET_FEATURE, Device, Out, set_feature_device),
    route(USB_REQUEST_SET_FEATURE, Endpoint, Out, set_feature_endpoint),
    route(USB_REQUEST_SET_ADDRESS, Device, Out, set_address),
    route(USB_REQUEST_GET_CONFIGURATION, Device, In, get_configuration),
    route(USB_REQUEST_SET_CONFIGURATION, Device, Out, set_configuration),
    route(USB_REQUEST_GET_INTERFACE, Interface, In, get_interface),
    route(USB_REQUEST_SET_INTERFACE, Interface, Out, set_interface),
    route(USB_REQUEST_SET_SEL, Device, Out, set_sel),
];

/// Finds the table row for `setup`, or `None` when the request is unhandled.
pub(crate) fn lookup(setup: &SetupPacket) -> Option<&'static ControlRoute> {
    if setup.request_type() != RequestType::Standard {
        return None;
    }
    ROUTES.iter().find(|r| {
        r.request == setup.b_request
            && r.recipient == setup.recipient()
            && r.direction == setup.request_direction()
    })
}

/// Resolves one control request. `data_out` holds the OUT data stage (empty for IN and
/// no-data requests).
pub(crate) fn dispatch(
    ctx: &mut ControlContext<'_>,
    setup: &SetupPacket,
    data_out: &[u8],
) -> ControlResponse {
    if descriptor::is_bos_request(setup) {
        return descriptor::bos_descriptor(ctx.speed, setup.w_length)
            .map(ControlResponse::Data)
            .unwrap_or(ControlResponse::Stall);
    }

    if let Some(data) = descriptor::resolve_standard_descriptor(ctx.speed, setup) {
        return ControlResponse::Data(data);
    }

    match lookup(setup) {
        Some(route) => (route.handler)(ctx, setup, data_out),
        None => ControlResponse::Stall,
    }
}

/// Endpoint named by an endpoint-recipient `wIndex`. Only the direction bit and the endpoint
/// number may be set.
fn endpoint_from_w_index(setup: &SetupPacket) -> Option<EndpointAddress> {
    let raw = u8::try_from(setup.w_index).ok()?;
    if raw & 0x70 != 0 {
        return None;
    }
    Some(EndpointAddress::from_raw(raw))
}

fn status_word(status: u16, setup: &SetupPacket) -> ControlResponse {
    ControlResponse::Data(clamp_response(status.to_le_bytes().to_vec(), setup.w_length))
}

fn get_status_device(
    ctx: &mut ControlContext<'_>,
    setup: &SetupPacket,
    _: &[u8],
) -> ControlResponse {
    if setup.w_value != 0 || setup.w_index != 0 {
        return ControlResponse::Stall;
    }
    let mut status = DeviceStatus::empty();
    status.set(DeviceStatus::REMOTE_WAKEUP, ctx.state.remote_wakeup_enabled);
    status_word(status.bits(), setup)
}

fn get_status_interface(
    _: &mut ControlContext<'_>,
    setup: &SetupPacket,
    _: &[u8],
) -> ControlResponse {
    if setup.w_value != 0 || setup.w_index as usize >= NUM_INTERFACES {
        return ControlResponse::Stall;
    }
    status_word(0, setup)
}

fn get_status_endpoint(
    ctx: &mut ControlContext<'_>,
    setup: &SetupPacket,
    _: &[u8],
) -> ControlResponse {
    if setup.w_value != 0 {
        return ControlResponse::Stall;
    }
    let Some(ep) = endpoint_from_w_index(setup) else {
        return ControlResponse::Stall;
    };
    match ctx.state.endpoint_halted(ep) {
        Some(halted) => status_word(u16::from(halted), setup),
        None => ControlResponse::Stall,
    }
}

fn set_remote_wakeup(
    ctx: &mut ControlContext<'_>,
    setup: &SetupPacket,
    enabled: bool,
) -> ControlResponse {
    if setup.w_index != 0 || setup.w_length != 0 {
        return ControlResponse::Stall;
    }
    if setup.w_value != USB_FEATURE_DEVICE_REMOTE_WAKEUP {
        return ControlResponse::Stall;
    }
    ctx.state.remote_wakeup_enabled = enabled;
    debug!(enabled, "remote wakeup");
    ControlResponse::Ack
}

fn set_halt(ctx: &mut ControlContext<'_>, setup: &SetupPacket, halted: bool) -> ControlResponse {
    if setup.w_value != USB_FEATURE_ENDPOINT_HALT || setup.w_length != 0 {
        return ControlResponse::Stall;
    }
    let Some(ep) = endpoint_from_w_index(setup) else {
        return ControlResponse::Stall;
    };
    // The default control pipe cannot be halted.
    if ep.number() == 0 {
        return ControlResponse::Stall;
    }
    if !ctx.state.set_endpoint_halted(ep, halted) {
        return ControlResponse::Stall;
    }
    debug!(endpoint = ?ep, halted, "endpoint halt");
    ControlResponse::Ack
}

fn clear_feature_device(
    ctx: &mut ControlContext<'_>,
    setup: &SetupPacket,
    _: &[u8],
) -> ControlResponse {
    set_remote_wakeup(ctx, setup, false)
}

fn set_feature_device(
    ctx: &mut ControlContext<'_>,
    setup: &SetupPacket,
    _: &[u8],
) -> ControlResponse {
    set_remote_wakeup(ctx, setup, true)
}

fn clear_feature_endpoint(
    ctx: &mut ControlContext<'_>,
    setup: &SetupPacket,
    _: &[u8],
) -> ControlResponse {
    set_halt(ctx, setup, false)
}

fn set_feature_endpoint(
    ctx: &mut ControlContext<'_>,
    setup: &SetupPacket,
    _: &[u8],
) -> ControlResponse {
    set_halt(ctx, setup, true)
}

fn set_address(ctx: &mut ControlContext<'_>, setup: &SetupPacket, _: &[u8]) -> ControlResponse {
    if setup.w_value > 127 || setup.w_index != 0 || setup.w_length != 0 {
        return ControlResponse::Stall;
    }
    ctx.pending.address = Some(setup.w_value as u8);
    ControlResponse::Ack
}

fn get_configuration(
    ctx: &mut ControlContext<'_>,
    setup: &SetupPacket,
    _: &[u8],
) -> ControlResponse {
    if setup.w_value != 0 || setup.w_index != 0 {
        return ControlResponse::Stall;
    }
    ControlResponse::Data(clamp_response(vec![ctx.state.configuration], setup.w_length))
}

fn set_configuration(
    ctx: &mut ControlContext<'_>,
    setup: &SetupPacket,
    _: &[u8],
) -> ControlResponse {
    if setup.w_index != 0 || setup.w_length != 0 || (setup.w_value & 0xff00) != 0 {
        return ControlResponse::Stall;
    }
    let cfg = (setup.w_value & 0x00ff) as u8;
    if cfg != 0 && cfg != CONFIGURATION_VALUE {
        return ControlResponse::Stall;
    }
    ctx.pending.configuration = Some(cfg);
    ControlResponse::Ack
}

fn get_interface(ctx: &mut ControlContext<'_>, setup: &SetupPacket, _: &[u8]) -> ControlResponse {
    if setup.w_value != 0 {
        return ControlResponse::Stall;
    }
    let Ok(interface) = u8::try_from(setup.w_index) else {
        return ControlResponse::Stall;
    };
    match ctx.state.alt_setting(interface) {
        Some(alt) => ControlResponse::Data(clamp_response(vec![alt], setup.w_length)),
        None => ControlResponse::Stall,
    }
}

fn set_interface(ctx: &mut ControlContext<'_>, setup: &SetupPacket, _: &[u8]) -> ControlResponse {
    if setup.w_length != 0 || setup.w_value >= u16::from(NUM_ALT_SETTINGS) {
        return ControlResponse::Stall;
    }
    let Ok(interface) = u8::try_from(setup.w_index) else {
        return ControlResponse::Stall;
    };
    let alt = setup.w_value as u8;
    if !ctx.state.set_alt_setting(interface, alt) {
        return ControlResponse::Stall;
    }

    // Whatever was staged belongs to the previous personality.
    ctx.state.clear_in_staging();
    if alt == ALT_SETTING_IN {
        ctx.producer.arm(ctx.host);
    } else {
        ctx.producer.disarm(ctx.host);
    }
    debug!(interface, alt, "set interface");
    ControlResponse::Ack
}

fn set_sel(_: &mut ControlContext<'_>, setup: &SetupPacket, data: &[u8]) -> ControlResponse {
    if setup.w_value != 0
        || setup.w_index != 0
        || setup.w_length != SET_SEL_LENGTH
        || data.len() < SET_SEL_LENGTH as usize
    {
        return ControlResponse::Stall;
    }
    debug!(
        u1_sel = data[0],
        u1_pel = data[1],
        u2_sel = u16::from_le_bytes([data[2], data[3]]),
        u2_pel = u16::from_le_bytes([data[4], data[5]]),
        "set system exit latency"
    );
    ControlResponse::Ack
}
