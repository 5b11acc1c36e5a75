//! Speed-indexed descriptor store.
//!
//! Every descriptor is produced by a pure function of the negotiated [`UsbSpeed`], so the
//! Full/High/Super variants never share mutable backing storage.

use bitflags::bitflags;

use crate::usb::{
    clamp_response, EndpointAddress, RequestDirection, RequestRecipient, RequestType,
    SetupPacket, TransferType, UsbDirection, UsbSpeed, USB_DESCRIPTOR_TYPE_BOS,
    USB_DESCRIPTOR_TYPE_CONFIGURATION, USB_DESCRIPTOR_TYPE_DEVICE,
    USB_DESCRIPTOR_TYPE_DEVICE_QUALIFIER, USB_DESCRIPTOR_TYPE_ENDPOINT,
    USB_DESCRIPTOR_TYPE_INTERFACE, USB_DESCRIPTOR_TYPE_OTHER_SPEED_CONFIGURATION,
    USB_DESCRIPTOR_TYPE_SS_ENDPOINT_COMPANION, USB_DESCRIPTOR_TYPE_STRING,
    USB_REQUEST_GET_DESCRIPTOR,
};

const ID_VENDOR: u16 = 0x0069;
const ID_PRODUCT: u16 = 0x0420;
const BCD_DEVICE: u16 = 0x0089;

const STRING_MANUFACTURER: &str = "Darshan";
const STRING_PRODUCT: &str = "DUSB Device";
const STRING_SERIAL: &str = "69-420";
const LANGID_EN_US: u16 = 0x0409;

pub const CONFIGURATION_VALUE: u8 = 1;
pub const INTERFACE_NUMBER: u8 = 0;
pub const NUM_INTERFACES: usize = 1;

/// Alternate 0 exposes the OUT personality of the functional endpoints, alternate 1 the IN one.
pub const ALT_SETTING_OUT: u8 = 0;
pub const ALT_SETTING_IN: u8 = 1;
pub const NUM_ALT_SETTINGS: u8 = 2;

pub const INTERRUPT_ENDPOINT: u8 = 1;
pub const ISOCHRONOUS_ENDPOINT: u8 = 2;
pub const BULK_ENDPOINT: u8 = 3;

/// Functional (non-control) endpoints, in round-robin order.
pub const FUNCTION_ENDPOINTS: [(u8, TransferType); 3] = [
    (INTERRUPT_ENDPOINT, TransferType::Interrupt),
    (ISOCHRONOUS_ENDPOINT, TransferType::Isochronous),
    (BULK_ENDPOINT, TransferType::Bulk),
];

bitflags! {
    /// Configuration descriptor `bmAttributes`.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct ConfigAttributes: u8 {
        const RESERVED_ONE = 1 << 7;
        const SELF_POWERED = 1 << 6;
        const REMOTE_WAKEUP = 1 << 5;
    }
}

/// Binary Object Store: USB 2.0 extension (LPM) plus SuperSpeed device capability.
pub static BOS_DESCRIPTOR: [u8; 22] = [
    // BOS header
    0x05, // bLength
    USB_DESCRIPTOR_TYPE_BOS,
    0x16,
    0x00, // wTotalLength (22)
    0x02, // bNumDeviceCaps
    // USB 2.0 extension
    0x07, // bLength
    0x10, // bDescriptorType (device capability)
    0x02, // bDevCapabilityType (USB 2.0 extension)
    0x02,
    0x00,
    0x00,
    0x00, // bmAttributes (LPM)
    // SuperSpeed USB device capability
    0x0a, // bLength
    0x10, // bDescriptorType (device capability)
    0x03, // bDevCapabilityType (SuperSpeed)
    0x00, // bmAttributes
    0x0e,
    0x00, // wSpeedsSupported (full, high, super)
    0x01, // bFunctionalitySupport (full speed)
    0x0a, // bU1DevExitLat
    0xff,
    0x07, // wU2DevExitLat
];

pub fn endpoint_transfer_type(number: u8) -> Option<TransferType> {
    FUNCTION_ENDPOINTS
        .iter()
        .find(|(ep, _)| *ep == number)
        .map(|(_, ty)| *ty)
}

/// Whether `ep` names an endpoint declared anywhere in the configuration (control included).
pub fn is_declared_endpoint(ep: EndpointAddress) -> bool {
    ep.number() == 0 || endpoint_transfer_type(ep.number()).is_some()
}

/// Speed actually used for `hint`; low speed cannot carry isochronous or bulk endpoints.
pub fn negotiate_speed(hint: UsbSpeed) -> UsbSpeed {
    match hint {
        UsbSpeed::Low => UsbSpeed::Full,
        other => other,
    }
}

pub fn max_packet_size(speed: UsbSpeed, ty: TransferType) -> u16 {
    match (speed, ty) {
        (UsbSpeed::Super, TransferType::Control) => 512,
        (_, TransferType::Control) => 64,
        (UsbSpeed::Low | UsbSpeed::Full, TransferType::Interrupt) => 64,
        (UsbSpeed::Low | UsbSpeed::Full, TransferType::Isochronous) => 1023,
        (UsbSpeed::Low | UsbSpeed::Full, TransferType::Bulk) => 64,
        (UsbSpeed::High, TransferType::Bulk) => 512,
        (UsbSpeed::High, _) => 1024,
        (UsbSpeed::Super, _) => 1024,
    }
}

fn b_interval(speed: UsbSpeed, ty: TransferType) -> u8 {
    match (speed, ty) {
        (_, TransferType::Bulk | TransferType::Control) => 0,
        (_, TransferType::Isochronous) => 1,
        // Full speed counts frames; high and super speed use 2^(bInterval-1) microframes.
        (UsbSpeed::Low | UsbSpeed::Full, TransferType::Interrupt) => 1,
        (_, TransferType::Interrupt) => 4,
    }
}

pub fn device_descriptor(speed: UsbSpeed) -> [u8; 18] {
    let (bcd_usb, max_packet0) = match speed {
        UsbSpeed::Super => (0x0320u16, 9u8), // 2^9 = 512
        _ => (0x0200, 64),
    };
    let [usb_lo, usb_hi] = bcd_usb.to_le_bytes();
    let [vid_lo, vid_hi] = ID_VENDOR.to_le_bytes();
    let [pid_lo, pid_hi] = ID_PRODUCT.to_le_bytes();
    let [dev_lo, dev_hi] = BCD_DEVICE.to_le_bytes();
    [
        18, // bLength
        USB_DESCRIPTOR_TYPE_DEVICE,
        usb_lo,
        usb_hi,      // bcdUSB
        0x00,        // bDeviceClass (per interface)
        0x00,        // bDeviceSubClass
        0x00,        // bDeviceProtocol
        max_packet0, // bMaxPacketSize0
        vid_lo,
        vid_hi,
        pid_lo,
        pid_hi,
        dev_lo,
        dev_hi,
        0x01, // iManufacturer
        0x02, // iProduct
        0x03, // iSerialNumber
        0x01, // bNumConfigurations
    ]
}

fn device_qualifier(speed: UsbSpeed) -> Option<[u8; 10]> {
    if !matches!(speed, UsbSpeed::Full | UsbSpeed::High) {
        return None;
    }
    Some([
        10, // bLength
        USB_DESCRIPTOR_TYPE_DEVICE_QUALIFIER,
        0x00,
        0x02, // bcdUSB (2.00)
        0x00, // bDeviceClass
        0x00, // bDeviceSubClass
        0x00, // bDeviceProtocol
        64,   // bMaxPacketSize0 at the other speed
        0x01, // bNumConfigurations
        0x00, // bReserved
    ])
}

fn push_interface(out: &mut Vec<u8>, alt: u8, num_endpoints: u8) {
    out.extend_from_slice(&[
        9, // bLength
        USB_DESCRIPTOR_TYPE_INTERFACE,
        INTERFACE_NUMBER,
        alt,
        num_endpoints,
        0xff, // bInterfaceClass (vendor specific)
        0x00, // bInterfaceSubClass
        0x00, // bInterfaceProtocol
        0x00, // iInterface
    ]);
}

fn push_endpoint(out: &mut Vec<u8>, speed: UsbSpeed, ep: EndpointAddress, ty: TransferType) {
    let max_packet = max_packet_size(speed, ty);
    let [mps_lo, mps_hi] = max_packet.to_le_bytes();
    out.extend_from_slice(&[
        7, // bLength
        USB_DESCRIPTOR_TYPE_ENDPOINT,
        ep.raw(),
        ty.attributes(),
        mps_lo,
        mps_hi,
        b_interval(speed, ty),
    ]);

    if speed == UsbSpeed::Super {
        let bytes_per_interval = match ty {
            TransferType::Interrupt | TransferType::Isochronous => max_packet,
            TransferType::Bulk | TransferType::Control => 0,
        };
        let [bpi_lo, bpi_hi] = bytes_per_interval.to_le_bytes();
        out.extend_from_slice(&[
            6, // bLength
            USB_DESCRIPTOR_TYPE_SS_ENDPOINT_COMPANION,
            0x00, // bMaxBurst
            0x00, // bmAttributes
            bpi_lo,
            bpi_hi, // wBytesPerInterval
        ]);
    }
}

/// Full configuration descriptor set (configuration, interface alternates, endpoints).
pub fn configuration_descriptor(speed: UsbSpeed) -> Vec<u8> {
    let attributes = ConfigAttributes::RESERVED_ONE | ConfigAttributes::REMOTE_WAKEUP;
    let mut out = vec![
        9, // bLength
        USB_DESCRIPTOR_TYPE_CONFIGURATION,
        0x00,
        0x00, // wTotalLength, patched below
        NUM_INTERFACES as u8,
        CONFIGURATION_VALUE,
        0x00, // iConfiguration
        attributes.bits(),
        50, // bMaxPower (100mA)
    ];

    for (alt, direction) in [
        (ALT_SETTING_OUT, UsbDirection::Out),
        (ALT_SETTING_IN, UsbDirection::In),
    ] {
        push_interface(&mut out, alt, FUNCTION_ENDPOINTS.len() as u8);
        for (number, ty) in FUNCTION_ENDPOINTS {
            push_endpoint(&mut out, speed, EndpointAddress::new(number, direction), ty);
        }
    }

    let total = (out.len() as u16).to_le_bytes();
    out[2] = total[0];
    out[3] = total[1];
    out
}

fn other_speed_configuration(speed: UsbSpeed) -> Option<Vec<u8>> {
    let other = match speed {
        UsbSpeed::Full => UsbSpeed::High,
        UsbSpeed::High => UsbSpeed::Full,
        UsbSpeed::Low | UsbSpeed::Super => return None,
    };
    let mut desc = configuration_descriptor(other);
    desc[1] = USB_DESCRIPTOR_TYPE_OTHER_SPEED_CONFIGURATION;
    Some(desc)
}

fn string_descriptor_utf16le(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + s.len() * 2);
    out.push(0); // bLength placeholder
    out.push(USB_DESCRIPTOR_TYPE_STRING);
    for unit in s.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out[0] = out.len() as u8;
    out
}

fn string_descriptor_langid(langid: u16) -> [u8; 4] {
    let [l0, l1] = langid.to_le_bytes();
    [4, USB_DESCRIPTOR_TYPE_STRING, l0, l1]
}

pub fn string_descriptor(index: u8) -> Option<Vec<u8>> {
    match index {
        0 => Some(string_descriptor_langid(LANGID_EN_US).to_vec()),
        1 => Some(string_descriptor_utf16le(STRING_MANUFACTURER)),
        2 => Some(string_descriptor_utf16le(STRING_PRODUCT)),
        3 => Some(string_descriptor_utf16le(STRING_SERIAL)),
        _ => None,
    }
}

/// BOS bytes for `speed`, clipped to `w_length`. Only SuperSpeed advertises a BOS.
pub fn bos_descriptor(speed: UsbSpeed, w_length: u16) -> Option<Vec<u8>> {
    if speed != UsbSpeed::Super {
        return None;
    }
    Some(clamp_response(BOS_DESCRIPTOR.to_vec(), w_length))
}

fn is_standard_device_get_descriptor(setup: &SetupPacket) -> bool {
    setup.b_request == USB_REQUEST_GET_DESCRIPTOR
        && setup.request_direction() == RequestDirection::DeviceToHost
        && setup.request_type() == RequestType::Standard
        && setup.recipient() == RequestRecipient::Device
}

/// Returns `Some(bytes)` (already clipped to `wLength`) for a standard GET_DESCRIPTOR the store
/// can answer at `speed`, or `None` when the request falls outside the descriptor space and the
/// caller should keep dispatching.
pub fn resolve_standard_descriptor(speed: UsbSpeed, setup: &SetupPacket) -> Option<Vec<u8>> {
    if !is_standard_device_get_descriptor(setup) {
        return None;
    }

    let data = match setup.descriptor_type() {
        USB_DESCRIPTOR_TYPE_DEVICE => Some(device_descriptor(speed).to_vec()),
        USB_DESCRIPTOR_TYPE_CONFIGURATION => {
            (setup.descriptor_index() == 0).then(|| configuration_descriptor(speed))
        }
        USB_DESCRIPTOR_TYPE_STRING => string_descriptor(setup.descriptor_index()),
        USB_DESCRIPTOR_TYPE_DEVICE_QUALIFIER => device_qualifier(speed).map(|d| d.to_vec()),
        USB_DESCRIPTOR_TYPE_OTHER_SPEED_CONFIGURATION => other_speed_configuration(speed),
        USB_DESCRIPTOR_TYPE_BOS => return bos_descriptor(speed, setup.w_length),
        _ => None,
    }?;
    Some(clamp_response(data, setup.w_length))
}

/// Whether `setup` is a standard device GET_DESCRIPTOR(BOS).
pub fn is_bos_request(setup: &SetupPacket) -> bool {
    is_standard_device_get_descriptor(setup) && setup.descriptor_type() == USB_DESCRIPTOR_TYPE_BOS
}
