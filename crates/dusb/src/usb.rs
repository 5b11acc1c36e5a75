//! Wire-level USB vocabulary shared by the descriptor store, the control dispatcher and the
//! data engine.

use core::fmt;

pub const USB_REQUEST_GET_STATUS: u8 = 0x00;
pub const USB_REQUEST_CLEAR_FEATURE: u8 = 0x01;
pub const USB_REQUEST_SET_FEATURE: u8 = 0x03;
pub const USB_REQUEST_SET_ADDRESS: u8 = 0x05;
pub const USB_REQUEST_GET_DESCRIPTOR: u8 = 0x06;
pub const USB_REQUEST_GET_CONFIGURATION: u8 = 0x08;
pub const USB_REQUEST_SET_CONFIGURATION: u8 = 0x09;
pub const USB_REQUEST_GET_INTERFACE: u8 = 0x0a;
pub const USB_REQUEST_SET_INTERFACE: u8 = 0x0b;
pub const USB_REQUEST_SET_SEL: u8 = 0x30;

pub const USB_FEATURE_ENDPOINT_HALT: u16 = 0x0000;
pub const USB_FEATURE_DEVICE_REMOTE_WAKEUP: u16 = 0x0001;

pub const USB_DESCRIPTOR_TYPE_DEVICE: u8 = 0x01;
pub const USB_DESCRIPTOR_TYPE_CONFIGURATION: u8 = 0x02;
pub const USB_DESCRIPTOR_TYPE_STRING: u8 = 0x03;
pub const USB_DESCRIPTOR_TYPE_INTERFACE: u8 = 0x04;
pub const USB_DESCRIPTOR_TYPE_ENDPOINT: u8 = 0x05;
pub const USB_DESCRIPTOR_TYPE_DEVICE_QUALIFIER: u8 = 0x06;
pub const USB_DESCRIPTOR_TYPE_OTHER_SPEED_CONFIGURATION: u8 = 0x07;
pub const USB_DESCRIPTOR_TYPE_BOS: u8 = 0x0f;
pub const USB_DESCRIPTOR_TYPE_DEVICE_CAPABILITY: u8 = 0x10;
pub const USB_DESCRIPTOR_TYPE_SS_ENDPOINT_COMPANION: u8 = 0x30;

/// An 8-byte SETUP packet as delivered on endpoint 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SetupPacket {
    pub bm_request_type: u8,
    pub b_request: u8,
    pub w_value: u16,
    pub w_index: u16,
    pub w_length: u16,
}

impl SetupPacket {
    /// Builds a SETUP packet from a combined 16-bit request code
    /// (`bmRequestType << 8 | bRequest`), the encoding bus simulators commonly use when
    /// handing a control transfer to a device model.
    pub fn from_request_code(request_code: u16, value: u16, index: u16, length: u16) -> Self {
        let [bm_request_type, b_request] = request_code.to_be_bytes();
        Self {
            bm_request_type,
            b_request,
            w_value: value,
            w_index: index,
            w_length: length,
        }
    }

    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self {
            bm_request_type: bytes[0],
            b_request: bytes[1],
            w_value: u16::from_le_bytes([bytes[2], bytes[3]]),
            w_index: u16::from_le_bytes([bytes[4], bytes[5]]),
            w_length: u16::from_le_bytes([bytes[6], bytes[7]]),
        }
    }

    pub fn request_code(&self) -> u16 {
        u16::from_be_bytes([self.bm_request_type, self.b_request])
    }

    pub fn request_direction(&self) -> RequestDirection {
        if (self.bm_request_type & 0x80) != 0 {
            RequestDirection::DeviceToHost
        } else {
            RequestDirection::HostToDevice
        }
    }

    pub fn request_type(&self) -> RequestType {
        match (self.bm_request_type >> 5) & 0x03 {
            0 => RequestType::Standard,
            1 => RequestType::Class,
            2 => RequestType::Vendor,
            _ => RequestType::Reserved,
        }
    }

    pub fn recipient(&self) -> RequestRecipient {
        match self.bm_request_type & 0x1f {
            0 => RequestRecipient::Device,
            1 => RequestRecipient::Interface,
            2 => RequestRecipient::Endpoint,
            3 => RequestRecipient::Other,
            _ => RequestRecipient::Reserved,
        }
    }

    pub fn descriptor_type(&self) -> u8 {
        (self.w_value >> 8) as u8
    }

    pub fn descriptor_index(&self) -> u8 {
        (self.w_value & 0x00ff) as u8
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestDirection {
    HostToDevice,
    DeviceToHost,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestType {
    Standard,
    Class,
    Vendor,
    Reserved,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestRecipient {
    Device,
    Interface,
    Endpoint,
    Other,
    Reserved,
}

/// Data-phase direction of a non-control transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UsbDirection {
    Out,
    In,
}

/// Link speed negotiated with the upstream port.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UsbSpeed {
    Low,
    Full,
    High,
    Super,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferType {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

impl TransferType {
    /// Low two bits of an endpoint descriptor's `bmAttributes`.
    pub fn attributes(self) -> u8 {
        match self {
            TransferType::Control => 0x00,
            TransferType::Isochronous => 0x01,
            TransferType::Bulk => 0x02,
            TransferType::Interrupt => 0x03,
        }
    }
}

/// Endpoint number plus direction, encoded the way `wIndex` and `bEndpointAddress` carry it
/// (bit 7 = IN).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointAddress(u8);

impl EndpointAddress {
    pub const fn new(number: u8, direction: UsbDirection) -> Self {
        let dir = match direction {
            UsbDirection::Out => 0x00,
            UsbDirection::In => 0x80,
        };
        Self(dir | (number & 0x0f))
    }

    pub const fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u8 {
        self.0
    }

    pub const fn number(self) -> u8 {
        self.0 & 0x0f
    }

    pub const fn direction(self) -> UsbDirection {
        if self.0 & 0x80 != 0 {
            UsbDirection::In
        } else {
            UsbDirection::Out
        }
    }
}

impl fmt::Debug for EndpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EndpointAddress({:#04x})", self.0)
    }
}

/// Outcome of a single transaction as reported back to the host.
///
/// `Ack` carries the number of bytes actually moved (`actual_length`); `Nak` means the endpoint
/// has nothing to offer yet and the host should retry; `Stall` is a protocol-level rejection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UsbHandshake {
    Ack { bytes: usize },
    Nak,
    Stall,
}

impl UsbHandshake {
    pub fn actual_length(self) -> usize {
        match self {
            UsbHandshake::Ack { bytes } => bytes,
            UsbHandshake::Nak | UsbHandshake::Stall => 0,
        }
    }

    pub fn is_ack(self) -> bool {
        matches!(self, UsbHandshake::Ack { .. })
    }
}

/// Request-level result produced by the dispatcher before it is written to the host buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlResponse {
    Data(Vec<u8>),
    Ack,
    Stall,
}

pub(crate) fn clamp_response(mut data: Vec<u8>, setup_w_length: u16) -> Vec<u8> {
    let requested = setup_w_length as usize;
    if data.len() > requested {
        data.truncate(requested);
    }
    data
}
