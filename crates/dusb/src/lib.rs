//! DUSB: an emulated composite USB peripheral.
//!
//! The device exposes one configuration with a single interface and two alternate settings:
//! alternate 0 accepts OUT transfers on an interrupt, an isochronous and a bulk endpoint, while
//! alternate 1 serves synthetic IN payloads on the same endpoint numbers. A periodic producer
//! stages those payloads round-robin, and a separate timer asserts remote wakeup while the
//! host has enabled it.
//!
//! The device never owns the bus. Every entry point takes a [`UsbHost`] that provides timers,
//! attachment state and endpoint lookup; [`bus::VirtualBus`] is an in-process implementation
//! used for testing and embedding.
#![forbid(unsafe_code)]

pub mod bus;
pub mod config;
mod control;
mod data;
pub mod descriptor;
pub mod device;
mod ep0;
pub mod error;
pub mod host;
pub mod producer;
pub mod state;
pub mod timer;
pub mod usb;
pub mod wakeup;

pub use bus::{PortHandle, VirtualBus, VirtualHost, WakeupSignal};
pub use config::DusbConfig;
pub use control::DeviceStatus;
pub use device::{DusbDevice, OutObserver};
pub use error::{ConfigError, RealizeError};
pub use host::{DeviceTimer, EndpointRef, UsbHost};
pub use timer::{TimerEvent, TimerId, TimerQueue};
pub use usb::{
    ControlResponse, EndpointAddress, SetupPacket, TransferType, UsbDirection, UsbHandshake,
    UsbSpeed,
};
