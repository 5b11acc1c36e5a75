//! Services the device consumes from the bus runtime that hosts it.

use crate::timer::TimerId;
use crate::usb::{EndpointAddress, UsbDirection};

/// Which of the device's periodic activities a timer belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeviceTimer {
    /// Periodic IN-data production.
    InData,
    /// Remote-wakeup signalling.
    RemoteWakeup,
}

/// Host-side handle for an endpoint the bus has materialized for the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EndpointRef {
    pub address: EndpointAddress,
    pub max_packet_size: u16,
}

/// The bus runtime a device is attached to.
///
/// All calls happen on the single execution context that also delivers transfers; no method
/// may call back into the device.
pub trait UsbHost {
    fn is_attached(&self) -> bool;

    /// Arms a one-shot timer `interval_ms` from now. When it fires, the runtime delivers a
    /// [`crate::timer::TimerEvent`] carrying `timer` and the returned id to
    /// [`crate::DusbDevice::handle_timer`].
    fn schedule_timer(&mut self, interval_ms: u64, timer: DeviceTimer) -> TimerId;

    fn cancel_timer(&mut self, id: TimerId);

    fn signal_wakeup(&mut self, endpoint: EndpointAddress);

    fn get_endpoint(&self, direction: UsbDirection, number: u8) -> Option<EndpointRef>;
}
