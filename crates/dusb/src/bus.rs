//! In-process bus runtime for a single [`DusbDevice`].
//!
//! [`VirtualBus`] plays the role of the hosting hypervisor: it owns a virtual millisecond clock
//! and a [`TimerQueue`], materializes endpoints, tracks attachment, records remote-wakeup
//! signals and serializes every call into the device onto one execution context.

use tracing::debug;

use crate::config::DusbConfig;
use crate::descriptor::{max_packet_size, negotiate_speed, FUNCTION_ENDPOINTS};
use crate::device::DusbDevice;
use crate::error::RealizeError;
use crate::host::{DeviceTimer, EndpointRef, UsbHost};
use crate::timer::{TimerId, TimerQueue};
use crate::usb::{
    EndpointAddress, SetupPacket, TransferType, UsbDirection, UsbHandshake, UsbSpeed,
};

/// Opaque handle for the port a device was attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortHandle(u8);

impl PortHandle {
    pub fn port(self) -> u8 {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WakeupSignal {
    pub at_ms: u64,
    pub endpoint: EndpointAddress,
}

/// Host-side services backing [`UsbHost`].
#[derive(Debug)]
pub struct VirtualHost {
    now_ms: u64,
    timers: TimerQueue<DeviceTimer>,
    attached: bool,
    endpoints: Vec<EndpointRef>,
    wakeups: Vec<WakeupSignal>,
}

impl VirtualHost {
    /// Host for a port running at `speed`, with the control pipe and every functional endpoint
    /// materialized.
    pub fn new(speed: UsbSpeed) -> Self {
        let speed = negotiate_speed(speed);
        let mut endpoints = Vec::new();
        for direction in [UsbDirection::Out, UsbDirection::In] {
            endpoints.push(EndpointRef {
                address: EndpointAddress::new(0, direction),
                max_packet_size: max_packet_size(speed, TransferType::Control),
            });
            for (number, ty) in FUNCTION_ENDPOINTS {
                endpoints.push(EndpointRef {
                    address: EndpointAddress::new(number, direction),
                    max_packet_size: max_packet_size(speed, ty),
                });
            }
        }
        Self {
            now_ms: 0,
            timers: TimerQueue::new(),
            attached: false,
            endpoints,
            wakeups: Vec::new(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn wakeups(&self) -> &[WakeupSignal] {
        &self.wakeups
    }

    pub fn take_wakeups(&mut self) -> Vec<WakeupSignal> {
        core::mem::take(&mut self.wakeups)
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn is_timer_pending(&self, id: TimerId) -> bool {
        self.timers.is_pending(id)
    }

    /// Drops an endpoint from the port, e.g. to model a broken bus.
    pub fn remove_endpoint(&mut self, direction: UsbDirection, number: u8) {
        let address = EndpointAddress::new(number, direction);
        self.endpoints.retain(|ep| ep.address != address);
    }
}

impl UsbHost for VirtualHost {
    fn is_attached(&self) -> bool {
        self.attached
    }

    fn schedule_timer(&mut self, interval_ms: u64, timer: DeviceTimer) -> TimerId {
        self.timers.schedule(self.now_ms.saturating_add(interval_ms), timer)
    }

    fn cancel_timer(&mut self, id: TimerId) {
        self.timers.cancel(id);
    }

    fn signal_wakeup(&mut self, endpoint: EndpointAddress) {
        self.wakeups.push(WakeupSignal {
            at_ms: self.now_ms,
            endpoint,
        });
    }

    fn get_endpoint(&self, direction: UsbDirection, number: u8) -> Option<EndpointRef> {
        let address = EndpointAddress::new(number, direction);
        self.endpoints.iter().copied().find(|ep| ep.address == address)
    }
}

/// A single-port bus with an optional attached device.
#[derive(Debug)]
pub struct VirtualBus {
    host: VirtualHost,
    port_speed: UsbSpeed,
    device: Option<DusbDevice>,
}

impl VirtualBus {
    pub fn new(port_speed: UsbSpeed) -> Self {
        Self {
            host: VirtualHost::new(port_speed),
            port_speed,
            device: None,
        }
    }

    pub fn host(&self) -> &VirtualHost {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut VirtualHost {
        &mut self.host
    }

    pub fn now_ms(&self) -> u64 {
        self.host.now_ms
    }

    pub fn device(&self) -> Option<&DusbDevice> {
        self.device.as_ref()
    }

    pub fn device_mut(&mut self) -> Option<&mut DusbDevice> {
        self.device.as_mut()
    }

    /// Realizes a device with `config` and attaches it to the port.
    pub fn attach(&mut self, config: DusbConfig) -> Result<PortHandle, RealizeError> {
        if let Some(mut old) = self.device.take() {
            old.unrealize(&mut self.host);
        }
        let device = DusbDevice::realize(&mut self.host, self.port_speed, config)?;
        self.device = Some(device);
        self.host.attached = true;
        debug!(speed = ?self.port_speed, "device attached");
        Ok(PortHandle(1))
    }

    /// Electrically disconnects the port. The device keeps its state and timers.
    pub fn detach(&mut self) {
        self.host.attached = false;
    }

    pub fn reconnect(&mut self) {
        if self.device.is_some() {
            self.host.attached = true;
        }
    }

    /// Detaches and destroys the device.
    pub fn remove(&mut self) -> Option<DusbDevice> {
        self.host.attached = false;
        let mut device = self.device.take()?;
        device.unrealize(&mut self.host);
        Some(device)
    }

    pub fn control(&mut self, setup: SetupPacket, data: &mut [u8]) -> UsbHandshake {
        match self.device.as_mut() {
            Some(dev) if self.host.attached => dev.handle_control(&mut self.host, setup, data),
            _ => UsbHandshake::Stall,
        }
    }

    pub fn data(&mut self, endpoint: u8, direction: UsbDirection, buf: &mut [u8]) -> UsbHandshake {
        match self.device.as_mut() {
            Some(dev) if self.host.attached => dev.handle_data(endpoint, direction, buf),
            _ => UsbHandshake::Stall,
        }
    }

    pub fn reset(&mut self) {
        if let Some(dev) = self.device.as_mut() {
            dev.handle_reset(&mut self.host);
        }
    }

    /// Advances virtual time by `ms`, delivering every timer that comes due in deadline order.
    /// Returns the number of events delivered.
    pub fn advance_ms(&mut self, ms: u64) -> usize {
        let target = self.host.now_ms.saturating_add(ms);
        let mut delivered = 0;
        while let Some(event) = self.host.timers.pop_due(target) {
            self.host.now_ms = event.deadline_ms;
            if let Some(dev) = self.device.as_mut() {
                dev.handle_timer(&mut self.host, &event);
            }
            delivered += 1;
        }
        self.host.now_ms = target;
        delivered
    }
}
