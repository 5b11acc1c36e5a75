//! Remote-wakeup scheduler.

use tracing::{debug, warn};

use crate::descriptor::INTERRUPT_ENDPOINT;
use crate::host::{DeviceTimer, UsbHost};
use crate::state::DeviceState;
use crate::timer::TimerId;
use crate::usb::{EndpointAddress, UsbDirection};

/// Endpoint a remote-wakeup signal is attributed to.
pub const WAKEUP_ENDPOINT: EndpointAddress =
    EndpointAddress::new(INTERRUPT_ENDPOINT, UsbDirection::In);

/// Periodically asserts remote wakeup toward the host while the feature is enabled.
#[derive(Debug)]
pub struct RemoteWakeupScheduler {
    interval_ms: u64,
    timer: Option<TimerId>,
}

impl RemoteWakeupScheduler {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            timer: None,
        }
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    pub fn armed_timer(&self) -> Option<TimerId> {
        self.timer
    }

    pub fn start(&mut self, host: &mut dyn UsbHost) {
        if self.timer.is_none() {
            self.timer = Some(host.schedule_timer(self.interval_ms, DeviceTimer::RemoteWakeup));
        }
    }

    pub fn stop(&mut self, host: &mut dyn UsbHost) {
        if let Some(id) = self.timer.take() {
            host.cancel_timer(id);
        }
    }

    /// Handles a fired wakeup timer. Returns whether a wakeup was signalled. The timer is
    /// re-armed regardless.
    pub fn on_tick(&mut self, id: TimerId, state: &DeviceState, host: &mut dyn UsbHost) -> bool {
        if self.timer != Some(id) {
            warn!(timer = id.raw(), "ignoring stale remote-wakeup timer");
            return false;
        }

        let signalled = state.remote_wakeup_enabled && host.is_attached();
        if signalled {
            debug!(endpoint = ?WAKEUP_ENDPOINT, "signalling remote wakeup");
            host.signal_wakeup(WAKEUP_ENDPOINT);
        }

        self.timer = Some(host.schedule_timer(self.interval_ms, DeviceTimer::RemoteWakeup));
        signalled
    }
}
