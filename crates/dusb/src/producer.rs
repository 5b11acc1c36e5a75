//! Periodic IN-data producer.
//!
//! Each tick refreshes the staging buffer of exactly one functional endpoint, walking them in
//! round-robin order, and re-arms itself for as long as the IN alternate setting is active.

use tracing::{trace, warn};

use crate::descriptor::{endpoint_transfer_type, ALT_SETTING_IN, INTERFACE_NUMBER};
use crate::host::{DeviceTimer, UsbHost};
use crate::state::DeviceState;
use crate::timer::TimerId;
use crate::usb::TransferType;

pub const INTERRUPT_PAYLOAD_LEN: usize = 64;
pub const ISOCHRONOUS_PAYLOAD_LEN: usize = 1024;
pub const BULK_PAYLOAD_LEN: usize = 1024;

pub fn payload_len(ty: TransferType) -> usize {
    match ty {
        TransferType::Interrupt => INTERRUPT_PAYLOAD_LEN,
        TransferType::Isochronous => ISOCHRONOUS_PAYLOAD_LEN,
        TransferType::Bulk => BULK_PAYLOAD_LEN,
        TransferType::Control => 0,
    }
}

/// Deterministic test pattern for an endpoint of type `ty`.
pub fn synthesize_payload(ty: TransferType) -> Vec<u8> {
    let len = payload_len(ty);
    match ty {
        TransferType::Interrupt => (0..len).map(|i| i as u8).collect(),
        TransferType::Isochronous => (0..len).map(|i| (i as u8).wrapping_mul(3)).collect(),
        TransferType::Bulk => (0..len).map(|i| 0xff - (i as u8)).collect(),
        TransferType::Control => Vec::new(),
    }
}

#[derive(Debug)]
pub struct PeriodicInProducer {
    interval_ms: u64,
    timer: Option<TimerId>,
}

impl PeriodicInProducer {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            timer: None,
        }
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    pub fn is_armed(&self) -> bool {
        self.timer.is_some()
    }

    pub fn armed_timer(&self) -> Option<TimerId> {
        self.timer
    }

    /// Schedules the first tick unless one is already pending.
    pub fn arm(&mut self, host: &mut dyn UsbHost) {
        if self.timer.is_none() {
            self.timer = Some(host.schedule_timer(self.interval_ms, DeviceTimer::InData));
        }
    }

    pub fn disarm(&mut self, host: &mut dyn UsbHost) {
        if let Some(id) = self.timer.take() {
            host.cancel_timer(id);
        }
    }

    /// Handles a fired IN-data timer. Returns the endpoint that was refreshed, if any.
    pub fn on_tick(
        &mut self,
        id: TimerId,
        state: &mut DeviceState,
        host: &mut dyn UsbHost,
    ) -> Option<u8> {
        if self.timer != Some(id) {
            warn!(timer = id.raw(), "ignoring stale IN-data timer");
            return None;
        }
        self.timer = None;

        // The alternate may have changed since the tick was scheduled.
        if state.alt_setting(INTERFACE_NUMBER) != Some(ALT_SETTING_IN) {
            return None;
        }

        let endpoint = state.next_round_robin_endpoint();
        let ty = endpoint_transfer_type(endpoint)?;
        let payload = synthesize_payload(ty);
        trace!(endpoint, len = payload.len(), "staged IN payload");
        if let Some(buf) = state.in_staging_mut(endpoint) {
            buf.stage(payload);
        }

        self.timer = Some(host.schedule_timer(self.interval_ms, DeviceTimer::InData));
        Some(endpoint)
    }
}
