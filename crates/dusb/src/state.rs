//! Per-device protocol state: address, configuration, alternate settings, endpoint halts
//! and IN staging.

use crate::descriptor::{
    is_declared_endpoint, ALT_SETTING_OUT, FUNCTION_ENDPOINTS, NUM_INTERFACES,
};
use crate::usb::{EndpointAddress, UsbDirection};

const MAX_ENDPOINT_NUMBER: usize = 15;

/// Holding area for one synthesized IN payload awaiting host pickup.
///
/// `valid_len == 0` means the buffer is empty; the bytes beyond `valid_len` are stale.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StagingBuffer {
    payload: Vec<u8>,
    valid_len: usize,
}

impl StagingBuffer {
    pub fn valid_len(&self) -> usize {
        self.valid_len
    }

    pub fn is_empty(&self) -> bool {
        self.valid_len == 0
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.valid_len]
    }

    pub fn stage(&mut self, payload: Vec<u8>) {
        self.valid_len = payload.len();
        self.payload = payload;
    }

    pub fn clear(&mut self) {
        self.valid_len = 0;
    }

    /// Copies up to `buf.len()` staged bytes into `buf` and empties the buffer.
    pub fn take_into(&mut self, buf: &mut [u8]) -> Option<usize> {
        if self.valid_len == 0 {
            return None;
        }
        let len = buf.len().min(self.valid_len);
        buf[..len].copy_from_slice(&self.payload[..len]);
        self.valid_len = 0;
        Some(len)
    }
}

/// Mutable per-device protocol state. One instance per attached device.
#[derive(Clone, Debug)]
pub struct DeviceState {
    pub address: u8,
    pub configuration: u8,
    pub remote_wakeup_enabled: bool,
    alt_setting: [u8; NUM_INTERFACES],
    halted: [[bool; MAX_ENDPOINT_NUMBER + 1]; 2],
    in_staging: [StagingBuffer; FUNCTION_ENDPOINTS.len()],
    in_cursor: usize,
}

impl DeviceState {
    pub fn new() -> Self {
        Self {
            address: 0,
            configuration: 0,
            remote_wakeup_enabled: false,
            alt_setting: [ALT_SETTING_OUT; NUM_INTERFACES],
            halted: [[false; MAX_ENDPOINT_NUMBER + 1]; 2],
            in_staging: Default::default(),
            in_cursor: 0,
        }
    }

    pub fn alt_setting(&self, interface: u8) -> Option<u8> {
        self.alt_setting.get(interface as usize).copied()
    }

    pub(crate) fn set_alt_setting(&mut self, interface: u8, alt: u8) -> bool {
        match self.alt_setting.get_mut(interface as usize) {
            Some(slot) => {
                *slot = alt;
                true
            }
            None => false,
        }
    }

    fn halt_slot(ep: EndpointAddress) -> (usize, usize) {
        let dir = match ep.direction() {
            UsbDirection::Out => 0,
            UsbDirection::In => 1,
        };
        (dir, ep.number() as usize)
    }

    /// Halt flag for `ep`, or `None` if the endpoint is not declared by this device.
    pub fn endpoint_halted(&self, ep: EndpointAddress) -> Option<bool> {
        if !is_declared_endpoint(ep) {
            return None;
        }
        let (dir, num) = Self::halt_slot(ep);
        Some(self.halted[dir][num])
    }

    pub(crate) fn set_endpoint_halted(&mut self, ep: EndpointAddress, halted: bool) -> bool {
        if !is_declared_endpoint(ep) {
            return false;
        }
        let (dir, num) = Self::halt_slot(ep);
        self.halted[dir][num] = halted;
        true
    }

    pub(crate) fn clear_all_halts(&mut self) {
        self.halted = [[false; MAX_ENDPOINT_NUMBER + 1]; 2];
    }

    fn staging_index(endpoint_number: u8) -> Option<usize> {
        FUNCTION_ENDPOINTS
            .iter()
            .position(|(num, _)| *num == endpoint_number)
    }

    pub fn in_staging(&self, endpoint_number: u8) -> Option<&StagingBuffer> {
        self.in_staging.get(Self::staging_index(endpoint_number)?)
    }

    pub(crate) fn in_staging_mut(&mut self, endpoint_number: u8) -> Option<&mut StagingBuffer> {
        let idx = Self::staging_index(endpoint_number)?;
        self.in_staging.get_mut(idx)
    }

    pub(crate) fn clear_in_staging(&mut self) {
        for buf in &mut self.in_staging {
            buf.clear();
        }
    }

    pub fn in_cursor(&self) -> usize {
        self.in_cursor
    }

    /// Returns the endpoint the cursor points at and advances the cursor.
    pub(crate) fn next_round_robin_endpoint(&mut self) -> u8 {
        let idx = self.in_cursor % FUNCTION_ENDPOINTS.len();
        self.in_cursor = (idx + 1) % FUNCTION_ENDPOINTS.len();
        FUNCTION_ENDPOINTS[idx].0
    }

    /// Bus reset. Halt flags are cleared along with the rest of the protocol state; the
    /// round-robin cursor is left where it was.
    pub fn reset(&mut self) {
        self.address = 0;
        self.configuration = 0;
        self.remote_wakeup_enabled = false;
        self.alt_setting = [ALT_SETTING_OUT; NUM_INTERFACES];
        self.clear_all_halts();
        self.clear_in_staging();
    }
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staged_payload_is_consumed_once() {
        let mut buf = StagingBuffer::default();
        buf.stage(vec![1, 2, 3, 4]);
        let mut out = [0u8; 2];
        assert_eq!(buf.take_into(&mut out), Some(2));
        assert_eq!(out, [1, 2]);
        assert!(buf.is_empty());
        assert_eq!(buf.take_into(&mut out), None);
    }

    #[test]
    fn undeclared_endpoints_have_no_halt_flag() {
        let mut state = DeviceState::new();
        let ep4 = EndpointAddress::new(4, UsbDirection::In);
        assert_eq!(state.endpoint_halted(ep4), None);
        assert!(!state.set_endpoint_halted(ep4, true));

        let ep2_out = EndpointAddress::new(2, UsbDirection::Out);
        assert!(state.set_endpoint_halted(ep2_out, true));
        assert_eq!(state.endpoint_halted(ep2_out), Some(true));
        assert_eq!(
            state.endpoint_halted(EndpointAddress::new(2, UsbDirection::In)),
            Some(false)
        );
    }

    #[test]
    fn round_robin_cycles_through_functional_endpoints() {
        let mut state = DeviceState::new();
        let order: Vec<u8> = (0..4).map(|_| state.next_round_robin_endpoint()).collect();
        assert_eq!(order, vec![1, 2, 3, 1]);
        assert_eq!(state.in_cursor(), 1);
    }

    #[test]
    fn reset_restores_initial_values() {
        let mut state = DeviceState::new();
        state.address = 9;
        state.configuration = 1;
        state.remote_wakeup_enabled = true;
        state.set_alt_setting(0, 1);
        state.set_endpoint_halted(EndpointAddress::new(1, UsbDirection::In), true);
        state.in_staging_mut(3).unwrap().stage(vec![0; 16]);

        state.reset();

        assert_eq!(state.address, 0);
        assert_eq!(state.configuration, 0);
        assert!(!state.remote_wakeup_enabled);
        assert_eq!(state.alt_setting(0), Some(0));
        assert_eq!(
            state.endpoint_halted(EndpointAddress::new(1, UsbDirection::In)),
            Some(false)
        );
        assert!(state.in_staging(3).unwrap().is_empty());
    }
}
