//! Packet-level endpoint-0 pipe.
//!
//! Bus simulators that deliver individual SETUP/IN/OUT transactions rather than whole control
//! transfers drive the device through [`DusbDevice::handle_setup`], [`DusbDevice::handle_in`]
//! and [`DusbDevice::handle_out`]. Requests resolve through the same dispatcher as
//! [`DusbDevice::handle_control`]. SET_ADDRESS and SET_CONFIGURATION are committed when the
//! status stage completes; a new SETUP or a bus reset before then discards them.

use crate::control::PendingCommit;
use crate::device::DusbDevice;
use crate::host::UsbHost;
use crate::usb::{ControlResponse, RequestDirection, SetupPacket, UsbDirection, UsbHandshake};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Ep0Stage {
    Idle,
    DataIn,
    DataOut,
    StatusIn,
    StatusOut,
}

#[derive(Debug)]
pub(crate) struct Ep0Control {
    stage: Ep0Stage,
    setup: Option<SetupPacket>,
    in_data: Vec<u8>,
    in_offset: usize,
    out_expected: usize,
    out_data: Vec<u8>,
    stalled: bool,
    /// Applied when the status stage completes; dropped if a new SETUP arrives first.
    pending: PendingCommit,
}

impl Ep0Control {
    pub(crate) fn new() -> Self {
        Self {
            stage: Ep0Stage::Idle,
            setup: None,
            in_data: Vec::new(),
            in_offset: 0,
            out_expected: 0,
            out_data: Vec::new(),
            stalled: false,
            pending: PendingCommit::default(),
        }
    }

    fn begin(&mut self, setup: SetupPacket) {
        self.setup = Some(setup);
        self.in_data.clear();
        self.in_offset = 0;
        self.out_expected = 0;
        self.out_data.clear();
        self.stalled = false;
        self.pending = PendingCommit::default();

        if setup.w_length == 0 {
            self.stage = Ep0Stage::StatusIn;
            return;
        }

        match setup.request_direction() {
            RequestDirection::DeviceToHost => self.stage = Ep0Stage::DataIn,
            RequestDirection::HostToDevice => {
                self.stage = Ep0Stage::DataOut;
                self.out_expected = setup.w_length as usize;
            }
        }
    }

    fn finish(&mut self) {
        self.stage = Ep0Stage::Idle;
        self.setup = None;
    }
}

impl DusbDevice {
    /// Starts a control transfer. A new SETUP abandons any transfer already in flight.
    ///
    /// Requests without an OUT data stage are resolved immediately; a rejected request stalls
    /// the following data or status stage. Address and configuration changes only take effect
    /// once the status stage completes.
    pub fn handle_setup(&mut self, host: &mut dyn UsbHost, setup: SetupPacket) {
        self.ep0.begin(setup);

        if self.ep0.stage == Ep0Stage::DataOut {
            return;
        }

        let (resp, pending) = self.dispatch_control(host, &setup, &[]);
        match resp {
            ControlResponse::Data(mut data) => {
                if setup.request_direction() != RequestDirection::DeviceToHost {
                    self.ep0.stalled = true;
                    return;
                }
                data.truncate(setup.w_length as usize);
                if data.is_empty() {
                    self.ep0.stage = Ep0Stage::StatusOut;
                }
                self.ep0.in_data = data;
            }
            ControlResponse::Ack => {
                self.ep0.pending = pending;
                if self.ep0.stage == Ep0Stage::DataIn {
                    // Acknowledged without data: go straight to the status stage.
                    self.ep0.stage = Ep0Stage::StatusOut;
                }
            }
            ControlResponse::Stall => self.ep0.stalled = true,
        }
    }

    /// IN transaction. Endpoint 0 advances the control pipe; other endpoints go to the data
    /// engine.
    pub fn handle_in(&mut self, ep: u8, buf: &mut [u8]) -> UsbHandshake {
        if ep != 0 {
            return self.handle_data(ep, UsbDirection::In, buf);
        }
        if self.ep0.stalled {
            return UsbHandshake::Stall;
        }

        match self.ep0.stage {
            Ep0Stage::DataIn => {
                let ep0 = &mut self.ep0;
                let remaining = ep0.in_data.len().saturating_sub(ep0.in_offset);
                let len = buf.len().min(remaining);
                buf[..len].copy_from_slice(&ep0.in_data[ep0.in_offset..ep0.in_offset + len]);
                ep0.in_offset += len;
                if ep0.in_offset >= ep0.in_data.len() {
                    ep0.stage = Ep0Stage::StatusOut;
                }
                UsbHandshake::Ack { bytes: len }
            }
            Ep0Stage::StatusIn => {
                let pending = core::mem::take(&mut self.ep0.pending);
                pending.apply(self.state_mut());
                self.ep0.finish();
                UsbHandshake::Ack { bytes: 0 }
            }
            _ => UsbHandshake::Nak,
        }
    }

    /// OUT transaction. Endpoint 0 advances the control pipe; other endpoints go to the data
    /// engine.
    pub fn handle_out(&mut self, host: &mut dyn UsbHost, ep: u8, data: &[u8]) -> UsbHandshake {
        if ep != 0 {
            let mut payload = data.to_vec();
            return self.handle_data(ep, UsbDirection::Out, &mut payload);
        }
        if self.ep0.stalled {
            return UsbHandshake::Stall;
        }

        match self.ep0.stage {
            Ep0Stage::DataOut => {
                self.ep0.out_data.extend_from_slice(data);
                if self.ep0.out_data.len() >= self.ep0.out_expected {
                    let Some(setup) = self.ep0.setup else {
                        return UsbHandshake::Stall;
                    };
                    let out_data = core::mem::take(&mut self.ep0.out_data);
                    match self.dispatch_control(host, &setup, &out_data) {
                        (ControlResponse::Ack, pending) => {
                            self.ep0.pending = pending;
                            self.ep0.stage = Ep0Stage::StatusIn;
                        }
                        (ControlResponse::Data(_) | ControlResponse::Stall, _) => {
                            self.ep0.stalled = true;
                            return UsbHandshake::Stall;
                        }
                    }
                }
                UsbHandshake::Ack { bytes: data.len() }
            }
            Ep0Stage::StatusOut => {
                self.ep0.finish();
                UsbHandshake::Ack { bytes: 0 }
            }
            _ => UsbHandshake::Nak,
        }
    }
}
