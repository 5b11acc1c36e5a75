use tracing::{debug, warn};

use crate::config::DusbConfig;
use crate::control::{self, ControlContext, PendingCommit};
use crate::data;
use crate::descriptor::negotiate_speed;
use crate::ep0::Ep0Control;
use crate::error::RealizeError;
use crate::host::{DeviceTimer, UsbHost};
use crate::producer::PeriodicInProducer;
use crate::state::DeviceState;
use crate::timer::TimerEvent;
use crate::usb::{
    ControlResponse, EndpointAddress, RequestDirection, SetupPacket, UsbDirection, UsbHandshake,
    UsbSpeed,
};
use crate::wakeup::RemoteWakeupScheduler;

/// Receives every accepted OUT payload after the data engine has consumed it.
pub type OutObserver = Box<dyn FnMut(EndpointAddress, &[u8])>;

/// Composite interrupt/isochronous/bulk device whose single interface switches between an
/// OUT-only and an IN-only personality through its alternate setting.
pub struct DusbDevice {
    config: DusbConfig,
    speed: UsbSpeed,
    state: DeviceState,
    producer: PeriodicInProducer,
    wakeup: RemoteWakeupScheduler,
    pub(crate) ep0: Ep0Control,
    out_observer: Option<OutObserver>,
}

impl DusbDevice {
    /// Brings the device up on `host`'s port.
    ///
    /// Fails if `config` has a zero interval or the bus has not materialized both directions of
    /// the default control pipe. On success the remote-wakeup timer is running.
    pub fn realize(
        host: &mut dyn UsbHost,
        speed_hint: UsbSpeed,
        config: DusbConfig,
    ) -> Result<Self, RealizeError> {
        if let Err(err) = config.validate() {
            warn!(%err, "invalid device configuration; cannot realize device");
            return Err(err.into());
        }
        for direction in [UsbDirection::Out, UsbDirection::In] {
            if host.get_endpoint(direction, 0).is_none() {
                warn!(?direction, "control endpoint missing; cannot realize device");
                return Err(RealizeError::ControlEndpointMissing { direction });
            }
        }

        let speed = negotiate_speed(speed_hint);
        let mut dev = Self {
            config,
            speed,
            state: DeviceState::new(),
            producer: PeriodicInProducer::new(config.in_interval_ms),
            wakeup: RemoteWakeupScheduler::new(config.wakeup_interval_ms),
            ep0: Ep0Control::new(),
            out_observer: None,
        };
        dev.wakeup.start(host);
        debug!(?speed, "device realized");
        Ok(dev)
    }

    /// Cancels every timer the device owns. Called when the device is removed from the bus.
    pub fn unrealize(&mut self, host: &mut dyn UsbHost) {
        self.producer.disarm(host);
        self.wakeup.stop(host);
    }

    pub fn config(&self) -> &DusbConfig {
        &self.config
    }

    pub fn speed(&self) -> UsbSpeed {
        self.speed
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub(crate) fn state_mut(&mut self) -> &mut DeviceState {
        &mut self.state
    }

    pub fn producer(&self) -> &PeriodicInProducer {
        &self.producer
    }

    pub fn wakeup_scheduler(&self) -> &RemoteWakeupScheduler {
        &self.wakeup
    }

    pub fn set_out_observer(&mut self, observer: OutObserver) {
        self.out_observer = Some(observer);
    }

    /// Resolves one request. Address and configuration changes come back uncommitted so the
    /// caller can apply them when the status stage completes.
    pub(crate) fn dispatch_control(
        &mut self,
        host: &mut dyn UsbHost,
        setup: &SetupPacket,
        data_out: &[u8],
    ) -> (ControlResponse, PendingCommit) {
        let mut ctx = ControlContext {
            state: &mut self.state,
            producer: &mut self.producer,
            host,
            speed: self.speed,
            pending: PendingCommit::default(),
        };
        let resp = control::dispatch(&mut ctx, setup, data_out);
        (resp, ctx.pending)
    }

    /// Handles a complete control transfer.
    ///
    /// For device-to-host requests the response is written to `data` (clipped to `wLength` and
    /// to `data.len()`) and its length is reported in the handshake. For host-to-device requests
    /// `data` holds the OUT data stage and the handshake reports zero bytes.
    pub fn handle_control(
        &mut self,
        host: &mut dyn UsbHost,
        setup: SetupPacket,
        data: &mut [u8],
    ) -> UsbHandshake {
        // A request-level transfer supersedes any packet-level one in flight.
        self.ep0 = Ep0Control::new();

        let (resp, pending) = match setup.request_direction() {
            RequestDirection::HostToDevice => {
                let len = data.len().min(setup.w_length as usize);
                self.dispatch_control(host, &setup, &data[..len])
            }
            RequestDirection::DeviceToHost => self.dispatch_control(host, &setup, &[]),
        };

        match resp {
            ControlResponse::Data(bytes) => {
                let len = bytes.len().min(data.len());
                data[..len].copy_from_slice(&bytes[..len]);
                UsbHandshake::Ack { bytes: len }
            }
            ControlResponse::Ack => {
                // The whole transfer, status stage included, completes here.
                pending.apply(&mut self.state);
                UsbHandshake::Ack { bytes: 0 }
            }
            ControlResponse::Stall => {
                debug!(
                    request = setup.request_code(),
                    value = setup.w_value,
                    index = setup.w_index,
                    "stalled control request"
                );
                UsbHandshake::Stall
            }
        }
    }

    /// Handles a data transfer on a functional endpoint.
    pub fn handle_data(
        &mut self,
        endpoint_number: u8,
        direction: UsbDirection,
        buf: &mut [u8],
    ) -> UsbHandshake {
        if endpoint_number > 0x0f {
            return UsbHandshake::Stall;
        }
        let ep = EndpointAddress::new(endpoint_number, direction);
        let result = data::transfer(&mut self.state, ep, buf);
        if let (UsbDirection::Out, UsbHandshake::Ack { bytes }) = (direction, result) {
            if let Some(observer) = self.out_observer.as_mut() {
                observer(ep, &buf[..bytes]);
            }
        }
        result
    }

    /// Bus reset: protocol state returns to its post-attach values and the IN producer is
    /// disarmed. The remote-wakeup timer keeps running.
    pub fn handle_reset(&mut self, host: &mut dyn UsbHost) {
        self.state.reset();
        self.producer.disarm(host);
        self.ep0 = Ep0Control::new();
        debug!("device reset");
    }

    /// Routes a fired timer to the activity that scheduled it.
    pub fn handle_timer(&mut self, host: &mut dyn UsbHost, event: &TimerEvent<DeviceTimer>) {
        match event.payload {
            DeviceTimer::InData => {
                self.producer.on_tick(event.id, &mut self.state, host);
            }
            DeviceTimer::RemoteWakeup => {
                self.wakeup.on_tick(event.id, &self.state, host);
            }
        }
    }
}

impl core::fmt::Debug for DusbDevice {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DusbDevice")
            .field("config", &self.config)
            .field("speed", &self.speed)
            .field("state", &self.state)
            .field("producer", &self.producer)
            .field("wakeup", &self.wakeup)
            .field("out_observer", &self.out_observer.is_some())
            .finish()
    }
}
