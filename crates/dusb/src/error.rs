use thiserror::Error;

use crate::usb::UsbDirection;

/// Failure to bring a device into existence.
#[derive(Debug, Error)]
pub enum RealizeError {
    #[error("control endpoint missing ({direction:?} endpoint 0 not provided by the bus)")]
    ControlEndpointMissing { direction: UsbDirection },

    #[error("invalid device configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid device properties: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{field} must be non-zero")]
    ZeroInterval { field: &'static str },
}
