//! Runtime configuration, read from the environment.
//!
//! `DEBUG=<n>` raises log verbosity (see [`crate::logging`]) and
//! `DEVICE=<name>` overrides the default compute device.

use crate::device::Device;
use std::env;
use thiserror::Error;

pub const DEBUG_VAR: &str = "DEBUG";
pub const DEVICE_VAR: &str = "DEVICE";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Unknown device '{0}'. Known devices: HOST, CPU.")]
    UnknownDevice(String),

    #[error("Device {0} is not available as a compute target. Set DEVICE (or --device) to a device with a registered backend.")]
    DeviceUnavailable(Device),

    #[error("No compute device is registered.")]
    NoComputeDevice,

    #[error("Invalid value '{value}' for {var}: expected a non-negative integer.")]
    InvalidDebugLevel { var: String, value: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    /// Preferred default device. `None` lets the registry choose.
    pub device: Option<Device>,
    /// Verbosity level, 0 is quiet.
    pub debug: u8,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let debug = match lookup(DEBUG_VAR) {
            Some(value) if !value.trim().is_empty() => {
                value
                    .trim()
                    .parse::<u8>()
                    .map_err(|_| ConfigError::InvalidDebugLevel {
                        var: DEBUG_VAR.to_string(),
                        value: value.clone(),
                    })?
            }
            _ => 0,
        };

        let device = match lookup(DEVICE_VAR) {
            Some(value) if !value.trim().is_empty() => Some(value.parse::<Device>()?),
            _ => None,
        };

        Ok(Self { device, debug })
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = Some(device);
        self
    }

    pub fn with_debug(mut self, debug: u8) -> Self {
        self.debug = debug;
        self
    }
}
