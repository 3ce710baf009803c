//! Devices and the registry that resolves the default compute target.

use crate::config::ConfigError;
use crate::runtime::backend::{Backend, RuntimeError};
use crate::runtime::cpu_backend::CpuBackend;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

/// Where a buffer lives.
///
/// `Host` holds literal data handed over by the program. It is a source for
/// copies and never executes operations itself.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Device {
    Host,
    Cpu,
}

impl Device {
    pub const ALL: [Device; 2] = [Device::Host, Device::Cpu];

    pub fn name(self) -> &'static str {
        match self {
            Device::Host => "HOST",
            Device::Cpu => "CPU",
        }
    }

    pub fn is_compute(self) -> bool {
        !matches!(self, Device::Host)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Device {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Device::ALL
            .iter()
            .copied()
            .find(|d| d.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::UnknownDevice(s.to_string()))
    }
}

/// Set of devices that have an execution backend.
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    backends: Vec<Rc<dyn Backend>>,
}

impl DeviceRegistry {
    /// Registry with the CPU backend.
    pub fn new() -> Self {
        let mut registry = Self { backends: Vec::new() };
        registry.register(Rc::new(CpuBackend::new()));
        registry
    }

    /// Adds a backend, replacing any previous one for the same device.
    pub fn register(&mut self, backend: Rc<dyn Backend>) {
        let device = backend.device();
        self.backends.retain(|b| b.device() != device);
        self.backends.push(backend);
    }

    pub fn backend(&self, device: Device) -> Result<Rc<dyn Backend>, RuntimeError> {
        self.backends
            .iter()
            .find(|b| b.device() == device)
            .cloned()
            .ok_or(RuntimeError::NoBackend(device))
    }

    pub fn is_available(&self, device: Device) -> bool {
        self.backends.iter().any(|b| b.device() == device)
    }

    pub fn devices(&self) -> impl Iterator<Item = Device> + '_ {
        self.backends.iter().map(|b| b.device())
    }

    /// Picks the default compute device.
    ///
    /// An explicit preference must name an available compute device. Without one,
    /// the available compute device with the highest backend priority wins.
    pub fn resolve_default(&self, preferred: Option<Device>) -> Result<Device, ConfigError> {
        if let Some(device) = preferred {
            if device.is_compute() && self.is_available(device) {
                return Ok(device);
            }
            return Err(ConfigError::DeviceUnavailable(device));
        }
        self.backends
            .iter()
            .filter(|b| b.device().is_compute())
            .max_by_key(|b| b.priority())
            .map(|b| b.device())
            .ok_or(ConfigError::NoComputeDevice)
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
