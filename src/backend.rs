//! Device selection module.
//!
//! This module defines the compute devices a kernel can be registered for
//! and the process-wide default device used when an operator is run without
//! an explicit placement.
//!
//! # Supported Devices
//!
//! - `Cpu`: pure Rust kernels parallelized with `rayon` (default).
//! - `Wgpu`: GPU compute shaders through `wgpu` (requires the `wgpu` feature).
//!
//! The default device is stored globally using an `AtomicU8`, so it can be
//! switched cheaply between runs. It only influences which kernel is looked
//! up; a device without a registered kernel fails at dispatch.

use core::convert::TryFrom;
use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

/// Enumeration of devices a kernel can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Device {
    /// Generic CPU place (default).
    #[default]
    Cpu = 0,
    /// GPU place driven by `wgpu`.
    Wgpu,
}

impl TryFrom<u8> for Device {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Cpu),
            1 => Ok(Self::Wgpu),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => f.write_str("cpu"),
            Self::Wgpu => f.write_str("wgpu"),
        }
    }
}

/// Internal global state for the default device.
///
/// Expected to change between runs only, never during a kernel launch.
static GLOBAL_DEFAULT_DEVICE: AtomicU8 = AtomicU8::new(Device::Cpu as u8);

/// Sets the device used by [`Operator::run`](crate::operator::Operator::run).
///
/// # Example
///
/// ```
/// use momentum_op::backend::{default_device, set_default_device, Device};
/// set_default_device(Device::Cpu);
/// assert_eq!(default_device(), Device::Cpu);
/// ```
pub fn set_default_device(d: Device) {
    GLOBAL_DEFAULT_DEVICE.store(d as u8, Ordering::Release);
}

/// Returns the current default device.
///
/// If the stored value is invalid, defaults to [`Device::Cpu`].
pub fn default_device() -> Device {
    Device::try_from(GLOBAL_DEFAULT_DEVICE.load(Ordering::Acquire)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_round_trips_through_u8() {
        assert_eq!(Device::try_from(Device::Cpu as u8), Ok(Device::Cpu));
        assert_eq!(Device::try_from(Device::Wgpu as u8), Ok(Device::Wgpu));
        assert!(Device::try_from(7).is_err());
    }

    #[test]
    fn device_displays_lowercase_tag() {
        assert_eq!(Device::Cpu.to_string(), "cpu");
        assert_eq!(Device::Wgpu.to_string(), "wgpu");
    }
}
