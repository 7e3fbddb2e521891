//! Backend/device selection (§6 "Backend selection").
//!
//! The library ships one concrete device (`Cpu`, backed by
//! `arrayjit_backend::CpuBackend`); the GPU-compute path is an external
//! collaborator (§1) and is not implemented here. The surface is still the
//! full one §6 asks for: a reversible process-wide default and a one-time
//! probe of what's available.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use arrayjit_backend::CpuBackend;

/// A device identifier. Only `Cpu` has a backing implementation; the
/// variant list documents the shape a GPU-compute addition would take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Device {
    Cpu = 0,
}

impl Device {
    fn from_u8(v: u8) -> Device {
        match v {
            0 => Device::Cpu,
            _ => unreachable!("no other device is ever stored"),
        }
    }
}

static DEFAULT_DEVICE: AtomicU8 = AtomicU8::new(Device::Cpu as u8);
static CPU_BACKEND: OnceLock<Arc<CpuBackend>> = OnceLock::new();

/// Returns the process-wide default device.
pub fn default_device() -> Device {
    Device::from_u8(DEFAULT_DEVICE.load(Ordering::SeqCst))
}

/// Sets the process-wide default device, returning the prior value so the
/// change can be undone (§6: "the setter returns the prior value and is
/// reversible").
pub fn set_default_device(device: Device) -> Device {
    let prior = DEFAULT_DEVICE.swap(device as u8, Ordering::SeqCst);
    Device::from_u8(prior)
}

/// The devices available in this process. Probed once; in this build that
/// probe is trivial (`Cpu` always exists), but the one-shot shape is what
/// §6 specifies so a future GPU probe slots in without an API change.
pub fn available_devices() -> &'static [Device] {
    &[Device::Cpu]
}

/// Resolves a `Device` to its backend singleton, cheaply cloned (it's an
/// `Arc`).
pub fn cpu_backend() -> Arc<CpuBackend> {
    CPU_BACKEND.get_or_init(|| Arc::new(CpuBackend::new())).clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_default_device_is_reversible() {
        let prior = set_default_device(Device::Cpu);
        assert_eq!(prior, Device::Cpu);
        assert_eq!(default_device(), Device::Cpu);
    }
}
