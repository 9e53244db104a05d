//! # Compute Device Selection
//!
//! Maps a requested [`Delegate`] onto a concrete candle [`Device`].
//!
//! ## GPU Policy:
//! The `gpu` delegate is only attempted when the host is GPU-capable. Capability
//! is either declared in configuration (`performance.gpu_capability`) or detected
//! once by probing CUDA and Metal device 0. On an incapable host the CPU is
//! substituted and a warning string is returned instead of an error, so the
//! session can report requested-vs-applied drift to the browser.

use candle_core::Device;
use serde::Serialize;
use std::sync::OnceLock;
use tracing::{debug, info};

use crate::vision::Delegate;

/// Probed GPU device, cached for the life of the process
static GPU_DEVICE: OnceLock<Option<Device>> = OnceLock::new();

/// How the host's GPU capability is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuCapability {
    /// Probe CUDA, then Metal
    #[default]
    Auto,
    /// Declared capable; the device is still probed and a failed probe falls back to CPU
    Available,
    /// Declared incapable; never touch a GPU
    Unavailable,
}

impl std::str::FromStr for GpuCapability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" | "detect" => Ok(GpuCapability::Auto),
            "available" | "yes" | "true" => Ok(GpuCapability::Available),
            "unavailable" | "no" | "false" | "cpu" => Ok(GpuCapability::Unavailable),
            _ => Err(format!("Unknown GPU capability: {}", s)),
        }
    }
}

/// Outcome of mapping a delegate onto a device.
#[derive(Debug, Clone)]
pub struct DeviceSelection {
    pub device: Device,
    pub delegate: Delegate,
    pub warning: Option<String>,
}

pub struct DeviceManager;

impl DeviceManager {
    /// Pick the device for `requested`, substituting CPU when the host cannot serve a GPU.
    pub fn resolve_delegate(requested: Delegate, capability: GpuCapability) -> DeviceSelection {
        if requested == Delegate::Cpu {
            return DeviceSelection {
                device: Device::Cpu,
                delegate: Delegate::Cpu,
                warning: None,
            };
        }

        let gpu = match capability {
            GpuCapability::Unavailable => None,
            GpuCapability::Auto | GpuCapability::Available => Self::gpu_device(),
        };

        match gpu {
            Some(device) => DeviceSelection {
                device,
                delegate: Delegate::Gpu,
                warning: None,
            },
            None => DeviceSelection {
                device: Device::Cpu,
                delegate: Delegate::Cpu,
                warning: Some("GPU delegate is not available on this host; using CPU".to_string()),
            },
        }
    }

    pub fn is_gpu_capable(capability: GpuCapability) -> bool {
        match capability {
            GpuCapability::Unavailable => false,
            GpuCapability::Auto | GpuCapability::Available => Self::gpu_device().is_some(),
        }
    }

    fn gpu_device() -> Option<Device> {
        GPU_DEVICE.get_or_init(Self::probe_gpu).clone()
    }

    fn probe_gpu() -> Option<Device> {
        info!("Probing for a GPU compute device...");

        match Device::new_cuda(0) {
            Ok(device) => {
                info!("CUDA device 0 available");
                return Some(device);
            }
            Err(e) => debug!("CUDA not available: {}", e),
        }

        match Device::new_metal(0) {
            Ok(device) => {
                info!("Metal device 0 available");
                Some(device)
            }
            Err(e) => {
                debug!("Metal not available: {}", e);
                info!("No GPU found, gpu delegate requests will run on CPU");
                None
            }
        }
    }

    pub fn device_name(device: &Device) -> &'static str {
        match device {
            Device::Cpu => "CPU",
            Device::Cuda(_) => "CUDA GPU",
            Device::Metal(_) => "Metal GPU",
        }
    }

    pub fn summary(capability: GpuCapability) -> DeviceSummary {
        let gpu_available = Self::is_gpu_capable(capability);
        let gpu_device = if gpu_available {
            Self::gpu_device().map(|d| Self::device_name(&d).to_string())
        } else {
            None
        };

        DeviceSummary {
            gpu_available,
            gpu_device,
            declared: format!("{:?}", capability).to_lowercase(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceSummary {
    pub gpu_available: bool,
    pub gpu_device: Option<String>,
    /// Configured capability mode (`auto`, `available`, `unavailable`)
    pub declared: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_capability_parsing() {
        assert_eq!("auto".parse::<GpuCapability>().unwrap(), GpuCapability::Auto);
        assert_eq!("Available".parse::<GpuCapability>().unwrap(), GpuCapability::Available);
        assert_eq!("unavailable".parse::<GpuCapability>().unwrap(), GpuCapability::Unavailable);
        assert!("sometimes".parse::<GpuCapability>().is_err());
    }

    #[test]
    fn test_cpu_request_never_warns() {
        let selection = DeviceManager::resolve_delegate(Delegate::Cpu, GpuCapability::Auto);
        assert!(matches!(selection.device, Device::Cpu));
        assert_eq!(selection.delegate, Delegate::Cpu);
        assert!(selection.warning.is_none());
    }

    #[test]
    fn test_gpu_request_on_incapable_host_falls_back() {
        let selection = DeviceManager::resolve_delegate(Delegate::Gpu, GpuCapability::Unavailable);
        assert!(matches!(selection.device, Device::Cpu));
        assert_eq!(selection.delegate, Delegate::Cpu);
        assert!(selection.warning.is_some());
    }

    #[test]
    fn test_summary_reports_declared_mode() {
        let summary = DeviceManager::summary(GpuCapability::Unavailable);
        assert!(!summary.gpu_available);
        assert!(summary.gpu_device.is_none());
        assert_eq!(summary.declared, "unavailable");
    }
}
