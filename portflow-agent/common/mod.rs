pub mod cpuid;
pub mod msr;
pub mod platform;
pub mod topology;

pub use cpuid::{CpuSignature, PmcCapabilities};
pub use msr::RegisterAccess;
pub use platform::{CpuIdentity, HostPlatform, Platform};
pub use topology::{LogicalCpu, Topology};
