//! Intel Sandy Bridge (client) register definitions
//!
//! ## Units
//!
//! - **Core** - general-purpose performance counters and the
//!   `UOPS_DISPATCHED_PORT` execution-port events
//!
//! ## References
//!
//! - Intel® 64 and IA-32 Architectures Software Developer's Manual, Volume 3B
//! - Chapter 19: Performance-Monitoring Events, Table 19-15

pub mod core;

/// Display family of the supported processors (CPUID.01H)
pub const CPU_FAMILY: u32 = 0x06;

/// Display model of the supported processors (CPUID.01H)
pub const CPU_MODEL: u32 = 0x2A;

/// Minimum architectural performance monitoring version (CPUID.0AH:EAX[7:0])
pub const MIN_PMU_VERSION: u32 = 3;
