// Hardware queries behind a substitutable interface

use once_cell::sync::Lazy;

use crate::common::cpuid::{self, CpuSignature, PmcCapabilities};

/// Result of a single CPU identification query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuIdentity {
    pub signature: CpuSignature,
    pub pmc: PmcCapabilities,
}

/// Read-only hardware queries the sampler depends on
///
/// The host implementation executes CPUID/RDTSC; tests substitute scripted
/// values so programming and sampling run without privileged hardware.
pub trait Platform {
    /// Family/model/stepping of the running processor
    fn identify(&self) -> CpuSignature;

    /// Architectural performance monitoring descriptor
    fn pmc_capabilities(&self) -> PmcCapabilities;

    /// Current timestamp-counter value
    fn now(&self) -> u64;
}

static HOST_IDENTITY: Lazy<CpuIdentity> = Lazy::new(|| {
    let (signature_eax, _ebx, _ecx, _edx) = cpuid::cpuid(cpuid::LEAF_SIGNATURE, 0);
    let (perfmon_eax, _ebx, _ecx, _edx) = cpuid::cpuid(cpuid::LEAF_ARCH_PERFMON, 0);

    let identity = CpuIdentity {
        signature: cpuid::decode_signature(signature_eax),
        pmc: cpuid::decode_pmc_leaf(perfmon_eax),
    };
    tracing::debug!(
        "CPUID.01H:EAX = 0x{:08X}, CPUID.0AH:EAX = 0x{:08X}",
        signature_eax,
        perfmon_eax
    );
    identity
});

/// The processor this process is running on
#[derive(Debug, Clone, Copy, Default)]
pub struct HostPlatform;

impl Platform for HostPlatform {
    fn identify(&self) -> CpuSignature {
        HOST_IDENTITY.signature
    }

    fn pmc_capabilities(&self) -> PmcCapabilities {
        HOST_IDENTITY.pmc
    }

    fn now(&self) -> u64 {
        cpuid::rdtsc()
    }
}
