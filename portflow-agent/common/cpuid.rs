// CPUID and timestamp-counter queries

/// Leaf returning family/model/stepping in EAX
pub const LEAF_SIGNATURE: u32 = 0x01;

/// Leaf returning the architectural performance monitoring descriptor in EAX
pub const LEAF_ARCH_PERFMON: u32 = 0x0A;

#[cfg(target_arch = "x86_64")]
pub fn cpuid(eax: u32, ecx: u32) -> (u32, u32, u32, u32) {
    let mut ebx: u32;
    let mut edx: u32;
    let mut eax_out = eax;
    let mut ecx_out = ecx;

    unsafe {
        std::arch::asm!(
            "mov {0:r}, rbx",
            "cpuid",
            "xchg {0:r}, rbx",
            out(reg) ebx,
            inout("eax") eax_out,
            inout("ecx") ecx_out,
            out("edx") edx,
            options(nostack, preserves_flags)
        );
    }

    (eax_out, ebx, ecx_out, edx)
}

#[cfg(not(target_arch = "x86_64"))]
pub fn cpuid(_eax: u32, _ecx: u32) -> (u32, u32, u32, u32) {
    (0, 0, 0, 0)
}

/// Read the timestamp counter
#[cfg(target_arch = "x86_64")]
pub fn rdtsc() -> u64 {
    unsafe { std::arch::x86_64::_rdtsc() }
}

#[cfg(not(target_arch = "x86_64"))]
pub fn rdtsc() -> u64 {
    0
}

/// Display family/model/stepping decoded from CPUID.01H:EAX
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuSignature {
    pub family: u32,
    pub model: u32,
    pub stepping: u32,
}

/// Decode CPUID.01H:EAX into display family and model
///
/// The extended family only contributes when the base family is 0xF, and the
/// extended model only when the base family is 0x6 or 0xF.
pub fn decode_signature(eax: u32) -> CpuSignature {
    let stepping = eax & 0xF;
    let model = (eax >> 4) & 0xF;
    let family = (eax >> 8) & 0xF;
    let extended_model = (eax >> 16) & 0xF;
    let extended_family = (eax >> 20) & 0xFF;

    let display_family = if family == 0xF {
        family + extended_family
    } else {
        family
    };

    let display_model = if family == 0x6 || family == 0xF {
        (extended_model << 4) + model
    } else {
        model
    };

    CpuSignature {
        family: display_family,
        model: display_model,
        stepping,
    }
}

/// Architectural performance monitoring capabilities (CPUID.0AH:EAX)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PmcCapabilities {
    /// EAX[7:0]
    pub version_id: u32,
    /// EAX[15:8], general-purpose counters per logical processor
    pub counters_per_logical_cpu: u32,
    /// EAX[23:16], bit width of a general-purpose counter
    pub counter_bit_width: u32,
}

impl PmcCapabilities {
    /// Mask of the bits a counter register actually implements
    pub fn counter_mask(&self) -> u64 {
        match self.counter_bit_width {
            width if width == 0 || width >= 64 => u64::MAX,
            width => (1u64 << width) - 1,
        }
    }
}

pub fn decode_pmc_leaf(eax: u32) -> PmcCapabilities {
    PmcCapabilities {
        version_id: eax & 0xFF,
        counters_per_logical_cpu: (eax >> 8) & 0xFF,
        counter_bit_width: (eax >> 16) & 0xFF,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(target_arch = "x86_64")]
    fn test_cpuid_reports_signature_leaf() {
        // Leaf 0 returns the highest basic leaf; every x86_64 part has leaf 1
        let (max_leaf, _ebx, _ecx, _edx) = cpuid(0, 0);
        assert!(max_leaf >= LEAF_SIGNATURE);

        let (eax, _ebx, _ecx, _edx) = cpuid(LEAF_SIGNATURE, 0);
        assert_ne!(decode_signature(eax).family, 0);
    }

    #[test]
    fn test_decode_sandy_bridge() {
        // Core i7-2600: family 6, extended model 2, model 0xA, stepping 7
        let sig = decode_signature(0x0002_06A7);
        assert_eq!(
            sig,
            CpuSignature {
                family: 6,
                model: 42,
                stepping: 7
            }
        );
    }

    #[test]
    fn test_decode_family_6_ignores_extended_family() {
        let sig = decode_signature((0x02 << 20) | (0x6 << 8));
        assert_eq!(sig.family, 6);
    }

    #[test]
    fn test_decode_family_f_adds_extended_family() {
        let sig = decode_signature((0x02 << 20) | (0xF << 8) | (0x3 << 16) | (0x1 << 4));
        assert_eq!(sig.family, 17);
        assert_eq!(sig.model, 0x31);
    }

    #[test]
    fn test_decode_other_family_ignores_extended_model() {
        let sig = decode_signature((0x5 << 16) | (0x5 << 8) | (0x2 << 4));
        assert_eq!(sig.family, 5);
        assert_eq!(sig.model, 2);
    }

    #[test]
    fn test_decode_is_idempotent() {
        let eax = 0x0003_06C3;
        assert_eq!(decode_signature(eax), decode_signature(eax));
    }

    #[test]
    fn test_decode_pmc_leaf() {
        let caps = decode_pmc_leaf(0x0730_0403);
        assert_eq!(caps.version_id, 3);
        assert_eq!(caps.counters_per_logical_cpu, 4);
        assert_eq!(caps.counter_bit_width, 48);
        assert_eq!(caps.counter_mask(), (1u64 << 48) - 1);
    }

    #[test]
    fn test_counter_mask_saturates() {
        let caps = PmcCapabilities {
            version_id: 3,
            counters_per_logical_cpu: 4,
            counter_bit_width: 64,
        };
        assert_eq!(caps.counter_mask(), u64::MAX);
    }
}
