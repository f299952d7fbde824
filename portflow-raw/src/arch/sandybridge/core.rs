//! Core PMU register definitions for Sandy Bridge
//!
//! General-purpose performance counters and the execution-port dispatch
//! events used to measure port pressure.
//!
//! ## References
//!
//! - Intel® 64 and IA-32 Architectures Software Developer's Manual, Volume 3B
//! - Chapter 18: Performance Monitoring

use crate::register::RegisterLayout;

/// Number of entries in the PERFEVTSEL/PMC address tables
pub const CORE_PMU_SLOTS: usize = 8;

/// MSR addresses for Core PMU
pub mod msr {
    use super::CORE_PMU_SLOTS;

    /// Performance Event Select registers (IA32_PERFEVTSELx), indexed by slot
    pub const IA32_PERFEVTSEL: [u64; CORE_PMU_SLOTS] =
        [0x186, 0x187, 0x188, 0x189, 0x18A, 0x18B, 0x18C, 0x18D];

    /// Performance Counter registers (IA32_PMCx), indexed by slot
    pub const IA32_PMC: [u64; CORE_PMU_SLOTS] = [0xC1, 0xC2, 0xC3, 0xC4, 0xC5, 0xC6, 0xC7, 0xC8];
}

/// Event codes for micro-ops dispatched on each execution port
///
/// `UOPS_DISPATCHED_PORT.PORT_n`: counts cycles in which at least one uop
/// was dispatched on port n.
pub mod events {
    pub const UOPS_DISPATCHED_PORT: u8 = 0xA1;

    pub const PORT_0: u8 = 0x01;
    pub const PORT_1: u8 = 0x02;
    pub const PORT_2: u8 = 0x0C;
    pub const PORT_3: u8 = 0x30;
    pub const PORT_4: u8 = 0x40;
    pub const PORT_5: u8 = 0x80;
}

/// Bit fields of IA32_PERFEVTSELx
pub mod fields {
    use crate::register::Field;

    pub const EVENT_SELECT: Field = Field::new(0, 8);
    pub const UMASK: Field = Field::new(8, 8);
    pub const USR: Field = Field::bit(16);
    pub const OS: Field = Field::bit(17);
    pub const EDGE: Field = Field::bit(18);
    pub const PC: Field = Field::bit(19);
    pub const INT: Field = Field::bit(20);
    pub const ANY_THREAD: Field = Field::bit(21);
    pub const ENABLE: Field = Field::bit(22);
    pub const INVERT: Field = Field::bit(23);
    pub const CMASK: Field = Field::new(24, 8);
}

/// Core Performance Event Select Register layout
///
/// ## Register Format
///
/// | Bits   | Field       | Description                    |
/// |--------|-------------|--------------------------------|
/// | 0-7    | event_select| Event select                   |
/// | 8-15   | umask       | Unit mask                      |
/// | 16     | usr         | User mode                      |
/// | 17     | os          | OS mode                        |
/// | 18     | edge        | Edge detect                    |
/// | 19     | pc          | Pin control                    |
/// | 20     | int         | APIC interrupt enable          |
/// | 21     | any_thread  | Any thread                     |
/// | 22     | enable      | Enable counter                 |
/// | 23     | invert      | Invert counter mask            |
/// | 24-31  | cmask       | Counter mask                   |
/// | 32-63  | reserved    | Must be zero                   |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerfEvtSel {
    pub event_select: u8,
    pub umask: u8,
    pub usr: bool,
    pub os: bool,
    pub edge: bool,
    pub pc: bool,
    pub int: bool,
    pub any_thread: bool,
    pub enable: bool,
    pub invert: bool,
    pub cmask: u8,
}

impl PerfEvtSel {
    /// Configuration that counts `event`/`umask` in both privilege levels,
    /// aggregated across the hyper-thread siblings of the core.
    pub fn counting_any_thread(event_select: u8, umask: u8) -> Self {
        Self {
            event_select,
            umask,
            usr: true,
            os: true,
            any_thread: true,
            enable: true,
            ..Default::default()
        }
    }
}

impl RegisterLayout for PerfEvtSel {
    fn to_msr_value(&self) -> u64 {
        let mut value = 0u64;
        value = fields::EVENT_SELECT.insert(value, self.event_select as u64);
        value = fields::UMASK.insert(value, self.umask as u64);
        value = fields::USR.set(value, self.usr);
        value = fields::OS.set(value, self.os);
        value = fields::EDGE.set(value, self.edge);
        value = fields::PC.set(value, self.pc);
        value = fields::INT.set(value, self.int);
        value = fields::ANY_THREAD.set(value, self.any_thread);
        value = fields::ENABLE.set(value, self.enable);
        value = fields::INVERT.set(value, self.invert);
        fields::CMASK.insert(value, self.cmask as u64)
    }

    fn from_msr_value(value: u64) -> Self {
        Self {
            event_select: fields::EVENT_SELECT.extract(value) as u8,
            umask: fields::UMASK.extract(value) as u8,
            usr: fields::USR.is_set(value),
            os: fields::OS.is_set(value),
            edge: fields::EDGE.is_set(value),
            pc: fields::PC.is_set(value),
            int: fields::INT.is_set(value),
            any_thread: fields::ANY_THREAD.is_set(value),
            enable: fields::ENABLE.is_set(value),
            invert: fields::INVERT.is_set(value),
            cmask: fields::CMASK.extract(value) as u8,
        }
    }

    fn validate(&self) -> Result<(), &'static str> {
        if self.int {
            return Err("PMI delivery is not handled; interrupt enable must be clear");
        }
        if self.enable && self.event_select == 0 {
            return Err("enabled counter has no event selected");
        }
        Ok(())
    }
}

/// Mask covering every defined PERFEVTSEL bit; anything above is reserved
pub const PERFEVTSEL_DEFINED_BITS: u64 = (1u64 << 32) - 1;
