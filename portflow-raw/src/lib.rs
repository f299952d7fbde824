//! # portflow-raw
//!
//! Hardware register definitions for Intel core execution-port monitoring.
//!
//! This crate provides an owned handle over MSR (Model-Specific Register)
//! device files, explicit bit-field packing for register layouts, and the
//! architecture-specific tables (PERFEVTSEL/PMC addresses, event codes) for
//! the supported CPU generation.
//!
//! ## Features
//!
//! - `sandybridge` (default) - Sandy Bridge (family 0x06, model 0x2A)
//!
//! ## Usage
//!
//! ```ignore
//! use portflow_raw::current_arch::core::{events, msr, PerfEvtSel};
//! use portflow_raw::{MsrDevice, RegisterLayout};
//!
//! let evtsel = PerfEvtSel::counting_any_thread(events::UOPS_DISPATCHED_PORT, events::PORT_0);
//! evtsel.validate()?;
//!
//! let mut device = MsrDevice::open(0)?;
//! device.write(msr::IA32_PERFEVTSEL[0], evtsel.to_msr_value())?;
//! device.write(msr::IA32_PMC[0], 0)?;
//! ```

pub mod arch;
pub mod msr;
pub mod register;

pub use msr::{MsrDevice, MsrError, Result};
pub use register::{Field, Register, RegisterLayout};

#[cfg(feature = "sandybridge")]
pub use arch::sandybridge as current_arch;
