//! Architecture-specific register definitions
//!
//! Core PMU event codes and register tables differ between Intel
//! microarchitectures. Only one generation is validated today.
//!
//! ## Supported Architectures
//!
//! - **Sandy Bridge** (`sandybridge` feature) - family 0x06, model 0x2A

#[cfg(feature = "sandybridge")]
pub mod sandybridge;
