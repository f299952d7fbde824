// Macros (must be first for visibility)
#[macro_use]
pub mod macros;

pub mod common;
pub mod config;
pub mod counters;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod prom;
pub mod report;

pub use config::SamplerConfig;
pub use error::{PortflowError, Result};
pub use orchestrator::{bootstrap, Sample, Sampler};
pub use prom::PortMetricExporter;
