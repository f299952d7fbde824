pub mod calculator;
pub mod types;

pub use calculator::{counter_delta, utilization};
pub use types::PortMetric;
