use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::common::topology::CPUINFO_PATH;
use crate::error::{PortflowError, Result};

pub const DEFAULT_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Suspension between ticks
    pub interval: Duration,
    /// Topology source, normally /proc/cpuinfo
    pub cpuinfo_path: PathBuf,
    /// Stop after this many samples; run until stopped when unset
    pub max_ticks: Option<u64>,
    /// Address to serve Prometheus metrics on
    pub listen: Option<SocketAddr>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_INTERVAL_MS),
            cpuinfo_path: PathBuf::from(CPUINFO_PATH),
            max_ticks: None,
            listen: None,
        }
    }
}

impl SamplerConfig {
    /// Create a configuration, rejecting a zero interval or tick budget
    pub fn new(
        interval_ms: u64,
        cpuinfo_path: PathBuf,
        max_ticks: Option<u64>,
        listen: Option<SocketAddr>,
    ) -> Result<Self> {
        if interval_ms == 0 {
            return Err(PortflowError::Config(
                "sampling interval must be at least 1 ms".to_string(),
            ));
        }
        if max_ticks == Some(0) {
            return Err(PortflowError::Config(
                "tick count must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            interval: Duration::from_millis(interval_ms),
            cpuinfo_path,
            max_ticks,
            listen,
        })
    }
}
