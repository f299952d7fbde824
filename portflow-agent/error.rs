use std::io;
use thiserror::Error;

use portflow_raw::MsrError;

#[derive(Error, Debug)]
pub enum PortflowError {
    #[error("MSR operation failed: {0}")]
    Msr(#[from] MsrError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unsupported hardware: {0}")]
    UnsupportedHardware(String),

    #[error("Missing CPU feature: {0}")]
    MissingFeature(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PortflowError>;
