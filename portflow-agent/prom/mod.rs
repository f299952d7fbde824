pub mod port;

pub use port::PortMetricExporter;
