pub mod sampler;

pub use sampler::{bootstrap, check_support, Sample, Sampler};
