pub mod processor;
pub mod stats;

pub use processor::{BatchConfig, BatchError, BatchProcessor};
pub use stats::BatchStats;
