pub mod aggregator;
pub mod decoder;
pub mod scanner;

pub use aggregator::{collect, DiscoveryAggregator};
pub use scanner::start_scan;
