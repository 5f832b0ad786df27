pub mod config;
pub mod corpus;
pub mod errors;
pub mod metrics;
pub mod results;
pub mod scan;

pub use config::{ConcurrencyModel, ConfigOverrides, EncodingMode, ScanConfig, WorkerCommand};
pub use errors::{ScanError, ScanResult};
pub use results::{AggregateResult as ScanOutput, CollectionStatus, PartialResult};
pub use scan::scan;
