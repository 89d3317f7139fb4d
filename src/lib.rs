pub mod assertions;
pub mod client;
pub mod config;
pub mod errors;
pub mod executor;
pub mod extractor;
pub mod metrics;
pub mod payloads;
pub mod percentiles;
pub mod plan;
pub mod report;
pub mod scenario;
pub mod utils;
pub mod worker;
