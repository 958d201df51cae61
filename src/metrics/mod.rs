//! Metric sinks and experiment bookkeeping

pub mod csv_logger;
pub mod experiment;
pub mod sink;
pub mod tracker;

pub use csv_logger::CsvLogger;
pub use experiment::{exp_name, run_dir, run_name};
pub use sink::{prefixed, MetricSink, MetricValue, Metrics};
pub use tracker::RunTracker;
