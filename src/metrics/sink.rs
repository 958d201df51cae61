//! Metric values and the sink interface
//!
//! Metrics are step-tagged mappings from dotted names to scalars or
//! video artifacts. Two concrete sinks run in parallel (the JSONL run
//! tracker and the CSV logger); the training loop feeds both the same
//! mapping for the same step.

use anyhow::Result;
use std::collections::BTreeMap;

use crate::render::Video;
use crate::rl::UpdateInfo;

/// A single metric value
#[derive(Debug, Clone)]
pub enum MetricValue {
    Scalar(f64),
    Video(Video),
}

impl MetricValue {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            MetricValue::Scalar(v) => Some(*v),
            MetricValue::Video(_) => None,
        }
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Scalar(value)
    }
}

impl From<f32> for MetricValue {
    fn from(value: f32) -> Self {
        MetricValue::Scalar(value as f64)
    }
}

/// Step-tagged metric mapping; ordered so sinks emit stable columns
pub type Metrics = BTreeMap<String, MetricValue>;

/// A sink that receives step-tagged metrics
///
/// Writes are append-only per (name, step); the loop never emits the
/// same pair twice.
pub trait MetricSink {
    fn log(&mut self, metrics: &Metrics, step: usize) -> Result<()>;

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Prefix update-info diagnostics into metric names, `prefix/key`
pub fn prefixed(prefix: &str, info: &UpdateInfo) -> Metrics {
    info.iter()
        .map(|(k, v)| (format!("{prefix}/{k}"), MetricValue::from(*v)))
        .collect()
}
