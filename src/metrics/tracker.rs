//! JSONL run tracker
//!
//! The experiment-tracking sink: one JSON object per log call, appended
//! to `events.jsonl` in the run directory, preceded by a header line
//! describing the run. Video artifacts are summarized as
//! `{frames, width, height}` rather than inlined.

use anyhow::{Context, Result};
use serde_json::json;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use super::sink::{MetricSink, MetricValue, Metrics};

pub struct RunTracker {
    writer: BufWriter<File>,
}

impl RunTracker {
    /// Create the tracker file and write the run header
    pub fn create(path: PathBuf, header: serde_json::Value) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }
        let file = File::create(&path)
            .with_context(|| format!("Failed to create tracker file {:?}", path))?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", json!({ "run": header }))?;
        Ok(Self { writer })
    }
}

impl MetricSink for RunTracker {
    fn log(&mut self, metrics: &Metrics, step: usize) -> Result<()> {
        let mut record = serde_json::Map::new();
        record.insert("step".to_string(), json!(step));
        for (name, value) in metrics {
            let encoded = match value {
                MetricValue::Scalar(v) => json!(v),
                MetricValue::Video(video) => json!({
                    "frames": video.frames.len(),
                    "width": video.width,
                    "height": video.height,
                }),
            };
            record.insert(name.clone(), encoded);
        }
        writeln!(self.writer, "{}", serde_json::Value::Object(record))?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.writer.flush().context("Failed to flush tracker")
    }
}
