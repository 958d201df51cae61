//! Append-only, step-indexed CSV metric log
//!
//! The header grows with the union of metric names seen so far; when a
//! new column first appears the whole file is rewritten with the
//! extended header (earlier rows get empty cells). Scalars only; video
//! artifacts are skipped.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use super::sink::{MetricSink, Metrics};

pub struct CsvLogger {
    path: PathBuf,
    fields: Vec<String>,
    rows: Vec<(usize, BTreeMap<String, f64>)>,
}

impl CsvLogger {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            fields: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn rewrite(&self) -> Result<()> {
        let mut file = std::fs::File::create(&self.path)
            .with_context(|| format!("Failed to create csv log {:?}", self.path))?;
        writeln!(file, "{}", self.header_line())?;
        for (step, row) in &self.rows {
            writeln!(file, "{}", self.row_line(*step, row))?;
        }
        Ok(())
    }

    fn header_line(&self) -> String {
        let mut parts = vec!["step".to_string()];
        parts.extend(self.fields.iter().cloned());
        parts.join(",")
    }

    fn row_line(&self, step: usize, row: &BTreeMap<String, f64>) -> String {
        let mut parts = vec![step.to_string()];
        for field in &self.fields {
            parts.push(row.get(field).map(|v| v.to_string()).unwrap_or_default());
        }
        parts.join(",")
    }
}

impl MetricSink for CsvLogger {
    fn log(&mut self, metrics: &Metrics, step: usize) -> Result<()> {
        let row: BTreeMap<String, f64> = metrics
            .iter()
            .filter_map(|(k, v)| v.as_scalar().map(|s| (k.clone(), s)))
            .collect();

        let new_fields: Vec<String> = row
            .keys()
            .filter(|k| !self.fields.contains(k))
            .cloned()
            .collect();

        if !new_fields.is_empty() {
            self.fields.extend(new_fields);
            self.rows.push((step, row));
            return self.rewrite();
        }

        let first_row = self.rows.is_empty();
        self.rows.push((step, row));
        if first_row {
            return self.rewrite();
        }

        let (step, row) = self.rows.last().expect("row just pushed");
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open csv log {:?}", self.path))?;
        writeln!(file, "{}", self.row_line(*step, row))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::sink::MetricValue;
    use tempfile::TempDir;

    fn metrics(pairs: &[(&str, f64)]) -> Metrics {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), MetricValue::Scalar(*v)))
            .collect()
    }

    #[test]
    fn test_header_and_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("train.csv");
        let mut logger = CsvLogger::new(path.clone());

        logger.log(&metrics(&[("a", 1.0), ("b", 2.0)]), 5).unwrap();
        logger.log(&metrics(&[("a", 3.0), ("b", 4.0)]), 10).unwrap();
        logger.close().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines, vec!["step,a,b", "5,1,2", "10,3,4"]);
    }

    #[test]
    fn test_new_column_rewrites_with_blanks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("train.csv");
        let mut logger = CsvLogger::new(path.clone());

        logger.log(&metrics(&[("a", 1.0)]), 1).unwrap();
        logger.log(&metrics(&[("a", 2.0), ("b", 9.0)]), 2).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines, vec!["step,a,b", "1,1,", "2,2,9"]);
    }

    #[test]
    fn test_videos_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("eval.csv");
        let mut logger = CsvLogger::new(path.clone());

        let mut m = metrics(&[("success", 0.7)]);
        m.insert(
            "video".to_string(),
            MetricValue::Video(crate::render::Video {
                frames: vec![],
                width: 0,
                height: 0,
            }),
        );
        logger.log(&m, 1).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().next().unwrap(), "step,success");
    }

    #[test]
    fn test_steps_recorded_in_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("train.csv");
        let mut logger = CsvLogger::new(path.clone());
        for step in [5, 10, 15] {
            logger.log(&metrics(&[("x", step as f64)]), step).unwrap();
        }
        let contents = std::fs::read_to_string(&path).unwrap();
        let steps: Vec<&str> = contents
            .lines()
            .skip(1)
            .map(|l| l.split(',').next().unwrap())
            .collect();
        assert_eq!(steps, vec!["5", "10", "15"]);
    }
}
