use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::decode::StepInfo;

/// Sink for periodic metric averages, e.g. a live plotting server.
pub trait RemoteDisplay {
    fn display(&mut self, iteration: usize, averages: &BTreeMap<&'static str, f32>)
        -> io::Result<()>;
}

#[derive(Serialize)]
struct DisplayRecord<'a> {
    run_id: &'a str,
    iteration: usize,
    #[serde(flatten)]
    averages: &'a BTreeMap<&'static str, f32>,
}

/// Appends one JSON object per push to a `.jsonl` file.
pub struct JsonlMonitor {
    run_id: String,
    writer: BufWriter<File>,
}

impl JsonlMonitor {
    pub fn create(path: &Path, run_id: &str) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(JsonlMonitor {
            run_id: run_id.to_string(),
            writer: BufWriter::new(file),
        })
    }
}

impl RemoteDisplay for JsonlMonitor {
    fn display(
        &mut self,
        iteration: usize,
        averages: &BTreeMap<&'static str, f32>,
    ) -> io::Result<()> {
        let record = DisplayRecord {
            run_id: &self.run_id,
            iteration,
            averages,
        };
        serde_json::to_writer(&mut self.writer, &record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }
}

/// Running sums of step fields between two remote pushes.
#[derive(Debug, Default)]
pub struct LogWindow {
    sums: BTreeMap<&'static str, f32>,
}

impl LogWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accumulate(&mut self, info: &StepInfo) {
        for (name, value) in info.fields() {
            *self.sums.entry(name).or_insert(0.0) += value;
        }
    }

    /// Divide every sum by `window` and reset.
    pub fn drain_average(&mut self, window: usize) -> BTreeMap<&'static str, f32> {
        let n = window.max(1) as f32;
        std::mem::take(&mut self.sums)
            .into_iter()
            .map(|(name, sum)| (name, sum / n))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(reward: f32, finetune_cost: Option<f32>) -> StepInfo {
        StepInfo {
            reward,
            quality: 0.5,
            delay: 0.25,
            policy_loss: 0.0,
            finetune_cost,
        }
    }

    #[test]
    fn test_window_averages_and_resets() {
        let mut window = LogWindow::new();
        window.accumulate(&info(1.0, None));
        window.accumulate(&info(3.0, Some(4.0)));

        let averages = window.drain_average(2);
        assert_eq!(averages["R"], 2.0);
        assert_eq!(averages["Q"], 0.5);
        // A is divided by the full window even if only some steps report it.
        assert_eq!(averages["A"], 2.0);

        assert!(window.drain_average(2).is_empty());
    }

    #[test]
    fn test_jsonl_monitor_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".log").join("run-1.jsonl");
        let mut monitor = JsonlMonitor::create(&path, "run-1").unwrap();

        let mut window = LogWindow::new();
        window.accumulate(&info(1.0, None));
        monitor.display(50, &window.drain_average(1)).unwrap();
        monitor.display(100, &BTreeMap::from([("R", 0.5)])).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["run_id"], "run-1");
        assert_eq!(lines[0]["iteration"], 50);
        assert_eq!(lines[0]["R"], 1.0);
        assert_eq!(lines[1]["R"], 0.5);
    }
}
