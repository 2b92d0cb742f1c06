use std::fs::{self, File};
use std::path::Path;

use polars::{
    frame::DataFrame,
    io::SerWriter,
    prelude::{Column, CsvWriter},
};
use tracing::info;

use crate::error::Result;

const MOVING_AVERAGE_WINDOW: usize = 50;

/// Per-episode reward totals, in episode order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RewardHistory {
    totals: Vec<f64>,
}

impl RewardHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, total: f64) {
        self.totals.push(total);
    }

    pub fn totals(&self) -> &[f64] {
        &self.totals
    }

    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    pub fn mean(&self) -> Option<f64> {
        if self.totals.is_empty() {
            None
        } else {
            Some(self.totals.iter().sum::<f64>() / self.totals.len() as f64)
        }
    }

    pub fn best(&self) -> Option<f64> {
        self.totals.iter().copied().reduce(f64::max)
    }

    /// Trailing mean over up to `window` episodes ending at each index.
    pub fn moving_average(&self, window: usize) -> Vec<f64> {
        let window = window.max(1);
        let mut out = Vec::with_capacity(self.totals.len());
        let mut running = 0.0;
        for (i, total) in self.totals.iter().enumerate() {
            running += total;
            if i >= window {
                running -= self.totals[i - window];
            }
            out.push(running / (i + 1).min(window) as f64);
        }
        out
    }

    /// Writes the reward curve as CSV: `episode,total_reward,moving_average`.
    pub fn persist(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let episodes: Vec<u32> = (0..self.totals.len() as u32).collect();
        let mut df = DataFrame::new(vec![
            Column::new("episode".into(), episodes),
            Column::new("total_reward".into(), self.totals.clone()),
            Column::new(
                "moving_average".into(),
                self.moving_average(MOVING_AVERAGE_WINDOW),
            ),
        ])?;

        let mut file = File::create(path)?;
        CsvWriter::new(&mut file).finish(&mut df)?;

        info!(
            path = %path.display(),
            episodes = self.totals.len(),
            mean = self.mean().unwrap_or_default(),
            best = self.best().unwrap_or_default(),
            "Wrote reward history"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_statistics() {
        let mut history = RewardHistory::new();
        assert_eq!(history.mean(), None);
        for total in [1.0, -10.0, 4.0] {
            history.push(total);
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.mean(), Some(-5.0 / 3.0));
        assert_eq!(history.best(), Some(4.0));
    }

    #[test]
    fn moving_average_uses_trailing_window() {
        let mut history = RewardHistory::new();
        for total in [2.0, 4.0, 6.0, 8.0] {
            history.push(total);
        }
        assert_eq!(history.moving_average(2), vec![2.0, 3.0, 5.0, 7.0]);
        assert_eq!(history.moving_average(10), vec![2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn persist_writes_one_row_per_episode() {
        let dir = std::env::temp_dir().join(format!("lane_dqn_report_{}", std::process::id()));
        let path = dir.join("nested").join("rewards.csv");
        let mut history = RewardHistory::new();
        history.push(1.5);
        history.push(-10.0);
        history.persist(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "episode,total_reward,moving_average");
        assert_eq!(lines.len(), 3);
        assert!(lines[2].starts_with("1,-10"));
        fs::remove_dir_all(&dir).ok();
    }
}
