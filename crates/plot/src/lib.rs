//! # autogan-plot — Loss Charts
//!
//! Reads an experiment's `loss_log.txt`, averages every loss per epoch
//! (leaving out the latest, possibly incomplete epoch) and renders the
//! four-panel `graph.png`.

pub mod chart;
pub mod means;

use std::path::{Path, PathBuf};

use autogan_common::{parse_loss_log, Result};

pub use chart::render_chart;
pub use means::{rolling_average, EpochMeans};

pub const GRAPH_FILE: &str = "graph.png";

/// Log → chart for one experiment directory.
#[derive(Debug, Clone)]
pub struct LossPlotter {
    log_path: PathBuf,
    graph_path: PathBuf,
    smoothing: Option<usize>,
}

impl LossPlotter {
    /// `<dir>/loss_log.txt` → `<dir>/graph.png`.
    pub fn new(experiment_dir: &Path, log_file: &str) -> Self {
        Self {
            log_path: experiment_dir.join(log_file),
            graph_path: experiment_dir.join(GRAPH_FILE),
            smoothing: None,
        }
    }

    /// Apply a centred rolling average (odd window) before rendering.
    pub fn with_smoothing(mut self, window: usize) -> Self {
        self.smoothing = (window > 1).then_some(window);
        self
    }

    /// Render the chart. `Ok(None)` when fewer than two epochs are logged.
    pub fn plot(&self) -> Result<Option<PathBuf>> {
        let text = std::fs::read_to_string(&self.log_path)?;
        let lines = parse_loss_log(&text)?;
        let Some(mut means) = EpochMeans::from_lines(&lines) else {
            tracing::debug!(lines = lines.len(), "Not enough epochs to plot");
            return Ok(None);
        };
        if let Some(window) = self.smoothing {
            means = means.smoothed(window)?;
        }
        render_chart(&means, &self.graph_path)?;
        Ok(Some(self.graph_path.clone()))
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn graph_path(&self) -> &Path {
        &self.graph_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autogan_common::{AutoGanError, LossLogLine, LossName, LossRecord};

    fn write_log(dir: &Path, epochs: &[usize]) {
        let mut text = String::from("================ Training Loss (now) ================\n");
        for &e in epochs {
            let line = LossLogLine::new(e, 10, 0.1, 0.0, &[LossRecord::new(LossName::GGan, 1.0)]);
            text.push_str(&line.format());
            text.push('\n');
        }
        std::fs::write(dir.join("loss_log.txt"), text).unwrap();
    }

    #[test]
    fn single_epoch_renders_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write_log(dir.path(), &[1, 1, 1]);
        let plotter = LossPlotter::new(dir.path(), "loss_log.txt");
        assert_eq!(plotter.plot().unwrap(), None);
        assert!(!plotter.graph_path().exists());
    }

    #[test]
    fn renders_graph_next_to_log() {
        let dir = tempfile::tempdir().unwrap();
        write_log(dir.path(), &[1, 1, 2, 2, 3, 4]);
        let plotter = LossPlotter::new(dir.path(), "loss_log.txt").with_smoothing(3);
        let path = plotter.plot().unwrap().unwrap();
        assert_eq!(path, dir.path().join(GRAPH_FILE));
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn missing_log_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let plotter = LossPlotter::new(dir.path(), "loss_log.txt");
        assert!(matches!(plotter.plot(), Err(AutoGanError::Io(_))));
    }

    #[test]
    fn malformed_log_propagates() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("loss_log.txt"),
            "(epoch: 1, iters: 2, time: x, data: 0.1) G_GAN: 1.0 \n",
        )
        .unwrap();
        let plotter = LossPlotter::new(dir.path(), "loss_log.txt");
        assert!(matches!(
            plotter.plot(),
            Err(AutoGanError::MalformedLogLine { line: 1, .. })
        ));
    }

    #[test]
    fn even_smoothing_window_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_log(dir.path(), &[1, 2, 3]);
        let plotter = LossPlotter::new(dir.path(), "loss_log.txt").with_smoothing(4);
        assert!(matches!(plotter.plot(), Err(AutoGanError::Render(_))));
    }
}
