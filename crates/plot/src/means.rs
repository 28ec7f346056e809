//! Per-epoch means of a parsed loss log.

use std::collections::BTreeMap;

use autogan_common::{AutoGanError, LossLogLine, LossName, Result};

/// Mean of every loss per epoch, epochs ascending.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochMeans {
    pub epochs: Vec<f64>,
    /// Indexed by [`LossName::index`].
    pub values: Vec<[f64; 8]>,
}

impl EpochMeans {
    /// Group by epoch and average, dropping the latest epoch (it may still be
    /// in progress). `None` when fewer than two distinct epochs are present.
    pub fn from_lines(lines: &[LossLogLine]) -> Option<Self> {
        let mut sums: BTreeMap<usize, (usize, [f64; 8])> = BTreeMap::new();
        for line in lines {
            let entry = sums.entry(line.epoch).or_insert((0, [0.0; 8]));
            entry.0 += 1;
            for (acc, v) in entry.1.iter_mut().zip(line.values) {
                *acc += v as f64;
            }
        }
        sums.pop_last();
        if sums.is_empty() {
            return None;
        }

        let (epochs, values) = sums
            .into_iter()
            .map(|(epoch, (n, total))| (epoch as f64, total.map(|s| s / n as f64)))
            .unzip();
        Some(Self { epochs, values })
    }

    pub fn series(&self, name: LossName) -> Vec<f64> {
        self.values.iter().map(|v| v[name.index()]).collect()
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    /// Every series replaced by its centred rolling average.
    pub fn smoothed(&self, window: usize) -> Result<Self> {
        let mut values = self.values.clone();
        for name in LossName::ALL {
            let avg = rolling_average(&self.series(name), window)?;
            for (row, v) in values.iter_mut().zip(avg) {
                row[name.index()] = v;
            }
        }
        Ok(Self {
            epochs: self.epochs.clone(),
            values,
        })
    }
}

/// Centred rolling mean with an odd `window`; the window is truncated at the
/// ends of the series.
pub fn rolling_average(values: &[f64], window: usize) -> Result<Vec<f64>> {
    if window % 2 == 0 {
        return Err(AutoGanError::Render(format!(
            "smoothing window must be odd, got {window}"
        )));
    }
    let half = window / 2;
    Ok((0..values.len())
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(values.len());
            values[lo..hi].iter().sum::<f64>() / (hi - lo) as f64
        })
        .collect())
}
