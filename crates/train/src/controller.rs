//! Adaptive update-frequency controller.
//!
//! Collects discriminator losses and periodically folds their mean into a
//! signed counter. A positive counter asks the trainer for extra generator
//! updates, a negative one for extra discriminator updates; the magnitude is
//! how many. Each recompute moves the counter by
//! `1 + floor(10 · |target − mean|)` towards the network that is losing:
//! a mean above the target (discriminator struggling) pushes it down, a mean
//! at or below the target (discriminator winning) pushes it up.
//!
//! The counter is never clamped.

use autogan_common::{AutoGanError, Result};

/// Discriminator loss at which neither network has the upper hand.
pub const OPTIMAL_D_LOSS: f64 = 0.5;

/// Absorbs float noise so decimal deviations (e.g. `|0.5 − 0.7|`) floor to
/// the intended number of tenths. Losses arrive as `f32` widened to `f64`,
/// so the tolerance sits at `f32` resolution.
const DEVIATION_TOLERANCE: f64 = 1e-6;

/// Proportional controller over the discriminator loss.
#[derive(Debug, Clone)]
pub struct FrequencyController {
    window: Vec<f64>,
    counter: i64,
    target: f64,
}

impl Default for FrequencyController {
    fn default() -> Self {
        Self::new(OPTIMAL_D_LOSS)
    }
}

impl FrequencyController {
    pub fn new(target: f64) -> Self {
        Self {
            window: Vec::new(),
            counter: 0,
            target,
        }
    }

    /// Append one discriminator loss to the window.
    pub fn record(&mut self, d_loss: f64) {
        self.window.push(d_loss);
    }

    /// Fold the window into the counter and return the new counter.
    ///
    /// The window is emptied; on error nothing changes. The counter saturates
    /// at the `i64` bounds.
    pub fn recompute(&mut self) -> Result<i64> {
        if self.window.is_empty() {
            return Err(AutoGanError::EmptyWindow);
        }
        let avg = self.window.iter().sum::<f64>() / self.window.len() as f64;
        if !avg.is_finite() {
            return Err(AutoGanError::NonFiniteLoss(avg));
        }
        let samples = self.window.len();
        self.window.clear();

        let correction = self.correction_for(avg);
        self.counter = if avg > self.target {
            self.counter.saturating_sub(correction)
        } else {
            self.counter.saturating_add(correction)
        };
        tracing::info!(
            avg = format!("{avg:.4}"),
            samples,
            correction,
            counter = self.counter,
            "Update frequency recomputed"
        );
        Ok(self.counter)
    }

    /// Correction magnitude for a window mean: `1 + floor(10 · |target − avg|)`,
    /// saturating at `i64::MAX`.
    pub fn correction_for(&self, avg: f64) -> i64 {
        let tenths = ((self.target - avg).abs() * 10.0 + DEVIATION_TOLERANCE).floor();
        // `as` saturates for huge values.
        (tenths as i64).saturating_add(1)
    }

    pub fn counter(&self) -> i64 {
        self.counter
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn window(&self) -> &[f64] {
        &self.window
    }

    /// Forget the window and the accumulated counter.
    pub fn reset(&mut self) {
        self.window.clear();
        self.counter = 0;
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
