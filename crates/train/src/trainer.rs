//! Trainer: one adversarial optimisation step plus the adaptive burst.
//!
//! Each [`AutoGanTrainer::optimize_step`] performs the paired
//! discriminator → generator update, then `|k|` extra single-sided updates
//! where `k` is the correction computed at the previous controller
//! invocation. The controller runs only from [`AutoGanTrainer::update_frequency`]
//! (directly or through the cadence hooks), never from inside a step, so the
//! feedback is always one invocation behind.

use std::path::PathBuf;

use autogan_common::{AutoGanConfig, FrequencyCadence, LossName, LossRecord, PairedBatch, Result};

use crate::controller::FrequencyController;
use crate::executor::{
    AdversarialStep, DiscriminatorLosses, GeneratorLosses, StepExecutor, ValidationLosses,
};

// ── Config ──────────────────────────────────────────────────────────────────

/// Run-level knobs (CLI-level, not persisted with the model).
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    /// Epochs at the initial learning rate.
    pub n_epochs: usize,
    /// Epochs over which the learning rate decays linearly to zero.
    pub n_epochs_decay: usize,
    /// Starting epoch (1-based), for resumed runs.
    pub epoch_count: usize,
    pub batch_size: usize,
    /// Steps between loss-log lines.
    pub print_freq: usize,
    /// Epochs between numbered checkpoints.
    pub save_epoch_freq: usize,
    pub flip: bool,
    pub seed: u64,
    /// Experiment directory: checkpoints, `loss_log.txt`, `graph.png`.
    pub output_dir: PathBuf,
}

impl TrainerConfig {
    /// Last epoch of the run (inclusive).
    pub fn last_epoch(&self) -> usize {
        self.n_epochs + self.n_epochs_decay
    }
}

/// Losses of one `optimize_step` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepLosses {
    pub generator: GeneratorLosses,
    pub discriminator: DiscriminatorLosses,
    /// Signed burst performed after the paired update: `> 0` generator,
    /// `< 0` discriminator.
    pub burst: i64,
}

impl StepLosses {
    /// Training records in log order.
    pub fn records(&self) -> [LossRecord; 4] {
        [
            LossRecord::new(LossName::GGan, self.generator.gan),
            LossRecord::new(LossName::GL1, self.generator.l1),
            LossRecord::new(LossName::DReal, self.discriminator.real),
            LossRecord::new(LossName::DFake, self.discriminator.fake),
        ]
    }
}

// ── Trainer ─────────────────────────────────────────────────────────────────

/// Orchestrates the step executor and the frequency controller.
pub struct AutoGanTrainer<S: AdversarialStep = StepExecutor> {
    step: S,
    controller: FrequencyController,
    pending_correction: i64,
    cadence: FrequencyCadence,
    counter_warn_threshold: u64,
    steps_since_update: usize,
    pub global_step: usize,
}

impl<S: AdversarialStep> AutoGanTrainer<S> {
    pub fn new(step: S, config: &AutoGanConfig) -> Self {
        Self {
            step,
            controller: FrequencyController::new(config.optimal_d_loss),
            pending_correction: 0,
            cadence: config.frequency_cadence,
            counter_warn_threshold: config.counter_warn_threshold,
            steps_since_update: 0,
            global_step: 0,
        }
    }

    /// One paired update followed by the burst chosen at the last controller
    /// invocation.
    pub fn optimize_step(&mut self, batch: &PairedBatch) -> Result<StepLosses> {
        let k = self.pending_correction;
        let (real_a, real_b) = (&batch.real_a, &batch.real_b);

        let fake_b = self.step.forward_pass(real_a)?;
        let mut discriminator = self.step.optimize_discriminator(real_a, &fake_b, real_b)?;
        let mut generator = self.step.optimize_generator(real_a, &fake_b, real_b)?;
        self.controller.record(discriminator.combined() as f64);

        for _ in 0..k.unsigned_abs() {
            let fake_b = self.step.forward_pass(real_a)?;
            if k > 0 {
                generator = self.step.optimize_generator(real_a, &fake_b, real_b)?;
            } else {
                discriminator = self.step.optimize_discriminator(real_a, &fake_b, real_b)?;
                self.controller.record(discriminator.combined() as f64);
            }
        }

        self.global_step += 1;
        self.steps_since_update += 1;
        if k != 0 {
            tracing::debug!(step = self.global_step, burst = k, "Burst applied");
        }

        Ok(StepLosses {
            generator,
            discriminator,
            burst: k,
        })
    }

    /// Fold the loss window into the counter; the result is the burst of the
    /// next `optimize_step`.
    pub fn update_frequency(&mut self) -> Result<i64> {
        let counter = self.controller.recompute()?;
        self.pending_correction = counter;
        self.steps_since_update = 0;
        if counter.unsigned_abs() > self.counter_warn_threshold {
            tracing::warn!(
                counter,
                threshold = self.counter_warn_threshold,
                "Update-frequency counter is large; one network is far ahead"
            );
        }
        Ok(counter)
    }

    /// Call after every `optimize_step`. Recomputes on a `Steps(n)` cadence.
    pub fn on_step_end(&mut self) -> Result<Option<i64>> {
        match self.cadence {
            FrequencyCadence::Steps(n) if self.steps_since_update >= n.max(1) => {
                self.update_frequency().map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Call after every epoch. Recomputes on the `Epoch` cadence.
    pub fn on_epoch_end(&mut self) -> Result<Option<i64>> {
        match self.cadence {
            FrequencyCadence::Epoch => self.update_frequency().map(Some),
            FrequencyCadence::Steps(_) => Ok(None),
        }
    }

    /// Validation losses on the batch's validation counterpart, if any.
    pub fn validate(&mut self, batch: &PairedBatch) -> Result<Option<ValidationLosses>> {
        match &batch.val {
            Some(val) => self.step.validate(&val.val_a, &val.val_b).map(Some),
            None => Ok(None),
        }
    }

    pub fn pending_correction(&self) -> i64 {
        self.pending_correction
    }

    pub fn controller(&self) -> &FrequencyController {
        &self.controller
    }

    pub fn cadence(&self) -> FrequencyCadence {
        self.cadence
    }

    pub fn step_executor(&self) -> &S {
        &self.step
    }

    pub fn step_executor_mut(&mut self) -> &mut S {
        &mut self.step
    }

    /// Reset controller state and the pending burst.
    pub fn reset(&mut self) {
        self.controller.reset();
        self.pending_correction = 0;
        self.steps_since_update = 0;
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
