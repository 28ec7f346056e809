//! Per-epoch learning-rate schedule.
//!
//! The rate stays at its initial value for `n_epochs`, then decays linearly
//! and reaches zero one epoch after `n_epochs + n_epochs_decay`.

/// Decay mode after the constant phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LrPolicy {
    Linear,
    Constant,
}

impl LrPolicy {
    pub fn from_str(s: &str) -> Self {
        match s {
            "linear" => Self::Linear,
            _ => Self::Constant,
        }
    }
}

#[derive(Clone, Debug)]
pub struct LrScheduler {
    /// Epochs completed since the scheduler was created.
    epoch: usize,
    lr: f64,
    n_epochs: usize,
    n_epochs_decay: usize,
    epoch_count: usize,
    policy: LrPolicy,
}

impl LrScheduler {
    /// * `epoch_count` — 1-based epoch the run starts at (resumed runs start later).
    pub fn new(
        lr: f64,
        n_epochs: usize,
        n_epochs_decay: usize,
        epoch_count: usize,
        policy: LrPolicy,
    ) -> Self {
        Self {
            epoch: 0,
            lr,
            n_epochs,
            n_epochs_decay,
            epoch_count,
            policy,
        }
    }

    /// Learning rate for the current epoch.
    pub fn current_lr(&self) -> f64 {
        match self.policy {
            LrPolicy::Constant => self.lr,
            LrPolicy::Linear => {
                let over = (self.epoch + self.epoch_count).saturating_sub(self.n_epochs);
                let factor = 1.0 - over as f64 / (self.n_epochs_decay + 1) as f64;
                self.lr * factor.max(0.0)
            }
        }
    }

    /// Move to the next epoch; returns `(old_lr, new_lr)`.
    pub fn advance(&mut self) -> (f64, f64) {
        let old = self.current_lr();
        self.epoch += 1;
        let new = self.current_lr();
        tracing::info!(
            old_lr = format!("{old:.7}"),
            new_lr = format!("{new:.7}"),
            "Learning rate updated"
        );
        (old, new)
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_phase() {
        let mut sched = LrScheduler::new(2e-4, 100, 100, 1, LrPolicy::Linear);
        assert_eq!(sched.current_lr(), 2e-4);
        for _ in 0..99 {
            sched.advance();
        }
        // epoch index 99 + epoch_count 1 = 100 → still undecayed
        assert_eq!(sched.current_lr(), 2e-4);
    }

    #[test]
    fn linear_decay_to_zero() {
        let mut sched = LrScheduler::new(1.0, 2, 3, 1, LrPolicy::Linear);
        let mut lrs = vec![sched.current_lr()];
        for _ in 0..5 {
            lrs.push(sched.advance().1);
        }
        let expected = [1.0, 1.0, 0.75, 0.5, 0.25, 0.0];
        for (lr, e) in lrs.iter().zip(expected) {
            assert!((lr - e).abs() < 1e-12, "{lrs:?}");
        }
        sched.advance();
        assert_eq!(sched.epoch(), 6);
        assert_eq!(sched.current_lr(), 0.0);
    }

    #[test]
    fn resumed_run_starts_decayed() {
        let sched = LrScheduler::new(1.0, 2, 3, 4, LrPolicy::Linear);
        assert!((sched.current_lr() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn constant_policy() {
        let mut sched = LrScheduler::new(1e-3, 1, 1, 1, LrPolicy::from_str("constant"));
        for _ in 0..10 {
            sched.advance();
        }
        assert_eq!(sched.current_lr(), 1e-3);
    }
}
