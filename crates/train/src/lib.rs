//! # autogan-train — Adversarial Training
//!
//! * **[`StepExecutor`]** — both networks, their Adam optimisers and the
//!   scoped freeze / inference-mode discipline.
//! * **[`FrequencyController`]** — folds discriminator losses into a signed
//!   update-frequency counter.
//! * **[`AutoGanTrainer`]** — one paired update per step plus the burst the
//!   counter asked for.
//! * **[`LrScheduler`]** — constant, then linear per-epoch decay.
//! * **[`LossLogger`]** — `loss_log.txt` writer.

pub mod controller;
pub mod executor;
pub mod logger;
pub mod scheduler;
pub mod trainer;

pub use controller::{FrequencyController, OPTIMAL_D_LOSS};
pub use executor::{
    AdversarialStep, DiscriminatorLosses, GeneratorLosses, Side, StepExecutor, TrainableView,
    ValidationLosses,
};
pub use logger::{LossLogger, LOSS_LOG_FILE};
pub use scheduler::{LrPolicy, LrScheduler};
pub use trainer::{AutoGanTrainer, StepLosses, TrainerConfig};
