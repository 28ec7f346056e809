//! # autogan-common — Shared Primitives
//!
//! Types and utilities shared across every crate in the workspace:
//!
//! * **[`AutoGanConfig`]** — network, objective and controller settings (JSON).
//! * **[`AutoGanError`]** — typed errors of the library crates.
//! * **[`LossName`]** / **[`LossLogLine`]** — loss records and the `loss_log.txt` format.
//! * **[`PairedImageLoader`]** / **[`PairedBatch`]** — aligned image pairs → Candle tensors.

pub mod config;
pub mod data;
pub mod error;
pub mod loss_log;

pub use config::{AutoGanConfig, Direction, FrequencyCadence, NormKind};
pub use data::{AlignedDataset, PairedBatch, PairedImageLoader, ValidationPair};
pub use error::{AutoGanError, Result};
pub use loss_log::{parse_loss_log, run_header, LossLogLine, LossName, LossRecord};
