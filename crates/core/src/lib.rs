//! # autogan-core — Networks, Losses, Metrics
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`generator`] | `UnetGenerator` (skip-connected encoder/decoder) |
//! | [`discriminator`] | `NLayerDiscriminator` (PatchGAN) |
//! | [`norm`] | `NormLayer` (batch / instance) |
//! | [`loss`] | vanilla GAN loss on logits, L1 |
//! | [`metrics`] | SSIM / PSNR / MSE on normalised image planes |
//!
//! Both networks implement [`candle_nn::ModuleT`]; the `train` flag switches
//! batch-norm statistics and dropout between training and inference.

pub mod discriminator;
pub mod generator;
pub mod loss;
pub mod metrics;
pub mod norm;

// ── Public re-exports ───────────────────────────────────────────────────────

pub use discriminator::NLayerDiscriminator;
pub use generator::UnetGenerator;
pub use loss::{bce_with_logits, gan_loss, l1_loss};
pub use metrics::{image_metrics, image_plane, mse, normalize_plane, psnr, ssim, MetricScores};
pub use norm::NormLayer;
