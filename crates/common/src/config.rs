//! Model and adversarial-training configuration for autogan.
//!
//! Serialised as JSON next to checkpoints. Every field has a default so a
//! minimal `{}` JSON yields the pix2pix setup (U-Net 256, PatchGAN, batch norm).

use serde::{Deserialize, Serialize};

/// Configuration for the generator/discriminator pair and the adaptive
/// update-frequency controller.
///
/// Backwards-compatible: missing fields fall back to their `#[serde(default)]`
/// values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoGanConfig {
    // ── Networks ────────────────────────────────────────────────────────────
    /// Channels of the input-domain images.
    #[serde(default = "default_nc")]
    pub input_nc: usize,
    /// Channels of the output-domain images.
    #[serde(default = "default_nc")]
    pub output_nc: usize,
    /// Filters in the generator's last conv layer.
    #[serde(default = "default_filters")]
    pub ngf: usize,
    /// Filters in the discriminator's first conv layer.
    #[serde(default = "default_filters")]
    pub ndf: usize,
    /// U-Net downsamplings. 8 turns a 256×256 image into 1×1 at the bottleneck.
    #[serde(default = "default_num_downs")]
    pub num_downs: usize,
    /// Strided conv layers in the PatchGAN discriminator.
    #[serde(default = "default_n_layers_d")]
    pub n_layers_d: usize,
    #[serde(default)]
    pub norm: NormKind,
    /// Dropout (p = 0.5) in the inner U-Net decoder blocks.
    #[serde(default = "default_true")]
    pub use_dropout: bool,

    // ── Objective ───────────────────────────────────────────────────────────
    /// Adversarial weight, applied as `lambda_gan / 100`.
    #[serde(default = "default_lambda")]
    pub lambda_gan: f64,
    /// L1 reconstruction weight.
    #[serde(default = "default_lambda")]
    pub lambda_l1: f64,

    // ── Optimiser ───────────────────────────────────────────────────────────
    #[serde(default = "default_lr")]
    pub lr: f64,
    /// Adam β₁ (β₂ is fixed at 0.999).
    #[serde(default = "default_beta1")]
    pub beta1: f64,

    // ── Adaptive update frequency ───────────────────────────────────────────
    /// Discriminator loss regarded as balanced (chance level).
    #[serde(default = "default_optimal_d_loss")]
    pub optimal_d_loss: f64,
    /// When the trainer folds the loss window into the counter.
    #[serde(default)]
    pub frequency_cadence: FrequencyCadence,
    /// Counter magnitude above which each recompute logs a warning.
    #[serde(default = "default_counter_warn_threshold")]
    pub counter_warn_threshold: u64,

    // ── Data ────────────────────────────────────────────────────────────────
    #[serde(default)]
    pub direction: Direction,
    /// Square side images are resized to.
    #[serde(default = "default_load_size")]
    pub load_size: u32,
}

/// Feature normalisation inside both networks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormKind {
    #[default]
    Batch,
    Instance,
    None,
}

/// Which half of an aligned image is the input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    AtoB,
    BtoA,
}

/// How often the update-frequency counter is recomputed from the loss window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyCadence {
    /// Once at the end of every epoch.
    #[default]
    Epoch,
    /// Every N optimisation steps.
    Steps(usize),
}

// ── Default value functions ─────────────────────────────────────────────────

fn default_nc() -> usize {
    3
}
fn default_filters() -> usize {
    64
}
fn default_num_downs() -> usize {
    8
}
fn default_n_layers_d() -> usize {
    3
}
fn default_true() -> bool {
    true
}
fn default_lambda() -> f64 {
    100.0
}
fn default_lr() -> f64 {
    2e-4
}
fn default_beta1() -> f64 {
    0.5
}
fn default_optimal_d_loss() -> f64 {
    0.5
}
fn default_counter_warn_threshold() -> u64 {
    50
}
fn default_load_size() -> u32 {
    256
}

// ── Impl ────────────────────────────────────────────────────────────────────

impl Default for AutoGanConfig {
    fn default() -> Self {
        Self {
            input_nc: 3,
            output_nc: 3,
            ngf: 64,
            ndf: 64,
            num_downs: 8,
            n_layers_d: 3,
            norm: NormKind::Batch,
            use_dropout: true,
            lambda_gan: 100.0,
            lambda_l1: 100.0,
            lr: 2e-4,
            beta1: 0.5,
            optimal_d_loss: 0.5,
            frequency_cadence: FrequencyCadence::Epoch,
            counter_warn_threshold: 50,
            direction: Direction::AtoB,
            load_size: 256,
        }
    }
}

impl AutoGanConfig {
    /// Discriminator input channels: the conditional pair is concatenated.
    pub fn discriminator_nc(&self) -> usize {
        self.input_nc + self.output_nc
    }

    /// Smallest image side the U-Net accepts (`2^num_downs`).
    pub fn min_image_size(&self) -> u32 {
        1u32 << self.num_downs
    }

    /// Save config to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load config from a JSON file.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&json)?;
        Ok(config)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_gives_pix2pix_defaults() {
        let loaded: AutoGanConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(loaded.input_nc, 3);
        assert_eq!(loaded.num_downs, 8);
        assert_eq!(loaded.norm, NormKind::Batch);
        assert_eq!(loaded.lambda_gan, 100.0);
        assert_eq!(loaded.optimal_d_loss, 0.5);
        assert_eq!(loaded.frequency_cadence, FrequencyCadence::Epoch);
        assert_eq!(loaded.direction, Direction::AtoB);
        assert_eq!(loaded.min_image_size(), 256);
    }

    #[test]
    fn cadence_json_forms() {
        let c: AutoGanConfig =
            serde_json::from_str(r#"{"frequency_cadence": {"steps": 200}}"#).unwrap();
        assert_eq!(c.frequency_cadence, FrequencyCadence::Steps(200));
        let c: AutoGanConfig = serde_json::from_str(r#"{"frequency_cadence": "epoch"}"#).unwrap();
        assert_eq!(c.frequency_cadence, FrequencyCadence::Epoch);
    }

    #[test]
    fn config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = AutoGanConfig {
            ngf: 8,
            norm: NormKind::Instance,
            direction: Direction::BtoA,
            ..Default::default()
        };
        config.save(&path).unwrap();
        let loaded = AutoGanConfig::load(&path).unwrap();
        assert_eq!(loaded.ngf, 8);
        assert_eq!(loaded.norm, NormKind::Instance);
        assert_eq!(loaded.direction, Direction::BtoA);
        assert_eq!(loaded.discriminator_nc(), 6);
    }
}
