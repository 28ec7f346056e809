//! Adversarial step executor: one generator forward pass and the
//! discriminator/generator gradient steps of a conditional GAN.
//!
//! Parameter freezing is scoped. [`StepExecutor::unfreeze`] hands out a
//! [`TrainableView`] under which exactly one network may be stepped; dropping
//! the view freezes both networks again. Validation runs inside an
//! inference-mode scope that switches batch norm and dropout back to
//! training behaviour when it ends, including on the error path.

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use candle_core::backprop::GradStore;
use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{AdamW, ModuleT, Optimizer, ParamsAdamW, VarBuilder, VarMap};

use autogan_common::{AutoGanConfig, AutoGanError, LossName, LossRecord, Result};
use autogan_core::{gan_loss, image_metrics, l1_loss, NLayerDiscriminator, UnetGenerator};

const ADAM_BETA2: f64 = 0.999;
const ADAM_EPS: f64 = 1e-8;

// ── Losses ──────────────────────────────────────────────────────────────────

/// Which network a gradient step updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Generator,
    Discriminator,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DiscriminatorLosses {
    pub fake: f32,
    pub real: f32,
}

impl DiscriminatorLosses {
    /// `0.5 · (fake + real)`: the value that was back-propagated.
    pub fn combined(&self) -> f32 {
        0.5 * (self.fake + self.real)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GeneratorLosses {
    pub gan: f32,
    pub l1: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ValidationLosses {
    pub gan: f32,
    pub l1: f32,
    pub ssim: f64,
    pub psnr: f64,
}

impl ValidationLosses {
    pub fn records(&self) -> [LossRecord; 4] {
        [
            LossRecord::new(LossName::ValGGan, self.gan),
            LossRecord::new(LossName::ValGL1, self.l1),
            LossRecord::new(LossName::Ssim, self.ssim as f32),
            LossRecord::new(LossName::Psnr, self.psnr as f32),
        ]
    }
}

// ── Step seam ───────────────────────────────────────────────────────────────

/// What the trainer needs from a step executor.
///
/// `optimize_*` acquire and release the freeze scope themselves.
pub trait AdversarialStep {
    fn forward_pass(&mut self, real_a: &Tensor) -> Result<Tensor>;
    fn optimize_discriminator(
        &mut self,
        real_a: &Tensor,
        fake_b: &Tensor,
        real_b: &Tensor,
    ) -> Result<DiscriminatorLosses>;
    fn optimize_generator(
        &mut self,
        real_a: &Tensor,
        fake_b: &Tensor,
        real_b: &Tensor,
    ) -> Result<GeneratorLosses>;
    fn validate(&mut self, val_a: &Tensor, val_b: &Tensor) -> Result<ValidationLosses>;
}

// ── StepExecutor ────────────────────────────────────────────────────────────

/// Owns both networks, their variables and one Adam optimiser each.
pub struct StepExecutor {
    generator: UnetGenerator,
    g_varmap: VarMap,
    g_vars: Vec<Var>,
    g_optimizer: AdamW,
    discriminator: NLayerDiscriminator,
    d_varmap: VarMap,
    d_vars: Vec<Var>,
    d_optimizer: AdamW,
    trainable: Option<Side>,
    training: bool,
    lambda_gan: f64,
    lambda_l1: f64,
}

impl StepExecutor {
    /// Build both networks from config.
    pub fn new(config: &AutoGanConfig, device: Device) -> Result<Self> {
        let g_varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&g_varmap, DType::F32, &device);
        let generator = UnetGenerator::new(config, vb)?;
        let g_vars = g_varmap.all_vars();

        let d_varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&d_varmap, DType::F32, &device);
        let discriminator = NLayerDiscriminator::new(config, vb)?;
        let d_vars = d_varmap.all_vars();

        let params = ParamsAdamW {
            lr: config.lr,
            beta1: config.beta1,
            beta2: ADAM_BETA2,
            eps: ADAM_EPS,
            weight_decay: 0.0,
        };
        let g_optimizer = AdamW::new(g_vars.clone(), params.clone())?;
        let d_optimizer = AdamW::new(d_vars.clone(), params)?;

        tracing::info!(
            generator_params = param_count(&g_vars),
            discriminator_params = param_count(&d_vars),
            num_downs = config.num_downs,
            n_layers_d = config.n_layers_d,
            "Networks initialised"
        );

        Ok(Self {
            generator,
            g_varmap,
            g_vars,
            g_optimizer,
            discriminator,
            d_varmap,
            d_vars,
            d_optimizer,
            trainable: None,
            training: true,
            lambda_gan: config.lambda_gan,
            lambda_l1: config.lambda_l1,
        })
    }

    /// `G(real_a)` in the current mode.
    pub fn forward(&self, real_a: &Tensor) -> Result<Tensor> {
        Ok(self.generator.forward_t(real_a, self.training)?)
    }

    /// Make `side` trainable for the lifetime of the returned view.
    pub fn unfreeze(&mut self, side: Side) -> Result<TrainableView<'_>> {
        if let Some(current) = self.trainable {
            return Err(AutoGanError::GradientStateViolation(format!(
                "cannot unfreeze {side:?} while {current:?} is already trainable"
            )));
        }
        self.trainable = Some(side);
        Ok(TrainableView { executor: self })
    }

    /// The network currently allowed to receive updates.
    pub fn trainable(&self) -> Option<Side> {
        self.trainable
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    /// Discriminator update on the detached fake pair and the real pair.
    ///
    /// Requires the discriminator to be the trainable side.
    pub fn step_discriminator(
        &mut self,
        real_a: &Tensor,
        fake_b: &Tensor,
        real_b: &Tensor,
    ) -> Result<DiscriminatorLosses> {
        self.require_trainable(Side::Discriminator)?;

        let fake_ab = Tensor::cat(&[real_a, &fake_b.detach()], 1)?;
        let pred_fake = self.discriminator.forward_t(&fake_ab, self.training)?;
        let loss_fake = gan_loss(&pred_fake, false)?;

        let real_ab = Tensor::cat(&[real_a, real_b], 1)?;
        let pred_real = self.discriminator.forward_t(&real_ab, self.training)?;
        let loss_real = gan_loss(&pred_real, true)?;

        let loss = ((&loss_fake + &loss_real)? * 0.5)?;
        let mut grads = loss.backward()?;
        if strip_grads(&mut grads, &self.g_vars) > 0 {
            return Err(AutoGanError::GradientStateViolation(
                "discriminator loss reached generator parameters".to_string(),
            ));
        }
        self.d_optimizer.step(&grads)?;

        Ok(DiscriminatorLosses {
            fake: loss_fake.to_scalar::<f32>()?,
            real: loss_real.to_scalar::<f32>()?,
        })
    }

    /// Generator update: fool the discriminator and match `real_b` in L1.
    ///
    /// Requires the generator to be the trainable side; gradients reaching the
    /// frozen discriminator are discarded.
    pub fn step_generator(
        &mut self,
        real_a: &Tensor,
        fake_b: &Tensor,
        real_b: &Tensor,
        lambda_gan: f64,
        lambda_l1: f64,
    ) -> Result<GeneratorLosses> {
        self.require_trainable(Side::Generator)?;

        let fake_ab = Tensor::cat(&[real_a, fake_b], 1)?;
        let pred_fake = self.discriminator.forward_t(&fake_ab, self.training)?;
        let loss_gan = gan_loss(&pred_fake, true)?;
        let loss_l1 = l1_loss(fake_b, real_b)?;

        let loss = (loss_gan.affine(lambda_gan / 100.0, 0.0)? + loss_l1.affine(lambda_l1, 0.0)?)?;
        let mut grads = loss.backward()?;
        strip_grads(&mut grads, &self.d_vars);
        self.g_optimizer.step(&grads)?;

        Ok(GeneratorLosses {
            gan: loss_gan.to_scalar::<f32>()?,
            l1: loss_l1.to_scalar::<f32>()?,
        })
    }

    /// Validation losses and image metrics, computed in inference mode.
    pub fn evaluate(&mut self, val_a: &Tensor, val_b: &Tensor) -> Result<ValidationLosses> {
        let scope = InferenceMode::enter(self);
        scope.validation_losses(val_a, val_b)
    }

    fn validation_losses(&self, val_a: &Tensor, val_b: &Tensor) -> Result<ValidationLosses> {
        let fake_b = self.generator.forward_t(val_a, self.training)?.detach();
        let fake_ab = Tensor::cat(&[val_a, &fake_b], 1)?;
        let pred_fake = self.discriminator.forward_t(&fake_ab, self.training)?.detach();
        let gan = gan_loss(&pred_fake, true)?.to_scalar::<f32>()?;
        let l1 = l1_loss(&fake_b, val_b)?.to_scalar::<f32>()?;
        let scores = image_metrics(&fake_b, val_b)?;
        Ok(ValidationLosses {
            gan,
            l1,
            ssim: scores.ssim,
            psnr: scores.psnr,
        })
    }

    fn require_trainable(&self, side: Side) -> Result<()> {
        match self.trainable {
            Some(s) if s == side => Ok(()),
            other => Err(AutoGanError::GradientStateViolation(format!(
                "{side:?} step requested while trainable side is {other:?}"
            ))),
        }
    }

    pub fn learning_rate(&self) -> f64 {
        self.g_optimizer.learning_rate()
    }

    /// Set the learning rate of both optimisers.
    pub fn set_learning_rate(&mut self, lr: f64) {
        self.g_optimizer.set_learning_rate(lr);
        self.d_optimizer.set_learning_rate(lr);
    }

    /// Save both networks as `{label}_net_G.safetensors` / `{label}_net_D.safetensors`.
    pub fn save(&self, dir: &Path, label: &str) -> Result<(PathBuf, PathBuf)> {
        std::fs::create_dir_all(dir)?;
        let (g_path, d_path) = checkpoint_paths(dir, label);
        self.g_varmap.save(&g_path)?;
        self.d_varmap.save(&d_path)?;
        Ok((g_path, d_path))
    }

    /// Load both networks saved by [`save`](Self::save).
    pub fn load(&mut self, dir: &Path, label: &str) -> Result<()> {
        let (g_path, d_path) = checkpoint_paths(dir, label);
        self.g_varmap.load(&g_path)?;
        self.d_varmap.load(&d_path)?;
        Ok(())
    }
}

impl AdversarialStep for StepExecutor {
    fn forward_pass(&mut self, real_a: &Tensor) -> Result<Tensor> {
        self.forward(real_a)
    }

    fn optimize_discriminator(
        &mut self,
        real_a: &Tensor,
        fake_b: &Tensor,
        real_b: &Tensor,
    ) -> Result<DiscriminatorLosses> {
        self.unfreeze(Side::Discriminator)?
            .step_discriminator(real_a, fake_b, real_b)
    }

    fn optimize_generator(
        &mut self,
        real_a: &Tensor,
        fake_b: &Tensor,
        real_b: &Tensor,
    ) -> Result<GeneratorLosses> {
        let (lambda_gan, lambda_l1) = (self.lambda_gan, self.lambda_l1);
        self.unfreeze(Side::Generator)?
            .step_generator(real_a, fake_b, real_b, lambda_gan, lambda_l1)
    }

    fn validate(&mut self, val_a: &Tensor, val_b: &Tensor) -> Result<ValidationLosses> {
        self.evaluate(val_a, val_b)
    }
}

// ── Scopes ──────────────────────────────────────────────────────────────────

/// One network unfrozen; both are frozen again on drop.
pub struct TrainableView<'a> {
    executor: &'a mut StepExecutor,
}

impl TrainableView<'_> {
    pub fn side(&self) -> Option<Side> {
        self.executor.trainable
    }
}

impl Deref for TrainableView<'_> {
    type Target = StepExecutor;

    fn deref(&self) -> &StepExecutor {
        self.executor
    }
}

impl DerefMut for TrainableView<'_> {
    fn deref_mut(&mut self) -> &mut StepExecutor {
        self.executor
    }
}

impl Drop for TrainableView<'_> {
    fn drop(&mut self) {
        self.executor.trainable = None;
    }
}

/// Both networks in inference mode until drop.
struct InferenceMode<'a> {
    executor: &'a mut StepExecutor,
}

impl<'a> InferenceMode<'a> {
    fn enter(executor: &'a mut StepExecutor) -> Self {
        executor.training = false;
        Self { executor }
    }
}

impl Deref for InferenceMode<'_> {
    type Target = StepExecutor;

    fn deref(&self) -> &StepExecutor {
        self.executor
    }
}

impl Drop for InferenceMode<'_> {
    fn drop(&mut self) {
        self.executor.training = true;
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

/// Drop the gradients of `vars`; returns how many were present.
fn strip_grads(grads: &mut GradStore, vars: &[Var]) -> usize {
    vars.iter()
        .filter(|v| grads.remove(v.as_tensor()).is_some())
        .count()
}

fn param_count(vars: &[Var]) -> usize {
    vars.iter().map(|v| v.as_tensor().elem_count()).sum()
}

fn checkpoint_paths(dir: &Path, label: &str) -> (PathBuf, PathBuf) {
    (
        dir.join(format!("{label}_net_G.safetensors")),
        dir.join(format!("{label}_net_D.safetensors")),
    )
}

// ── Tests ───────────────────────────────────────────────────────────────────
