//! Vanilla adversarial loss and L1 reconstruction loss.

use candle_core::{Result, Tensor};

/// Binary cross-entropy on logits, averaged over all elements.
///
/// Uses `max(x, 0) − x·t + ln(1 + e^{−|x|})` so saturated logits stay finite.
pub fn bce_with_logits(logits: &Tensor, target: &Tensor) -> Result<Tensor> {
    let softplus = logits.abs()?.neg()?.exp()?.affine(1.0, 1.0)?.log()?;
    let loss = ((logits.relu()? - (logits * target)?)? + softplus)?;
    loss.mean_all()
}

/// GAN loss against an all-real (1) or all-fake (0) patch target.
pub fn gan_loss(prediction: &Tensor, target_is_real: bool) -> Result<Tensor> {
    let target = if target_is_real {
        prediction.ones_like()?
    } else {
        prediction.zeros_like()?
    };
    bce_with_logits(prediction, &target)
}

/// Mean absolute error.
pub fn l1_loss(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    (a - b)?.abs()?.mean_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn scalar(t: Tensor) -> f32 {
        t.to_scalar::<f32>().unwrap()
    }

    #[test]
    fn zero_logits_give_ln2() {
        let p = Tensor::zeros((2, 1, 3, 3), candle_core::DType::F32, &Device::Cpu).unwrap();
        let ln2 = std::f32::consts::LN_2;
        assert!((scalar(gan_loss(&p, true).unwrap()) - ln2).abs() < 1e-6);
        assert!((scalar(gan_loss(&p, false).unwrap()) - ln2).abs() < 1e-6);
    }

    #[test]
    fn confident_discriminator_has_small_loss() {
        let real = Tensor::full(10f32, (4, 1, 2, 2), &Device::Cpu).unwrap();
        let fake = Tensor::full(-10f32, (4, 1, 2, 2), &Device::Cpu).unwrap();
        assert!(scalar(gan_loss(&real, true).unwrap()) < 1e-3);
        assert!(scalar(gan_loss(&fake, false).unwrap()) < 1e-3);
        // Saturated and wrong: large but finite.
        let wrong = Tensor::full(-200f32, (1, 1, 2, 2), &Device::Cpu).unwrap();
        let l = scalar(gan_loss(&wrong, true).unwrap());
        assert!(l.is_finite() && (l - 200.0).abs() < 1e-3);
    }

    #[test]
    fn l1_is_mean_abs_diff() {
        let a = Tensor::new(&[1f32, -1., 0.5, 0.0], &Device::Cpu).unwrap();
        let b = Tensor::new(&[0f32, 1., 0.5, 1.0], &Device::Cpu).unwrap();
        assert!((scalar(l1_loss(&a, &b).unwrap()) - 1.0).abs() < 1e-6);
    }
}
