//! Image-fidelity metrics on network outputs: SSIM, PSNR, MSE.
//!
//! Tensors are first collapsed to one 2-D plane by averaging every
//! non-spatial axis, then each plane is min-max normalised to `[0, 255]`
//! on its own. The data range handed to the formulas is taken from the
//! normalised pair rather than assumed.
//!
//! SSIM follows the common reference setup: 7×7 uniform window,
//! `K1 = 0.01`, `K2 = 0.03`, sample covariance, mean over the region where
//! the window fits entirely inside the image.

use candle_core::{DType, Tensor};

use autogan_common::{AutoGanError, Result};

const WIN: usize = 7;
const K1: f64 = 0.01;
const K2: f64 = 0.03;

/// Similarity and error scores of one output/reference pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricScores {
    pub ssim: f64,
    pub psnr: f64,
}

fn invalid(msg: impl Into<String>) -> AutoGanError {
    AutoGanError::InvalidMetricInput(msg.into())
}

/// Average every non-spatial axis away: `(B,C,H,W)` / `(C,H,W)` → `(H,W)`.
pub fn image_plane(t: &Tensor) -> Result<Tensor> {
    let t = t.to_dtype(DType::F64)?;
    match t.rank() {
        2 => Ok(t),
        3 => Ok(t.mean(0)?),
        4 => Ok(t.mean(0)?.mean(0)?),
        r => Err(invalid(format!("expected a rank 2-4 image tensor, got rank {r}"))),
    }
}

fn min_max(t: &Tensor) -> Result<(f64, f64)> {
    let flat = t.flatten_all()?;
    let min = flat.min(0)?.to_scalar::<f64>()?;
    let max = flat.max(0)?.to_scalar::<f64>()?;
    Ok((min, max))
}

/// Min-max normalise a plane to `[0, 255]`. Constant planes are rejected.
pub fn normalize_plane(plane: &Tensor) -> Result<Tensor> {
    let (min, max) = min_max(plane)?;
    let span = max - min;
    if !span.is_finite() || span <= 0.0 {
        return Err(invalid(format!(
            "image has zero variance (constant value {min}); cannot normalise"
        )));
    }
    Ok(plane.affine(255.0 / span, -min * 255.0 / span)?)
}

/// Normalised planes of both tensors plus their joint data range.
fn prepare(output: &Tensor, reference: &Tensor) -> Result<(Tensor, Tensor, f64)> {
    if output.dims() != reference.dims() {
        return Err(invalid(format!(
            "shape mismatch: {:?} vs {:?}",
            output.dims(),
            reference.dims()
        )));
    }
    let a = normalize_plane(&image_plane(output)?)?;
    let b = normalize_plane(&image_plane(reference)?)?;
    let (a_min, a_max) = min_max(&a)?;
    let (b_min, b_max) = min_max(&b)?;
    let range = a_max.max(b_max) - a_min.min(b_min);
    Ok((a, b, range))
}

fn ssim_planes(a: &Tensor, b: &Tensor, range: f64) -> Result<f64> {
    let (h, w) = a.dims2()?;
    if h < WIN || w < WIN {
        return Err(invalid(format!(
            "image {h}x{w} is smaller than the {WIN}x{WIN} similarity window"
        )));
    }
    let x = a.reshape((1, 1, h, w))?;
    let y = b.reshape((1, 1, h, w))?;
    let pool = |t: &Tensor| t.avg_pool2d_with_stride((WIN, WIN), (1, 1));

    let ux = pool(&x)?;
    let uy = pool(&y)?;
    let uxx = pool(&x.sqr()?)?;
    let uyy = pool(&y.sqr()?)?;
    let uxy = pool(&(&x * &y)?)?;

    let n = (WIN * WIN) as f64;
    let cov_norm = n / (n - 1.0);
    let vx = (uxx - ux.sqr()?)?.affine(cov_norm, 0.0)?;
    let vy = (uyy - uy.sqr()?)?.affine(cov_norm, 0.0)?;
    let vxy = (uxy - (&ux * &uy)?)?.affine(cov_norm, 0.0)?;

    let c1 = (K1 * range).powi(2);
    let c2 = (K2 * range).powi(2);
    let a1 = (&ux * &uy)?.affine(2.0, c1)?;
    let a2 = vxy.affine(2.0, c2)?;
    let b1 = (ux.sqr()? + uy.sqr()?)?.affine(1.0, c1)?;
    let b2 = (vx + vy)?.affine(1.0, c2)?;

    let s = ((a1 * a2)? / (b1 * b2)?)?;
    Ok(s.mean_all()?.to_scalar::<f64>()?)
}

fn mse_planes(a: &Tensor, b: &Tensor) -> Result<f64> {
    Ok((a - b)?.sqr()?.mean_all()?.to_scalar::<f64>()?)
}

fn psnr_from_mse(mse: f64, range: f64) -> f64 {
    if mse == 0.0 {
        f64::INFINITY
    } else {
        10.0 * (range * range / mse).log10()
    }
}

/// Structural similarity in `[-1, 1]`.
pub fn ssim(output: &Tensor, reference: &Tensor) -> Result<f64> {
    let (a, b, range) = prepare(output, reference)?;
    ssim_planes(&a, &b, range)
}

/// Peak signal-to-noise ratio in dB; `+∞` for identical planes.
pub fn psnr(output: &Tensor, reference: &Tensor) -> Result<f64> {
    let (a, b, range) = prepare(output, reference)?;
    Ok(psnr_from_mse(mse_planes(&a, &b)?, range))
}

/// Mean squared error of the normalised planes.
pub fn mse(output: &Tensor, reference: &Tensor) -> Result<f64> {
    let (a, b, _) = prepare(output, reference)?;
    mse_planes(&a, &b)
}

/// SSIM and PSNR from a single normalisation pass.
pub fn image_metrics(output: &Tensor, reference: &Tensor) -> Result<MetricScores> {
    let (a, b, range) = prepare(output, reference)?;
    Ok(MetricScores {
        ssim: ssim_planes(&a, &b, range)?,
        psnr: psnr_from_mse(mse_planes(&a, &b)?, range),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;
    use proptest::prelude::*;

    fn batch(values: Vec<f32>, shape: (usize, usize, usize, usize)) -> Tensor {
        Tensor::from_vec(values, shape, &Device::Cpu).unwrap()
    }

    #[test]
    fn constant_input_is_rejected() {
        let c = Tensor::full(0.3f32, (2, 3, 8, 8), &Device::Cpu).unwrap();
        let r = Tensor::randn(0f32, 1., (2, 3, 8, 8), &Device::Cpu).unwrap();
        assert!(matches!(ssim(&c, &r), Err(AutoGanError::InvalidMetricInput(_))));
        assert!(matches!(psnr(&r, &c), Err(AutoGanError::InvalidMetricInput(_))));
    }

    #[test]
    fn identical_images_are_perfect() {
        let r = Tensor::randn(0f32, 1., (2, 3, 16, 16), &Device::Cpu).unwrap();
        let scores = image_metrics(&r, &r).unwrap();
        assert!((scores.ssim - 1.0).abs() < 1e-9);
        assert!(scores.psnr.is_infinite());
        assert_eq!(mse(&r, &r).unwrap(), 0.0);
    }

    #[test]
    fn inverted_image_is_anticorrelated() {
        let r = Tensor::randn(0f32, 1., (1, 1, 16, 16), &Device::Cpu).unwrap();
        let inv = r.neg().unwrap();
        assert!(ssim(&r, &inv).unwrap() < 0.0);
    }

    #[test]
    fn normalisation_spans_full_range() {
        let plane = Tensor::new(&[[-1f32, 0.], [0.5, 1.]], &Device::Cpu).unwrap();
        let n = normalize_plane(&image_plane(&plane).unwrap()).unwrap();
        let v: Vec<f64> = n.flatten_all().unwrap().to_vec1().unwrap();
        assert_eq!(v, vec![0.0, 127.5, 191.25, 255.0]);
    }

    #[test]
    fn known_psnr() {
        // Planes [0, 255, 0, 255, ...] vs [0, 255, ..., 255, 0] differ in two pixels.
        let mut a = vec![0f32; 64];
        for (i, v) in a.iter_mut().enumerate() {
            *v = if i % 2 == 0 { 0.0 } else { 1.0 };
        }
        let mut b = a.clone();
        b[62] = 1.0;
        b[63] = 0.0;
        let (a, b) = (batch(a, (1, 1, 8, 8)), batch(b, (1, 1, 8, 8)));
        // mse = 2 · 255² / 64 → psnr = 10·log10(32)
        let expected = 10.0 * 32f64.log10();
        assert!((psnr(&a, &b).unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn shape_and_size_checks() {
        let a = Tensor::randn(0f32, 1., (1, 3, 8, 8), &Device::Cpu).unwrap();
        let b = Tensor::randn(0f32, 1., (1, 3, 8, 9), &Device::Cpu).unwrap();
        assert!(ssim(&a, &b).is_err());
        let small = Tensor::randn(0f32, 1., (1, 3, 5, 5), &Device::Cpu).unwrap();
        assert!(matches!(
            ssim(&small, &small),
            Err(AutoGanError::InvalidMetricInput(_))
        ));
        let rank5 = Tensor::randn(0f32, 1., (1, 1, 1, 8, 8), &Device::Cpu).unwrap();
        assert!(image_plane(&rank5).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_scores_in_range(
            a in prop::collection::vec(-1.0f32..1.0, 2 * 64),
            b in prop::collection::vec(-1.0f32..1.0, 2 * 64),
        ) {
            let spread = |v: &[f32]| {
                let (lo, hi) = v.iter().fold((f32::MAX, f32::MIN), |(l, h), &x| (l.min(x), h.max(x)));
                hi - lo
            };
            // Averaging over the batch axis must leave a non-constant plane.
            let plane_a: Vec<f32> = (0..64).map(|i| a[i] + a[64 + i]).collect();
            let plane_b: Vec<f32> = (0..64).map(|i| b[i] + b[64 + i]).collect();
            prop_assume!(spread(&plane_a) > 1e-3 && spread(&plane_b) > 1e-3);

            let ta = batch(a, (2, 1, 8, 8));
            let tb = batch(b, (2, 1, 8, 8));
            let scores = image_metrics(&ta, &tb).unwrap();
            prop_assert!(scores.ssim >= -1.0 - 1e-9 && scores.ssim <= 1.0 + 1e-9);
            prop_assert!(scores.psnr >= 0.0);
        }
    }
}
