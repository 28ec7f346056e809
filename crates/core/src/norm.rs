//! Feature normalisation for the conv networks.
//!
//! Batch norm keeps running statistics as variables in the network's
//! `VarMap`; they are updated in training mode and read in inference mode.
//! Instance norm carries no parameters.

use candle_core::{Result, Tensor, D};
use candle_nn::{batch_norm, BatchNorm, BatchNormConfig, ModuleT, VarBuilder};

use autogan_common::NormKind;

const INSTANCE_NORM_EPS: f64 = 1e-5;

/// Normalisation layer selected by [`NormKind`].
pub enum NormLayer {
    Batch(BatchNorm),
    Instance,
}

impl NormLayer {
    /// `None` for [`NormKind::None`]. `vb` should be scoped to the layer
    /// prefix (e.g. `vb.pp("down_norm")`).
    pub fn new(kind: NormKind, num_features: usize, vb: VarBuilder) -> Result<Option<Self>> {
        match kind {
            NormKind::Batch => Ok(Some(Self::Batch(batch_norm(
                num_features,
                BatchNormConfig::default(),
                vb,
            )?))),
            NormKind::Instance => Ok(Some(Self::Instance)),
            NormKind::None => Ok(None),
        }
    }

    /// Convs followed by batch norm skip their bias (the norm's shift replaces it).
    pub fn conv_bias(kind: NormKind) -> bool {
        kind != NormKind::Batch
    }
}

impl ModuleT for NormLayer {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        match self {
            Self::Batch(bn) => bn.forward_t(xs, train),
            Self::Instance => instance_norm(xs),
        }
    }
}

/// Per-sample, per-channel normalisation over the spatial axes of `(B, C, H, W)`.
fn instance_norm(xs: &Tensor) -> Result<Tensor> {
    let mean = xs.mean_keepdim(D::Minus1)?.mean_keepdim(D::Minus2)?;
    let centred = xs.broadcast_sub(&mean)?;
    let var = centred
        .sqr()?
        .mean_keepdim(D::Minus1)?
        .mean_keepdim(D::Minus2)?;
    centred.broadcast_div(&(var + INSTANCE_NORM_EPS)?.sqrt()?)
}
