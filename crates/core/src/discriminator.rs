//! PatchGAN discriminator: classifies overlapping patches of a conditional
//! `(input, output)` pair as real or generated.

use candle_core::{Result, Tensor};
use candle_nn::{conv2d, conv2d_no_bias, ops, Conv2d, Conv2dConfig, Module, ModuleT, VarBuilder};

use autogan_common::AutoGanConfig;

use crate::norm::NormLayer;

const LEAKY_SLOPE: f64 = 0.2;
const KERNEL: usize = 4;

struct PatchLayer {
    conv: Conv2d,
    norm: Option<NormLayer>,
    activate: bool,
}

/// `n_layers_d` strided convs, one stride-1 conv, then a 1-channel logit map.
///
/// Input: `(B, input_nc + output_nc, H, W)`. Output: `(B, 1, h, w)` logits.
pub struct NLayerDiscriminator {
    layers: Vec<PatchLayer>,
}

impl NLayerDiscriminator {
    pub fn new(config: &AutoGanConfig, vb: VarBuilder) -> Result<Self> {
        let ndf = config.ndf;
        let bias = NormLayer::conv_bias(config.norm);
        let mult = |n: usize| 1usize << n.min(3);
        let conv = |c_in: usize, c_out: usize, stride: usize, bias: bool, name: String| {
            let cfg = Conv2dConfig {
                padding: 1,
                stride,
                ..Default::default()
            };
            if bias {
                conv2d(c_in, c_out, KERNEL, cfg, vb.pp(name))
            } else {
                conv2d_no_bias(c_in, c_out, KERNEL, cfg, vb.pp(name))
            }
        };

        let mut layers = Vec::with_capacity(config.n_layers_d + 2);
        layers.push(PatchLayer {
            conv: conv(config.discriminator_nc(), ndf, 2, true, "conv0".into())?,
            norm: None,
            activate: true,
        });
        for n in 1..=config.n_layers_d {
            // The last of these keeps the resolution (stride 1).
            let stride = if n == config.n_layers_d { 1 } else { 2 };
            let c_out = ndf * mult(n);
            layers.push(PatchLayer {
                conv: conv(ndf * mult(n - 1), c_out, stride, bias, format!("conv{n}"))?,
                norm: NormLayer::new(config.norm, c_out, vb.pp(format!("norm{n}")))?,
                activate: true,
            });
        }
        let last = config.n_layers_d + 1;
        layers.push(PatchLayer {
            conv: conv(ndf * mult(config.n_layers_d), 1, 1, true, format!("conv{last}"))?,
            norm: None,
            activate: false,
        });
        Ok(Self { layers })
    }
}

impl ModuleT for NLayerDiscriminator {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let mut h = xs.clone();
        for layer in &self.layers {
            h = layer.conv.forward(&h)?;
            if let Some(ref n) = layer.norm {
                h = n.forward_t(&h, train)?;
            }
            if layer.activate {
                h = ops::leaky_relu(&h, LEAKY_SLOPE)?;
            }
        }
        Ok(h)
    }
}
