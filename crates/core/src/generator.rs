//! U-Net generator with skip connections (pix2pix).
//!
//! Built from the bottleneck outwards: level `i` halves the resolution and
//! owns `ngf · min(2^i, 8)` inner filters. Level 0 is the outermost block
//! (image in, `tanh` image out); the deepest level is the innermost block.
//! Every block except the outermost concatenates its input with its output,
//! so skip connections double the channels seen by the parent's up-conv.

use candle_core::{Result, Tensor};
use candle_nn::{
    conv2d, conv2d_no_bias, conv_transpose2d, conv_transpose2d_no_bias, ops, Conv2d,
    Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig, Dropout, Module, ModuleT, VarBuilder,
};

use autogan_common::{AutoGanConfig, NormKind};

use crate::norm::NormLayer;

const LEAKY_SLOPE: f64 = 0.2;
const DROPOUT_P: f32 = 0.5;
/// First level whose decoder gets dropout (the repeated `8·ngf` blocks).
const FIRST_DROPOUT_LEVEL: usize = 4;

fn down_cfg() -> Conv2dConfig {
    Conv2dConfig {
        padding: 1,
        stride: 2,
        ..Default::default()
    }
}

fn up_cfg() -> ConvTranspose2dConfig {
    ConvTranspose2dConfig {
        padding: 1,
        stride: 2,
        ..Default::default()
    }
}

fn filters(ngf: usize, level: usize) -> usize {
    ngf * (1usize << level.min(3))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Outermost,
    Middle,
    Innermost,
}

// ── Skip block ──────────────────────────────────────────────────────────────

struct UnetSkipBlock {
    kind: BlockKind,
    down_conv: Conv2d,
    down_norm: Option<NormLayer>,
    up_conv: ConvTranspose2d,
    up_norm: Option<NormLayer>,
    dropout: Option<Dropout>,
    submodule: Option<Box<UnetSkipBlock>>,
}

impl UnetSkipBlock {
    #[allow(clippy::too_many_arguments)]
    fn new(
        kind: BlockKind,
        input_nc: usize,
        outer_nc: usize,
        inner_nc: usize,
        norm: NormKind,
        use_dropout: bool,
        submodule: Option<Box<UnetSkipBlock>>,
        vb: VarBuilder,
    ) -> Result<Self> {
        let bias = NormLayer::conv_bias(norm);
        let down_conv = if bias {
            conv2d(input_nc, inner_nc, 4, down_cfg(), vb.pp("down_conv"))?
        } else {
            conv2d_no_bias(input_nc, inner_nc, 4, down_cfg(), vb.pp("down_conv"))?
        };
        let up_in = match kind {
            BlockKind::Innermost => inner_nc,
            _ => inner_nc * 2,
        };
        let up_conv = if bias || kind == BlockKind::Outermost {
            conv_transpose2d(up_in, outer_nc, 4, up_cfg(), vb.pp("up_conv"))?
        } else {
            conv_transpose2d_no_bias(up_in, outer_nc, 4, up_cfg(), vb.pp("up_conv"))?
        };
        let down_norm = match kind {
            BlockKind::Middle => NormLayer::new(norm, inner_nc, vb.pp("down_norm"))?,
            _ => None,
        };
        let up_norm = match kind {
            BlockKind::Outermost => None,
            _ => NormLayer::new(norm, outer_nc, vb.pp("up_norm"))?,
        };
        let dropout = (use_dropout && kind == BlockKind::Middle).then(|| Dropout::new(DROPOUT_P));
        Ok(Self {
            kind,
            down_conv,
            down_norm,
            up_conv,
            up_norm,
            dropout,
            submodule,
        })
    }

    fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let mut h = match self.kind {
            BlockKind::Outermost => x.clone(),
            _ => ops::leaky_relu(x, LEAKY_SLOPE)?,
        };
        h = self.down_conv.forward(&h)?;
        if let Some(ref n) = self.down_norm {
            h = n.forward_t(&h, train)?;
        }
        if let Some(ref sub) = self.submodule {
            h = sub.forward_t(&h, train)?;
        }
        h = self.up_conv.forward(&h.relu()?)?;
        if let Some(ref n) = self.up_norm {
            h = n.forward_t(&h, train)?;
        }
        if let Some(ref d) = self.dropout {
            h = d.forward(&h, train)?;
        }
        match self.kind {
            BlockKind::Outermost => h.tanh(),
            _ => Tensor::cat(&[x, &h], 1),
        }
    }
}

// ── UnetGenerator ───────────────────────────────────────────────────────────

/// U-Net generator mapping `(B, input_nc, S, S)` to `(B, output_nc, S, S)`,
/// `S` a multiple of `2^num_downs`.
pub struct UnetGenerator {
    root: UnetSkipBlock,
    num_downs: usize,
}

impl UnetGenerator {
    pub fn new(config: &AutoGanConfig, vb: VarBuilder) -> Result<Self> {
        let n = config.num_downs;
        if n < 2 {
            candle_core::bail!("U-Net needs at least 2 downsamplings, got {n}");
        }
        let ngf = config.ngf;

        let mut block: Option<Box<UnetSkipBlock>> = None;
        for level in (0..n).rev() {
            let kind = if level == n - 1 {
                BlockKind::Innermost
            } else if level == 0 {
                BlockKind::Outermost
            } else {
                BlockKind::Middle
            };
            let (input_nc, outer_nc) = if level == 0 {
                (config.input_nc, config.output_nc)
            } else {
                let outer = filters(ngf, level - 1);
                (outer, outer)
            };
            let use_dropout = config.use_dropout && level >= FIRST_DROPOUT_LEVEL;
            let b = UnetSkipBlock::new(
                kind,
                input_nc,
                outer_nc,
                filters(ngf, level),
                config.norm,
                use_dropout,
                block.take(),
                vb.pp(format!("level{level}")),
            )?;
            block = Some(Box::new(b));
        }
        let root = match block {
            Some(b) => *b,
            None => candle_core::bail!("U-Net construction produced no blocks"),
        };
        Ok(Self { root, num_downs: n })
    }

    pub fn num_downs(&self) -> usize {
        self.num_downs
    }
}

impl ModuleT for UnetGenerator {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        self.root.forward_t(xs, train)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    fn tiny(num_downs: usize, norm: NormKind) -> AutoGanConfig {
        AutoGanConfig {
            ngf: 4,
            num_downs,
            norm,
            ..Default::default()
        }
    }

    #[test]
    fn output_matches_input_spatially() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let g = UnetGenerator::new(&tiny(3, NormKind::Batch), vb).unwrap();
        let x = Tensor::randn(0f32, 1., (2, 3, 8, 8), &Device::Cpu).unwrap();
        let y = g.forward_t(&x, true).unwrap();
        assert_eq!(y.dims(), &[2, 3, 8, 8]);
        let max: f32 = y.abs().unwrap().flatten_all().unwrap().max(0).unwrap().to_scalar().unwrap();
        assert!(max <= 1.0);
    }

    #[test]
    fn deep_unet_uses_dropout_levels() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let g = UnetGenerator::new(&tiny(6, NormKind::Instance), vb).unwrap();
        assert_eq!(g.num_downs(), 6);
        let x = Tensor::randn(0f32, 1., (1, 3, 64, 64), &Device::Cpu).unwrap();
        let eval_a = g.forward_t(&x, false).unwrap();
        let eval_b = g.forward_t(&x, false).unwrap();
        let diff: f32 = (eval_a - eval_b)
            .unwrap()
            .abs()
            .unwrap()
            .sum_all()
            .unwrap()
            .to_scalar()
            .unwrap();
        assert_eq!(diff, 0.0);
    }

    #[test]
    fn too_shallow_is_rejected() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        assert!(UnetGenerator::new(&tiny(1, NormKind::Batch), vb).is_err());
    }
}
