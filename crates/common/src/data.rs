//! Data pipeline: aligned image pairs, batching, validation counterparts.
//!
//! Each image file holds the A domain in its left half and the B domain in its
//! right half (the pix2pix "aligned" layout). Halves are resized to
//! `load_size × load_size` and scaled to `[-1, 1]`; batches are
//! `(batch, channels, load_size, load_size)` `f32` tensors.
//!
//! * **[`AlignedDataset`]** — one directory of aligned images.
//! * **[`PairedImageLoader`]** — shuffled training batches, each carrying a
//!   validation counterpart drawn round-robin from the `val` split.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result as AnyhowResult};
use candle_core::{Device, Tensor};
use image::imageops::FilterType;
use image::DynamicImage;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::config::{AutoGanConfig, Direction};

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

// ── Batches ─────────────────────────────────────────────────────────────────

/// Validation input/target pair travelling with a training batch.
#[derive(Debug, Clone)]
pub struct ValidationPair {
    pub val_a: Tensor,
    pub val_b: Tensor,
}

/// One training step's worth of data.
#[derive(Debug, Clone)]
pub struct PairedBatch {
    pub real_a: Tensor,
    pub real_b: Tensor,
    pub val: Option<ValidationPair>,
    pub paths: Vec<PathBuf>,
}

impl PairedBatch {
    pub fn new(real_a: Tensor, real_b: Tensor) -> Self {
        Self {
            real_a,
            real_b,
            val: None,
            paths: Vec::new(),
        }
    }

    pub fn with_validation(mut self, val_a: Tensor, val_b: Tensor) -> Self {
        self.val = Some(ValidationPair { val_a, val_b });
        self
    }
}

// ── AlignedDataset ──────────────────────────────────────────────────────────

/// Directory of aligned A|B images.
pub struct AlignedDataset {
    files: Vec<PathBuf>,
    load_size: u32,
    direction: Direction,
    input_nc: usize,
    output_nc: usize,
}

impl AlignedDataset {
    pub fn open(dir: &Path, config: &AutoGanConfig) -> AnyhowResult<Self> {
        let files = collect_images(dir)?;
        if files.is_empty() {
            anyhow::bail!("no images found in {}", dir.display());
        }
        if config.load_size < config.min_image_size() {
            anyhow::bail!(
                "load_size {} is smaller than the U-Net minimum {} (num_downs = {})",
                config.load_size,
                config.min_image_size(),
                config.num_downs
            );
        }
        Ok(Self {
            files,
            load_size: config.load_size,
            direction: config.direction,
            input_nc: config.input_nc,
            output_nc: config.output_nc,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn path(&self, index: usize) -> &Path {
        &self.files[index]
    }

    /// Load one pair as CHW `f32` buffers `(input, target)`.
    pub fn load_pair(&self, index: usize, flip: bool) -> AnyhowResult<(Vec<f32>, Vec<f32>)> {
        let path = &self.files[index];
        let img = image::open(path).with_context(|| format!("open image {}", path.display()))?;
        let (w, h) = (img.width(), img.height());
        if w < 2 {
            anyhow::bail!("image {} is too narrow to split into A|B", path.display());
        }
        let half = w / 2;
        let left = img.crop_imm(0, 0, half, h);
        let right = img.crop_imm(half, 0, half, h);
        let (input, target) = match self.direction {
            Direction::AtoB => (left, right),
            Direction::BtoA => (right, left),
        };
        Ok((
            to_chw(&input, self.input_nc, self.load_size, flip)?,
            to_chw(&target, self.output_nc, self.load_size, flip)?,
        ))
    }

    /// Stack the given samples into `(input, target)` tensors.
    pub fn load_batch(
        &self,
        indices: &[usize],
        flips: &[bool],
        device: &Device,
    ) -> AnyhowResult<(Tensor, Tensor)> {
        let s = self.load_size as usize;
        let mut a = Vec::with_capacity(indices.len() * self.input_nc * s * s);
        let mut b = Vec::with_capacity(indices.len() * self.output_nc * s * s);
        for (&i, &flip) in indices.iter().zip(flips) {
            let (pa, pb) = self.load_pair(i, flip)?;
            a.extend(pa);
            b.extend(pb);
        }
        let n = indices.len();
        let a = Tensor::from_vec(a, (n, self.input_nc, s, s), device)?;
        let b = Tensor::from_vec(b, (n, self.output_nc, s, s), device)?;
        Ok((a, b))
    }
}

// ── PairedImageLoader ───────────────────────────────────────────────────────

/// Shuffling batch loader over `<dataroot>/train` with validation pairs from
/// `<dataroot>/val`.
pub struct PairedImageLoader {
    train: AlignedDataset,
    val: Option<AlignedDataset>,
    batch_size: usize,
    flip: bool,
    order: Vec<usize>,
    rng: StdRng,
    val_cursor: usize,
}

impl PairedImageLoader {
    pub fn new(
        dataroot: &Path,
        config: &AutoGanConfig,
        batch_size: usize,
        flip: bool,
        seed: u64,
    ) -> AnyhowResult<Self> {
        if batch_size == 0 {
            anyhow::bail!("batch_size must be positive");
        }
        let train = AlignedDataset::open(&dataroot.join("train"), config)
            .context("open training split")?;
        let val_dir = dataroot.join("val");
        let val = if val_dir.is_dir() {
            Some(AlignedDataset::open(&val_dir, config).context("open validation split")?)
        } else {
            tracing::warn!(dir = %val_dir.display(), "No validation split; val losses will be zero");
            None
        };
        tracing::info!(
            train = train.len(),
            val = val.as_ref().map_or(0, |v| v.len()),
            "Loaded aligned dataset"
        );
        let order = (0..train.len()).collect();
        Ok(Self {
            train,
            val,
            batch_size,
            flip,
            order,
            rng: StdRng::seed_from_u64(seed),
            val_cursor: 0,
        })
    }

    pub fn num_samples(&self) -> usize {
        self.train.len()
    }

    pub fn num_batches(&self) -> usize {
        self.train.len().div_ceil(self.batch_size)
    }

    /// Reshuffle the sample order for a new epoch.
    pub fn shuffle(&mut self) {
        self.order.shuffle(&mut self.rng);
    }

    /// Load batch `b` of the current epoch order.
    pub fn batch(&mut self, b: usize, device: &Device) -> AnyhowResult<PairedBatch> {
        let start = b * self.batch_size;
        if start >= self.order.len() {
            anyhow::bail!("batch {b} out of range ({} batches)", self.num_batches());
        }
        let end = (start + self.batch_size).min(self.order.len());
        let indices: Vec<usize> = self.order[start..end].to_vec();
        let flips: Vec<bool> = indices
            .iter()
            .map(|_| self.flip && self.rng.gen_bool(0.5))
            .collect();
        let (real_a, real_b) = self.train.load_batch(&indices, &flips, device)?;
        let mut batch = PairedBatch::new(real_a, real_b);
        batch.paths = indices.iter().map(|&i| self.train.path(i).to_path_buf()).collect();

        if let Some(ref val) = self.val {
            let val_indices: Vec<usize> = (0..indices.len())
                .map(|k| (self.val_cursor + k) % val.len())
                .collect();
            self.val_cursor = (self.val_cursor + indices.len()) % val.len();
            let no_flip = vec![false; val_indices.len()];
            let (val_a, val_b) = val.load_batch(&val_indices, &no_flip, device)?;
            batch = batch.with_validation(val_a, val_b);
        }
        Ok(batch)
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

/// Resize, optionally mirror, and lay out as CHW in `[-1, 1]`.
fn to_chw(img: &DynamicImage, nc: usize, size: u32, flip: bool) -> AnyhowResult<Vec<f32>> {
    let resized = img.resize_exact(size, size, FilterType::CatmullRom);
    let resized = if flip { resized.fliph() } else { resized };
    let scale = |v: u8| v as f32 / 127.5 - 1.0;
    let hw = (size * size) as usize;
    match nc {
        1 => Ok(resized.to_luma8().pixels().map(|p| scale(p[0])).collect()),
        3 => {
            let rgb = resized.to_rgb8();
            let mut out = vec![0f32; 3 * hw];
            for (i, p) in rgb.pixels().enumerate() {
                for c in 0..3 {
                    out[c * hw + i] = scale(p[c]);
                }
            }
            Ok(out)
        }
        n => anyhow::bail!("unsupported channel count {n} (expected 1 or 3)"),
    }
}

/// Collect image files from a directory, sorted.
fn collect_images(dir: &Path) -> AnyhowResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }
    let mut entries: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
        })
        .collect();
    entries.sort();
    Ok(entries)
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    /// Left half black, right half white.
    fn write_pair(path: &Path, side: u32) {
        let img = RgbImage::from_fn(side * 2, side, |x, _| {
            if x < side {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        });
        img.save(path).unwrap();
    }

    fn small_config() -> AutoGanConfig {
        AutoGanConfig {
            num_downs: 3,
            load_size: 8,
            ..Default::default()
        }
    }

    fn make_root(n_train: usize, n_val: usize) -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        for (split, n) in [("train", n_train), ("val", n_val)] {
            let dir = root.path().join(split);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..n {
                write_pair(&dir.join(format!("{i}.png")), 16);
            }
        }
        root
    }

    #[test]
    fn pair_halves_follow_direction() {
        let root = make_root(1, 0);
        let config = small_config();
        let ds = AlignedDataset::open(&root.path().join("train"), &config).unwrap();
        let (a, b) = ds.load_pair(0, false).unwrap();
        assert_eq!(a.len(), 3 * 8 * 8);
        assert!(a.iter().all(|&v| (v + 1.0).abs() < 1e-6));
        assert!(b.iter().all(|&v| (v - 1.0).abs() < 1e-6));

        let flipped = AutoGanConfig {
            direction: Direction::BtoA,
            ..config
        };
        let ds = AlignedDataset::open(&root.path().join("train"), &flipped).unwrap();
        let (a, _) = ds.load_pair(0, false).unwrap();
        assert!(a.iter().all(|&v| (v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn batches_carry_validation_pairs() {
        let root = make_root(5, 2);
        let mut loader =
            PairedImageLoader::new(root.path(), &small_config(), 2, true, 0).unwrap();
        assert_eq!(loader.num_batches(), 3);
        loader.shuffle();
        let batch = loader.batch(0, &Device::Cpu).unwrap();
        assert_eq!(batch.real_a.dims(), &[2, 3, 8, 8]);
        assert_eq!(batch.paths.len(), 2);
        let val = batch.val.unwrap();
        assert_eq!(val.val_b.dims(), &[2, 3, 8, 8]);

        let last = loader.batch(2, &Device::Cpu).unwrap();
        assert_eq!(last.real_b.dims(), &[1, 3, 8, 8]);
        assert!(loader.batch(3, &Device::Cpu).is_err());
    }

    #[test]
    fn too_small_load_size_is_rejected() {
        let root = make_root(1, 0);
        let config = AutoGanConfig {
            load_size: 4,
            num_downs: 3,
            ..Default::default()
        };
        assert!(AlignedDataset::open(&root.path().join("train"), &config).is_err());
    }
}
