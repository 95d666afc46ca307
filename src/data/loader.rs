use std::{
    collections::HashMap,
    ffi::OsString,
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use image::imageops::{self, FilterType};
use log::{debug, info};
use ndarray::{Array2, Array3};
use rand::{rngs::StdRng, seq::SliceRandom, Rng};

use super::{
    batch::{Batch, Sample, IGNORE_LABEL},
    split::split_ranges,
};
use crate::{
    error::{Result, TrainErr},
    mode::Mode,
};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];
const MASK_EXTENSIONS: &[&str] = &["png", "bmp"];
const MASK_IGNORE_VALUE: u8 = 255;
const FLIP_PROBABILITY: f64 = 0.5;

/// A finite, restartable source of mini-batches.
pub trait BatchSource {
    /// Returns the amount of samples in the split used by `mode`.
    fn datasize(&self, mode: Mode) -> usize;

    /// Returns the configured amount of samples per batch.
    fn batch_size(&self) -> usize;

    /// Starts a new pass over the split used by `mode`.
    ///
    /// The order of the yielded batches is owned by the source: training
    /// passes may shuffle and augment, evaluation passes must not.
    fn batches(&mut self, mode: Mode) -> Box<dyn Iterator<Item = Result<Batch>> + '_>;
}

/// Where and how the loader reads its dataset.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub img_dir: PathBuf,
    pub mask_dir: PathBuf,
    pub batch_size: NonZeroUsize,
    /// Side length every image and mask gets resized to.
    pub insize: u32,
    pub test_ratio: f32,
    pub n_class: usize,
}

/// Keeps both dataset splits in memory and slices them into mini-batches.
pub struct MiniBatchLoader {
    train: Vec<Sample>,
    test: Vec<Sample>,
    batch_size: NonZeroUsize,
    rng: StdRng,
}

impl MiniBatchLoader {
    /// Creates a new `MiniBatchLoader` over already decoded samples.
    ///
    /// # Arguments
    /// * `train` - The samples of the training split.
    /// * `test` - The samples of the evaluation split.
    /// * `batch_size` - The maximum amount of samples per batch.
    /// * `rng` - Drives shuffling and augmentation of training passes.
    pub fn from_samples(
        train: Vec<Sample>,
        test: Vec<Sample>,
        batch_size: NonZeroUsize,
        rng: StdRng,
    ) -> Self {
        Self {
            train,
            test,
            batch_size,
            rng,
        }
    }

    /// Reads every image/mask pair from disk and splits them.
    ///
    /// # Arguments
    /// * `config` - The directories, sizes and split ratio to use.
    /// * `rng` - Drives shuffling and augmentation of training passes.
    ///
    /// # Returns
    /// A `Data` error if a directory is missing or empty, an image has no
    /// mask, or a file cannot be decoded.
    pub fn open(config: &LoaderConfig, rng: StdRng) -> Result<Self> {
        if !(0.0..1.0).contains(&config.test_ratio) {
            return Err(TrainErr::Config(format!(
                "test ratio must be in [0, 1), got {}",
                config.test_ratio
            )));
        }

        let pairs = pair_files(&config.img_dir, &config.mask_dir)?;
        if pairs.is_empty() {
            return Err(TrainErr::Data(format!(
                "no images found in {}",
                config.img_dir.display()
            )));
        }

        let mut samples = Vec::with_capacity(pairs.len());
        for (img_path, mask_path) in &pairs {
            debug!("loading {}", img_path.display());
            let image = load_image(img_path, config.insize)?;
            let mask = load_mask(mask_path, config.insize, config.n_class)?;
            samples.push(Sample::new(image, mask)?);
        }

        let (train_range, _) = split_ranges(samples.len(), config.test_ratio);
        let test = samples.split_off(train_range.end);

        info!(
            "loaded {} training and {} test samples from {}",
            samples.len(),
            test.len(),
            config.img_dir.display()
        );

        Ok(Self::from_samples(samples, test, config.batch_size, rng))
    }

    fn split(&self, mode: Mode) -> &[Sample] {
        match mode {
            Mode::Train => &self.train,
            Mode::Eval => &self.test,
        }
    }
}

impl BatchSource for MiniBatchLoader {
    fn datasize(&self, mode: Mode) -> usize {
        self.split(mode).len()
    }

    fn batch_size(&self) -> usize {
        self.batch_size.get()
    }

    fn batches(&mut self, mode: Mode) -> Box<dyn Iterator<Item = Result<Batch>> + '_> {
        let batch_size = self.batch_size.get();

        match mode {
            Mode::Train => {
                let mut order: Vec<_> = (0..self.train.len()).collect();
                order.shuffle(&mut self.rng);
                let flips = order
                    .iter()
                    .map(|_| self.rng.random_bool(FLIP_PROBABILITY))
                    .collect();

                Box::new(Batches::new(&self.train, order, flips, batch_size))
            }
            Mode::Eval => {
                let order: Vec<_> = (0..self.test.len()).collect();
                let flips = vec![false; order.len()];

                Box::new(Batches::new(&self.test, order, flips, batch_size))
            }
        }
    }
}

/// One pass over a split, yielding owned batches.
struct Batches<'a> {
    samples: &'a [Sample],
    order: Vec<usize>,
    flips: Vec<bool>,
    batch_size: usize,
    cursor: usize,
}

impl<'a> Batches<'a> {
    fn new(samples: &'a [Sample], order: Vec<usize>, flips: Vec<bool>, batch_size: usize) -> Self {
        Self {
            samples,
            order,
            flips,
            batch_size,
            cursor: 0,
        }
    }
}

impl Iterator for Batches<'_> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.order.len() {
            return None;
        }

        let end = (self.cursor + self.batch_size).min(self.order.len());
        let samples = self.samples;
        let picked = self.order[self.cursor..end].iter().map(|&i| &samples[i]);
        let batch = Batch::stack(picked, &self.flips[self.cursor..end]);

        self.cursor = end;
        Some(batch)
    }
}

/// Matches every image with the mask that shares its file stem.
fn pair_files(img_dir: &Path, mask_dir: &Path) -> Result<Vec<(PathBuf, PathBuf)>> {
    let images = list_files(img_dir, IMAGE_EXTENSIONS)?;
    let mut masks: HashMap<OsString, PathBuf> = list_files(mask_dir, MASK_EXTENSIONS)?
        .into_iter()
        .filter_map(|path| Some((path.file_stem()?.to_os_string(), path)))
        .collect();

    images
        .into_iter()
        .map(|img| {
            let stem = img.file_stem().unwrap_or_default();
            let mask = masks.remove(stem).ok_or_else(|| {
                TrainErr::Data(format!(
                    "{} has no matching mask in {}",
                    img.display(),
                    mask_dir.display()
                ))
            })?;

            Ok((img, mask))
        })
        .collect()
}

fn list_files(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    let read_err =
        |e: std::io::Error| TrainErr::Data(format!("cannot read {}: {e}", dir.display()));

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        if path.is_file() && has_extension(&path, extensions) {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

fn load_image(path: &Path, insize: u32) -> Result<Array3<f32>> {
    let img = image::open(path)
        .map_err(|e| TrainErr::Data(format!("{}: {e}", path.display())))?
        .to_rgb8();
    let img = imageops::resize(&img, insize, insize, FilterType::Triangle);

    let side = insize as usize;
    let mut arr = Array3::zeros((3, side, side));
    for (x, y, px) in img.enumerate_pixels() {
        for c in 0..3 {
            arr[[c, y as usize, x as usize]] = f32::from(px[c]) / 255.0;
        }
    }

    Ok(arr)
}

fn load_mask(path: &Path, insize: u32, n_class: usize) -> Result<Array2<i32>> {
    let mask = image::open(path)
        .map_err(|e| TrainErr::Data(format!("{}: {e}", path.display())))?
        .to_luma8();
    let mask = imageops::resize(&mask, insize, insize, FilterType::Nearest);

    let side = insize as usize;
    let mut arr = Array2::zeros((side, side));
    for (x, y, px) in mask.enumerate_pixels() {
        let label = match px[0] {
            MASK_IGNORE_VALUE => IGNORE_LABEL,
            v if usize::from(v) < n_class => i32::from(v),
            v => {
                return Err(TrainErr::Data(format!(
                    "{}: label {v} at ({x}, {y}) is outside 0..{n_class}",
                    path.display()
                )));
            }
        };
        arr[[y as usize, x as usize]] = label;
    }

    Ok(arr)
}
