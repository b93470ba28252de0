//! Batch pipeline turning sampled wing configurations into a dataset of
//! normalized pressure-coefficient images.
//!
//! The stages mirror the study workflow: sample configurations by Latin
//! Hypercube ([`config`]), drive OpenVSP/VSPAERO per configuration ([`vsp`]),
//! reorganize the raw `.slc` Cp slices into tables ([`slices`]), find the
//! global dCp extrema and rasterize normalized grayscale images
//! ([`normalize`]), and map images back to tables and real coordinates
//! ([`reconstruct`]). [`interp`] and [`compare`] provide the dataset
//! inspection utilities.

use std::path::{Path, PathBuf};

use log::info;
use thiserror::Error;

pub mod compare;
pub mod config;
pub mod interp;
pub mod normalize;
pub mod reconstruct;
pub mod slices;
pub mod vsp;

use normalize::{CpRange, NormalizeError, NormalizedGrid, CHORD_SAMPLES};
use slices::{SliceData, SliceError};

/// The post-processing chain over a directory of `.slc` files: reorganize
/// each `<idx>.slc` into `<idx>_pivot.csv` and `<idx>.txt`, scan the column
/// files for the global dCp range, and write one normalized `<idx>.png` per
/// configuration.
#[derive(Debug)]
pub struct Pipeline {
    dir: PathBuf,
    chord_samples: usize,
}

impl Pipeline {
    /// A pipeline over `dir` with the default 20 chordwise samples.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Pipeline {
            dir: dir.into(),
            chord_samples: CHORD_SAMPLES,
        }
    }

    /// update the chordwise resolution of the normalized grids
    pub fn chord_samples(&mut self, n: usize) -> &mut Self {
        self.chord_samples = n;
        self
    }

    fn path(&self, name: impl AsRef<Path>) -> PathBuf {
        self.dir.join(name)
    }

    /// Count the contiguous `<idx>.slc` files starting at 0.
    pub fn detect_count(&self) -> usize {
        (0..)
            .take_while(|idx| self.path(format!("{idx}.slc")).exists())
            .count()
    }

    /// Run the full post-processing chain over `count` configurations and
    /// return the global dCp range the images were normalized with.
    pub fn process(&self, count: usize) -> Result<CpRange, PipelineError> {
        if count == 0 {
            return Err(PipelineError::NoInput(self.dir.display().to_string()));
        }

        info!("reorganizing {count} slice files in {}", self.dir.display());
        for idx in 0..count {
            let data = SliceData::parse_file(self.path(format!("{idx}.slc")))
                .map_err(|source| PipelineError::slice(idx, source))?;
            data.write_pivot(self.path(format!("{idx}_pivot.csv")))
                .map_err(|source| PipelineError::slice(idx, source))?;
            data.write_columns(self.path(format!("{idx}.txt")))
                .map_err(|source| PipelineError::slice(idx, source))?;
        }

        let range =
            CpRange::scan_files((0..count).map(|idx| self.path(format!("{idx}.txt"))))?;

        for idx in 0..count {
            let rows = slices::read_columns(self.path(format!("{idx}.txt")))
                .map_err(|source| PipelineError::slice(idx, source))?;
            let grid = NormalizedGrid::from_rows(&rows, self.chord_samples)
                .map_err(|source| PipelineError::normalize(idx, source))?;
            grid.save_png(self.path(format!("{idx}.png")), &range)
                .map_err(|source| PipelineError::normalize(idx, source))?;
        }

        info!("pipeline complete: {count} images in {}", self.dir.display());
        Ok(range)
    }
}

/// Reorganize a single slice file, the standalone counterpart of the loop in
/// [`Pipeline::process`].
pub fn organize(
    input: impl AsRef<Path>,
    pivot: impl AsRef<Path>,
    columns: impl AsRef<Path>,
) -> Result<(), SliceError> {
    let data = SliceData::parse_file(input)?;
    data.write_pivot(pivot)?;
    data.write_columns(columns)
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no slice files found in {0}")]
    NoInput(String),
    #[error("configuration #{idx}: {source}")]
    Slice { idx: usize, source: SliceError },
    #[error("configuration #{idx}: {source}")]
    Normalize { idx: usize, source: NormalizeError },
    #[error(transparent)]
    Range(#[from] NormalizeError),
}

impl PipelineError {
    fn slice(idx: usize, source: SliceError) -> Self {
        PipelineError::Slice { idx, source }
    }

    fn normalize(idx: usize, source: NormalizeError) -> Self {
        PipelineError::Normalize { idx, source }
    }
}
