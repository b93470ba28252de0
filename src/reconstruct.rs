use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use image::GrayImage;
use log::{debug, info};
use thiserror::Error;

use crate::config::WingConfig;
use crate::normalize::CpRange;
use crate::slices::SlicePoint;

/// Load a normalized Cp image as 8-bit grayscale.
pub fn load_gray(path: impl AsRef<Path>) -> Result<GrayImage, ReconstructError> {
    let path = path.as_ref();
    let img = image::open(path)?.to_luma8();
    let (w, h) = img.dimensions();
    if w < 2 || h < 2 {
        return Err(ReconstructError::ImageTooSmall { width: w, height: h });
    }
    debug!("loaded {}x{} image from {}", w, h, path.display());
    Ok(img)
}

/// Map every pixel back to a `x_norm y_norm dcp` row.
///
/// Pixel gray levels map linearly through the global range (black = min,
/// white = max); y_norm is 0 at the image bottom (wing root) and 1 at the top.
/// The image must be at least 2x2 pixels so the coordinates have an extent.
pub fn image_to_table(
    img: &GrayImage,
    range: &CpRange,
) -> Result<Vec<SlicePoint>, ReconstructError> {
    let (w, h) = img.dimensions();
    if w < 2 || h < 2 {
        return Err(ReconstructError::ImageTooSmall { width: w, height: h });
    }
    let mut rows = Vec::with_capacity((w * h) as usize);
    for i in 0..h {
        for j in 0..w {
            let gray = img.get_pixel(j, i).0[0] as f64 / 255.0;
            rows.push(SlicePoint {
                x: j as f64 / (w - 1) as f64,
                y: 1.0 - i as f64 / (h - 1) as f64,
                dcp: range.from_unit(gray),
            });
        }
    }
    Ok(rows)
}

/// Sample the image on a `sections` × `points` grid, reproducing the layout
/// of the normalized tables (per station: y ascending in blocks, x across).
pub fn resample_grid(
    img: &GrayImage,
    range: &CpRange,
    sections: usize,
    points: usize,
) -> Result<Vec<SlicePoint>, ReconstructError> {
    if sections < 2 || points < 2 {
        return Err(ReconstructError::GridTooSmall { sections, points });
    }
    let (w, h) = img.dimensions();
    if w < 2 || h < 2 {
        return Err(ReconstructError::ImageTooSmall { width: w, height: h });
    }
    let mut rows = Vec::with_capacity(sections * points);
    for s in 0..sections {
        let i = (s as f64 * (h - 1) as f64 / (sections - 1) as f64) as u32;
        for p in 0..points {
            let j = (p as f64 * (w - 1) as f64 / (points - 1) as f64) as u32;
            let gray = img.get_pixel(j, i).0[0] as f64 / 255.0;
            rows.push(SlicePoint {
                x: j as f64 / (w - 1) as f64,
                y: 1.0 - i as f64 / (h - 1) as f64,
                dcp: range.from_unit(gray),
            });
        }
    }
    Ok(rows)
}

/// Map normalized rows back to meters using the configuration's planform.
///
/// y covers the semi-span, x is scaled by the local chord and shifted
/// downstream by the leading edge sweep.
pub fn denormalize(rows: &[SlicePoint], config: &WingConfig) -> Vec<SlicePoint> {
    let planform = config.planform();
    let tan_sweep = planform.sweep_rad.tan();
    rows.iter()
        .map(|row| {
            let y = row.y * planform.semi_span;
            let chord = planform.local_chord(y);
            SlicePoint {
                x: row.x * chord + y * tan_sweep,
                y,
                dcp: row.dcp,
            }
        })
        .collect()
}

/// Write rows as a space separated `x y dcp` table, 6 decimals.
pub fn write_table(path: impl AsRef<Path>, rows: &[SlicePoint]) -> Result<(), ReconstructError> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|source| ReconstructError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut writer = BufWriter::new(file);
    for row in rows {
        writeln!(writer, "{:.6} {:.6} {:.6}", row.x, row.y, row.dcp).map_err(|source| {
            ReconstructError::Io {
                path: path.display().to_string(),
                source,
            }
        })?;
    }
    writer.flush().map_err(|source| ReconstructError::Io {
        path: path.display().to_string(),
        source,
    })?;
    info!("wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

#[derive(Debug, Error)]
pub enum ReconstructError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error("image of {width}x{height} pixels is too small to reconstruct")]
    ImageTooSmall { width: u32, height: u32 },
    #[error("reconstruction grid of {sections}x{points} is too small")]
    GridTooSmall { sections: usize, points: usize },
}
