use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use image::{GrayImage, Luma};
use itertools::Itertools;
use log::{debug, info, warn};
use ndarray::{s, Array, Array1, Array2, Axis};
use ndarray_interp::interp1d::{CubicSpline, Interp1D};
use thiserror::Error;

use crate::slices::SlicePoint;

/// Chordwise sample count of the normalized grid, matching the slicer's
/// 20 panel chordwise resolution.
pub const CHORD_SAMPLES: usize = 20;

/// Global dCp extrema over the whole dataset, the gray scale anchors.
///
/// Black maps to `min`, white to `max` in every generated image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpRange {
    pub min: f64,
    pub max: f64,
}

impl Default for CpRange {
    fn default() -> Self {
        CpRange {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl CpRange {
    pub fn new(min: f64, max: f64) -> Self {
        CpRange { min, max }
    }

    pub fn is_valid(&self) -> bool {
        self.max > self.min
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    /// Map a dCp value into [0, 1], clamped at the range edges.
    pub fn to_unit(&self, dcp: f64) -> f64 {
        ((dcp - self.min) / self.span()).clamp(0.0, 1.0)
    }

    /// Map a unit value back into the dCp range.
    pub fn from_unit(&self, unit: f64) -> f64 {
        unit * self.span() + self.min
    }

    /// Widen the range with the third column of a column file.
    ///
    /// Blank lines and rows whose third field is not numeric are skipped, the
    /// way hand-edited dataset files tend to need.
    pub fn update_from_file(&mut self, path: impl AsRef<Path>) -> Result<(), NormalizeError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| NormalizeError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut found = false;
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|source| NormalizeError::Io {
                path: path.display().to_string(),
                source,
            })?;
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 3 {
                continue;
            }
            let Ok(dcp) = fields[2].parse::<f64>() else {
                continue;
            };
            found = true;
            if dcp < self.min {
                self.min = dcp;
            }
            if dcp > self.max {
                self.max = dcp;
            }
        }
        if !found {
            warn!("no numeric dCp values in {}", path.display());
        }
        Ok(())
    }

    /// Scan a set of column files for the global extrema.
    pub fn scan_files<P: AsRef<Path>>(
        paths: impl IntoIterator<Item = P>,
    ) -> Result<CpRange, NormalizeError> {
        let mut range = CpRange::default();
        for path in paths {
            range.update_from_file(path)?;
        }
        if !range.is_valid() {
            return Err(NormalizeError::DegenerateRange {
                min: range.min,
                max: range.max,
            });
        }
        info!("global dCp range: [{:.4}, {:.4}]", range.min, range.max);
        Ok(range)
    }
}

/// The dCp samples of one spanwise cut, chordwise x strictly descending.
#[derive(Debug, Clone)]
pub struct StationProfile {
    pub y: f64,
    pub x: Array1<f64>,
    pub dcp: Array1<f64>,
}

/// Group column rows into per-station profiles.
///
/// Rows are expected in column file order (y ascending, x descending within a
/// station); repeated x positions within a station keep the first sample.
pub fn station_profiles(rows: &[SlicePoint]) -> Vec<StationProfile> {
    let groups = rows.iter().group_by(|row| row.y);
    let mut profiles = Vec::new();
    for (y, group) in &groups {
        let mut x: Vec<f64> = Vec::new();
        let mut dcp = Vec::new();
        for row in group {
            if let Some(&last) = x.last() {
                if row.x >= last {
                    // duplicate chord position, keep the first value
                    continue;
                }
            }
            x.push(row.x);
            dcp.push(row.dcp);
        }
        profiles.push(StationProfile {
            y,
            x: Array1::from(x),
            dcp: Array1::from(dcp),
        });
    }
    profiles
}

/// Resample a station profile onto `n` uniform chordwise positions with a
/// cubic spline. Input and output are x-descending.
pub fn resample_station(
    profile: &StationProfile,
    n: usize,
) -> Result<(Array1<f64>, Array1<f64>), NormalizeError> {
    if n < 2 {
        return Err(NormalizeError::TooFewSamples(n));
    }
    let len = profile.x.len();
    if len < 3 {
        return Err(NormalizeError::TooFewPoints {
            y: profile.y,
            count: len,
        });
    }
    let x_asc = profile.x.slice(s![..;-1]).to_owned();
    let dcp_asc = profile.dcp.slice(s![..;-1]).to_owned();
    let interpolator = Interp1D::builder(dcp_asc)
        .x(x_asc)
        .strategy(CubicSpline::new())
        .build()?;
    let grid = Array::linspace(profile.x[len - 1], profile.x[0], n);
    let resampled = interpolator.interp_array(&grid)?;
    Ok((
        grid.slice(s![..;-1]).to_owned(),
        resampled.slice(s![..;-1]).to_owned(),
    ))
}

fn scale_unit(values: &Array1<f64>, min: f64, max: f64) -> Array1<f64> {
    values.mapv(|v| (v - min) / (max - min))
}

/// A wing Cp distribution resampled onto a uniform stations × chord grid with
/// coordinates min-max scaled to [0, 1].
///
/// Stations run root to tip along the first axis; within a station the arrays
/// are x-descending, so `x_norm` runs 1 at index 0 down to 0.
#[derive(Debug, Clone)]
pub struct NormalizedGrid {
    pub y_norm: Array1<f64>,
    pub x_norm: Array2<f64>,
    pub dcp: Array2<f64>,
}

impl NormalizedGrid {
    /// Build the grid from column rows, resampling each station to `n` points.
    pub fn from_rows(rows: &[SlicePoint], n: usize) -> Result<Self, NormalizeError> {
        let profiles = station_profiles(rows);
        if profiles.len() < 2 {
            return Err(NormalizeError::TooFewStations(profiles.len()));
        }

        let mut x_norm = Array2::zeros((profiles.len(), n));
        let mut dcp = Array2::zeros((profiles.len(), n));
        for (i, profile) in profiles.iter().enumerate() {
            let (x, p) = resample_station(profile, n)?;
            let (max, min) = (x[0], x[n - 1]);
            if !(max > min) {
                return Err(NormalizeError::DegenerateStation { y: profile.y });
            }
            x_norm.row_mut(i).assign(&scale_unit(&x, min, max));
            dcp.row_mut(i).assign(&p);
        }

        let stations = Array1::from_iter(profiles.iter().map(|p| p.y));
        let (root, tip) = (stations[0], stations[stations.len() - 1]);
        if !(tip > root) {
            return Err(NormalizeError::DegenerateStation { y: root });
        }
        let y_norm = scale_unit(&stations, root, tip);
        debug!(
            "normalized grid: {} stations x {} chord samples",
            profiles.len(),
            n
        );
        Ok(NormalizedGrid { y_norm, x_norm, dcp })
    }

    pub fn n_stations(&self) -> usize {
        self.dcp.nrows()
    }

    pub fn n_chord(&self) -> usize {
        self.dcp.ncols()
    }

    /// Rasterize to an 8-bit grayscale image.
    ///
    /// Pixel columns run leading edge (x_norm 0) to trailing edge, rows run
    /// tip (top) to root (bottom); black is `range.min`, white `range.max`.
    pub fn to_image(&self, range: &CpRange) -> Result<GrayImage, NormalizeError> {
        if !range.is_valid() {
            return Err(NormalizeError::DegenerateRange {
                min: range.min,
                max: range.max,
            });
        }
        let (h, w) = (self.n_stations() as u32, self.n_chord() as u32);
        let mut img = GrayImage::new(w, h);
        for (row, station) in self.dcp.axis_iter(Axis(0)).enumerate() {
            let py = h - 1 - row as u32;
            for (col, &dcp) in station.iter().enumerate() {
                // arrays are x-descending, pixel columns x-ascending
                let px = w - 1 - col as u32;
                let value = (range.to_unit(dcp) * 255.0).round() as u8;
                img.put_pixel(px, py, Luma([value]));
            }
        }
        Ok(img)
    }

    pub fn save_png(
        &self,
        path: impl AsRef<Path>,
        range: &CpRange,
    ) -> Result<(), NormalizeError> {
        let path = path.as_ref();
        self.to_image(range)?.save(path)?;
        info!("wrote normalized Cp image to {}", path.display());
        Ok(())
    }

    /// Write the grid as a `x_norm y_norm dcp` table in column file order.
    pub fn write_table(&self, path: impl AsRef<Path>) -> Result<(), NormalizeError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| NormalizeError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        for (i, station) in self.dcp.axis_iter(Axis(0)).enumerate() {
            for (k, &dcp) in station.iter().enumerate() {
                writeln!(
                    writer,
                    "{:.6} {:.6} {:.6}",
                    self.x_norm[(i, k)],
                    self.y_norm[i],
                    dcp
                )
                .map_err(|source| NormalizeError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
            }
        }
        writer.flush().map_err(|source| NormalizeError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("station at y = {y} has only {count} distinct points, need at least 3")]
    TooFewPoints { y: f64, count: usize },
    #[error("chord sample count {0} is too small, need at least 2")]
    TooFewSamples(usize),
    #[error("need at least 2 spanwise stations, got {0}")]
    TooFewStations(usize),
    #[error("station at y = {y} has no chordwise extent")]
    DegenerateStation { y: f64 },
    #[error("dCp range [{min}, {max}] cannot be normalized")]
    DegenerateRange { min: f64, max: f64 },
    #[error(transparent)]
    Builder(#[from] ndarray_interp::BuilderError),
    #[error(transparent)]
    Interpolate(#[from] ndarray_interp::InterpolateError),
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn rows_linear(stations: &[f64], xs: &[f64]) -> Vec<SlicePoint> {
        // dcp = -(x + y), linear in both directions
        let mut rows = Vec::new();
        for &y in stations {
            for &x in xs {
                rows.push(SlicePoint { x, y, dcp: -(x + y) });
            }
        }
        rows
    }

    #[test]
    fn range_scan_skips_junk() {
        let path = std::env::temp_dir().join("cpwing_range_scan.txt");
        std::fs::write(
            &path,
            "1.0\t0.0\t-0.5\n\n# comment line\n1.0\t0.0\tnot_a_number\n0.5\t0.0\t-1.5\n0.0\t0.0\t0.25\n",
        )
        .unwrap();
        let range = CpRange::scan_files([&path]).unwrap();
        std::fs::remove_file(&path).ok();
        assert_abs_diff_eq!(range.min, -1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(range.max, 0.25, epsilon = 1e-12);
    }

    #[test]
    fn range_scan_missing_file_is_an_error() {
        let mut range = CpRange::default();
        assert!(range
            .update_from_file("/nonexistent/cpwing_range.txt")
            .is_err());
    }

    #[test]
    fn unit_mapping_round_trips() {
        let range = CpRange::new(-2.0, -0.5);
        assert_abs_diff_eq!(range.to_unit(-2.0), 0.0);
        assert_abs_diff_eq!(range.to_unit(-0.5), 1.0);
        assert_abs_diff_eq!(range.from_unit(range.to_unit(-1.3)), -1.3, epsilon = 1e-12);
        // out of range values clamp
        assert_abs_diff_eq!(range.to_unit(-3.0), 0.0);
    }

    #[test]
    fn stations_are_grouped_and_deduplicated() {
        let mut rows = rows_linear(&[0.0, 1.0], &[1.0, 0.5, 0.0]);
        // duplicate chord position within the first station
        rows.insert(1, SlicePoint { x: 1.0, y: 0.0, dcp: -99.0 });
        let profiles = station_profiles(&rows);
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].x.len(), 3);
        assert_abs_diff_eq!(profiles[0].dcp[0], -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(profiles[1].y, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn resample_preserves_linear_profiles() {
        let profile = StationProfile {
            y: 0.0,
            x: Array1::from(vec![1.0, 0.75, 0.5, 0.25, 0.0]),
            dcp: Array1::from(vec![3.0, 2.5, 2.0, 1.5, 1.0]),
        };
        let (x, p) = resample_station(&profile, CHORD_SAMPLES).unwrap();
        assert_eq!(x.len(), CHORD_SAMPLES);
        assert_abs_diff_eq!(x[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(x[CHORD_SAMPLES - 1], 0.0, epsilon = 1e-12);
        for (&xi, &pi) in x.iter().zip(p.iter()) {
            assert_abs_diff_eq!(pi, 2.0 * xi + 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn too_few_chord_samples_is_an_error() {
        let rows = rows_linear(&[0.0, 1.0], &[1.0, 0.5, 0.0]);
        assert!(matches!(
            NormalizedGrid::from_rows(&rows, 0),
            Err(NormalizeError::TooFewSamples(0))
        ));
        let profile = StationProfile {
            y: 0.0,
            x: Array1::from(vec![1.0, 0.5, 0.0]),
            dcp: Array1::from(vec![0.0, 0.0, 0.0]),
        };
        assert!(matches!(
            resample_station(&profile, 1),
            Err(NormalizeError::TooFewSamples(1))
        ));
    }

    #[test]
    fn too_few_points_is_an_error() {
        let profile = StationProfile {
            y: 1.5,
            x: Array1::from(vec![1.0, 0.0]),
            dcp: Array1::from(vec![0.0, 0.0]),
        };
        assert!(matches!(
            resample_station(&profile, CHORD_SAMPLES),
            Err(NormalizeError::TooFewPoints { count: 2, .. })
        ));
    }

    #[test]
    fn grid_coordinates_are_unit_scaled() {
        let rows = rows_linear(&[0.0, 0.6, 1.2], &[0.8, 0.6, 0.4, 0.2, 0.0]);
        let grid = NormalizedGrid::from_rows(&rows, 10).unwrap();
        assert_eq!(grid.n_stations(), 3);
        assert_eq!(grid.n_chord(), 10);
        assert_abs_diff_eq!(grid.y_norm[0], 0.0);
        assert_abs_diff_eq!(grid.y_norm[2], 1.0);
        assert_abs_diff_eq!(grid.y_norm[1], 0.5, epsilon = 1e-12);
        for row in grid.x_norm.axis_iter(Axis(0)) {
            assert_abs_diff_eq!(row[0], 1.0, epsilon = 1e-12);
            assert_abs_diff_eq!(row[9], 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn image_orientation_and_gray_levels() {
        let rows = rows_linear(&[0.0, 1.0], &[1.0, 0.75, 0.5, 0.25, 0.0]);
        let grid = NormalizedGrid::from_rows(&rows, 5).unwrap();
        let range = CpRange::new(-2.0, 0.0);
        let img = grid.to_image(&range).unwrap();
        assert_eq!(img.dimensions(), (5, 2));

        // bottom row is the root station, left column the leading edge:
        // dcp(x=0, y=0) = 0 -> white
        assert_eq!(img.get_pixel(0, 1).0[0], 255);
        // top right is the tip trailing edge: dcp(x=1, y=1) = -2 -> black
        assert_eq!(img.get_pixel(4, 0).0[0], 0);
        // root trailing edge: dcp = -1 -> mid gray
        assert_eq!(img.get_pixel(4, 1).0[0], 128);
    }

    #[test]
    fn degenerate_range_is_rejected() {
        let rows = rows_linear(&[0.0, 1.0], &[1.0, 0.5, 0.0]);
        let grid = NormalizedGrid::from_rows(&rows, 5).unwrap();
        let range = CpRange::new(-1.0, -1.0);
        assert!(matches!(
            grid.to_image(&range),
            Err(NormalizeError::DegenerateRange { .. })
        ));
    }

    #[test]
    fn single_station_is_rejected() {
        let rows = rows_linear(&[0.5], &[1.0, 0.5, 0.0]);
        assert!(matches!(
            NormalizedGrid::from_rows(&rows, 5),
            Err(NormalizeError::TooFewStations(1))
        ));
    }
}
