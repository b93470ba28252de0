use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use log::info;
use ndarray::{Array1, s};
use ndarray_interp::interp1d::{Interp1D, Linear};
use thiserror::Error;

use crate::normalize::station_profiles;
use crate::slices::SlicePoint;

/// A Cp field sampled along spanwise stations, queryable at arbitrary
/// (x, y) points.
///
/// Queries interpolate linearly along the two bracketing stations and blend
/// linearly between them. Points outside the station envelope or the
/// chordwise extent of a bracketing station evaluate to NaN; there is no
/// extrapolation.
#[derive(Debug)]
pub struct StationField {
    /// station y positions, ascending
    y: Vec<f64>,
    /// per station: chordwise positions ascending and the dCp values
    profiles: Vec<(Array1<f64>, Array1<f64>)>,
}

impl StationField {
    pub fn new(rows: &[SlicePoint]) -> Result<Self, InterpError> {
        let stations = station_profiles(rows);
        if stations.len() < 2 {
            return Err(InterpError::TooFewStations(stations.len()));
        }
        let mut y = Vec::with_capacity(stations.len());
        let mut profiles = Vec::with_capacity(stations.len());
        for station in &stations {
            if station.x.len() < 2 {
                return Err(InterpError::TooFewPoints {
                    y: station.y,
                    count: station.x.len(),
                });
            }
            y.push(station.y);
            profiles.push((
                station.x.slice(s![..;-1]).to_owned(),
                station.dcp.slice(s![..;-1]).to_owned(),
            ));
        }
        Ok(StationField { y, profiles })
    }

    /// dCp at one station, NaN outside its chordwise range.
    fn at_station(&self, index: usize, x: f64) -> f64 {
        let (xs, dcp) = &self.profiles[index];
        Interp1D::new_unchecked(xs.view(), dcp.view(), Linear::new())
            .interp_scalar(x)
            .unwrap_or(f64::NAN)
    }

    /// Interpolated dCp at (x, y), NaN outside the data.
    pub fn interp(&self, x: f64, y: f64) -> f64 {
        let n = self.y.len();
        if y < self.y[0] || y > self.y[n - 1] {
            return f64::NAN;
        }
        let upper = self.y.partition_point(|&station| station < y);
        if upper == 0 {
            return self.at_station(0, x);
        }
        if let Some(&exact) = self.y.get(upper) {
            if exact == y {
                return self.at_station(upper, x);
            }
        }
        let lower = upper - 1;
        let t = (y - self.y[lower]) / (self.y[upper] - self.y[lower]);
        let v0 = self.at_station(lower, x);
        let v1 = self.at_station(upper, x);
        v0 + (v1 - v0) * t
    }

    /// Interpolate a list of target points.
    pub fn interp_points(&self, targets: &[(f64, f64)]) -> Vec<SlicePoint> {
        targets
            .iter()
            .map(|&(x, y)| SlicePoint {
                x,
                y,
                dcp: self.interp(x, y),
            })
            .collect()
    }
}

/// Read a whitespace separated `x y` target point list.
pub fn read_targets(path: impl AsRef<Path>) -> Result<Vec<(f64, f64)>, InterpError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| InterpError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut targets = Vec::new();
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| InterpError::Io {
            path: path.display().to_string(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<f64> = line
            .split_whitespace()
            .map(str::parse)
            .collect::<Result<_, _>>()
            .map_err(|_| InterpError::MalformedRow {
                path: path.display().to_string(),
                line: number + 1,
            })?;
        if fields.len() < 2 {
            return Err(InterpError::MalformedRow {
                path: path.display().to_string(),
                line: number + 1,
            });
        }
        targets.push((fields[0], fields[1]));
    }
    Ok(targets)
}

/// Write interpolation results as a tab separated `x y dCp` table.
pub fn write_results(path: impl AsRef<Path>, rows: &[SlicePoint]) -> Result<(), InterpError> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|source| InterpError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut writer = BufWriter::new(file);
    for row in rows {
        writeln!(writer, "{:.6}\t{:.6}\t{:.6}", row.x, row.y, row.dcp).map_err(|source| {
            InterpError::Io {
                path: path.display().to_string(),
                source,
            }
        })?;
    }
    writer.flush().map_err(|source| InterpError::Io {
        path: path.display().to_string(),
        source,
    })?;
    info!("wrote {} interpolated points to {}", rows.len(), path.display());
    Ok(())
}

#[derive(Debug, Error)]
pub enum InterpError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed row in {path} at line {line}")]
    MalformedRow { path: String, line: usize },
    #[error("need at least 2 spanwise stations, got {0}")]
    TooFewStations(usize),
    #[error("station at y = {y} has only {count} points, need at least 2")]
    TooFewPoints { y: f64, count: usize },
}
