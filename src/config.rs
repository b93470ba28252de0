use std::fs::File;
use std::path::Path;

use csv::{ReaderBuilder, WriterBuilder};
use log::info;
use ndarray::{Array2, ArrayView1, Axis};
use ndarray_csv::{Array2Reader, Array2Writer};
use rand::Rng;
use thiserror::Error;

/// Number of columns in a configuration table:
/// `[area, aspect_ratio, taper_ratio, sweep, spars, ribs, speed, density]`
pub const N_PARAMS: usize = 8;

/// A single sampled wing configuration.
///
/// Spar and rib counts are carried as floats so the table stays a plain
/// `Array2<f64>`; they are structural metadata and do not affect the
/// aerodynamic pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WingConfig {
    /// Wing reference area [m²]
    pub wing_area: f64,
    /// Aspect ratio of the full wing
    pub aspect_ratio: f64,
    /// Taper ratio, root chord over tip chord (> 1)
    pub taper_ratio: f64,
    /// Leading edge sweep [deg]
    pub sweep_angle: f64,
    pub num_spars: f64,
    pub num_ribs: f64,
    /// Flight speed [m/s]
    pub flight_speed: f64,
    /// Air density [kg/m³]
    pub air_density: f64,
}

impl WingConfig {
    /// Planform dimensions derived from area, aspect ratio and taper.
    pub fn planform(&self) -> Planform {
        let span = (self.aspect_ratio * self.wing_area).sqrt();
        let tip_chord = 2.0 * self.wing_area / (span * (1.0 + self.taper_ratio));
        let root_chord = tip_chord * self.taper_ratio;
        Planform {
            span,
            semi_span: span / 2.0,
            root_chord,
            tip_chord,
            sweep_rad: self.sweep_angle.to_radians(),
        }
    }

    pub fn from_row(row: ArrayView1<f64>) -> Result<Self, ConfigError> {
        if row.len() != N_PARAMS {
            return Err(ConfigError::RowLength(row.len()));
        }
        Ok(WingConfig {
            wing_area: row[0],
            aspect_ratio: row[1],
            taper_ratio: row[2],
            sweep_angle: row[3],
            num_spars: row[4],
            num_ribs: row[5],
            flight_speed: row[6],
            air_density: row[7],
        })
    }

    pub fn to_row(&self) -> [f64; N_PARAMS] {
        [
            self.wing_area,
            self.aspect_ratio,
            self.taper_ratio,
            self.sweep_angle,
            self.num_spars,
            self.num_ribs,
            self.flight_speed,
            self.air_density,
        ]
    }
}

/// Physical wing dimensions for one configuration.
#[derive(Debug, Clone, Copy)]
pub struct Planform {
    /// Full wingspan [m]
    pub span: f64,
    /// Half span, the extent of the Cp slice sweep [m]
    pub semi_span: f64,
    /// Root chord [m]
    pub root_chord: f64,
    /// Tip chord [m]
    pub tip_chord: f64,
    /// Leading edge sweep [rad]
    pub sweep_rad: f64,
}

impl Planform {
    /// Chord at spanwise position `y` (linear taper between root and tip).
    pub fn local_chord(&self, y: f64) -> f64 {
        self.root_chord + (self.tip_chord - self.root_chord) * (y / self.semi_span)
    }
}

/// Sampling ranges for the variable parameters and values for the fixed ones.
#[derive(Debug, Clone)]
pub struct ParameterRanges {
    pub wing_area: (f64, f64),
    pub aspect_ratio: (f64, f64),
    pub taper_ratio: (f64, f64),
    pub sweep_angle: (f64, f64),
    pub num_spars: (f64, f64),
    pub num_ribs: (f64, f64),
    pub flight_speed: f64,
    pub air_density: f64,
}

impl Default for ParameterRanges {
    fn default() -> Self {
        ParameterRanges {
            wing_area: (5.0, 15.0),
            aspect_ratio: (4.0, 15.0),
            taper_ratio: (1.0, 4.0),
            sweep_angle: (0.0, 30.0),
            num_spars: (1.0, 5.0),
            num_ribs: (1.0, 5.0),
            flight_speed: 50.0,
            air_density: 1.204,
        }
    }
}

impl ParameterRanges {
    fn variable(&self) -> [(f64, f64); 6] {
        [
            self.wing_area,
            self.aspect_ratio,
            self.taper_ratio,
            self.sweep_angle,
            self.num_spars,
            self.num_ribs,
        ]
    }
}

/// Sample `n` configurations by Latin Hypercube Sampling.
///
/// Each variable dimension is split into `n` equal strata and every stratum
/// receives exactly one sample, with independent random permutations per
/// dimension. The fixed flight condition is appended to every row.
pub fn sample_lhs<R: Rng>(ranges: &ParameterRanges, n: usize, rng: &mut R) -> Vec<WingConfig> {
    use rand::seq::SliceRandom;

    let ranges_var = ranges.variable();
    let mut unit = Array2::zeros((n, ranges_var.len()));
    for dim in 0..ranges_var.len() {
        let mut strata: Vec<usize> = (0..n).collect();
        strata.shuffle(rng);
        for (row, &stratum) in strata.iter().enumerate() {
            unit[(row, dim)] = (stratum as f64 + rng.gen::<f64>()) / n as f64;
        }
    }

    (0..n)
        .map(|i| {
            let scaled: Vec<f64> = ranges_var
                .iter()
                .enumerate()
                .map(|(dim, &(low, high))| low + (high - low) * unit[(i, dim)])
                .collect();
            WingConfig {
                wing_area: scaled[0],
                aspect_ratio: scaled[1],
                taper_ratio: scaled[2],
                sweep_angle: scaled[3],
                num_spars: scaled[4],
                num_ribs: scaled[5],
                flight_speed: ranges.flight_speed,
                air_density: ranges.air_density,
            }
        })
        .collect()
}

/// Write a configuration table as headerless CSV, one row per configuration.
pub fn save_configs(path: impl AsRef<Path>, configs: &[WingConfig]) -> Result<(), ConfigError> {
    let path = path.as_ref();
    let mut table = Array2::zeros((configs.len(), N_PARAMS));
    for (mut row, config) in table.axis_iter_mut(Axis(0)).zip(configs) {
        for (cell, value) in row.iter_mut().zip(config.to_row()) {
            *cell = value;
        }
    }
    let file = File::create(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
    writer.serialize_array2(&table)?;
    info!("saved {} configurations to {}", configs.len(), path.display());
    Ok(())
}

/// Load a configuration table written by [`save_configs`].
pub fn load_configs(path: impl AsRef<Path>) -> Result<Vec<WingConfig>, ConfigError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(file);
    let table: Array2<f64> = reader.deserialize_array2_dynamic()?;
    table
        .axis_iter(Axis(0))
        .map(WingConfig::from_row)
        .collect()
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Shape(#[from] ndarray_csv::ReadError),
    #[error("a configuration row must contain {N_PARAMS} values, got {0}")]
    RowLength(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::{rngs::StdRng, SeedableRng};

    fn example() -> WingConfig {
        WingConfig {
            wing_area: 10.0,
            aspect_ratio: 5.0,
            taper_ratio: 2.0,
            sweep_angle: 10.0,
            num_spars: 3.0,
            num_ribs: 4.0,
            flight_speed: 50.0,
            air_density: 1.204,
        }
    }

    #[test]
    fn planform_dimensions() {
        let planform = example().planform();
        // span = sqrt(5 * 10), tip = 2*10/(span*3), root = 2*tip
        assert_abs_diff_eq!(planform.span, 50.0_f64.sqrt(), epsilon = 1e-12);
        let tip = 20.0 / (planform.span * 3.0);
        assert_abs_diff_eq!(planform.tip_chord, tip, epsilon = 1e-12);
        assert_abs_diff_eq!(planform.root_chord, 2.0 * tip, epsilon = 1e-12);
        assert_abs_diff_eq!(
            planform.local_chord(planform.semi_span),
            planform.tip_chord,
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(planform.local_chord(0.0), planform.root_chord, epsilon = 1e-12);
    }

    #[test]
    fn row_round_trip() {
        let config = example();
        let row = config.to_row();
        let back = WingConfig::from_row(array![
            row[0], row[1], row[2], row[3], row[4], row[5], row[6], row[7]
        ]
        .view())
        .unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn row_length_is_checked() {
        let result = WingConfig::from_row(array![1.0, 2.0].view());
        assert!(matches!(result, Err(ConfigError::RowLength(2))));
    }

    #[test]
    fn lhs_covers_every_stratum() {
        let ranges = ParameterRanges::default();
        let mut rng = StdRng::seed_from_u64(42);
        let n = 16;
        let configs = sample_lhs(&ranges, n, &mut rng);
        assert_eq!(configs.len(), n);

        // one sample per stratum in the wing area dimension
        let (low, high) = ranges.wing_area;
        let mut strata = vec![0usize; n];
        for config in &configs {
            assert!(config.wing_area >= low && config.wing_area < high);
            let stratum = ((config.wing_area - low) / (high - low) * n as f64) as usize;
            strata[stratum] += 1;
        }
        assert!(strata.iter().all(|&count| count == 1));

        for config in &configs {
            assert_eq!(config.flight_speed, ranges.flight_speed);
            assert_eq!(config.air_density, ranges.air_density);
        }
    }

    #[test]
    fn csv_round_trip() {
        let mut rng = StdRng::seed_from_u64(7);
        let configs = sample_lhs(&ParameterRanges::default(), 5, &mut rng);
        let path = std::env::temp_dir().join("cpwing_config_round_trip.csv");
        save_configs(&path, &configs).unwrap();
        let back = load_configs(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(configs.len(), back.len());
        for (a, b) in configs.iter().zip(&back) {
            assert_abs_diff_eq!(a.wing_area, b.wing_area, epsilon = 1e-9);
            assert_abs_diff_eq!(a.sweep_angle, b.sweep_angle, epsilon = 1e-9);
        }
    }
}
