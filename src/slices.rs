use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use csv::WriterBuilder;
use log::{debug, info, warn};
use thiserror::Error;

/// Coordinates are rounded to 4 decimals, matching the slice file precision.
pub fn round4(value: f64) -> f64 {
    (value * 1e4).round() / 1e4
}

/// Integer key for a rounded coordinate, usable for exact grouping.
fn key4(value: f64) -> i64 {
    (value * 1e4).round() as i64
}

/// One Cp sample: a chordwise position, a spanwise position and the dCp
/// value there. Used for raw (meters) and normalized ([0, 1]) tables alike.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlicePoint {
    pub x: f64,
    pub y: f64,
    pub dcp: f64,
}

/// Parsed contents of a VSPAERO `.slc` Cp slice file.
///
/// The file is a sequence of `BLOCK Cut_<n>_at_Y:_<y>` headers, each followed
/// by rows of `x y z dCp` samples. Everything that is neither a block header
/// nor a 4-column numeric row is ignored.
#[derive(Debug, Clone)]
pub struct SliceData {
    points: Vec<SlicePoint>,
}

impl SliceData {
    pub fn parse_file(path: impl AsRef<Path>) -> Result<Self, SliceError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| SliceError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let data = Self::read(BufReader::new(file))?;
        debug!(
            "parsed {} Cp samples over {} stations from {}",
            data.points.len(),
            data.stations().len(),
            path.display()
        );
        Ok(data)
    }

    pub fn read(reader: impl BufRead) -> Result<Self, SliceError> {
        let mut points = Vec::new();
        let mut current_y = None;
        for line in reader.lines() {
            let line = line.map_err(|source| SliceError::Io {
                path: "<reader>".into(),
                source,
            })?;
            if let Some(y) = parse_block_header(&line) {
                current_y = Some(round4(y));
                continue;
            }
            let Some(y) = current_y else { continue };
            if let Some((x, dcp)) = parse_data_row(&line) {
                points.push(SlicePoint {
                    x: round4(x),
                    y,
                    dcp,
                });
            }
        }
        if points.is_empty() {
            warn!("slice input contained no Cp samples");
        }
        Ok(SliceData { points })
    }

    pub fn points(&self) -> &[SlicePoint] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Spanwise stations, ascending.
    pub fn stations(&self) -> Vec<f64> {
        let mut keys: Vec<i64> = self.points.iter().map(|p| key4(p.y)).collect();
        keys.sort_unstable();
        keys.dedup();
        keys.into_iter().map(|k| k as f64 / 1e4).collect()
    }

    /// Chordwise positions over all stations, descending.
    pub fn chord_positions(&self) -> Vec<f64> {
        let mut keys: Vec<i64> = self.points.iter().map(|p| key4(p.x)).collect();
        keys.sort_unstable_by(|a, b| b.cmp(a));
        keys.dedup();
        keys.into_iter().map(|k| k as f64 / 1e4).collect()
    }

    /// Cell lookup table keyed by (x, y); duplicate samples keep the last value.
    fn cells(&self) -> BTreeMap<(i64, i64), f64> {
        self.points
            .iter()
            .map(|p| ((key4(p.x), key4(p.y)), p.dcp))
            .collect()
    }

    /// Write the pivot table CSV: one row per chordwise x (descending), one
    /// column per station (ascending), blank cells where a station has no
    /// sample at that x.
    pub fn write_pivot(&self, path: impl AsRef<Path>) -> Result<(), SliceError> {
        let path = path.as_ref();
        if self.is_empty() {
            return Err(SliceError::NoData);
        }
        let stations = self.stations();
        let chords = self.chord_positions();
        let cells = self.cells();

        let file = File::create(path).map_err(|source| SliceError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut writer = WriterBuilder::new().from_writer(file);

        let mut header = vec!["X/Y".to_string()];
        header.extend(stations.iter().map(|y| format!("{y:.4}")));
        writer.write_record(&header)?;

        for &x in &chords {
            let mut record = vec![format!("{x:.4}")];
            for &y in &stations {
                record.push(match cells.get(&(key4(x), key4(y))) {
                    Some(dcp) => format!("{dcp:.4}"),
                    None => String::new(),
                });
            }
            writer.write_record(&record)?;
        }
        writer.flush().map_err(|source| SliceError::Io {
            path: path.display().to_string(),
            source,
        })?;
        info!("wrote pivot table to {}", path.display());
        Ok(())
    }

    /// The samples sorted by (station ascending, x descending) with duplicate
    /// (x, y) points collapsed to their last value.
    pub fn column_rows(&self) -> Vec<SlicePoint> {
        let mut unique: BTreeMap<(i64, i64), f64> = BTreeMap::new();
        for p in &self.points {
            unique.insert((key4(p.y), -key4(p.x)), p.dcp);
        }
        unique
            .into_iter()
            .map(|((y, neg_x), dcp)| SlicePoint {
                x: -neg_x as f64 / 1e4,
                y: y as f64 / 1e4,
                dcp,
            })
            .collect()
    }

    /// Write the tab separated `x y dCp` column file consumed by the
    /// normalization stage.
    pub fn write_columns(&self, path: impl AsRef<Path>) -> Result<(), SliceError> {
        let path = path.as_ref();
        if self.is_empty() {
            return Err(SliceError::NoData);
        }
        let file = File::create(path).map_err(|source| SliceError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        for p in self.column_rows() {
            writeln!(writer, "{:.4}\t{:.4}\t{:.4}", p.x, p.y, p.dcp).map_err(|source| {
                SliceError::Io {
                    path: path.display().to_string(),
                    source,
                }
            })?;
        }
        writer.flush().map_err(|source| SliceError::Io {
            path: path.display().to_string(),
            source,
        })?;
        info!("wrote column data to {}", path.display());
        Ok(())
    }
}

/// Load a column file written by [`SliceData::write_columns`].
pub fn read_columns(path: impl AsRef<Path>) -> Result<Vec<SlicePoint>, SliceError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| SliceError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut rows = Vec::new();
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| SliceError::Io {
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
            .map_err(|_| SliceError::MalformedRow {
                path: path.display().to_string(),
                line: number + 1,
            })?;
        if fields.len() != 3 {
            return Err(SliceError::MalformedRow {
                path: path.display().to_string(),
                line: number + 1,
            });
        }
        rows.push(SlicePoint {
            x: fields[0],
            y: fields[1],
            dcp: fields[2],
        });
    }
    Ok(rows)
}

fn parse_block_header(line: &str) -> Option<f64> {
    let rest = line.trim_start().strip_prefix("BLOCK Cut_")?;
    let (_, y) = rest.split_once("_at_Y:_")?;
    y.trim().parse().ok()
}

fn parse_data_row(line: &str) -> Option<(f64, f64)> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 4 {
        return None;
    }
    let values: Vec<f64> = fields
        .iter()
        .map(|f| f.parse())
        .collect::<Result<_, _>>()
        .ok()?;
    Some((values[0], values[3]))
}

#[derive(Debug, Error)]
pub enum SliceError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error("slice data contains no Cp samples")]
    NoData,
    #[error("malformed row in {path} at line {line}")]
    MalformedRow { path: String, line: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::io::Cursor;

    const EXAMPLE_SLC: &str = "\
Cp slices from VSPAERO
BLOCK Cut_1_at_Y:_0.0000
    x          y          z         dCp
    1.00000    0.00000    0.01200   -0.10000
    0.50000    0.00000    0.03100   -0.45000
    0.00000    0.00000    0.00000   -0.20000
BLOCK Cut_2_at_Y:_1.2500
    1.00000    1.25000    0.01100   -0.15000
    0.50000    1.25000    0.02800   -0.55000
    0.50000    1.25000    0.02800   -0.50000
    0.00000    1.25000    0.00000   -0.25000
";

    fn example() -> SliceData {
        SliceData::read(Cursor::new(EXAMPLE_SLC)).unwrap()
    }

    #[test]
    fn parses_blocks_and_rows() {
        let data = example();
        assert_eq!(data.points().len(), 7);
        assert_eq!(data.stations(), vec![0.0, 1.25]);
        assert_eq!(data.chord_positions(), vec![1.0, 0.5, 0.0]);
    }

    #[test]
    fn header_rows_and_preamble_are_skipped() {
        // the column header has 4 fields but is not numeric, the preamble has
        // a different shape; neither may produce points
        let data = example();
        assert!(data.points().iter().all(|p| p.x <= 1.0));
    }

    #[test]
    fn column_rows_are_sorted_and_deduplicated() {
        let rows = example().column_rows();
        // 7 samples, one duplicate (x=0.5 at y=1.25) collapsed
        assert_eq!(rows.len(), 6);
        for pair in rows.windows(2) {
            assert!(
                pair[0].y < pair[1].y || (pair[0].y == pair[1].y && pair[0].x > pair[1].x),
                "rows must be sorted by (y asc, x desc)"
            );
        }
        // last value wins for the duplicate
        let dup = rows
            .iter()
            .find(|p| p.y == 1.25 && p.x == 0.5)
            .unwrap();
        assert_abs_diff_eq!(dup.dcp, -0.5, epsilon = 1e-12);
    }

    #[test]
    fn pivot_has_descending_x_and_ascending_y() {
        let data = example();
        let path = std::env::temp_dir().join("cpwing_pivot_test.csv");
        data.write_pivot(&path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "X/Y,0.0000,1.2500");
        assert_eq!(lines[1], "1.0000,-0.1000,-0.1500");
        assert_eq!(lines[2], "0.5000,-0.4500,-0.5000");
        assert_eq!(lines[3], "0.0000,-0.2000,-0.2500");
    }

    #[test]
    fn pivot_leaves_missing_cells_blank() {
        let input = "\
BLOCK Cut_1_at_Y:_0.0000
    1.00000    0.00000    0.00000   -0.10000
BLOCK Cut_2_at_Y:_2.0000
    0.50000    2.00000    0.00000   -0.30000
";
        let data = SliceData::read(Cursor::new(input)).unwrap();
        let path = std::env::temp_dir().join("cpwing_pivot_blank_test.csv");
        data.write_pivot(&path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[1], "1.0000,-0.1000,");
        assert_eq!(lines[2], "0.5000,,-0.3000");
    }

    #[test]
    fn empty_input_is_rejected_on_write() {
        let data = SliceData::read(Cursor::new("no blocks here")).unwrap();
        assert!(data.is_empty());
        let path = std::env::temp_dir().join("cpwing_pivot_empty_test.csv");
        assert!(matches!(data.write_pivot(&path), Err(SliceError::NoData)));
    }

    #[test]
    fn coordinates_are_rounded_to_four_decimals() {
        let input = "\
BLOCK Cut_1_at_Y:_0.123456
    0.987654    0.12345    0.00000   -0.123456
";
        let data = SliceData::read(Cursor::new(input)).unwrap();
        let p = data.points()[0];
        assert_abs_diff_eq!(p.x, 0.9877, epsilon = 1e-12);
        assert_abs_diff_eq!(p.y, 0.1235, epsilon = 1e-12);
        // dCp keeps full precision
        assert_abs_diff_eq!(p.dcp, -0.123456, epsilon = 1e-12);
    }

    #[test]
    fn columns_file_round_trip() {
        let data = example();
        let path = std::env::temp_dir().join("cpwing_columns_test.txt");
        data.write_columns(&path).unwrap();
        let rows = read_columns(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(rows.len(), 6);
        assert_abs_diff_eq!(rows[0].x, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(rows[0].y, 0.0, epsilon = 1e-12);
    }
}
