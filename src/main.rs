use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use rand::{rngs::StdRng, SeedableRng};

use cpwing::compare::Comparison;
use cpwing::config::{self, ParameterRanges};
use cpwing::interp::{self, StationField};
use cpwing::normalize::{CpRange, NormalizedGrid, CHORD_SAMPLES};
use cpwing::reconstruct;
use cpwing::slices;
use cpwing::vsp::VspRunner;
use cpwing::Pipeline;

#[derive(Parser, Debug)]
#[command(name = "cpwing")]
#[command(version)]
#[command(about = "Parametric wing Cp dataset pipeline around OpenVSP/VSPAERO")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sample wing configurations by Latin Hypercube and write the table
    Sample {
        /// Number of configurations
        #[arg(short, long, default_value_t = 10)]
        count: usize,
        /// RNG seed for reproducible sampling
        #[arg(long)]
        seed: Option<u64>,
        /// Output CSV path
        #[arg(short, long, default_value = "wing_configurations.csv")]
        out: PathBuf,
    },
    /// Run OpenVSP/VSPAERO for every configuration, producing <idx>.slc files
    Solve {
        /// Configuration table written by `sample`
        #[arg(short, long, default_value = "wing_configurations.csv")]
        configs: PathBuf,
        /// Path of the OpenVSP vspscript executable
        #[arg(long, default_value = "vspscript")]
        exe: PathBuf,
        /// Working directory for solver inputs and outputs
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },
    /// Reorganize one .slc slice file into a pivot CSV and a column table
    Organize {
        /// Input .slc file
        input: PathBuf,
        /// Pivot table CSV output
        #[arg(long, default_value = "pivot_table.csv")]
        pivot: PathBuf,
        /// Column (x y dCp) output
        #[arg(long, default_value = "columns.txt")]
        columns: PathBuf,
    },
    /// Scan column files for the global dCp minimum and maximum
    Extrema {
        /// Column files to scan
        files: Vec<PathBuf>,
    },
    /// Normalize one column file into a grayscale Cp image
    Normalize {
        /// Column (x y dCp) input
        input: PathBuf,
        /// PNG output
        output: PathBuf,
        /// Global dCp minimum (black)
        #[arg(long)]
        min: f64,
        /// Global dCp maximum (white)
        #[arg(long)]
        max: f64,
        /// Chordwise samples of the normalized grid
        #[arg(long, default_value_t = CHORD_SAMPLES)]
        samples: usize,
    },
    /// Run the full post-processing chain over a directory of <idx>.slc files
    Pipeline {
        /// Directory holding the slice files
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
        /// Number of configurations; detected from <idx>.slc files if omitted
        #[arg(short, long)]
        count: Option<usize>,
        /// Chordwise samples of the normalized grids
        #[arg(long, default_value_t = CHORD_SAMPLES)]
        samples: usize,
    },
    /// Convert a normalized Cp image back to a x y dCp table
    Reconstruct {
        /// Input PNG
        image: PathBuf,
        /// Output table
        out: PathBuf,
        /// Global dCp minimum the image was normalized with
        #[arg(long)]
        min: f64,
        /// Global dCp maximum the image was normalized with
        #[arg(long)]
        max: f64,
        /// Spanwise sections of the reconstruction grid
        #[arg(long, default_value_t = 20)]
        sections: usize,
        /// Chordwise points per section
        #[arg(long, default_value_t = 20)]
        points: usize,
        /// Emit one row per pixel instead of the sections x points grid
        #[arg(long)]
        dense: bool,
    },
    /// Map a normalized table back to coordinates in meters
    Denormalize {
        /// Normalized (x_norm y_norm dCp) table
        input: PathBuf,
        /// Output table with real coordinates
        out: PathBuf,
        /// Configuration table written by `sample`
        #[arg(short, long, default_value = "wing_configurations.csv")]
        configs: PathBuf,
        /// Index of the configuration the table belongs to
        #[arg(short, long)]
        index: usize,
    },
    /// Interpolate a base Cp table onto target points
    Interp {
        /// Base (x y dCp) column file
        base: PathBuf,
        /// Target (x y) point list
        targets: PathBuf,
        /// Output table
        #[arg(short, long, default_value = "interpolated.txt")]
        out: PathBuf,
    },
    /// Compare the Cp statistics of two tables
    Compare {
        first: PathBuf,
        second: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match args.command {
        Commands::Sample { count, seed, out } => {
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            let configs = config::sample_lhs(&ParameterRanges::default(), count, &mut rng);
            config::save_configs(&out, &configs)?;
        }
        Commands::Solve { configs, exe, dir } => {
            let configs = config::load_configs(&configs)?;
            let runner = VspRunner::new(exe, dir);
            for (idx, config) in configs.iter().enumerate() {
                runner
                    .run(idx, config)
                    .with_context(|| format!("configuration #{idx} failed"))?;
            }
            info!("all {} configurations solved", configs.len());
        }
        Commands::Organize {
            input,
            pivot,
            columns,
        } => {
            cpwing::organize(&input, &pivot, &columns)?;
        }
        Commands::Extrema { files } => {
            if files.is_empty() {
                bail!("no column files given");
            }
            let range = CpRange::scan_files(&files)?;
            println!("dcp_min = {:.6}", range.min);
            println!("dcp_max = {:.6}", range.max);
        }
        Commands::Normalize {
            input,
            output,
            min,
            max,
            samples,
        } => {
            let rows = slices::read_columns(&input)?;
            let grid = NormalizedGrid::from_rows(&rows, samples)?;
            grid.save_png(&output, &CpRange::new(min, max))?;
        }
        Commands::Pipeline { dir, count, samples } => {
            let mut pipeline = Pipeline::new(&dir);
            pipeline.chord_samples(samples);
            let count = count.unwrap_or_else(|| pipeline.detect_count());
            let range = pipeline.process(count)?;
            println!("dcp_min = {:.6}", range.min);
            println!("dcp_max = {:.6}", range.max);
        }
        Commands::Reconstruct {
            image,
            out,
            min,
            max,
            sections,
            points,
            dense,
        } => {
            let img = reconstruct::load_gray(&image)?;
            let range = CpRange::new(min, max);
            let rows = if dense {
                reconstruct::image_to_table(&img, &range)?
            } else {
                reconstruct::resample_grid(&img, &range, sections, points)?
            };
            reconstruct::write_table(&out, &rows)?;
        }
        Commands::Denormalize {
            input,
            out,
            configs,
            index,
        } => {
            let configs = config::load_configs(&configs)?;
            let Some(config) = configs.get(index) else {
                bail!("configuration index {index} out of range ({} loaded)", configs.len());
            };
            let rows = slices::read_columns(&input)?;
            let real = reconstruct::denormalize(&rows, config);
            reconstruct::write_table(&out, &real)?;
            let planform = config.planform();
            info!(
                "planform: span {:.3} m, root chord {:.3} m, tip chord {:.3} m, sweep {:.2}°",
                planform.span, planform.root_chord, planform.tip_chord, config.sweep_angle
            );
        }
        Commands::Interp { base, targets, out } => {
            let rows = slices::read_columns(&base)?;
            let field = StationField::new(&rows)?;
            let targets = interp::read_targets(&targets)?;
            let results = field.interp_points(&targets);
            interp::write_results(&out, &results)?;
        }
        Commands::Compare { first, second } => {
            let a = slices::read_columns(&first)?;
            let b = slices::read_columns(&second)?;
            println!("{}", Comparison::of(&a, &b)?);
        }
    }
    Ok(())
}
