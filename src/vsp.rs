use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info};
use thiserror::Error;

use crate::config::WingConfig;

/// Speed of sound at sea level [m/s], used to convert flight speed to Mach.
const SPEED_OF_SOUND: f64 = 343.0;

/// Intermediate files VSPAERO leaves behind after a run.
const INTERMEDIATES: [&str; 5] = [
    "VSPAERO_run.ada",
    "VSPAERO_run.fmt",
    "VSPAERO_run.key",
    "VSPAERO_run.res",
    "VSPAERO_run.vspgeom",
];

/// Drives the external OpenVSP `vspscript` executable: builds the wing
/// geometry, runs the vortex-lattice sweep and the Cp slicer, and collects
/// the `.slc` output under `<idx>.slc`.
///
/// The geometry kernel and the solver live entirely in OpenVSP; this type
/// only emits the parameter script and shuffles files.
#[derive(Debug, Clone)]
pub struct VspRunner {
    exe: PathBuf,
    work_dir: PathBuf,
    chordwise_panels: usize,
    spanwise_panels: usize,
    n_cuts: usize,
    alpha_deg: f64,
}

impl VspRunner {
    /// A runner with the study defaults: 20 chordwise and 15 spanwise
    /// panels, 20 Cp cuts over the semi-span, 2° angle of attack.
    pub fn new(exe: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        VspRunner {
            exe: exe.into(),
            work_dir: work_dir.into(),
            chordwise_panels: 20,
            spanwise_panels: 15,
            n_cuts: 20,
            alpha_deg: 2.0,
        }
    }

    /// update the number of Cp cuts; at least 2 are needed to span the wing
    pub fn n_cuts(&mut self, n: usize) -> &mut Self {
        self.n_cuts = n.max(2);
        self
    }

    pub fn alpha_deg(&mut self, alpha: f64) -> &mut Self {
        self.alpha_deg = alpha;
        self
    }

    /// Build and analyze one configuration, returning the path of the
    /// renamed `.slc` slice file.
    pub fn run(&self, idx: usize, config: &WingConfig) -> Result<PathBuf, VspError> {
        let script_path = self.work_dir.join(format!("drone_{idx}.vspscript"));
        std::fs::write(&script_path, self.script_source(idx, config)).map_err(|source| {
            VspError::Io {
                path: script_path.display().to_string(),
                source,
            }
        })?;
        info!(
            "running OpenVSP for configuration #{idx} (area {:.2} m², AR {:.2})",
            config.wing_area, config.aspect_ratio
        );

        let status = Command::new(&self.exe)
            .arg("-script")
            .arg(&script_path)
            .current_dir(&self.work_dir)
            .status()
            .map_err(|source| VspError::Spawn {
                exe: self.exe.display().to_string(),
                source,
            })?;
        if !status.success() {
            return Err(VspError::SolverFailed { idx, status });
        }

        let produced = self.work_dir.join(format!("drone_{idx}_DegenGeom.slc"));
        let target = self.work_dir.join(format!("{idx}.slc"));
        if !produced.exists() {
            return Err(VspError::MissingOutput {
                idx,
                path: produced.display().to_string(),
            });
        }
        std::fs::rename(&produced, &target).map_err(|source| VspError::Io {
            path: target.display().to_string(),
            source,
        })?;
        remove_intermediates(&self.work_dir);
        info!("saved Cp slice results as {}", target.display());
        Ok(target)
    }

    /// The vspscript source for one configuration, mirroring the parametric
    /// wing setup of the study: two sections, NACA-style camber, leading
    /// edge sweep, vortex-lattice sweep at fixed alpha plus a Cp slicer pass
    /// over the semi-span.
    pub fn script_source(&self, idx: usize, config: &WingConfig) -> String {
        let planform = config.planform();
        let mach = config.flight_speed / SPEED_OF_SOUND;

        let mut cuts = String::new();
        let step = planform.semi_span / (self.n_cuts - 1) as f64;
        for i in 0..self.n_cuts {
            if i > 0 {
                cuts.push_str(", ");
            }
            write!(cuts, "{:.6}", i as f64 * step).unwrap();
        }

        format!(
            r#"void main()
{{
    ClearVSPModel();
    string wing_id = AddGeom( "WING" );

    SetParmVal( wing_id, "XSec_Num", "XSec_1", 2 );
    SetParmVal( wing_id, "TotalArea", "WingGeom", {area} );
    SetParmVal( wing_id, "Aspect", "XSec_1", {half_ar} );
    SetParmVal( wing_id, "Taper", "XSec_1", {inv_taper} );
    SetParmVal( wing_id, "Sweep", "XSec_1", {sweep} );
    SetParmVal( wing_id, "Sweep_Location", "XSec_1", 0.0 );
    SetParmVal( wing_id, "X_Rel_Location", "XForm", 0.0 );

    SetParmVal( wing_id, "Root_Chord", "XSec_1", {root_chord} );
    SetParmVal( wing_id, "Tip_Chord", "XSec_2", {tip_chord} );
    SetParmVal( wing_id, "Span", "XSec_1", {semi_span} );

    SetParmVal( wing_id, "ThickChord", "XSecCurve_0", 0.12 );
    SetParmVal( wing_id, "Camber", "XSecCurve_0", 0.02 );
    SetParmVal( wing_id, "CamberLoc", "XSecCurve_0", 0.4 );
    SetParmVal( wing_id, "ThickChord", "XSecCurve_1", 0.12 );
    SetParmVal( wing_id, "Camber", "XSecCurve_1", 0.02 );
    SetParmVal( wing_id, "CamberLoc", "XSecCurve_1", 0.4 );

    SetParmVal( wing_id, "SectTess_U", "XSec_1", {spanwise} );
    SetParmVal( wing_id, "InCluster", "XSec_1", 0.9 );
    SetParmVal( wing_id, "OutCluster", "XSec_1", 0.4 );
    SetParmVal( wing_id, "NSlices", "XSec_1", {chordwise} );

    Update();
    WriteVSPFile( "drone_{idx}.vsp3" );

    SetAnalysisInputDefaults( "VSPAEROComputeGeometry" );
    SetIntAnalysisInput( "VSPAEROComputeGeometry", "AnalysisMethod", {{ VORTEX_LATTICE }} );
    ExecAnalysis( "VSPAEROComputeGeometry" );

    SetAnalysisInputDefaults( "VSPAEROSweep" );
    SetIntAnalysisInput( "VSPAEROSweep", "AnalysisMethod", {{ VORTEX_LATTICE }} );
    SetDoubleAnalysisInput( "VSPAEROSweep", "AlphaStart", {{ {alpha} }} );
    SetDoubleAnalysisInput( "VSPAEROSweep", "AlphaEnd", {{ {alpha} }} );
    SetIntAnalysisInput( "VSPAEROSweep", "AlphaNpts", {{ 1 }} );
    SetDoubleAnalysisInput( "VSPAEROSweep", "MachStart", {{ {mach} }} );
    ExecAnalysis( "VSPAEROSweep" );

    SetAnalysisInputDefaults( "CpSlicer" );
    SetIntAnalysisInput( "CpSlicer", "AnalysisMethod", {{ VORTEX_LATTICE }} );
    array<double> ycuts = {{ {cuts} }};
    SetDoubleAnalysisInput( "CpSlicer", "YSlicePosVec", ycuts );
    ExecAnalysis( "CpSlicer" );
}}
"#,
            area = config.wing_area,
            half_ar = config.aspect_ratio / 2.0,
            inv_taper = config.taper_ratio.powi(-1),
            sweep = config.sweep_angle,
            root_chord = planform.root_chord,
            tip_chord = planform.tip_chord,
            semi_span = planform.semi_span,
            spanwise = self.spanwise_panels,
            chordwise = self.chordwise_panels,
            idx = idx,
            alpha = self.alpha_deg,
            mach = mach,
            cuts = cuts,
        )
    }
}

/// Best effort removal of VSPAERO intermediates; failures only get a debug
/// line since the files may legitimately not exist.
pub fn remove_intermediates(dir: &Path) {
    for name in INTERMEDIATES {
        let path = dir.join(name);
        if let Err(err) = std::fs::remove_file(&path) {
            debug!("could not remove {}: {err}", path.display());
        }
    }
}

#[derive(Debug, Error)]
pub enum VspError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("could not start {exe}: {source}")]
    Spawn {
        exe: String,
        source: std::io::Error,
    },
    #[error("OpenVSP exited with {status} for configuration #{idx}")]
    SolverFailed {
        idx: usize,
        status: std::process::ExitStatus,
    },
    #[error("configuration #{idx} produced no slice file at {path}")]
    MissingOutput { idx: usize, path: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example_config() -> WingConfig {
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
    fn script_contains_the_geometry_parameters() {
        let runner = VspRunner::new("vspscript", ".");
        let script = runner.script_source(3, &example_config());
        assert!(script.contains(r#"SetParmVal( wing_id, "TotalArea", "WingGeom", 10 )"#));
        assert!(script.contains(r#""Aspect", "XSec_1", 2.5"#));
        // taper is passed to OpenVSP inverted
        assert!(script.contains(r#""Taper", "XSec_1", 0.5"#));
        assert!(script.contains(r#"WriteVSPFile( "drone_3.vsp3" )"#));
    }

    #[test]
    fn script_sets_the_flight_condition() {
        let runner = VspRunner::new("vspscript", ".");
        let script = runner.script_source(0, &example_config());
        let mach = 50.0 / SPEED_OF_SOUND;
        assert!(script.contains(&format!("MachStart\", {{ {mach} }}")));
        assert!(script.contains("\"AlphaStart\", { 2 }"));
    }

    #[test]
    fn cuts_cover_the_semi_span() {
        let mut runner = VspRunner::new("vspscript", ".");
        runner.n_cuts(5);
        let config = example_config();
        let script = runner.script_source(0, &config);
        let semi_span = config.planform().semi_span;
        assert!(script.contains("0.000000, "));
        assert!(script.contains(&format!("{semi_span:.6}")));
    }

    #[test]
    fn intermediate_cleanup_is_best_effort() {
        let dir = std::env::temp_dir().join("cpwing_vsp_cleanup_test");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("VSPAERO_run.ada"), b"x").unwrap();
        // the other intermediates are absent on purpose
        remove_intermediates(&dir);
        assert!(!dir.join("VSPAERO_run.ada").exists());
        std::fs::remove_dir_all(&dir).ok();
    }
}
