use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::TempDir;

/// Normalised print estimate produced from one slicer run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlicingResult {
    print_time_minutes: u32,
    filament_weight_grams: f64,
    layer_count: Option<u32>,
}

impl SlicingResult {
    /// Returns `None` when the weight is negative or not finite.
    pub fn new(print_time_minutes: u32, filament_weight_grams: f64) -> Option<Self> {
        if !filament_weight_grams.is_finite() || filament_weight_grams < 0.0 {
            return None;
        }
        Some(Self {
            print_time_minutes,
            filament_weight_grams,
            layer_count: None,
        })
    }

    /// For values already filtered by the G-code parser or the JSON override.
    pub(super) fn from_parsed(print_time_minutes: u32, filament_weight_grams: f64) -> Self {
        debug_assert!(filament_weight_grams.is_finite() && filament_weight_grams >= 0.0);
        Self {
            print_time_minutes,
            filament_weight_grams,
            layer_count: None,
        }
    }

    pub fn print_time_minutes(&self) -> u32 {
        self.print_time_minutes
    }

    pub fn filament_weight_grams(&self) -> f64 {
        self.filament_weight_grams
    }

    /// Always `None` for now: no layer count extraction is defined.
    pub fn layer_count(&self) -> Option<u32> {
        self.layer_count
    }
}

/// Machine, process and filament profile files for one slicer run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfilePaths {
    pub machine: PathBuf,
    pub process: PathBuf,
    pub filament: PathBuf,
}

/// Output directory of a slicer run. The directory is removed when this is dropped.
#[derive(Debug)]
pub struct SliceOutput {
    dir: TempDir,
}

impl SliceOutput {
    pub fn new(dir: TempDir) -> Self {
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Raw result of a finished slicer process.
#[derive(Debug)]
pub struct SlicerRun {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub output: SliceOutput,
}

impl SlicerRun {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}
