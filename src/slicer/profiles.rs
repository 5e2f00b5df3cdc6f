use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::SlicerProfileSettings;
use crate::error::QuoteError;

use super::types::ProfilePaths;

/// Resolved locations of slicer profiles.
///
/// Layout under `base_dir`:
/// - `machine/<machine>`
/// - `process/<process>`
/// - `filament/<override or lowercase(material).json>`
#[derive(Debug, Clone)]
pub struct ProfileResolver {
    base_dir: PathBuf,
    machine: String,
    process: String,
    /// Explicit filament profile filenames keyed by uppercase material id.
    filament_overrides: BTreeMap<String, String>,
}

impl ProfileResolver {
    pub fn new(settings: &SlicerProfileSettings) -> Self {
        let filament_overrides = settings
            .filament
            .iter()
            .map(|(material, file)| (material.to_uppercase(), file.clone()))
            .collect();
        Self {
            base_dir: settings.base_dir.clone(),
            machine: settings.machine.clone(),
            process: settings.process.clone(),
            filament_overrides,
        }
    }

    pub fn filament_dir(&self) -> PathBuf {
        self.base_dir.join("filament")
    }

    pub fn machine_path(&self) -> PathBuf {
        self.base_dir.join("machine").join(&self.machine)
    }

    pub fn process_path(&self) -> PathBuf {
        self.base_dir.join("process").join(&self.process)
    }

    /// Find the filament profile for a material.
    ///
    /// 1. An explicit override from the configuration.
    /// 2. The convention `lowercase(material).json` in the filament directory.
    /// 3. Otherwise [`QuoteError::ProfileNotFound`].
    pub fn filament_profile_path(&self, material: &str) -> Result<PathBuf, QuoteError> {
        let key = material.to_uppercase();
        if let Some(filename) = self.filament_overrides.get(&key) {
            debug!("Using configured filament profile {} for {}", filename, key);
            return Ok(self.filament_dir().join(filename));
        }

        let conventional = format!("{}.json", material.to_lowercase());
        let path = self.filament_dir().join(&conventional);
        if path.is_file() {
            debug!("Using conventional filament profile {:?}", path);
            return Ok(path);
        }

        Err(QuoteError::ProfileNotFound {
            material: material.to_string(),
            config_key: format!("slicer.profiles.filament.{}", key),
            conventional,
        })
    }

    /// Machine, process and filament paths for one slicer run, made absolute.
    pub fn resolve(&self, material: &str) -> Result<ProfilePaths, QuoteError> {
        let filament = self.filament_profile_path(material)?;
        Ok(ProfilePaths {
            machine: absolute(self.machine_path()),
            process: absolute(self.process_path()),
            filament: absolute(filament),
        })
    }

    /// Whether a profile can be found for `material` by either lookup tier.
    pub fn has_profile(&self, material: &str) -> bool {
        self.filament_profile_path(material).is_ok()
    }

    /// Configured materials plus every `*.json` profile found in the filament
    /// directory, uppercase, sorted and deduplicated.
    pub fn available_materials(&self) -> Vec<String> {
        let mut materials: BTreeSet<String> = self.filament_overrides.keys().cloned().collect();

        for entry in WalkDir::new(self.filament_dir()).min_depth(1).max_depth(1) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    debug!("Filament profile dir {:?} not readable: {}", self.filament_dir(), e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let is_json = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("json"))
                .unwrap_or(false);
            if !is_json {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                materials.insert(stem.to_uppercase());
            }
        }

        materials.into_iter().collect()
    }

    /// Verify that the machine, process and every configured filament profile exist.
    pub fn check_configured(&self) -> Result<(), QuoteError> {
        let mut missing = Vec::new();
        let mut check = |kind: &str, path: PathBuf| {
            if !path.is_file() {
                warn!("{} profile not found at {:?}", kind, path);
                missing.push(format!("{} profile not found at: {}", kind, path.display()));
            }
        };

        check("Machine", self.machine_path());
        check("Process", self.process_path());
        for filename in self.filament_overrides.values() {
            check("Filament", self.filament_dir().join(filename));
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(QuoteError::Config(missing.join("; ")))
        }
    }
}

fn absolute(path: PathBuf) -> PathBuf {
    std::path::absolute(&path).unwrap_or(path)
}

/// The `machine`, `process` and `filament` directories expected under `base`.
pub fn profile_dirs(base: &Path) -> [PathBuf; 3] {
    [
        base.join("machine"),
        base.join("process"),
        base.join("filament"),
    ]
}
