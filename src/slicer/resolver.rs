//! Turn a slicer output directory into one `SlicingResult`.
//!
//! G-code comments are the fallback of record; a JSON export in the same
//! directory overrides whichever recognised keys it carries.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::QuoteError;

use super::gcode::parse_gcode_metadata;
use super::types::SlicingResult;

const GCODE_EXTENSIONS: [&str; 2] = ["gcode", "gco"];
const JSON_EXTENSIONS: [&str; 1] = ["json"];

/// Values taken from a JSON side-file. `None` means "keep the G-code value".
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct JsonOverride {
    pub print_time_minutes: Option<u32>,
    pub filament_grams: Option<f64>,
}

/// Resolve the slicer output in `output_dir`.
///
/// Fails with [`QuoteError::NoGcodeOutput`] when the directory holds no G-code
/// file, whatever else it contains.
pub fn resolve_slice_output(output_dir: &Path) -> Result<SlicingResult, QuoteError> {
    let files = list_output_files(output_dir);

    let gcode_path = files
        .iter()
        .find(|p| has_extension(p, &GCODE_EXTENSIONS))
        .ok_or_else(|| QuoteError::NoGcodeOutput(output_dir.to_path_buf()))?;

    let metadata = parse_gcode_metadata(gcode_path);
    let mut print_time_minutes = metadata.print_time_minutes;
    let mut filament_grams = metadata.filament_weight_grams;

    if let Some(json_path) = files.iter().find(|p| has_extension(p, &JSON_EXTENSIONS)) {
        if let Some(json) = read_json_override(json_path) {
            if let Some(minutes) = json.print_time_minutes {
                print_time_minutes = minutes;
            }
            if let Some(grams) = json.filament_grams {
                filament_grams = grams;
            }
        }
    }

    let result = SlicingResult::from_parsed(print_time_minutes, filament_grams);

    info!(
        "Resolved slicer output from {:?}: {}min, {:.1}g",
        gcode_path.file_name().unwrap_or_default(),
        result.print_time_minutes(),
        result.filament_weight_grams()
    );
    Ok(result)
}

/// Read a flat JSON document and pick out the recognised keys.
///
/// Returns `None` when the file cannot be read or is not a JSON object;
/// wrongly typed values are skipped individually.
pub fn read_json_override(path: &Path) -> Option<JsonOverride> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Could not read slicer JSON {:?}: {}", path, e);
            return None;
        }
    };
    let data: Map<String, Value> = match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            warn!("Ignoring slicer JSON {:?}: {}", path, e);
            return None;
        }
    };
    Some(json_override_from_map(&data))
}

fn json_override_from_map(data: &Map<String, Value>) -> JsonOverride {
    let print_time_minutes = data.get("print_time_minutes").and_then(|v| {
        let minutes = as_minutes(v);
        if minutes.is_none() {
            warn!("Ignoring print_time_minutes override {}", v);
        }
        minutes
    });
    let filament_grams = data.get("filament_grams").and_then(|v| {
        let grams = v.as_f64().filter(|g| g.is_finite() && *g >= 0.0);
        if grams.is_none() {
            warn!("Ignoring filament_grams override {}", v);
        }
        grams
    });

    debug!(
        "JSON override: minutes={:?}, grams={:?}",
        print_time_minutes, filament_grams
    );
    JsonOverride {
        print_time_minutes,
        filament_grams,
    }
}

fn as_minutes(value: &Value) -> Option<u32> {
    if let Some(n) = value.as_u64() {
        return u32::try_from(n).ok();
    }
    value
        .as_f64()
        .filter(|f| f.is_finite() && *f >= 0.0 && *f <= u32::MAX as f64)
        .map(|f| f.round() as u32)
}

/// Regular files directly inside `dir`, sorted by name.
fn list_output_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(err) => {
                warn!("Skipping unreadable slicer output entry: {}", err);
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect()
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|x| e.eq_ignore_ascii_case(x)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slicer::gcode::DEFAULT_FILAMENT_GRAMS;
    use std::fs;

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_gcode_only() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "plate_1.gcode",
            "; estimated printing time: 2h 30m\n; filament used: 125.5g\n",
        );

        let result = resolve_slice_output(dir.path()).unwrap();
        assert_eq!(result.print_time_minutes(), 150);
        assert_eq!(result.filament_weight_grams(), 125.5);
        assert_eq!(result.layer_count(), None);
    }

    #[test]
    fn test_json_overrides_only_present_keys() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "plate_1.gcode", "G28\n");
        write(dir.path(), "result.json", r#"{"filament_grams": 35.2}"#);

        let result = resolve_slice_output(dir.path()).unwrap();
        assert_eq!(result.print_time_minutes(), 60);
        assert_eq!(result.filament_weight_grams(), 35.2);
    }

    #[test]
    fn test_json_overrides_both_keys() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "plate_1.gcode",
            "; estimated printing time: 1h\n; filament used: 10g\n",
        );
        write(
            dir.path(),
            "result.json",
            r#"{"print_time_minutes": 95, "filament_grams": 41, "other": true}"#,
        );

        let result = resolve_slice_output(dir.path()).unwrap();
        assert_eq!(result.print_time_minutes(), 95);
        assert_eq!(result.filament_weight_grams(), 41.0);
    }

    #[test]
    fn test_malformed_json_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "plate_1.gcode",
            "; estimated printing time: 45m\n; filament used: 7.5g\n",
        );
        write(dir.path(), "result.json", "{ not json");

        let result = resolve_slice_output(dir.path()).unwrap();
        assert_eq!(result.print_time_minutes(), 45);
        assert_eq!(result.filament_weight_grams(), 7.5);
    }

    #[test]
    fn test_wrongly_typed_json_values_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "plate_1.gcode", "; filament used: 7.5g\n");
        write(
            dir.path(),
            "result.json",
            r#"{"print_time_minutes": "soon", "filament_grams": -3}"#,
        );

        let result = resolve_slice_output(dir.path()).unwrap();
        assert_eq!(result.print_time_minutes(), 60);
        assert_eq!(result.filament_weight_grams(), 7.5);
    }

    #[test]
    fn test_unusable_weights_never_fail_the_resolve() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "plate_1.gcode", "; filament used: 0g\nG28\n");
        write(dir.path(), "result.json", r#"{"filament_grams": -1.5}"#);

        let result = resolve_slice_output(dir.path()).unwrap();
        assert_eq!(result.filament_weight_grams(), DEFAULT_FILAMENT_GRAMS);
    }

    #[test]
    fn test_fractional_minutes_are_rounded() {
        let value = serde_json::json!({"print_time_minutes": 12.6});
        let ov = json_override_from_map(value.as_object().unwrap());
        assert_eq!(ov.print_time_minutes, Some(13));
        assert_eq!(ov.filament_grams, None);
    }

    #[test]
    fn test_missing_gcode_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "result.json", r#"{"print_time_minutes": 10, "filament_grams": 5}"#);
        write(dir.path(), "model.3mf", "zip");
        fs::create_dir(dir.path().join("nested.gcode")).unwrap();

        let err = resolve_slice_output(dir.path()).unwrap_err();
        assert!(matches!(err, QuoteError::NoGcodeOutput(_)));
    }

    #[test]
    fn test_missing_directory_is_fatal() {
        let err = resolve_slice_output(Path::new("/nonexistent/quotemate/out")).unwrap_err();
        assert!(matches!(err, QuoteError::NoGcodeOutput(_)));
    }

    #[test]
    fn test_uppercase_extension_and_first_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.gcode", "; estimated printing time: 5h\n");
        write(dir.path(), "A.GCODE", "; estimated printing time: 2h\n");

        let result = resolve_slice_output(dir.path()).unwrap();
        assert_eq!(result.print_time_minutes(), 120);
    }
}
