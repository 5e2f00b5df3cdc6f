//! Structural checks on uploaded model files.
//!
//! These are cheap sanity checks run before the slicer is started, not
//! geometry validation. A file that passes may still fail to slice.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use serde::Serialize;
use tracing::debug;

/// Result of validating one model file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    pub is_valid: bool,
    /// Lowercase extension the file was validated as (`stl`, `obj`, `step`).
    pub file_type: String,
    pub file_size: u64,
    pub error_message: Option<String>,
}

impl ModelInfo {
    fn valid(file_type: &str, file_size: u64) -> Self {
        Self {
            is_valid: true,
            file_type: file_type.to_string(),
            file_size,
            error_message: None,
        }
    }

    fn invalid(file_type: &str, file_size: u64, message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            file_type: file_type.to_string(),
            file_size,
            error_message: Some(message.into()),
        }
    }
}

/// Decides whether a model file is worth slicing. Blocking.
pub trait ModelValidator: Send + Sync {
    fn validate(&self, path: &Path) -> ModelInfo;
}

/// Validator dispatching on file extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileModelValidator;

impl ModelValidator for FileModelValidator {
    fn validate(&self, path: &Path) -> ModelInfo {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let file_type = match ext.as_str() {
            "stl" => "stl",
            "obj" => "obj",
            "step" | "stp" => "step",
            _ => {
                let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
                return ModelInfo::invalid(&ext, size, format!("Unsupported file type: .{}", ext));
            }
        };

        if !path.is_file() {
            return ModelInfo::invalid(file_type, 0, "File not found");
        }

        let result = match file_type {
            "stl" => validate_stl(path),
            "obj" => validate_obj(path),
            _ => validate_step(path),
        };

        match result {
            Ok(info) => {
                debug!("Validated {:?}: {:?}", path, info);
                info
            }
            Err(e) => ModelInfo::invalid(file_type, 0, format!("Failed to read file: {}", e)),
        }
    }
}

fn validate_stl(path: &Path) -> std::io::Result<ModelInfo> {
    let file_size = std::fs::metadata(path)?.len();
    let mut file = File::open(path)?;

    let mut header = [0u8; 5];
    if file.read_exact(&mut header).is_err() {
        return Ok(ModelInfo::invalid("stl", file_size, "File too small to be valid STL"));
    }

    if &header == b"solid" {
        file.seek(SeekFrom::Start(0))?;
        // Binary files whose header happens to start with "solid" are not UTF-8,
        // so read raw lines rather than `lines()`.
        let mut reader = BufReader::new(file);
        let mut line = Vec::new();
        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line)? == 0 {
                break;
            }
            if String::from_utf8_lossy(&line).trim().starts_with("endsolid") {
                return Ok(ModelInfo::valid("stl", file_size));
            }
        }
        return Ok(ModelInfo::invalid(
            "stl",
            file_size,
            "Invalid ASCII STL format - missing endsolid",
        ));
    }

    if file_size < 84 {
        return Ok(ModelInfo::invalid("stl", file_size, "Binary STL too small"));
    }

    let mut count = [0u8; 4];
    file.seek(SeekFrom::Start(80))?;
    file.read_exact(&mut count)?;
    let triangles = u32::from_le_bytes(count) as u64;
    let expected = 84u64.saturating_add(triangles.saturating_mul(50));

    if file_size == expected {
        Ok(ModelInfo::valid("stl", file_size))
    } else {
        Ok(ModelInfo::invalid(
            "stl",
            file_size,
            format!(
                "Binary STL size mismatch. Expected {}, got {}",
                expected, file_size
            ),
        ))
    }
}

fn validate_obj(path: &Path) -> std::io::Result<ModelInfo> {
    let file_size = std::fs::metadata(path)?.len();
    let reader = BufReader::new(File::open(path)?);

    let mut has_vertices = false;
    let mut has_faces = false;
    for line in reader.split(b'\n') {
        let line = line?;
        let line = String::from_utf8_lossy(&line);
        let trimmed = line.trim_start();
        if trimmed.starts_with("v ") {
            has_vertices = true;
        } else if trimmed.starts_with("f ") {
            has_faces = true;
        }
        if has_vertices && has_faces {
            return Ok(ModelInfo::valid("obj", file_size));
        }
    }

    Ok(ModelInfo::invalid(
        "obj",
        file_size,
        "Invalid OBJ format - missing vertices or faces",
    ))
}

fn validate_step(path: &Path) -> std::io::Result<ModelInfo> {
    let file_size = std::fs::metadata(path)?.len();
    let reader = BufReader::new(File::open(path)?);

    let mut iso_header = false;
    let mut header_section = false;
    let mut data_section = false;
    let mut end_iso = false;

    for (i, line) in reader.split(b'\n').enumerate() {
        let line = line?;
        let line = String::from_utf8_lossy(&line);
        let trimmed = line.trim();
        if i == 0 {
            iso_header = trimmed.starts_with("ISO-10303");
        }
        if trimmed == "HEADER;" {
            header_section = true;
        } else if trimmed == "DATA;" {
            data_section = true;
        } else if trimmed.starts_with("END-ISO-10303") {
            end_iso = true;
            break;
        }
    }

    let missing: Vec<&str> = [
        (iso_header, "ISO header"),
        (header_section, "HEADER section"),
        (data_section, "DATA section"),
        (end_iso, "END-ISO section"),
    ]
    .into_iter()
    .filter(|(present, _)| !present)
    .map(|(_, name)| name)
    .collect();

    if missing.is_empty() {
        Ok(ModelInfo::valid("step", file_size))
    } else {
        Ok(ModelInfo::invalid(
            "step",
            file_size,
            format!("Invalid STEP format - missing: {}", missing.join(", ")),
        ))
    }
}
