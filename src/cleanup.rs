use std::fs;
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};

use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupStats {
    pub files_cleaned: u64,
    pub bytes_freed: u64,
}

/// Remove regular files directly inside `dir` last modified more than
/// `max_age` ago. A missing directory is not an error.
///
/// Files that vanish mid-sweep (quotes delete their own uploads) are skipped.
pub fn cleanup_old_files(dir: &Path, max_age: Duration) -> io::Result<CleanupStats> {
    let mut stats = CleanupStats::default();
    if !dir.is_dir() {
        debug!("Upload dir {:?} does not exist, nothing to clean", dir);
        return Ok(stats);
    }

    let now = SystemTime::now();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) if e.depth() > 0 => {
                warn!("Skipping unreadable upload entry: {}", e);
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if !entry.file_type().is_file() {
            continue;
        }

        match remove_if_older(entry.path(), now, max_age) {
            Ok(Some(bytes)) => {
                stats.files_cleaned += 1;
                stats.bytes_freed += bytes;
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to clean {:?}: {}", entry.path(), e),
        }
    }

    info!(
        "Cleaned {} file(s), freed {} bytes from {:?}",
        stats.files_cleaned, stats.bytes_freed, dir
    );
    Ok(stats)
}

/// Delete `path` if it is older than `max_age`, returning the bytes freed.
/// `Ok(None)` when the file is fresh, has no mtime, or is already gone.
fn remove_if_older(path: &Path, now: SystemTime, max_age: Duration) -> io::Result<Option<u64>> {
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let Ok(modified) = metadata.modified() else {
        return Ok(None);
    };
    let age = now.duration_since(modified).unwrap_or_default();
    if age <= max_age {
        return Ok(None);
    }

    match fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed {:?} ({}s old)", path, age.as_secs());
            Ok(Some(metadata.len()))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn write_aged(dir: &Path, name: &str, bytes: usize, age: Duration) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, vec![b'x'; bytes]).unwrap();
        let file = File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
        path
    }

    #[test]
    fn test_removes_only_old_files() {
        let dir = tempfile::tempdir().unwrap();
        let day = Duration::from_secs(24 * 3600);
        let old = write_aged(dir.path(), "old.stl", 100, day * 2);
        let older = write_aged(dir.path(), "older.obj", 50, day * 3);
        let fresh = write_aged(dir.path(), "fresh.stl", 10, Duration::from_secs(60));
        fs::create_dir(dir.path().join("nested")).unwrap();

        let stats = cleanup_old_files(dir.path(), day).unwrap();

        assert_eq!(
            stats,
            CleanupStats {
                files_cleaned: 2,
                bytes_freed: 150
            }
        );
        assert!(!old.exists());
        assert!(!older.exists());
        assert!(fresh.exists());
        assert!(dir.path().join("nested").is_dir());
    }

    #[test]
    fn test_missing_dir_is_empty_stats() {
        let stats = cleanup_old_files(Path::new("/nonexistent/uploads"), Duration::ZERO).unwrap();
        assert_eq!(stats, CleanupStats::default());
    }

    #[test]
    fn test_vanished_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("a1b2c3d4_cube.stl");
        let removed = remove_if_older(&gone, SystemTime::now(), Duration::ZERO).unwrap();
        assert_eq!(removed, None);
    }

    #[test]
    fn test_remove_if_older_reports_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_aged(dir.path(), "old.stl", 42, Duration::from_secs(7200));
        let removed =
            remove_if_older(&path, SystemTime::now(), Duration::from_secs(3600)).unwrap();
        assert_eq!(removed, Some(42));
        assert!(!path.exists());
    }
}
