use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::QuoteError;

use super::types::{ProfilePaths, SliceOutput, SlicerRun};

/// Runs an external slicer on one model.
///
/// Implementations own the output directory they hand back: it lives exactly
/// as long as the returned [`SlicerRun`].
#[async_trait]
pub trait SlicerRunner: Send + Sync {
    async fn run(
        &self,
        model_path: &Path,
        profiles: &ProfilePaths,
        timeout: Duration,
    ) -> Result<SlicerRun, QuoteError>;
}

/// OrcaSlicer command-line runner.
#[derive(Debug, Clone)]
pub struct OrcaSlicerRunner {
    cli_path: PathBuf,
}

impl OrcaSlicerRunner {
    pub fn new(cli_path: impl Into<PathBuf>) -> Self {
        Self {
            cli_path: cli_path.into(),
        }
    }

    /// Arguments for slicing every plate of `model_path` into `output_dir`.
    pub fn build_args(model_path: &Path, profiles: &ProfilePaths, output_dir: &Path) -> Vec<OsString> {
        let mut settings = OsString::from(profiles.machine.as_os_str());
        settings.push(";");
        settings.push(profiles.process.as_os_str());

        vec![
            model_path.as_os_str().to_owned(),
            "--slice".into(),
            "0".into(),
            "--load-settings".into(),
            settings,
            "--load-filaments".into(),
            profiles.filament.as_os_str().to_owned(),
            "--export-slicedata".into(),
            output_dir.as_os_str().to_owned(),
            "--outputdir".into(),
            output_dir.as_os_str().to_owned(),
            "--debug".into(),
            "1".into(),
        ]
    }
}

#[async_trait]
impl SlicerRunner for OrcaSlicerRunner {
    async fn run(
        &self,
        model_path: &Path,
        profiles: &ProfilePaths,
        timeout: Duration,
    ) -> Result<SlicerRun, QuoteError> {
        if !model_path.is_file() {
            return Err(QuoteError::ModelNotFound(model_path.to_path_buf()));
        }

        let temp = tempfile::Builder::new()
            .prefix("quotemate-slice-")
            .tempdir()?;
        let args = Self::build_args(model_path, profiles, temp.path());
        debug!("Running {:?} with {:?}", self.cli_path, args);

        let child = tokio::process::Command::new(&self.cli_path)
            .args(&args)
            .current_dir(temp.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                QuoteError::SlicerFailed(format!(
                    "could not start {}: {}",
                    self.cli_path.display(),
                    e
                ))
            })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result
                .map_err(|e| QuoteError::SlicerFailed(format!("slicer process error: {}", e)))?,
            Err(_) => {
                warn!("Slicer exceeded {:?} on {:?}, killed", timeout, model_path);
                return Err(QuoteError::SlicerTimeout(timeout.as_secs()));
            }
        };

        let exit_code = output.status.code();
        info!("Slicer finished with exit code {:?}", exit_code);

        Ok(SlicerRun {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            output: SliceOutput::new(temp),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profiles() -> ProfilePaths {
        ProfilePaths {
            machine: PathBuf::from("/p/machine/m.json"),
            process: PathBuf::from("/p/process/p.json"),
            filament: PathBuf::from("/p/filament/f.json"),
        }
    }

    #[test]
    fn test_build_args_layout() {
        let args = OrcaSlicerRunner::build_args(
            Path::new("/uploads/cube.stl"),
            &profiles(),
            Path::new("/tmp/out"),
        );
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "/uploads/cube.stl",
                "--slice",
                "0",
                "--load-settings",
                "/p/machine/m.json;/p/process/p.json",
                "--load-filaments",
                "/p/filament/f.json",
                "--export-slicedata",
                "/tmp/out",
                "--outputdir",
                "/tmp/out",
                "--debug",
                "1",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_model_is_rejected() {
        let runner = OrcaSlicerRunner::new("/bin/true");
        let err = runner
            .run(Path::new("/nonexistent/cube.stl"), &profiles(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, QuoteError::ModelNotFound(_)));
    }

    #[tokio::test]
    async fn test_missing_cli_is_slicer_failure() {
        let model = tempfile::NamedTempFile::new().unwrap();
        let runner = OrcaSlicerRunner::new("/nonexistent/orca-slicer");
        let err = runner
            .run(model.path(), &profiles(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, QuoteError::SlicerFailed(_)));
    }

    // The "model" is a shell script, so `/bin/sh <model> <args...>` plays the slicer.
    #[cfg(unix)]
    fn script(body: &str) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), body).unwrap();
        file
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_run_writes_output() {
        let model = script(
            r#"while [ $# -gt 0 ]; do
  if [ "$1" = "--outputdir" ]; then out="$2"; fi
  shift
done
printf '; estimated printing time: 1h 5m\n; filament used: 9.5g\n' > "$out/plate_1.gcode"
echo sliced
"#,
        );
        let runner = OrcaSlicerRunner::new("/bin/sh");
        let run = runner
            .run(model.path(), &profiles(), Duration::from_secs(10))
            .await
            .unwrap();

        assert!(run.succeeded());
        assert!(run.stdout.contains("sliced"));
        let gcode = run.output.path().join("plate_1.gcode");
        assert!(gcode.is_file());

        let out_dir = run.output.path().to_path_buf();
        drop(run);
        assert!(!out_dir.exists(), "output dir should be removed with the run");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_keeps_stderr() {
        let model = script("echo 'bad mesh' >&2\nexit 3\n");
        let runner = OrcaSlicerRunner::new("/bin/sh");
        let run = runner
            .run(model.path(), &profiles(), Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(run.exit_code, Some(3));
        assert!(!run.succeeded());
        assert!(run.stderr.contains("bad mesh"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout() {
        let model = script("sleep 5\n");
        let runner = OrcaSlicerRunner::new("/bin/sh");
        let err = runner
            .run(model.path(), &profiles(), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, QuoteError::SlicerTimeout(_)));
    }

    /// Script that writes its `--outputdir` to `marker` before `tail`.
    #[cfg(unix)]
    fn recording_script(marker: &Path, tail: &str) -> tempfile::NamedTempFile {
        script(&format!(
            r#"while [ $# -gt 0 ]; do
  if [ "$1" = "--outputdir" ]; then out="$2"; fi
  shift
done
printf '%s' "$out" > '{}'
{}"#,
            marker.display(),
            tail
        ))
    }

    #[cfg(unix)]
    fn recorded_dir(marker: &Path) -> PathBuf {
        let dir = PathBuf::from(std::fs::read_to_string(marker).unwrap());
        assert!(dir.file_name().unwrap().to_string_lossy().starts_with("quotemate-slice-"));
        dir
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_removes_output_dir() {
        let scratch = tempfile::tempdir().unwrap();
        let marker = scratch.path().join("outdir");
        let model = recording_script(&marker, "sleep 5\n");
        let runner = OrcaSlicerRunner::new("/bin/sh");

        let err = runner
            .run(model.path(), &profiles(), Duration::from_millis(500))
            .await
            .unwrap_err();

        assert!(matches!(err, QuoteError::SlicerTimeout(_)));
        assert!(!recorded_dir(&marker).exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_run_removes_output_dir() {
        let scratch = tempfile::tempdir().unwrap();
        let marker = scratch.path().join("outdir");
        let model = recording_script(&marker, "echo 'bad mesh' >&2\nexit 1\n");
        let runner = OrcaSlicerRunner::new("/bin/sh");

        let run = runner
            .run(model.path(), &profiles(), Duration::from_secs(10))
            .await
            .unwrap();
        let out_dir = recorded_dir(&marker);
        assert_eq!(run.output.path(), out_dir.as_path());
        assert!(out_dir.is_dir());

        drop(run);
        assert!(!out_dir.exists());
    }
}
