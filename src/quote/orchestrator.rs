//! End-to-end processing of one quote.
//!
//! `Validating -> Slicing -> Pricing -> Notifying -> Done`. Any stage can end
//! the quote as a failure; there are no retries here. The uploaded model is
//! removed on every exit path, including when the task is cancelled.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::Settings;
use crate::error::QuoteError;
use crate::notify::AdminNotifier;
use crate::pricing::PricingEngine;
use crate::slicer::{resolve_slice_output, OrcaSlicerRunner, ProfileResolver, SlicerRunner};
use crate::validator::{FileModelValidator, ModelValidator};

use super::message::{failure_message, QuoteMessage};
use super::types::{QuoteId, QuoteJob, QuoteOutcome, QuoteSuccess, DEFAULT_MATERIAL};

const DEFAULT_SLICER_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteStage {
    Validating,
    Slicing,
    Pricing,
    Notifying,
    Done,
}

impl fmt::Display for QuoteStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QuoteStage::Validating => "validating",
            QuoteStage::Slicing => "slicing",
            QuoteStage::Pricing => "pricing",
            QuoteStage::Notifying => "notifying",
            QuoteStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Deletes the uploaded model when dropped.
pub(crate) struct UploadGuard {
    path: PathBuf,
}

impl UploadGuard {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Drop for UploadGuard {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => info!("Cleaned up upload {:?}", self.path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Upload {:?} already gone", self.path)
            }
            Err(e) => warn!("Failed to clean up upload {:?}: {}", self.path, e),
        }
    }
}

/// Runs quotes against a fixed set of collaborators. Cheap to share behind an `Arc`.
pub struct QuoteOrchestrator {
    runner: Arc<dyn SlicerRunner>,
    validator: Option<Arc<dyn ModelValidator>>,
    notifier: AdminNotifier,
    pricing: PricingEngine,
    profiles: ProfileResolver,
    slicer_timeout: Duration,
}

impl QuoteOrchestrator {
    pub fn new(
        runner: Arc<dyn SlicerRunner>,
        notifier: AdminNotifier,
        pricing: PricingEngine,
        profiles: ProfileResolver,
    ) -> Self {
        Self {
            runner,
            validator: None,
            notifier,
            pricing,
            profiles,
            slicer_timeout: DEFAULT_SLICER_TIMEOUT,
        }
    }

    /// OrcaSlicer, the file validator (if enabled) and Telegram or log notifications.
    pub fn from_settings(settings: &Settings) -> Result<Self, QuoteError> {
        let runner = Arc::new(OrcaSlicerRunner::new(settings.slicer.cli_path.clone()));
        let notifier = AdminNotifier::from_settings(&settings.telegram)?;
        let mut orchestrator = Self::new(
            runner,
            notifier,
            PricingEngine::new(settings.pricing.clone()),
            ProfileResolver::new(&settings.slicer.profiles),
        )
        .with_timeout(settings.slicer.timeout());
        if settings.worker.validate_models {
            orchestrator = orchestrator.with_validator(Arc::new(FileModelValidator));
        }
        Ok(orchestrator)
    }

    pub fn with_validator(mut self, validator: Arc<dyn ModelValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.slicer_timeout = timeout;
        self
    }

    pub fn pricing(&self) -> &PricingEngine {
        &self.pricing
    }

    pub fn profiles(&self) -> &ProfileResolver {
        &self.profiles
    }

    /// Uppercase material id to quote with. Unknown materials fall back to
    /// [`DEFAULT_MATERIAL`].
    pub fn resolve_material(&self, requested: Option<&str>) -> String {
        let Some(requested) = requested.map(str::trim).filter(|m| !m.is_empty()) else {
            return DEFAULT_MATERIAL.to_string();
        };
        let material = requested.to_uppercase();
        let known = self.pricing.config().material_prices.contains_key(&material)
            || self.profiles.has_profile(&material);
        if known {
            material
        } else {
            warn!("Unknown material {}, defaulting to {}", requested, DEFAULT_MATERIAL);
            DEFAULT_MATERIAL.to_string()
        }
    }

    pub async fn process(&self, job: QuoteJob) -> QuoteOutcome {
        self.process_with_id(QuoteId::generate(), job).await
    }

    /// Run one quote under a caller-chosen id.
    pub async fn process_with_id(&self, id: QuoteId, job: QuoteJob) -> QuoteOutcome {
        let span = info_span!("quote", id = %id.short());
        self.run(id, job).instrument(span).await
    }

    async fn run(&self, id: QuoteId, job: QuoteJob) -> QuoteOutcome {
        let _upload = UploadGuard::new(&job.model_path);
        info!("Processing quote for {:?}", job.model_path);

        match self.pipeline(&id, &job).await {
            Ok(success) => {
                info!(
                    "Quote done: {}{:.2}, notification_sent={}",
                    self.pricing.config().currency,
                    success.cost_breakdown.total_cost,
                    success.notification_sent
                );
                QuoteOutcome::Success(success)
            }
            Err(e) => {
                error!("Quote processing failed: {}", e);
                let text = failure_message(id.short(), &e.to_string());
                if !self.notifier.notify(&text).await {
                    debug!("Failure notification not delivered");
                }
                QuoteOutcome::failed(id, &e)
            }
        }
    }

    async fn pipeline(&self, id: &QuoteId, job: &QuoteJob) -> Result<QuoteSuccess, QuoteError> {
        enter(QuoteStage::Validating);
        let request = job.request.normalized()?;
        if let Some(validator) = &self.validator {
            validate_model(Arc::clone(validator), &job.model_path).await?;
        }
        let material = self.resolve_material(request.material.as_deref());

        enter(QuoteStage::Slicing);
        let profiles = self.profiles.resolve(&material)?;
        let run = self
            .runner
            .run(&job.model_path, &profiles, self.slicer_timeout)
            .await?;
        if !run.succeeded() {
            let stderr = run.stderr.trim();
            warn!("Slicer exited with {:?}", run.exit_code);
            return Err(QuoteError::SlicerFailed(if stderr.is_empty() {
                "Unknown slicer error".to_string()
            } else {
                stderr.to_string()
            }));
        }
        // The run (and its temp dir) is dropped on the blocking thread.
        let slicing_result = tokio::task::spawn_blocking(move || resolve_slice_output(run.output.path()))
            .await
            .map_err(|e| QuoteError::Io(std::io::Error::other(e)))??;
        info!(
            "Slicing completed: {}min, {}g",
            slicing_result.print_time_minutes(),
            slicing_result.filament_weight_grams()
        );

        enter(QuoteStage::Pricing);
        let cost_breakdown = self.pricing.calculate(&slicing_result, &material);

        enter(QuoteStage::Notifying);
        let displayed_material = request.material.as_ref().map(|_| material.clone());
        let message = QuoteMessage::new(
            id,
            &request,
            displayed_material,
            slicing_result.print_time_minutes(),
            slicing_result.filament_weight_grams(),
            cost_breakdown.total_cost,
            &self.pricing.config().currency,
        );
        let notification_sent = self.notifier.notify(&message.format()).await;
        if !notification_sent {
            warn!("Quote notification was not sent");
        }

        enter(QuoteStage::Done);
        Ok(QuoteSuccess {
            quote_id: id.clone(),
            slicing_result,
            cost_breakdown,
            notification_sent,
            processed_at: Utc::now(),
        })
    }
}

impl fmt::Debug for QuoteOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuoteOrchestrator")
            .field("notifier", &self.notifier)
            .field("pricing", &self.pricing)
            .field("profiles", &self.profiles)
            .field("slicer_timeout", &self.slicer_timeout)
            .field("validates", &self.validator.is_some())
            .finish_non_exhaustive()
    }
}

fn enter(stage: QuoteStage) {
    debug!(%stage, "stage");
}

async fn validate_model(validator: Arc<dyn ModelValidator>, path: &Path) -> Result<(), QuoteError> {
    let path = path.to_path_buf();
    let info = tokio::task::spawn_blocking(move || validator.validate(&path))
        .await
        .map_err(|e| QuoteError::Io(std::io::Error::other(e)))?;
    if !info.is_valid {
        return Err(QuoteError::InvalidModel(
            info.error_message
                .unwrap_or_else(|| "unknown validation error".to_string()),
        ));
    }
    info!("File validation passed: {}", info.file_type);
    Ok(())
}
