use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{FailureKind, QuoteError};
use crate::pricing::CostBreakdown;
use crate::slicer::SlicingResult;

/// Material used when none is requested or the requested one is unknown.
pub const DEFAULT_MATERIAL: &str = "PLA";

const MAX_NAME_CHARS: usize = 100;
const MAX_COLOR_CHARS: usize = 50;
const MOBILE_RAW_CHARS: std::ops::RangeInclusive<usize> = 8..=20;

static NAME_FORBIDDEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\d@#$%^&*()+=\[\]{}|\\:;"<>?/~`]"#).unwrap());
static MOBILE_SEPARATORS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s\-().]+").unwrap());
static MOBILE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\+?\d{8,15}$").unwrap());

/// Identifier of one quote: 32 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuoteId(String);

impl QuoteId {
    pub fn generate() -> Self {
        let bytes: [u8; 16] = rand::random();
        Self(bytes.iter().map(|b| format!("{:02x}", b)).collect())
    }

    /// First 8 characters, as shown to the admin.
    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QuoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Customer-supplied details accompanying an upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub name: String,
    pub mobile: String,
    #[serde(default)]
    pub material: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    /// Original upload filename, for display only.
    pub filename: String,
}

impl QuoteRequest {
    /// Trimmed and checked copy. The mobile number has separators removed.
    pub fn normalized(&self) -> Result<Self, QuoteError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(QuoteError::InvalidRequest("Name cannot be empty".into()));
        }
        if name.chars().count() > MAX_NAME_CHARS {
            return Err(QuoteError::InvalidRequest(format!(
                "Name must be at most {} characters",
                MAX_NAME_CHARS
            )));
        }
        if NAME_FORBIDDEN.is_match(name) {
            return Err(QuoteError::InvalidRequest("Name contains invalid characters".into()));
        }

        if !MOBILE_RAW_CHARS.contains(&self.mobile.chars().count()) {
            return Err(QuoteError::InvalidRequest("Invalid mobile number format".into()));
        }
        let mobile = MOBILE_SEPARATORS.replace_all(&self.mobile, "").into_owned();
        if !MOBILE.is_match(&mobile) {
            return Err(QuoteError::InvalidRequest("Invalid mobile number format".into()));
        }

        let color = non_empty(self.color.as_deref());
        if let Some(ref c) = color {
            if c.chars().count() > MAX_COLOR_CHARS {
                return Err(QuoteError::InvalidRequest(format!(
                    "Color must be at most {} characters",
                    MAX_COLOR_CHARS
                )));
            }
        }

        let filename = self.filename.trim();
        if filename.is_empty() {
            return Err(QuoteError::InvalidRequest("Filename cannot be empty".into()));
        }

        Ok(Self {
            name: name.to_string(),
            mobile,
            material: non_empty(self.material.as_deref()),
            color,
            filename: filename.to_string(),
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// One unit of work: an uploaded model plus the request that came with it.
#[derive(Debug, Clone)]
pub struct QuoteJob {
    pub model_path: PathBuf,
    pub request: QuoteRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteSuccess {
    pub quote_id: QuoteId,
    pub slicing_result: SlicingResult,
    pub cost_breakdown: CostBreakdown,
    pub notification_sent: bool,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteFailure {
    pub quote_id: QuoteId,
    pub kind: FailureKind,
    pub message: String,
    pub processed_at: DateTime<Utc>,
}

/// Terminal result of one quote.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QuoteOutcome {
    Success(QuoteSuccess),
    Failure(QuoteFailure),
}

impl QuoteOutcome {
    pub fn failed(quote_id: QuoteId, err: &QuoteError) -> Self {
        Self::Failure(QuoteFailure {
            quote_id,
            kind: err.kind(),
            message: err.to_string(),
            processed_at: Utc::now(),
        })
    }

    /// Failure that happened outside the pipeline (panic, cancellation).
    pub fn internal(quote_id: QuoteId, message: impl Into<String>) -> Self {
        Self::Failure(QuoteFailure {
            quote_id,
            kind: FailureKind::Internal,
            message: message.into(),
            processed_at: Utc::now(),
        })
    }

    pub fn quote_id(&self) -> &QuoteId {
        match self {
            Self::Success(s) => &s.quote_id,
            Self::Failure(f) => &f.quote_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Success(_) => None,
            Self::Failure(f) => Some(f.kind),
        }
    }
}
