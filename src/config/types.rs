//! Configuration types.
//!
//! Every section deserialises from TOML; see `config/default.toml` for the
//! built-in values.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pricing::PricingConfig;

/// Application settings, constructed once and shared read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub slicer: SlicerSettings,
    pub pricing: PricingConfig,
    #[serde(default)]
    pub telegram: TelegramSettings,
    pub uploads: UploadSettings,
    pub worker: WorkerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlicerSettings {
    /// OrcaSlicer executable.
    pub cli_path: PathBuf,
    /// Wall-clock limit for one slicer run.
    pub timeout_secs: u64,
    pub profiles: SlicerProfileSettings,
}

impl SlicerSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlicerProfileSettings {
    pub base_dir: PathBuf,
    /// Machine profile filename under `base_dir/machine`.
    pub machine: String,
    /// Process profile filename under `base_dir/process`.
    pub process: String,
    /// Filament profile filename under `base_dir/filament`, keyed by material id.
    #[serde(default)]
    pub filament: BTreeMap<String, String>,
}

fn default_api_base() -> String {
    "https://api.telegram.org/".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramSettings {
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub admin_chat_id: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            bot_token: None,
            admin_chat_id: None,
            api_base: default_api_base(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSettings {
    pub dir: PathBuf,
    /// Uploads older than this are removed by `quotemate cleanup`.
    pub max_age_hours: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSettings {
    pub max_concurrent_quotes: usize,
    /// Run the model validator before slicing.
    #[serde(default = "default_true")]
    pub validate_models: bool,
}

fn default_true() -> bool {
    true
}
