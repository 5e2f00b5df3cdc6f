mod loader;
mod types;

pub use loader::{default_config_path, ENV_CLI_PATH, ENV_TELEGRAM_CHAT_ID, ENV_TELEGRAM_TOKEN};
pub use types::{
    Settings, SlicerProfileSettings, SlicerSettings, TelegramSettings, UploadSettings,
    WorkerSettings,
};
