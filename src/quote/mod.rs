pub mod message;
pub mod orchestrator;
pub mod types;

pub use message::{format_print_time, format_weight, QuoteMessage};
pub use orchestrator::{QuoteOrchestrator, QuoteStage};
pub use types::{
    QuoteFailure, QuoteId, QuoteJob, QuoteOutcome, QuoteRequest, QuoteSuccess, DEFAULT_MATERIAL,
};
