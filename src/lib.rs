pub mod cleanup;
pub mod config;
pub mod error;
pub mod notify;
pub mod pricing;
pub mod quote;
pub mod slicer;
pub mod validator;
pub mod worker;

pub use config::Settings;
pub use error::{FailureKind, QuoteError};
pub use quote::{QuoteJob, QuoteOrchestrator, QuoteOutcome, QuoteRequest};
pub use worker::{QuoteTask, QuoteWorker};

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the default `info`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
