//! Price calculation for sliced print jobs.
//!
//! Formula: `((grams / 1000) * rate + (minutes / 60 + buffer) * rate) * markup`,
//! floored at the configured minimum price.

mod engine;
mod types;

pub use engine::{calculate_quote, format_cost_summary, PricingEngine};
pub use types::{CostBreakdown, PricingConfig};
