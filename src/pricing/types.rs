use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

fn default_currency() -> String {
    "S$".to_string()
}

/// Price table and formula parameters.
///
/// Loaded once from [`crate::config::Settings`] and shared read-only between
/// quote tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Price per kilogram keyed by uppercase material id (e.g. "PLA").
    #[serde(default)]
    pub material_prices: BTreeMap<String, f64>,
    /// Rate used for materials missing from `material_prices`.
    pub default_price_per_kg: f64,
    /// Factor applied to the base cost (1.1 = 10% markup).
    pub markup_multiplier: f64,
    /// No quote is issued below this amount.
    pub minimum_price: f64,
    /// Fixed buffer added to every job's billed time (setup, cooldown).
    pub additional_time_hours: f64,
    /// Currency prefix for display only.
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            material_prices: BTreeMap::from([
                ("PLA".to_string(), 25.0),
                ("PETG".to_string(), 30.0),
                ("ASA".to_string(), 35.0),
            ]),
            default_price_per_kg: 25.0,
            markup_multiplier: 1.1,
            minimum_price: 5.0,
            additional_time_hours: 0.5,
            currency: default_currency(),
        }
    }
}

/// Itemised price of one print job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub material_type: String,
    pub filament_kg: f64,
    pub filament_grams: f64,
    pub print_time_hours: f64,
    pub print_time_minutes: u32,
    pub price_per_kg: f64,
    pub material_cost: f64,
    pub time_cost: f64,
    pub subtotal: f64,
    pub total_cost: f64,
    pub minimum_applied: bool,
    pub markup_percentage: f64,
}
