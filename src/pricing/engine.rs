//! Quote arithmetic.
//!
//! Everything here is pure: the same `SlicingResult`, material and
//! `PricingConfig` always produce the same `CostBreakdown`.

use crate::slicer::SlicingResult;

use super::types::{CostBreakdown, PricingConfig};

/// Prices slicing results against a fixed configuration.
#[derive(Debug, Clone)]
pub struct PricingEngine {
    config: PricingConfig,
}

impl PricingEngine {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    /// Per-kilogram rate for an already-resolved material id.
    ///
    /// Lookup is case-insensitive; unknown materials get `default_price_per_kg`.
    pub fn price_per_kg(&self, material: &str) -> f64 {
        let key = material.to_uppercase();
        self.config
            .material_prices
            .get(&key)
            .copied()
            .unwrap_or(self.config.default_price_per_kg)
    }

    /// Price a slicing result for the given material.
    pub fn calculate(&self, result: &SlicingResult, material: &str) -> CostBreakdown {
        calculate_quote(
            result.print_time_minutes(),
            result.filament_weight_grams(),
            material,
            self.price_per_kg(material),
            &self.config,
        )
    }
}

/// Apply the pricing formula.
///
/// The material's per-kg rate doubles as the hourly machine rate for
/// `time_cost`. `minimum_applied` compares with exact equality, so a subtotal
/// that lands exactly on the minimum is also flagged.
pub fn calculate_quote(
    print_time_minutes: u32,
    filament_weight_grams: f64,
    material_type: &str,
    price_per_kg: f64,
    config: &PricingConfig,
) -> CostBreakdown {
    let filament_kg = filament_weight_grams / 1000.0;
    let print_time_hours = (print_time_minutes as f64 / 60.0) + config.additional_time_hours;

    let material_cost = filament_kg * price_per_kg;
    let time_cost = print_time_hours * price_per_kg;

    let subtotal = (material_cost + time_cost) * config.markup_multiplier;

    let total_cost = if subtotal < config.minimum_price {
        config.minimum_price
    } else {
        subtotal
    };
    let minimum_applied = total_cost == config.minimum_price;

    let markup_percentage = (config.markup_multiplier - 1.0) * 100.0;

    CostBreakdown {
        material_type: material_type.to_string(),
        filament_kg,
        filament_grams: filament_weight_grams,
        print_time_hours,
        print_time_minutes,
        price_per_kg,
        material_cost,
        time_cost,
        subtotal,
        total_cost,
        minimum_applied,
        markup_percentage,
    }
}

/// Human-readable breakdown, one line per cost component.
pub fn format_cost_summary(breakdown: &CostBreakdown, currency: &str) -> String {
    let material_line = format!(
        "Material: {:.1}g ({:.3}kg) × {cur}{:.2}/kg = {cur}{:.2}",
        breakdown.filament_grams,
        breakdown.filament_kg,
        breakdown.price_per_kg,
        breakdown.material_cost,
        cur = currency,
    );
    let time_line = format!(
        "Time: {:.1}h × {cur}{:.2}/h = {cur}{:.2}",
        breakdown.print_time_hours,
        breakdown.price_per_kg,
        breakdown.time_cost,
        cur = currency,
    );
    let marker = if breakdown.minimum_applied { "*" } else { "" };

    let mut summary = format!(
        "Cost Breakdown:\n{}\n{}\nSubtotal: {cur}{:.2} (includes {:.0}% markup)\nTotal: {cur}{:.2}{}",
        material_line,
        time_line,
        breakdown.subtotal,
        breakdown.markup_percentage,
        breakdown.total_cost,
        marker,
        cur = currency,
    );
    if breakdown.minimum_applied {
        summary.push_str("\n* Minimum price applied");
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const EPS: f64 = 1e-9;

    fn config() -> PricingConfig {
        PricingConfig::default()
    }

    #[test]
    fn test_reference_quote() {
        let b = calculate_quote(120, 100.0, "PLA", 25.0, &config());

        assert!((b.filament_kg - 0.1).abs() < EPS);
        assert!((b.print_time_hours - 2.5).abs() < EPS);
        assert!((b.material_cost - 2.5).abs() < EPS);
        assert!((b.time_cost - 62.5).abs() < EPS);
        assert!((b.subtotal - 71.5).abs() < EPS);
        assert!((b.total_cost - 71.5).abs() < EPS);
        assert!(!b.minimum_applied);
        assert!((b.markup_percentage - 10.0).abs() < EPS);
        assert_eq!(b.print_time_minutes, 120);
        assert_eq!(b.material_type, "PLA");
    }

    #[test]
    fn test_minimum_floor_for_tiny_job() {
        let cfg = PricingConfig {
            additional_time_hours: 0.0,
            ..config()
        };
        let b = calculate_quote(1, 0.5, "PLA", 25.0, &cfg);

        assert!(b.subtotal < 5.0, "subtotal {} should be under the floor", b.subtotal);
        assert_eq!(b.total_cost, 5.0);
        assert!(b.minimum_applied);
    }

    #[test]
    fn test_subtotal_equal_to_minimum_is_flagged() {
        // 0h print, 0 buffer, markup 1.0: subtotal = grams/1000 * price
        let cfg = PricingConfig {
            additional_time_hours: 0.0,
            markup_multiplier: 1.0,
            minimum_price: 5.0,
            ..config()
        };
        let b = calculate_quote(0, 200.0, "PLA", 25.0, &cfg);
        assert_eq!(b.subtotal, 5.0);
        assert_eq!(b.total_cost, 5.0);
        assert!(b.minimum_applied);
    }

    #[test]
    fn test_engine_uses_material_rate_and_default() {
        let engine = PricingEngine::new(config());
        assert_eq!(engine.price_per_kg("PETG"), 30.0);
        assert_eq!(engine.price_per_kg("asa"), 35.0);
        assert_eq!(engine.price_per_kg("NYLON"), 25.0);

        let result = SlicingResult::new(120, 100.0).unwrap();
        let pla = engine.calculate(&result, "PLA");
        let petg = engine.calculate(&result, "PETG");
        assert_eq!(petg.price_per_kg, 30.0);
        assert!(petg.total_cost > pla.total_cost);
        assert_eq!(petg.material_type, "PETG");
    }

    #[test]
    fn test_format_cost_summary() {
        let b = calculate_quote(120, 100.0, "PLA", 25.0, &config());
        let summary = format_cost_summary(&b, "S$");

        assert!(summary.starts_with("Cost Breakdown:"));
        assert!(summary.contains("Material: 100.0g (0.100kg) × S$25.00/kg = S$2.50"));
        assert!(summary.contains("Time: 2.5h × S$25.00/h = S$62.50"));
        assert!(summary.contains("Subtotal: S$71.50 (includes 10% markup)"));
        assert!(summary.contains("Total: S$71.50"));
        assert!(!summary.contains("Minimum price applied"));
    }

    #[test]
    fn test_format_cost_summary_marks_minimum() {
        let cfg = PricingConfig {
            additional_time_hours: 0.0,
            ..config()
        };
        let b = calculate_quote(1, 0.5, "PLA", 25.0, &cfg);
        let summary = format_cost_summary(&b, "$");
        assert!(summary.contains("Total: $5.00*"));
        assert!(summary.ends_with("* Minimum price applied"));
    }

    proptest! {
        #[test]
        fn prop_cheaper_material_costs_less(
            minutes in 0u32..10_000,
            grams in 0.001f64..5_000.0,
            low in 0.01f64..100.0,
            delta in 0.01f64..100.0,
        ) {
            let cfg = config();
            let a = calculate_quote(minutes, grams, "A", low, &cfg);
            let b = calculate_quote(minutes, grams, "B", low + delta, &cfg);
            prop_assert!(a.material_cost < b.material_cost);
            prop_assert!(a.time_cost < b.time_cost);
        }

        #[test]
        fn prop_total_never_below_minimum(
            minutes in 0u32..10_000,
            grams in 0.0f64..5_000.0,
            price in 0.0f64..200.0,
            minimum in 0.0f64..50.0,
        ) {
            let cfg = PricingConfig { minimum_price: minimum, ..config() };
            let b = calculate_quote(minutes, grams, "PLA", price, &cfg);
            prop_assert!(b.total_cost >= minimum);
            prop_assert_eq!(b.minimum_applied, b.total_cost == minimum);
        }

        #[test]
        fn prop_subtotal_is_marked_up_sum(
            minutes in 0u32..10_000,
            grams in 0.0f64..5_000.0,
            price in 0.0f64..200.0,
            markup in 1.0f64..3.0,
        ) {
            let cfg = PricingConfig { markup_multiplier: markup, ..config() };
            let b = calculate_quote(minutes, grams, "PLA", price, &cfg);
            prop_assert_eq!(b.subtotal, (b.material_cost + b.time_cost) * markup);
        }
    }
}
