//! Admin-facing message text.

use super::types::{QuoteId, QuoteRequest, DEFAULT_MATERIAL};

/// "2h 5m".
pub fn format_print_time(minutes: u32) -> String {
    format!("{}h {}m", minutes / 60, minutes % 60)
}

/// "12.3g".
pub fn format_weight(grams: f64) -> String {
    format!("{:.1}g", grams)
}

/// Everything the new-quote notification shows.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteMessage {
    pub short_id: String,
    pub customer_name: String,
    pub customer_mobile: String,
    pub filename: String,
    /// `None` when the customer did not pick a material.
    pub material: Option<String>,
    pub color: Option<String>,
    pub print_time_minutes: u32,
    pub filament_grams: f64,
    pub total_cost: f64,
    pub currency: String,
}

impl QuoteMessage {
    pub fn new(
        id: &QuoteId,
        request: &QuoteRequest,
        material: Option<String>,
        print_time_minutes: u32,
        filament_grams: f64,
        total_cost: f64,
        currency: &str,
    ) -> Self {
        Self {
            short_id: id.short().to_string(),
            customer_name: request.name.clone(),
            customer_mobile: request.mobile.clone(),
            filename: request.filename.clone(),
            material,
            color: request.color.clone(),
            print_time_minutes,
            filament_grams,
            total_cost,
            currency: currency.to_string(),
        }
    }

    pub fn format(&self) -> String {
        let material = match &self.material {
            Some(m) => m.clone(),
            None => format!("{} (default)", DEFAULT_MATERIAL),
        };
        let color = self
            .color
            .as_deref()
            .map(|c| format!(" - {}", c))
            .unwrap_or_default();

        format!(
            "New Quote Request #{}\n\
             \n\
             Customer: {}\n\
             WhatsApp: {}\n\
             File: {}\n\
             Material: {}{}\n\
             \n\
             Print Time: {}\n\
             Filament: {}\n\
             Total Cost: {}{:.2}\n\
             \n\
             Reply to this message to contact the customer directly.",
            self.short_id,
            self.customer_name,
            self.customer_mobile,
            self.filename,
            material,
            color,
            format_print_time(self.print_time_minutes),
            format_weight(self.filament_grams),
            self.currency,
            self.total_cost,
        )
    }
}

/// Text sent to the admin when a quote fails.
pub fn failure_message(short_id: &str, error: &str) -> String {
    format!("Quote Processing Error #{}\n\n{}", short_id, error)
}
