use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

/// Minimum worth a scraped or priced holding needs to be reported.
pub const DUST_THRESHOLD: Decimal = Decimal::from_parts(5, 0, 0, false, 0);

/// One holding on one platform, valued in USD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub name: String,
    pub worth: Decimal,
    pub platform: String,
    pub observed_at: DateTime<Utc>,
}

impl Position {
    pub fn new(name: impl Into<String>, worth: Decimal, platform: impl Into<String>) -> Position {
        Position {
            name: name.into(),
            worth,
            platform: platform.into(),
            observed_at: Utc::now(),
        }
    }

    pub fn is_dust(&self) -> bool {
        self.worth < DUST_THRESHOLD
    }
}

/// Reads a decimal out of a JSON field that may hold either a string or a number.
pub(crate) fn decimal_from_json(value: &JsonValue) -> Option<Decimal> {
    let text = match value {
        JsonValue::String(s) => s.trim().to_owned(),
        JsonValue::Number(n) => n.to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}
