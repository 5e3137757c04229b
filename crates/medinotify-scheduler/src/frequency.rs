//! Frequency normalizer: free-form recurrence text to `{count, unit}`.
//!
//! Accepts "5", "5 minutes", "2 Days", "every 3 weeks". The first integer is the
//! count, the first unit word (minute|hour|day|week|month, optional "s", any case)
//! is the unit. A bare number falls back to the configured default unit. A count
//! written with a leading minus is rejected.

use regex::Regex;
use std::sync::LazyLock;

use medinotify_core::{Frequency, FrequencyUnit, NotifyError, Result};

static COUNT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid count regex"));
static UNIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(minute|hour|day|week|month)s?").expect("valid unit regex")
});

/// Normalize with `minute` as the bare-number default.
pub fn normalize_frequency(raw: &str) -> Result<Frequency> {
    normalize_frequency_with(raw, FrequencyUnit::Minute)
}

/// Normalize with an explicit default unit for bare numbers.
pub fn normalize_frequency_with(raw: &str, default_unit: FrequencyUnit) -> Result<Frequency> {
    let count_match = COUNT
        .find(raw)
        .ok_or_else(|| NotifyError::Validation(format!("frequency '{raw}' has no count")))?;
    let count: u32 = count_match
        .as_str()
        .parse()
        .map_err(|_| NotifyError::Validation(format!("frequency count '{}' is too large", count_match.as_str())))?;
    if count == 0 || raw[..count_match.start()].trim_end().ends_with('-') {
        return Err(NotifyError::Validation("frequency count must be positive".into()));
    }

    let Some(unit_match) = UNIT.find(raw) else {
        return Ok(Frequency::new(count, default_unit));
    };
    let label = unit_match.as_str().to_string();
    let unit: FrequencyUnit = label.parse().map_err(NotifyError::Validation)?;
    Ok(Frequency { count, unit, label })
}
