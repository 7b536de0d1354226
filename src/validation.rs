use chrono::NaiveDate;

use crate::error::EventError;

/// Longest span a single date-range listing may cover.
pub const MAX_RANGE_DAYS: i64 = 366;

/// Trims a required text field, failing when nothing is left.
pub fn validate_required(field: &str, value: &str) -> Result<String, EventError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(EventError::Validation(format!("{field} is required")))
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn validate_date_range(start: NaiveDate, end: NaiveDate) -> Result<(), EventError> {
    if end < start {
        return Err(EventError::Validation(
            "end_date must not be before start_date".into(),
        ));
    }
    if (end - start).num_days() > MAX_RANGE_DAYS {
        return Err(EventError::Validation(format!(
            "date range must not exceed {MAX_RANGE_DAYS} days"
        )));
    }
    Ok(())
}
