//! Field normalization shared by board entities.
//!
//! # Invariants
//! - Titles are trimmed, non-blank, and at most `TITLE_MAX_CHARS` chars.
//! - Optional free text collapses to `None` when blank.
//! - Dates are calendar-valid `YYYY-MM-DD` strings.

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Maximum title length for tasks, subtasks and flow nodes.
pub const TITLE_MAX_CHARS: usize = 200;
/// Maximum stored length for flow node colors and edge labels.
pub const COLOR_MAX_CHARS: usize = 16;
pub const LABEL_MAX_CHARS: usize = 80;

static ISO_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})$").expect("valid iso date regex"));

/// Field-level validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    /// Title is blank after trim.
    BlankTitle,
    /// Title exceeds the allowed length.
    TitleTooLong { max: usize },
    /// Date is not a valid `YYYY-MM-DD` calendar date.
    InvalidDate(String),
}

impl Display for FieldError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankTitle => write!(f, "title must not be blank"),
            Self::TitleTooLong { max } => write!(f, "title must be at most {max} characters"),
            Self::InvalidDate(value) => {
                write!(f, "invalid date `{value}`; expected YYYY-MM-DD")
            }
        }
    }
}

impl Error for FieldError {}

/// Trims and validates a title.
pub fn normalize_title(value: &str) -> Result<String, FieldError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(FieldError::BlankTitle);
    }
    if trimmed.chars().count() > TITLE_MAX_CHARS {
        return Err(FieldError::TitleTooLong {
            max: TITLE_MAX_CHARS,
        });
    }
    Ok(trimmed.to_string())
}

/// Trims optional free text; blank becomes `None`.
pub fn normalize_optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|trimmed| !trimmed.is_empty())
        .map(str::to_string)
}

/// Trims text and caps it at `max_chars` characters; blank becomes `None`.
pub fn truncate_optional_text(value: Option<&str>, max_chars: usize) -> Option<String> {
    normalize_optional_text(value).map(|text| text.chars().take(max_chars).collect())
}

/// Validates an optional date; blank becomes `None`.
pub fn normalize_optional_date(value: Option<&str>) -> Result<Option<String>, FieldError> {
    match normalize_optional_text(value) {
        Some(text) => parse_iso_date(&text).map(Some),
        None => Ok(None),
    }
}

/// Validates one `YYYY-MM-DD` date and returns it unchanged.
pub fn parse_iso_date(value: &str) -> Result<String, FieldError> {
    let invalid = || FieldError::InvalidDate(value.to_string());
    let captures = ISO_DATE_RE.captures(value).ok_or_else(invalid)?;

    let year: u32 = captures[1].parse().map_err(|_| invalid())?;
    let month: u32 = captures[2].parse().map_err(|_| invalid())?;
    let day: u32 = captures[3].parse().map_err(|_| invalid())?;

    if !(1..=12).contains(&month) || day == 0 || day > days_in_month(year, month) {
        return Err(invalid());
    }
    Ok(value.to_string())
}

fn days_in_month(year: u32, month: u32) -> u32 {
    match month {
        2 if is_leap_year(year) => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

fn is_leap_year(year: u32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}
