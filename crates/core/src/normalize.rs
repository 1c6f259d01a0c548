//! Cell normalization rules for input spreadsheets.
//!
//! Downstream code reads every cell as a string: dates become
//! `dd/mm/yyyy`, floats become two-decimal comma-separated values
//! (Brazilian locale), and the pandas sentinels `NaT`/`nan` become
//! empty strings.

use chrono::{NaiveDate, NaiveDateTime};

/// Render a date cell as `dd/mm/yyyy`.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Render a datetime cell as `dd/mm/yyyy`, dropping the time (and any
/// timezone the source carried — result spreadsheets cannot represent
/// tz-aware timestamps).
pub fn format_datetime(datetime: NaiveDateTime) -> String {
    format_date(datetime.date())
}

/// Render a float cell as a two-decimal comma-separated string.
pub fn format_float(value: f64) -> String {
    format!("{value:.2}").replace('.', ",")
}

/// Normalize a textual cell: pandas `NaT`/`nan` sentinels map to the
/// empty string, everything else is trimmed of trailing whitespace.
pub fn format_text(value: &str) -> String {
    match value {
        "NaT" | "nan" => String::new(),
        other => other.trim_end().to_string(),
    }
}

/// True if the text looks like a date (`d/m/y` or `y-m-d` shaped).
pub fn text_is_a_date(text: &str) -> bool {
    static PATTERN: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let re = PATTERN
        .get_or_init(|| regex::Regex::new(r"\d{1,4}[-/]\d{1,2}[-/]\d{1,4}").expect("valid regex"));
    re.is_match(text)
}
