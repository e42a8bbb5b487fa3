//! Cell value normalisation
//!
//! Turns loosely-typed JSON row values into values a worksheet cell can hold.

use serde_json::Value;

/// Maximum number of characters a single cell can hold
pub const EXCEL_TEXT_LIMIT: usize = 32_767;

/// A value ready to be written into a cell
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// Text, already trimmed and capped. Empty text renders as a blank cell.
    Text(String),
    /// Numeric value, always finite
    Number(f64),
    /// Boolean value
    Bool(bool),
}

impl CellValue {
    /// Whether the value renders as a blank cell
    pub fn is_blank(&self) -> bool {
        matches!(self, CellValue::Text(s) if s.is_empty())
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(clean_text(s))
    }
}

impl From<usize> for CellValue {
    fn from(n: usize) -> Self {
        CellValue::Number(n as f64)
    }
}

/// Normalise a JSON value for a cell
///
/// `null` and missing values become empty text, numbers and booleans keep
/// their type, everything else is stringified and cleaned with [`clean_text`].
pub fn clean_value(value: Option<&Value>) -> CellValue {
    match value {
        None | Some(Value::Null) => CellValue::Text(String::new()),
        Some(Value::Bool(b)) => CellValue::Bool(*b),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(f) if f.is_finite() => CellValue::Number(f),
            _ => CellValue::Text(clean_text(&n.to_string())),
        },
        Some(Value::String(s)) => CellValue::Text(clean_text(s)),
        Some(other) => CellValue::Text(clean_text(&other.to_string())),
    }
}

/// Best-effort numeric coercion
///
/// Strings have thousands separators removed and are trimmed before parsing;
/// a `_` between two digits is accepted as a digit group separator.
/// Anything that does not parse to a finite number falls back to
/// [`clean_value`] of the original value.
pub fn coerce_number(value: Option<&Value>) -> CellValue {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::Bool(b)) => Some(if *b { 1.0 } else { 0.0 }),
        Some(Value::String(s)) => parse_number(&s.replace(',', "")),
        _ => None,
    };

    match parsed {
        Some(f) if f.is_finite() => CellValue::Number(f),
        _ => clean_value(value),
    }
}

fn parse_number(s: &str) -> Option<f64> {
    let chars: Vec<char> = s.trim().chars().collect();
    let mut digits = String::with_capacity(chars.len());
    for (index, c) in chars.iter().enumerate() {
        if *c != '_' {
            digits.push(*c);
            continue;
        }
        let after_digit = index > 0 && chars[index - 1].is_ascii_digit();
        let before_digit = chars.get(index + 1).is_some_and(char::is_ascii_digit);
        if !(after_digit && before_digit) {
            return None;
        }
    }
    digits.parse().ok()
}

/// Strip characters XML cannot carry, trim, and cap to [`EXCEL_TEXT_LIMIT`]
pub fn clean_text(s: &str) -> String {
    let filtered: String = s.chars().filter(|c| is_xml_char(*c)).collect();
    let trimmed = filtered.trim();
    if trimmed.chars().count() > EXCEL_TEXT_LIMIT {
        trimmed.chars().take(EXCEL_TEXT_LIMIT).collect()
    } else {
        trimmed.to_string()
    }
}

fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}')
        || c >= '\u{10000}'
}
