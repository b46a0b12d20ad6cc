use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::amount::round_display;

/// Format a decimal as a euro amount with thousands separators: € 1,234.56
pub fn euro(val: Decimal) -> String {
    let (negative, body) = grouped(val);
    if negative {
        format!("-€ {body}")
    } else {
        format!("€ {body}")
    }
}

/// Two-decimal number with thousands separators, no unit.
pub fn number(val: Decimal) -> String {
    let (negative, body) = grouped(val);
    if negative {
        format!("-{body}")
    } else {
        body
    }
}

pub fn km(val: Decimal) -> String {
    format!("{} km", number(val))
}

fn grouped(val: Decimal) -> (bool, String) {
    let rounded = round_display(val);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let cents = format!("{:.2}", rounded.abs());
    let (int_part, dec_part) = cents.split_once('.').unwrap_or((cents.as_str(), "00"));

    let mut with_commas = String::new();
    for (i, c) in int_part.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            with_commas.push(',');
        }
        with_commas.push(c);
    }
    let with_commas: String = with_commas.chars().rev().collect();
    (negative, format!("{with_commas}.{dec_part}"))
}

/// Route duration in minutes as "1h 5m".
pub fn duration(minutes: f64) -> String {
    let total = minutes.max(0.0).round() as u64;
    format!("{}h {}m", total / 60, total % 60)
}

/// Accepts dd/mm/yyyy (the form's display format) and ISO yyyy-mm-dd.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%d/%m/%Y")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

pub fn date(d: NaiveDate) -> String {
    d.format("%d/%m/%Y").to_string()
}

/// Normalize user input to the dd/mm/yyyy display format. Unparseable input
/// is kept as typed.
pub fn normalize_date(raw: &str) -> String {
    parse_date(raw).map(date).unwrap_or_else(|| raw.trim().to_string())
}
