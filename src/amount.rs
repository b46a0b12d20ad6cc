use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};

const CURRENCY_GLYPHS: &[char] = &['€', '$', '£'];

/// Parse a locale-formatted amount ("15,50", "€ 1.234,56", "12.5").
///
/// Malformed or empty input yields zero: a bad amount must never block a
/// report, it just stops contributing to the totals.
pub fn parse_amount(raw: &str) -> Decimal {
    match try_parse(raw) {
        Some(value) => value,
        None => {
            if !raw.trim().is_empty() {
                tracing::warn!(input = raw, "unparseable amount, counting it as zero");
            }
            Decimal::ZERO
        }
    }
}

/// Kilometre values follow the same separator rules as amounts.
pub fn parse_quantity(raw: &str) -> Decimal {
    parse_amount(raw)
}

/// Strict variant used by the CLI, where a typo should be reported rather
/// than silently zeroed.
pub fn try_parse(raw: &str) -> Option<Decimal> {
    let mut cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && !CURRENCY_GLYPHS.contains(c))
        .collect();
    let len = cleaned.len();
    let is_eur = |s: Option<&str>| s.is_some_and(|s| s.eq_ignore_ascii_case("eur"));
    if len >= 3 && is_eur(cleaned.get(len - 3..)) {
        cleaned.truncate(len - 3);
    } else if is_eur(cleaned.get(..3)) {
        cleaned.drain(..3);
    }
    if cleaned.is_empty() {
        return None;
    }

    let normalized = match (cleaned.rfind(','), cleaned.rfind('.')) {
        // Whichever separator comes last is the decimal one.
        (Some(comma), Some(dot)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) if cleaned.matches(',').count() > 1 => cleaned.replace(',', ""),
        (Some(_), None) => cleaned.replace(',', "."),
        (None, Some(_)) if cleaned.matches('.').count() > 1 => cleaned.replace('.', ""),
        _ => cleaned,
    };

    Decimal::from_str(&normalized).ok()
}

/// Convert a float coming from JSON (e.g. a routing distance) to a decimal
/// with two fractional digits.
pub fn from_float(value: f64) -> Decimal {
    Decimal::try_from(value)
        .map(round_display)
        .unwrap_or_else(|_| {
            tracing::warn!(value, "non-finite number, counting it as zero");
            Decimal::ZERO
        })
}

/// Round half-up to cents. Only applied when a value is displayed or
/// written; sums are accumulated at full precision.
pub fn round_display(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
