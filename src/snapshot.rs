use chrono::{Datelike, Months, NaiveDate};
use rust_decimal::Decimal;

use crate::fmt::{date, parse_date};
use crate::labels::Locale;
use crate::models::{Identity, InvoiceEntry, KmTripEntry};
use crate::reports::{
    aggregate_invoices, aggregate_km, group_km_by_date, DayKey, InvoiceTotals, KmDayGroup,
    KmRates, KmTotals,
};
use crate::session::Session;

/// Frozen, sorted copy of the session plus every figure the renderers print.
/// All three renderers and the terminal summary read the same snapshot.
#[derive(Debug, Clone)]
pub struct ReportSnapshot {
    pub filename: String,
    pub identity: Identity,
    pub period: String,
    pub period_start: String,
    pub period_end: String,
    pub invoices: Vec<InvoiceEntry>,
    pub km_entries: Vec<KmTripEntry>,
    pub invoice_totals: InvoiceTotals,
    pub km_totals: KmTotals,
    pub km_by_date: Vec<KmDayGroup>,
    /// Reimbursable invoices plus kilometric amounts. Prepaid money is excluded.
    pub grand_total: Decimal,
    pub locale: Locale,
    pub generated_on: NaiveDate,
}

pub fn build(session: &Session, rates: &KmRates, locale: Locale, today: NaiveDate) -> ReportSnapshot {
    let mut invoices = session.invoices.clone();
    invoices.sort_by_key(|e| day_key(&e.date));

    let mut km_entries = session.km_entries.clone();
    for entry in &mut km_entries {
        entry.recompute(rates);
    }
    km_entries.sort_by_key(|e| day_key(&e.date));

    let (period, period_start, period_end) = match session.period.as_deref().map(str::trim) {
        Some(explicit) if !explicit.is_empty() => {
            let (start, end) = split_period(explicit);
            (explicit.to_string(), start, end)
        }
        _ => {
            let anchor = latest_date(&km_entries).unwrap_or(today);
            let (first, last) = month_bounds(anchor);
            let (start, end) = (date(first), date(last));
            (format!("{start} - {end}"), start, end)
        }
    };

    let filename = match session.filename.as_deref().map(str::trim) {
        Some(explicit) if !explicit.is_empty() => sanitize_filename(explicit.trim_end_matches(".xlsx")),
        _ => {
            let month_of = parse_date(&period_start).unwrap_or(today);
            default_filename(&session.identity.surname, month_of, locale)
        }
    };

    let invoice_totals = aggregate_invoices(&invoices);
    let km_totals = aggregate_km(&km_entries);
    let km_by_date = group_km_by_date(&km_entries);
    let grand_total = invoice_totals.reimbursable + km_totals.total_amount;

    tracing::debug!(
        invoices = invoices.len(),
        km_entries = km_entries.len(),
        %grand_total,
        "built report snapshot"
    );

    ReportSnapshot {
        filename,
        identity: session.identity.clone(),
        period,
        period_start,
        period_end,
        invoices,
        km_entries,
        invoice_totals,
        km_totals,
        km_by_date,
        grand_total,
        locale,
        generated_on: today,
    }
}

fn day_key(raw: &str) -> DayKey {
    parse_date(raw).map_or(DayKey::Unspecified, DayKey::Dated)
}

fn latest_date(entries: &[KmTripEntry]) -> Option<NaiveDate> {
    entries.iter().filter_map(|e| parse_date(&e.date)).max()
}

/// First and last day of the month containing `day`.
pub fn month_bounds(day: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first = day.with_day(1).unwrap_or(day);
    let last = first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(day);
    (first, last)
}

fn split_period(period: &str) -> (String, String) {
    match period.split_once(" - ") {
        Some((start, end)) => (start.trim().to_string(), end.trim().to_string()),
        None => (period.to_string(), String::new()),
    }
}

fn default_filename(surname: &str, month_of: NaiveDate, locale: Locale) -> String {
    let mut parts = vec!["RIMBORSO_SPESE".to_string()];
    let surname = sanitize_filename(&surname.to_uppercase());
    if !surname.is_empty() {
        parts.push(surname);
    }
    parts.push(locale.month_name(month_of.month()).to_string());
    parts.push(month_of.year().to_string());
    parts.join("_")
}

/// Keep `[A-Za-z0-9_-]`; whitespace becomes `_`, everything else is dropped.
pub fn sanitize_filename(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || c == '_' || c == '-' => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{KmDraft, Motive};
    use rust_decimal_macros::dec;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
    }

    fn trip(day: &str, km: Decimal) -> KmTripEntry {
        KmTripEntry::new(
            KmDraft {
                date: day.to_string(),
                total_km: km,
                ..KmDraft::default()
            },
            &KmRates::default(),
        )
    }

    #[test]
    fn test_grand_total_combines_invoices_and_km() {
        let mut session = Session::default();
        session.invoices.push(InvoiceEntry {
            amount: "15,50".into(),
            motive: Motive::Food,
            ..InvoiceEntry::default()
        });
        session.km_entries.push(trip("10/03/2025", dec!(100)));
        let snap = build(&session, &KmRates::default(), Locale::It, today());
        assert_eq!(snap.grand_total, dec!(55.50));
        assert_eq!(snap.invoice_totals.reimbursable, dec!(15.50));
        assert_eq!(snap.km_totals.total_amount, dec!(40.00));
    }

    #[test]
    fn test_prepaid_excluded_from_grand_total() {
        let mut session = Session::default();
        session.invoices.push(InvoiceEntry {
            amount: "100".into(),
            prepaid: true,
            ..InvoiceEntry::default()
        });
        let snap = build(&session, &KmRates::default(), Locale::It, today());
        assert_eq!(snap.invoice_totals.prepaid, dec!(100));
        assert_eq!(snap.grand_total, Decimal::ZERO);
    }

    #[test]
    fn test_empty_session() {
        let snap = build(&Session::default(), &KmRates::default(), Locale::It, today());
        assert_eq!(snap.grand_total, Decimal::ZERO);
        assert!(snap.invoices.is_empty());
        assert!(snap.km_by_date.is_empty());
        assert_eq!(snap.period, "01/06/2025 - 30/06/2025");
        assert_eq!(snap.filename, "RIMBORSO_SPESE_GIUGNO_2025");
    }

    #[test]
    fn test_period_from_latest_km_date() {
        let mut session = Session::default();
        session.identity.surname = "De Luca".into();
        session.km_entries.push(trip("28/01/2024", dec!(1)));
        session.km_entries.push(trip("03/02/2024", dec!(1)));
        session.km_entries.push(trip("", dec!(1)));
        let snap = build(&session, &KmRates::default(), Locale::En, today());
        assert_eq!(snap.period_start, "01/02/2024");
        assert_eq!(snap.period_end, "29/02/2024");
        assert_eq!(snap.filename, "RIMBORSO_SPESE_DE_LUCA_FEBRUARY_2024");
    }

    #[test]
    fn test_explicit_period_and_filename_win() {
        let mut session = Session::default();
        session.period = Some("01/05/2025 - 15/05/2025".into());
        session.filename = Some("my report.xlsx".into());
        session.km_entries.push(trip("28/01/2024", dec!(1)));
        let snap = build(&session, &KmRates::default(), Locale::It, today());
        assert_eq!(snap.period_start, "01/05/2025");
        assert_eq!(snap.period_end, "15/05/2025");
        assert_eq!(snap.filename, "my_report");
    }

    #[test]
    fn test_entries_sorted_with_undated_last() {
        let mut session = Session::default();
        session.km_entries.push(trip("", dec!(1)));
        session.km_entries.push(trip("05/03/2025", dec!(2)));
        session.km_entries.push(trip("01/03/2025", dec!(3)));
        let snap = build(&session, &KmRates::default(), Locale::It, today());
        let kms: Vec<Decimal> = snap.km_entries.iter().map(|e| e.total_km()).collect();
        assert_eq!(kms, vec![dec!(3), dec!(2), dec!(1)]);
        // Source session is untouched.
        assert_eq!(session.km_entries[0].total_km(), dec!(1));
    }

    #[test]
    fn test_snapshot_recomputes_with_current_rates() {
        let mut session = Session::default();
        session.km_entries.push(trip("01/03/2025", dec!(100)));
        let rates = KmRates {
            personal: dec!(0.30),
            company: dec!(0.15),
        };
        let snap = build(&session, &rates, Locale::It, today());
        assert_eq!(snap.km_entries[0].amount(), dec!(30.00));
        assert_eq!(snap.grand_total, dec!(30.00));
    }

    #[test]
    fn test_month_bounds() {
        let d = NaiveDate::from_ymd_opt(2025, 12, 9).unwrap();
        let (first, last) = month_bounds(d);
        assert_eq!(first, NaiveDate::from_ymd_opt(2025, 12, 1).unwrap());
        assert_eq!(last, NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());
    }
}
