use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::amount::round_display;
use crate::fmt::parse_date;
use crate::models::{InvoiceEntry, KmTripEntry, Motive};

// ---------------------------------------------------------------------------
// Kilometric rates
// ---------------------------------------------------------------------------

/// Reimbursement per kilometre. Company-car mileage is deliberately paid at
/// half the personal rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KmRates {
    #[serde(default = "default_personal_rate")]
    pub personal: Decimal,
    #[serde(default = "default_company_rate")]
    pub company: Decimal,
}

fn default_personal_rate() -> Decimal {
    Decimal::new(40, 2)
}

fn default_company_rate() -> Decimal {
    Decimal::new(20, 2)
}

impl Default for KmRates {
    fn default() -> Self {
        Self {
            personal: default_personal_rate(),
            company: default_company_rate(),
        }
    }
}

impl KmRates {
    pub fn rate(&self, is_company_car: bool) -> Decimal {
        if is_company_car {
            self.company
        } else {
            self.personal
        }
    }
}

pub fn compute_km_amount(km: Decimal, is_company_car: bool, rates: &KmRates) -> Decimal {
    round_display(km * rates.rate(is_company_car))
}

// ---------------------------------------------------------------------------
// Invoices
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvoiceTotals {
    pub food: Decimal,
    pub transportation: Decimal,
    pub housing: Decimal,
    /// Non-prepaid entries without a named motive.
    pub other: Decimal,
    pub prepaid: Decimal,
    pub reimbursable: Decimal,
    /// Every invoice, prepaid included. Not the report grand total.
    pub grand_total: Decimal,
    pub count: usize,
}

pub fn aggregate_invoices(entries: &[InvoiceEntry]) -> InvoiceTotals {
    let mut totals = InvoiceTotals::default();
    for entry in entries {
        let amount = entry.amount_value();
        totals.count += 1;
        if entry.prepaid {
            totals.prepaid += amount;
            continue;
        }
        totals.reimbursable += amount;
        match entry.motive {
            Motive::Food => totals.food += amount,
            Motive::Transportation => totals.transportation += amount,
            Motive::Housing => totals.housing += amount,
            Motive::Other => totals.other += amount,
        }
    }
    totals.grand_total = totals.reimbursable + totals.prepaid;
    totals
}

// ---------------------------------------------------------------------------
// Kilometric trips
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KmTotals {
    pub personal_km: Decimal,
    pub company_km: Decimal,
    pub personal_amount: Decimal,
    pub company_amount: Decimal,
    pub total_km: Decimal,
    pub total_amount: Decimal,
    pub count: usize,
}

impl KmTotals {
    fn add(&mut self, entry: &KmTripEntry) {
        if entry.is_company_car() {
            self.company_km += entry.total_km();
            self.company_amount += entry.amount();
        } else {
            self.personal_km += entry.total_km();
            self.personal_amount += entry.amount();
        }
        self.total_km += entry.total_km();
        self.total_amount += entry.amount();
        self.count += 1;
    }
}

pub fn aggregate_km(entries: &[KmTripEntry]) -> KmTotals {
    let mut totals = KmTotals::default();
    for entry in entries {
        totals.add(entry);
    }
    totals
}

/// Group key for [`group_km_by_date`]. `Unspecified` sorts after every date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DayKey {
    Dated(NaiveDate),
    Unspecified,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KmDayGroup {
    pub day: DayKey,
    pub totals: KmTotals,
}

pub fn group_km_by_date(entries: &[KmTripEntry]) -> Vec<KmDayGroup> {
    let mut groups: BTreeMap<DayKey, KmTotals> = BTreeMap::new();
    for entry in entries {
        let day = match parse_date(&entry.date) {
            Some(d) => DayKey::Dated(d),
            None => DayKey::Unspecified,
        };
        groups.entry(day).or_default().add(entry);
    }
    groups
        .into_iter()
        .map(|(day, totals)| KmDayGroup { day, totals })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::KmDraft;
    use rust_decimal_macros::dec;

    fn invoice(amount: &str, motive: Motive, prepaid: bool) -> InvoiceEntry {
        InvoiceEntry {
            amount: amount.to_string(),
            motive,
            prepaid,
            ..InvoiceEntry::default()
        }
    }

    fn trip(date: &str, km: Decimal, company: bool) -> KmTripEntry {
        KmTripEntry::new(
            KmDraft {
                date: date.to_string(),
                total_km: km,
                is_company_car: company,
                ..KmDraft::default()
            },
            &KmRates::default(),
        )
    }

    #[test]
    fn test_prepaid_only_counts_as_prepaid() {
        let totals = aggregate_invoices(&[invoice("20", Motive::Food, true)]);
        assert_eq!(totals.prepaid, dec!(20));
        assert_eq!(totals.food, Decimal::ZERO);
        assert_eq!(totals.reimbursable, Decimal::ZERO);
        assert_eq!(totals.grand_total, dec!(20));
    }

    #[test]
    fn test_reimbursable_is_sum_of_buckets() {
        let entries = vec![
            invoice("15,50", Motive::Food, false),
            invoice("30", Motive::Transportation, false),
            invoice("80.25", Motive::Housing, false),
            invoice("4,75", Motive::Other, false),
            invoice("100", Motive::Housing, true),
        ];
        let t = aggregate_invoices(&entries);
        assert_eq!(t.food, dec!(15.50));
        assert_eq!(t.transportation, dec!(30));
        assert_eq!(t.housing, dec!(80.25));
        assert_eq!(t.other, dec!(4.75));
        assert_eq!(t.reimbursable, t.food + t.transportation + t.housing + t.other);
        assert_eq!(t.reimbursable, dec!(130.50));
        assert_eq!(t.prepaid, dec!(100));
        assert_eq!(t.count, 5);
    }

    #[test]
    fn test_malformed_amount_contributes_zero() {
        let t = aggregate_invoices(&[invoice("n/a", Motive::Food, false), invoice("2", Motive::Food, false)]);
        assert_eq!(t.food, dec!(2));
    }

    #[test]
    fn test_km_rates() {
        let rates = KmRates::default();
        assert_eq!(compute_km_amount(dec!(100), false, &rates), dec!(40.00));
        assert_eq!(compute_km_amount(dec!(100), true, &rates), dec!(20.00));
        assert_eq!(compute_km_amount(dec!(12.34), false, &rates), dec!(4.94));
        assert_eq!(compute_km_amount(dec!(0.025), true, &rates), dec!(0.01));
    }

    #[test]
    fn test_custom_rates() {
        let rates = KmRates {
            personal: dec!(0.5),
            company: dec!(0.1),
        };
        assert_eq!(compute_km_amount(dec!(10), false, &rates), dec!(5.00));
        assert_eq!(compute_km_amount(dec!(10), true, &rates), dec!(1.00));
    }

    #[test]
    fn test_aggregate_km_splits_on_car_type() {
        let entries = vec![
            trip("01/03/2025", dec!(100), false),
            trip("02/03/2025", dec!(50), true),
            trip("02/03/2025", dec!(10), false),
        ];
        let t = aggregate_km(&entries);
        assert_eq!(t.personal_km, dec!(110));
        assert_eq!(t.company_km, dec!(50));
        assert_eq!(t.personal_amount, dec!(44.00));
        assert_eq!(t.company_amount, dec!(10.00));
        assert_eq!(t.total_km, dec!(160));
        assert_eq!(t.total_amount, dec!(54.00));
        assert_eq!(t.count, 3);
    }

    #[test]
    fn test_group_by_date_puts_unspecified_last() {
        let entries = vec![
            trip("", dec!(5), false),
            trip("10/03/2025", dec!(10), false),
            trip("garbage", dec!(7), true),
            trip("02/03/2025", dec!(20), true),
            trip("10/03/2025", dec!(1), true),
        ];
        let groups = group_km_by_date(&entries);
        assert_eq!(groups.len(), 3);
        assert_eq!(
            groups[0].day,
            DayKey::Dated(NaiveDate::from_ymd_opt(2025, 3, 2).unwrap())
        );
        assert_eq!(groups[1].totals.count, 2);
        assert_eq!(groups[1].totals.personal_km, dec!(10));
        assert_eq!(groups[1].totals.company_km, dec!(1));
        assert_eq!(groups[2].day, DayKey::Unspecified);
        assert_eq!(groups[2].totals.count, 2);
        assert_eq!(groups[2].totals.total_km, dec!(12));
    }

    #[test]
    fn test_empty_inputs() {
        assert_eq!(aggregate_invoices(&[]), InvoiceTotals::default());
        assert_eq!(aggregate_km(&[]), KmTotals::default());
        assert!(group_km_by_date(&[]).is_empty());
    }
}
