use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RimborsoError};
use crate::models::{Identity, InvoiceEntry, KmTripEntry};
use crate::reports::KmRates;

/// Form state between commands: who, when, and the two entry lists.
///
/// Entries are identified by position only; deleting one shifts the rest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Session {
    #[serde(alias = "formData")]
    pub identity: Identity,
    pub period: Option<String>,
    pub filename: Option<String>,
    #[serde(alias = "fatture")]
    pub invoices: Vec<InvoiceEntry>,
    #[serde(alias = "kmEntries")]
    pub km_entries: Vec<KmTripEntry>,
}

/// Partial update for a trip. `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct KmPatch {
    pub date: Option<String>,
    pub car_brand: Option<String>,
    pub car_model: Option<String>,
    pub car_engine: Option<String>,
    pub start_city: Option<String>,
    pub end_city: Option<String>,
    pub waypoints: Option<Vec<String>>,
    pub total_km: Option<rust_decimal::Decimal>,
    pub is_company_car: Option<bool>,
    pub payment_method: Option<crate::models::PaymentMethod>,
}

impl Session {
    /// Missing file means a fresh session.
    pub fn load(path: &Path, rates: &KmRates) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content, rates)
    }

    /// Parse a session; stored trip amounts are discarded and re-derived.
    /// Payloads with identity fields at the top level are accepted too.
    pub fn from_json(content: &str, rates: &KmRates) -> Result<Self> {
        let raw: serde_json::Value = serde_json::from_str(content)?;
        let mut session: Session = serde_json::from_value(raw.clone())?;
        if session.identity == Identity::default() {
            session.identity = serde_json::from_value(raw)?;
        }
        session.recompute(rates);
        Ok(session)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, format!("{json}\n"))?;
        Ok(())
    }

    pub fn recompute(&mut self, rates: &KmRates) {
        for entry in &mut self.km_entries {
            entry.recompute(rates);
        }
    }

    /// Replace this session with an imported one. Identity fields left blank
    /// in the import keep their current value.
    pub fn import(&mut self, other: Session) {
        let Session {
            identity,
            period,
            filename,
            invoices,
            km_entries,
        } = other;
        merge_field(&mut self.identity.client, identity.client);
        merge_field(&mut self.identity.activity, identity.activity);
        merge_field(&mut self.identity.surname, identity.surname);
        merge_field(&mut self.identity.first_name, identity.first_name);
        merge_field(&mut self.identity.office, identity.office);
        if period.is_some() {
            self.period = period;
        }
        if filename.is_some() {
            self.filename = filename;
        }
        self.invoices = invoices;
        self.km_entries = km_entries;
    }

    // -- invoices -----------------------------------------------------------

    pub fn add_invoice(&mut self, entry: InvoiceEntry) -> usize {
        self.invoices.push(entry);
        self.invoices.len() - 1
    }

    pub fn invoice_mut(&mut self, index: usize) -> Result<&mut InvoiceEntry> {
        let len = self.invoices.len();
        self.invoices.get_mut(index).ok_or(RimborsoError::IndexOutOfRange {
            kind: "invoice",
            index,
            len,
        })
    }

    pub fn delete_invoice(&mut self, index: usize) -> Result<InvoiceEntry> {
        check_index("invoice", index, self.invoices.len())?;
        Ok(self.invoices.remove(index))
    }

    // -- km trips -----------------------------------------------------------

    pub fn add_km(&mut self, entry: KmTripEntry) -> usize {
        self.km_entries.push(entry);
        self.km_entries.len() - 1
    }

    pub fn edit_km(&mut self, index: usize, patch: KmPatch, rates: &KmRates) -> Result<&KmTripEntry> {
        let len = self.km_entries.len();
        let entry = self
            .km_entries
            .get_mut(index)
            .ok_or(RimborsoError::IndexOutOfRange { kind: "km entry", index, len })?;

        if let Some(v) = patch.date {
            entry.date = v;
        }
        if let Some(v) = patch.car_brand {
            entry.car_brand = v;
        }
        if let Some(v) = patch.car_model {
            entry.car_model = v;
        }
        if let Some(v) = patch.car_engine {
            entry.car_engine = v;
        }
        if let Some(v) = patch.start_city {
            entry.start_city = v;
        }
        if let Some(v) = patch.end_city {
            entry.end_city = v;
        }
        if let Some(v) = patch.waypoints {
            entry.waypoints = v;
        }
        if let Some(v) = patch.payment_method {
            entry.payment_method = v;
        }
        if let Some(km) = patch.total_km {
            entry.set_total_km(km, rates);
        }
        if let Some(company) = patch.is_company_car {
            entry.set_company_car(company, rates);
        }
        Ok(&*entry)
    }

    pub fn toggle_company_car(&mut self, index: usize, rates: &KmRates) -> Result<&KmTripEntry> {
        let len = self.km_entries.len();
        let entry = self
            .km_entries
            .get_mut(index)
            .ok_or(RimborsoError::IndexOutOfRange { kind: "km entry", index, len })?;
        let flipped = !entry.is_company_car();
        entry.set_company_car(flipped, rates);
        Ok(&*entry)
    }

    pub fn delete_km(&mut self, index: usize) -> Result<KmTripEntry> {
        check_index("km entry", index, self.km_entries.len())?;
        Ok(self.km_entries.remove(index))
    }

    pub fn reset_km(&mut self) -> usize {
        let removed = self.km_entries.len();
        self.km_entries.clear();
        removed
    }
}

fn check_index(kind: &'static str, index: usize, len: usize) -> Result<()> {
    if index >= len {
        return Err(RimborsoError::IndexOutOfRange { kind, index, len });
    }
    Ok(())
}

fn merge_field(current: &mut String, incoming: String) {
    if !incoming.trim().is_empty() {
        *current = incoming;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::KmDraft;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn trip(start: &str, km: Decimal) -> KmTripEntry {
        KmTripEntry::new(
            KmDraft {
                start_city: start.to_string(),
                total_km: km,
                ..KmDraft::default()
            },
            &KmRates::default(),
        )
    }

    fn session_with_trips() -> Session {
        let mut s = Session::default();
        s.add_km(trip("A", dec!(10)));
        s.add_km(trip("B", dec!(20)));
        s.add_km(trip("C", dec!(30)));
        s
    }

    #[test]
    fn test_delete_shifts_later_entries() {
        let mut s = session_with_trips();
        let before = s.km_entries.clone();
        let removed = s.delete_km(1).unwrap();
        assert_eq!(removed.start_city, "B");
        assert_eq!(s.km_entries.len(), 2);
        assert_eq!(s.km_entries[0], before[0]);
        assert_eq!(s.km_entries[1], before[2]);
    }

    #[test]
    fn test_delete_out_of_range() {
        let mut s = session_with_trips();
        let err = s.delete_km(3).unwrap_err();
        assert!(matches!(err, RimborsoError::IndexOutOfRange { index: 3, len: 3, .. }));
        assert!(s.delete_invoice(0).is_err());
        assert_eq!(s.km_entries.len(), 3);
    }

    #[test]
    fn test_edit_recomputes_amount() {
        let rates = KmRates::default();
        let mut s = session_with_trips();
        let patch = KmPatch {
            total_km: Some(dec!(100)),
            ..KmPatch::default()
        };
        assert_eq!(s.edit_km(0, patch, &rates).unwrap().amount(), dec!(40.00));
        let patch = KmPatch {
            is_company_car: Some(true),
            ..KmPatch::default()
        };
        assert_eq!(s.edit_km(0, patch, &rates).unwrap().amount(), dec!(20.00));
        assert_eq!(s.toggle_company_car(0, &rates).unwrap().amount(), dec!(40.00));
    }

    #[test]
    fn test_edit_keeps_untouched_fields() {
        let rates = KmRates::default();
        let mut s = session_with_trips();
        let patch = KmPatch {
            end_city: Some("Roma".into()),
            ..KmPatch::default()
        };
        let e = s.edit_km(2, patch, &rates).unwrap();
        assert_eq!(e.start_city, "C");
        assert_eq!(e.end_city, "Roma");
        assert_eq!(e.total_km(), dec!(30));
    }

    #[test]
    fn test_save_load_roundtrip_recomputes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");
        let mut s = session_with_trips();
        s.identity.surname = "Rossi".into();
        s.add_invoice(InvoiceEntry {
            amount: "15,50".into(),
            ..InvoiceEntry::default()
        });
        s.save(&path).unwrap();

        let cheaper = KmRates {
            personal: dec!(0.10),
            company: dec!(0.05),
        };
        let loaded = Session::load(&path, &cheaper).unwrap();
        assert_eq!(loaded.identity.surname, "Rossi");
        assert_eq!(loaded.invoices.len(), 1);
        assert_eq!(loaded.km_entries[2].amount(), dec!(3.00));
    }

    #[test]
    fn test_missing_file_is_empty_session() {
        let dir = tempfile::tempdir().unwrap();
        let s = Session::load(&dir.path().join("nope.json"), &KmRates::default()).unwrap();
        assert_eq!(s, Session::default());
    }

    #[test]
    fn test_import_web_form_payload() {
        let json = r#"{
            "formData": {"cliente": "ACME", "cognome": "Bianchi", "nome": "Anna", "sede": "Torino"},
            "invoices": [{"date": "01/03/2025", "invoice_title": "Pranzo", "amount": "12,40",
                          "paymentMethod": "Contanti", "motive": "food", "prepagata": "false", "invoice": "true"}],
            "kmEntries": [{"totalKm": 50, "isCompanyCar": true, "amount": 1}]
        }"#;
        let rates = KmRates::default();
        let imported = Session::from_json(json, &rates).unwrap();
        let mut s = Session::default();
        s.identity.activity = "Audit".into();
        s.import(imported);
        assert_eq!(s.identity.client, "ACME");
        assert_eq!(s.identity.activity, "Audit");
        assert_eq!(s.invoices[0].title, "Pranzo");
        assert!(s.invoices[0].is_invoice);
        assert_eq!(s.km_entries[0].amount(), dec!(10.00));
    }

    #[test]
    fn test_import_flat_preview_payload() {
        let json = r#"{
            "filename": "RIMBORSO", "cliente": "ACME", "cognome": "Verdi", "nome": "Luca",
            "sede": "Milano", "oggettoAttivita": "Consulenza", "period": "01/03/2025 - 31/03/2025",
            "fatture": [{"amount": "3"}], "kmEntries": []
        }"#;
        let s = Session::from_json(json, &KmRates::default()).unwrap();
        assert_eq!(s.identity.surname, "Verdi");
        assert_eq!(s.identity.activity, "Consulenza");
        assert_eq!(s.period.as_deref(), Some("01/03/2025 - 31/03/2025"));
        assert_eq!(s.invoices.len(), 1);
    }
}
