use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::amount::{parse_amount, parse_quantity};
use crate::labels::Labels;
use crate::reports::{compute_km_amount, KmRates};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    #[default]
    Electronic,
    Cash,
}

impl PaymentMethod {
    pub fn label(self, labels: &Labels) -> &'static str {
        match self {
            PaymentMethod::Electronic => labels.electronic,
            PaymentMethod::Cash => labels.cash,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Motive {
    Food,
    Transportation,
    Housing,
    #[default]
    Other,
}

impl Motive {
    pub fn label(self, labels: &Labels) -> &'static str {
        match self {
            Motive::Food => labels.food,
            Motive::Transportation => labels.transportation,
            Motive::Housing => labels.housing,
            Motive::Other => labels.other,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RoutePreference {
    #[default]
    Recommended,
    Fastest,
    Shortest,
}

impl RoutePreference {
    pub fn as_str(self) -> &'static str {
        match self {
            RoutePreference::Recommended => "recommended",
            RoutePreference::Fastest => "fastest",
            RoutePreference::Shortest => "shortest",
        }
    }
}

/// Who the report is for. Every field is free text copied into the documents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Identity {
    #[serde(alias = "cliente")]
    pub client: String,
    #[serde(alias = "oggettoAttivita")]
    pub activity: String,
    #[serde(alias = "cognome")]
    pub surname: String,
    #[serde(alias = "nome")]
    pub first_name: String,
    #[serde(alias = "sede")]
    pub office: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceEntry {
    #[serde(default)]
    pub date: String,
    #[serde(default, alias = "invoice_title")]
    pub title: String,
    /// Raw amount as typed; see [`InvoiceEntry::amount_value`].
    #[serde(default, deserialize_with = "de_text")]
    pub amount: String,
    #[serde(default, alias = "paymentMethod", deserialize_with = "de_payment")]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub city: String,
    #[serde(default, deserialize_with = "de_motive")]
    pub motive: Motive,
    #[serde(default, alias = "prepagata", deserialize_with = "de_flag")]
    pub prepaid: bool,
    #[serde(default, alias = "invoice", alias = "isInvoice", deserialize_with = "de_flag")]
    pub is_invoice: bool,
}

impl InvoiceEntry {
    pub fn amount_value(&self) -> Decimal {
        parse_amount(&self.amount)
    }
}

/// Everything needed to create a trip except the derived amount.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KmDraft {
    pub date: String,
    pub car_brand: String,
    pub car_model: String,
    pub car_engine: String,
    pub start_city: String,
    pub end_city: String,
    pub waypoints: Vec<String>,
    pub total_km: Decimal,
    pub is_company_car: bool,
    pub payment_method: PaymentMethod,
    pub route_preference: RoutePreference,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KmTripEntry {
    #[serde(default)]
    pub date: String,
    #[serde(default, alias = "carBrand")]
    pub car_brand: String,
    #[serde(default, alias = "carModel")]
    pub car_model: String,
    #[serde(default, alias = "carEngine", alias = "carEngineDisplacement", deserialize_with = "de_text")]
    pub car_engine: String,
    #[serde(default, alias = "startCity")]
    pub start_city: String,
    #[serde(default, alias = "endCity")]
    pub end_city: String,
    #[serde(default)]
    pub waypoints: Vec<String>,
    #[serde(default, alias = "totalKm", deserialize_with = "de_decimal")]
    total_km: Decimal,
    #[serde(default, deserialize_with = "de_decimal")]
    amount: Decimal,
    #[serde(default, alias = "isCompanyCar", deserialize_with = "de_flag")]
    is_company_car: bool,
    #[serde(default, alias = "paymentMethod", deserialize_with = "de_payment")]
    pub payment_method: PaymentMethod,
    #[serde(default, alias = "routePreference", deserialize_with = "de_preference")]
    pub route_preference: RoutePreference,
}

impl KmTripEntry {
    pub fn new(draft: KmDraft, rates: &KmRates) -> Self {
        let mut entry = Self {
            date: draft.date,
            car_brand: draft.car_brand,
            car_model: draft.car_model,
            car_engine: draft.car_engine,
            start_city: draft.start_city,
            end_city: draft.end_city,
            waypoints: draft.waypoints,
            total_km: draft.total_km,
            amount: Decimal::ZERO,
            is_company_car: draft.is_company_car,
            payment_method: draft.payment_method,
            route_preference: draft.route_preference,
        };
        entry.recompute(rates);
        entry
    }

    pub fn total_km(&self) -> Decimal {
        self.total_km
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn is_company_car(&self) -> bool {
        self.is_company_car
    }

    pub fn set_total_km(&mut self, km: Decimal, rates: &KmRates) {
        self.total_km = km;
        self.recompute(rates);
    }

    pub fn set_company_car(&mut self, is_company_car: bool, rates: &KmRates) {
        self.is_company_car = is_company_car;
        self.recompute(rates);
    }

    /// Re-derive `amount`; stored amounts from older sessions are never trusted.
    pub fn recompute(&mut self, rates: &KmRates) {
        self.amount = compute_km_amount(self.total_km, self.is_company_car, rates);
    }

    /// "BRAND MODEL (1600 cc)"
    pub fn car_name(&self) -> String {
        format!(
            "{} {} ({} cc)",
            self.car_brand.to_uppercase(),
            self.car_model.to_uppercase(),
            self.car_engine
        )
    }

    pub fn waypoints_upper(&self, separator: &str) -> String {
        self.waypoints
            .iter()
            .map(|w| w.to_uppercase())
            .collect::<Vec<_>>()
            .join(separator)
    }
}

// ---------------------------------------------------------------------------
// Lenient ingestion helpers
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Null(()),
}

fn de_flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(match Option::<Loose>::deserialize(d)? {
        Some(Loose::Bool(b)) => b,
        Some(Loose::Int(i)) => i != 0,
        Some(Loose::Float(f)) => f != 0.0,
        Some(Loose::Text(s)) => matches!(
            s.trim().to_lowercase().as_str(),
            "true" | "1" | "si" | "sì" | "yes" | "y"
        ),
        Some(Loose::Null(())) | None => false,
    })
}

fn de_decimal<'de, D: Deserializer<'de>>(d: D) -> Result<Decimal, D::Error> {
    Ok(match Option::<Loose>::deserialize(d)? {
        Some(Loose::Int(i)) => Decimal::from(i),
        Some(Loose::Float(f)) => Decimal::try_from(f).unwrap_or(Decimal::ZERO),
        Some(Loose::Text(s)) => parse_quantity(&s),
        _ => Decimal::ZERO,
    })
}

fn de_motive<'de, D: Deserializer<'de>>(d: D) -> Result<Motive, D::Error> {
    Ok(match Option::<Loose>::deserialize(d)? {
        Some(Loose::Text(s)) => match s.trim().to_lowercase().as_str() {
            "food" | "vitto" => Motive::Food,
            "transportation" | "trasporto" => Motive::Transportation,
            "housing" | "alloggio" => Motive::Housing,
            _ => Motive::Other,
        },
        _ => Motive::Other,
    })
}

fn de_payment<'de, D: Deserializer<'de>>(d: D) -> Result<PaymentMethod, D::Error> {
    Ok(match Option::<Loose>::deserialize(d)? {
        Some(Loose::Text(s)) => match s.trim().to_lowercase().as_str() {
            "cash" | "contanti" => PaymentMethod::Cash,
            _ => PaymentMethod::Electronic,
        },
        _ => PaymentMethod::Electronic,
    })
}

fn de_preference<'de, D: Deserializer<'de>>(d: D) -> Result<RoutePreference, D::Error> {
    Ok(match Option::<Loose>::deserialize(d)? {
        Some(Loose::Text(s)) => match s.trim().to_lowercase().as_str() {
            "fastest" => RoutePreference::Fastest,
            "shortest" => RoutePreference::Shortest,
            _ => RoutePreference::Recommended,
        },
        _ => RoutePreference::Recommended,
    })
}

fn de_text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Option::<Loose>::deserialize(d)? {
        Some(Loose::Text(s)) => s,
        Some(Loose::Int(i)) => i.to_string(),
        Some(Loose::Float(f)) => f.to_string(),
        Some(Loose::Bool(b)) => b.to_string(),
        Some(Loose::Null(())) | None => String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_flags_normalized_from_strings() {
        let json = r#"[
            {"amount": "10", "prepagata": "true", "invoice": "false"},
            {"amount": 5.5, "prepaid": true, "is_invoice": "sì"},
            {"amount": "1,00", "prepagata": "", "invoice": null}
        ]"#;
        let entries: Vec<InvoiceEntry> = serde_json::from_str(json).unwrap();
        assert!(entries[0].prepaid && !entries[0].is_invoice);
        assert!(entries[1].prepaid && entries[1].is_invoice);
        assert!(!entries[2].prepaid && !entries[2].is_invoice);
        assert_eq!(entries[1].amount_value(), dec!(5.5));
        assert_eq!(entries[2].amount_value(), dec!(1));
    }

    #[test]
    fn test_unknown_motive_maps_to_other() {
        let e: InvoiceEntry = serde_json::from_str(r#"{"motive": "parking"}"#).unwrap();
        assert_eq!(e.motive, Motive::Other);
        let e: InvoiceEntry = serde_json::from_str(r#"{"motive": "food"}"#).unwrap();
        assert_eq!(e.motive, Motive::Food);
        let e: InvoiceEntry = serde_json::from_str("{}").unwrap();
        assert_eq!(e.motive, Motive::Other);
    }

    #[test]
    fn test_web_form_km_payload() {
        let json = r#"{
            "carBrand": "Fiat", "carModel": "Panda", "carEngine": 1200,
            "startCity": "Torino", "endCity": "Milano", "waypoints": ["Novara"],
            "totalKm": "142,5", "amount": "999", "isCompanyCar": false,
            "paymentMethod": "Elettronico", "routePreference": "fastest", "date": "03/02/2025"
        }"#;
        let e: KmTripEntry = serde_json::from_str(json).unwrap();
        assert_eq!(e.total_km(), dec!(142.5));
        assert_eq!(e.car_engine, "1200");
        assert_eq!(e.payment_method, PaymentMethod::Electronic);
        assert_eq!(e.route_preference, RoutePreference::Fastest);
        assert_eq!(e.car_name(), "FIAT PANDA (1200 cc)");
        assert_eq!(e.waypoints_upper(" > "), "NOVARA");
    }

    #[test]
    fn test_amount_tracks_km_and_car_type() {
        let rates = KmRates::default();
        let mut e = KmTripEntry::new(
            KmDraft {
                total_km: dec!(100),
                ..KmDraft::default()
            },
            &rates,
        );
        assert_eq!(e.amount(), dec!(40.00));
        e.set_total_km(dec!(55.5), &rates);
        assert_eq!(e.amount(), dec!(22.20));
        e.set_company_car(true, &rates);
        assert_eq!(e.total_km(), dec!(55.5));
        assert_eq!(e.amount(), dec!(11.10));
    }
}
