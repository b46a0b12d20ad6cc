use colored::Colorize;
use comfy_table::{Cell, CellAlignment, Table};

use crate::cli::{load_session, parse_number, save_session};
use crate::error::Result;
use crate::fmt::{duration, euro, km, normalize_date};
use crate::models::{KmDraft, KmTripEntry, RoutePreference};
use crate::routing::{CarDetails, HttpRouteProvider, RouteProvider, Stop, TripPlan};
use crate::session::KmPatch;
use crate::settings::load_settings;

/// Trip fields as typed on the command line.
#[derive(Debug, Default)]
pub struct TripArgs {
    pub km: Option<String>,
    pub date: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub engine: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub waypoints: Option<Vec<String>>,
    pub company: Option<bool>,
    pub payment: Option<crate::models::PaymentMethod>,
}

impl TripArgs {
    fn into_patch(self) -> Result<KmPatch> {
        let total_km = match self.km {
            Some(raw) => Some(parse_number(&raw, "distance")?),
            None => None,
        };
        Ok(KmPatch {
            date: self.date.map(|d| normalize_date(&d)),
            car_brand: self.brand,
            car_model: self.model,
            car_engine: self.engine,
            start_city: self.start,
            end_city: self.end,
            waypoints: self.waypoints,
            total_km,
            is_company_car: self.company,
            payment_method: self.payment,
        })
    }
}

pub struct RouteArgs {
    pub start: String,
    pub end: String,
    pub waypoints: Vec<String>,
    pub preference: RoutePreference,
    pub date: Option<String>,
    pub car: CarDetails,
    pub dry_run: bool,
}

pub fn add(args: TripArgs) -> Result<()> {
    let settings = load_settings();
    let mut session = load_session(&settings)?;
    let patch = args.into_patch()?;
    let entry = KmTripEntry::new(
        KmDraft {
            date: patch.date.unwrap_or_default(),
            car_brand: patch.car_brand.unwrap_or_default(),
            car_model: patch.car_model.unwrap_or_default(),
            car_engine: patch.car_engine.unwrap_or_default(),
            start_city: patch.start_city.unwrap_or_default(),
            end_city: patch.end_city.unwrap_or_default(),
            waypoints: patch.waypoints.unwrap_or_default(),
            total_km: patch.total_km.unwrap_or_default(),
            is_company_car: patch.is_company_car.unwrap_or(false),
            payment_method: patch.payment_method.unwrap_or_default(),
            route_preference: RoutePreference::default(),
        },
        &settings.rates,
    );
    let line = describe(&entry);
    let index = session.add_km(entry);
    save_session(&settings, &session)?;
    println!("Added trip {index}: {line}");
    Ok(())
}

pub fn edit(index: usize, args: TripArgs) -> Result<()> {
    let settings = load_settings();
    let mut session = load_session(&settings)?;
    let patch = args.into_patch()?;
    let line = describe(session.edit_km(index, patch, &settings.rates)?);
    save_session(&settings, &session)?;
    println!("Updated trip {index}: {line}");
    Ok(())
}

pub fn toggle(index: usize) -> Result<()> {
    let settings = load_settings();
    let mut session = load_session(&settings)?;
    let line = describe(session.toggle_company_car(index, &settings.rates)?);
    save_session(&settings, &session)?;
    println!("Updated trip {index}: {line}");
    Ok(())
}

pub fn delete(index: usize) -> Result<()> {
    let settings = load_settings();
    let mut session = load_session(&settings)?;
    let removed = session.delete_km(index)?;
    save_session(&settings, &session)?;
    println!("Deleted trip {index}: {}", describe(&removed));
    Ok(())
}

pub fn reset() -> Result<()> {
    let settings = load_settings();
    let mut session = load_session(&settings)?;
    let removed = session.reset_km();
    save_session(&settings, &session)?;
    println!("Removed {removed} trips");
    Ok(())
}

pub fn list() -> Result<()> {
    let settings = load_settings();
    let session = load_session(&settings)?;
    if session.km_entries.is_empty() {
        println!("No trips.");
        return Ok(());
    }
    let labels = settings.locale.labels();

    let mut table = Table::new();
    table.set_header(vec!["#", "Date", "Vehicle", "From", "Via", "To", "Km", "Car", "Amount"]);
    for (i, e) in session.km_entries.iter().enumerate() {
        let car = if e.is_company_car() {
            labels.company_short
        } else {
            labels.personal_short
        };
        table.add_row(vec![
            Cell::new(i),
            Cell::new(&e.date),
            Cell::new(e.car_name()),
            Cell::new(&e.start_city),
            Cell::new(e.waypoints.join(" > ")),
            Cell::new(&e.end_city),
            Cell::new(km(e.total_km())).set_alignment(CellAlignment::Right),
            Cell::new(car),
            Cell::new(euro(e.amount())).set_alignment(CellAlignment::Right),
        ]);
    }
    println!("Trips\n{table}");
    Ok(())
}

pub fn route(args: RouteArgs) -> Result<()> {
    let settings = load_settings();
    let provider = HttpRouteProvider::new(&settings.routing_endpoint, settings.routing_timeout_secs);
    let plan = TripPlan {
        start: Stop::parse(&args.start),
        waypoints: args.waypoints.iter().map(|w| Stop::parse(w)).collect(),
        end: Stop::parse(&args.end),
        preference: args.preference,
    };
    let response = provider.route(&plan.request()?)?;

    if let Some(leaf) = &response.map_leaf {
        tracing::debug!(points = leaf.polyline().len(), mode = %leaf.mode, "route geometry");
    }
    println!("Route:      {}", response.cities.join(" > "));
    println!("Preference: {}", plan.preference.as_str());
    println!("Distance:   {:.2} km", response.distance_km);
    println!("Duration:   {}", duration(response.duration_min));
    if let Some(url) = response.map_link() {
        println!("Map:        {url}");
    }
    if args.dry_run {
        return Ok(());
    }

    let mut session = load_session(&settings)?;
    let date = normalize_date(args.date.as_deref().unwrap_or_default());
    let entry = plan.confirm(&response, args.car, date, &settings.rates);
    let line = describe(&entry);
    let index = session.add_km(entry);
    save_session(&settings, &session)?;
    println!("{} trip {index}: {line}", "Recorded".green().bold());
    Ok(())
}

fn describe(entry: &KmTripEntry) -> String {
    let mut stops = vec![entry.start_city.as_str()];
    stops.extend(entry.waypoints.iter().map(String::as_str));
    stops.push(entry.end_city.as_str());
    let path: Vec<&str> = stops.into_iter().filter(|s| !s.trim().is_empty()).collect();
    let path = if path.is_empty() { "(no route)".to_string() } else { path.join(" > ") };
    format!("{path}, {}, {}", km(entry.total_km()), euro(entry.amount()))
}
