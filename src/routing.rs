//! Client for the external routing service that turns a list of addresses
//! into a driving distance, plus the carpool pickup planner built on it.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use ureq::Agent;

use crate::amount::from_float;
use crate::error::{Result, RimborsoError};
use crate::models::{KmDraft, KmTripEntry, PaymentMethod, RoutePreference};
use crate::reports::KmRates;

// ---------------------------------------------------------------------------
// Wire contract
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteRequest {
    pub cities: Vec<String>,
    pub mode: &'static str,
    pub preference: RoutePreference,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimize: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friends: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RouteResponse {
    pub distance_km: f64,
    pub duration_min: f64,
    #[serde(default)]
    pub cities: Vec<String>,
    #[serde(default)]
    pub friends: Option<Vec<String>>,
    #[serde(default)]
    pub map_leaf: Option<MapLeaf>,
    #[serde(default)]
    pub map_urls: Option<serde_json::Value>,
}

impl RouteResponse {
    /// The service's Google Maps link, or one built from the visiting order.
    pub fn map_link(&self) -> Option<String> {
        self.map_urls
            .as_ref()
            .and_then(|urls| urls.get("google_maps"))
            .and_then(|url| url.as_str())
            .map(str::to_string)
            .or_else(|| maps_url(&self.cities))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LatLng {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

impl LatLng {
    fn pair(&self) -> Option<(f64, f64)> {
        Some((self.lat?, self.lng?))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MapLeaf {
    pub start_point: LatLng,
    pub end_point: LatLng,
    pub path_points: Vec<LatLng>,
    pub waypoints: Vec<LatLng>,
    pub mode: String,
}

impl MapLeaf {
    /// Start, every complete path point, end. Points missing a coordinate are skipped.
    pub fn polyline(&self) -> Vec<(f64, f64)> {
        std::iter::once(&self.start_point)
            .chain(self.path_points.iter())
            .chain(std::iter::once(&self.end_point))
            .filter_map(LatLng::pair)
            .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorBody {
    error: Option<String>,
    invalid_cities: Option<Vec<String>>,
}

/// Map a non-2xx reply to the message shown to the user.
pub fn error_from_status(status: u16, body: &str) -> RimborsoError {
    if (400..500).contains(&status) {
        if let Ok(ErrorBody {
            error: Some(error),
            invalid_cities,
        }) = serde_json::from_str::<ErrorBody>(body)
        {
            return match invalid_cities {
                Some(cities) if !cities.is_empty() => {
                    RimborsoError::Routing(format!("{error}: {}", cities.join(", ")))
                }
                _ => RimborsoError::Routing(error),
            };
        }
    }
    RimborsoError::Routing(format!("request failed with status {status}"))
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

pub trait RouteProvider {
    fn route(&self, request: &RouteRequest) -> Result<RouteResponse>;
}

pub struct HttpRouteProvider {
    agent: Agent,
    endpoint: String,
}

impl HttpRouteProvider {
    pub fn new(endpoint: &str, timeout_secs: u64) -> Self {
        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(timeout_secs)))
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            agent,
            endpoint: endpoint.to_string(),
        }
    }
}

impl RouteProvider for HttpRouteProvider {
    fn route(&self, request: &RouteRequest) -> Result<RouteResponse> {
        let payload = serde_json::to_string(request)?;
        tracing::debug!(endpoint = %self.endpoint, stops = request.cities.len(), "requesting route");

        let mut response = self
            .agent
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .send(payload)
            .map_err(|e| RimborsoError::Routing(format!("routing service unreachable: {e}")))?;

        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| RimborsoError::Routing(format!("unreadable routing reply: {e}")))?;

        if !(200..300).contains(&status) {
            return Err(error_from_status(status, &body));
        }
        parse_response(&body)
    }
}

/// Decode a 2xx reply. A reply without a usable distance is an error, never
/// a zero-length route.
pub fn parse_response(body: &str) -> Result<RouteResponse> {
    let response: RouteResponse = serde_json::from_str(body)
        .map_err(|e| RimborsoError::Routing(format!("malformed routing reply: {e}")))?;
    if !response.distance_km.is_finite() || response.distance_km < 0.0 {
        return Err(RimborsoError::Routing(format!(
            "routing reply has an invalid distance: {}",
            response.distance_km
        )));
    }
    Ok(response)
}

// ---------------------------------------------------------------------------
// Single trips
// ---------------------------------------------------------------------------

/// A place on a route: a city and an optional street address.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stop {
    pub city: String,
    pub address: String,
}

impl Stop {
    /// Parses "City" or "City, street address".
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(',') {
            Some((city, address)) => Self {
                city: city.trim().to_string(),
                address: address.trim().to_string(),
            },
            None => Self {
                city: raw.trim().to_string(),
                address: String::new(),
            },
        }
    }

    fn query(&self) -> String {
        if self.address.is_empty() {
            self.city.clone()
        } else {
            format!("{}, {}", self.city, self.address)
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TripPlan {
    pub start: Stop,
    pub waypoints: Vec<Stop>,
    pub end: Stop,
    pub preference: RoutePreference,
}

impl TripPlan {
    pub fn request(&self) -> Result<RouteRequest> {
        if self.start.city.trim().is_empty() || self.end.city.trim().is_empty() {
            return Err(RimborsoError::InvalidInput(
                "start and end city are required".to_string(),
            ));
        }
        let cities = std::iter::once(&self.start)
            .chain(self.waypoints.iter())
            .chain(std::iter::once(&self.end))
            .map(Stop::query)
            .collect();
        Ok(RouteRequest {
            cities,
            mode: "driving",
            preference: self.preference,
            optimize: None,
            friends: None,
        })
    }

    /// A confirmed route becomes a personal-car trip paid electronically.
    pub fn confirm(
        &self,
        route: &RouteResponse,
        car: CarDetails,
        date: String,
        rates: &KmRates,
    ) -> KmTripEntry {
        KmTripEntry::new(
            KmDraft {
                date,
                car_brand: car.brand,
                car_model: car.model,
                car_engine: car.engine,
                start_city: self.start.city.clone(),
                end_city: self.end.city.clone(),
                waypoints: self.waypoints.iter().map(|w| w.city.clone()).collect(),
                total_km: from_float(route.distance_km),
                is_company_car: false,
                payment_method: PaymentMethod::Electronic,
                route_preference: self.preference,
            },
            rates,
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct CarDetails {
    pub brand: String,
    pub model: String,
    pub engine: String,
}

// ---------------------------------------------------------------------------
// Carpool
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Friend {
    pub name: String,
    pub address: String,
}

impl Friend {
    /// Parses "Name=address".
    pub fn parse(raw: &str) -> Result<Self> {
        let (name, address) = raw.split_once('=').ok_or_else(|| {
            RimborsoError::InvalidInput(format!("expected NAME=ADDRESS, got '{raw}'"))
        })?;
        Ok(Self {
            name: name.trim().to_string(),
            address: address.trim().to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Destination {
    Friend(String),
    Address(String),
}

#[derive(Debug, Clone, Default)]
pub struct CarpoolPlan {
    pub friends: Vec<Friend>,
    pub driver: String,
    pub pickups: Vec<String>,
    pub destination: Option<Destination>,
    pub optimize: bool,
    pub preference: RoutePreference,
}

impl CarpoolPlan {
    fn friend(&self, name: &str) -> Option<&Friend> {
        self.friends.iter().find(|f| f.name == name)
    }

    fn has_address(&self, name: &str) -> bool {
        self.friend(name).is_some_and(|f| !f.address.trim().is_empty())
    }

    /// Every problem with the plan, in display order. Empty means routable.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.driver.trim().is_empty() {
            problems.push("Driver is required".to_string());
        } else if !self.has_address(&self.driver) {
            problems.push("Driver's address is required".to_string());
        }
        if self.pickups.is_empty() {
            problems.push("Select at least one friend".to_string());
        }
        let missing: Vec<&str> = self
            .pickups
            .iter()
            .filter(|name| !self.has_address(name))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            problems.push(format!("Missing addresses for: {}", missing.join(", ")));
        }
        match &self.destination {
            None => problems.push("Destination is required".to_string()),
            Some(Destination::Address(a)) if a.trim().is_empty() => {
                problems.push("Destination is required".to_string())
            }
            Some(Destination::Friend(name)) if !self.has_address(name) => {
                problems.push("Destination friend's address is required".to_string())
            }
            Some(_) => {}
        }
        problems
    }

    pub fn request(&self) -> Result<RouteRequest> {
        let problems = self.problems();
        if !problems.is_empty() {
            return Err(RimborsoError::InvalidInput(format!(
                "Cannot generate route: {}",
                problems.join(", ")
            )));
        }

        let mut cities = Vec::new();
        let mut names = Vec::new();
        let stops = std::iter::once(&self.driver).chain(self.pickups.iter());
        for name in stops {
            if let Some(friend) = self.friend(name) {
                cities.push(friend.address.clone());
                names.push(friend.name.clone());
            }
        }
        match &self.destination {
            Some(Destination::Friend(name)) => {
                if let Some(friend) = self.friend(name) {
                    cities.push(friend.address.clone());
                    names.push(friend.name.clone());
                }
            }
            Some(Destination::Address(address)) => {
                cities.push(address.clone());
                names.push("Destination".to_string());
            }
            None => {}
        }

        Ok(RouteRequest {
            cities,
            mode: "driving",
            preference: self.preference,
            optimize: Some(self.optimize),
            friends: Some(names),
        })
    }
}

/// Google Maps directions link for the stops in visiting order.
pub fn maps_url(cities: &[String]) -> Option<String> {
    let (first, rest) = cities.split_first()?;
    let (last, middle) = rest.split_last()?;
    let mut url = format!(
        "https://www.google.com/maps/dir/?api=1&origin={}&destination={}",
        encode_component(first),
        encode_component(last)
    );
    if !middle.is_empty() {
        let joined: Vec<String> = middle.iter().map(|c| encode_component(c)).collect();
        url.push_str("&waypoints=");
        url.push_str(&joined.join("|"));
    }
    url.push_str("&travelmode=driving");
    Some(url)
}

fn encode_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'!' | b'~' | b'*'
            | b'\'' | b'(' | b')' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
