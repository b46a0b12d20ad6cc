use colored::Colorize;

use crate::error::Result;
use crate::models::RoutePreference;
use crate::routing::{
    CarpoolPlan, Destination, Friend, HttpRouteProvider, RouteProvider, RouteResponse,
};
use crate::settings::load_settings;

pub struct CarpoolArgs {
    pub friends: Vec<String>,
    pub driver: String,
    pub pickups: Vec<String>,
    pub to_friend: Option<String>,
    pub to_address: Option<String>,
    pub optimize: bool,
    pub preference: RoutePreference,
}

impl CarpoolArgs {
    fn plan(self) -> Result<CarpoolPlan> {
        let friends = self
            .friends
            .iter()
            .map(|raw| Friend::parse(raw))
            .collect::<Result<Vec<_>>>()?;
        let destination = match (self.to_friend, self.to_address) {
            (Some(name), _) => Some(Destination::Friend(name)),
            (None, Some(address)) => Some(Destination::Address(address)),
            (None, None) => None,
        };
        Ok(CarpoolPlan {
            friends,
            driver: self.driver,
            pickups: self.pickups,
            destination,
            optimize: self.optimize,
            preference: self.preference,
        })
    }
}

pub fn run(args: CarpoolArgs) -> Result<()> {
    let settings = load_settings();
    let plan = args.plan()?;
    let request = plan.request()?;
    let provider = HttpRouteProvider::new(&settings.routing_endpoint, settings.routing_timeout_secs);
    let response = provider.route(&request)?;
    print_route(&response);
    Ok(())
}

fn print_route(response: &RouteResponse) {
    println!("{}", "Pickup order".bold());
    let names = response.friends.as_deref().unwrap_or_default();
    let last = response.cities.len().saturating_sub(1);
    for (i, city) in response.cities.iter().enumerate() {
        let role = match i {
            0 => " (driver)",
            i if i == last => " (destination)",
            _ => "",
        };
        match names.get(i) {
            Some(name) => println!("  {}. {name}{role}: {city}", i + 1),
            None => println!("  {}. {city}{role}", i + 1),
        }
    }
    println!();
    println!("Distance:   {:.2} km", response.distance_km);
    println!("Duration:   {}", crate::fmt::duration(response.duration_min));
    if let Some(url) = response.map_link() {
        println!("Map:        {url}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_prefers_friend_destination() {
        let args = CarpoolArgs {
            friends: vec!["Anna=Via Roma 1, Milano".into(), "Bea=Corso Italia 3, Pavia".into()],
            driver: "Anna".into(),
            pickups: vec!["Bea".into()],
            to_friend: Some("Bea".into()),
            to_address: None,
            optimize: true,
            preference: RoutePreference::Fastest,
        };
        let plan = args.plan().unwrap();
        assert_eq!(plan.friends[1].address, "Corso Italia 3, Pavia");
        assert_eq!(plan.destination, Some(Destination::Friend("Bea".into())));
        assert!(plan.optimize);
    }

    #[test]
    fn test_plan_rejects_malformed_friend() {
        let args = CarpoolArgs {
            friends: vec!["Anna".into()],
            driver: "Anna".into(),
            pickups: vec![],
            to_friend: None,
            to_address: Some("Genova".into()),
            optimize: false,
            preference: RoutePreference::default(),
        };
        assert!(args.plan().is_err());
    }
}
