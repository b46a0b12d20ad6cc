use crate::cli::{load_session, save_session};
use crate::error::Result;
use crate::models::Identity;
use crate::settings::load_settings;

#[derive(Debug, Default)]
pub struct IdentityUpdate {
    pub client: Option<String>,
    pub activity: Option<String>,
    pub surname: Option<String>,
    pub first_name: Option<String>,
    pub office: Option<String>,
}

impl IdentityUpdate {
    fn is_empty(&self) -> bool {
        self.client.is_none()
            && self.activity.is_none()
            && self.surname.is_none()
            && self.first_name.is_none()
            && self.office.is_none()
    }

    fn apply(self, identity: &mut Identity) {
        let fields = [
            (self.client, &mut identity.client),
            (self.activity, &mut identity.activity),
            (self.surname, &mut identity.surname),
            (self.first_name, &mut identity.first_name),
            (self.office, &mut identity.office),
        ];
        for (value, slot) in fields {
            if let Some(v) = value {
                *slot = v.trim().to_string();
            }
        }
    }
}

pub fn run(update: IdentityUpdate) -> Result<()> {
    let settings = load_settings();
    let mut session = load_session(&settings)?;

    if !update.is_empty() {
        update.apply(&mut session.identity);
        save_session(&settings, &session)?;
    }
    print_identity(&session.identity);
    Ok(())
}

fn print_identity(identity: &Identity) {
    let show = |v: &str| if v.is_empty() { "(not set)".to_string() } else { v.to_string() };
    println!("Client:     {}", show(&identity.client));
    println!("Activity:   {}", show(&identity.activity));
    println!("Surname:    {}", show(&identity.surname));
    println!("Name:       {}", show(&identity.first_name));
    println!("Office:     {}", show(&identity.office));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_only_touches_given_fields() {
        let mut identity = Identity {
            client: "ACME".into(),
            surname: "Rossi".into(),
            ..Identity::default()
        };
        IdentityUpdate {
            first_name: Some(" Mario ".into()),
            ..IdentityUpdate::default()
        }
        .apply(&mut identity);
        assert_eq!(identity.client, "ACME");
        assert_eq!(identity.surname, "Rossi");
        assert_eq!(identity.first_name, "Mario");
    }
}
