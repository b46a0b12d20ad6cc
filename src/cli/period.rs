use crate::cli::{load_session, save_session};
use crate::error::{Result, RimborsoError};
use crate::fmt::{date, parse_date};
use crate::session::Session;
use crate::settings::load_settings;
use crate::snapshot;

pub fn run(
    start: Option<String>,
    end: Option<String>,
    filename: Option<String>,
    clear: bool,
) -> Result<()> {
    let settings = load_settings();
    let mut session = load_session(&settings)?;

    let changed = clear || start.is_some() || end.is_some() || filename.is_some();
    if clear {
        session.period = None;
        session.filename = None;
    }
    match (start, end) {
        (Some(start), Some(end)) => session.period = Some(explicit_period(&start, &end)?),
        (None, None) => {}
        _ => {
            return Err(RimborsoError::InvalidInput(
                "--start and --end must be given together".to_string(),
            ))
        }
    }
    if let Some(name) = filename {
        let name = name.trim().to_string();
        session.filename = if name.is_empty() { None } else { Some(name) };
    }
    if changed {
        save_session(&settings, &session)?;
    }

    print_period(&session, &settings);
    Ok(())
}

fn explicit_period(start: &str, end: &str) -> Result<String> {
    let parse = |raw: &str| {
        parse_date(raw).ok_or_else(|| RimborsoError::InvalidInput(format!("'{raw}' is not a date")))
    };
    let (first, last) = (parse(start)?, parse(end)?);
    if last < first {
        return Err(RimborsoError::InvalidInput(format!(
            "period ends ({}) before it starts ({})",
            date(last),
            date(first)
        )));
    }
    Ok(format!("{} - {}", date(first), date(last)))
}

fn print_period(session: &Session, settings: &crate::settings::Settings) {
    let today = chrono::Local::now().date_naive();
    let snap = snapshot::build(session, &settings.rates, settings.locale, today);
    let origin = if session.period.is_some() { "" } else { " (from entries)" };
    println!("Period:     {}{origin}", snap.period);
    println!("Filename:   {}", snap.filename);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_period_normalizes_dates() {
        assert_eq!(
            explicit_period("2025-03-01", "31/03/2025").unwrap(),
            "01/03/2025 - 31/03/2025"
        );
    }

    #[test]
    fn test_explicit_period_rejects_reversed_range() {
        assert!(explicit_period("31/03/2025", "01/03/2025").is_err());
        assert!(explicit_period("marzo", "01/03/2025").is_err());
    }
}
