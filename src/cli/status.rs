use std::path::Path;

use crate::cli::load_session;
use crate::error::Result;
use crate::fmt::euro;
use crate::settings::{load_settings, settings_file_exists};

fn presence(path: &Path) -> &'static str {
    if path.exists() {
        "ok"
    } else {
        "missing"
    }
}

pub fn run() -> Result<()> {
    let settings = load_settings();
    let labels = settings.locale.labels();

    if !settings_file_exists() {
        println!("No settings file. Run `rimborso init` to set up.");
        println!();
    }
    println!("Data dir:   {}", settings.data_path().display());
    println!("Session:    {}", settings.session_path().display());
    println!(
        "XLSX tpl:   {} ({})",
        settings.xlsx_template().display(),
        presence(&settings.xlsx_template())
    );
    println!(
        "DOCX tpl:   {} ({})",
        settings.docx_template().display(),
        presence(&settings.docx_template())
    );
    println!("Routing:    {}", settings.routing_endpoint);
    println!(
        "Rates:      {} {}/km, {} {}/km",
        labels.personal_short,
        euro(settings.rates.personal),
        labels.company_short,
        euro(settings.rates.company)
    );

    let session = load_session(&settings)?;
    println!();
    println!("Expenses:   {}", session.invoices.len());
    println!("Trips:      {}", session.km_entries.len());
    Ok(())
}
