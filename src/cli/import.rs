use std::path::PathBuf;

use crate::cli::{load_session, save_session};
use crate::error::Result;
use crate::session::Session;
use crate::settings::{load_settings, shellexpand_path};

pub fn run(file: &str) -> Result<()> {
    let path = PathBuf::from(shellexpand_path(file));
    let settings = load_settings();
    let content = std::fs::read_to_string(&path)?;
    let imported = Session::from_json(&content, &settings.rates)?;

    let mut session = load_session(&settings)?;
    session.import(imported);
    save_session(&settings, &session)?;

    tracing::info!(path = %path.display(), "session imported");
    println!(
        "{} expense entries, {} trips imported",
        session.invoices.len(),
        session.km_entries.len()
    );
    Ok(())
}
