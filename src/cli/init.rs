use std::path::{Path, PathBuf};

use colored::Colorize;

use crate::docx::builtin_docx_template;
use crate::error::Result;
use crate::labels::Locale;
use crate::settings::{load_settings, save_settings, shellexpand_path};
use crate::xlsx::{builtin_template, TemplateContract};

pub fn run(
    data_dir: Option<String>,
    templates_dir: Option<String>,
    locale: Option<Locale>,
    force: bool,
) -> Result<()> {
    let mut settings = load_settings();
    if let Some(dir) = data_dir {
        let resolved = PathBuf::from(shellexpand_path(&dir));
        // A new data dir without an explicit templates dir keeps templates beside it.
        if templates_dir.is_none() {
            settings.templates_dir = resolved.join("templates").to_string_lossy().to_string();
        }
        settings.data_dir = resolved.to_string_lossy().to_string();
    }
    if let Some(dir) = templates_dir {
        settings.templates_dir = shellexpand_path(&dir);
    }
    if let Some(locale) = locale {
        settings.locale = locale;
    }

    std::fs::create_dir_all(settings.data_path())?;
    std::fs::create_dir_all(settings.output_dir())?;
    save_settings(&settings)?;

    let xlsx = builtin_template(&TemplateContract::default())?;
    write_template(&settings.xlsx_template(), &xlsx, force)?;
    let docx = builtin_docx_template()?;
    write_template(&settings.docx_template(), &docx, force)?;

    println!("{}", "Rimborso is ready.".green().bold());
    println!("Data dir:   {}", settings.data_path().display());
    println!("Session:    {}", settings.session_path().display());
    Ok(())
}

fn write_template(path: &Path, bytes: &[u8], force: bool) -> Result<()> {
    if path.exists() && !force {
        println!("Kept existing template {}", path.display());
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    tracing::info!(path = %path.display(), "template written");
    println!("Wrote {}", path.display());
    Ok(())
}
