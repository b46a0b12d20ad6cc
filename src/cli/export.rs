use std::path::{Path, PathBuf};

use colored::Colorize;

use crate::cli::load_session;
use crate::docx::render_docx;
use crate::error::{Result, RimborsoError};
use crate::settings::{load_settings, shellexpand_path, Settings};
use crate::snapshot::{self, ReportSnapshot};
use crate::xlsx::{render_xlsx, TemplateContract};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Xlsx,
    Docx,
    #[cfg(feature = "pdf")]
    Pdf,
}

impl Format {
    const ALL: &'static [Format] = &[
        Format::Xlsx,
        Format::Docx,
        #[cfg(feature = "pdf")]
        Format::Pdf,
    ];

    fn extension(self) -> &'static str {
        match self {
            Format::Xlsx => "xlsx",
            Format::Docx => "docx",
            #[cfg(feature = "pdf")]
            Format::Pdf => "pdf",
        }
    }
}

fn current_snapshot(settings: &Settings) -> Result<ReportSnapshot> {
    let session = load_session(settings)?;
    let today = chrono::Local::now().date_naive();
    Ok(snapshot::build(&session, &settings.rates, settings.locale, today))
}

fn read_template(path: &Path) -> Result<Vec<u8>> {
    if !path.exists() {
        return Err(RimborsoError::TemplateNotFound(path.to_path_buf()));
    }
    Ok(std::fs::read(path)?)
}

fn render(format: Format, snap: &ReportSnapshot, settings: &Settings) -> Result<Vec<u8>> {
    match format {
        Format::Xlsx => {
            let template = read_template(&settings.xlsx_template())?;
            render_xlsx(snap, &template, &TemplateContract::default())
        }
        Format::Docx => {
            let template = read_template(&settings.docx_template())?;
            render_docx(snap, &template)
        }
        #[cfg(feature = "pdf")]
        Format::Pdf => crate::pdf::render_pdf(snap),
    }
}

/// Write through a sibling temp file so a failed write never leaves a
/// truncated document at `path`.
fn write_atomic(bytes: &[u8], path: &Path) -> Result<String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{name}.tmp"));
    let written = std::fs::write(&tmp, bytes).and_then(|_| std::fs::rename(&tmp, path));
    if let Err(e) = written {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    let shown = format!("{}", path.display());
    tracing::info!(path = %shown, bytes = bytes.len(), "report written");
    println!("Wrote {shown}");
    Ok(shown)
}

fn output_path(output: Option<String>, dir: &Path, snap: &ReportSnapshot, format: Format) -> PathBuf {
    match output {
        Some(path) => PathBuf::from(shellexpand_path(&path)),
        None => dir.join(format!("{}.{}", snap.filename, format.extension())),
    }
}

pub fn one(format: Format, output: Option<String>) -> Result<String> {
    let settings = load_settings();
    let snap = current_snapshot(&settings)?;
    let bytes = render(format, &snap, &settings)?;
    let path = output_path(output, &settings.output_dir(), &snap, format);
    write_atomic(&bytes, &path)
}

/// Every format from one snapshot. A failing format is reported and the
/// others still get written.
pub fn all(output_dir: Option<String>) -> Result<Vec<String>> {
    let settings = load_settings();
    let snap = current_snapshot(&settings)?;
    let dir = match output_dir {
        Some(d) => PathBuf::from(shellexpand_path(&d)),
        None => settings.output_dir(),
    };

    let mut written = Vec::new();
    let mut failed = Vec::new();
    for &format in Format::ALL {
        let result = render(format, &snap, &settings)
            .and_then(|bytes| write_atomic(&bytes, &output_path(None, &dir, &snap, format)));
        match result {
            Ok(path) => written.push(path),
            Err(e) => {
                tracing::warn!(format = format.extension(), error = %e, "export failed");
                eprintln!("{} {}: {e}", "Failed".red().bold(), format.extension());
                failed.push(format.extension());
            }
        }
    }

    if failed.is_empty() {
        Ok(written)
    } else {
        Err(RimborsoError::Other(format!(
            "{} of {} exports failed ({})",
            failed.len(),
            Format::ALL.len(),
            failed.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_atomic_replaces_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("report.pdf");
        write_atomic(b"first", &path).unwrap();
        write_atomic(b"second", &path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_missing_template_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_template(&dir.path().join("missing.xlsx")).unwrap_err();
        assert!(matches!(err, RimborsoError::TemplateNotFound(_)));
    }
}
