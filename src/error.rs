use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RimborsoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Workbook error: {0}")]
    Xlsx(#[from] calamine::XlsxError),

    #[error("Workbook writer error: {0}")]
    XlsxWrite(#[from] rust_xlsxwriter::XlsxError),

    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("Template not found: {0}")]
    TemplateNotFound(PathBuf),

    #[error("Unexpected template shape: {0}")]
    TemplateShape(String),

    #[error("{0}")]
    Routing(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No {kind} at index {index} (list has {len} entries)")]
    IndexOutOfRange {
        kind: &'static str,
        index: usize,
        len: usize,
    },

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, RimborsoError>;
