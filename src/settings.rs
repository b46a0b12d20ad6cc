use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RimborsoError};
use crate::labels::Locale;
use crate::reports::KmRates;

pub const CONFIG_DIR_ENV: &str = "RIMBORSO_CONFIG_DIR";
pub const XLSX_TEMPLATE: &str = "Rimborso_Spese.xlsx";
pub const DOCX_TEMPLATE: &str = "Rimborso_Spese.docx";
const SESSION_FILE: &str = "session.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data_dir: String,
    pub templates_dir: String,
    pub routing_endpoint: String,
    pub routing_timeout_secs: u64,
    pub locale: Locale,
    pub rates: KmRates,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            templates_dir: data_dir.join("templates").to_string_lossy().to_string(),
            data_dir: data_dir.to_string_lossy().to_string(),
            routing_endpoint: "http://localhost:5000/api/route".to_string(),
            routing_timeout_secs: 30,
            locale: Locale::default(),
            rates: KmRates::default(),
        }
    }
}

impl Settings {
    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(shellexpand_path(&self.data_dir))
    }

    pub fn session_path(&self) -> PathBuf {
        self.data_path().join(SESSION_FILE)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.data_path().join("exports")
    }

    pub fn xlsx_template(&self) -> PathBuf {
        PathBuf::from(shellexpand_path(&self.templates_dir)).join(XLSX_TEMPLATE)
    }

    pub fn docx_template(&self) -> PathBuf {
        PathBuf::from(shellexpand_path(&self.templates_dir)).join(DOCX_TEMPLATE)
    }
}

fn config_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("rimborso")
}

fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

fn default_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
        return PathBuf::from(dir).join("data");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Documents")
        .join("rimborso")
}

pub fn load_settings() -> Settings {
    let path = settings_path();
    if !path.exists() {
        return Settings::default();
    }
    let content = std::fs::read_to_string(&path).unwrap_or_default();
    serde_json::from_str(&content).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "unreadable settings, using defaults");
        Settings::default()
    })
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir)?;
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| RimborsoError::Settings(e.to_string()))?;
    std::fs::write(settings_path(), format!("{json}\n"))?;
    Ok(())
}

pub fn settings_file_exists() -> bool {
    settings_path().exists()
}

pub fn shellexpand_path(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let settings = Settings {
            data_dir: "/tmp/test".to_string(),
            templates_dir: "/tmp/test/tpl".to_string(),
            locale: Locale::En,
            ..Settings::default()
        };
        let json = serde_json::to_string_pretty(&settings).unwrap();
        std::fs::write(&path, &json).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let loaded: Settings = serde_json::from_str(&content).unwrap();
        assert_eq!(loaded, settings);
        assert_eq!(loaded.xlsx_template(), PathBuf::from("/tmp/test/tpl/Rimborso_Spese.xlsx"));
        assert_eq!(loaded.session_path(), PathBuf::from("/tmp/test/session.json"));
    }

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.locale, Locale::It);
        assert_eq!(s.rates.personal, dec!(0.40));
        assert_eq!(s.rates.company, dec!(0.20));
        assert_eq!(s.routing_timeout_secs, 30);
        assert!(!s.data_dir.is_empty());
    }

    #[test]
    fn test_load_merges_with_defaults() {
        let json = r#"{"data_dir": "/tmp/test", "rates": {"personal": "0.5"}}"#;
        let s: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(s.data_dir, "/tmp/test");
        assert_eq!(s.rates.personal, dec!(0.5));
        assert_eq!(s.rates.company, dec!(0.20));
        assert_eq!(s.locale, Locale::It);
    }

    #[test]
    fn test_tilde_expansion() {
        let expanded = shellexpand_path("~/rimborso");
        assert!(!expanded.starts_with('~'));
        assert_eq!(shellexpand_path("/abs/path"), "/abs/path");
    }
}
