// src/config.rs
//
// Runtime settings. Loaded from an optional `sei_scrape.toml` and overridden
// by environment variables; the organization and unit codes are mandatory.
// Credentials are never stored here — they come from SEI_USER / SEI_PASS at
// login time.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://www.sei.mg.gov.br";
pub const DEFAULT_LOGIN_PATH: &str =
    "/sip/login.php?sigla_orgao_sistema=GOVMG&sigla_sistema=SEI&infra_url=L3NlaS8=";
pub const DEFAULT_CONFIG_FILE: &str = "sei_scrape.toml";

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Settings {
    /// Organization code sent with the login form and the portal cookie.
    pub org: String,
    /// Unit that must be active after login.
    pub unit: String,
    pub base_url: String,
    pub login_path: String,
    pub data_dir: PathBuf,
    /// Dump every fetched page under `<data_dir>/debug/`.
    pub save_debug_html: bool,
    pub debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            org: s!(),
            unit: s!(),
            base_url: s!(DEFAULT_BASE_URL),
            login_path: s!(DEFAULT_LOGIN_PATH),
            data_dir: PathBuf::from("data"),
            save_debug_html: false,
            debug: false,
        }
    }
}

impl Settings {
    /// Load from `path` (skipped when missing), apply environment overrides,
    /// then validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let mut settings = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            toml::from_str(&contents)
                .map_err(|e| Error::Config(format!("invalid config at {}: {e}", path.display())))?
        } else {
            Settings::default()
        };

        settings.apply_env();
        settings.validate()?;
        Ok(settings)
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("SEI_ORGAO") {
            self.org = v;
        }
        if let Ok(v) = std::env::var("SEI_UNIDADE") {
            self.unit = v;
        }
        if let Ok(v) = std::env::var("SEI_BASE_URL") {
            self.base_url = v;
        }
        if let Ok(v) = std::env::var("SEI_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(b) = std::env::var("SEI_SAVE_DEBUG_HTML").ok().as_deref().and_then(parse_bool) {
            self.save_debug_html = b;
        }
        if let Some(b) = std::env::var("SEI_DEBUG").ok().as_deref().and_then(parse_bool) {
            self.debug = b;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.org.trim().is_empty() {
            return Err(Error::Config(s!(
                "organization code missing: set SEI_ORGAO (e.g. SEI_ORGAO=28) or `org` in the config file"
            )));
        }
        if self.unit.trim().is_empty() {
            return Err(Error::Config(s!(
                "unit missing: set SEI_UNIDADE (e.g. SEI_UNIDADE=SEPLAG/AUTOMATIZAMG) or `unit` in the config file"
            )));
        }
        Ok(())
    }

    pub fn login_url(&self) -> String {
        format!("{}{}", self.base_url, self.login_path)
    }

    /// Default location of the JSON history file.
    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join("process_history.json")
    }

    /// Default directory for dumped tree frames.
    pub fn frames_dir(&self) -> PathBuf {
        self.data_dir.join("iframes")
    }

    pub fn debug_dir(&self) -> PathBuf {
        self.data_dir.join("debug")
    }
}

/// Accepts the usual yes/no spellings, including the Portuguese ones the
/// portal's operators tend to use.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "sim" => Some(true),
        "0" | "false" | "f" | "no" | "n" | "nao" | "não" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_spellings() {
        assert_eq!(parse_bool("Sim"), Some(true));
        assert_eq!(parse_bool("não"), Some(false));
        assert_eq!(parse_bool("talvez"), None);
    }

    #[test]
    fn missing_org_is_a_config_error() {
        let settings = Settings { unit: s!("U"), ..Default::default() };
        assert!(matches!(settings.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn login_url_joins_base_and_path() {
        let settings = Settings {
            org: s!("28"),
            unit: s!("U"),
            base_url: s!("https://sei.example"),
            login_path: s!("/sip/login.php"),
            ..Default::default()
        };
        assert_eq!(settings.login_url(), "https://sei.example/sip/login.php");
    }
}
