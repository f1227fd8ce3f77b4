//! Notebook server settings, written out in the server's JSON config layout.
//!
//! Top-level keys are configurable class names, nested keys are their traits:
//! ```json
//! { "ServerApp": { "ip": "0.0.0.0", "open_browser": false }, ... }
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::info;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{InitError, Result};

/// Python `logging.DEBUG`.
pub const LOG_LEVEL_DEBUG: u8 = 10;

pub const CONFIG_FILE_NAME: &str = "jupyter_server_config.json";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotebookConfig {
    #[serde(rename = "ServerApp")]
    pub server_app: ServerApp,
    #[serde(rename = "NotebookApp")]
    pub notebook_app: NotebookApp,
    #[serde(rename = "Application")]
    pub application: Application,
    #[serde(rename = "InlineBackend")]
    pub inline_backend: InlineBackend,
    #[serde(rename = "FileContentsManager")]
    pub file_contents_manager: FileContentsManager,
    #[serde(rename = "LabApp")]
    pub lab_app: LabApp,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerApp {
    pub ip:           String,
    pub open_browser: bool,
    /// Set only once a certificate has been provisioned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certfile:     Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotebookApp {
    pub allow_origin:        String,
    pub allow_remote_access: bool,
    pub allow_root:          bool,
    pub port:                u16,
    pub trust_xheaders:      bool,
    pub log_level:           u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Application {
    pub log_level: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlineBackend {
    /// Emit both raster and vector plot formats into notebook files.
    pub figure_formats: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileContentsManager {
    pub delete_to_trash: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabApp {
    pub show_news: bool,
}

impl Default for NotebookConfig {
    fn default() -> Self {
        Self {
            server_app: ServerApp {
                ip:           "0.0.0.0".to_string(),
                open_browser: false,
                certfile:     None,
            },
            notebook_app: NotebookApp {
                allow_origin:        "*".to_string(),
                allow_remote_access: true,
                allow_root:          true,
                port:                8888,
                trust_xheaders:      true,
                log_level:           LOG_LEVEL_DEBUG,
            },
            application: Application { log_level: LOG_LEVEL_DEBUG },
            inline_backend: InlineBackend {
                figure_formats: ["png", "jpeg", "svg", "pdf"]
                    .into_iter()
                    .map(String::from)
                    .collect(),
            },
            // Sending to trash fails on many container filesystems.
            file_contents_manager: FileContentsManager { delete_to_trash: false },
            lab_app: LabApp { show_news: false },
        }
    }
}

impl NotebookConfig {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the config as JSON to `path`, or to stdout when `path` is `-`.
    ///
    /// An existing file is merged into rather than replaced: keys we do not
    /// manage (e.g. `IdentityProvider.hashed_password`) are kept, ours win.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if path == Path::new("-") {
            let mut json = self.to_json()?;
            json.push('\n');
            std::io::stdout().write_all(json.as_bytes())?;
            return Ok(());
        }

        let mut merged = match fs::read_to_string(path) {
            Ok(existing) if existing.trim().is_empty() => Value::Object(Map::new()),
            Ok(existing) => {
                let value: Value = serde_json::from_str(&existing)?;
                if !value.is_object() {
                    return Err(InitError::Config(format!(
                        "{} does not hold a JSON object",
                        path.display()
                    )));
                }
                value
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Value::Object(Map::new()),
            Err(e) => return Err(e.into()),
        };
        merge_json(&mut merged, serde_json::to_value(self)?);

        let mut json = serde_json::to_string_pretty(&merged)?;
        json.push('\n');

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, json)?;
        info!("notebook config written to {}", path.display());
        Ok(())
    }
}

/// Deep-merge `overlay` into `base`; objects merge key by key, anything
/// else in `overlay` replaces the value in `base`.
fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_layout_matches_server_config_classes() {
        let json: serde_json::Value =
            serde_json::from_str(&NotebookConfig::default().to_json().unwrap()).unwrap();

        assert_eq!(json["ServerApp"]["ip"], "0.0.0.0");
        assert_eq!(json["ServerApp"]["open_browser"], false);
        assert!(json["ServerApp"].get("certfile").is_none());
        assert_eq!(json["NotebookApp"]["allow_origin"], "*");
        assert_eq!(json["NotebookApp"]["port"], 8888);
        assert_eq!(json["NotebookApp"]["trust_xheaders"], true);
        assert_eq!(json["NotebookApp"]["log_level"], 10);
        assert_eq!(json["Application"]["log_level"], 10);
        assert_eq!(
            json["InlineBackend"]["figure_formats"],
            serde_json::json!(["jpeg", "pdf", "png", "svg"])
        );
        assert_eq!(json["FileContentsManager"]["delete_to_trash"], false);
        assert_eq!(json["LabApp"]["show_news"], false);
    }

    #[test]
    fn certfile_serialized_once_set() {
        let mut cfg = NotebookConfig::default();
        cfg.server_app.certfile = Some(PathBuf::from("/data/notebook.pem"));
        let json: serde_json::Value = serde_json::from_str(&cfg.to_json().unwrap()).unwrap();
        assert_eq!(json["ServerApp"]["certfile"], "/data/notebook.pem");
    }

    #[test]
    fn write_to_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);
        NotebookConfig::default().write_to(&path).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.ends_with('\n'));
        let json: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(json["LabApp"]["show_news"], false);
    }

    #[test]
    fn write_to_keeps_unmanaged_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(
            &path,
            r#"{"IdentityProvider":{"hashed_password":"argon2:xyz"},
                "ServerApp":{"ip":"127.0.0.1","root_dir":"/srv/notebooks"},
                "LabApp":{"show_news":true}}"#,
        )
        .unwrap();

        NotebookConfig::default().write_to(&path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["IdentityProvider"]["hashed_password"], "argon2:xyz");
        assert_eq!(json["ServerApp"]["root_dir"], "/srv/notebooks");
        assert_eq!(json["ServerApp"]["ip"], "0.0.0.0");
        assert_eq!(json["LabApp"]["show_news"], false);
        assert_eq!(json["NotebookApp"]["port"], 8888);
    }

    #[test]
    fn write_to_refuses_to_clobber_non_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(
            NotebookConfig::default().write_to(&path),
            Err(InitError::Config(_))
        ));
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            NotebookConfig::default().write_to(&path),
            Err(InitError::Json(_))
        ));
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
    }
}
