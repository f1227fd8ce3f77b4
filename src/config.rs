//! nb-init launcher configuration file parser.
//!
//! Flat `key = value` format, `#` starts a comment line:
//! ```text
//! openssl_bin     = /opt/conda/bin/openssl
//! openssl_timeout = 120
//! port            = 8443
//! log_syslog      = yes
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{InitError, Result};
use crate::notebook::NotebookConfig;

// Seconds allowed for `openssl req` before it is killed (0 = wait forever).
const OPENSSL_TIMEOUT: u64 = 60;

/// Launcher settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherConfig {
    /// Certificate tool, resolved through `PATH` when not absolute.
    pub openssl_bin:     PathBuf,
    pub openssl_timeout: u64,
    /// JSON config destination; `None` means `<config dir>/jupyter_server_config.json`.
    pub output:          Option<PathBuf>,
    /// Bind address override for `ServerApp.ip`.
    pub ip:              Option<String>,
    /// Port override for `NotebookApp.port`.
    pub port:            Option<u16>,
    pub log_syslog:      bool,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            openssl_bin:     PathBuf::from("openssl"),
            openssl_timeout: OPENSSL_TIMEOUT,
            output:          None,
            ip:              None,
            port:            None,
            log_syslog:      false,
        }
    }
}

impl LauncherConfig {
    pub fn openssl_timeout(&self) -> Option<Duration> {
        match self.openssl_timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Apply the bind address / port overrides to the server settings.
    pub fn apply_overrides(&self, nb: &mut NotebookConfig) {
        if let Some(ip) = &self.ip {
            nb.server_app.ip = ip.clone();
        }
        if let Some(port) = self.port {
            nb.notebook_app.port = port;
        }
    }
}

fn parse_bool(val: &str) -> bool {
    val == "true" || val == "1" || val == "yes"
}

/// Parse `content` as a launcher configuration.
pub fn parse_config(content: &str) -> Result<LauncherConfig> {
    let mut cfg = LauncherConfig::default();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.splitn(2, '=');
        let key = match parts.next() {
            Some(k) => k.trim().to_ascii_lowercase(),
            None => continue,
        };
        let val = match parts.next() {
            Some(v) => v.trim().to_string(),
            None => continue,
        };
        if val.is_empty() {
            continue;
        }

        match key.as_str() {
            "openssl_bin"     => cfg.openssl_bin     = PathBuf::from(&val),
            "openssl_timeout" => {
                cfg.openssl_timeout = val.parse().map_err(|_| {
                    InitError::Config(format!("openssl_timeout: {val:?} is not a number of seconds"))
                })?;
            }
            "output"          => cfg.output          = Some(PathBuf::from(&val)),
            "ip"              => cfg.ip              = Some(val),
            "port" => {
                cfg.port = Some(val.parse().map_err(|_| {
                    InitError::Config(format!("port: {val:?} is not a valid port"))
                })?);
            }
            "log_syslog"      => cfg.log_syslog      = parse_bool(&val),
            _ => {} // ignore unknown keys
        }
    }

    Ok(cfg)
}

/// Read and parse the launcher configuration file at `path`.
pub fn load_config(path: &Path) -> Result<LauncherConfig> {
    let content = fs::read_to_string(path)
        .map_err(|e| InitError::Config(format!("cannot read {}: {e}", path.display())))?;
    parse_config(&content)
}

/// Validate that required fields are populated.
pub fn validate_config(cfg: &LauncherConfig) -> Result<()> {
    if cfg.openssl_bin.as_os_str().is_empty() {
        return Err(InitError::Config("openssl_bin must not be empty".into()));
    }
    if cfg.ip.as_deref().is_some_and(|ip| ip.trim().is_empty()) {
        return Err(InitError::Config("ip must not be blank".into()));
    }
    if cfg.port == Some(0) {
        return Err(InitError::Config("port must be non-zero".into()));
    }
    Ok(())
}
