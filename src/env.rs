//! Snapshot of the environment variables nb-init reacts to.
//!
//! Built from an arbitrary `(key, value)` iterator so callers can hand in
//! `std::env::vars_os()` or a fixed list.

use std::ffi::OsString;
use std::path::PathBuf;

use nix::unistd::{Uid, User};

use crate::error::{InitError, Result};

const DEFAULT_SSL_BASE: &str = "/usr/lib";

/// Environment variables consumed at startup.
#[derive(Debug, Clone, Default)]
pub struct StartupEnv {
    /// `GEN_CERT` is present (its value is ignored).
    pub gen_cert: bool,
    /// `CONDA_DIR` — base of the `ssl/openssl.cnf` lookup.
    pub ssl_base_dir: Option<PathBuf>,
    /// `NB_UMASK` — raw octal string.
    pub umask: Option<String>,
    pub jupyter_data_dir:   Option<PathBuf>,
    pub jupyter_config_dir: Option<PathBuf>,
    pub xdg_data_home:      Option<PathBuf>,
    pub home:               Option<PathBuf>,
}

impl StartupEnv {
    /// Capture the current process environment.
    pub fn from_process() -> Self {
        Self::from_vars(std::env::vars_os())
    }

    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        let mut env = Self::default();
        for (key, val) in vars {
            let key: OsString = key.into();
            let val: OsString = val.into();
            let Some(key) = key.to_str() else { continue };

            match key {
                "GEN_CERT" => env.gen_cert = true,
                "CONDA_DIR" => env.ssl_base_dir = non_empty_path(val),
                "NB_UMASK" => env.umask = Some(val.to_string_lossy().into_owned()),
                "JUPYTER_DATA_DIR" => env.jupyter_data_dir = non_empty_path(val),
                "JUPYTER_CONFIG_DIR" => env.jupyter_config_dir = non_empty_path(val),
                "XDG_DATA_HOME" => env.xdg_data_home = non_empty_path(val),
                "HOME" => env.home = non_empty_path(val),
                _ => {}
            }
        }
        env
    }

    /// `<CONDA_DIR or /usr/lib>/ssl/openssl.cnf`
    pub fn openssl_cnf_path(&self) -> PathBuf {
        self.ssl_base_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SSL_BASE))
            .join("ssl")
            .join("openssl.cnf")
    }

    /// Resolve the notebook data directory.
    ///
    /// Precedence: `JUPYTER_DATA_DIR`, `$XDG_DATA_HOME/jupyter`,
    /// `~/.local/share/jupyter`.
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.jupyter_data_dir {
            return Ok(dir.clone());
        }
        if let Some(xdg) = &self.xdg_data_home {
            return Ok(xdg.join("jupyter"));
        }
        if let Some(home) = self.home_dir() {
            return Ok(home.join(".local").join("share").join("jupyter"));
        }
        Err(InitError::Config(
            "cannot resolve data directory: JUPYTER_DATA_DIR, XDG_DATA_HOME and HOME are unset \
             and the current user has no home directory"
                .into(),
        ))
    }

    /// Resolve the notebook config directory (`JUPYTER_CONFIG_DIR`, else `~/.jupyter`).
    pub fn config_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.jupyter_config_dir {
            return Ok(dir.clone());
        }
        if let Some(home) = self.home_dir() {
            return Ok(home.join(".jupyter"));
        }
        Err(InitError::Config(
            "cannot resolve config directory: JUPYTER_CONFIG_DIR and HOME are unset \
             and the current user has no home directory"
                .into(),
        ))
    }

    /// `$HOME`, else the current user's home from the password database.
    pub fn home_dir(&self) -> Option<PathBuf> {
        self.home.clone().or_else(passwd_home)
    }
}

fn passwd_home() -> Option<PathBuf> {
    User::from_uid(Uid::current())
        .ok()
        .flatten()
        .map(|user| user.dir)
        .filter(|dir| !dir.as_os_str().is_empty())
}

fn non_empty_path(val: OsString) -> Option<PathBuf> {
    if val.is_empty() { None } else { Some(PathBuf::from(val)) }
}
