//! Self-signed certificate provisioning for the notebook server.
//!
//! When `GEN_CERT` is present in the environment:
//!   1. the data directory is created (with parents)
//!   2. a minimal `openssl.cnf` is written under the SSL base dir, unless a
//!      file already exists there
//!   3. `openssl req` writes a fresh RSA key and self-signed certificate
//!      into `<data dir>/notebook.pem`
//!   4. the file is restricted to `0600` (even if generation failed part
//!      way), checked, and registered as `ServerApp.certfile`
//!
//! Step 3 runs on every start with the flag set, replacing any previous
//! certificate.

use std::ffi::OsString;
use std::fs::{self, OpenOptions, Permissions};
use std::io::{ErrorKind, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::process::Command;

use crate::env::StartupEnv;
use crate::error::{InitError, Result};
use crate::notebook::NotebookConfig;
use crate::tls;

pub const CERT_FILE_NAME: &str = "notebook.pem";
pub const SUBJECT:        &str = "/C=XX/ST=XX/L=XX/O=generated/CN=generated";
pub const VALIDITY_DAYS:  u32  = 365;
pub const KEY_BITS:       u32  = 2048;

const CERT_MODE: u32 = 0o600;

/// Distinguished-name template so `openssl req` does not prompt.
pub const OPENSSL_CONFIG: &str = "\
[req]
distinguished_name = req_distinguished_name
[req_distinguished_name]
";

// ── Generator seam ────────────────────────────────────────────────────────────

/// Parameters for one self-signed key + certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertRequest {
    pub subject:       String,
    pub validity_days: u32,
    pub key_bits:      u32,
    /// Key and certificate are both written here.
    pub out_path:      PathBuf,
}

impl CertRequest {
    pub fn self_signed(out_path: PathBuf) -> Self {
        Self {
            subject: SUBJECT.to_string(),
            validity_days: VALIDITY_DAYS,
            key_bits: KEY_BITS,
            out_path,
        }
    }
}

/// Something that can materialize a key + self-signed certificate on disk.
pub(crate) trait CertificateGenerator {
    async fn generate(&self, request: &CertRequest) -> Result<()>;
}

/// Runs the `openssl` command-line tool.
#[derive(Debug, Clone)]
pub struct OpensslGenerator {
    program: PathBuf,
    /// `None` waits for the tool indefinitely.
    timeout: Option<Duration>,
}

impl OpensslGenerator {
    pub fn new(program: impl Into<PathBuf>, timeout: Option<Duration>) -> Self {
        Self { program: program.into(), timeout }
    }
}

/// `openssl req` arguments for `request`.
pub fn openssl_args(request: &CertRequest) -> Vec<OsString> {
    let out = request.out_path.as_os_str();
    vec![
        "req".into(),
        "-new".into(),
        "-newkey".into(),
        format!("rsa:{}", request.key_bits).into(),
        "-days".into(),
        request.validity_days.to_string().into(),
        "-nodes".into(),
        "-x509".into(),
        "-subj".into(),
        request.subject.clone().into(),
        "-keyout".into(),
        out.to_os_string(),
        "-out".into(),
        out.to_os_string(),
    ]
}

impl CertificateGenerator for OpensslGenerator {
    async fn generate(&self, request: &CertRequest) -> Result<()> {
        let args = openssl_args(request);
        debug!("running {} {:?}", self.program.display(), args);
        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        run_tool(cmd, &self.program, self.timeout).await
    }
}

/// Run `cmd` to completion, mapping every failure to `CertificateGeneration`.
async fn run_tool(mut cmd: Command, program: &Path, timeout: Option<Duration>) -> Result<()> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, cmd.output())
            .await
            .map_err(|_| {
                InitError::CertificateGeneration(format!(
                    "{} timed out after {}s",
                    program.display(),
                    limit.as_secs_f64()
                ))
            })?,
        None => cmd.output().await,
    }
    .map_err(|e| InitError::CertificateGeneration(format!("cannot run {}: {e}", program.display())))?;

    if !output.status.success() {
        return Err(InitError::CertificateGeneration(format!(
            "{} failed with {}: {}",
            program.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

// ── Provisioning ──────────────────────────────────────────────────────────────

/// Write the distinguished-name template to `path` unless something is
/// already there.  Returns `true` if the file was created.
pub fn ensure_openssl_cnf(path: &Path) -> Result<bool> {
    if path.is_file() {
        return Ok(false);
    }
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    file.write_all(OPENSSL_CONFIG.as_bytes())?;
    info!("wrote OpenSSL config template to {}", path.display());
    Ok(true)
}

/// Provision `<data dir>/notebook.pem` if `GEN_CERT` is set and register it
/// in `config`.  Returns the certificate path when one was provisioned.
pub(crate) async fn provision_if_requested<G: CertificateGenerator>(
    env: &StartupEnv,
    generator: &G,
    config: &mut NotebookConfig,
) -> Result<Option<PathBuf>> {
    if !env.gen_cert {
        return Ok(None);
    }

    let data_dir = env.data_dir()?;
    let pem_file = data_dir.join(CERT_FILE_NAME);
    fs::create_dir_all(&data_dir)?;

    ensure_openssl_cnf(&env.openssl_cnf_path())?;

    // TODO: skip regeneration when a valid certificate is already present,
    // once it is confirmed nothing depends on a fresh key per start.
    if pem_file.exists() {
        warn!("replacing existing certificate {}", pem_file.display());
    }

    let request = CertRequest::self_signed(pem_file.clone());
    let generated = generator.generate(&request).await;
    // The file may hold a private key whatever the outcome.
    if pem_file.exists() {
        fs::set_permissions(&pem_file, Permissions::from_mode(CERT_MODE))?;
    }
    generated?;
    tls::verify_certfile(&pem_file)?;

    let expires = chrono::Utc::now() + chrono::Duration::days(i64::from(request.validity_days));
    info!(
        "self-signed certificate written to {} (expires {})",
        pem_file.display(),
        expires.format("%Y-%m-%d")
    );

    config.server_app.certfile = Some(pem_file.clone());
    Ok(Some(pem_file))
}
