//! Notebook server startup provisioner.
//!
//! Usage:
//!   GEN_CERT=1 nb-init -- jupyter lab        # self-signed TLS, then exec the server
//!   NB_UMASK=002 nb-init -o - --stderr      # print the server config
//!
//! Runs once before the notebook server starts: provisions a self-signed
//! certificate when `GEN_CERT` is set, applies `NB_UMASK`, writes the server
//! JSON config and optionally `exec`s the server command.

mod cert;
mod config;
mod env;
mod error;
mod notebook;
mod tls;
mod umask;

use std::ffi::OsString;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process;

use anyhow::Context;
use clap::Parser;
use log::info;

use crate::cert::OpensslGenerator;
use crate::config::LauncherConfig;
use crate::env::StartupEnv;
use crate::notebook::NotebookConfig;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "nb-init", about = "Notebook server startup provisioner")]
struct Cli {
    /// Path to the launcher configuration file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Where to write the server JSON config (`-` for stdout).
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Log to stderr instead of syslog (useful for debugging).
    #[arg(long)]
    stderr: bool,

    /// Server command to exec once provisioning is done.
    #[arg(last = true)]
    command: Vec<OsString>,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let cfg = match &cli.config {
        Some(path) => match config::load_config(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("nb-init: config error: {e}");
                process::exit(1);
            }
        },
        None => LauncherConfig::default(),
    };
    if let Err(e) = config::validate_config(&cfg) {
        eprintln!("nb-init: config validation: {e}");
        process::exit(1);
    }

    let use_syslog = cfg.log_syslog && !cli.stderr;
    if let Err(e) = setup_logging(use_syslog) {
        eprintln!("nb-init: logging: {e}");
        process::exit(1);
    }

    if let Err(e) = run(cli, cfg).await {
        eprintln!("nb-init: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli, cfg: LauncherConfig) -> anyhow::Result<()> {
    let env = StartupEnv::from_process();

    let mut nb = NotebookConfig::default();
    cfg.apply_overrides(&mut nb);

    let generator = OpensslGenerator::new(&cfg.openssl_bin, cfg.openssl_timeout());
    cert::provision_if_requested(&env, &generator, &mut nb)
        .await
        .context("certificate provisioning")?;

    umask::apply_from_env(&env).context("umask")?;

    let output = match cli.output.or(cfg.output) {
        Some(path) => path,
        None => env.config_dir()?.join(notebook::CONFIG_FILE_NAME),
    };
    nb.write_to(&output)
        .with_context(|| format!("writing {}", output.display()))?;

    let Some((program, args)) = cli.command.split_first() else {
        return Ok(());
    };
    info!("exec {}", program.to_string_lossy());
    // Only returns on failure.
    let err = process::Command::new(program).args(args).exec();
    Err(err).with_context(|| format!("exec {}", program.to_string_lossy()))
}

// ── Logging setup ─────────────────────────────────────────────────────────────

fn setup_logging(use_syslog: bool) -> anyhow::Result<()> {
    if use_syslog {
        let formatter = syslog::Formatter3164 {
            facility: syslog::Facility::LOG_DAEMON,
            hostname: None,
            process:  "nb-init".into(),
            pid:      process::id(),
        };
        let logger = syslog::unix(formatter)
            .map_err(|e| anyhow::anyhow!("syslog connect failed: {e}"))?;
        log::set_boxed_logger(Box::new(syslog::BasicLogger::new(logger)))
            .map(|()| log::set_max_level(log::LevelFilter::Info))
            .map_err(|e| anyhow::anyhow!("set_logger: {e}"))?;
    } else {
        // RUST_LOG still overrides the default level.
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Info)
            .parse_default_env()
            .init();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_command_is_collected() {
        let cli = Cli::try_parse_from(["nb-init", "-o", "-", "--", "jupyter", "lab", "--no-browser"])
            .unwrap();
        assert_eq!(cli.output, Some(PathBuf::from("-")));
        assert_eq!(cli.command, ["jupyter", "lab", "--no-browser"].map(OsString::from));
    }

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["nb-init"]).unwrap();
        assert!(cli.config.is_none());
        assert!(cli.output.is_none());
        assert!(!cli.stderr);
        assert!(cli.command.is_empty());
    }
}
