//! Process umask override (`NB_UMASK`).
//!
//! The mask is inherited by every child the notebook server spawns, so it
//! is applied once at startup and never restored.

use log::info;
use nix::sys::stat::{umask, Mode};

use crate::env::StartupEnv;
use crate::error::{InitError, Result};

const MAX_UMASK: libc::mode_t = 0o777;

/// Parse an octal umask string such as `"022"` or `"0o027"`.
pub fn parse_umask(raw: &str) -> Result<Mode> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0o")
        .or_else(|| trimmed.strip_prefix("0O"))
        .unwrap_or(trimmed);

    let bits = libc::mode_t::from_str_radix(digits, 8)
        .map_err(|e| InitError::Parse(format!("NB_UMASK {raw:?} is not an octal number: {e}")))?;
    if bits > MAX_UMASK {
        return Err(InitError::Parse(format!("NB_UMASK {raw:?} exceeds 0o777")));
    }
    Mode::from_bits(bits)
        .ok_or_else(|| InitError::Parse(format!("NB_UMASK {raw:?} has invalid mode bits")))
}

/// Apply `NB_UMASK` if present. Returns the mask that was replaced.
pub fn apply_from_env(env: &StartupEnv) -> Result<Option<Mode>> {
    let Some(raw) = &env.umask else {
        return Ok(None);
    };
    let mask = parse_umask(raw)?;
    let previous = umask(mask);
    info!("umask set to {:03o} (was {:03o})", mask.bits(), previous.bits());
    Ok(Some(previous))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_octal_strings() {
        assert_eq!(parse_umask("022").unwrap().bits(), 18);
        assert_eq!(parse_umask(" 0o027\n").unwrap().bits(), 0o027);
        assert_eq!(parse_umask("0").unwrap().bits(), 0);
        assert_eq!(parse_umask("777").unwrap().bits(), 0o777);
    }

    #[test]
    fn rejects_non_octal() {
        for bad in ["abc", "", "8", "0x22", "-22", "1000"] {
            assert!(
                matches!(parse_umask(bad), Err(InitError::Parse(_))),
                "accepted {bad:?}"
            );
        }
    }

    // Single test so the process-wide mask is never touched concurrently.
    #[test]
    fn applies_only_when_set() {
        let original = umask(Mode::from_bits_truncate(0o022));
        umask(original);

        let untouched = apply_from_env(&StartupEnv::default()).unwrap();
        assert!(untouched.is_none());
        let current = umask(original);
        assert_eq!(current, original);

        let env = StartupEnv::from_vars([("NB_UMASK", "027")]);
        let previous = apply_from_env(&env).unwrap();
        assert_eq!(previous, Some(original));
        let current = umask(original);
        assert_eq!(current.bits(), 0o027);

        let env = StartupEnv::from_vars([("NB_UMASK", "abc")]);
        assert!(matches!(apply_from_env(&env), Err(InitError::Parse(_))));
        let current = umask(original);
        assert_eq!(current, original);
    }
}
