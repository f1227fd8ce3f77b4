//! Verification of the generated key + certificate bundle.
//!
//! The notebook server reads `certfile` as a single PEM file holding the
//! private key and the certificate chain.  Before handing the path over we
//! check that:
//!   - the file parses as PEM and holds at least one X.509 certificate
//!   - it holds exactly one private key (PKCS#1, PKCS#8 or SEC1)
//!   - the pair loads into a TLS server configuration

use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use rustls_pemfile::{read_all, Item};

use crate::error::{InitError, Result};

/// A parsed PEM bundle.
#[derive(Debug)]
pub struct PemBundle {
    pub certs: Vec<CertificateDer<'static>>,
    pub key:   PrivateKeyDer<'static>,
}

/// Parse a combined key + certificate PEM file.
pub fn read_pem_bundle(path: &Path) -> Result<PemBundle> {
    let pem = fs::read(path)?;
    if pem.is_empty() {
        return Err(InitError::CertificateGeneration(format!(
            "{} is empty",
            path.display()
        )));
    }

    let mut certs = Vec::new();
    let mut keys = Vec::new();
    for item in read_all(&mut Cursor::new(pem)) {
        let item = item.map_err(|e| {
            InitError::CertificateGeneration(format!("bad PEM in {}: {e}", path.display()))
        })?;
        match item {
            Item::X509Certificate(cert) => certs.push(cert),
            Item::Pkcs1Key(key) => keys.push(PrivateKeyDer::Pkcs1(key)),
            Item::Pkcs8Key(key) => keys.push(PrivateKeyDer::Pkcs8(key)),
            Item::Sec1Key(key)  => keys.push(PrivateKeyDer::Sec1(key)),
            _ => {}
        }
    }

    if certs.is_empty() {
        return Err(InitError::CertificateGeneration(format!(
            "no certificate found in {}",
            path.display()
        )));
    }
    let key = match keys.len() {
        1 => keys.remove(0),
        0 => {
            return Err(InitError::CertificateGeneration(format!(
                "no private key found in {}",
                path.display()
            )))
        }
        n => {
            return Err(InitError::CertificateGeneration(format!(
                "{n} private keys found in {}, expected one",
                path.display()
            )))
        }
    };

    Ok(PemBundle { certs, key })
}

/// Build a TLS server config from a bundle, proving key and chain match.
pub fn build_server_config(bundle: PemBundle) -> Result<Arc<ServerConfig>> {
    let provider = Arc::new(rustls_post_quantum::provider());

    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(bundle.certs, bundle.key)?;

    Ok(Arc::new(config))
}

/// Check that the PEM file at `path` is usable as a server `certfile`.
pub fn verify_certfile(path: &Path) -> Result<()> {
    let bundle = read_pem_bundle(path)?;
    build_server_config(bundle)?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A self-signed key + certificate, concatenated as the tool writes them.
    pub(crate) fn self_signed_bundle() -> String {
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec!["generated".into()]).unwrap();
        format!("{}{}", key_pair.serialize_pem(), cert.pem())
    }

    #[test]
    fn accepts_key_and_certificate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notebook.pem");
        fs::write(&path, self_signed_bundle()).unwrap();

        let bundle = read_pem_bundle(&path).unwrap();
        assert_eq!(bundle.certs.len(), 1);
        verify_certfile(&path).unwrap();
    }

    #[test]
    fn rejects_incomplete_bundles() {
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec!["generated".into()]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notebook.pem");

        for contents in [
            String::new(),
            cert.pem(),
            key_pair.serialize_pem(),
            format!("{0}{0}{1}", key_pair.serialize_pem(), cert.pem()),
            "not a pem file\n".to_string(),
        ] {
            fs::write(&path, &contents).unwrap();
            assert!(
                matches!(verify_certfile(&path), Err(InitError::CertificateGeneration(_))),
                "accepted {contents:?}"
            );
        }
    }
}
