//! TLS acceptor construction for https servers.
//!
//! Certificates and keys are PEM files. A single file may carry both the
//! chain and the private key. An `ENCRYPTED PRIVATE KEY` block (PKCS#8,
//! PBES2) is decrypted with `keyfile_password`; the password is ignored for
//! plain keys.

use super::types::ListenerError;
use crate::config::SslConfig;
use pkcs8::der::Document;
use pkcs8::EncryptedPrivateKeyInfo;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;

const ENCRYPTED_KEY_LABEL: &str = "ENCRYPTED PRIVATE KEY";

fn read_pem(path: &str) -> Result<String, ListenerError> {
    std::fs::read_to_string(path)
        .map_err(|e| ListenerError::Tls(format!("Failed to open '{path}': {e}")))
}

fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>, ListenerError> {
    let pem = read_pem(path)?;
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut pem.as_bytes())
        .collect::<Result<_, _>>()
        .map_err(|e| ListenerError::Tls(format!("Failed to parse certificates in '{path}': {e}")))?;

    if certs.is_empty() {
        return Err(ListenerError::Tls(format!(
            "No certificates found in '{path}'"
        )));
    }
    Ok(certs)
}

/// First `-----BEGIN <label>-----` ... `-----END <label>-----` block of `text`
fn pem_block<'a>(text: &'a str, label: &str) -> Option<&'a str> {
    let begin = format!("-----BEGIN {label}-----");
    let end = format!("-----END {label}-----");
    let start = text.find(&begin)?;
    let stop = start + text[start..].find(&end)? + end.len();
    Some(&text[start..stop])
}

fn decrypt_private_key(block: &str, password: &str) -> pkcs8::Result<PrivateKeyDer<'static>> {
    let (_, document) = Document::from_pem(block)?;
    let info = EncryptedPrivateKeyInfo::try_from(document.as_bytes())?;
    let decrypted = info.decrypt(password)?;
    Ok(PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
        decrypted.as_bytes().to_vec(),
    )))
}

fn load_private_key(
    path: &str,
    password: Option<&str>,
) -> Result<PrivateKeyDer<'static>, ListenerError> {
    let pem = read_pem(path)?;

    if let Some(block) = pem_block(&pem, ENCRYPTED_KEY_LABEL) {
        let password = password.ok_or_else(|| {
            ListenerError::Tls(format!(
                "Private key in '{path}' is encrypted but no keyfile_password is set"
            ))
        })?;
        return decrypt_private_key(block, password).map_err(|e| {
            ListenerError::Tls(format!("Failed to decrypt private key in '{path}': {e}"))
        });
    }

    rustls_pemfile::private_key(&mut pem.as_bytes())
        .map_err(|e| ListenerError::Tls(format!("Failed to parse private key in '{path}': {e}")))?
        .ok_or_else(|| ListenerError::Tls(format!("No private key found in '{path}'")))
}

/// Build a TLS acceptor from the server's SSL section.
///
/// The chain comes from `certfile` (or `keyfile` when only that is set) and
/// the key from `keyfile` (or `certfile`). With `ca_certs`, client
/// certificates are verified when presented; anonymous clients are still
/// accepted.
pub fn create_tls_acceptor(ssl: &SslConfig) -> Result<TlsAcceptor, ListenerError> {
    let cert_path = ssl
        .certfile
        .as_deref()
        .or(ssl.keyfile.as_deref())
        .ok_or_else(|| ListenerError::Tls("No certificate file configured".to_string()))?;
    let key_path = ssl.keyfile.as_deref().unwrap_or(cert_path);

    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path, ssl.keyfile_password.as_deref())?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ServerConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| ListenerError::Tls(e.to_string()))?;

    let builder = match &ssl.ca_certs {
        Some(ca_path) => {
            let mut roots = RootCertStore::empty();
            for cert in load_certs(ca_path)? {
                roots
                    .add(cert)
                    .map_err(|e| ListenerError::Tls(format!("Invalid CA certificate in '{ca_path}': {e}")))?;
            }
            let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider)
                .allow_unauthenticated()
                .build()
                .map_err(|e| ListenerError::Tls(e.to_string()))?;
            builder.with_client_cert_verifier(verifier)
        }
        None => builder.with_no_client_auth(),
    };

    let config = builder
        .with_single_cert(certs, key)
        .map_err(|e| ListenerError::Tls(format!("Failed to build TLS configuration: {e}")))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkcs8::pkcs5::pbes2;
    use pkcs8::{LineEnding, PrivateKeyInfo};
    use rcgen::{CertificateParams, KeyPair};
    use std::path::Path;

    fn ssl(certfile: Option<&str>, keyfile: Option<&str>) -> SslConfig {
        SslConfig {
            certfile: certfile.map(str::to_string),
            keyfile: keyfile.map(str::to_string),
            ..Default::default()
        }
    }

    fn acceptor_error(ssl: &SslConfig) -> ListenerError {
        match create_tls_acceptor(ssl) {
            Ok(_) => panic!("expected a TLS configuration error"),
            Err(e) => e,
        }
    }

    /// Self-signed `localhost` certificate with its key pair
    fn self_signed() -> (String, KeyPair) {
        let key = KeyPair::generate().unwrap();
        let cert = CertificateParams::new(vec!["localhost".to_string()])
            .unwrap()
            .self_signed(&key)
            .unwrap();
        (cert.pem(), key)
    }

    fn encrypted_key_pem(key: &KeyPair, password: &str) -> String {
        let der = key.serialize_der();
        let info = PrivateKeyInfo::try_from(der.as_slice()).unwrap();
        let params = pbes2::Parameters::pbkdf2_sha256_aes256cbc(2048, b"cap-salt", &[7u8; 16]).unwrap();
        let document = info.encrypt_with_params(params, password).unwrap();
        let pem = document.to_pem(ENCRYPTED_KEY_LABEL, LineEnding::LF).unwrap();
        pem.as_str().to_owned()
    }

    fn write(dir: &Path, name: &str, contents: &str) -> String {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path.display().to_string()
    }

    #[test]
    fn test_plain_key_ignores_password() {
        let dir = tempfile::tempdir().unwrap();
        let (cert, key) = self_signed();
        let config = SslConfig {
            keyfile_password: Some("unused".to_string()),
            ..ssl(
                Some(&write(dir.path(), "cert.pem", &cert)),
                Some(&write(dir.path(), "key.pem", &key.serialize_pem())),
            )
        };
        assert!(create_tls_acceptor(&config).is_ok());
    }

    #[test]
    fn test_encrypted_key_with_password() {
        let dir = tempfile::tempdir().unwrap();
        let (cert, key) = self_signed();
        let config = SslConfig {
            keyfile_password: Some("secret".to_string()),
            ..ssl(
                Some(&write(dir.path(), "cert.pem", &cert)),
                Some(&write(dir.path(), "key.pem", &encrypted_key_pem(&key, "secret"))),
            )
        };
        assert!(create_tls_acceptor(&config).is_ok());
    }

    #[test]
    fn test_encrypted_key_in_combined_file() {
        let dir = tempfile::tempdir().unwrap();
        let (cert, key) = self_signed();
        let combined = format!("{cert}{}", encrypted_key_pem(&key, "secret"));
        let config = SslConfig {
            keyfile_password: Some("secret".to_string()),
            ..ssl(Some(&write(dir.path(), "combined.pem", &combined)), None)
        };
        assert!(create_tls_acceptor(&config).is_ok());
    }

    #[test]
    fn test_encrypted_key_wrong_password() {
        let dir = tempfile::tempdir().unwrap();
        let (cert, key) = self_signed();
        let config = SslConfig {
            keyfile_password: Some("wrong".to_string()),
            ..ssl(
                Some(&write(dir.path(), "cert.pem", &cert)),
                Some(&write(dir.path(), "key.pem", &encrypted_key_pem(&key, "secret"))),
            )
        };
        let err = acceptor_error(&config);
        assert!(err.to_string().contains("Failed to decrypt"), "{err}");
    }

    #[test]
    fn test_encrypted_key_without_password() {
        let dir = tempfile::tempdir().unwrap();
        let (cert, key) = self_signed();
        let config = ssl(
            Some(&write(dir.path(), "cert.pem", &cert)),
            Some(&write(dir.path(), "key.pem", &encrypted_key_pem(&key, "secret"))),
        );
        let err = acceptor_error(&config);
        assert!(err.to_string().contains("keyfile_password"), "{err}");
    }

    #[test]
    fn test_missing_certificate_file() {
        let err = acceptor_error(&ssl(Some("/nonexistent/cap/cert.pem"), None));
        assert!(matches!(err, ListenerError::Tls(_)));
    }

    #[test]
    fn test_file_without_certificates() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "not a pem file\n").unwrap();
        let path = file.path().display().to_string();
        let err = acceptor_error(&ssl(Some(&path), None));
        assert!(err.to_string().contains("No certificates found"));
    }

    #[test]
    fn test_no_files_configured() {
        let err = acceptor_error(&ssl(None, None));
        assert!(err.to_string().contains("No certificate file configured"));
    }

    #[test]
    fn test_pem_block_extraction() {
        let text = "junk\n-----BEGIN A-----\nxyz\n-----END A-----\ntrailer";
        assert_eq!(
            pem_block(text, "A"),
            Some("-----BEGIN A-----\nxyz\n-----END A-----")
        );
        assert_eq!(pem_block(text, "B"), None);
    }
}
