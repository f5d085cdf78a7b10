//! TLS material loading and self-signed generation.

use crate::config::TlsConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;
use tracing::info;

const CERT_FILE_NAME: &str = "server.crt";
const KEY_FILE_NAME: &str = "server.key";

/// Resolve a TLS acceptor from configuration.
///
/// Precedence: explicitly configured files (errors are fatal), then
/// previously generated material under the store path, then on-the-fly
/// self-signed generation when allowed. With generation disabled and no
/// certificate available, startup fails.
pub fn load_or_generate(config: &TlsConfig, store_path: &Path) -> Result<TlsAcceptor, anyhow::Error> {
    if !config.cert_file.is_empty() && !config.key_file.is_empty() {
        return create_tls_acceptor(Path::new(&config.cert_file), Path::new(&config.key_file));
    }

    let store_cert = store_path.join(CERT_FILE_NAME);
    let store_key = store_path.join(KEY_FILE_NAME);
    if store_cert.exists() && store_key.exists() {
        info!("using TLS certificate from {}", store_cert.display());
        return create_tls_acceptor(&store_cert, &store_key);
    }

    if !config.auto_generate {
        anyhow::bail!("no TLS certificate found and auto-generation is disabled");
    }

    generate_self_signed(store_path)?;
    info!("generated self-signed TLS certificate in {}", store_path.display());
    create_tls_acceptor(&store_cert, &store_key)
}

/// Write a fresh self-signed certificate and key under `store_path`.
fn generate_self_signed(store_path: &Path) -> Result<(), anyhow::Error> {
    std::fs::create_dir_all(store_path)?;

    let mut params = rcgen::CertificateParams::new(vec!["localhost".to_string()])?;
    params
        .distinguished_name
        .push(rcgen::DnType::OrganizationName, "Mirage");
    params
        .distinguished_name
        .push(rcgen::DnType::CommonName, "Mirage Self-Signed");
    params
        .subject_alt_names
        .push(rcgen::SanType::IpAddress("127.0.0.1".parse()?));
    params
        .subject_alt_names
        .push(rcgen::SanType::IpAddress("::1".parse()?));

    let key_pair = rcgen::KeyPair::generate()?;
    let cert = params.self_signed(&key_pair)?;

    std::fs::write(store_path.join(CERT_FILE_NAME), cert.pem())?;
    std::fs::write(store_path.join(KEY_FILE_NAME), key_pair.serialize_pem())?;
    Ok(())
}

/// Build a TLS acceptor from PEM certificate and key files.
pub fn create_tls_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, anyhow::Error> {
    let cert_file = std::fs::File::open(cert_path).map_err(|e| {
        anyhow::anyhow!("failed to open certificate file '{}': {e}", cert_path.display())
    })?;
    let mut cert_reader = BufReader::new(cert_file);
    let certs: Vec<CertificateDer> = rustls_pemfile::certs(&mut cert_reader)
        .collect::<Result<_, _>>()
        .map_err(|e| anyhow::anyhow!("failed to parse certificate file: {e}"))?;

    if certs.is_empty() {
        anyhow::bail!("no certificates found in {}", cert_path.display());
    }

    let key_file = std::fs::File::open(key_path).map_err(|e| {
        anyhow::anyhow!("failed to open private key file '{}': {e}", key_path.display())
    })?;
    let mut key_reader = BufReader::new(key_file);
    let key: PrivateKeyDer = rustls_pemfile::private_key(&mut key_reader)
        .map_err(|e| anyhow::anyhow!("failed to parse private key file: {e}"))?
        .ok_or_else(|| anyhow::anyhow!("no private key found in {}", key_path.display()))?;

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| anyhow::anyhow!("failed to build TLS configuration: {e}"))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let config = TlsConfig {
            enabled: true,
            auto_generate: true,
            ..Default::default()
        };
        load_or_generate(&config, dir.path()).unwrap();
        assert!(dir.path().join("server.crt").exists());
        assert!(dir.path().join("server.key").exists());

        // Second call reuses the stored material
        load_or_generate(&config, dir.path()).unwrap();
    }

    #[test]
    fn test_missing_cert_without_autogen_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = TlsConfig {
            enabled: true,
            auto_generate: false,
            ..Default::default()
        };
        let err = load_or_generate(&config, dir.path()).err().unwrap();
        assert!(err.to_string().contains("auto-generation is disabled"));
    }

    #[test]
    fn test_configured_files_must_exist() {
        let config = TlsConfig {
            enabled: true,
            cert_file: "/nonexistent/server.crt".to_string(),
            key_file: "/nonexistent/server.key".to_string(),
            auto_generate: true,
            ..Default::default()
        };
        assert!(load_or_generate(&config, Path::new("/tmp")).is_err());
    }
}
