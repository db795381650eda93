use std::path::Path;
use std::sync::Arc;
use std::sync::OnceLock;

use log::debug;
use rustls::client::{ServerCertVerified, ServerName};
use rustls::{Certificate, ClientConfig, OwnedTrustAnchor, RootCertStore};

fn create_client_config(verify: bool, root_store: RootCertStore) -> ClientConfig {
    let builder = ClientConfig::builder().with_safe_defaults();

    if !verify {
        builder
            .with_custom_certificate_verifier(Arc::new(DisabledVerifier {}))
            .with_no_client_auth()
    } else {
        builder
            .with_root_certificates(root_store)
            .with_no_client_auth()
    }
}

fn get_webpki_roots() -> &'static [OwnedTrustAnchor] {
    static INSTANCE: OnceLock<Vec<OwnedTrustAnchor>> = OnceLock::new();
    INSTANCE.get_or_init(|| {
        webpki_roots::TLS_SERVER_ROOTS
            .iter()
            .map(|trust_anchor| {
                OwnedTrustAnchor::from_subject_spki_name_constraints(
                    trust_anchor.subject.as_ref().to_vec(),
                    trust_anchor.subject_public_key_info.as_ref().to_vec(),
                    trust_anchor
                        .name_constraints
                        .as_ref()
                        .map(|nc| nc.as_ref().to_vec()),
                )
            })
            .collect()
    })
}

pub struct DisabledVerifier;
impl rustls::client::ServerCertVerifier for DisabledVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: std::time::SystemTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }
}

pub fn load_certs(cert_bytes: &[u8]) -> std::io::Result<Vec<Certificate>> {
    let mut reader = std::io::Cursor::new(cert_bytes);
    let mut certs = vec![];
    for item in std::iter::from_fn(|| rustls_pemfile::read_one(&mut reader).transpose()) {
        if let rustls_pemfile::Item::X509Certificate(cert) = item? {
            certs.push(Certificate(cert.as_ref().to_vec()));
        }
    }
    if certs.is_empty() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "No certs found",
        ));
    }
    Ok(certs)
}

/// Builds a TLS connector trusting the bundled webpki roots plus any PEM
/// certificates found at `extra_roots`.
pub fn create_connector(
    verify: bool,
    extra_roots: Option<&Path>,
) -> std::io::Result<tokio_rustls::TlsConnector> {
    let mut root_store = RootCertStore {
        roots: get_webpki_roots().to_vec(),
    };

    if let Some(path) = extra_roots {
        let cert_bytes = std::fs::read(path)?;
        for cert in load_certs(&cert_bytes)? {
            root_store.add(&cert).map_err(|e| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("invalid root certificate in {}: {}", path.display(), e),
                )
            })?;
        }
        debug!("Loaded extra root certificates from {}", path.display());
    }

    Ok(Arc::new(create_client_config(verify, root_store)).into())
}

pub fn server_name(host: &str) -> std::io::Result<ServerName> {
    // url hands out bracketed IPv6 hosts.
    let host = host.trim_start_matches('[').trim_end_matches(']');
    ServerName::try_from(host).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("invalid TLS server name {}: {}", host, e),
        )
    })
}
