use crate::certificate::verifier::pinned_tls_config;
use crate::certificate::{CertificateError, encode_pem};
use crate::domain::PinnedCertificate;
use crate::pikvm::normalize_url;
use rustls::pki_types::ServerName;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::{debug, instrument, warn};
use url::{Host, Url};

const HTTPS_PORT: u16 = 443;

/// Completes a TLS handshake with the device and returns the leaf certificate it presented.
/// Failures are logged and reported as `None`; the caller decides whether that is fatal.
#[instrument(skip(fetch_timeout))]
pub async fn fetch_leaf_certificate(url: &str, fetch_timeout: Duration) -> Option<PinnedCertificate> {
    debug!("🔐 Fetching certificate from {}...", url);
    match timeout(fetch_timeout, try_fetch(url)).await {
        Ok(Ok(certificate)) => {
            debug!("🔐 Fetching certificate from {}... OK", url);
            Some(certificate)
        }
        Ok(Err(e)) => {
            warn!("⚠️ Fetching certificate from {}... failed, {}", url, e);
            None
        }
        Err(_) => {
            warn!("⚠️ Fetching certificate from {}... failed, {}", url, CertificateError::Timeout(fetch_timeout));
            None
        }
    }
}

async fn try_fetch(url: &str) -> Result<PinnedCertificate, CertificateError> {
    let (host, port) = host_and_port(url)?;
    let server_name = ServerName::try_from(host.as_str())?.to_owned();
    let connector = TlsConnector::from(Arc::new(pinned_tls_config(None)?));

    let stream = TcpStream::connect((host.as_str(), port)).await?;
    let tls = connector.connect(server_name, stream).await?;

    let (_, connection) = tls.get_ref();
    let leaf = connection
        .peer_certificates()
        .and_then(|certificates| certificates.first())
        .ok_or(CertificateError::NoPeerCertificate)?;

    Ok(PinnedCertificate::new(encode_pem(leaf.as_ref())))
}

fn host_and_port(url: &str) -> Result<(String, u16), CertificateError> {
    let normalized = normalize_url(url);
    let parsed = Url::parse(&normalized).map_err(|_| CertificateError::InvalidUrl(url.to_string()))?;

    let host = match parsed.host() {
        Some(Host::Domain(domain)) => domain.to_string(),
        Some(Host::Ipv4(address)) => address.to_string(),
        Some(Host::Ipv6(address)) => address.to_string(),
        None => return Err(CertificateError::InvalidUrl(url.to_string())),
    };

    // The certificate is always fetched over TLS, also when the form said http.
    let port = match parsed.scheme() {
        "https" => parsed.port_or_known_default().unwrap_or(HTTPS_PORT),
        _ => parsed.port().unwrap_or(HTTPS_PORT),
    };

    Ok((host, port))
}
