use crate::certificate::verifier::pinned_tls_config;
use crate::certificate::{CertificateError, decode_pem};
use crate::domain::PinnedCertificate;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Builds an HTTP client that only talks to a server presenting `certificate`. Without a
/// certificate any server is accepted, which is only used while a device is being probed for the
/// first time. The certificate lives in memory and is released with the client.
pub fn build_pinned_client(certificate: Option<&PinnedCertificate>, request_timeout: Duration) -> Result<Client, CertificateError> {
    let pinned = certificate.map(|certificate| decode_pem(certificate.pem())).transpose()?;
    let is_pinned = pinned.is_some();

    let client = Client::builder()
        .use_preconfigured_tls(pinned_tls_config(pinned)?)
        .timeout(request_timeout)
        .build()?;

    debug!(pinned = is_pinned, "Created client with custom TLS verification");
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::{encode_pem, test_server};
    use test_log::test;

    #[test(tokio::test)]
    async fn pinned_client_accepts_the_pinned_certificate() -> Result<(), CertificateError> {
        let server = test_server::start(r#"{"ok": true}"#).await;
        let certificate = PinnedCertificate::new(encode_pem(&server.certificate));
        let client = build_pinned_client(Some(&certificate), Duration::from_secs(5))?;

        let body = client.get(server.url()).send().await?.text().await?;

        assert_eq!(body, r#"{"ok": true}"#);
        Ok(())
    }

    #[test(tokio::test)]
    async fn pinned_client_rejects_a_different_certificate() -> Result<(), CertificateError> {
        let server = test_server::start("{}").await;
        let other = test_server::start("{}").await;
        let certificate = PinnedCertificate::new(encode_pem(&other.certificate));
        let client = build_pinned_client(Some(&certificate), Duration::from_secs(5))?;

        let result = client.get(server.url()).send().await;

        assert!(result.is_err());
        Ok(())
    }

    #[test(tokio::test)]
    async fn unpinned_client_accepts_any_certificate() -> Result<(), CertificateError> {
        let server = test_server::start("{}").await;
        let client = build_pinned_client(None, Duration::from_secs(5))?;

        let response = client.get(server.url()).send().await?;

        assert!(response.status().is_success());
        Ok(())
    }

    #[test]
    fn build_fails_for_an_invalid_certificate() {
        let certificate = PinnedCertificate::new("garbage".to_string());

        let result = build_pinned_client(Some(&certificate), Duration::from_secs(5));

        assert!(matches!(result, Err(CertificateError::InvalidPem)));
    }
}
