use crate::certificate::{build_pinned_client, fetch_leaf_certificate};
use crate::domain::{BasicAuth, ConnectionParameters, DeviceIdentity, PinnedCertificate};
use crate::pikvm::domain::InfoResponse;
use crate::pikvm::{ApiError, DeviceApi, PikvmClient, Resource};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

pub type ProbeResult = Result<DeviceIdentity, ProbeError>;

#[derive(Error, Clone, PartialEq, Debug)]
pub enum ProbeError {
    #[error("could not connect using the device certificate")]
    CertificateUnreachable,
    #[error("invalid username or password")]
    HttpUnauthorized,
    #[error("request failed{}", .0.map(|code| format!(" with status {}", code)).unwrap_or_default())]
    HttpError(Option<u16>),
    #[error("the device sent a malformed response")]
    MalformedResponse,
    #[error("the device reported a failure")]
    OkFlagFalse,
}

impl ProbeError {
    /// Stable code shown in the setup form.
    pub fn code(&self) -> String {
        match self {
            ProbeError::CertificateUnreachable => "certificate_unreachable".to_string(),
            ProbeError::HttpUnauthorized => "http_unauthorized".to_string(),
            ProbeError::HttpError(Some(code)) => format!("http_error_{}", code),
            ProbeError::HttpError(None) => "http_error".to_string(),
            ProbeError::MalformedResponse => "malformed_response".to_string(),
            ProbeError::OkFlagFalse => "ok_flag_false".to_string(),
        }
    }
}

impl From<ApiError> for ProbeError {
    fn from(error: ApiError) -> Self {
        match error {
            ApiError::Unauthorized => ProbeError::HttpUnauthorized,
            ApiError::Status(status) => ProbeError::HttpError(Some(status.as_u16())),
            ApiError::Transport(e) => ProbeError::HttpError(e.status().map(|status| status.as_u16())),
            ApiError::Decode(_) => ProbeError::MalformedResponse,
        }
    }
}

/// Makes one authenticated request to the identity endpoint. The client, and with it the pinned
/// certificate, is dropped before this returns on every path.
#[instrument(skip_all, fields(url = %connection.base_url))]
pub async fn probe(connection: &ConnectionParameters, certificate: Option<&PinnedCertificate>, request_timeout: Duration) -> ProbeResult {
    let client = build_pinned_client(certificate, request_timeout).map_err(|e| {
        warn!("⚠️ Probing {}... failed, {}", connection.base_url, e);
        ProbeError::CertificateUnreachable
    })?;

    probe_with(&PikvmClient::new(client, &connection.base_url), &connection.basic_auth()).await
}

pub async fn probe_with(api: &dyn DeviceApi, auth: &BasicAuth) -> ProbeResult {
    debug!(username = auth.username, "🔎 Probing device...");
    let body = api.fetch(Resource::Info, auth).await.map_err(|e| {
        warn!("⚠️ Probing device... failed, {}", e);
        ProbeError::from(e)
    })?;

    let response: InfoResponse = serde_json::from_value(body).map_err(|e| {
        warn!("⚠️ Probing device... failed, unexpected response: {}", e);
        ProbeError::MalformedResponse
    })?;

    if !response.ok {
        warn!("⚠️ Probing device... failed, 'ok' is missing or false");
        return Err(ProbeError::OkFlagFalse);
    }

    let platform = response.result.hw.platform;
    let Some(serial) = platform.serial.filter(|serial| !serial.is_empty()) else {
        warn!("⚠️ Probing device... failed, the response has no serial");
        return Err(ProbeError::MalformedResponse);
    };

    let identity = DeviceIdentity {
        serial,
        model: platform.model,
        display_name: response.result.meta.server.host,
    };
    debug!(serial = identity.serial, model = ?identity.model, "🔎 Probing device... OK");
    Ok(identity)
}

/// The live-device operations a setup flow needs, in the order it needs them.
#[async_trait]
pub trait DeviceProber: Send + Sync {
    async fn fetch_certificate(&self, url: &str) -> Option<PinnedCertificate>;

    async fn probe(&self, connection: &ConnectionParameters, certificate: &PinnedCertificate) -> ProbeResult;
}

#[derive(Clone, Debug)]
pub struct PikvmProber {
    fetch_timeout: Duration,
    request_timeout: Duration,
}

impl PikvmProber {
    pub fn new(fetch_timeout: Duration, request_timeout: Duration) -> Self {
        PikvmProber {
            fetch_timeout,
            request_timeout,
        }
    }
}

#[async_trait]
impl DeviceProber for PikvmProber {
    async fn fetch_certificate(&self, url: &str) -> Option<PinnedCertificate> {
        fetch_leaf_certificate(url, self.fetch_timeout).await
    }

    async fn probe(&self, connection: &ConnectionParameters, certificate: &PinnedCertificate) -> ProbeResult {
        probe(connection, Some(certificate), self.request_timeout).await
    }
}
