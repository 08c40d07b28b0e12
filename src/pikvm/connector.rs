use crate::certificate::{CertificateError, build_pinned_client};
use crate::domain::{PinnedCertificate, RegisteredDeviceRecord};
use crate::pikvm::{DeviceApi, PikvmClient};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// Creates API sessions for one device.
pub trait ApiConnector: Debug + Send + Sync {
    fn connect(&self) -> Result<Arc<dyn DeviceApi>, CertificateError>;
}

#[derive(Debug)]
pub struct PinnedConnector {
    base_url: String,
    certificate: Option<PinnedCertificate>,
    request_timeout: Duration,
}

impl PinnedConnector {
    pub fn new(base_url: &str, certificate: Option<PinnedCertificate>, request_timeout: Duration) -> Self {
        PinnedConnector {
            base_url: base_url.to_string(),
            certificate,
            request_timeout,
        }
    }

    pub fn for_record(record: &RegisteredDeviceRecord, request_timeout: Duration) -> Self {
        PinnedConnector::new(&record.connection.base_url, Some(record.certificate.clone()), request_timeout)
    }
}

impl ApiConnector for PinnedConnector {
    fn connect(&self) -> Result<Arc<dyn DeviceApi>, CertificateError> {
        let client = build_pinned_client(self.certificate.as_ref(), self.request_timeout)?;
        Ok(Arc::new(PikvmClient::new(client, &self.base_url)))
    }
}
