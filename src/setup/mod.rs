mod discovery;
mod flow;
mod form;
mod options;

pub use discovery::{AbortReason, Announcement};
pub use flow::{MenuChoice, SetupError, SetupFlow, SetupOutcome};
pub use form::{BASE, DEFAULT_PASSWORD, DEFAULT_USERNAME, Form, FormErrors, FormStep, FormValues, NoTranslations, Translations, Translator};
pub use options::OptionsFlow;

#[cfg(test)]
pub(crate) mod fake {
    use crate::domain::{ConnectionParameters, DeviceIdentity, PinnedCertificate};
    use crate::pikvm::{DeviceProber, ProbeError, ProbeResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, PoisonError};

    pub struct FakeProber {
        certificate: Option<PinnedCertificate>,
        result: ProbeResult,
        certificate_fetches: AtomicUsize,
        probed: Mutex<Vec<String>>,
    }

    impl FakeProber {
        pub fn certificate() -> PinnedCertificate {
            PinnedCertificate::new("fake".to_string())
        }

        fn new(certificate: Option<PinnedCertificate>, result: ProbeResult) -> Self {
            FakeProber {
                certificate,
                result,
                certificate_fetches: AtomicUsize::new(0),
                probed: Mutex::new(Vec::new()),
            }
        }

        pub fn identity(serial: &str, display_name: Option<&str>) -> Self {
            FakeProber::new(
                Some(FakeProber::certificate()),
                Ok(DeviceIdentity {
                    serial: serial.to_string(),
                    model: Some("v3".to_string()),
                    display_name: display_name.map(str::to_string),
                }),
            )
        }

        pub fn failing(error: ProbeError) -> Self {
            FakeProber::new(Some(FakeProber::certificate()), Err(error))
        }

        pub fn without_certificate() -> Self {
            FakeProber::new(None, Err(ProbeError::CertificateUnreachable))
        }

        pub fn certificate_fetches(&self) -> usize {
            self.certificate_fetches.load(Ordering::SeqCst)
        }

        pub fn probed_urls(&self) -> Vec<String> {
            self.probed.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }
    }

    #[async_trait]
    impl DeviceProber for FakeProber {
        async fn fetch_certificate(&self, _url: &str) -> Option<PinnedCertificate> {
            self.certificate_fetches.fetch_add(1, Ordering::SeqCst);
            self.certificate.clone()
        }

        async fn probe(&self, connection: &ConnectionParameters, _certificate: &PinnedCertificate) -> ProbeResult {
            self.probed.lock().unwrap_or_else(PoisonError::into_inner).push(connection.base_url.clone());
            self.result.clone()
        }
    }
}
