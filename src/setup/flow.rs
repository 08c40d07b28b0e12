use crate::domain::{ConnectionParameters, DeviceIdentity, EntryId, TotpSeed};
use crate::pikvm::{DeviceProber, ProbeError};
use crate::registry::{Credentials, IdentityRegistry, Registration, RegistryError, UpsertOutcome};
use crate::setup::discovery::{AbortReason, Announcement, applicable_serial};
use crate::setup::form::{Form, FormErrors, FormStep, FormValues, Translator};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

#[derive(Error, PartialEq, Debug)]
pub enum SetupError {
    #[error("the TOTP seed is not valid base32")]
    InvalidTotp,
    #[error("could not fetch the device certificate")]
    CannotFetchCertificate,
    #[error(transparent)]
    Probe(ProbeError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl SetupError {
    /// The code placed in the form's base error slot.
    pub fn code(&self) -> String {
        match self {
            SetupError::InvalidTotp => "invalid_totp".to_string(),
            SetupError::CannotFetchCertificate => "cannot_fetch_cert".to_string(),
            SetupError::Probe(e) => e.code(),
            SetupError::Registry(_) => "unknown_error".to_string(),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum MenuChoice {
    AddDevice,
    Ignore,
}

#[derive(Clone, PartialEq, Debug)]
pub enum SetupOutcome {
    ShowForm(Form),
    ShowMenu(Vec<MenuChoice>),
    Registered(EntryId),
    UpdatedExisting(EntryId),
    Ignored,
    Aborted(AbortReason),
}

/// Fetches the certificate, then probes the device with it. Nothing is registered.
#[instrument(skip_all, fields(host = values.host))]
pub(super) async fn validate(prober: &dyn DeviceProber, values: &FormValues) -> Result<Registration, SetupError> {
    let totp_seed = TotpSeed::parse(&values.totp).map_err(|_| SetupError::InvalidTotp)?;
    let connection = ConnectionParameters::new(&values.host, &values.username, &values.password, totp_seed);

    let certificate = prober
        .fetch_certificate(&connection.base_url)
        .await
        .ok_or(SetupError::CannotFetchCertificate)?;

    let identity = prober.probe(&connection, &certificate).await.map_err(|e| match e {
        ProbeError::CertificateUnreachable => SetupError::CannotFetchCertificate,
        e => SetupError::Probe(e),
    })?;
    debug!(serial = identity.serial, model = ?identity.model, "🔎 Found device '{}'", identity.title());

    Ok(Registration {
        identity,
        base_url: connection.base_url,
        title: None,
        credentials: Some(Credentials {
            username: connection.username,
            password: connection.password,
            totp_seed: connection.totp_seed,
        }),
        certificate: Some(certificate),
    })
}

/// One attempt to add a device, entered manually, imported from configuration or announced on the
/// network.
pub struct SetupFlow {
    registry: Arc<IdentityRegistry>,
    prober: Arc<dyn DeviceProber>,
    translator: Arc<dyn Translator>,
    discovered: Option<FormValues>,
}

impl SetupFlow {
    pub fn new(registry: Arc<IdentityRegistry>, prober: Arc<dyn DeviceProber>, translator: Arc<dyn Translator>) -> Self {
        SetupFlow {
            registry,
            prober,
            translator,
            discovered: None,
        }
    }

    pub fn start(&self) -> SetupOutcome {
        let values = match &self.discovered {
            Some(discovered) => without_password(discovered.clone()),
            None => FormValues::default(),
        };
        self.show_form(values, FormErrors::default())
    }

    pub async fn submit(&self, values: FormValues) -> SetupOutcome {
        info!("🔧 Setting up {}...", values.host);
        match self.register(&values).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("⚠️ Setting up {}... failed, {}", values.host, e);
                self.show_form(values, FormErrors::base(e.code()))
            }
        }
    }

    pub async fn import(&self, values: FormValues) -> SetupOutcome {
        self.submit(values).await
    }

    #[instrument(skip_all, fields(host = announcement.host))]
    pub fn discovered(&mut self, announcement: &Announcement) -> SetupOutcome {
        let serial = match applicable_serial(announcement) {
            Ok(serial) => serial,
            Err(reason) => {
                debug!("🔍 Ignoring announcement, {}", reason.code());
                return SetupOutcome::Aborted(reason);
            }
        };

        if let Some(existing) = self.registry.find(serial) {
            debug!(serial, "🔍 Announced device is already registered as '{}'", existing.title);
            let registration = Registration {
                identity: DeviceIdentity {
                    serial: existing.identity.serial.clone(),
                    model: announcement.model().map(str::to_string),
                    display_name: None,
                },
                base_url: announcement.host.clone(),
                title: None,
                credentials: None,
                certificate: None,
            };

            return match self.registry.upsert(registration) {
                Ok(outcome) => SetupOutcome::UpdatedExisting(outcome.entry_id()),
                Err(e) => {
                    warn!(serial, "⚠️ Updating the announced device failed, {}", e);
                    SetupOutcome::Aborted(AbortReason::UnknownEntry)
                }
            };
        }

        info!(serial, model = announcement.model(), "🔍 Discovered a new device at {}", announcement.host);
        self.discovered = Some(FormValues {
            host: announcement.host.clone(),
            ..FormValues::default()
        });
        SetupOutcome::ShowMenu(vec![MenuChoice::AddDevice, MenuChoice::Ignore])
    }

    /// Answers the add-or-ignore menu of a discovered device. The device is probed with the
    /// factory credentials first; if that fails the user is asked for the password.
    pub async fn confirm(&self, choice: MenuChoice) -> SetupOutcome {
        let Some(values) = self.discovered.clone() else {
            return self.start();
        };

        match choice {
            MenuChoice::Ignore => {
                info!("🔍 Ignoring the device at {}", values.host);
                SetupOutcome::Ignored
            }
            MenuChoice::AddDevice => match self.register(&values).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("⚠️ Setting up {}... failed, {}", values.host, e);
                    self.show_form(without_password(values), FormErrors::base(e.code()))
                }
            },
        }
    }

    async fn register(&self, values: &FormValues) -> Result<SetupOutcome, SetupError> {
        let registration = validate(self.prober.as_ref(), values).await?;

        Ok(match self.registry.upsert(registration)? {
            UpsertOutcome::Inserted(entry_id) => {
                info!(entry_id = %entry_id, "🔧 Setting up {}... OK", values.host);
                SetupOutcome::Registered(entry_id)
            }
            UpsertOutcome::Updated(entry_id) => {
                info!(entry_id = %entry_id, "🔧 Setting up {}... OK, device was already registered", values.host);
                SetupOutcome::UpdatedExisting(entry_id)
            }
        })
    }

    fn show_form(&self, values: FormValues, errors: FormErrors) -> SetupOutcome {
        SetupOutcome::ShowForm(Form::new(FormStep::User, values, errors, self.translator.as_ref()))
    }
}

fn without_password(values: FormValues) -> FormValues {
    FormValues {
        password: String::new(),
        ..values
    }
}
