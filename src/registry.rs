use crate::domain::events::RegistryEvent;
use crate::domain::{ConnectionParameters, DeviceIdentity, EntryId, PinnedCertificate, RegisteredDeviceRecord, TotpSeed};
use crate::pikvm::normalize_url;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument};

const EVENT_BUFFER_SIZE: usize = 16;

#[derive(Clone, PartialEq, Debug)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub totp_seed: Option<TotpSeed>,
}

/// What a setup step learned about a device. Fields left as `None` keep their registered value
/// when the serial is already known.
#[derive(Clone, Debug)]
pub struct Registration {
    pub identity: DeviceIdentity,
    pub base_url: String,
    pub title: Option<String>,
    pub credentials: Option<Credentials>,
    pub certificate: Option<PinnedCertificate>,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum UpsertOutcome {
    Inserted(EntryId),
    Updated(EntryId),
}

impl UpsertOutcome {
    pub fn entry_id(&self) -> EntryId {
        match self {
            UpsertOutcome::Inserted(entry_id) | UpsertOutcome::Updated(entry_id) => *entry_id,
        }
    }
}

#[derive(Error, PartialEq, Debug)]
pub enum RegistryError {
    #[error("cannot register '{serial}' without {missing}")]
    Incomplete { serial: String, missing: &'static str },
    #[error("unknown entry '{0}'")]
    UnknownEntry(EntryId),
}

/// All registered devices, keyed by serial. Records are immutable once published; every mutation
/// swaps in a new `Arc` under the write lock.
#[derive(Debug)]
pub struct IdentityRegistry {
    records: RwLock<Vec<Arc<RegisteredDeviceRecord>>>,
    events: broadcast::Sender<RegistryEvent>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        IdentityRegistry {
            records: RwLock::new(Vec::new()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    pub fn find(&self, serial: &str) -> Option<Arc<RegisteredDeviceRecord>> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records.iter().find(|record| record.identity.serial.eq_ignore_ascii_case(serial)).cloned()
    }

    pub fn get(&self, entry_id: EntryId) -> Option<Arc<RegisteredDeviceRecord>> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records.iter().find(|record| record.entry_id == entry_id).cloned()
    }

    pub fn records(&self) -> Vec<Arc<RegisteredDeviceRecord>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Inserts the device, or merges the registration into the record with the same serial. A merge
    /// that changes nothing is not broadcast.
    #[instrument(skip_all, fields(serial = registration.identity.serial))]
    pub fn upsert(&self, registration: Registration) -> Result<UpsertOutcome, RegistryError> {
        let (outcome, changed) = {
            let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
            let serial = &registration.identity.serial;

            match records.iter_mut().find(|record| record.identity.serial.eq_ignore_ascii_case(serial)) {
                Some(existing) => {
                    let record = merge(existing, registration);
                    (UpsertOutcome::Updated(existing.entry_id), replace(existing, record))
                }
                None => {
                    let record = new_record(registration)?;
                    let entry_id = record.entry_id;
                    records.push(Arc::new(record));
                    (UpsertOutcome::Inserted(entry_id), true)
                }
            }
        };

        if changed {
            self.publish(outcome);
        }
        Ok(outcome)
    }

    /// Merges the registration into a specific entry, taking over the new serial. When another
    /// entry already owns that serial, the registration goes to that entry instead.
    #[instrument(skip_all, fields(entry_id = %entry_id, serial = registration.identity.serial))]
    pub fn update(&self, entry_id: EntryId, registration: Registration) -> Result<UpsertOutcome, RegistryError> {
        let (outcome, changed) = {
            let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
            let Some(index) = records.iter().position(|record| record.entry_id == entry_id) else {
                return Err(RegistryError::UnknownEntry(entry_id));
            };

            let serial = registration.identity.serial.clone();
            let owner = records
                .iter()
                .position(|record| record.entry_id != entry_id && record.identity.serial.eq_ignore_ascii_case(&serial))
                .unwrap_or(index);

            let existing = &mut records[owner];
            let mut record = merge(existing, registration);
            if owner == index {
                record.identity.serial = serial;
            } else {
                debug!(entry_id = %existing.entry_id, "🔵 Serial belongs to another entry");
            }
            (UpsertOutcome::Updated(existing.entry_id), replace(existing, record))
        };

        if changed {
            self.publish(outcome);
        }
        Ok(outcome)
    }

    pub fn remove(&self, entry_id: EntryId) -> Option<Arc<RegisteredDeviceRecord>> {
        let removed = {
            let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
            let index = records.iter().position(|record| record.entry_id == entry_id)?;
            records.remove(index)
        };

        info!(entry_id = %entry_id, serial = removed.identity.serial, "🗑️ Removed '{}'", removed.title);
        self.events.send(RegistryEvent::Removed(entry_id)).unwrap_or_default();
        Some(removed)
    }

    fn publish(&self, outcome: UpsertOutcome) {
        let event = match outcome {
            UpsertOutcome::Inserted(entry_id) => {
                info!(entry_id = %entry_id, "🟢 Registered new device");
                RegistryEvent::Added(entry_id)
            }
            UpsertOutcome::Updated(entry_id) => {
                info!(entry_id = %entry_id, "🔵 Updated existing device");
                RegistryEvent::Updated(entry_id)
            }
        };
        self.events.send(event).unwrap_or_default();
    }
}

impl Default for IdentityRegistry {
    fn default() -> Self {
        IdentityRegistry::new()
    }
}

/// Swaps in `record` unless it equals the current one. Returns whether anything changed.
fn replace(existing: &mut Arc<RegisteredDeviceRecord>, record: RegisteredDeviceRecord) -> bool {
    if **existing == record {
        debug!(entry_id = %record.entry_id, "Registration changes nothing");
        return false;
    }
    *existing = Arc::new(record);
    true
}

fn merge(existing: &RegisteredDeviceRecord, registration: Registration) -> RegisteredDeviceRecord {
    debug!(serial = existing.identity.serial, "🔵 Merging registration into '{}'", existing.title);
    let Registration {
        identity,
        base_url,
        title,
        credentials,
        certificate,
    } = registration;

    let connection = match credentials {
        Some(credentials) => ConnectionParameters::new(&base_url, &credentials.username, &credentials.password, credentials.totp_seed),
        None => ConnectionParameters {
            base_url: normalize_url(&base_url),
            ..existing.connection.clone()
        },
    };

    RegisteredDeviceRecord {
        entry_id: existing.entry_id,
        title: title.unwrap_or_else(|| existing.title.clone()),
        identity: DeviceIdentity {
            serial: existing.identity.serial.clone(),
            model: identity.model.or_else(|| existing.identity.model.clone()),
            display_name: identity.display_name.or_else(|| existing.identity.display_name.clone()),
        },
        connection,
        certificate: certificate.unwrap_or_else(|| existing.certificate.clone()),
    }
}

fn new_record(registration: Registration) -> Result<RegisteredDeviceRecord, RegistryError> {
    let incomplete = |missing| RegistryError::Incomplete {
        serial: registration.identity.serial.clone(),
        missing,
    };
    let credentials = registration.credentials.clone().ok_or_else(|| incomplete("credentials"))?;
    let certificate = registration.certificate.clone().ok_or_else(|| incomplete("a certificate"))?;

    Ok(RegisteredDeviceRecord {
        entry_id: EntryId::new(),
        title: registration.title.unwrap_or_else(|| registration.identity.title()),
        connection: ConnectionParameters::new(
            &registration.base_url,
            &credentials.username,
            &credentials.password,
            credentials.totp_seed,
        ),
        identity: registration.identity,
        certificate,
    })
}

#[cfg(test)]
impl Registration {
    pub fn fixture(serial: &str, base_url: &str) -> Self {
        Registration {
            identity: DeviceIdentity {
                serial: serial.to_string(),
                model: Some("v3".to_string()),
                display_name: Some("pikvm-office".to_string()),
            },
            base_url: base_url.to_string(),
            title: None,
            credentials: Some(Credentials {
                username: "admin".to_string(),
                password: "secret".to_string(),
                totp_seed: None,
            }),
            certificate: Some(PinnedCertificate::new("pem".to_string())),
        }
    }
}
