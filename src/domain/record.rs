use crate::domain::{ConnectionParameters, DeviceIdentity};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque key of a registration in the host's configuration store. Unrelated to the serial.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct EntryId(Uuid);

impl EntryId {
    pub fn new() -> Self {
        EntryId(Uuid::new_v4())
    }
}

impl Default for EntryId {
    fn default() -> Self {
        EntryId::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// The leaf certificate a device presented when it was registered, PEM encoded.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PinnedCertificate {
    pem: String,
}

impl PinnedCertificate {
    pub fn new(pem: String) -> Self {
        PinnedCertificate { pem }
    }

    pub fn pem(&self) -> &str {
        &self.pem
    }
}

impl fmt::Debug for PinnedCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PinnedCertificate({} bytes)", self.pem.len())
    }
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct RegisteredDeviceRecord {
    pub entry_id: EntryId,
    pub title: String,
    pub identity: DeviceIdentity,
    pub connection: ConnectionParameters,
    pub certificate: PinnedCertificate,
}

#[cfg(test)]
impl RegisteredDeviceRecord {
    pub fn fixture(serial: &str, base_url: &str) -> Self {
        RegisteredDeviceRecord {
            entry_id: EntryId::new(),
            title: "pikvm".to_string(),
            identity: DeviceIdentity {
                serial: serial.to_string(),
                model: Some("v3".to_string()),
                display_name: Some("pikvm".to_string()),
            },
            connection: ConnectionParameters::new(base_url, "admin", "secret", None),
            certificate: PinnedCertificate::new("-----BEGIN CERTIFICATE-----\n-----END CERTIFICATE-----\n".to_string()),
        }
    }
}
