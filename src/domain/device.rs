use crate::domain::{PollingDataset, RegisteredDeviceRecord};
use serde::{Deserialize, Serialize};

pub const MANUFACTURER: &str = "PiKVM";

/// Hostname a device reports until its owner renames it.
pub const DEFAULT_HOSTNAME: &str = "localhost.localdomain";

/// What a successful probe learns about a device. The serial is the only identity key.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub serial: String,
    pub model: Option<String>,
    pub display_name: Option<String>,
}

impl DeviceIdentity {
    /// The title used for a new registration, replacing the factory hostname with the manufacturer name.
    pub fn title(&self) -> String {
        match self.display_name.as_deref() {
            Some(name) if !name.is_empty() && name != DEFAULT_HOSTNAME => name.to_string(),
            _ => MANUFACTURER.to_string(),
        }
    }
}

#[derive(PartialEq, Debug, Serialize)]
pub struct DeviceInfo {
    pub serial: String,
    pub manufacturer: String,
    pub name: String,
    pub model: Option<String>,
    pub hw_version: Option<String>,
    pub sw_version: Option<String>,
    pub configuration_url: String,
}

impl DeviceInfo {
    pub fn new(record: &RegisteredDeviceRecord, dataset: Option<&PollingDataset>) -> Self {
        let text = |path: &[&str]| dataset.and_then(|dataset| dataset.get_str(path)).map(str::to_string);

        DeviceInfo {
            serial: record.identity.serial.clone(),
            manufacturer: MANUFACTURER.to_string(),
            name: record.title.clone(),
            model: text(&["hw", "platform", "model"])
                .or_else(|| text(&["hw", "platform", "type"]))
                .or_else(|| record.identity.model.clone()),
            hw_version: text(&["hw", "platform", "base"]),
            sw_version: text(&["system", "kvmd", "version"]),
            configuration_url: record.connection.base_url.clone(),
        }
    }
}
