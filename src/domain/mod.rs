mod connection;
mod dataset;
pub mod device;
pub mod events;
mod record;

pub use connection::{BasicAuth, ConnectionParameters, TotpError, TotpSeed};
pub use dataset::{MSD_KEY, PollingDataset, SchemaError, get_nested};
pub use device::{DEFAULT_HOSTNAME, DeviceIdentity, DeviceInfo, MANUFACTURER};
pub use record::{EntryId, PinnedCertificate, RegisteredDeviceRecord};
