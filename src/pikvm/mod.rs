mod client;
mod connector;
mod domain;
mod prober;
mod url;

pub use client::{ApiError, DeviceApi, PikvmClient, Resource};
pub use connector::{ApiConnector, PinnedConnector};
pub use prober::{DeviceProber, PikvmProber, ProbeError, ProbeResult, probe, probe_with};
pub use url::normalize_url;
