//! Read-only sensors projected from the latest polling snapshot.

mod metric;

use crate::domain::{DEFAULT_HOSTNAME, PollingDataset, RegisteredDeviceRecord};
use crate::polling::Snapshot;
use serde::Serialize;
use serde_json::{Map, Value};

pub use metric::{Category, METRICS, Metric, extra_icon};

const DEFAULT_SENSOR_PREFIX: &str = "pikvm";

#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct SensorReading {
    pub unique_id: String,
    pub name: String,
    pub unit: Option<&'static str>,
    pub icon: &'static str,
    pub category: Category,
    pub available: bool,
    pub state: Option<Value>,
    pub attributes: Map<String, Value>,
}

/// `{entry_id}_{serial}`, with the serial the device reports.
pub fn unique_id_base(record: &RegisteredDeviceRecord, dataset: &PollingDataset) -> String {
    format!("{}_{}", record.entry_id, dataset.serial().unwrap_or("unknown"))
}

/// The prefix of every sensor name, derived from the device hostname.
pub fn sensor_prefix(dataset: &PollingDataset) -> String {
    match dataset.host() {
        Some(DEFAULT_HOSTNAME) | None => DEFAULT_SENSOR_PREFIX.to_string(),
        Some(host) => host.replace('.', "_"),
    }
}

/// One reading per metric plus one per extra. Sensors exist once a dataset has been received and
/// are available only while the last cycle was fresh.
pub fn sensor_readings(record: &RegisteredDeviceRecord, snapshot: &Snapshot) -> Vec<SensorReading> {
    let Some(dataset) = snapshot.dataset.as_deref() else {
        return Vec::new();
    };

    let base = unique_id_base(record, dataset);
    let prefix = sensor_prefix(dataset);
    let ip = Value::from(record.connection.base_url.as_str());

    let reading = |key: &str, name: String, unit, icon, category, state: Option<Value>, mut attributes: Map<String, Value>| {
        attributes.insert("ip".to_string(), ip.clone());
        SensorReading {
            unique_id: format!("{}_{}", base, key),
            name,
            unit,
            icon,
            category,
            available: snapshot.is_fresh() && state.is_some(),
            state,
            attributes,
        }
    };

    let metrics = METRICS.iter().map(|metric| {
        reading(
            metric.key,
            format!("{} {}", prefix, metric.label),
            metric.unit(dataset),
            metric.icon,
            metric.category,
            metric.state(dataset),
            metric.attributes(dataset),
        )
    });

    let extras = dataset.extras().into_iter().flatten().map(|(name, extra)| {
        reading(
            &format!("extra_{}", name),
            format!("{} {}", prefix, capitalize(name)),
            None,
            extra_icon(name),
            Category::Diagnostic,
            extra.get("enabled").filter(|enabled| !enabled.is_null()).cloned(),
            extra.as_object().cloned().unwrap_or_default(),
        )
    });

    metrics.chain(extras).collect()
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
