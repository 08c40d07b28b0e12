use crate::domain::{DeviceInfo, RegisteredDeviceRecord};
use crate::polling::{PollStatus, Snapshot};
use serde_json::{Value, json};
use std::time::Duration;

const MASK: &str = "******";

/// A support dump of one registration. Secrets are masked and the pinned certificate is left out.
pub fn diagnostics(record: &RegisteredDeviceRecord, snapshot: &Snapshot, interval: Duration) -> Value {
    let dataset = snapshot.dataset.as_deref();
    let (status, error) = match &snapshot.status {
        PollStatus::Pending => ("pending", None),
        PollStatus::Fresh => ("fresh", None),
        PollStatus::Stale => ("stale", None),
        PollStatus::Failed(e) => ("failed", Some(e.to_string())),
    };

    let document = json!({
        "entry": {
            "entry_id": record.entry_id.to_string(),
            "title": record.title,
            "serial": record.identity.serial,
            "model": record.identity.model,
            "connection": serde_json::to_value(&record.connection).unwrap_or_default(),
        },
        "device_info": serde_json::to_value(DeviceInfo::new(record, dataset)).unwrap_or_default(),
        "coordinator": {
            "last_update_success": snapshot.is_fresh(),
            "status": status,
            "error": error,
            "update_interval": format!("{:?}", interval),
            "last_success": snapshot.last_success.map(|time| time.to_rfc3339()),
        },
        "data": dataset.map(|dataset| Value::Object(dataset.as_map().clone())),
    });

    mask_secrets(document)
}

/// Replaces the value of every key that mentions a password or TOTP seed, at any depth.
fn mask_secrets(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| {
                    let lowercase = key.to_lowercase();
                    if lowercase.contains("password") || lowercase.contains("totp") {
                        (key, Value::from(MASK))
                    } else {
                        (key, mask_secrets(value))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(mask_secrets).collect()),
        other => other,
    }
}
