use crate::domain::{MSD_KEY, PollingDataset, get_nested};
use serde::Serialize;
use serde_json::{Map, Value};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Up to this many images are listed by name on the storage sensor.
const MAX_LISTED_IMAGES: usize = 20;

#[derive(Clone, Copy, PartialEq, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Measurement,
    Diagnostic,
}

/// How a metric reads its state and attributes from the dataset.
#[derive(Clone, Copy, PartialEq, Debug)]
enum Extraction {
    /// The value at the path, with the object at the path as attributes when `with_attributes`.
    Field { with_attributes: bool },
    Memory,
    FanSpeed,
    Throttling,
    Storage,
}

#[derive(Clone, Copy, Debug)]
pub struct Metric {
    pub key: &'static str,
    pub label: &'static str,
    pub icon: &'static str,
    pub category: Category,
    unit: Option<&'static str>,
    path: &'static [&'static str],
    extraction: Extraction,
}

pub const METRICS: &[Metric] = &[
    Metric {
        key: "cpu_utilization",
        label: "CPU Utilization",
        icon: "mdi:cpu-64-bit",
        category: Category::Measurement,
        unit: Some("%"),
        path: &["hw", "health", "cpu", "percent"],
        extraction: Extraction::Field { with_attributes: false },
    },
    Metric {
        key: "memory_utilization",
        label: "Memory Utilization",
        icon: "mdi:memory",
        category: Category::Measurement,
        unit: Some("%"),
        path: &["hw", "health", "mem", "percent"],
        extraction: Extraction::Memory,
    },
    Metric {
        key: "cpu_temp",
        label: "CPU Temperature",
        icon: "mdi:thermometer",
        category: Category::Measurement,
        unit: Some("°C"),
        path: &["hw", "health", "temp", "cpu"],
        extraction: Extraction::Field { with_attributes: false },
    },
    Metric {
        key: "fan_speed",
        label: "Fan Speed",
        icon: "mdi:fan",
        category: Category::Measurement,
        unit: None,
        path: &["fan", "state"],
        extraction: Extraction::FanSpeed,
    },
    Metric {
        key: "throttling",
        label: "Throttling",
        icon: "mdi:alert",
        category: Category::Measurement,
        unit: None,
        path: &["hw", "health", "throttling"],
        extraction: Extraction::Throttling,
    },
    Metric {
        key: "msd_enabled",
        label: "MSD Enabled",
        icon: "mdi:check-circle",
        category: Category::Diagnostic,
        unit: None,
        path: &[MSD_KEY, "enabled"],
        extraction: Extraction::Field { with_attributes: false },
    },
    Metric {
        key: "msd_drive",
        label: "MSD Drive",
        icon: "mdi:usb",
        category: Category::Measurement,
        unit: None,
        path: &[MSD_KEY, "drive", "connected"],
        extraction: Extraction::Field { with_attributes: true },
    },
    Metric {
        key: "msd_storage",
        label: "MSD Storage",
        icon: "mdi:database",
        category: Category::Measurement,
        unit: Some("%"),
        path: &[MSD_KEY, "storage"],
        extraction: Extraction::Storage,
    },
];

impl Metric {
    pub fn unit(&self, dataset: &PollingDataset) -> Option<&'static str> {
        match self.extraction {
            Extraction::FanSpeed if hall_available(dataset) => Some("RPM"),
            Extraction::FanSpeed => Some("%"),
            _ => self.unit,
        }
    }

    pub fn state(&self, dataset: &PollingDataset) -> Option<Value> {
        match self.extraction {
            Extraction::Field { .. } | Extraction::Memory => dataset.get(self.path).cloned(),
            Extraction::FanSpeed => {
                let fan_state = dataset.get(self.path)?;
                let path: &[&str] = if hall_available(dataset) { &["hall", "rpm"] } else { &["fan", "speed"] };
                get_nested(fan_state, path).cloned()
            }
            Extraction::Throttling => Some(dataset.get(&["hw", "health", "throttling", "raw_flags"]).cloned().unwrap_or(Value::from(0))),
            Extraction::Storage => storage_percent_free(dataset.get(self.path)?).map(Value::from),
        }
    }

    pub fn attributes(&self, dataset: &PollingDataset) -> Map<String, Value> {
        let mut attributes = Map::new();
        match self.extraction {
            Extraction::Field { with_attributes: false } => {}
            Extraction::Field { with_attributes: true } => {
                let (parent, _) = self.path.split_at(self.path.len() - 1);
                if let Some(object) = dataset.get_object(parent) {
                    attributes.extend(object.clone());
                }
            }
            Extraction::Memory => {
                for (name, key) in [("available MB", "available"), ("total MB", "total")] {
                    if let Some(bytes) = dataset.get_f64(&["hw", "health", "mem", key]) {
                        attributes.insert(name.to_string(), Value::from(bytes / BYTES_PER_MB));
                    }
                }
            }
            Extraction::FanSpeed => {
                if let Some(fan_state) = dataset.get_object(self.path) {
                    attributes.extend(fan_state.clone());
                }
            }
            Extraction::Throttling => {
                if let Some(throttling) = dataset.get_object(self.path) {
                    flatten_throttling(throttling, &mut attributes);
                }
            }
            Extraction::Storage => {
                if let Some(storage) = dataset.get(self.path) {
                    storage_attributes(storage, &mut attributes);
                }
            }
        }
        attributes
    }
}

fn hall_available(dataset: &PollingDataset) -> bool {
    dataset.get_bool(&["fan", "state", "hall", "available"]).unwrap_or(false)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn storage_percent_free(storage: &Value) -> Option<f64> {
    let size = storage.get("size").and_then(Value::as_f64)?;
    let free = storage.get("free").and_then(Value::as_f64)?;
    if size <= 0.0 {
        return None;
    }
    Some(round2(free / size * 100.0))
}

fn storage_attributes(storage: &Value, attributes: &mut Map<String, Value>) {
    let size = storage.get("size").and_then(Value::as_f64);
    let free = storage.get("free").and_then(Value::as_f64);

    if let Some(size) = size {
        attributes.insert("total_size_mb".to_string(), Value::from(round2(size / BYTES_PER_MB)));
    }
    if let Some(free) = free {
        attributes.insert("free_size_mb".to_string(), Value::from(round2(free / BYTES_PER_MB)));
    }
    if let (Some(size), Some(free)) = (size, free) {
        attributes.insert("used_size_mb".to_string(), Value::from(round2((size - free) / BYTES_PER_MB)));
    }
    if let Some(percent) = storage_percent_free(storage) {
        attributes.insert("percent_free".to_string(), Value::from(percent));
    }

    let Some(images) = storage.get("images").and_then(Value::as_object).filter(|images| !images.is_empty()) else {
        return;
    };
    if images.len() < MAX_LISTED_IMAGES {
        for (image, details) in images {
            if let Some(size) = details.get("size").filter(|size| !size.is_null()) {
                attributes.insert(image.clone(), size.clone());
            }
        }
    } else {
        attributes.insert("file count".to_string(), Value::from(images.len()));
    }
}

/// Flattens `{"parsed_flags": {"throttled": {"now": false}}}` to `{"throttled.now": false}`.
fn flatten_throttling(throttling: &Map<String, Value>, attributes: &mut Map<String, Value>) {
    for (key, value) in throttling {
        let Value::Object(children) = value else {
            attributes.insert(key.clone(), value.clone());
            continue;
        };
        for (sub_key, sub_value) in children {
            match sub_value {
                Value::Object(grandchildren) => {
                    for (leaf_key, leaf_value) in grandchildren {
                        attributes.insert(format!("{}.{}", sub_key, leaf_key), leaf_value.clone());
                    }
                }
                _ => {
                    attributes.insert(format!("{}.{}", key, sub_key), sub_value.clone());
                }
            }
        }
    }
}

pub fn extra_icon(name: &str) -> &'static str {
    match name {
        "ipmi" => "mdi:network",
        "janus" | "janus_static" => "mdi:web",
        "vnc" => "mdi:monitor",
        "webterm" => "mdi:console",
        _ => "mdi:information",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    fn metric(key: &str) -> &'static Metric {
        match METRICS.iter().find(|metric| metric.key == key) {
            Some(metric) => metric,
            None => panic!("no metric '{}'", key),
        }
    }

    #[rstest]
    #[case(json!({"fan": {"state": {"hall": {"available": true, "rpm": 2210}, "fan": {"speed": 38}}}}), Some("RPM"), Some(json!(2210)))]
    #[case(json!({"fan": {"state": {"hall": {"available": false, "rpm": 0}, "fan": {"speed": 38}}}}), Some("%"), Some(json!(38)))]
    #[case(json!({"fan": {"state": {"fan": {"speed": 38}}}}), Some("%"), Some(json!(38)))]
    #[case(json!({"fan": null}), Some("%"), None)]
    fn fan_speed_follows_the_hall_sensor(#[case] data: Value, #[case] unit: Option<&str>, #[case] state: Option<Value>) {
        let dataset = PollingDataset::from_value(data);
        let fan = metric("fan_speed");

        assert_eq!(fan.unit(&dataset), unit);
        assert_eq!(fan.state(&dataset), state);
    }

    #[rstest]
    #[case(json!({"storage": {"size": 200, "free": 50}}), Some(25.0))]
    #[case(json!({"storage": {"size": 3, "free": 1}}), Some(33.33))]
    #[case(json!({"storage": {"size": 0, "free": 0}}), None)]
    #[case(json!({"storage": {"free": 50}}), None)]
    #[case(json!({"enabled": false}), None)]
    fn storage_state_is_the_percentage_free(#[case] msd: Value, #[case] expected: Option<f64>) {
        let dataset = PollingDataset::from_value(json!({ "msd": msd }));

        assert_eq!(metric("msd_storage").state(&dataset), expected.map(Value::from));
    }

    #[test]
    fn storage_counts_images_when_there_are_many() {
        let images: Map<String, Value> = (0..25).map(|i| (format!("image-{}.iso", i), json!({"size": i}))).collect();
        let dataset = PollingDataset::from_value(json!({"msd": {"storage": {"size": 100, "free": 10, "images": images}}}));

        let attributes = metric("msd_storage").attributes(&dataset);

        assert_eq!(attributes.get("file count"), Some(&json!(25)));
        assert_eq!(attributes.get("image-1.iso"), None);
    }

    #[test]
    fn throttling_defaults_to_zero_and_flattens_flags() {
        let throttling = metric("throttling");
        let empty = PollingDataset::from_value(json!({"hw": {"health": {"cpu": {"percent": 1}}}}));
        let dataset = PollingDataset::from_value(json!({"hw": {"health": {"throttling": {
            "raw_flags": 4,
            "ignore_past": false,
            "parsed_flags": {"undervoltage": {"now": true, "past": false}},
            "limits": {"max": 9}
        }}}}));

        assert_eq!(throttling.state(&empty), Some(json!(0)));
        assert_eq!(
            Value::Object(throttling.attributes(&dataset)),
            json!({
                "raw_flags": 4,
                "ignore_past": false,
                "undervoltage.now": true,
                "undervoltage.past": false,
                "limits.max": 9
            })
        );
    }

    #[test]
    fn drive_attributes_are_the_drive_object() {
        let dataset = PollingDataset::from_value(json!({"msd": {"drive": {"connected": true, "cdrom": false, "image": null}}}));
        let drive = metric("msd_drive");

        assert_eq!(drive.state(&dataset), Some(json!(true)));
        assert_eq!(Value::Object(drive.attributes(&dataset)), json!({"connected": true, "cdrom": false, "image": null}));
    }

    #[test]
    fn memory_attributes_are_in_megabytes() {
        let dataset = PollingDataset::from_value(json!({"hw": {"health": {"mem": {"percent": 50, "available": 1048576, "total": 2097152}}}}));

        let attributes = metric("memory_utilization").attributes(&dataset);

        assert_eq!(Value::Object(attributes), json!({"available MB": 1.0, "total MB": 2.0}));
    }

    #[rstest]
    #[case("ipmi", "mdi:network")]
    #[case("janus_static", "mdi:web")]
    #[case("webterm", "mdi:console")]
    #[case("gpio", "mdi:information")]
    fn extras_have_an_icon_by_name(#[case] name: &str, #[case] expected: &str) {
        assert_eq!(extra_icon(name), expected);
    }
}
