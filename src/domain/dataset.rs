use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Key under which the mass-storage resource is attached to the info resource.
pub const MSD_KEY: &str = "msd";

/// The merged `info` and `msd` results of one polling cycle. Replaced wholesale on every
/// successful cycle and never mutated afterwards.
#[derive(Clone, Default, PartialEq, Debug, Serialize)]
#[serde(transparent)]
pub struct PollingDataset(Map<String, Value>);

impl PollingDataset {
    /// Merges the response bodies of `/api/info` and `/api/msd`. Both must carry a `result` and the
    /// info result must be an object.
    pub fn from_responses(mut info: Value, mut msd: Value) -> Result<Self, SchemaError> {
        let Value::Object(mut result) = take_result(&mut info, "info")? else {
            return Err(SchemaError::NotAnObject("info.result"));
        };
        let msd_result = take_result(&mut msd, "msd")?;

        result.insert(MSD_KEY.to_string(), msd_result);
        Ok(PollingDataset(result))
    }

    /// Looks up a nested value. Returns `None` when any key on the path is missing, when a step is
    /// not an object, or when the value found is `null` or an empty object.
    pub fn get(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        get_nested(self.0.get(*first)?, rest)
    }

    pub fn get_str(&self, path: &[&str]) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    pub fn get_f64(&self, path: &[&str]) -> Option<f64> {
        self.get(path).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, path: &[&str]) -> Option<bool> {
        self.get(path).and_then(Value::as_bool)
    }

    pub fn get_object(&self, path: &[&str]) -> Option<&Map<String, Value>> {
        self.get(path).and_then(Value::as_object)
    }

    pub fn serial(&self) -> Option<&str> {
        self.get_str(&["hw", "platform", "serial"])
    }

    pub fn host(&self) -> Option<&str> {
        self.get_str(&["meta", "server", "host"])
    }

    pub fn extras(&self) -> Option<&Map<String, Value>> {
        self.get_object(&["extras"])
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

fn take_result(body: &mut Value, resource: &'static str) -> Result<Value, SchemaError> {
    match body.get_mut("result").map(Value::take) {
        Some(Value::Null) | None => Err(SchemaError::MissingResult(resource)),
        Some(result) => Ok(result),
    }
}

/// Walks `path` down from `value`, following the same rules as [`PollingDataset::get`].
pub fn get_nested<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let found = path.iter().try_fold(value, |current, key| current.as_object()?.get(*key))?;
    match found {
        Value::Null => None,
        Value::Object(map) if map.is_empty() => None,
        _ => Some(found),
    }
}

#[derive(Error, Clone, Debug, PartialEq)]
pub enum SchemaError {
    #[error("the {0} response has no 'result'")]
    MissingResult(&'static str),
    #[error("'{0}' is not an object")]
    NotAnObject(&'static str),
}

#[cfg(test)]
impl PollingDataset {
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => PollingDataset(map),
            _ => PollingDataset::default(),
        }
    }
}
