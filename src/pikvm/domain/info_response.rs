use serde::Deserialize;

// The identity-relevant subset of GET /api/info; everything else is read through the dataset.
#[derive(Debug, Deserialize)]
pub struct InfoResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub result: InfoResult,
}

#[derive(Debug, Default, Deserialize)]
pub struct InfoResult {
    #[serde(default)]
    pub hw: Hardware,
    #[serde(default)]
    pub meta: Meta,
}

#[derive(Debug, Default, Deserialize)]
pub struct Hardware {
    #[serde(default)]
    pub platform: Platform,
}

#[derive(Debug, Default, Deserialize)]
pub struct Platform {
    pub serial: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub server: Server,
}

#[derive(Debug, Default, Deserialize)]
pub struct Server {
    pub host: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_a_full_info_response() -> Result<(), serde_json::Error> {
        let response: InfoResponse = serde_json::from_str(include_str!("../../../tests/resources/pikvm_info_response.json"))?;

        assert!(response.ok);
        assert_eq!(response.result.hw.platform.serial.as_deref(), Some("000000003b4c1d23"));
        assert_eq!(response.result.hw.platform.model.as_deref(), Some("v3"));
        assert_eq!(response.result.meta.server.host.as_deref(), Some("pikvm-office"));
        Ok(())
    }

    #[test]
    fn missing_sections_default_to_empty() -> Result<(), serde_json::Error> {
        let response: InfoResponse = serde_json::from_str(r#"{"ok": true, "result": {}}"#)?;

        assert_eq!(response.result.hw.platform.serial, None);
        assert_eq!(response.result.meta.server.host, None);
        Ok(())
    }
}
