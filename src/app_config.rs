use crate::setup::FormValues;
use config::{Config, ConfigError};
use serde::Deserialize;
use std::time::Duration;

const MIN_POLLING_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    logging: Logging,
    #[serde(default)]
    polling: Polling,
    #[serde(default)]
    certificate: Certificate,
    #[serde(default)]
    devices: Vec<Device>,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(config::File::with_name("config").required(true))
            .add_source(config::File::with_name("config_local").required(false))
            .add_source(config::Environment::with_prefix("KVMLINK").separator("__"))
            .build()?
            .try_deserialize()
    }

    pub fn logging(&self) -> &Logging {
        &self.logging
    }

    pub fn polling(&self) -> &Polling {
        &self.polling
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Logging {
    level: String,
}

impl Logging {
    pub fn level(&self) -> tracing::Level {
        self.level.parse().unwrap_or(tracing::Level::INFO)
    }
}

impl Default for Logging {
    fn default() -> Self {
        Logging { level: "info".to_string() }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Polling {
    #[serde(with = "humantime_serde")]
    interval: Duration,
    #[serde(with = "humantime_serde")]
    request_timeout: Duration,
    max_attempts: usize,
    #[serde(with = "humantime_serde")]
    initial_backoff: Duration,
}

impl Polling {
    pub fn new(interval: Duration, request_timeout: Duration, max_attempts: usize, initial_backoff: Duration) -> Self {
        Polling {
            interval: interval.max(MIN_POLLING_INTERVAL),
            request_timeout,
            max_attempts: max_attempts.max(1),
            initial_backoff,
        }
    }

    /// Never zero; a configured `0s` polls as often as the device answers.
    pub fn interval(&self) -> Duration {
        self.interval.max(MIN_POLLING_INTERVAL)
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts.max(1)
    }

    pub fn initial_backoff(&self) -> Duration {
        self.initial_backoff
    }
}

impl Default for Polling {
    fn default() -> Self {
        Polling::new(Duration::from_secs(30), Duration::from_secs(5), 3, Duration::from_secs(1))
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Certificate {
    #[serde(with = "humantime_serde")]
    fetch_timeout: Duration,
}

impl Certificate {
    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }
}

impl Default for Certificate {
    fn default() -> Self {
        Certificate {
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

/// A device entered through the configuration file instead of the interactive form.
#[derive(Debug, Deserialize)]
pub struct Device {
    host: String,
    username: Option<String>,
    password: Option<String>,
    totp: Option<String>,
}

impl Device {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn form_values(&self) -> FormValues {
        let defaults = FormValues::default();
        FormValues {
            host: self.host.clone(),
            username: self.username.clone().unwrap_or(defaults.username),
            password: self.password.clone().unwrap_or(defaults.password),
            totp: self.totp.clone().unwrap_or_default(),
        }
    }
}

#[cfg(test)]
pub struct AppConfigBuilder {
    config: AppConfig,
}

#[cfg(test)]
impl AppConfigBuilder {
    pub fn new() -> Self {
        AppConfigBuilder {
            config: AppConfig {
                logging: Logging::default(),
                polling: Polling::new(Duration::from_secs(30), Duration::from_secs(5), 3, Duration::from_millis(1)),
                certificate: Certificate {
                    fetch_timeout: Duration::from_secs(1),
                },
                devices: Vec::new(),
            },
        }
    }

    pub fn device(mut self, host: &str, password: Option<&str>) -> Self {
        self.config.devices.push(Device {
            host: host.to_string(),
            username: None,
            password: password.map(str::to_string),
            totp: None,
        });
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;
    use pretty_assertions::assert_eq;

    #[test]
    fn deserializes_polling_durations() -> Result<(), ConfigError> {
        let toml = r#"
            [polling]
            interval = "45s"
            request_timeout = "8s"
            max_attempts = 5
            initial_backoff = "2s"

            [[devices]]
            host = "pikvm.local"
            password = "secret"
        "#;

        let config: AppConfig = Config::builder()
            .add_source(config::File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;

        assert_eq!(config.polling().interval(), Duration::from_secs(45));
        assert_eq!(config.polling().request_timeout(), Duration::from_secs(8));
        assert_eq!(config.polling().max_attempts(), 5);
        assert_eq!(config.polling().initial_backoff(), Duration::from_secs(2));
        assert_eq!(config.certificate().fetch_timeout(), Duration::from_secs(10));
        assert_eq!(config.devices().len(), 1);
        Ok(())
    }

    #[test]
    fn device_form_values_fall_back_to_default_credentials() {
        let config = AppConfigBuilder::new().device("10.0.0.5", None).build();

        let values = config.devices()[0].form_values();

        assert_eq!(values.host, "10.0.0.5");
        assert_eq!(values.username, "admin");
        assert_eq!(values.password, "admin");
        assert_eq!(values.totp, "");
    }

    #[test]
    fn zero_interval_is_raised_to_the_minimum() -> Result<(), ConfigError> {
        let config: AppConfig = Config::builder()
            .add_source(config::File::from_str("[polling]\ninterval = \"0s\"", FileFormat::Toml))
            .build()?
            .try_deserialize()?;

        assert_eq!(config.polling().interval(), MIN_POLLING_INTERVAL);
        assert_eq!(Polling::new(Duration::ZERO, Duration::from_secs(5), 3, Duration::from_secs(1)).interval(), MIN_POLLING_INTERVAL);
        Ok(())
    }

    #[test]
    fn max_attempts_is_never_zero() {
        let polling = Polling::new(Duration::from_secs(30), Duration::from_secs(5), 0, Duration::from_secs(1));

        assert_eq!(polling.max_attempts(), 1);
    }
}
