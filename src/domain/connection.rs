use crate::pikvm::normalize_url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use totp_rs::{Algorithm, Secret, TOTP};

const TOTP_DIGITS: usize = 6;
const TOTP_SKEW: u8 = 1;
const TOTP_STEP_SECONDS: u64 = 30;

/// Everything needed to reach and authenticate against a device.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionParameters {
    pub base_url: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub totp_seed: Option<TotpSeed>,
}

impl ConnectionParameters {
    pub fn new(url: &str, username: &str, password: &str, totp_seed: Option<TotpSeed>) -> Self {
        ConnectionParameters {
            base_url: normalize_url(url),
            username: username.to_string(),
            password: password.to_string(),
            totp_seed,
        }
    }

    /// The credentials for one request. The device expects the one-time code appended to the
    /// password rather than in a separate challenge, so the result changes every TOTP step.
    pub fn basic_auth(&self) -> BasicAuth {
        let password = match &self.totp_seed {
            Some(seed) => format!("{}{}", self.password, seed.current_code()),
            None => self.password.clone(),
        };

        BasicAuth {
            username: self.username.clone(),
            password,
        }
    }
}

#[derive(Clone, PartialEq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth").field("username", &self.username).field("password", &"******").finish()
    }
}

impl fmt::Debug for ConnectionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParameters")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"******")
            .field("totp_seed", &self.totp_seed.as_ref().map(|_| "******"))
            .finish()
    }
}

/// A base32 TOTP seed, validated when parsed.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TotpSeed {
    seed: String,
    totp: TOTP,
}

impl TotpSeed {
    /// Parses a seed as typed by a user: whitespace and padding are ignored and case does not
    /// matter. An empty seed means no second factor is configured.
    pub fn parse(seed: &str) -> Result<Option<Self>, TotpError> {
        let normalized = seed
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '=')
            .collect::<String>()
            .to_ascii_uppercase();
        if normalized.is_empty() {
            return Ok(None);
        }

        let secret = Secret::Encoded(normalized.clone()).to_bytes().map_err(|_| TotpError::InvalidSeed)?;
        if secret.is_empty() {
            return Err(TotpError::InvalidSeed);
        }

        let totp = TOTP::new_unchecked(Algorithm::SHA1, TOTP_DIGITS, TOTP_SKEW, TOTP_STEP_SECONDS, secret);
        Ok(Some(TotpSeed { seed: normalized, totp }))
    }

    pub fn code_at(&self, unix_seconds: u64) -> String {
        self.totp.generate(unix_seconds)
    }

    pub fn current_code(&self) -> String {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default();
        self.code_at(now)
    }
}

impl PartialEq for TotpSeed {
    fn eq(&self, other: &Self) -> bool {
        self.seed == other.seed
    }
}

impl fmt::Debug for TotpSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TotpSeed(******)")
    }
}

impl TryFrom<String> for TotpSeed {
    type Error = TotpError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TotpSeed::parse(&value)?.ok_or(TotpError::EmptySeed)
    }
}

impl From<TotpSeed> for String {
    fn from(value: TotpSeed) -> Self {
        value.seed
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum TotpError {
    #[error("the TOTP seed is not valid base32")]
    InvalidSeed,
    #[error("the TOTP seed is empty")]
    EmptySeed,
}
