use std::collections::{BTreeMap, HashMap};
use std::fmt;

pub const DEFAULT_USERNAME: &str = "admin";
pub const DEFAULT_PASSWORD: &str = "admin";

/// Error slot for failures that are not tied to a single field.
pub const BASE: &str = "base";

#[derive(Clone, PartialEq)]
pub struct FormValues {
    pub host: String,
    pub username: String,
    pub password: String,
    pub totp: String,
}

impl Default for FormValues {
    fn default() -> Self {
        FormValues {
            host: String::new(),
            username: DEFAULT_USERNAME.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
            totp: String::new(),
        }
    }
}

impl fmt::Debug for FormValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormValues")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"******")
            .field("totp", &"******")
            .finish()
    }
}

#[derive(Clone, Default, PartialEq, Debug)]
pub struct FormErrors(BTreeMap<String, String>);

impl FormErrors {
    pub fn base(code: impl Into<String>) -> Self {
        FormErrors(BTreeMap::from([(BASE.to_string(), code.into())]))
    }

    pub fn get(&self, slot: &str) -> Option<&str> {
        self.0.get(slot).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum FormStep {
    User,
    Options,
}

impl FormStep {
    fn translation_prefix(&self) -> &'static str {
        match self {
            FormStep::User => "step.user.data",
            FormStep::Options => "config.step.user.data",
        }
    }
}

/// A form to present to the user, pre-filled with `values`.
#[derive(Clone, PartialEq, Debug)]
pub struct Form {
    pub step: FormStep,
    pub values: FormValues,
    pub errors: FormErrors,
    pub placeholders: BTreeMap<&'static str, String>,
}

impl Form {
    pub fn new(step: FormStep, values: FormValues, errors: FormErrors, translator: &dyn Translator) -> Self {
        let prefix = step.translation_prefix();
        let placeholders = [
            ("url", "URL or IP address of the PiKVM device"),
            ("username", "Username for PiKVM"),
            ("password", "Password for PiKVM"),
        ]
        .into_iter()
        .map(|(field, default)| (field, translator.lookup(&format!("{}.{}", prefix, field), default)))
        .collect();

        Form {
            step,
            values,
            errors,
            placeholders,
        }
    }
}

/// Resolves display strings. A lookup never fails: unknown keys resolve to `default`.
pub trait Translator: Send + Sync {
    fn lookup(&self, key: &str, default: &str) -> String;
}

#[derive(Clone, Copy, Default, Debug)]
pub struct NoTranslations;

impl Translator for NoTranslations {
    fn lookup(&self, _key: &str, default: &str) -> String {
        default.to_string()
    }
}

#[derive(Clone, Default, Debug)]
pub struct Translations(HashMap<String, String>);

impl Translations {
    pub fn new(entries: HashMap<String, String>) -> Self {
        Translations(entries)
    }
}

impl Translator for Translations {
    fn lookup(&self, key: &str, default: &str) -> String {
        self.0.get(key).cloned().unwrap_or_else(|| default.to_string())
    }
}
