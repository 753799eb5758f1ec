use std::collections::BTreeMap;
use std::path::Path;

use lifespan::StdError;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// Application configuration.
///
/// A JSON object whose top-level keys are section names. Sections are kept
/// as raw JSON and only deserialized when a component asks for them, so
/// every component owns the shape of its own section.
#[derive(Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(flatten)]
    pub(crate) sections: BTreeMap<String, serde_json::Value>,
}

/// Configuration struct stored under a fixed section name.
pub trait ConfigSection: DeserializeOwned {
    fn key() -> &'static str;
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deserializes the section `name`. A missing section reads as `null`,
    /// so `Option<T>` can be used for optional sections.
    pub fn get<T>(&self, name: impl AsRef<str>) -> Result<T, StdError>
    where
        T: DeserializeOwned,
    {
        let value = self
            .sections
            .get(name.as_ref())
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        serde_json::from_value(value)
            .map_err(|err| format!("Invalid config section {:?}: {err}", name.as_ref()).into())
    }

    /// Deserializes the section named by `T::key()`, falling back to
    /// `T::default()` when the section is absent.
    pub fn section<T>(&self) -> Result<T, StdError>
    where
        T: ConfigSection + Default,
    {
        Ok(self.get::<Option<T>>(T::key())?.unwrap_or_default())
    }

    pub fn has_section(&self, name: impl AsRef<str>) -> bool {
        self.sections.contains_key(name.as_ref())
    }

    pub fn set<T>(&mut self, name: impl Into<String>, value: T) -> Result<(), StdError>
    where
        T: Serialize,
    {
        self.sections
            .insert(name.into(), serde_json::to_value(value)?);
        Ok(())
    }

    /// Builder-style [`Config::set`].
    ///
    /// # Panics
    ///
    /// Panics if `value` cannot be represented as JSON.
    pub fn with<T>(mut self, name: impl Into<String>, value: T) -> Self
    where
        T: Serialize,
    {
        let name = name.into();
        match serde_json::to_value(value) {
            Ok(value) => {
                self.sections.insert(name, value);
            }
            Err(err) => panic!("Cannot serialize config section {name:?}: {err}"),
        }
        self
    }

    /// Merges `other` into `self`. Objects are merged key by key, arrays
    /// are concatenated and any other value is replaced.
    pub fn merge_from(&mut self, other: Self) {
        for (key, value) in other.sections {
            merge_json_from(self.sections.entry(key).or_default(), value);
        }
    }

    pub fn parse(text: impl AsRef<str>) -> Result<Self, StdError> {
        Ok(serde_json::from_str(text.as_ref())?)
    }

    pub async fn parse_file(path: impl AsRef<Path>) -> Result<Self, StdError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|err| format!("Cannot read config {}: {err}", path.display()))?;
        Self::parse(text)
    }

    pub fn to_json_pretty(&self) -> Result<String, StdError> {
        Ok(serde_json::to_string_pretty(&self.sections)?)
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }
}

fn merge_json_from(lhs: &mut serde_json::Value, rhs: serde_json::Value) {
    match (lhs, rhs) {
        (serde_json::Value::Object(l), serde_json::Value::Object(r)) => {
            for (key, value) in r {
                merge_json_from(l.entry(key).or_insert(serde_json::Value::Null), value);
            }
        }
        (serde_json::Value::Array(l), serde_json::Value::Array(r)) => l.extend(r),
        (lhs, rhs) => *lhs = rhs,
    }
}
