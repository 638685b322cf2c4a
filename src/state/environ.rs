use std::collections::BTreeMap;

use serde_json::Value;

use crate::Settings;
use crate::WatcherError;
use crate::WatcherResult;

/// Environment configuration parsed from the `"e"` settings document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvironConfig {
    pub name: String,
    pub provider_type: String,

    /// Every attribute of the settings document, `name` and `type` included
    pub attrs: BTreeMap<String, Value>,
}

impl EnvironConfig {
    /// Builds a configuration from raw settings. `name` and `type` must be
    /// non-empty strings.
    pub fn from_settings(settings: &Settings) -> WatcherResult<Self> {
        let name = required_str(&settings.values, "name")?;
        let provider_type = required_str(&settings.values, "type")?;
        Ok(Self {
            name,
            provider_type,
            attrs: settings.values.clone(),
        })
    }

    pub fn get(
        &self,
        attr: &str,
    ) -> Option<&Value> {
        self.attrs.get(attr)
    }
}

fn required_str(
    values: &BTreeMap<String, Value>,
    attr: &str,
) -> WatcherResult<String> {
    match values.get(attr) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::String(_)) => Err(WatcherError::InvalidEnvironConfig(format!("{attr} is empty"))),
        Some(other) => Err(WatcherError::InvalidEnvironConfig(format!(
            "{attr} must be a string, got {other}"
        ))),
        None => Err(WatcherError::InvalidEnvironConfig(format!("{attr} is missing"))),
    }
}
