/// Effect settings and merge rules
///
/// An effect override is keyed by name and carries one of three values:
/// enabled with no parameters, enabled with an opaque parameter record, or
/// force-disabled. Force-disabled is a real value during merging (it
/// overwrites whatever it overlays) and is only stripped from the final
/// resolved set.
use std::collections::HashMap;

use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};

/// A single effect override as understood by the mixing layer.
///
/// Serializes to the compact record form used in configuration files:
/// `true` (enabled), `false` (force-disabled), or a parameter object.
#[derive(Debug, Clone, PartialEq)]
pub enum EffectSetting {
    /// Enabled with the effect's default parameters.
    Enabled,
    /// Enabled with an opaque parameter record, passed through to the source.
    Params(serde_json::Value),
    /// Force-disabled; overrides any inherited enabled setting of the same name.
    Disabled,
}

impl EffectSetting {
    /// Check whether this setting is an explicit disable.
    pub fn is_disabled(&self) -> bool {
        matches!(self, EffectSetting::Disabled)
    }

    /// Get the parameter record, if any.
    pub fn params(&self) -> Option<&serde_json::Value> {
        match self {
            EffectSetting::Params(value) => Some(value),
            _ => None,
        }
    }
}

impl From<bool> for EffectSetting {
    fn from(enabled: bool) -> Self {
        if enabled {
            EffectSetting::Enabled
        } else {
            EffectSetting::Disabled
        }
    }
}

impl From<serde_json::Value> for EffectSetting {
    fn from(params: serde_json::Value) -> Self {
        EffectSetting::Params(params)
    }
}

impl Serialize for EffectSetting {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            EffectSetting::Enabled => serializer.serialize_bool(true),
            EffectSetting::Disabled => serializer.serialize_bool(false),
            EffectSetting::Params(value) => value.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for EffectSetting {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(match value {
            serde_json::Value::Bool(true) => EffectSetting::Enabled,
            serde_json::Value::Bool(false) => EffectSetting::Disabled,
            other => EffectSetting::Params(other),
        })
    }
}

/// Mapping from effect name to its setting.
pub type EffectMap = HashMap<String, EffectSetting>;

/// Overlay `layer` onto `base`; entries in `layer` win.
pub(crate) fn overlay(base: &mut EffectMap, layer: &EffectMap) {
    for (name, setting) in layer {
        base.insert(name.clone(), setting.clone());
    }
}

/// Drop force-disabled entries from a fully merged map.
pub(crate) fn strip_disabled(map: &mut EffectMap) {
    map.retain(|_, setting| !setting.is_disabled());
}
