//! Layered dynamic configuration injected into command environments.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Keys with this prefix are reserved for the controller itself and are
/// rejected on write.
pub const RESERVED_CONFIG_PREFIX: &str = "GORT_";

/// The scope a dynamic configuration applies to. Layers merge in
/// declaration order, later layers overriding earlier ones.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ConfigLayer {
    Bundle,
    Room,
    Group,
    User,
}

impl ConfigLayer {
    /// Injection order: bundle-wide values first, user values last.
    pub const MERGE_ORDER: [ConfigLayer; 4] = [
        ConfigLayer::Bundle,
        ConfigLayer::Room,
        ConfigLayer::Group,
        ConfigLayer::User,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bundle => "bundle",
            Self::Room => "room",
            Self::Group => "group",
            Self::User => "user",
        }
    }
}

impl fmt::Display for ConfigLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigLayer {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bundle" => Ok(Self::Bundle),
            "room" => Ok(Self::Room),
            "group" => Ok(Self::Group),
            "user" => Ok(Self::User),
            other => Err(Error::Unmarshal(format!("unknown config layer {other}"))),
        }
    }
}

/// One layered key-value pair.
///
/// For the bundle layer `owner` is the empty string; for every other
/// layer it names the room, group or user the value is scoped to.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DynamicConfiguration {
    pub layer: ConfigLayer,
    pub bundle: String,
    #[serde(default)]
    pub owner: String,
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub secret: bool,
}

impl DynamicConfiguration {
    /// Validation shared by both persistence backends.
    pub fn validate(&self) -> Result<(), Error> {
        if self.bundle.is_empty() {
            return Err(Error::EmptyValue("config bundle"));
        }
        if self.key.is_empty() {
            return Err(Error::EmptyValue("config key"));
        }
        if self.key.to_ascii_uppercase().starts_with(RESERVED_CONFIG_PREFIX) {
            return Err(Error::ReservedConfigKey(RESERVED_CONFIG_PREFIX.into()));
        }
        if self.layer != ConfigLayer::Bundle && self.owner.is_empty() {
            return Err(Error::EmptyValue("config owner"));
        }
        Ok(())
    }

    /// A copy safe for response surfaces: secret values are masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.secret {
            copy.value = "<secret>".into();
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(layer: ConfigLayer, owner: &str, key: &str) -> DynamicConfiguration {
        DynamicConfiguration {
            layer,
            bundle: "echo".into(),
            owner: owner.into(),
            key: key.into(),
            value: "v".into(),
            secret: false,
        }
    }

    #[test]
    fn reserved_prefix_is_rejected_case_insensitively() {
        for key in ["GORT_TOKEN", "gort_token"] {
            let err = config(ConfigLayer::Bundle, "", key).validate().unwrap_err();
            assert!(matches!(err, Error::ReservedConfigKey(_)), "{key}");
        }
    }

    #[test]
    fn bundle_layer_allows_empty_owner() {
        assert!(config(ConfigLayer::Bundle, "", "k").validate().is_ok());
        assert!(config(ConfigLayer::User, "", "k").validate().is_err());
        assert!(config(ConfigLayer::User, "jsmith", "k").validate().is_ok());
    }

    #[test]
    fn secrets_are_masked_on_redaction() {
        let mut c = config(ConfigLayer::Bundle, "", "k");
        c.secret = true;
        c.value = "hunter2".into();
        assert_eq!(c.redacted().value, "<secret>");
    }

    #[test]
    fn layer_round_trips_through_strings() {
        for layer in ConfigLayer::MERGE_ORDER {
            assert_eq!(layer.as_str().parse::<ConfigLayer>().unwrap(), layer);
        }
    }
}
