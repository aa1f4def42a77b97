//! Command bundles: versioned collections of commands packaged as a
//! container image plus a YAML manifest.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One version of a bundle. `(name, version)` is the primary key; at most
/// one version of a given name is enabled at a time.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Bundle {
    /// Manifest format version. Must be nonzero.
    #[serde(default)]
    pub gort_bundle_version: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub homepage: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub long_description: String,
    /// Container image the bundle's commands run in. May be empty for
    /// bundles whose commands are served by the controller itself.
    #[serde(default)]
    pub image: String,
    /// Permission names this bundle declares (unqualified).
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub commands: HashMap<String, BundleCommand>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub installed_on: Option<DateTime<Utc>>,
    #[serde(default)]
    pub installed_by: String,
}

/// A named entry in a bundle: executable argv prefix, rules and templates.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct BundleCommand {
    /// Filled from the manifest map key on load.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub long_description: String,
    /// Argv prefix the workload is launched with.
    #[serde(default)]
    pub executable: Vec<String>,
    /// Rule expressions evaluated by the authorization engine.
    #[serde(default)]
    pub rules: Vec<String>,
    #[serde(default)]
    pub templates: Templates,
}

/// Output template overrides, passed through to the (external) renderer.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Templates {
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub command_error: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub message_error: String,
}

/// A resolved `(bundle version, command)` pair — the unit the pipeline
/// authorizes and executes.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct CommandEntry {
    pub bundle: Bundle,
    pub command: BundleCommand,
}

impl Bundle {
    /// Parse a bundle manifest from its YAML document, filling each
    /// command's `name` from its map key.
    pub fn from_yaml(doc: &str) -> Result<Self> {
        let mut bundle: Bundle = serde_yaml::from_str(doc)?;
        for (name, command) in bundle.commands.iter_mut() {
            command.name = name.clone();
        }
        bundle.validate()?;
        Ok(bundle)
    }

    /// Checks the invariants required before a bundle may be stored.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::EmptyValue("bundle name"));
        }
        if self.version.is_empty() {
            return Err(Error::EmptyValue("bundle version"));
        }
        if self.description.is_empty() {
            return Err(Error::EmptyValue("bundle description"));
        }
        if self.gort_bundle_version == 0 {
            return Err(Error::EmptyValue("gort_bundle_version"));
        }
        Ok(())
    }

    /// The stored image name: a bare image gains the `:latest` tag, an
    /// explicit tag is preserved, and an empty image stays empty.
    pub fn normalized_image(&self) -> String {
        normalize_image(&self.image)
    }
}

/// Image tag normalization used by `bundle_create`.
///
/// The tag separator must appear after the last `/` so registry ports
/// (`registry:5000/img`) are not mistaken for tags.
pub fn normalize_image(image: &str) -> String {
    if image.is_empty() {
        return String::new();
    }
    let after_slash = image.rsplit('/').next().unwrap_or(image);
    if after_slash.contains(':') {
        image.to_owned()
    } else {
        format!("{image}:latest")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
gort_bundle_version: 1
name: echo
version: 0.0.1
description: Echoes its arguments.
image: ubuntu:20.04
permissions:
  - can_echo
commands:
  echo:
    description: "Echo back"
    executable: ["/bin/echo"]
    rules:
      - must have echo:can_echo
"#;

    #[test]
    fn manifest_parses_and_names_commands() {
        let bundle = Bundle::from_yaml(MANIFEST).unwrap();
        assert_eq!(bundle.name, "echo");
        assert_eq!(bundle.gort_bundle_version, 1);
        let cmd = &bundle.commands["echo"];
        assert_eq!(cmd.name, "echo");
        assert_eq!(cmd.executable, vec!["/bin/echo"]);
        assert_eq!(cmd.rules.len(), 1);
    }

    #[test]
    fn manifest_without_description_is_rejected() {
        let doc = MANIFEST.replace("description: Echoes its arguments.", "");
        assert!(matches!(
            Bundle::from_yaml(&doc),
            Err(Error::EmptyValue("bundle description"))
        ));
    }

    #[test]
    fn image_normalization() {
        assert_eq!(normalize_image("ubuntu"), "ubuntu:latest");
        assert_eq!(normalize_image("ubuntu:20.04"), "ubuntu:20.04");
        assert_eq!(normalize_image(""), "");
        assert_eq!(
            normalize_image("registry:5000/tools"),
            "registry:5000/tools:latest"
        );
    }
}
