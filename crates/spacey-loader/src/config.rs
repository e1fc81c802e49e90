// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Loader configuration.
//!
//! Configuration is read from JSON or TOML and layered: defaults, then a
//! config file, then `SPACEY_LOADER_*` environment variables. Loose shapes
//! in the file (a map value that is either a string or a table, a version
//! that is either one string or a list) are resolved into tagged variants
//! once, here.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{LoaderError, Result};

/// Environment variable overriding `baseURL`.
pub const ENV_BASE_URL: &str = "SPACEY_LOADER_BASE_URL";

/// Environment variable overriding the format detection order.
pub const ENV_FORMATS: &str = "SPACEY_LOADER_FORMATS";

/// Configuration for a loader.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoaderConfig {
    /// Base URL addresses are resolved against
    #[serde(rename = "baseURL", alias = "baseUrl")]
    pub base_url: Option<String>,

    /// Wildcard path rules (`"*": "*.js"`)
    pub paths: BTreeMap<String, String>,

    /// Global and contextual name rewrite rules
    pub map: BTreeMap<String, MapEntry>,

    /// Bundle id -> module names the bundle defines
    pub bundles: BTreeMap<String, Vec<String>>,

    /// Version hints per package
    pub versions: BTreeMap<String, VersionSpec>,

    /// Global-script shims per module name
    pub shim: BTreeMap<String, ShimSpec>,

    /// Format detection order (empty keeps the built-in order)
    pub formats: Vec<String>,
}

/// One `map` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MapEntry {
    /// `prefix -> replacement`
    Replace(String),
    /// `parentPrefix -> { prefix -> replacement }`
    Contextual(BTreeMap<String, String>),
}

/// One `versions` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VersionSpec {
    /// A single known version
    Single(String),
    /// An ordered set of known versions
    Set(Vec<String>),
}

impl VersionSpec {
    /// The versions as a list.
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            VersionSpec::Single(v) => vec![v.clone()],
            VersionSpec::Set(vs) => vs.clone(),
        }
    }
}

/// One `shim` entry as written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ShimSpec {
    /// Just a dependency list
    Deps(Vec<String>),
    /// Dependencies and/or an export path
    Config {
        /// Dependencies loaded before the script
        #[serde(default)]
        deps: Vec<String>,
        /// Alias of `deps`
        #[serde(default)]
        imports: Vec<String>,
        /// Dotted global path holding the module value
        #[serde(default)]
        exports: Option<String>,
    },
}

/// A resolved shim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShimConfig {
    /// Dependencies loaded before the script
    pub deps: Vec<String>,
    /// Dotted global path holding the module value
    pub exports: Option<String>,
}

impl ShimSpec {
    /// Resolves the written shape into a [`ShimConfig`].
    pub fn resolve(&self) -> ShimConfig {
        match self {
            ShimSpec::Deps(deps) => ShimConfig {
                deps: deps.clone(),
                exports: None,
            },
            ShimSpec::Config {
                deps,
                imports,
                exports,
            } => ShimConfig {
                deps: if deps.is_empty() {
                    imports.clone()
                } else {
                    deps.clone()
                },
                exports: exports.clone(),
            },
        }
    }
}

impl LoaderConfig {
    /// Load configuration: defaults, then `path` if given, then environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.load_from_env();
        Ok(config)
    }

    /// Read a `.json` or `.toml` config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml(&content),
            Some("json") | None => Self::from_json(&content),
            Some(other) => Err(LoaderError::Config(format!(
                "unsupported config file extension '.{}'",
                other
            ))),
        }
    }

    /// Parse JSON configuration.
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Parse TOML configuration.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `SPACEY_LOADER_*` environment overrides.
    fn load_from_env(&mut self) {
        if let Ok(base_url) = std::env::var(ENV_BASE_URL) {
            self.base_url = Some(base_url);
        }
        if let Ok(formats) = std::env::var(ENV_FORMATS) {
            self.formats = formats
                .split(',')
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect();
        }
    }

    /// Check the parts of the configuration that are not checked by parsing.
    pub fn validate(&self) -> Result<()> {
        for (key, entry) in &self.map {
            if key.is_empty() {
                return Err(LoaderError::Config("empty map key".into()));
            }
            if let MapEntry::Contextual(rules) = entry {
                if rules.keys().any(|k| k.is_empty()) {
                    return Err(LoaderError::Config(format!(
                        "empty map key in contextual map for '{}'",
                        key
                    )));
                }
            }
        }
        for pattern in self.paths.keys() {
            if pattern.matches('*').count() > 1 {
                return Err(LoaderError::Config(format!(
                    "path pattern '{}' has more than one wildcard",
                    pattern
                )));
            }
        }
        Ok(())
    }

    /// Resolved shim table.
    pub fn shims(&self) -> BTreeMap<String, ShimConfig> {
        self.shim
            .iter()
            .map(|(name, spec)| (name.clone(), spec.resolve()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_json_shapes() {
        let config = LoaderConfig::from_json(
            r#"{
                "baseURL": "http://cdn.example/",
                "map": { "lib": "libA", "app": { "lib": "libB" } },
                "versions": { "jquery": ["1.9.2", "2.0.3"], "bootstrap": "3.0.1" },
                "shim": {
                    "legacy": ["jquery"],
                    "plugin": { "imports": ["legacy"], "exports": "Plugin.api" }
                },
                "bundles": { "main-bundle": ["a", "b"] }
            }"#,
        )
        .unwrap();

        assert_eq!(config.base_url.as_deref(), Some("http://cdn.example/"));
        assert_eq!(config.map["lib"], MapEntry::Replace("libA".into()));
        assert!(matches!(&config.map["app"], MapEntry::Contextual(m) if m["lib"] == "libB"));
        assert_eq!(config.versions["bootstrap"], VersionSpec::Single("3.0.1".into()));
        assert_eq!(config.versions["jquery"].to_vec().len(), 2);

        let shims = config.shims();
        assert_eq!(shims["legacy"].deps, vec!["jquery".to_string()]);
        assert_eq!(shims["plugin"].deps, vec!["legacy".to_string()]);
        assert_eq!(shims["plugin"].exports.as_deref(), Some("Plugin.api"));
        assert_eq!(config.bundles["main-bundle"].len(), 2);
    }

    #[test]
    fn test_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
formats = ["cjs", "amd", "global"]

[paths]
"*" = "lib/*.js"

[map]
underscore = "lodash"
"#
        )
        .unwrap();

        let config = LoaderConfig::from_file(file.path()).unwrap();
        assert_eq!(config.formats, vec!["cjs", "amd", "global"]);
        assert_eq!(config.paths["*"], "lib/*.js");
        assert_eq!(config.map["underscore"], MapEntry::Replace("lodash".into()));
    }

    #[test]
    fn test_validate_rejects_bad_paths() {
        let mut config = LoaderConfig::default();
        config.paths.insert("*/*".into(), "x".into());
        assert!(matches!(config.validate(), Err(LoaderError::Config(_))));
    }
}
