// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Version resolution
//!
//! Versioned names look like `pkg@1.2.3/sub/path`. The loader keeps, per
//! package, the versions it has already committed to, and resolves every
//! request greedily against that list: the first concrete version loaded
//! for a range is the one every later compatible request shares.
//!
//! Supported requests:
//!
//! - `1.2.3`, `1.2.3-beta.1`: exact, recorded as-is
//! - `1.2`, `1`: the newest recorded `1.2.x` / `1.x`, else recorded as a
//!   placeholder
//! - `^1.2.3`: newest recorded `1.x` at or above `1.2.3`
//! - `^0.5.3`: newest recorded `0.5.x` at or above `0.5.3`
//! - `^0.0.1`: exactly `0.0.1`
//!
//! A name without a version picks up the newest recorded version of its
//! package.

use crate::config::VersionSpec;
use crate::error::Result;
use crate::module_system::Loader;
use crate::pipeline::{Extension, NormalizeHook, Next, Pipeline};
use async_trait::async_trait;
use parking_lot::RwLock;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};
use tracing::debug;

static SEMVER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)(?:\.(\d+)(?:\.(\d+)(?:-([0-9A-Za-z-]+(?:\.[0-9A-Za-z-]+)*))?)?)?$")
        .expect("semver regex")
});

/// Compare two version strings segment by segment.
///
/// A missing segment sorts after a present one, so the placeholder `1`
/// sorts after `1.2.3`. A prerelease is compared as a further segment.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    fn segments(version: &str) -> Vec<&str> {
        let mut parts: Vec<&str> = version.split('.').collect();
        if let Some((patch, prerelease)) = parts.get(2).copied().and_then(|p| p.split_once('-')) {
            parts[2] = patch;
            parts.insert(3, prerelease);
        }
        parts
    }

    let (a, b) = (segments(a), segments(b));
    for i in 0..a.len().max(b.len()) {
        let (x, y) = match (a.get(i), b.get(i)) {
            (None, _) => return Ordering::Greater,
            (_, None) => return Ordering::Less,
            (Some(x), Some(y)) => (x, y),
        };
        if x == y {
            continue;
        }
        return match (x.parse::<u64>(), y.parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            _ => x.cmp(y),
        };
    }
    Ordering::Equal
}

fn is_zero(digits: &str) -> bool {
    digits.bytes().all(|b| b == b'0')
}

/// A parsed version request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRequest {
    /// The version prefix compatible versions share
    pub bucket: String,
    /// Lowest acceptable version
    pub min: Option<String>,
    /// Whether recorded versions may satisfy the request
    pub search: bool,
}

impl VersionRequest {
    /// Parse `1.2.3`, `^1.2`, ... ; `None` for anything else.
    pub fn parse(spec: &str) -> Option<Self> {
        let (caret, version) = match spec.strip_prefix('^') {
            Some(rest) => (true, rest),
            None => (false, spec),
        };
        let caps = SEMVER.captures(version)?;
        let major = caps.get(1)?.as_str();
        let minor = caps.get(2).map(|m| m.as_str());
        let patch = caps.get(3).map(|m| m.as_str());

        if !caret {
            return Some(Self {
                bucket: version.to_string(),
                min: None,
                search: patch.is_none(),
            });
        }

        let request = if !is_zero(major) {
            Self {
                bucket: major.to_string(),
                min: match (minor, patch) {
                    (Some(minor), None) => Some(format!("{major}.{minor}.0")),
                    (Some(_), Some(_)) => Some(version.to_string()),
                    _ => None,
                },
                search: true,
            }
        } else {
            match minor {
                Some(minor) if !is_zero(minor) => Self {
                    bucket: format!("{major}.{minor}"),
                    min: patch.map(|_| version.to_string()),
                    search: true,
                },
                // ^0.0.x only matches itself
                Some(_) if patch.is_some() => Self {
                    bucket: version.to_string(),
                    min: None,
                    search: false,
                },
                _ => Self {
                    bucket: version.to_string(),
                    min: None,
                    search: true,
                },
            }
        };
        Some(request)
    }

    /// Whether a recorded version satisfies this request.
    pub fn matches(&self, version: &str) -> bool {
        let in_bucket = version
            .strip_prefix(self.bucket.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('.') || rest.starts_with('-'));
        in_bucket
            && self
                .min
                .as_deref()
                .map_or(true, |min| compare_versions(version, min) != Ordering::Less)
    }
}

/// Broader placeholders made redundant by recording `version`.
fn superseded(version: &str) -> Vec<String> {
    let Some(caps) = SEMVER.captures(version) else {
        return Vec::new();
    };
    let major = caps.get(1).map_or("", |m| m.as_str());
    let mut broader = Vec::new();
    if let (Some(minor), Some(_)) = (caps.get(2), caps.get(3)) {
        broader.push(format!("{major}.{}", minor.as_str()));
    }
    if caps.get(2).is_some() {
        broader.push(major.to_string());
    }
    broader
}

/// Versions committed to per package.
#[derive(Debug, Default)]
pub struct VersionTable {
    packages: RwLock<BTreeMap<String, Vec<String>>>,
}

impl VersionTable {
    /// An empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// A table seeded with configured version hints, in the order given.
    pub fn from_config(versions: &BTreeMap<String, VersionSpec>) -> Self {
        let packages = versions
            .iter()
            .map(|(package, spec)| (package.clone(), spec.to_vec()))
            .collect();
        Self {
            packages: RwLock::new(packages),
        }
    }

    /// Copy of the table
    pub fn snapshot(&self) -> BTreeMap<String, Vec<String>> {
        self.packages.read().clone()
    }

    /// Versions recorded for `package`
    pub fn get(&self, package: &str) -> Option<Vec<String>> {
        self.packages.read().get(package).cloned()
    }

    /// Resolve the version in a normalized name, recording it if new.
    pub fn resolve(&self, name: &str) -> String {
        let Some(at) = name.find('@') else {
            return self.resolve_unversioned(name);
        };

        let package = &name[..at];
        let rest = &name[at + 1..];
        let (spec, tail) = rest.split_at(rest.find('/').unwrap_or(rest.len()));

        let Some(request) = VersionRequest::parse(spec) else {
            return name.to_string();
        };

        let mut packages = self.packages.write();
        let versions = packages.entry(package.to_string()).or_default();

        if request.search {
            if let Some(found) = versions.iter().rev().find(|v| request.matches(v)) {
                return format!("{package}@{found}{tail}");
            }
        }

        if !versions.contains(&request.bucket) {
            versions.push(request.bucket.clone());
            versions.sort_by(|a, b| compare_versions(a, b));
            let broader = superseded(&request.bucket);
            versions.retain(|v| !broader.contains(v));
            debug!(package, version = %request.bucket, "Recorded package version");
        }

        format!("{package}@{}{tail}", request.bucket)
    }

    fn resolve_unversioned(&self, name: &str) -> String {
        let packages = self.packages.read();
        let found = packages
            .iter()
            .filter(|(package, _)| {
                name.strip_prefix(package.as_str())
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
            })
            .max_by_key(|(package, _)| package.len());

        match found.and_then(|(package, versions)| Some((package, versions.last()?))) {
            Some((package, latest)) => format!("{package}@{latest}{}", &name[package.len()..]),
            None => name.to_string(),
        }
    }
}

/// Resolves versions after the rest of normalization.
pub struct VersionExtension {
    hook: Arc<VersionHook>,
}

impl VersionExtension {
    /// Resolve against `table`.
    pub fn new(table: Arc<VersionTable>) -> Self {
        Self {
            hook: Arc::new(VersionHook { table }),
        }
    }
}

impl Extension for VersionExtension {
    fn name(&self) -> &str {
        "versions"
    }

    fn install(&self, pipeline: &mut Pipeline) {
        pipeline.on_normalize(self.hook.clone());
    }
}

struct VersionHook {
    table: Arc<VersionTable>,
}

#[async_trait]
impl NormalizeHook for VersionHook {
    async fn normalize(
        &self,
        loader: &Loader,
        name: &str,
        parent: Option<&str>,
        next: Next<'_, dyn NormalizeHook>,
    ) -> Result<String> {
        let normalized = next.normalize(loader, name, parent).await?;
        let resolved = self.table.resolve(&normalized);
        if resolved != normalized {
            debug!(from = %normalized, to = %resolved, "Resolved version");
        }
        Ok(resolved)
    }
}
