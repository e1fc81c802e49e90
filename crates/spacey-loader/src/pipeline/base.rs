// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Built-in hooks at the bottom of each chain.

use super::{FetchHook, LoadRecord, LocateHook, NormalizeHook, Next, TranslateHook};
use crate::error::{LoaderError, Result};
use crate::fetch::Fetch;
use crate::module_system::Loader;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Resolve `./` and `../` segments of `name` against `parent`.
///
/// Names that are not relative are already canonical and are returned as-is.
pub fn resolve_relative(name: &str, parent: Option<&str>) -> Result<String> {
    if name.is_empty() {
        return Err(LoaderError::resolution(name, "empty module name"));
    }

    let relative = name == "." || name == ".." || name.starts_with("./") || name.starts_with("../");
    if !relative {
        return Ok(name.to_string());
    }

    // a plugin suffix on the parent is not part of its path
    let parent = parent.map(|p| p.split('!').next().unwrap_or(p)).unwrap_or("");
    let mut segments: Vec<&str> = parent.split('/').filter(|s| !s.is_empty()).collect();
    segments.pop();

    for segment in name.split('/') {
        match segment {
            "." | "" => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(LoaderError::resolution(
                        name,
                        format!("escapes above the root of '{parent}'"),
                    ));
                }
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return Err(LoaderError::resolution(name, "resolves to an empty name"));
    }
    Ok(segments.join("/"))
}

/// Relative-name resolution.
pub struct BaseNormalize;

#[async_trait]
impl NormalizeHook for BaseNormalize {
    async fn normalize(
        &self,
        _loader: &Loader,
        name: &str,
        parent: Option<&str>,
        _next: Next<'_, dyn NormalizeHook>,
    ) -> Result<String> {
        resolve_relative(name, parent)
    }
}

/// Applies `paths` wildcard rules, then `baseURL`.
pub struct BaseLocate {
    paths: BTreeMap<String, String>,
    base_url: Option<Url>,
}

impl BaseLocate {
    /// Build from configured paths and base URL.
    pub fn new(paths: BTreeMap<String, String>, base_url: Option<&str>) -> Result<Self> {
        let base_url = base_url
            .map(|base| {
                Url::parse(base)
                    .map_err(|e| LoaderError::Config(format!("invalid baseURL '{base}': {e}")))
            })
            .transpose()?;
        Ok(Self { paths, base_url })
    }

    /// The path for `name` after applying the most specific rule.
    pub fn apply_paths(&self, name: &str) -> String {
        let mut best: Option<(usize, String)> = None;

        for (pattern, target) in &self.paths {
            let candidate = match pattern.split_once('*') {
                None if pattern == name => Some((usize::MAX, target.clone())),
                None => None,
                Some((prefix, suffix)) => {
                    let fits = name.len() >= prefix.len() + suffix.len()
                        && name.starts_with(prefix)
                        && name.ends_with(suffix);
                    fits.then(|| {
                        let wildcard = &name[prefix.len()..name.len() - suffix.len()];
                        (prefix.len() + suffix.len(), target.replacen('*', wildcard, 1))
                    })
                }
            };

            if let Some((weight, path)) = candidate {
                if best.as_ref().map_or(true, |(w, _)| weight > *w) {
                    best = Some((weight, path));
                }
            }
        }

        match best {
            Some((_, path)) => path,
            None => format!("{name}.js"),
        }
    }
}

#[async_trait]
impl LocateHook for BaseLocate {
    async fn locate(
        &self,
        _loader: &Loader,
        load: &mut LoadRecord,
        _next: Next<'_, dyn LocateHook>,
    ) -> Result<String> {
        let path = self.apply_paths(&load.name);

        let address = match &self.base_url {
            Some(base) if Url::parse(&path).is_err() => base
                .join(&path)
                .map(String::from)
                .map_err(|e| LoaderError::Locate {
                    name: load.name.clone(),
                    reason: e.to_string(),
                })?,
            _ => path,
        };

        debug!(name = %load.name, %address, "Located module");
        Ok(address)
    }
}

/// Reads the address through the configured fetcher.
pub struct BaseFetch {
    fetcher: Arc<dyn Fetch>,
}

impl BaseFetch {
    /// Wrap a fetcher.
    pub fn new(fetcher: Arc<dyn Fetch>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl FetchHook for BaseFetch {
    async fn fetch(
        &self,
        _loader: &Loader,
        load: &mut LoadRecord,
        _next: Next<'_, dyn FetchHook>,
    ) -> Result<String> {
        debug!(name = %load.name, address = %load.address, "Fetching module");
        self.fetcher
            .fetch(&load.address)
            .await
            .map_err(|e| LoaderError::Fetch {
                name: load.name.clone(),
                address: load.address.clone(),
                reason: e.to_string(),
            })
    }
}

/// Identity translation.
pub struct BaseTranslate;

#[async_trait]
impl TranslateHook for BaseTranslate {
    async fn translate(
        &self,
        _loader: &Loader,
        load: &mut LoadRecord,
        _next: Next<'_, dyn TranslateHook>,
    ) -> Result<String> {
        Ok(load.source.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_resolution() {
        assert_eq!(resolve_relative("./b", Some("a/main")).unwrap(), "a/b");
        assert_eq!(resolve_relative("../c/d", Some("a/b/main")).unwrap(), "a/c/d");
        assert_eq!(resolve_relative("./b", None).unwrap(), "b");
        assert_eq!(resolve_relative("lib/x", Some("a/main")).unwrap(), "lib/x");
    }

    #[test]
    fn test_relative_ignores_parent_plugin() {
        assert_eq!(
            resolve_relative("./util", Some("tpl/view.html!text")).unwrap(),
            "tpl/util"
        );
    }

    #[test]
    fn test_relative_rejects_escape_and_empty() {
        assert!(matches!(
            resolve_relative("../../x", Some("a/main")),
            Err(LoaderError::Resolution { .. })
        ));
        assert!(resolve_relative("", None).is_err());
    }

    #[test]
    fn test_normalized_names_are_stable() {
        let once = resolve_relative("./x/../y", Some("app/main")).unwrap();
        assert_eq!(resolve_relative(&once, Some("app/main")).unwrap(), once);
    }

    #[test]
    fn test_paths_most_specific_wins() {
        let paths = BTreeMap::from([
            ("*".to_string(), "lib/*.js".to_string()),
            ("vendor/*".to_string(), "third_party/*.min.js".to_string()),
            ("jquery".to_string(), "cdn/jquery.js".to_string()),
        ]);
        let locate = BaseLocate::new(paths, None).unwrap();

        assert_eq!(locate.apply_paths("app/main"), "lib/app/main.js");
        assert_eq!(locate.apply_paths("vendor/lodash"), "third_party/lodash.min.js");
        assert_eq!(locate.apply_paths("jquery"), "cdn/jquery.js");
    }

    #[test]
    fn test_default_path_appends_js() {
        let locate = BaseLocate::new(BTreeMap::new(), None).unwrap();
        assert_eq!(locate.apply_paths("app/main"), "app/main.js");
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        assert!(matches!(
            BaseLocate::new(BTreeMap::new(), Some("not a url")),
            Err(LoaderError::Config(_))
        ));
    }
}
