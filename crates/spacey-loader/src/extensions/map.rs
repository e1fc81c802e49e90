// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Identifier mapping
//!
//! Global rules (`"jquery": "lib/jquery-2"`) and contextual rules that only
//! apply inside a parent (`"app": { "lib": "libB" }`). Matching is always by
//! whole `/`-separated segments, and the remaining subpath is preserved:
//!
//! - `jquery` -> `lib/jquery-2`
//! - `jquery/ui` -> `lib/jquery-2/ui`
//! - `jqueryui` is untouched
//!
//! The most specific contextual rule applies first, then the most specific
//! global rule applies to the result.

use crate::config::MapEntry;
use crate::error::Result;
use crate::module_system::Loader;
use crate::pipeline::{Extension, NormalizeHook, Next, Pipeline};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Number of `/` segments of `prefix` if it is a segment prefix of `name`, else 0.
pub fn prefix_match_length(name: &str, prefix: &str) -> usize {
    let mut name_parts = name.split('/');
    let mut matched = 0;
    for part in prefix.split('/') {
        if name_parts.next() != Some(part) {
            return 0;
        }
        matched += 1;
    }
    matched
}

/// Replace the first `segments` segments of `name` with `replacement`.
fn replace_prefix(name: &str, segments: usize, replacement: &str) -> String {
    let subpath: Vec<&str> = name.split('/').skip(segments).collect();
    if subpath.is_empty() {
        replacement.to_string()
    } else {
        format!("{replacement}/{}", subpath.join("/"))
    }
}

/// The rule in `rules` matching the most segments of `name`.
fn best_rule<'a>(rules: &'a BTreeMap<String, String>, name: &str) -> Option<(usize, &'a str)> {
    rules
        .iter()
        .map(|(prefix, replacement)| (prefix_match_length(name, prefix), replacement.as_str()))
        .filter(|(length, _)| *length > 0)
        .max_by_key(|(length, _)| *length)
}

/// Global and contextual rewrite rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapTable {
    global: BTreeMap<String, String>,
    contextual: BTreeMap<String, BTreeMap<String, String>>,
}

impl MapTable {
    /// Split configured entries into global and contextual rules.
    pub fn from_config(map: &BTreeMap<String, MapEntry>) -> Self {
        let mut table = Self::default();
        for (prefix, entry) in map {
            match entry {
                MapEntry::Replace(replacement) => {
                    table.global.insert(prefix.clone(), replacement.clone());
                }
                MapEntry::Contextual(rules) => {
                    table.contextual.insert(prefix.clone(), rules.clone());
                }
            }
        }
        table
    }

    /// Whether there are no rules.
    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.contextual.is_empty()
    }

    /// Apply the rules to `name` as requested from `parent`.
    pub fn apply(&self, name: &str, parent: Option<&str>) -> String {
        let mut name = name.to_string();

        if let Some(parent) = parent {
            // most specific parent first; fall back to broader parents when
            // a narrower one has no rule for this name
            let mut parents: Vec<(usize, &BTreeMap<String, String>)> = self
                .contextual
                .iter()
                .map(|(prefix, rules)| (prefix_match_length(parent, prefix), rules))
                .filter(|(length, _)| *length > 0)
                .collect();
            parents.sort_by(|a, b| b.0.cmp(&a.0));

            if let Some((length, replacement)) =
                parents.iter().find_map(|(_, rules)| best_rule(rules, &name))
            {
                name = replace_prefix(&name, length, replacement);
            }
        }

        if let Some((length, replacement)) = best_rule(&self.global, &name) {
            name = replace_prefix(&name, length, replacement);
        }
        name
    }
}

/// Applies the map after the rest of normalization.
pub struct MapExtension {
    hook: Arc<MapHook>,
}

impl MapExtension {
    /// Map with `table`.
    pub fn new(table: MapTable) -> Self {
        Self {
            hook: Arc::new(MapHook { table }),
        }
    }
}

impl Extension for MapExtension {
    fn name(&self) -> &str {
        "map"
    }

    fn install(&self, pipeline: &mut Pipeline) {
        pipeline.on_normalize(self.hook.clone());
    }
}

struct MapHook {
    table: MapTable,
}

#[async_trait]
impl NormalizeHook for MapHook {
    async fn normalize(
        &self,
        loader: &Loader,
        name: &str,
        parent: Option<&str>,
        next: Next<'_, dyn NormalizeHook>,
    ) -> Result<String> {
        let normalized = next.normalize(loader, name, parent).await?;
        if self.table.is_empty() {
            return Ok(normalized);
        }

        let mapped = self.table.apply(&normalized, parent);
        if mapped != normalized {
            debug!(from = %normalized, to = %mapped, "Mapped module name");
        }
        Ok(mapped)
    }
}
