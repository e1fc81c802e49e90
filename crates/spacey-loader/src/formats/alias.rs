// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! ES module forwarding (`export * from "x"`) without a transpiler.

use super::FormatDescriptor;
use crate::error::{LoaderError, Result};
use crate::module_system::Loader;
use crate::pipeline::{LoadRecord, ResolvedDep};
use crate::runtime::{Namespace, Value};
use regex::Regex;
use std::sync::{Arc, LazyLock};

static ALIAS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*export\s*\*\s*from\s*(?:'([^']+)'|"([^"]+)")"#).expect("alias regex")
});

static ES_SYNTAX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?:^\s*|[}{\(\);,\n]\s*)(import\s+['"]|(import|module)\s+[^"'\(\)\n;]+\s+from\s+['"]|export\s+(\*|\{|default|function|var|const|let|[_$a-zA-Z\x{A0}-\x{FFFF}][_$a-zA-Z0-9\x{A0}-\x{FFFF}]*))"#,
    )
    .expect("es syntax regex")
});

/// The module a source forwards to, if it is an alias module.
pub fn alias_target(source: &str) -> Option<&str> {
    ALIAS
        .captures(source)
        .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str())
}

/// Claims ES syntax; only pure re-export modules can be loaded.
#[derive(Debug, Default, Clone, Copy)]
pub struct AliasFormat;

impl AliasFormat {
    /// Format id
    pub const ID: &'static str = "es6";
}

impl FormatDescriptor for AliasFormat {
    fn id(&self) -> &str {
        Self::ID
    }

    fn detect(&self, load: &LoadRecord) -> bool {
        alias_target(&load.source).is_some() || ES_SYNTAX.is_match(&load.source)
    }

    fn extract_deps(&self, _loader: &Loader, load: &mut LoadRecord) -> Result<Vec<String>> {
        // anything beyond re-exporting needs a transpiler
        match alias_target(&load.source) {
            Some(target) => Ok(vec![target.to_string()]),
            None => Err(LoaderError::Format {
                name: load.name.clone(),
                address: load.address.clone(),
            }),
        }
    }

    fn execute(&self, _loader: &Loader, deps: &[ResolvedDep], load: &LoadRecord) -> Result<Value> {
        let target = deps
            .first()
            .ok_or_else(|| LoaderError::NotLoaded(load.name.clone()))?;
        let namespace = target
            .record
            .namespace()
            .unwrap_or_else(|| Arc::new(Namespace::new()));
        Ok(Value::Module(namespace))
    }
}
