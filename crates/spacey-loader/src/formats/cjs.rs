// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! CommonJS modules
//!
//! Detection and dependency extraction are regex-based over the source with
//! comments removed. Execution binds `module`, `exports`, `require`,
//! `__filename`, `__dirname`, `global` and an inert `process` as locals.

use super::FormatDescriptor;
use crate::error::Result;
use crate::module_system::Loader;
use crate::pipeline::{LoadRecord, ResolvedDep};
use crate::runtime::{Object, ObjectRef, Scope, Script, Value};
use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

static COMMENTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)(/\*[\s\S]*?\*/|([^:]|^)//.*$)").expect("comment regex")
});

static REQUIRE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^\s*|[}{\(\);,\n=:\?\&]\s*)require\s*\(\s*("([^"]+)"|'([^']+)')\s*\)"#)
        .expect("require regex")
});

static EXPORTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?:^\s*|[}{\(\);,\n=:\?\&]\s*|module\.)(exports\s*\[\s*('[^']+'|"[^"]+")\s*\]|exports\s*\.\s*[_$a-zA-Z\x{A0}-\x{FFFF}][_$a-zA-Z0-9\x{A0}-\x{FFFF}]*|exports\s*=)"#,
    )
    .expect("exports regex")
});

/// `source` with block and line comments removed.
///
/// A `//` preceded by `:` is kept so URLs survive.
pub fn strip_comments(source: &str) -> Cow<'_, str> {
    COMMENTS.replace_all(source, "$2")
}

/// Every statically visible `require("...")` argument, in order.
pub fn extract_requires(source: &str) -> Vec<String> {
    let source = strip_comments(source);
    REQUIRE
        .captures_iter(&source)
        .filter_map(|caps| caps.get(2).or_else(|| caps.get(3)))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// The inert `process` stand-in scripts see.
pub fn node_process() -> Value {
    let noop = || Value::function("noop", |_| Ok(Value::Undefined));
    Value::object([
        ("browser", Value::Boolean(true)),
        ("env", Value::object::<&str, _>([])),
        ("argv", Value::Array(Vec::new())),
        ("on", noop()),
        ("once", noop()),
        ("off", noop()),
        ("emit", noop()),
        ("nextTick", noop()),
        ("cwd", Value::function("cwd", |_| Ok(Value::from("/")))),
    ])
}

/// Directory part of an address.
fn dirname(address: &str) -> &str {
    address.rfind('/').map_or("", |i| &address[..i])
}

/// CommonJS format descriptor
#[derive(Debug, Default, Clone, Copy)]
pub struct CjsFormat;

impl CjsFormat {
    /// Format id
    pub const ID: &'static str = "cjs";
}

impl FormatDescriptor for CjsFormat {
    fn id(&self) -> &str {
        Self::ID
    }

    fn detect(&self, load: &LoadRecord) -> bool {
        let source = strip_comments(&load.source);
        REQUIRE.is_match(&source) || EXPORTS.is_match(&source)
    }

    fn extract_deps(&self, _loader: &Loader, load: &mut LoadRecord) -> Result<Vec<String>> {
        Ok(extract_requires(&load.source))
    }

    fn execute(&self, loader: &Loader, deps: &[ResolvedDep], load: &LoadRecord) -> Result<Value> {
        let exports = ObjectRef::new();
        let module = ObjectRef::from_pairs([
            ("exports", Value::Object(exports.clone())),
            ("id", Value::string(load.name.as_str())),
            ("uri", Value::string(load.address.as_str())),
        ]);

        let records: Vec<_> = deps
            .iter()
            .map(|dep| (dep.requested.clone(), dep.record.clone()))
            .collect();
        let require = Value::function("require", move |args| {
            let requested = args.first().and_then(Value::as_str).unwrap_or_default();
            Ok(records
                .iter()
                .find(|(name, _)| name == requested)
                .map(|(_, record)| record.export_value())
                .unwrap_or_default())
        });

        let mut locals = Object::new();
        locals.set("global".into(), Value::Object(loader.global().clone()));
        locals.set("exports".into(), Value::Object(exports));
        locals.set("module".into(), Value::Object(module.clone()));
        locals.set("require".into(), require);
        locals.set("__filename".into(), Value::string(load.address.as_str()));
        locals.set("__dirname".into(), Value::string(dirname(&load.address)));
        locals.set("process".into(), node_process());

        let scope = Scope::with_locals(loader.global().clone(), locals);
        let script = Script {
            name: &load.name,
            address: &load.address,
            source: &load.source,
        };
        loader.host().execute(&script, &scope)?;

        Ok(module.get("exports"))
    }
}
