//! Loader integration tests
//!
//! Registry sharing, concurrency, cycles, failure handling and the
//! normalize extensions as seen through whole loads.

mod common;

use common::{call, loader, loader_with, set_exports, ScriptedHost};
use parking_lot::Mutex;
use spacey_loader::{LoaderError, MemoryFetcher, Namespace, Value};
use std::sync::Arc;

#[tokio::test]
async fn test_cjs_dependency_chain() {
    let host = ScriptedHost::new();
    host.on("app/b", |_, scope| {
        set_exports(scope, Value::from(41.0));
        Ok(())
    })
    .on("app/a", |_, scope| {
        let b = call(scope, "require", &[Value::from("./b")])?;
        let Value::Number(n) = b else {
            return Err(LoaderError::type_error("b is not a number"));
        };
        set_exports(scope, Value::from(n + 1.0));
        Ok(())
    });
    let fetcher = MemoryFetcher::new()
        .with("app/a.js", "var b = require('./b');\nmodule.exports = b + 1;")
        .with("app/b.js", "module.exports = 41;");
    let loader = loader(&host, fetcher);

    let record = loader.load("app/a").await.unwrap();

    assert_eq!(record.export_value(), Value::from(42.0));
    assert!(loader.has("app/b"));
    assert_eq!(loader.module_names(), vec!["app/a", "app/b"]);
}

#[tokio::test]
async fn test_concurrent_requests_share_one_load() {
    let host = ScriptedHost::new();
    host.on("shared", |_, scope| {
        set_exports(scope, Value::from("once"));
        Ok(())
    });
    let fetcher = MemoryFetcher::new().with("shared.js", "module.exports = 'once';");
    let loader = loader(&host, fetcher);

    let (a, b, c) = tokio::join!(
        loader.load("shared"),
        loader.load("./shared"),
        loader.import("shared", Some("other/parent")),
    );

    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
    assert!(Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&a, &c));
    assert_eq!(host.runs("shared"), 1);
}

#[tokio::test]
async fn test_diamond_executes_each_module_once() {
    let host = ScriptedHost::new();
    let fetcher = MemoryFetcher::new()
        .with("top.js", "require('left'); require('right');")
        .with("left.js", "require('base');")
        .with("right.js", "require('base');")
        .with("base.js", "module.exports = {};");
    let loader = loader(&host, fetcher);

    loader.load("top").await.unwrap();

    for name in ["top", "left", "right", "base"] {
        assert_eq!(host.runs(name), 1, "{name}");
    }
}

#[tokio::test]
async fn test_cycle_sees_in_flight_partner() {
    let seen = Arc::new(Mutex::new(None));
    let host = ScriptedHost::new();
    host.on("a", |_, scope| {
        call(scope, "require", &[Value::from("b")])?;
        set_exports(scope, Value::from("a"));
        Ok(())
    });
    {
        let seen = seen.clone();
        host.on("b", move |_, scope| {
            *seen.lock() = Some(call(scope, "require", &[Value::from("a")])?);
            set_exports(scope, Value::from("b"));
            Ok(())
        });
    }
    let fetcher = MemoryFetcher::new()
        .with("a.js", "require('b'); module.exports = 'a';")
        .with("b.js", "require('a'); module.exports = 'b';");
    let loader = loader(&host, fetcher);

    let a = loader.load("a").await.unwrap();

    assert_eq!(a.export_value(), Value::from("a"));
    assert!(loader.has("b"));
    assert_eq!(*seen.lock(), Some(Value::Undefined));
}

#[tokio::test]
async fn test_self_import_does_not_deadlock() {
    let host = ScriptedHost::new();
    let fetcher = MemoryFetcher::new().with("me.js", "require('./me'); module.exports = 1;");
    let loader = loader(&host, fetcher);

    let record = loader.load("me").await.unwrap();
    assert!(record.is_ready());
}

#[tokio::test]
async fn test_missing_dependency_reports_edge() {
    let host = ScriptedHost::new();
    let fetcher = MemoryFetcher::new().with("app/a.js", "require('./missing');");
    let loader = loader(&host, fetcher);

    let err = loader.load("app/a").await.unwrap_err();

    match &err {
        LoaderError::Dependency {
            parent, dependency, ..
        } => {
            assert_eq!(parent, "app/a");
            assert_eq!(dependency, "./missing");
        }
        other => panic!("expected a dependency error, got {other:?}"),
    }
    assert!(matches!(err.root_cause(), LoaderError::Fetch { .. }));
    assert!(!loader.has("app/a"));
    assert_eq!(host.runs("app/a"), 0);
}

#[tokio::test]
async fn test_failed_load_is_retried() {
    let attempts = Arc::new(Mutex::new(0));
    let host = ScriptedHost::new();
    {
        let attempts = attempts.clone();
        host.on("flaky", move |script, _| {
            let mut attempts = attempts.lock();
            *attempts += 1;
            if *attempts == 1 {
                return Err(LoaderError::execution(script.name, "first run fails"));
            }
            Ok(())
        });
    }
    let fetcher = MemoryFetcher::new().with("flaky.js", "module.exports = {};");
    let loader = loader(&host, fetcher);

    let err = loader.load("flaky").await.unwrap_err();
    assert!(matches!(err, LoaderError::Execution { .. }));
    assert!(loader.get("flaky").is_none());

    loader.load("flaky").await.unwrap();
    assert_eq!(host.runs("flaky"), 2);
}

#[tokio::test]
async fn test_map_rewrites_dependencies() {
    let host = ScriptedHost::new();
    let fetcher = MemoryFetcher::new()
        .with("app/main.js", "require('jquery/ui');")
        .with("vendor/jquery-2/ui.js", "module.exports = 'ui';")
        .with("libB/x.js", "module.exports = 'b';");
    let config = r#"{
        "map": {
            "jquery": "vendor/jquery-2",
            "lib": "libA",
            "app": { "lib": "libB" }
        }
    }"#;
    let loader = loader_with(&host, fetcher, config);

    loader.load("app/main").await.unwrap();
    assert!(loader.has("vendor/jquery-2/ui"));

    assert_eq!(loader.normalize("lib/x", Some("app/main")).await.unwrap(), "libB/x");
    assert_eq!(loader.normalize("lib/x", Some("other")).await.unwrap(), "libA/x");
    assert_eq!(loader.normalize("libx", None).await.unwrap(), "libx");
}

#[tokio::test]
async fn test_versions_converge_across_requests() {
    let host = ScriptedHost::new();
    let loader = loader_with(
        &host,
        MemoryFetcher::new(),
        r#"{ "versions": { "pkg": ["1.2.0", "1.5.3", "2.0.0"] } }"#,
    );

    assert_eq!(loader.normalize("pkg@^1.2", None).await.unwrap(), "pkg@1.5.3");
    assert_eq!(loader.normalize("pkg@^1.6", None).await.unwrap(), "pkg@1");
    assert_eq!(loader.normalize("pkg@^2/sub", None).await.unwrap(), "pkg@2.0.0/sub");
    assert_eq!(loader.normalize("pkg", None).await.unwrap(), "pkg@2.0.0");
    assert_eq!(loader.normalize("pkg@1.2.0", None).await.unwrap(), "pkg@1.2.0");
    assert_eq!(loader.versions()["pkg"], vec!["1.2.0", "1.5.3", "1", "2.0.0"]);
}

#[tokio::test]
async fn test_versioned_dependency_paths() {
    let host = ScriptedHost::new();
    let fetcher = MemoryFetcher::new()
        .with("app.js", "require('pkg@^1');")
        .with("pkg@1.5.3.js", "module.exports = 'pkg';");
    let loader = loader_with(&host, fetcher, r#"{ "versions": { "pkg": "1.5.3" } }"#);

    loader.load("app").await.unwrap();
    assert!(loader.has("pkg@1.5.3"));
}

#[tokio::test]
async fn test_predefined_module_dependencies_are_deduped() {
    let host = ScriptedHost::new();
    let fetcher = MemoryFetcher::new().with("d.js", "module.exports = 'd';");
    let loader = loader(&host, fetcher);

    loader.define("v", vec!["d".into(), "d".into()], |_, deps| {
        let names: Vec<Value> = deps.iter().map(|dep| Value::from(dep.name.as_str())).collect();
        Ok(Namespace::from_value(Value::Array(names)))
    });

    let record = loader.load("v").await.unwrap();
    assert_eq!(record.export_value(), Value::Array(vec![Value::from("d")]));
    assert_eq!(host.runs("d"), 1);
}

#[tokio::test]
async fn test_predefined_module_skips_fetch() {
    let host = ScriptedHost::new();
    let fetcher = MemoryFetcher::new().with("dep.js", "module.exports = 2;");
    let loader = loader(&host, fetcher);

    loader.define("virtual", vec!["dep".into()], |_, deps| {
        let value = deps[0].value();
        Ok(Arc::new(Namespace::from_bindings([("dep".to_string(), value)])))
    });

    let record = loader.load("virtual").await.unwrap();
    let namespace = record.namespace().unwrap();
    assert_eq!(namespace.keys(), vec!["dep"]);
    assert!(loader.definitions().is_empty());
    assert_eq!(host.runs("virtual"), 0);
}

#[tokio::test]
async fn test_set_and_delete() {
    let host = ScriptedHost::new();
    let loader = loader(&host, MemoryFetcher::new());

    loader.set("fixed", Arc::new(Namespace::with_default(Value::from(true))));
    let record = loader.load("fixed").await.unwrap();
    assert_eq!(record.export_value(), Value::from(true));

    assert!(loader.delete("fixed"));
    assert!(!loader.has("fixed"));
    assert!(loader.load("fixed").await.is_err());
}

#[tokio::test]
async fn test_require_many() {
    let host = ScriptedHost::new();
    let fetcher = MemoryFetcher::new()
        .with("lib/a.js", "module.exports = 'a';")
        .with("lib/b.js", "module.exports = 'b';");
    let loader = loader(&host, fetcher);

    let records = loader.require(&["./a", "./b"], Some("lib/index")).await.unwrap();
    let names: Vec<&str> = records.iter().map(|r| r.name()).collect();
    assert_eq!(names, vec!["lib/a", "lib/b"]);
}

#[tokio::test]
async fn test_normalize_is_idempotent() {
    let host = ScriptedHost::new();
    let loader = loader_with(
        &host,
        MemoryFetcher::new(),
        r#"{
            "map": { "jquery": "vendor/jquery" },
            "versions": { "vendor/jquery": "2.1.0" }
        }"#,
    );

    for name in ["jquery/ui", "./a/../b", "x.txt!text", "vendor/jquery@^2"] {
        let once = loader.normalize(name, Some("app/main")).await.unwrap();
        let twice = loader.normalize(&once, Some("app/main")).await.unwrap();
        assert_eq!(once, twice, "{name}");
    }
    assert_eq!(
        loader.normalize("jquery/ui", None).await.unwrap(),
        "vendor/jquery@2.1.0/ui"
    );
}
