// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Resource fetchers.

use async_trait::async_trait;
use dashmap::DashMap;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use url::Url;

/// Retrieves raw source text for an address.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Fetch the source at `address`.
    async fn fetch(&self, address: &str) -> io::Result<String>;
}

/// Reads sources from the filesystem.
///
/// Addresses may be `file://` URLs or paths; relative paths are resolved
/// against the fetcher's root directory.
#[derive(Debug, Clone)]
pub struct FsFetcher {
    root: PathBuf,
}

impl FsFetcher {
    /// Create a fetcher rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory for relative addresses.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, address: &str) -> io::Result<PathBuf> {
        if address.starts_with("file:") {
            let url = Url::parse(address)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
            return url.to_file_path().map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("not a local file URL: {}", address),
                )
            });
        }
        if address.contains("://") {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("unsupported address scheme: {}", address),
            ));
        }
        Ok(self.root.join(address.trim_start_matches('/')))
    }
}

#[async_trait]
impl Fetch for FsFetcher {
    async fn fetch(&self, address: &str) -> io::Result<String> {
        let path = self.path_for(address)?;
        debug!("Reading {}", path.display());
        fs::read_to_string(&path).await
    }
}

/// Serves sources from an in-memory table.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    sources: DashMap<String, String>,
}

impl MemoryFetcher {
    /// Create an empty fetcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the source behind `address`.
    pub fn insert(&self, address: impl Into<String>, source: impl Into<String>) {
        self.sources.insert(address.into(), source.into());
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(self, address: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(address, source);
        self
    }
}

#[async_trait]
impl Fetch for MemoryFetcher {
    async fn fetch(&self, address: &str) -> io::Result<String> {
        self.sources
            .get(address)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, address.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_fetcher() {
        let fetcher = MemoryFetcher::new().with("a.js", "var a = 1;");
        assert_eq!(fetcher.fetch("a.js").await.unwrap(), "var a = 1;");

        let err = fetcher.fetch("missing.js").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_fs_fetcher_relative_and_file_url() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("mod.js"), "exports.x = 1;").unwrap();

        let fetcher = FsFetcher::new(dir.path());
        assert_eq!(fetcher.fetch("mod.js").await.unwrap(), "exports.x = 1;");

        let url = Url::from_file_path(dir.path().join("mod.js")).unwrap();
        assert_eq!(fetcher.fetch(url.as_str()).await.unwrap(), "exports.x = 1;");

        let err = fetcher.fetch("http://example.com/mod.js").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }
}
