// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>
//
// This file is part of KVPool.
//
// KVPool is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// KVPool is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with KVPool. If not, see <https://www.gnu.org/licenses/>.

//! Script loading.
//!
//! ## Purpose
//! Reads a named Lua script from a [`ResourceLocator`] and registers it with
//! a [`ConnectionExecutor`], returning a content-addressed [`ScriptHandle`].
//!
//! Scripts are resolved as `<bundle>/<script>.lua`. Line endings are
//! normalized (every line is followed by `\n`) before hashing and
//! registration, so the digest does not depend on how the file was checked
//! out. Nothing is cached here: every call reads and registers again.

use crate::bulk_delete::{DEL_KEYS_SCRIPT, DEL_KEYS_SOURCE};
use crate::{ConnectionExecutor, StoreError, StoreResult};
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Bundle holding the scripts shipped with this crate.
pub const SCRIPT_BUNDLE: &str = "kvpool-redis";

/// File extension of script resources.
pub const SCRIPT_EXTENSION: &str = "lua";

/// Reference to a script registered with the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScriptHandle {
    /// Hex SHA1 digest of the normalized source
    pub sha: String,
    /// Generation of the pool the script was registered with
    pub generation: u64,
}

impl ScriptHandle {
    /// Create a handle.
    pub fn new(sha: impl Into<String>, generation: u64) -> Self {
        Self {
            sha: sha.into(),
            generation,
        }
    }
}

impl fmt::Display for ScriptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.sha, self.generation)
    }
}

/// Locates named resources inside bundles.
pub trait ResourceLocator: Send + Sync {
    /// Open `resource` from `bundle`, `None` if it does not exist.
    fn resolve(&self, bundle: &str, resource: &str) -> StoreResult<Option<Box<dyn Read + Send>>>;
}

/// In-memory resource table.
#[derive(Debug, Clone, Default)]
pub struct BundleResources {
    resources: HashMap<(String, String), String>,
}

impl BundleResources {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table holding the scripts shipped with this crate.
    pub fn builtin() -> Self {
        Self::new().with_resource(
            SCRIPT_BUNDLE,
            script_resource(DEL_KEYS_SCRIPT),
            DEL_KEYS_SOURCE,
        )
    }

    /// Add or replace a resource.
    pub fn with_resource(
        mut self,
        bundle: impl Into<String>,
        name: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        self.resources
            .insert((bundle.into(), name.into()), source.into());
        self
    }
}

impl ResourceLocator for BundleResources {
    fn resolve(&self, bundle: &str, resource: &str) -> StoreResult<Option<Box<dyn Read + Send>>> {
        let key = (bundle.to_string(), resource.to_string());
        Ok(self.resources.get(&key).map(|source| {
            Box::new(io::Cursor::new(source.clone().into_bytes())) as Box<dyn Read + Send>
        }))
    }
}

/// Resolves `<root>/<bundle>/<resource>` on disk.
#[derive(Debug, Clone)]
pub struct DirectoryResources {
    root: PathBuf,
}

impl DirectoryResources {
    /// Locator rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn is_plain_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

impl ResourceLocator for DirectoryResources {
    fn resolve(&self, bundle: &str, resource: &str) -> StoreResult<Option<Box<dyn Read + Send>>> {
        if !is_plain_name(bundle) || !is_plain_name(resource) {
            return Err(StoreError::ResourceNotFound(format!(
                "{}/{} is not a plain resource name",
                bundle, resource
            )));
        }
        let path = self.root.join(bundle).join(resource);
        match std::fs::File::open(&path) {
            Ok(file) => Ok(Some(Box::new(file))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::ScriptRead {
                script: path.display().to_string(),
                source: e,
            }),
        }
    }
}

/// Resource name of a script.
pub fn script_resource(script: &str) -> String {
    format!("{}.{}", script, SCRIPT_EXTENSION)
}

/// Every line followed by `\n`, whatever the original line endings were.
pub fn normalize_source(source: &str) -> String {
    let mut normalized = String::with_capacity(source.len() + 1);
    for line in source.lines() {
        normalized.push_str(line);
        normalized.push('\n');
    }
    normalized
}

/// Hex SHA1 digest, as computed by `SCRIPT LOAD`.
pub fn script_digest(source: &str) -> String {
    hex::encode(Sha1::digest(source.as_bytes()))
}

/// Reads scripts and registers them with an executor.
pub struct ScriptLoader;

impl ScriptLoader {
    /// Read and normalize `<script>.lua` from `bundle`.
    ///
    /// ## Errors
    /// - [`StoreError::ResourceNotFound`]: the locator has no such resource
    /// - [`StoreError::ScriptRead`]: the resource could not be read as UTF-8
    pub fn read_source(
        locator: &dyn ResourceLocator,
        bundle: &str,
        script: &str,
    ) -> StoreResult<String> {
        let resource = script_resource(script);
        let mut reader = locator.resolve(bundle, &resource)?.ok_or_else(|| {
            StoreError::ResourceNotFound(format!("{}/{}", bundle, resource))
        })?;
        let mut source = String::new();
        reader
            .read_to_string(&mut source)
            .map_err(|e| StoreError::ScriptRead {
                script: script.to_string(),
                source: e,
            })?;
        Ok(normalize_source(&source))
    }

    /// Register `script` from `bundle` with `executor`.
    ///
    /// On the inert executor the handle is computed locally with generation
    /// 0, so callers need not special-case a disabled store.
    ///
    /// ## Errors
    /// - [`StoreError::ResourceNotFound`] / [`StoreError::ScriptRead`]
    /// - [`StoreError::ScriptRegistration`]: the store rejected the body
    /// - [`StoreError::PoolUnavailable`] / [`StoreError::ConnectionError`]:
    ///   unchanged from the executor
    pub async fn load(
        executor: &ConnectionExecutor,
        locator: &dyn ResourceLocator,
        bundle: &str,
        script: &str,
    ) -> StoreResult<ScriptHandle> {
        let source = Self::read_source(locator, bundle, script)?;
        if !executor.is_pooled() {
            return Ok(ScriptHandle::new(
                script_digest(&source),
                executor.generation(),
            ));
        }

        let sha = executor
            .execute(move |conn| Box::pin(async move { conn.script_load(&source).await }))
            .await
            .map_err(|e| match e {
                StoreError::PoolUnavailable(_) | StoreError::ConnectionError(_) => e,
                other => StoreError::ScriptRegistration {
                    script: script.to_string(),
                    reason: other.to_string(),
                },
            })?;

        debug!(
            script = %script,
            sha = %sha,
            generation = executor.generation(),
            "Script registered"
        );
        Ok(ScriptHandle::new(sha, executor.generation()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConnectionPool, MemoryStore, PoolSizing};
    use std::sync::Arc;

    #[test]
    fn test_normalize_source() {
        assert_eq!(normalize_source("a\r\nb"), "a\nb\n");
        assert_eq!(normalize_source("a\nb\n"), "a\nb\n");
        assert_eq!(normalize_source(""), "");
    }

    #[test]
    fn test_script_digest() {
        assert_eq!(
            script_digest(""),
            "da39a3ee5e6b4b0d3255bfef95601890afd80709"
        );
        assert_ne!(script_digest("return 1\n"), script_digest("return 2\n"));
    }

    #[test]
    fn test_builtin_resources() {
        let source =
            ScriptLoader::read_source(&BundleResources::builtin(), SCRIPT_BUNDLE, DEL_KEYS_SCRIPT)
                .unwrap();
        assert!(source.contains("KEYS"));
        assert!(source.ends_with('\n'));
    }

    #[test]
    fn test_missing_resource() {
        let err = ScriptLoader::read_source(&BundleResources::new(), "b", "nope").unwrap_err();
        assert!(matches!(err, StoreError::ResourceNotFound(_)));
    }

    #[test]
    fn test_invalid_utf8_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("b")).unwrap();
        std::fs::write(dir.path().join("b").join("bad.lua"), [0xff, 0xfe, 0x00]).unwrap();

        let locator = DirectoryResources::new(dir.path());
        let err = ScriptLoader::read_source(&locator, "b", "bad").unwrap_err();
        assert!(matches!(err, StoreError::ScriptRead { .. }));
    }

    #[test]
    fn test_directory_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let locator = DirectoryResources::new(dir.path());
        assert!(locator.resolve("..", "x.lua").is_err());
        assert!(locator.resolve("b", "../x.lua").is_err());
        assert!(locator.resolve("b", "x.lua").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_on_inert_is_local() {
        let handle = ScriptLoader::load(
            &ConnectionExecutor::Inert,
            &BundleResources::builtin(),
            SCRIPT_BUNDLE,
            DEL_KEYS_SCRIPT,
        )
        .await
        .unwrap();

        assert_eq!(handle.generation, 0);
        assert_eq!(handle.sha, script_digest(&normalize_source(DEL_KEYS_SOURCE)));
    }

    #[tokio::test]
    async fn test_load_registers_with_store() {
        let store = MemoryStore::new();
        let pool =
            ConnectionPool::new("load", Arc::new(store.clone()), PoolSizing::default()).unwrap();
        let executor = ConnectionExecutor::pooled(pool);

        let handle = ScriptLoader::load(
            &executor,
            &BundleResources::builtin(),
            SCRIPT_BUNDLE,
            DEL_KEYS_SCRIPT,
        )
        .await
        .unwrap();

        assert_eq!(handle.generation, executor.generation());
        assert_eq!(handle.sha, script_digest(&normalize_source(DEL_KEYS_SOURCE)));
    }

    #[tokio::test]
    async fn test_load_rejected_script() {
        let store = MemoryStore::new();
        let pool = ConnectionPool::new("load", Arc::new(store), PoolSizing::default()).unwrap();
        let executor = ConnectionExecutor::pooled(pool);
        let locator = BundleResources::new().with_resource("app", "broken.lua", "return (");

        let err = ScriptLoader::load(&executor, &locator, "app", "broken")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ScriptRegistration { .. }));
    }
}
