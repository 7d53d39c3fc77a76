// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Sharded local filesystem object store backend.
//!
//! Each key maps to a two-level directory via a configurable shard
//! function. `put` streams the caller's reader into its own temp file
//! under a `.temp/` sibling directory — so every caller's bytes are fully
//! consumed and verified regardless of races — then commits by renaming
//! into place; a cancelled or failed write never leaves a visible object.
//! Concurrent `put`s for the same key collapse at the commit step through
//! an in-process op map: only the first caller to reach it actually
//! renames, and the rest await and return that caller's real result.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::domain::capability::ByteRange;
use crate::store::object_store::{resolve_range, ObjectBody, ObjectStore, ObjectStoreError};

const SHARD_MARKER_FILE: &str = ".shard-strategy";

/// How a key is mapped onto a two-level directory tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardStrategy {
    /// First two and next two characters of the key's hash, as hex.
    HashPrefix,
}

impl ShardStrategy {
    fn as_marker(&self) -> &'static str {
        match self {
            ShardStrategy::HashPrefix => "hash-prefix-v1",
        }
    }

    fn shard_components(&self, key: &str) -> (String, String) {
        match self {
            ShardStrategy::HashPrefix => {
                let mut hasher = DefaultHasher::new();
                key.hash(&mut hasher);
                let digest = hasher.finish();
                let hex = format!("{digest:016x}");
                (hex[0..2].to_string(), hex[2..4].to_string())
            }
        }
    }
}

/// Reversibly escapes a key into a single filesystem-safe filename: keys
/// routinely contain `/` (e.g. `allocations/{digest}/{space}`), which
/// cannot appear in one path component, so it's percent-escaped rather
/// than collapsed — collapsing would make prefix listing unable to
/// recover the original key from the filename it finds on disk.
fn sanitize_component(raw: &str) -> String {
    raw.replace('%', "%25").replace('/', "%2F").replace('\\', "%5C")
}

fn desanitize_component(raw: &str) -> String {
    raw.replace("%2F", "/").replace("%5C", "\\").replace("%25", "%")
}

type WriteOutcome = Option<Result<(), ObjectStoreError>>;

pub struct FilesystemObjectStore {
    base_path: PathBuf,
    shard: ShardStrategy,
    op_map: DashMap<String, watch::Receiver<WriteOutcome>>,
}

impl FilesystemObjectStore {
    /// Opens (creating if absent) a filesystem store rooted at `base_path`.
    /// If the directory already carries a shard-strategy marker that
    /// disagrees with `shard`, this is fatal: the key layout on disk would
    /// silently stop matching what callers expect.
    pub async fn open(base_path: impl Into<PathBuf>, shard: ShardStrategy) -> Result<Self, ObjectStoreError> {
        let base_path = base_path.into();
        tokio::fs::create_dir_all(&base_path)
            .await
            .map_err(|e| ObjectStoreError::Transient(e.to_string()))?;
        tokio::fs::create_dir_all(base_path.join(".temp"))
            .await
            .map_err(|e| ObjectStoreError::Transient(e.to_string()))?;

        let marker_path = base_path.join(SHARD_MARKER_FILE);
        match tokio::fs::read_to_string(&marker_path).await {
            Ok(existing) => {
                if existing.trim() != shard.as_marker() {
                    return Err(ObjectStoreError::Transient(format!(
                        "store at {} was opened with shard strategy '{}', cannot reopen with '{}'",
                        base_path.display(),
                        existing.trim(),
                        shard.as_marker()
                    )));
                }
            }
            Err(_) => {
                tokio::fs::write(&marker_path, shard.as_marker())
                    .await
                    .map_err(|e| ObjectStoreError::Transient(e.to_string()))?;
            }
        }

        Ok(Self {
            base_path,
            shard,
            op_map: DashMap::new(),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let (a, b) = self.shard.shard_components(key);
        self.base_path.join(a).join(b).join(sanitize_component(key))
    }

    fn temp_path_for(&self, key: &str) -> PathBuf {
        self.base_path
            .join(".temp")
            .join(format!("{}.{}", sanitize_component(key), uuid::Uuid::new_v4()))
    }

    /// Collapses concurrent *commits* to the same key: every caller drains
    /// its own reader into its own temp file first (so size/content
    /// verification never skips bytes just because it lost a race), and
    /// only the rename into the shared final path is serialized here. The
    /// first caller to reach this performs the rename; the rest wait for
    /// it and return the *winner's actual result*, not a blind `Ok(())` —
    /// a waiting `BlobStore::put` still needs to know whether the commit
    /// really happened, and a failed winner must not be reported as a
    /// success to everyone who collapsed onto it. Losers delete their own
    /// now-redundant temp file once the winner's outcome is known.
    ///
    /// Uses a `watch` channel rather than `Notify` so there's no lost-wakeup
    /// window: `watch::Receiver` always remembers the last value sent, so a
    /// waiter that subscribes after the winner has already finished sees
    /// the result immediately instead of awaiting a notification that will
    /// never come.
    async fn commit_rename(&self, key: &str, temp_path: &Path, final_path: &Path) -> Result<(), ObjectStoreError> {
        loop {
            if let Some(existing) = self.op_map.get(key) {
                let mut rx = existing.clone();
                drop(existing);
                let outcome = loop {
                    if let Some(result) = rx.borrow().clone() {
                        break Some(result);
                    }
                    if rx.changed().await.is_err() {
                        // winner vanished (panicked) without ever sending a
                        // result; fall through and retry as a fresh writer.
                        break None;
                    }
                };
                match outcome {
                    Some(result) => {
                        let _ = tokio::fs::remove_file(temp_path).await;
                        return result;
                    }
                    None => continue,
                }
            }
            let (tx, rx) = watch::channel(None);
            match self.op_map.entry(key.to_string()) {
                dashmap::mapref::entry::Entry::Vacant(v) => {
                    v.insert(rx);
                }
                dashmap::mapref::entry::Entry::Occupied(_) => continue,
            }
            let result = tokio::fs::rename(temp_path, final_path)
                .await
                .map_err(|e| ObjectStoreError::Transient(e.to_string()));
            self.op_map.remove(key);
            let _ = tx.send(Some(result.clone()));
            return result;
        }
    }
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    async fn put(
        &self,
        key: &str,
        size: u64,
        mut reader: Box<dyn tokio::io::AsyncRead + Send + Unpin>,
        cancel: CancellationToken,
    ) -> Result<(), ObjectStoreError> {
        let final_path = self.path_for(key);
        let temp_path = self.temp_path_for(key);

        if let Some(parent) = final_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ObjectStoreError::Transient(e.to_string()))?;
        }

        let mut file = tokio::fs::File::create(&temp_path)
            .await
            .map_err(|e| ObjectStoreError::Transient(e.to_string()))?;

        let consumed = tokio::select! {
            result = tokio::io::copy(&mut reader, &mut file) => {
                result.map_err(|e| ObjectStoreError::Transient(e.to_string()))?
            }
            _ = cancel.cancelled() => {
                let _ = tokio::fs::remove_file(&temp_path).await;
                return Err(ObjectStoreError::Cancelled);
            }
        };

        if consumed != size {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(ObjectStoreError::SizeMismatch {
                declared: size,
                actual: consumed,
            });
        }

        file.sync_all().await.map_err(|e| ObjectStoreError::Transient(e.to_string()))?;

        self.commit_rename(key, &temp_path, &final_path).await
    }

    async fn get(
        &self,
        key: &str,
        range: Option<ByteRange>,
        cancel: CancellationToken,
    ) -> Result<ObjectBody, ObjectStoreError> {
        let path = self.path_for(key);
        let metadata = tokio::select! {
            result = tokio::fs::metadata(&path) => result,
            _ = cancel.cancelled() => return Err(ObjectStoreError::Cancelled),
        };
        let metadata = metadata.map_err(|_| ObjectStoreError::NotFound(key.to_string()))?;
        let size = metadata.len();

        let (content_length, end, _partial) = resolve_range(range, size)?;
        let start = range.map(|r| r.start).unwrap_or(0);

        let mut file = tokio::fs::File::open(&path)
            .await
            .map_err(|_| ObjectStoreError::NotFound(key.to_string()))?;
        file.seek(std::io::SeekFrom::Start(start))
            .await
            .map_err(|e| ObjectStoreError::Transient(e.to_string()))?;

        let _ = end;
        let limited = file.take(content_length);
        Ok(ObjectBody {
            size,
            reader: Box::new(limited),
        })
    }

    async fn delete(&self, key: &str, cancel: CancellationToken) -> Result<(), ObjectStoreError> {
        let path = self.path_for(key);
        tokio::select! {
            result = tokio::fs::remove_file(&path) => {
                result.map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        ObjectStoreError::NotFound(key.to_string())
                    } else {
                        ObjectStoreError::Transient(e.to_string())
                    }
                })
            }
            _ = cancel.cancelled() => Err(ObjectStoreError::Cancelled),
        }
    }

    async fn list_prefix(
        &self,
        prefix: &str,
        _cancel: CancellationToken,
    ) -> Result<Vec<String>, ObjectStoreError> {
        let mut matches = Vec::new();
        collect_keys(&self.base_path, &self.base_path, prefix, &mut matches)
            .await
            .map_err(|e| ObjectStoreError::Transient(e.to_string()))?;
        Ok(matches)
    }

    async fn health_check(&self, _cancel: CancellationToken) -> Result<(), ObjectStoreError> {
        tokio::fs::metadata(&self.base_path)
            .await
            .map(|_| ())
            .map_err(|e| ObjectStoreError::Transient(e.to_string()))
    }
}

fn collect_keys<'a>(
    root: &'a Path,
    dir: &'a Path,
    prefix: &'a str,
    out: &'a mut Vec<String>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();
            if name == ".temp" || name == SHARD_MARKER_FILE {
                continue;
            }
            if path.is_dir() {
                collect_keys(root, &path, prefix, out).await?;
            } else {
                let original_key = desanitize_component(&name);
                if original_key.starts_with(prefix) {
                    out.push(original_key);
                }
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn store(dir: &std::path::Path) -> FilesystemObjectStore {
        FilesystemObjectStore::open(dir, ShardStrategy::HashPrefix).await.unwrap()
    }

    #[tokio::test]
    async fn put_then_get_round_trips_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;
        let content = b"sharded filesystem payload".to_vec();
        store
            .put(
                "blobs/abc123",
                content.len() as u64,
                Box::new(std::io::Cursor::new(content.clone())),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        let mut body = store.get("blobs/abc123", None, CancellationToken::new()).await.unwrap();
        let mut out = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut body.reader, &mut out).await.unwrap();
        assert_eq!(out, content);
        assert_eq!(body.size, content.len() as u64);
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;
        let err = store.get("blobs/missing", None, CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ObjectStoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_prefix_recovers_slash_bearing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;
        for space in ["did:key:zAlice", "did:key:zBob"] {
            let key = format!("allocations/deadbeef/{space}");
            store
                .put(&key, 1, Box::new(std::io::Cursor::new(vec![7u8])), CancellationToken::new())
                .await
                .unwrap();
        }
        store
            .put(
                "allocations/cafef00d/did:key:zCarol",
                1,
                Box::new(std::io::Cursor::new(vec![7u8])),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        let mut matches = store
            .list_prefix("allocations/deadbeef", CancellationToken::new())
            .await
            .unwrap();
        matches.sort();
        assert_eq!(
            matches,
            vec![
                "allocations/deadbeef/did:key:zAlice".to_string(),
                "allocations/deadbeef/did:key:zBob".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn list_prefix_result_is_directly_gettable() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;
        let key = "acceptances/deadbeef/did:key:zAlice";
        let content = b"acceptance payload".to_vec();
        store
            .put(key, content.len() as u64, Box::new(std::io::Cursor::new(content.clone())), CancellationToken::new())
            .await
            .unwrap();

        let matches = store.list_prefix("acceptances/deadbeef", CancellationToken::new()).await.unwrap();
        assert_eq!(matches, vec![key.to_string()]);

        let mut body = store.get(&matches[0], None, CancellationToken::new()).await.unwrap();
        let mut out = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut body.reader, &mut out).await.unwrap();
        assert_eq!(out, content);
    }

    #[tokio::test]
    async fn reopening_with_a_different_shard_strategy_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let _store = store(dir.path()).await;
        // Only one strategy exists today, so simulate a foreign marker
        // directly rather than adding a second real strategy just for this.
        tokio::fs::write(dir.path().join(SHARD_MARKER_FILE), "some-other-strategy")
            .await
            .unwrap();
        let err = FilesystemObjectStore::open(dir.path(), ShardStrategy::HashPrefix)
            .await
            .unwrap_err();
        assert!(matches!(err, ObjectStoreError::Transient(_)));
    }

    #[tokio::test]
    async fn range_read_returns_requested_slice() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;
        let content = b"0123456789".to_vec();
        store
            .put("blobs/range", content.len() as u64, Box::new(std::io::Cursor::new(content.clone())), CancellationToken::new())
            .await
            .unwrap();

        let mut body = store
            .get("blobs/range", Some(ByteRange::new(2, 4)), CancellationToken::new())
            .await
            .unwrap();
        let mut out = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut body.reader, &mut out).await.unwrap();
        assert_eq!(out, b"234");
        assert_eq!(body.size, content.len() as u64);
    }

    #[tokio::test]
    async fn out_of_bounds_range_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;
        store
            .put("blobs/short", 3, Box::new(std::io::Cursor::new(vec![1u8, 2, 3])), CancellationToken::new())
            .await
            .unwrap();

        let err = store
            .get("blobs/short", Some(ByteRange::new(0, 10)), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ObjectStoreError::RangeNotSatisfiable { .. }));
    }

    /// `spec.md` §8 "concurrent writes to one key": two concurrent `Put`s
    /// for the same key must both succeed, the stored object must equal
    /// the bytes written, and no temp artefacts may survive in `.temp/`.
    #[tokio::test]
    async fn concurrent_puts_for_the_same_key_both_succeed_with_no_leaked_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(store(dir.path()).await);
        let content = b"concurrent writers racing to the same key".to_vec();

        let (a, b) = tokio::join!(
            store.put("blobs/shared", content.len() as u64, Box::new(std::io::Cursor::new(content.clone())), CancellationToken::new()),
            store.put("blobs/shared", content.len() as u64, Box::new(std::io::Cursor::new(content.clone())), CancellationToken::new()),
        );
        assert!(a.is_ok(), "first put failed: {a:?}");
        assert!(b.is_ok(), "second put failed: {b:?}");

        let mut body = store.get("blobs/shared", None, CancellationToken::new()).await.unwrap();
        let mut out = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut body.reader, &mut out).await.unwrap();
        assert_eq!(out, content);

        let mut temp_entries = tokio::fs::read_dir(dir.path().join(".temp")).await.unwrap();
        assert!(temp_entries.next_entry().await.unwrap().is_none(), "temp directory should be empty after both puts settle");
    }
}
