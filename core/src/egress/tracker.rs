// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Egress tracker service: dequeues rotated batch CIDs, issues a `track`
//! invocation against an external tracker, and records consolidation
//! effects. `spec.md` §4.11.
//!
//! The work queue here is an in-process, at-least-once structure — a
//! crash loses queued-but-undelivered CIDs, which this core treats as an
//! external durability concern (the journal's rotated files on disk are
//! the durable record; `list()` can reseed the queue on restart).

use std::sync::Arc;
use std::time::Duration;

use cid::Cid;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::domain::consolidation::ConsolidationRecord;
use crate::domain::errors::CoreError;
use crate::domain::link::Link;
use crate::egress::rotator::RotationSink;
use crate::store::object_store::{ObjectStore, ObjectStoreError};

/// What sending a `track` invocation to the external tracker yields.
pub struct TrackResponse {
    pub ok: bool,
    /// Set when the tracker's receipt carries a "please consolidate"
    /// effect.
    pub consolidate: Option<ConsolidateEffect>,
}

pub struct ConsolidateEffect {
    pub track_invocation: Link,
    pub consolidate_invocation_cid: Link,
}

#[async_trait::async_trait]
pub trait TrackerClient: Send + Sync {
    async fn track(&self, batch_cid: Cid, endpoint_url: &str) -> Result<TrackResponse, CoreError>;
}

/// Stores `ConsolidationRecord`s under a single-key format
/// (`consolidations/{batchCID}.cbor`), accepting an older two-namespace
/// layout on read and lazily migrating it forward.
pub struct ConsolidationStore {
    backend: Arc<dyn ObjectStore>,
}

impl ConsolidationStore {
    pub fn new(backend: Arc<dyn ObjectStore>) -> Self {
        Self { backend }
    }

    fn key(batch_cid: &Cid) -> String {
        format!("consolidations/{batch_cid}.cbor")
    }

    fn legacy_track_key(batch_cid: &Cid) -> String {
        format!("consolidations/legacy/track/{batch_cid}")
    }

    fn legacy_consolidate_key(batch_cid: &Cid) -> String {
        format!("consolidations/legacy/consolidate/{batch_cid}")
    }

    pub async fn put(&self, batch_cid: &Cid, record: &ConsolidationRecord, cancel: CancellationToken) -> Result<(), CoreError> {
        let encoded = serde_ipld_dagcbor::to_vec(record).map_err(|e| CoreError::DataInconsistent { reason: e.to_string() })?;
        let size = encoded.len() as u64;
        self.backend
            .put(&Self::key(batch_cid), size, Box::new(std::io::Cursor::new(encoded)), cancel)
            .await
            .map_err(CoreError::from)
    }

    /// Reads the current-format record; on miss, falls back to the legacy
    /// two-namespace pair and, on a hit there, lazily migrates to the new
    /// format. Migration failures are logged and swallowed — the read
    /// still returns the record built from the legacy pair either way.
    pub async fn get(&self, batch_cid: &Cid, cancel: CancellationToken) -> Result<ConsolidationRecord, CoreError> {
        match self.read_current(batch_cid, cancel.clone()).await {
            Ok(record) => return Ok(record),
            Err(CoreError::NotFound) => {}
            Err(e) => return Err(e),
        }

        let record = self.read_legacy(batch_cid, cancel.clone()).await?;

        if let Err(e) = self.migrate_legacy(batch_cid, &record, cancel).await {
            tracing::warn!(batch_cid = %batch_cid, error = %e, "consolidation-record migration failed; read still succeeds");
        }

        Ok(record)
    }

    async fn read_current(&self, batch_cid: &Cid, cancel: CancellationToken) -> Result<ConsolidationRecord, CoreError> {
        let mut body = self.backend.get(&Self::key(batch_cid), None, cancel).await.map_err(CoreError::from)?;
        let mut buf = Vec::with_capacity(body.size as usize);
        tokio::io::AsyncReadExt::read_to_end(&mut body.reader, &mut buf)
            .await
            .map_err(|e| CoreError::Transient(e.to_string()))?;
        serde_ipld_dagcbor::from_slice(&buf).map_err(|e| CoreError::DataInconsistent { reason: e.to_string() })
    }

    async fn read_legacy(&self, batch_cid: &Cid, cancel: CancellationToken) -> Result<ConsolidationRecord, CoreError> {
        let mut track_body = self
            .backend
            .get(&Self::legacy_track_key(batch_cid), None, cancel.clone())
            .await
            .map_err(CoreError::from)?;
        let mut consolidate_body = self
            .backend
            .get(&Self::legacy_consolidate_key(batch_cid), None, cancel)
            .await
            .map_err(CoreError::from)?;

        let mut track_buf = Vec::with_capacity(track_body.size as usize);
        tokio::io::AsyncReadExt::read_to_end(&mut track_body.reader, &mut track_buf)
            .await
            .map_err(|e| CoreError::Transient(e.to_string()))?;
        let mut consolidate_buf = Vec::with_capacity(consolidate_body.size as usize);
        tokio::io::AsyncReadExt::read_to_end(&mut consolidate_body.reader, &mut consolidate_buf)
            .await
            .map_err(|e| CoreError::Transient(e.to_string()))?;

        let track_invocation: Link = std::str::from_utf8(&track_buf)
            .map_err(|e| CoreError::DataInconsistent { reason: e.to_string() })?
            .parse()
            .map_err(|e: crate::domain::link::LinkError| CoreError::DataInconsistent { reason: e.to_string() })?;
        let consolidate_invocation_cid: Link = std::str::from_utf8(&consolidate_buf)
            .map_err(|e| CoreError::DataInconsistent { reason: e.to_string() })?
            .parse()
            .map_err(|e: crate::domain::link::LinkError| CoreError::DataInconsistent { reason: e.to_string() })?;

        Ok(ConsolidationRecord {
            track_invocation,
            consolidate_invocation_cid,
        })
    }

    async fn migrate_legacy(&self, batch_cid: &Cid, record: &ConsolidationRecord, cancel: CancellationToken) -> Result<(), CoreError> {
        self.put(batch_cid, record, cancel.clone()).await?;
        for key in [Self::legacy_track_key(batch_cid), Self::legacy_consolidate_key(batch_cid)] {
            match self.backend.delete(&key, cancel.clone()).await {
                Ok(()) | Err(ObjectStoreError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// Queued work item: a rotated batch CID plus how many delivery attempts
/// have already failed, used to compute backoff before re-enqueue.
struct QueueItem {
    batch_cid: Cid,
    attempt: u32,
}

pub struct EgressTracker {
    client: Arc<dyn TrackerClient>,
    consolidations: ConsolidationStore,
    endpoint_url: String,
    sender: mpsc::UnboundedSender<QueueItem>,
    receiver: Mutex<mpsc::UnboundedReceiver<QueueItem>>,
    max_backoff: Duration,
}

impl EgressTracker {
    pub fn new(client: Arc<dyn TrackerClient>, consolidations: ConsolidationStore, endpoint_url: impl Into<String>, max_backoff: Duration) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            client,
            consolidations,
            endpoint_url: endpoint_url.into(),
            sender,
            receiver: Mutex::new(receiver),
            max_backoff,
        }
    }

    /// Enqueue a rotated batch CID for tracking. Used directly as the
    /// [`crate::egress::rotator::RotationSink`] callback.
    pub fn enqueue(&self, batch_cid: Cid) {
        let _ = self.sender.send(QueueItem { batch_cid, attempt: 0 });
    }

    /// Runs one worker loop until `cancel` fires, processing items
    /// at-least-once with bounded exponential backoff on transient
    /// failure. Safe to call concurrently from several tasks sharing the
    /// same `EgressTracker` — the receiver lock is held only while
    /// dequeuing, not across the network call, so `tracker_workers`
    /// workers genuinely process the queue in parallel rather than
    /// serializing behind one another.
    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            let item = {
                let mut receiver = self.receiver.lock().await;
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    item = receiver.recv() => match item {
                        Some(item) => item,
                        None => return,
                    },
                }
            };

            match self.client.track(item.batch_cid, &self.endpoint_url).await {
                Ok(response) if response.ok => {
                    if let Some(effect) = response.consolidate {
                        let record = ConsolidationRecord {
                            track_invocation: effect.track_invocation,
                            consolidate_invocation_cid: effect.consolidate_invocation_cid,
                        };
                        if let Err(e) = self
                            .consolidations
                            .put(&item.batch_cid, &record, CancellationToken::new())
                            .await
                        {
                            tracing::warn!(batch_cid = %item.batch_cid, error = %e, "failed to persist consolidation record");
                        }
                    }
                }
                Ok(_) | Err(_) => {
                    self.requeue_with_backoff(item).await;
                }
            }
        }
    }

    async fn requeue_with_backoff(&self, item: QueueItem) {
        let backoff = std::cmp::min(Duration::from_millis(100 * 2u64.saturating_pow(item.attempt)), self.max_backoff);
        tracing::warn!(batch_cid = %item.batch_cid, attempt = item.attempt, backoff_ms = backoff.as_millis() as u64, "track invocation failed; re-enqueueing");
        let sender = self.sender.clone();
        tokio::spawn(async move {
            tokio::time::sleep(backoff).await;
            let _ = sender.send(QueueItem {
                batch_cid: item.batch_cid,
                attempt: item.attempt + 1,
            });
        });
    }
}

/// Lets [`crate::egress::rotator::Rotator`] enqueue directly: a rotated
/// batch CID becomes a tracking work item with no intermediate step.
#[async_trait::async_trait]
impl RotationSink for EgressTracker {
    async fn on_rotated(&self, cid: Cid) {
        self.enqueue(cid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::backends::embedded_kv::EmbeddedKvObjectStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyClient {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl TrackerClient for FlakyClient {
        async fn track(&self, _batch_cid: Cid, _endpoint_url: &str) -> Result<TrackResponse, CoreError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err(CoreError::Transient("timeout".to_string()))
            } else {
                Ok(TrackResponse { ok: true, consolidate: None })
            }
        }
    }

    #[tokio::test]
    async fn failed_track_is_retried_and_eventually_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let backend: Arc<dyn ObjectStore> = Arc::new(EmbeddedKvObjectStore::open(dir.path().join("db")).unwrap());
        let client = Arc::new(FlakyClient { calls: AtomicUsize::new(0) });
        let tracker = EgressTracker::new(
            client.clone(),
            ConsolidationStore::new(backend),
            "https://tracker.example/track",
            Duration::from_millis(50),
        );

        let cid = car_test_cid();
        tracker.enqueue(cid);

        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        let tracker = Arc::new(tracker);
        let runner = tracker.clone();
        let handle = tokio::spawn(async move { runner.run(cancel_clone).await });

        tokio::time::sleep(Duration::from_millis(300)).await;
        cancel.cancel();
        let _ = handle.await;

        assert!(client.calls.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn consolidation_record_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let backend: Arc<dyn ObjectStore> = Arc::new(EmbeddedKvObjectStore::open(dir.path().join("db")).unwrap());
        let store = ConsolidationStore::new(backend);
        let cid = car_test_cid();
        let record = ConsolidationRecord {
            track_invocation: Link::from_digest(&crate::domain::digest::Digest::of(b"track")),
            consolidate_invocation_cid: Link::from_digest(&crate::domain::digest::Digest::of(b"consolidate")),
        };
        store.put(&cid, &record, CancellationToken::new()).await.unwrap();
        let fetched = store.get(&cid, CancellationToken::new()).await.unwrap();
        assert_eq!(fetched, record);
    }

    fn car_test_cid() -> Cid {
        *Link::from_digest(&crate::domain::digest::Digest::of(b"batch")).cid()
    }
}
