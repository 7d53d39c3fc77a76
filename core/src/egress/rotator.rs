// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Rotation policy: a ticker that periodically force-rotates the journal
//! and hands rotated CIDs to a callback — the enqueue step into the
//! tracker's work queue. `spec.md` §4.10.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::egress::journal::Journal;

#[async_trait::async_trait]
pub trait RotationSink: Send + Sync {
    async fn on_rotated(&self, cid: cid::Cid);
}

pub struct Rotator {
    journal: Arc<dyn Journal>,
    sink: Arc<dyn RotationSink>,
    tick: Duration,
}

impl Rotator {
    pub fn new(journal: Arc<dyn Journal>, sink: Arc<dyn RotationSink>, tick: Duration) -> Self {
        Self { journal, sink, tick }
    }

    /// Runs until `cancel` fires. Each tick force-rotates the journal; a
    /// rotation that actually happened is handed to the sink. Errors from
    /// a single tick are logged and do not stop the loop — the tracker
    /// queue is the durability boundary, not this ticker.
    pub async fn run(self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.tick);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = interval.tick() => {
                    match self.journal.force_rotate().await {
                        Ok(Some(cid)) => self.sink.on_rotated(cid).await,
                        Ok(None) => {}
                        Err(e) => tracing::warn!(error = %e, "egress journal force-rotate failed"),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::digest::Digest;
    use crate::domain::link::Link;
    use crate::domain::receipt::{Outcome, Receipt, ReceiptError};
    use crate::egress::journal::FilesystemJournal;
    use tokio::sync::Mutex;

    struct RecordingSink {
        seen: Mutex<Vec<cid::Cid>>,
    }

    #[async_trait::async_trait]
    impl RotationSink for RecordingSink {
        async fn on_rotated(&self, cid: cid::Cid) {
            self.seen.lock().await.push(cid);
        }
    }

    #[tokio::test]
    async fn tick_rotates_non_empty_journal_and_notifies_sink() {
        let dir = tempfile::tempdir().unwrap();
        let journal: Arc<dyn Journal> = Arc::new(FilesystemJournal::open(dir.path(), 1 << 20).await.unwrap());

        let root = Link::from_digest(&Digest::of(b"r"));
        let ran = Link::from_digest(&Digest::of(b"ran"));
        journal
            .append(&Receipt {
                root,
                ran,
                out: Outcome::Error(ReceiptError::NotFoundError),
                blocks: vec![],
            })
            .await
            .unwrap();

        let sink = Arc::new(RecordingSink { seen: Mutex::new(vec![]) });
        let rotator = Rotator::new(journal, sink.clone(), Duration::from_millis(10));

        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        let handle = tokio::spawn(rotator.run(cancel_clone));

        tokio::time::sleep(Duration::from_millis(40)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(sink.seen.lock().await.len(), 1);
    }
}
