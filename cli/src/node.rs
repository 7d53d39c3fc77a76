// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Wires a fully parsed [`NodeConfigManifest`] into a running node: object
//! store, capability server, egress journal, rotator, and tracker.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use ed25519_dalek::SigningKey;
use tokio_util::sync::CancellationToken;

use storage_node_core::capability_server::http_collaborators::HttpContentAdvertiser;
use storage_node_core::capability_server::server::CapabilityServer;
use storage_node_core::domain::capability::Did;
use storage_node_core::domain::node_config::NodeConfigSpec;
use storage_node_core::egress::journal::FilesystemJournal;
use storage_node_core::egress::rotator::Rotator;
use storage_node_core::egress::tracker::{ConsolidationStore, EgressTracker};
use storage_node_core::egress::tracker_client::HttpTrackerClient;
use storage_node_core::store::acceptance_store::AcceptanceStore;
use storage_node_core::store::allocation_store::AllocationStore;
use storage_node_core::store::backends::factory::build_backend;
use storage_node_core::store::receipt_store::ReceiptStore;

/// Everything the serve loop needs once the backend is built: the
/// dispatcher the HTTP layer calls into, the journal it appends receipts
/// to, and the background tasks that drain the egress queue.
pub struct Node {
    pub server: Arc<CapabilityServer>,
    pub journal: Arc<FilesystemJournal>,
    pub rotation_tick: Duration,
    pub tracker: Option<Arc<EgressTracker>>,
    pub tracker_workers: u32,
}

pub async fn build_node(spec: &NodeConfigSpec, signing_key: SigningKey, node_identity: Did) -> Result<Node> {
    let backend = build_backend(&spec.storage, &spec.node.public_url)
        .await
        .context("failed to open the configured storage backend")?;

    let allocations = AllocationStore::new(backend.store.clone(), backend.encoder);
    let acceptances = AcceptanceStore::new(backend.store.clone(), backend.encoder);
    let receipts = ReceiptStore::new(backend.store.clone());
    let blobs = storage_node_core::blob::blob_store::BlobStore::new(backend.store.clone(), backend.encoder);
    let consolidation_backend = backend.store.clone();

    let advertiser: Arc<dyn storage_node_core::capability_server::accept::ContentAdvertiser> =
        match &spec.collaborators.index_service_url {
            Some(url) => Arc::new(HttpContentAdvertiser::new(url.clone()).context("failed to build index-service HTTP client")?),
            None => Arc::new(storage_node_core::capability_server::accept::NullContentAdvertiser),
        };

    let server = Arc::new(CapabilityServer::new(
        node_identity,
        signing_key,
        allocations,
        acceptances,
        receipts,
        blobs,
        backend.presigner,
        None,
        advertiser,
        Duration::from_secs(spec.runtime.presign_ttl_seconds),
        spec.node.public_url.clone(),
    ));

    let journal_dir = default_journal_dir(&spec.storage);
    let journal = Arc::new(
        FilesystemJournal::open(journal_dir, spec.collaborators.max_batch_size)
            .await
            .context("failed to open the egress journal")?,
    );

    let tracker = match &spec.collaborators.tracker_url {
        Some(tracker_url) => {
            let client = Arc::new(HttpTrackerClient::new(spec.collaborators.tracker_proof.clone()).context("failed to build tracker HTTP client")?);
            let consolidations = ConsolidationStore::new(consolidation_backend);
            Some(Arc::new(EgressTracker::new(client, consolidations, tracker_url.clone(), Duration::from_secs(60))))
        }
        None => None,
    };

    Ok(Node {
        server,
        journal,
        rotation_tick: Duration::from_millis(spec.runtime.rotation_tick_millis),
        tracker,
        tracker_workers: spec.runtime.tracker_workers.max(1),
    })
}

fn default_journal_dir(storage: &storage_node_core::domain::node_config::StorageBackendConfig) -> std::path::PathBuf {
    use storage_node_core::domain::node_config::StorageBackendConfig;
    match storage {
        StorageBackendConfig::Local { base_path, .. } => std::path::PathBuf::from(base_path).join("egress"),
        StorageBackendConfig::EmbeddedKv { path } => std::path::PathBuf::from(path).join("egress"),
        StorageBackendConfig::S3 { .. } => std::path::PathBuf::from("/var/lib/storage-node/egress"),
    }
}

/// Spawns the rotator and, if configured, the tracker worker loop. Both
/// exit when `cancel` fires.
pub fn spawn_background_tasks(node: &Node, cancel: CancellationToken) -> Vec<tokio::task::JoinHandle<()>> {
    let mut handles = Vec::new();

    if let Some(tracker) = node.tracker.clone() {
        let rotation_sink = tracker.clone();
        let rotator = Rotator::new(node.journal.clone(), rotation_sink, node.rotation_tick);
        let rotator_cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            rotator.run(rotator_cancel).await;
        }));

        for _ in 0..node.tracker_workers {
            let tracker = tracker.clone();
            let tracker_cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                tracker.run(tracker_cancel).await;
            }));
        }
    }

    handles
}
