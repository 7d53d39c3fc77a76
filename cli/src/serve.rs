// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0

//! The `serve` command: build a [`crate::node::Node`] from a manifest and
//! run its HTTP surface to completion, watching for SIGINT/SIGTERM and the
//! `/admin/shutdown` endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use storage_node_core::domain::node_config::NodeConfigManifest;
use storage_node_core::http::app::app;

use crate::config::resolve_signing_key;
use crate::node::{build_node, spawn_background_tasks};

pub async fn run(manifest: NodeConfigManifest) -> Result<()> {
    let (signing_key, did) = resolve_signing_key(&manifest.spec.node.signer_key)?;
    if manifest.spec.node.id != did.to_string() {
        tracing::warn!(
            configured = %manifest.spec.node.id,
            derived = %did,
            "node.id in the manifest does not match the key's derived did:key; using the derived value"
        );
    }

    install_metrics_exporter(&manifest)?;

    let node = build_node(&manifest.spec, signing_key, did).await.context("failed to build node")?;

    let shutdown = CancellationToken::new();
    let background = spawn_background_tasks(&node, shutdown.clone());

    let network = manifest.spec.network.clone().unwrap_or(storage_node_core::domain::node_config::NetworkConfig {
        bind_address: "0.0.0.0".to_string(),
        port: 8080,
        tls: None,
        admin_enabled: true,
    });

    let router = app(node.server.clone(), node.journal.clone() as Arc<dyn storage_node_core::egress::journal::Journal>, shutdown.clone(), network.admin_enabled);

    let addr: SocketAddr = format!("{}:{}", network.bind_address, network.port)
        .parse()
        .context("invalid bind_address/port in network config")?;

    tracing::info!(node = %did, %addr, "storage node listening");

    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("failed to bind {addr}"))?;

    let shutdown_signal = shutdown.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = shutdown_signal.cancelled() => {}
                _ = wait_for_terminate() => {}
            }
        })
        .await
        .context("HTTP server exited with an error")?;

    shutdown.cancel();
    for handle in background {
        let _ = handle.await;
    }

    Ok(())
}

/// Starts the Prometheus scrape listener if `observability.metrics` opts
/// in (the default, absent any config at all). A failure here is fatal at
/// startup rather than degrading silently — an operator who configured a
/// metrics port expects it to actually be listening.
fn install_metrics_exporter(manifest: &NodeConfigManifest) -> Result<()> {
    let enabled = manifest
        .spec
        .observability
        .as_ref()
        .and_then(|o| o.metrics.as_ref())
        .map(|m| m.enabled)
        .unwrap_or(true);
    if !enabled {
        return Ok(());
    }
    let port = manifest.spec.observability.as_ref().and_then(|o| o.metrics.as_ref()).map(|m| m.port).unwrap_or(9090);
    let addr: SocketAddr = format!("0.0.0.0:{port}").parse().context("invalid metrics port")?;

    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("failed to install the Prometheus metrics exporter")?;
    tracing::info!(%addr, "prometheus metrics listening");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_terminate() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_terminate() {
    let _ = tokio::signal::ctrl_c().await;
}
