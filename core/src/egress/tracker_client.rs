// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0

//! HTTP implementation of [`TrackerClient`], the boundary to the external
//! egress tracker service. `spec.md` §1 treats the tracker's own protocol
//! as out of scope; this client only needs to speak whatever shape it
//! expects a `track` call to take, which here is a small JSON envelope
//! carrying the rotated batch's CID and this node's delegation proof.

use std::str::FromStr;
use std::time::Duration;

use cid::Cid;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::domain::errors::CoreError;
use crate::domain::link::Link;
use crate::egress::tracker::{ConsolidateEffect, TrackResponse, TrackerClient};

#[derive(Serialize)]
struct TrackRequest<'a> {
    batch_cid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    proof: Option<&'a str>,
}

#[derive(Deserialize)]
struct TrackApiResponse {
    ok: bool,
    #[serde(default)]
    consolidate: Option<ConsolidateApiEffect>,
}

#[derive(Deserialize)]
struct ConsolidateApiEffect {
    track_invocation: String,
    consolidate_invocation_cid: String,
}

pub struct HttpTrackerClient {
    client: Client,
    proof: Option<String>,
}

impl HttpTrackerClient {
    pub fn new(proof: Option<String>) -> Result<Self, CoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CoreError::Transient(e.to_string()))?;
        Ok(Self { client, proof })
    }
}

#[async_trait::async_trait]
impl TrackerClient for HttpTrackerClient {
    async fn track(&self, batch_cid: Cid, endpoint_url: &str) -> Result<TrackResponse, CoreError> {
        let response = self
            .client
            .post(endpoint_url)
            .json(&TrackRequest {
                batch_cid: batch_cid.to_string(),
                proof: self.proof.as_deref(),
            })
            .send()
            .await
            .map_err(|e| CoreError::Transient(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CoreError::Transient(format!("tracker responded with {}", response.status())));
        }

        let body: TrackApiResponse = response.json().await.map_err(|e| CoreError::Transient(e.to_string()))?;

        let consolidate = match body.consolidate {
            Some(effect) => Some(ConsolidateEffect {
                track_invocation: Link::from_str(&effect.track_invocation)
                    .map_err(|e| CoreError::DataInconsistent { reason: e.to_string() })?,
                consolidate_invocation_cid: Link::from_str(&effect.consolidate_invocation_cid)
                    .map_err(|e| CoreError::DataInconsistent { reason: e.to_string() })?,
            }),
            None => None,
        };

        Ok(TrackResponse { ok: body.ok, consolidate })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::digest::Digest;

    fn test_cid() -> Cid {
        *Link::from_digest(&Digest::of(b"batch")).cid()
    }

    #[tokio::test]
    async fn track_parses_a_consolidate_effect() {
        let mut server = mockito::Server::new_async().await;
        let track_cid = Link::from_digest(&Digest::of(b"track-invocation"));
        let consolidate_cid = Link::from_digest(&Digest::of(b"consolidate-invocation"));
        let mock = server
            .mock("POST", "/track")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(
                r#"{{"ok":true,"consolidate":{{"track_invocation":"{track_cid}","consolidate_invocation_cid":"{consolidate_cid}"}}}}"#,
            ))
            .create_async()
            .await;

        let client = HttpTrackerClient::new(Some("proof-token".to_string())).unwrap();
        let response = client.track(test_cid(), &format!("{}/track", server.url())).await.unwrap();

        mock.assert_async().await;
        assert!(response.ok);
        let effect = response.consolidate.expect("consolidate effect");
        assert_eq!(effect.track_invocation, track_cid);
        assert_eq!(effect.consolidate_invocation_cid, consolidate_cid);
    }

    #[tokio::test]
    async fn track_surfaces_non_success_status_as_transient() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("POST", "/track").with_status(503).create_async().await;

        let client = HttpTrackerClient::new(None).unwrap();
        let err = client.track(test_cid(), &format!("{}/track", server.url())).await.unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, CoreError::Transient(_)));
    }
}
