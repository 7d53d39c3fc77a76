// Copyright (c) 2026 Storage Node Contributors
// SPDX-License-Identifier: AGPL-3.0

//! HTTP implementation of [`ContentAdvertiser`], the boundary to the
//! external index/advertising service named in `spec.md` §4.11's
//! collaborator list. The PDP aggregation subsystem has no equivalent
//! concrete client here: `spec.md` §1 names it out of scope entirely, so
//! [`super::accept::NullPdpSubmitter`] is the only implementation this
//! crate ships.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;

use crate::capability_server::accept::ContentAdvertiser;
use crate::domain::digest::Digest;
use crate::domain::errors::CoreError;

#[derive(Serialize)]
struct AdvertiseRequest<'a> {
    digest: String,
    provider_url: &'a str,
}

pub struct HttpContentAdvertiser {
    client: Client,
    index_service_url: String,
}

impl HttpContentAdvertiser {
    pub fn new(index_service_url: impl Into<String>) -> Result<Self, CoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| CoreError::Transient(e.to_string()))?;
        Ok(Self {
            client,
            index_service_url: index_service_url.into(),
        })
    }
}

#[async_trait::async_trait]
impl ContentAdvertiser for HttpContentAdvertiser {
    async fn advertise(&self, digest: &Digest, provider_url: &str) -> Result<(), CoreError> {
        let response = self
            .client
            .post(&self.index_service_url)
            .json(&AdvertiseRequest {
                digest: digest.to_hex(),
                provider_url,
            })
            .send()
            .await
            .map_err(|e| CoreError::Transient(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CoreError::Transient(format!("index service responded with {}", response.status())));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn advertise_posts_digest_and_provider_url() {
        let mut server = mockito::Server::new_async().await;
        let digest = Digest::of(b"piece");
        let mock = server
            .mock("POST", "/advertise")
            .match_body(mockito::Matcher::JsonString(format!(
                r#"{{"digest":"{}","provider_url":"https://node.example/piece"}}"#,
                digest.to_hex(),
            )))
            .with_status(200)
            .create_async()
            .await;

        let advertiser = HttpContentAdvertiser::new(format!("{}/advertise", server.url())).unwrap();
        advertiser.advertise(&digest, "https://node.example/piece").await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn advertise_surfaces_non_success_status_as_transient() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("POST", "/advertise").with_status(500).create_async().await;

        let advertiser = HttpContentAdvertiser::new(format!("{}/advertise", server.url())).unwrap();
        let err = advertiser.advertise(&Digest::of(b"piece"), "https://node.example/piece").await.unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, CoreError::Transient(_)));
    }
}
