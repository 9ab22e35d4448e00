//! Remote authority over HTTP
//!
//! Talks to the routes served by `ledger-authority`:
//! `GET /api/events[?since=<seq>]` and `POST /api/events`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::types::Event;

use super::remote::{AppendAck, RemoteAuthority, RemotePage};
use super::SyncError;

pub struct HttpAuthority {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpAuthority {
    /// Client for the authority at `base_url`, each request bounded by `timeout`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn events_url(&self) -> String {
        format!("{}/api/events", self.base_url)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, SyncError> {
        let response = request.send().await.map_err(|e| self.classify(e))?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SyncError::Remote {
                status: status.as_u16(),
                message,
            });
        }
        response.json::<T>().await.map_err(|e| self.classify(e))
    }

    fn classify(&self, error: reqwest::Error) -> SyncError {
        if error.is_timeout() {
            SyncError::Timeout(self.timeout)
        } else {
            SyncError::Network(error.to_string())
        }
    }
}

#[async_trait]
impl RemoteAuthority for HttpAuthority {
    async fn list_all(&self) -> Result<RemotePage, SyncError> {
        self.send(self.client.get(self.events_url())).await
    }

    async fn list_since(&self, watermark: u64) -> Result<RemotePage, SyncError> {
        let request = self
            .client
            .get(self.events_url())
            .query(&[("since", watermark)]);
        self.send(request).await
    }

    async fn append(&self, events: Vec<Event>) -> Result<AppendAck, SyncError> {
        debug!(count = events.len(), url = %self.events_url(), "pushing events");
        self.send(self.client.post(self.events_url()).json(&events)).await
    }
}
