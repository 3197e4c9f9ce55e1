//! Access to the retrieval queue from the box service.

use std::time::Duration;

use keeper_core::error::KeeperError;
use keeper_core::models::{DequeueResponse, QueueItem, SyncResponse, API_VERSION};
use keeper_core::Queue;
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::action::{Envelope, ErrorBody};

/// Default per-request timeout of [`QueueClient`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("queue request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("queue service answered {}: {}", .error.code, .error.message)]
    Remote { status: u16, error: ErrorBody },

    #[error("queue service answered HTTP {status} at {url}")]
    Status { status: u16, url: String },

    #[error("unreadable queue response: {0}")]
    Decode(String),

    #[error(transparent)]
    Queue(#[from] KeeperError),
}

// ---------------------------------------------------------------------------
// QueueClient
// ---------------------------------------------------------------------------

/// Speaks the action protocol to a remote queue service.
#[derive(Debug, Clone)]
pub struct QueueClient {
    endpoint: String,
    http: reqwest::Client,
}

impl QueueClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_timeout(endpoint, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            http,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Ask the queue to take a score update.
    pub async fn sync(&self, item: &QueueItem) -> Result<(), ClientError> {
        let _: SyncResponse = self.call("Sync", Some(item)).await?;
        Ok(())
    }

    /// Ask the queue for the next box to serve.
    pub async fn dequeue(&self) -> Result<String, ClientError> {
        let resp: DequeueResponse = self.call::<(), _>("Dequeue", None).await?;
        Ok(resp.id)
    }

    async fn call<B, T>(&self, action: &str, body: Option<&B>) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self
            .http
            .post(&self.endpoint)
            .query(&[("Action", action), ("Version", API_VERSION)]);
        let request = match body {
            Some(body) => request.json(body),
            None => request.header(CONTENT_TYPE, "application/json"),
        };
        let response = request.send().await?;
        let status = response.status();
        let url = response.url().to_string();
        let bytes = response.bytes().await?;
        let envelope = serde_json::from_slice::<Envelope<T>>(&bytes);

        if !status.is_success() {
            return Err(match envelope {
                Ok(Envelope {
                    error: Some(error), ..
                }) => ClientError::Remote {
                    status: status.as_u16(),
                    error,
                },
                _ => ClientError::Status {
                    status: status.as_u16(),
                    url,
                },
            });
        }

        let envelope = envelope.map_err(|e| ClientError::Decode(e.to_string()))?;
        if let Some(error) = envelope.error {
            return Err(ClientError::Remote {
                status: status.as_u16(),
                error,
            });
        }
        envelope
            .result
            .ok_or_else(|| ClientError::Decode(format!("{action} response carries no Result")))
    }
}

// ---------------------------------------------------------------------------
// QueueHandle
// ---------------------------------------------------------------------------

/// The queue as the box service sees it: in this process or behind HTTP.
#[derive(Debug, Clone)]
pub enum QueueHandle {
    Local(Queue),
    Remote(QueueClient),
}

impl QueueHandle {
    pub async fn sync(&self, item: QueueItem) -> Result<(), ClientError> {
        match self {
            QueueHandle::Local(queue) => {
                queue.submit(item);
                Ok(())
            }
            QueueHandle::Remote(client) => client.sync(&item).await,
        }
    }

    /// Next box id, or [`KeeperError::Timeout`] once `deadline` passes.
    pub async fn dequeue(&self, deadline: Duration) -> Result<String, ClientError> {
        match self {
            QueueHandle::Local(queue) => Ok(queue.retrieve_next_within(deadline).await?),
            QueueHandle::Remote(client) => tokio::time::timeout(deadline, client.dequeue())
                .await
                .map_err(|_| ClientError::Queue(KeeperError::Timeout))?,
        }
    }
}
