//! Push delivery: provider wire types, HTTP client and the batch dispatcher.
//!
//! The provider accepts at most 100 messages per request and answers with one
//! ticket per message, in request order. `BatchDispatcher` splits a fan-out
//! into chunks, submits them with bounded concurrency and reassembles the
//! results in submission order. A failed chunk only affects its own messages.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use chit_common::config::{MAX_PUSH_BATCH_SIZE, PushConfig};
use chit_common::types::{ComposedMessage, DeliveryChannel, DeliveryResult, Urgency};

use crate::error::NotifierError;

/// One element of the provider request array.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushMessage {
    pub to: String,
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub android: Option<AndroidHints>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AndroidHints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
}

impl PushMessage {
    /// Address a composed message to one device, mapping urgency onto provider hints.
    pub fn for_device(token: impl Into<String>, message: &ComposedMessage) -> Self {
        let (priority, channel_id, android_priority) = match message.urgency {
            Urgency::Urgent => ("high", "urgent", "max"),
            Urgency::Routine => ("normal", "default", "high"),
        };

        Self {
            to: token.into(),
            title: message.title.clone(),
            body: message.body.clone(),
            data: Some(message.data.clone()),
            priority: Some(priority.to_string()),
            sound: Some("default".to_string()),
            android: Some(AndroidHints {
                channel_id: Some(channel_id.to_string()),
                priority: Some(android_priority.to_string()),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Ok,
    Error,
}

/// Provider verdict for one submitted message.
#[derive(Debug, Clone, Deserialize)]
pub struct PushTicket {
    pub status: TicketStatus,
    pub id: Option<String>,
    pub message: Option<String>,
    pub details: Option<serde_json::Value>,
}

impl PushTicket {
    fn into_result(self, recipient: String) -> DeliveryResult {
        match self.status {
            TicketStatus::Ok => DeliveryResult::ok(DeliveryChannel::Push, Some(recipient), self.id),
            TicketStatus::Error => {
                let detail = self
                    .details
                    .as_ref()
                    .and_then(|d| d.get("error"))
                    .and_then(|e| e.as_str())
                    .map(str::to_string);
                let message = match (self.message, detail) {
                    (Some(msg), Some(code)) => format!("{msg} ({code})"),
                    (Some(msg), None) => msg,
                    (None, Some(code)) => code,
                    (None, None) => "push provider reported an error".to_string(),
                };
                DeliveryResult::error(DeliveryChannel::Push, Some(recipient), message)
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct PushResponse {
    data: Vec<PushTicket>,
}

/// A push provider that accepts one chunk per call.
#[async_trait]
pub trait PushClient: Send + Sync {
    /// Submit one chunk. On success returns one ticket per message, in order.
    async fn send_chunk(&self, chunk: &[PushMessage]) -> Result<Vec<PushTicket>, NotifierError>;
}

/// Push client for the provider's JSON-array HTTP endpoint.
pub struct HttpPushClient {
    http: reqwest::Client,
    url: String,
    access_token: Option<String>,
}

impl HttpPushClient {
    pub fn new(config: &PushConfig) -> Result<Self, NotifierError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            url: config.url.clone(),
            access_token: config.access_token.clone(),
        })
    }
}

#[async_trait]
impl PushClient for HttpPushClient {
    async fn send_chunk(&self, chunk: &[PushMessage]) -> Result<Vec<PushTicket>, NotifierError> {
        let mut request = self
            .http
            .post(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(chunk);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifierError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: PushResponse = response
            .json()
            .await
            .map_err(|e| NotifierError::MalformedResponse(e.to_string()))?;
        Ok(parsed.data)
    }
}

/// Splits push messages into provider-sized chunks and collects one result per message.
pub struct BatchDispatcher {
    client: Arc<dyn PushClient>,
    batch_size: usize,
    max_in_flight: usize,
}

impl BatchDispatcher {
    pub fn new(client: Arc<dyn PushClient>, config: &PushConfig) -> Self {
        Self::with_limits(client, config.batch_size, config.max_in_flight)
    }

    pub fn with_limits(client: Arc<dyn PushClient>, batch_size: usize, max_in_flight: usize) -> Self {
        Self {
            client,
            batch_size: batch_size.clamp(1, MAX_PUSH_BATCH_SIZE),
            max_in_flight: max_in_flight.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Submit every message and return results in input order.
    ///
    /// The output always has exactly `messages.len()` entries. No retries.
    pub async fn send(&self, messages: &[PushMessage]) -> Vec<DeliveryResult> {
        if messages.is_empty() {
            return Vec::new();
        }

        let chunk_count = messages.len().div_ceil(self.batch_size);
        tracing::debug!(
            messages = messages.len(),
            chunks = chunk_count,
            max_in_flight = self.max_in_flight,
            "Submitting push chunks"
        );

        // Collected first: a closure inside the stream makes the future non-`Send`.
        let pending: Vec<_> = messages
            .chunks(self.batch_size)
            .enumerate()
            .map(|(index, chunk)| self.submit_chunk(index, chunk))
            .collect();

        // `buffered` yields in input order regardless of completion order.
        let per_chunk: Vec<Vec<DeliveryResult>> = futures::stream::iter(pending)
            .buffered(self.max_in_flight)
            .collect()
            .await;

        per_chunk.into_iter().flatten().collect()
    }

    async fn submit_chunk(&self, index: usize, chunk: &[PushMessage]) -> Vec<DeliveryResult> {
        let outcome = match self.client.send_chunk(chunk).await {
            Ok(tickets) if tickets.len() == chunk.len() => Ok(tickets),
            Ok(tickets) => Err(NotifierError::MalformedResponse(format!(
                "expected {} tickets, got {}",
                chunk.len(),
                tickets.len()
            ))),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(tickets) => tickets
                .into_iter()
                .zip(chunk)
                .map(|(ticket, message)| ticket.into_result(message.to.clone()))
                .collect(),
            Err(e) => {
                tracing::warn!(
                    chunk = index,
                    size = chunk.len(),
                    error = %e,
                    "Push chunk failed; marking all its messages as errors"
                );
                let reason = e.to_string();
                chunk
                    .iter()
                    .map(|m| DeliveryResult::error(DeliveryChannel::Push, Some(m.to.clone()), &reason))
                    .collect()
            }
        }
    }
}
