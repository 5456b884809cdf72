//! HTTP delivery client for the collection endpoint.
//!
//! One call submits one record and classifies the result. Transport failures
//! (no connection, timeout, I/O) are recoverable. Any response the collector
//! actually produced with a non-success status is unrecoverable: the payload
//! was seen and refused, so resending the same bytes cannot succeed.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::{EventRecord, PipelineError, PipelineResult};

/// Default collector base URL.
pub const DEFAULT_COLLECTOR_URL: &str = "http://127.0.0.1:8787";

/// Path events are posted to, relative to the collector base URL.
pub const EVENT_PATH: &str = "/event";

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest response body excerpt kept in a failure message.
const MAX_ERROR_MESSAGE_LEN: usize = 512;

/// Sender configuration.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Base URL of the collector.
    pub collector_url: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Optional bearer token.
    pub auth_token: Option<String>,
    /// User agent sent with every request.
    pub user_agent: String,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            collector_url: DEFAULT_COLLECTOR_URL.to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            auth_token: None,
            user_agent: format!("event-pipeline/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Classified result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The collector accepted the event.
    Delivered,
    /// The request never produced a response; expected to self-resolve.
    RecoverableFailure {
        /// Transport error description.
        reason: String,
    },
    /// The collector refused the event; retrying will not help.
    UnrecoverableFailure {
        /// HTTP status code.
        status: u16,
        /// Error message extracted from the response body.
        message: String,
    },
}

impl DeliveryOutcome {
    /// Short label for structured logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::RecoverableFailure { .. } => "recoverable",
            Self::UnrecoverableFailure { .. } => "unrecoverable",
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Submits one event record to the collector.
///
/// Implementations hold no shared mutable state and may be called
/// concurrently.
#[async_trait]
pub trait EventSender: Send + Sync {
    async fn send(&self, record: &EventRecord) -> DeliveryOutcome;
}

/// Reqwest-backed sender posting JSON to `{collector_url}/event`.
#[derive(Debug, Clone)]
pub struct HttpEventSender {
    client: Client,
    endpoint: Url,
    auth_token: Option<String>,
}

impl HttpEventSender {
    /// Create a new sender.
    pub fn new(config: SenderConfig) -> PipelineResult<Self> {
        let base = config.collector_url.trim_end_matches('/');
        let endpoint = Url::parse(&format!("{base}{EVENT_PATH}")).map_err(|e| {
            PipelineError::Config(format!("invalid collector url {:?}: {e}", config.collector_url))
        })?;

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent)
            .build()?;

        Ok(Self {
            client,
            endpoint,
            auth_token: config.auth_token,
        })
    }

    /// The fully resolved event endpoint.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl EventSender for HttpEventSender {
    async fn send(&self, record: &EventRecord) -> DeliveryOutcome {
        let mut request = self.client.post(self.endpoint.clone()).json(&record.wire());
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        debug!(
            url = %self.endpoint,
            event_type = %record.event_type(),
            retry_count = record.retry_count(),
            "Sending event"
        );

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let reason = describe_transport_error(&e);
                warn!(event_type = %record.event_type(), error = %e, "Event send failed in transport");
                return DeliveryOutcome::RecoverableFailure { reason };
            }
        };

        let status = response.status();
        if status.is_success() {
            return DeliveryOutcome::Delivered;
        }

        let body = response.text().await.unwrap_or_default();
        let message = error_message(status, &body);
        warn!(
            event_type = %record.event_type(),
            status = status.as_u16(),
            message = %message,
            "Collector rejected event"
        );
        DeliveryOutcome::UnrecoverableFailure {
            status: status.as_u16(),
            message,
        }
    }
}

fn describe_transport_error(error: &reqwest::Error) -> String {
    let kind = if error.is_timeout() {
        "timeout"
    } else if error.is_connect() {
        "connect"
    } else if error.is_body() {
        "body"
    } else {
        "request"
    };
    format!("{kind}: {error}")
}

/// Extracts a message from a structured error body.
///
/// Understands `{"error": "..."}`, `{"error": {"message": "..."}}` and
/// `{"message": "..."}`; anything else falls back to the raw body or the
/// status reason.
fn error_message(status: StatusCode, body: &str) -> String {
    let structured = serde_json::from_str::<Value>(body).ok().and_then(|value| {
        let error = value.get("error");
        error
            .and_then(|e| e.as_str())
            .or_else(|| error.and_then(|e| e.get("message")).and_then(|m| m.as_str()))
            .or_else(|| value.get("message").and_then(|m| m.as_str()))
            .map(str::to_string)
    });

    let message = match structured {
        Some(message) => message,
        None if !body.trim().is_empty() => body.trim().to_string(),
        None => status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string(),
    };

    truncate(message, MAX_ERROR_MESSAGE_LEN)
}

fn truncate(mut message: String, max_len: usize) -> String {
    if message.len() > max_len {
        let mut cut = max_len;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
        message.push_str("...");
    }
    message
}
