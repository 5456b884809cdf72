//! Event records and their wire representation.

use serde::Serialize;
use serde_json::{Map, Value};

/// Free-form event payload.
pub type EventData = Map<String, Value>;

/// Default time-to-live for an event record (24 hours).
pub const DEFAULT_TTL_SECONDS: i64 = 86_400;

/// Well-known event types.
pub mod event_types {
    /// First launch after install.
    pub const APP_INSTALL: &str = "app.install";
    /// App brought to the foreground.
    pub const APP_OPEN: &str = "app.open";
    /// App moved to the background.
    pub const APP_BACKGROUND: &str = "app.background";
    /// A session started.
    pub const SESSION_START: &str = "session.start";
    /// A session ended.
    pub const SESSION_END: &str = "session.end";
    /// Periodic session keep-alive. Stale once missed, so never queued.
    pub const SESSION_PING: &str = "session.ping";
    /// A notification was delivered to the device.
    pub const NOTIFICATION_RECEIVED: &str = "notification.received";
    /// The user opened a notification.
    pub const NOTIFICATION_OPENED: &str = "notification.opened";

    /// Prefix for application-defined analytics events.
    pub const CUSTOM_PREFIX: &str = "custom.";

    /// Builds a `custom.<name>` event type.
    pub fn custom(name: &str) -> String {
        format!("{CUSTOM_PREFIX}{name}")
    }
}

/// A request to log one event, as supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewEvent {
    /// Dotted event type, e.g. `app.install`.
    pub event_type: String,
    /// Optional payload.
    pub data: Option<EventData>,
    /// Session override; defaults to the host's current session.
    pub session_id: Option<String>,
    /// Notification correlation id.
    pub notification_id: Option<String>,
}

impl NewEvent {
    /// Create a request for the given event type.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            ..Default::default()
        }
    }

    /// Attach a payload.
    pub fn with_data(mut self, data: EventData) -> Self {
        self.data = Some(data);
        self
    }

    /// Override the session id.
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Correlate with a notification.
    pub fn with_notification_id(mut self, notification_id: impl Into<String>) -> Self {
        self.notification_id = Some(notification_id.into());
        self
    }
}

/// One occurrence to be reported to the collector.
///
/// Every field except `retry_count` is fixed at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    event_type: String,
    timestamp: i64,
    device_id: String,
    session_id: Option<String>,
    notification_id: Option<String>,
    user_id: Option<String>,
    data: Option<EventData>,
    ttl_seconds: i64,
    retry_count: u32,
}

impl EventRecord {
    /// Create a record with the default TTL and no retries.
    pub fn new(event_type: impl Into<String>, device_id: impl Into<String>, timestamp: i64) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp,
            device_id: device_id.into(),
            session_id: None,
            notification_id: None,
            user_id: None,
            data: None,
            ttl_seconds: DEFAULT_TTL_SECONDS,
            retry_count: 0,
        }
    }

    pub fn with_session_id(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn with_notification_id(mut self, notification_id: Option<String>) -> Self {
        self.notification_id = notification_id;
        self
    }

    pub fn with_user_id(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn with_data(mut self, data: Option<EventData>) -> Self {
        self.data = data;
        self
    }

    pub fn with_ttl_seconds(mut self, ttl_seconds: i64) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Creation time in milliseconds since the Unix epoch.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn notification_id(&self) -> Option<&str> {
        self.notification_id.as_deref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn data(&self) -> Option<&EventData> {
        self.data.as_ref()
    }

    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Absolute expiry instant in milliseconds since the Unix epoch.
    pub fn expires_at(&self) -> i64 {
        self.timestamp
            .saturating_add(self.ttl_seconds.saturating_mul(1000))
    }

    /// Whether the record may no longer be delivered at `now_millis`.
    pub fn is_expired(&self, now_millis: i64) -> bool {
        now_millis > self.expires_at()
    }

    /// Borrowed view in the collector's wire format.
    pub fn wire(&self) -> WireEvent<'_> {
        WireEvent {
            event_type: &self.event_type,
            timestamp: self.timestamp,
            device_id: &self.device_id,
            session_id: self.session_id.as_deref(),
            notification_id: self.notification_id.as_deref(),
            user_id: self.user_id.as_deref(),
            data: self.data.as_ref(),
        }
    }
}

/// JSON body submitted to the collector's `/event` endpoint.
///
/// Key names are a stable contract with the collector.
#[derive(Debug, Serialize)]
pub struct WireEvent<'a> {
    #[serde(rename = "type")]
    pub event_type: &'a str,
    pub timestamp: i64,
    #[serde(rename = "deviceID")]
    pub device_id: &'a str,
    #[serde(rename = "sessionID", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<&'a str>,
    #[serde(rename = "notification", skip_serializing_if = "Option::is_none")]
    pub notification_id: Option<&'a str>,
    #[serde(rename = "userID", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<&'a EventData>,
}
