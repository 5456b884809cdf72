//! Event pipeline: the public entry point.
//!
//! `log` makes one immediate delivery attempt. Only a recoverable failure puts
//! the record in the durable store, after which the flush coordinator owns it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::coordinator::{CoordinatorState, DrainReport, DrainTrigger, FlushCoordinator};
use crate::record::{event_types, DEFAULT_TTL_SECONDS};
use crate::store::EventStore;
use crate::{
    Clock, ConnectivitySignal, DeadlineBudget, DeliveryOutcome, EventRecord, EventSender,
    ExecutionBudget, HostContext, NewEvent, PipelineError, PipelineResult, RetryPolicy,
    SystemClock,
};

/// Logger settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggerConfig {
    /// TTL stamped on every new record.
    pub ttl_seconds: i64,
    /// Event types dropped instead of queued after a recoverable failure.
    pub discardable_event_types: HashSet<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: DEFAULT_TTL_SECONDS,
            discardable_event_types: HashSet::from([event_types::SESSION_PING.to_string()]),
        }
    }
}

impl LoggerConfig {
    pub fn is_discardable(&self, event_type: &str) -> bool {
        self.discardable_event_types.contains(event_type)
    }
}

/// Builder for [`EventPipeline`].
///
/// Store, sender, and host are required; everything else has a default.
pub struct PipelineBuilder {
    store: Arc<dyn EventStore>,
    sender: Arc<dyn EventSender>,
    host: Arc<dyn HostContext>,
    budget: Arc<dyn ExecutionBudget>,
    connectivity: ConnectivitySignal,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    config: LoggerConfig,
}

impl PipelineBuilder {
    pub fn budget(mut self, budget: Arc<dyn ExecutionBudget>) -> Self {
        self.budget = budget;
        self
    }

    pub fn connectivity(mut self, connectivity: ConnectivitySignal) -> Self {
        self.connectivity = connectivity;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn logger_config(mut self, config: LoggerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> EventPipeline {
        let coordinator = Arc::new(FlushCoordinator::new(
            self.store.clone(),
            self.sender.clone(),
            self.host.clone(),
            self.budget,
            self.connectivity.clone(),
            self.clock.clone(),
            self.policy,
        ));

        EventPipeline {
            config: self.config,
            store: self.store,
            sender: self.sender,
            host: self.host,
            clock: self.clock,
            connectivity: self.connectivity,
            coordinator,
            shutdown: CancellationToken::new(),
            listener: Mutex::new(None),
        }
    }
}

/// Durable event pipeline.
pub struct EventPipeline {
    config: LoggerConfig,
    store: Arc<dyn EventStore>,
    sender: Arc<dyn EventSender>,
    host: Arc<dyn HostContext>,
    clock: Arc<dyn Clock>,
    connectivity: ConnectivitySignal,
    coordinator: Arc<FlushCoordinator>,
    shutdown: CancellationToken,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl EventPipeline {
    pub fn builder(
        store: Arc<dyn EventStore>,
        sender: Arc<dyn EventSender>,
        host: Arc<dyn HostContext>,
    ) -> PipelineBuilder {
        PipelineBuilder {
            store,
            sender,
            host,
            budget: Arc::new(DeadlineBudget::default()),
            connectivity: ConnectivitySignal::default(),
            clock: Arc::new(SystemClock),
            policy: RetryPolicy::default(),
            config: LoggerConfig::default(),
        }
    }

    /// Start listening for connectivity changes. Idempotent.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut listener = self
            .listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if listener.is_some() {
            return;
        }
        *listener = Some(
            self.coordinator
                .spawn_connectivity_listener(self.shutdown.child_token()),
        );
        info!("Event pipeline started");
    }

    /// Stop the connectivity listener. Pending records stay in the store.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handle = self
            .listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Connectivity listener ended abnormally");
            }
        }
        info!("Event pipeline stopped");
    }

    /// Log one event.
    ///
    /// Fails fast, with no network attempt, when the host is not configured,
    /// no device identity is known, or the event type is empty. Returns
    /// `Rejected` if the collector refuses the immediate attempt. A
    /// recoverable failure is not an error: the record is persisted (unless
    /// its type is discardable) and a drain is scheduled.
    pub async fn log(&self, event: NewEvent) -> PipelineResult<()> {
        if !self.host.is_configured() {
            return Err(PipelineError::NotConfigured);
        }
        let device_id = self
            .host
            .current_device_id()
            .filter(|id| !id.is_empty())
            .ok_or(PipelineError::DeviceUnavailable)?;
        if event.event_type.trim().is_empty() {
            return Err(PipelineError::InvalidEvent(
                "event type must not be empty".to_string(),
            ));
        }

        let session_id = event
            .session_id
            .or_else(|| self.host.current_session_id());
        let record = EventRecord::new(event.event_type, device_id, self.clock.now_millis())
            .with_session_id(session_id)
            .with_notification_id(event.notification_id)
            .with_user_id(self.host.current_user_id())
            .with_data(event.data)
            .with_ttl_seconds(self.config.ttl_seconds);

        match self.sender.send(&record).await {
            DeliveryOutcome::Delivered => {
                debug!(event_type = %record.event_type(), "Event delivered");
                Ok(())
            }
            DeliveryOutcome::RecoverableFailure { reason } => {
                if self.config.is_discardable(record.event_type()) {
                    info!(
                        event_type = %record.event_type(),
                        reason = %reason,
                        "Dropping discardable event after failed send"
                    );
                    return Ok(());
                }

                let id = self.store.insert(&record)?;
                info!(
                    id = %id,
                    event_type = %record.event_type(),
                    reason = %reason,
                    "Event queued for retry"
                );
                self.coordinator.trigger(DrainTrigger::Enqueued);
                Ok(())
            }
            DeliveryOutcome::UnrecoverableFailure { status, message } => {
                Err(PipelineError::Rejected { status, message })
            }
        }
    }

    /// Schedule a background drain. Returns false if one is already running
    /// or the host is not ready.
    pub fn flush(&self) -> bool {
        self.coordinator.trigger(DrainTrigger::Manual)
    }

    /// Drain on the calling task and return the pass summary.
    pub async fn flush_and_wait(&self) -> Option<DrainReport> {
        self.coordinator.run_drain(DrainTrigger::Manual).await
    }

    /// Notify the pipeline that host activation completed.
    pub fn activated(&self) -> bool {
        self.coordinator.trigger(DrainTrigger::Activated)
    }

    pub fn pending_count(&self) -> PipelineResult<usize> {
        Ok(self.store.len()?)
    }

    pub fn state(&self) -> CoordinatorState {
        self.coordinator.state()
    }

    pub fn coordinator(&self) -> &Arc<FlushCoordinator> {
        &self.coordinator
    }

    pub fn connectivity(&self) -> &ConnectivitySignal {
        &self.connectivity
    }
}

impl Drop for EventPipeline {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
