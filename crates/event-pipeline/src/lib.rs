//! Durable event delivery.
//!
//! This crate provides:
//! - EventPipeline: `log` with an immediate send and fallback to the durable store
//! - FlushCoordinator: single-flight background drain under a time budget
//! - EventStore: SQLite-backed (or in-memory) queue of pending event records
//! - HttpEventSender: posts one event to the collector and classifies the outcome
//! - RetryPolicy: bounded retry with TTL expiry

mod budget;
mod client;
mod clock;
mod connectivity;
mod coordinator;
mod error;
mod pipeline;
mod providers;
mod record;
mod retry;
pub mod store;

#[cfg(test)]
mod tests;

pub use budget::{DeadlineBudget, ExecutionBudget, WorkPermit, DEFAULT_DRAIN_BUDGET};
pub use client::{
    DeliveryOutcome, EventSender, HttpEventSender, SenderConfig, DEFAULT_COLLECTOR_URL,
    DEFAULT_REQUEST_TIMEOUT, EVENT_PATH,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use connectivity::{Connectivity, ConnectivitySignal};
pub use coordinator::{CoordinatorState, DrainReport, DrainTrigger, FlushCoordinator, StopReason};
pub use error::{PipelineError, PipelineResult, StoreError, StoreResult};
pub use pipeline::{EventPipeline, LoggerConfig, PipelineBuilder};
pub use providers::{ActivationState, DeviceIdentity, HostContext, SessionSource, StaticHost};
pub use record::{event_types, EventData, EventRecord, NewEvent, WireEvent, DEFAULT_TTL_SECONDS};
pub use retry::{Action, RetryPolicy, DEFAULT_MAX_RETRIES};
pub use store::{EventStore, MemoryEventStore, SqliteEventStore, StoredEventId};
