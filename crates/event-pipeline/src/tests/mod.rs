//! Integration tests for the event pipeline.
//!
//! Test organization:
//!
//! - `harness.rs`     - Scripted sender, manual budget, and a wired pipeline
//! - `logger.rs`      - I. Logging: fail-fast checks, immediate send, fallback to the store
//! - `coordinator.rs` - II. Draining: ordering, single-flight, budget, triggers
//! - `properties.rs`  - III. Delivery guarantees: expiry, retry ceiling, at-least-once
//! - `suspension.rs`  - IV. Connectivity: suspend on loss, resume on restore

mod suspension;
