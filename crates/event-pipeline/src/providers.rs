//! Host-supplied identity, session, and activation state.
//!
//! The pipeline never owns these values; it asks the host each time it builds
//! a record or considers starting a drain.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Device identity provider.
pub trait DeviceIdentity: Send + Sync {
    /// Stable device identifier, or `None` before one is known.
    fn current_device_id(&self) -> Option<String>;

    /// Signed-in user, if any.
    fn current_user_id(&self) -> Option<String> {
        None
    }
}

/// Session provider.
pub trait SessionSource: Send + Sync {
    fn current_session_id(&self) -> Option<String>;
}

/// Host readiness.
pub trait ActivationState: Send + Sync {
    /// Whether the host has configured the pipeline. `log` fails fast otherwise.
    fn is_configured(&self) -> bool;

    /// Whether background drains may run.
    fn is_ready(&self) -> bool;
}

/// Everything the pipeline needs from its host.
///
/// Automatically implemented for any type implementing all three traits.
pub trait HostContext: DeviceIdentity + SessionSource + ActivationState {}

impl<T: DeviceIdentity + SessionSource + ActivationState> HostContext for T {}

#[derive(Debug, Default, Clone)]
struct HostState {
    device_id: Option<String>,
    user_id: Option<String>,
    session_id: Option<String>,
    configured: bool,
    ready: bool,
}

/// Host context backed by settable in-memory values.
#[derive(Debug, Default)]
pub struct StaticHost {
    state: RwLock<HostState>,
}

impl StaticHost {
    /// An unconfigured host with no identity.
    pub fn new() -> Self {
        Self::default()
    }

    /// A configured and ready host for `device_id`.
    pub fn ready(device_id: impl Into<String>) -> Self {
        Self {
            state: RwLock::new(HostState {
                device_id: Some(device_id.into()),
                configured: true,
                ready: true,
                ..Default::default()
            }),
        }
    }

    pub fn set_device_id(&self, device_id: Option<String>) {
        self.write().device_id = device_id;
    }

    pub fn set_user_id(&self, user_id: Option<String>) {
        self.write().user_id = user_id;
    }

    pub fn set_session_id(&self, session_id: Option<String>) {
        self.write().session_id = session_id;
    }

    pub fn set_configured(&self, configured: bool) {
        self.write().configured = configured;
    }

    pub fn set_ready(&self, ready: bool) {
        self.write().ready = ready;
    }

    fn read(&self) -> RwLockReadGuard<'_, HostState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HostState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DeviceIdentity for StaticHost {
    fn current_device_id(&self) -> Option<String> {
        self.read().device_id.clone()
    }

    fn current_user_id(&self) -> Option<String> {
        self.read().user_id.clone()
    }
}

impl SessionSource for StaticHost {
    fn current_session_id(&self) -> Option<String> {
        self.read().session_id.clone()
    }
}

impl ActivationState for StaticHost {
    fn is_configured(&self) -> bool {
        self.read().configured
    }

    fn is_ready(&self) -> bool {
        self.read().ready
    }
}
