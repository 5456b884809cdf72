//! Network availability as seen by the host.

use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Available,
    Unavailable,
}

impl Connectivity {
    pub fn is_available(self) -> bool {
        matches!(self, Self::Available)
    }
}

/// Shared connectivity cell.
///
/// The host calls [`set`](Self::set) on platform reachability changes. The
/// coordinator reads the current value between records and subscribes to
/// resume on `Unavailable -> Available`.
#[derive(Debug, Clone)]
pub struct ConnectivitySignal {
    tx: Arc<watch::Sender<Connectivity>>,
}

impl ConnectivitySignal {
    pub fn new(initial: Connectivity) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Record a new state. Returns true if it differs from the previous one.
    pub fn set(&self, state: Connectivity) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        })
    }

    pub fn current(&self) -> Connectivity {
        *self.tx.borrow()
    }

    pub fn is_available(&self) -> bool {
        self.current().is_available()
    }

    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.tx.subscribe()
    }
}

impl Default for ConnectivitySignal {
    fn default() -> Self {
        Self::new(Connectivity::Available)
    }
}
