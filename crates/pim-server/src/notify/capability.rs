//! Client capability aggregation (§10.7, `clientcapabilityaggregator.cpp`).
//! The manager tracks the minimum and maximum protocol version across every
//! currently connected session — not just subscribers — so it can decide
//! whether a v1-compatible notification encoding must still be considered
//! (§9 open question, resolved in `DESIGN.md`).

use std::collections::HashMap;

use parking_lot::Mutex;
use pim_model::SessionId;

#[derive(Default)]
struct Inner {
    versions: HashMap<SessionId, u32>,
}

/// One instance lives on the notification manager. Sessions register their
/// negotiated protocol version on Hello and deregister on disconnect.
pub struct CapabilityAggregator {
    inner: Mutex<Inner>,
}

impl Default for CapabilityAggregator {
    fn default() -> Self {
        Self { inner: Mutex::new(Inner::default()) }
    }
}

impl CapabilityAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_connected(&self, session: SessionId, protocol_version: u32) {
        self.inner.lock().versions.insert(session, protocol_version);
    }

    pub fn session_disconnected(&self, session: SessionId) {
        self.inner.lock().versions.remove(&session);
    }

    pub fn min_version(&self) -> Option<u32> {
        self.inner.lock().versions.values().copied().min()
    }

    pub fn max_version(&self) -> Option<u32> {
        self.inner.lock().versions.values().copied().max()
    }

    /// A v1-compatible (pre-batch) notification encoding is required only
    /// while at least one connected session has not negotiated past v1.
    /// A subscriber that never completed Hello (version 0) is refused
    /// rather than assumed v1-compatible.
    pub fn requires_v1_compatible_encoding(&self) -> bool {
        self.min_version().map(|min| min <= 1).unwrap_or(false)
    }

    pub fn refuse_unversioned(&self, protocol_version: u32) -> bool {
        protocol_version == 0
    }
}
