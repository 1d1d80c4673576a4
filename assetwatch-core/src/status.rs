//! Current-status aggregate.
//!
//! [`StatusWriter::apply`] is the only writer of [`DeviceCurrentStatus`]. It
//! persists the check, then folds it into the aggregate under a per-device
//! lock, so two devices never contend and one device never interleaves.

use crate::error::StoreError;
use crate::model::{DeviceCurrentStatus, DeviceId, ReachabilityCheck};
use crate::store::InventoryStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

/// Outcome of applying one check.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub status: DeviceCurrentStatus,
    /// `online` before this check, `None` for the first check of a device.
    pub previous_online: Option<bool>,
    /// False when the check was older than the one already reflected.
    pub fresh: bool,
}

impl StatusChange {
    /// True when the device flipped between online and offline.
    pub fn transitioned(&self) -> bool {
        self.fresh && self.previous_online.is_some_and(|prev| prev != self.status.online)
    }
}

pub struct StatusWriter {
    window: Duration,
    locks: Mutex<HashMap<DeviceId, Arc<Mutex<()>>>>,
}

impl StatusWriter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, device: DeviceId) -> Arc<Mutex<()>> {
        self.locks.lock().entry(device).or_default().clone()
    }

    /// Records `check` and updates the device's aggregate.
    ///
    /// `degraded` marks a device that answered, but not on its primary port.
    /// Re-applying a check with an id already stored only refreshes uptime.
    pub fn apply(
        &self,
        store: &dyn InventoryStore,
        check: &ReachabilityCheck,
        degraded: bool,
    ) -> Result<StatusChange, StoreError> {
        let lock = self.lock_for(check.device_id);
        let _guard = lock.lock();

        let inserted = store.append_check(check.clone())?;
        if !inserted {
            tracing::debug!("check {} for device {} already recorded", check.id, check.device_id);
        }

        let now = OffsetDateTime::now_utc();
        let window = store.checks_since(check.device_id, now - self.window)?;
        let previous = store.current_status(check.device_id)?;
        let (status, fresh) = fold_check(previous.as_ref(), check, degraded, &window, now);
        store.put_status(status.clone())?;

        Ok(StatusChange {
            status,
            previous_online: previous.map(|p| p.online),
            fresh,
        })
    }
}

/// Percentage of reachable checks, `0.0` for an empty window.
pub fn uptime_percent(window: &[ReachabilityCheck]) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    let online = window.iter().filter(|c| c.reachable).count();
    online as f64 / window.len() as f64 * 100.0
}

/// Folds one check into the previous aggregate.
///
/// A check older than the one already reflected cannot move `online`,
/// response time or error flags backwards; `last_seen` only ever grows.
/// Returns the new aggregate and whether the check was the freshest.
pub fn fold_check(
    previous: Option<&DeviceCurrentStatus>,
    check: &ReachabilityCheck,
    degraded: bool,
    window: &[ReachabilityCheck],
    now: OffsetDateTime,
) -> (DeviceCurrentStatus, bool) {
    let uptime_24h = uptime_percent(window);
    let seen_at = check.reachable.then_some(check.checked_at);

    let Some(prev) = previous else {
        let status = DeviceCurrentStatus {
            device_id: check.device_id,
            last_updated: now,
            last_checked_at: check.checked_at,
            online: check.reachable,
            last_seen: seen_at,
            response_time_ms: check.response_time_ms.filter(|_| check.reachable),
            uptime_24h,
            has_error: !check.reachable,
            has_warning: check.reachable && degraded,
            last_error: check.failure_reason.clone().filter(|_| !check.reachable),
        };
        return (status, true);
    };

    let mut next = prev.clone();
    next.last_updated = now;
    next.uptime_24h = uptime_24h;
    next.last_seen = match (prev.last_seen, seen_at) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    };

    let fresh = check.checked_at >= prev.last_checked_at;
    if !fresh {
        return (next, false);
    }

    next.last_checked_at = check.checked_at;
    next.online = check.reachable;
    if check.reachable {
        next.response_time_ms = check.response_time_ms;
        next.has_error = false;
        next.last_error = None;
        next.has_warning = degraded;
    } else {
        next.has_error = true;
        next.has_warning = false;
        next.last_error = check.failure_reason.clone();
    }
    (next, true)
}
