use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::{
    error::SchedulerError,
    notifications::{NotificationPlatform, PlatformHandle, ScheduledNotification},
};

#[derive(Debug, Clone)]
struct Pending {
    entry: ScheduledNotification,
    handle: PlatformHandle,
}

/// One key's slot. The slot lock is held across the platform cancel + create
/// pair so operations on the same key never interleave.
#[derive(Debug, Default)]
struct Slot {
    pending: Option<Pending>,
    /// Set when the slot is removed from the map; holders must look the key up again.
    detached: bool,
}

type SlotRef = Arc<Mutex<Slot>>;

/// Outcome of cancelling every pending entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CancelReport {
    pub cancelled: usize,
    pub failures: Vec<SchedulerError>,
}

impl CancelReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Owns every pending [`ScheduledNotification`], at most one per key.
pub struct ScheduleRegistry {
    platform: Arc<dyn NotificationPlatform>,
    slots: RwLock<HashMap<String, SlotRef>>,
}

impl ScheduleRegistry {
    pub fn new(platform: Arc<dyn NotificationPlatform>) -> Self {
        Self {
            platform,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Installs `entry`, cancelling the platform notification already pending
    /// under the same key first.
    ///
    /// If that cancel fails the previous entry stays pending. If the create
    /// fails after a successful cancel the key ends up absent.
    pub fn upsert(&self, entry: ScheduledNotification) -> Result<(), SchedulerError> {
        self.upsert_if(entry, || true).map(|_| ())
    }

    /// [`ScheduleRegistry::upsert`] that first asks `still_current` while
    /// holding the key's slot. Returns `Ok(false)` and leaves the key untouched
    /// when it answers false.
    ///
    /// The slot is in the map before `still_current` runs, so a
    /// [`ScheduleRegistry::cancel_all`] started after the answer flips always
    /// sees it.
    pub fn upsert_if(
        &self,
        entry: ScheduledNotification,
        still_current: impl Fn() -> bool,
    ) -> Result<bool, SchedulerError> {
        loop {
            let slot = self.slot_for(&entry.key);
            let mut guard = slot.lock();
            if guard.detached {
                continue;
            }
            if !still_current() {
                drop(guard);
                self.prune(&entry.key, &slot);
                tracing::debug!(key = %entry.key, "session ended; notification dropped");
                return Ok(false);
            }

            if let Some(previous) = &guard.pending {
                self.platform
                    .cancel(previous.handle)
                    .map_err(|err| SchedulerError::from_platform(&entry.key, err))?;
                tracing::debug!(key = %entry.key, "replacing pending notification");
                guard.pending = None;
            }

            let handle = match self
                .platform
                .schedule(&entry.key, entry.fire_at, &entry.payload)
            {
                Ok(handle) => handle,
                Err(err) => {
                    drop(guard);
                    self.prune(&entry.key, &slot);
                    return Err(SchedulerError::from_platform(&entry.key, err));
                }
            };
            tracing::debug!(key = %entry.key, fire_at = %entry.fire_at, "notification scheduled");
            guard.pending = Some(Pending { entry, handle });
            return Ok(true);
        }
    }

    /// Removes and cancels the entry under `key`. Returns false when nothing
    /// was pending or the platform refused the cancel.
    pub fn cancel(&self, key: &str) -> bool {
        match self.try_cancel(key) {
            Ok(cancelled) => cancelled,
            Err(err) => {
                tracing::warn!(%key, %err, "failed to cancel notification");
                false
            }
        }
    }

    pub fn try_cancel(&self, key: &str) -> Result<bool, SchedulerError> {
        loop {
            let Some(slot) = self.existing_slot(key) else {
                return Ok(false);
            };
            let mut guard = slot.lock();
            if guard.detached {
                continue;
            }
            let cancelled = Self::cancel_in_slot(self.platform.as_ref(), key, &mut guard)?;
            drop(guard);
            self.prune(key, &slot);
            return Ok(cancelled);
        }
    }

    /// Cancels every pending entry. A failing key is reported and left pending;
    /// the remaining keys are still processed.
    pub fn cancel_all(&self) -> CancelReport {
        let snapshot: Vec<(String, SlotRef)> = self
            .slots
            .read()
            .iter()
            .map(|(key, slot)| (key.clone(), slot.clone()))
            .collect();

        let mut report = CancelReport::default();
        for (key, slot) in &snapshot {
            let mut guard = slot.lock();
            if guard.detached {
                continue;
            }
            match Self::cancel_in_slot(self.platform.as_ref(), key, &mut guard) {
                Ok(true) => report.cancelled += 1,
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(%key, %err, "failed to cancel notification during teardown");
                    report.failures.push(err);
                }
            }
        }
        for (key, slot) in &snapshot {
            self.prune(key, slot);
        }
        report
    }

    /// Records that the platform delivered `handle`. Only the matching pending
    /// entry is removed, so a late report never drops a replacement.
    pub fn mark_fired(&self, key: &str, handle: PlatformHandle) -> bool {
        let Some(slot) = self.existing_slot(key) else {
            return false;
        };
        let fired = {
            let mut guard = slot.lock();
            let matches = matches!(&guard.pending, Some(pending) if pending.handle == handle);
            if matches {
                guard.pending = None;
            }
            matches
        };
        if fired {
            tracing::debug!(%key, "notification fired");
            self.prune(key, &slot);
        }
        fired
    }

    pub fn count(&self) -> usize {
        self.slots
            .read()
            .values()
            .filter(|slot| slot.lock().pending.is_some())
            .count()
    }

    pub fn has(&self, key: &str) -> bool {
        self.existing_slot(key)
            .map(|slot| slot.lock().pending.is_some())
            .unwrap_or(false)
    }

    pub fn get(&self, key: &str) -> Option<ScheduledNotification> {
        let slot = self.existing_slot(key)?;
        let guard = slot.lock();
        guard.pending.as_ref().map(|pending| pending.entry.clone())
    }

    pub fn pending_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .slots
            .read()
            .iter()
            .filter(|(_, slot)| slot.lock().pending.is_some())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }
}

impl ScheduleRegistry {
    fn slot_for(&self, key: &str) -> SlotRef {
        if let Some(slot) = self.existing_slot(key) {
            return slot;
        }
        self.slots
            .write()
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    fn existing_slot(&self, key: &str) -> Option<SlotRef> {
        self.slots.read().get(key).cloned()
    }

    fn cancel_in_slot(
        platform: &dyn NotificationPlatform,
        key: &str,
        slot: &mut Slot,
    ) -> Result<bool, SchedulerError> {
        let Some(pending) = &slot.pending else {
            return Ok(false);
        };
        platform
            .cancel(pending.handle)
            .map_err(|err| SchedulerError::from_platform(key, err))?;
        slot.pending = None;
        tracing::debug!(%key, "notification cancelled");
        Ok(true)
    }

    /// Drops an empty slot from the map. Skipped when another operation holds it.
    fn prune(&self, key: &str, slot: &SlotRef) {
        let mut slots = self.slots.write();
        let Some(current) = slots.get(key) else {
            return;
        };
        if !Arc::ptr_eq(current, slot) {
            return;
        }
        let Some(mut guard) = slot.try_lock() else {
            return;
        };
        if guard.pending.is_none() {
            guard.detached = true;
            drop(guard);
            slots.remove(key);
        }
    }
}
