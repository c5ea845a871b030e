//! Typed publish/subscribe registry between devices and the coordinator.

use std::collections::BTreeMap;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::trace;

use crate::problem::{DecisionVariables, DeviceId, ProblemPart};
use crate::profile::Schedule;

/// The plan chosen for one device in one scheduling cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSchedule {
    pub device_id: DeviceId,
    /// Cycle that produced the plan.
    pub cycle: u64,
    /// Absolute time the schedule's profile starts at.
    pub reference_time: i64,
    pub decisions: DecisionVariables,
    pub schedule: Schedule,
}

impl DeviceSchedule {
    /// The part of the plan still ahead of `now`, re-based to `now`.
    pub fn remaining_after(&self, now: i64) -> DeviceSchedule {
        let elapsed = (now - self.reference_time).max(0);
        DeviceSchedule {
            device_id: self.device_id.clone(),
            cycle: self.cycle,
            reference_time: self.reference_time + elapsed,
            decisions: self.decisions.clone(),
            schedule: self.schedule.remaining_after(elapsed),
        }
    }
}

struct Subscriber<T> {
    filter: Option<DeviceId>,
    sender: Sender<Arc<T>>,
}

/// Latest value per device for one payload type.
///
/// Publishing replaces the device's entry with an immutable snapshot and
/// forwards it to every matching subscriber. Subscribers whose receiver was
/// dropped are pruned on the next publish.
pub struct Topic<T> {
    entries: RwLock<BTreeMap<DeviceId, Arc<T>>>,
    subscribers: Mutex<Vec<Subscriber<T>>>,
}

impl<T> Default for Topic<T> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<T> std::fmt::Debug for Topic<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Topic")
            .field("entries", &self.entries.read().len())
            .field("subscribers", &self.subscribers.lock().len())
            .finish()
    }
}

impl<T: Send + Sync> Topic<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` as the latest entry of `device` and notifies subscribers.
    pub fn publish(&self, device: DeviceId, value: T) -> Arc<T> {
        let value = Arc::new(value);
        self.entries.write().insert(device.clone(), Arc::clone(&value));
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|s| {
            if s.filter.as_ref().is_some_and(|f| f != &device) {
                return true;
            }
            s.sender.send(Arc::clone(&value)).is_ok()
        });
        trace!(device = %device, subscribers = subscribers.len(), "published");
        value
    }

    /// Latest entry of `device`.
    pub fn get(&self, device: &DeviceId) -> Option<Arc<T>> {
        self.entries.read().get(device).cloned()
    }

    /// All entries, ordered by device id.
    pub fn snapshot(&self) -> Vec<(DeviceId, Arc<T>)> {
        self.entries
            .read()
            .iter()
            .map(|(id, v)| (id.clone(), Arc::clone(v)))
            .collect()
    }

    pub fn remove(&self, device: &DeviceId) -> Option<Arc<T>> {
        self.entries.write().remove(device)
    }

    /// Receives every future publish, or only those of `device`.
    pub fn subscribe(&self, device: Option<DeviceId>) -> Receiver<Arc<T>> {
        let (sender, receiver) = unbounded();
        self.subscribers.lock().push(Subscriber {
            filter: device,
            sender,
        });
        receiver
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// One topic per payload type exchanged with devices.
#[derive(Debug, Default)]
pub struct Registry {
    /// Problem parts published by devices for the next cycle.
    pub parts: Topic<ProblemPart>,
    /// Plans published by the coordinator.
    pub schedules: Topic<DeviceSchedule>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }
}
