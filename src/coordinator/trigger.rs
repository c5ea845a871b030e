//! Coalescing gate that admits at most one scheduling run at a time.

use std::fmt;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::problem::DeviceId;

/// Why a scheduling run was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerReason {
    /// A device asked to be rescheduled.
    Reschedule(DeviceId),
    /// The periodic timer fired.
    Timer,
    /// New price or power-limit signals arrived.
    Signals,
    /// Explicit call to run a cycle.
    Manual,
}

impl fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerReason::Reschedule(id) => write!(f, "reschedule({id})"),
            TriggerReason::Timer => f.write_str("timer"),
            TriggerReason::Signals => f.write_str("signals"),
            TriggerReason::Manual => f.write_str("manual"),
        }
    }
}

/// Result of waiting on the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// A run may start; carries every trigger collected since the last run.
    Run(Vec<TriggerReason>),
    /// The timeout passed without a trigger.
    TimedOut,
    /// The gate was closed.
    Closed,
}

#[derive(Debug, Default)]
struct GateState {
    pending: Vec<TriggerReason>,
    running: bool,
    closed: bool,
}

/// Releases the gate's run when dropped.
#[derive(Debug)]
#[must_use = "the run finishes as soon as the guard is dropped"]
pub struct RunGuard<'a> {
    gate: &'a TriggerGate,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.gate.finish();
    }
}

/// Collects triggers and hands them out one batch per run.
///
/// Triggers arriving while a run is in flight are kept and released
/// together when it finishes, so any number of them cause exactly one
/// follow-up run.
#[derive(Debug, Default)]
pub struct TriggerGate {
    state: Mutex<GateState>,
    changed: Condvar,
}

impl TriggerGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a trigger. Returns `false` once the gate is closed.
    pub fn trigger(&self, reason: TriggerReason) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        if !state.pending.contains(&reason) {
            state.pending.push(reason);
        }
        self.changed.notify_all();
        true
    }

    /// Starts a run if none is in flight and a trigger is pending.
    pub fn try_begin(&self) -> Option<Vec<TriggerReason>> {
        let mut state = self.state.lock();
        Self::admit(&mut state)
    }

    /// Blocks until a run may start, `timeout` passes, or the gate closes.
    ///
    /// `None` waits without a time limit.
    pub fn wait(&self, timeout: Option<Duration>) -> Admission {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Admission::Closed;
            }
            if let Some(reasons) = Self::admit(&mut state) {
                return Admission::Run(reasons);
            }
            match timeout {
                Some(limit) => {
                    if self.changed.wait_for(&mut state, limit).timed_out() {
                        if state.closed {
                            return Admission::Closed;
                        }
                        return Self::admit(&mut state)
                            .map_or(Admission::TimedOut, Admission::Run);
                    }
                }
                None => self.changed.wait(&mut state),
            }
        }
    }

    /// Finishes the current run when the returned guard drops, unwinding
    /// included.
    pub fn finish_on_drop(&self) -> RunGuard<'_> {
        RunGuard { gate: self }
    }

    /// Marks the current run as finished.
    pub fn finish(&self) {
        let mut state = self.state.lock();
        state.running = false;
        self.changed.notify_all();
    }

    /// Rejects further triggers and wakes every waiter.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.pending.clear();
        self.changed.notify_all();
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }

    fn admit(state: &mut GateState) -> Option<Vec<TriggerReason>> {
        if state.running || state.pending.is_empty() {
            return None;
        }
        state.running = true;
        Some(std::mem::take(&mut state.pending))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn test_triggers_during_run_coalesce() {
        let gate = TriggerGate::new();
        gate.trigger(TriggerReason::Manual);
        assert_eq!(gate.try_begin(), Some(vec![TriggerReason::Manual]));

        gate.trigger(TriggerReason::Signals);
        gate.trigger(TriggerReason::Reschedule(DeviceId::new("chp")));
        assert_eq!(gate.try_begin(), None, "a run is in flight");
        gate.finish();

        let follow_up = gate.try_begin();
        assert_eq!(follow_up.map(|r| r.len()), Some(2));
        gate.finish();
        assert_eq!(gate.try_begin(), None, "exactly one follow-up run");
    }

    #[test]
    fn test_duplicate_reasons_collapse() {
        let gate = TriggerGate::new();
        gate.trigger(TriggerReason::Timer);
        gate.trigger(TriggerReason::Timer);
        assert_eq!(gate.pending(), 1);
    }

    #[test]
    fn test_wait_times_out() {
        let gate = TriggerGate::new();
        assert_eq!(gate.wait(Some(Duration::from_millis(5))), Admission::TimedOut);
    }

    #[test]
    fn test_close_wakes_waiter() {
        let gate = Arc::new(TriggerGate::new());
        let waiter = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || gate.wait(None))
        };
        thread::sleep(Duration::from_millis(20));
        gate.close();
        assert_eq!(waiter.join().ok(), Some(Admission::Closed));
        assert!(!gate.trigger(TriggerReason::Manual));
    }

    #[test]
    fn test_trigger_wakes_waiter() {
        let gate = Arc::new(TriggerGate::new());
        let waiter = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || gate.wait(None))
        };
        gate.trigger(TriggerReason::Signals);
        assert_eq!(
            waiter.join().ok(),
            Some(Admission::Run(vec![TriggerReason::Signals]))
        );
        assert!(gate.is_running());
    }

    #[test]
    fn test_guard_releases_gate_on_panic() {
        let gate = TriggerGate::new();
        gate.trigger(TriggerReason::Manual);
        assert!(gate.try_begin().is_some());

        let unwound = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _running = gate.finish_on_drop();
            panic!("cycle blew up");
        }));
        assert!(unwound.is_err());
        assert!(!gate.is_running());

        gate.trigger(TriggerReason::Timer);
        assert_eq!(gate.try_begin(), Some(vec![TriggerReason::Timer]));
    }
}
