//! Publisher Watcher - exclusivity and live status per course
//!
//! Each course key owns one slot. A slot holds the live [`PublisherStatus`],
//! the transitions of the current (or last) run, and the ticket of the run
//! currently holding the key. The map lock is only taken to find or create
//! a slot; acquire and release are check-and-set operations on the slot's
//! own mutex, so runs for different courses never contend.

use crate::core::phase::{Phase, PhaseTransition, RunMode};
use crate::core::status::{PublishResult, PublisherStatus};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// Proof of exclusive run rights for one course
#[derive(Debug)]
pub struct RunTicket {
    run_id: Uuid,
    cancel: CancellationToken,
}

impl RunTicket {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Signal observed by the pipeline at phase boundaries
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Outcome of [`PublisherWatcher::try_acquire`]
#[derive(Debug)]
pub enum Acquisition {
    Acquired(RunTicket),
    /// A run is already active; carries its current status
    Busy(PublisherStatus),
}

#[derive(Debug)]
struct ActiveRun {
    run_id: Uuid,
    mode: RunMode,
    cancel: CancellationToken,
}

#[derive(Debug)]
struct Slot {
    status: PublisherStatus,
    active: Option<ActiveRun>,
    transitions: Vec<PhaseTransition>,
}

impl Slot {
    fn owned_by(&self, ticket: &RunTicket) -> bool {
        self.active
            .as_ref()
            .is_some_and(|run| run.run_id == ticket.run_id)
    }

    fn enter(&mut self, phase: Phase) {
        self.transitions
            .push(PhaseTransition::new(self.status.phase, phase));
        self.status.phase = phase;
        self.status.updated_at = Utc::now();
    }
}

/// Registry of in-flight runs and their status, keyed by course
#[derive(Debug, Default)]
pub struct PublisherWatcher {
    slots: RwLock<HashMap<String, Arc<Mutex<Slot>>>>,
}

impl PublisherWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant exclusive run rights for `app_name`, or report the run holding them
    pub fn try_acquire(&self, app_name: &str, mode: RunMode) -> Acquisition {
        let slot = self.slot_or_insert(app_name);
        let mut slot = lock(&slot);

        if slot.active.is_some() {
            debug!(app_name, phase = %slot.status.phase, "course busy");
            return Acquisition::Busy(slot.status.clone());
        }

        let ticket = RunTicket {
            run_id: Uuid::new_v4(),
            cancel: CancellationToken::new(),
        };
        slot.active = Some(ActiveRun {
            run_id: ticket.run_id,
            mode,
            cancel: ticket.cancel.clone(),
        });
        slot.transitions.clear();
        slot.status.phase = Phase::Idle;
        slot.status.updated_at = Utc::now();

        debug!(app_name, run_id = %ticket.run_id, ?mode, "run acquired");
        Acquisition::Acquired(ticket)
    }

    /// Record that the run holding `ticket` entered `phase`
    ///
    /// Returns `false` and leaves the status untouched when the ticket no
    /// longer owns the slot or the transition is not allowed.
    pub fn update(&self, app_name: &str, ticket: &RunTicket, phase: Phase) -> bool {
        let Some(slot) = self.slot(app_name) else {
            warn!(app_name, %phase, "update for unknown course");
            return false;
        };
        let mut slot = lock(&slot);

        if !slot.owned_by(ticket) {
            warn!(app_name, %phase, run_id = %ticket.run_id, "update from a run that does not hold the course");
            return false;
        }

        let from = slot.status.phase;
        if !from.can_transition_to(phase) {
            warn!(app_name, %from, to = %phase, "illegal phase transition ignored");
            return false;
        }

        slot.enter(phase);
        debug!(app_name, %from, to = %phase, "phase transition");
        true
    }

    /// Store the final result, settle the terminal phase and free the course
    pub fn release(&self, app_name: &str, ticket: &RunTicket, result: PublishResult) -> PublisherStatus {
        let slot = self.slot_or_insert(app_name);
        let mut slot = lock(&slot);

        if !slot.owned_by(ticket) {
            warn!(app_name, run_id = %ticket.run_id, "release from a run that does not hold the course");
            return slot.status.clone();
        }

        let terminal = result.terminal_phase();
        if !slot.status.phase.can_transition_to(terminal) {
            warn!(app_name, from = %slot.status.phase, to = %terminal, "run settled from an unexpected phase");
        }
        slot.enter(terminal);
        slot.status.last_result = Some(result);
        slot.active = None;

        debug!(app_name, %terminal, "run released");
        slot.status.clone()
    }

    /// Snapshot of the course's status; `None` if no run was ever started
    pub fn status(&self, app_name: &str) -> Option<PublisherStatus> {
        self.slot(app_name).map(|slot| lock(&slot).status.clone())
    }

    /// Transitions recorded for the current or most recent run
    pub fn history(&self, app_name: &str) -> Vec<PhaseTransition> {
        self.slot(app_name)
            .map(|slot| lock(&slot).transitions.clone())
            .unwrap_or_default()
    }

    pub fn is_active(&self, app_name: &str) -> bool {
        self.slot(app_name)
            .is_some_and(|slot| lock(&slot).active.is_some())
    }

    /// Ask the active run to stop at its next phase boundary
    ///
    /// Only runs in `mode` are signalled. Returns whether a signal was sent.
    pub fn cancel(&self, app_name: &str, mode: RunMode) -> bool {
        let Some(slot) = self.slot(app_name) else {
            return false;
        };
        let slot = lock(&slot);

        match &slot.active {
            Some(run) if run.mode == mode => {
                run.cancel.cancel();
                debug!(app_name, run_id = %run.run_id, "cancellation requested");
                true
            }
            _ => false,
        }
    }

    fn slot(&self, app_name: &str) -> Option<Arc<Mutex<Slot>>> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(app_name)
            .cloned()
    }

    fn slot_or_insert(&self, app_name: &str) -> Arc<Mutex<Slot>> {
        if let Some(slot) = self.slot(app_name) {
            return slot;
        }

        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        slots
            .entry(app_name.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(Slot {
                    status: PublisherStatus::new(app_name),
                    active: None,
                    transitions: Vec::new(),
                }))
            })
            .clone()
    }
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(app_name: &str, succeeded: bool) -> PublishResult {
        let now = Utc::now();
        PublishResult {
            app_name: app_name.to_string(),
            mode: RunMode::Publish,
            succeeded,
            version: 4,
            warnings: Vec::new(),
            errors: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    fn acquire(watcher: &PublisherWatcher, app_name: &str) -> RunTicket {
        match watcher.try_acquire(app_name, RunMode::Publish) {
            Acquisition::Acquired(ticket) => ticket,
            Acquisition::Busy(status) => panic!("unexpectedly busy: {:?}", status),
        }
    }

    #[test]
    fn test_status_not_found_before_first_run() {
        let watcher = PublisherWatcher::new();
        assert!(watcher.status("biology101").is_none());
        assert!(watcher.history("biology101").is_empty());
        assert!(!watcher.is_active("biology101"));
    }

    #[test]
    fn test_second_acquire_is_busy_with_current_phase() {
        let watcher = PublisherWatcher::new();
        let ticket = acquire(&watcher, "biology101");
        assert!(watcher.update("biology101", &ticket, Phase::Fetching));

        match watcher.try_acquire("biology101", RunMode::Publish) {
            Acquisition::Busy(status) => {
                assert_eq!(status.phase, Phase::Fetching);
                assert!(!status.phase.is_terminal());
            }
            Acquisition::Acquired(_) => panic!("second run must not start"),
        }
    }

    #[test]
    fn test_other_courses_are_independent() {
        let watcher = PublisherWatcher::new();
        let _bio = acquire(&watcher, "biology101");
        let _chem = acquire(&watcher, "chemistry101");

        assert!(watcher.is_active("biology101"));
        assert!(watcher.is_active("chemistry101"));
    }

    #[test]
    fn test_release_settles_and_frees() {
        let watcher = PublisherWatcher::new();
        let ticket = acquire(&watcher, "biology101");
        for phase in [
            Phase::Fetching,
            Phase::Validating,
            Phase::Packaging,
            Phase::Uploading,
            Phase::Finalizing,
        ] {
            assert!(watcher.update("biology101", &ticket, phase));
        }

        let status = watcher.release("biology101", &ticket, result("biology101", true));
        assert_eq!(status.phase, Phase::Done);
        assert_eq!(status.last_result.as_ref().map(|r| r.version), Some(4));
        assert!(!watcher.is_active("biology101"));

        let phases: Vec<Phase> = watcher
            .history("biology101")
            .iter()
            .map(|t| t.to)
            .collect();
        assert_eq!(
            phases,
            vec![
                Phase::Fetching,
                Phase::Validating,
                Phase::Packaging,
                Phase::Uploading,
                Phase::Finalizing,
                Phase::Done
            ]
        );

        // Final status survives until the next run overwrites it
        let again = acquire(&watcher, "biology101");
        let status = watcher.status("biology101").unwrap();
        assert_eq!(status.phase, Phase::Idle);
        assert!(status.last_result.is_some());
        assert!(watcher.history("biology101").is_empty());
        watcher.release("biology101", &again, result("biology101", false));
        assert_eq!(watcher.status("biology101").unwrap().phase, Phase::Failed);
    }

    #[test]
    fn test_illegal_transition_is_ignored() {
        let watcher = PublisherWatcher::new();
        let ticket = acquire(&watcher, "biology101");
        assert!(watcher.update("biology101", &ticket, Phase::Fetching));
        assert!(!watcher.update("biology101", &ticket, Phase::Uploading));
        assert!(!watcher.update("biology101", &ticket, Phase::Fetching));
        assert_eq!(watcher.status("biology101").unwrap().phase, Phase::Fetching);
    }

    #[test]
    fn test_stale_ticket_cannot_update_or_release() {
        let watcher = PublisherWatcher::new();
        let first = acquire(&watcher, "biology101");
        let stale = RunTicket {
            run_id: Uuid::new_v4(),
            cancel: CancellationToken::new(),
        };

        assert!(!watcher.update("biology101", &stale, Phase::Fetching));
        watcher.release("biology101", &stale, result("biology101", true));
        assert!(watcher.is_active("biology101"));

        watcher.release("biology101", &first, result("biology101", true));
        assert!(!watcher.is_active("biology101"));
    }

    #[test]
    fn test_cancel_only_signals_matching_mode() {
        let watcher = PublisherWatcher::new();
        assert!(!watcher.cancel("biology101", RunMode::Publish));

        let ticket = acquire(&watcher, "biology101");
        assert!(!watcher.cancel("biology101", RunMode::Unpublish));
        assert!(!ticket.cancellation().is_cancelled());

        assert!(watcher.cancel("biology101", RunMode::Publish));
        assert!(ticket.cancellation().is_cancelled());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_acquire_grants_exactly_one() {
        let watcher = Arc::new(PublisherWatcher::new());
        let barrier = Arc::new(tokio::sync::Barrier::new(16));
        let mut tasks = Vec::new();

        for _ in 0..16 {
            let watcher = Arc::clone(&watcher);
            let barrier = Arc::clone(&barrier);
            tasks.push(tokio::spawn(async move {
                barrier.wait().await;
                match watcher.try_acquire("biology101", RunMode::Publish) {
                    Acquisition::Acquired(ticket) => Some(ticket),
                    Acquisition::Busy(status) => {
                        assert!(!status.phase.is_terminal());
                        None
                    }
                }
            }));
        }

        let mut winners = 0;
        for task in tasks {
            if task.await.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
