//! Worker slots and target reconciliation.
//!
//! [`reconcile`] is a pure function from the current slot list and a target
//! concurrency to the next slot list. The pool driver applies the returned
//! [`Reconciliation`] by spawning, reviving or stopping workers.

use serde::Serialize;

/// Process-unique slot identifier. Never reused after retirement.
pub type SlotId = u64;

/// Lifecycle of a slot as seen by its worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotState {
    /// Keep looping attempts
    Running,
    /// Finish the in-flight attempt, then retire
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSlot {
    pub id: SlotId,
    pub state: SlotState,
}

impl WorkerSlot {
    pub fn running(id: SlotId) -> Self {
        Self {
            id,
            state: SlotState::Running,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == SlotState::Running
    }
}

/// Monotonic slot id source.
#[derive(Debug, Default)]
pub struct SlotIdAllocator {
    next: SlotId,
}

impl SlotIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> SlotId {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// Result of one reconciliation step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Next slot list, in order
    pub slots: Vec<WorkerSlot>,
    /// Freshly allocated slots that need a new worker
    pub spawned: Vec<SlotId>,
    /// Stopping slots told to keep running
    pub revived: Vec<SlotId>,
    /// Running slots told to finish their attempt and retire
    pub stopping: Vec<SlotId>,
}

impl Reconciliation {
    pub fn is_noop(&self) -> bool {
        self.spawned.is_empty() && self.revived.is_empty() && self.stopping.is_empty()
    }
}

pub fn running_count(slots: &[WorkerSlot]) -> usize {
    slots.iter().filter(|s| s.is_running()).count()
}

/// Bring the number of running slots to `target`.
///
/// Growing first revives stopping slots in list order, then appends new slots.
/// Shrinking marks the last running slots as stopping; nothing is removed here.
pub fn reconcile(
    current: &[WorkerSlot],
    target: usize,
    ids: &mut SlotIdAllocator,
) -> Reconciliation {
    let mut result = Reconciliation {
        slots: current.to_vec(),
        ..Reconciliation::default()
    };
    let running = running_count(current);

    if target > running {
        let mut needed = target - running;

        for slot in result.slots.iter_mut().filter(|s| !s.is_running()) {
            if needed == 0 {
                break;
            }
            slot.state = SlotState::Running;
            result.revived.push(slot.id);
            needed -= 1;
        }

        for _ in 0..needed {
            let id = ids.allocate();
            result.slots.push(WorkerSlot::running(id));
            result.spawned.push(id);
        }
    } else if target < running {
        let mut excess = running - target;

        for slot in result.slots.iter_mut().rev().filter(|s| s.is_running()) {
            if excess == 0 {
                break;
            }
            slot.state = SlotState::Stopping;
            result.stopping.push(slot.id);
            excess -= 1;
        }
        result.stopping.reverse();
    }

    result
}
