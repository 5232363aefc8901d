//! In-memory execution-target bookkeeping with owner-affinity locality.

use std::collections::HashMap;

use crate::core::executor::WorkerSelector;
use crate::core::task::{OwnerId, TaskSpec, WorkerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Free,
    Busy,
}

#[derive(Debug)]
struct Slot {
    state: SlotState,
    /// Owner whose state this target last held; used for locality
    /// preference.
    affinity: Option<OwnerId>,
}

/// Fixed-size pool of local execution targets.
///
/// Locality model: a target that last ran a task for owner O is considered
/// warm for O. A locality-preferring task from O lands on such a target when
/// one is free; otherwise any free target is used.
#[derive(Debug)]
pub struct LocalWorkerPool {
    slots: HashMap<WorkerId, Slot>,
}

impl LocalWorkerPool {
    /// Create a pool with `count` free targets.
    #[must_use]
    pub fn with_slots(count: usize) -> Self {
        let slots = (0..count)
            .map(|_| {
                (
                    WorkerId::random(),
                    Slot {
                        state: SlotState::Free,
                        affinity: None,
                    },
                )
            })
            .collect();
        Self { slots }
    }

    fn free_with_affinity(&self, owner: OwnerId) -> Option<WorkerId> {
        self.slots
            .iter()
            .find(|(_, slot)| slot.state == SlotState::Free && slot.affinity == Some(owner))
            .map(|(id, _)| *id)
    }

    fn any_free(&self) -> Option<WorkerId> {
        self.slots
            .iter()
            .find(|(_, slot)| slot.state == SlotState::Free)
            .map(|(id, _)| *id)
    }
}

impl WorkerSelector for LocalWorkerPool {
    fn acquire(&mut self, spec: &TaskSpec) -> Option<WorkerId> {
        let chosen = if spec.prefer_locality {
            self.free_with_affinity(spec.owner).or_else(|| self.any_free())
        } else {
            self.any_free()
        }?;
        if let Some(slot) = self.slots.get_mut(&chosen) {
            slot.state = SlotState::Busy;
        }
        Some(chosen)
    }

    fn release(&mut self, worker: WorkerId, owner: OwnerId) {
        if let Some(slot) = self.slots.get_mut(&worker) {
            slot.state = SlotState::Free;
            slot.affinity = Some(owner);
        } else {
            tracing::warn!(%worker, "release of unknown worker ignored");
        }
    }

    fn rollback(&mut self, worker: WorkerId) {
        if let Some(slot) = self.slots.get_mut(&worker) {
            slot.state = SlotState::Free;
        }
    }

    fn free_count(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| slot.state == SlotState::Free)
            .count()
    }
}
