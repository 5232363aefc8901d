//! Shape-grouped FIFO queue of pending lease requests.

use std::collections::{HashMap, VecDeque};

use indexmap::IndexMap;

use crate::core::resources::ResourceShape;
use crate::core::task::{ReplySink, TaskId, TaskSpec};

/// A queued lease: the immutable spec plus the sink its outcome goes to.
#[derive(Debug)]
pub struct QueuedLease {
    /// Task description.
    pub spec: TaskSpec,
    /// Reply sink, consumed when the task leaves the queue.
    pub reply: ReplySink,
}

/// Pending tasks grouped by resource shape.
///
/// Shapes iterate in first-seen order (bounding starvation of late-arriving
/// shapes); tasks within a shape iterate in arrival order. Entries live in an
/// arena keyed by task identity and the shape buckets hold ids only, so
/// removal by id, owner, shape, or predicate never aliases an entry.
#[derive(Debug, Default)]
pub struct LeaseQueue {
    shapes: IndexMap<ResourceShape, VecDeque<TaskId>>,
    entries: HashMap<TaskId, QueuedLease>,
}

impl LeaseQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of queued tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the given task identity currently occupies a queue slot.
    #[must_use]
    pub fn contains(&self, id: TaskId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Append a lease under its shape, preserving arrival order.
    ///
    /// The caller has already ruled out duplicate identities; a duplicate
    /// here would alias two queue slots, so it is a caller bug.
    pub fn enqueue(&mut self, lease: QueuedLease) {
        debug_assert!(!self.contains(lease.spec.id));
        self.shapes
            .entry(lease.spec.shape().clone())
            .or_default()
            .push_back(lease.spec.id);
        self.entries.insert(lease.spec.id, lease);
    }

    /// Shapes in first-seen order, cloned so callers can mutate the queue
    /// while walking them.
    #[must_use]
    pub fn shapes_in_order(&self) -> Vec<ResourceShape> {
        self.shapes.keys().cloned().collect()
    }

    /// Spec of the oldest task of `shape`, if the shape has queued tasks.
    #[must_use]
    pub fn front_of_shape(&self, shape: &ResourceShape) -> Option<&TaskSpec> {
        let id = self.shapes.get(shape)?.front()?;
        self.entries.get(id).map(|lease| &lease.spec)
    }

    /// Remove one task by identity, returning it if it was queued.
    pub fn remove(&mut self, id: TaskId) -> Option<QueuedLease> {
        let lease = self.entries.remove(&id)?;
        let shape = lease.spec.shape();
        if let Some(bucket) = self.shapes.get_mut(shape) {
            bucket.retain(|queued| *queued != id);
            if bucket.is_empty() {
                // shift preserves first-seen order of the remaining shapes
                self.shapes.shift_remove(shape);
            }
        }
        Some(lease)
    }

    /// Remove every task matching `predicate`, in queue order.
    pub fn remove_matching<F>(&mut self, predicate: F) -> Vec<QueuedLease>
    where
        F: Fn(&TaskSpec) -> bool,
    {
        let matches: Vec<TaskId> = self
            .shapes
            .values()
            .flatten()
            .filter_map(|id| self.entries.get(id))
            .filter(|lease| predicate(&lease.spec))
            .map(|lease| lease.spec.id)
            .collect();
        matches.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    /// `(shape, pending count)` pairs in first-seen order.
    pub fn shape_counts(&self) -> impl Iterator<Item = (&ResourceShape, usize)> {
        self.shapes.iter().map(|(shape, bucket)| (shape, bucket.len()))
    }

    /// Specs of all queued tasks, shape order then arrival order.
    pub fn iter_specs(&self) -> impl Iterator<Item = &TaskSpec> {
        self.shapes
            .values()
            .flatten()
            .filter_map(|id| self.entries.get(id))
            .map(|lease| &lease.spec)
    }

    /// The oldest task of the first-seen shape, used as a starvation
    /// exemplar.
    #[must_use]
    pub fn first_queued(&self) -> Option<&TaskSpec> {
        self.iter_specs().next()
    }
}
