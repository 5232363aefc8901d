//! Resource sets and the node-local capacity ledger.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::SchedulerError;

/// Immutable mapping from resource dimension name to non-negative quantity.
///
/// Used both as a task's requirement and as the ledger's capacity. Quantities
/// are `u64`, so negative amounts are unrepresentable. Zero-quantity entries
/// are normalized away on construction, which makes equality (and therefore
/// shape grouping) well defined: `{cpu: 2, gpu: 0}` and `{cpu: 2}` are the
/// same shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceSet {
    quantities: BTreeMap<String, u64>,
}

/// A [`ResourceSet`] used purely as a grouping key: all tasks requiring the
/// identical set of quantities share a shape.
pub type ResourceShape = ResourceSet;

impl ResourceSet {
    /// Empty set (demands nothing, provides nothing).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(name, quantity)` pairs, dropping zero entries.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        let quantities = entries
            .into_iter()
            .filter(|(_, q)| *q > 0)
            .map(|(k, q)| (k.into(), q))
            .collect();
        Self { quantities }
    }

    /// Quantity for a dimension; absent dimensions are zero.
    #[must_use]
    pub fn get(&self, name: &str) -> u64 {
        self.quantities.get(name).copied().unwrap_or(0)
    }

    /// True when no dimension carries a positive quantity.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.quantities.is_empty()
    }

    /// Number of dimensions with positive quantity.
    #[must_use]
    pub fn len(&self) -> usize {
        self.quantities.len()
    }

    /// Iterate `(dimension, quantity)` in dimension order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.quantities.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// True when `other` covers this set in every dimension simultaneously.
    #[must_use]
    pub fn fits_within(&self, other: &Self) -> bool {
        self.iter().all(|(name, needed)| needed <= other.get(name))
    }

    /// Per-dimension sum of two sets.
    #[must_use]
    pub fn add(&self, other: &Self) -> Self {
        let mut quantities = self.quantities.clone();
        for (name, qty) in other.iter() {
            *quantities.entry(name.to_string()).or_insert(0) += qty;
        }
        Self { quantities }
    }

    /// Per-dimension difference, erroring if any dimension would go negative.
    ///
    /// Never applied partially: on error the receiver is untouched (this is a
    /// pure function) and no dimension of the result exists.
    pub fn subtract(&self, other: &Self) -> Result<Self, SchedulerError> {
        let mut quantities = self.quantities.clone();
        for (name, qty) in other.iter() {
            let have = quantities.get(name).copied().unwrap_or(0);
            let left = have
                .checked_sub(qty)
                .ok_or_else(|| SchedulerError::ResourceUnderflow(name.to_string()))?;
            if left == 0 {
                quantities.remove(name);
            } else {
                quantities.insert(name.to_string(), left);
            }
        }
        Ok(Self { quantities })
    }
}

impl fmt::Display for ResourceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, qty)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {qty}")?;
        }
        write!(f, "}}")
    }
}

/// Tracks currently available vs. committed local capacity.
///
/// `total` is the node's fixed inventory, supplied externally. `committed`
/// grows on dispatch and shrinks when a granted lease is released. Available
/// capacity is always derived (`total - committed`), so the two views cannot
/// drift apart.
#[derive(Debug, Clone)]
pub struct ResourceLedger {
    total: ResourceSet,
    committed: ResourceSet,
}

impl ResourceLedger {
    /// Create a ledger over a fixed total inventory.
    #[must_use]
    pub fn new(total: ResourceSet) -> Self {
        Self {
            total,
            committed: ResourceSet::new(),
        }
    }

    /// The node's fixed total inventory.
    #[must_use]
    pub fn total(&self) -> &ResourceSet {
        &self.total
    }

    /// Capacity currently committed to dispatched leases.
    #[must_use]
    pub fn committed(&self) -> &ResourceSet {
        &self.committed
    }

    /// Currently uncommitted capacity.
    #[must_use]
    pub fn available(&self) -> ResourceSet {
        // committed never exceeds total (commit checks), so this cannot fail
        self.total
            .subtract(&self.committed)
            .unwrap_or_else(|_| ResourceSet::new())
    }

    /// Whether `request` fits within currently available capacity.
    #[must_use]
    pub fn can_satisfy(&self, request: &ResourceSet) -> bool {
        request.fits_within(&self.available())
    }

    /// Whether `request` could ever fit this node, even with nothing
    /// committed. False means the shape is locally infeasible.
    #[must_use]
    pub fn fits_total(&self, request: &ResourceSet) -> bool {
        request.fits_within(&self.total)
    }

    /// Move `request` from available to committed.
    ///
    /// All dimensions are committed together or not at all; there are no
    /// partial grants.
    pub fn commit(&mut self, request: &ResourceSet) -> Result<(), SchedulerError> {
        if !self.can_satisfy(request) {
            return Err(SchedulerError::CapacityExceeded(format!(
                "requested {request}, available {}",
                self.available()
            )));
        }
        self.committed = self.committed.add(request);
        Ok(())
    }

    /// Return previously committed capacity to the available pool.
    ///
    /// Releasing more than is committed indicates a bookkeeping bug upstream;
    /// the ledger clamps at zero and logs rather than corrupting state.
    pub fn release(&mut self, request: &ResourceSet) {
        match self.committed.subtract(request) {
            Ok(left) => self.committed = left,
            Err(e) => {
                tracing::warn!("ledger release underflow ({e}); clamping committed to zero");
                self.committed = ResourceSet::from_entries(
                    self.committed
                        .iter()
                        .map(|(name, have)| (name.to_string(), have.saturating_sub(request.get(name)))),
                );
            }
        }
    }
}
