//! Asynchronous transactions and the merge-eligibility flags carried
//! alongside them (§4.5).

use crate::graph::Group;
use crate::sync_point::Dependency;

/// Bits attached to an [`AsyncTransaction`], controlling whether it may be
/// folded into an adjacent batch and whether its dependency should be held
/// open across any cross-graph link deliveries it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionFlags(u8);

impl TransactionFlags {
    pub const NONE: Self = TransactionFlags(0);
    /// This transaction may be merged with adjacent mergeable transactions
    /// into a single propagation cycle.
    pub const ALLOW_MERGING: Self = TransactionFlags(1 << 1);
    /// This transaction's dependency should only release once propagation
    /// has completed on every graph reached through a link this cycle.
    pub const SYNC_LINKED: Self = TransactionFlags(1 << 2);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for TransactionFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        TransactionFlags(self.0 | rhs.0)
    }
}

impl Default for TransactionFlags {
    fn default() -> Self {
        Self::NONE
    }
}

/// A unit of work queued on a graph's background worker thread: a closure
/// to run inside a transaction, an optional dependency token to hold open
/// while it is pending, and its merge/sync-linked flags.
pub struct AsyncTransaction {
    pub(crate) func: Box<dyn FnOnce(&Group) + Send>,
    pub(crate) dependency: Option<Dependency>,
    pub(crate) flags: TransactionFlags,
}
