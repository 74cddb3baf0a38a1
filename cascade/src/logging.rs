//! Ambient event log wired through `cascade_logging`'s `Registry`/`Logger`
//! pair. No wire format is defined here; events stay in-memory typed
//! values, matched to the teacher's own generic logging infrastructure.

use crate::node::UpdateOutcome;

/// A single logged occurrence inside a graph. Installed via
/// [`crate::GroupConfig::logger`]; with no logger installed, these are
/// never constructed.
#[derive(Debug, Clone)]
pub enum CascadeEvent {
    /// A node was registered with a graph.
    NodeRegistered { node: String, category: String },
    /// A node was removed from a graph.
    NodeUnregistered { node: String },
    /// A node's `update` ran and reported the given outcome.
    NodeUpdated {
        node: String,
        outcome: UpdateOutcome,
    },
    /// A node reported `Shifted` and was re-queued at `new_level`.
    NodeShifted { node: String, new_level: u32 },
    /// A top-level transaction committed (propagation ran to completion).
    TransactionCommitted,
    /// An asynchronous transaction was placed on a graph's queue.
    TransactionEnqueued,
    /// One or more queued transactions were folded into a single cycle.
    TransactionsMerged { count: usize },
    /// Link deliveries were staged for a target graph at the end of a cycle.
    LinkDeliveryStaged { target: String, count: usize },
    /// A staged link delivery was applied on the target graph.
    LinkDeliveryApplied { target: String },
    /// A propagation cycle was abandoned because a node or observer
    /// panicked; the graph remains usable for future transactions.
    TransactionPanicked,
}
