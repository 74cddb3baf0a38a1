//! The node contract (§4.4): the abstract update/collect interface every
//! node kind implements, and the small set of tags the node table needs in
//! order to schedule nodes without knowing their concrete type.

use std::any::Any;

use crate::graph::GraphId;
use crate::table::NodeTable;

/// Registration-time tag fixed for the lifetime of a node.
///
/// Immutable after registration; used by the propagation driver to decide
/// how a node participates in a cycle (inputs seed `changedInputs`, link
/// outputs never have successors, and so on).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeCategory {
    /// An ordinary derived node (state function, event processor).
    Normal,
    /// An externally-writable input (state variable, event source, slot
    /// helper receivers for cross-graph links).
    Input,
    /// The hidden proxy a slot routes rewires through.
    DynInput,
    /// An observer: never changes graph value, only runs a side effect.
    Output,
    /// A cross-graph forwarder attached to a source node.
    LinkOutput,
}

/// The three outcomes a node's `update` may report in a single cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// No change; successors are not scheduled.
    Unchanged,
    /// The node's value or event buffer changed; successors are scheduled.
    Changed,
    /// The node rewired its topology and must be re-queued at its updated
    /// level before being updated again.
    Shifted,
}

/// A staged cross-graph delivery, produced by a link forwarder's
/// `collect_output` and consumed once per target graph after the queue
/// drains (§4.3 step 3, §4.7).
pub type LinkDelivery = Box<dyn FnOnce(&crate::graph::Group) + Send>;

/// Per-target-graph bucket of staged deliveries collected during one cycle.
#[derive(Default)]
pub struct LinkOutputs {
    pub(crate) by_target: std::collections::HashMap<GraphId, (crate::graph::Group, Vec<LinkDelivery>)>,
}

impl LinkOutputs {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Stages a delivery closure for the given target graph.
    pub fn stage(&mut self, target: crate::graph::Group, delivery: LinkDelivery) {
        self.by_target
            .entry(target.id())
            .or_insert_with(|| (target, Vec::new()))
            .1
            .push(delivery);
    }
}

/// Read-only context handed to a node's `update`, giving access to the
/// rest of the node table so a combinator can read its parents' current
/// values or buffered events without the table knowing their concrete type.
pub struct UpdateContext<'a> {
    pub table: &'a NodeTable,
}

/// The abstract interface every node body implements (§4.4).
///
/// Implementations are free to store whatever typed payload they need;
/// the table only ever talks to them through this object-safe interface
/// plus the narrow `value_any`/`events_any` escape hatches used by
/// combinators to read a parent's current value.
pub trait NodeBody: Any + Send {
    /// Consumes parents' current values or buffered events, computes the
    /// node's new state, and reports what happened. Must be idempotent
    /// within a single cycle barring `Shifted` re-entry (§4.3, §4.4).
    fn update(&mut self, ctx: &UpdateContext<'_>) -> UpdateOutcome;

    /// Clears per-cycle buffers. Default no-op; event nodes empty their
    /// buffer here.
    fn clear(&mut self) {}

    /// Stages cross-graph deliveries. Default no-op; only link forwarders
    /// override this.
    fn collect_output(&mut self, _ctx: &UpdateContext<'_>, _outputs: &mut LinkOutputs) {}

    /// Exposes the node's current value for combinators that depend on it,
    /// if this node kind carries one (state nodes do, event nodes don't).
    fn value_any(&self) -> Option<&dyn Any> {
        None
    }

    /// Exposes the node's current cycle event buffer, if this node kind
    /// carries one.
    fn events_any(&self) -> Option<&dyn Any> {
        None
    }

    /// Type-erased mutable access, used by `push_input` callbacks to reach
    /// into a node's pending buffer or cause an in-place mutation.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Called once, immediately after registration, with the node's own
    /// freshly minted id. Default no-op; slot and link-forwarder bodies
    /// override this since they need to name themselves in later
    /// `attach`/`detach` calls or as a link cache key.
    fn init_self_id(&mut self, _id: crate::table::NodeId) {}
}
