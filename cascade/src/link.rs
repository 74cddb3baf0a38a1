//! Cross-graph link forwarding (§4.7): a cache of live forwarder nodes
//! keyed by `(source node, target graph)`, so repeated `Link::new` calls
//! over the same pair reuse one forwarder instead of registering a new
//! `LinkOutput` node every time.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use crate::graph::{GraphId, Group};
use crate::node::{NodeBody, NodeCategory};
use crate::table::{NodeId, NodeTable};

struct ForwarderEntry {
    source: Group,
    forwarder_id: NodeId,
}

impl Drop for ForwarderEntry {
    fn drop(&mut self) {
        self.source.unregister(self.forwarder_id);
    }
}

/// A live reference to a cached forwarder. Holding this keeps the
/// forwarder node registered; once every handle over a given
/// `(source, target)` pair is dropped, the forwarder is unregistered from
/// the source graph (invariant 6).
#[derive(Clone)]
pub struct ForwarderHandle(Arc<ForwarderEntry>);

impl ForwarderHandle {
    pub(crate) fn node_id(&self) -> NodeId {
        self.0.forwarder_id
    }
}

/// Per-source-graph registry of live forwarders, keyed by the node being
/// forwarded and the target graph it feeds.
pub(crate) struct LinkCache {
    entries: HashMap<(NodeId, GraphId), Weak<ForwarderEntry>>,
}

impl LinkCache {
    pub(crate) fn new() -> Self {
        LinkCache {
            entries: HashMap::new(),
        }
    }

    /// Returns a cached forwarder handle if one is still alive, otherwise
    /// registers a fresh `LinkOutput` node (via `make_body`) attached to
    /// `source_id` and caches it. Operates directly on `table`, which the
    /// caller must already hold the graph's lock for, so registration
    /// never re-enters the graph's own mutex.
    pub(crate) fn lookup_or_create(
        &mut self,
        table: &NodeTable,
        source_graph: Group,
        source_id: NodeId,
        target_id: GraphId,
        make_body: impl FnOnce() -> Box<dyn NodeBody>,
    ) -> ForwarderHandle {
        let key = (source_id, target_id);
        if let Some(weak) = self.entries.get(&key) {
            if let Some(strong) = weak.upgrade() {
                return ForwarderHandle(strong);
            }
        }
        let forwarder_id = table.register(NodeCategory::LinkOutput, make_body());
        table.attach(forwarder_id, source_id);
        let entry = Arc::new(ForwarderEntry {
            source: source_graph,
            forwarder_id,
        });
        self.entries.insert(key, Arc::downgrade(&entry));
        ForwarderHandle(entry)
    }
}
