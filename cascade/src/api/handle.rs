//! Shared refcounted node lifetime for the typed surface layer. Every
//! public wrapper type (`StateVar`, `State`, `EventSource`, `Event`,
//! `Observer`, `Link`) holds an `Arc<NodeHandle>`; the underlying node is
//! unregistered once the last clone referencing it is dropped.

use std::sync::Arc;

use crate::graph::Group;
use crate::table::NodeId;

pub(crate) struct NodeHandle {
    pub(crate) group: Group,
    pub(crate) id: NodeId,
}

impl Drop for NodeHandle {
    fn drop(&mut self) {
        self.group.unregister(self.id);
    }
}

pub(crate) fn new_handle(group: &Group, id: NodeId) -> Arc<NodeHandle> {
    Arc::new(NodeHandle {
        group: group.clone(),
        id,
    })
}
