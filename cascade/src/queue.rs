//! The topological queue (§4.2): a min-oriented bucket of scheduled node
//! ids, implemented as a partition over a flat vector rather than a heap.

use crate::table::NodeId;

/// Holds pending `(id, level)` pairs and, after [`TopoQueue::fetch_next`],
/// the batch of entries sharing the current minimum level.
pub struct TopoQueue {
    pending: Vec<(NodeId, u32)>,
    current: Vec<(NodeId, u32)>,
}

impl TopoQueue {
    pub fn new() -> Self {
        TopoQueue {
            pending: Vec::new(),
            current: Vec::new(),
        }
    }

    /// Appends an entry to the pending set.
    pub fn push(&mut self, id: NodeId, level: u32) {
        self.pending.push((id, level));
    }

    /// Computes the minimum level among pending entries, moves all entries
    /// at that level into the current batch, and reports whether any were
    /// found.
    pub fn fetch_next(&mut self) -> bool {
        self.current.clear();
        let Some(min_level) = self.pending.iter().map(|&(_, level)| level).min() else {
            return false;
        };
        let mut remaining = Vec::with_capacity(self.pending.len());
        for entry in self.pending.drain(..) {
            if entry.1 == min_level {
                self.current.push(entry);
            } else {
                remaining.push(entry);
            }
        }
        self.pending = remaining;
        !self.current.is_empty()
    }

    /// The current batch, populated by the most recent `fetch_next`.
    pub fn next(&self) -> &[(NodeId, u32)] {
        &self.current
    }

    /// Empties both the current batch and the pending set, returning every
    /// id that was waiting. Used to abandon a propagation cycle after a
    /// node panics (§7, "Propagation exception") so none of those ids are
    /// left permanently marked as queued.
    pub fn drain_all(&mut self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.current.drain(..).map(|(id, _)| id).collect();
        ids.extend(self.pending.drain(..).map(|(id, _)| id));
        ids
    }
}

impl Default for TopoQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeBody, NodeCategory, UpdateContext, UpdateOutcome};
    use crate::table::NodeTable;
    use std::any::Any;

    struct Dummy;
    impl NodeBody for Dummy {
        fn update(&mut self, _ctx: &UpdateContext<'_>) -> UpdateOutcome {
            UpdateOutcome::Unchanged
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn mk_id(table: &NodeTable) -> NodeId {
        table.register(NodeCategory::Normal, Box::new(Dummy))
    }

    #[test]
    fn fetch_next_groups_by_minimum_level() {
        let table = NodeTable::new();
        let a = mk_id(&table);
        let b = mk_id(&table);
        let c = mk_id(&table);

        let mut queue = TopoQueue::new();
        queue.push(a, 2);
        queue.push(b, 0);
        queue.push(c, 0);

        assert!(queue.fetch_next());
        let mut ids: Vec<NodeId> = queue.next().iter().map(|&(id, _)| id).collect();
        ids.sort();
        let mut expected = vec![b, c];
        expected.sort();
        assert_eq!(ids, expected);

        assert!(queue.fetch_next());
        assert_eq!(queue.next(), &[(a, 2)]);

        assert!(!queue.fetch_next());
    }

    #[test]
    fn pushes_during_drain_are_visible_next_round() {
        let table = NodeTable::new();
        let a = mk_id(&table);
        let b = mk_id(&table);

        let mut queue = TopoQueue::new();
        queue.push(a, 0);
        assert!(queue.fetch_next());
        queue.push(b, 1);
        assert!(queue.fetch_next());
        assert_eq!(queue.next(), &[(b, 1)]);
    }

    #[test]
    fn drain_all_empties_current_and_pending() {
        let table = NodeTable::new();
        let a = mk_id(&table);
        let b = mk_id(&table);
        let c = mk_id(&table);

        let mut queue = TopoQueue::new();
        queue.push(a, 0);
        queue.push(b, 0);
        assert!(queue.fetch_next());
        queue.push(c, 1);

        let mut drained = queue.drain_all();
        drained.sort();
        let mut expected = vec![a, b, c];
        expected.sort();
        assert_eq!(drained, expected);
        assert!(!queue.fetch_next());
    }
}
