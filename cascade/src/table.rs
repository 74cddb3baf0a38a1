//! The node table (§4.1): dense storage of node metadata indexed by a
//! stable, reusable id.

use std::any::Any;
use std::cell::RefCell;

use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;

use crate::node::{NodeBody, NodeCategory};

new_key_type! {
    /// A stable opaque handle into a graph's node table.
    ///
    /// Backed by `slotmap`'s generational keys: once a node is
    /// unregistered, its id is invalidated even if the slot is reused by a
    /// later registration (the generation counter changes), matching the
    /// free-list-with-reuse behaviour the spec calls for.
    pub struct NodeId;
}

/// Successor lists rarely exceed a handful of entries for the node shapes
/// this engine targets; inline storage avoids a heap allocation per node.
pub type Successors = SmallVec<[NodeId; 4]>;

struct Slot {
    category: NodeCategory,
    level: u32,
    new_level: u32,
    queued: bool,
    successors: Successors,
    body: Option<Box<dyn NodeBody>>,
}

/// Dense storage of every node's scheduling metadata and body, keyed by
/// [`NodeId`]. Interior mutability lets combinators read a sibling node's
/// value while the node currently being updated has had its own body
/// temporarily checked out (see [`NodeTable::take_body`]).
pub struct NodeTable {
    slots: RefCell<SlotMap<NodeId, Slot>>,
}

impl NodeTable {
    pub fn new() -> Self {
        NodeTable {
            slots: RefCell::new(SlotMap::with_key()),
        }
    }

    /// Registers a new node, returning its freshly minted id.
    pub fn register(&self, category: NodeCategory, body: Box<dyn NodeBody>) -> NodeId {
        let mut slots = self.slots.borrow_mut();
        let id = slots.insert(Slot {
            category,
            level: 0,
            new_level: 0,
            queued: false,
            successors: Successors::new(),
            body: Some(body),
        });
        if let Some(body) = slots[id].body.as_mut() {
            body.init_self_id(id);
        }
        id
    }

    /// Removes a node from the table. The id is invalidated; any later
    /// lookup with the same (stale) id fails.
    pub fn unregister(&self, id: NodeId) {
        self.slots.borrow_mut().remove(id);
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.slots.borrow().contains_key(id)
    }

    pub fn category(&self, id: NodeId) -> NodeCategory {
        self.slots.borrow()[id].category
    }

    pub fn level(&self, id: NodeId) -> u32 {
        self.slots.borrow()[id].level
    }

    pub fn new_level(&self, id: NodeId) -> u32 {
        self.slots.borrow()[id].new_level
    }

    pub fn set_new_level(&self, id: NodeId, level: u32) {
        let mut slots = self.slots.borrow_mut();
        let slot = &mut slots[id];
        if level > slot.new_level {
            slot.new_level = level;
        }
    }

    /// Adopts `new_level` as the node's current level (shift repair).
    pub fn adopt_new_level(&self, id: NodeId) -> u32 {
        let mut slots = self.slots.borrow_mut();
        let slot = &mut slots[id];
        slot.level = slot.new_level;
        slot.level
    }

    pub fn is_queued(&self, id: NodeId) -> bool {
        self.slots.borrow()[id].queued
    }

    pub fn set_queued(&self, id: NodeId, queued: bool) {
        self.slots.borrow_mut()[id].queued = queued;
    }

    pub fn successors(&self, id: NodeId) -> Successors {
        self.slots.borrow()[id].successors.clone()
    }

    /// Attaches `child` as a successor of `parent`, raising `child`'s level
    /// if it does not already strictly exceed `parent`'s (§4.1, invariant 1).
    pub fn attach(&self, child: NodeId, parent: NodeId) {
        let mut slots = self.slots.borrow_mut();
        slots[parent].successors.push(child);
        let parent_level = slots[parent].level;
        let child_slot = &mut slots[child];
        if child_slot.level <= parent_level {
            child_slot.level = parent_level + 1;
        }
    }

    /// Removes one `child` entry from `parent`'s successor list.
    pub fn detach(&self, child: NodeId, parent: NodeId) {
        let mut slots = self.slots.borrow_mut();
        if let Some(slot) = slots.get_mut(parent) {
            if let Some(pos) = slot.successors.iter().position(|&s| s == child) {
                slot.successors.remove(pos);
            }
        }
    }

    /// Checks out a node's body so the driver can call `update` on it
    /// without holding a borrow that would prevent the update from reading
    /// its parents' values through this same table.
    pub fn take_body(&self, id: NodeId) -> Box<dyn NodeBody> {
        self.slots.borrow_mut()[id]
            .body
            .take()
            .expect("node body already checked out")
    }

    /// Returns a previously checked-out body to its slot.
    pub fn put_body(&self, id: NodeId, body: Box<dyn NodeBody>) {
        self.slots.borrow_mut()[id].body = Some(body);
    }

    /// Reads a parent's current value by downcasting its type-erased
    /// `value_any`. Panics if the node has no value (e.g. it is an event
    /// node) or if `T` does not match the node's actual type — both are
    /// programming errors caught at construction time by the typed surface
    /// layer, never by end users of this table directly.
    pub fn with_value<T: 'static, R>(&self, id: NodeId, f: impl FnOnce(&T) -> R) -> R {
        let slots = self.slots.borrow();
        let body = slots[id]
            .body
            .as_ref()
            .expect("cannot read the value of a node currently being updated");
        let any = body
            .value_any()
            .expect("node does not carry a current value");
        let value = any
            .downcast_ref::<T>()
            .expect("state value type mismatch between node and reader");
        f(value)
    }

    /// Reads a parent's buffered events for the current cycle.
    pub fn with_events<E: 'static, R>(&self, id: NodeId, f: impl FnOnce(&[E]) -> R) -> R {
        let slots = self.slots.borrow();
        let body = slots[id]
            .body
            .as_ref()
            .expect("cannot read the events of a node currently being updated");
        let any = body
            .events_any()
            .expect("node does not carry an event buffer");
        let events = any
            .downcast_ref::<SmallVec<[E; 4]>>()
            .expect("event type mismatch between node and reader");
        f(events)
    }

    /// Runs a type-erased mutation on a node's body, used by `push_input`
    /// to write into a node's pending buffer.
    pub fn with_body_mut<R>(&self, id: NodeId, f: impl FnOnce(&mut dyn Any) -> R) -> R {
        let mut slots = self.slots.borrow_mut();
        let body = slots[id]
            .body
            .as_mut()
            .expect("cannot push into a node currently being updated");
        f(body.as_any_mut())
    }
}

impl Default for NodeTable {
    fn default() -> Self {
        Self::new()
    }
}
