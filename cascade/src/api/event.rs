//! The typed `Event` surface (§6): a handle to a discrete event stream,
//! plus the stream combinators.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::api::handle::{new_handle, NodeHandle};
use crate::graph::Group;
use crate::node::NodeCategory;
use crate::nodes::event::{EventFilterBody, EventMapBody, EventMergeBody, EventSourceBody};
use crate::nodes::state::PulseBody;
use crate::nodes::slot::{DynInputBody, EventSlotBody};
use crate::table::NodeId;

/// A handle to an event stream (§3, "Event").
pub struct Event<E> {
    pub(crate) handle: Arc<NodeHandle>,
    _marker: PhantomData<E>,
}

impl<E> Clone for Event<E> {
    fn clone(&self) -> Self {
        Event {
            handle: Arc::clone(&self.handle),
            _marker: PhantomData,
        }
    }
}

impl<E> Event<E> {
    pub(crate) fn from_handle(handle: Arc<NodeHandle>) -> Self {
        Event {
            handle,
            _marker: PhantomData,
        }
    }

    pub fn group(&self) -> &Group {
        &self.handle.group
    }

    pub(crate) fn id(&self) -> NodeId {
        self.handle.id
    }
}

impl<E: Clone + Send + 'static> Event<E> {
    /// Produces an event carrying the results of applying `f` to each
    /// occurrence (§6, `Event::map`).
    pub fn map<R, F>(&self, f: F) -> Event<R>
    where
        R: Clone + Send + 'static,
        F: Fn(&E) -> R + Send + 'static,
    {
        let group = self.handle.group.clone();
        let parent = self.handle.id;
        let id = group.register(NodeCategory::Normal, Box::new(EventMapBody::new(parent, f)));
        group.attach(id, parent);
        Event::from_handle(new_handle(&group, id))
    }

    /// Produces an event passing through only the occurrences matching
    /// `predicate` (§6, `Event::filter`).
    pub fn filter<F>(&self, predicate: F) -> Event<E>
    where
        F: Fn(&E) -> bool + Send + 'static,
    {
        let group = self.handle.group.clone();
        let parent = self.handle.id;
        let id = group.register(
            NodeCategory::Normal,
            Box::new(EventFilterBody::new(parent, predicate)),
        );
        group.attach(id, parent);
        Event::from_handle(new_handle(&group, id))
    }

    /// Samples `state`'s current value once per occurrence of this event,
    /// unconditionally — firing twice in one cycle samples twice even if
    /// the value didn't change between them (§6, `Event::pulse`); the dual
    /// of [`crate::api::state::State::snapshot`], which is equality-gated
    /// and produces a state instead of an event.
    pub fn pulse<T>(&self, state: &super::state::State<T>) -> Event<T>
    where
        T: Clone + Send + 'static,
    {
        let group = self.handle.group.clone();
        let trigger = self.handle.id;
        let source = state.id();
        let id = group.register(
            NodeCategory::Normal,
            Box::new(PulseBody::<T, E>::new(trigger, source)),
        );
        group.attach(id, trigger);
        group.attach(id, source);
        Event::from_handle(new_handle(&group, id))
    }

    /// Merges this stream with others, preserving each source's relative
    /// firing order within a cycle (§6, `Event::merge`).
    pub fn merge(streams: &[Event<E>]) -> Event<E> {
        assert!(!streams.is_empty(), "cannot merge an empty set of streams");
        let group = streams[0].handle.group.clone();
        let parents: Vec<NodeId> = streams.iter().map(|s| s.handle.id).collect();
        let id = group.register(
            NodeCategory::Normal,
            Box::new(EventMergeBody::<E>::new(parents.clone())),
        );
        for parent in parents {
            group.attach(id, parent);
        }
        Event::from_handle(new_handle(&group, id))
    }
}

/// An externally-writable event stream (§3, `EventSource`).
pub struct EventSource<E> {
    handle: Arc<NodeHandle>,
    _marker: PhantomData<E>,
}

impl<E> Clone for EventSource<E> {
    fn clone(&self) -> Self {
        EventSource {
            handle: Arc::clone(&self.handle),
            _marker: PhantomData,
        }
    }
}

impl<E: Clone + Send + 'static> EventSource<E> {
    pub fn new(group: &Group) -> Self {
        let id = group.register(NodeCategory::Input, Box::new(EventSourceBody::<E>::new()));
        EventSource {
            handle: new_handle(group, id),
            _marker: PhantomData,
        }
    }

    /// Emits a new occurrence.
    pub fn emit(&self, value: E) {
        let id = self.handle.id;
        self.handle.group.push_input(id, move |body| {
            body.downcast_mut::<EventSourceBody<E>>()
                .expect("event source body type mismatch")
                .emit(value);
        });
    }

    pub fn as_event(&self) -> Event<E> {
        Event::from_handle(Arc::clone(&self.handle))
    }
}

/// An event stream whose source can be rewired after construction (§3,
/// "Slot").
pub struct EventSlot<E> {
    handle: Arc<NodeHandle>,
    dyn_input: NodeId,
    _marker: PhantomData<E>,
}

impl<E: Clone + Send + 'static> EventSlot<E> {
    pub fn new(group: &Group, initial: &Event<E>) -> Self {
        let dyn_input = group.register(NodeCategory::DynInput, Box::new(DynInputBody::new()));
        let initial_id = initial.id();
        let id = group.register(
            NodeCategory::Normal,
            Box::new(EventSlotBody::<E>::new(dyn_input, initial_id)),
        );
        group.attach(id, dyn_input);
        group.attach(id, initial_id);
        EventSlot {
            handle: new_handle(group, id),
            dyn_input,
            _marker: PhantomData,
        }
    }

    pub fn set(&self, source: &Event<E>) {
        let new_source = source.id();
        self.handle.group.push_input(self.dyn_input, move |body| {
            body.downcast_mut::<DynInputBody>()
                .expect("slot dyn-input body type mismatch")
                .request_rewire(new_source);
        });
    }

    pub fn as_event(&self) -> Event<E> {
        Event::from_handle(Arc::clone(&self.handle))
    }
}
