//! The typed `State` surface (§6): a read-only view over a state node,
//! plus the combinators that build new states from existing ones.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::api::handle::{new_handle, NodeHandle};
use crate::graph::Group;
use crate::node::NodeCategory;
use crate::nodes::slot::{DynInputBody, StateSlotBody};
use crate::nodes::state::{FoldBody, StateMapBody, StateMergeBody, StateSnapshotBody, StateVarBody};
use crate::table::NodeId;

/// A read-only handle to a state cell's current value (§3, "State").
pub struct State<T> {
    pub(crate) handle: Arc<NodeHandle>,
    _marker: PhantomData<T>,
}

impl<T> Clone for State<T> {
    fn clone(&self) -> Self {
        State {
            handle: Arc::clone(&self.handle),
            _marker: PhantomData,
        }
    }
}

impl<T> State<T> {
    pub(crate) fn from_handle(handle: Arc<NodeHandle>) -> Self {
        State {
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

impl<T: Clone + PartialEq + Send + 'static> State<T> {
    /// Reads the current value. Must not be called from within a
    /// propagation callback running on this same graph (an observer
    /// action, a combinator closure) — doing so re-enters the graph's
    /// lock on the calling thread and hangs. Use the node table passed to
    /// `update` for in-propagation reads instead.
    pub fn get(&self) -> T {
        self.handle
            .group
            .table_op(|inner| inner.table.with_value::<T, T>(self.handle.id, |v| v.clone()))
    }

    /// Derives a new state by applying a pure function every time this
    /// state changes (§6, `State::map`).
    pub fn map<U, F>(&self, f: F) -> State<U>
    where
        U: Clone + PartialEq + Send + 'static,
        F: Fn(&T) -> U + Send + 'static,
    {
        let initial = self.get();
        let initial_value = f(&initial);
        let group = self.handle.group.clone();
        let parent = self.handle.id;
        let id = group.register(
            NodeCategory::Normal,
            Box::new(StateMapBody::new(parent, f, initial_value)),
        );
        group.attach(id, parent);
        State::from_handle(new_handle(&group, id))
    }

    /// Derives a new state by combining this state with another every time
    /// either changes (§6, `state_with`).
    pub fn state_with<B, R, F>(&self, other: &State<B>, f: F) -> State<R>
    where
        B: Clone + PartialEq + Send + 'static,
        R: Clone + PartialEq + Send + 'static,
        F: Fn(&T, &B) -> R + Send + 'static,
    {
        let initial = f(&self.get(), &other.get());
        let group = self.handle.group.clone();
        let parent_a = self.handle.id;
        let parent_b = other.handle.id;
        let id = group.register(
            NodeCategory::Normal,
            Box::new(StateMergeBody::new(parent_a, parent_b, f, initial)),
        );
        group.attach(id, parent_a);
        group.attach(id, parent_b);
        State::from_handle(new_handle(&group, id))
    }

    /// Samples this state's current value whenever `trigger` fires,
    /// producing a new state that only changes when the sampled value
    /// actually differs from the one it already holds (§6,
    /// `State::snapshot`). The dual of [`super::event::Event::pulse`],
    /// which samples unconditionally into an event instead.
    pub fn snapshot<E: Send + 'static>(&self, trigger: &super::event::Event<E>) -> State<T> {
        let group = self.handle.group.clone();
        let source = self.handle.id;
        let trigger_id = trigger.id();
        let initial = self.get();
        let id = group.register(
            NodeCategory::Normal,
            Box::new(StateSnapshotBody::<T, E>::new(trigger_id, source, initial)),
        );
        group.attach(id, trigger_id);
        group.attach(id, source);
        State::from_handle(new_handle(&group, id))
    }
}

/// An externally-writable state cell (§3, `StateVar`).
pub struct StateVar<T> {
    handle: Arc<NodeHandle>,
    _marker: PhantomData<T>,
}

impl<T> Clone for StateVar<T> {
    fn clone(&self) -> Self {
        StateVar {
            handle: Arc::clone(&self.handle),
            _marker: PhantomData,
        }
    }
}

impl<T: Clone + PartialEq + Send + 'static> StateVar<T> {
    /// Registers a new state variable with `initial` as its starting value.
    pub fn new(group: &Group, initial: T) -> Self {
        let id = group.register(NodeCategory::Input, Box::new(StateVarBody::new(initial)));
        StateVar {
            handle: new_handle(group, id),
            _marker: PhantomData,
        }
    }

    /// Writes a new value. Outside a transaction this propagates
    /// immediately; inside one, it is batched with the rest of the
    /// transaction's writes (§4.5).
    pub fn set(&self, value: T) {
        let id = self.handle.id;
        self.handle.group.push_input(id, move |body| {
            body.downcast_mut::<StateVarBody<T>>()
                .expect("state var body type mismatch")
                .set(value);
        });
    }

    /// Enqueues an in-place mutation of the current value, applied
    /// unconditionally as a change regardless of whether `f` actually
    /// leaves the value different from before (§3, "State" — `modified`).
    /// Unlike `.set()`, this never gets suppressed by the equality gate.
    pub fn modify(&self, f: impl FnOnce(&mut T) + Send + 'static) {
        let id = self.handle.id;
        self.handle.group.push_input(id, move |body| {
            body.downcast_mut::<StateVarBody<T>>()
                .expect("state var body type mismatch")
                .modify(f);
        });
    }

    /// A read-only view over this variable.
    pub fn as_state(&self) -> State<T> {
        State::from_handle(Arc::clone(&self.handle))
    }

    pub fn get(&self) -> T {
        self.as_state().get()
    }
}

/// A state cell whose source can be rewired after construction (§3, "Slot").
pub struct StateSlot<T> {
    handle: Arc<NodeHandle>,
    dyn_input: NodeId,
    _marker: PhantomData<T>,
}

impl<T: Clone + PartialEq + Send + 'static> StateSlot<T> {
    /// Creates a slot initially routed to `initial`.
    pub fn new(group: &Group, initial: &State<T>) -> Self {
        let dyn_input = group.register(NodeCategory::DynInput, Box::new(DynInputBody::new()));
        let initial_id = initial.id();
        let initial_value = initial.get();
        let id = group.register(
            NodeCategory::Normal,
            Box::new(StateSlotBody::new(dyn_input, initial_id, initial_value)),
        );
        group.attach(id, dyn_input);
        group.attach(id, initial_id);
        StateSlot {
            handle: new_handle(group, id),
            dyn_input,
            _marker: PhantomData,
        }
    }

    /// Rewires the slot to a new source state, itself routed through
    /// ordinary propagation (§4.4).
    pub fn set(&self, source: &State<T>) {
        let new_source = source.id();
        self.handle.group.push_input(self.dyn_input, move |body| {
            body.downcast_mut::<DynInputBody>()
                .expect("slot dyn-input body type mismatch")
                .request_rewire(new_source);
        });
    }

    pub fn as_state(&self) -> State<T> {
        State::from_handle(Arc::clone(&self.handle))
    }
}

/// Folds an event stream with this state's prior value each time the
/// stream fires (§6, `iterate`). Free function since it does not belong
/// to either `State` or `Event` alone.
pub fn iterate<E, T, F>(group: &Group, source: &super::event::Event<E>, initial: T, f: F) -> State<T>
where
    E: Send + 'static,
    T: Clone + PartialEq + Send + 'static,
    F: Fn(&E, &T) -> T + Send + 'static,
{
    let parent = source.id();
    let id = group.register(
        NodeCategory::Normal,
        Box::new(FoldBody::new(parent, f, initial)),
    );
    group.attach(id, parent);
    State::from_handle(new_handle(group, id))
}

/// Holds the latest event occurrence as a state (§6, `hold`).
pub fn hold<E, T>(group: &Group, source: &super::event::Event<E>, initial: T, f: impl Fn(&E) -> T + Send + 'static) -> State<T>
where
    E: Send + 'static,
    T: Clone + PartialEq + Send + 'static,
{
    iterate(group, source, initial, move |e, _prev| f(e))
}
