//! Cross-graph links (§4.7, §6 "Cross-graph link protocol"): a typed
//! receiver in a target graph kept live by a forwarder cached in the
//! source graph, so repeated links over the same source node share one
//! forwarder (§4.7, invariant 6).

use std::marker::PhantomData;
use std::sync::Arc;

use crate::api::handle::{new_handle, NodeHandle};
use crate::api::event::Event;
use crate::api::state::State;
use crate::graph::Group;
use crate::link::ForwarderHandle;
use crate::node::NodeCategory;
use crate::nodes::event::EventSourceBody;
use crate::nodes::link_node::{EventLinkForwarderBody, StateLinkForwarderBody};
use crate::nodes::state::StateVarBody;

/// A state value forwarded from another graph (§6, "Cross-graph link
/// protocol"). Backed by an ordinary input node in the target graph fed
/// by a forwarder cached in the source graph; deliveries arrive as
/// ordinary enqueued transactions on the target, one cycle behind the
/// source's own propagation (§4.7, "Link eventual consistency").
///
/// Dropping a `Link` drops its keep-alive on the source-side forwarder.
/// If no other link shares that forwarder, the forwarder is unregistered
/// from the source graph even though the receiver's `State<T>` view
/// (obtained via [`Link::as_state`]) may still be held elsewhere — once
/// dropped, that view simply stops receiving new deliveries.
pub struct Link<T> {
    receiver: Arc<NodeHandle>,
    #[allow(dead_code)]
    forwarder: ForwarderHandle,
    _marker: PhantomData<T>,
}

impl<T: Clone + PartialEq + Send + 'static> Link<T> {
    /// Links a state from `source`'s graph into `target`, reusing a
    /// cached forwarder if one is already live for this (source node,
    /// target graph) pair.
    pub fn new(target: &Group, source: &State<T>) -> Self {
        let source_group = source.group().clone();
        let source_id = source.id();
        let target_id = target.id();
        let initial = source.get();
        let receiver_id = target.register(NodeCategory::Input, Box::new(StateVarBody::new(initial)));
        let target_for_forwarder = target.clone();
        let forwarder = source_group.lookup_or_create_forwarder(source_id, target_id, move || {
            Box::new(StateLinkForwarderBody::<T>::new(
                source_id,
                target_for_forwarder,
                receiver_id,
            ))
        });
        Link {
            receiver: new_handle(target, receiver_id),
            forwarder,
            _marker: PhantomData,
        }
    }

    /// A read-only view over the receiver in the target graph. Keep the
    /// `Link` itself alive for as long as this view should keep receiving
    /// deliveries.
    pub fn as_state(&self) -> State<T> {
        State::from_handle(Arc::clone(&self.receiver))
    }

    pub fn get(&self) -> T {
        self.as_state().get()
    }
}

/// An event stream forwarded from another graph; the event-stream
/// counterpart of [`Link`].
pub struct EventLink<E> {
    receiver: Arc<NodeHandle>,
    #[allow(dead_code)]
    forwarder: ForwarderHandle,
    _marker: PhantomData<E>,
}

impl<E: Clone + Send + 'static> EventLink<E> {
    pub fn new(target: &Group, source: &Event<E>) -> Self {
        let source_group = source.group().clone();
        let source_id = source.id();
        let target_id = target.id();
        let receiver_id = target.register(NodeCategory::Input, Box::new(EventSourceBody::<E>::new()));
        let target_for_forwarder = target.clone();
        let forwarder = source_group.lookup_or_create_forwarder(source_id, target_id, move || {
            Box::new(EventLinkForwarderBody::<E>::new(
                source_id,
                target_for_forwarder,
                receiver_id,
            ))
        });
        EventLink {
            receiver: new_handle(target, receiver_id),
            forwarder,
            _marker: PhantomData,
        }
    }

    /// A read-only view over the receiver in the target graph. Keep the
    /// `EventLink` itself alive for as long as this view should keep
    /// receiving deliveries.
    pub fn as_event(&self) -> Event<E> {
        Event::from_handle(Arc::clone(&self.receiver))
    }
}
