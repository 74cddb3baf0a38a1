//! Link forwarder bodies (§4.7): the `LinkOutput` nodes attached to a
//! source node that stage a delivery closure for a target graph once per
//! cycle the source actually changes. Receivers on the target side are
//! ordinary input nodes ([`super::state::StateVarBody`] /
//! [`super::event::EventSourceBody`]) reached through `Group::push_input`,
//! so no bespoke receiver body is needed.

use std::any::Any;

use smallvec::SmallVec;

use crate::graph::{Group, WeakGroup};
use crate::node::{LinkOutputs, NodeBody, UpdateContext, UpdateOutcome};
use crate::table::NodeId;

use super::event::EventSourceBody;
use super::state::StateVarBody;

/// Forwards a state's current value to a `StateVarBody<T>` input node in
/// another graph. Holds the target only weakly (§7, "Link target
/// destroyed"): a forwarder cached on the source side must never be the
/// reason a target graph's worker thread stays alive.
pub(crate) struct StateLinkForwarderBody<T> {
    source: NodeId,
    target: WeakGroup,
    receiver: NodeId,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Clone + PartialEq + Send + 'static> StateLinkForwarderBody<T> {
    pub(crate) fn new(source: NodeId, target: Group, receiver: NodeId) -> Self {
        StateLinkForwarderBody {
            source,
            target: target.downgrade(),
            receiver,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T: Clone + PartialEq + Send + 'static> NodeBody for StateLinkForwarderBody<T> {
    fn update(&mut self, _ctx: &UpdateContext<'_>) -> UpdateOutcome {
        UpdateOutcome::Unchanged
    }

    fn collect_output(&mut self, ctx: &UpdateContext<'_>, outputs: &mut LinkOutputs) {
        let Some(target) = self.target.upgrade() else {
            return;
        };
        let value = ctx.table.with_value::<T, T>(self.source, |v| v.clone());
        let receiver = self.receiver;
        outputs.stage(
            target,
            Box::new(move |g: &Group| {
                g.push_input(receiver, |body| {
                    body.downcast_mut::<StateVarBody<T>>()
                        .expect("link receiver body is not a StateVarBody<T>")
                        .set(value);
                });
            }),
        );
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Forwards an event stream's occurrences this cycle to an
/// `EventSourceBody<E>` input node in another graph. See
/// [`StateLinkForwarderBody`] for why the target is held weakly.
pub(crate) struct EventLinkForwarderBody<E> {
    source: NodeId,
    target: WeakGroup,
    receiver: NodeId,
    _marker: std::marker::PhantomData<E>,
}

impl<E: Clone + Send + 'static> EventLinkForwarderBody<E> {
    pub(crate) fn new(source: NodeId, target: Group, receiver: NodeId) -> Self {
        EventLinkForwarderBody {
            source,
            target: target.downgrade(),
            receiver,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<E: Clone + Send + 'static> NodeBody for EventLinkForwarderBody<E> {
    fn update(&mut self, _ctx: &UpdateContext<'_>) -> UpdateOutcome {
        UpdateOutcome::Unchanged
    }

    fn collect_output(&mut self, ctx: &UpdateContext<'_>, outputs: &mut LinkOutputs) {
        let events: SmallVec<[E; 4]> = ctx
            .table
            .with_events::<E, SmallVec<[E; 4]>>(self.source, |events| events.iter().cloned().collect());
        if events.is_empty() {
            return;
        }
        let Some(target) = self.target.upgrade() else {
            return;
        };
        let receiver = self.receiver;
        outputs.stage(
            target,
            Box::new(move |g: &Group| {
                g.push_input(receiver, |body| {
                    let receiver_body = body
                        .downcast_mut::<EventSourceBody<E>>()
                        .expect("link receiver body is not an EventSourceBody<E>");
                    for event in events {
                        receiver_body.emit(event);
                    }
                });
            }),
        );
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
