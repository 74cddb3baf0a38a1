//! Slot node bodies (§3 "Slot"): state/event cells whose inner source can
//! be swapped at runtime. The swap is routed through a hidden `DynInput`
//! helper node so it participates in ordinary propagation instead of
//! mutating the table out of band (§4.4).

use std::any::Any;

use smallvec::SmallVec;

use crate::node::{NodeBody, UpdateContext, UpdateOutcome};
use crate::table::NodeId;

/// The hidden proxy a slot's `set` routes through. Holds at most one
/// pending rewire request; if `set` is called more than once before the
/// next cycle, the last call wins.
pub(crate) struct DynInputBody {
    pending: Option<NodeId>,
}

impl DynInputBody {
    pub(crate) fn new() -> Self {
        DynInputBody { pending: None }
    }

    pub(crate) fn request_rewire(&mut self, new_source: NodeId) {
        self.pending = Some(new_source);
    }

    fn take_pending(&mut self) -> Option<NodeId> {
        self.pending.take()
    }
}

impl NodeBody for DynInputBody {
    fn update(&mut self, _ctx: &UpdateContext<'_>) -> UpdateOutcome {
        if self.pending.is_some() {
            UpdateOutcome::Changed
        } else {
            UpdateOutcome::Unchanged
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn take_rewire(ctx: &UpdateContext<'_>, dyn_input: NodeId) -> Option<NodeId> {
    ctx.table.with_body_mut(dyn_input, |body| {
        body.downcast_mut::<DynInputBody>()
            .expect("slot's dyn-input node body is not a DynInputBody")
            .take_pending()
    })
}

/// A state cell whose source can be swapped (§3, `StateSlot`).
pub(crate) struct StateSlotBody<T> {
    self_id: NodeId,
    dyn_input: NodeId,
    current_source: NodeId,
    value: T,
}

impl<T: Clone + PartialEq + Send + 'static> StateSlotBody<T> {
    pub(crate) fn new(dyn_input: NodeId, initial_source: NodeId, initial_value: T) -> Self {
        StateSlotBody {
            self_id: NodeId::default(),
            dyn_input,
            current_source: initial_source,
            value: initial_value,
        }
    }
}

impl<T: Clone + PartialEq + Send + 'static> NodeBody for StateSlotBody<T> {
    fn init_self_id(&mut self, id: NodeId) {
        self.self_id = id;
    }

    fn update(&mut self, ctx: &UpdateContext<'_>) -> UpdateOutcome {
        if let Some(new_source) = take_rewire(ctx, self.dyn_input) {
            if new_source != self.current_source {
                ctx.table.detach(self.self_id, self.current_source);
                ctx.table.attach(self.self_id, new_source);
                self.current_source = new_source;
                // Leave `self.value` at the pre-rewire value so the plain
                // update the driver re-runs next round diffs against it and
                // reports `Changed` if the new source's value actually
                // differs (§4.4).
                return UpdateOutcome::Shifted;
            }
        }
        let next = ctx
            .table
            .with_value::<T, T>(self.current_source, |v| v.clone());
        if next != self.value {
            self.value = next;
            UpdateOutcome::Changed
        } else {
            UpdateOutcome::Unchanged
        }
    }

    fn value_any(&self) -> Option<&dyn Any> {
        Some(&self.value)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// An event stream whose source can be swapped (§3, `EventSlot`).
pub(crate) struct EventSlotBody<E> {
    self_id: NodeId,
    dyn_input: NodeId,
    current_source: NodeId,
    buffer: SmallVec<[E; 4]>,
}

impl<E: Clone + Send + 'static> EventSlotBody<E> {
    pub(crate) fn new(dyn_input: NodeId, initial_source: NodeId) -> Self {
        EventSlotBody {
            self_id: NodeId::default(),
            dyn_input,
            current_source: initial_source,
            buffer: SmallVec::new(),
        }
    }
}

impl<E: Clone + Send + 'static> NodeBody for EventSlotBody<E> {
    fn init_self_id(&mut self, id: NodeId) {
        self.self_id = id;
    }

    fn update(&mut self, ctx: &UpdateContext<'_>) -> UpdateOutcome {
        if let Some(new_source) = take_rewire(ctx, self.dyn_input) {
            if new_source != self.current_source {
                ctx.table.detach(self.self_id, self.current_source);
                ctx.table.attach(self.self_id, new_source);
                self.current_source = new_source;
                // Defer reading the new source's occurrences to the plain
                // update the driver re-runs next round, so an occurrence
                // already buffered on the new source earlier this same
                // cycle (before the rewire landed) is picked up exactly
                // once instead of being missed or double-counted (§4.4).
                return UpdateOutcome::Shifted;
            }
        }
        let produced = ctx
            .table
            .with_events::<E, SmallVec<[E; 4]>>(self.current_source, |events| {
                events.iter().cloned().collect()
            });
        if !produced.is_empty() {
            self.buffer.extend(produced);
            UpdateOutcome::Changed
        } else {
            UpdateOutcome::Unchanged
        }
    }

    fn clear(&mut self) {
        self.buffer.clear();
    }

    fn events_any(&self) -> Option<&dyn Any> {
        Some(&self.buffer)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
