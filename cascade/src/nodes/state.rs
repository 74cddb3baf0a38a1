//! State node bodies: variables, pure derivations, folds over events, and
//! snapshots (§3 "State", §6 combinators).

use std::any::Any;

use crate::node::{NodeBody, UpdateContext, UpdateOutcome};
use crate::table::NodeId;

/// A pending write queued on a [`StateVarBody`] (§3, "State" — `added` vs
/// `modified`). `Added` is the equality-gated replace behind `.set()`;
/// `Modified` is the unconditional in-place mutation behind `.modify()`,
/// which reports `Changed` even if the mutation leaves the value equal to
/// what it replaced.
enum Pending<T> {
    Added(T),
    Modified(Box<dyn FnOnce(&mut T) + Send>),
}

/// An externally-writable state cell (§3, `StateVar`).
pub(crate) struct StateVarBody<T> {
    value: T,
    pending: Option<Pending<T>>,
}

impl<T: Clone + PartialEq + Send + 'static> StateVarBody<T> {
    pub(crate) fn new(initial: T) -> Self {
        StateVarBody {
            value: initial,
            pending: None,
        }
    }

    pub(crate) fn set(&mut self, value: T) {
        self.pending = Some(Pending::Added(value));
    }

    pub(crate) fn modify(&mut self, f: impl FnOnce(&mut T) + Send + 'static) {
        self.pending = Some(Pending::Modified(Box::new(f)));
    }
}

impl<T: Clone + PartialEq + Send + 'static> NodeBody for StateVarBody<T> {
    fn update(&mut self, _ctx: &UpdateContext<'_>) -> UpdateOutcome {
        match self.pending.take() {
            Some(Pending::Added(value)) if value != self.value => {
                self.value = value;
                UpdateOutcome::Changed
            }
            Some(Pending::Added(_)) => UpdateOutcome::Unchanged,
            Some(Pending::Modified(f)) => {
                f(&mut self.value);
                UpdateOutcome::Changed
            }
            None => UpdateOutcome::Unchanged,
        }
    }

    fn value_any(&self) -> Option<&dyn Any> {
        Some(&self.value)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod state_var_tests {
    use super::*;
    use crate::table::NodeTable;

    fn update(body: &mut StateVarBody<i32>, table: &NodeTable) -> UpdateOutcome {
        body.update(&UpdateContext { table })
    }

    #[test]
    fn set_is_gated_by_equality() {
        let table = NodeTable::new();
        let mut body = StateVarBody::new(3);

        body.set(3);
        assert_eq!(update(&mut body, &table), UpdateOutcome::Unchanged);

        body.set(4);
        assert_eq!(update(&mut body, &table), UpdateOutcome::Changed);
    }

    #[test]
    fn modify_is_unconditional_even_when_the_value_does_not_change() {
        let table = NodeTable::new();
        let mut body = StateVarBody::new(3);

        body.modify(|_v| {});
        assert_eq!(update(&mut body, &table), UpdateOutcome::Changed);

        body.modify(|v| *v += 1);
        assert_eq!(update(&mut body, &table), UpdateOutcome::Changed);
        assert_eq!(
            *body.value_any().unwrap().downcast_ref::<i32>().unwrap(),
            4
        );
    }

    #[test]
    fn no_pending_write_reports_unchanged() {
        let table = NodeTable::new();
        let mut body = StateVarBody::new(3);
        assert_eq!(update(&mut body, &table), UpdateOutcome::Unchanged);
    }
}

/// A state derived by applying a pure function to one parent state's
/// current value every time it changes (§6, `State::map`).
pub(crate) struct StateMapBody<T, U, F> {
    parent: NodeId,
    f: F,
    value: U,
    _marker: std::marker::PhantomData<T>,
}

impl<T, U, F> StateMapBody<T, U, F>
where
    T: Send + 'static,
    U: Clone + PartialEq + Send + 'static,
    F: Fn(&T) -> U + Send + 'static,
{
    pub(crate) fn new(parent: NodeId, f: F, initial: U) -> Self {
        StateMapBody {
            parent,
            f,
            value: initial,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T, U, F> NodeBody for StateMapBody<T, U, F>
where
    T: Send + 'static,
    U: Clone + PartialEq + Send + 'static,
    F: Fn(&T) -> U + Send + 'static,
{
    fn update(&mut self, ctx: &UpdateContext<'_>) -> UpdateOutcome {
        let next = ctx.table.with_value::<T, U>(self.parent, |v| (self.f)(v));
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

/// A state derived by combining two parent states' current values every
/// time either changes (§6, `state_with`/merge).
pub(crate) struct StateMergeBody<A, B, R, F> {
    parent_a: NodeId,
    parent_b: NodeId,
    f: F,
    value: R,
    _marker: std::marker::PhantomData<(A, B)>,
}

impl<A, B, R, F> StateMergeBody<A, B, R, F>
where
    A: Send + 'static,
    B: Send + 'static,
    R: Clone + PartialEq + Send + 'static,
    F: Fn(&A, &B) -> R + Send + 'static,
{
    pub(crate) fn new(parent_a: NodeId, parent_b: NodeId, f: F, initial: R) -> Self {
        StateMergeBody {
            parent_a,
            parent_b,
            f,
            value: initial,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<A, B, R, F> NodeBody for StateMergeBody<A, B, R, F>
where
    A: Send + 'static,
    B: Send + 'static,
    R: Clone + PartialEq + Send + 'static,
    F: Fn(&A, &B) -> R + Send + 'static,
{
    fn update(&mut self, ctx: &UpdateContext<'_>) -> UpdateOutcome {
        let next = ctx.table.with_value::<A, R>(self.parent_a, |a| {
            ctx.table
                .with_value::<B, R>(self.parent_b, |b| (self.f)(a, b))
        });
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

/// A state that folds an event stream into an accumulated value (§6,
/// `hold`/`iterate`). `hold` is the special case where `f` discards the
/// prior value and just keeps the latest event.
pub(crate) struct FoldBody<E, T, F> {
    parent: NodeId,
    f: F,
    value: T,
    _marker: std::marker::PhantomData<E>,
}

impl<E, T, F> FoldBody<E, T, F>
where
    E: Send + 'static,
    T: Clone + PartialEq + Send + 'static,
    F: Fn(&E, &T) -> T + Send + 'static,
{
    pub(crate) fn new(parent: NodeId, f: F, initial: T) -> Self {
        FoldBody {
            parent,
            f,
            value: initial,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<E, T, F> NodeBody for FoldBody<E, T, F>
where
    E: Send + 'static,
    T: Clone + PartialEq + Send + 'static,
    F: Fn(&E, &T) -> T + Send + 'static,
{
    fn update(&mut self, ctx: &UpdateContext<'_>) -> UpdateOutcome {
        let next = ctx.table.with_events::<E, Option<T>>(self.parent, |events| {
            if events.is_empty() {
                None
            } else {
                let mut value = self.value.clone();
                for event in events {
                    value = (self.f)(event, &value);
                }
                Some(value)
            }
        });
        match next {
            Some(value) if value != self.value => {
                self.value = value;
                UpdateOutcome::Changed
            }
            _ => UpdateOutcome::Unchanged,
        }
    }

    fn value_any(&self) -> Option<&dyn Any> {
        Some(&self.value)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// An event produced by sampling a state's current value once per
/// occurrence of a trigger event, unconditionally — two trigger
/// occurrences in one cycle sample twice regardless of whether the
/// sampled value repeats (§6, `Event::pulse`).
pub(crate) struct PulseBody<T, E> {
    trigger: NodeId,
    source: NodeId,
    buffer: smallvec::SmallVec<[T; 4]>,
    _marker: std::marker::PhantomData<E>,
}

impl<T, E> PulseBody<T, E>
where
    T: Clone + Send + 'static,
    E: Send + 'static,
{
    pub(crate) fn new(trigger: NodeId, source: NodeId) -> Self {
        PulseBody {
            trigger,
            source,
            buffer: smallvec::SmallVec::new(),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T, E> NodeBody for PulseBody<T, E>
where
    T: Clone + Send + 'static,
    E: Send + 'static,
{
    fn update(&mut self, ctx: &UpdateContext<'_>) -> UpdateOutcome {
        let count = ctx
            .table
            .with_events::<E, usize>(self.trigger, |events| events.len());
        if count == 0 {
            return UpdateOutcome::Unchanged;
        }
        let value = ctx.table.with_value::<T, T>(self.source, |v| v.clone());
        self.buffer.extend(std::iter::repeat(value).take(count));
        UpdateOutcome::Changed
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

/// A state that samples another state's current value whenever a trigger
/// event fires, changing only when the sampled value differs from the one
/// it already holds (§6, `State::snapshot`). Unlike [`PulseBody`], this is
/// value-typed and equality-gated like any other state node; it never
/// needs `E: PartialEq` since it only counts trigger occurrences.
pub(crate) struct StateSnapshotBody<T, E> {
    trigger: NodeId,
    source: NodeId,
    value: T,
    _marker: std::marker::PhantomData<E>,
}

impl<T, E> StateSnapshotBody<T, E>
where
    T: Clone + PartialEq + Send + 'static,
    E: Send + 'static,
{
    pub(crate) fn new(trigger: NodeId, source: NodeId, initial: T) -> Self {
        StateSnapshotBody {
            trigger,
            source,
            value: initial,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T, E> NodeBody for StateSnapshotBody<T, E>
where
    T: Clone + PartialEq + Send + 'static,
    E: Send + 'static,
{
    fn update(&mut self, ctx: &UpdateContext<'_>) -> UpdateOutcome {
        let count = ctx
            .table
            .with_events::<E, usize>(self.trigger, |events| events.len());
        if count == 0 {
            return UpdateOutcome::Unchanged;
        }
        let sampled = ctx.table.with_value::<T, T>(self.source, |v| v.clone());
        if sampled != self.value {
            self.value = sampled;
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

#[cfg(test)]
mod snapshot_and_pulse_tests {
    use super::*;
    use crate::node::NodeCategory;
    use crate::nodes::event::EventSourceBody;
    use crate::table::NodeTable;

    fn update(table: &NodeTable, id: NodeId) -> UpdateOutcome {
        let mut body = table.take_body(id);
        let outcome = body.update(&UpdateContext { table });
        table.put_body(id, body);
        outcome
    }

    fn fire_trigger(table: &NodeTable, trigger: NodeId) {
        table.with_body_mut(trigger, |body| {
            body.downcast_mut::<EventSourceBody<()>>()
                .unwrap()
                .emit(());
        });
        update(table, trigger);
    }

    /// §6 `State::snapshot`: two occurrences of the trigger that both
    /// sample the same source value must only report `Changed` once, on
    /// the occurrence that actually moves the value away from what the
    /// snapshot already holds.
    #[test]
    fn snapshot_stays_unchanged_when_sampled_value_repeats() {
        let table = NodeTable::new();
        let trigger = table.register(NodeCategory::Normal, Box::new(EventSourceBody::<()>::new()));
        let source = table.register(NodeCategory::Input, Box::new(StateVarBody::new(7i32)));
        let snapshot = table.register(
            NodeCategory::Normal,
            Box::new(StateSnapshotBody::<i32, ()>::new(trigger, source, 7)),
        );

        fire_trigger(&table, trigger);
        assert_eq!(update(&table, snapshot), UpdateOutcome::Unchanged);

        table.with_body_mut(source, |body| {
            body.downcast_mut::<StateVarBody<i32>>().unwrap().set(10);
        });
        update(&table, source);
        fire_trigger(&table, trigger);
        assert_eq!(update(&table, snapshot), UpdateOutcome::Changed);
        table.with_value::<i32, ()>(snapshot, |v| assert_eq!(*v, 10));
    }

    /// §6 `Event::pulse`: firing the trigger twice in one cycle samples
    /// the source twice, even though the source never changed between the
    /// two occurrences — the opposite of `snapshot`'s equality gate.
    #[test]
    fn pulse_samples_once_per_trigger_occurrence() {
        let table = NodeTable::new();
        let trigger = table.register(NodeCategory::Normal, Box::new(EventSourceBody::<()>::new()));
        let source = table.register(NodeCategory::Input, Box::new(StateVarBody::new(5i32)));
        let pulse = table.register(
            NodeCategory::Normal,
            Box::new(PulseBody::<i32, ()>::new(trigger, source)),
        );

        table.with_body_mut(trigger, |body| {
            let body = body.downcast_mut::<EventSourceBody<()>>().unwrap();
            body.emit(());
            body.emit(());
        });
        update(&table, trigger);

        assert_eq!(update(&table, pulse), UpdateOutcome::Changed);
        table.with_events::<i32, ()>(pulse, |events| assert_eq!(events, &[5, 5]));
    }

    #[test]
    fn pulse_reports_unchanged_when_trigger_does_not_fire() {
        let table = NodeTable::new();
        let trigger = table.register(NodeCategory::Normal, Box::new(EventSourceBody::<()>::new()));
        let source = table.register(NodeCategory::Input, Box::new(StateVarBody::new(1i32)));
        let pulse = table.register(
            NodeCategory::Normal,
            Box::new(PulseBody::<i32, ()>::new(trigger, source)),
        );
        assert_eq!(update(&table, pulse), UpdateOutcome::Unchanged);
    }
}
