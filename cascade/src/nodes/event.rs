//! Event node bodies: sources and the stream combinators built on top of
//! them (§3 "Event", §6 combinators).

use std::any::Any;

use smallvec::SmallVec;

use crate::node::{NodeBody, UpdateContext, UpdateOutcome};
use crate::table::NodeId;

/// An externally-writable event stream (§3, `EventSource`).
pub(crate) struct EventSourceBody<E> {
    pending: SmallVec<[E; 4]>,
    buffer: SmallVec<[E; 4]>,
}

impl<E: Send + 'static> EventSourceBody<E> {
    pub(crate) fn new() -> Self {
        EventSourceBody {
            pending: SmallVec::new(),
            buffer: SmallVec::new(),
        }
    }

    pub(crate) fn emit(&mut self, value: E) {
        self.pending.push(value);
    }
}

impl<E: Send + 'static> NodeBody for EventSourceBody<E> {
    fn update(&mut self, _ctx: &UpdateContext<'_>) -> UpdateOutcome {
        if self.pending.is_empty() {
            UpdateOutcome::Unchanged
        } else {
            self.buffer.append(&mut self.pending);
            UpdateOutcome::Changed
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

/// An event stream produced by mapping a pure function over a parent
/// stream's occurrences this cycle (§6, `Event::map`).
pub(crate) struct EventMapBody<E, R, F> {
    parent: NodeId,
    f: F,
    buffer: SmallVec<[R; 4]>,
    _marker: std::marker::PhantomData<E>,
}

impl<E, R, F> EventMapBody<E, R, F>
where
    E: Send + 'static,
    R: Send + 'static,
    F: Fn(&E) -> R + Send + 'static,
{
    pub(crate) fn new(parent: NodeId, f: F) -> Self {
        EventMapBody {
            parent,
            f,
            buffer: SmallVec::new(),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<E, R, F> NodeBody for EventMapBody<E, R, F>
where
    E: Send + 'static,
    R: Send + 'static,
    F: Fn(&E) -> R + Send + 'static,
{
    fn update(&mut self, ctx: &UpdateContext<'_>) -> UpdateOutcome {
        let produced = ctx.table.with_events::<E, SmallVec<[R; 4]>>(self.parent, |events| {
            events.iter().map(|e| (self.f)(e)).collect()
        });
        if produced.is_empty() {
            UpdateOutcome::Unchanged
        } else {
            self.buffer.extend(produced);
            UpdateOutcome::Changed
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

/// An event stream that passes through only the occurrences matching a
/// predicate (§6, `Event::filter`).
pub(crate) struct EventFilterBody<E, F> {
    parent: NodeId,
    predicate: F,
    buffer: SmallVec<[E; 4]>,
}

impl<E, F> EventFilterBody<E, F>
where
    E: Clone + Send + 'static,
    F: Fn(&E) -> bool + Send + 'static,
{
    pub(crate) fn new(parent: NodeId, predicate: F) -> Self {
        EventFilterBody {
            parent,
            predicate,
            buffer: SmallVec::new(),
        }
    }
}

impl<E, F> NodeBody for EventFilterBody<E, F>
where
    E: Clone + Send + 'static,
    F: Fn(&E) -> bool + Send + 'static,
{
    fn update(&mut self, ctx: &UpdateContext<'_>) -> UpdateOutcome {
        let produced = ctx.table.with_events::<E, SmallVec<[E; 4]>>(self.parent, |events| {
            events
                .iter()
                .filter(|e| (self.predicate)(e))
                .cloned()
                .collect()
        });
        if produced.is_empty() {
            UpdateOutcome::Unchanged
        } else {
            self.buffer.extend(produced);
            UpdateOutcome::Changed
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

#[cfg(test)]
mod filter_tests {
    use super::*;
    use crate::node::NodeCategory;
    use crate::table::NodeTable;

    fn update(table: &NodeTable, id: NodeId) -> UpdateOutcome {
        let mut body = table.take_body(id);
        let outcome = body.update(&UpdateContext { table });
        table.put_body(id, body);
        outcome
    }

    #[test]
    fn passes_through_only_matching_occurrences() {
        let table = NodeTable::new();
        let parent = table.register(NodeCategory::Input, Box::new(EventSourceBody::<i32>::new()));
        let evens = table.register(
            NodeCategory::Normal,
            Box::new(EventFilterBody::new(parent, |v: &i32| v % 2 == 0)),
        );

        table.with_body_mut(parent, |body| {
            let body = body.downcast_mut::<EventSourceBody<i32>>().unwrap();
            body.emit(1);
            body.emit(2);
            body.emit(3);
            body.emit(4);
        });
        update(&table, parent);

        assert_eq!(update(&table, evens), UpdateOutcome::Changed);
        table.with_events::<i32, ()>(evens, |events| assert_eq!(events, &[2, 4]));
    }

    #[test]
    fn reports_unchanged_when_nothing_matches() {
        let table = NodeTable::new();
        let parent = table.register(NodeCategory::Input, Box::new(EventSourceBody::<i32>::new()));
        let evens = table.register(
            NodeCategory::Normal,
            Box::new(EventFilterBody::new(parent, |v: &i32| v % 2 == 0)),
        );

        table.with_body_mut(parent, |body| {
            body.downcast_mut::<EventSourceBody<i32>>().unwrap().emit(1);
        });
        update(&table, parent);

        assert_eq!(update(&table, evens), UpdateOutcome::Unchanged);
    }
}

/// An event stream combining occurrences from any number of parent streams
/// within the same cycle, in parent-registration order (§6, `Event::merge`).
pub(crate) struct EventMergeBody<E> {
    parents: Vec<NodeId>,
    buffer: SmallVec<[E; 4]>,
}

impl<E: Clone + Send + 'static> EventMergeBody<E> {
    pub(crate) fn new(parents: Vec<NodeId>) -> Self {
        EventMergeBody {
            parents,
            buffer: SmallVec::new(),
        }
    }
}

impl<E: Clone + Send + 'static> NodeBody for EventMergeBody<E> {
    fn update(&mut self, ctx: &UpdateContext<'_>) -> UpdateOutcome {
        let mut changed = false;
        for &parent in &self.parents {
            let produced = ctx
                .table
                .with_events::<E, SmallVec<[E; 4]>>(parent, |events| events.iter().cloned().collect());
            if !produced.is_empty() {
                changed = true;
                self.buffer.extend(produced);
            }
        }
        if changed {
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

#[cfg(test)]
mod source_map_merge_tests {
    use super::*;
    use crate::node::NodeCategory;
    use crate::table::NodeTable;

    fn update(table: &NodeTable, id: NodeId) -> UpdateOutcome {
        let mut body = table.take_body(id);
        let outcome = body.update(&UpdateContext { table });
        table.put_body(id, body);
        outcome
    }

    #[test]
    fn source_buffers_pending_emits_on_update() {
        let table = NodeTable::new();
        let source = table.register(NodeCategory::Input, Box::new(EventSourceBody::<i32>::new()));

        assert_eq!(update(&table, source), UpdateOutcome::Unchanged);

        table.with_body_mut(source, |body| {
            body.downcast_mut::<EventSourceBody<i32>>().unwrap().emit(1);
        });
        assert_eq!(update(&table, source), UpdateOutcome::Changed);
        table.with_events::<i32, ()>(source, |events| assert_eq!(events, &[1]));
    }

    #[test]
    fn map_applies_function_to_each_occurrence() {
        let table = NodeTable::new();
        let parent = table.register(NodeCategory::Input, Box::new(EventSourceBody::<i32>::new()));
        let doubled = table.register(
            NodeCategory::Normal,
            Box::new(EventMapBody::new(parent, |v: &i32| v * 2)),
        );

        table.with_body_mut(parent, |body| {
            let body = body.downcast_mut::<EventSourceBody<i32>>().unwrap();
            body.emit(1);
            body.emit(2);
        });
        update(&table, parent);

        assert_eq!(update(&table, doubled), UpdateOutcome::Changed);
        table.with_events::<i32, ()>(doubled, |events| assert_eq!(events, &[2, 4]));
    }

    #[test]
    fn merge_preserves_parent_registration_order() {
        let table = NodeTable::new();
        let a = table.register(NodeCategory::Input, Box::new(EventSourceBody::<i32>::new()));
        let b = table.register(NodeCategory::Input, Box::new(EventSourceBody::<i32>::new()));
        let merged = table.register(
            NodeCategory::Normal,
            Box::new(EventMergeBody::<i32>::new(vec![a, b])),
        );

        table.with_body_mut(a, |body| {
            body.downcast_mut::<EventSourceBody<i32>>().unwrap().emit(1);
        });
        table.with_body_mut(b, |body| {
            body.downcast_mut::<EventSourceBody<i32>>().unwrap().emit(2);
        });
        update(&table, a);
        update(&table, b);

        assert_eq!(update(&table, merged), UpdateOutcome::Changed);
        table.with_events::<i32, ()>(merged, |events| assert_eq!(events, &[1, 2]));
    }

    #[test]
    fn merge_reports_unchanged_when_no_parent_fired() {
        let table = NodeTable::new();
        let a = table.register(NodeCategory::Input, Box::new(EventSourceBody::<i32>::new()));
        let b = table.register(NodeCategory::Input, Box::new(EventSourceBody::<i32>::new()));
        let merged = table.register(
            NodeCategory::Normal,
            Box::new(EventMergeBody::<i32>::new(vec![a, b])),
        );
        assert_eq!(update(&table, merged), UpdateOutcome::Unchanged);
    }
}
