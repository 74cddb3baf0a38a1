//! Observer node bodies (§3 "Observer"): leaf nodes that run a side effect
//! and never carry a value of their own.

use std::any::Any;

use crate::node::{NodeBody, UpdateContext, UpdateOutcome};
use crate::table::NodeId;

enum Source<T> {
    State(NodeId, std::marker::PhantomData<T>),
    Events(NodeId, std::marker::PhantomData<T>),
}

/// Runs `action` with a state's current value every time it changes, or
/// once per occurrence of an event stream.
pub(crate) struct ObserverBody<T, F> {
    source: Source<T>,
    action: F,
}

impl<T, F> ObserverBody<T, F>
where
    T: Clone + Send + 'static,
    F: FnMut(&T) + Send + 'static,
{
    pub(crate) fn watching_state(parent: NodeId, action: F) -> Self {
        ObserverBody {
            source: Source::State(parent, std::marker::PhantomData),
            action,
        }
    }

    pub(crate) fn watching_events(parent: NodeId, action: F) -> Self {
        ObserverBody {
            source: Source::Events(parent, std::marker::PhantomData),
            action,
        }
    }
}

impl<T, F> NodeBody for ObserverBody<T, F>
where
    T: Clone + Send + 'static,
    F: FnMut(&T) + Send + 'static,
{
    fn update(&mut self, ctx: &UpdateContext<'_>) -> UpdateOutcome {
        match self.source {
            Source::State(parent, _) => {
                ctx.table.with_value::<T, ()>(parent, |v| (self.action)(v));
            }
            Source::Events(parent, _) => {
                let occurrences = ctx
                    .table
                    .with_events::<T, Vec<T>>(parent, |events| events.to_vec());
                for occurrence in &occurrences {
                    (self.action)(occurrence);
                }
            }
        }
        UpdateOutcome::Unchanged
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
