//! The typed `Observer` surface (§3, "Observer"): runs a side effect
//! whenever a state changes or an event fires, for as long as the handle
//! (or a clone of it) is alive.

use std::sync::Arc;

use crate::api::event::Event;
use crate::api::handle::{new_handle, NodeHandle};
use crate::api::state::State;
use crate::node::NodeCategory;
use crate::nodes::observer::ObserverBody;

/// A registered side effect. Dropping the last clone unregisters it.
#[derive(Clone)]
pub struct Observer {
    #[allow(dead_code)]
    handle: Arc<NodeHandle>,
}

impl Observer {
    /// Runs `action` with a state's value every time it changes.
    pub fn on_state<T, F>(state: &State<T>, action: F) -> Self
    where
        T: Clone + PartialEq + Send + 'static,
        F: FnMut(&T) + Send + 'static,
    {
        let group = state.group().clone();
        let parent = state.id();
        let id = group.register(
            NodeCategory::Output,
            Box::new(ObserverBody::watching_state(parent, action)),
        );
        group.attach(id, parent);
        Observer {
            handle: new_handle(&group, id),
        }
    }

    /// Runs `action` once per occurrence of an event stream.
    pub fn on_event<E, F>(event: &Event<E>, action: F) -> Self
    where
        E: Clone + Send + 'static,
        F: FnMut(&E) + Send + 'static,
    {
        let group = event.group().clone();
        let parent = event.id();
        let id = group.register(
            NodeCategory::Output,
            Box::new(ObserverBody::watching_events(parent, action)),
        );
        group.attach(id, parent);
        Observer {
            handle: new_handle(&group, id),
        }
    }
}
