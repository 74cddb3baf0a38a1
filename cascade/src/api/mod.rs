//! The typed surface layer (§6): a thin skin over the node kinds the
//! engine understands, grounded in `cpp.react`'s `state.h`, `event.h`,
//! `observer.h`, `group.h`. This is the only part of the crate most
//! embedders ever import directly.

mod handle;

pub mod event;
pub mod link;
pub mod observer;
pub mod state;

pub use event::{Event, EventSlot, EventSource};
pub use link::{EventLink, Link};
pub use observer::Observer;
pub use state::{hold, iterate, State, StateSlot, StateVar};
