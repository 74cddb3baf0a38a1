//! Cascade is a synchronous reactive propagation engine for typed state
//! and event graphs.
//!
//! The code is organized in modules that are meant to depend as little as
//! possible on each other.
//!
//! **Node table**: [table] defines the dense, generational storage of
//! node scheduling metadata and type-erased bodies that everything else
//! in the engine is built on.
//!
//! **Scheduling**: [queue] defines the level-based topological queue the
//! propagation driver uses to process a cycle in dependency order, and
//! [graph] ties the table, the queue, and the transaction/link machinery
//! together into a single graph instance behind the [`Group`] handle.
//!
//! **Surface layer**: [api] is a thin typed skin over the node kinds the
//! engine understands; most embedders only ever import from here.
//!
//! # Examples
//!
//! A minimal reactive sum, propagated synchronously:
//!
//! ```
//! use cascade::{Group, StateVar};
//!
//! let group = Group::new();
//! let a = StateVar::new(&group, 1i32);
//! let b = StateVar::new(&group, 2i32);
//! let sum = a.as_state().state_with(&b.as_state(), |x, y| x + y);
//!
//! assert_eq!(sum.get(), 3);
//! a.set(10);
//! assert_eq!(sum.get(), 12);
//! ```

pub mod api;
pub mod graph;
pub mod link;
pub mod logging;
pub mod node;
mod nodes;
pub mod queue;
pub mod sync_point;
pub mod table;
pub mod transaction;

pub use api::{
    hold, iterate, Event, EventLink, EventSlot, EventSource, Link, Observer, State, StateSlot,
    StateVar,
};
pub use graph::{GraphId, Group, GroupConfig, GroupConfigError};
pub use logging::CascadeEvent;
pub use sync_point::{Dependency, SyncPoint};
pub use transaction::TransactionFlags;
