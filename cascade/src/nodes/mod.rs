//! Concrete node bodies (§3, §4.4). Each type here only ever talks to the
//! rest of the graph through [`crate::node::NodeBody`]; none of them know
//! about the node table's storage layout.

pub mod event;
pub mod link_node;
pub mod observer;
pub mod slot;
pub mod state;
