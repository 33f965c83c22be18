//! Tagged node model and per-entity node pool.
//!
//! A program is a tree (possibly a graph) of [`node::Node`] records held in
//! a [`pool::NodePool`] arena. Pools belong to entities; ids never cross
//! pools. The pool exposes the allocation, pinning, liberation, and
//! collection surface the interpreter consumes.

pub mod node;
pub mod opcode;
pub mod pool;
pub mod tree_ops;

pub use node::{Node, NodeId, NodeRef, Payload};
pub use opcode::{Opcode, PayloadKind};
pub use pool::NodePool;
