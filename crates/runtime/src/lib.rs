//! Tree-walking interpreter, entities, and the concurrency gateway.
//!
//! The evaluator walks opcode trees against a lexically-scoped call stack,
//! pinning in-flight nodes for the collector, charging a composable
//! resource budget at every step, and optionally fanning multi-child nodes
//! out onto a worker pool. Entities own the node pools being evaluated;
//! the asset system (loading, persistence) plugs in through the
//! [`machine::AssetSystem`] trait.

pub mod coercion;
pub mod concurrency;
pub mod constraints;
pub mod construction;
pub mod dispatch;
pub mod entity;
pub mod interpreter;
pub mod listener;
pub mod machine;
pub mod opcodes;
pub mod rewrite;
pub mod value;

pub use constraints::PerformanceConstraints;
pub use entity::{Entity, EntityId, EntityStore};
pub use interpreter::Interpreter;
pub use listener::{
    PrintListener, RecordingWriteListener, WriteEvent, WriteEventKind, WriteListener,
};
pub use machine::{AssetSystem, LoadEntityParams, LoadStatus, Machine};
pub use value::{Eval, Immediate, ValueRef};
