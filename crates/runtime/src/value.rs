//! Handler result types.
//!
//! Handlers return [`Eval`]: either a plain value or an out-of-band control
//! result (`conclude`/`return`) that enclosing sequence and call handlers
//! unwind. The value itself is a [`ValueRef`] — a node reference, or an
//! unallocated immediate when the caller requested one.

use sylva_foundation::StringId;
use sylva_tree::{NodeId, NodeRef};

/// An immediate value produced without a node allocation.
///
/// `Str` carries one string-pool reference owned by the bearer; converting
/// to a node hands the reference off, any other consumption must release it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Immediate {
    Number(f64),
    Str(StringId),
    Bool(bool),
}

/// A handler result value: a node reference or an immediate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueRef {
    Node(NodeRef),
    Imm(Immediate),
}

impl ValueRef {
    #[inline]
    pub const fn null() -> Self {
        ValueRef::Node(NodeRef::null())
    }

    #[inline]
    pub fn node(id: NodeId, unique: bool) -> Self {
        ValueRef::Node(NodeRef::new(id, unique))
    }

    #[inline]
    pub fn is_null_node(&self) -> bool {
        matches!(self, ValueRef::Node(r) if r.is_null())
    }
}

impl From<NodeRef> for ValueRef {
    fn from(r: NodeRef) -> Self {
        ValueRef::Node(r)
    }
}

/// Handler return: a value, or control flow unwinding toward the nearest
/// enclosing sequence (`Conclude`) or call boundary (`Return`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Eval {
    Value(ValueRef),
    Conclude(ValueRef),
    Return(ValueRef),
}

impl Eval {
    #[inline]
    pub const fn null() -> Self {
        Eval::Value(ValueRef::null())
    }

    /// The payload regardless of control kind; used where control results
    /// are coerced as ordinary operands.
    #[inline]
    pub fn into_value(self) -> ValueRef {
        match self {
            Eval::Value(v) | Eval::Conclude(v) | Eval::Return(v) => v,
        }
    }
}
