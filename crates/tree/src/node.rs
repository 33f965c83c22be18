//! Node records and references.

use indexmap::IndexMap;
use sylva_foundation::{StringId, NOT_A_STRING_ID};

use crate::opcode::{Opcode, PayloadKind};

/// Index of a node inside its owning [`crate::pool::NodePool`].
///
/// Ids are only meaningful relative to one pool; no node is ever shared
/// across pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// A node reference plus a uniqueness claim.
///
/// `unique == true` asserts the bearer is the sole live referent of the
/// whole subtree and may mutate or reclaim it. Uniqueness is monotonic:
/// combining references yields a unique result only when every input was
/// unique and none escaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRef {
    pub id: Option<NodeId>,
    pub unique: bool,
}

impl NodeRef {
    /// The null reference.
    #[inline]
    pub const fn null() -> Self {
        Self {
            id: None,
            unique: true,
        }
    }

    #[inline]
    pub const fn new(id: NodeId, unique: bool) -> Self {
        Self {
            id: Some(id),
            unique,
        }
    }

    #[inline]
    pub const fn is_null(&self) -> bool {
        self.id.is_none()
    }

    /// Downgrade to a shared reference (e.g. after the node escaped into a
    /// longer-lived structure).
    #[inline]
    pub fn shared(self) -> Self {
        Self {
            unique: false,
            ..self
        }
    }
}

impl From<Option<NodeId>> for NodeRef {
    fn from(id: Option<NodeId>) -> Self {
        Self { id, unique: false }
    }
}

/// Payload of a node; the variant is dictated by the opcode kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Empty,
    Number(f64),
    Str(StringId),
    List(Vec<NodeId>),
    Assoc(IndexMap<StringId, NodeId>),
}

impl Payload {
    /// Default payload for a kind.
    pub fn default_for(op: Opcode) -> Self {
        match op.payload_kind() {
            PayloadKind::Empty => Payload::Empty,
            PayloadKind::Number => Payload::Number(0.0),
            PayloadKind::Str => Payload::Str(NOT_A_STRING_ID),
            PayloadKind::Ordered => Payload::List(Vec::new()),
            PayloadKind::Mapped => Payload::Assoc(IndexMap::new()),
        }
    }
}

/// An evaluable node.
///
/// Flags: `idempotent` marks subtrees whose evaluation is pure and
/// structurally equal to themselves; `needs_cycle_check` marks subtrees
/// that may contain back-edges and must be walked with a visited set;
/// `concurrent` requests parallel child evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub opcode: Opcode,
    pub payload: Payload,
    pub labels: Vec<StringId>,
    pub comments: StringId,
    pub idempotent: bool,
    pub needs_cycle_check: bool,
    pub concurrent: bool,
}

impl Node {
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            payload: Payload::default_for(opcode),
            labels: Vec::new(),
            comments: NOT_A_STRING_ID,
            idempotent: opcode.is_data_kind(),
            needs_cycle_check: false,
            concurrent: false,
        }
    }

    /// Child ids in order; assoc children iterate in key insertion order.
    pub fn child_ids(&self) -> Vec<NodeId> {
        match &self.payload {
            Payload::List(children) => children.clone(),
            Payload::Assoc(map) => map.values().copied().collect(),
            _ => Vec::new(),
        }
    }

    pub fn child_count(&self) -> usize {
        match &self.payload {
            Payload::List(children) => children.len(),
            Payload::Assoc(map) => map.len(),
            _ => 0,
        }
    }

    pub fn has_labels(&self) -> bool {
        !self.labels.is_empty()
    }

    pub fn has_comments(&self) -> bool {
        self.comments.is_string()
    }
}
