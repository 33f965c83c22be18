//! Coercion layer.
//!
//! Handlers frequently need a sub-evaluation result in a specific shape.
//! These helpers encapsulate the release-or-retain logic — the most
//! error-prone pattern in the dispatch core. Each documents what happens
//! to string-pool references:
//!
//! | op | reference discipline |
//! |---|---|
//! | `interpret_into_string` | none transferred; intermediates freed |
//! | `interpret_into_string_id_if_exists` | no reference taken; `NOT_A_STRING_ID` when not interned |
//! | `interpret_into_string_id_with_reference` | caller inherits one reference |
//! | `interpret_into_unique_string_node` | returned node owns its reference |
//! | `interpret_into_number` | n/a; intermediates freed |
//! | `interpret_into_bool` | n/a; intermediates freed |

use sylva_foundation::{StringId, NOT_A_STRING_ID};
use sylva_tree::tree_ops::{format_number, immediate_to_string, node_to_bool, node_to_number};
use sylva_tree::{NodeId, NodeRef, Opcode};

use crate::interpreter::Interpreter;
use crate::value::{Immediate, ValueRef};

impl Interpreter<'_> {
    /// Render a node as display text: immediates directly, code trees
    /// through the unparser.
    pub(crate) fn node_display_string(&self, id: NodeId) -> String {
        match immediate_to_string(self.pool(), id) {
            Some(text) => text,
            None => sylva_lang::unparse(self.pool(), Some(id), false, false),
        }
    }

    /// Evaluate to a string. `None` for null results.
    pub fn interpret_into_string(&mut self, node: Option<NodeId>) -> Option<String> {
        let id = node?;
        // shortcut when the node already has what is being asked
        if self.pool().opcode(id) == Opcode::Str {
            return self.pool().string_value(id);
        }

        match self.interpret_value(node, true) {
            ValueRef::Imm(Immediate::Number(v)) => Some(format_number(v)),
            ValueRef::Imm(Immediate::Bool(b)) => Some(if b { "true" } else { "false" }.to_string()),
            ValueRef::Imm(Immediate::Str(sid)) => {
                let text = self.strings().resolve(sid);
                self.strings().release(sid);
                text
            }
            ValueRef::Node(r) => {
                let Some(rid) = r.id else { return None };
                if self.pool().opcode(rid) == Opcode::Null {
                    self.pool_mut().free_tree_if_possible(r);
                    return None;
                }
                let text = self.node_display_string(rid);
                self.pool_mut().free_tree_if_possible(r);
                Some(text)
            }
        }
    }

    /// Evaluate to a string id without taking a reference; yields
    /// `NOT_A_STRING_ID` when the string was never interned elsewhere.
    pub fn interpret_into_string_id_if_exists(&mut self, node: Option<NodeId>) -> StringId {
        if let Some(id) = node {
            if self.pool().opcode(id) == Opcode::Str {
                return self.pool().string_id(id);
            }
        }
        match self.interpret_into_string(node) {
            Some(text) => self.strings().id_if_present(&text),
            None => NOT_A_STRING_ID,
        }
    }

    /// Evaluate to a string id; the caller inherits one reference on the
    /// intern pool.
    pub fn interpret_into_string_id_with_reference(&mut self, node: Option<NodeId>) -> StringId {
        if let Some(id) = node {
            if self.pool().opcode(id) == Opcode::Str {
                let sid = self.pool().string_id(id);
                return self.strings().acquire(sid);
            }
        }

        match self.interpret_value(node, true) {
            // the immediate already owns one reference; transfer it
            ValueRef::Imm(Immediate::Str(sid)) => sid,
            ValueRef::Imm(Immediate::Number(v)) => self.strings().intern(&format_number(v)),
            ValueRef::Imm(Immediate::Bool(b)) => {
                self.strings().intern(if b { "true" } else { "false" })
            }
            ValueRef::Node(r) => {
                let Some(rid) = r.id else {
                    return NOT_A_STRING_ID;
                };
                if self.pool().opcode(rid) == Opcode::Null {
                    self.pool_mut().free_tree_if_possible(r);
                    return NOT_A_STRING_ID;
                }
                // a unique string result donates its own reference
                if r.unique && self.pool().opcode(rid) == Opcode::Str {
                    let sid = self.pool().string_id(rid);
                    self.strings().acquire(sid);
                    self.pool_mut().free_tree(rid);
                    return sid;
                }
                let text = self.node_display_string(rid);
                let sid = self.strings().intern(&text);
                self.pool_mut().free_tree_if_possible(r);
                sid
            }
        }
    }

    /// Evaluate to a string node guaranteed unique and mutable.
    pub fn interpret_into_unique_string_node(&mut self, node: Option<NodeId>) -> NodeRef {
        // skip evaluation when the value is already known
        if let Some(id) = node {
            let n = self.pool().node(id);
            if n.idempotent || matches!(n.opcode, Opcode::Str | Opcode::Number) {
                let text = self.node_display_string(id);
                return NodeRef::new(self.pool_mut().alloc_string(&text), true);
            }
        } else {
            return NodeRef::new(
                self.pool_mut().alloc_string_handoff(NOT_A_STRING_ID),
                true,
            );
        }

        let r = self.interpret_node_ref(node);
        let Some(rid) = r.id else {
            return NodeRef::new(
                self.pool_mut().alloc_string_handoff(NOT_A_STRING_ID),
                true,
            );
        };
        let text = self.node_display_string(rid);
        self.pool_mut().free_tree_if_possible(r);
        NodeRef::new(self.pool_mut().alloc_string(&text), true)
    }

    /// Evaluate to a number. Null coerces to NaN.
    pub fn interpret_into_number(&mut self, node: Option<NodeId>) -> f64 {
        let Some(id) = node else { return f64::NAN };
        // shortcut when the node already has what is being asked
        if self.pool().opcode(id) == Opcode::Number {
            return self.pool().number_value(id);
        }

        match self.interpret_value(node, true) {
            ValueRef::Imm(Immediate::Number(v)) => v,
            ValueRef::Imm(Immediate::Bool(b)) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            }
            ValueRef::Imm(Immediate::Str(sid)) => {
                let value = self
                    .strings()
                    .resolve(sid)
                    .and_then(|s| s.trim().parse::<f64>().ok())
                    .unwrap_or(f64::NAN);
                self.strings().release(sid);
                value
            }
            ValueRef::Node(r) => {
                let value = node_to_number(self.pool(), r.id);
                self.pool_mut().free_tree_if_possible(r);
                value
            }
        }
    }

    /// Evaluate to a number node guaranteed unique and mutable.
    pub fn interpret_into_unique_number_node(&mut self, node: Option<NodeId>) -> NodeRef {
        if let Some(id) = node {
            if self.pool().node(id).idempotent {
                let value = node_to_number(self.pool(), Some(id));
                return NodeRef::new(self.pool_mut().alloc_number(value), true);
            }
        }
        let value = self.interpret_into_number(node);
        NodeRef::new(self.pool_mut().alloc_number(value), true)
    }

    /// Evaluate to a truth value; `value_if_null` substitutes for null.
    pub fn interpret_into_bool(&mut self, node: Option<NodeId>, value_if_null: bool) -> bool {
        let Some(_) = node else { return value_if_null };

        match self.interpret_value(node, true) {
            ValueRef::Imm(Immediate::Bool(b)) => b,
            ValueRef::Imm(Immediate::Number(v)) => v != 0.0 && !v.is_nan(),
            ValueRef::Imm(Immediate::Str(sid)) => {
                let value = self
                    .strings()
                    .resolve(sid)
                    .map(|s| !s.is_empty())
                    .unwrap_or(false);
                self.strings().release(sid);
                value
            }
            ValueRef::Node(r) => {
                let value = node_to_bool(self.pool(), r.id, value_if_null);
                self.pool_mut().free_tree_if_possible(r);
                value
            }
        }
    }
}
