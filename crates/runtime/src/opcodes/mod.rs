//! Opcode handlers.
//!
//! Every handler has the uniform signature
//! `fn(&mut Interpreter, NodeId, bool) -> Eval`; the dense dispatch table
//! in [`crate::dispatch`] maps each opcode kind to one of them. Handlers
//! inspect operands as ordered children, decide what to evaluate, and
//! release ownership of unused intermediates through the pool's
//! free-if-possible helper.

pub(crate) mod assoc_ops;
pub(crate) mod control;
pub(crate) mod data;
pub(crate) mod entity_ops;
pub(crate) mod list_ops;
pub(crate) mod logic;
pub(crate) mod math;
pub(crate) mod sim;
pub(crate) mod stack_ops;
pub(crate) mod stubs;

use sylva_tree::tree_ops::immediate_to_string;
use sylva_tree::{NodeId, NodeRef, Opcode, Payload};

use crate::interpreter::Interpreter;
use crate::value::{Eval, Immediate, ValueRef};

/// Ordered operands of a node.
pub(crate) fn operands(it: &Interpreter, node: NodeId) -> Vec<NodeId> {
    it.pool().children(node)
}

pub(crate) fn number_result(it: &mut Interpreter, value: f64, immediate: bool) -> Eval {
    if immediate {
        Eval::Value(ValueRef::Imm(Immediate::Number(value)))
    } else {
        Eval::Value(ValueRef::node(it.pool_mut().alloc_number(value), true))
    }
}

pub(crate) fn bool_result(it: &mut Interpreter, value: bool, immediate: bool) -> Eval {
    if immediate {
        Eval::Value(ValueRef::Imm(Immediate::Bool(value)))
    } else {
        Eval::Value(ValueRef::node(it.pool_mut().alloc_bool(value), true))
    }
}

pub(crate) fn string_result(it: &mut Interpreter, text: &str, immediate: bool) -> Eval {
    if immediate {
        let sid = it.strings().intern(text);
        Eval::Value(ValueRef::Imm(Immediate::Str(sid)))
    } else {
        Eval::Value(ValueRef::node(it.pool_mut().alloc_string(text), true))
    }
}

/// A path element for structural traversal: a list index or an assoc key.
pub(crate) enum PathStep {
    Index(usize),
    Key(String),
}

pub(crate) fn path_steps(it: &Interpreter, path: NodeId) -> Vec<PathStep> {
    let elements = match it.pool().opcode(path) {
        Opcode::List => it.pool().children(path),
        _ => vec![path],
    };
    let mut steps = Vec::with_capacity(elements.len());
    for element in elements {
        match it.pool().opcode(element) {
            Opcode::Number => {
                let v = it.pool().number_value(element);
                if v >= 0.0 && v.is_finite() {
                    steps.push(PathStep::Index(v as usize));
                }
            }
            _ => {
                if let Some(key) = immediate_to_string(it.pool(), element) {
                    steps.push(PathStep::Key(key));
                }
            }
        }
    }
    steps
}

/// Walk `steps` down from `start` read-only.
pub(crate) fn traverse_path(it: &Interpreter, start: NodeId, steps: &[PathStep]) -> Option<NodeId> {
    let mut cur = start;
    for step in steps {
        cur = match step {
            PathStep::Index(index) => {
                let children = it.pool().children(cur);
                *children.get(*index)?
            }
            PathStep::Key(key) => {
                let sid = it.strings().id_if_present(key);
                if !sid.is_string() {
                    return None;
                }
                it.pool().assoc_get(cur, sid)?
            }
        };
    }
    Some(cur)
}

/// Place `value` at the position named by `steps` under `root`, creating
/// assoc entries as needed. Returns false when the path cannot be reached.
pub(crate) fn place_at_path(
    it: &mut Interpreter,
    root: NodeId,
    steps: &[PathStep],
    value: NodeId,
) -> bool {
    if steps.is_empty() {
        return false;
    }
    let parent = match steps.len() {
        1 => root,
        _ => match traverse_path(it, root, &steps[..steps.len() - 1]) {
            Some(parent) => parent,
            None => return false,
        },
    };
    match &steps[steps.len() - 1] {
        PathStep::Index(index) => {
            if *index < it.pool().child_count(parent) {
                it.pool_mut().set_child_at(parent, *index, value);
                true
            } else if it.pool().opcode(parent) != Opcode::Assoc {
                it.pool_mut().append_child(parent, value);
                true
            } else {
                false
            }
        }
        PathStep::Key(key) => {
            if it.pool().opcode(parent) == Opcode::Assoc {
                let key = key.clone();
                it.pool_mut().assoc_insert(parent, &key, value);
                true
            } else {
                false
            }
        }
    }
}

/// Copy `source`'s kind and payload onto `dest` (same pool), keeping
/// `dest`'s labels and comments. Used by label-targeted assignment.
pub(crate) fn overwrite_node_value_in(
    pool: &mut sylva_tree::NodePool,
    dest: NodeId,
    source: NodeId,
) {
    let (opcode, payload) = {
        let node = pool.node(source);
        (node.opcode, node.payload.clone())
    };
    // acquire string references carried by the copied payload
    match &payload {
        Payload::Str(sid) => {
            pool.strings().acquire(*sid);
        }
        Payload::Assoc(map) => {
            for key in map.keys() {
                pool.strings().acquire(*key);
            }
        }
        _ => {}
    }
    pool.set_opcode(dest, opcode);
    // release what set_opcode installed, then adopt the real payload
    let strings = pool.strings().clone();
    let old = std::mem::replace(&mut pool.node_mut(dest).payload, payload);
    match old {
        Payload::Str(sid) => strings.release(sid),
        Payload::Assoc(map) => {
            for key in map.keys() {
                strings.release(*key);
            }
        }
        _ => {}
    }
    pool.set_cycle_check(dest, true);
}

/// Accumulate `addition` onto `dest` in place (same pool): numbers add,
/// strings concatenate, ordered kinds append, assocs merge; anything else
/// adopts the addition's value.
pub(crate) fn accum_in_pool(pool: &mut sylva_tree::NodePool, dest: NodeId, addition: NodeId) {
    match pool.opcode(dest) {
        Opcode::Number => {
            let sum = pool.number_value(dest)
                + sylva_tree::tree_ops::node_to_number(pool, Some(addition));
            pool.set_number_value(dest, sum);
        }
        Opcode::Str => {
            let mut text = pool.string_value(dest).unwrap_or_default();
            if let Some(more) = immediate_to_string(pool, addition) {
                text.push_str(&more);
            }
            let sid = pool.strings().intern(&text);
            pool.set_string_payload(dest, sid);
        }
        Opcode::Assoc => {
            if pool.opcode(addition) == Opcode::Assoc {
                for (key, value) in pool.assoc(addition) {
                    let key = pool.strings().acquire(key);
                    pool.assoc_insert_handoff(dest, key, value);
                }
            }
        }
        Opcode::Null => overwrite_node_value_in(pool, dest, addition),
        _ => {
            if pool.opcode(addition) == Opcode::List {
                for child in pool.children(addition) {
                    pool.append_child(dest, child);
                }
            } else {
                pool.append_child(dest, addition);
            }
        }
    }
    pool.set_cycle_check(dest, true);
}

/// Combine `base` and `addition` under accumulation rules: numbers add,
/// strings concatenate, lists append, assocs merge; null adopts the
/// addition. Returns a fresh unique node.
pub(crate) fn accum_values(
    it: &mut Interpreter,
    base: Option<NodeId>,
    addition: NodeRef,
) -> NodeRef {
    let Some(base) = base else { return addition };
    match it.pool().opcode(base) {
        Opcode::Null => addition,
        Opcode::Number => {
            let sum = it.pool().number_value(base)
                + addition
                    .id
                    .map(|a| sylva_tree::tree_ops::node_to_number(it.pool(), Some(a)))
                    .unwrap_or(f64::NAN);
            it.pool_mut().free_tree_if_possible(addition);
            NodeRef::new(it.pool_mut().alloc_number(sum), true)
        }
        Opcode::Str => {
            let mut text = it.pool().string_value(base).unwrap_or_default();
            if let Some(a) = addition.id {
                text.push_str(&it.node_display_string(a));
            }
            it.pool_mut().free_tree_if_possible(addition);
            NodeRef::new(it.pool_mut().alloc_string(&text), true)
        }
        Opcode::Assoc => {
            let merged = it.pool_mut().deep_copy(base);
            if let Some(a) = addition.id {
                if it.pool().opcode(a) == Opcode::Assoc {
                    for (key, value) in it.pool().assoc(a) {
                        let key_text = it.strings().resolve_or_empty(key);
                        it.pool_mut().assoc_insert(merged, &key_text, value);
                    }
                }
            }
            NodeRef::new(merged, true)
        }
        _ => {
            // ordered kinds append the addition as a new element
            let merged = it.pool_mut().deep_copy(base);
            match addition.id {
                Some(a) if it.pool().opcode(a) == Opcode::List => {
                    for child in it.pool().children(a) {
                        it.pool_mut().append_child(merged, child);
                    }
                }
                Some(a) => it.pool_mut().append_child(merged, a),
                None => {
                    let null = it.pool_mut().alloc_null();
                    it.pool_mut().append_child(merged, null);
                }
            }
            NodeRef::new(merged, true)
        }
    }
}
