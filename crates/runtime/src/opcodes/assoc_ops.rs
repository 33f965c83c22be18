//! Associative-structure handlers.

use sylva_tree::tree_ops::{immediate_to_string, tree_equal};
use sylva_tree::{NodeId, Opcode};

use crate::interpreter::Interpreter;
use crate::opcodes::{bool_result, operands};
use crate::value::{Eval, ValueRef};

pub(crate) fn op_indices(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    let target = it.interpret_node_ref(ops.first().copied());
    let Some(id) = target.id else {
        return Eval::null();
    };
    let list = it.pool_mut().alloc(Opcode::List);
    match it.pool().opcode(id) {
        Opcode::Assoc => {
            for key in it.pool().assoc(id).keys() {
                let text = it.strings().resolve_or_empty(*key);
                let key_node = it.pool_mut().alloc_string(&text);
                it.pool_mut().append_child(list, key_node);
            }
        }
        Opcode::List => {
            for index in 0..it.pool().child_count(id) {
                let index_node = it.pool_mut().alloc_number(index as f64);
                it.pool_mut().append_child(list, index_node);
            }
        }
        _ => {}
    }
    it.pool_mut().free_tree_if_possible(target);
    Eval::Value(ValueRef::node(list, true))
}

pub(crate) fn op_values(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    let target = it.interpret_node_ref(ops.first().copied());
    let Some(id) = target.id else {
        return Eval::null();
    };
    let list = it.pool_mut().alloc(Opcode::List);
    let children: Vec<NodeId> = match it.pool().opcode(id) {
        Opcode::Assoc => it.pool().assoc(id).values().copied().collect(),
        Opcode::List => it.pool().children(id),
        _ => vec![id],
    };
    it.pool_mut().set_children(list, children);
    Eval::Value(ValueRef::node(list, false))
}

pub(crate) fn op_contains_index(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let target = it.interpret_node_ref(ops.first().copied());
    let Some(id) = target.id else {
        return bool_result(it, false, immediate);
    };
    it.pin(id);
    let contains = match it.pool().opcode(id) {
        Opcode::Assoc => match it.interpret_into_string(ops.get(1).copied()) {
            Some(key) => {
                let sid = it.strings().id_if_present(&key);
                sid.is_string() && it.pool().assoc_get(id, sid).is_some()
            }
            None => false,
        },
        Opcode::List => {
            let index = it.interpret_into_number(ops.get(1).copied());
            index.is_finite() && index >= 0.0 && (index as usize) < it.pool().child_count(id)
        }
        _ => false,
    };
    it.unpin(1);
    it.pool_mut().free_tree_if_possible(target);
    bool_result(it, contains, immediate)
}

pub(crate) fn op_contains_value(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let target = it.interpret_node_ref(ops.first().copied());
    if let Some(target_id) = target.id {
        it.pin(target_id);
    }
    let value = it.interpret_node_ref(ops.get(1).copied());
    if target.id.is_some() {
        it.unpin(1);
    }
    let Some(id) = target.id else {
        return bool_result(it, false, immediate);
    };
    let children: Vec<NodeId> = match it.pool().opcode(id) {
        Opcode::Assoc => it.pool().assoc(id).values().copied().collect(),
        Opcode::List => it.pool().children(id),
        _ => Vec::new(),
    };
    let contains = children
        .iter()
        .any(|&child| tree_equal(it.pool(), Some(child), value.id));
    it.pool_mut().free_tree_if_possible(target);
    it.pool_mut().free_tree_if_possible(value);
    bool_result(it, contains, immediate)
}

/// Collect removal/retention selectors: strings for assoc keys, numbers
/// for list indices.
fn selector_set(it: &mut Interpreter, selector: Option<NodeId>) -> (Vec<String>, Vec<usize>) {
    let r = it.interpret_node_ref(selector);
    let mut keys = Vec::new();
    let mut indices = Vec::new();
    let elements = match r.id {
        Some(id) if it.pool().opcode(id) == Opcode::List => it.pool().children(id),
        Some(id) => vec![id],
        None => Vec::new(),
    };
    for element in elements {
        match it.pool().opcode(element) {
            Opcode::Number => {
                let v = it.pool().number_value(element);
                if v.is_finite() && v >= 0.0 {
                    indices.push(v as usize);
                }
            }
            _ => {
                if let Some(text) = immediate_to_string(it.pool(), element) {
                    keys.push(text);
                }
            }
        }
    }
    it.pool_mut().free_tree_if_possible(r);
    (keys, indices)
}

pub(crate) fn op_remove(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    filter_by_selectors(it, node, true)
}

pub(crate) fn op_keep(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    filter_by_selectors(it, node, false)
}

fn filter_by_selectors(it: &mut Interpreter, node: NodeId, remove: bool) -> Eval {
    let ops = operands(it, node);
    let target = it.interpret_node_ref(ops.first().copied());
    let Some(id) = target.id else {
        return Eval::null();
    };
    it.pin(id);
    let (keys, indices) = selector_set(it, ops.get(1).copied());
    it.unpin(1);

    match it.pool().opcode(id) {
        Opcode::Assoc => {
            let out = it.pool_mut().alloc(Opcode::Assoc);
            for (key, value) in it.pool().assoc(id) {
                let text = it.strings().resolve_or_empty(key);
                let selected = keys.contains(&text);
                if selected != remove {
                    it.pool_mut().assoc_insert(out, &text, value);
                }
            }
            Eval::Value(ValueRef::node(out, false))
        }
        Opcode::List => {
            let out = it.pool_mut().alloc(Opcode::List);
            for (index, child) in it.pool().children(id).into_iter().enumerate() {
                let selected = indices.contains(&index);
                if selected != remove {
                    it.pool_mut().append_child(out, child);
                }
            }
            Eval::Value(ValueRef::node(out, false))
        }
        _ => Eval::Value(ValueRef::Node(target)),
    }
}

pub(crate) fn op_associate(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    let assoc = it.pool_mut().alloc(Opcode::Assoc);
    it.pin(assoc);
    let mut index = 0;
    while index + 1 < ops.len() {
        let key = it
            .interpret_into_string(Some(ops[index]))
            .unwrap_or_default();
        let value = it.interpret_node_ref(Some(ops[index + 1]));
        let value_id = match value.id {
            Some(id) => id,
            None => it.pool_mut().alloc_null(),
        };
        it.pool_mut().assoc_insert(assoc, &key, value_id);
        index += 2;
    }
    it.unpin(1);
    Eval::Value(ValueRef::node(assoc, true))
}

pub(crate) fn op_zip(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    let keys = it.interpret_node_ref(ops.first().copied());
    if let Some(keys_id) = keys.id {
        it.pin(keys_id);
    }
    let values = it.interpret_node_ref(ops.get(1).copied());
    if keys.id.is_some() {
        it.unpin(1);
    }
    let Some(keys_id) = keys.id else {
        return Eval::null();
    };

    let key_nodes = match it.pool().opcode(keys_id) {
        Opcode::List => it.pool().children(keys_id),
        _ => vec![keys_id],
    };
    let value_nodes: Vec<NodeId> = match values.id {
        Some(id) if it.pool().opcode(id) == Opcode::List => it.pool().children(id),
        Some(id) => vec![id],
        None => Vec::new(),
    };

    let assoc = it.pool_mut().alloc(Opcode::Assoc);
    for (index, key_node) in key_nodes.into_iter().enumerate() {
        let Some(key) = immediate_to_string(it.pool(), key_node) else {
            continue;
        };
        let value = match value_nodes.get(index) {
            Some(&v) => v,
            None => it.pool_mut().alloc_null(),
        };
        it.pool_mut().assoc_insert(assoc, &key, value);
    }
    it.pool_mut().free_tree_if_possible(keys);
    Eval::Value(ValueRef::node(assoc, false))
}

pub(crate) fn op_unzip(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    let target = it.interpret_node_ref(ops.first().copied());
    if let Some(target_id) = target.id {
        it.pin(target_id);
    }
    let keys = it.interpret_node_ref(ops.get(1).copied());
    if target.id.is_some() {
        it.unpin(1);
    }
    let Some(target_id) = target.id else {
        return Eval::null();
    };

    let key_nodes = match keys.id {
        Some(id) if it.pool().opcode(id) == Opcode::List => it.pool().children(id),
        Some(id) => vec![id],
        None => Vec::new(),
    };

    let list = it.pool_mut().alloc(Opcode::List);
    for key_node in key_nodes {
        let value = immediate_to_string(it.pool(), key_node)
            .map(|key| it.strings().id_if_present(&key))
            .filter(|sid| sid.is_string())
            .and_then(|sid| it.pool().assoc_get(target_id, sid));
        let value = match value {
            Some(v) => v,
            None => it.pool_mut().alloc_null(),
        };
        it.pool_mut().append_child(list, value);
    }
    it.pool_mut().free_tree_if_possible(keys);
    Eval::Value(ValueRef::node(list, false))
}
