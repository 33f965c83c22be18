//! Data constructors, node-metadata accessors, type introspection,
//! string operations, and printing.

use sylva_foundation::NOT_A_STRING_ID;
use sylva_tree::tree_ops::{format_number, immediate_to_string};
use sylva_tree::{NodeId, Opcode, Payload};

use crate::entity::all_labeled_nodes;
use crate::interpreter::Interpreter;
use crate::opcodes::{bool_result, number_result, operands, string_result};
use crate::value::{Eval, Immediate, ValueRef};

pub(crate) fn op_true(it: &mut Interpreter, _node: NodeId, immediate: bool) -> Eval {
    bool_result(it, true, immediate)
}

pub(crate) fn op_false(it: &mut Interpreter, _node: NodeId, immediate: bool) -> Eval {
    bool_result(it, false, immediate)
}

pub(crate) fn op_null(_it: &mut Interpreter, _node: NodeId, _immediate: bool) -> Eval {
    Eval::null()
}

pub(crate) fn op_list(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    let list = it.pool_mut().alloc(Opcode::List);
    it.pin(list);
    for op in ops {
        let r = it.interpret_node_ref(Some(op));
        let id = match r.id {
            Some(id) => id,
            None => it.pool_mut().alloc_null(),
        };
        it.pool_mut().append_child(list, id);
    }
    it.unpin(1);
    Eval::Value(ValueRef::node(list, true))
}

pub(crate) fn op_assoc(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let map = it.pool().assoc(node);
    let out = it.pool_mut().alloc(Opcode::Assoc);
    it.pin(out);
    for (key, value_op) in map {
        let r = it.interpret_node_ref(Some(value_op));
        let id = match r.id {
            Some(id) => id,
            None => it.pool_mut().alloc_null(),
        };
        let key = it.strings().acquire(key);
        it.pool_mut().assoc_insert_handoff(out, key, id);
    }
    it.unpin(1);
    Eval::Value(ValueRef::node(out, true))
}

pub(crate) fn op_number(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    if immediate {
        let v = it.pool().number_value(node);
        return Eval::Value(ValueRef::Imm(Immediate::Number(v)));
    }
    Eval::Value(ValueRef::node(node, false))
}

pub(crate) fn op_string(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    if immediate {
        let sid = it.pool().string_id(node);
        return Eval::Value(ValueRef::Imm(Immediate::Str(it.strings().acquire(sid))));
    }
    Eval::Value(ValueRef::node(node, false))
}

pub(crate) fn op_symbol(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let sid = it.pool().string_id(node);
    if !sid.is_string() {
        return Eval::null();
    }
    match it.symbol_value(sid) {
        Some(bound) => Eval::Value(ValueRef::node(bound, false)),
        None => Eval::null(),
    }
}

pub(crate) fn op_get_type(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    let target = it.interpret_node_ref(ops.first().copied());
    let kind = match target.id {
        Some(id) => it.pool().opcode(id),
        None => Opcode::Null,
    };
    it.pool_mut().free_tree_if_possible(target);
    Eval::Value(ValueRef::node(it.pool_mut().alloc(kind), true))
}

pub(crate) fn op_get_type_string(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let target = it.interpret_node_ref(ops.first().copied());
    let name = match target.id {
        Some(id) => it.pool().opcode(id).name(),
        None => Opcode::Null.name(),
    };
    it.pool_mut().free_tree_if_possible(target);
    string_result(it, name, immediate)
}

pub(crate) fn op_set_type(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    let target = it.interpret_node_ref(ops.first().copied());
    let Some(id) = target.id else {
        return Eval::null();
    };
    it.pin(id);
    let name = it.interpret_into_string(ops.get(1).copied());
    it.unpin(1);
    let Some(name) = name else {
        return Eval::Value(ValueRef::Node(target));
    };
    let Some(kind) = Opcode::from_name(&name) else {
        return Eval::Value(ValueRef::Node(target));
    };
    let out = if target.unique {
        id
    } else {
        it.pool_mut().alloc_copy(id)
    };
    it.pool_mut().set_opcode(out, kind);
    Eval::Value(ValueRef::node(out, target.unique))
}

pub(crate) fn op_format(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let to = it
        .interpret_into_string(ops.get(2).copied())
        .unwrap_or_else(|| "string".to_string());
    match to.as_str() {
        "string" => match it.interpret_into_string(ops.first().copied()) {
            Some(text) => string_result(it, &text, immediate),
            None => Eval::null(),
        },
        "number" => {
            let v = it.interpret_into_number(ops.first().copied());
            number_result(it, v, immediate)
        }
        "code" => {
            let Some(source) = it.interpret_into_string(ops.first().copied()) else {
                return Eval::null();
            };
            match sylva_lang::parse(&source, it.pool_mut()) {
                Ok(root) => Eval::Value(ValueRef::Node(root)),
                Err(_) => Eval::null(),
            }
        }
        _ => Eval::null(),
    }
}

pub(crate) fn op_get_labels(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    let target = it.interpret_node_ref(ops.first().copied());
    let Some(id) = target.id else {
        return Eval::null();
    };
    let labels = it.pool().node(id).labels.clone();
    let list = it.pool_mut().alloc(Opcode::List);
    for label in labels {
        let text = it.strings().resolve_or_empty(label);
        let label_node = it.pool_mut().alloc_string(&text);
        it.pool_mut().append_child(list, label_node);
    }
    it.pool_mut().free_tree_if_possible(target);
    Eval::Value(ValueRef::node(list, true))
}

pub(crate) fn op_get_all_labels(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    let target = it.interpret_node_ref(ops.first().copied());
    let Some(id) = target.id else {
        return Eval::null();
    };
    let labeled = all_labeled_nodes(it.pool(), id);
    let assoc = it.pool_mut().alloc(Opcode::Assoc);
    for (label, labeled_node) in labeled {
        let text = it.strings().resolve_or_empty(label);
        it.pool_mut().assoc_insert(assoc, &text, labeled_node);
    }
    it.pool_mut().set_cycle_check(assoc, true);
    Eval::Value(ValueRef::node(assoc, false))
}

pub(crate) fn op_set_labels(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    let target = it.interpret_node_ref(ops.first().copied());
    let Some(id) = target.id else {
        return Eval::null();
    };
    it.pin(id);
    let labels = it.interpret_node_ref(ops.get(1).copied());
    it.unpin(1);

    let out = if target.unique {
        id
    } else {
        it.pool_mut().alloc_copy(id)
    };
    // replace the label set wholesale
    let old_labels = std::mem::take(&mut it.pool_mut().node_mut(out).labels);
    for label in old_labels {
        it.strings().release(label);
    }
    let label_nodes = match labels.id {
        Some(lid) if it.pool().opcode(lid) == Opcode::List => it.pool().children(lid),
        Some(lid) => vec![lid],
        None => Vec::new(),
    };
    for label_node in label_nodes {
        if let Some(text) = immediate_to_string(it.pool(), label_node) {
            let sid = it.strings().intern(&text);
            it.pool_mut().node_mut(out).labels.push(sid);
        }
    }
    it.pool_mut().set_idempotent(out, false);
    it.pool_mut().free_tree_if_possible(labels);
    it.note_side_effect();
    Eval::Value(ValueRef::node(out, target.unique))
}

pub(crate) fn op_zip_labels(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    let labels = it.interpret_node_ref(ops.first().copied());
    if let Some(labels_id) = labels.id {
        it.pin(labels_id);
    }
    let values = it.interpret_node_ref(ops.get(1).copied());
    if labels.id.is_some() {
        it.unpin(1);
    }

    let label_nodes = match labels.id {
        Some(id) if it.pool().opcode(id) == Opcode::List => it.pool().children(id),
        Some(id) => vec![id],
        None => Vec::new(),
    };
    let value_nodes = match values.id {
        Some(id) if it.pool().opcode(id) == Opcode::List => it.pool().children(id),
        Some(id) => vec![id],
        None => Vec::new(),
    };

    let list = it.pool_mut().alloc(Opcode::List);
    for (index, label_node) in label_nodes.into_iter().enumerate() {
        let value = match value_nodes.get(index) {
            Some(&v) => it.pool_mut().alloc_copy(v),
            None => it.pool_mut().alloc_null(),
        };
        if let Some(text) = immediate_to_string(it.pool(), label_node) {
            let sid = it.strings().intern(&text);
            it.pool_mut().node_mut(value).labels.push(sid);
            it.pool_mut().set_idempotent(value, false);
        }
        it.pool_mut().append_child(list, value);
    }
    it.pool_mut().free_tree_if_possible(labels);
    Eval::Value(ValueRef::node(list, true))
}

pub(crate) fn op_get_comments(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let target = it.interpret_node_ref(ops.first().copied());
    let Some(id) = target.id else {
        return Eval::null();
    };
    let text = it
        .strings()
        .resolve(it.pool().node(id).comments)
        .unwrap_or_default();
    it.pool_mut().free_tree_if_possible(target);
    string_result(it, &text, immediate)
}

pub(crate) fn op_set_comments(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    let target = it.interpret_node_ref(ops.first().copied());
    let Some(id) = target.id else {
        return Eval::null();
    };
    it.pin(id);
    let comments = it.interpret_into_string(ops.get(1).copied());
    it.unpin(1);

    let out = if target.unique {
        id
    } else {
        it.pool_mut().alloc_copy(id)
    };
    let old = it.pool().node(out).comments;
    it.strings().release(old);
    it.pool_mut().node_mut(out).comments = match comments {
        Some(text) => it.strings().intern(&text),
        None => NOT_A_STRING_ID,
    };
    Eval::Value(ValueRef::node(out, target.unique))
}

pub(crate) fn op_get_concurrency(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let target = it.interpret_node_ref(ops.first().copied());
    let value = target
        .id
        .map(|id| it.pool().node(id).concurrent)
        .unwrap_or(false);
    it.pool_mut().free_tree_if_possible(target);
    bool_result(it, value, immediate)
}

pub(crate) fn op_set_concurrency(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    let target = it.interpret_node_ref(ops.first().copied());
    let Some(id) = target.id else {
        return Eval::null();
    };
    it.pin(id);
    let value = it.interpret_into_bool(ops.get(1).copied(), false);
    it.unpin(1);
    let out = if target.unique {
        id
    } else {
        it.pool_mut().alloc_copy(id)
    };
    it.pool_mut().set_concurrent(out, value);
    Eval::Value(ValueRef::node(out, target.unique))
}

pub(crate) fn op_get_value(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    let target = it.interpret_node_ref(ops.first().copied());
    let Some(id) = target.id else {
        return Eval::null();
    };
    let out = it.pool_mut().alloc_copy(id);
    it.pool_mut().clear_metadata(out);
    Eval::Value(ValueRef::node(out, true))
}

pub(crate) fn op_set_value(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    let target = it.interpret_node_ref(ops.first().copied());
    let Some(id) = target.id else {
        return Eval::null();
    };
    it.pin(id);
    let value = it.interpret_node_ref(ops.get(1).copied());
    it.unpin(1);
    let out = if target.unique {
        id
    } else {
        it.pool_mut().alloc_copy(id)
    };
    if let Some(value_id) = value.id {
        // the adopted payload aliases the value's children; the husk is
        // left to the collector
        crate::opcodes::overwrite_node_value_in(it.pool_mut(), out, value_id);
    }
    it.note_side_effect();
    Eval::Value(ValueRef::node(out, target.unique))
}

pub(crate) fn op_explode(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    let Some(text) = it.interpret_into_string(ops.first().copied()) else {
        return Eval::null();
    };
    let list = it.pool_mut().alloc(Opcode::List);
    for c in text.chars() {
        let s = it.pool_mut().alloc_string(&c.to_string());
        it.pool_mut().append_child(list, s);
    }
    Eval::Value(ValueRef::node(list, true))
}

pub(crate) fn op_split(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    let Some(text) = it.interpret_into_string(ops.first().copied()) else {
        return Eval::null();
    };
    let separator = it
        .interpret_into_string(ops.get(1).copied())
        .unwrap_or_else(|| " ".to_string());
    let max = it.interpret_into_number(ops.get(2).copied());

    let pieces: Vec<&str> = if max.is_finite() && max >= 1.0 {
        text.splitn(max as usize, separator.as_str()).collect()
    } else {
        text.split(separator.as_str()).collect()
    };
    let list = it.pool_mut().alloc(Opcode::List);
    for piece in pieces {
        let piece = piece.to_string();
        let s = it.pool_mut().alloc_string(&piece);
        it.pool_mut().append_child(list, s);
    }
    Eval::Value(ValueRef::node(list, true))
}

pub(crate) fn op_substr(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let Some(text) = it.interpret_into_string(ops.first().copied()) else {
        return Eval::null();
    };
    let chars: Vec<char> = text.chars().collect();
    let start = it.interpret_into_number(ops.get(1).copied());
    let start = if start.is_finite() && start >= 0.0 {
        (start as usize).min(chars.len())
    } else {
        0
    };
    let length = it.interpret_into_number(ops.get(2).copied());
    let end = if length.is_finite() && length >= 0.0 {
        (start + length as usize).min(chars.len())
    } else {
        chars.len()
    };
    let piece: String = chars[start..end].iter().collect();
    string_result(it, &piece, immediate)
}

pub(crate) fn op_concat(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let mut text = String::new();
    for op in ops {
        if let Some(piece) = it.interpret_into_string(Some(op)) {
            text.push_str(&piece);
        }
    }
    string_result(it, &text, immediate)
}

pub(crate) fn op_print(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    let mut output = String::new();
    for op in ops {
        let r = it.interpret_node_ref(Some(op));
        match r.id {
            Some(id) if it.pool().opcode(id) == Opcode::Str => {
                output.push_str(&it.pool().string_value(id).unwrap_or_default());
            }
            Some(id) => match &it.pool().node(id).payload {
                Payload::Number(v) => output.push_str(&format_number(*v)),
                _ => output.push_str(&it.node_display_string(id)),
            },
            None => output.push_str("null"),
        }
        it.pool_mut().free_tree_if_possible(r);
    }
    match it.machine_mut() {
        Some(machine) => machine.print(&output),
        None => tracing::info!(target: "sylva::print", "{output}"),
    }
    Eval::null()
}

pub(crate) fn op_total_size(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let target = it.interpret_node_ref(ops.first().copied());
    let size = match target.id {
        Some(id) => sylva_tree::tree_ops::total_size(it.pool(), id) as f64,
        None => 0.0,
    };
    it.pool_mut().free_tree_if_possible(target);
    number_result(it, size, immediate)
}
