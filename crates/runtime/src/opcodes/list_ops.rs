//! List manipulation and the iterator-shaped transformation opcodes.

use sylva_tree::tree_ops::node_to_number;
use sylva_tree::{NodeId, NodeRef, Opcode};

use crate::interpreter::Interpreter;
use crate::opcodes::{number_result, operands, string_result};
use crate::value::{Eval, ValueRef};

pub(crate) fn op_first(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let target = it.interpret_node_ref(ops.first().copied());
    let Some(id) = target.id else {
        return Eval::null();
    };
    match it.pool().opcode(id) {
        Opcode::List => match it.pool().children(id).first() {
            Some(&first) => Eval::Value(ValueRef::node(first, false)),
            None => Eval::null(),
        },
        Opcode::Assoc => match it.pool().assoc(id).values().next() {
            Some(&first) => Eval::Value(ValueRef::node(first, false)),
            None => Eval::null(),
        },
        Opcode::Str => {
            let text = it.pool().string_value(id).unwrap_or_default();
            it.pool_mut().free_tree_if_possible(target);
            match text.chars().next() {
                Some(c) => string_result(it, &c.to_string(), immediate),
                None => Eval::null(),
            }
        }
        _ => Eval::Value(ValueRef::Node(target)),
    }
}

pub(crate) fn op_tail(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let target = it.interpret_node_ref(ops.first().copied());
    let Some(id) = target.id else {
        return Eval::null();
    };
    match it.pool().opcode(id) {
        Opcode::List => {
            let children = it.pool().children(id);
            let list = it.pool_mut().alloc(Opcode::List);
            for &child in children.iter().skip(1) {
                it.pool_mut().append_child(list, child);
            }
            Eval::Value(ValueRef::node(list, false))
        }
        Opcode::Assoc => {
            let map = it.pool().assoc(id);
            let assoc = it.pool_mut().alloc(Opcode::Assoc);
            for (key, value) in map.iter().skip(1) {
                let key_text = it.strings().resolve_or_empty(*key);
                it.pool_mut().assoc_insert(assoc, &key_text, *value);
            }
            Eval::Value(ValueRef::node(assoc, false))
        }
        Opcode::Str => {
            let text = it.pool().string_value(id).unwrap_or_default();
            it.pool_mut().free_tree_if_possible(target);
            let tail: String = text.chars().skip(1).collect();
            string_result(it, &tail, immediate)
        }
        _ => Eval::Value(ValueRef::Node(target)),
    }
}

pub(crate) fn op_last(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let target = it.interpret_node_ref(ops.first().copied());
    let Some(id) = target.id else {
        return Eval::null();
    };
    match it.pool().opcode(id) {
        Opcode::List => match it.pool().children(id).last() {
            Some(&last) => Eval::Value(ValueRef::node(last, false)),
            None => Eval::null(),
        },
        Opcode::Assoc => match it.pool().assoc(id).values().last() {
            Some(&last) => Eval::Value(ValueRef::node(last, false)),
            None => Eval::null(),
        },
        Opcode::Str => {
            let text = it.pool().string_value(id).unwrap_or_default();
            it.pool_mut().free_tree_if_possible(target);
            match text.chars().last() {
                Some(c) => string_result(it, &c.to_string(), immediate),
                None => Eval::null(),
            }
        }
        _ => Eval::Value(ValueRef::Node(target)),
    }
}

pub(crate) fn op_trunc(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let target = it.interpret_node_ref(ops.first().copied());
    let Some(id) = target.id else {
        return Eval::null();
    };
    match it.pool().opcode(id) {
        Opcode::List => {
            let children = it.pool().children(id);
            let list = it.pool_mut().alloc(Opcode::List);
            if !children.is_empty() {
                for &child in &children[..children.len() - 1] {
                    it.pool_mut().append_child(list, child);
                }
            }
            Eval::Value(ValueRef::node(list, false))
        }
        Opcode::Str => {
            let text = it.pool().string_value(id).unwrap_or_default();
            it.pool_mut().free_tree_if_possible(target);
            let mut chars: Vec<char> = text.chars().collect();
            chars.pop();
            let truncated: String = chars.into_iter().collect();
            string_result(it, &truncated, immediate)
        }
        _ => Eval::Value(ValueRef::Node(target)),
    }
}

pub(crate) fn op_append(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    let list = it.pool_mut().alloc(Opcode::List);
    it.pin(list);
    for op in ops {
        let r = it.interpret_node_ref(Some(op));
        match r.id {
            Some(id) if it.pool().opcode(id) == Opcode::List => {
                for child in it.pool().children(id) {
                    it.pool_mut().append_child(list, child);
                }
            }
            Some(id) => it.pool_mut().append_child(list, id),
            None => {
                let null = it.pool_mut().alloc_null();
                it.pool_mut().append_child(list, null);
            }
        }
    }
    it.unpin(1);
    Eval::Value(ValueRef::node(list, false))
}

pub(crate) fn op_size(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let target = it.interpret_node_ref(ops.first().copied());
    let size = match target.id {
        Some(id) => match it.pool().opcode(id) {
            Opcode::List | Opcode::Assoc => it.pool().child_count(id) as f64,
            Opcode::Str => it
                .pool()
                .string_value(id)
                .map(|s| s.chars().count() as f64)
                .unwrap_or(0.0),
            _ => 0.0,
        },
        None => 0.0,
    };
    it.pool_mut().free_tree_if_possible(target);
    number_result(it, size, immediate)
}

pub(crate) fn op_range(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    let start = it.interpret_into_number(ops.first().copied());
    let end = it.interpret_into_number(ops.get(1).copied());
    let step = match ops.get(2) {
        Some(&s) => it.interpret_into_number(Some(s)),
        None => {
            if end >= start {
                1.0
            } else {
                -1.0
            }
        }
    };
    if !start.is_finite() || !end.is_finite() || !step.is_finite() || step == 0.0 {
        return Eval::null();
    }

    let list = it.pool_mut().alloc(Opcode::List);
    let mut value = start;
    while (step > 0.0 && value <= end) || (step < 0.0 && value >= end) {
        let n = it.pool_mut().alloc_number(value);
        it.pool_mut().append_child(list, n);
        value += step;
    }
    Eval::Value(ValueRef::node(list, true))
}

pub(crate) fn op_map(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    let function = it.interpret_node_ref(ops.first().copied());
    let Some(function_id) = function.id else {
        return Eval::null();
    };
    it.pin(function_id);
    let collection = it.interpret_node_ref(ops.get(1).copied());
    let Some(collection_id) = collection.id else {
        it.unpin(1);
        return Eval::null();
    };
    it.pin(collection_id);

    let result = match it.pool().opcode(collection_id) {
        Opcode::List => {
            let children = it.pool().children(collection_id);
            let out = it.pool_mut().alloc(Opcode::List);
            it.pin(out);
            it.push_construction(Some(out), None, None);
            for (index, child) in children.into_iter().enumerate() {
                it.set_top_current_index_number(index as f64);
                it.set_top_current_value(Some(child));
                let mapped = it.interpret_node_ref(Some(function_id));
                let id = match mapped.id {
                    Some(id) => id,
                    None => it.pool_mut().alloc_null(),
                };
                it.pool_mut().append_child(out, id);
            }
            it.pop_construction();
            it.unpin(1);
            Eval::Value(ValueRef::node(out, true))
        }
        Opcode::Assoc => {
            let map = it.pool().assoc(collection_id);
            let out = it.pool_mut().alloc(Opcode::Assoc);
            it.pin(out);
            it.push_construction(Some(out), None, None);
            for (key, child) in map {
                let key_text = it.strings().resolve_or_empty(key);
                let key_node = it.pool_mut().alloc_string(&key_text);
                it.set_top_current_index_node(key_node);
                it.set_top_current_value(Some(child));
                let mapped = it.interpret_node_ref(Some(function_id));
                let id = match mapped.id {
                    Some(id) => id,
                    None => it.pool_mut().alloc_null(),
                };
                it.pool_mut().assoc_insert(out, &key_text, id);
            }
            it.pop_construction();
            it.unpin(1);
            Eval::Value(ValueRef::node(out, true))
        }
        _ => Eval::null(),
    };

    // the mapped results may alias collection children, so the collection
    // is left to the collector
    it.unpin(2);
    result
}

pub(crate) fn op_filter(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);

    // single-operand form drops nulls
    if ops.len() == 1 {
        let collection = it.interpret_node_ref(ops.first().copied());
        let Some(id) = collection.id else {
            return Eval::null();
        };
        let kind = it.pool().opcode(id);
        let out = it.pool_mut().alloc(kind);
        match kind {
            Opcode::List => {
                for child in it.pool().children(id) {
                    if it.pool().opcode(child) != Opcode::Null {
                        it.pool_mut().append_child(out, child);
                    }
                }
            }
            Opcode::Assoc => {
                for (key, child) in it.pool().assoc(id) {
                    if it.pool().opcode(child) != Opcode::Null {
                        let key_text = it.strings().resolve_or_empty(key);
                        it.pool_mut().assoc_insert(out, &key_text, child);
                    }
                }
            }
            _ => return Eval::Value(ValueRef::Node(collection)),
        }
        return Eval::Value(ValueRef::node(out, false));
    }

    let function = it.interpret_node_ref(ops.first().copied());
    let Some(function_id) = function.id else {
        return Eval::null();
    };
    it.pin(function_id);
    let collection = it.interpret_node_ref(ops.get(1).copied());
    let Some(collection_id) = collection.id else {
        it.unpin(1);
        return Eval::null();
    };
    it.pin(collection_id);

    let result = match it.pool().opcode(collection_id) {
        Opcode::List => {
            let children = it.pool().children(collection_id);
            let out = it.pool_mut().alloc(Opcode::List);
            it.pin(out);
            it.push_construction(Some(out), None, None);
            for (index, child) in children.into_iter().enumerate() {
                it.set_top_current_index_number(index as f64);
                it.set_top_current_value(Some(child));
                if it.interpret_into_bool(Some(function_id), false) {
                    it.pool_mut().append_child(out, child);
                }
            }
            it.pop_construction();
            it.unpin(1);
            Eval::Value(ValueRef::node(out, false))
        }
        Opcode::Assoc => {
            let map = it.pool().assoc(collection_id);
            let out = it.pool_mut().alloc(Opcode::Assoc);
            it.pin(out);
            it.push_construction(Some(out), None, None);
            for (key, child) in map {
                let key_text = it.strings().resolve_or_empty(key);
                let key_node = it.pool_mut().alloc_string(&key_text);
                it.set_top_current_index_node(key_node);
                it.set_top_current_value(Some(child));
                if it.interpret_into_bool(Some(function_id), false) {
                    it.pool_mut().assoc_insert(out, &key_text, child);
                }
            }
            it.pop_construction();
            it.unpin(1);
            Eval::Value(ValueRef::node(out, false))
        }
        _ => Eval::null(),
    };

    it.unpin(2);
    result
}

pub(crate) fn op_reduce(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    let function = it.interpret_node_ref(ops.first().copied());
    let Some(function_id) = function.id else {
        return Eval::null();
    };
    it.pin(function_id);
    let collection = it.interpret_node_ref(ops.get(1).copied());
    let Some(collection_id) = collection.id else {
        it.unpin(1);
        return Eval::null();
    };
    it.pin(collection_id);

    let elements: Vec<NodeId> = match it.pool().opcode(collection_id) {
        Opcode::List => it.pool().children(collection_id),
        Opcode::Assoc => it.pool().assoc(collection_id).values().copied().collect(),
        _ => Vec::new(),
    };
    if elements.is_empty() {
        it.unpin(2);
        return Eval::null();
    }

    it.push_construction(None, None, None);
    it.set_top_previous_result(NodeRef::new(elements[0], false));
    for (index, &element) in elements.iter().enumerate().skip(1) {
        it.set_top_current_index_number(index as f64);
        it.set_top_current_value(Some(element));
        let step = it.interpret_node_ref(Some(function_id));
        it.set_top_previous_result(step);
    }
    let result = it.take_top_previous_result();
    it.pop_construction();
    it.unpin(2);
    Eval::Value(ValueRef::Node(result))
}

pub(crate) fn op_weave(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    let mut lists: Vec<Vec<NodeId>> = Vec::new();
    let mut pinned = 0;
    for op in ops {
        let r = it.interpret_node_ref(Some(op));
        match r.id {
            Some(id) if it.pool().opcode(id) == Opcode::List => {
                it.pin(id);
                pinned += 1;
                lists.push(it.pool().children(id));
            }
            Some(id) => {
                it.pin(id);
                pinned += 1;
                lists.push(vec![id]);
            }
            None => {}
        }
    }
    it.unpin(pinned);

    let out = it.pool_mut().alloc(Opcode::List);
    let longest = lists.iter().map(|l| l.len()).max().unwrap_or(0);
    for index in 0..longest {
        for list in &lists {
            if let Some(&element) = list.get(index) {
                it.pool_mut().append_child(out, element);
            }
        }
    }
    Eval::Value(ValueRef::node(out, false))
}

pub(crate) fn op_apply(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let Some(name) = it.interpret_into_string(ops.first().copied()) else {
        return Eval::null();
    };
    let Some(opcode) = Opcode::from_name(&name) else {
        return Eval::null();
    };
    let args = it.interpret_node_ref(ops.get(1).copied());

    let applied = it.pool_mut().alloc(opcode);
    match args.id {
        Some(id) if it.pool().opcode(id) == Opcode::List => {
            let children = it.pool().children(id);
            it.pool_mut().set_children(applied, children);
        }
        Some(id) => it.pool_mut().append_child(applied, id),
        None => {}
    }
    it.pin(applied);
    let result = it.interpret(Some(applied), immediate);
    it.unpin(1);
    // the result may alias operands of the applied node; both are left to
    // the collector
    result
}

pub(crate) fn op_reverse(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let target = it.interpret_node_ref(ops.first().copied());
    let Some(id) = target.id else {
        return Eval::null();
    };
    match it.pool().opcode(id) {
        Opcode::List => {
            let mut children = it.pool().children(id);
            children.reverse();
            let out = it.pool_mut().alloc(Opcode::List);
            it.pool_mut().set_children(out, children);
            Eval::Value(ValueRef::node(out, false))
        }
        Opcode::Str => {
            let text = it.pool().string_value(id).unwrap_or_default();
            it.pool_mut().free_tree_if_possible(target);
            let reversed: String = text.chars().rev().collect();
            string_result(it, &reversed, immediate)
        }
        _ => Eval::Value(ValueRef::Node(target)),
    }
}

pub(crate) fn op_sort(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    // with a comparator operand the collection is the second operand;
    // ordering always uses the default number-then-string comparison
    let collection_op = if ops.len() >= 2 { ops.get(1) } else { ops.first() };
    let target = it.interpret_node_ref(collection_op.copied());
    let Some(id) = target.id else {
        return Eval::null();
    };
    if it.pool().opcode(id) != Opcode::List {
        return Eval::Value(ValueRef::Node(target));
    }

    let mut children = it.pool().children(id);
    children.sort_by(|&a, &b| {
        let na = node_to_number(it.pool(), Some(a));
        let nb = node_to_number(it.pool(), Some(b));
        match (na.is_nan(), nb.is_nan()) {
            (false, false) => na.partial_cmp(&nb).unwrap_or(std::cmp::Ordering::Equal),
            (true, false) => std::cmp::Ordering::Greater,
            (false, true) => std::cmp::Ordering::Less,
            (true, true) => {
                let sa = it.node_display_string(a);
                let sb = it.node_display_string(b);
                sa.cmp(&sb)
            }
        }
    });
    let out = it.pool_mut().alloc(Opcode::List);
    it.pool_mut().set_children(out, children);
    Eval::Value(ValueRef::node(out, false))
}

pub(crate) fn op_rewrite(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    let function = it.interpret_node_ref(ops.first().copied());
    let Some(function_id) = function.id else {
        return Eval::null();
    };
    it.pin(function_id);
    let tree = it.interpret_node_ref(ops.get(1).copied());
    if let Some(tree_id) = tree.id {
        it.pin(tree_id);
    }

    it.push_construction(tree.id, None, None);
    let result = it.rewrite_by_function(function_id, tree.id);
    it.pop_construction();

    if tree.id.is_some() {
        it.unpin(1);
    }
    it.unpin(1);
    it.pool_mut().free_tree_if_possible(tree);
    Eval::Value(ValueRef::Node(result))
}
