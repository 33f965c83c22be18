//! Logic and equivalence handlers.

use sylva_tree::tree_ops::tree_equal;
use sylva_tree::{NodeId, NodeRef};

use crate::interpreter::Interpreter;
use crate::opcodes::{bool_result, operands};
use crate::value::{Eval, ValueRef};

pub(crate) fn op_and(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    if ops.is_empty() {
        return bool_result(it, true, immediate);
    }
    let mut last = NodeRef::null();
    for (i, &op) in ops.iter().enumerate() {
        let r = it.interpret_node_ref(Some(op));
        let truthy = sylva_tree::tree_ops::node_to_bool(it.pool(), r.id, false);
        if !truthy {
            it.pool_mut().free_tree_if_possible(r);
            it.pool_mut().free_tree_if_possible(last);
            return bool_result(it, false, immediate);
        }
        if i + 1 == ops.len() {
            last = r;
        } else {
            it.pool_mut().free_tree_if_possible(r);
        }
    }
    // all true: the last operand's value is the result
    Eval::Value(ValueRef::Node(last))
}

pub(crate) fn op_or(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    for op in ops {
        let r = it.interpret_node_ref(Some(op));
        let truthy = sylva_tree::tree_ops::node_to_bool(it.pool(), r.id, false);
        if truthy {
            return Eval::Value(ValueRef::Node(r));
        }
        it.pool_mut().free_tree_if_possible(r);
    }
    bool_result(it, false, immediate)
}

pub(crate) fn op_xor(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let mut truthy_count = 0usize;
    for op in ops {
        if it.interpret_into_bool(Some(op), false) {
            truthy_count += 1;
        }
    }
    bool_result(it, truthy_count % 2 == 1, immediate)
}

pub(crate) fn op_not(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let value = it.interpret_into_bool(ops.first().copied(), false);
    bool_result(it, !value, immediate)
}

/// Evaluate all operands as nodes, returning them plus a free-at-end list.
fn evaluate_all(it: &mut Interpreter, ops: &[NodeId]) -> Vec<NodeRef> {
    let mut results = Vec::with_capacity(ops.len());
    for &op in ops {
        let r = it.interpret_node_ref(Some(op));
        if let Some(id) = r.id {
            it.pin(id);
        }
        results.push(r);
    }
    results
}

fn release_all(it: &mut Interpreter, results: Vec<NodeRef>) {
    let pinned = results.iter().filter(|r| r.id.is_some()).count();
    it.unpin(pinned);
    for r in results {
        it.pool_mut().free_tree_if_possible(r);
    }
}

pub(crate) fn op_equal(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let results = evaluate_all(it, &ops);
    let mut equal = true;
    for pair in results.windows(2) {
        if !tree_equal(it.pool(), pair[0].id, pair[1].id) {
            equal = false;
            break;
        }
    }
    release_all(it, results);
    bool_result(it, equal, immediate)
}

pub(crate) fn op_nequal(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let results = evaluate_all(it, &ops);
    let mut all_different = true;
    'outer: for i in 0..results.len() {
        for j in (i + 1)..results.len() {
            if tree_equal(it.pool(), results[i].id, results[j].id) {
                all_different = false;
                break 'outer;
            }
        }
    }
    release_all(it, results);
    bool_result(it, all_different, immediate)
}

fn ordered_chain(
    it: &mut Interpreter,
    node: NodeId,
    immediate: bool,
    ok: impl Fn(std::cmp::Ordering) -> bool,
) -> Eval {
    let ops = operands(it, node);
    if ops.len() < 2 {
        return bool_result(it, false, immediate);
    }
    let mut prev = it.interpret_into_number(Some(ops[0]));
    for &op in &ops[1..] {
        let next = it.interpret_into_number(Some(op));
        let Some(ordering) = prev.partial_cmp(&next) else {
            return bool_result(it, false, immediate);
        };
        if !ok(ordering) {
            return bool_result(it, false, immediate);
        }
        prev = next;
    }
    bool_result(it, true, immediate)
}

pub(crate) fn op_less(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    ordered_chain(it, node, immediate, |o| o == std::cmp::Ordering::Less)
}

pub(crate) fn op_lequal(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    ordered_chain(it, node, immediate, |o| o != std::cmp::Ordering::Greater)
}

pub(crate) fn op_greater(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    ordered_chain(it, node, immediate, |o| o == std::cmp::Ordering::Greater)
}

pub(crate) fn op_gequal(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    ordered_chain(it, node, immediate, |o| o != std::cmp::Ordering::Less)
}

pub(crate) fn op_type_equals(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let results = evaluate_all(it, &ops);
    let mut same = true;
    for pair in results.windows(2) {
        let a = pair[0].id.map(|id| it.pool().opcode(id));
        let b = pair[1].id.map(|id| it.pool().opcode(id));
        if a != b {
            same = false;
            break;
        }
    }
    release_all(it, results);
    bool_result(it, same, immediate)
}

pub(crate) fn op_type_nequals(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let results = evaluate_all(it, &ops);
    let mut all_different = true;
    'outer: for i in 0..results.len() {
        for j in (i + 1)..results.len() {
            let a = results[i].id.map(|id| it.pool().opcode(id));
            let b = results[j].id.map(|id| it.pool().opcode(id));
            if a == b {
                all_different = false;
                break 'outer;
            }
        }
    }
    release_all(it, results);
    bool_result(it, all_different, immediate)
}
