//! Randomness and time.

use std::time::{SystemTime, UNIX_EPOCH};

use sylva_foundation::RandomStream;
use sylva_tree::{NodeId, Opcode};

use crate::interpreter::Interpreter;
use crate::opcodes::{number_result, operands, string_result};
use crate::value::{Eval, ValueRef};

pub(crate) fn op_rand(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let Some(&range_op) = ops.first() else {
        let v = it.rand.uniform();
        return number_result(it, v, immediate);
    };

    let range = it.interpret_node_ref(Some(range_op));
    let Some(id) = range.id else {
        let v = it.rand.uniform();
        return number_result(it, v, immediate);
    };
    match it.pool().opcode(id) {
        Opcode::Number => {
            let bound = it.pool().number_value(id);
            it.pool_mut().free_tree_if_possible(range);
            let v = it.rand.uniform_range(0.0, bound);
            number_result(it, v, immediate)
        }
        Opcode::List => {
            let children = it.pool().children(id);
            if children.is_empty() {
                it.pool_mut().free_tree_if_possible(range);
                return Eval::null();
            }
            let chosen = children[it.rand.index(children.len())];
            // the chosen element aliases the evaluated list
            Eval::Value(ValueRef::node(chosen, false))
        }
        _ => {
            it.pool_mut().free_tree_if_possible(range);
            let v = it.rand.uniform();
            number_result(it, v, immediate)
        }
    }
}

pub(crate) fn op_weighted_rand(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let table = it.interpret_node_ref(ops.first().copied());
    let Some(id) = table.id else {
        return Eval::null();
    };
    if it.pool().opcode(id) != Opcode::Assoc {
        it.pool_mut().free_tree_if_possible(table);
        return Eval::null();
    }

    let map = it.pool().assoc(id);
    let keys: Vec<String> = map
        .keys()
        .map(|&k| it.strings().resolve_or_empty(k))
        .collect();
    let weights: Vec<f64> = map
        .values()
        .map(|&v| sylva_tree::tree_ops::node_to_number(it.pool(), Some(v)))
        .collect();
    it.pool_mut().free_tree_if_possible(table);

    if keys.is_empty() {
        return Eval::null();
    }
    let choice = it.rand.weighted_index(&weights);
    let key = keys[choice].clone();
    string_result(it, &key, immediate)
}

pub(crate) fn op_get_rand_seed(it: &mut Interpreter, _node: NodeId, immediate: bool) -> Eval {
    let seed = it.rand.state_string();
    string_result(it, &seed, immediate)
}

pub(crate) fn op_set_rand_seed(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let Some(seed) = it.interpret_into_string(ops.first().copied()) else {
        return Eval::null();
    };
    it.rand = RandomStream::from_state_string(&seed);
    string_result(it, &seed, immediate)
}

pub(crate) fn op_system_time(it: &mut Interpreter, _node: NodeId, immediate: bool) -> Eval {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(f64::NAN);
    number_result(it, seconds, immediate)
}
