//! Core control handlers: conditionals, sequences, scopes, calls,
//! sandboxing, loops, and assignment.

use tracing::debug;

use sylva_tree::{NodeId, NodeRef, Opcode};

use crate::constraints::{ConstraintParams, PerformanceConstraints};
use crate::interpreter::Interpreter;
use crate::opcodes::{accum_values, operands, string_result};
use crate::value::{Eval, ValueRef};

pub(crate) fn op_system(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let Some(command) = it.interpret_into_string(ops.first().copied()) else {
        return Eval::null();
    };

    // privileged surface: only entities with root permission may use it
    let permitted = match it.machine_and_entity() {
        Some((machine, entity)) => machine
            .assets
            .as_ref()
            .map(|assets| assets.has_root_permission(entity))
            .unwrap_or(false),
        None => false,
    };
    if !permitted {
        debug!(%command, "system opcode without root permission");
        return Eval::null();
    }

    match command.as_str() {
        "version" => {
            let version = it
                .machine_mut()
                .map(|m| {
                    format!(
                        "{}.{}.{}",
                        m.version.major, m.version.minor, m.version.patch
                    )
                })
                .unwrap_or_default();
            string_result(it, &version, immediate)
        }
        _ => Eval::null(),
    }
}

pub(crate) fn op_get_defaults(it: &mut Interpreter, _node: NodeId, _immediate: bool) -> Eval {
    let threads = it
        .machine_mut()
        .map(|m| m.workers.thread_count())
        .unwrap_or(0);
    let assoc = it.pool_mut().alloc(Opcode::Assoc);
    let threads_node = it.pool_mut().alloc_number(threads as f64);
    it.pool_mut()
        .assoc_insert(assoc, "num_threads", threads_node);
    Eval::Value(ValueRef::node(assoc, true))
}

pub(crate) fn op_parse(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    let Some(source) = it.interpret_into_string(ops.first().copied()) else {
        return Eval::null();
    };
    match sylva_lang::parse(&source, it.pool_mut()) {
        Ok(root) => Eval::Value(ValueRef::Node(root)),
        Err(error) => {
            debug!(%error, "parse opcode failed");
            Eval::null()
        }
    }
}

pub(crate) fn op_unparse(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let code = it.interpret_node_ref(ops.first().copied());
    if let Some(id) = code.id {
        it.pin(id);
    }
    let pretty = it.interpret_into_bool(ops.get(1).copied(), false);
    let sort_keys = it.interpret_into_bool(ops.get(2).copied(), false);
    let text = sylva_lang::unparse(it.pool(), code.id, pretty, sort_keys);
    if code.id.is_some() {
        it.unpin(1);
    }
    it.pool_mut().free_tree_if_possible(code);
    string_result(it, &text, immediate)
}

pub(crate) fn op_if(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let mut index = 0;
    while index < ops.len() {
        // a trailing unpaired operand is the else branch
        if index + 1 == ops.len() {
            return it.interpret(Some(ops[index]), immediate);
        }
        if it.interpret_into_bool(Some(ops[index]), false) {
            return it.interpret(Some(ops[index + 1]), immediate);
        }
        index += 2;
    }
    Eval::null()
}

pub(crate) fn op_sequence(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let mut result = ValueRef::null();
    for (i, child) in ops.iter().enumerate() {
        let last = i + 1 == ops.len();
        match it.interpret(Some(*child), immediate && last) {
            Eval::Value(v) => {
                if last {
                    result = v;
                } else {
                    it.discard_value(v);
                }
            }
            Eval::Conclude(v) => return Eval::Value(v),
            Eval::Return(v) => return Eval::Return(v),
        }
    }
    Eval::Value(result)
}

pub(crate) fn op_parallel(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);

    if let Some(results) = it.interpret_nodes_concurrently(node, &ops) {
        let list = it.pool_mut().alloc(Opcode::List);
        for r in results {
            let id = match r.id {
                Some(id) => id,
                None => it.pool_mut().alloc_null(),
            };
            it.pool_mut().append_child(list, id);
        }
        return Eval::Value(ValueRef::node(list, true));
    }

    // sequential fallback produces the same output
    let list = it.pool_mut().alloc(Opcode::List);
    it.pin(list);
    for child in ops {
        let r = it.interpret_node_ref(Some(child));
        let id = match r.id {
            Some(id) => id,
            None => it.pool_mut().alloc_null(),
        };
        it.pool_mut().append_child(list, id);
    }
    it.unpin(1);
    Eval::Value(ValueRef::node(list, true))
}

pub(crate) fn op_lambda(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    match ops.first() {
        // the wrapped code is returned as data, shared with the lambda node
        Some(&code) => Eval::Value(ValueRef::node(code, false)),
        None => Eval::null(),
    }
}

pub(crate) fn op_conclude_and_return(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    let value = match ops.first() {
        Some(&child) => ValueRef::Node(it.interpret_node_ref(Some(child))),
        None => ValueRef::null(),
    };
    match it.pool().opcode(node) {
        Opcode::Return => Eval::Return(value),
        _ => Eval::Conclude(value),
    }
}

/// Build the callee's scope frame from an evaluated args reference.
fn args_frame(it: &mut Interpreter, args: NodeRef) -> NodeId {
    match args.id {
        Some(id) if it.pool().opcode(id) == Opcode::Assoc => {
            if args.unique {
                id
            } else {
                it.pool_mut().deep_copy(id)
            }
        }
        _ => it.pool_mut().alloc(Opcode::Assoc),
    }
}

pub(crate) fn op_call(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let function = it.interpret_node_ref(ops.first().copied());
    let Some(function_id) = function.id else {
        return Eval::null();
    };
    it.pin(function_id);

    let args = it.interpret_node_ref(ops.get(1).copied());
    let frame = args_frame(it, args);
    it.push_call_frame(frame);

    let result = it.interpret(Some(function_id), immediate);

    it.pop_call_frame();
    it.unpin(1);
    // both control kinds unwind at the call boundary
    Eval::Value(result.into_value())
}

pub(crate) fn op_call_sandboxed(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let function = it.interpret_node_ref(ops.first().copied());
    let Some(function_id) = function.id else {
        return Eval::null();
    };
    it.pin(function_id);

    let args = it.interpret_node_ref(ops.get(1).copied());
    if let Some(args_id) = args.id {
        it.pin(args_id);
    }

    // constraint parameters follow the args operand
    let mut params: ConstraintParams = [None; 6];
    for (slot, param) in params.iter_mut().take(3).enumerate() {
        if let Some(&p) = ops.get(2 + slot) {
            let v = it.interpret_into_number(Some(p));
            if !v.is_nan() {
                *param = Some(v);
            }
        }
    }
    let requested = PerformanceConstraints::from_values(&params, false);
    let used = it.pool().used_count();
    let depth = it.opcode_depth();
    let width = it
        .machine_mut()
        .map(|m| m.workers.thread_count())
        .unwrap_or(0);
    let composed = match (&it.constraints, requested) {
        (Some(parent), requested) => {
            let mut child = requested.unwrap_or_default();
            parent.populate_counters(&mut child, used, depth, width);
            Some(child)
        }
        (None, requested) => requested,
    };

    // the sandbox gets a fresh single-frame call stack: no access to the
    // enclosing scopes
    let frame = args_frame(it, args);
    let new_stack = {
        let pool = it.pool_mut();
        let stack = pool.alloc(Opcode::List);
        pool.append_child(stack, frame);
        pool.set_cycle_check(stack, true);
        pool.set_cycle_check(frame, true);
        pool.keep(stack);
        stack
    };
    if args.id.is_some() {
        it.unpin(1);
    }

    let saved_stack = it.call_stack;
    let saved_depth = it.unique_access_start_depth;
    let saved_constraints = it.constraints.take();
    it.call_stack = new_stack;
    it.unique_access_start_depth = 0;
    it.constraints = composed;

    let mut result = it.interpret(Some(function_id), immediate).into_value();

    let spent = it
        .constraints
        .as_ref()
        .map(|c| c.cur_execution_step)
        .unwrap_or(0);
    let exhausted = it
        .constraints
        .as_ref()
        .map(|c| c.exhausted(it.pool().used_count(), 0))
        .unwrap_or(false);
    if exhausted {
        // a depleted sandbox yields null; the parent continues
        it.discard_value(result);
        result = ValueRef::null();
    }

    it.constraints = saved_constraints;
    if let Some(parent) = &mut it.constraints {
        // charge the sandbox's spending against the caller
        parent.cur_execution_step = parent.cur_execution_step.saturating_add(spent);
    }
    it.call_stack = saved_stack;
    it.unique_access_start_depth = saved_depth;

    it.pool_mut().release_kept(new_stack);
    it.pool_mut().free_node(new_stack);
    it.unpin(1);

    Eval::Value(result)
}

pub(crate) fn op_while(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    let Some(&condition) = ops.first() else {
        return Eval::null();
    };
    let body = &ops[1..];

    it.push_construction(None, None, None);
    let mut iteration = 0.0;
    loop {
        if !it.interpret_into_bool(Some(condition), false) {
            break;
        }
        it.set_top_current_index_number(iteration);

        let mut concluded = false;
        for (i, &step) in body.iter().enumerate() {
            let last = i + 1 == body.len();
            match it.interpret(Some(step), false) {
                Eval::Value(v) => {
                    if last {
                        let node_ref = it.value_to_node(v);
                        it.set_top_previous_result(node_ref);
                    } else {
                        it.discard_value(v);
                    }
                }
                Eval::Conclude(v) => {
                    let node_ref = it.value_to_node(v);
                    it.set_top_previous_result(node_ref);
                    concluded = true;
                    break;
                }
                Eval::Return(v) => {
                    it.pop_construction();
                    return Eval::Return(v);
                }
            }
        }
        if concluded {
            break;
        }
        iteration += 1.0;
    }

    let result = it.take_top_previous_result();
    it.pop_construction();
    Eval::Value(ValueRef::Node(result))
}

pub(crate) fn op_let(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let scope = it.interpret_node_ref(ops.first().copied());
    let frame = args_frame(it, scope);
    it.push_call_frame(frame);

    let mut result = ValueRef::null();
    for (i, &child) in ops.iter().enumerate().skip(1) {
        let last = i + 1 == ops.len();
        match it.interpret(Some(child), immediate && last) {
            Eval::Value(v) => {
                if last {
                    result = v;
                } else {
                    it.discard_value(v);
                }
            }
            Eval::Conclude(v) => {
                it.pop_call_frame();
                return Eval::Value(v);
            }
            Eval::Return(v) => {
                it.pop_call_frame();
                return Eval::Return(v);
            }
        }
    }

    it.pop_call_frame();
    Eval::Value(result)
}

pub(crate) fn op_declare(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let defaults = it.interpret_node_ref(ops.first().copied());
    if let Some(id) = defaults.id {
        if it.pool().opcode(id) == Opcode::Assoc {
            for (key, value) in it.pool().assoc(id) {
                it.declare_symbol(key, value);
            }
        }
    }

    let mut result = ValueRef::null();
    for (i, &child) in ops.iter().enumerate().skip(1) {
        let last = i + 1 == ops.len();
        match it.interpret(Some(child), immediate && last) {
            Eval::Value(v) => {
                if last {
                    result = v;
                } else {
                    it.discard_value(v);
                }
            }
            Eval::Conclude(v) => return Eval::Value(v),
            Eval::Return(v) => return Eval::Return(v),
        }
    }
    Eval::Value(result)
}

pub(crate) fn op_assign_and_accum(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let accumulate = it.pool().opcode(node) == Opcode::Accum;

    // assignments inside iteration bodies are observable side effects
    it.note_side_effect();

    if ops.len() == 1 {
        // single-operand form: an assoc of symbol -> value; the bound
        // values alias the assoc's children, so it is left to the collector
        let bindings = it.interpret_node_ref(ops.first().copied());
        if let Some(id) = bindings.id {
            if it.pool().opcode(id) == Opcode::Assoc {
                for (sid, value) in it.pool().assoc(id) {
                    assign_one(it, sid, NodeRef::new(value, false), accumulate);
                }
            }
        }
        return Eval::null();
    }

    let mut index = 0;
    while index + 1 < ops.len() {
        let symbol = ops[index];
        let sid = match it.pool().opcode(symbol) {
            Opcode::Symbol | Opcode::Str => it.pool().string_id(symbol),
            _ => it.interpret_into_string_id_if_exists(Some(symbol)),
        };
        let value = it.interpret_node_ref(Some(ops[index + 1]));
        if sid.is_string() {
            assign_one(it, sid, value, accumulate);
        } else {
            it.pool_mut().free_tree_if_possible(value);
        }
        index += 2;
    }
    let _ = immediate;
    Eval::null()
}

fn assign_one(
    it: &mut Interpreter,
    sid: sylva_foundation::StringId,
    value: NodeRef,
    accumulate: bool,
) {
    let value = if accumulate {
        let existing = it.symbol_value(sid);
        accum_values(it, existing, value)
    } else {
        value
    };
    let id = match value.id {
        Some(id) => id,
        None => it.pool_mut().alloc_null(),
    };
    it.pool_mut().set_cycle_check(id, true);
    it.set_symbol(sid, id);
}

pub(crate) fn op_retrieve(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    let target = it.interpret_node_ref(ops.first().copied());
    let Some(id) = target.id else {
        return Eval::null();
    };

    if it.pool().opcode(id) == Opcode::List {
        let list = it.pool_mut().alloc(Opcode::List);
        for child in it.pool().children(id) {
            let value = retrieve_one(it, child);
            let value = match value {
                Some(v) => v,
                None => it.pool_mut().alloc_null(),
            };
            it.pool_mut().append_child(list, value);
        }
        it.pool_mut().free_tree_if_possible(target);
        return Eval::Value(ValueRef::node(list, false));
    }

    let found = retrieve_one(it, id);
    it.pool_mut().free_tree_if_possible(target);
    match found {
        Some(found) => Eval::Value(ValueRef::node(found, false)),
        None => Eval::null(),
    }
}

fn retrieve_one(it: &Interpreter, key_node: NodeId) -> Option<NodeId> {
    let text = sylva_tree::tree_ops::immediate_to_string(it.pool(), key_node)?;
    let sid = it.strings().id_if_present(&text);
    if !sid.is_string() {
        return None;
    }
    it.symbol_value(sid)
}

pub(crate) fn op_get(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    let target = it.interpret_node_ref(ops.first().copied());
    let Some(mut cur) = target.id else {
        return Eval::null();
    };
    it.pin(cur);

    for &path_op in &ops[1..] {
        let path = it.interpret_node_ref(Some(path_op));
        let Some(path_id) = path.id else {
            it.unpin(1);
            return Eval::null();
        };
        let steps = crate::opcodes::path_steps(it, path_id);
        it.pool_mut().free_tree_if_possible(path);
        match crate::opcodes::traverse_path(it, cur, &steps) {
            Some(found) => cur = found,
            None => {
                it.unpin(1);
                return Eval::null();
            }
        }
    }
    it.unpin(1);
    // the result aliases the target's structure
    Eval::Value(ValueRef::node(cur, false))
}

pub(crate) fn op_set_and_replace(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    let target = it.interpret_node_ref(ops.first().copied());
    let Some(id) = target.id else {
        return Eval::null();
    };
    let root = if target.unique {
        id
    } else {
        it.pool_mut().deep_copy(id)
    };
    it.pin(root);

    let mut index = 1;
    while index + 1 < ops.len() {
        let path_op = ops[index];
        let path = it.interpret_node_ref(Some(path_op));
        let Some(path_id) = path.id else {
            index += 2;
            continue;
        };
        let steps = crate::opcodes::path_steps(it, path_id);
        it.pool_mut().free_tree_if_possible(path);

        let value = it.interpret_node_ref(ops.get(index + 1).copied());
        let value_id = match value.id {
            Some(v) => v,
            None => it.pool_mut().alloc_null(),
        };
        crate::opcodes::place_at_path(it, root, &steps, value_id);
        index += 2;
    }

    it.unpin(1);
    Eval::Value(ValueRef::node(root, true))
}
