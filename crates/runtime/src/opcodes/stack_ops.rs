//! Stack and construction-frame introspection.

use sylva_tree::{NodeId, Opcode};

use crate::interpreter::Interpreter;
use crate::opcodes::operands;
use crate::value::{Eval, ValueRef};

/// Read the frame offset operand (defaults to the innermost frame).
fn frame_offset(it: &mut Interpreter, node: NodeId) -> usize {
    let ops = operands(it, node);
    match ops.first() {
        Some(&op) => {
            let v = it.interpret_into_number(Some(op));
            if v.is_finite() && v >= 0.0 {
                v as usize
            } else {
                0
            }
        }
        None => 0,
    }
}

fn shared_or_null(found: Option<NodeId>) -> Eval {
    match found {
        Some(id) => Eval::Value(ValueRef::node(id, false)),
        None => Eval::null(),
    }
}

pub(crate) fn op_target(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let offset = frame_offset(it, node);
    shared_or_null(it.construction_target(offset))
}

pub(crate) fn op_current_index(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let offset = frame_offset(it, node);
    shared_or_null(it.construction_current_index(offset))
}

pub(crate) fn op_current_value(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let offset = frame_offset(it, node);
    shared_or_null(it.construction_current_value(offset))
}

pub(crate) fn op_previous_result(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let offset = frame_offset(it, node);
    shared_or_null(it.construction_previous_result(offset))
}

pub(crate) fn op_opcode_stack(it: &mut Interpreter, _node: NodeId, _immediate: bool) -> Eval {
    let entries = it.pool().children(it.interp_stack);
    let list = it.pool_mut().alloc(Opcode::List);
    for entry in entries {
        it.pool_mut().append_child(list, entry);
    }
    it.pool_mut().set_cycle_check(list, true);
    Eval::Value(ValueRef::node(list, false))
}

pub(crate) fn op_stack(it: &mut Interpreter, _node: NodeId, _immediate: bool) -> Eval {
    Eval::Value(ValueRef::node(it.call_stack, false))
}

pub(crate) fn op_args(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let offset = frame_offset(it, node);
    let frames = it.call_frames();
    if offset >= frames.len() {
        return Eval::null();
    }
    Eval::Value(ValueRef::node(frames[frames.len() - 1 - offset], false))
}
