//! Dispatch-contract stubs.
//!
//! The analytics surface (entity queries, conviction computations,
//! tree-merge metrics, distance math) and the cryptographic primitives
//! are external collaborators; their per-opcode math lives outside the
//! dispatch core. They are still wired into the table so the error model
//! stays uniform: operands are left unevaluated and the result is null.

use tracing::trace;

use sylva_tree::NodeId;

use crate::interpreter::Interpreter;
use crate::value::Eval;

pub(crate) fn op_unsupported(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    trace!(opcode = it.pool().opcode(node).name(), "unsupported opcode");
    Eval::null()
}

pub(crate) fn op_deallocated(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    tracing::warn!(
        opcode = it.pool().opcode(node).name(),
        "evaluated a node that is not in active memory"
    );
    Eval::null()
}
