//! Construction stack.
//!
//! Iterator-shaped opcodes (map, filter, reduce, rewrite, while) push a
//! frame exposing the structure being built, the current index/value, and
//! the previous iteration's result. Frames are list nodes on the
//! construction stack; Rust-side metadata tracks previous-result
//! uniqueness and the side-effect flag that propagates to enclosing frames
//! on pop.

use sylva_tree::{NodeId, NodeRef, Opcode};

use crate::interpreter::Interpreter;

/// Positions within a construction frame node.
const TARGET: usize = 0;
const CURRENT_INDEX: usize = 1;
const CURRENT_VALUE: usize = 2;
const PREVIOUS_RESULT: usize = 3;

/// Rust-side bookkeeping for one construction frame.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ConstructionMeta {
    pub previous_result_unique: bool,
    pub side_effect: bool,
}

impl Interpreter<'_> {
    /// Push a frame. Absent slots start as null nodes.
    pub fn push_construction(
        &mut self,
        target: Option<NodeId>,
        current_index: Option<NodeId>,
        current_value: Option<NodeId>,
    ) {
        let construction_stack = self.construction_stack;
        {
            let pool = self.pool_mut();
            let frame = pool.alloc(Opcode::List);
            let target = target.unwrap_or_else(|| pool.alloc_null());
            let index = current_index.unwrap_or_else(|| pool.alloc_null());
            let value = current_value.unwrap_or_else(|| pool.alloc_null());
            let previous = pool.alloc_null();
            pool.append_child(frame, target);
            pool.append_child(frame, index);
            pool.append_child(frame, value);
            pool.append_child(frame, previous);
            pool.set_cycle_check(frame, true);
            pool.append_child(construction_stack, frame);
        }
        self.construction_meta.push(ConstructionMeta::default());
    }

    /// Pop a frame and report whether its body observed a side effect; the
    /// flag propagates to the enclosing frame.
    pub fn pop_construction(&mut self) -> bool {
        let construction_stack = self.construction_stack;
        if let Some(frame) = self.pool_mut().pop_child(construction_stack) {
            self.pool_mut().free_node(frame);
        }
        let meta = self.construction_meta.pop().unwrap_or_default();
        if meta.side_effect {
            if let Some(top) = self.construction_meta.last_mut() {
                top.side_effect = true;
            }
        }
        meta.side_effect
    }

    /// The frame `offset` levels below the innermost one.
    pub fn construction_frame(&self, offset: usize) -> Option<NodeId> {
        let frames = self.pool().children(self.construction_stack);
        if offset >= frames.len() {
            return None;
        }
        Some(frames[frames.len() - 1 - offset])
    }

    fn frame_slot(&self, offset: usize, slot: usize) -> Option<NodeId> {
        let frame = self.construction_frame(offset)?;
        let children = self.pool().children(frame);
        children.get(slot).copied()
    }

    pub fn construction_target(&self, offset: usize) -> Option<NodeId> {
        self.frame_slot(offset, TARGET)
    }

    pub fn construction_current_index(&self, offset: usize) -> Option<NodeId> {
        self.frame_slot(offset, CURRENT_INDEX)
    }

    pub fn construction_current_value(&self, offset: usize) -> Option<NodeId> {
        self.frame_slot(offset, CURRENT_VALUE)
    }

    pub fn construction_previous_result(&self, offset: usize) -> Option<NodeId> {
        self.frame_slot(offset, PREVIOUS_RESULT)
    }

    fn set_frame_slot(&mut self, slot: usize, id: NodeId) {
        let Some(frame) = self.construction_frame(0) else {
            return;
        };
        self.pool_mut().set_child_at(frame, slot, id);
    }

    /// Set the current index, reusing the slot's number node when possible
    /// (the tight-loop case for ordered iteration).
    pub fn set_top_current_index_number(&mut self, value: f64) {
        if let Some(existing) = self.frame_slot(0, CURRENT_INDEX) {
            if self.pool().opcode(existing) == Opcode::Number {
                self.pool_mut().set_number_value(existing, value);
                return;
            }
        }
        let node = self.pool_mut().alloc_number(value);
        self.set_frame_slot(CURRENT_INDEX, node);
    }

    pub fn set_top_current_index_node(&mut self, id: NodeId) {
        self.set_frame_slot(CURRENT_INDEX, id);
    }

    pub fn set_top_current_value(&mut self, id: Option<NodeId>) {
        let id = match id {
            Some(id) => id,
            None => self.pool_mut().alloc_null(),
        };
        self.set_frame_slot(CURRENT_VALUE, id);
    }

    /// Replace the previous-result slot, reclaiming the displaced value
    /// when this frame uniquely owned it.
    pub fn set_top_previous_result(&mut self, result: NodeRef) {
        let old = self.frame_slot(0, PREVIOUS_RESULT);
        let old_unique = self
            .construction_meta
            .last()
            .map(|m| m.previous_result_unique)
            .unwrap_or(false);

        let new = match result.id {
            Some(id) => id,
            None => self.pool_mut().alloc_null(),
        };
        self.set_frame_slot(PREVIOUS_RESULT, new);
        if let Some(meta) = self.construction_meta.last_mut() {
            meta.previous_result_unique = result.unique;
        }

        if let Some(old) = old {
            if old_unique && Some(old) != result.id {
                self.pool_mut().free_tree_if_possible(NodeRef::new(old, true));
            }
        }
    }

    /// Take the previous result out of the top frame, transferring
    /// ownership to the caller.
    pub fn take_top_previous_result(&mut self) -> NodeRef {
        let Some(id) = self.frame_slot(0, PREVIOUS_RESULT) else {
            return NodeRef::null();
        };
        let unique = self
            .construction_meta
            .last()
            .map(|m| m.previous_result_unique)
            .unwrap_or(false);
        if let Some(meta) = self.construction_meta.last_mut() {
            meta.previous_result_unique = false;
        }
        if self.pool().opcode(id) == Opcode::Null {
            return NodeRef::null();
        }
        NodeRef::new(id, unique)
    }

    /// Record that the current iteration body mutated an enclosing
    /// structure.
    pub fn note_side_effect(&mut self) {
        if let Some(meta) = self.construction_meta.last_mut() {
            meta.side_effect = true;
        }
    }
}
