//! The tree-walking evaluator.
//!
//! An interpreter instance walks one entity's tree against three parallel
//! stacks, all of which are themselves list nodes in the entity's pool:
//!
//! - the **call stack**: assoc frames forming lexical scopes;
//! - the **interpreter-node stack**: nodes currently being evaluated, which
//!   doubles as the GC pin set for in-flight work;
//! - the **construction stack**: frames for iterator-shaped opcodes.
//!
//! Interpreters are either *attached* (to a machine and a current entity)
//! or *detached* (over a scratch pool, used by parallel fan-out). Detached
//! interpreters cannot touch entities or assets; the corresponding opcodes
//! evaluate to null there.

use std::sync::Arc;

use sylva_foundation::{RandomStream, StringId, StringPool};
use sylva_tree::{NodeId, NodePool, NodeRef, Opcode};

use crate::constraints::PerformanceConstraints;
use crate::construction::ConstructionMeta;
use crate::dispatch::DISPATCH;
use crate::entity::EntityId;
use crate::machine::Machine;
use crate::value::{Eval, Immediate, ValueRef};

pub(crate) enum Host<'m> {
    Attached {
        machine: &'m mut Machine,
        entity: EntityId,
    },
    Detached {
        pool: &'m mut NodePool,
    },
}

pub struct Interpreter<'m> {
    pub(crate) host: Host<'m>,
    pub rand: RandomStream,
    pub constraints: Option<PerformanceConstraints>,
    pub(crate) call_stack: NodeId,
    pub(crate) interp_stack: NodeId,
    pub(crate) construction_stack: NodeId,
    pub(crate) construction_meta: Vec<ConstructionMeta>,
    /// Call-stack depth below which frames are shared with a spawning
    /// interpreter (read view) rather than owned by this one.
    pub(crate) unique_access_start_depth: usize,
}

impl<'m> Interpreter<'m> {
    /// Interpreter over an entity's pool, with machine access.
    pub fn attached(machine: &'m mut Machine, entity: EntityId) -> Self {
        let rand = machine.entities.entity_mut(entity).rand.substream_advancing("interpreter");
        Self::build(Host::Attached { machine, entity }, rand, None, None, 0)
    }

    /// Attached interpreter reusing an existing call stack node.
    pub fn attached_with_stack(
        machine: &'m mut Machine,
        entity: EntityId,
        constraints: Option<PerformanceConstraints>,
        call_stack: NodeId,
    ) -> Self {
        let rand = machine.entities.entity_mut(entity).rand.substream_advancing("interpreter");
        Self::build(
            Host::Attached { machine, entity },
            rand,
            constraints,
            Some(call_stack),
            0,
        )
    }

    /// Interpreter over a scratch pool with no machine access.
    pub fn detached(
        pool: &'m mut NodePool,
        rand: RandomStream,
        constraints: Option<PerformanceConstraints>,
    ) -> Self {
        Self::build(Host::Detached { pool }, rand, constraints, None, 0)
    }

    /// Detached interpreter sharing an exported call stack; frames below
    /// `unique_access_start_depth` belong to the spawning interpreter.
    pub fn detached_with_stack(
        pool: &'m mut NodePool,
        rand: RandomStream,
        constraints: Option<PerformanceConstraints>,
        call_stack: NodeId,
        unique_access_start_depth: usize,
    ) -> Self {
        Self::build(
            Host::Detached { pool },
            rand,
            constraints,
            Some(call_stack),
            unique_access_start_depth,
        )
    }

    fn build(
        mut host: Host<'m>,
        rand: RandomStream,
        constraints: Option<PerformanceConstraints>,
        call_stack: Option<NodeId>,
        unique_access_start_depth: usize,
    ) -> Self {
        let pool = host_pool_mut(&mut host);

        let call_stack = match call_stack {
            Some(cs) => cs,
            None => {
                let cs = pool.alloc(Opcode::List);
                let frame = pool.alloc(Opcode::Assoc);
                pool.append_child(cs, frame);
                cs
            }
        };
        // the stacks are mutated while live, so everything on them must be
        // walked with cycle checks
        pool.set_cycle_check(call_stack, true);
        for frame in pool.children(call_stack) {
            pool.set_cycle_check(frame, true);
        }
        let interp_stack = pool.alloc(Opcode::List);
        pool.set_cycle_check(interp_stack, true);
        let construction_stack = pool.alloc(Opcode::List);
        pool.set_cycle_check(construction_stack, true);

        // pin for the life of the interpreter
        pool.keep(call_stack);
        pool.keep(interp_stack);
        pool.keep(construction_stack);

        Self {
            host,
            rand,
            constraints,
            call_stack,
            interp_stack,
            construction_stack,
            construction_meta: Vec::new(),
            unique_access_start_depth,
        }
    }

    // ---- host access ---------------------------------------------------

    pub fn pool(&self) -> &NodePool {
        match &self.host {
            Host::Attached { machine, entity } => machine.entities.pool(*entity),
            Host::Detached { pool } => pool,
        }
    }

    pub fn pool_mut(&mut self) -> &mut NodePool {
        host_pool_mut(&mut self.host)
    }

    pub fn strings(&self) -> Arc<StringPool> {
        Arc::clone(self.pool().strings())
    }

    pub fn cur_entity(&self) -> Option<EntityId> {
        match &self.host {
            Host::Attached { entity, .. } => Some(*entity),
            Host::Detached { .. } => None,
        }
    }

    pub fn machine_mut(&mut self) -> Option<&mut Machine> {
        match &mut self.host {
            Host::Attached { machine, .. } => Some(machine),
            Host::Detached { .. } => None,
        }
    }

    pub fn machine_and_entity(&mut self) -> Option<(&mut Machine, EntityId)> {
        match &mut self.host {
            Host::Attached { machine, entity } => Some((machine, *entity)),
            Host::Detached { .. } => None,
        }
    }

    // ---- entry point ---------------------------------------------------

    /// Evaluate `node` to completion, then tear down the stacks. Any
    /// control result escaping to the top unwraps to its payload.
    pub fn execute(self, node: Option<NodeId>, immediate: bool) -> NodeRef {
        self.execute_counting(node, immediate).0
    }

    /// As [`Interpreter::execute`], also reporting the execution steps
    /// charged against this interpreter's budget.
    pub fn execute_counting(mut self, node: Option<NodeId>, immediate: bool) -> (NodeRef, u64) {
        let steps_before = self
            .constraints
            .as_ref()
            .map(|c| c.cur_execution_step)
            .unwrap_or(0);

        let value = self.interpret(node, immediate).into_value();
        let result = self.value_to_node(value);

        let steps_after = self
            .constraints
            .as_ref()
            .map(|c| c.cur_execution_step)
            .unwrap_or(0);

        let call_stack = self.call_stack;
        let interp_stack = self.interp_stack;
        let construction_stack = self.construction_stack;
        let pool = self.pool_mut();
        pool.release_kept(call_stack);
        pool.release_kept(interp_stack);
        pool.release_kept(construction_stack);
        pool.free_node(interp_stack);
        pool.free_node(construction_stack);

        (result, steps_after.saturating_sub(steps_before))
    }

    // ---- per-node evaluation -------------------------------------------

    /// Evaluate one node: pin it, tick the pool, charge the budget, and
    /// dispatch. Returns null the moment any budget is spent.
    pub fn interpret(&mut self, node: Option<NodeId>, immediate: bool) -> Eval {
        let Some(id) = node else {
            return Eval::null();
        };
        if self.pool().opcode(id) == Opcode::Null && !self.pool().node(id).has_labels() {
            return Eval::null();
        }

        let interp_stack = self.interp_stack;
        self.pool_mut().append_child(interp_stack, id);
        self.pool_mut().tick();

        if self.charge_step_and_check_exhaustion() {
            self.pool_mut().pop_child(interp_stack);
            return Eval::null();
        }

        let handler = DISPATCH[self.pool().opcode(id).index()];
        let result = handler(self, id, immediate);

        self.pool_mut().pop_child(interp_stack);
        result
    }

    /// Evaluate an operand, coercing any control result to its payload.
    pub fn interpret_value(&mut self, node: Option<NodeId>, immediate: bool) -> ValueRef {
        self.interpret(node, immediate).into_value()
    }

    /// Evaluate an operand into a node reference.
    pub fn interpret_node_ref(&mut self, node: Option<NodeId>) -> NodeRef {
        let value = self.interpret_value(node, false);
        self.value_to_node(value)
    }

    fn charge_step_and_check_exhaustion(&mut self) -> bool {
        let used = self.pool().used_count();
        let depth = self.pool().child_count(self.interp_stack);
        match &mut self.constraints {
            Some(constraints) => {
                if constraints.exhausted(used, depth) {
                    return true;
                }
                constraints.cur_execution_step += 1;
                false
            }
            None => false,
        }
    }

    /// Current opcode execution depth (length of the interpreter-node
    /// stack).
    pub fn opcode_depth(&self) -> usize {
        self.pool().child_count(self.interp_stack)
    }

    // ---- GC pinning for handler intermediates --------------------------

    /// Pin a node the handler holds across further evaluation. Must be
    /// paired with [`Interpreter::unpin`].
    pub fn pin(&mut self, id: NodeId) {
        let interp_stack = self.interp_stack;
        self.pool_mut().append_child(interp_stack, id);
    }

    pub fn unpin(&mut self, count: usize) {
        let interp_stack = self.interp_stack;
        for _ in 0..count {
            self.pool_mut().pop_child(interp_stack);
        }
    }

    // ---- call stack ----------------------------------------------------

    pub fn call_frames(&self) -> Vec<NodeId> {
        self.pool().children(self.call_stack)
    }

    pub fn top_call_frame(&self) -> NodeId {
        *self
            .call_frames()
            .last()
            .expect("call stack always has one frame")
    }

    pub fn push_call_frame(&mut self, frame: NodeId) {
        let call_stack = self.call_stack;
        self.pool_mut().set_cycle_check(frame, true);
        self.pool_mut().append_child(call_stack, frame);
    }

    pub fn pop_call_frame(&mut self) -> Option<NodeId> {
        let call_stack = self.call_stack;
        if self.pool().child_count(call_stack) <= 1 {
            return None;
        }
        self.pool_mut().pop_child(call_stack)
    }

    /// Find a symbol by walking frames top-down. In shared evaluation the
    /// walkable range is restricted: `include_unique_access` gates the
    /// frames this interpreter owns, `include_shared_access` the frames
    /// shared with the spawning interpreter.
    pub fn lookup_symbol(
        &self,
        sid: StringId,
        include_unique_access: bool,
        include_shared_access: bool,
    ) -> Option<(NodeId, usize)> {
        let frames = self.call_frames();
        let highest = if include_unique_access {
            frames.len()
        } else {
            self.unique_access_start_depth.min(frames.len())
        };
        let lowest = if include_shared_access {
            0
        } else {
            self.unique_access_start_depth
        };
        for index in (lowest..highest).rev() {
            if self.pool().assoc_get(frames[index], sid).is_some() {
                return Some((frames[index], index));
            }
        }
        None
    }

    /// The node bound to `sid`, if any frame binds it.
    pub fn symbol_value(&self, sid: StringId) -> Option<NodeId> {
        let (frame, _) = self.lookup_symbol(sid, true, true)?;
        self.pool().assoc_get(frame, sid)
    }

    /// Assign to an existing binding, or create one in the top frame.
    pub fn set_symbol(&mut self, sid: StringId, value: NodeId) {
        let frame = match self.lookup_symbol(sid, true, true) {
            Some((frame, _)) => frame,
            None => self.top_call_frame(),
        };
        let key = self.strings().acquire(sid);
        // the displaced value may be shared; it is left to the collector
        self.pool_mut().assoc_insert_handoff(frame, key, value);
    }

    /// Create a binding in the top frame only if the symbol is unbound
    /// there. Returns false when the binding already existed.
    pub fn declare_symbol(&mut self, sid: StringId, value: NodeId) -> bool {
        let frame = self.top_call_frame();
        if self.pool().assoc_get(frame, sid).is_some() {
            return false;
        }
        let key = self.strings().acquire(sid);
        self.pool_mut().assoc_insert_handoff(frame, key, value);
        true
    }

    /// Wrap an evaluated argument assoc into a fresh single-frame call
    /// stack. Shared args are deep-copied so the callee owns its frame.
    pub fn convert_args_to_call_stack(pool: &mut NodePool, args: NodeRef) -> NodeRef {
        let frame = match args.id {
            Some(id) if pool.opcode(id) == Opcode::Assoc => {
                if args.unique {
                    id
                } else {
                    pool.deep_copy(id)
                }
            }
            Some(other) => {
                // non-assoc arguments are dropped, matching load-time thunks
                // that are called with no usable args
                let _ = other;
                pool.alloc(Opcode::Assoc)
            }
            None => pool.alloc(Opcode::Assoc),
        };
        let call_stack = pool.alloc(Opcode::List);
        pool.append_child(call_stack, frame);
        pool.set_cycle_check(call_stack, true);
        pool.set_cycle_check(frame, true);
        NodeRef::new(call_stack, true)
    }

    // ---- value shaping -------------------------------------------------

    /// Materialize a value as a node, allocating for immediates. A string
    /// immediate hands its reference to the node.
    pub fn value_to_node(&mut self, value: ValueRef) -> NodeRef {
        match value {
            ValueRef::Node(r) => r,
            ValueRef::Imm(Immediate::Number(v)) => {
                NodeRef::new(self.pool_mut().alloc_number(v), true)
            }
            ValueRef::Imm(Immediate::Bool(b)) => NodeRef::new(self.pool_mut().alloc_bool(b), true),
            ValueRef::Imm(Immediate::Str(sid)) => {
                NodeRef::new(self.pool_mut().alloc_string_handoff(sid), true)
            }
        }
    }

    /// Release whatever `value` owns without converting it.
    pub fn discard_value(&mut self, value: ValueRef) {
        match value {
            ValueRef::Node(r) => self.pool_mut().free_tree_if_possible(r),
            ValueRef::Imm(Immediate::Str(sid)) => self.strings().release(sid),
            ValueRef::Imm(_) => {}
        }
    }

    // ---- entity addressing ---------------------------------------------

    /// Evaluate an id-path operand into path segments. An empty segment
    /// list addresses the current entity; `None` means the operand was not
    /// usable as a path.
    pub fn entity_path_segments(&mut self, node: Option<NodeId>) -> Option<Vec<String>> {
        let r = self.interpret_node_ref(node);
        let Some(id) = r.id else {
            return Some(Vec::new());
        };
        let segments = match self.pool().opcode(id) {
            Opcode::Null => Some(Vec::new()),
            Opcode::List => {
                let mut segments = Vec::new();
                for child in self.pool().children(id) {
                    match sylva_tree::tree_ops::immediate_to_string(self.pool(), child) {
                        Some(s) => segments.push(s),
                        None => return None,
                    }
                }
                Some(segments)
            }
            _ => sylva_tree::tree_ops::immediate_to_string(self.pool(), id).map(|s| vec![s]),
        };
        self.pool_mut().free_tree_if_possible(r);
        segments
    }

    /// Resolve an id-path operand to an entity, starting at the current
    /// entity. Detached interpreters resolve nothing.
    pub fn resolve_entity(&mut self, node: Option<NodeId>) -> Option<EntityId> {
        let segments = self.entity_path_segments(node)?;
        let (machine, entity) = self.machine_and_entity()?;
        machine.entities.resolve_path(entity, &segments)
    }
}

fn host_pool_mut<'a>(host: &'a mut Host<'_>) -> &'a mut NodePool {
    match host {
        Host::Attached { machine, entity } => machine.entities.pool_mut(*entity),
        Host::Detached { pool } => pool,
    }
}
