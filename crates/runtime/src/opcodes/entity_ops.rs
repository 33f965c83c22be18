//! Entity lifecycle, entity access, and asset opcodes.
//!
//! All of these require an attached interpreter; under detached (parallel
//! fan-out) evaluation they return null. Asset opcodes additionally
//! require the current entity to hold root permission.

use tracing::debug;

use sylva_tree::{NodeId, NodeRef, Opcode};

use crate::constraints::{ConstraintParams, PerformanceConstraints};
use crate::entity::{find_labeled_node, EntityId};
use crate::interpreter::Interpreter;
use crate::listener::{WriteEvent, WriteEventKind};
use crate::machine::{LoadEntityParams, Machine};
use crate::opcodes::{
    accum_in_pool, bool_result, number_result, operands, overwrite_node_value_in, string_result,
};
use crate::value::{Eval, ValueRef};

/// Whether the current entity may use the privileged asset surface.
fn has_root_permission(it: &mut Interpreter) -> bool {
    match it.machine_and_entity() {
        Some((machine, entity)) => machine
            .assets
            .as_ref()
            .map(|assets| assets.has_root_permission(entity))
            .unwrap_or(false),
        None => false,
    }
}

pub(crate) fn op_create_entities(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    if it.cur_entity().is_none() || ops.is_empty() {
        return Eval::null();
    }

    let pairs: Vec<(Option<NodeId>, NodeId)> = if ops.len() == 1 {
        vec![(None, ops[0])]
    } else {
        ops.chunks(2)
            .filter(|chunk| chunk.len() == 2)
            .map(|chunk| (Some(chunk[0]), chunk[1]))
            .collect()
    };

    let limits = it.constraints.clone();
    let mut created_names: Vec<Option<String>> = Vec::new();

    for (dest, code) in pairs {
        let segments = match dest {
            Some(d) => it.entity_path_segments(Some(d)),
            None => Some(Vec::new()),
        };
        let Some(mut segments) = segments else {
            created_names.push(None);
            continue;
        };
        let requested_name = segments.pop();
        let root = it.interpret_node_ref(Some(code));

        let name = create_one_entity(it, &segments, requested_name, root, limits.as_ref());
        created_names.push(name);
    }

    let list = it.pool_mut().alloc(Opcode::List);
    for name in created_names {
        let child = match name {
            Some(name) => it.pool_mut().alloc_string(&name),
            None => it.pool_mut().alloc_null(),
        };
        it.pool_mut().append_child(list, child);
    }
    Eval::Value(ValueRef::node(list, true))
}

fn create_one_entity(
    it: &mut Interpreter,
    container_path: &[String],
    requested_name: Option<String>,
    root: NodeRef,
    limits: Option<&PerformanceConstraints>,
) -> Option<String> {
    let (machine, cur) = it.machine_and_entity()?;
    let container = machine.entities.resolve_path(cur, container_path)?;

    let name =
        requested_name.unwrap_or_else(|| machine.entities.unused_contained_name(container));

    if let Some(limits) = limits {
        let base = limits
            .entity_to_constrain_from
            .filter(|&e| machine.entities.exists(e))
            .unwrap_or(container);
        if limits.constrain_contained_entities
            && machine.entities.total_contained(base) >= limits.max_contained_entities
        {
            debug!(%name, "entity creation refused: contained-entity budget");
            return None;
        }
        if limits.constrain_contained_entity_depth {
            let depth = machine.entities.depth_below(base, container).unwrap_or(0) + 1;
            if depth > limits.max_contained_entity_depth {
                debug!(%name, "entity creation refused: entity depth budget");
                return None;
            }
        }
        if limits.max_entity_id_length > 0 && name.len() > limits.max_entity_id_length {
            debug!(%name, "entity creation refused: id length budget");
            return None;
        }
    }

    let seed = machine
        .entities
        .entity_mut(container)
        .rand
        .substream_advancing(&name)
        .state_string();
    let new_entity = machine.entities.create(&name, &seed);
    if let Some(root_id) = root.id {
        let imported = machine.entities.import_tree(cur, root_id, new_entity);
        machine.entities.set_root(new_entity, Some(imported));
    }
    machine.entities.add_contained(container, &name, new_entity);
    machine.notify_write(WriteEvent {
        entity: new_entity,
        kind: WriteEventKind::Created,
    });
    machine.with_assets(|m, a| a.entity_created(m, new_entity));
    Some(name)
}

fn clone_entity_recursive(
    machine: &mut Machine,
    source: EntityId,
    name: &str,
    seed: &str,
) -> EntityId {
    let clone = machine.entities.create(name, seed);
    let root = machine.entities.entity(source).root;
    if let Some(root) = root {
        let imported = machine.entities.import_tree(source, root, clone);
        machine.entities.set_root(clone, Some(imported));
    }
    let children: Vec<(String, EntityId)> = machine
        .entities
        .entity(source)
        .contained
        .iter()
        .map(|(n, &e)| (n.clone(), e))
        .collect();
    for (child_name, child) in children {
        let child_seed = machine.entities.entity(child).rand.state_string();
        let child_clone = clone_entity_recursive(machine, child, &child_name, &child_seed);
        machine.entities.add_contained(clone, &child_name, child_clone);
    }
    clone
}

pub(crate) fn op_clone_entities(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    let mut created: Vec<Option<String>> = Vec::new();

    let mut index = 0;
    while index < ops.len() {
        let source = it.resolve_entity(ops.get(index).copied());
        let dest_segments = match ops.get(index + 1) {
            Some(&d) => it.entity_path_segments(Some(d)),
            None => Some(Vec::new()),
        };
        index += 2;

        let name = (|| {
            let source = source?;
            let mut segments = dest_segments?;
            let requested = segments.pop();
            let (machine, cur) = it.machine_and_entity()?;
            let container = machine.entities.resolve_path(cur, &segments)?;
            let name = requested
                .unwrap_or_else(|| machine.entities.unused_contained_name(container));
            let seed = machine
                .entities
                .entity_mut(container)
                .rand
                .substream_advancing(&name)
                .state_string();
            let clone = clone_entity_recursive(machine, source, &name, &seed);
            machine.entities.add_contained(container, &name, clone);
            machine.notify_write(WriteEvent {
                entity: clone,
                kind: WriteEventKind::Cloned { from: source },
            });
            machine.with_assets(|m, a| a.entity_created(m, clone));
            Some(name)
        })();
        created.push(name);
    }

    let list = it.pool_mut().alloc(Opcode::List);
    for name in created {
        let child = match name {
            Some(name) => it.pool_mut().alloc_string(&name),
            None => it.pool_mut().alloc_null(),
        };
        it.pool_mut().append_child(list, child);
    }
    Eval::Value(ValueRef::node(list, true))
}

pub(crate) fn op_move_entities(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    let mut moved_any = false;

    let mut index = 0;
    while index + 1 < ops.len() {
        let source = it.resolve_entity(Some(ops[index]));
        let dest_segments = it.entity_path_segments(Some(ops[index + 1]));
        index += 2;

        let ok = (|| {
            let source = source?;
            let mut segments = dest_segments?;
            let requested = segments.pop();
            let (machine, cur) = it.machine_and_entity()?;
            if source == cur {
                return None;
            }
            let container = machine.entities.resolve_path(cur, &segments)?;
            let name =
                requested.unwrap_or_else(|| machine.entities.entity(source).id.clone());
            // drop any on-disk mirror at the old location first
            machine.with_assets(|m, a| a.entity_destroyed(m, source));
            machine.entities.remove_contained(source);
            machine.entities.add_contained(container, &name, source);
            machine.notify_write(WriteEvent {
                entity: source,
                kind: WriteEventKind::Moved,
            });
            machine.with_assets(|m, a| a.entity_created(m, source));
            Some(())
        })();
        moved_any |= ok.is_some();
    }
    bool_result(it, moved_any, false)
}

pub(crate) fn op_destroy_entities(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let mut all_ok = true;
    for op in ops {
        let target = it.resolve_entity(Some(op));
        let ok = (|| {
            let target = target?;
            let (machine, cur) = it.machine_and_entity()?;
            if target == cur {
                return None;
            }
            machine.with_assets(|m, a| a.entity_destroyed(m, target));
            machine.notify_write(WriteEvent {
                entity: target,
                kind: WriteEventKind::Destroyed,
            });
            machine.entities.destroy(target);
            Some(())
        })();
        all_ok &= ok.is_some();
    }
    bool_result(it, all_ok, immediate)
}

pub(crate) fn op_load(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    if !has_root_permission(it) {
        return Eval::null();
    }
    let Some(path) = it.interpret_into_string(ops.first().copied()) else {
        return Eval::null();
    };
    let format = it
        .interpret_into_string(ops.get(1).copied())
        .unwrap_or_default();

    let Some((machine, cur)) = it.machine_and_entity() else {
        return Eval::null();
    };
    let loaded = machine.with_assets(|m, a| a.load_resource(m, cur, &path, &format));
    match loaded {
        Some((r, status)) if status.loaded => Eval::Value(ValueRef::Node(r)),
        Some((_, status)) => {
            debug!(%path, message = %status.message, "load failed");
            Eval::null()
        }
        None => Eval::null(),
    }
}

pub(crate) fn op_load_entity(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    if !has_root_permission(it) {
        return Eval::null();
    }
    let Some(path) = it.interpret_into_string(ops.first().copied()) else {
        return Eval::null();
    };
    let dest_segments = match ops.get(1) {
        Some(&d) => it.entity_path_segments(Some(d)),
        None => Some(Vec::new()),
    };
    let seed = it
        .interpret_into_string(ops.get(2).copied())
        .unwrap_or_default();
    let persistent = it.pool().opcode(node) == Opcode::LoadPersistentEntity;

    let params = LoadEntityParams {
        path: path.clone(),
        format_hint: String::new(),
        persistent,
        load_contained: true,
        escape_root: false,
        escape_contained: true,
        default_seed: seed,
    };

    let name = (|| {
        let mut segments = dest_segments?;
        let requested = segments.pop();
        let (machine, cur) = it.machine_and_entity()?;
        let container = machine.entities.resolve_path(cur, &segments)?;
        let (loaded, status) = machine.with_assets(|m, a| a.load_entity(m, &params))?;
        let Some(loaded) = loaded else {
            debug!(path = %params.path, message = %status.message, "load_entity failed");
            return None;
        };
        let name =
            requested.unwrap_or_else(|| machine.entities.unused_contained_name(container));
        machine.entities.add_contained(container, &name, loaded);
        machine.notify_write(WriteEvent {
            entity: loaded,
            kind: WriteEventKind::Created,
        });
        Some(name)
    })();

    match name {
        Some(name) => string_result(it, &name, false),
        None => Eval::null(),
    }
}

pub(crate) fn op_store(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    if !has_root_permission(it) {
        return Eval::null();
    }
    let Some(path) = it.interpret_into_string(ops.first().copied()) else {
        return Eval::null();
    };
    let code = it.interpret_node_ref(ops.get(1).copied());
    if let Some(code_id) = code.id {
        it.pin(code_id);
    }
    let format = it
        .interpret_into_string(ops.get(2).copied())
        .unwrap_or_default();
    if code.id.is_some() {
        it.unpin(1);
    }

    let stored = (|| {
        let (machine, cur) = it.machine_and_entity()?;
        machine.with_assets(|m, a| a.store_resource(m, cur, code.id, &path, &format))
    })()
    .unwrap_or(false);
    it.pool_mut().free_tree_if_possible(code);
    bool_result(it, stored, immediate)
}

pub(crate) fn op_store_entity(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    if !has_root_permission(it) {
        return Eval::null();
    }
    let Some(path) = it.interpret_into_string(ops.first().copied()) else {
        return Eval::null();
    };
    let target = match ops.get(1) {
        Some(&t) => it.resolve_entity(Some(t)),
        None => it.cur_entity(),
    };
    let persistent = it.interpret_into_bool(ops.get(2).copied(), false);

    let stored = (|| {
        let target = target?;
        let machine = it.machine_mut()?;
        machine.with_assets(|m, a| a.store_entity(m, target, &path, "", persistent, true))
    })()
    .unwrap_or(false);
    bool_result(it, stored, immediate)
}

pub(crate) fn op_contains_entity(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let found = it.resolve_entity(ops.first().copied()).is_some();
    bool_result(it, found, immediate)
}

pub(crate) fn op_contained_entities(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    let target = match ops.first() {
        Some(&t) => it.resolve_entity(Some(t)),
        None => it.cur_entity(),
    };
    let names: Vec<String> = (|| {
        let target = target?;
        let (machine, _) = it.machine_and_entity()?;
        Some(machine.entities.contained_names(target))
    })()
    .unwrap_or_default();

    let list = it.pool_mut().alloc(Opcode::List);
    for name in names {
        let child = it.pool_mut().alloc_string(&name);
        it.pool_mut().append_child(list, child);
    }
    Eval::Value(ValueRef::node(list, true))
}

pub(crate) fn op_contains_label(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let (path_op, label_op) = if ops.len() >= 2 {
        (Some(ops[0]), ops.get(1).copied())
    } else {
        (None, ops.first().copied())
    };
    let target = match path_op {
        Some(p) => it.resolve_entity(Some(p)),
        None => it.cur_entity(),
    };
    let Some(label) = it.interpret_into_string(label_op) else {
        return bool_result(it, false, immediate);
    };

    let contains = (|| {
        let target = target?;
        let (machine, _) = it.machine_and_entity()?;
        let root = machine.entities.entity(target).root?;
        let sid = machine.strings.id_if_present(&label);
        if !sid.is_string() {
            return None;
        }
        find_labeled_node(machine.entities.pool(target), root, sid)
    })()
    .is_some();
    bool_result(it, contains, immediate)
}

pub(crate) fn op_assign_to_entities(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let accumulate = it.pool().opcode(node) == Opcode::AccumToEntities;
    let (path_op, assoc_op) = if ops.len() >= 2 {
        (Some(ops[0]), Some(ops[1]))
    } else {
        (None, ops.first().copied())
    };
    let target = match path_op {
        Some(p) => it.resolve_entity(Some(p)),
        None => it.cur_entity(),
    };
    let Some(target) = target else {
        return bool_result(it, false, immediate);
    };

    let assignments = it.interpret_node_ref(assoc_op);
    let Some(assignments_id) = assignments.id else {
        return bool_result(it, false, immediate);
    };
    if it.pool().opcode(assignments_id) != Opcode::Assoc {
        it.pool_mut().free_tree_if_possible(assignments);
        return bool_result(it, false, immediate);
    }
    let pairs: Vec<(String, NodeId)> = it
        .pool()
        .assoc(assignments_id)
        .iter()
        .map(|(&k, &v)| (it.strings().resolve_or_empty(k), v))
        .collect();

    it.note_side_effect();
    let mut all_ok = true;
    let mut mutated = false;
    if let Some((machine, cur)) = it.machine_and_entity() {
        for (label, value) in pairs {
            let sid = machine.strings.id_if_present(&label);
            let labeled = machine
                .entities
                .entity(target)
                .root
                .filter(|_| sid.is_string())
                .and_then(|root| find_labeled_node(machine.entities.pool(target), root, sid));
            let Some(labeled) = labeled else {
                all_ok = false;
                continue;
            };
            let imported = if target == cur {
                machine.entities.pool_mut(cur).deep_copy(value)
            } else {
                machine.entities.import_tree(cur, value, target)
            };
            if accumulate {
                accum_in_pool(machine.entities.pool_mut(target), labeled, imported);
            } else {
                overwrite_node_value_in(machine.entities.pool_mut(target), labeled, imported);
            }
            mutated = true;
            let kind = if accumulate {
                WriteEventKind::AccumToLabel { label }
            } else {
                WriteEventKind::AssignToLabel { label }
            };
            machine.notify_write(WriteEvent {
                entity: target,
                kind,
            });
        }
        if mutated {
            machine.with_assets(|m, a| a.entity_updated(m, target));
        }
    } else {
        all_ok = false;
    }

    it.pool_mut().free_tree_if_possible(assignments);
    bool_result(it, all_ok, immediate)
}

pub(crate) fn op_retrieve_from_entity(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    let (path_op, label_op) = if ops.len() >= 2 {
        (Some(ops[0]), ops.get(1).copied())
    } else {
        (None, ops.first().copied())
    };
    let target = match path_op {
        Some(p) => it.resolve_entity(Some(p)),
        None => it.cur_entity(),
    };
    let Some(label) = it.interpret_into_string(label_op) else {
        return Eval::null();
    };

    let imported = (|| {
        let target = target?;
        let (machine, cur) = it.machine_and_entity()?;
        let root = machine.entities.entity(target).root?;
        let sid = machine.strings.id_if_present(&label);
        if !sid.is_string() {
            return None;
        }
        let labeled = find_labeled_node(machine.entities.pool(target), root, sid)?;
        let imported = if target == cur {
            machine.entities.pool_mut(cur).deep_copy(labeled)
        } else {
            machine.entities.import_tree(target, labeled, cur)
        };
        Some(imported)
    })();

    match imported {
        Some(id) => {
            it.pool_mut().clear_metadata(id);
            Eval::Value(ValueRef::node(id, true))
        }
        None => Eval::null(),
    }
}

/// Shared body of `call_entity` and `call_container`.
fn call_entity_common(
    it: &mut Interpreter,
    target: Option<EntityId>,
    label: Option<String>,
    args_op: Option<NodeId>,
    constraint_ops: &[NodeId],
) -> Eval {
    let Some(target) = target else {
        return Eval::null();
    };
    let Some(label) = label else {
        return Eval::null();
    };
    let args = it.interpret_node_ref(args_op);
    if let Some(args_id) = args.id {
        it.pin(args_id);
    }

    // compose the callee's budget from ours
    let mut params: ConstraintParams = [None; 6];
    for (slot, param) in params.iter_mut().enumerate() {
        if let Some(&p) = constraint_ops.get(slot) {
            let v = it.interpret_into_number(Some(p));
            if !v.is_nan() {
                *param = Some(v);
            }
        }
    }
    if args.id.is_some() {
        it.unpin(1);
    }
    let requested = PerformanceConstraints::from_values(&params, true);
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

    let imported = (|| {
        let (machine, cur) = it.machine_and_entity()?;
        if !machine.entities.exists(target) {
            return None;
        }
        let mut composed = composed;
        if let Some(c) = &mut composed {
            c.entity_to_constrain_from = Some(target);
        }

        let args_in_target = match args.id {
            Some(a) if target != cur => {
                Some(machine.entities.import_tree(cur, a, target))
            }
            Some(a) => Some(a),
            None => None,
        };
        let call_stack = {
            let pool = machine.entities.pool_mut(target);
            let args_ref = match args_in_target {
                Some(a) => NodeRef::new(a, target != cur || args.unique),
                None => NodeRef::null(),
            };
            Interpreter::convert_args_to_call_stack(pool, args_ref)
        };
        let result = machine.execute_entity(target, Some(&label), call_stack.id, composed);
        let result_id = result.id?;
        if target != cur {
            Some(machine.entities.import_tree(target, result_id, cur))
        } else {
            Some(result_id)
        }
    })();

    match imported {
        Some(id) => Eval::Value(ValueRef::node(id, true)),
        None => Eval::null(),
    }
}

pub(crate) fn op_call_entity(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    let get_changes = it.pool().opcode(node) == Opcode::CallEntityGetChanges;
    let target = it.resolve_entity(ops.first().copied());
    let label = it.interpret_into_string(ops.get(1).copied());

    if get_changes {
        if let Some(machine) = it.machine_mut() {
            machine.begin_recording();
        }
    }

    let result = call_entity_common(
        it,
        target,
        label,
        ops.get(2).copied(),
        ops.get(3..).unwrap_or(&[]),
    );

    if !get_changes {
        return result;
    }

    // wrap the result with the recorded change descriptions
    let events = it
        .machine_mut()
        .map(|machine| machine.end_recording())
        .unwrap_or_default();
    let changes: Vec<String> = events
        .iter()
        .map(|event| format!("{:?} {:?}", event.kind, event.entity))
        .collect();

    let result_node = it.value_to_node(result.into_value());
    let list = it.pool_mut().alloc(Opcode::List);
    let result_id = match result_node.id {
        Some(id) => id,
        None => it.pool_mut().alloc_null(),
    };
    it.pool_mut().append_child(list, result_id);
    let changes_node = it.pool_mut().alloc(Opcode::List);
    for change in changes {
        let s = it.pool_mut().alloc_string(&change);
        it.pool_mut().append_child(changes_node, s);
    }
    it.pool_mut().append_child(list, changes_node);
    Eval::Value(ValueRef::node(list, true))
}

pub(crate) fn op_call_container(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    let container = (|| {
        let (machine, cur) = it.machine_and_entity()?;
        machine.entities.container_of(cur)
    })();
    let label = it.interpret_into_string(ops.first().copied());
    call_entity_common(
        it,
        container,
        label,
        ops.get(1).copied(),
        ops.get(2..).unwrap_or(&[]),
    )
}

pub(crate) fn op_retrieve_entity_root(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    let target = match ops.first() {
        Some(&t) => it.resolve_entity(Some(t)),
        None => it.cur_entity(),
    };
    let imported = (|| {
        let target = target?;
        let (machine, cur) = it.machine_and_entity()?;
        let root = machine.entities.entity(target).root?;
        Some(if target == cur {
            machine.entities.pool_mut(cur).deep_copy(root)
        } else {
            machine.entities.import_tree(target, root, cur)
        })
    })();
    match imported {
        Some(id) => Eval::Value(ValueRef::node(id, true)),
        None => Eval::null(),
    }
}

pub(crate) fn op_assign_entity_roots(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let accumulate = it.pool().opcode(node) == Opcode::AccumEntityRoots;
    let (path_op, code_op) = if ops.len() >= 2 {
        (Some(ops[0]), Some(ops[1]))
    } else {
        (None, ops.first().copied())
    };
    let target = match path_op {
        Some(p) => it.resolve_entity(Some(p)),
        None => it.cur_entity(),
    };
    let code = it.interpret_node_ref(code_op);

    let ok = (|| {
        let target = target?;
        let (machine, cur) = it.machine_and_entity()?;
        let imported = match code.id {
            Some(c) if target != cur => Some(machine.entities.import_tree(cur, c, target)),
            Some(c) => Some(machine.entities.pool_mut(cur).deep_copy(c)),
            None => None,
        };
        if accumulate {
            match (machine.entities.entity(target).root, imported) {
                (Some(root), Some(addition)) => {
                    accum_in_pool(machine.entities.pool_mut(target), root, addition);
                }
                (None, Some(addition)) => machine.entities.set_root(target, Some(addition)),
                _ => {}
            }
        } else {
            machine.entities.set_root(target, imported);
        }
        machine.notify_write(WriteEvent {
            entity: target,
            kind: WriteEventKind::RootReplaced,
        });
        machine.with_assets(|m, a| a.entity_updated(m, target));
        Some(())
    })()
    .is_some();
    bool_result(it, ok, immediate)
}

pub(crate) fn op_get_entity_rand_seed(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let target = match ops.first() {
        Some(&t) => it.resolve_entity(Some(t)),
        None => it.cur_entity(),
    };
    let seed = (|| {
        let target = target?;
        let (machine, _) = it.machine_and_entity()?;
        Some(machine.entities.entity(target).rand.state_string())
    })();
    match seed {
        Some(seed) => string_result(it, &seed, immediate),
        None => Eval::null(),
    }
}

pub(crate) fn op_set_entity_rand_seed(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let (path_op, seed_op) = if ops.len() >= 2 {
        (Some(ops[0]), ops.get(1).copied())
    } else {
        (None, ops.first().copied())
    };
    let target = match path_op {
        Some(p) => it.resolve_entity(Some(p)),
        None => it.cur_entity(),
    };
    let Some(seed) = it.interpret_into_string(seed_op) else {
        return Eval::null();
    };

    let ok = (|| {
        let target = target?;
        let (machine, _) = it.machine_and_entity()?;
        machine.entities.entity_mut(target).rand =
            sylva_foundation::RandomStream::from_state_string(&seed);
        machine.notify_write(WriteEvent {
            entity: target,
            kind: WriteEventKind::SeedSet,
        });
        machine.with_assets(|m, a| a.entity_updated(m, target));
        Some(())
    })()
    .is_some();
    if !ok {
        return Eval::null();
    }
    string_result(it, &seed, immediate)
}

pub(crate) fn op_get_entity_root_permission(
    it: &mut Interpreter,
    node: NodeId,
    immediate: bool,
) -> Eval {
    let ops = operands(it, node);
    let target = match ops.first() {
        Some(&t) => it.resolve_entity(Some(t)),
        None => it.cur_entity(),
    };
    let permitted = (|| {
        let target = target?;
        let machine = it.machine_mut()?;
        machine
            .assets
            .as_ref()
            .map(|assets| assets.has_root_permission(target))
    })()
    .unwrap_or(false);
    bool_result(it, permitted, immediate)
}

pub(crate) fn op_set_entity_root_permission(
    it: &mut Interpreter,
    node: NodeId,
    immediate: bool,
) -> Eval {
    let ops = operands(it, node);
    if !has_root_permission(it) {
        return Eval::null();
    }
    let target = it.resolve_entity(ops.first().copied());
    let permission = it.interpret_into_bool(ops.get(1).copied(), false);
    let ok = (|| {
        let target = target?;
        let machine = it.machine_mut()?;
        machine.with_assets(|m, a| a.set_root_permission(m, target, permission))
    })()
    .is_some();
    bool_result(it, ok, immediate)
}

pub(crate) fn op_get_entity_comments(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let target = match ops.first() {
        Some(&t) => it.resolve_entity(Some(t)),
        None => it.cur_entity(),
    };
    let comments = (|| {
        let target = target?;
        let (machine, _) = it.machine_and_entity()?;
        let root = machine.entities.entity(target).root?;
        machine
            .strings
            .resolve(machine.entities.pool(target).node(root).comments)
    })()
    .unwrap_or_default();
    string_result(it, &comments, immediate)
}

pub(crate) fn op_total_entity_size(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let target = match ops.first() {
        Some(&t) => it.resolve_entity(Some(t)),
        None => it.cur_entity(),
    };
    let size = (|| {
        let target = target?;
        let (machine, _) = it.machine_and_entity()?;
        Some(machine.entities.total_node_size(target) as f64)
    })()
    .unwrap_or(0.0);
    number_result(it, size, immediate)
}
