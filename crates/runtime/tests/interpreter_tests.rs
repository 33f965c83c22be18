//! End-to-end interpreter scenarios.

use std::collections::HashSet;

use sylva_lang::parse;
use sylva_runtime::{
    AssetSystem, EntityId, Interpreter, LoadEntityParams, LoadStatus, Machine,
    PerformanceConstraints, RecordingWriteListener, WriteEventKind,
};
use sylva_tree::tree_ops::{node_to_number, tree_equal};
use sylva_tree::{NodeId, NodeRef, Opcode};

fn machine_with_entity(threads: usize) -> (Machine, sylva_runtime::EntityId) {
    let mut machine = Machine::new(threads);
    let entity = machine.entities.create("test", "seed");
    (machine, entity)
}

/// Asset stub that only tracks root permissions, so the privileged-surface
/// opcodes can be exercised without a loader.
#[derive(Default)]
struct PermissionOnlyAssets {
    permitted: HashSet<EntityId>,
}

impl AssetSystem for PermissionOnlyAssets {
    fn load_resource(
        &mut self,
        _machine: &mut Machine,
        _entity: EntityId,
        _path: &str,
        _format_hint: &str,
    ) -> (NodeRef, LoadStatus) {
        (NodeRef::null(), LoadStatus::failed("no loader installed"))
    }

    fn store_resource(
        &mut self,
        _machine: &mut Machine,
        _entity: EntityId,
        _root: Option<NodeId>,
        _path: &str,
        _format_hint: &str,
    ) -> bool {
        false
    }

    fn load_entity(
        &mut self,
        _machine: &mut Machine,
        _params: &LoadEntityParams,
    ) -> (Option<EntityId>, LoadStatus) {
        (None, LoadStatus::failed("no loader installed"))
    }

    fn store_entity(
        &mut self,
        _machine: &mut Machine,
        _entity: EntityId,
        _path: &str,
        _format_hint: &str,
        _update_persistence: bool,
        _store_contained: bool,
    ) -> bool {
        false
    }

    fn entity_created(&mut self, _machine: &mut Machine, _entity: EntityId) {}

    fn entity_updated(&mut self, _machine: &mut Machine, _entity: EntityId) {}

    fn entity_destroyed(&mut self, _machine: &mut Machine, _entity: EntityId) {}

    fn set_root_permission(&mut self, _machine: &mut Machine, entity: EntityId, permission: bool) {
        if permission {
            self.permitted.insert(entity);
        } else {
            self.permitted.remove(&entity);
        }
    }

    fn has_root_permission(&self, entity: EntityId) -> bool {
        self.permitted.contains(&entity)
    }

    fn is_persistent(&self, _entity: EntityId) -> bool {
        false
    }
}

fn eval(machine: &mut Machine, entity: sylva_runtime::EntityId, source: &str) -> NodeRef {
    let root = parse(source, machine.entities.pool_mut(entity)).expect("test source parses");
    let interpreter = Interpreter::attached(machine, entity);
    interpreter.execute(root.id, false)
}

fn eval_number(machine: &mut Machine, entity: sylva_runtime::EntityId, source: &str) -> f64 {
    let result = eval(machine, entity, source);
    node_to_number(machine.entities.pool(entity), result.id)
}

#[test]
fn test_arithmetic() {
    let (mut machine, entity) = machine_with_entity(0);
    assert_eq!(eval_number(&mut machine, entity, "(+ 1 2 3)"), 6.0);
    assert_eq!(eval_number(&mut machine, entity, "(* 2 (- 10 4))"), 12.0);
    assert_eq!(eval_number(&mut machine, entity, "(/ 9 3)"), 3.0);
    assert!(eval_number(&mut machine, entity, "(+ 1 null)").is_nan());
}

#[test]
fn test_lexical_scope() {
    let (mut machine, entity) = machine_with_entity(0);
    let result = eval(
        &mut machine,
        entity,
        "(let (assoc x 1) (list (let (assoc x 2) x) x))",
    );
    let pool = machine.entities.pool(entity);
    let children = pool.children(result.id.unwrap());
    assert_eq!(pool.number_value(children[0]), 2.0);
    assert_eq!(pool.number_value(children[1]), 1.0);
}

#[test]
fn test_assignment_mutates_binding_frame() {
    let (mut machine, entity) = machine_with_entity(0);
    // the inner assign finds x in the outer frame and mutates it there
    let result = eval_number(
        &mut machine,
        entity,
        "(let (assoc x 1) (seq (let (assoc y 2) (assign x 10)) x))",
    );
    assert_eq!(result, 10.0);
}

#[test]
fn test_while_and_conclude() {
    let (mut machine, entity) = machine_with_entity(0);
    let result = eval_number(
        &mut machine,
        entity,
        "(let (assoc i 0) (while (< i 5) (assign i (+ i 1)) i))",
    );
    assert_eq!(result, 5.0);

    let concluded = eval_number(
        &mut machine,
        entity,
        "(seq 1 (conclude 7) (+ 100 100))",
    );
    assert_eq!(concluded, 7.0);
}

#[test]
fn test_call_with_args() {
    let (mut machine, entity) = machine_with_entity(0);
    let result = eval_number(
        &mut machine,
        entity,
        "(call (lambda (+ x y)) (assoc x 2 y 3))",
    );
    assert_eq!(result, 5.0);
}

#[test]
fn test_map_filter_reduce() {
    let (mut machine, entity) = machine_with_entity(0);
    let mapped = eval(
        &mut machine,
        entity,
        "(map (lambda (* (current_value) 2)) (list 1 2 3))",
    );
    let pool = machine.entities.pool(entity);
    let children = pool.children(mapped.id.unwrap());
    let values: Vec<f64> = children.iter().map(|&c| pool.number_value(c)).collect();
    assert_eq!(values, vec![2.0, 4.0, 6.0]);

    let filtered = eval(
        &mut machine,
        entity,
        "(filter (lambda (> (current_value) 1)) (list 0 1 2 3))",
    );
    let pool = machine.entities.pool(entity);
    assert_eq!(pool.child_count(filtered.id.unwrap()), 2);

    let reduced = eval_number(
        &mut machine,
        entity,
        "(reduce (lambda (+ (previous_result) (current_value))) (list 1 2 3 4))",
    );
    assert_eq!(reduced, 10.0);
}

#[test]
fn test_budget_exhaustion_in_sandbox() {
    let (mut machine, entity) = machine_with_entity(0);
    let source =
        "(list (call_sandboxed (lambda (while true 1)) null 10) 42)";
    let root = parse(source, machine.entities.pool_mut(entity)).unwrap();

    let parent_budget = PerformanceConstraints {
        max_execution_steps: 1000,
        ..Default::default()
    };
    let stack = {
        let pool = machine.entities.pool_mut(entity);
        let stack = pool.alloc(Opcode::List);
        let frame = pool.alloc(Opcode::Assoc);
        pool.append_child(stack, frame);
        stack
    };
    let interpreter =
        Interpreter::attached_with_stack(&mut machine, entity, Some(parent_budget), stack);
    let (result, spent) = interpreter.execute_counting(root.id, false);

    let pool = machine.entities.pool(entity);
    let children = pool.children(result.id.unwrap());
    // the exhausted sandbox yields null; the parent continues
    assert_eq!(pool.opcode(children[0]), Opcode::Null);
    assert_eq!(pool.number_value(children[1]), 42.0);
    // the sandbox charged exactly its 10-step budget, plus the parent's
    // own handful of steps around it
    assert!(spent >= 10, "sandbox steps not charged: {spent}");
    assert!(spent < 30, "sandbox overspent: {spent}");
}

#[test]
fn test_parallel_matches_sequential() {
    let source = "(parallel (+ 1 2) (* 3 4))";

    let (mut machine, entity) = machine_with_entity(2);
    let parallel = eval(&mut machine, entity, source);
    let pool = machine.entities.pool(entity);
    let children = pool.children(parallel.id.unwrap());
    assert_eq!(pool.number_value(children[0]), 3.0);
    assert_eq!(pool.number_value(children[1]), 12.0);

    // with no workers the sequential fallback produces the same output
    let (mut machine, entity) = machine_with_entity(0);
    let sequential = eval(&mut machine, entity, source);
    let pool = machine.entities.pool(entity);
    let children = pool.children(sequential.id.unwrap());
    assert_eq!(pool.number_value(children[0]), 3.0);
    assert_eq!(pool.number_value(children[1]), 12.0);
}

#[test]
fn test_rewrite_preserves_sharing() {
    let (mut machine, entity) = machine_with_entity(0);
    let pool = machine.entities.pool_mut(entity);

    // (rewrite (lambda (current_value)) <list with a shared child>)
    let shared = pool.alloc_number(7.0);
    let tree = pool.alloc(Opcode::List);
    pool.append_child(tree, shared);
    pool.append_child(tree, shared);

    let current_value = pool.alloc(Opcode::CurrentValue);
    let lambda = pool.alloc(Opcode::Lambda);
    pool.append_child(lambda, current_value);
    let rewrite = pool.alloc(Opcode::Rewrite);
    pool.append_child(rewrite, lambda);
    pool.append_child(rewrite, tree);

    let interpreter = Interpreter::attached(&mut machine, entity);
    let result = interpreter.execute(Some(rewrite), false);

    let pool = machine.entities.pool(entity);
    let children = pool.children(result.id.unwrap());
    assert_eq!(children.len(), 2);
    assert_eq!(children[0], children[1], "shared subtree identity lost");
    assert_ne!(children[0], shared, "rewrite returned the original node");
}

#[test]
fn test_assign_to_entities_emits_write_event() {
    let (mut machine, entity) = machine_with_entity(0);
    machine
        .write_listeners
        .push(Box::new(RecordingWriteListener::default()));

    let root = parse("(list #score 1)", machine.entities.pool_mut(entity)).unwrap();
    machine.entities.set_root(entity, root.id);

    machine.begin_recording();
    let ok = eval(&mut machine, entity, "(assign_to_entities (assoc score 42))");
    let events = machine.end_recording();

    let pool = machine.entities.pool(entity);
    assert_eq!(pool.opcode(ok.id.unwrap()), Opcode::True);
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].kind,
        WriteEventKind::AssignToLabel {
            label: "score".to_string()
        }
    );

    // the labeled node now carries the new value and keeps its label
    let retrieved = eval_number(&mut machine, entity, "(retrieve_from_entity score)");
    assert_eq!(retrieved, 42.0);
}

#[test]
fn test_create_and_call_contained_entity() {
    let (mut machine, entity) = machine_with_entity(0);
    let created = eval(
        &mut machine,
        entity,
        r#"(create_entities "child" (lambda (list #double (* x 2))))"#,
    );
    let pool = machine.entities.pool(entity);
    let names = pool.children(created.id.unwrap());
    assert_eq!(pool.string_value(names[0]).as_deref(), Some("child"));

    let result = eval_number(
        &mut machine,
        entity,
        r#"(call_entity "child" "double" (assoc x 21))"#,
    );
    assert_eq!(result, 42.0);
}

#[test]
fn test_coercion_neutrality() {
    let (mut machine, entity) = machine_with_entity(0);
    let source_node = {
        let pool = machine.entities.pool_mut(entity);
        pool.alloc_string("12.5")
    };

    let mut interpreter = Interpreter::attached(&mut machine, entity);
    let once = interpreter.interpret_into_number(Some(source_node));
    let once_node = interpreter.pool_mut().alloc_number(once);
    let twice = interpreter.interpret_into_number(Some(once_node));
    assert_eq!(once, twice);

    let text_once = interpreter.interpret_into_string(Some(once_node)).unwrap();
    let text_node = interpreter.pool_mut().alloc_string(&text_once);
    let text_twice = interpreter.interpret_into_string(Some(text_node)).unwrap();
    assert_eq!(text_once, text_twice);
}

#[test]
fn test_get_set_structural_access() {
    let (mut machine, entity) = machine_with_entity(0);
    let value = eval_number(
        &mut machine,
        entity,
        r#"(get (assoc a (list 10 20 30)) (list "a" 1))"#,
    );
    assert_eq!(value, 20.0);

    let updated = eval(
        &mut machine,
        entity,
        r#"(set (assoc a 1) "a" 2)"#,
    );
    let expected = parse("(assoc a 2)", machine.entities.pool_mut(entity)).unwrap();
    assert!(tree_equal(
        machine.entities.pool(entity),
        updated.id,
        expected.id
    ));
}

#[test]
fn test_deterministic_rand_streams() {
    let run = |source: &str| -> f64 {
        let mut machine = Machine::new(0);
        let entity = machine.entities.create("e", "fixed-seed");
        eval_number(&mut machine, entity, source)
    };
    let a = run("(rand 100)");
    let b = run("(rand 100)");
    assert_eq!(a, b, "same entity seed must give the same draws");
}

#[test]
fn test_apply_builds_and_evaluates() {
    let (mut machine, entity) = machine_with_entity(0);
    let result = eval_number(&mut machine, entity, r#"(apply "+" (list 1 2 3))"#);
    assert_eq!(result, 6.0);
}

#[test]
fn test_pin_safety_across_collection() {
    let (mut machine, entity) = machine_with_entity(0);
    machine.entities.pool_mut(entity).set_collect_threshold(64);
    // enough iterations to force several collection passes mid-evaluation
    let result = eval_number(
        &mut machine,
        entity,
        "(let (assoc i 0 acc 0) (while (< i 200) (assign acc (+ acc i)) (assign i (+ i 1))) acc)",
    );
    assert_eq!(result, (0..200).sum::<i64>() as f64);
}

#[test]
fn test_unknown_analytics_opcodes_yield_null() {
    let (mut machine, entity) = machine_with_entity(0);
    let result = eval(&mut machine, entity, "(query_count)");
    assert!(result.is_null() || {
        let pool = machine.entities.pool(entity);
        pool.opcode(result.id.unwrap()) == Opcode::Null
    });
}

#[test]
fn test_total_size_counts_nodes() {
    let (mut machine, entity) = machine_with_entity(0);
    let size = eval_number(&mut machine, entity, "(total_size (lambda (list 1 2 3)))");
    // lambda body: list node + three numbers
    assert_eq!(size, 4.0);
}

#[test]
fn test_root_permission_grant_and_revoke() {
    let (mut machine, entity) = machine_with_entity(0);
    machine.install_assets(Box::new(PermissionOnlyAssets::default()));

    let created = eval(&mut machine, entity, r#"(create_entities "child" 1)"#);
    let pool = machine.entities.pool(entity);
    let names = pool.children(created.id.unwrap());
    assert_eq!(pool.string_value(names[0]).as_deref(), Some("child"));

    // without root permission the privileged surface is inert
    let denied = eval(
        &mut machine,
        entity,
        r#"(set_entity_root_permission "child" true)"#,
    );
    assert!(denied.is_null());

    // the embedding grants the top-level entity the privileged surface
    machine.with_assets(|m, a| a.set_root_permission(m, entity, true));

    let granted = eval(
        &mut machine,
        entity,
        r#"(set_entity_root_permission "child" true)"#,
    );
    let pool = machine.entities.pool(entity);
    assert_eq!(pool.opcode(granted.id.unwrap()), Opcode::True);

    let observed = eval(&mut machine, entity, r#"(get_entity_root_permission "child")"#);
    let pool = machine.entities.pool(entity);
    assert_eq!(pool.opcode(observed.id.unwrap()), Opcode::True);

    // revocation succeeds too: the result reports the operation's outcome,
    // not the permission value that was set
    let revoked = eval(
        &mut machine,
        entity,
        r#"(set_entity_root_permission "child" false)"#,
    );
    let pool = machine.entities.pool(entity);
    assert_eq!(pool.opcode(revoked.id.unwrap()), Opcode::True);

    let observed = eval(&mut machine, entity, r#"(get_entity_root_permission "child")"#);
    let pool = machine.entities.pool(entity);
    assert_eq!(pool.opcode(observed.id.unwrap()), Opcode::False);
}

#[test]
fn test_string_ops() {
    let (mut machine, entity) = machine_with_entity(0);
    let result = eval(
        &mut machine,
        entity,
        r#"(concat "a" "b" (substr "hello" 0 2))"#,
    );
    let pool = machine.entities.pool(entity);
    assert_eq!(
        pool.string_value(result.id.unwrap()).as_deref(),
        Some("abhe")
    );
}
