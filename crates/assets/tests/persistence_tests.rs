//! Persistence scenarios: load/store round trips, the version gate, and
//! the disk mirror for mutated persistent entities.

use std::fs;

use sylva_assets::AssetManager;
use sylva_lang::parse;
use sylva_runtime::{Interpreter, LoadEntityParams, Machine};
use sylva_tree::tree_ops::{node_to_number, tree_equal};

fn machine() -> Machine {
    let mut machine = Machine::new(0);
    machine.install_assets(Box::new(AssetManager::new()));
    machine
}

fn load_params(path: &str, persistent: bool) -> LoadEntityParams {
    LoadEntityParams {
        path: path.to_string(),
        format_hint: String::new(),
        persistent,
        load_contained: true,
        escape_root: false,
        escape_contained: true,
        default_seed: "test-seed".to_string(),
    }
}

#[test]
fn test_load_entity_from_source() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("calc.amlg");
    fs::write(&path, "(list #answer 42)").unwrap();

    let mut machine = machine();
    let params = load_params(&path.to_string_lossy(), false);
    let (entity, status) = machine
        .with_assets(|m, a| a.load_entity(m, &params))
        .unwrap();
    assert!(status.loaded, "{}", status.message);
    let entity = entity.unwrap();
    assert_eq!(machine.entities.entity(entity).id, "calc");

    let result = machine.execute_entity(entity, Some("answer"), None, None);
    assert_eq!(
        node_to_number(machine.entities.pool(entity), result.id),
        42.0
    );
}

#[test]
fn test_store_load_round_trip_is_stable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tree.amlg");
    fs::write(&path, "(assoc b 2 a 1 c (list 1 \"two\" null))").unwrap();

    let mut machine = machine();
    let params = load_params(&path.to_string_lossy(), false);
    let (entity, _) = machine
        .with_assets(|m, a| a.load_entity(m, &params))
        .unwrap();
    let entity = entity.unwrap();

    let out = dir.path().join("out.amlg");
    let stored = machine
        .with_assets(|m, a| {
            a.store_entity(m, entity, &out.to_string_lossy(), "", false, true)
        })
        .unwrap();
    assert!(stored);

    // store(load(P)) must re-load to an equal tree, and re-storing must be
    // byte-identical (stable key ordering)
    let first = fs::read_to_string(&out).unwrap();
    let params = load_params(&out.to_string_lossy(), false);
    let (reloaded, _) = machine
        .with_assets(|m, a| a.load_entity(m, &params))
        .unwrap();
    let reloaded = reloaded.unwrap();
    let again = dir.path().join("again.amlg");
    machine
        .with_assets(|m, a| {
            a.store_entity(m, reloaded, &again.to_string_lossy(), "", false, true)
        })
        .unwrap();
    assert_eq!(first, fs::read_to_string(&again).unwrap());
}

#[test]
fn test_version_gate_refuses_newer_files() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("future.amlg"), "(list 1)").unwrap();
    fs::write(
        dir.path().join("future.amlg_metadata"),
        "(assoc version \"99.0.0\")",
    )
    .unwrap();

    let mut machine = machine();
    let params = load_params(&dir.path().join("future.amlg").to_string_lossy(), false);
    let (entity, status) = machine
        .with_assets(|m, a| a.load_entity(m, &params))
        .unwrap();
    assert!(entity.is_none());
    assert!(!status.loaded);
    assert_eq!(status.version, "99.0.0");
}

#[test]
fn test_metadata_seed_reseeds_entity() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("seeded.amlg"), "(list 1)").unwrap();
    fs::write(
        dir.path().join("seeded.amlg_metadata"),
        "(assoc rand_seed \"00000000deadbeef\")",
    )
    .unwrap();

    let mut machine = machine();
    let params = load_params(&dir.path().join("seeded.amlg").to_string_lossy(), false);
    let (entity, _) = machine
        .with_assets(|m, a| a.load_entity(m, &params))
        .unwrap();
    let entity = entity.unwrap();
    assert_eq!(
        machine.entities.entity(entity).rand.state_string(),
        "00000000deadbeef"
    );
}

#[test]
fn test_contained_entities_load_recursively() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("parent.amlg"), "(list 1)").unwrap();
    fs::create_dir(dir.path().join("parent")).unwrap();
    fs::write(dir.path().join("parent").join("child.amlg"), "(list #v 7)").unwrap();

    let mut machine = machine();
    let params = load_params(&dir.path().join("parent.amlg").to_string_lossy(), false);
    let (entity, status) = machine
        .with_assets(|m, a| a.load_entity(m, &params))
        .unwrap();
    assert!(status.loaded, "{}", status.message);
    let entity = entity.unwrap();

    let child = machine.entities.contained_by_name(entity, "child").unwrap();
    let result = machine.execute_entity(child, Some("v"), None, None);
    assert_eq!(node_to_number(machine.entities.pool(child), result.id), 7.0);
}

#[test]
fn test_persistent_entity_mirrors_mutations() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("persisted.amlg");
    fs::write(&path, "(list #score 1)").unwrap();

    let mut machine = machine();
    let params = load_params(&path.to_string_lossy(), true);
    let (entity, _) = machine
        .with_assets(|m, a| a.load_entity(m, &params))
        .unwrap();
    let entity = entity.unwrap();

    // mutate a label through the interpreter; the file must be rewritten
    let code = parse(
        "(assign_to_entities (assoc score 99))",
        machine.entities.pool_mut(entity),
    )
    .unwrap();
    let interpreter = Interpreter::attached(&mut machine, entity);
    interpreter.execute(code.id, false);

    let stored = fs::read_to_string(&path).unwrap();
    assert!(stored.contains("99"), "mirror not updated: {stored}");

    // the stored file re-parses to a tree equal to the live root
    let reparsed = parse(&stored, machine.entities.pool_mut(entity)).unwrap();
    let root = machine.entities.entity(entity).root;
    assert!(tree_equal(machine.entities.pool(entity), root, reparsed.id));
}

#[test]
fn test_json_resource_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.json");
    fs::write(&path, r#"{"a": [1, 2], "b": "text"}"#).unwrap();

    let mut machine = machine();
    let entity = machine.entities.create("host", "seed");
    let path_str = path.to_string_lossy().into_owned();
    let (node, status) = machine
        .with_assets(|m, a| a.load_resource(m, entity, &path_str, ""))
        .unwrap();
    assert!(status.loaded);

    let out = dir.path().join("data_out.json");
    let out_str = out.to_string_lossy().into_owned();
    let stored = machine
        .with_assets(|m, a| a.store_resource(m, entity, node.id, &out_str, ""))
        .unwrap();
    assert!(stored);

    let original: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(original, written);
}

#[test]
fn test_unknown_extension_loads_as_string() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blob.bin");
    fs::write(&path, "raw bytes here").unwrap();

    let mut machine = machine();
    let entity = machine.entities.create("host", "seed");
    let path_str = path.to_string_lossy().into_owned();
    let (node, status) = machine
        .with_assets(|m, a| a.load_resource(m, entity, &path_str, ""))
        .unwrap();
    assert!(status.loaded);
    assert_eq!(
        machine
            .entities
            .pool(entity)
            .string_value(node.id.unwrap())
            .as_deref(),
        Some("raw bytes here")
    );
}

#[test]
fn test_compressed_round_trip() {
    let dir = tempfile::tempdir().unwrap();

    let mut machine = machine();
    let entity = machine.entities.create("host", "seed");
    let root = parse("(lambda (+ 1 2))", machine.entities.pool_mut(entity)).unwrap();
    machine.entities.set_root(entity, root.id);

    let out = dir.path().join("packed.caml");
    let out_str = out.to_string_lossy().into_owned();
    machine
        .with_assets(|m, a| a.store_entity(m, entity, &out_str, "", false, false))
        .unwrap();

    // loading a compressed entity calls its root as an initialization
    // thunk with create_new_entity = false
    let params = load_params(&out_str, false);
    let (loaded, status) = machine
        .with_assets(|m, a| a.load_entity(m, &params))
        .unwrap();
    assert!(status.loaded, "{}", status.message);
    let loaded = loaded.unwrap();
    let reloaded_root = machine.entities.entity(loaded).root;
    assert!(reloaded_root.is_some());
}

#[test]
fn test_destroy_persistent_entity_removes_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doomed.amlg");
    fs::write(&path, "(list 1)").unwrap();

    let mut machine = machine();
    let params = load_params(&path.to_string_lossy(), true);
    let (entity, _) = machine
        .with_assets(|m, a| a.load_entity(m, &params))
        .unwrap();
    let entity = entity.unwrap();

    machine.with_assets(|m, a| a.entity_destroyed(m, entity));
    assert!(!path.exists());
}
