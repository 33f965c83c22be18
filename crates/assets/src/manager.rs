//! The asset manager: resource and entity load/store, the persistent
//! entity registry, and root permissions.
//!
//! Implements [`AssetSystem`], the runtime's loader seam. The registry and
//! permission set are process-wide state owned by this value (never a
//! global), each behind its own reader/writer lock acquired at the
//! narrowest possible scope.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::{debug, error};

use sylva_runtime::{
    AssetSystem, EntityId, Interpreter, LoadEntityParams, LoadStatus, Machine,
};
use sylva_tree::tree_ops::immediate_to_string;
use sylva_tree::{NodeId, NodeRef, Opcode};

use crate::escape::{escape_filename, unescape_filename};
use crate::formats::{compressed, csv, json, yaml};

/// Textual source extension.
pub const EXT_SOURCE: &str = "amlg";
/// Sibling metadata extension.
pub const EXT_METADATA: &str = "amlg_metadata";
/// Compressed source extension.
pub const EXT_COMPRESSED: &str = "caml";

pub struct AssetManager {
    persistent: RwLock<HashMap<EntityId, PathBuf>>,
    root_permissions: RwLock<HashSet<EntityId>>,
    default_extension: String,
}

impl Default for AssetManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetManager {
    pub fn new() -> Self {
        Self {
            persistent: RwLock::new(HashMap::new()),
            root_permissions: RwLock::new(HashSet::new()),
            default_extension: EXT_SOURCE.to_string(),
        }
    }

    /// Registered persistent path for an entity, if any.
    pub fn persistent_path(&self, entity: EntityId) -> Option<PathBuf> {
        self.persistent
            .read()
            .expect("persistent registry poisoned")
            .get(&entity)
            .cloned()
    }

    pub fn set_persistent_path(&self, entity: EntityId, path: PathBuf) {
        self.persistent
            .write()
            .expect("persistent registry poisoned")
            .insert(entity, path);
    }

    // ---- path handling -------------------------------------------------

    /// Split a resource path into (directory, stem, extension).
    fn split_path(path: &str) -> (PathBuf, String, String) {
        let p = Path::new(path);
        let dir = p.parent().map(Path::to_path_buf).unwrap_or_default();
        let stem = p
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = p
            .extension()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        (dir, stem, ext)
    }

    /// Resolve the effective file type and concrete paths, applying the
    /// optional filename escape to the stem. Returns
    /// (file_type, full_path, base_path_without_extension).
    fn preprocess(
        path: &str,
        format_hint: &str,
        escape: bool,
    ) -> (String, PathBuf, PathBuf) {
        let (dir, stem, ext) = Self::split_path(path);
        let stem = if escape { escape_filename(&stem) } else { stem };
        let file_type = if format_hint.is_empty() {
            ext.clone()
        } else {
            format_hint.to_string()
        };
        let base = dir.join(&stem);
        let full = if ext.is_empty() {
            base.clone()
        } else {
            dir.join(format!("{stem}.{ext}"))
        };
        (file_type, full, base)
    }

    // ---- resource load/store -------------------------------------------

    fn load_resource_into(
        &self,
        machine: &mut Machine,
        entity: EntityId,
        path: &str,
        format_hint: &str,
        escape: bool,
    ) -> (NodeRef, LoadStatus) {
        let (file_type, full, _base) = Self::preprocess(path, format_hint, escape);

        match file_type.as_str() {
            EXT_SOURCE | EXT_METADATA => {
                let bytes = match fs::read(&full) {
                    Ok(bytes) => bytes,
                    Err(e) => return (NodeRef::null(), LoadStatus::failed(e.to_string())),
                };
                // strip the UTF-8 byte order mark if present
                let bytes = match bytes.strip_prefix(&[0xEF, 0xBB, 0xBF][..]) {
                    Some(rest) => rest,
                    None => &bytes[..],
                };
                let source = String::from_utf8_lossy(bytes);
                match sylva_lang::parse(&source, machine.entities.pool_mut(entity)) {
                    Ok(root) => (root, LoadStatus::ok()),
                    Err(e) => (NodeRef::null(), LoadStatus::failed(e.to_string())),
                }
            }
            "json" => match fs::read_to_string(&full) {
                Ok(text) => match serde_json::from_str(&text) {
                    Ok(value) => {
                        let id =
                            json::json_to_node(machine.entities.pool_mut(entity), &value);
                        (NodeRef::new(id, true), LoadStatus::ok())
                    }
                    Err(e) => (NodeRef::null(), LoadStatus::failed(e.to_string())),
                },
                Err(e) => (NodeRef::null(), LoadStatus::failed(e.to_string())),
            },
            "yaml" | "yml" => match fs::read_to_string(&full) {
                Ok(text) => match serde_yaml::from_str(&text) {
                    Ok(value) => {
                        let id =
                            yaml::yaml_to_node(machine.entities.pool_mut(entity), &value);
                        (NodeRef::new(id, true), LoadStatus::ok())
                    }
                    Err(e) => (NodeRef::null(), LoadStatus::failed(e.to_string())),
                },
                Err(e) => (NodeRef::null(), LoadStatus::failed(e.to_string())),
            },
            "csv" => match fs::read_to_string(&full) {
                Ok(text) => {
                    let id = csv::csv_to_node(machine.entities.pool_mut(entity), &text);
                    (NodeRef::new(id, true), LoadStatus::ok())
                }
                Err(e) => (NodeRef::null(), LoadStatus::failed(e.to_string())),
            },
            EXT_COMPRESSED => {
                let bytes = match fs::read(&full) {
                    Ok(bytes) => bytes,
                    Err(e) => return (NodeRef::null(), LoadStatus::failed(e.to_string())),
                };
                let strings = match compressed::decompress_strings(&bytes) {
                    Ok(strings) => strings,
                    Err(e) => return (NodeRef::null(), LoadStatus::failed(e.to_string())),
                };
                let Some(source) = strings.first() else {
                    return (NodeRef::null(), LoadStatus::failed("empty payload"));
                };
                match sylva_lang::parse(source, machine.entities.pool_mut(entity)) {
                    Ok(root) => (root, LoadStatus::ok()),
                    Err(e) => (NodeRef::null(), LoadStatus::failed(e.to_string())),
                }
            }
            _ => match fs::read(&full) {
                // any other extension is opaque bytes in a string node
                Ok(bytes) => {
                    let text = String::from_utf8_lossy(&bytes).into_owned();
                    let id = machine.entities.pool_mut(entity).alloc_string(&text);
                    (NodeRef::new(id, true), LoadStatus::ok())
                }
                Err(e) => (NodeRef::null(), LoadStatus::failed(e.to_string())),
            },
        }
    }

    fn store_resource_at(
        &self,
        machine: &mut Machine,
        entity: EntityId,
        root: Option<NodeId>,
        path: &Path,
        file_type: &str,
    ) -> bool {
        let pool = machine.entities.pool(entity);
        let result = match file_type {
            EXT_SOURCE | EXT_METADATA => {
                // stable key ordering so stored trees are bit-reproducible
                let text = sylva_lang::unparse(pool, root, true, true);
                fs::write(path, text)
            }
            "json" => {
                let value = json::node_to_json(pool, root, true);
                match serde_json::to_string_pretty(&value) {
                    Ok(text) => fs::write(path, text),
                    Err(e) => {
                        error!(%e, "json serialization failed");
                        return false;
                    }
                }
            }
            "yaml" | "yml" => {
                let value = yaml::node_to_yaml(pool, root, true);
                match serde_yaml::to_string(&value) {
                    Ok(text) => fs::write(path, text),
                    Err(e) => {
                        error!(%e, "yaml serialization failed");
                        return false;
                    }
                }
            }
            "csv" => fs::write(path, csv::node_to_csv(pool, root)),
            EXT_COMPRESSED => {
                let text = sylva_lang::unparse(pool, root, false, true);
                match compressed::compress_strings(&[text]) {
                    Ok(bytes) => fs::write(path, bytes),
                    Err(e) => {
                        error!(%e, "compression failed");
                        return false;
                    }
                }
            }
            _ => {
                let text = match root {
                    Some(id) => match immediate_to_string(pool, id) {
                        Some(text) => text,
                        None => sylva_lang::unparse(pool, root, false, true),
                    },
                    None => String::new(),
                };
                fs::write(path, text)
            }
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                error!(path = %path.display(), %e, "store failed");
                false
            }
        }
    }

    // ---- entity store --------------------------------------------------

    fn store_entity_at(
        &mut self,
        machine: &mut Machine,
        entity: EntityId,
        path: &str,
        format_hint: &str,
        update_persistence: bool,
        store_contained: bool,
    ) -> bool {
        let (file_type, full, base) = Self::preprocess(path, format_hint, false);
        let file_type = if file_type.is_empty() {
            self.default_extension.clone()
        } else {
            file_type
        };

        let root = machine.entities.entity(entity).root;
        if !self.store_resource_at(machine, entity, root, &full, &file_type) {
            return false;
        }

        // metadata sits beside the data as <base>.amlg_metadata
        if file_type != EXT_COMPRESSED {
            let metadata = self.render_metadata(machine, entity);
            let metadata_path = base.with_extension(EXT_METADATA);
            if let Err(e) = fs::write(&metadata_path, metadata) {
                error!(path = %metadata_path.display(), %e, "metadata store failed");
            }
        }

        if store_contained {
            let contained: Vec<(String, EntityId)> = machine
                .entities
                .entity(entity)
                .contained
                .iter()
                .map(|(name, &id)| (name.clone(), id))
                .collect();
            if !contained.is_empty() {
                if let Err(e) = fs::create_dir_all(&base) {
                    error!(path = %base.display(), %e, "could not create directory");
                    return false;
                }
                for (name, child) in contained {
                    let child_path =
                        base.join(format!("{}.{}", escape_filename(&name), file_type));
                    if !self.store_entity_at(
                        machine,
                        child,
                        &child_path.to_string_lossy(),
                        &file_type,
                        false,
                        true,
                    ) {
                        return false;
                    }
                }
            }
        }

        if update_persistence {
            self.set_persistent_path(entity, PathBuf::from(path));
        }
        true
    }

    /// Metadata tree for an entity, rendered as stable source text.
    fn render_metadata(&self, machine: &mut Machine, entity: EntityId) -> String {
        let seed = machine.entities.entity(entity).rand.state_string();
        let version = &machine.version;
        let pool = machine.entities.pool_mut(entity);
        let assoc = pool.alloc(Opcode::Assoc);
        let seed_node = pool.alloc_string(&seed);
        pool.assoc_insert(assoc, "rand_seed", seed_node);
        let version_node = pool.alloc_string(&format!(
            "{}.{}.{}",
            version.major, version.minor, version.patch
        ));
        pool.assoc_insert(assoc, "version", version_node);
        let text = sylva_lang::unparse(pool, Some(assoc), true, true);
        pool.free_tree(assoc);
        text
    }

    /// Mirror `entity` under every persistent ancestor (file + metadata +
    /// contained directory).
    fn mirror_under_ancestors(&mut self, machine: &mut Machine, entity: EntityId) {
        if self
            .persistent
            .read()
            .expect("persistent registry poisoned")
            .is_empty()
        {
            return;
        }

        let entity_id_escaped = escape_filename(&machine.entities.entity(entity).id);
        let mut traversal = String::new();
        let mut cur = machine.entities.container_of(entity);
        while let Some(container) = cur {
            if let Some(registered) = self.persistent_path(container) {
                let (dir, stem, ext) = Self::split_path(&registered.to_string_lossy());
                let base = dir.join(format!("{stem}{traversal}"));
                match fs::create_dir_all(&base) {
                    Ok(()) => {
                        let target =
                            base.join(format!("{entity_id_escaped}.{ext}"));
                        self.store_entity_at(
                            machine,
                            entity,
                            &target.to_string_lossy(),
                            &ext,
                            false,
                            true,
                        );
                    }
                    Err(e) => {
                        error!(path = %base.display(), %e, "could not create directory");
                    }
                }
            }
            let container_id_escaped =
                escape_filename(&machine.entities.entity(container).id);
            traversal = format!("/{container_id_escaped}{traversal}");
            cur = machine.entities.container_of(container);
        }
    }
}

impl AssetSystem for AssetManager {
    fn load_resource(
        &mut self,
        machine: &mut Machine,
        entity: EntityId,
        path: &str,
        format_hint: &str,
    ) -> (NodeRef, LoadStatus) {
        self.load_resource_into(machine, entity, path, format_hint, false)
    }

    fn store_resource(
        &mut self,
        machine: &mut Machine,
        entity: EntityId,
        root: Option<NodeId>,
        path: &str,
        format_hint: &str,
    ) -> bool {
        let (file_type, full, _base) = Self::preprocess(path, format_hint, false);
        self.store_resource_at(machine, entity, root, &full, &file_type)
    }

    fn load_entity(
        &mut self,
        machine: &mut Machine,
        params: &LoadEntityParams,
    ) -> (Option<EntityId>, LoadStatus) {
        let (dir, stem, ext) = Self::split_path(&params.path);
        let file_type = if params.format_hint.is_empty() {
            ext
        } else {
            params.format_hint.clone()
        };
        let entity_name = if params.escape_root {
            unescape_filename(&stem)
        } else {
            stem.clone()
        };

        let entity = machine.entities.create(&entity_name, &params.default_seed);
        let (code, status) = self.load_resource_into(
            machine,
            entity,
            &params.path,
            &file_type,
            params.escape_root,
        );
        if !status.loaded {
            machine.entities.destroy(entity);
            return (None, status);
        }
        machine.entities.set_root(entity, code.id);

        if file_type == EXT_COMPRESSED {
            // the compressed format carries an initialization thunk
            let call_stack = {
                let pool = machine.entities.pool_mut(entity);
                let args = pool.alloc(Opcode::Assoc);
                let flag = pool.alloc_bool(false);
                pool.assoc_insert(args, "create_new_entity", flag);
                Interpreter::convert_args_to_call_stack(pool, NodeRef::new(args, true))
            };
            machine.execute_entity(entity, None, call_stack.id, None);
        } else {
            // sibling metadata: rand seed and version gate
            let base = dir.join(if params.escape_root {
                escape_filename(&stem)
            } else {
                stem.clone()
            });
            let metadata_path = base.with_extension(EXT_METADATA);
            if metadata_path.is_file() {
                let (metadata, metadata_status) = self.load_resource_into(
                    machine,
                    entity,
                    &metadata_path.to_string_lossy(),
                    EXT_METADATA,
                    false,
                );
                if metadata_status.loaded {
                    if let Some(mid) = metadata.id {
                        if machine.entities.pool(entity).opcode(mid) == Opcode::Assoc {
                            if let Some(outcome) =
                                self.apply_metadata(machine, entity, mid)
                            {
                                machine.entities.destroy(entity);
                                return (None, outcome);
                            }
                        }
                        machine.entities.pool_mut(entity).free_tree(mid);
                    }
                }
            }
        }

        if params.persistent {
            self.set_persistent_path(entity, PathBuf::from(&params.path));
        }

        if params.load_contained {
            let contained_dir = dir.join(if params.escape_root {
                escape_filename(&stem)
            } else {
                stem.clone()
            });
            if contained_dir.is_dir() {
                let mut names: Vec<PathBuf> = match fs::read_dir(&contained_dir) {
                    Ok(entries) => entries
                        .filter_map(|e| e.ok())
                        .map(|e| e.path())
                        .filter(|p| {
                            p.extension()
                                .map(|e| e.to_string_lossy() == file_type)
                                .unwrap_or(false)
                        })
                        .collect(),
                    Err(_) => Vec::new(),
                };
                // sorted for deterministic load order
                names.sort();
                for child_path in names {
                    let child_stem = child_path
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    let child_id = if params.escape_contained {
                        unescape_filename(&child_stem)
                    } else {
                        child_stem
                    };
                    let child_seed = machine
                        .entities
                        .entity_mut(entity)
                        .rand
                        .substream_advancing(&child_id)
                        .state_string();
                    let child_params = LoadEntityParams {
                        path: child_path.to_string_lossy().into_owned(),
                        format_hint: file_type.clone(),
                        persistent: false,
                        load_contained: true,
                        escape_root: false,
                        escape_contained: params.escape_contained,
                        default_seed: child_seed,
                    };
                    let (child, child_status) = self.load_entity(machine, &child_params);
                    match child {
                        Some(child) => {
                            machine.entities.add_contained(entity, &child_id, child)
                        }
                        None => {
                            machine.entities.destroy(entity);
                            return (None, child_status);
                        }
                    }
                }
            }
        }

        (Some(entity), LoadStatus::ok())
    }

    fn store_entity(
        &mut self,
        machine: &mut Machine,
        entity: EntityId,
        path: &str,
        format_hint: &str,
        update_persistence: bool,
        store_contained: bool,
    ) -> bool {
        self.store_entity_at(
            machine,
            entity,
            path,
            format_hint,
            update_persistence,
            store_contained,
        )
    }

    fn entity_created(&mut self, machine: &mut Machine, entity: EntityId) {
        self.mirror_under_ancestors(machine, entity);
    }

    fn entity_updated(&mut self, machine: &mut Machine, entity: EntityId) {
        if let Some(path) = self.persistent_path(entity) {
            debug!(entity = entity.0, path = %path.display(), "re-storing persistent entity");
            self.store_entity_at(
                machine,
                entity,
                &path.to_string_lossy(),
                "",
                false,
                true,
            );
        }
        self.mirror_under_ancestors(machine, entity);
    }

    fn entity_destroyed(&mut self, machine: &mut Machine, entity: EntityId) {
        self.persistent
            .write()
            .expect("persistent registry poisoned")
            .remove(&entity);

        // contained persistent entities go first
        let contained: Vec<EntityId> = machine
            .entities
            .entity(entity)
            .contained
            .values()
            .copied()
            .collect();
        for child in contained {
            self.entity_destroyed(machine, child);
        }

        let mut traversal = String::new();
        let mut cur = Some(entity);
        while let Some(node) = cur {
            if let Some(registered) = self.persistent_path(node) {
                let (dir, stem, ext) = Self::split_path(&registered.to_string_lossy());
                let base = dir.join(format!("{stem}{traversal}"));
                let data = base.with_extension(&ext);
                if let Err(e) = fs::remove_file(&data) {
                    debug!(path = %data.display(), %e, "could not remove file");
                }
                let metadata = base.with_extension(EXT_METADATA);
                if let Err(e) = fs::remove_file(&metadata) {
                    debug!(path = %metadata.display(), %e, "could not remove file");
                }
                if let Err(e) = fs::remove_dir_all(&base) {
                    debug!(path = %base.display(), %e, "could not remove directory");
                }
            }
            let id_escaped = escape_filename(&machine.entities.entity(node).id);
            traversal = format!("/{id_escaped}{traversal}");
            cur = machine.entities.container_of(node);
        }
    }

    fn set_root_permission(&mut self, machine: &mut Machine, entity: EntityId, permission: bool) {
        {
            let mut permissions = self
                .root_permissions
                .write()
                .expect("permission set poisoned");
            if permission {
                permissions.insert(entity);
            } else {
                permissions.remove(&entity);
            }
        }
        if !permission {
            // removing root permission recurses into contained entities
            let contained: Vec<EntityId> = machine
                .entities
                .entity(entity)
                .contained
                .values()
                .copied()
                .collect();
            for child in contained {
                self.set_root_permission(machine, child, false);
            }
        }
    }

    fn has_root_permission(&self, entity: EntityId) -> bool {
        self.root_permissions
            .read()
            .expect("permission set poisoned")
            .contains(&entity)
    }

    fn is_persistent(&self, entity: EntityId) -> bool {
        self.persistent
            .read()
            .expect("persistent registry poisoned")
            .contains_key(&entity)
    }
}

impl AssetManager {
    /// Apply a parsed metadata assoc: reseed from `rand_seed` and gate on
    /// `version`. Returns a failure status when the version is rejected.
    fn apply_metadata(
        &self,
        machine: &mut Machine,
        entity: EntityId,
        metadata: NodeId,
    ) -> Option<LoadStatus> {
        let seed_key = machine.strings.id_if_present("rand_seed");
        if seed_key.is_string() {
            if let Some(seed_node) = machine.entities.pool(entity).assoc_get(metadata, seed_key)
            {
                if let Some(seed) =
                    immediate_to_string(machine.entities.pool(entity), seed_node)
                {
                    machine.entities.entity_mut(entity).rand =
                        sylva_foundation::RandomStream::from_state_string(&seed);
                }
            }
        }

        let version_key = machine.strings.id_if_present("version");
        if version_key.is_string() {
            if let Some(version_node) =
                machine.entities.pool(entity).assoc_get(metadata, version_key)
            {
                if let Some(version) =
                    immediate_to_string(machine.entities.pool(entity), version_node)
                {
                    if let Err(e) = machine.version.validate_stored(&version) {
                        return Some(LoadStatus {
                            loaded: false,
                            message: e.to_string(),
                            version,
                        });
                    }
                }
            }
        }
        None
    }
}
