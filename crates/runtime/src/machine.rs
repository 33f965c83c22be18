//! The runtime owner.
//!
//! A [`Machine`] holds everything process-wide: the string intern pool, the
//! entity store, the asset system, listeners, and the worker pool. It is an
//! explicit lifetime-managed owner constructed once at init and passed by
//! reference — never a global.
//!
//! The asset system is a trait seam so the loader crate can sit above this
//! one: handlers reach it through [`Machine::with_assets`], which takes the
//! implementation out of the machine for the duration of the call so the
//! loader can re-enter the runtime (e.g. to run a compressed entity's
//! initialization thunk).

use std::sync::Arc;

use tracing::info;

use sylva_foundation::{RuntimeVersion, StringPool};
use sylva_tree::{NodeId, NodeRef};

use crate::concurrency::WorkerPool;
use crate::entity::{find_labeled_node, EntityId, EntityStore};
use crate::interpreter::Interpreter;
use crate::listener::{PrintListener, WriteEvent, WriteEventKind, WriteListener};

/// Outcome of a load operation: a `loaded` flag, a human-readable message,
/// and the source's declared version when one was present.
#[derive(Debug, Clone, Default)]
pub struct LoadStatus {
    pub loaded: bool,
    pub message: String,
    pub version: String,
}

impl LoadStatus {
    pub fn ok() -> Self {
        Self {
            loaded: true,
            ..Default::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            loaded: false,
            message: message.into(),
            version: String::new(),
        }
    }
}

/// Parameters for [`AssetSystem::load_entity`].
#[derive(Debug, Clone)]
pub struct LoadEntityParams {
    pub path: String,
    pub format_hint: String,
    pub persistent: bool,
    pub load_contained: bool,
    pub escape_root: bool,
    pub escape_contained: bool,
    pub default_seed: String,
}

/// The loader surface the interpreter consumes. Implemented by the asset
/// manager crate; every method receives the machine back so it can allocate
/// into entity pools and run initialization code.
pub trait AssetSystem: Send {
    /// Load a resource into `entity`'s pool.
    fn load_resource(
        &mut self,
        machine: &mut Machine,
        entity: EntityId,
        path: &str,
        format_hint: &str,
    ) -> (NodeRef, LoadStatus);

    /// Store a tree from `entity`'s pool to a resource path.
    fn store_resource(
        &mut self,
        machine: &mut Machine,
        entity: EntityId,
        root: Option<NodeId>,
        path: &str,
        format_hint: &str,
    ) -> bool;

    /// Materialize an entity (and optionally its contained entities) from
    /// disk. The new entity is detached; the caller attaches it.
    fn load_entity(
        &mut self,
        machine: &mut Machine,
        params: &LoadEntityParams,
    ) -> (Option<EntityId>, LoadStatus);

    /// Store an entity, its metadata, and (optionally) its contained
    /// entities. With `update_persistence`, registers the path as the
    /// entity's persistent location.
    fn store_entity(
        &mut self,
        machine: &mut Machine,
        entity: EntityId,
        path: &str,
        format_hint: &str,
        update_persistence: bool,
        store_contained: bool,
    ) -> bool;

    /// Mirror a newly created entity under every persistent ancestor.
    fn entity_created(&mut self, machine: &mut Machine, entity: EntityId);

    /// Re-store a mutated entity if it (or an ancestor) is persistent.
    fn entity_updated(&mut self, machine: &mut Machine, entity: EntityId);

    /// Remove a persistent entity's files before it is destroyed.
    fn entity_destroyed(&mut self, machine: &mut Machine, entity: EntityId);

    fn set_root_permission(&mut self, machine: &mut Machine, entity: EntityId, permission: bool);

    fn has_root_permission(&self, entity: EntityId) -> bool;

    fn is_persistent(&self, entity: EntityId) -> bool;
}

pub struct Machine {
    pub strings: Arc<StringPool>,
    pub entities: EntityStore,
    pub assets: Option<Box<dyn AssetSystem>>,
    pub write_listeners: Vec<Box<dyn WriteListener>>,
    pub print_listener: Option<Box<dyn PrintListener>>,
    pub workers: WorkerPool,
    pub version: RuntimeVersion,
    /// Active change-capture scopes (see [`Machine::begin_recording`]).
    recordings: Vec<Vec<WriteEvent>>,
}

impl Machine {
    /// Build a machine with a worker pool of `threads` workers (0 disables
    /// parallel fan-out entirely).
    pub fn new(threads: usize) -> Self {
        let strings = Arc::new(StringPool::new());
        info!(threads, "initializing runtime");
        Self {
            entities: EntityStore::new(Arc::clone(&strings)),
            strings,
            assets: None,
            write_listeners: Vec::new(),
            print_listener: None,
            workers: WorkerPool::new(threads),
            version: RuntimeVersion::current(),
            recordings: Vec::new(),
        }
    }

    pub fn install_assets(&mut self, assets: Box<dyn AssetSystem>) {
        self.assets = Some(assets);
    }

    /// Run `f` with the asset system temporarily removed from the machine,
    /// so the implementation can re-enter the runtime. Returns `None` when
    /// no asset system is installed.
    pub fn with_assets<R>(
        &mut self,
        f: impl FnOnce(&mut Machine, &mut dyn AssetSystem) -> R,
    ) -> Option<R> {
        let mut assets = self.assets.take()?;
        let result = f(self, assets.as_mut());
        self.assets = Some(assets);
        Some(result)
    }

    /// Emit a write event to every listener and any active capture scope.
    pub fn notify_write(&mut self, event: WriteEvent) {
        for listener in &mut self.write_listeners {
            listener.on_write(&event);
        }
        if let Some(recording) = self.recordings.last_mut() {
            recording.push(event);
        }
    }

    /// Start capturing write events (nests).
    pub fn begin_recording(&mut self) {
        self.recordings.push(Vec::new());
    }

    /// End the innermost capture scope and return its events.
    pub fn end_recording(&mut self) -> Vec<WriteEvent> {
        self.recordings.pop().unwrap_or_default()
    }

    /// Record a mutation of an entity root: listeners first, then the
    /// persistence mirror.
    pub fn entity_mutated(&mut self, entity: EntityId, kind: WriteEventKind) {
        self.notify_write(WriteEvent { entity, kind });
        self.with_assets(|machine, assets| assets.entity_updated(machine, entity));
    }

    pub fn print(&mut self, text: &str) {
        match &mut self.print_listener {
            Some(listener) => listener.print(text),
            None => info!(target: "sylva::print", "{text}"),
        }
    }

    /// Execute an entity from its root, or from a labeled node within the
    /// root. `call_stack` must be a call-stack list node in the entity's
    /// pool (see [`Interpreter::convert_args_to_call_stack`]); when absent
    /// a fresh one is created.
    pub fn execute_entity(
        &mut self,
        entity: EntityId,
        label: Option<&str>,
        call_stack: Option<NodeId>,
        constraints: Option<crate::constraints::PerformanceConstraints>,
    ) -> NodeRef {
        let Some(root) = self.entities.entity(entity).root else {
            return NodeRef::null();
        };
        let start = match label {
            Some(label) => {
                let sid = self.strings.id_if_present(label);
                if !sid.is_string() {
                    return NodeRef::null();
                }
                match find_labeled_node(self.entities.pool(entity), root, sid) {
                    Some(node) => node,
                    None => return NodeRef::null(),
                }
            }
            None => root,
        };
        let call_stack = match call_stack {
            Some(stack) => stack,
            None => {
                let pool = self.entities.pool_mut(entity);
                let stack = pool.alloc(sylva_tree::Opcode::List);
                let frame = pool.alloc(sylva_tree::Opcode::Assoc);
                pool.append_child(stack, frame);
                stack
            }
        };
        let interpreter = Interpreter::attached_with_stack(self, entity, constraints, call_stack);
        interpreter.execute(Some(start), false)
    }
}
