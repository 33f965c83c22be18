//! Entities.
//!
//! An entity owns a node pool, a root tree, a random stream, and an ordered
//! set of contained entities. Entities live in an [`EntityStore`] arena so
//! container links can be plain ids. An entity's pool is private: no node is
//! ever shared across entities — cross-entity transfer deep-copies through
//! [`sylva_tree::NodePool::import_from`].

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use sylva_foundation::{RandomStream, StringId, StringPool};
use sylva_tree::{NodeId, NodePool};

/// Index of an entity inside the [`EntityStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u32);

pub struct Entity {
    /// Interned-id string of this entity within its container.
    pub id: String,
    pub pool: NodePool,
    pub root: Option<NodeId>,
    pub rand: RandomStream,
    pub container: Option<EntityId>,
    pub contained: IndexMap<String, EntityId>,
}

/// Arena of all live entities in one runtime.
pub struct EntityStore {
    slots: Vec<Option<Entity>>,
    free: Vec<u32>,
    strings: Arc<StringPool>,
}

impl EntityStore {
    pub fn new(strings: Arc<StringPool>) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            strings,
        }
    }

    pub fn strings(&self) -> &Arc<StringPool> {
        &self.strings
    }

    /// Create a detached entity with its own pool and a seeded stream.
    pub fn create(&mut self, id: &str, seed: &str) -> EntityId {
        let entity = Entity {
            id: id.to_string(),
            pool: NodePool::new(Arc::clone(&self.strings)),
            root: None,
            rand: RandomStream::from_state_string(seed),
            container: None,
            contained: IndexMap::new(),
        };
        match self.free.pop() {
            Some(slot) => {
                self.slots[slot as usize] = Some(entity);
                EntityId(slot)
            }
            None => {
                self.slots.push(Some(entity));
                EntityId((self.slots.len() - 1) as u32)
            }
        }
    }

    pub fn exists(&self, id: EntityId) -> bool {
        self.slots
            .get(id.0 as usize)
            .map(|s| s.is_some())
            .unwrap_or(false)
    }

    pub fn entity(&self, id: EntityId) -> &Entity {
        self.slots[id.0 as usize]
            .as_ref()
            .expect("access to destroyed entity")
    }

    pub fn entity_mut(&mut self, id: EntityId) -> &mut Entity {
        self.slots[id.0 as usize]
            .as_mut()
            .expect("access to destroyed entity")
    }

    pub fn pool(&self, id: EntityId) -> &NodePool {
        &self.entity(id).pool
    }

    pub fn pool_mut(&mut self, id: EntityId) -> &mut NodePool {
        &mut self.entity_mut(id).pool
    }

    /// Replace the entity's root, pinning the new one and unpinning the old.
    /// The old tree is left to the next collection pass.
    pub fn set_root(&mut self, id: EntityId, root: Option<NodeId>) {
        let entity = self.entity_mut(id);
        if let Some(old) = entity.root {
            entity.pool.release_kept(old);
        }
        if let Some(new) = root {
            entity.pool.keep(new);
            entity.pool.set_cycle_check(new, true);
        }
        entity.root = root;
    }

    /// Attach `child` under `parent` with id `name`. Any existing child of
    /// the same name is destroyed first.
    pub fn add_contained(&mut self, parent: EntityId, name: &str, child: EntityId) {
        if let Some(&existing) = self.entity(parent).contained.get(name) {
            if existing != child {
                self.destroy(existing);
            }
        }
        self.entity_mut(child).container = Some(parent);
        self.entity_mut(child).id = name.to_string();
        self.entity_mut(parent)
            .contained
            .insert(name.to_string(), child);
    }

    /// Detach `child` from its container without destroying it.
    pub fn remove_contained(&mut self, child: EntityId) {
        let (container, name) = {
            let entity = self.entity(child);
            (entity.container, entity.id.clone())
        };
        if let Some(parent) = container {
            self.entity_mut(parent).contained.shift_remove(&name);
        }
        self.entity_mut(child).container = None;
    }

    /// Destroy an entity and everything it contains.
    pub fn destroy(&mut self, id: EntityId) {
        if !self.exists(id) {
            return;
        }
        let contained: Vec<EntityId> = self.entity(id).contained.values().copied().collect();
        for child in contained {
            self.destroy(child);
        }
        self.remove_contained(id);
        debug!(entity = id.0, "destroying entity");
        self.slots[id.0 as usize] = None;
        self.free.push(id.0);
    }

    pub fn container_of(&self, id: EntityId) -> Option<EntityId> {
        self.entity(id).container
    }

    pub fn contained_names(&self, id: EntityId) -> Vec<String> {
        self.entity(id).contained.keys().cloned().collect()
    }

    pub fn contained_by_name(&self, id: EntityId, name: &str) -> Option<EntityId> {
        self.entity(id).contained.get(name).copied()
    }

    /// Walk a path of contained-entity ids downward from `start`.
    pub fn resolve_path(&self, start: EntityId, segments: &[String]) -> Option<EntityId> {
        let mut cur = start;
        for segment in segments {
            cur = self.contained_by_name(cur, segment)?;
        }
        Some(cur)
    }

    /// Count of entities deeply contained under `id` (excluding `id`).
    pub fn total_contained(&self, id: EntityId) -> usize {
        let mut count = 0;
        let mut stack: Vec<EntityId> = self.entity(id).contained.values().copied().collect();
        while let Some(child) = stack.pop() {
            count += 1;
            stack.extend(self.entity(child).contained.values().copied());
        }
        count
    }

    /// Containment depth of `id` below `ancestor`; `None` if unrelated.
    pub fn depth_below(&self, ancestor: EntityId, id: EntityId) -> Option<usize> {
        let mut depth = 0;
        let mut cur = id;
        while cur != ancestor {
            cur = self.container_of(cur)?;
            depth += 1;
        }
        Some(depth)
    }

    /// Total node count of an entity's root tree plus all contained roots.
    pub fn total_node_size(&self, id: EntityId) -> usize {
        let entity = self.entity(id);
        let own = entity
            .root
            .map(|r| sylva_tree::tree_ops::total_size(&entity.pool, r))
            .unwrap_or(0);
        own + entity
            .contained
            .values()
            .map(|&c| self.total_node_size(c))
            .sum::<usize>()
    }

    /// Deep-copy a tree from one entity's pool into another's, returning
    /// the new root id in `dest`'s pool. Within one entity this is a plain
    /// deep copy.
    pub fn import_tree(&mut self, source: EntityId, root: NodeId, dest: EntityId) -> NodeId {
        if source == dest {
            return self.entity_mut(dest).pool.deep_copy(root);
        }
        let taken = self.slots[source.0 as usize]
            .take()
            .expect("import from destroyed entity");
        let imported = self.entity_mut(dest).pool.import_from(&taken.pool, root);
        self.slots[source.0 as usize] = Some(taken);
        imported
    }

    /// Pick a contained-entity id that is not yet in use under `parent`.
    pub fn unused_contained_name(&self, parent: EntityId) -> String {
        let entity = self.entity(parent);
        let mut n = entity.contained.len();
        loop {
            let candidate = format!("_{n}");
            if !entity.contained.contains_key(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Find the first node in `root`'s subtree carrying `label`. Cycle-safe,
/// depth-first in child order.
pub fn find_labeled_node(pool: &NodePool, root: NodeId, label: StringId) -> Option<NodeId> {
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        if pool.node(id).labels.contains(&label) {
            return Some(id);
        }
        let mut children = pool.node(id).child_ids();
        children.reverse();
        stack.extend(children);
    }
    None
}

/// Collect every labeled node in `root`'s subtree as (label, node) pairs.
pub fn all_labeled_nodes(pool: &NodePool, root: NodeId) -> Vec<(StringId, NodeId)> {
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut found = Vec::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        for &label in &pool.node(id).labels {
            found.push((label, id));
        }
        let mut children = pool.node(id).child_ids();
        children.reverse();
        stack.extend(children);
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use sylva_tree::Opcode;

    fn store() -> EntityStore {
        EntityStore::new(Arc::new(StringPool::new()))
    }

    #[test]
    fn test_create_and_contain() {
        let mut s = store();
        let parent = s.create("parent", "seed");
        let child = s.create("child", "seed2");
        s.add_contained(parent, "child", child);

        assert_eq!(s.container_of(child), Some(parent));
        assert_eq!(s.contained_by_name(parent, "child"), Some(child));
        assert_eq!(s.resolve_path(parent, &["child".to_string()]), Some(child));
        assert_eq!(s.total_contained(parent), 1);
        assert_eq!(s.depth_below(parent, child), Some(1));
    }

    #[test]
    fn test_destroy_recurses() {
        let mut s = store();
        let a = s.create("a", "");
        let b = s.create("b", "");
        let c = s.create("c", "");
        s.add_contained(a, "b", b);
        s.add_contained(b, "c", c);

        s.destroy(a);
        assert!(!s.exists(a));
        assert!(!s.exists(b));
        assert!(!s.exists(c));
    }

    #[test]
    fn test_set_root_pins_tree() {
        let mut s = store();
        let e = s.create("e", "");
        let pool = s.pool_mut(e);
        let root = pool.alloc(Opcode::List);
        let child = pool.alloc_number(1.0);
        pool.append_child(root, child);
        s.set_root(e, Some(root));

        let pool = s.pool_mut(e);
        pool.collect();
        assert!(pool.exists(root));
        assert!(pool.exists(child));
    }

    #[test]
    fn test_find_labeled_node() {
        let mut s = store();
        let e = s.create("e", "");
        let strings = Arc::clone(s.strings());
        let pool = s.pool_mut(e);
        let root = pool.alloc(Opcode::List);
        let labeled = pool.alloc_number(42.0);
        let label = strings.intern("answer");
        pool.node_mut(labeled).labels.push(label);
        pool.append_child(root, labeled);

        assert_eq!(find_labeled_node(pool, root, label), Some(labeled));
        let missing = strings.intern("missing");
        assert_eq!(find_labeled_node(pool, root, missing), None);
    }

    #[test]
    fn test_unused_contained_name() {
        let mut s = store();
        let parent = s.create("p", "");
        let child = s.create("x", "");
        s.add_contained(parent, "_0", child);
        assert_eq!(s.unused_contained_name(parent), "_1");
    }
}
