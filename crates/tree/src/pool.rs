//! Per-entity node pool.
//!
//! An arena of node records with a free list, pin counts for GC roots, and
//! a mark-sweep collection pass driven by allocation pressure. The pool is
//! the only allocator for a given entity's nodes; ids never cross pools
//! (cross-pool transfer goes through [`NodePool::import_from`], which deep
//! copies).
//!
//! Ownership of interned strings is one refcount per stored id: every
//! payload/label/comment/key id is acquired when stored and released when
//! the node is freed or swept.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::trace;

use sylva_foundation::{StringId, StringPool, NOT_A_STRING_ID};

use crate::node::{Node, NodeId, NodeRef, Payload};
use crate::opcode::{Opcode, PayloadKind};

/// Collection is considered once this many allocations have happened since
/// the previous pass.
const DEFAULT_COLLECT_THRESHOLD: usize = 4096;

pub struct NodePool {
    slots: Vec<Option<Node>>,
    free: Vec<u32>,
    kept: HashMap<NodeId, u32>,
    strings: Arc<StringPool>,
    allocs_since_collect: usize,
    collect_threshold: usize,
}

impl NodePool {
    pub fn new(strings: Arc<StringPool>) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            kept: HashMap::new(),
            strings,
            allocs_since_collect: 0,
            collect_threshold: DEFAULT_COLLECT_THRESHOLD,
        }
    }

    /// The intern pool this node pool releases string references into.
    pub fn strings(&self) -> &Arc<StringPool> {
        &self.strings
    }

    /// Number of live (allocated, unswept) nodes.
    pub fn used_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    // ---- allocation ----------------------------------------------------

    fn insert(&mut self, node: Node) -> NodeId {
        self.allocs_since_collect += 1;
        match self.free.pop() {
            Some(slot) => {
                self.slots[slot as usize] = Some(node);
                NodeId(slot)
            }
            None => {
                self.slots.push(Some(node));
                NodeId((self.slots.len() - 1) as u32)
            }
        }
    }

    /// Allocate a node of `op` with its default payload.
    pub fn alloc(&mut self, op: Opcode) -> NodeId {
        self.insert(Node::new(op))
    }

    pub fn alloc_number(&mut self, value: f64) -> NodeId {
        let mut node = Node::new(Opcode::Number);
        node.payload = Payload::Number(value);
        self.insert(node)
    }

    /// Allocate a string node, interning `text` (takes one reference).
    pub fn alloc_string(&mut self, text: &str) -> NodeId {
        let id = self.strings.intern(text);
        self.alloc_string_handoff(id)
    }

    /// Allocate a string node from an id the caller already holds a
    /// reference on; ownership of that reference transfers to the node.
    pub fn alloc_string_handoff(&mut self, id: StringId) -> NodeId {
        let mut node = Node::new(Opcode::Str);
        node.payload = Payload::Str(id);
        self.insert(node)
    }

    /// Allocate a symbol node, interning `text`.
    pub fn alloc_symbol(&mut self, text: &str) -> NodeId {
        let id = self.strings.intern(text);
        let mut node = Node::new(Opcode::Symbol);
        node.payload = Payload::Str(id);
        self.insert(node)
    }

    pub fn alloc_bool(&mut self, value: bool) -> NodeId {
        self.alloc(if value { Opcode::True } else { Opcode::False })
    }

    pub fn alloc_null(&mut self) -> NodeId {
        self.alloc(Opcode::Null)
    }

    /// Shallow copy: clones the record and acquires its string references.
    /// Children are shared with the original.
    pub fn alloc_copy(&mut self, id: NodeId) -> NodeId {
        let node = self.node(id).clone();
        self.acquire_node_strings(&node);
        self.insert(node)
    }

    fn acquire_node_strings(&self, node: &Node) {
        match &node.payload {
            Payload::Str(s) => {
                self.strings.acquire(*s);
            }
            Payload::Assoc(map) => {
                for key in map.keys() {
                    self.strings.acquire(*key);
                }
            }
            _ => {}
        }
        for label in &node.labels {
            self.strings.acquire(*label);
        }
        self.strings.acquire(node.comments);
    }

    // ---- access --------------------------------------------------------

    pub fn node(&self, id: NodeId) -> &Node {
        self.slots[id.0 as usize]
            .as_ref()
            .expect("access to deallocated node")
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.slots[id.0 as usize]
            .as_mut()
            .expect("access to deallocated node")
    }

    pub fn exists(&self, id: NodeId) -> bool {
        self.slots
            .get(id.0 as usize)
            .map(|s| s.is_some())
            .unwrap_or(false)
    }

    pub fn opcode(&self, id: NodeId) -> Opcode {
        self.node(id).opcode
    }

    /// Whether `r` is null or a `null` node.
    pub fn is_null_ref(&self, r: NodeRef) -> bool {
        match r.id {
            None => true,
            Some(id) => self.opcode(id) == Opcode::Null,
        }
    }

    pub fn number_value(&self, id: NodeId) -> f64 {
        match &self.node(id).payload {
            Payload::Number(v) => *v,
            _ => f64::NAN,
        }
    }

    pub fn string_id(&self, id: NodeId) -> StringId {
        match &self.node(id).payload {
            Payload::Str(s) => *s,
            _ => NOT_A_STRING_ID,
        }
    }

    pub fn string_value(&self, id: NodeId) -> Option<String> {
        match &self.node(id).payload {
            Payload::Str(s) => self.strings.resolve(*s),
            _ => None,
        }
    }

    /// Ordered children (clone); empty for non-list payloads.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        match &self.node(id).payload {
            Payload::List(children) => children.clone(),
            _ => Vec::new(),
        }
    }

    /// Mapped children (clone); empty for non-assoc payloads.
    pub fn assoc(&self, id: NodeId) -> IndexMap<StringId, NodeId> {
        match &self.node(id).payload {
            Payload::Assoc(map) => map.clone(),
            _ => IndexMap::new(),
        }
    }

    pub fn assoc_get(&self, id: NodeId, key: StringId) -> Option<NodeId> {
        match &self.node(id).payload {
            Payload::Assoc(map) => map.get(&key).copied(),
            _ => None,
        }
    }

    pub fn child_count(&self, id: NodeId) -> usize {
        self.node(id).child_count()
    }

    // ---- mutation ------------------------------------------------------

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if let Payload::List(children) = &mut self.node_mut(parent).payload {
            children.push(child);
        }
    }

    pub fn set_children(&mut self, parent: NodeId, new_children: Vec<NodeId>) {
        if let Payload::List(children) = &mut self.node_mut(parent).payload {
            *children = new_children;
        }
    }

    pub fn set_child_at(&mut self, parent: NodeId, index: usize, child: NodeId) {
        if let Payload::List(children) = &mut self.node_mut(parent).payload {
            if index < children.len() {
                children[index] = child;
            }
        }
    }

    pub fn pop_child(&mut self, parent: NodeId) -> Option<NodeId> {
        if let Payload::List(children) = &mut self.node_mut(parent).payload {
            children.pop()
        } else {
            None
        }
    }

    /// Insert into an assoc payload, interning `key`. Returns the displaced
    /// child, if any.
    pub fn assoc_insert(&mut self, parent: NodeId, key: &str, child: NodeId) -> Option<NodeId> {
        let key_id = self.strings.intern(key);
        self.assoc_insert_handoff(parent, key_id, child)
    }

    /// Insert into an assoc payload taking ownership of the caller's key
    /// reference. If the key was already present its reference is released
    /// and the previous child returned.
    pub fn assoc_insert_handoff(
        &mut self,
        parent: NodeId,
        key: StringId,
        child: NodeId,
    ) -> Option<NodeId> {
        let strings = Arc::clone(&self.strings);
        if let Payload::Assoc(map) = &mut self.node_mut(parent).payload {
            match map.insert(key, child) {
                Some(prev) => {
                    // the map already held a reference for this key
                    strings.release(key);
                    Some(prev)
                }
                None => None,
            }
        } else {
            strings.release(key);
            None
        }
    }

    /// Remove an assoc entry, releasing the key reference. Returns the
    /// child that was bound.
    pub fn assoc_remove(&mut self, parent: NodeId, key: StringId) -> Option<NodeId> {
        let strings = Arc::clone(&self.strings);
        if let Payload::Assoc(map) = &mut self.node_mut(parent).payload {
            let removed = map.shift_remove(&key);
            if removed.is_some() {
                strings.release(key);
            }
            removed
        } else {
            None
        }
    }

    pub fn set_number_value(&mut self, id: NodeId, value: f64) {
        if let Payload::Number(v) = &mut self.node_mut(id).payload {
            *v = value;
        }
    }

    /// Replace a string payload, taking ownership of the caller's reference
    /// on `sid` and releasing the displaced one.
    pub fn set_string_payload(&mut self, id: NodeId, sid: StringId) {
        let strings = Arc::clone(&self.strings);
        if let Payload::Str(old) = &mut self.node_mut(id).payload {
            strings.release(*old);
            *old = sid;
        } else {
            strings.release(sid);
        }
    }

    /// Replace a node's opcode, converting the payload to the new kind's
    /// shape. Ordered↔mapped conversions keep children (mapped→ordered by
    /// value order; ordered→mapped is emptied, keys being unknown).
    pub fn set_opcode(&mut self, id: NodeId, op: Opcode) {
        let strings = Arc::clone(&self.strings);
        let node = self.node_mut(id);
        if node.opcode == op {
            return;
        }
        let old = std::mem::replace(&mut node.payload, Payload::Empty);
        let new_payload = match (old, op.payload_kind()) {
            (Payload::List(children), PayloadKind::Ordered) => Payload::List(children),
            (Payload::Assoc(map), PayloadKind::Mapped) => Payload::Assoc(map),
            (Payload::Assoc(map), PayloadKind::Ordered) => {
                for key in map.keys() {
                    strings.release(*key);
                }
                Payload::List(map.values().copied().collect())
            }
            (Payload::Number(v), PayloadKind::Number) => Payload::Number(v),
            (Payload::Str(s), PayloadKind::Str) => Payload::Str(s),
            (old, kind) => {
                // release whatever the old payload held
                match old {
                    Payload::Str(s) => strings.release(s),
                    Payload::Assoc(map) => {
                        for key in map.keys() {
                            strings.release(*key);
                        }
                    }
                    _ => {}
                }
                match kind {
                    PayloadKind::Empty => Payload::Empty,
                    PayloadKind::Number => Payload::Number(0.0),
                    PayloadKind::Str => Payload::Str(NOT_A_STRING_ID),
                    PayloadKind::Ordered => Payload::List(Vec::new()),
                    PayloadKind::Mapped => Payload::Assoc(IndexMap::new()),
                }
            }
        };
        node.opcode = op;
        node.payload = new_payload;
        node.idempotent = op.is_data_kind() && node.child_count() == 0 && !node.has_labels();
    }

    /// Drop labels and comments (used when a node is repurposed as a fresh
    /// value).
    pub fn clear_metadata(&mut self, id: NodeId) {
        let strings = Arc::clone(&self.strings);
        let node = self.node_mut(id);
        for label in node.labels.drain(..) {
            strings.release(label);
        }
        strings.release(node.comments);
        node.comments = NOT_A_STRING_ID;
    }

    pub fn set_cycle_check(&mut self, id: NodeId, value: bool) {
        self.node_mut(id).needs_cycle_check = value;
    }

    pub fn set_concurrent(&mut self, id: NodeId, value: bool) {
        self.node_mut(id).concurrent = value;
    }

    pub fn set_idempotent(&mut self, id: NodeId, value: bool) {
        self.node_mut(id).idempotent = value;
    }

    // ---- copying -------------------------------------------------------

    /// Deep copy a subtree, preserving sharing and tolerating cycles.
    pub fn deep_copy(&mut self, root: NodeId) -> NodeId {
        let mut mapping: HashMap<NodeId, NodeId> = HashMap::new();
        self.deep_copy_inner(root, &mut mapping)
    }

    fn deep_copy_inner(&mut self, original: NodeId, mapping: &mut HashMap<NodeId, NodeId>) -> NodeId {
        if let Some(&copied) = mapping.get(&original) {
            return copied;
        }
        let copied = self.alloc_copy(original);
        mapping.insert(original, copied);

        match self.node(copied).payload.clone() {
            Payload::List(children) => {
                let new_children: Vec<NodeId> = children
                    .into_iter()
                    .map(|c| self.deep_copy_inner(c, mapping))
                    .collect();
                self.set_children(copied, new_children);
            }
            Payload::Assoc(map) => {
                let new_map: IndexMap<StringId, NodeId> = map
                    .into_iter()
                    .map(|(k, v)| (k, self.deep_copy_inner(v, mapping)))
                    .collect();
                if let Payload::Assoc(m) = &mut self.node_mut(copied).payload {
                    *m = new_map;
                }
            }
            _ => {}
        }
        copied
    }

    /// Deep copy a subtree that lives in another pool into this one.
    pub fn import_from(&mut self, other: &NodePool, root: NodeId) -> NodeId {
        let mut mapping: HashMap<NodeId, NodeId> = HashMap::new();
        self.import_inner(other, root, &mut mapping)
    }

    fn import_inner(
        &mut self,
        other: &NodePool,
        original: NodeId,
        mapping: &mut HashMap<NodeId, NodeId>,
    ) -> NodeId {
        if let Some(&copied) = mapping.get(&original) {
            return copied;
        }
        let node = other.node(original).clone();
        self.acquire_node_strings(&node);
        let copied = self.insert(node);
        mapping.insert(original, copied);

        match self.node(copied).payload.clone() {
            Payload::List(children) => {
                let new_children: Vec<NodeId> = children
                    .into_iter()
                    .map(|c| self.import_inner(other, c, mapping))
                    .collect();
                self.set_children(copied, new_children);
            }
            Payload::Assoc(map) => {
                let new_map: IndexMap<StringId, NodeId> = map
                    .into_iter()
                    .map(|(k, v)| (k, self.import_inner(other, v, mapping)))
                    .collect();
                if let Payload::Assoc(m) = &mut self.node_mut(copied).payload {
                    *m = new_map;
                }
            }
            _ => {}
        }
        copied
    }

    // ---- freeing -------------------------------------------------------

    fn release_node_strings(&self, node: &Node) {
        match &node.payload {
            Payload::Str(s) => self.strings.release(*s),
            Payload::Assoc(map) => {
                for key in map.keys() {
                    self.strings.release(*key);
                }
            }
            _ => {}
        }
        for label in &node.labels {
            self.strings.release(*label);
        }
        self.strings.release(node.comments);
    }

    /// Free a single node (children untouched).
    pub fn free_node(&mut self, id: NodeId) {
        if let Some(node) = self.slots[id.0 as usize].take() {
            self.release_node_strings(&node);
            self.free.push(id.0);
        }
    }

    /// Free a whole subtree. Cycle-safe; every distinct node is freed once.
    pub fn free_tree(&mut self, root: NodeId) {
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) || !self.exists(id) {
                continue;
            }
            stack.extend(self.node(id).child_ids());
        }
        for id in visited {
            if self.exists(id) {
                self.free_node(id);
            }
        }
    }

    /// Free a referenced subtree only when the reference is unique and the
    /// root is not pinned.
    pub fn free_tree_if_possible(&mut self, r: NodeRef) {
        let Some(id) = r.id else { return };
        if !r.unique || self.kept.contains_key(&id) {
            return;
        }
        self.free_tree(id);
    }

    // ---- GC ------------------------------------------------------------

    /// Pin a root so collection keeps its subtree alive.
    pub fn keep(&mut self, id: NodeId) {
        *self.kept.entry(id).or_insert(0) += 1;
    }

    /// Release one pin on a root.
    pub fn release_kept(&mut self, id: NodeId) {
        if let Some(count) = self.kept.get_mut(&id) {
            *count -= 1;
            if *count == 0 {
                self.kept.remove(&id);
            }
        }
    }

    pub fn is_kept(&self, id: NodeId) -> bool {
        self.kept.contains_key(&id)
    }

    /// Allocation tick: runs a collection pass when enough allocations
    /// happened since the last one.
    pub fn tick(&mut self) {
        if self.allocs_since_collect >= self.collect_threshold {
            self.collect();
        }
    }

    /// Mark-sweep over the arena; everything unreachable from the pinned
    /// roots is freed.
    pub fn collect(&mut self) {
        let mut marked: HashSet<NodeId> = HashSet::new();
        let mut stack: Vec<NodeId> = self.kept.keys().copied().collect();
        while let Some(id) = stack.pop() {
            if !marked.insert(id) || !self.exists(id) {
                continue;
            }
            stack.extend(self.node(id).child_ids());
        }

        let before = self.used_count();
        for slot in 0..self.slots.len() {
            let id = NodeId(slot as u32);
            if self.slots[slot].is_some() && !marked.contains(&id) {
                self.free_node(id);
            }
        }
        self.allocs_since_collect = 0;
        trace!(
            swept = before - self.used_count(),
            live = self.used_count(),
            "node pool collection"
        );
    }

    /// Lower the collection threshold, mostly for tests.
    pub fn set_collect_threshold(&mut self, threshold: usize) {
        self.collect_threshold = threshold;
    }

    // ---- integrity -----------------------------------------------------

    /// Verify that no live node references a deallocated slot. A broken
    /// pool is the one condition allowed to abort the process, and only
    /// through this optional pass.
    pub fn verify_integrity(&self) {
        for (slot, entry) in self.slots.iter().enumerate() {
            if let Some(node) = entry {
                for child in node.child_ids() {
                    assert!(
                        self.exists(child),
                        "node {slot} references deallocated child {child:?}"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> NodePool {
        NodePool::new(Arc::new(StringPool::new()))
    }

    #[test]
    fn test_alloc_and_free_recycles_slots() {
        let mut p = pool();
        let a = p.alloc_number(1.0);
        assert_eq!(p.used_count(), 1);
        p.free_node(a);
        assert_eq!(p.used_count(), 0);
        let b = p.alloc_number(2.0);
        assert_eq!(a.0, b.0);
    }

    #[test]
    fn test_string_refcounts_follow_nodes() {
        let p = Arc::new(StringPool::new());
        let mut np = NodePool::new(Arc::clone(&p));
        let n = np.alloc_string("hello");
        let sid = np.string_id(n);
        assert_eq!(p.ref_count(sid), 1);
        let copy = np.alloc_copy(n);
        assert_eq!(p.ref_count(sid), 2);
        np.free_node(n);
        np.free_node(copy);
        assert_eq!(p.ref_count(sid), 0);
    }

    #[test]
    fn test_deep_copy_preserves_sharing() {
        let mut p = pool();
        let shared = p.alloc_number(7.0);
        let list = p.alloc(Opcode::List);
        p.append_child(list, shared);
        p.append_child(list, shared);

        let copy = p.deep_copy(list);
        let children = p.children(copy);
        assert_eq!(children.len(), 2);
        assert_eq!(children[0], children[1]);
        assert_ne!(children[0], shared);
    }

    #[test]
    fn test_deep_copy_tolerates_cycles() {
        let mut p = pool();
        let list = p.alloc(Opcode::List);
        p.append_child(list, list);
        p.set_cycle_check(list, true);

        let copy = p.deep_copy(list);
        assert_eq!(p.children(copy), vec![copy]);
    }

    #[test]
    fn test_collect_keeps_pinned_subtrees() {
        let mut p = pool();
        let keep_child = p.alloc_number(1.0);
        let keep_root = p.alloc(Opcode::List);
        p.append_child(keep_root, keep_child);
        let garbage = p.alloc_number(2.0);

        p.keep(keep_root);
        p.collect();

        assert!(p.exists(keep_root));
        assert!(p.exists(keep_child));
        assert!(!p.exists(garbage));
    }

    #[test]
    fn test_free_tree_if_possible_respects_uniqueness_and_pins() {
        let mut p = pool();
        let a = p.alloc_number(1.0);
        p.free_tree_if_possible(NodeRef::new(a, false));
        assert!(p.exists(a));

        p.keep(a);
        p.free_tree_if_possible(NodeRef::new(a, true));
        assert!(p.exists(a));

        p.release_kept(a);
        p.free_tree_if_possible(NodeRef::new(a, true));
        assert!(!p.exists(a));
    }

    #[test]
    fn test_assoc_insert_handoff_releases_duplicate_key() {
        let strings = Arc::new(StringPool::new());
        let mut p = NodePool::new(Arc::clone(&strings));
        let assoc = p.alloc(Opcode::Assoc);
        let v1 = p.alloc_number(1.0);
        let v2 = p.alloc_number(2.0);

        let k1 = strings.intern("x");
        assert!(p.assoc_insert_handoff(assoc, k1, v1).is_none());
        let k2 = strings.intern("x");
        assert_eq!(p.assoc_insert_handoff(assoc, k2, v2), Some(v1));
        // one held reference remains (the map's)
        assert_eq!(strings.ref_count(k1), 1);
    }

    #[test]
    fn test_set_opcode_converts_payload() {
        let mut p = pool();
        let n = p.alloc_number(3.0);
        p.set_opcode(n, Opcode::List);
        assert_eq!(p.opcode(n), Opcode::List);
        assert_eq!(p.children(n), Vec::<NodeId>::new());
    }
}
