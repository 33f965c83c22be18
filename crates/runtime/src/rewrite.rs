//! Generic bottom-up tree rewriter.
//!
//! Visits each distinct sub-node once, preserves sharing (a second visit
//! to a shared child reuses the first visit's result), and flags
//! cycle-risk on ancestors when a shared subtree resurfaces or a body
//! reports side effects.

use std::collections::HashMap;

use sylva_tree::{NodeId, NodePool, NodeRef, Payload};

use crate::interpreter::Interpreter;

impl Interpreter<'_> {
    /// Rewrite `tree` bottom-up by `function`. The caller must have pushed
    /// a construction frame; each node's in-progress clone is exposed as
    /// the frame's current value while `function` runs on it.
    pub fn rewrite_by_function(&mut self, function: NodeId, tree: Option<NodeId>) -> NodeRef {
        let mut original_to_new: HashMap<NodeId, NodeId> = HashMap::new();
        let mut new_to_parent: HashMap<NodeId, Option<NodeId>> = HashMap::new();
        self.rewrite_inner(
            function,
            tree,
            None,
            &mut original_to_new,
            &mut new_to_parent,
        )
    }

    fn rewrite_inner(
        &mut self,
        function: NodeId,
        tree: Option<NodeId>,
        new_parent: Option<NodeId>,
        original_to_new: &mut HashMap<NodeId, NodeId>,
        new_to_parent: &mut HashMap<NodeId, Option<NodeId>>,
    ) -> NodeRef {
        let tree = match tree {
            Some(tree) => tree,
            None => self.pool_mut().alloc_null(),
        };

        // a revisited node reuses the first visit's result, and the path to
        // it may now contain a back-edge
        if let Some(&existing) = original_to_new.get(&tree) {
            flag_ancestors_cycle_check(self.pool_mut(), existing, new_to_parent);
            return NodeRef::new(existing, false);
        }

        let new_tree = self.pool_mut().alloc_copy(tree);
        original_to_new.insert(tree, new_tree);
        new_to_parent.insert(new_tree, new_parent);
        self.pin(new_tree);

        match self.pool().node(new_tree).payload.clone() {
            Payload::Assoc(map) => {
                self.push_construction(Some(new_tree), None, None);
                for (key, child) in map {
                    let key_node = {
                        let strings = self.strings();
                        strings.acquire(key);
                        self.pool_mut().alloc_string_handoff(key)
                    };
                    self.set_top_current_index_node(key_node);
                    self.set_top_current_value(Some(child));
                    let new_child = self.rewrite_inner(
                        function,
                        Some(child),
                        Some(new_tree),
                        original_to_new,
                        new_to_parent,
                    );
                    let new_child_id = match new_child.id {
                        Some(id) => id,
                        None => self.pool_mut().alloc_null(),
                    };
                    if let Payload::Assoc(m) = &mut self.pool_mut().node_mut(new_tree).payload {
                        m.insert(key, new_child_id);
                    }
                }
                if self.pop_construction() {
                    flag_ancestors_cycle_check(self.pool_mut(), new_tree, new_to_parent);
                }
            }
            Payload::List(children) => {
                if !children.is_empty() {
                    self.push_construction(Some(new_tree), None, None);
                    for (index, child) in children.into_iter().enumerate() {
                        self.set_top_current_index_number(index as f64);
                        self.set_top_current_value(Some(child));
                        let new_child = self.rewrite_inner(
                            function,
                            Some(child),
                            Some(new_tree),
                            original_to_new,
                            new_to_parent,
                        );
                        let new_child_id = match new_child.id {
                            Some(id) => id,
                            None => self.pool_mut().alloc_null(),
                        };
                        self.pool_mut().set_child_at(new_tree, index, new_child_id);
                    }
                    if self.pop_construction() {
                        flag_ancestors_cycle_check(self.pool_mut(), new_tree, new_to_parent);
                    }
                }
            }
            _ => {}
        }

        // the function observes the finished clone as the current value of
        // the enclosing frame
        self.set_top_current_value(Some(new_tree));
        let result = self.interpret_node_ref(Some(function));
        self.unpin(1);
        result
    }
}

/// Climb the new-node parent map setting cycle checks; stops early at a
/// node already flagged.
fn flag_ancestors_cycle_check(
    pool: &mut NodePool,
    mut node: NodeId,
    new_to_parent: &HashMap<NodeId, Option<NodeId>>,
) {
    loop {
        if pool.node(node).needs_cycle_check {
            break;
        }
        pool.set_cycle_check(node, true);
        match new_to_parent.get(&node) {
            Some(Some(parent)) => node = *parent,
            _ => break,
        }
    }
}
