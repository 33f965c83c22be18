//! Whole-tree helpers: structural equality, sizing, and immediate-value
//! conversions that need no evaluation.

use std::collections::{HashMap, HashSet};

use crate::node::{NodeId, Payload};
use crate::opcode::Opcode;
use crate::pool::NodePool;

/// Convert an immediate node to a number without evaluating anything.
/// Null and non-numeric shapes become NaN, matching the coercion table.
pub fn node_to_number(pool: &NodePool, id: Option<NodeId>) -> f64 {
    let Some(id) = id else { return f64::NAN };
    match pool.opcode(id) {
        Opcode::Number => pool.number_value(id),
        Opcode::True => 1.0,
        Opcode::False => 0.0,
        Opcode::Null => f64::NAN,
        Opcode::Str | Opcode::Symbol => pool
            .string_value(id)
            .and_then(|s| s.trim().parse::<f64>().ok())
            .unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

/// Per-kind truth value. Numbers are true when nonzero and not NaN;
/// strings when nonempty; any other non-null node is true.
pub fn node_to_bool(pool: &NodePool, id: Option<NodeId>, value_if_null: bool) -> bool {
    let Some(id) = id else { return value_if_null };
    match pool.opcode(id) {
        Opcode::Null => value_if_null,
        Opcode::False => false,
        Opcode::True => true,
        Opcode::Number => {
            let v = pool.number_value(id);
            v != 0.0 && !v.is_nan()
        }
        Opcode::Str | Opcode::Symbol => pool
            .string_value(id)
            .map(|s| !s.is_empty())
            .unwrap_or(false),
        _ => true,
    }
}

/// String form of an immediate node; `None` when the node is not an
/// immediate (code trees go through the unparser instead).
pub fn immediate_to_string(pool: &NodePool, id: NodeId) -> Option<String> {
    match pool.opcode(id) {
        Opcode::Number => Some(format_number(pool.number_value(id))),
        Opcode::Str | Opcode::Symbol => pool.string_value(id),
        Opcode::True => Some("true".to_string()),
        Opcode::False => Some("false".to_string()),
        _ => None,
    }
}

/// Canonical number formatting: integral values print without a fraction,
/// so stored code round-trips stably.
pub fn format_number(v: f64) -> String {
    if v.is_nan() {
        return ".nan".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { ".inf" } else { "-.inf" }.to_string();
    }
    if v == v.trunc() && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

/// Structural equality of two subtrees in one pool. Cycle-tolerant: a
/// revisited pair is assumed equal (the cycle shape itself is compared by
/// the surrounding structure). NaN numbers compare equal to each other so
/// structural identity is reflexive.
pub fn tree_equal(pool: &NodePool, a: Option<NodeId>, b: Option<NodeId>) -> bool {
    let mut visited: HashSet<(NodeId, NodeId)> = HashSet::new();
    tree_equal_inner(pool, a, b, &mut visited)
}

fn number_eq(a: f64, b: f64) -> bool {
    (a.is_nan() && b.is_nan()) || a == b
}

fn tree_equal_inner(
    pool: &NodePool,
    a: Option<NodeId>,
    b: Option<NodeId>,
    visited: &mut HashSet<(NodeId, NodeId)>,
) -> bool {
    let (a, b) = match (a, b) {
        (None, None) => return true,
        (Some(a), None) => return pool.opcode(a) == Opcode::Null,
        (None, Some(b)) => return pool.opcode(b) == Opcode::Null,
        (Some(a), Some(b)) => (a, b),
    };
    if a == b {
        return true;
    }
    if !visited.insert((a, b)) {
        return true;
    }
    if pool.opcode(a) != pool.opcode(b) {
        return false;
    }
    match (&pool.node(a).payload, &pool.node(b).payload) {
        (Payload::Empty, Payload::Empty) => true,
        (Payload::Number(x), Payload::Number(y)) => number_eq(*x, *y),
        (Payload::Str(x), Payload::Str(y)) => {
            x == y || pool.strings().resolve(*x) == pool.strings().resolve(*y)
        }
        (Payload::List(xs), Payload::List(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .zip(ys.iter())
                    .all(|(&x, &y)| tree_equal_inner(pool, Some(x), Some(y), visited))
        }
        (Payload::Assoc(xs), Payload::Assoc(ys)) => {
            xs.len() == ys.len()
                && xs.iter().all(|(k, &x)| match ys.get(k) {
                    Some(&y) => tree_equal_inner(pool, Some(x), Some(y), visited),
                    None => false,
                })
        }
        _ => false,
    }
}

/// Count of distinct nodes in a subtree (cycle-safe).
pub fn total_size(pool: &NodePool, root: NodeId) -> usize {
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        stack.extend(pool.node(id).child_ids());
    }
    visited.len()
}

/// Recompute idempotency over a freshly built tree: a node is idempotent
/// when its kind is pure data, all children are idempotent, and it carries
/// no labels. Cycles are treated as non-idempotent.
pub fn update_idempotency(pool: &mut NodePool, root: NodeId) -> bool {
    let mut cache: HashMap<NodeId, bool> = HashMap::new();
    let result = idempotency_inner(pool, root, &mut cache, &mut HashSet::new());
    for (id, value) in cache {
        pool.set_idempotent(id, value);
    }
    result
}

fn idempotency_inner(
    pool: &NodePool,
    id: NodeId,
    cache: &mut HashMap<NodeId, bool>,
    in_progress: &mut HashSet<NodeId>,
) -> bool {
    if let Some(&v) = cache.get(&id) {
        return v;
    }
    if !in_progress.insert(id) {
        return false;
    }
    let node = pool.node(id);
    let mut value = node.opcode.is_data_kind() && !node.has_labels();
    if value {
        for child in node.child_ids() {
            if !idempotency_inner(pool, child, cache, in_progress) {
                value = false;
                break;
            }
        }
    }
    in_progress.remove(&id);
    cache.insert(id, value);
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use sylva_foundation::StringPool;

    fn pool() -> NodePool {
        NodePool::new(Arc::new(StringPool::new()))
    }

    #[test]
    fn test_to_number_conversions() {
        let mut p = pool();
        let n = p.alloc_number(4.5);
        let s = p.alloc_string("12");
        let bad = p.alloc_string("wat");
        assert_eq!(node_to_number(&p, Some(n)), 4.5);
        assert_eq!(node_to_number(&p, Some(s)), 12.0);
        assert!(node_to_number(&p, Some(bad)).is_nan());
        assert!(node_to_number(&p, None).is_nan());
    }

    #[test]
    fn test_truth_values() {
        let mut p = pool();
        let zero = p.alloc_number(0.0);
        let one = p.alloc_number(1.0);
        let empty = p.alloc_string("");
        let full = p.alloc_string("x");
        assert!(!node_to_bool(&p, Some(zero), true));
        assert!(node_to_bool(&p, Some(one), false));
        assert!(!node_to_bool(&p, Some(empty), true));
        assert!(node_to_bool(&p, Some(full), false));
        assert!(node_to_bool(&p, None, true));
        assert!(!node_to_bool(&p, None, false));
    }

    #[test]
    fn test_format_number_integral() {
        assert_eq!(format_number(6.0), "6");
        assert_eq!(format_number(-2.0), "-2");
        assert_eq!(format_number(2.5), "2.5");
    }

    #[test]
    fn test_tree_equality() {
        let mut p = pool();
        let a = p.alloc(Opcode::List);
        let a1 = p.alloc_number(1.0);
        p.append_child(a, a1);
        let b = p.alloc(Opcode::List);
        let b1 = p.alloc_number(1.0);
        p.append_child(b, b1);
        assert!(tree_equal(&p, Some(a), Some(b)));

        p.set_number_value(b1, 2.0);
        assert!(!tree_equal(&p, Some(a), Some(b)));
    }

    #[test]
    fn test_total_size_counts_shared_once() {
        let mut p = pool();
        let shared = p.alloc_number(1.0);
        let list = p.alloc(Opcode::List);
        p.append_child(list, shared);
        p.append_child(list, shared);
        assert_eq!(total_size(&p, list), 2);
    }

    #[test]
    fn test_idempotency_propagates() {
        let mut p = pool();
        let lit = p.alloc_number(1.0);
        let sym = p.alloc_symbol("x");
        let data = p.alloc(Opcode::List);
        p.append_child(data, lit);
        assert!(update_idempotency(&mut p, data));

        p.append_child(data, sym);
        assert!(!update_idempotency(&mut p, data));
    }
}
