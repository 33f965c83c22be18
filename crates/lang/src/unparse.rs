//! Unparser: render a tree back into textual source.
//!
//! The output re-parses to a structurally equal tree. With `sort_keys`,
//! assoc entries are emitted in key order so stored files are stable
//! across runs regardless of insertion order.

use std::collections::HashSet;

use sylva_tree::tree_ops::format_number;
use sylva_tree::{NodeId, NodePool, Opcode};

use crate::lexer::escape;

/// Render `root` as source text. `pretty` adds indentation and comments;
/// compact output is a single line without comments.
pub fn unparse(pool: &NodePool, root: Option<NodeId>, pretty: bool, sort_keys: bool) -> String {
    let Some(root) = root else {
        return "null".to_string();
    };
    let mut writer = Writer {
        pool,
        pretty,
        sort_keys,
        out: String::new(),
        in_path: HashSet::new(),
    };
    writer.write(root, 0);
    if pretty {
        writer.out.push('\n');
    }
    writer.out
}

struct Writer<'p> {
    pool: &'p NodePool,
    pretty: bool,
    sort_keys: bool,
    out: String,
    in_path: HashSet<NodeId>,
}

impl Writer<'_> {
    fn indent(&mut self, depth: usize) {
        for _ in 0..depth {
            self.out.push_str("  ");
        }
    }

    fn write(&mut self, id: NodeId, depth: usize) {
        // break back-edges so cyclic graphs still print
        if !self.in_path.insert(id) {
            self.out.push_str("null");
            return;
        }

        let node = self.pool.node(id);
        if self.pretty && node.has_comments() {
            if let Some(text) = self.pool.strings().resolve(node.comments) {
                for line in text.lines() {
                    self.out.push_str("; ");
                    self.out.push_str(line);
                    self.out.push('\n');
                    self.indent(depth);
                }
            }
        }
        for &label in &node.labels {
            if let Some(text) = self.pool.strings().resolve(label) {
                self.out.push('#');
                self.out.push_str(&text);
                self.out.push(' ');
            }
        }

        match node.opcode {
            Opcode::Number => self.out.push_str(&format_number(self.pool.number_value(id))),
            Opcode::Str => {
                let text = self.pool.string_value(id).unwrap_or_default();
                self.out.push_str(&escape(&text));
            }
            Opcode::Symbol => {
                let text = self.pool.string_value(id).unwrap_or_default();
                self.out.push_str(&text);
            }
            Opcode::True => self.out.push_str("true"),
            Opcode::False => self.out.push_str("false"),
            Opcode::Null => self.out.push_str("null"),
            Opcode::Assoc => self.write_assoc(id, depth),
            _ => self.write_ordered(id, depth),
        }

        self.in_path.remove(&id);
    }

    fn write_ordered(&mut self, id: NodeId, depth: usize) {
        let op = self.pool.opcode(id);
        let children = self.pool.children(id);
        self.out.push('(');
        self.out.push_str(op.name());
        if children.is_empty() {
            self.out.push(')');
            return;
        }
        if self.multiline(&children) {
            for child in children {
                self.out.push('\n');
                self.indent(depth + 1);
                self.write(child, depth + 1);
            }
            self.out.push('\n');
            self.indent(depth);
            self.out.push(')');
        } else {
            for child in children {
                self.out.push(' ');
                self.write(child, depth);
            }
            self.out.push(')');
        }
    }

    fn write_assoc(&mut self, id: NodeId, depth: usize) {
        let map = self.pool.assoc(id);
        let mut pairs: Vec<(String, NodeId)> = map
            .iter()
            .map(|(&k, &v)| (self.pool.strings().resolve_or_empty(k), v))
            .collect();
        if self.sort_keys {
            pairs.sort_by(|a, b| a.0.cmp(&b.0));
        }

        self.out.push_str("(assoc");
        if pairs.is_empty() {
            self.out.push(')');
            return;
        }
        let children: Vec<NodeId> = pairs.iter().map(|(_, v)| *v).collect();
        if self.multiline(&children) {
            for (key, value) in pairs {
                self.out.push('\n');
                self.indent(depth + 1);
                self.write_key(&key);
                self.out.push(' ');
                self.write(value, depth + 1);
            }
            self.out.push('\n');
            self.indent(depth);
            self.out.push(')');
        } else {
            for (key, value) in pairs {
                self.out.push(' ');
                self.write_key(&key);
                self.out.push(' ');
                self.write(value, depth);
            }
            self.out.push(')');
        }
    }

    fn write_key(&mut self, key: &str) {
        if key_is_bare_safe(key) {
            self.out.push_str(key);
        } else {
            self.out.push_str(&escape(key));
        }
    }

    fn multiline(&self, children: &[NodeId]) -> bool {
        if !self.pretty {
            return false;
        }
        children.len() > 4
            || children.iter().any(|&c| {
                let node = self.pool.node(c);
                node.child_count() > 0 || node.has_comments() || node.has_labels()
            })
    }
}

fn key_is_bare_safe(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| !c.is_whitespace() && !"()[]{};\"#".contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use std::sync::Arc;
    use sylva_foundation::StringPool;
    use sylva_tree::tree_ops::tree_equal;

    fn pool() -> NodePool {
        NodePool::new(Arc::new(StringPool::new()))
    }

    fn round_trip(source: &str) {
        let mut p = pool();
        let first = parse(source, &mut p).unwrap();
        let text = unparse(&p, first.id, false, false);
        let second = parse(&text, &mut p).unwrap();
        assert!(
            tree_equal(&p, first.id, second.id),
            "round trip changed {source:?} -> {text:?}"
        );
    }

    #[test]
    fn test_compact_output() {
        let mut p = pool();
        let root = parse("(+ 1 2 3)", &mut p).unwrap();
        assert_eq!(unparse(&p, root.id, false, false), "(+ 1 2 3)");
    }

    #[test]
    fn test_round_trips() {
        round_trip("(+ 1 2 3)");
        round_trip(r#"(let (assoc x 1) (seq (assign x 2) x))"#);
        round_trip(r#"(list "two words" sym 4.5 true null)"#);
        round_trip("(assoc \"a key\" 1 plain 2)");
    }

    #[test]
    fn test_sorted_keys_are_stable() {
        let mut p = pool();
        let a = parse("(assoc b 2 a 1)", &mut p).unwrap();
        let b = parse("(assoc a 1 b 2)", &mut p).unwrap();
        assert_eq!(
            unparse(&p, a.id, false, true),
            unparse(&p, b.id, false, true)
        );
    }

    #[test]
    fn test_cycle_prints_without_hanging() {
        let mut p = pool();
        let list = p.alloc(Opcode::List);
        p.append_child(list, list);
        p.set_cycle_check(list, true);
        assert_eq!(unparse(&p, Some(list), false, false), "(list null)");
    }

    #[test]
    fn test_labels_round_trip() {
        let mut p = pool();
        let root = parse("#entry (seq 1)", &mut p).unwrap();
        let text = unparse(&p, root.id, false, false);
        assert_eq!(text, "#entry (seq 1)");
    }
}
