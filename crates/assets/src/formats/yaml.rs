//! YAML ↔ node-tree translation. Same data mapping as the JSON
//! translator; non-string mapping keys coerce to their display text.

use serde_yaml::{Mapping, Value};

use sylva_tree::{NodeId, NodePool, Opcode};

pub fn yaml_to_node(pool: &mut NodePool, value: &Value) -> NodeId {
    match value {
        Value::Null => pool.alloc_null(),
        Value::Bool(b) => pool.alloc_bool(*b),
        Value::Number(n) => pool.alloc_number(n.as_f64().unwrap_or(f64::NAN)),
        Value::String(s) => pool.alloc_string(s),
        Value::Sequence(items) => {
            let list = pool.alloc(Opcode::List);
            for item in items {
                let child = yaml_to_node(pool, item);
                pool.append_child(list, child);
            }
            list
        }
        Value::Mapping(map) => {
            let assoc = pool.alloc(Opcode::Assoc);
            for (key, item) in map {
                let key = yaml_key_text(key);
                let child = yaml_to_node(pool, item);
                if let Some(prev) = pool.assoc_insert(assoc, &key, child) {
                    pool.free_tree(prev);
                }
            }
            assoc
        }
        Value::Tagged(tagged) => yaml_to_node(pool, &tagged.value),
    }
}

fn yaml_key_text(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

pub fn node_to_yaml(pool: &NodePool, id: Option<NodeId>, sort_keys: bool) -> Value {
    let Some(id) = id else { return Value::Null };
    match pool.opcode(id) {
        Opcode::Null => Value::Null,
        Opcode::True => Value::Bool(true),
        Opcode::False => Value::Bool(false),
        Opcode::Number => Value::Number(pool.number_value(id).into()),
        Opcode::Str | Opcode::Symbol => {
            Value::String(pool.string_value(id).unwrap_or_default())
        }
        Opcode::List => Value::Sequence(
            pool.children(id)
                .into_iter()
                .map(|c| node_to_yaml(pool, Some(c), sort_keys))
                .collect(),
        ),
        Opcode::Assoc => {
            let mut pairs: Vec<(String, NodeId)> = pool
                .assoc(id)
                .iter()
                .map(|(&k, &v)| (pool.strings().resolve_or_empty(k), v))
                .collect();
            if sort_keys {
                pairs.sort_by(|a, b| a.0.cmp(&b.0));
            }
            let mut map = Mapping::new();
            for (key, value) in pairs {
                map.insert(Value::String(key), node_to_yaml(pool, Some(value), sort_keys));
            }
            Value::Mapping(map)
        }
        _ => Value::String(sylva_lang::unparse(pool, Some(id), false, sort_keys)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use sylva_foundation::StringPool;

    #[test]
    fn test_data_round_trip() {
        let mut pool = NodePool::new(Arc::new(StringPool::new()));
        let source: Value = serde_yaml::from_str("a:\n  - 1\n  - two\nb: true\n").unwrap();
        let node = yaml_to_node(&mut pool, &source);
        let back = node_to_yaml(&pool, Some(node), false);
        assert_eq!(source, back);
    }
}
