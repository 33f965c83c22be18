//! JSON ↔ node-tree translation.
//!
//! Data maps directly (null/bool/number/string/array/object). A node that
//! is code rather than data serializes as its unparsed source string, so
//! arbitrary trees still survive a JSON round trip in readable form.

use serde_json::{Map, Number, Value};

use sylva_tree::{NodeId, NodePool, Opcode};

pub fn json_to_node(pool: &mut NodePool, value: &Value) -> NodeId {
    match value {
        Value::Null => pool.alloc_null(),
        Value::Bool(b) => pool.alloc_bool(*b),
        Value::Number(n) => pool.alloc_number(n.as_f64().unwrap_or(f64::NAN)),
        Value::String(s) => pool.alloc_string(s),
        Value::Array(items) => {
            let list = pool.alloc(Opcode::List);
            for item in items {
                let child = json_to_node(pool, item);
                pool.append_child(list, child);
            }
            list
        }
        Value::Object(map) => {
            let assoc = pool.alloc(Opcode::Assoc);
            for (key, item) in map {
                let child = json_to_node(pool, item);
                if let Some(prev) = pool.assoc_insert(assoc, key, child) {
                    pool.free_tree(prev);
                }
            }
            assoc
        }
    }
}

pub fn node_to_json(pool: &NodePool, id: Option<NodeId>, sort_keys: bool) -> Value {
    let Some(id) = id else { return Value::Null };
    match pool.opcode(id) {
        Opcode::Null => Value::Null,
        Opcode::True => Value::Bool(true),
        Opcode::False => Value::Bool(false),
        Opcode::Number => Number::from_f64(pool.number_value(id))
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Opcode::Str | Opcode::Symbol => {
            Value::String(pool.string_value(id).unwrap_or_default())
        }
        Opcode::List => Value::Array(
            pool.children(id)
                .into_iter()
                .map(|c| node_to_json(pool, Some(c), sort_keys))
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
            let mut map = Map::new();
            for (key, value) in pairs {
                map.insert(key, node_to_json(pool, Some(value), sort_keys));
            }
            Value::Object(map)
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
        let source: Value =
            serde_json::from_str(r#"{"a": [1, 2.5, "x"], "b": null, "c": true}"#).unwrap();
        let node = json_to_node(&mut pool, &source);
        let back = node_to_json(&pool, Some(node), false);
        assert_eq!(source, back);
    }

    #[test]
    fn test_code_serializes_as_source() {
        let mut pool = NodePool::new(Arc::new(StringPool::new()));
        let root = sylva_lang::parse("(+ 1 2)", &mut pool).unwrap();
        let json = node_to_json(&pool, root.id, false);
        assert_eq!(json, Value::String("(+ 1 2)".to_string()));
    }
}
