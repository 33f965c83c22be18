//! CSV ↔ node-tree translation.
//!
//! A CSV file is a list of row lists. Cells parse as numbers when they
//! look numeric, otherwise as strings. Quoted fields follow RFC 4180:
//! quotes wrap fields containing separators or newlines, and a doubled
//! quote escapes a literal one.

use sylva_tree::tree_ops::format_number;
use sylva_tree::{NodeId, NodePool, Opcode};

pub fn csv_to_node(pool: &mut NodePool, text: &str) -> NodeId {
    let rows = pool.alloc(Opcode::List);
    for record in parse_records(text) {
        let row = pool.alloc(Opcode::List);
        for cell in record {
            let node = match cell.trim().parse::<f64>() {
                Ok(v) if !cell.trim().is_empty() => pool.alloc_number(v),
                _ => pool.alloc_string(&cell),
            };
            pool.append_child(row, node);
        }
        pool.append_child(rows, row);
    }
    rows
}

pub fn node_to_csv(pool: &NodePool, id: Option<NodeId>) -> String {
    let Some(id) = id else { return String::new() };
    let mut out = String::new();
    for row in pool.children(id) {
        let cells: Vec<String> = pool
            .children(row)
            .into_iter()
            .map(|cell| match pool.opcode(cell) {
                Opcode::Number => format_number(pool.number_value(cell)),
                Opcode::Str | Opcode::Symbol => {
                    quote_cell(&pool.string_value(cell).unwrap_or_default())
                }
                Opcode::Null => String::new(),
                _ => quote_cell(&sylva_lang::unparse(pool, Some(cell), false, false)),
            })
            .collect();
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    out
}

fn quote_cell(cell: &str) -> String {
    if cell.contains(',') || cell.contains('"') || cell.contains('\n') {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

fn parse_records(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    cell.push('"');
                }
                '"' => in_quotes = false,
                other => cell.push(other),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => record.push(std::mem::take(&mut cell)),
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut cell));
                records.push(std::mem::take(&mut record));
            }
            other => cell.push(other),
        }
    }
    if !cell.is_empty() || !record.is_empty() {
        record.push(cell);
        records.push(record);
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use sylva_foundation::StringPool;

    #[test]
    fn test_round_trip() {
        let mut pool = NodePool::new(Arc::new(StringPool::new()));
        let text = "name,score\nalice,3\n\"has, comma\",2.5\n";
        let node = csv_to_node(&mut pool, text);
        assert_eq!(node_to_csv(&pool, Some(node)), text);
    }

    #[test]
    fn test_numeric_cells_parse_as_numbers() {
        let mut pool = NodePool::new(Arc::new(StringPool::new()));
        let node = csv_to_node(&mut pool, "1,x\n");
        let row = pool.children(node)[0];
        let cells = pool.children(row);
        assert_eq!(pool.opcode(cells[0]), Opcode::Number);
        assert_eq!(pool.opcode(cells[1]), Opcode::Str);
    }

    #[test]
    fn test_quoted_quote_escape() {
        let mut pool = NodePool::new(Arc::new(StringPool::new()));
        let node = csv_to_node(&mut pool, "\"say \"\"hi\"\"\"\n");
        let row = pool.children(node)[0];
        let cell = pool.children(row)[0];
        assert_eq!(pool.string_value(cell).as_deref(), Some("say \"hi\""));
    }
}
