//! Parser for textual Sylva source.
//!
//! Parses directly into a [`NodePool`], the way everything else in the
//! runtime consumes code. The head word of every parenthesized form names
//! an opcode; bare words elsewhere are numbers, the built-in constants, or
//! symbols. `#labels` and `;comments` attach to the node that follows.

use logos::Logos;
use thiserror::Error;

use sylva_tree::{NodeId, NodePool, NodeRef, Opcode};

use crate::lexer::{unescape, Token};

/// Parse failures. All carry a byte offset into the source.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("unrecognized token at byte {offset}")]
    Lex { offset: usize },

    #[error("unexpected token {text:?} at byte {offset}")]
    UnexpectedToken { offset: usize, text: String },

    #[error("unknown opcode {name:?} at byte {offset}")]
    UnknownOpcode { offset: usize, name: String },
}

/// Parse `source` into `pool`, returning a unique reference to the root.
/// An empty source yields the null reference.
pub fn parse(source: &str, pool: &mut NodePool) -> Result<NodeRef, ParseError> {
    let mut tokens = Vec::new();
    let mut lexer = Token::lexer(source);
    while let Some(result) = lexer.next() {
        let span = lexer.span();
        match result {
            Ok(token) => tokens.push((token, span.start)),
            Err(()) => return Err(ParseError::Lex { offset: span.start }),
        }
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        pool,
    };
    parser.skip_trivia_only_tail();
    if parser.at_end() {
        return Ok(NodeRef::null());
    }
    let root = parser.parse_node()?;
    parser.skip_trivia_only_tail();
    if !parser.at_end() {
        let (token, offset) = parser.peek_raw().cloned().expect("not at end");
        return Err(ParseError::UnexpectedToken {
            offset,
            text: format!("{token:?}"),
        });
    }
    Ok(NodeRef::new(root, true))
}

struct Parser<'src, 'p> {
    tokens: Vec<(Token<'src>, usize)>,
    pos: usize,
    pool: &'p mut NodePool,
}

impl<'src> Parser<'src, '_> {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek_raw(&self) -> Option<&(Token<'src>, usize)> {
        self.tokens.get(self.pos)
    }

    fn next_raw(&mut self) -> Option<(Token<'src>, usize)> {
        let item = self.tokens.get(self.pos).cloned();
        if item.is_some() {
            self.pos += 1;
        }
        item
    }

    /// Consume comments and labels preceding a node.
    fn take_trivia(&mut self) -> (Vec<String>, Vec<String>) {
        let mut comments = Vec::new();
        let mut labels = Vec::new();
        while let Some((token, _)) = self.peek_raw() {
            match token {
                Token::Comment(text) => {
                    comments.push(text.trim_start_matches(';').trim().to_string());
                    self.pos += 1;
                }
                Token::Label(text) => {
                    labels.push(text[1..].to_string());
                    self.pos += 1;
                }
                _ => break,
            }
        }
        (comments, labels)
    }

    /// Consume a run of trailing comments (labels with nothing to attach to
    /// are left in place so they error).
    fn skip_trivia_only_tail(&mut self) {
        while let Some((Token::Comment(_), _)) = self.peek_raw() {
            self.pos += 1;
        }
    }

    fn parse_node(&mut self) -> Result<NodeId, ParseError> {
        let (comments, labels) = self.take_trivia();
        let (token, offset) = self.next_raw().ok_or(ParseError::UnexpectedEof)?;

        let id = match token {
            Token::LParen => self.parse_form(offset)?,
            Token::Quoted(text) => {
                let value = unescape(text);
                self.pool.alloc_string(&value)
            }
            Token::Word(word) => self.classify_word(word),
            Token::RParen | Token::Comment(_) | Token::Label(_) => {
                return Err(ParseError::UnexpectedToken {
                    offset,
                    text: format!("{token:?}"),
                });
            }
        };

        self.attach_trivia(id, comments, labels);
        Ok(id)
    }

    fn parse_form(&mut self, open_offset: usize) -> Result<NodeId, ParseError> {
        // () is the null node
        if let Some((Token::RParen, _)) = self.peek_raw() {
            self.pos += 1;
            return Ok(self.pool.alloc_null());
        }

        let (head, head_offset) = self.next_raw().ok_or(ParseError::UnexpectedEof)?;
        let name = match head {
            Token::Word(word) => word,
            other => {
                return Err(ParseError::UnexpectedToken {
                    offset: head_offset,
                    text: format!("{other:?}"),
                })
            }
        };
        let op = Opcode::from_name(name).ok_or_else(|| ParseError::UnknownOpcode {
            offset: head_offset,
            name: name.to_string(),
        })?;

        let id = self.pool.alloc(op);
        if op == Opcode::Assoc {
            self.parse_assoc_children(id)?;
        } else if op.is_immediate() {
            self.parse_immediate_form(id, op, open_offset)?;
        } else {
            loop {
                self.skip_trivia_only_tail();
                if let Some((Token::RParen, _)) = self.peek_raw() {
                    self.pos += 1;
                    break;
                }
                if self.at_end() {
                    return Err(ParseError::UnexpectedEof);
                }
                let child = self.parse_node()?;
                self.pool.append_child(id, child);
            }
        }

        let idempotent = self.pool.opcode(id).is_data_kind()
            && self
                .pool
                .node(id)
                .child_ids()
                .iter()
                .all(|&c| self.pool.node(c).idempotent);
        self.pool.set_idempotent(id, idempotent);
        Ok(id)
    }

    /// `(number 3)`, `(string "x")`, `(symbol s)`, `(true)`, `(false)`,
    /// `(null)` — the explicit forms of the immediate kinds.
    fn parse_immediate_form(
        &mut self,
        id: NodeId,
        op: Opcode,
        open_offset: usize,
    ) -> Result<NodeId, ParseError> {
        let mut value: Option<(Token<'src>, usize)> = None;
        loop {
            match self.next_raw() {
                Some((Token::RParen, _)) => break,
                Some(item) => {
                    if value.is_some() {
                        return Err(ParseError::UnexpectedToken {
                            offset: item.1,
                            text: format!("{:?}", item.0),
                        });
                    }
                    value = Some(item);
                }
                None => return Err(ParseError::UnexpectedEof),
            }
        }
        if let Some((token, offset)) = value {
            match (op, token) {
                (Opcode::Number, Token::Word(word)) => {
                    self.pool.set_number_value(id, parse_number(word).ok_or(
                        ParseError::UnexpectedToken {
                            offset,
                            text: word.to_string(),
                        },
                    )?);
                }
                (Opcode::Str, Token::Quoted(text)) => {
                    let string_id = self.pool.strings().intern(&unescape(text));
                    self.pool.set_string_payload(id, string_id);
                }
                (Opcode::Str | Opcode::Symbol, Token::Word(word)) => {
                    let string_id = self.pool.strings().intern(word);
                    self.pool.set_string_payload(id, string_id);
                }
                (_, token) => {
                    return Err(ParseError::UnexpectedToken {
                        offset: open_offset,
                        text: format!("{token:?}"),
                    });
                }
            }
        }
        Ok(id)
    }

    fn parse_assoc_children(&mut self, id: NodeId) -> Result<(), ParseError> {
        loop {
            self.skip_trivia_only_tail();
            match self.next_raw() {
                Some((Token::RParen, _)) => return Ok(()),
                Some((Token::Word(key), _)) => {
                    let child = self.parse_node()?;
                    if let Some(prev) = self.pool.assoc_insert(id, key, child) {
                        self.pool.free_tree(prev);
                    }
                }
                Some((Token::Quoted(key), _)) => {
                    let key = unescape(key);
                    let child = self.parse_node()?;
                    if let Some(prev) = self.pool.assoc_insert(id, &key, child) {
                        self.pool.free_tree(prev);
                    }
                }
                Some((token, offset)) => {
                    return Err(ParseError::UnexpectedToken {
                        offset,
                        text: format!("{token:?}"),
                    })
                }
                None => return Err(ParseError::UnexpectedEof),
            }
        }
    }

    fn classify_word(&mut self, word: &str) -> NodeId {
        match word {
            "true" => self.pool.alloc_bool(true),
            "false" => self.pool.alloc_bool(false),
            "null" => self.pool.alloc_null(),
            _ => match parse_number(word) {
                Some(value) => self.pool.alloc_number(value),
                None => self.pool.alloc_symbol(word),
            },
        }
    }

    fn attach_trivia(&mut self, id: NodeId, comments: Vec<String>, labels: Vec<String>) {
        if !labels.is_empty() {
            let strings = self.pool.strings().clone();
            let node = self.pool.node_mut(id);
            for label in labels {
                node.labels.push(strings.intern(&label));
            }
            node.idempotent = false;
        }
        if !comments.is_empty() {
            let text = comments.join("\n");
            let strings = self.pool.strings().clone();
            self.pool.node_mut(id).comments = strings.intern(&text);
        }
    }
}

/// Parse a numeric word, including the canonical non-finite forms emitted
/// by the unparser (`.nan`, `.inf`, `-.inf`).
fn parse_number(word: &str) -> Option<f64> {
    match word {
        ".nan" => Some(f64::NAN),
        ".inf" => Some(f64::INFINITY),
        "-.inf" => Some(f64::NEG_INFINITY),
        _ => {
            // reject words like "infinity"/"nan" that f64::from_str accepts,
            // so they stay symbols
            if word
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
            {
                word.parse::<f64>().ok()
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use sylva_foundation::StringPool;
    use sylva_tree::Payload;

    fn pool() -> NodePool {
        NodePool::new(Arc::new(StringPool::new()))
    }

    #[test]
    fn test_parse_arithmetic() {
        let mut p = pool();
        let root = parse("(+ 1 2 3)", &mut p).unwrap();
        let id = root.id.unwrap();
        assert_eq!(p.opcode(id), Opcode::Add);
        let children = p.children(id);
        assert_eq!(children.len(), 3);
        assert_eq!(p.number_value(children[0]), 1.0);
        assert_eq!(p.number_value(children[2]), 3.0);
    }

    #[test]
    fn test_parse_assoc_pairs() {
        let mut p = pool();
        let root = parse("(assoc x 1 y 2)", &mut p).unwrap();
        let id = root.id.unwrap();
        assert_eq!(p.opcode(id), Opcode::Assoc);
        let map = p.assoc(id);
        assert_eq!(map.len(), 2);
        let x = p.strings().id_if_present("x");
        assert_eq!(p.number_value(map[&x]), 1.0);
    }

    #[test]
    fn test_parse_labels_and_comments() {
        let mut p = pool();
        let root = parse("; the main entry\n#main (seq 1)", &mut p).unwrap();
        let id = root.id.unwrap();
        let node = p.node(id);
        assert_eq!(node.labels.len(), 1);
        assert_eq!(
            p.strings().resolve(node.labels[0]).as_deref(),
            Some("main")
        );
        assert_eq!(
            p.strings().resolve(node.comments).as_deref(),
            Some("the main entry")
        );
    }

    #[test]
    fn test_parse_strings_and_symbols() {
        let mut p = pool();
        let root = parse(r#"(list "a b" sym true null)"#, &mut p).unwrap();
        let children = p.children(root.id.unwrap());
        assert_eq!(p.opcode(children[0]), Opcode::Str);
        assert_eq!(p.string_value(children[0]).as_deref(), Some("a b"));
        assert_eq!(p.opcode(children[1]), Opcode::Symbol);
        assert_eq!(p.opcode(children[2]), Opcode::True);
        assert_eq!(p.opcode(children[3]), Opcode::Null);
    }

    #[test]
    fn test_idempotency_marked_on_data() {
        let mut p = pool();
        let data = parse("(list 1 2 3)", &mut p).unwrap();
        assert!(p.node(data.id.unwrap()).idempotent);

        let code = parse("(list 1 x)", &mut p).unwrap();
        assert!(!p.node(code.id.unwrap()).idempotent);
    }

    #[test]
    fn test_parse_errors() {
        let mut p = pool();
        assert!(matches!(
            parse("(+ 1", &mut p),
            Err(ParseError::UnexpectedEof)
        ));
        assert!(matches!(
            parse("(frobnicate 1)", &mut p),
            Err(ParseError::UnknownOpcode { .. })
        ));
    }

    #[test]
    fn test_empty_source_is_null() {
        let mut p = pool();
        let root = parse("; nothing here\n", &mut p).unwrap();
        assert!(root.is_null());
    }

    #[test]
    fn test_explicit_immediate_forms() {
        let mut p = pool();
        let root = parse("(list (number 4) (string bare) (symbol s))", &mut p).unwrap();
        let children = p.children(root.id.unwrap());
        assert_eq!(p.number_value(children[0]), 4.0);
        assert_eq!(p.string_value(children[1]).as_deref(), Some("bare"));
        match &p.node(children[2]).payload {
            Payload::Str(_) => {}
            other => panic!("expected string payload, got {other:?}"),
        }
    }
}
