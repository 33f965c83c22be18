//! Lexer for textual Sylva source.
//!
//! Uses Logos for fast, compile-time optimized tokenization. Comments and
//! labels are real tokens (not skipped) because the parser attaches them to
//! the node that follows.

use logos::Logos;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
pub enum Token<'src> {
    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    /// `;` to end of line, attached as a comment to the next node.
    #[regex(r";[^\n]*")]
    Comment(&'src str),

    /// `#label`, attached to the next node.
    #[regex(r##"#[^\s()\[\]{};"#]+"##)]
    Label(&'src str),

    /// Quoted string with backslash escapes.
    #[regex(r#""([^"\\]|\\.)*""#)]
    Quoted(&'src str),

    /// Any other bare word: opcode name, number, symbol, or constant.
    #[regex(r##"[^\s()\[\]{};"#]+"##)]
    Word(&'src str),
}

/// Decode the body of a quoted string token.
pub fn unescape(token: &str) -> String {
    let body = &token[1..token.len() - 1];
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Encode a string into its quoted source form.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<Token<'_>> {
        Token::lexer(source).filter_map(|t| t.ok()).collect()
    }

    #[test]
    fn test_basic_tokens() {
        let tokens = lex("(+ 1 2)");
        assert_eq!(
            tokens,
            vec![
                Token::LParen,
                Token::Word("+"),
                Token::Word("1"),
                Token::Word("2"),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn test_labels_and_comments() {
        let tokens = lex("; a note\n#main (null)");
        assert_eq!(
            tokens,
            vec![
                Token::Comment("; a note"),
                Token::Label("#main"),
                Token::LParen,
                Token::Word("null"),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn test_string_escape_round_trip() {
        let original = "line1\nline2\t\"quoted\"\\";
        assert_eq!(unescape(&escape(original)), original);
    }
}
