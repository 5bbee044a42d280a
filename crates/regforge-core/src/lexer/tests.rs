//! Tests for the pattern lexer.

use super::{Lexer, TokenKind};

fn kinds(pattern: &[u8]) -> Vec<TokenKind> {
    let mut lexer = Lexer::new(pattern);
    let mut out = Vec::new();
    loop {
        let tok = lexer.next_token();
        let done = tok.kind == TokenKind::Eos;
        out.push(tok.kind);
        if done {
            return out;
        }
    }
}

fn bytes(pattern: &[u8]) -> Vec<u8> {
    let mut lexer = Lexer::new(pattern);
    let mut out = Vec::new();
    loop {
        let tok = lexer.next_token();
        if tok.kind == TokenKind::Eos {
            return out;
        }
        out.push(tok.byte);
    }
}

#[test]
fn test_literals_and_metacharacters() {
    assert_eq!(
        kinds(b"a*b+"),
        vec![
            TokenKind::Literal,
            TokenKind::Star,
            TokenKind::Literal,
            TokenKind::Plus,
            TokenKind::Eos,
        ]
    );
    assert_eq!(
        kinds(b"(a|b)"),
        vec![
            TokenKind::LParen,
            TokenKind::Literal,
            TokenKind::Pipe,
            TokenKind::Literal,
            TokenKind::RParen,
            TokenKind::Eos,
        ]
    );
}

#[test]
fn test_whitespace_skipped_outside_classes() {
    assert_eq!(bytes(b"a b\tc"), vec![b'a', b'b', b'c']);
}

#[test]
fn test_whitespace_kept_inside_classes() {
    assert_eq!(bytes(b"[a b]"), vec![b'[', b'a', b' ', b'b', b']']);
}

#[test]
fn test_class_mode_resets_after_close() {
    assert_eq!(bytes(b"[a] b"), vec![b'[', b'a', b']', b'b']);
}

#[test]
fn test_control_escapes_yield_literal_bytes() {
    let toks: Vec<_> = {
        let mut lexer = Lexer::new(b"\\t\\n\\r\\f\\v\\0");
        std::iter::from_fn(|| {
            let t = lexer.next_token();
            (t.kind != TokenKind::Eos).then_some(t)
        })
        .collect()
    };
    assert!(toks.iter().all(|t| t.kind == TokenKind::Literal));
    assert_eq!(
        toks.iter().map(|t| t.byte).collect::<Vec<_>>(),
        vec![b'\t', b'\n', b'\r', 0x0c, 0x0b, 0]
    );
}

#[test]
fn test_class_escapes() {
    assert_eq!(
        kinds(b"\\d\\D\\w\\W\\s\\S"),
        vec![
            TokenKind::Digit,
            TokenKind::NonDigit,
            TokenKind::Word,
            TokenKind::NonWord,
            TokenKind::Space,
            TokenKind::NonSpace,
            TokenKind::Eos,
        ]
    );
}

#[test]
fn test_boundary_escapes() {
    assert_eq!(
        kinds(b"\\b\\B"),
        vec![
            TokenKind::WordBoundary,
            TokenKind::NonWordBoundary,
            TokenKind::Eos,
        ]
    );
}

#[test]
fn test_unknown_escape_is_the_escaped_byte() {
    assert_eq!(bytes(b"\\*\\."), vec![b'*', b'.']);
    assert_eq!(kinds(b"\\*"), vec![TokenKind::Literal, TokenKind::Eos]);
}

#[test]
fn test_trailing_backslash_is_literal() {
    assert_eq!(bytes(b"a\\"), vec![b'a', b'\\']);
}

#[test]
fn test_offsets_track_source_positions() {
    let mut lexer = Lexer::new(b"a *");
    assert_eq!(lexer.next_token().offset, 0);
    assert_eq!(lexer.next_token().offset, 2);
    assert_eq!(lexer.next_token().offset, 3);
}
