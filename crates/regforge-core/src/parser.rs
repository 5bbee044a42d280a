//! Recursive-descent parser producing a syntax tree.
//!
//! Precedence, lowest to highest: alternation, concatenation,
//! quantifier, atom. Groups `(...)` and `(?:...)` parse identically; no
//! capture bookkeeping is performed.

#[cfg(test)]
mod tests;

use tracing::trace;

use crate::ast::{AnchorKind, ClassRange, Node};
use crate::error::{Error, Result};
use crate::lexer::{Lexer, Token, TokenKind};

/// Parses a pattern into its syntax tree.
pub fn parse(pattern: &[u8]) -> Result<Node> {
    let mut parser = Parser::new(pattern);
    let node = parser.parse_expr()?;
    match parser.tok.kind {
        TokenKind::Eos => {
            trace!(tree = %node, "parsed pattern");
            Ok(node)
        }
        TokenKind::RParen => Err(Error::UnbalancedParenthesis(parser.tok.offset)),
        _ => Err(Error::Syntax {
            offset: parser.tok.offset,
            message: format!("unexpected token {:?}", parser.tok.kind),
        }),
    }
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    tok: Token,
}

impl<'a> Parser<'a> {
    fn new(pattern: &'a [u8]) -> Self {
        let mut lexer = Lexer::new(pattern);
        let tok = lexer.next_token();
        Self { lexer, tok }
    }

    fn bump(&mut self) {
        self.tok = self.lexer.next_token();
    }

    /// expr := concat ( '|' concat )*
    fn parse_expr(&mut self) -> Result<Node> {
        let mut branches = vec![self.parse_concat()?];
        while self.tok.kind == TokenKind::Pipe {
            self.bump();
            branches.push(self.parse_concat()?);
        }
        Ok(Node::alternative(branches))
    }

    /// concat := postfix*
    ///
    /// An empty sequence (empty pattern, empty group, empty alternative
    /// branch) parses to the empty-matching node.
    fn parse_concat(&mut self) -> Result<Node> {
        let mut items = Vec::new();
        loop {
            match self.tok.kind {
                TokenKind::Pipe | TokenKind::RParen | TokenKind::Eos => break,
                _ => items.push(self.parse_postfix()?),
            }
        }
        Ok(Node::concat(items))
    }

    /// postfix := atom ( '*' | '+' | '?' | '{' n (',' m?)? '}' )? ( '?' )?
    fn parse_postfix(&mut self) -> Result<Node> {
        let node = self.parse_atom()?;
        let quant_offset = self.tok.offset;
        let bounds = match self.tok.kind {
            TokenKind::Star => {
                self.bump();
                Some((0, None))
            }
            TokenKind::Plus => {
                self.bump();
                Some((1, None))
            }
            TokenKind::Question => {
                self.bump();
                Some((0, Some(1)))
            }
            TokenKind::LBrace => Some(self.parse_brace_quantifier()?),
            _ => None,
        };
        let Some((min, max)) = bounds else {
            return Ok(node);
        };
        if node.is_zero_width() {
            return Err(Error::NothingToRepeat(quant_offset));
        }
        let non_greedy = if self.tok.kind == TokenKind::Question {
            self.bump();
            true
        } else {
            false
        };
        if matches!(
            self.tok.kind,
            TokenKind::Star | TokenKind::Plus | TokenKind::Question | TokenKind::LBrace
        ) {
            return Err(Error::MultipleRepeat(self.tok.offset));
        }
        Ok(Node::repeat(node, min, max, non_greedy))
    }

    /// Parses `{n}`, `{n,}` or `{n,m}` with the opening brace current.
    fn parse_brace_quantifier(&mut self) -> Result<(u32, Option<u32>)> {
        let offset = self.tok.offset;
        self.bump();
        let min = self.parse_number(offset)?;
        match self.tok.kind {
            TokenKind::RBrace => {
                self.bump();
                Ok((min, Some(min)))
            }
            TokenKind::Comma => {
                self.bump();
                if self.tok.kind == TokenKind::RBrace {
                    self.bump();
                    return Ok((min, None));
                }
                let max = self.parse_number(offset)?;
                if self.tok.kind != TokenKind::RBrace {
                    return Err(Error::MalformedQuantifier(offset));
                }
                self.bump();
                if max < min {
                    return Err(Error::MalformedQuantifier(offset));
                }
                Ok((min, Some(max)))
            }
            _ => Err(Error::MalformedQuantifier(offset)),
        }
    }

    fn parse_number(&mut self, quant_offset: usize) -> Result<u32> {
        let mut digits = String::new();
        while self.tok.kind == TokenKind::Literal && self.tok.byte.is_ascii_digit() {
            digits.push(self.tok.byte as char);
            self.bump();
        }
        digits
            .parse()
            .map_err(|_| Error::MalformedQuantifier(quant_offset))
    }

    /// atom := literal | '.' | charclass | group | anchor | escapeclass
    fn parse_atom(&mut self) -> Result<Node> {
        let tok = self.tok;
        match tok.kind {
            // Stray `-`, `,`, `}` and `]` outside their constructs are
            // plain literal bytes.
            TokenKind::Literal
            | TokenKind::Dash
            | TokenKind::Comma
            | TokenKind::RBrace
            | TokenKind::RBracket => {
                self.bump();
                Ok(Node::literal(tok.byte))
            }
            TokenKind::Dot => {
                self.bump();
                Ok(Node::dot())
            }
            TokenKind::Caret => {
                self.bump();
                Ok(Node::anchor(AnchorKind::Start))
            }
            TokenKind::Dollar => {
                self.bump();
                Ok(Node::anchor(AnchorKind::End))
            }
            TokenKind::WordBoundary => {
                self.bump();
                Ok(Node::anchor(AnchorKind::WordBoundary))
            }
            TokenKind::NonWordBoundary => {
                self.bump();
                Ok(Node::anchor(AnchorKind::NonWordBoundary))
            }
            TokenKind::Digit => {
                self.bump();
                Ok(Node::class(digit_ranges(), false))
            }
            TokenKind::NonDigit => {
                self.bump();
                Ok(Node::class(digit_ranges(), true))
            }
            TokenKind::Word => {
                self.bump();
                Ok(Node::class(word_ranges(), false))
            }
            TokenKind::NonWord => {
                self.bump();
                Ok(Node::class(word_ranges(), true))
            }
            TokenKind::Space => {
                self.bump();
                Ok(Node::class(space_ranges(), false))
            }
            TokenKind::NonSpace => {
                self.bump();
                Ok(Node::class(space_ranges(), true))
            }
            TokenKind::LBracket => self.parse_class(),
            TokenKind::LParen => self.parse_group(),
            TokenKind::RParen => Err(Error::UnbalancedParenthesis(tok.offset)),
            TokenKind::Star | TokenKind::Plus | TokenKind::Question | TokenKind::LBrace => {
                Err(Error::NothingToRepeat(tok.offset))
            }
            TokenKind::Pipe | TokenKind::Eos => Err(Error::Syntax {
                offset: tok.offset,
                message: "expected an atom".to_string(),
            }),
        }
    }

    /// group := '(' ( '?:' )? expr ')'
    fn parse_group(&mut self) -> Result<Node> {
        let open = self.tok.offset;
        self.bump();
        if self.tok.kind == TokenKind::Question {
            let ext = self.tok.offset;
            self.bump();
            if self.tok.kind == TokenKind::Literal && self.tok.byte == b':' {
                self.bump();
            } else {
                return Err(Error::Syntax {
                    offset: ext,
                    message: "unknown group extension".to_string(),
                });
            }
        }
        let node = self.parse_expr()?;
        if self.tok.kind != TokenKind::RParen {
            return Err(Error::UnbalancedParenthesis(open));
        }
        self.bump();
        Ok(node)
    }

    /// charclass := '[' '^'? item+ ']' where item is a byte, a range
    /// `lo-hi`, or an escape class.
    fn parse_class(&mut self) -> Result<Node> {
        let open = self.tok.offset;
        self.bump();
        let negated = if self.tok.kind == TokenKind::Caret {
            self.bump();
            true
        } else {
            false
        };
        if matches!(self.tok.kind, TokenKind::RBracket | TokenKind::Eos) {
            return Err(Error::UnterminatedCharacterSet(open));
        }
        let mut ranges = Vec::new();
        loop {
            match self.tok.kind {
                TokenKind::RBracket => {
                    self.bump();
                    break;
                }
                TokenKind::Eos => return Err(Error::UnterminatedCharacterSet(open)),
                TokenKind::Digit => {
                    ranges.extend(digit_ranges());
                    self.bump();
                }
                TokenKind::NonDigit => {
                    ranges.extend(complement(&digit_ranges()));
                    self.bump();
                }
                TokenKind::Word => {
                    ranges.extend(word_ranges());
                    self.bump();
                }
                TokenKind::NonWord => {
                    ranges.extend(complement(&word_ranges()));
                    self.bump();
                }
                TokenKind::Space => {
                    ranges.extend(space_ranges());
                    self.bump();
                }
                TokenKind::NonSpace => {
                    ranges.extend(complement(&space_ranges()));
                    self.bump();
                }
                _ => {
                    // Any other token is a class member byte; a `-`
                    // between two members forms a range, at either edge
                    // it is a literal.
                    let lo = self.tok.byte;
                    let lo_offset = self.tok.offset;
                    self.bump();
                    if self.tok.kind != TokenKind::Dash {
                        ranges.push(ClassRange::single(lo));
                        continue;
                    }
                    self.bump();
                    match self.tok.kind {
                        TokenKind::RBracket => {
                            ranges.push(ClassRange::single(lo));
                            ranges.push(ClassRange::single(b'-'));
                            self.bump();
                            break;
                        }
                        TokenKind::Eos => {
                            return Err(Error::UnterminatedCharacterSet(open));
                        }
                        TokenKind::Digit
                        | TokenKind::NonDigit
                        | TokenKind::Word
                        | TokenKind::NonWord
                        | TokenKind::Space
                        | TokenKind::NonSpace => {
                            return Err(Error::BadCharacterRange(lo_offset));
                        }
                        _ => {
                            let hi = self.tok.byte;
                            if hi < lo {
                                return Err(Error::BadCharacterRange(lo_offset));
                            }
                            ranges.push(ClassRange::new(lo, hi));
                            self.bump();
                        }
                    }
                }
            }
        }
        Ok(Node::class(ranges, negated))
    }
}

fn digit_ranges() -> Vec<ClassRange> {
    vec![ClassRange::new(b'0', b'9')]
}

fn word_ranges() -> Vec<ClassRange> {
    vec![
        ClassRange::new(b'a', b'z'),
        ClassRange::new(b'A', b'Z'),
        ClassRange::new(b'0', b'9'),
        ClassRange::single(b'_'),
    ]
}

fn space_ranges() -> Vec<ClassRange> {
    vec![ClassRange::new(b'\t', b'\r'), ClassRange::single(b' ')]
}

/// Complements a set of included ranges into explicit included ranges,
/// for negated escape classes appearing inside a character class.
fn complement(ranges: &[ClassRange]) -> Vec<ClassRange> {
    let mut member = [false; 256];
    for r in ranges {
        for b in r.lo..=r.hi {
            member[b as usize] = true;
        }
    }
    let mut out = Vec::new();
    let mut lo: Option<u8> = None;
    for b in 0..=255u8 {
        match (member[b as usize], lo) {
            (false, None) => lo = Some(b),
            (true, Some(start)) => {
                out.push(ClassRange::new(start, b - 1));
                lo = None;
            }
            _ => {}
        }
    }
    if let Some(start) = lo {
        out.push(ClassRange::new(start, 255));
    }
    out
}
