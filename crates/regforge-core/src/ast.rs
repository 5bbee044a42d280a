//! Syntax trees for compiled patterns.
//!
//! The tree is a plain sum type with exhaustive `match` dispatch; the
//! analyses below are total functions over it and drive the code
//! generator's choice of search plan.


use std::collections::BTreeSet;
use std::fmt;

/// One inclusive byte range of a character class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassRange {
    pub lo: u8,
    pub hi: u8,
    /// `false` for ranges that subtract from the class instead of adding.
    pub included: bool,
}

impl ClassRange {
    pub fn new(lo: u8, hi: u8) -> Self {
        Self {
            lo,
            hi,
            included: true,
        }
    }

    pub fn single(b: u8) -> Self {
        Self::new(b, b)
    }
}

/// Zero-width assertion kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorKind {
    /// `^` - start of input
    Start,
    /// `$` - end of input
    End,
    /// `\b` - word/non-word transition
    WordBoundary,
    /// `\B` - absence of a word/non-word transition
    NonWordBoundary,
}

/// A syntax tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Matches the empty string (an empty group or alternative branch).
    Empty,

    /// A single literal byte.
    Match(u8),

    /// Ordered sequence; matches when all children match consecutively.
    Concat(Vec<Node>),

    /// Ordered alternatives; the first successful branch wins.
    Alternative(Vec<Node>),

    /// Quantified subexpression. `max == None` means unbounded.
    Repeat {
        body: Box<Node>,
        min: u32,
        max: Option<u32>,
        non_greedy: bool,
    },

    /// A set of byte ranges, optionally negated. `dot` marks the `.`
    /// class, which matches any byte except `\n` and `\r`.
    CharClass {
        ranges: Vec<ClassRange>,
        negated: bool,
        dot: bool,
    },

    /// A zero-width assertion.
    Anchor(AnchorKind),
}

impl Node {
    // Constructors for common nodes

    /// Creates a literal byte node.
    pub fn literal(b: u8) -> Self {
        Node::Match(b)
    }

    /// Creates a concatenation, collapsing the degenerate arities.
    pub fn concat(mut children: Vec<Node>) -> Self {
        match children.len() {
            0 => Node::Empty,
            1 => children.pop().unwrap(),
            _ => Node::Concat(children),
        }
    }

    /// Creates an alternation, collapsing the single-branch case.
    pub fn alternative(mut branches: Vec<Node>) -> Self {
        if branches.len() == 1 {
            branches.pop().unwrap()
        } else {
            Node::Alternative(branches)
        }
    }

    /// Creates a quantified node.
    pub fn repeat(body: Node, min: u32, max: Option<u32>, non_greedy: bool) -> Self {
        Node::Repeat {
            body: Box::new(body),
            min,
            max,
            non_greedy,
        }
    }

    /// Creates a character class from explicit ranges.
    pub fn class(ranges: Vec<ClassRange>, negated: bool) -> Self {
        Node::CharClass {
            ranges,
            negated,
            dot: false,
        }
    }

    /// Creates the `.` class.
    pub fn dot() -> Self {
        Node::CharClass {
            ranges: Vec::new(),
            negated: false,
            dot: true,
        }
    }

    /// Creates an anchor node.
    pub fn anchor(kind: AnchorKind) -> Self {
        Node::Anchor(kind)
    }

    // Analyses

    /// True iff the node cannot consume any input byte: anchors and the
    /// empty node are zero-width, composites propagate (`Concat` and
    /// `Alternative` require every child, `Repeat` follows its body).
    pub fn is_zero_width(&self) -> bool {
        match self {
            Node::Empty | Node::Anchor(_) => true,
            Node::Match(_) | Node::CharClass { .. } => false,
            Node::Concat(children) => children.iter().all(Node::is_zero_width),
            Node::Alternative(branches) => branches.iter().all(Node::is_zero_width),
            Node::Repeat { body, max, .. } => *max == Some(0) || body.is_zero_width(),
        }
    }

    /// True iff every match path begins with a `^` anchor, in which case
    /// the generated function attempts the pattern exactly once at
    /// offset zero.
    pub fn is_anchored_at_start(&self) -> bool {
        match self {
            Node::Anchor(AnchorKind::Start) => true,
            Node::Concat(children) => children
                .first()
                .is_some_and(Node::is_anchored_at_start),
            Node::Alternative(branches) => {
                !branches.is_empty() && branches.iter().all(Node::is_anchored_at_start)
            }
            _ => false,
        }
    }

    /// True iff the subtree contains a `Repeat` whose body is zero-width.
    /// The parser rejects such quantifiers, so this only fires for trees
    /// built programmatically; the single-attempt plan is gated on it.
    pub fn contains_zero_width_repeat(&self) -> bool {
        match self {
            Node::Repeat { body, .. } => {
                body.is_zero_width() || body.contains_zero_width_repeat()
            }
            Node::Concat(children) => children.iter().any(Node::contains_zero_width_repeat),
            Node::Alternative(branches) => {
                branches.iter().any(Node::contains_zero_width_repeat)
            }
            _ => false,
        }
    }

    /// The longest leading run of literal bytes. Anchors are skipped;
    /// the scan halts at the first non-literal node. Consumers re-verify
    /// with the full tree, so a skipped anchor cannot cause a false
    /// positive.
    pub fn literal_prefix(&self) -> Vec<u8> {
        let mut prefix = Vec::new();
        self.collect_prefix(&mut prefix);
        prefix
    }

    /// Returns whether scanning may continue past this node.
    fn collect_prefix(&self, out: &mut Vec<u8>) -> bool {
        match self {
            Node::Match(b) => {
                out.push(*b);
                true
            }
            Node::Empty | Node::Anchor(_) => true,
            Node::Concat(children) => {
                for child in children {
                    if !child.collect_prefix(out) {
                        return false;
                    }
                }
                true
            }
            _ => false,
        }
    }

    /// True iff the whole tree is a concatenation of literal bytes. A
    /// tree containing an anchor is not pure: the substring-search fast
    /// path returns success without re-running the body, so an anchor
    /// that could reject a hit must force a body-verifying plan.
    pub fn is_pure_literal(&self) -> bool {
        match self {
            Node::Match(_) | Node::Empty => true,
            Node::Concat(children) => children.iter().all(Node::is_pure_literal),
            _ => false,
        }
    }

    /// For a literal node, the byte it matches.
    pub fn single_char(&self) -> Option<u8> {
        match self {
            Node::Match(b) => Some(*b),
            _ => None,
        }
    }

    /// The set of bytes that must appear in any accepted input: union
    /// across a concatenation, intersection across alternative branches,
    /// empty for an optional repeat.
    pub fn required_chars(&self) -> BTreeSet<u8> {
        match self {
            Node::Match(b) => BTreeSet::from([*b]),
            Node::Concat(children) => {
                let mut required = BTreeSet::new();
                for child in children {
                    required.extend(child.required_chars());
                }
                required
            }
            Node::Alternative(branches) => {
                let mut iter = branches.iter().map(Node::required_chars);
                let Some(mut required) = iter.next() else {
                    return BTreeSet::new();
                };
                for branch in iter {
                    required = required.intersection(&branch).copied().collect();
                }
                required
            }
            Node::Repeat { body, min, .. } => {
                if *min == 0 {
                    BTreeSet::new()
                } else {
                    body.required_chars()
                }
            }
            Node::Empty | Node::CharClass { .. } | Node::Anchor(_) => BTreeSet::new(),
        }
    }
}

/// Indented tree dump used by the debug diagnostics.
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn dump(node: &Node, depth: usize, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let pad = "  ".repeat(depth);
            match node {
                Node::Empty => writeln!(f, "{pad}Empty"),
                Node::Match(b) => writeln!(f, "{pad}Match {:?}", *b as char),
                Node::Concat(children) => {
                    writeln!(f, "{pad}Concat")?;
                    children.iter().try_for_each(|c| dump(c, depth + 1, f))
                }
                Node::Alternative(branches) => {
                    writeln!(f, "{pad}Alternative")?;
                    branches.iter().try_for_each(|c| dump(c, depth + 1, f))
                }
                Node::Repeat {
                    body,
                    min,
                    max,
                    non_greedy,
                } => {
                    let max = max.map_or("inf".to_string(), |m| m.to_string());
                    let mode = if *non_greedy { " non-greedy" } else { "" };
                    writeln!(f, "{pad}Repeat {min}..{max}{mode}")?;
                    dump(body, depth + 1, f)
                }
                Node::CharClass {
                    ranges,
                    negated,
                    dot,
                } => {
                    if *dot {
                        return writeln!(f, "{pad}Dot");
                    }
                    let neg = if *negated { " negated" } else { "" };
                    writeln!(f, "{pad}CharClass{neg}")?;
                    for r in ranges {
                        let sign = if r.included { '+' } else { '-' };
                        writeln!(f, "{pad}  {sign}{:#04x}-{:#04x}", r.lo, r.hi)?;
                    }
                    Ok(())
                }
                Node::Anchor(kind) => writeln!(f, "{pad}Anchor {kind:?}"),
            }
        }
        dump(self, 0, f)
    }
}
