//! Tests for the pattern parser: accepted structure and every error
//! classification.

use super::parse;
use crate::ast::{AnchorKind, ClassRange, Node};
use crate::error::Error;

#[test]
fn test_single_literal() {
    assert_eq!(parse(b"a").unwrap(), Node::Match(b'a'));
}

#[test]
fn test_concat_of_literals() {
    assert_eq!(
        parse(b"abc").unwrap(),
        Node::Concat(vec![
            Node::Match(b'a'),
            Node::Match(b'b'),
            Node::Match(b'c'),
        ])
    );
}

#[test]
fn test_alternation_precedence_below_concat() {
    // ab|cd groups as (ab)|(cd)
    let node = parse(b"ab|cd").unwrap();
    let Node::Alternative(branches) = node else {
        panic!("expected alternation, got {node:?}");
    };
    assert_eq!(branches.len(), 2);
    assert!(matches!(branches[0], Node::Concat(_)));
}

#[test]
fn test_quantifier_binds_tighter_than_concat() {
    let node = parse(b"ab*").unwrap();
    let Node::Concat(items) = node else {
        panic!("expected concat");
    };
    assert_eq!(items[0], Node::Match(b'a'));
    assert!(matches!(items[1], Node::Repeat { .. }));
}

#[test]
fn test_star_plus_question_bounds() {
    let star = parse(b"a*").unwrap();
    let plus = parse(b"a+").unwrap();
    let question = parse(b"a?").unwrap();
    assert!(matches!(star, Node::Repeat { min: 0, max: None, .. }));
    assert!(matches!(plus, Node::Repeat { min: 1, max: None, .. }));
    assert!(matches!(
        question,
        Node::Repeat {
            min: 0,
            max: Some(1),
            ..
        }
    ));
}

#[test]
fn test_brace_quantifiers() {
    assert!(matches!(
        parse(b"a{3}").unwrap(),
        Node::Repeat {
            min: 3,
            max: Some(3),
            ..
        }
    ));
    assert!(matches!(
        parse(b"a{2,}").unwrap(),
        Node::Repeat { min: 2, max: None, .. }
    ));
    assert!(matches!(
        parse(b"a{1,3}").unwrap(),
        Node::Repeat {
            min: 1,
            max: Some(3),
            ..
        }
    ));
}

#[test]
fn test_non_greedy_marker() {
    assert!(matches!(
        parse(b"a*?").unwrap(),
        Node::Repeat {
            non_greedy: true,
            ..
        }
    ));
    assert!(matches!(
        parse(b"a{1,3}?").unwrap(),
        Node::Repeat {
            non_greedy: true,
            ..
        }
    ));
}

#[test]
fn test_groups_are_transparent() {
    assert_eq!(parse(b"(ab)").unwrap(), parse(b"ab").unwrap());
    assert_eq!(parse(b"(?:ab)").unwrap(), parse(b"ab").unwrap());
}

#[test]
fn test_empty_group_matches_empty() {
    assert_eq!(parse(b"()").unwrap(), Node::Empty);
    assert_eq!(parse(b"(?:)").unwrap(), Node::Empty);
    assert_eq!(parse(b"").unwrap(), Node::Empty);
}

#[test]
fn test_empty_alternative_branch() {
    let node = parse(b"a|").unwrap();
    let Node::Alternative(branches) = node else {
        panic!("expected alternation");
    };
    assert_eq!(branches[1], Node::Empty);
}

#[test]
fn test_anchors() {
    assert_eq!(
        parse(b"^a$").unwrap(),
        Node::Concat(vec![
            Node::Anchor(AnchorKind::Start),
            Node::Match(b'a'),
            Node::Anchor(AnchorKind::End),
        ])
    );
    assert_eq!(
        parse(b"\\bw\\B").unwrap(),
        Node::Concat(vec![
            Node::Anchor(AnchorKind::WordBoundary),
            Node::Match(b'w'),
            Node::Anchor(AnchorKind::NonWordBoundary),
        ])
    );
}

#[test]
fn test_char_class_ranges_and_negation() {
    assert_eq!(
        parse(b"[a-z0]").unwrap(),
        Node::class(
            vec![ClassRange::new(b'a', b'z'), ClassRange::single(b'0')],
            false,
        )
    );
    assert_eq!(
        parse(b"[^ab]").unwrap(),
        Node::class(
            vec![ClassRange::single(b'a'), ClassRange::single(b'b')],
            true,
        )
    );
}

#[test]
fn test_dash_literal_at_class_edges() {
    assert_eq!(
        parse(b"[-a]").unwrap(),
        Node::class(
            vec![ClassRange::single(b'-'), ClassRange::single(b'a')],
            false,
        )
    );
    assert_eq!(
        parse(b"[a-]").unwrap(),
        Node::class(
            vec![ClassRange::single(b'a'), ClassRange::single(b'-')],
            false,
        )
    );
}

#[test]
fn test_caret_literal_after_first_class_position() {
    assert_eq!(
        parse(b"[a^]").unwrap(),
        Node::class(
            vec![ClassRange::single(b'a'), ClassRange::single(b'^')],
            false,
        )
    );
}

#[test]
fn test_escape_class_inside_class() {
    let node = parse(b"[\\d_]").unwrap();
    assert_eq!(
        node,
        Node::class(
            vec![ClassRange::new(b'0', b'9'), ClassRange::single(b'_')],
            false,
        )
    );
}

#[test]
fn test_negated_escape_inside_class_expands_to_complement() {
    let Node::CharClass { ranges, negated, .. } = parse(b"[\\D]").unwrap() else {
        panic!("expected class");
    };
    assert!(!negated);
    assert_eq!(
        ranges,
        vec![ClassRange::new(0, 47), ClassRange::new(58, 255)]
    );
}

#[test]
fn test_dot_class() {
    assert!(matches!(
        parse(b".").unwrap(),
        Node::CharClass { dot: true, .. }
    ));
}

#[test]
fn test_stray_punctuation_is_literal() {
    assert_eq!(parse(b"-").unwrap(), Node::Match(b'-'));
    assert_eq!(parse(b",").unwrap(), Node::Match(b','));
    assert_eq!(parse(b"a}b").unwrap(), parse(b"a\\}b").unwrap());
}

#[test]
fn test_escaped_metacharacters_are_literal() {
    assert_eq!(
        parse(b"\\*\\(\\[").unwrap(),
        Node::Concat(vec![
            Node::Match(b'*'),
            Node::Match(b'('),
            Node::Match(b'['),
        ])
    );
}

#[test]
fn test_high_bit_bytes_in_class() {
    assert_eq!(
        parse(&[b'[', 0x80, b'-', 0xff, b']']).unwrap(),
        Node::class(vec![ClassRange::new(0x80, 0xff)], false)
    );
}

// Error classifications

#[test]
fn test_leading_quantifier_is_nothing_to_repeat() {
    assert!(matches!(parse(b"*a"), Err(Error::NothingToRepeat(0))));
    assert!(matches!(parse(b"+a"), Err(Error::NothingToRepeat(_))));
    assert!(matches!(parse(b"?a"), Err(Error::NothingToRepeat(_))));
    assert!(matches!(parse(b"{2}a"), Err(Error::NothingToRepeat(_))));
    assert!(matches!(parse(b"a|*"), Err(Error::NothingToRepeat(_))));
}

#[test]
fn test_quantified_anchor_is_nothing_to_repeat() {
    assert!(matches!(parse(b"^*"), Err(Error::NothingToRepeat(_))));
    assert!(matches!(parse(b"\\b+"), Err(Error::NothingToRepeat(_))));
    assert!(matches!(parse(b"${2}"), Err(Error::NothingToRepeat(_))));
    assert!(matches!(parse(b"()*"), Err(Error::NothingToRepeat(_))));
}

#[test]
fn test_stacked_quantifiers_are_multiple_repeat() {
    assert!(matches!(parse(b"a**"), Err(Error::MultipleRepeat(_))));
    assert!(matches!(parse(b"a++"), Err(Error::MultipleRepeat(_))));
    assert!(matches!(parse(b"a{2}{3}"), Err(Error::MultipleRepeat(_))));
    assert!(matches!(parse(b"a*??"), Err(Error::MultipleRepeat(_))));
}

#[test]
fn test_unbalanced_parentheses() {
    assert!(matches!(parse(b"(a"), Err(Error::UnbalancedParenthesis(_))));
    assert!(matches!(parse(b"a)"), Err(Error::UnbalancedParenthesis(_))));
    assert!(matches!(parse(b"(a))"), Err(Error::UnbalancedParenthesis(_))));
}

#[test]
fn test_unterminated_character_set() {
    assert!(matches!(
        parse(b"[abc"),
        Err(Error::UnterminatedCharacterSet(_))
    ));
    assert!(matches!(parse(b"[]"), Err(Error::UnterminatedCharacterSet(_))));
    assert!(matches!(
        parse(b"[^]"),
        Err(Error::UnterminatedCharacterSet(_))
    ));
    assert!(matches!(
        parse(b"[a-"),
        Err(Error::UnterminatedCharacterSet(_))
    ));
}

#[test]
fn test_reversed_range_is_bad_character_range() {
    assert!(matches!(parse(b"[z-a]"), Err(Error::BadCharacterRange(_))));
    assert!(matches!(parse(b"[a-\\d]"), Err(Error::BadCharacterRange(_))));
}

#[test]
fn test_malformed_brace_quantifiers() {
    assert!(matches!(parse(b"a{2"), Err(Error::MalformedQuantifier(_))));
    assert!(matches!(parse(b"a{}"), Err(Error::MalformedQuantifier(_))));
    assert!(matches!(parse(b"a{x}"), Err(Error::MalformedQuantifier(_))));
    assert!(matches!(parse(b"a{3,1}"), Err(Error::MalformedQuantifier(_))));
    assert!(matches!(parse(b"a{1,x}"), Err(Error::MalformedQuantifier(_))));
}

#[test]
fn test_unknown_group_extension_is_syntax_error() {
    assert!(matches!(parse(b"(?P<x>a)"), Err(Error::Syntax { .. })));
}
