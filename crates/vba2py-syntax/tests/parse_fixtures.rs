use pretty_assertions::assert_eq;
use vba2py_syntax::{parse_module, BlockError, BlockKind, Node, SyntaxError};

const PREMIUM: &str = include_str!("fixtures/premium.bas");

#[test]
fn fixture_parses_into_two_procedures() {
    let tree = parse_module(PREMIUM).unwrap();
    let procs: Vec<_> = tree.top_level_blocks(BlockKind::Procedure).collect();
    assert_eq!(procs.len(), 2);
    assert_eq!(procs[0].header().line, 5);
    assert_eq!(procs[1].close.text, "End Sub");

    let kinds: Vec<BlockKind> = procs[1].arms[0]
        .body
        .iter()
        .filter_map(|&id| match tree.node(id) {
            Node::Block(b) => Some(b.kind),
            Node::Statement(_) => None,
        })
        .collect();
    assert_eq!(kinds, vec![BlockKind::For, BlockKind::Do, BlockKind::SelectCase]);
}

#[test]
fn dropping_one_closer_reports_the_block_left_open() {
    let damaged = PREMIUM.replacen("    Next i\n", "", 1);
    let err = parse_module(&damaged).unwrap_err();
    match err {
        SyntaxError::Block(block) => assert_eq!(block, BlockError::Unterminated { kind: BlockKind::For, line: 19 }),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unterminated_string_is_a_lex_error() {
    let err = parse_module("Sub A()\n  s = \"oops\nEnd Sub\n").unwrap_err();
    assert_eq!(err.line(), 2);
    assert!(matches!(err, SyntaxError::Lex(_)));
}
