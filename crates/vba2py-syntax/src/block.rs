use std::fmt;

use thiserror::Error;

use crate::lexer::TokenKind;
use crate::statement::{is_inline_if, Statement};

/// Category of a block-opening keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Procedure,
    If,
    For,
    Do,
    While,
    SelectCase,
    With,
    Enum,
    Type,
}

impl BlockKind {
    /// Keyword spelling used in diagnostics.
    pub fn keyword(self) -> &'static str {
        match self {
            BlockKind::Procedure => "Sub/Function/Property",
            BlockKind::If => "If",
            BlockKind::For => "For",
            BlockKind::Do => "Do",
            BlockKind::While => "While",
            BlockKind::SelectCase => "Select Case",
            BlockKind::With => "With",
            BlockKind::Enum => "Enum",
            BlockKind::Type => "Type",
        }
    }

    fn closer(self) -> &'static str {
        match self {
            BlockKind::Procedure => "End Sub/Function/Property",
            BlockKind::If => "End If",
            BlockKind::For => "Next",
            BlockKind::Do => "Loop",
            BlockKind::While => "Wend",
            BlockKind::SelectCase => "End Select",
            BlockKind::With => "End With",
            BlockKind::Enum => "End Enum",
            BlockKind::Type => "End Type",
        }
    }

    fn top_level_only(self) -> bool {
        matches!(self, BlockKind::Procedure | BlockKind::Enum | BlockKind::Type)
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Structural role of one statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementRole {
    Open(BlockKind),
    /// `ElseIf`, `Else`, `Case`: starts a new arm of the enclosing block.
    Middle(BlockKind),
    Close(BlockKind),
    Simple,
}

pub(crate) const DECLARATION_MODIFIERS: &[&str] = &["public", "private", "friend", "static", "global"];

pub fn classify_statement(stmt: &Statement) -> StatementRole {
    let toks = &stmt.tokens;
    let Some(first) = toks.first() else {
        return StatementRole::Simple;
    };

    if first.is_kw("end") {
        return match toks.get(1) {
            Some(t) if t.is_kw("sub") || t.is_kw("function") || t.is_kw("property") => {
                StatementRole::Close(BlockKind::Procedure)
            }
            Some(t) if t.is_kw("if") => StatementRole::Close(BlockKind::If),
            Some(t) if t.is_kw("select") => StatementRole::Close(BlockKind::SelectCase),
            Some(t) if t.is_kw("with") => StatementRole::Close(BlockKind::With),
            Some(t) if t.is_kw("while") => StatementRole::Close(BlockKind::While),
            Some(t) if t.is_kw("enum") => StatementRole::Close(BlockKind::Enum),
            Some(t) if t.is_kw("type") => StatementRole::Close(BlockKind::Type),
            _ => StatementRole::Simple,
        };
    }
    if first.is_kw("next") {
        return StatementRole::Close(BlockKind::For);
    }
    if first.is_kw("loop") {
        return StatementRole::Close(BlockKind::Do);
    }
    if first.is_kw("wend") {
        return StatementRole::Close(BlockKind::While);
    }
    if first.is_kw("elseif") || first.is_kw("else") {
        return StatementRole::Middle(BlockKind::If);
    }
    if first.is_kw("case") {
        return StatementRole::Middle(BlockKind::SelectCase);
    }
    if first.is_kw("if") {
        return if is_inline_if(toks) || !toks.iter().any(|t| t.is_kw("then")) {
            StatementRole::Simple
        } else {
            StatementRole::Open(BlockKind::If)
        };
    }
    if first.is_kw("for") {
        return StatementRole::Open(BlockKind::For);
    }
    if first.is_kw("do") {
        return StatementRole::Open(BlockKind::Do);
    }
    if first.is_kw("while") {
        return StatementRole::Open(BlockKind::While);
    }
    if first.is_kw("select") && toks.get(1).is_some_and(|t| t.is_kw("case")) {
        return StatementRole::Open(BlockKind::SelectCase);
    }
    if first.is_kw("with") {
        return StatementRole::Open(BlockKind::With);
    }

    let idx = stmt.skip_modifiers(DECLARATION_MODIFIERS);
    match toks.get(idx) {
        Some(t) if t.is_kw("sub") || t.is_kw("function") => StatementRole::Open(BlockKind::Procedure),
        Some(t) if t.is_kw("property") => match toks.get(idx + 1) {
            Some(accessor) if accessor.is_word("get") || accessor.is_kw("let") || accessor.is_kw("set") => {
                StatementRole::Open(BlockKind::Procedure)
            }
            _ => StatementRole::Simple,
        },
        Some(t) if t.is_kw("enum") => StatementRole::Open(BlockKind::Enum),
        // `Type` needs a name after it; `Dim x As Type` never reaches here.
        Some(t) if t.is_kw("type") && toks.get(idx + 1).is_some_and(|n| n.kind == TokenKind::Identifier) => {
            StatementRole::Open(BlockKind::Type)
        }
        _ => StatementRole::Simple,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    #[error("line {line}: `{found}` does not close {}", expected_text(.expected))]
    Unbalanced {
        expected: Option<BlockKind>,
        found: String,
        line: usize,
    },
    #[error("line {line}: `{kind}` block is never closed")]
    Unterminated { kind: BlockKind, line: usize },
}

fn expected_text(expected: &Option<BlockKind>) -> String {
    match expected {
        Some(kind) => format!("the open `{kind}` block (expected `{}`)", kind.closer()),
        None => "any open block".to_string(),
    }
}

impl BlockError {
    pub fn line(&self) -> usize {
        match self {
            BlockError::Unbalanced { line, .. } | BlockError::Unterminated { line, .. } => *line,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Statement(Statement),
    Block(Block),
}

/// One arm of a block: the opening statement (or `ElseIf`/`Else`/`Case`) and its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arm {
    pub header: Statement,
    pub body: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    /// Never empty; `arms[0].header` is the opening statement.
    pub arms: Vec<Arm>,
    pub close: Statement,
}

impl Block {
    pub fn header(&self) -> &Statement {
        &self.arms[0].header
    }
}

/// Arena holding the nested statement structure of one module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockTree {
    nodes: Vec<Node>,
    root: Vec<NodeId>,
}

impl BlockTree {
    pub fn root(&self) -> &[NodeId] {
        &self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Top-level blocks of the given kind, in source order.
    pub fn top_level_blocks(&self, kind: BlockKind) -> impl Iterator<Item = &Block> {
        self.root.iter().filter_map(move |&id| match self.node(id) {
            Node::Block(b) if b.kind == kind => Some(b),
            _ => None,
        })
    }
}

struct Frame {
    kind: BlockKind,
    arms: Vec<Arm>,
}

impl Frame {
    fn unterminated(&self) -> BlockError {
        BlockError::Unterminated {
            kind: self.kind,
            line: self.arms.first().map_or(0, |arm| arm.header.line),
        }
    }
}

/// Builds the block tree with an explicit stack of open contexts.
///
/// A close must match the innermost open block. A close for an outer block, or a procedure,
/// enum or type opening inside another block, reports the innermost block as never closed.
pub fn parse_blocks(statements: Vec<Statement>) -> Result<BlockTree, BlockError> {
    let mut tree = BlockTree::default();
    let mut stack: Vec<Frame> = Vec::new();

    for stmt in statements {
        match classify_statement(&stmt) {
            StatementRole::Open(kind) => {
                if kind.top_level_only() {
                    if let Some(top) = stack.last() {
                        return Err(top.unterminated());
                    }
                }
                stack.push(Frame {
                    kind,
                    arms: vec![Arm {
                        header: stmt,
                        body: Vec::new(),
                    }],
                });
            }
            StatementRole::Middle(kind) => match stack.last_mut() {
                Some(top) if top.kind == kind => top.arms.push(Arm {
                    header: stmt,
                    body: Vec::new(),
                }),
                top => {
                    return Err(BlockError::Unbalanced {
                        expected: top.map(|f| f.kind),
                        found: stmt.text.clone(),
                        line: stmt.line,
                    })
                }
            },
            StatementRole::Close(kind) => {
                let frame = match stack.pop() {
                    Some(top) if top.kind == kind => top,
                    // The close belongs to an outer block, so the inner one was left open.
                    Some(top) if stack.iter().any(|f| f.kind == kind) => return Err(top.unterminated()),
                    top => {
                        return Err(BlockError::Unbalanced {
                            expected: top.map(|f| f.kind),
                            found: stmt.text.clone(),
                            line: stmt.line,
                        })
                    }
                };
                let id = tree.push(Node::Block(Block {
                    kind: frame.kind,
                    arms: frame.arms,
                    close: stmt,
                }));
                attach(&mut tree, &mut stack, id);
            }
            StatementRole::Simple => {
                let id = tree.push(Node::Statement(stmt));
                attach(&mut tree, &mut stack, id);
            }
        }
    }

    if let Some(open) = stack.last() {
        return Err(open.unterminated());
    }
    Ok(tree)
}

fn attach(tree: &mut BlockTree, stack: &mut [Frame], id: NodeId) {
    match stack.last_mut() {
        Some(frame) => {
            if let Some(arm) = frame.arms.last_mut() {
                arm.body.push(id);
            }
        }
        None => tree.root.push(id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::{tokenize, LexMode};
    use crate::statement::split_statements;
    use pretty_assertions::assert_eq;

    fn parse(src: &str) -> Result<BlockTree, BlockError> {
        let tokens = tokenize(src, LexMode::Macro).unwrap();
        parse_blocks(split_statements(src, &tokens))
    }

    #[test]
    fn nests_blocks_inside_procedures() {
        let tree = parse(
            "Option Explicit\n\
             Sub Main()\n\
               For i = 1 To 3\n\
                 If i = 2 Then\n\
                   x = 1\n\
                 ElseIf i = 3 Then\n\
                   x = 2\n\
                 Else\n\
                   x = 3\n\
                 End If\n\
               Next i\n\
             End Sub\n",
        )
        .unwrap();
        assert_eq!(tree.root().len(), 2);
        let proc = tree.top_level_blocks(BlockKind::Procedure).next().unwrap();
        let Node::Block(for_block) = tree.node(proc.arms[0].body[0]) else {
            panic!("expected a For block");
        };
        assert_eq!(for_block.kind, BlockKind::For);
        let Node::Block(if_block) = tree.node(for_block.arms[0].body[0]) else {
            panic!("expected an If block");
        };
        assert_eq!(if_block.arms.len(), 3);
        assert_eq!(if_block.close.text, "End If");
    }

    #[test]
    fn inline_if_and_declare_do_not_push() {
        let tree = parse(
            "Private Declare PtrSafe Function GetTickCount Lib \"kernel32\" () As Long\n\
             Sub A()\n\
               If x Then Exit Sub\n\
             End Sub\n",
        )
        .unwrap();
        assert_eq!(tree.top_level_blocks(BlockKind::Procedure).count(), 1);
    }

    #[test]
    fn close_without_a_matching_open_block_is_unbalanced() {
        let err = parse("Sub A()\n  For i = 1 To 2\n  End If\n  Next i\nEnd Sub\n").unwrap_err();
        assert_eq!(
            err,
            BlockError::Unbalanced {
                expected: Some(BlockKind::For),
                found: "End If".to_string(),
                line: 3
            }
        );
    }

    #[test]
    fn missing_close_is_unterminated_at_the_open_line() {
        let err = parse("Sub A()\n  x = 1\n  Do While x < 3\n    x = x + 1\nEnd Sub\n").unwrap_err();
        assert_eq!(err, BlockError::Unterminated { kind: BlockKind::Do, line: 3 });

        let err = parse("Sub A()\n  If x Then\n    y = 1\nEnd Sub\n").unwrap_err();
        assert_eq!(err, BlockError::Unterminated { kind: BlockKind::If, line: 2 });

        let err = parse("Sub A()\n  x = 1\nSub B()\nEnd Sub\n").unwrap_err();
        assert_eq!(err, BlockError::Unterminated { kind: BlockKind::Procedure, line: 1 });

        let err = parse("Sub A()\n  With ws\n    .Name = \"x\"\n  End With\n").unwrap_err();
        assert_eq!(err, BlockError::Unterminated { kind: BlockKind::Procedure, line: 1 });
    }

    #[test]
    fn select_case_arms() {
        let tree = parse("Sub A()\nSelect Case x\n  Case 1: y = 1\n  Case Else\n    y = 2\nEnd Select\nEnd Sub").unwrap();
        let proc = tree.top_level_blocks(BlockKind::Procedure).next().unwrap();
        let Node::Block(select) = tree.node(proc.arms[0].body[0]) else {
            panic!("expected Select Case");
        };
        assert_eq!(select.kind, BlockKind::SelectCase);
        // header arm + two Case arms
        assert_eq!(select.arms.len(), 3);
        assert_eq!(select.arms[1].body.len(), 1);
    }

    #[test]
    fn enum_and_type_are_blocks_but_dim_as_type_is_not() {
        let tree = parse("Public Enum Color\n  Red = 1\nEnd Enum\nPrivate Type Pt\n  X As Double\nEnd Type\n").unwrap();
        assert_eq!(tree.top_level_blocks(BlockKind::Enum).count(), 1);
        assert_eq!(tree.top_level_blocks(BlockKind::Type).count(), 1);
    }

    #[test]
    fn stray_middle_is_unbalanced() {
        assert!(matches!(parse("Else\n"), Err(BlockError::Unbalanced { expected: None, .. })));
    }
}
