//! Front end for VBA module source: tokens, logical statements and the nested block tree.
//!
//! The same lexer serves the formula mini-language through [`LexMode::Formula`].

mod block;
mod boundary;
mod lexer;
mod statement;

pub use block::{
    classify_statement, parse_blocks, Arm, Block, BlockError, BlockKind, BlockTree, Node, NodeId,
    StatementRole,
};
pub use boundary::{looks_like_macro_source, scan_module_boundaries, ModuleBoundaries, ModuleSegment};
pub use lexer::{tokenize, tokenize_lossy, LexError, LexMode, Lexer, Token, TokenKind};
pub use statement::{is_inline_if, split_inline_if, split_statements, InlineIf, Statement};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyntaxError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Block(#[from] BlockError),
}

impl SyntaxError {
    pub fn line(&self) -> usize {
        match self {
            SyntaxError::Lex(LexError::UnterminatedString { line }) => *line,
            SyntaxError::Block(err) => err.line(),
        }
    }
}

/// Tokenizes, splits and block-parses a whole module.
pub fn parse_module(source: &str) -> Result<BlockTree, SyntaxError> {
    let tokens = tokenize(source, LexMode::Macro)?;
    let statements = split_statements(source, &tokens);
    Ok(parse_blocks(statements)?)
}

/// Upper-cased names of the functions a formula calls, in sorted order.
pub fn formula_functions(formula: &str) -> std::collections::BTreeSet<String> {
    let tokens = tokenize_lossy(formula, LexMode::Formula);
    tokens
        .windows(2)
        .filter(|w| w[0].kind == TokenKind::Identifier && w[1].kind == TokenKind::LParen)
        .map(|w| {
            let name = w[0].lexeme.to_ascii_uppercase();
            name.strip_prefix("_XLFN.").map(str::to_string).unwrap_or(name)
        })
        .collect()
}
