use crate::lexer::{Token, TokenKind};

/// One logical statement: a physical line (after `_` continuations are joined) or one
/// colon-separated part of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// Code tokens without comments, newlines or the final `Eof`.
    pub tokens: Vec<Token>,
    /// Trailing `'` / `Rem` comment, without the marker.
    pub comment: Option<String>,
    /// 1-based line of the first token (or of the comment for comment-only lines).
    pub line: usize,
    /// Source text of the code tokens with continuations folded onto one line.
    pub text: String,
}

impl Statement {
    pub fn is_blank(&self) -> bool {
        self.tokens.is_empty() && self.comment.is_none()
    }

    pub fn is_comment_only(&self) -> bool {
        self.tokens.is_empty() && self.comment.is_some()
    }

    pub fn first(&self) -> Option<&Token> {
        self.tokens.first()
    }

    /// Index of the first token after any of the given leading modifier keywords.
    pub fn skip_modifiers(&self, modifiers: &[&str]) -> usize {
        self.tokens
            .iter()
            .take_while(|t| modifiers.iter().any(|m| t.is_kw(m)))
            .count()
    }

    /// `Label:` statements produced by the splitter.
    pub fn label(&self) -> Option<&str> {
        match self.tokens.as_slice() {
            [name, colon] if name.kind == TokenKind::Identifier && colon.kind == TokenKind::Colon => {
                Some(name.lexeme.as_str())
            }
            _ => None,
        }
    }

    fn from_tokens(source: &str, tokens: Vec<Token>, comment: Option<String>, line: usize) -> Self {
        let text = match (tokens.first(), tokens.last()) {
            (Some(first), Some(last)) => fold_continuations(&source[first.offset..last.end()]),
            _ => String::new(),
        };
        Self {
            line: tokens.first().map_or(line, |t| t.line),
            tokens,
            comment,
            text,
        }
    }
}

fn fold_continuations(text: &str) -> String {
    if !text.contains('\n') {
        return text.to_string();
    }
    text.lines()
        .map(|l| l.trim_end().trim_end_matches('_').trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn comment_text(tok: &Token) -> String {
    let body = if tok.lexeme.starts_with('\'') {
        &tok.lexeme[1..]
    } else {
        // `Rem`
        &tok.lexeme[3.min(tok.lexeme.len())..]
    };
    body.trim_end().to_string()
}

/// Groups a token stream into logical statements.
///
/// Blank and comment-only lines are kept as statements so that layout survives translation.
/// Lines are split at `:` separators except for single-line `If` statements, which stay whole,
/// and a leading `Label:` becomes its own statement.
pub fn split_statements(source: &str, tokens: &[Token]) -> Vec<Statement> {
    let mut out = Vec::new();
    let mut line_tokens: Vec<Token> = Vec::new();
    let mut comment: Option<String> = None;
    let mut line_no = 1;

    for tok in tokens {
        match tok.kind {
            TokenKind::Newline | TokenKind::Eof => {
                let is_last = tok.kind == TokenKind::Eof;
                if !(is_last && line_tokens.is_empty() && comment.is_none()) {
                    push_logical_line(source, std::mem::take(&mut line_tokens), comment.take(), line_no, &mut out);
                }
                line_no = tok.line + 1;
            }
            TokenKind::Comment => comment = Some(comment_text(tok)),
            _ => line_tokens.push(tok.clone()),
        }
    }
    out
}

fn push_logical_line(
    source: &str,
    tokens: Vec<Token>,
    comment: Option<String>,
    line: usize,
    out: &mut Vec<Statement>,
) {
    if tokens.is_empty() {
        out.push(Statement::from_tokens(source, tokens, comment, line));
        return;
    }

    let mut rest = tokens.as_slice();
    if let [name, colon, ..] = rest {
        if name.kind == TokenKind::Identifier
            && colon.kind == TokenKind::Colon
            && name.lexeme.chars().all(|c| c.is_alphanumeric() || c == '_')
        {
            let label = rest[..2].to_vec();
            rest = &rest[2..];
            let comment_here = if rest.is_empty() { comment.clone() } else { None };
            out.push(Statement::from_tokens(source, label, comment_here, line));
            if rest.is_empty() {
                return;
            }
        }
    }

    if is_inline_if(rest) {
        out.push(Statement::from_tokens(source, rest.to_vec(), comment, line));
        return;
    }

    let parts: Vec<&[Token]> = rest
        .split(|t| t.kind == TokenKind::Colon)
        .filter(|p| !p.is_empty())
        .collect();
    let last = parts.len().saturating_sub(1);
    for (i, part) in parts.into_iter().enumerate() {
        let c = if i == last { comment.clone() } else { None };
        out.push(Statement::from_tokens(source, part.to_vec(), c, line));
    }
}

/// `If cond Then <statement>` with code after `Then` on the same logical line.
pub fn is_inline_if(tokens: &[Token]) -> bool {
    if !tokens.first().is_some_and(|t| t.is_kw("if")) {
        return false;
    }
    match tokens.iter().position(|t| t.is_kw("then")) {
        Some(idx) => idx + 1 < tokens.len(),
        None => false,
    }
}

/// Parts of a single-line `If cond Then a: b Else c`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineIf {
    pub condition: Vec<Token>,
    pub then_branch: Vec<Statement>,
    pub else_branch: Vec<Statement>,
}

pub fn split_inline_if(source: &str, stmt: &Statement) -> Option<InlineIf> {
    if !is_inline_if(&stmt.tokens) {
        return None;
    }
    let then_idx = stmt.tokens.iter().position(|t| t.is_kw("then"))?;
    let condition = stmt.tokens[1..then_idx].to_vec();
    let tail = &stmt.tokens[then_idx + 1..];

    // The first `Else` not belonging to a nested inline `If` splits the branches.
    let mut depth = 0usize;
    let mut else_idx = None;
    for (i, t) in tail.iter().enumerate() {
        if t.is_kw("if") {
            depth += 1;
        } else if t.is_kw("else") {
            if depth == 0 {
                else_idx = Some(i);
                break;
            }
            depth -= 1;
        }
    }
    let (then_toks, else_toks) = match else_idx {
        Some(i) => (&tail[..i], &tail[i + 1..]),
        None => (tail, &tail[tail.len()..]),
    };

    let branch = |toks: &[Token], comment: Option<String>| -> Vec<Statement> {
        if is_inline_if(toks) {
            return vec![Statement::from_tokens(source, toks.to_vec(), comment, stmt.line)];
        }
        let parts: Vec<&[Token]> = toks
            .split(|t| t.kind == TokenKind::Colon)
            .filter(|p| !p.is_empty())
            .collect();
        let last = parts.len().saturating_sub(1);
        parts
            .into_iter()
            .enumerate()
            .map(|(i, p)| {
                let c = if i == last { comment.clone() } else { None };
                Statement::from_tokens(source, p.to_vec(), c, stmt.line)
            })
            .collect()
    };

    let (then_comment, else_comment) = if else_toks.is_empty() {
        (stmt.comment.clone(), None)
    } else {
        (None, stmt.comment.clone())
    };
    Some(InlineIf {
        condition,
        then_branch: branch(then_toks, then_comment),
        else_branch: branch(else_toks, else_comment),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::{tokenize, LexMode};
    use pretty_assertions::assert_eq;

    fn split(src: &str) -> Vec<Statement> {
        let tokens = tokenize(src, LexMode::Macro).unwrap();
        split_statements(src, &tokens)
    }

    fn texts(src: &str) -> Vec<String> {
        split(src).into_iter().map(|s| s.text).collect()
    }

    #[test]
    fn splits_on_colons_and_keeps_blank_lines() {
        assert_eq!(
            texts("a = 1: b = 2\n\nc = 3 ' done"),
            vec!["a = 1", "b = 2", "", "c = 3"]
        );
        let stmts = split("a = 1: b = 2\n\nc = 3 ' done");
        assert!(stmts[2].is_blank());
        assert_eq!(stmts[3].comment.as_deref(), Some(" done"));
        assert_eq!(stmts[3].line, 3);
    }

    #[test]
    fn labels_become_their_own_statement() {
        let stmts = split("ErrHandler: MsgBox \"x\"");
        assert_eq!(stmts[0].label(), Some("ErrHandler"));
        assert_eq!(stmts[1].text, "MsgBox \"x\"");
    }

    #[test]
    fn inline_if_stays_whole() {
        let src = "If x > 1 Then y = 2: z = 3 Else y = 0";
        let stmts = split(src);
        assert_eq!(stmts.len(), 1);
        let parts = split_inline_if(src, &stmts[0]).unwrap();
        assert_eq!(parts.condition.len(), 3);
        let then: Vec<_> = parts.then_branch.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(then, vec!["y = 2", "z = 3"]);
        assert_eq!(parts.else_branch[0].text, "y = 0");
    }

    #[test]
    fn block_if_is_not_inline() {
        let stmts = split("If x Then ' comment\n  y = 1\nEnd If");
        assert!(!is_inline_if(&stmts[0].tokens));
        assert_eq!(stmts.len(), 3);
    }

    #[test]
    fn continuation_text_is_folded() {
        let stmts = split("total = a + _\n    b");
        assert_eq!(stmts.len(), 1);
        assert_eq!(stmts[0].text, "total = a + b");
    }
}
