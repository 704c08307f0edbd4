//! VBA expression trees and a binding-power parser over macro-mode tokens.

use thiserror::Error;
use vba2py_syntax::{Token, TokenKind};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Int(i64),
    /// Python spelling of a floating literal.
    Float(String),
    Str(String),
    /// Contents of a `#...#` literal.
    Date(String),
    Bool(bool),
    /// `Nothing`, `Empty` and `Null`.
    Nothing,
    Me,
    Name(String),
    /// `target.name`; `None` is the implicit `With` target (`.Value`).
    Member {
        target: Option<Box<Expr>>,
        name: String,
    },
    /// `target!key`
    Bang {
        target: Option<Box<Expr>>,
        key: String,
    },
    /// A call or an index; VBA does not distinguish them syntactically.
    Call {
        callee: Box<Expr>,
        args: Vec<Arg>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `New T`, with a possibly qualified type name.
    New(String),
    TypeOf {
        expr: Box<Expr>,
        type_name: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Arg {
    /// `name:=value`
    pub name: Option<String>,
    /// `None` for an omitted positional argument (`f(a, , c)`).
    pub value: Option<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Neg,
    Plus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Pow,
    Mul,
    Div,
    IntDiv,
    Mod,
    Add,
    Sub,
    Concat,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Like,
    Is,
    And,
    Or,
    Xor,
    Eqv,
    Imp,
}

/// An expression, formula or declaration that does not parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (near `{near}`)")]
pub struct ParseError {
    pub message: String,
    pub near: String,
}

const NOT_BP: u8 = 12;
const UNARY_MINUS_BP: u8 = 26;
/// Operand of `TypeOf x Is T` binds tighter than comparisons.
const TYPEOF_BP: u8 = 15;

/// VBA precedence, loosest first: `Imp`, `Eqv`, `Xor`, `Or`, `And`, `Not`, comparisons, `&`,
/// `+ -`, `Mod`, `\`, `* /`, unary minus, `^`. All binary operators are left associative.
fn infix_binding_power(tok: &Token) -> Option<(BinaryOp, u8, u8)> {
    let op = match tok.kind {
        TokenKind::Caret => BinaryOp::Pow,
        TokenKind::Star => BinaryOp::Mul,
        TokenKind::Slash => BinaryOp::Div,
        TokenKind::Backslash => BinaryOp::IntDiv,
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Sub,
        TokenKind::Amp => BinaryOp::Concat,
        TokenKind::Eq => BinaryOp::Eq,
        TokenKind::Ne => BinaryOp::Ne,
        TokenKind::Lt => BinaryOp::Lt,
        TokenKind::Gt => BinaryOp::Gt,
        TokenKind::Le => BinaryOp::Le,
        TokenKind::Ge => BinaryOp::Ge,
        TokenKind::Keyword => match tok.lexeme.to_ascii_lowercase().as_str() {
            "mod" => BinaryOp::Mod,
            "like" => BinaryOp::Like,
            "is" => BinaryOp::Is,
            "and" => BinaryOp::And,
            "or" => BinaryOp::Or,
            "xor" => BinaryOp::Xor,
            "eqv" => BinaryOp::Eqv,
            "imp" => BinaryOp::Imp,
            _ => return None,
        },
        _ => return None,
    };
    let l_bp = match op {
        BinaryOp::Imp => 2,
        BinaryOp::Eqv => 4,
        BinaryOp::Xor => 6,
        BinaryOp::Or => 8,
        BinaryOp::And => 10,
        BinaryOp::Eq
        | BinaryOp::Ne
        | BinaryOp::Lt
        | BinaryOp::Gt
        | BinaryOp::Le
        | BinaryOp::Ge
        | BinaryOp::Like
        | BinaryOp::Is => 14,
        BinaryOp::Concat => 16,
        BinaryOp::Add | BinaryOp::Sub => 18,
        BinaryOp::Mod => 20,
        BinaryOp::IntDiv => 22,
        BinaryOp::Mul | BinaryOp::Div => 24,
        BinaryOp::Pow => 28,
    };
    Some((op, l_bp, l_bp + 1))
}

/// Parses a complete expression; trailing tokens are an error.
pub(crate) fn parse_expression(tokens: &[Token]) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(tokens);
    let expr = parser.expression(0)?;
    parser.expect_end()?;
    Ok(expr)
}

/// Parses a member/call chain (`a.b(1).c`) that must span all of `tokens`; used for the
/// target of an assignment.
pub(crate) fn parse_lvalue(tokens: &[Token]) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(tokens);
    let expr = parser.chain(true)?;
    parser.expect_end()?;
    Ok(expr)
}

/// A call statement: `Call f(a)`, `f a, b`, `obj.M a` or `Debug.Print a; b`.
///
/// Returns the callee and its arguments; a bare `f` or `obj.M` has no arguments.
pub(crate) fn parse_call_statement(tokens: &[Token]) -> Result<(Expr, Vec<Arg>), ParseError> {
    let mut parser = Parser::new(tokens);
    let callee = parser.chain(false)?;
    if parser.at_end() {
        return Ok(match callee {
            Expr::Call { callee, args } => (*callee, args),
            other => (other, Vec::new()),
        });
    }
    let args = parser.bare_arguments()?;
    Ok((callee, args))
}

/// Index of the first `=` outside parentheses.
pub(crate) fn top_level_eq(tokens: &[Token]) -> Option<usize> {
    let mut depth = 0usize;
    for (i, tok) in tokens.iter().enumerate() {
        match tok.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => depth = depth.saturating_sub(1),
            TokenKind::Eq if depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

/// Splits at top-level occurrences of `is_sep`.
pub(crate) fn split_top_level<'t>(tokens: &'t [Token], is_sep: impl Fn(&Token) -> bool) -> Vec<&'t [Token]> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, tok) in tokens.iter().enumerate() {
        match tok.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => depth = depth.saturating_sub(1),
            _ if depth == 0 && is_sep(tok) => {
                parts.push(&tokens[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&tokens[start..]);
    parts
}

struct Parser<'t> {
    toks: &'t [Token],
    pos: usize,
}

impl<'t> Parser<'t> {
    fn new(toks: &'t [Token]) -> Self {
        Self { toks, pos: 0 }
    }

    fn peek(&self) -> Option<&'t Token> {
        self.toks.get(self.pos)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.toks.len()
    }

    fn bump(&mut self) -> Option<&'t Token> {
        let tok = self.toks.get(self.pos)?;
        self.pos += 1;
        Some(tok)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            near: self
                .peek()
                .map_or_else(|| "end of statement".to_string(), |t| t.lexeme.clone()),
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<&'t Token, ParseError> {
        match self.peek() {
            Some(tok) if tok.kind == kind => {
                self.pos += 1;
                Ok(tok)
            }
            _ => Err(self.error(format!("expected {what}"))),
        }
    }

    fn expect_end(&self) -> Result<(), ParseError> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.error("unexpected token"))
        }
    }

    fn expression(&mut self, min_bp: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.prefix()?;
        while let Some(tok) = self.peek() {
            let Some((op, l_bp, r_bp)) = infix_binding_power(tok) else {
                break;
            };
            if l_bp < min_bp {
                break;
            }
            self.pos += 1;
            let rhs = self.expression(r_bp)?;
            lhs = Expr::Binary {
                op,
                left: Box::new(lhs),
                right: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn prefix(&mut self) -> Result<Expr, ParseError> {
        let Some(tok) = self.peek() else {
            return Err(self.error("expected an expression"));
        };
        match tok.kind {
            TokenKind::Minus | TokenKind::Plus => {
                self.pos += 1;
                let operand = self.expression(UNARY_MINUS_BP)?;
                let op = if tok.kind == TokenKind::Minus {
                    UnaryOp::Neg
                } else {
                    UnaryOp::Plus
                };
                Ok(Expr::Unary {
                    op,
                    expr: Box::new(operand),
                })
            }
            TokenKind::Keyword if tok.is_kw("not") => {
                self.pos += 1;
                let operand = self.expression(NOT_BP)?;
                Ok(Expr::Unary {
                    op: UnaryOp::Not,
                    expr: Box::new(operand),
                })
            }
            TokenKind::Keyword if tok.is_kw("typeof") => {
                self.pos += 1;
                let operand = self.expression(TYPEOF_BP)?;
                match self.bump() {
                    Some(is) if is.is_kw("is") => {}
                    _ => return Err(self.error("expected `Is` after `TypeOf`")),
                }
                let type_name = self.qualified_name()?;
                Ok(Expr::TypeOf {
                    expr: Box::new(operand),
                    type_name,
                })
            }
            TokenKind::Keyword if tok.is_kw("new") => {
                self.pos += 1;
                Ok(Expr::New(self.qualified_name()?))
            }
            _ => self.postfix_chain(),
        }
    }

    fn postfix_chain(&mut self) -> Result<Expr, ParseError> {
        let atom = self.atom()?;
        self.suffixes(atom, true)
    }

    fn atom(&mut self) -> Result<Expr, ParseError> {
        let Some(tok) = self.bump() else {
            return Err(self.error("expected an expression"));
        };
        let expr = match tok.kind {
            TokenKind::Integer => integer_literal(tok.name()).ok_or_else(|| ParseError {
                message: "integer literal out of range".to_string(),
                near: tok.lexeme.clone(),
            })?,
            TokenKind::Float => Expr::Float(float_literal(tok.name())),
            TokenKind::Str => Expr::Str(tok.string_value()),
            TokenKind::Date => Expr::Date(tok.lexeme.trim_matches('#').trim().to_string()),
            TokenKind::Identifier => Expr::Name(tok.name().to_string()),
            TokenKind::Keyword => match tok.lexeme.to_ascii_lowercase().as_str() {
                "true" => Expr::Bool(true),
                "false" => Expr::Bool(false),
                "nothing" | "empty" | "null" => Expr::Nothing,
                "me" => Expr::Me,
                // Runtime functions that share a spelling with a statement keyword.
                "error" | "input" => Expr::Name(tok.lexeme.clone()),
                _ => {
                    self.pos -= 1;
                    return Err(self.error("unexpected keyword"));
                }
            },
            TokenKind::LParen => {
                let inner = self.expression(0)?;
                self.expect(TokenKind::RParen, "`)`")?;
                inner
            }
            TokenKind::Dot => Expr::Member {
                target: None,
                name: self.member_name()?,
            },
            TokenKind::Bang => Expr::Bang {
                target: None,
                key: self.member_name()?,
            },
            _ => {
                self.pos -= 1;
                return Err(self.error("expected an expression"));
            }
        };
        Ok(expr)
    }

    /// Member names may be keywords (`.End`, `.Select`, `.Type`).
    fn member_name(&mut self) -> Result<String, ParseError> {
        match self.peek() {
            Some(tok) if tok.is_name_like() => {
                self.pos += 1;
                Ok(tok.name().to_string())
            }
            _ => Err(self.error("expected a member name")),
        }
    }

    fn qualified_name(&mut self) -> Result<String, ParseError> {
        let mut name = self.member_name()?;
        while self.peek_kind() == Some(TokenKind::Dot) {
            self.pos += 1;
            name.push('.');
            name.push_str(&self.member_name()?);
        }
        Ok(name)
    }

    /// `.member`, `!key` and `(args)` suffixes. With `greedy` unset, a parenthesized group
    /// that is followed by more tokens (other than another suffix) is left for the caller:
    /// in `f (a), b` or `Debug.Print (x) * 2` it starts the argument list.
    fn suffixes(&mut self, mut expr: Expr, greedy: bool) -> Result<Expr, ParseError> {
        loop {
            match self.peek_kind() {
                Some(TokenKind::Dot) => {
                    self.pos += 1;
                    let name = self.member_name()?;
                    expr = Expr::Member {
                        target: Some(Box::new(expr)),
                        name,
                    };
                }
                Some(TokenKind::Bang) => {
                    self.pos += 1;
                    let key = self.member_name()?;
                    expr = Expr::Bang {
                        target: Some(Box::new(expr)),
                        key,
                    };
                }
                Some(TokenKind::LParen) => {
                    if !greedy && !self.group_continues_chain() {
                        return Ok(expr);
                    }
                    self.pos += 1;
                    let args = self.paren_arguments()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    /// Whether the parenthesized group at the cursor ends the statement or is followed by
    /// another suffix.
    fn group_continues_chain(&self) -> bool {
        let mut depth = 0usize;
        for (i, tok) in self.toks.iter().enumerate().skip(self.pos) {
            match tok.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        return match self.toks.get(i + 1) {
                            None => true,
                            Some(next) => {
                                matches!(next.kind, TokenKind::Dot | TokenKind::Bang | TokenKind::LParen)
                            }
                        };
                    }
                }
                _ => {}
            }
        }
        false
    }

    /// Callee chain of a statement: a name, `Me` or an implicit `With` member, then suffixes.
    fn chain(&mut self, greedy: bool) -> Result<Expr, ParseError> {
        let start = match self.peek() {
            Some(tok) if tok.kind == TokenKind::Identifier => {
                self.pos += 1;
                Expr::Name(tok.name().to_string())
            }
            Some(tok) if tok.is_kw("me") => {
                self.pos += 1;
                Expr::Me
            }
            Some(tok) if tok.is_kw("error") || tok.is_kw("input") => {
                self.pos += 1;
                Expr::Name(tok.lexeme.clone())
            }
            Some(tok) if tok.kind == TokenKind::Dot || tok.kind == TokenKind::Bang => self.atom()?,
            _ => return Err(self.error("expected a name")),
        };
        self.suffixes(start, greedy)
    }

    /// After `(`: arguments up to the matching `)`.
    fn paren_arguments(&mut self) -> Result<Vec<Arg>, ParseError> {
        let mut args = Vec::new();
        if self.peek_kind() == Some(TokenKind::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.argument(&[TokenKind::Comma, TokenKind::RParen])?);
            match self.peek_kind() {
                Some(TokenKind::Comma) => self.pos += 1,
                Some(TokenKind::RParen) => {
                    self.pos += 1;
                    return Ok(args);
                }
                _ => return Err(self.error("expected `,` or `)`")),
            }
        }
    }

    /// Unparenthesized statement arguments separated by `,` or `;`.
    fn bare_arguments(&mut self) -> Result<Vec<Arg>, ParseError> {
        let mut args = Vec::new();
        loop {
            if self.at_end() {
                return Ok(args);
            }
            args.push(self.argument(&[TokenKind::Comma, TokenKind::Semicolon])?);
            match self.peek_kind() {
                None => return Ok(args),
                Some(TokenKind::Comma | TokenKind::Semicolon) => {
                    let sep = self.bump().map(|t| t.kind);
                    // A trailing `;` only suppresses the newline in `Debug.Print`.
                    if self.at_end() && sep == Some(TokenKind::Semicolon) {
                        return Ok(args);
                    }
                }
                _ => return Err(self.error("expected `,`")),
            }
        }
    }

    fn argument(&mut self, terminators: &[TokenKind]) -> Result<Arg, ParseError> {
        match self.peek() {
            None => return Ok(Arg { name: None, value: None }),
            Some(tok) if terminators.contains(&tok.kind) => return Ok(Arg { name: None, value: None }),
            _ => {}
        }
        let name = match (self.peek(), self.toks.get(self.pos + 1)) {
            (Some(name), Some(sep)) if name.is_name_like() && sep.kind == TokenKind::ColonEq => {
                self.pos += 2;
                Some(name.name().to_string())
            }
            _ => None,
        };
        if self.peek().is_some_and(|t| t.is_kw("byval")) {
            self.pos += 1;
        }
        let value = self.expression(0)?;
        Ok(Arg {
            name,
            value: Some(value),
        })
    }
}

fn integer_literal(text: &str) -> Option<Expr> {
    let lower = text.to_ascii_lowercase();
    let value = if let Some(hex) = lower.strip_prefix("&h") {
        i64::from_str_radix(hex, 16).ok()?
    } else if let Some(oct) = lower.strip_prefix("&o") {
        i64::from_str_radix(oct, 8).ok()?
    } else {
        match text.parse::<i64>() {
            Ok(v) => v,
            Err(_) => return Some(Expr::Float(float_literal(text))),
        }
    };
    Some(Expr::Int(value))
}

fn float_literal(text: &str) -> String {
    let mut out = text.to_ascii_lowercase();
    if out.starts_with('.') {
        out.insert(0, '0');
    }
    if !out.contains(['.', 'e']) {
        out.push_str(".0");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use vba2py_syntax::{tokenize, LexMode};

    fn positional(value: Expr) -> Arg {
        Arg {
            name: None,
            value: Some(value),
        }
    }

    fn toks(src: &str) -> Vec<Token> {
        let mut t = tokenize(src, LexMode::Macro).unwrap();
        t.retain(|t| !matches!(t.kind, TokenKind::Eof | TokenKind::Newline));
        t
    }

    fn name(n: &str) -> Box<Expr> {
        Box::new(Expr::Name(n.to_string()))
    }

    #[test]
    fn exponent_binds_tighter_than_negation() {
        let expr = parse_expression(&toks("-2 ^ 2")).unwrap();
        assert_eq!(
            expr,
            Expr::Unary {
                op: UnaryOp::Neg,
                expr: Box::new(Expr::Binary {
                    op: BinaryOp::Pow,
                    left: Box::new(Expr::Int(2)),
                    right: Box::new(Expr::Int(2)),
                }),
            }
        );
    }

    #[test]
    fn concatenation_is_looser_than_addition() {
        let expr = parse_expression(&toks("a & b + 1")).unwrap();
        let Expr::Binary { op, right, .. } = expr else {
            panic!("expected a binary expression");
        };
        assert_eq!(op, BinaryOp::Concat);
        assert!(matches!(*right, Expr::Binary { op: BinaryOp::Add, .. }));
    }

    #[test]
    fn not_applies_to_the_whole_comparison() {
        let expr = parse_expression(&toks("Not a = b And c")).unwrap();
        let Expr::Binary { op: BinaryOp::And, left, .. } = expr else {
            panic!("expected And at the root");
        };
        assert!(matches!(*left, Expr::Unary { op: UnaryOp::Not, .. }));
    }

    #[test]
    fn parses_calls_members_and_named_arguments() {
        let expr = parse_expression(&toks("ws.Cells(i, 2).Value")).unwrap();
        assert!(matches!(expr, Expr::Member { ref name, .. } if name == "Value"));

        let expr = parse_expression(&toks("f(a, , key:=1)")).unwrap();
        let Expr::Call { args, .. } = expr else {
            panic!("expected a call");
        };
        assert_eq!(args.len(), 3);
        assert_eq!(args[1].value, None);
        assert_eq!(args[2].name.as_deref(), Some("key"));
    }

    #[test]
    fn literals() {
        assert_eq!(parse_expression(&toks("&HFF")).unwrap(), Expr::Int(255));
        assert_eq!(parse_expression(&toks(".5")).unwrap(), Expr::Float("0.5".to_string()));
        assert_eq!(parse_expression(&toks("1#")).unwrap(), Expr::Int(1));
        assert_eq!(parse_expression(&toks("\"a\"\"b\"")).unwrap(), Expr::Str("a\"b".to_string()));
    }

    #[test]
    fn call_statements_with_bare_arguments() {
        let (callee, args) = parse_call_statement(&toks("Debug.Print \"x\"; y")).unwrap();
        assert!(matches!(callee, Expr::Member { ref name, .. } if name == "Print"));
        assert_eq!(args.len(), 2);

        let (callee, args) = parse_call_statement(&toks("Report (a), b")).unwrap();
        assert_eq!(callee, Expr::Name("Report".to_string()));
        assert_eq!(args.len(), 2);

        let (callee, args) = parse_call_statement(&toks("Range(\"A1\").Select")).unwrap();
        assert!(matches!(callee, Expr::Member { ref name, .. } if name == "Select"));
        assert!(args.is_empty());

        let (callee, args) = parse_call_statement(&toks("MsgBox (x)")).unwrap();
        assert_eq!(callee, Expr::Name("MsgBox".to_string()));
        assert_eq!(args, vec![positional(Expr::Name("x".to_string()))]);

        let (_, args) = parse_call_statement(&toks("Debug.Print (a) * 2")).unwrap();
        assert!(matches!(args[0].value, Some(Expr::Binary { op: BinaryOp::Mul, .. })));
    }

    #[test]
    fn lvalues_span_all_tokens() {
        assert_eq!(
            parse_lvalue(&toks("arr(i)")).unwrap(),
            Expr::Call {
                callee: name("arr"),
                args: vec![positional(Expr::Name("i".to_string()))],
            }
        );
        assert!(parse_lvalue(&toks("Debug.Print a")).is_err());
    }

    #[test]
    fn rejects_dangling_operators() {
        assert!(parse_expression(&toks("a +")).is_err());
        assert!(parse_expression(&toks("(a")).is_err());
        assert!(parse_expression(&toks("a b")).is_err());
    }
}
