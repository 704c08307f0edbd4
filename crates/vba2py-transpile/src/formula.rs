//! Single spreadsheet formulas to pandas expressions.
//!
//! References are translated against a DataFrame `df` whose columns are the sheet's column
//! letters and whose index is the 0-based row number. References qualified with another sheet
//! read from `sheets["Name"]`.

use std::collections::BTreeSet;

use thiserror::Error;
use vba2py_model::{ConversionResult, NoteCode, TranslationNote};
use vba2py_syntax::{tokenize, LexMode, Token, TokenKind};

use crate::expr::ParseError;
use crate::helpers::helper;
use crate::py::{prec, string_literal, ImportSet, Py};
use crate::tables::MappingTables;
use crate::ConvertOptions;

const NUMPY: &[&str] = &["import numpy as np"];

/// A cell, a rectangular range or whole columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Cell { column: String, row: u32 },
    Range { first: (String, u32), last: (String, u32) },
    Columns { first: String, last: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormulaOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Concat,
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl FormulaOp {
    fn from_token(kind: TokenKind) -> Option<FormulaOp> {
        Some(match kind {
            TokenKind::Eq => FormulaOp::Eq,
            TokenKind::Ne => FormulaOp::Ne,
            TokenKind::Lt => FormulaOp::Lt,
            TokenKind::Gt => FormulaOp::Gt,
            TokenKind::Le => FormulaOp::Le,
            TokenKind::Ge => FormulaOp::Ge,
            TokenKind::Amp => FormulaOp::Concat,
            TokenKind::Plus => FormulaOp::Add,
            TokenKind::Minus => FormulaOp::Sub,
            TokenKind::Star => FormulaOp::Mul,
            TokenKind::Slash => FormulaOp::Div,
            TokenKind::Caret => FormulaOp::Pow,
            _ => return None,
        })
    }

    /// Left binding power; all operators are left-associative.
    fn binding_power(self) -> u8 {
        match self {
            FormulaOp::Eq | FormulaOp::Ne | FormulaOp::Lt | FormulaOp::Gt | FormulaOp::Le | FormulaOp::Ge => 1,
            FormulaOp::Concat => 2,
            FormulaOp::Add | FormulaOp::Sub => 3,
            FormulaOp::Mul | FormulaOp::Div => 4,
            FormulaOp::Pow => 5,
        }
    }
}

/// Binding power of prefix `-`/`+`, tighter than `^` as in spreadsheets (`-2^2` is 4).
const PREFIX_BP: u8 = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Formula {
    Number { text: String, int: Option<i64> },
    Text(String),
    Bool(bool),
    Error(String),
    Ref { sheet: Option<String>, reference: Reference },
    /// A defined name or anything else that is not a reference.
    Name(String),
    Array(Vec<Vec<Formula>>),
    Call { name: String, args: Vec<Option<Formula>> },
    Neg(Box<Formula>),
    Percent(Box<Formula>),
    Binary { op: FormulaOp, left: Box<Formula>, right: Box<Formula> },
}

/// Splits `$B$12` into `("B", Some(12))` and `C` into `("C", None)`.
fn split_cell(text: &str) -> Option<(String, Option<u32>)> {
    let text: String = text.chars().filter(|&c| c != '$').collect();
    let letters = text.chars().take_while(char::is_ascii_alphabetic).count();
    if !(1..=3).contains(&letters) {
        return None;
    }
    let (column, digits) = text.split_at(letters);
    let row = if digits.is_empty() {
        None
    } else {
        match digits.parse::<u32>() {
            Ok(row) if row >= 1 && digits.chars().all(|c| c.is_ascii_digit()) => Some(row),
            _ => return None,
        }
    };
    Some((column.to_ascii_uppercase(), row))
}

fn column_order(column: &str) -> (usize, &str) {
    (column.len(), column)
}

struct Parser<'t> {
    toks: &'t [Token],
    pos: usize,
}

impl<'t> Parser<'t> {
    fn peek(&self) -> Option<&'t Token> {
        self.toks.get(self.pos).filter(|t| t.kind != TokenKind::Eof)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn next(&mut self) -> Option<&'t Token> {
        let tok = self.peek()?;
        self.pos += 1;
        Some(tok)
    }

    fn error(&self, message: &str) -> ParseError {
        ParseError {
            message: message.to_string(),
            near: self
                .peek()
                .map_or_else(|| "end of formula".to_string(), |t| t.lexeme.clone()),
        }
    }

    fn expect(&mut self, kind: TokenKind, message: &str) -> Result<(), ParseError> {
        if self.peek_kind() == Some(kind) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(message))
        }
    }

    fn expression(&mut self, min_bp: u8) -> Result<Formula, ParseError> {
        let mut left = self.prefix()?;
        loop {
            if self.peek_kind() == Some(TokenKind::Percent) {
                self.pos += 1;
                left = Formula::Percent(Box::new(left));
                continue;
            }
            let Some(op) = self.peek_kind().and_then(FormulaOp::from_token) else {
                break;
            };
            let bp = op.binding_power();
            if bp < min_bp {
                break;
            }
            self.pos += 1;
            let right = self.expression(bp + 1)?;
            left = Formula::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn prefix(&mut self) -> Result<Formula, ParseError> {
        match self.peek_kind() {
            Some(TokenKind::Minus) => {
                self.pos += 1;
                let operand = self.expression(PREFIX_BP)?;
                Ok(Formula::Neg(Box::new(operand)))
            }
            Some(TokenKind::Plus) => {
                self.pos += 1;
                self.expression(PREFIX_BP)
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Formula, ParseError> {
        let tok = self.next().ok_or_else(|| self.error("expected a value"))?;
        match tok.kind {
            TokenKind::Integer => Ok(Formula::Number {
                text: tok.lexeme.clone(),
                int: tok.lexeme.parse().ok(),
            }),
            TokenKind::Float => Ok(Formula::Number {
                text: tok.lexeme.clone(),
                int: None,
            }),
            TokenKind::Str => Ok(Formula::Text(tok.string_value())),
            TokenKind::ErrorLiteral => Ok(Formula::Error(tok.lexeme.clone())),
            TokenKind::LParen => {
                let inner = self.expression(0)?;
                self.expect(TokenKind::RParen, "expected `)`")?;
                Ok(inner)
            }
            TokenKind::LBrace => self.array(),
            TokenKind::QuotedName => {
                self.expect(TokenKind::Bang, "expected `!` after the sheet name")?;
                self.reference(Some(tok.string_value()))
            }
            TokenKind::Identifier => self.identifier(tok),
            _ => {
                self.pos -= 1;
                Err(self.error("unexpected token"))
            }
        }
    }

    fn identifier(&mut self, tok: &'t Token) -> Result<Formula, ParseError> {
        match self.peek_kind() {
            Some(TokenKind::LParen) => {
                self.pos += 1;
                let upper = tok.lexeme.to_ascii_uppercase();
                let name = upper.strip_prefix("_XLFN.").unwrap_or(&upper).to_string();
                let args = self.arguments()?;
                Ok(Formula::Call { name, args })
            }
            Some(TokenKind::Bang) => {
                self.pos += 1;
                self.reference(Some(tok.lexeme.clone()))
            }
            _ if tok.lexeme.eq_ignore_ascii_case("true") => Ok(Formula::Bool(true)),
            _ if tok.lexeme.eq_ignore_ascii_case("false") => Ok(Formula::Bool(false)),
            _ => {
                self.pos -= 1;
                match self.reference(None) {
                    Ok(reference) => Ok(reference),
                    Err(_) => {
                        self.pos += 1;
                        Ok(Formula::Name(tok.lexeme.clone()))
                    }
                }
            }
        }
    }

    fn arguments(&mut self) -> Result<Vec<Option<Formula>>, ParseError> {
        let mut args = Vec::new();
        if self.peek_kind() == Some(TokenKind::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            match self.peek_kind() {
                Some(TokenKind::Comma | TokenKind::RParen) => args.push(None),
                _ => args.push(Some(self.expression(0)?)),
            }
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

    /// `{1,2;3,4}`: rows separated by `;`.
    fn array(&mut self) -> Result<Formula, ParseError> {
        let mut rows = vec![Vec::new()];
        loop {
            let value = self.expression(0)?;
            if let Some(row) = rows.last_mut() {
                row.push(value);
            }
            match self.next().map(|t| t.kind) {
                Some(TokenKind::Comma) => {}
                Some(TokenKind::Semicolon) => rows.push(Vec::new()),
                Some(TokenKind::RBrace) => return Ok(Formula::Array(rows)),
                _ => return Err(self.error("expected `,`, `;` or `}`")),
            }
        }
    }

    /// `B3`, `A1:C10` or `A:C` at the current position.
    fn reference(&mut self, sheet: Option<String>) -> Result<Formula, ParseError> {
        let start = self.pos;
        let first = match self.next() {
            Some(t) if t.kind == TokenKind::Identifier => split_cell(&t.lexeme),
            _ => None,
        };
        let Some((column, row)) = first else {
            self.pos = start;
            return Err(self.error("expected a cell reference"));
        };
        let second = if self.peek_kind() == Some(TokenKind::Colon) {
            self.pos += 1;
            match self.next() {
                Some(t) if t.kind == TokenKind::Identifier => split_cell(&t.lexeme),
                _ => None,
            }
            .map(Some)
            .ok_or_else(|| {
                self.pos = start;
                self.error("expected the end of the range")
            })?
        } else {
            None
        };
        let reference = match (row, second) {
            (Some(row), None) => Reference::Cell { column, row },
            (Some(r1), Some((c2, Some(r2)))) => {
                let (c_lo, c_hi) = if column_order(&column) <= column_order(&c2) {
                    (column, c2)
                } else {
                    (c2, column)
                };
                Reference::Range {
                    first: (c_lo, r1.min(r2)),
                    last: (c_hi, r1.max(r2)),
                }
            }
            (None, Some((c2, None))) => {
                let (first, last) = if column_order(&column) <= column_order(&c2) {
                    (column, c2)
                } else {
                    (c2, column)
                };
                Reference::Columns { first, last }
            }
            _ => {
                self.pos = start;
                return Err(self.error("expected a cell reference"));
            }
        };
        Ok(Formula::Ref { sheet, reference })
    }
}

/// Parses formula text, with or without the leading `=`.
pub fn parse_formula(text: &str) -> Result<Formula, ParseError> {
    let body = text.trim();
    let body = body.strip_prefix('=').unwrap_or(body);
    let toks = tokenize(body, LexMode::Formula).map_err(|err| ParseError {
        message: err.to_string(),
        near: String::new(),
    })?;
    let mut parser = Parser { toks: &toks, pos: 0 };
    if parser.peek().is_none() {
        return Err(parser.error("empty formula"));
    }
    let formula = parser.expression(0)?;
    if parser.peek().is_some() {
        return Err(parser.error("unexpected token after the formula"));
    }
    Ok(formula)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
enum Unmapped {
    #[error("{0} is not mapped")]
    Function(String),
    #[error("{0} is not mapped")]
    Name(String),
    #[error("{name} does not accept {argc} argument(s)")]
    Arity { name: String, argc: usize },
}

struct FormulaEmitter<'a> {
    tables: &'a MappingTables,
    imports: Vec<&'static str>,
    helpers: Vec<&'static str>,
    notes: Vec<TranslationNote>,
}

impl FormulaEmitter<'_> {
    fn frame(sheet: Option<&str>) -> String {
        match sheet {
            Some(name) => format!("sheets[{}]", string_literal(name)),
            None => "df".to_string(),
        }
    }

    fn reference(sheet: Option<&str>, reference: &Reference) -> Py {
        let frame = Self::frame(sheet);
        let code = match reference {
            Reference::Cell { column, row } => format!("{frame}.at[{}, \"{column}\"]", row - 1),
            Reference::Range { first, last } if first.0 == last.0 => {
                format!("{frame}[\"{}\"].iloc[{}:{}]", first.0, first.1 - 1, last.1)
            }
            Reference::Range { first, last } => {
                format!("{frame}.loc[{}:{}, \"{}\":\"{}\"]", first.1 - 1, last.1 - 1, first.0, last.0)
            }
            Reference::Columns { first, last } if first == last => format!("{frame}[\"{first}\"]"),
            Reference::Columns { first, last } => format!("{frame}.loc[:, \"{first}\":\"{last}\"]"),
        };
        Py::new(code, prec::PRIMARY)
    }

    fn emit(&mut self, formula: &Formula) -> Result<Py, Unmapped> {
        Ok(match formula {
            Formula::Number { text, int: Some(v) } if text.chars().all(|c| c.is_ascii_digit()) => Py::int(*v),
            Formula::Number { text, .. } => Py::atom(text.clone()),
            Formula::Text(s) => Py::string(string_literal(s)),
            Formula::Bool(b) => Py::atom(if *b { "True" } else { "False" }),
            Formula::Error(_) => {
                self.imports.extend(NUMPY.iter().copied());
                Py::new("np.nan", prec::PRIMARY)
            }
            Formula::Ref { sheet, reference } => Self::reference(sheet.as_deref(), reference),
            Formula::Name(name) => return Err(Unmapped::Name(name.clone())),
            Formula::Array(rows) => {
                let mut out = Vec::with_capacity(rows.len());
                for row in rows {
                    let mut items = Vec::with_capacity(row.len());
                    for item in row {
                        items.push(self.emit(item)?.code);
                    }
                    out.push(format!("[{}]", items.join(", ")));
                }
                match out.as_slice() {
                    [single] => Py::atom(single.clone()),
                    _ => Py::atom(format!("[{}]", out.join(", "))),
                }
            }
            Formula::Call { name, args } => self.call(name, args)?,
            Formula::Neg(inner) => {
                let value = self.emit(inner)?;
                match value.int_value {
                    Some(v) => Py::int(-v),
                    None => Py::new(format!("-{}", value.wrapped(prec::UNARY)), prec::UNARY),
                }
            }
            Formula::Percent(inner) => {
                let value = self.emit(inner)?;
                Py::new(format!("{} / 100", value.wrapped(prec::MUL)), prec::MUL)
            }
            Formula::Binary { op, left, right } => {
                let l = self.emit(left)?;
                let r = self.emit(right)?;
                let infix = |sym: &str, p: u8, l: &Py, r: &Py| {
                    Py::new(format!("{} {sym} {}", l.wrapped(p), r.wrapped(p + 1)), p)
                };
                let compare = |sym: &str, l: &Py, r: &Py| {
                    Py::new(
                        format!("{} {sym} {}", l.wrapped(prec::CMP + 1), r.wrapped(prec::CMP + 1)),
                        prec::CMP,
                    )
                };
                match op {
                    FormulaOp::Eq => compare("==", &l, &r),
                    FormulaOp::Ne => compare("!=", &l, &r),
                    FormulaOp::Lt => compare("<", &l, &r),
                    FormulaOp::Gt => compare(">", &l, &r),
                    FormulaOp::Le => compare("<=", &l, &r),
                    FormulaOp::Ge => compare(">=", &l, &r),
                    FormulaOp::Concat => infix("+", prec::ADD, &l.into_str(), &r.into_str()).with_str(true),
                    FormulaOp::Add => infix("+", prec::ADD, &l, &r),
                    FormulaOp::Sub => infix("-", prec::ADD, &l, &r),
                    FormulaOp::Mul => infix("*", prec::MUL, &l, &r),
                    FormulaOp::Div => infix("/", prec::MUL, &l, &r),
                    FormulaOp::Pow => Py::new(
                        format!("{} ** {}", l.wrapped(prec::POW + 1), r.wrapped(prec::UNARY)),
                        prec::POW,
                    ),
                }
            }
        })
    }

    fn call(&mut self, name: &str, args: &[Option<Formula>]) -> Result<Py, Unmapped> {
        let tables = self.tables;
        let function = tables
            .formula_function(name)
            .ok_or_else(|| Unmapped::Function(name.to_string()))?;
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(match arg {
                Some(a) => Some(self.emit(a)?),
                None => None,
            });
        }
        let form = function.form(values.len()).ok_or_else(|| Unmapped::Arity {
            name: name.to_string(),
            argc: values.len(),
        })?;
        let rendered = form.render(None, &values);
        if rendered.adjusted {
            self.notes.push(TranslationNote::info(
                NoteCode::IndexAdjustment,
                format!("`{name}` position is converted from 1-based at runtime"),
            ));
        }
        self.imports.extend(function.imports.iter().copied());
        self.helpers.extend(function.helpers.iter().copied());
        Ok(Py::new(rendered.code, function.prec).with_str(function.returns_str))
    }
}

/// Converts one formula. `name` labels the result (`Sheet1!B2`, or `formula`).
pub fn convert_formula_named(
    name: &str,
    text: &str,
    tables: &MappingTables,
    options: &ConvertOptions,
) -> ConversionResult {
    let body = text.trim();
    let body = body.strip_prefix('=').unwrap_or(body);
    let formula = match parse_formula(body) {
        Ok(formula) => formula,
        Err(err) => {
            log::debug!("formula `{body}` does not parse: {err}");
            return ConversionResult::failed(
                name,
                None,
                TranslationNote::warning(
                    NoteCode::UnknownConstruct,
                    format!("formula does not parse: {err}: `={body}`"),
                ),
            );
        }
    };

    let mut emitter = FormulaEmitter {
        tables,
        imports: Vec::new(),
        helpers: Vec::new(),
        notes: Vec::new(),
    };
    let comment = format!("# ={body}");
    let (statement, imports, helpers) = match emitter.emit(&formula) {
        Ok(value) => (format!("result = {}", value.code), emitter.imports, emitter.helpers),
        Err(err) => {
            emitter.notes = vec![TranslationNote::warning(
                NoteCode::UnknownConstruct,
                format!("{err}: `={body}`"),
            )];
            (format!("result = None  # placeholder: {err}"), Vec::new(), Vec::new())
        }
    };

    let mut import_set = ImportSet::default();
    import_set.extend(imports.iter().copied());
    let mut helper_names = BTreeSet::new();
    if options.emit_helpers {
        let mut pending = helpers;
        while let Some(name) = pending.pop() {
            if let Some(h) = helper(name) {
                if helper_names.insert(h.name) {
                    import_set.extend(h.imports.iter().copied());
                    pending.extend(h.requires.iter().copied());
                }
            }
        }
    }

    let mut lines = Vec::new();
    if !import_set.is_empty() {
        lines.extend(import_set.lines());
        lines.push(String::new());
    }
    for name in &helper_names {
        if let Some(h) = helper(name) {
            lines.extend(h.source.lines().map(str::to_string));
            lines.extend([String::new(), String::new()]);
        }
    }
    lines.push(comment);
    lines.push(statement);
    let mut code = lines.join("\n");
    code.push('\n');

    ConversionResult {
        module_name: name.to_string(),
        kind: None,
        generated_code: code,
        notes: emitter.notes,
        success: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn result_line(text: &str) -> String {
        let result = convert_formula_named("formula", text, MappingTables::standard(), &ConvertOptions::default());
        assert!(result.success, "{text}: {:?}", result.notes);
        result
            .generated_code
            .lines()
            .find(|l| l.starts_with("result = "))
            .unwrap_or_default()
            .to_string()
    }

    #[test]
    fn splits_cell_references() {
        assert_eq!(split_cell("$B$12"), Some(("B".to_string(), Some(12))));
        assert_eq!(split_cell("aa"), Some(("AA".to_string(), None)));
        assert_eq!(split_cell("A0"), None);
        assert_eq!(split_cell("ABCD1"), None);
        assert_eq!(split_cell("Rate"), None);
    }

    #[test]
    fn translates_references() {
        assert_eq!(result_line("=B3"), "result = df.at[2, \"B\"]");
        assert_eq!(result_line("=A1:A10"), "result = df[\"A\"].iloc[0:10]");
        assert_eq!(result_line("=C10:A1"), "result = df.loc[0:9, \"A\":\"C\"]");
        assert_eq!(result_line("=A:A"), "result = df[\"A\"]");
        assert_eq!(result_line("='Rates 2024'!$B$2"), "result = sheets[\"Rates 2024\"].at[1, \"B\"]");
    }

    #[test]
    fn respects_spreadsheet_precedence() {
        assert_eq!(result_line("=-2^2"), "result = (-2) ** 2");
        assert_eq!(result_line("=(A1+B1)*2"), "result = (df.at[0, \"A\"] + df.at[0, \"B\"]) * 2");
        assert_eq!(result_line("=A1&\"x\""), "result = str(df.at[0, \"A\"]) + \"x\"");
        assert_eq!(result_line("=50%"), "result = 50 / 100");
        assert_eq!(result_line("=A1<>1"), "result = df.at[0, \"A\"] != 1");
    }

    #[test]
    fn parse_failures_are_reported() {
        let result = convert_formula_named("formula", "=SUM(A1", MappingTables::standard(), &ConvertOptions::default());
        assert!(!result.success);
        assert_eq!(result.notes.len(), 1);
        assert!(parse_formula("").is_err());
        assert!(parse_formula("=1 2").is_err());
    }
}
