//! Declaration parsing and the module-wide symbol pass that runs before emission.

use std::collections::BTreeMap;

use vba2py_syntax::{BlockKind, BlockTree, Node, Statement, Token, TokenKind};

use crate::expr::{split_top_level, ParseError};
use crate::naming::snake_case;
use crate::tables::{MappingTables, Receiver};

/// `As [New] T`, with a possibly qualified type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TypeRef {
    pub name: String,
    pub is_new: bool,
}

impl TypeRef {
    /// Last segment of a qualified name (`Scripting.Dictionary` -> `Dictionary`).
    pub fn short_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }
}

/// One dimension of an array declaration: `(upper)` or `(lower To upper)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DimBound {
    pub lower: Option<Vec<Token>>,
    pub upper: Vec<Token>,
}

/// One variable in a `Dim`, `Private`, `ReDim` or `Type` member list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Declarator {
    pub name: String,
    pub suffix: Option<char>,
    /// `None` for scalars, `Some(vec![])` for a dynamic array `a()`.
    pub dims: Option<Vec<DimBound>>,
    pub type_ref: Option<TypeRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ConstDecl {
    pub name: String,
    pub suffix: Option<char>,
    pub type_ref: Option<TypeRef>,
    pub value: Vec<Token>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcKind {
    Sub,
    Function,
    PropertyGet,
    PropertyLet,
    PropertySet,
}

impl ProcKind {
    pub fn is_property(self) -> bool {
        matches!(self, ProcKind::PropertyGet | ProcKind::PropertyLet | ProcKind::PropertySet)
    }

    pub fn returns_value(self) -> bool {
        matches!(self, ProcKind::Function | ProcKind::PropertyGet)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Param {
    pub name: String,
    pub suffix: Option<char>,
    pub optional: bool,
    pub by_ref: bool,
    pub param_array: bool,
    pub is_array: bool,
    pub type_ref: Option<TypeRef>,
    pub default: Option<Vec<Token>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ProcHeader {
    pub kind: ProcKind,
    pub name: String,
    pub is_static: bool,
    pub params: Vec<Param>,
    pub return_type: Option<TypeRef>,
    pub returns_array: bool,
    pub suffix: Option<char>,
}

fn error(message: impl Into<String>, near: Option<&Token>) -> ParseError {
    ParseError {
        message: message.into(),
        near: near.map_or_else(|| "end of statement".to_string(), |t| t.lexeme.clone()),
    }
}

fn type_suffix(tok: &Token) -> Option<char> {
    tok.lexeme
        .chars()
        .last()
        .filter(|c| matches!(c, '$' | '%' | '&' | '!' | '#' | '@'))
}

/// The VBA type a declaration suffix stands for.
pub(crate) fn suffix_type(suffix: char) -> &'static str {
    match suffix {
        '$' => "String",
        '%' => "Integer",
        '&' => "Long",
        '!' => "Single",
        '#' => "Double",
        _ => "Currency",
    }
}

/// `As [New] T [* n]` starting at `toks[0]`; returns the type and the tokens consumed.
fn parse_as_clause(toks: &[Token]) -> Result<(Option<TypeRef>, usize), ParseError> {
    match toks.first() {
        Some(t) if t.is_kw("as") => {}
        _ => return Ok((None, 0)),
    }
    let mut i = 1;
    let is_new = toks.get(i).is_some_and(|t| t.is_kw("new"));
    if is_new {
        i += 1;
    }
    let mut name = match toks.get(i) {
        Some(t) if t.is_name_like() => t.name().to_string(),
        other => return Err(error("expected a type name", other)),
    };
    i += 1;
    while toks.get(i).is_some_and(|t| t.kind == TokenKind::Dot) {
        match toks.get(i + 1) {
            Some(t) if t.is_name_like() => name = format!("{name}.{}", t.name()),
            other => return Err(error("expected a type name", other)),
        }
        i += 2;
    }
    // Fixed-length strings: `String * 20`.
    if toks.get(i).is_some_and(|t| t.kind == TokenKind::Star) {
        i += 2;
    }
    Ok((Some(TypeRef { name, is_new }), i))
}

fn matching_paren(toks: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, tok) in toks.iter().enumerate().skip(open) {
        match tok.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_dims(toks: &[Token]) -> Result<Vec<DimBound>, ParseError> {
    if toks.is_empty() {
        return Ok(Vec::new());
    }
    split_top_level(toks, |t| t.kind == TokenKind::Comma)
        .into_iter()
        .map(|dim| {
            let parts = split_top_level(dim, |t| t.is_kw("to"));
            match parts.as_slice() {
                [upper] if !upper.is_empty() => Ok(DimBound {
                    lower: None,
                    upper: upper.to_vec(),
                }),
                [lower, upper] if !lower.is_empty() && !upper.is_empty() => Ok(DimBound {
                    lower: Some(lower.to_vec()),
                    upper: upper.to_vec(),
                }),
                _ => Err(error("malformed array bounds", dim.first())),
            }
        })
        .collect()
}

/// Parses `a As Long, b(1 To 5) As String, c As New Collection`.
pub(crate) fn parse_declarators(toks: &[Token]) -> Result<Vec<Declarator>, ParseError> {
    if toks.is_empty() {
        return Err(error("expected a variable name", None));
    }
    let mut out = Vec::new();
    for part in split_top_level(toks, |t| t.kind == TokenKind::Comma) {
        let mut i = 0;
        if part.first().is_some_and(|t| t.is_kw("withevents")) {
            i += 1;
        }
        let name_tok = match part.get(i) {
            Some(t) if t.kind == TokenKind::Identifier => t,
            other => return Err(error("expected a variable name", other)),
        };
        i += 1;
        let dims = if part.get(i).is_some_and(|t| t.kind == TokenKind::LParen) {
            let close = matching_paren(part, i).ok_or_else(|| error("expected `)`", part.get(i)))?;
            let dims = parse_dims(&part[i + 1..close])?;
            i = close + 1;
            Some(dims)
        } else {
            None
        };
        let (type_ref, used) = parse_as_clause(&part[i..])?;
        i += used;
        if i < part.len() {
            return Err(error("unexpected token in declaration", part.get(i)));
        }
        out.push(Declarator {
            name: name_tok.name().to_string(),
            suffix: type_suffix(name_tok),
            dims,
            type_ref,
        });
    }
    Ok(out)
}

/// Parses `A As Double = 0.05, B = 2` (the tokens after `Const`).
pub(crate) fn parse_consts(toks: &[Token]) -> Result<Vec<ConstDecl>, ParseError> {
    let mut out = Vec::new();
    for part in split_top_level(toks, |t| t.kind == TokenKind::Comma) {
        let name_tok = match part.first() {
            Some(t) if t.kind == TokenKind::Identifier => t,
            other => return Err(error("expected a constant name", other)),
        };
        let (type_ref, used) = parse_as_clause(&part[1..])?;
        let eq = 1 + used;
        match part.get(eq) {
            Some(t) if t.kind == TokenKind::Eq && eq + 1 < part.len() => {}
            other => return Err(error("expected `=` and a value", other)),
        }
        out.push(ConstDecl {
            name: name_tok.name().to_string(),
            suffix: type_suffix(name_tok),
            type_ref,
            value: part[eq + 1..].to_vec(),
        });
    }
    Ok(out)
}

fn parse_param(toks: &[Token]) -> Result<Param, ParseError> {
    let mut i = 0;
    let mut optional = false;
    let mut by_ref = false;
    let mut param_array = false;
    while let Some(tok) = toks.get(i) {
        if tok.is_kw("optional") {
            optional = true;
        } else if tok.is_kw("byref") {
            by_ref = true;
        } else if tok.is_kw("byval") {
        } else if tok.is_kw("paramarray") {
            param_array = true;
        } else {
            break;
        }
        i += 1;
    }
    let name_tok = match toks.get(i) {
        Some(t) if t.kind == TokenKind::Identifier => t,
        other => return Err(error("expected a parameter name", other)),
    };
    i += 1;
    let is_array = matches!(
        (toks.get(i), toks.get(i + 1)),
        (Some(l), Some(r)) if l.kind == TokenKind::LParen && r.kind == TokenKind::RParen
    );
    if is_array {
        i += 2;
    }
    let (type_ref, used) = parse_as_clause(&toks[i..])?;
    i += used;
    let default = match toks.get(i) {
        None => None,
        Some(t) if t.kind == TokenKind::Eq && i + 1 < toks.len() => Some(toks[i + 1..].to_vec()),
        other => return Err(error("unexpected token in parameter", other)),
    };
    Ok(Param {
        name: name_tok.name().to_string(),
        suffix: type_suffix(name_tok),
        optional,
        by_ref,
        param_array,
        is_array,
        type_ref,
        default,
    })
}

/// Parses a `Sub`, `Function` or `Property Get/Let/Set` opening statement.
pub(crate) fn parse_proc_header(stmt: &Statement) -> Result<ProcHeader, ParseError> {
    let toks = &stmt.tokens;
    let start = stmt.skip_modifiers(&["public", "private", "friend", "static", "global"]);
    let is_static = toks[..start].iter().any(|t| t.is_kw("static"));
    let (kind, name_idx) = match toks.get(start) {
        Some(t) if t.is_kw("sub") => (ProcKind::Sub, start + 1),
        Some(t) if t.is_kw("function") => (ProcKind::Function, start + 1),
        Some(t) if t.is_kw("property") => {
            let kind = match toks.get(start + 1) {
                Some(a) if a.is_word("get") => ProcKind::PropertyGet,
                Some(a) if a.is_kw("let") => ProcKind::PropertyLet,
                Some(a) if a.is_kw("set") => ProcKind::PropertySet,
                other => return Err(error("expected `Get`, `Let` or `Set`", other)),
            };
            (kind, start + 2)
        }
        other => return Err(error("expected `Sub`, `Function` or `Property`", other)),
    };
    let name_tok = match toks.get(name_idx) {
        Some(t) if t.is_name_like() => t,
        other => return Err(error("expected a procedure name", other)),
    };

    let mut i = name_idx + 1;
    let mut params = Vec::new();
    if toks.get(i).is_some_and(|t| t.kind == TokenKind::LParen) {
        let close = matching_paren(toks, i).ok_or_else(|| error("expected `)`", toks.get(i)))?;
        let inner = &toks[i + 1..close];
        if !inner.is_empty() {
            for part in split_top_level(inner, |t| t.kind == TokenKind::Comma) {
                params.push(parse_param(part)?);
            }
        }
        i = close + 1;
    }
    let (return_type, used) = parse_as_clause(&toks[i..])?;
    i += used;
    let returns_array = matches!(
        (toks.get(i), toks.get(i + 1)),
        (Some(l), Some(r)) if l.kind == TokenKind::LParen && r.kind == TokenKind::RParen
    );
    if returns_array {
        i += 2;
    }
    if i < toks.len() {
        return Err(error("unexpected token after the procedure header", toks.get(i)));
    }
    Ok(ProcHeader {
        kind,
        name: name_tok.name().to_string(),
        is_static,
        params,
        return_type,
        returns_array,
        suffix: type_suffix(name_tok),
    })
}

/// Declaration keyword forms: `Dim`, `Private x`, `Public Const`, `Static x`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeclForm {
    Variables { is_static: bool },
    Constants,
}

/// Classifies a declaration statement and returns the index of its first name token.
pub(crate) fn declaration_form(stmt: &Statement) -> Option<(DeclForm, usize)> {
    let toks = &stmt.tokens;
    let first = toks.first()?;
    let is_static = first.is_kw("static");
    let modifiers = stmt.skip_modifiers(&["public", "private", "friend", "static", "global", "dim"]);
    if modifiers == 0 {
        return toks.first().filter(|t| t.is_kw("const")).map(|_| (DeclForm::Constants, 1));
    }
    match toks.get(modifiers) {
        Some(t) if t.is_kw("const") => Some((DeclForm::Constants, modifiers + 1)),
        Some(t) if t.kind == TokenKind::Identifier || t.is_kw("withevents") => {
            Some((DeclForm::Variables { is_static }, modifiers))
        }
        _ => None,
    }
}

/// What the emitter knows about a variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct VarInfo {
    /// Python spelling: snake_case for locals and module variables, the VBA spelling for
    /// class fields (rendered as `self.<py>`).
    pub py: String,
    pub is_str: bool,
    /// Lower bound of every dimension, for arrays.
    pub bases: Option<Vec<i64>>,
    pub receiver: Option<Receiver>,
    pub field: bool,
    pub is_const: bool,
}

impl VarInfo {
    pub fn scalar(py: impl Into<String>) -> Self {
        Self {
            py: py.into(),
            is_str: false,
            bases: None,
            receiver: None,
            field: false,
            is_const: false,
        }
    }
}

/// Lower bounds of a declarator's dimensions; non-literal bounds fall back to `option_base`.
pub(crate) fn dimension_bases(dims: &[DimBound], option_base: i64) -> Vec<i64> {
    dims.iter()
        .map(|d| match &d.lower {
            None => option_base,
            Some(lower) => literal_int(lower).unwrap_or(option_base),
        })
        .collect()
}

/// An integer literal, possibly negated.
pub(crate) fn literal_int(toks: &[Token]) -> Option<i64> {
    match toks {
        [t] if t.kind == TokenKind::Integer => t.name().parse().ok(),
        [minus, t] if minus.kind == TokenKind::Minus && t.kind == TokenKind::Integer => {
            t.name().parse::<i64>().ok().map(|v| -v)
        }
        _ => None,
    }
}

pub(crate) fn receiver_for(type_ref: Option<&TypeRef>) -> Option<Receiver> {
    let name = type_ref?.name.to_ascii_lowercase();
    match name.as_str() {
        "collection" | "vba.collection" => Some(Receiver::Collection),
        "dictionary" | "scripting.dictionary" => Some(Receiver::Dictionary),
        _ => None,
    }
}

pub(crate) fn declared_is_str(tables: &MappingTables, type_ref: Option<&TypeRef>, suffix: Option<char>) -> bool {
    let name = match (type_ref, suffix) {
        (Some(t), _) => t.name.as_str(),
        (None, Some(s)) => suffix_type(s),
        (None, None) => return false,
    };
    tables.type_mapping(name).is_some_and(|m| m.is_str)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ProcInfo {
    pub name: String,
    pub kind: ProcKind,
    /// Lower-cased VBA parameter names, in order.
    pub params: Vec<String>,
    pub returns_str: bool,
}

/// Module-wide names collected before any code is emitted.
#[derive(Debug, Clone, Default)]
pub(crate) struct Symbols {
    pub option_base: i64,
    /// Keyed by lower-cased name. For properties the first accessor wins.
    pub procedures: BTreeMap<String, ProcInfo>,
    pub module_vars: BTreeMap<String, VarInfo>,
    /// Lower-cased enum name to its spelling.
    pub enums: BTreeMap<String, String>,
    /// Lower-cased member name to `(enum, member)` spellings.
    pub enum_members: BTreeMap<String, (String, String)>,
    pub user_types: BTreeMap<String, String>,
}

impl Symbols {
    pub fn collect(tree: &BlockTree, tables: &MappingTables, class_fields: bool) -> Symbols {
        let mut symbols = Symbols::default();
        for &id in tree.root() {
            match tree.node(id) {
                Node::Statement(stmt) => symbols.statement(stmt, tables, class_fields),
                Node::Block(block) => match block.kind {
                    BlockKind::Procedure => {
                        if let Ok(header) = parse_proc_header(block.header()) {
                            let returns_str = header.kind.returns_value()
                                && declared_is_str(tables, header.return_type.as_ref(), header.suffix);
                            symbols
                                .procedures
                                .entry(header.name.to_ascii_lowercase())
                                .or_insert(ProcInfo {
                                    params: header.params.iter().map(|p| p.name.to_ascii_lowercase()).collect(),
                                    name: header.name,
                                    kind: header.kind,
                                    returns_str,
                                });
                        }
                    }
                    BlockKind::Enum => symbols.enum_block(tree, block),
                    BlockKind::Type => {
                        if let Some(name) = block_name(block.header(), "type") {
                            symbols.user_types.insert(name.to_ascii_lowercase(), name);
                        }
                    }
                    _ => {}
                },
            }
        }
        log::debug!(
            "collected {} procedures and {} module variables",
            symbols.procedures.len(),
            symbols.module_vars.len()
        );
        symbols
    }

    fn statement(&mut self, stmt: &Statement, tables: &MappingTables, class_fields: bool) {
        let toks = &stmt.tokens;
        if let [option, base, value] = toks.as_slice() {
            if option.is_kw("option") && base.is_kw("base") {
                self.option_base = value.name().parse().unwrap_or(0);
                return;
            }
        }
        let Some((form, start)) = declaration_form(stmt) else {
            return;
        };
        match form {
            DeclForm::Constants => {
                for c in parse_consts(&toks[start..]).unwrap_or_default() {
                    let info = VarInfo {
                        is_str: declared_is_str(tables, c.type_ref.as_ref(), c.suffix)
                            || matches!(c.value.as_slice(), [t] if t.kind == TokenKind::Str),
                        is_const: true,
                        ..VarInfo::scalar(snake_case(&c.name))
                    };
                    self.module_vars.insert(c.name.to_ascii_lowercase(), info);
                }
            }
            DeclForm::Variables { .. } => {
                for d in parse_declarators(&toks[start..]).unwrap_or_default() {
                    let py = if class_fields {
                        crate::naming::escape_reserved(d.name.clone())
                    } else {
                        snake_case(&d.name)
                    };
                    let info = self.var_info(tables, &d, py, class_fields);
                    self.module_vars.insert(d.name.to_ascii_lowercase(), info);
                }
            }
        }
    }

    pub fn var_info(&self, tables: &MappingTables, d: &Declarator, py: String, field: bool) -> VarInfo {
        VarInfo {
            py,
            is_str: d.dims.is_none() && declared_is_str(tables, d.type_ref.as_ref(), d.suffix),
            bases: d.dims.as_ref().map(|dims| dimension_bases(dims, self.option_base)),
            receiver: if d.dims.is_none() {
                receiver_for(d.type_ref.as_ref())
            } else {
                None
            },
            field,
            is_const: false,
        }
    }

    fn enum_block(&mut self, tree: &BlockTree, block: &vba2py_syntax::Block) {
        let Some(name) = block_name(block.header(), "enum") else {
            return;
        };
        self.enums.insert(name.to_ascii_lowercase(), name.clone());
        for &id in &block.arms[0].body {
            if let Node::Statement(stmt) = tree.node(id) {
                if let Some(member) = stmt.first().filter(|t| t.kind == TokenKind::Identifier) {
                    self.enum_members
                        .insert(member.name().to_ascii_lowercase(), (name.clone(), member.name().to_string()));
                }
            }
        }
    }
}

/// Name following `Enum`/`Type` (after visibility modifiers).
pub(crate) fn block_name(header: &Statement, keyword: &str) -> Option<String> {
    let idx = header.skip_modifiers(&["public", "private"]);
    match (header.tokens.get(idx), header.tokens.get(idx + 1)) {
        (Some(kw), Some(name)) if kw.is_kw(keyword) && name.kind == TokenKind::Identifier => {
            Some(name.name().to_string())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use vba2py_syntax::{parse_module, tokenize, LexMode};

    fn toks(src: &str) -> Vec<Token> {
        let mut t = tokenize(src, LexMode::Macro).unwrap();
        t.retain(|t| !matches!(t.kind, TokenKind::Eof | TokenKind::Newline));
        t
    }

    #[test]
    fn parses_declarator_lists() {
        let decls = parse_declarators(&toks("a As Long, b$(1 To 5, 3), c As New Collection")).unwrap();
        assert_eq!(decls.len(), 3);
        assert_eq!(decls[0].type_ref.as_ref().map(|t| t.name.as_str()), Some("Long"));
        assert_eq!(decls[1].suffix, Some('$'));
        let dims = decls[1].dims.as_ref().unwrap();
        assert_eq!(dims.len(), 2);
        assert!(dims[0].lower.is_some());
        assert!(dims[1].lower.is_none());
        assert!(decls[2].type_ref.as_ref().unwrap().is_new);
        assert!(parse_declarators(&toks("a As")).is_err());
    }

    #[test]
    fn parses_procedure_headers() {
        let src = "Public Function Premium(ByVal age As Integer, Optional ByRef rate As Double = 0.05, ParamArray rest()) As Double";
        let tree = parse_module(&format!("{src}\nEnd Function\n")).unwrap();
        let block = tree.top_level_blocks(BlockKind::Procedure).next().unwrap();
        let header = parse_proc_header(block.header()).unwrap();
        assert_eq!(header.kind, ProcKind::Function);
        assert_eq!(header.name, "Premium");
        let names: Vec<_> = header.params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["age", "rate", "rest"]);
        assert!(!header.params[0].by_ref);
        assert!(header.params[1].optional && header.params[1].by_ref);
        assert!(header.params[1].default.is_some());
        assert!(header.params[2].param_array && header.params[2].is_array);
        assert_eq!(header.return_type.unwrap().name, "Double");
    }

    #[test]
    fn collects_module_symbols() {
        let src = "Option Base 1\nPrivate rates(10) As Double\nConst LIMIT = 5\nEnum Tier\n  Low\n  High = 5\nEnd Enum\nSub Run()\nEnd Sub\nProperty Get Total() As String\nEnd Property\n";
        let tree = parse_module(src).unwrap();
        let symbols = Symbols::collect(&tree, MappingTables::standard(), false);
        assert_eq!(symbols.option_base, 1);
        assert_eq!(symbols.module_vars["rates"].bases, Some(vec![1]));
        assert!(symbols.module_vars["limit"].is_const);
        assert_eq!(symbols.enum_members["high"], ("Tier".to_string(), "High".to_string()));
        assert_eq!(symbols.procedures["run"].kind, ProcKind::Sub);
        assert!(symbols.procedures["total"].returns_str);
    }
}
