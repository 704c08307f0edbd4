use vba2py_model::NoteCode;
use vba2py_syntax::{Block, Node, Statement, TokenKind};

use super::stmt::array_initializer;
use super::symbols::{
    block_name, declaration_form, declared_is_str, parse_consts, parse_declarators, suffix_type, DeclForm,
    Declarator, TypeRef,
};
use super::{Emitter, Tr, Untranslatable, VarInfo};
use crate::expr::parse_expression;
use crate::naming::{escape_reserved, snake_case};
use crate::py::Py;

/// Annotation and initial value of a declared variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Typed {
    pub annotation: String,
    pub default: String,
}

impl Typed {
    fn new(annotation: impl Into<String>, default: impl Into<String>) -> Self {
        Self {
            annotation: annotation.into(),
            default: default.into(),
        }
    }

    /// Defaults that would be shared between instances if used directly.
    pub fn is_mutable(&self) -> bool {
        self.default.starts_with('[') || self.default.starts_with('{') || self.default.ends_with(')')
    }

    /// Annotation that also admits `None`.
    pub fn optional_annotation(&self) -> String {
        if self.annotation == "Any" || self.annotation.ends_with("| None") {
            self.annotation.clone()
        } else {
            format!("{} | None", self.annotation)
        }
    }
}

impl Emitter<'_> {
    /// A top-level statement outside any procedure.
    pub(super) fn module_statement(&mut self, stmt: &Statement) {
        self.statement(stmt);
    }

    /// Python type for `As T`, a type suffix, or neither (Variant).
    pub(super) fn scalar_type(&mut self, type_ref: Option<&TypeRef>, suffix: Option<char>) -> Typed {
        let name = match (type_ref, suffix) {
            (Some(t), _) => t.name.clone(),
            (None, Some(s)) => suffix_type(s).to_string(),
            (None, None) => "Variant".to_string(),
        };
        let tables = self.tables;
        if let Some(mapping) = tables.type_mapping(&name) {
            self.use_imports(mapping.imports);
            return Typed::new(mapping.python, mapping.default);
        }
        let lower = name.to_ascii_lowercase();
        if let Some(user) = self.symbols.user_types.get(&lower) {
            return Typed::new(user.clone(), format!("{user}()"));
        }
        let short = type_ref.map_or(name.as_str(), TypeRef::short_name).to_string();
        if type_ref.is_some_and(|t| t.is_new) {
            Typed::new(short.clone(), format!("{short}()"))
        } else {
            Typed::new(format!("{short} | None"), "None")
        }
    }

    pub(super) fn element_default(&mut self, type_ref: Option<&TypeRef>, suffix: Option<char>) -> String {
        self.scalar_type(type_ref, suffix).default
    }

    /// Type of a declarator, including array dimensions.
    pub(super) fn declared_type(&mut self, d: &Declarator) -> Tr<Typed> {
        let element = self.scalar_type(d.type_ref.as_ref(), d.suffix);
        let Some(dims) = &d.dims else {
            return Ok(element);
        };
        if dims.is_empty() {
            return Ok(Typed::new(format!("list[{}]", element.annotation), "[]"));
        }
        let (sizes, _) = self.dimension_sizes(dims)?;
        let mut annotation = element.annotation.clone();
        for _ in &sizes {
            annotation = format!("list[{annotation}]");
        }
        Ok(Typed::new(annotation, array_initializer(&element.default, &sizes)))
    }

    /// `Dim`, `Static`, `Private`/`Public` variables and `Const` inside or outside a procedure.
    pub(super) fn declaration(&mut self, stmt: &Statement) -> Tr<()> {
        let Some((form, start)) = declaration_form(stmt) else {
            let after = stmt.tokens.get(stmt.skip_modifiers(&["public", "private", "friend", "global"]));
            return Err(match after {
                Some(t) if t.is_kw("declare") => {
                    Untranslatable::Unsupported("external library declarations".to_string())
                }
                Some(t) if t.is_kw("event") => {
                    Untranslatable::Unsupported("`Event` has no Python counterpart".to_string())
                }
                _ => Untranslatable::Form("unrecognized declaration".to_string()),
            });
        };
        match form {
            DeclForm::Constants => self.constants(&stmt.tokens[start..]),
            DeclForm::Variables { is_static } => {
                let decls = parse_declarators(&stmt.tokens[start..])?;
                if is_static && self.scope.is_some() {
                    let names: Vec<&str> = decls.iter().map(|d| d.name.as_str()).collect();
                    self.warn(
                        NoteCode::StaticLocal,
                        format!("`{}` keeps its value between calls in VBA but not here", names.join("`, `")),
                    );
                }
                let mut lines = Vec::with_capacity(decls.len());
                let mut locals = Vec::new();
                for d in &decls {
                    let typed = self.declared_type(d)?;
                    let lower = d.name.to_ascii_lowercase();
                    let py = match (&self.scope, self.symbols.module_vars.get(&lower)) {
                        (None, Some(var)) => var.py.clone(),
                        _ => snake_case(&d.name),
                    };
                    lines.push(format!("{py}: {} = {}", typed.annotation, typed.default));
                    if self.scope.is_some() {
                        let info = self.symbols.var_info(self.tables, d, py, false);
                        locals.push((lower, info));
                    }
                }
                if let Some(scope) = self.scope.as_mut() {
                    scope.locals.extend(locals);
                }
                for line in lines {
                    self.out.line(line);
                }
                Ok(())
            }
        }
    }

    fn constants(&mut self, toks: &[vba2py_syntax::Token]) -> Tr<()> {
        let consts = parse_consts(toks)?;
        let mut lines = Vec::with_capacity(consts.len());
        let mut locals = Vec::new();
        for c in &consts {
            let value = self.expr(&parse_expression(&c.value)?)?;
            let annotation = if c.type_ref.is_some() || c.suffix.is_some() {
                Some(self.scalar_type(c.type_ref.as_ref(), c.suffix).annotation)
            } else {
                literal_annotation(&value, &c.value)
            };
            let lower = c.name.to_ascii_lowercase();
            let py = match (&self.scope, self.symbols.module_vars.get(&lower)) {
                (None, Some(var)) => var.py.clone(),
                _ => snake_case(&c.name),
            };
            lines.push(match annotation {
                Some(a) => format!("{py}: {a} = {}", value.code),
                None => format!("{py} = {}", value.code),
            });
            if self.scope.is_some() {
                let info = VarInfo {
                    is_str: value.is_str || declared_is_str(self.tables, c.type_ref.as_ref(), c.suffix),
                    is_const: true,
                    ..VarInfo::scalar(py)
                };
                locals.push((lower, info));
            }
        }
        if let Some(scope) = self.scope.as_mut() {
            scope.locals.extend(locals);
        }
        for line in lines {
            self.out.line(line);
        }
        Ok(())
    }

    /// `self.<Field>: T = default` lines for a class-level variable declaration.
    pub(super) fn field_declaration(&mut self, stmt: &Statement) -> Tr<()> {
        let Some((DeclForm::Variables { .. }, start)) = declaration_form(stmt) else {
            return Err(Untranslatable::Form("expected a field declaration".to_string()));
        };
        let decls = parse_declarators(&stmt.tokens[start..])?;
        let mut lines = Vec::with_capacity(decls.len());
        for d in &decls {
            let typed = self.declared_type(d)?;
            let py = self
                .symbols
                .module_vars
                .get(&d.name.to_ascii_lowercase())
                .map_or_else(|| escape_reserved(d.name.clone()), |v| v.py.clone());
            lines.push(format!("self.{py}: {} = {}", typed.annotation, typed.default));
        }
        for line in lines {
            self.out.line(line);
        }
        Ok(())
    }

    /// `Enum` as an `IntEnum` subclass; members keep their VBA spelling.
    pub(super) fn enum_block(&mut self, block: &Block) {
        let header = block.header();
        self.line = header.line;
        let Some(name) = block_name(header, "enum") else {
            self.give_up(&header.text, &Untranslatable::Form("expected an enum name".to_string()));
            return;
        };
        self.use_import("from enum import IntEnum");
        self.out.line(format!("class {name}(IntEnum):"));
        let body = self.out.open_block();
        self.current_enum = Some(name);

        // Next implicit value: a literal when known, otherwise relative to the previous member.
        let mut next = Some(0i64);
        let mut previous: Option<String> = None;
        let tree = self.tree;
        for &id in &block.arms[0].body {
            let stmt = match tree.node(id) {
                Node::Statement(stmt) => stmt,
                Node::Block(inner) => {
                    self.give_up(&inner.header().text, &Untranslatable::Form("unexpected block in enum".to_string()));
                    continue;
                }
            };
            if stmt.tokens.is_empty() {
                self.statement(stmt);
                continue;
            }
            self.line = stmt.line;
            let mark = self.mark();
            match self.enum_member(stmt, next, previous.as_deref()) {
                Ok((member, value)) => {
                    next = value.map(|v| v + 1);
                    previous = Some(member);
                    if let Some(comment) = &stmt.comment {
                        self.out.annotate(mark.lines, comment);
                    }
                }
                Err(err) => {
                    self.rollback(mark);
                    self.give_up(&stmt.text, &err);
                }
            }
        }
        self.current_enum = None;
        self.out.close_block(body);
    }

    fn enum_member(&mut self, stmt: &Statement, next: Option<i64>, previous: Option<&str>) -> Tr<(String, Option<i64>)> {
        let toks = &stmt.tokens;
        let member = match toks.first() {
            Some(t) if t.kind == TokenKind::Identifier => t.name().to_string(),
            _ => return Err(Untranslatable::Form("expected an enum member".to_string())),
        };
        let (code, value) = match toks.get(1) {
            None => match (next, previous) {
                (Some(v), _) => (v.to_string(), Some(v)),
                (None, Some(prev)) => (format!("{prev} + 1"), None),
                (None, None) => ("0".to_string(), Some(0)),
            },
            Some(t) if t.kind == TokenKind::Eq => {
                let value = self.expr(&parse_expression(&toks[2..])?)?;
                (value.code.clone(), value.int_value)
            }
            Some(_) => return Err(Untranslatable::Form("expected `=` after the enum member".to_string())),
        };
        self.out.line(format!("{} = {code}", escape_reserved(member.clone())));
        Ok((member, value))
    }

    /// `Type` as a dataclass; fields keep their VBA spelling.
    pub(super) fn type_block(&mut self, block: &Block) {
        let header = block.header();
        self.line = header.line;
        let Some(name) = block_name(header, "type") else {
            self.give_up(&header.text, &Untranslatable::Form("expected a type name".to_string()));
            return;
        };
        self.use_import("from dataclasses import dataclass");
        self.out.line("@dataclass");
        self.out.line(format!("class {name}:"));
        let body = self.out.open_block();
        let tree = self.tree;
        for &id in &block.arms[0].body {
            let stmt = match tree.node(id) {
                Node::Statement(stmt) => stmt,
                Node::Block(inner) => {
                    self.give_up(&inner.header().text, &Untranslatable::Form("unexpected block in type".to_string()));
                    continue;
                }
            };
            if stmt.tokens.is_empty() {
                self.statement(stmt);
                continue;
            }
            self.line = stmt.line;
            let mark = self.mark();
            match self.type_member(stmt) {
                Ok(()) => {
                    if let Some(comment) = &stmt.comment {
                        self.out.annotate(mark.lines, comment);
                    }
                }
                Err(err) => {
                    self.rollback(mark);
                    self.give_up(&stmt.text, &err);
                }
            }
        }
        self.out.close_block(body);
    }

    fn type_member(&mut self, stmt: &Statement) -> Tr<()> {
        let decls = parse_declarators(&stmt.tokens)?;
        let mut lines = Vec::with_capacity(decls.len());
        for d in &decls {
            let typed = self.declared_type(d)?;
            let field = escape_reserved(d.name.clone());
            if typed.is_mutable() {
                self.use_import("from dataclasses import field");
                lines.push(format!(
                    "{field}: {} = field(default_factory=lambda: {})",
                    typed.annotation, typed.default
                ));
            } else {
                lines.push(format!("{field}: {} = {}", typed.annotation, typed.default));
            }
        }
        for line in lines {
            self.out.line(line);
        }
        Ok(())
    }
}

/// Annotation inferred from a constant's literal value.
fn literal_annotation(value: &Py, toks: &[vba2py_syntax::Token]) -> Option<String> {
    if value.int_value.is_some() {
        return Some("int".to_string());
    }
    if value.is_str {
        return Some("str".to_string());
    }
    match toks {
        [t] | [_, t] if t.kind == TokenKind::Float => Some("float".to_string()),
        [t] if t.is_kw("true") || t.is_kw("false") => Some("bool".to_string()),
        _ => None,
    }
}
