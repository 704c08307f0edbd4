use std::collections::{BTreeMap, BTreeSet};

use vba2py_model::{ModuleKind, NoteCode};
use vba2py_syntax::{Block, BlockKind, Node, NodeId, Statement};

use super::decl::Typed;
use super::symbols::{declaration_form, declared_is_str, parse_proc_header, receiver_for, DeclForm, ProcHeader};
use super::{Emitter, ProcKind, Scope, Untranslatable, VarInfo};
use crate::expr::parse_expression;
use crate::naming::{escape_reserved, snake_case};

/// How a class procedure is placed in the generated class.
#[derive(Debug, Clone, Default)]
pub(super) struct Method<'t> {
    pub name: String,
    pub decorator: Option<String>,
    /// Field declarations emitted at the top of `__init__`.
    pub fields: Vec<&'t Statement>,
}

impl<'t> Method<'t> {
    fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// `"""VBA: ..."""` with the header escaped for a triple-quoted string.
fn docstring(header: &str) -> String {
    let mut text = header.replace('\\', "\\\\").replace("\"\"\"", "\\\"\\\"\\\"");
    if text.ends_with('"') {
        text.push(' ');
    }
    format!("\"\"\"VBA: {text}\"\"\"")
}

/// Splits a body at a top-level `On Error GoTo <label>` and the matching `<label>:`.
fn error_handler(tree: &vba2py_syntax::BlockTree, body: &[NodeId]) -> Option<(usize, usize)> {
    let statement = |id: NodeId| match tree.node(id) {
        Node::Statement(stmt) => Some(stmt),
        Node::Block(_) => None,
    };
    let (jump, label) = body.iter().enumerate().find_map(|(i, &id)| {
        let toks = &statement(id)?.tokens;
        match toks.as_slice() {
            [on, error, goto, label]
                if on.is_kw("on") && error.is_kw("error") && goto.is_kw("goto") && label.is_name_like() =>
            {
                Some((i, label.name().to_ascii_lowercase()))
            }
            _ => None,
        }
    })?;
    let target = body[jump + 1..].iter().position(|&id| {
        statement(id)
            .and_then(Statement::label)
            .is_some_and(|l| l.eq_ignore_ascii_case(&label))
    })?;
    Some((jump, jump + 1 + target))
}

fn is_event_handler(kind: ModuleKind, name: &str) -> bool {
    matches!(kind, ModuleKind::DocumentModule | ModuleKind::FormModule) && name.contains('_')
}

impl<'a> Emitter<'a> {
    /// A `Sub`, `Function` or `Property` as a Python function (or method, with `method`).
    pub(super) fn procedure(&mut self, block: &Block, method: Option<Method<'_>>) {
        let header_stmt = block.header();
        self.line = header_stmt.line;
        let header = match parse_proc_header(header_stmt) {
            Ok(header) => header,
            Err(err) => {
                self.give_up(&header_stmt.text, &Untranslatable::from(err));
                self.comment_out(&block.arms[0].body);
                self.out.comment(&block.close.text);
                return;
            }
        };
        let in_class = method.is_some();
        let method = method.unwrap_or_default();
        let def_name = if in_class {
            method.name.clone()
        } else {
            snake_case(&header.name)
        };

        if header.is_static {
            self.warn(
                NoteCode::StaticLocal,
                format!("locals of `{}` keep their values between calls in VBA but not here", header.name),
            );
        }
        if is_event_handler(self.kind, &header.name) {
            self.info(
                NoteCode::EventHandler,
                format!("`{}` is an event handler and runs only when called explicitly", header.name),
            );
        }

        let (params, locals) = self.parameters(&header, in_class);
        let returns = header.kind.returns_value();
        let result = if returns {
            let typed = self.scalar_type(header.return_type.as_ref(), header.suffix);
            if header.returns_array {
                Some(Typed {
                    annotation: format!("list[{}]", typed.annotation),
                    default: "[]".to_string(),
                })
            } else {
                Some(typed)
            }
        } else {
            None
        };
        let return_annotation = result.as_ref().map_or("None", |t| t.annotation.as_str()).to_string();

        self.scope = Some(Scope {
            result_name: returns.then(|| header.name.to_ascii_lowercase()),
            result_is_str: returns
                && !header.returns_array
                && declared_is_str(self.tables, header.return_type.as_ref(), header.suffix),
            exit: if returns { "return _result" } else { "return" },
            locals,
            ..Scope::default()
        });
        self.with_targets.clear();

        if let Some(decorator) = &method.decorator {
            self.out.line(decorator);
        }
        self.out.line(format!("def {def_name}({}) -> {return_annotation}:", params.join(", ")));
        let body_mark = self.out.open_block();
        self.out.line(docstring(&header_stmt.text));
        let globals_at = self.out.len();

        for field in &method.fields {
            self.field_statement(field);
        }
        if let Some(typed) = &result {
            self.out.line(format!("_result: {} = {}", typed.annotation, typed.default));
        }

        let tree = self.tree;
        let body = &block.arms[0].body;
        match error_handler(tree, body) {
            Some((jump, label)) => {
                self.body(&body[..jump]);
                self.out.line("try:");
                let inner = self.out.open_block();
                self.body(&body[jump + 1..label]);
                self.out.close_block(inner);
                self.out.line("except Exception as err:");
                let handler = self.out.open_block();
                self.body(&body[label + 1..]);
                self.out.close_block(handler);
            }
            None => self.body(body),
        }

        if returns && self.out.last_code_line() != Some("return _result") {
            self.out.line("return _result");
        }

        let globals: BTreeSet<String> = self.scope.take().map(|s| s.globals).unwrap_or_default();
        if !globals.is_empty() && !in_class {
            let names: Vec<&str> = globals.iter().map(String::as_str).collect();
            self.out.insert_line(globals_at, &format!("global {}", names.join(", ")));
        }
        self.out.close_block(body_mark);
        self.with_targets.clear();
    }

    /// Python parameter list and the locals it introduces.
    fn parameters(&mut self, header: &ProcHeader, in_class: bool) -> (Vec<String>, BTreeMap<String, VarInfo>) {
        let mut params = Vec::with_capacity(header.params.len() + 1);
        let mut locals = BTreeMap::new();
        if in_class {
            params.push("self".to_string());
        }
        let option_base = self.symbols.option_base;
        for p in &header.params {
            let py = snake_case(&p.name);
            if p.by_ref {
                self.info(
                    NoteCode::ByRefParameter,
                    format!("`{}` is passed ByRef; assignments to it do not reach the caller", p.name),
                );
            }
            let typed = self.scalar_type(p.type_ref.as_ref(), p.suffix);
            let annotation = if p.is_array {
                format!("list[{}]", typed.annotation)
            } else {
                typed.annotation.clone()
            };
            let text = if p.param_array {
                format!("*{py}")
            } else if p.optional {
                let default = p
                    .default
                    .as_deref()
                    .and_then(|toks| parse_expression(toks).ok())
                    .and_then(|e| self.expr(&e).ok())
                    .map(|v| v.code);
                match default {
                    Some(value) => format!("{py}: {annotation} = {value}"),
                    None => {
                        let optional = Typed {
                            annotation,
                            default: "None".to_string(),
                        };
                        format!("{py}: {} = None", optional.optional_annotation())
                    }
                }
            } else {
                format!("{py}: {annotation}")
            };
            params.push(text);
            let info = VarInfo {
                is_str: !p.is_array && !p.param_array && declared_is_str(self.tables, p.type_ref.as_ref(), p.suffix),
                bases: (p.is_array || p.param_array).then(|| vec![if p.param_array { 0 } else { option_base }]),
                receiver: receiver_for(p.type_ref.as_ref()),
                ..VarInfo::scalar(py)
            };
            locals.insert(p.name.to_ascii_lowercase(), info);
        }
        (params, locals)
    }

    fn field_statement(&mut self, stmt: &Statement) {
        self.line = stmt.line;
        let mark = self.mark();
        match self.field_declaration(stmt) {
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

    /// Source of a body that could not be translated, as comments.
    fn comment_out(&mut self, nodes: &[NodeId]) {
        let tree = self.tree;
        for &id in nodes {
            match tree.node(id) {
                Node::Statement(stmt) if stmt.is_blank() => self.out.blank(),
                Node::Statement(stmt) => match (&stmt.comment, stmt.tokens.is_empty()) {
                    (Some(c), true) => self.out.comment(c),
                    _ => self.out.comment(&stmt.text),
                },
                Node::Block(block) => {
                    for arm in &block.arms {
                        self.out.comment(&arm.header.text);
                        self.comment_out(&arm.body);
                    }
                    self.out.comment(&block.close.text);
                }
            }
        }
    }

    /// A class module: module-level items first, then one class holding fields and methods.
    pub(super) fn class_module(&mut self, root: &[NodeId]) {
        let tree: &'a vba2py_syntax::BlockTree = self.tree;
        let mut fields: Vec<&'a Statement> = Vec::new();
        let mut members: Vec<NodeId> = Vec::new();
        let mut procedures: Vec<(NodeId, ProcHeader)> = Vec::new();
        let mut seen_procedure = false;

        for &id in root {
            match tree.node(id) {
                Node::Statement(stmt) => {
                    let is_field = matches!(declaration_form(stmt), Some((DeclForm::Variables { .. }, _)));
                    if is_field {
                        fields.push(stmt);
                    } else if seen_procedure && stmt.tokens.is_empty() {
                        members.push(id);
                    } else {
                        self.module_statement(stmt);
                    }
                }
                Node::Block(block) => match block.kind {
                    BlockKind::Procedure => {
                        seen_procedure = true;
                        members.push(id);
                        if let Ok(header) = parse_proc_header(block.header()) {
                            procedures.push((id, header));
                        }
                    }
                    BlockKind::Enum => {
                        self.out.separate(2);
                        self.enum_block(block);
                        self.out.separate(2);
                    }
                    BlockKind::Type => {
                        self.out.separate(2);
                        self.type_block(block);
                        self.out.separate(2);
                    }
                    _ => {
                        self.out.separate(2);
                        self.block(block);
                        self.out.separate(2);
                    }
                },
            }
        }

        let placement = Self::class_placement(&procedures);
        let paired: BTreeSet<NodeId> = placement
            .values()
            .filter_map(|p| match p {
                Placement::Getter { setter, .. } => *setter,
                _ => None,
            })
            .collect();
        self.out.separate(2);
        self.out.line(format!("class {}:", escape_reserved(self.module_name.to_string())));
        let class_body = self.out.open_block();
        let mut first = true;
        let mut separate = |emitter: &mut Self| {
            if !first {
                emitter.out.separate(1);
            }
            first = false;
        };

        let has_initialize = placement.values().any(|p| matches!(p, Placement::Initialize));
        if !has_initialize && !fields.is_empty() {
            separate(self);
            self.line = fields[0].line;
            self.out.line("def __init__(self) -> None:");
            let init = self.out.open_block();
            for field in &fields {
                self.field_statement(field);
            }
            self.out.close_block(init);
        }

        for id in members {
            let Node::Block(block) = tree.node(id) else {
                if let Node::Statement(stmt) = tree.node(id) {
                    self.statement(stmt);
                }
                continue;
            };
            if paired.contains(&id) {
                continue;
            }
            separate(self);
            match placement.get(&id) {
                Some(Placement::Initialize) => {
                    let method = Method {
                        fields: fields.clone(),
                        ..Method::named("__init__")
                    };
                    self.procedure(block, Some(method));
                }
                Some(Placement::Getter { name, setter }) => {
                    let getter = Method {
                        decorator: Some("@property".to_string()),
                        ..Method::named(name.clone())
                    };
                    self.procedure(block, Some(getter));
                    if let Some(setter_id) = setter {
                        if let Node::Block(setter_block) = tree.node(*setter_id) {
                            self.out.separate(1);
                            let setter = Method {
                                decorator: Some(format!("@{name}.setter")),
                                ..Method::named(name.clone())
                            };
                            self.procedure(setter_block, Some(setter));
                        }
                    }
                }
                Some(Placement::Method(name)) => self.procedure(block, Some(Method::named(name.clone()))),
                None => self.procedure(block, Some(Method::named("_unparsed"))),
            }
        }
        self.out.close_block(class_body);
    }

    /// Method names and decorators for each procedure of a class module. A property setter
    /// is paired with the parameterless getter of the same name; any other setter becomes
    /// a `set_<Name>` method.
    fn class_placement(procedures: &[(NodeId, ProcHeader)]) -> BTreeMap<NodeId, Placement> {
        let mut placement = BTreeMap::new();
        let mut getters: BTreeMap<String, NodeId> = BTreeMap::new();
        for (id, header) in procedures {
            let lower = header.name.to_ascii_lowercase();
            let place = match header.kind {
                ProcKind::Sub if lower == "class_initialize" => Placement::Initialize,
                ProcKind::Sub if lower == "class_terminate" => Placement::Method("__del__".to_string()),
                ProcKind::PropertyGet if header.params.is_empty() && !getters.contains_key(&lower) => {
                    getters.insert(lower, *id);
                    Placement::Getter {
                        name: escape_reserved(header.name.clone()),
                        setter: None,
                    }
                }
                ProcKind::PropertyLet | ProcKind::PropertySet => continue,
                _ => Placement::Method(escape_reserved(header.name.clone())),
            };
            placement.insert(*id, place);
        }
        for (id, header) in procedures {
            if !matches!(header.kind, ProcKind::PropertyLet | ProcKind::PropertySet) {
                continue;
            }
            let getter = getters.get(&header.name.to_ascii_lowercase()).copied();
            if let Some(Placement::Getter { setter: setter @ None, .. }) = getter.and_then(|g| placement.get_mut(&g)) {
                *setter = Some(*id);
                continue;
            }
            placement.insert(*id, Placement::Method(format!("set_{}", header.name)));
        }
        placement
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Placement {
    Initialize,
    Getter { name: String, setter: Option<NodeId> },
    Method(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn docstrings_escape_quotes() {
        assert_eq!(docstring("Sub Run()"), "\"\"\"VBA: Sub Run()\"\"\"");
        assert_eq!(
            docstring("Function Q(Optional s = \"\"\"\")"),
            "\"\"\"VBA: Function Q(Optional s = \\\"\\\"\\\"\")\"\"\""
        );
    }

    #[test]
    fn event_handlers_need_a_document_or_form() {
        assert!(is_event_handler(ModuleKind::DocumentModule, "Workbook_Open"));
        assert!(!is_event_handler(ModuleKind::StandardModule, "Workbook_Open"));
        assert!(!is_event_handler(ModuleKind::FormModule, "Refresh"));
    }
}
