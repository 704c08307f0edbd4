//! Python code generation over a parsed module.
//!
//! The emitter walks the block tree once. Every statement is translated against a checkpoint:
//! when any part of it cannot be expressed, everything it produced (lines, notes, imports,
//! helpers) is rolled back and a single `# [untranslated] ...` comment takes its place.

mod decl;
mod expr;
mod procedure;
mod stmt;
mod symbols;
mod writer;

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;
use vba2py_model::{ModuleKind, NoteCode, TranslationNote};
use vba2py_syntax::{BlockKind, BlockTree, Node, NodeId};

use crate::expr::ParseError;
use crate::helpers::helper;
use crate::py::{ImportSet, Py};
use crate::tables::MappingTables;
use crate::ConvertOptions;

pub(crate) use symbols::{ProcKind, Symbols, VarInfo};
use writer::CodeWriter;

/// Why one statement could not be translated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum Untranslatable {
    #[error("expression does not parse: {0}")]
    Parse(#[from] ParseError),
    #[error("`{0}` has no Python mapping")]
    Unmapped(String),
    #[error("`{name}` does not accept {argc} argument(s)")]
    Arity { name: String, argc: usize },
    #[error("{0}")]
    Form(String),
    /// Recognized but deliberately not translated; reported as `Unsupported`.
    #[error("{0}")]
    Unsupported(String),
}

pub(crate) type Tr<T> = Result<T, Untranslatable>;

/// Restore point for [`Emitter::rollback`].
#[derive(Debug, Clone, Copy)]
struct Mark {
    lines: usize,
    notes: usize,
    imports: usize,
    helpers: usize,
}

/// Per-procedure state.
#[derive(Debug, Clone, Default)]
pub(crate) struct Scope {
    /// Lower-cased name whose assignment sets the return value.
    result_name: Option<String>,
    result_is_str: bool,
    /// `return` or `return _result`, for `Exit Sub/Function/Property`.
    exit: &'static str,
    locals: BTreeMap<String, VarInfo>,
    /// Module variables rebound in this procedure.
    globals: BTreeSet<String>,
    /// Inside an `On Error Resume Next` region.
    suppress: bool,
}

pub(crate) struct Emitter<'a> {
    tables: &'a MappingTables,
    options: &'a ConvertOptions,
    tree: &'a BlockTree,
    source: &'a str,
    module_name: &'a str,
    kind: ModuleKind,
    symbols: Symbols,
    out: CodeWriter,
    notes: Vec<TranslationNote>,
    imports: Vec<&'static str>,
    helpers: Vec<&'static str>,
    scope: Option<Scope>,
    with_targets: Vec<Py>,
    select_depth: usize,
    /// Enum whose body is being emitted; its members are referenced bare.
    current_enum: Option<String>,
    /// Line of the statement being translated.
    line: usize,
}

/// Generated code plus the notes raised while producing it.
#[derive(Debug, Clone)]
pub(crate) struct Emitted {
    pub code: String,
    pub notes: Vec<TranslationNote>,
}

pub(crate) fn emit_module(
    module_name: &str,
    kind: ModuleKind,
    source: &str,
    tree: &BlockTree,
    tables: &MappingTables,
    options: &ConvertOptions,
) -> Emitted {
    let emitter = Emitter::new(module_name, kind, source, tree, tables, options);
    emitter.run()
}

impl<'a> Emitter<'a> {
    fn new(
        module_name: &'a str,
        kind: ModuleKind,
        source: &'a str,
        tree: &'a BlockTree,
        tables: &'a MappingTables,
        options: &'a ConvertOptions,
    ) -> Self {
        let symbols = Symbols::collect(tree, tables, kind == ModuleKind::ClassModule);
        Self {
            tables,
            options,
            tree,
            source,
            module_name,
            kind,
            symbols,
            out: CodeWriter::new(options.indent_width),
            notes: Vec::new(),
            imports: Vec::new(),
            helpers: Vec::new(),
            scope: None,
            with_targets: Vec::new(),
            select_depth: 0,
            current_enum: None,
            line: 1,
        }
    }

    fn is_class(&self) -> bool {
        self.kind == ModuleKind::ClassModule
    }

    fn run(mut self) -> Emitted {
        let tree = self.tree;
        if self.is_class() {
            self.class_module(tree.root());
        } else {
            for &id in tree.root() {
                self.top_level(id);
            }
        }
        self.assemble()
    }

    /// One top-level item of a non-class module.
    fn top_level(&mut self, id: NodeId) {
        match self.tree.node(id) {
            Node::Statement(stmt) => self.module_statement(stmt),
            Node::Block(block) => {
                self.out.separate(2);
                match block.kind {
                    BlockKind::Procedure => self.procedure(block, None),
                    BlockKind::Enum => self.enum_block(block),
                    BlockKind::Type => self.type_block(block),
                    _ => self.block(block),
                }
                self.out.separate(2);
            }
        }
    }

    fn assemble(self) -> Emitted {
        let mut imports = ImportSet::default();
        imports.extend(self.imports.iter().copied());

        let mut helper_names = BTreeSet::new();
        if self.options.emit_helpers {
            let mut pending: Vec<&str> = self.helpers.clone();
            while let Some(name) = pending.pop() {
                if let Some(h) = helper(name) {
                    if helper_names.insert(h.name) {
                        imports.extend(h.imports.iter().copied());
                        pending.extend(h.requires.iter().copied());
                    }
                }
            }
        }

        let mut lines = vec![
            format!("\"\"\"{} ({}), converted from VBA.\"\"\"", self.module_name, self.kind.label()),
            String::new(),
            "from __future__ import annotations".to_string(),
        ];
        if !imports.is_empty() {
            lines.push(String::new());
            lines.extend(imports.lines());
        }
        for name in &helper_names {
            if let Some(h) = helper(name) {
                lines.extend([String::new(), String::new()]);
                lines.extend(h.source.lines().map(str::to_string));
            }
        }
        let body = self.out.into_lines();
        if !body.is_empty() {
            lines.extend([String::new(), String::new()]);
            lines.extend(body);
        }
        let mut code = lines.join("\n");
        code.push('\n');
        Emitted {
            code,
            notes: self.notes,
        }
    }

    fn mark(&self) -> Mark {
        Mark {
            lines: self.out.len(),
            notes: self.notes.len(),
            imports: self.imports.len(),
            helpers: self.helpers.len(),
        }
    }

    fn rollback(&mut self, mark: Mark) {
        self.out.truncate(mark.lines);
        self.notes.truncate(mark.notes);
        self.imports.truncate(mark.imports);
        self.helpers.truncate(mark.helpers);
    }

    fn note(&mut self, note: TranslationNote) {
        self.notes.push(note.at_line(self.line));
    }

    fn info(&mut self, code: NoteCode, message: impl Into<String>) {
        self.note(TranslationNote::info(code, message));
    }

    fn warn(&mut self, code: NoteCode, message: impl Into<String>) {
        self.note(TranslationNote::warning(code, message));
    }

    fn use_imports(&mut self, imports: &'static [&'static str]) {
        self.imports.extend(imports.iter().copied());
    }

    fn use_import(&mut self, import: &'static str) {
        self.imports.push(import);
    }

    fn use_helpers(&mut self, helpers: &'static [&'static str]) {
        self.helpers.extend(helpers.iter().copied());
    }

    fn use_helper(&mut self, helper: &'static str) {
        self.helpers.push(helper);
    }

    /// Reports a statement that produced nothing usable.
    fn give_up(&mut self, text: &str, err: &Untranslatable) {
        match err {
            Untranslatable::Unsupported(reason) => {
                self.out.comment(&format!("[unsupported] {text}"));
                self.warn(NoteCode::Unsupported, format!("{reason}: `{text}`"));
            }
            other => {
                self.out.comment(&format!("[untranslated] {text}"));
                self.warn(NoteCode::UnknownConstruct, format!("{other}: `{text}`"));
            }
        }
    }
}
