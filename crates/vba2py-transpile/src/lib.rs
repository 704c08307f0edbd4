//! Rule-based translation of VBA modules and spreadsheet formulas to Python.
//!
//! [`convert`] turns one [`RawModule`] of a known [`ModuleKind`] into a [`ConversionResult`].
//! It never fails: unbalanced blocks or unterminated strings yield `success == false` with a
//! note, and statements it cannot translate are kept as comments with an `UnknownConstruct`
//! warning. Every mapping lives in [`tables::MappingTables`], built once and shared read-only.

pub mod batch;
pub mod classify;
mod emit;
mod expr;
pub mod formula;
mod helpers;
pub mod naming;
mod py;
mod source;
pub mod tables;
pub mod template;

use serde::{Deserialize, Serialize};
use vba2py_model::{ConversionResult, ModuleKind, NoteCode, RawModule, TranslationNote};
use vba2py_syntax::{parse_module, BlockError, SyntaxError};

pub use batch::{convert_batch, convert_extraction, BatchOptions};
pub use classify::{classify, Classification};
pub use expr::ParseError;
pub use formula::{convert_formula_named, parse_formula};
pub use tables::MappingTables;

/// Output settings for generated Python.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConvertOptions {
    /// Spaces per indentation level.
    pub indent_width: usize,
    /// Append the definitions of runtime helpers (`_like`, `_val`, ...) the code calls.
    pub emit_helpers: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            indent_width: 4,
            emit_helpers: true,
        }
    }
}

/// Converts one module with the standard tables and default options.
pub fn convert(module: &RawModule, kind: ModuleKind) -> ConversionResult {
    convert_with(module, kind, MappingTables::standard(), &ConvertOptions::default())
}

pub fn convert_with(
    module: &RawModule,
    kind: ModuleKind,
    tables: &MappingTables,
    options: &ConvertOptions,
) -> ConversionResult {
    let prepared = source::prepare(&module.source_text);
    let tree = match parse_module(&prepared.text) {
        Ok(tree) => tree,
        Err(err) => {
            log::warn!("module `{}` cannot be converted: {err}", module.name);
            let code = match &err {
                SyntaxError::Lex(_) => NoteCode::LexError,
                SyntaxError::Block(BlockError::Unbalanced { .. }) => NoteCode::UnbalancedBlock,
                SyntaxError::Block(BlockError::Unterminated { .. }) => NoteCode::UnterminatedBlock,
            };
            let note = TranslationNote::warning(code, err.to_string()).at_line(err.line());
            let mut result = ConversionResult::failed(&module.name, Some(kind), note);
            result.notes.splice(0..0, module.notes.iter().cloned());
            return result;
        }
    };
    log::debug!("converting `{}` as {kind} ({} nodes)", module.name, tree.len());

    let emitted = emit::emit_module(&module.name, kind, &prepared.text, &tree, tables, options);
    let mut notes = module.notes.clone();
    notes.extend(emitted.notes);
    ConversionResult {
        module_name: module.name.clone(),
        kind: Some(kind),
        generated_code: emitted.code,
        notes,
        success: true,
    }
}

/// Classifies, then converts. Classification notes come before conversion notes.
pub fn classify_and_convert(module: &RawModule, tables: &MappingTables, options: &ConvertOptions) -> ConversionResult {
    let classification = classify(module);
    let mut result = convert_with(module, classification.kind, tables, options);
    let insert_at = module.notes.len().min(result.notes.len());
    result.notes.splice(insert_at..insert_at, classification.notes);
    result
}

/// Converts one spreadsheet formula (with or without the leading `=`).
pub fn convert_formula(formula: &str) -> ConversionResult {
    convert_formula_named("formula", formula, MappingTables::standard(), &ConvertOptions::default())
}
