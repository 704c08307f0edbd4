//! Data model shared by the vba2py extractor, transpiler and CLI.
//!
//! Everything here is plain data: serializable records that cross crate boundaries. Behavior
//! lives in `vba2py-extract` (producing [`RawModule`]s) and `vba2py-transpile` (producing
//! [`ConversionResult`]s).

mod module;
mod note;
mod result;

pub use module::{ContainerFormat, FormulaRecord, ModuleKind, ModuleOrigin, RawModule};
pub use note::{NoteCode, Severity, TranslationNote};
pub use result::ConversionResult;
