//! Module classification: declared type, then structure, then origin, then a default.

use serde::Serialize;
use vba2py_model::{ModuleKind, ModuleOrigin, NoteCode, RawModule, TranslationNote};
use vba2py_syntax::{classify_statement, split_statements, tokenize_lossy, BlockKind, LexMode, StatementRole};

use crate::source::prepare;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub kind: ModuleKind,
    pub notes: Vec<TranslationNote>,
}

impl Classification {
    fn certain(kind: ModuleKind) -> Self {
        Self { kind, notes: Vec::new() }
    }
}

const WORKBOOK_BASE: &str = "0{00020819-0000-0000-C000-000000000046}";
const WORKSHEET_BASE: &str = "0{00020820-0000-0000-C000-000000000046}";

const LIFECYCLE_PREFIXES: &[&str] = &["workbook_", "worksheet_", "chart_"];

/// Resolves the kind of a module. Total: every input maps to exactly one kind, and only the
/// fallback to [`ModuleKind::StandardModule`] carries a `LowConfidenceClassification` note.
pub fn classify(module: &RawModule) -> Classification {
    if let Some(kind) = declared_kind(module) {
        return Classification::certain(kind);
    }
    if let Some(kind) = structural_kind(module) {
        return Classification::certain(kind);
    }
    if module.origin == ModuleOrigin::EmbeddedCell {
        return Classification::certain(ModuleKind::CellEmbedded);
    }
    let nonprocedural = module
        .declared_type_hint
        .as_deref()
        .is_some_and(|h| h.eq_ignore_ascii_case("nonprocedural"));
    if nonprocedural {
        return Classification::certain(ModuleKind::ClassModule);
    }

    log::debug!("no classification signal for module `{}`", module.name);
    Classification {
        kind: ModuleKind::StandardModule,
        notes: vec![TranslationNote::info(
            NoteCode::LowConfidenceClassification,
            format!("`{}` has no type declaration or structural signal; treated as a standard module", module.name),
        )],
    }
}

fn declared_kind(module: &RawModule) -> Option<ModuleKind> {
    match module.declared_type_hint.as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("standard") => return Some(ModuleKind::StandardModule),
        Some("class") => return Some(ModuleKind::ClassModule),
        Some("document") => return Some(ModuleKind::DocumentModule),
        Some("form") => return Some(ModuleKind::FormModule),
        _ => {}
    }

    if let Some(base) = module.attribute("VB_Base") {
        let base = base.trim().trim_matches('"');
        if base.eq_ignore_ascii_case(WORKBOOK_BASE) || base.eq_ignore_ascii_case(WORKSHEET_BASE) {
            return Some(ModuleKind::DocumentModule);
        }
        // Designers carry two GUIDs: the form class and its type library.
        if base.starts_with("0{") && base.matches('{').count() >= 2 {
            return Some(ModuleKind::FormModule);
        }
    }

    let is_true = |name| module.attribute(name).is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));
    if is_true("VB_Creatable") || is_true("VB_Exposed") {
        return Some(ModuleKind::ClassModule);
    }
    None
}

fn structural_kind(module: &RawModule) -> Option<ModuleKind> {
    let prepared = prepare(&module.source_text);
    let tokens = tokenize_lossy(&prepared.text, LexMode::Macro);
    let statements = split_statements(&prepared.text, &tokens);

    let mut has_property = false;
    let mut has_form_handler = false;
    let mut has_lifecycle = false;
    for stmt in &statements {
        if classify_statement(stmt) != StatementRole::Open(BlockKind::Procedure) {
            continue;
        }
        let idx = stmt.skip_modifiers(&["public", "private", "friend", "static"]);
        let Some(keyword) = stmt.tokens.get(idx) else {
            continue;
        };
        let name_idx = if keyword.is_kw("property") { idx + 2 } else { idx + 1 };
        let name = stmt.tokens.get(name_idx).map(|t| t.name().to_ascii_lowercase()).unwrap_or_default();
        if keyword.is_kw("property") || name == "class_initialize" || name == "class_terminate" {
            has_property = true;
        }
        if name.starts_with("userform_") {
            has_form_handler = true;
        }
        if LIFECYCLE_PREFIXES.iter().any(|p| name.starts_with(p)) {
            has_lifecycle = true;
        }
    }

    if has_property {
        return Some(ModuleKind::ClassModule);
    }
    if prepared.designer || has_form_handler {
        return Some(ModuleKind::FormModule);
    }
    if has_lifecycle || is_document_name(&module.name) {
        return Some(ModuleKind::DocumentModule);
    }
    None
}

/// `ThisWorkbook`, `Sheet1`, `Sheet12`.
fn is_document_name(name: &str) -> bool {
    if name.eq_ignore_ascii_case("thisworkbook") {
        return true;
    }
    name.get(..5).is_some_and(|head| head.eq_ignore_ascii_case("sheet"))
        && name.len() > 5
        && name[5..].chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn module(name: &str, source: &str) -> RawModule {
        RawModule::new(name, source, ModuleOrigin::CompoundProject)
    }

    #[test]
    fn declared_hint_wins_over_structure() {
        let m = module("Sheet1", "Property Get X()\nEnd Property\n").with_type_hint("standard");
        assert_eq!(classify(&m), Classification::certain(ModuleKind::StandardModule));
    }

    #[test]
    fn vb_base_identifies_documents_and_forms() {
        let mut m = module("Anything", "");
        m.attributes.insert("VB_Base".into(), format!("\"{WORKSHEET_BASE}\""));
        assert_eq!(classify(&m).kind, ModuleKind::DocumentModule);

        m.attributes.insert(
            "VB_Base".into(),
            "\"0{B3E4C7A1-1111-2222-3333-444455556666}{0D2B11C4-0000-0000-0000-000000000000}\"".into(),
        );
        assert_eq!(classify(&m).kind, ModuleKind::FormModule);
    }

    #[test]
    fn structural_signals() {
        let class = module("Policy", "Private m As Long\nPublic Property Get Rate() As Long\nEnd Property\n");
        assert_eq!(classify(&class).kind, ModuleKind::ClassModule);

        let doc = module("Book", "Private Sub Workbook_Open()\nEnd Sub\n");
        assert_eq!(classify(&doc).kind, ModuleKind::DocumentModule);

        let form = module("Dialog", "Private Sub UserForm_Initialize()\nEnd Sub\n");
        assert_eq!(classify(&form).kind, ModuleKind::FormModule);

        assert_eq!(classify(&module("Sheet3", "")).kind, ModuleKind::DocumentModule);
        assert_eq!(classify(&module("SheetData", "")).kind, ModuleKind::StandardModule);
    }

    #[test]
    fn origin_then_nonprocedural_then_default() {
        let cell = RawModule::new("VBA", "Sub A()\nEnd Sub\n", ModuleOrigin::EmbeddedCell);
        assert_eq!(classify(&cell), Classification::certain(ModuleKind::CellEmbedded));

        let nonproc = module("Unknown", "Sub A()\nEnd Sub\n").with_type_hint("nonprocedural");
        assert_eq!(classify(&nonproc).kind, ModuleKind::ClassModule);

        let plain = classify(&module("Module1", "Sub A()\nEnd Sub\n"));
        assert_eq!(plain.kind, ModuleKind::StandardModule);
        assert_eq!(plain.notes.len(), 1);
        assert_eq!(plain.notes[0].code, NoteCode::LowConfidenceClassification);
    }
}
