use serde::{Deserialize, Serialize};

use crate::module::ModuleKind;
use crate::note::{NoteCode, Severity, TranslationNote};

/// Outcome of converting one module or formula.
///
/// Failures are local: a failed result has `success == false`, no generated code and at least
/// one Warning note saying why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResult {
    pub module_name: String,
    /// `None` for formula conversions and for modules that never reached classification.
    pub kind: Option<ModuleKind>,
    pub generated_code: String,
    pub notes: Vec<TranslationNote>,
    pub success: bool,
}

impl ConversionResult {
    pub fn failed(module_name: impl Into<String>, kind: Option<ModuleKind>, note: TranslationNote) -> Self {
        Self {
            module_name: module_name.into(),
            kind,
            generated_code: String::new(),
            notes: vec![note],
            success: false,
        }
    }

    pub fn notes_with(&self, severity: Severity) -> impl Iterator<Item = &TranslationNote> {
        self.notes.iter().filter(move |n| n.severity == severity)
    }

    pub fn notes_with_code(&self, code: NoteCode) -> impl Iterator<Item = &TranslationNote> {
        self.notes.iter().filter(move |n| n.code == code)
    }

    pub fn has_warnings(&self) -> bool {
        self.notes_with(Severity::Warning).next().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn serializes_with_camel_case_fields() {
        let result = ConversionResult::failed(
            "Module1",
            Some(ModuleKind::StandardModule),
            TranslationNote::warning(NoteCode::UnterminatedBlock, "`For` is never closed").at_line(3),
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["moduleName"], "Module1");
        assert_eq!(json["kind"], "standardModule");
        assert_eq!(json["success"], false);
        assert_eq!(json["notes"][0]["code"], "unterminatedBlock");
        assert_eq!(json["notes"][0]["sourceLine"], 3);
    }

    #[test]
    fn filters_notes_by_severity_and_code() {
        let mut result = ConversionResult {
            module_name: "m".to_string(),
            kind: None,
            generated_code: String::new(),
            notes: Vec::new(),
            success: true,
        };
        result.notes.push(TranslationNote::info(NoteCode::IndexAdjustment, "shifted"));
        result.notes.push(TranslationNote::warning(NoteCode::UnknownConstruct, "skipped"));

        assert!(result.has_warnings());
        assert_eq!(result.notes_with(Severity::Info).count(), 1);
        assert_eq!(result.notes_with_code(NoteCode::UnknownConstruct).count(), 1);
    }
}
