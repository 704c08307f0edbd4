use pretty_assertions::assert_eq;
use vba2py_model::{ModuleKind, ModuleOrigin, NoteCode, RawModule, Severity};
use vba2py_transpile::{convert, convert_batch, BatchOptions, ConvertOptions, MappingTables};

const LEDGER: &str = include_str!("fixtures/ledger.bas");
const ACCOUNT: &str = include_str!("fixtures/account.cls");
const UNTERMINATED: &str = include_str!("fixtures/unterminated.bas");

fn standard(name: &str, source: &str) -> RawModule {
    RawModule::new(name, source, ModuleOrigin::CompoundProject).with_type_hint("standard")
}

fn defs(code: &str) -> Vec<&str> {
    code.lines()
        .filter(|l| l.starts_with("def ") && !l.starts_with("def _"))
        .collect()
}

/// Wraps a body in a procedure that declares `s` and `i`.
fn in_sub(body: &str) -> RawModule {
    standard(
        "Snippet",
        &format!("Sub Snippet()\n    Dim s As String\n    Dim i As Long\n{body}\nEnd Sub\n"),
    )
}

#[test]
fn every_procedure_becomes_one_def() {
    let result = convert(&standard("Ledger", LEDGER), ModuleKind::StandardModule);
    assert!(result.success, "{:?}", result.notes);
    let defs = defs(&result.generated_code);
    assert_eq!(defs.len(), 3, "{}", result.generated_code);
    assert!(defs[0].starts_with("def gross(net: float) -> float:"));
    assert!(defs[1].starts_with("def initials("));
    assert!(defs[2].starts_with("def report("));
    assert!(result.generated_code.to_lowercase().contains("tax_rate"), "{}", result.generated_code);
}

#[test]
fn literal_mid_start_is_folded_without_notes() {
    let result = convert(&in_sub("    s = Mid(s, 4, 3)"), ModuleKind::StandardModule);
    assert!(result.success);
    assert!(result.generated_code.contains("s = s[3:6]"), "{}", result.generated_code);
    assert_eq!(result.notes, Vec::new());
}

#[test]
fn dynamic_mid_start_is_noted_once() {
    let result = convert(&in_sub("    s = Mid(s, i, 3)"), ModuleKind::StandardModule);
    assert!(result.success);
    assert!(result.generated_code.contains("s = s[i - 1:i + 2]"), "{}", result.generated_code);
    assert_eq!(result.notes_with_code(NoteCode::IndexAdjustment).count(), 1);
}

#[test]
fn unmapped_builtin_is_kept_as_a_comment() {
    let result = convert(&in_sub("    s = Shell(\"notepad\")"), ModuleKind::StandardModule);
    assert!(result.success);
    assert!(
        result.generated_code.contains("# [untranslated] s = Shell(\"notepad\")"),
        "{}",
        result.generated_code
    );
    let unknown: Vec<_> = result.notes_with_code(NoteCode::UnknownConstruct).collect();
    assert_eq!(unknown.len(), 1);
    assert_eq!(unknown[0].severity, Severity::Warning);
    assert_eq!(unknown[0].source_line, Some(4));
}

#[test]
fn the_rest_of_the_procedure_survives_an_untranslated_statement() {
    let result = convert(
        &in_sub("    i = 1\n    s = Shell(\"notepad\")\n    i = i + 1"),
        ModuleKind::StandardModule,
    );
    let code = &result.generated_code;
    assert!(code.contains("i = 1\n"), "{code}");
    assert!(code.contains("i = i + 1"), "{code}");
}

#[test]
fn unterminated_module_fails_with_a_located_note() {
    let result = convert(&standard("Broken", UNTERMINATED), ModuleKind::StandardModule);
    assert!(!result.success);
    assert!(result.generated_code.is_empty());
    assert!(result.has_warnings());
    let note = &result.notes[result.notes.len() - 1];
    assert_eq!(note.code, NoteCode::UnterminatedBlock);
    assert_eq!(note.source_line, Some(3));
}

#[test]
fn a_broken_module_does_not_affect_its_siblings() {
    let modules = vec![standard("Ledger", LEDGER), standard("Broken", UNTERMINATED)];
    let results = convert_batch(
        &modules,
        MappingTables::standard(),
        &ConvertOptions::default(),
        &BatchOptions::default(),
    );
    assert_eq!(results.len(), 2);
    assert!(results[0].success);
    assert_eq!(results[0].module_name, "Ledger");
    assert!(!results[1].success);
    assert_eq!(results[1].module_name, "Broken");
}

#[test]
fn conversion_is_deterministic() {
    let module = standard("Ledger", LEDGER);
    let first = convert(&module, ModuleKind::StandardModule);
    for _ in 0..5 {
        assert_eq!(convert(&module, ModuleKind::StandardModule), first);
    }
}

#[test]
fn class_module_becomes_a_class_with_a_property() {
    let module = RawModule::new("Account", ACCOUNT, ModuleOrigin::ArchiveProject).with_type_hint("class");
    let result = convert(&module, ModuleKind::ClassModule);
    assert!(result.success, "{:?}", result.notes);
    let code = &result.generated_code;
    assert!(code.contains("\nclass Account:\n"), "{code}");
    assert!(code.contains("    def __init__(self) -> None:\n"), "{code}");
    assert!(code.contains(": float = 0.0"), "{code}");
    assert!(code.contains("    @property\n    def Balance(self) -> float:"), "{code}");
    assert!(code.contains("    @Balance.setter\n    def Balance(self, value: float)"), "{code}");
    assert!(code.contains("    def Deposit(self, amount: float)"), "{code}");
    assert!(!code.contains("VERSION"), "{code}");
}

#[test]
fn indent_width_is_honoured() {
    let options = ConvertOptions {
        indent_width: 2,
        ..ConvertOptions::default()
    };
    let result = vba2py_transpile::convert_with(
        &standard("Ledger", LEDGER),
        ModuleKind::StandardModule,
        MappingTables::standard(),
        &options,
    );
    let code = &result.generated_code;
    assert!(code.contains("\n  _result: float = 0.0\n"), "{code}");
    assert!(!code.contains("\n    _result: float"), "{code}");
}

#[test]
fn like_operator_pulls_in_its_helper() {
    let result = convert(&in_sub("    If s Like \"A#*\" Then i = 1"), ModuleKind::StandardModule);
    assert!(result.success, "{:?}", result.notes);
    let code = &result.generated_code;
    assert!(code.contains("import re\n"), "{code}");
    assert!(code.contains("def _like(text, pattern):"), "{code}");
    assert!(code.contains("if _like(s, \"A#*\"):"), "{code}");
}

#[test]
fn do_loop_conditions_keep_a_single_negation() {
    let result = convert(
        &in_sub("    Do\n        i = i + 1\n    Loop Until i > 10\n    Do Until i = 0\n        i = i - 1\n    Loop\n    Do\n        i = i + 1\n    Loop While i < 5"),
        ModuleKind::StandardModule,
    );
    assert!(result.success, "{:?}", result.notes);
    let code = &result.generated_code;
    assert!(code.contains("        if i > 10:\n            break\n"), "{code}");
    assert!(code.contains("    while not i == 0:\n"), "{code}");
    assert!(code.contains("        if not i < 5:\n            break\n"), "{code}");
    assert!(!code.contains("not not"), "{code}");
}
