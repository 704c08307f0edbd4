mod common;

use common::{build_vba_project, build_xls, build_xlsx, FixtureModule, XlsxCell};
use pretty_assertions::assert_eq;
use vba2py_extract::{extract, extract_formulas, ExtractError};
use vba2py_model::{ContainerFormat, ModuleOrigin, NoteCode};

fn three_module_project(root: &str) -> Vec<u8> {
    build_vba_project(
        root,
        &[
            FixtureModule::standard("Module1", "Sub Main()\n    MsgBox \"hi\"\nEnd Sub\n"),
            FixtureModule::class(
                "Policy",
                "Private mRate As Double\nPublic Property Get Rate() As Double\n    Rate = mRate\nEnd Property\n",
            ),
            FixtureModule::document("ThisWorkbook", "Private Sub Workbook_Open()\nEnd Sub\n"),
        ],
    )
}

#[test]
fn compound_project_yields_one_named_module_per_entry() {
    let extraction = extract(&three_module_project("")).unwrap();
    assert_eq!(extraction.format, ContainerFormat::CompoundBinary);
    assert!(extraction.failures.is_empty());

    let summary: Vec<_> = extraction
        .modules
        .iter()
        .map(|m| (m.name.as_str(), m.declared_type_hint.as_deref(), m.origin))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("Module1", Some("standard"), ModuleOrigin::CompoundProject),
            ("Policy", Some("class"), ModuleOrigin::CompoundProject),
            ("ThisWorkbook", Some("document"), ModuleOrigin::CompoundProject),
        ]
    );
    assert_eq!(
        extraction.modules[0].source_text,
        "Sub Main()\n    MsgBox \"hi\"\nEnd Sub\n"
    );
}

#[test]
fn finds_projects_nested_in_legacy_workbook_storage() {
    let extraction = extract(&three_module_project("_VBA_PROJECT_CUR")).unwrap();
    assert_eq!(extraction.modules.len(), 3);
}

#[test]
fn corrupt_module_fails_alone() {
    let bytes = build_vba_project(
        "",
        &[
            FixtureModule::standard("Good", "Sub A()\nEnd Sub\n"),
            FixtureModule::standard("Bad", "Sub B()\nEnd Sub\n").corrupted(vec![0x01, 0x10, 0x00, 0xFF]),
        ],
    );
    let extraction = extract(&bytes).unwrap();
    assert_eq!(extraction.modules.len(), 1);
    assert_eq!(extraction.modules[0].name, "Good");
    assert_eq!(extraction.failures.len(), 1);
    assert_eq!(extraction.failures[0].name, "Bad");
    assert_eq!(extraction.failures[0].code, NoteCode::CorruptStream);
}

#[test]
fn decompression_bomb_is_a_corrupt_stream() {
    let bomb = vba2py_extract::compress_container(&vec![b' '; 4096 * 64]);
    let bytes = build_vba_project(
        "",
        &[FixtureModule::standard("Bomb", "").corrupted(bomb)],
    );
    let extraction = extract(&bytes).unwrap();
    assert!(extraction.modules.is_empty());
    assert_eq!(extraction.failures[0].code, NoteCode::CorruptStream);
}

#[test]
fn archive_project_is_read_from_its_entry() {
    let project = three_module_project("");
    let bytes = build_xlsx(&[("Sheet1", vec![XlsxCell::Text("data")])], Some(&project));
    let extraction = extract(&bytes).unwrap();
    assert_eq!(extraction.format, ContainerFormat::Archive);
    let names: Vec<_> = extraction.modules.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["Module1", "Policy", "ThisWorkbook"]);
    assert!(extraction
        .modules
        .iter()
        .all(|m| m.origin == ModuleOrigin::ArchiveProject));
}

#[test]
fn archive_without_project_falls_back_to_macro_sheets() {
    let bytes = build_xlsx(
        &[
            ("Data", vec![XlsxCell::Text("Sub Hidden()"), XlsxCell::Text("End Sub")]),
            (
                "VBA",
                vec![
                    XlsxCell::Text("Option Explicit"),
                    XlsxCell::Text("Sub Report()\n    Debug.Print 1\nEnd Sub"),
                ],
            ),
        ],
        None,
    );
    let extraction = extract(&bytes).unwrap();
    assert_eq!(extraction.modules.len(), 1);
    let module = &extraction.modules[0];
    assert_eq!(module.name, "VBA");
    assert_eq!(module.origin, ModuleOrigin::EmbeddedCell);
    assert_eq!(
        module.source_text,
        "Option Explicit\nSub Report()\n    Debug.Print 1\nEnd Sub\n"
    );
}

#[test]
fn legacy_workbook_cells_are_split_and_deduplicated() {
    let bytes = build_xls(&[(
        "Macros",
        vec![
            "Option Explicit",
            "Sub A()",
            "End Sub",
            "Option Explicit",
            "Sub B()",
            "End Sub",
        ],
    )]);
    let extraction = extract(&bytes).unwrap();
    assert_eq!(extraction.format, ContainerFormat::CompoundBinary);
    let names: Vec<_> = extraction.modules.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["Macros", "Macros_2"]);
    assert!(extraction.modules[0].notes.is_empty());
    assert_eq!(extraction.modules[1].notes[0].code, NoteCode::NameCollision);
    assert_eq!(extraction.modules[1].source_text, "Option Explicit\nSub B()\nEnd Sub\n");
}

#[test]
fn container_without_any_macro_source_is_an_error() {
    let bytes = build_xls(&[("Sheet1", vec!["Quarterly totals"])]);
    assert!(matches!(
        extract(&bytes),
        Err(ExtractError::ContainerFormat { .. })
    ));
    assert_eq!(extract(b"\x00\x01garbage"), Err(ExtractError::AmbiguousFormat));
}

#[test]
fn lists_archive_formulas_with_their_functions() {
    let bytes = build_xlsx(
        &[(
            "Calc",
            vec![
                XlsxCell::Text("label"),
                XlsxCell::Formula("SUM(A1:A3)*2"),
                XlsxCell::Formula("IF(A1>0,ROUND(A2,1),0)"),
            ],
        )],
        None,
    );
    let formulas = extract_formulas(&bytes).unwrap();
    let summary: Vec<_> = formulas
        .iter()
        .map(|f| {
            (
                f.cell_address.as_str(),
                f.formula_text.as_str(),
                f.referenced_functions.iter().cloned().collect::<Vec<_>>(),
            )
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            ("A2", "=SUM(A1:A3)*2", vec!["SUM".to_string()]),
            (
                "A3",
                "=IF(A1>0,ROUND(A2,1),0)",
                vec!["IF".to_string(), "ROUND".to_string()]
            ),
        ]
    );
    assert!(formulas.iter().all(|f| f.sheet == "Calc"));
}
