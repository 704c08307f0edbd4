use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use vba2py_model::{ModuleOrigin, NoteCode, RawModule, TranslationNote};
use vba2py_syntax::{looks_like_macro_source, scan_module_boundaries};

use crate::biff::BiffSheet;
use crate::project::build_raw_module;
use crate::{ExtractError, ExtractOptions};

/// Sheet names scanned for pasted macro source when nothing else is configured.
pub const DEFAULT_MACRO_SHEET_NAMES: &[&str] =
    &["VBA", "VBA_Code", "VBACode", "Macro", "Macros", "Code", "Modules"];

/// Text cells of one worksheet, as `(row, col, text)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct SheetText {
    pub(crate) name: String,
    pub(crate) cells: Vec<(u32, u32, String)>,
}

impl From<BiffSheet> for SheetText {
    fn from(sheet: BiffSheet) -> Self {
        Self {
            name: sheet.name,
            cells: sheet.cells.into_iter().map(|c| (c.row, c.col, c.text)).collect(),
        }
    }
}

/// Whether a sheet is one of the designated macro sheets.
pub fn is_macro_sheet_name(name: &str, configured: &[String]) -> bool {
    let name = name.trim();
    if configured.iter().any(|c| c.eq_ignore_ascii_case(name)) {
        return true;
    }
    let lower = name.to_ascii_lowercase();
    lower.starts_with("vba") || lower.starts_with("macro")
}

/// String cells of every sheet of an archive workbook, read through calamine.
pub(crate) fn archive_sheet_text(bytes: &[u8]) -> Result<Vec<SheetText>, ExtractError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).map_err(|e| {
        ExtractError::ContainerFormat {
            reason: format!("workbook is unreadable: {e}"),
        }
    })?;
    let mut out = Vec::new();
    for name in workbook.sheet_names() {
        let range = match workbook.worksheet_range(&name) {
            Ok(range) => range,
            Err(err) => {
                log::warn!("skipping sheet `{name}`: {err}");
                continue;
            }
        };
        let (row0, col0) = range.start().unwrap_or((0, 0));
        let cells = range
            .used_cells()
            .filter_map(|(r, c, data)| match data {
                Data::String(s) => Some((row0 + r as u32, col0 + c as u32, s.clone())),
                _ => None,
            })
            .collect();
        out.push(SheetText { name, cells });
    }
    Ok(out)
}

/// Reconstructs modules from macro source pasted into designated worksheets.
pub(crate) fn scan_sheets(sheets: Vec<SheetText>, options: &ExtractOptions) -> Vec<RawModule> {
    let mut modules = Vec::new();
    for sheet in sheets {
        if !is_macro_sheet_name(&sheet.name, &options.macro_sheet_names) {
            continue;
        }
        let text = sheet_source(sheet.cells);
        if !looks_like_macro_source(&text) {
            log::debug!("sheet `{}` has no macro-like text", sheet.name);
            continue;
        }
        log::debug!("scanning sheet `{}` for embedded modules", sheet.name);
        modules.extend(split_sheet_source(&sheet.name, &text));
    }
    modules
}

/// Cells in row-major order, one line per cell.
fn sheet_source(mut cells: Vec<(u32, u32, String)>) -> String {
    cells.sort_by_key(|&(row, col, _)| (row, col));
    let mut out = String::new();
    for (_, _, text) in cells {
        let text = text.replace("\r\n", "\n").replace('\r', "\n");
        if text.trim().is_empty() {
            continue;
        }
        out.push_str(text.trim_end_matches('\n'));
        out.push('\n');
    }
    out
}

fn split_sheet_source(sheet_name: &str, text: &str) -> Vec<RawModule> {
    let boundaries = scan_module_boundaries(text);
    let lines: Vec<&str> = text.lines().collect();
    let mut out = Vec::new();

    for segment in &boundaries.segments {
        let first = segment.first_line.saturating_sub(1);
        let last = segment.last_line.min(lines.len());
        if first >= last {
            continue;
        }
        let mut body = lines[first..last].join("\n");
        body.push('\n');
        let mut module = build_raw_module(sheet_name, &body, ModuleOrigin::EmbeddedCell, None);

        if let Some(open) = boundaries.unterminated_from {
            if (segment.first_line..=segment.last_line).contains(&open) {
                let marker_lines = usize::from(segment.declared_name.is_some());
                let line = open - segment.first_line + 1 - marker_lines;
                log::warn!(
                    "sheet `{sheet_name}`: procedure opened on line {open} is never closed; keeping the rest as one module"
                );
                module.notes.push(
                    TranslationNote::warning(
                        NoteCode::AmbiguousModuleBoundary,
                        format!(
                            "procedure opened here is never closed; the rest of sheet `{sheet_name}` was kept as one module"
                        ),
                    )
                    .at_line(line),
                );
            }
        }
        out.push(module);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cells(texts: &[&str]) -> Vec<(u32, u32, String)> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| (i as u32, 0, t.to_string()))
            .collect()
    }

    fn default_names() -> Vec<String> {
        DEFAULT_MACRO_SHEET_NAMES.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn recognizes_designated_sheet_names() {
        let names = default_names();
        assert!(is_macro_sheet_name("vba_code", &names));
        assert!(is_macro_sheet_name("Macros2", &names));
        assert!(is_macro_sheet_name("VBAModules", &names));
        assert!(is_macro_sheet_name("Code", &names));
        assert!(!is_macro_sheet_name("Sheet1", &names));
    }

    #[test]
    fn orders_cells_row_major() {
        let text = sheet_source(vec![
            (1, 0, "End Sub".to_string()),
            (0, 1, "' header".to_string()),
            (0, 0, "Sub A()".to_string()),
            (2, 0, "   ".to_string()),
        ]);
        assert_eq!(text, "Sub A()\n' header\nEnd Sub\n");
    }

    #[test]
    fn splits_named_modules_inside_one_sheet() {
        let sheets = vec![SheetText {
            name: "VBA".to_string(),
            cells: cells(&[
                "Attribute VB_Name = \"Pricing\"",
                "Function Rate()\nRate = 2\nEnd Function",
                "Attribute VB_Name = \"Report\"",
                "Sub Show()",
                "End Sub",
            ]),
        }];
        let modules = scan_sheets(sheets, &ExtractOptions::default());
        let names: Vec<_> = modules.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Pricing", "Report"]);
        assert_eq!(modules[1].source_text, "Sub Show()\nEnd Sub\n");
        assert!(modules.iter().all(|m| m.origin == ModuleOrigin::EmbeddedCell));
    }

    #[test]
    fn unterminated_procedure_keeps_the_remainder_with_a_warning() {
        let sheets = vec![SheetText {
            name: "Macros".to_string(),
            cells: cells(&["Sub A()", "End Sub", "Sub B()", "x = 1"]),
        }];
        let modules = scan_sheets(sheets, &ExtractOptions::default());
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].name, "Macros");
        assert_eq!(modules[0].source_text, "Sub A()\nEnd Sub\nSub B()\nx = 1\n");
        assert_eq!(modules[0].notes.len(), 1);
        assert_eq!(modules[0].notes[0].code, NoteCode::AmbiguousModuleBoundary);
        assert_eq!(modules[0].notes[0].source_line, Some(3));
    }

    #[test]
    fn ignores_plain_data_and_other_sheets() {
        let sheets = vec![
            SheetText {
                name: "VBA".to_string(),
                cells: cells(&["Region", "North", "South"]),
            },
            SheetText {
                name: "Data".to_string(),
                cells: cells(&["Sub A()", "End Sub"]),
            },
        ];
        assert!(scan_sheets(sheets, &ExtractOptions::default()).is_empty());
    }
}
