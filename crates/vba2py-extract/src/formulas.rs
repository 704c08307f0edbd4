use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Reader};
use vba2py_model::{ContainerFormat, FormulaRecord};
use vba2py_syntax::formula_functions;

use crate::detect::detect_format;
use crate::ExtractError;

/// Lists the cell formulas of a workbook.
///
/// Only archive workbooks are read; legacy binary workbooks store formulas as parsed tokens and
/// yield an empty list.
pub fn extract_formulas(bytes: &[u8]) -> Result<Vec<FormulaRecord>, ExtractError> {
    match detect_format(bytes) {
        ContainerFormat::Archive => {}
        ContainerFormat::Unknown => return Err(ExtractError::AmbiguousFormat),
        format => {
            log::debug!("{format} workbook: formula text is not recoverable");
            return Ok(Vec::new());
        }
    }

    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).map_err(|e| {
        ExtractError::ContainerFormat {
            reason: format!("workbook is unreadable: {e}"),
        }
    })?;

    let mut out = Vec::new();
    for sheet in workbook.sheet_names() {
        let range = match workbook.worksheet_formula(&sheet) {
            Ok(range) => range,
            Err(err) => {
                log::warn!("skipping formulas of sheet `{sheet}`: {err}");
                continue;
            }
        };
        let (row0, col0) = range.start().unwrap_or((0, 0));
        for (r, c, text) in range.used_cells() {
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            let formula_text = if text.starts_with('=') {
                text.to_string()
            } else {
                format!("={text}")
            };
            out.push(FormulaRecord {
                sheet: sheet.clone(),
                cell_address: a1_address(row0 + r as u32, col0 + c as u32),
                referenced_functions: formula_functions(&formula_text),
                formula_text,
            });
        }
    }
    Ok(out)
}

/// `A1`-style address of a 0-based cell position.
pub fn a1_address(row: u32, col: u32) -> String {
    format!("{}{}", column_letters(col), row + 1)
}

pub fn column_letters(col: u32) -> String {
    let mut n = col + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.iter().rev().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_a1_addresses() {
        assert_eq!(a1_address(0, 0), "A1");
        assert_eq!(a1_address(9, 25), "Z10");
        assert_eq!(a1_address(0, 26), "AA1");
        assert_eq!(a1_address(4, 702), "AAA5");
    }

    #[test]
    fn legacy_and_unknown_inputs() {
        let mut ole = vec![0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
        ole.resize(64, 0);
        assert!(extract_formulas(&ole).unwrap().is_empty());
        assert!(matches!(extract_formulas(b"plain text"), Err(ExtractError::AmbiguousFormat)));
    }
}
