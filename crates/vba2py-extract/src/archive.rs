use std::io::{Cursor, Read};

use vba2py_model::{ModuleOrigin, NoteCode};
use zip::ZipArchive;

use crate::cells::{archive_sheet_text, scan_sheets};
use crate::project::{open_compound, read_projects};
use crate::{ExtractError, ExtractOptions, ModuleFailure, Recovered};

/// Whether a ZIP entry name is a macro project part (`xl/vbaProject.bin` and friends).
pub(crate) fn is_vba_project_entry(name: &str) -> bool {
    let name = name.trim_start_matches('/').replace('\\', "/");
    name.rsplit('/')
        .next()
        .is_some_and(|file| file.eq_ignore_ascii_case("vbaProject.bin"))
}

pub(crate) fn read_archive(bytes: &[u8], options: &ExtractOptions) -> Result<Recovered, ExtractError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|e| ExtractError::ContainerFormat {
        reason: format!("archive central directory is unreadable: {e}"),
    })?;

    let mut entries: Vec<String> = archive
        .file_names()
        .filter(|name| is_vba_project_entry(name))
        .map(str::to_string)
        .collect();
    entries.sort();

    let mut recovered = Recovered::default();
    for entry_name in &entries {
        log::debug!("reading macro project entry `{entry_name}`");
        let project = match read_entry(&mut archive, entry_name, options.max_input_bytes) {
            Ok(project) => project,
            Err(message) => {
                recovered.failures.push(ModuleFailure {
                    name: entry_name.clone(),
                    origin: ModuleOrigin::ArchiveProject,
                    code: NoteCode::ContainerFormat,
                    message,
                });
                continue;
            }
        };
        let found = open_compound(&project)
            .ok()
            .and_then(|mut ole| read_projects(&mut ole, ModuleOrigin::ArchiveProject, options));
        match found {
            Some(found) => recovered.extend(found),
            None => recovered.failures.push(ModuleFailure {
                name: entry_name.clone(),
                origin: ModuleOrigin::ArchiveProject,
                code: NoteCode::ContainerFormat,
                message: format!("`{entry_name}` is not a readable VBA project"),
            }),
        }
    }

    if entries.is_empty() && options.scan_cells {
        log::debug!("archive has no macro project; scanning worksheets");
        recovered.modules = scan_sheets(archive_sheet_text(bytes)?, options);
    }
    Ok(recovered)
}

/// Reads one entry to its end, capped at `cap` bytes; the size in the central directory is not
/// trusted.
fn read_entry(archive: &mut ZipArchive<Cursor<&[u8]>>, name: &str, cap: usize) -> Result<Vec<u8>, String> {
    let entry = archive.by_name(name).map_err(|e| e.to_string())?;
    let mut out = Vec::new();
    entry
        .take(cap as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| e.to_string())?;
    if out.len() > cap {
        return Err(format!("`{name}` exceeds the {cap}-byte input limit"));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_project_entries_anywhere() {
        assert!(is_vba_project_entry("xl/vbaProject.bin"));
        assert!(is_vba_project_entry("/XL/VBAPROJECT.BIN"));
        assert!(is_vba_project_entry("word\\vbaProject.bin"));
        assert!(is_vba_project_entry("vbaProject.bin"));
        assert!(!is_vba_project_entry("xl/vbaProjectSignature.bin"));
        assert!(!is_vba_project_entry("xl/workbook.xml"));
    }
}
