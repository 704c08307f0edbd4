//! Recovery of VBA module source from workbook containers.
//!
//! [`extract`] detects the container from its signature and runs, in order, the compound-file
//! project reader, the archive project reader and, when no macro project exists, the
//! cell-embedded scanner. Failures scoped to one module are reported as [`ModuleFailure`] values;
//! only a container that yields nothing at all is an error.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vba2py_model::{ContainerFormat, ModuleOrigin, NoteCode, RawModule, TranslationNote};

mod archive;
pub mod biff;
mod cells;
pub mod compression;
pub mod detect;
pub mod dir;
mod formulas;
mod project;

pub use cells::{is_macro_sheet_name, DEFAULT_MACRO_SHEET_NAMES};
pub use compression::{compress_container, decompress_container, CompressionError};
pub use detect::{detect_format, detect_with_name, Detection, SourceContainer};
pub use dir::DirError;
pub use formulas::{a1_address, column_letters, extract_formulas};

/// Default input cap: 50 MiB.
pub const DEFAULT_MAX_INPUT_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractOptions {
    pub max_input_bytes: usize,
    /// Decompressed output may be at most this many times the compressed input.
    pub max_expansion_ratio: usize,
    pub macro_sheet_names: Vec<String>,
    /// Run the cell-embedded scanner when a container has no macro project.
    pub scan_cells: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
            max_expansion_ratio: compression::DEFAULT_EXPANSION_RATIO,
            macro_sheet_names: DEFAULT_MACRO_SHEET_NAMES.iter().map(|s| s.to_string()).collect(),
            scan_cells: true,
        }
    }
}

/// Whole-container failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("input matches no known workbook signature")]
    AmbiguousFormat,
    #[error("container format error: {reason}")]
    ContainerFormat { reason: String },
    #[error("input is {size} bytes, above the {limit}-byte limit")]
    InputTooLarge { size: usize, limit: usize },
}

/// Why a single module (or a whole project directory) could not be recovered.
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("corrupt stream: {0}")]
    CorruptStream(#[from] CompressionError),
    #[error("unreadable dir stream: {0}")]
    Directory(#[from] DirError),
    #[error("missing stream `{0}`")]
    MissingStream(String),
    #[error("text offset {offset} is past the end of a {len}-byte stream")]
    BadTextOffset { offset: usize, len: usize },
    #[error("failed to read stream `{stream}`: {source}")]
    Io {
        stream: String,
        #[source]
        source: std::io::Error,
    },
}

impl ModuleError {
    pub fn note_code(&self) -> NoteCode {
        match self {
            ModuleError::CorruptStream(_) => NoteCode::CorruptStream,
            _ => NoteCode::ContainerFormat,
        }
    }
}

/// A module the extractors found but could not recover. Other modules are unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleFailure {
    pub name: String,
    pub origin: ModuleOrigin,
    /// [`NoteCode::CorruptStream`] or [`NoteCode::ContainerFormat`].
    pub code: NoteCode,
    pub message: String,
}

impl ModuleFailure {
    pub fn from_error(name: impl Into<String>, origin: ModuleOrigin, err: &ModuleError) -> Self {
        Self {
            name: name.into(),
            origin,
            code: err.note_code(),
            message: err.to_string(),
        }
    }

    pub fn note(&self) -> TranslationNote {
        TranslationNote::warning(self.code, self.message.clone())
    }
}

#[derive(Debug, Default)]
pub(crate) struct Recovered {
    pub(crate) modules: Vec<RawModule>,
    pub(crate) failures: Vec<ModuleFailure>,
}

impl Recovered {
    fn extend(&mut self, other: Recovered) {
        self.modules.extend(other.modules);
        self.failures.extend(other.failures);
    }

    fn is_empty(&self) -> bool {
        self.modules.is_empty() && self.failures.is_empty()
    }
}

/// Everything recovered from one container, in discovery order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Extraction {
    pub format: ContainerFormat,
    pub modules: Vec<RawModule>,
    pub failures: Vec<ModuleFailure>,
}

/// [`extract_with_options`] with default limits.
pub fn extract(bytes: &[u8]) -> Result<Extraction, ExtractError> {
    extract_with_options(bytes, &ExtractOptions::default())
}

pub fn extract_with_options(bytes: &[u8], options: &ExtractOptions) -> Result<Extraction, ExtractError> {
    if bytes.len() > options.max_input_bytes {
        return Err(ExtractError::InputTooLarge {
            size: bytes.len(),
            limit: options.max_input_bytes,
        });
    }

    let format = detect_format(bytes);
    log::debug!("detected {format} container ({} bytes)", bytes.len());
    let mut recovered = match format {
        ContainerFormat::CompoundBinary => read_compound(bytes, options)?,
        ContainerFormat::Archive => archive::read_archive(bytes, options)?,
        ContainerFormat::LegacyRecordStream => Recovered {
            modules: scan_biff(bytes, options)?,
            failures: Vec::new(),
        },
        ContainerFormat::Unknown => return Err(ExtractError::AmbiguousFormat),
    };

    if recovered.is_empty() {
        return Err(ExtractError::ContainerFormat {
            reason: format!("no macro source found in {format} container"),
        });
    }

    dedupe_module_names(&mut recovered.modules);
    Ok(Extraction {
        format,
        modules: recovered.modules,
        failures: recovered.failures,
    })
}

fn read_compound(bytes: &[u8], options: &ExtractOptions) -> Result<Recovered, ExtractError> {
    let mut ole = project::open_compound(bytes)?;
    if let Some(found) = project::read_projects(&mut ole, ModuleOrigin::CompoundProject, options) {
        return Ok(found);
    }
    if !options.scan_cells {
        return Ok(Recovered::default());
    }

    let Some(stream_name) = ["/Workbook", "/Book"].into_iter().find(|p| ole.is_stream(p)) else {
        log::debug!("compound file has neither a VBA project nor a workbook stream");
        return Ok(Recovered::default());
    };
    let mut stream = Vec::new();
    ole.open_stream(stream_name)
        .and_then(|s| s.take(options.max_input_bytes as u64).read_to_end(&mut stream))
        .map_err(|e| ExtractError::ContainerFormat {
            reason: format!("cannot read `{stream_name}` stream: {e}"),
        })?;
    Ok(Recovered {
        modules: scan_biff(&stream, options)?,
        failures: Vec::new(),
    })
}

fn scan_biff(stream: &[u8], options: &ExtractOptions) -> Result<Vec<RawModule>, ExtractError> {
    if !options.scan_cells {
        return Ok(Vec::new());
    }
    let sheets = biff::read_sheet_strings(stream).map_err(|reason| ExtractError::ContainerFormat { reason })?;
    Ok(cells::scan_sheets(sheets.into_iter().map(Into::into).collect(), options))
}

/// Makes module names unique (case-insensitively) by appending `_2`, `_3`, ... to later
/// duplicates, recording a `NameCollision` note on each renamed module.
pub fn dedupe_module_names(modules: &mut [RawModule]) {
    let originals: BTreeSet<String> = modules.iter().map(|m| m.name.to_lowercase()).collect();
    let mut used = BTreeSet::new();
    let mut suffixes: BTreeMap<String, usize> = BTreeMap::new();
    for module in modules.iter_mut() {
        if module.name.trim().is_empty() {
            module.name = "Module".to_string();
        }
        let key = module.name.to_lowercase();
        if used.insert(key.clone()) {
            continue;
        }
        let suffix = suffixes.entry(key).or_insert(1);
        let renamed = loop {
            *suffix += 1;
            let candidate = format!("{}_{}", module.name, suffix);
            let lower = candidate.to_lowercase();
            if !used.contains(&lower) && !originals.contains(&lower) {
                break candidate;
            }
        };
        log::debug!("renaming duplicate module `{}` to `{renamed}`", module.name);
        module.notes.push(TranslationNote::info(
            NoteCode::NameCollision,
            format!("module name `{}` is already used; renamed to `{renamed}`", module.name),
        ));
        used.insert(renamed.to_lowercase());
        module.name = renamed;
    }
}
