use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::note::TranslationNote;

/// Container format detected from signature bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContainerFormat {
    /// OLE / MS-CFB compound file (`.xls`, `.xla`, a bare `vbaProject.bin`).
    CompoundBinary,
    /// ZIP package (`.xlsm`, `.xlam`, `.xlsx`, `.xlsb`).
    Archive,
    /// A raw BIFF record stream without a compound-file wrapper.
    LegacyRecordStream,
    Unknown,
}

impl ContainerFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ContainerFormat::CompoundBinary => "compoundBinary",
            ContainerFormat::Archive => "archive",
            ContainerFormat::LegacyRecordStream => "legacyRecordStream",
            ContainerFormat::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a module's source text was recovered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModuleOrigin {
    CompoundProject,
    ArchiveProject,
    EmbeddedCell,
}

/// Closed set of module kinds. Classification always resolves to one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModuleKind {
    StandardModule,
    ClassModule,
    FormModule,
    DocumentModule,
    CellEmbedded,
}

impl ModuleKind {
    /// Human-readable label used in generated docstrings.
    pub fn label(self) -> &'static str {
        match self {
            ModuleKind::StandardModule => "standard module",
            ModuleKind::ClassModule => "class module",
            ModuleKind::FormModule => "form module",
            ModuleKind::DocumentModule => "document module",
            ModuleKind::CellEmbedded => "cell-embedded module",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One named unit of macro source recovered from a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawModule {
    pub name: String,
    /// Container-level type declaration (`standard`, `class`, `document`, `form`,
    /// `nonprocedural`), when the container records one.
    pub declared_type_hint: Option<String>,
    pub source_text: String,
    pub origin: ModuleOrigin,
    /// `Attribute` lines found in the source, keyed by attribute name.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Notes raised while recovering the module (renames, ambiguous boundaries).
    #[serde(default)]
    pub notes: Vec<TranslationNote>,
}

impl RawModule {
    pub fn new(name: impl Into<String>, source_text: impl Into<String>, origin: ModuleOrigin) -> Self {
        Self {
            name: name.into(),
            declared_type_hint: None,
            source_text: source_text.into(),
            origin,
            attributes: BTreeMap::new(),
            notes: Vec::new(),
        }
    }

    pub fn with_type_hint(mut self, hint: impl Into<String>) -> Self {
        self.declared_type_hint = Some(hint.into());
        self
    }

    /// Case-insensitive attribute lookup (`VB_Base`, `VB_Exposed`, ...).
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A formula found in a worksheet cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaRecord {
    pub sheet: String,
    pub cell_address: String,
    pub formula_text: String,
    pub referenced_functions: BTreeSet<String>,
}
