use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    Info,
    Warning,
}

/// Machine-readable category of a [`TranslationNote`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NoteCode {
    /// A construct the transpiler does not recognize; emitted as a comment.
    UnknownConstruct,
    /// A recognized construct with no structural equivalent (`GoTo`, `Resume`, `Declare`, ...).
    Unsupported,
    /// A 1-based index was shifted with a runtime subtraction.
    IndexAdjustment,
    AmbiguousModuleBoundary,
    NameCollision,
    LowConfidenceClassification,
    ByRefParameter,
    EventHandler,
    StaticLocal,
    UnbalancedBlock,
    UnterminatedBlock,
    LexError,
    CorruptStream,
    ContainerFormat,
    BatchTimeout,
}

/// Non-fatal diagnostic attached to one module's extraction or translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationNote {
    pub severity: Severity,
    pub code: NoteCode,
    pub message: String,
    /// 1-based line in the module source, when the note is tied to one.
    pub source_line: Option<usize>,
}

impl TranslationNote {
    pub fn info(code: NoteCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            code,
            message: message.into(),
            source_line: None,
        }
    }

    pub fn warning(code: NoteCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
            source_line: None,
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.source_line = Some(line);
        self
    }
}

impl fmt::Display for TranslationNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Info => "info",
            Severity::Warning => "warning",
        };
        match self.source_line {
            Some(line) => write!(f, "{level} (line {line}): {}", self.message),
            None => write!(f, "{level}: {}", self.message),
        }
    }
}
