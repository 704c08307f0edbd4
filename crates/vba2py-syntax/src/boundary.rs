use crate::block::{classify_statement, BlockKind, StatementRole};
use crate::lexer::{tokenize_lossy, LexMode, TokenKind};
use crate::statement::{split_statements, Statement};

/// A contiguous run of lines that forms one logical module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSegment {
    /// 1-based, inclusive.
    pub first_line: usize,
    /// 1-based, inclusive.
    pub last_line: usize,
    /// Name from an `Attribute VB_Name = "..."` marker opening the segment.
    pub declared_name: Option<String>,
    /// Number of complete procedures inside the segment.
    pub procedures: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleBoundaries {
    pub segments: Vec<ModuleSegment>,
    /// Line of a procedure opener that is never closed. Everything from the enclosing segment
    /// on is kept as one module.
    pub unterminated_from: Option<usize>,
}

/// Finds module boundaries in free-form macro text (typically concatenated worksheet cells).
///
/// A new module starts at every `Attribute VB_Name` marker, and at an `Option` statement that
/// follows a completed top-level procedure (options may only precede procedures). Only
/// procedure openers and closers are matched; other blocks are ignored so that a damaged `If`
/// cannot hide a boundary.
pub fn scan_module_boundaries(source: &str) -> ModuleBoundaries {
    let tokens = tokenize_lossy(source, LexMode::Macro);
    let statements = split_statements(source, &tokens);
    let last_line = source.lines().count().max(1);

    let mut out = ModuleBoundaries::default();
    let mut current: Option<ModuleSegment> = None;
    let mut depth = 0usize;
    let mut open_line = 0usize;

    for stmt in &statements {
        if stmt.is_blank() || stmt.is_comment_only() {
            continue;
        }
        if depth == 0 {
            let marker = vb_name_marker(stmt);
            let option_after_code = stmt.first().is_some_and(|t| t.is_kw("option"))
                && current.as_ref().is_some_and(|s| s.procedures > 0);
            if marker.is_some() || option_after_code {
                if let Some(mut seg) = current.take() {
                    seg.last_line = stmt.line.saturating_sub(1).max(seg.first_line);
                    out.segments.push(seg);
                }
            }
            if current.is_none() {
                current = Some(ModuleSegment {
                    first_line: stmt.line,
                    last_line,
                    declared_name: marker,
                    procedures: 0,
                });
            }
        }

        match classify_statement(stmt) {
            StatementRole::Open(BlockKind::Procedure) => {
                if depth == 0 {
                    open_line = stmt.line;
                }
                depth += 1;
            }
            StatementRole::Close(BlockKind::Procedure) if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(seg) = current.as_mut() {
                        seg.procedures += 1;
                    }
                }
            }
            _ => {}
        }
    }

    if depth > 0 {
        out.unterminated_from = Some(open_line);
    }
    if let Some(mut seg) = current.take() {
        seg.last_line = last_line;
        out.segments.push(seg);
    }
    out
}

fn vb_name_marker(stmt: &Statement) -> Option<String> {
    match stmt.tokens.as_slice() {
        [attr, name, eq, value, ..]
            if attr.is_word("attribute")
                && name.is_word("vb_name")
                && eq.kind == TokenKind::Eq
                && value.kind == TokenKind::Str =>
        {
            Some(value.string_value())
        }
        _ => None,
    }
}

/// Whether `text` contains anything that looks like macro source.
pub fn looks_like_macro_source(text: &str) -> bool {
    let tokens = tokenize_lossy(text, LexMode::Macro);
    split_statements(text, &tokens).iter().any(|stmt| {
        matches!(classify_statement(stmt), StatementRole::Open(BlockKind::Procedure))
            || vb_name_marker(stmt).is_some()
            || matches!(stmt.tokens.as_slice(), [o, e, ..] if o.is_kw("option") && e.is_kw("explicit"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn splits_on_vb_name_markers() {
        let src = "Attribute VB_Name = \"Calc\"\nSub A()\nEnd Sub\nAttribute VB_Name = \"Util\"\nFunction B()\nEnd Function\n";
        let found = scan_module_boundaries(src);
        assert_eq!(found.unterminated_from, None);
        assert_eq!(
            found.segments,
            vec![
                ModuleSegment { first_line: 1, last_line: 3, declared_name: Some("Calc".into()), procedures: 1 },
                ModuleSegment { first_line: 4, last_line: 6, declared_name: Some("Util".into()), procedures: 1 },
            ]
        );
    }

    #[test]
    fn option_statement_after_procedures_starts_a_module() {
        let src = "Option Explicit\nSub A()\nEnd Sub\nOption Explicit\nSub B()\nEnd Sub";
        let found = scan_module_boundaries(src);
        assert_eq!(found.segments.len(), 2);
        assert_eq!(found.segments[1].first_line, 4);
    }

    #[test]
    fn keyword_inside_string_does_not_close() {
        let src = "Sub A()\n  s = \"End Sub\"\nEnd Sub\n";
        let found = scan_module_boundaries(src);
        assert_eq!(found.segments[0].procedures, 1);
    }

    #[test]
    fn unterminated_opener_is_reported() {
        let src = "Sub A()\nEnd Sub\nSub B()\n  x = 1\n";
        let found = scan_module_boundaries(src);
        assert_eq!(found.unterminated_from, Some(3));
        assert_eq!(found.segments.len(), 1);
    }

    #[test]
    fn detects_macro_like_text() {
        assert!(looks_like_macro_source("Public Function F(x)\nF = x\nEnd Function"));
        assert!(!looks_like_macro_source("Quarterly totals\nRegion 1"));
    }
}
