//! Export metadata in module source: `VERSION`, `BEGIN ... END` headers, form designer blocks
//! and `Attribute` lines.

/// Module source with metadata lines blanked. Line numbers are unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Prepared {
    pub text: String,
    /// A form designer block (`Begin {GUID} Name`) was found in the header.
    pub designer: bool,
}

pub(crate) fn prepare(source: &str) -> Prepared {
    let mut out = String::with_capacity(source.len());
    let mut designer = false;
    let mut in_header = true;
    let mut depth = 0usize;

    for line in source.split_inclusive('\n') {
        let body = line.trim_end_matches(['\n', '\r']);
        let trimmed = body.trim();
        let word = trimmed.split_whitespace().next().unwrap_or("");

        let metadata = if depth > 0 {
            if trimmed.eq_ignore_ascii_case("end") {
                depth -= 1;
            } else if word.eq_ignore_ascii_case("begin") {
                depth += 1;
            }
            true
        } else if is_attribute_line(trimmed) {
            true
        } else if in_header && word.eq_ignore_ascii_case("version") {
            true
        } else if in_header && word.eq_ignore_ascii_case("begin") {
            designer |= trimmed[word.len()..].trim_start().starts_with('{');
            depth = 1;
            true
        } else {
            if !trimmed.is_empty() {
                in_header = false;
            }
            false
        };

        if metadata {
            out.push_str(&line[body.len()..]);
        } else {
            out.push_str(line);
        }
    }
    Prepared { text: out, designer }
}

/// `Attribute VB_Name = "X"`, `Attribute Proc.VB_Description = "..."`.
fn is_attribute_line(trimmed: &str) -> bool {
    let Some(rest) = trimmed
        .get(..10)
        .filter(|head| head.eq_ignore_ascii_case("attribute "))
        .map(|_| trimmed[10..].trim_start())
    else {
        return false;
    };
    rest.starts_with(|c: char| c.is_alphabetic() || c == '_') && rest.contains('=')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn blanks_class_headers() {
        let src = "VERSION 1.0 CLASS\r\nBEGIN\r\n  MultiUse = -1  'True\r\nEND\r\nAttribute VB_Name = \"Policy\"\r\nOption Explicit\r\n";
        let prepared = prepare(src);
        assert_eq!(prepared.text, "\r\n\r\n\r\n\r\n\r\nOption Explicit\r\n");
        assert!(!prepared.designer);
    }

    #[test]
    fn blanks_nested_designer_blocks() {
        let src = "VERSION 5.00\nBegin {C62A69F0-16DC-11CE-9E98-00AA00574A4F} Form1\n   Caption = \"F\"\n   Begin Frame\n   End\nEnd\nAttribute VB_Name = \"Form1\"\nPrivate Sub UserForm_Click()\nEnd Sub\n";
        let prepared = prepare(src);
        assert!(prepared.designer);
        assert_eq!(prepared.text.lines().nth(7), Some("Private Sub UserForm_Click()"));
        assert!(prepared.text.lines().take(7).all(str::is_empty));
    }

    #[test]
    fn keeps_code_that_only_looks_like_metadata() {
        let src = "Sub A()\n    Begin = 1\n    End\nEnd Sub\nAttribute A.VB_Description = \"d\"\n";
        let prepared = prepare(src);
        assert_eq!(prepared.text, "Sub A()\n    Begin = 1\n    End\nEnd Sub\n\n");
    }
}
