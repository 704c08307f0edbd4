/// Indentation-aware line buffer for generated Python.
#[derive(Debug, Clone)]
pub(crate) struct CodeWriter {
    lines: Vec<Line>,
    indent: usize,
    unit: String,
}

#[derive(Debug, Clone)]
struct Line {
    text: String,
    /// Counts toward a block body; comments and blank lines do not.
    code: bool,
}

/// Position returned by [`CodeWriter::open_block`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct BlockMark {
    code_lines: usize,
}

impl CodeWriter {
    pub fn new(indent_width: usize) -> Self {
        Self {
            lines: Vec::new(),
            indent: 0,
            unit: " ".repeat(indent_width.max(1)),
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    fn prefix(&self) -> String {
        self.unit.repeat(self.indent)
    }

    pub fn line(&mut self, text: impl AsRef<str>) {
        let text = format!("{}{}", self.prefix(), text.as_ref());
        self.lines.push(Line { text, code: true });
    }

    pub fn comment(&mut self, text: &str) {
        let text = if text.is_empty() || text.starts_with(' ') {
            format!("{}#{text}", self.prefix())
        } else {
            format!("{}# {text}", self.prefix())
        };
        self.lines.push(Line { text, code: false });
    }

    /// One blank line; consecutive blanks and blanks at the start of a block collapse.
    pub fn blank(&mut self) {
        match self.lines.last() {
            None => {}
            Some(last) if last.text.is_empty() || last.text.trim_end().ends_with(':') => {}
            Some(_) => self.lines.push(Line {
                text: String::new(),
                code: false,
            }),
        }
    }

    /// Ends the buffer with at least `count` blank lines; an empty buffer stays empty.
    pub fn separate(&mut self, count: usize) {
        if self.lines.is_empty() {
            return;
        }
        let trailing = self.lines.iter().rev().take_while(|l| l.text.is_empty()).count();
        for _ in trailing..count {
            self.lines.push(Line {
                text: String::new(),
                code: false,
            });
        }
    }

    /// Inserts a code line at `index` with the current indentation.
    pub fn insert_line(&mut self, index: usize, text: &str) {
        let text = format!("{}{}", self.prefix(), text);
        self.lines.insert(index.min(self.lines.len()), Line { text, code: true });
    }

    /// Appends `  # comment` to the line at `index`, or writes a comment line when the
    /// statement produced no output.
    pub fn annotate(&mut self, index: usize, comment: &str) {
        let comment = comment.trim();
        match self.lines.get_mut(index) {
            Some(line) if !line.text.is_empty() => {
                line.text.push_str("  # ");
                line.text.push_str(comment);
            }
            _ => self.comment(comment),
        }
    }

    pub fn truncate(&mut self, len: usize) {
        self.lines.truncate(len);
    }

    pub fn indent(&mut self) {
        self.indent += 1;
    }

    pub fn dedent(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }

    pub fn open_block(&mut self) -> BlockMark {
        self.indent();
        BlockMark {
            code_lines: self.code_lines(),
        }
    }

    /// Closes a block opened with [`CodeWriter::open_block`], adding `pass` to an empty body.
    pub fn close_block(&mut self, mark: BlockMark) {
        while self.lines.last().is_some_and(|l| l.text.is_empty()) {
            self.lines.pop();
        }
        if self.code_lines() == mark.code_lines {
            self.line("pass");
        }
        self.dedent();
    }

    fn code_lines(&self) -> usize {
        self.lines.iter().filter(|l| l.code).count()
    }

    pub fn last_code_line(&self) -> Option<&str> {
        self.lines.iter().rev().find(|l| l.code).map(|l| l.text.trim())
    }

    pub fn into_lines(mut self) -> Vec<String> {
        while self.lines.last().is_some_and(|l| l.text.is_empty()) {
            self.lines.pop();
        }
        self.lines.into_iter().map(|l| l.text).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_blocks_get_pass() {
        let mut w = CodeWriter::new(4);
        w.line("if x:");
        let mark = w.open_block();
        w.comment("nothing here");
        w.close_block(mark);
        w.line("y = 1");
        w.annotate(3, "done");
        assert_eq!(
            w.into_lines(),
            vec!["if x:", "    # nothing here", "    pass", "y = 1  # done"]
        );
    }

    #[test]
    fn blank_lines_collapse() {
        let mut w = CodeWriter::new(2);
        w.blank();
        w.line("a = 1");
        w.blank();
        w.blank();
        w.line("while True:");
        let mark = w.open_block();
        w.blank();
        w.line("break");
        w.close_block(mark);
        assert_eq!(w.into_lines(), vec!["a = 1", "", "while True:", "  break"]);
    }
}
