//! Call templates shared by the module and formula mapping tables.
//!
//! A template is Python text with placeholders:
//!
//! | placeholder | expands to |
//! |---|---|
//! | `{0}` | argument 0 as written |
//! | `{0:p}` | argument 0, parenthesized unless it is a primary expression |
//! | `{1-1}` | argument 1 shifted from 1-based to 0-based |
//! | `{1-1+2}` | exclusive end of the 0-based slice starting at argument 1 with length argument 2 |
//! | `{*}`, `{*1}` | all arguments (from index 1), comma separated |
//! | `{self}`, `{self:p}` | the receiver of a method call |
//!
//! `{{` and `}}` are literal braces. Literal integer arguments are folded; a shift applied to a
//! runtime value is reported so the caller can attach an `IndexAdjustment` note.

use crate::py::{prec, Py};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Text(String),
    Arg { index: usize, paren: bool },
    ZeroBased { index: usize },
    SliceEnd { start: usize, len: usize },
    Rest { from: usize },
    Receiver { paren: bool },
}

/// How many arguments a template accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: &'static str,
    pieces: Vec<Piece>,
    arity: Arity,
}

/// Output of [`Template::render`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Rendered {
    pub code: String,
    /// A 1-based argument that is not a literal was shifted at runtime.
    pub adjusted: bool,
}

impl Template {
    pub fn parse(source: &'static str) -> Template {
        let mut pieces = Vec::new();
        let mut text = String::new();
        let mut rest = source;
        while let Some(ch) = rest.chars().next() {
            if rest.starts_with("{{") || rest.starts_with("}}") {
                text.push(ch);
                rest = &rest[2..];
                continue;
            }
            if ch == '{' {
                if let Some(end) = rest.find('}') {
                    if let Some(piece) = parse_placeholder(&rest[1..end]) {
                        if !text.is_empty() {
                            pieces.push(Piece::Text(std::mem::take(&mut text)));
                        }
                        pieces.push(piece);
                        rest = &rest[end + 1..];
                        continue;
                    }
                }
            }
            text.push(ch);
            rest = &rest[ch.len_utf8()..];
        }
        if !text.is_empty() {
            pieces.push(Piece::Text(text));
        }

        let mut needed = 0;
        let mut variadic = None;
        for piece in &pieces {
            match *piece {
                Piece::Arg { index, .. } | Piece::ZeroBased { index } => needed = needed.max(index + 1),
                Piece::SliceEnd { start, len } => needed = needed.max(start.max(len) + 1),
                Piece::Rest { from } => variadic = Some(from),
                Piece::Text(_) | Piece::Receiver { .. } => {}
            }
        }
        let arity = match variadic {
            Some(from) => Arity::AtLeast(needed.max(from)),
            None => Arity::Exact(needed),
        };
        Template {
            source,
            pieces,
            arity,
        }
    }

    pub fn arity(&self) -> Arity {
        self.arity
    }

    pub fn source(&self) -> &'static str {
        self.source
    }

    /// Expands the template. Missing arguments (omitted in the call) render as `None`.
    pub(crate) fn render(&self, receiver: Option<&Py>, args: &[Option<Py>]) -> Rendered {
        let none = Py::atom("None");
        let arg = |i: usize| args.get(i).and_then(Option::as_ref).unwrap_or(&none);
        let mut code = String::new();
        let mut adjusted = false;
        for piece in &self.pieces {
            match *piece {
                Piece::Text(ref text) => code.push_str(text),
                Piece::Arg { index, paren } => code.push_str(&primary(arg(index), paren)),
                Piece::ZeroBased { index } => {
                    let (text, shifted) = offset(arg(index), -1);
                    adjusted |= shifted;
                    code.push_str(&text);
                }
                Piece::SliceEnd { start, len } => {
                    let (text, shifted) = slice_end(arg(start), arg(len));
                    adjusted |= shifted;
                    code.push_str(&text);
                }
                Piece::Rest { from } => {
                    let parts: Vec<String> = (from..args.len()).map(|i| arg(i).code.clone()).collect();
                    code.push_str(&parts.join(", "));
                }
                Piece::Receiver { paren } => {
                    code.push_str(&primary(receiver.unwrap_or(&none), paren));
                }
            }
        }
        Rendered { code, adjusted }
    }
}

fn parse_placeholder(inner: &str) -> Option<Piece> {
    let (body, paren) = match inner.strip_suffix(":p") {
        Some(body) => (body, true),
        None => (inner, false),
    };
    if body == "self" {
        return Some(Piece::Receiver { paren });
    }
    if let Some(from) = body.strip_prefix('*') {
        let from = if from.is_empty() { 0 } else { from.parse().ok()? };
        return Some(Piece::Rest { from });
    }
    if let Some((start, tail)) = body.split_once("-1") {
        let start: usize = start.parse().ok()?;
        if tail.is_empty() {
            return Some(Piece::ZeroBased { index: start });
        }
        let len: usize = tail.strip_prefix('+')?.parse().ok()?;
        return Some(Piece::SliceEnd { start, len });
    }
    let index = body.parse().ok()?;
    Some(Piece::Arg { index, paren })
}

fn primary(value: &Py, paren: bool) -> String {
    if paren {
        value.wrapped(prec::PRIMARY)
    } else {
        value.code.clone()
    }
}

/// `value + delta`, folded for literals. The flag is set when a runtime value was shifted.
pub(crate) fn offset(value: &Py, delta: i64) -> (String, bool) {
    if let Some(n) = value.int_value {
        return ((n + delta).to_string(), false);
    }
    (add_constant(&value.wrapped(prec::ADD), delta), delta != 0)
}

fn slice_end(start: &Py, len: &Py) -> (String, bool) {
    match (start.int_value, len.int_value) {
        (Some(s), Some(l)) => ((s - 1 + l).to_string(), false),
        (Some(s), None) => (add_constant(&len.wrapped(prec::ADD), s - 1), false),
        (None, Some(l)) => (add_constant(&start.wrapped(prec::ADD), l - 1), true),
        (None, None) => (
            format!("{} - 1 + {}", start.wrapped(prec::ADD), len.wrapped(prec::MUL)),
            true,
        ),
    }
}

fn add_constant(code: &str, delta: i64) -> String {
    match delta {
        0 => code.to_string(),
        d if d > 0 => format!("{code} + {d}"),
        d => format!("{code} - {}", -d),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn args(values: &[Py]) -> Vec<Option<Py>> {
        values.iter().cloned().map(Some).collect()
    }

    #[test]
    fn computes_arity() {
        assert_eq!(Template::parse("len({0})").arity(), Arity::Exact(1));
        assert_eq!(Template::parse("{0:p}[{1-1}:{1-1+2}]").arity(), Arity::Exact(3));
        assert_eq!(Template::parse("print({*})").arity(), Arity::AtLeast(0));
        assert_eq!(Template::parse("{0}.join([{*1}])").arity(), Arity::AtLeast(1));
        assert_eq!(Template::parse("{{}}").arity(), Arity::Exact(0));
    }

    #[test]
    fn folds_literal_positions() {
        let mid = Template::parse("{0:p}[{1-1}:{1-1+2}]");
        let rendered = mid.render(None, &args(&[Py::atom("s"), Py::int(4), Py::int(3)]));
        assert_eq!(rendered.code, "s[3:6]");
        assert!(!rendered.adjusted);
    }

    #[test]
    fn shifts_dynamic_positions_at_runtime() {
        let mid = Template::parse("{0:p}[{1-1}:{1-1+2}]");
        let rendered = mid.render(None, &args(&[Py::atom("s"), Py::atom("i"), Py::int(3)]));
        assert_eq!(rendered.code, "s[i - 1:i + 2]");
        assert!(rendered.adjusted);

        let sum = Py::new("a + b", prec::ADD);
        let rendered = mid.render(None, &args(&[Py::new("x + y", prec::ADD), sum, Py::atom("n")]));
        assert_eq!(rendered.code, "(x + y)[a + b - 1:a + b - 1 + n]");
    }

    #[test]
    fn renders_receivers_and_omitted_arguments() {
        let template = Template::parse("{self:p}.get({0}, {1})");
        let receiver = Py::new("a or b", prec::OR);
        let rendered = template.render(Some(&receiver), &[Some(Py::string("\"k\"")), None]);
        assert_eq!(rendered.code, "(a or b).get(\"k\", None)");
    }
}
