//! Python output fragments: precedence-tagged expression text and import bookkeeping.

use std::collections::{BTreeMap, BTreeSet};

/// Python operator precedence, lowest first.
pub(crate) mod prec {
    pub const OR: u8 = 2;
    pub const AND: u8 = 3;
    pub const NOT: u8 = 4;
    pub const CMP: u8 = 5;
    pub const ADD: u8 = 10;
    pub const MUL: u8 = 11;
    pub const UNARY: u8 = 12;
    pub const POW: u8 = 13;
    pub const PRIMARY: u8 = 15;
    pub const ATOM: u8 = 16;
}

/// A rendered Python expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Py {
    pub code: String,
    /// Precedence of the outermost operator; [`prec::ATOM`] for literals and names.
    pub prec: u8,
    /// Statically known to evaluate to `str`.
    pub is_str: bool,
    /// The value, when the expression is an integer literal.
    pub int_value: Option<i64>,
}

impl Py {
    pub fn new(code: impl Into<String>, prec: u8) -> Self {
        Self {
            code: code.into(),
            prec,
            is_str: false,
            int_value: None,
        }
    }

    pub fn atom(code: impl Into<String>) -> Self {
        Self::new(code, prec::ATOM)
    }

    pub fn string(code: impl Into<String>) -> Self {
        Self {
            is_str: true,
            ..Self::atom(code)
        }
    }

    pub fn int(value: i64) -> Self {
        let prec = if value < 0 { prec::UNARY } else { prec::ATOM };
        Self {
            int_value: Some(value),
            ..Self::new(value.to_string(), prec)
        }
    }

    pub fn with_str(mut self, is_str: bool) -> Self {
        self.is_str = is_str;
        self
    }

    /// The code, parenthesized when it binds looser than `min_prec`.
    pub fn wrapped(&self, min_prec: u8) -> String {
        if self.prec < min_prec {
            format!("({})", self.code)
        } else {
            self.code.clone()
        }
    }

    /// `str(x)` unless the value is already a string.
    pub fn into_str(self) -> Py {
        if self.is_str {
            self
        } else {
            Py::new(format!("str({})", self.code), prec::PRIMARY).with_str(true)
        }
    }
}

/// Python string literal for `value`, double-quoted.
pub(crate) fn string_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Imports collected while emitting one module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ImportSet {
    plain: BTreeSet<String>,
    from: BTreeMap<String, BTreeSet<String>>,
}

impl ImportSet {
    /// Records `import x` or `from x import y`.
    pub fn add(&mut self, spec: &str) {
        let spec = spec.trim();
        if let Some(rest) = spec.strip_prefix("from ") {
            if let Some((module, names)) = rest.split_once(" import ") {
                let entry = self.from.entry(module.trim().to_string()).or_default();
                entry.extend(names.split(',').map(|n| n.trim().to_string()).filter(|n| !n.is_empty()));
                return;
            }
        }
        if let Some(module) = spec.strip_prefix("import ") {
            self.plain.insert(module.trim().to_string());
        }
    }

    pub fn extend<'a>(&mut self, specs: impl IntoIterator<Item = &'a str>) {
        for spec in specs {
            self.add(spec);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.plain.is_empty() && self.from.is_empty()
    }

    pub fn lines(&self) -> Vec<String> {
        let mut out: Vec<String> = self.plain.iter().map(|m| format!("import {m}")).collect();
        out.extend(self.from.iter().map(|(module, names)| {
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            format!("from {module} import {}", names.join(", "))
        }));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn wraps_only_looser_expressions() {
        let sum = Py::new("a + b", prec::ADD);
        assert_eq!(sum.wrapped(prec::MUL), "(a + b)");
        assert_eq!(sum.wrapped(prec::ADD), "a + b");
        assert_eq!(Py::int(-2).wrapped(prec::POW), "(-2)");
    }

    #[test]
    fn escapes_string_literals() {
        assert_eq!(string_literal("say \"hi\"\n"), r#""say \"hi\"\n""#);
        assert_eq!(string_literal("C:\\tmp"), r#""C:\\tmp""#);
    }

    #[test]
    fn groups_from_imports() {
        let mut imports = ImportSet::default();
        imports.extend(["import math", "from typing import Any", "from dataclasses import field"]);
        imports.add("from dataclasses import dataclass");
        imports.add("import math");
        assert_eq!(
            imports.lines(),
            vec![
                "import math".to_string(),
                "from dataclasses import dataclass, field".to_string(),
                "from typing import Any".to_string(),
            ]
        );
    }
}
