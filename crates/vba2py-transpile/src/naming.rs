//! Python spellings for VBA identifiers.

/// Python keywords plus the builtins generated code is most likely to shadow.
const RESERVED: &[&str] = &[
    "False", "None", "True", "abs", "all", "and", "any", "as", "assert", "async", "await", "bool",
    "break", "bytes", "chr", "class", "continue", "def", "del", "dict", "dir", "elif", "else",
    "except", "filter", "finally", "float", "for", "format", "from", "global", "hash", "id", "if",
    "import", "in", "input", "int", "is", "iter", "lambda", "len", "list", "map", "max", "min",
    "next", "nonlocal", "not", "object", "open", "or", "ord", "pass", "pow", "print", "raise",
    "range", "return", "round", "self", "set", "sorted", "str", "sum", "try", "tuple", "type",
    "vars", "while", "with", "yield",
];

/// `PrintTable` -> `print_table`, `ABCValue` -> `abc_value`, `m_Rate` -> `m_rate`.
///
/// Type-declaration suffixes are dropped and Python reserved words get a trailing `_`.
pub fn snake_case(name: &str) -> String {
    let name = name.trim_end_matches(['$', '%', '&', '!', '#', '@']);
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &ch) in chars.iter().enumerate() {
        if ch.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(|n| n.is_lowercase()),
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else if ch.is_alphanumeric() || ch == '_' {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() {
        out.push('_');
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    escape_reserved(out)
}

/// Appends `_` to names Python reserves.
pub fn escape_reserved(name: String) -> String {
    if RESERVED.binary_search(&name.as_str()).is_ok() {
        format!("{name}_")
    } else {
        name
    }
}

/// A file-system friendly module name, used for `--out-dir` output.
pub fn module_file_stem(module_name: &str) -> String {
    snake_case(module_name).trim_end_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_list_is_sorted() {
        assert!(RESERVED.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn converts_common_shapes() {
        assert_eq!(snake_case("PrintTable"), "print_table");
        assert_eq!(snake_case("myVar"), "my_var");
        assert_eq!(snake_case("ABCValue"), "abc_value");
        assert_eq!(snake_case("m_Rate"), "m_rate");
        assert_eq!(snake_case("Sheet1"), "sheet1");
        assert_eq!(snake_case("Total2Sum"), "total2_sum");
        assert_eq!(snake_case("BASE_RATE"), "base_rate");
        assert_eq!(snake_case("Name$"), "name");
    }

    #[test]
    fn escapes_python_reserved_words() {
        assert_eq!(snake_case("Print"), "print_");
        assert_eq!(snake_case("Is"), "is_");
        assert_eq!(snake_case("Str"), "str_");
        assert_eq!(module_file_stem("Print"), "print");
    }
}
