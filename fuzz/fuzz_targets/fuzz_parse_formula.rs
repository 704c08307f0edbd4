#![no_main]

use libfuzzer_sys::fuzz_target;

/// Excel's formula length limit plus some slack.
const MAX_FUZZ_FORMULA_CHARS: usize = 8_192 + 256;
const MAX_INPUT_BYTES: usize = MAX_FUZZ_FORMULA_CHARS * 4; // max UTF-8 bytes per char

fn truncate_to_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fuzz_target!(|data: &[u8]| {
    let data = &data[..data.len().min(MAX_INPUT_BYTES)];
    let input = String::from_utf8_lossy(data);
    let formula = truncate_to_chars(&input, MAX_FUZZ_FORMULA_CHARS);

    let _ = vba2py_transpile::parse_formula(formula);
    let result = vba2py_transpile::convert_formula(formula);
    // Successful conversions always end in a `result = ...` line, possibly a placeholder.
    if result.success {
        assert!(result.generated_code.lines().last().is_some_and(|l| l.starts_with("result = ")));
    }
});
