//! Python support functions emitted into generated modules when a used mapping needs them.

pub(crate) struct Helper {
    pub name: &'static str,
    pub imports: &'static [&'static str],
    /// Other helpers this one calls.
    pub requires: &'static [&'static str],
    pub source: &'static str,
}

pub(crate) const HELPERS: &[Helper] = &[
    Helper {
        name: "_averageif",
        imports: &[],
        requires: &["_criteria", "_flatten"],
        source: r#"def _averageif(values, criterion, average_values=None):
    test = _criteria(criterion)
    keys = _flatten(values)
    targets = keys if average_values is None else _flatten(average_values)
    picked = [t for k, t in zip(keys, targets) if test(k) and isinstance(t, (int, float))]
    return sum(picked) / len(picked) if picked else float("nan")"#,
    },
    Helper {
        name: "_counta",
        imports: &[],
        requires: &["_flatten"],
        source: r#"def _counta(*values):
    return sum(1 for v in _flatten(*values) if v is not None and v == v and v != "")"#,
    },
    Helper {
        name: "_countif",
        imports: &[],
        requires: &["_criteria", "_flatten"],
        source: r#"def _countif(values, criterion):
    test = _criteria(criterion)
    return sum(1 for v in _flatten(values) if test(v))"#,
    },
    Helper {
        name: "_create_object",
        imports: &[],
        requires: &[],
        source: r#"def _create_object(prog_id):
    if str(prog_id).lower() == "scripting.dictionary":
        return {}
    raise NotImplementedError(f"CreateObject({prog_id!r}) has no Python equivalent")"#,
    },
    Helper {
        name: "_criteria",
        imports: &[],
        requires: &[],
        source: r#"def _criteria(criterion):
    """Predicate for a SUMIF/COUNTIF criterion such as ">5" or "apple"."""
    op, operand = "=", criterion
    if isinstance(criterion, str):
        for prefix in (">=", "<=", "<>", ">", "<", "="):
            if criterion.startswith(prefix):
                op, operand = prefix, criterion[len(prefix):]
                break
        try:
            operand = float(operand)
        except ValueError:
            operand = operand.lower()

    def test(value):
        if isinstance(operand, str):
            value = str(value).lower()
        try:
            return {
                "=": value == operand,
                "<>": value != operand,
                ">": value > operand,
                "<": value < operand,
                ">=": value >= operand,
                "<=": value <= operand,
            }[op]
        except TypeError:
            return False

    return test"#,
    },
    Helper {
        name: "_flatten",
        imports: &["import numpy as np", "import pandas as pd"],
        requires: &[],
        source: r#"def _flatten(*values):
    out = []
    for value in values:
        if isinstance(value, (pd.Series, pd.DataFrame)):
            out.extend(np.ravel(value.to_numpy()).tolist())
        elif isinstance(value, (list, tuple)):
            out.extend(value)
        else:
            out.append(value)
    return out"#,
    },
    Helper {
        name: "_format",
        imports: &[],
        requires: &[],
        source: r#"def _format(value, fmt):
    """Approximates VBA `Format` for named formats, date patterns and `0.00`-style masks."""
    named = {"general number": "{}", "fixed": "{:.2f}", "standard": "{:,.2f}", "percent": "{:.2%}"}
    key = str(fmt).lower()
    if key in named:
        return named[key].format(value)
    if hasattr(value, "strftime"):
        out = str(fmt)
        for vba, py in (("yyyy", "%Y"), ("yy", "%y"), ("mmmm", "%B"), ("mmm", "%b"),
                        ("mm", "%m"), ("dd", "%d"), ("hh", "%H"), ("nn", "%M"), ("ss", "%S")):
            out = out.replace(vba, py)
        return value.strftime(out)
    decimals = len(key.split(".", 1)[1].rstrip("%")) if "." in key else 0
    grouping = "," if "," in key else ""
    if key.endswith("%"):
        return format(float(value), f"{grouping}.{decimals}%")
    return format(float(value), f"{grouping}.{decimals}f")"#,
    },
    Helper {
        name: "_frange",
        imports: &[],
        requires: &[],
        source: r#"def _frange(start, stop, step):
    """Inclusive `For` range for non-integer steps."""
    value = start
    while (step > 0 and value <= stop) or (step < 0 and value >= stop):
        yield value
        value += step"#,
    },
    Helper {
        name: "_iferror",
        imports: &[],
        requires: &[],
        source: r#"def _iferror(compute, fallback):
    try:
        value = compute()
    except Exception:
        return fallback
    if isinstance(value, float) and value != value:
        return fallback
    return value"#,
    },
    Helper {
        name: "_index",
        imports: &["import pandas as pd"],
        requires: &[],
        source: r#"def _index(table, row, column=1):
    frame = pd.DataFrame(table)
    return frame.iloc[int(row) - 1, int(column) - 1]"#,
    },
    Helper {
        name: "_is_numeric",
        imports: &[],
        requires: &[],
        source: r#"def _is_numeric(value):
    if isinstance(value, (bool, int, float)):
        return True
    try:
        float(str(value).strip())
    except ValueError:
        return False
    return True"#,
    },
    Helper {
        name: "_like",
        imports: &["import re"],
        requires: &[],
        source: r##"def _like(text, pattern):
    """VBA `Like`: `*`, `?`, `#`, `[list]` and `[!list]`."""
    regex = ""
    i = 0
    while i < len(pattern):
        ch = pattern[i]
        if ch == "*":
            regex += ".*"
        elif ch == "?":
            regex += "."
        elif ch == "#":
            regex += "[0-9]"
        elif ch == "[" and pattern.find("]", i) > i:
            end = pattern.find("]", i)
            body = pattern[i + 1:end]
            if body.startswith("!"):
                body = "^" + body[1:]
            regex += "[" + body + "]"
            i = end
        else:
            regex += re.escape(ch)
        i += 1
    return re.fullmatch(regex, str(text), re.DOTALL) is not None"##,
    },
    Helper {
        name: "_match",
        imports: &["import numpy as np"],
        requires: &["_flatten"],
        source: r#"def _match(value, values, match_type=1):
    items = _flatten(values)
    if match_type == 0:
        return items.index(value) + 1 if value in items else np.nan
    best = None
    for i, item in enumerate(items):
        if (match_type > 0 and item <= value) or (match_type < 0 and item >= value):
            best = i + 1
    return best if best is not None else np.nan"#,
    },
    Helper {
        name: "_numbers",
        imports: &["import numpy as np"],
        requires: &["_flatten"],
        source: r#"def _numbers(*values):
    nums = [v for v in _flatten(*values) if isinstance(v, (int, float)) and not isinstance(v, bool) and v == v]
    return np.array(nums, dtype=float)"#,
    },
    Helper {
        name: "_sgn",
        imports: &[],
        requires: &[],
        source: r#"def _sgn(value):
    return (value > 0) - (value < 0)"#,
    },
    Helper {
        name: "_sumif",
        imports: &[],
        requires: &["_criteria", "_flatten"],
        source: r#"def _sumif(values, criterion, sum_values=None):
    test = _criteria(criterion)
    keys = _flatten(values)
    totals = keys if sum_values is None else _flatten(sum_values)
    return float(sum(t for k, t in zip(keys, totals) if test(k) and isinstance(t, (int, float))))"#,
    },
    Helper {
        name: "_sumproduct",
        imports: &["import numpy as np"],
        requires: &["_flatten"],
        source: r#"def _sumproduct(*arrays):
    columns = [np.asarray(_flatten(a), dtype=float) for a in arrays]
    return float(np.sum(np.prod(columns, axis=0)))"#,
    },
    Helper {
        name: "_val",
        imports: &["import re"],
        requires: &[],
        source: r#"def _val(text):
    match = re.match(r"\s*[-+]?(\d+\.?\d*|\.\d+)([eE][-+]?\d+)?", str(text))
    return float(match.group(0)) if match else 0.0"#,
    },
    Helper {
        name: "_vlookup",
        imports: &["import numpy as np", "import pandas as pd"],
        requires: &[],
        source: r#"def _vlookup(value, table, column, approximate=True):
    frame = pd.DataFrame(table).reset_index(drop=True)
    keys = frame.iloc[:, 0]
    matches = keys[keys <= value] if approximate else keys[keys == value]
    if matches.empty:
        return np.nan
    row = matches.index[-1] if approximate else matches.index[0]
    return frame.iloc[row, int(column) - 1]"#,
    },
];

pub(crate) fn helper(name: &str) -> Option<&'static Helper> {
    HELPERS
        .binary_search_by(|h| h.name.cmp(name))
        .ok()
        .map(|i| &HELPERS[i])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helpers_are_sorted_and_dependencies_exist() {
        assert!(HELPERS.windows(2).all(|w| w[0].name < w[1].name));
        for h in HELPERS {
            assert!(h.source.starts_with(&format!("def {}(", h.name)), "{}", h.name);
            for dep in h.requires {
                assert!(helper(dep).is_some(), "{} requires unknown {dep}", h.name);
            }
        }
    }

    #[test]
    fn like_translates_every_wildcard() {
        let like = helper("_like").unwrap();
        assert!(like.source.contains(r##"elif ch == "#":"##));
        assert!(like.source.contains(r#"body = "^" + body[1:]"#));
        assert!(like.source.ends_with("re.DOTALL) is not None"));
    }
}
