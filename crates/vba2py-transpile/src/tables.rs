//! Static mapping tables: VBA types, named constants, builtin calls, receiver methods and
//! spreadsheet functions.
//!
//! Every mapping kind has one registration function below. The tables are built once and
//! shared read-only by every conversion.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use crate::py::prec;
use crate::template::Template;

/// Python rendering of a VBA declared type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMapping {
    pub python: &'static str,
    /// Value a fresh variable of this type holds.
    pub default: &'static str,
    pub imports: &'static [&'static str],
    /// Values are Python strings.
    pub is_str: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constant {
    pub code: String,
    pub is_str: bool,
    pub imports: &'static [&'static str],
}

/// A builtin call (or receiver method) and the templates that translate it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Builtin {
    pub name: &'static str,
    forms: Vec<Template>,
    /// Precedence of the rendered expression.
    pub prec: u8,
    pub returns_str: bool,
    /// Trailing arguments beyond every form's arity are dropped (`MsgBox` buttons and title).
    pub ignore_extra: bool,
    /// Only valid as a whole statement (`raise`, `del`, `pass`, item assignment).
    pub statement_only: bool,
    pub imports: &'static [&'static str],
    pub helpers: &'static [&'static str],
}

impl Builtin {
    fn new(name: &'static str, forms: &[&'static str]) -> Self {
        Self {
            name,
            forms: forms.iter().map(|f| Template::parse(f)).collect(),
            prec: prec::PRIMARY,
            returns_str: false,
            ignore_extra: false,
            statement_only: false,
            imports: &[],
            helpers: &[],
        }
    }

    fn prec(mut self, prec: u8) -> Self {
        self.prec = prec;
        self
    }

    fn str(mut self) -> Self {
        self.returns_str = true;
        self
    }

    fn lenient(mut self) -> Self {
        self.ignore_extra = true;
        self
    }

    fn statement(mut self) -> Self {
        self.statement_only = true;
        self
    }

    fn imports(mut self, imports: &'static [&'static str]) -> Self {
        self.imports = imports;
        self
    }

    fn helpers(mut self, helpers: &'static [&'static str]) -> Self {
        self.helpers = helpers;
        self
    }

    /// The template for a call with `argc` arguments.
    pub fn form(&self, argc: usize) -> Option<&Template> {
        if let Some(exact) = self.forms.iter().find(|t| t.arity().accepts(argc)) {
            return Some(exact);
        }
        if !self.ignore_extra {
            return None;
        }
        self.forms
            .iter()
            .filter(|t| match t.arity() {
                crate::template::Arity::Exact(n) => n <= argc,
                crate::template::Arity::AtLeast(_) => false,
            })
            .last()
    }

    pub fn forms(&self) -> &[Template] {
        &self.forms
    }
}

/// Receiver families whose methods have their own table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Receiver {
    Collection,
    Dictionary,
}

/// Every mapping the transpilers consult.
#[derive(Debug, Clone)]
pub struct MappingTables {
    types: BTreeMap<String, TypeMapping>,
    constants: BTreeMap<String, Constant>,
    builtins: BTreeMap<String, Builtin>,
    methods: BTreeMap<(Receiver, String), Builtin>,
    object_model: BTreeSet<String>,
    unmapped: BTreeSet<String>,
    formula_functions: BTreeMap<String, Builtin>,
}

impl MappingTables {
    /// The built-in tables, constructed on first use.
    pub fn standard() -> &'static MappingTables {
        static TABLES: OnceLock<MappingTables> = OnceLock::new();
        TABLES.get_or_init(MappingTables::build)
    }

    fn build() -> MappingTables {
        let mut tables = MappingTables {
            types: BTreeMap::new(),
            constants: BTreeMap::new(),
            builtins: BTreeMap::new(),
            methods: BTreeMap::new(),
            object_model: BTreeSet::new(),
            unmapped: BTreeSet::new(),
            formula_functions: BTreeMap::new(),
        };
        register_types(&mut tables);
        register_constants(&mut tables);
        register_builtins(&mut tables);
        register_methods(&mut tables);
        register_object_model(&mut tables);
        register_unmapped(&mut tables);
        register_formula_functions(&mut tables);
        tables
    }

    /// Case-insensitive; qualified names use `.` (`scripting.dictionary`).
    pub fn type_mapping(&self, vba_type: &str) -> Option<&TypeMapping> {
        self.types.get(&vba_type.to_ascii_lowercase())
    }

    pub fn constant(&self, name: &str) -> Option<&Constant> {
        self.constants.get(&name.to_ascii_lowercase())
    }

    /// Builtin functions; receiver-qualified ones are keyed `err.raise`, `debug.print`.
    pub fn builtin(&self, name: &str) -> Option<&Builtin> {
        self.builtins.get(&name.to_ascii_lowercase())
    }

    pub fn method(&self, receiver: Receiver, name: &str) -> Option<&Builtin> {
        self.methods.get(&(receiver, name.to_ascii_lowercase()))
    }

    /// Host object-model names that are left untouched (`Range`, `ActiveSheet`, ...).
    pub fn is_object_model(&self, name: &str) -> bool {
        self.object_model.contains(&name.to_ascii_lowercase())
    }

    /// Runtime library functions with no Python mapping.
    pub fn is_unmapped_builtin(&self, name: &str) -> bool {
        self.unmapped.contains(&name.to_ascii_lowercase())
    }

    pub fn formula_function(&self, name: &str) -> Option<&Builtin> {
        self.formula_functions.get(&name.to_ascii_uppercase())
    }

    pub fn builtins(&self) -> impl Iterator<Item = &Builtin> {
        self.builtins.values().chain(self.methods.values())
    }

    pub fn formula_function_names(&self) -> impl Iterator<Item = &str> {
        self.formula_functions.keys().map(String::as_str)
    }

    fn add_builtin(&mut self, builtin: Builtin) {
        self.builtins.insert(builtin.name.to_string(), builtin);
    }
}

const DATETIME: &[&str] = &["import datetime"];
const MATH: &[&str] = &["import math"];
const RANDOM: &[&str] = &["import random"];
const ANY: &[&str] = &["from typing import Any"];

fn register_types(t: &mut MappingTables) {
    let int = TypeMapping { python: "int", default: "0", imports: &[], is_str: false };
    let float = TypeMapping { python: "float", default: "0.0", imports: &[], is_str: false };
    let any = TypeMapping { python: "Any", default: "None", imports: ANY, is_str: false };
    for name in ["byte", "integer", "long", "longlong", "longptr"] {
        t.types.insert(name.to_string(), int.clone());
    }
    for name in ["single", "double", "currency", "decimal"] {
        t.types.insert(name.to_string(), float.clone());
    }
    for name in ["variant", "object"] {
        t.types.insert(name.to_string(), any.clone());
    }
    t.types.insert(
        "string".to_string(),
        TypeMapping { python: "str", default: "\"\"", imports: &[], is_str: true },
    );
    t.types.insert(
        "boolean".to_string(),
        TypeMapping { python: "bool", default: "False", imports: &[], is_str: false },
    );
    t.types.insert(
        "date".to_string(),
        TypeMapping {
            python: "datetime.datetime",
            default: "datetime.datetime(1899, 12, 30)",
            imports: DATETIME,
            is_str: false,
        },
    );
    t.types.insert(
        "collection".to_string(),
        TypeMapping { python: "list", default: "[]", imports: &[], is_str: false },
    );
    for name in ["dictionary", "scripting.dictionary"] {
        t.types.insert(
            name.to_string(),
            TypeMapping { python: "dict", default: "{}", imports: &[], is_str: false },
        );
    }
}

fn register_constants(t: &mut MappingTables) {
    let strings: &[(&str, &str)] = &[
        ("vbcrlf", "\"\\n\""),
        ("vbnewline", "\"\\n\""),
        ("vblf", "\"\\n\""),
        ("vbcr", "\"\\r\""),
        ("vbtab", "\"\\t\""),
        ("vbnullstring", "\"\""),
        ("vbnullchar", "\"\\0\""),
        ("vbback", "\"\\b\""),
        ("vbformfeed", "\"\\f\""),
        ("vbverticaltab", "\"\\v\""),
    ];
    for &(name, code) in strings {
        let constant = Constant { code: code.to_string(), is_str: true, imports: &[] };
        t.constants.insert(name.to_string(), constant);
    }

    let values: &[(&str, &str)] = &[
        ("vbtrue", "True"),
        ("vbfalse", "False"),
        ("vbokonly", "0"),
        ("vbokcancel", "1"),
        ("vbabortretryignore", "2"),
        ("vbyesnocancel", "3"),
        ("vbyesno", "4"),
        ("vbretrycancel", "5"),
        ("vbcritical", "16"),
        ("vbquestion", "32"),
        ("vbexclamation", "48"),
        ("vbinformation", "64"),
        ("vbok", "1"),
        ("vbcancel", "2"),
        ("vbabort", "3"),
        ("vbretry", "4"),
        ("vbignore", "5"),
        ("vbyes", "6"),
        ("vbno", "7"),
        ("vbbinarycompare", "0"),
        ("vbtextcompare", "1"),
        ("vbsunday", "1"),
        ("vbmonday", "2"),
        ("vbblack", "0"),
        ("vbwhite", "16777215"),
        ("vbred", "255"),
        ("vbgreen", "65280"),
        ("vbblue", "16711680"),
        ("vbyellow", "65535"),
        ("pi", "math.pi"),
    ];
    for &(name, code) in values {
        let imports: &'static [&'static str] = if code.starts_with("math.") { MATH } else { &[] };
        let constant = Constant { code: code.to_string(), is_str: false, imports };
        t.constants.insert(name.to_string(), constant);
    }

    // Host enumerations are kept as their names; the object model is not translated.
    for name in [
        "xlUp", "xlDown", "xlToLeft", "xlToRight", "xlValues", "xlFormulas", "xlWhole", "xlPart",
        "xlCalculationManual", "xlCalculationAutomatic", "xlNone", "xlAscending", "xlDescending",
        "xlYes", "xlNo", "xlPasteValues", "xlPasteFormats", "xlCellTypeVisible",
        "xlCellTypeLastCell", "xlOpenXMLWorkbookMacroEnabled",
    ] {
        let constant = Constant { code: crate::py::string_literal(name), is_str: true, imports: &[] };
        t.constants.insert(name.to_ascii_lowercase(), constant);
    }
}

fn register_builtins(t: &mut MappingTables) {
    use prec::{ADD, ATOM, CMP, MUL};

    // Strings.
    t.add_builtin(Builtin::new("len", &["len({0})"]));
    t.add_builtin(Builtin::new("left", &["{0:p}[:{1}]"]).str());
    t.add_builtin(Builtin::new("right", &["{0:p}[len({0}) - {1:p}:]"]).str());
    t.add_builtin(Builtin::new("mid", &["{0:p}[{1-1}:]", "{0:p}[{1-1}:{1-1+2}]"]).str());
    t.add_builtin(Builtin::new("ucase", &["{0:p}.upper()"]).str());
    t.add_builtin(Builtin::new("lcase", &["{0:p}.lower()"]).str());
    t.add_builtin(Builtin::new("trim", &["{0:p}.strip()"]).str());
    t.add_builtin(Builtin::new("ltrim", &["{0:p}.lstrip()"]).str());
    t.add_builtin(Builtin::new("rtrim", &["{0:p}.rstrip()"]).str());
    t.add_builtin(Builtin::new("replace", &["{0:p}.replace({1}, {2})"]).str());
    t.add_builtin(
        Builtin::new("instr", &["{0:p}.find({1}) + 1", "{1:p}.find({2}, {0-1}) + 1"]).prec(ADD),
    );
    t.add_builtin(Builtin::new("instrrev", &["{0:p}.rfind({1}) + 1"]).prec(ADD));
    t.add_builtin(Builtin::new("strreverse", &["{0:p}[::-1]"]).str());
    t.add_builtin(Builtin::new("space", &["\" \" * {0:p}"]).prec(MUL).str());
    t.add_builtin(Builtin::new("string", &["{1:p}[:1] * {0:p}"]).prec(MUL).str());
    t.add_builtin(Builtin::new("strcomp", &["(({0:p} > {1:p}) - ({0:p} < {1:p}))"]).prec(ATOM));
    for name in ["chr", "chrw"] {
        t.add_builtin(Builtin::new(name, &["chr({0})"]).str());
    }
    for name in ["asc", "ascw"] {
        t.add_builtin(Builtin::new(name, &["ord({0:p}[0])"]));
    }
    t.add_builtin(Builtin::new("split", &["{0:p}.split(\" \")", "{0:p}.split({1})"]));
    t.add_builtin(Builtin::new("join", &["\" \".join({0})", "{1:p}.join({0})"]).str());
    t.add_builtin(
        Builtin::new("format", &["str({0})", "_format({0}, {1})"])
            .str()
            .lenient()
            .helpers(&["_format"]),
    );
    t.add_builtin(Builtin::new("val", &["_val({0})"]).helpers(&["_val"]));

    // Type tests and conversions.
    t.add_builtin(Builtin::new("isnumeric", &["_is_numeric({0})"]).helpers(&["_is_numeric"]));
    for name in ["isempty", "isnull"] {
        t.add_builtin(Builtin::new(name, &["{0:p} is None"]).prec(CMP));
    }
    t.add_builtin(Builtin::new("isobject", &["{0:p} is not None"]).prec(CMP));
    t.add_builtin(Builtin::new("isarray", &["isinstance({0}, list)"]));
    t.add_builtin(Builtin::new("typename", &["type({0}).__name__"]).str());
    t.add_builtin(Builtin::new("cstr", &["str({0})"]).str());
    for name in ["cint", "clng", "clnglng", "cbyte"] {
        t.add_builtin(Builtin::new(name, &["int(round({0}))"]));
    }
    for name in ["cdbl", "csng", "ccur", "cdec"] {
        t.add_builtin(Builtin::new(name, &["float({0})"]));
    }
    t.add_builtin(Builtin::new("cbool", &["bool({0})"]));
    t.add_builtin(Builtin::new("cvar", &["{0:p}"]));
    t.add_builtin(Builtin::new("hex", &["format({0}, \"X\")"]).str());
    t.add_builtin(Builtin::new("oct", &["format({0}, \"o\")"]).str());

    // Math.
    t.add_builtin(Builtin::new("abs", &["abs({0})"]));
    t.add_builtin(Builtin::new("int", &["math.floor({0})"]).imports(MATH));
    t.add_builtin(Builtin::new("fix", &["math.trunc({0})"]).imports(MATH));
    t.add_builtin(Builtin::new("sqr", &["math.sqrt({0})"]).imports(MATH));
    t.add_builtin(Builtin::new("exp", &["math.exp({0})"]).imports(MATH));
    t.add_builtin(Builtin::new("log", &["math.log({0})"]).imports(MATH));
    t.add_builtin(Builtin::new("sin", &["math.sin({0})"]).imports(MATH));
    t.add_builtin(Builtin::new("cos", &["math.cos({0})"]).imports(MATH));
    t.add_builtin(Builtin::new("tan", &["math.tan({0})"]).imports(MATH));
    t.add_builtin(Builtin::new("atn", &["math.atan({0})"]).imports(MATH));
    t.add_builtin(Builtin::new("sgn", &["_sgn({0})"]).helpers(&["_sgn"]));
    t.add_builtin(Builtin::new("round", &["round({0})", "round({0}, {1})"]));
    t.add_builtin(Builtin::new("rnd", &["random.random()"]).lenient().imports(RANDOM));
    t.add_builtin(Builtin::new("randomize", &["random.seed()", "random.seed({0})"]).imports(RANDOM));
    t.add_builtin(Builtin::new("rgb", &["({0:p} + 256 * {1:p} + 65536 * {2:p})"]).prec(ATOM));

    // Dates and times.
    t.add_builtin(Builtin::new("now", &["datetime.datetime.now()"]).imports(DATETIME));
    t.add_builtin(Builtin::new("date", &["datetime.date.today()"]).imports(DATETIME));
    t.add_builtin(Builtin::new("time", &["datetime.datetime.now().time()"]).imports(DATETIME));
    t.add_builtin(Builtin::new("timer", &["time.time() % 86400"]).prec(MUL).imports(&["import time"]));
    for (name, field) in [
        ("year", "{0:p}.year"),
        ("month", "{0:p}.month"),
        ("day", "{0:p}.day"),
        ("hour", "{0:p}.hour"),
        ("minute", "{0:p}.minute"),
        ("second", "{0:p}.second"),
    ] {
        t.add_builtin(Builtin::new(name, &[field]));
    }
    t.add_builtin(Builtin::new("dateserial", &["datetime.date({0}, {1}, {2})"]).imports(DATETIME));
    t.add_builtin(Builtin::new("timeserial", &["datetime.time({0}, {1}, {2})"]).imports(DATETIME));

    // Arrays. `UBound`/`LBound` of arrays with a known lower bound are resolved by the emitter.
    t.add_builtin(Builtin::new("array", &["[{*}]"]).prec(ATOM));
    t.add_builtin(Builtin::new("ubound", &["len({0}) - 1"]).prec(ADD).lenient());
    t.add_builtin(Builtin::new("lbound", &["0"]).prec(ATOM).lenient());

    // Interaction.
    t.add_builtin(Builtin::new("msgbox", &["print({0})"]).lenient());
    t.add_builtin(Builtin::new("inputbox", &["input({0})"]).lenient().str());
    t.add_builtin(Builtin::new("iif", &["({1} if {0} else {2})"]).prec(ATOM));
    t.add_builtin(Builtin::new("environ", &["os.environ.get({0}, \"\")"]).str().imports(&["import os"]));
    t.add_builtin(Builtin::new("createobject", &["_create_object({0})"]).helpers(&["_create_object"]));
    t.add_builtin(Builtin::new("doevents", &["pass"]).statement());
    t.add_builtin(Builtin::new("beep", &["print(\"\\a\", end=\"\")"]));
    t.add_builtin(Builtin::new("debug.print", &["print({*})"]));
    t.add_builtin(Builtin::new("debug.assert", &["assert {0}"]).statement());
    t.add_builtin(
        Builtin::new("err.raise", &["raise RuntimeError({0})", "raise RuntimeError({2})"])
            .lenient()
            .statement(),
    );
    t.add_builtin(Builtin::new("err.clear", &["pass"]).statement());
    t.add_builtin(Builtin::new("err.number", &["getattr(err, \"errno\", 1)"]));
    t.add_builtin(Builtin::new("err.description", &["str(err)"]).str());
}

fn register_methods(t: &mut MappingTables) {
    let collection = [
        Builtin::new("add", &["{self:p}.append({0})"]),
        Builtin::new("count", &["len({self})"]),
        Builtin::new("item", &["{self:p}[{0-1}]"]),
        Builtin::new("remove", &["{self:p}.pop({0-1})"]),
    ];
    let dictionary = [
        Builtin::new("add", &["{self:p}[{0}] = {1}"]).statement(),
        Builtin::new("count", &["len({self})"]),
        Builtin::new("exists", &["{0:p} in {self:p}"]).prec(prec::CMP),
        Builtin::new("item", &["{self:p}[{0}]"]),
        Builtin::new("items", &["list({self:p}.values())"]),
        Builtin::new("keys", &["list({self:p}.keys())"]),
        Builtin::new("remove", &["del {self:p}[{0}]"]).statement(),
        Builtin::new("removeall", &["{self:p}.clear()"]),
    ];
    for method in collection {
        t.methods.insert((Receiver::Collection, method.name.to_string()), method);
    }
    for method in dictionary {
        t.methods.insert((Receiver::Dictionary, method.name.to_string()), method);
    }
}

fn register_object_model(t: &mut MappingTables) {
    for name in [
        "Application", "ActiveWorkbook", "ActiveSheet", "ActiveCell", "ActiveChart", "ActiveWindow",
        "ThisWorkbook", "Workbooks", "Worksheets", "Sheets", "Charts", "Range", "Cells", "Rows",
        "Columns", "Selection", "WorksheetFunction", "Names", "Target",
    ] {
        t.object_model.insert(name.to_ascii_lowercase());
    }
}

fn register_unmapped(t: &mut MappingTables) {
    for name in [
        "appactivate", "callbyname", "cdate", "chdir", "chdrive", "choose", "command", "curdir",
        "dateadd", "datediff", "datepart", "datevalue", "ddb", "deletesetting", "dir", "eof",
        "error", "filecopy", "filedatetime", "filelen", "formatcurrency", "formatdatetime",
        "formatnumber", "formatpercent", "freefile", "fv", "getallsettings", "getattr", "getobject",
        "getsetting", "imestatus", "input", "inputb", "ipmt", "irr", "isdate", "iserror", "kill",
        "loadpicture", "loc", "lof", "macid", "macscript", "mkdir", "monthname", "npv", "nper",
        "objptr", "partition", "pmt", "ppmt", "pv", "qbcolor", "rate", "rmdir", "savesetting",
        "seek", "sendkeys", "setattr", "shell", "sln", "strconv", "strptr", "switch", "syd",
        "timevalue", "varptr", "vartype", "weekday", "weekdayname",
    ] {
        t.unmapped.insert(name.to_string());
    }
}

fn register_formula_functions(t: &mut MappingTables) {
    use prec::{ATOM, MUL, POW};
    const PD: &[&str] = &["import pandas as pd"];

    let functions = [
        Builtin::new("SUM", &["_numbers({*}).sum()"]).helpers(&["_numbers"]),
        Builtin::new("AVERAGE", &["_numbers({*}).mean()"]).helpers(&["_numbers"]),
        Builtin::new("MIN", &["_numbers({*}).min()"]).helpers(&["_numbers"]),
        Builtin::new("MAX", &["_numbers({*}).max()"]).helpers(&["_numbers"]),
        Builtin::new("COUNT", &["len(_numbers({*}))"]).helpers(&["_numbers"]),
        Builtin::new("COUNTA", &["_counta({*})"]).helpers(&["_counta"]),
        Builtin::new("ABS", &["abs({0})"]),
        Builtin::new("ROUND", &["round({0})", "round({0}, {1})"]),
        Builtin::new("INT", &["math.floor({0})"]).imports(MATH),
        Builtin::new("MOD", &["{0:p} % {1:p}"]).prec(MUL),
        Builtin::new("POWER", &["{0:p} ** {1:p}"]).prec(POW),
        Builtin::new("SQRT", &["math.sqrt({0})"]).imports(MATH),
        Builtin::new("IF", &["({1} if {0} else False)", "({1} if {0} else {2})"]).prec(ATOM),
        Builtin::new("IFERROR", &["_iferror(lambda: {0}, {1})"]).helpers(&["_iferror"]),
        Builtin::new("AND", &["all([{*}])"]),
        Builtin::new("OR", &["any([{*}])"]),
        Builtin::new("NOT", &["(not {0})"]).prec(ATOM),
        Builtin::new("CONCATENATE", &["\"\".join(str(v) for v in _flatten({*}))"])
            .str()
            .helpers(&["_flatten"]),
        Builtin::new("CONCAT", &["\"\".join(str(v) for v in _flatten({*}))"])
            .str()
            .helpers(&["_flatten"]),
        Builtin::new("LEFT", &["str({0})[:1]", "str({0})[:{1}]"]).str(),
        Builtin::new("RIGHT", &["str({0})[-1:]", "str({0})[len(str({0})) - {1:p}:]"]).str(),
        Builtin::new("MID", &["str({0})[{1-1}:{1-1+2}]"]).str(),
        Builtin::new("LEN", &["len(str({0}))"]),
        Builtin::new("UPPER", &["str({0}).upper()"]).str(),
        Builtin::new("LOWER", &["str({0}).lower()"]).str(),
        Builtin::new("TRIM", &["\" \".join(str({0}).split())"]).str(),
        Builtin::new("TODAY", &["pd.Timestamp.today().normalize()"]).imports(PD),
        Builtin::new("NOW", &["pd.Timestamp.now()"]).imports(PD),
        Builtin::new("YEAR", &["pd.Timestamp({0}).year"]).imports(PD),
        Builtin::new("MONTH", &["pd.Timestamp({0}).month"]).imports(PD),
        Builtin::new("DAY", &["pd.Timestamp({0}).day"]).imports(PD),
        Builtin::new("VLOOKUP", &["_vlookup({0}, {1}, {2})", "_vlookup({0}, {1}, {2}, {3})"])
            .helpers(&["_vlookup"]),
        Builtin::new("INDEX", &["_index({0}, {1})", "_index({0}, {1}, {2})"]).helpers(&["_index"]),
        Builtin::new("MATCH", &["_match({0}, {1})", "_match({0}, {1}, {2})"]).helpers(&["_match"]),
        Builtin::new("SUMIF", &["_sumif({0}, {1})", "_sumif({0}, {1}, {2})"]).helpers(&["_sumif"]),
        Builtin::new("COUNTIF", &["_countif({0}, {1})"]).helpers(&["_countif"]),
        Builtin::new("AVERAGEIF", &["_averageif({0}, {1})", "_averageif({0}, {1}, {2})"])
            .helpers(&["_averageif"]),
        Builtin::new("SUMPRODUCT", &["_sumproduct({*})"]).helpers(&["_sumproduct"]),
    ];
    for function in functions {
        t.formula_functions.insert(function.name.to_string(), function);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::helper;
    use crate::template::Arity;

    #[test]
    fn every_referenced_helper_exists() {
        let tables = MappingTables::standard();
        let formulas = tables
            .formula_function_names()
            .filter_map(|n| tables.formula_function(n));
        for builtin in tables.builtins().chain(formulas) {
            for name in builtin.helpers {
                assert!(helper(name).is_some(), "{} uses unknown helper {name}", builtin.name);
            }
            for form in builtin.forms() {
                assert!(!form.source().is_empty());
            }
        }
    }

    #[test]
    fn selects_forms_by_argument_count() {
        let tables = MappingTables::standard();
        let mid = tables.builtin("Mid").unwrap();
        assert_eq!(mid.form(2).unwrap().arity(), Arity::Exact(2));
        assert_eq!(mid.form(3).unwrap().arity(), Arity::Exact(3));
        assert!(mid.form(4).is_none());

        let msgbox = tables.builtin("MSGBOX").unwrap();
        assert_eq!(msgbox.form(3).unwrap().source(), "print({0})");

        let raise = tables.builtin("err.raise").unwrap();
        assert_eq!(raise.form(2).unwrap().source(), "raise RuntimeError({0})");
        assert_eq!(raise.form(3).unwrap().source(), "raise RuntimeError({2})");
    }

    #[test]
    fn lookups_are_case_insensitive() {
        let tables = MappingTables::standard();
        assert_eq!(tables.type_mapping("LONG").unwrap().python, "int");
        assert_eq!(tables.type_mapping("Scripting.Dictionary").unwrap().python, "dict");
        assert_eq!(tables.constant("vbCrLf").unwrap().code, "\"\\n\"");
        assert_eq!(tables.constant("xlUp").unwrap().code, "\"xlUp\"");
        assert!(tables.is_object_model("activesheet"));
        assert!(tables.is_unmapped_builtin("Shell"));
        assert!(tables.formula_function("vlookup").is_some());
        assert!(tables.method(Receiver::Dictionary, "Exists").is_some());
    }

    #[test]
    fn covers_the_listed_spreadsheet_functions() {
        let tables = MappingTables::standard();
        for name in [
            "SUM", "AVERAGE", "MIN", "MAX", "COUNT", "COUNTA", "ABS", "ROUND", "INT", "MOD",
            "POWER", "SQRT", "IF", "IFERROR", "AND", "OR", "NOT", "CONCATENATE", "CONCAT", "LEFT",
            "RIGHT", "MID", "LEN", "UPPER", "LOWER", "TRIM", "TODAY", "NOW", "YEAR", "MONTH",
            "DAY", "VLOOKUP", "INDEX", "MATCH", "SUMIF", "COUNTIF", "AVERAGEIF", "SUMPRODUCT",
        ] {
            assert!(tables.formula_function(name).is_some(), "{name}");
        }
    }
}
