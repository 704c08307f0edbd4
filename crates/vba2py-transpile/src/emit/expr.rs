use vba2py_model::NoteCode;

use super::{Emitter, ProcKind, Tr, Untranslatable, VarInfo};
use crate::emit::symbols::ProcInfo;
use crate::expr::{Arg, BinaryOp, Expr, UnaryOp};
use crate::naming::{escape_reserved, snake_case};
use crate::py::{prec, string_literal, Py};
use crate::tables::{Builtin, MappingTables, Receiver};
use crate::template::offset;

const DATETIME: &[&str] = &["import datetime"];

impl<'a> Emitter<'a> {
    pub(super) fn expr(&mut self, e: &Expr) -> Tr<Py> {
        match e {
            Expr::Int(v) => Ok(Py::int(*v)),
            Expr::Float(text) => Ok(Py::atom(text.clone())),
            Expr::Str(s) => Ok(Py::string(string_literal(s))),
            Expr::Date(text) => self.date_literal(text),
            Expr::Bool(b) => Ok(Py::atom(if *b { "True" } else { "False" })),
            Expr::Nothing => Ok(Py::atom("None")),
            Expr::Me => Ok(self.me()),
            Expr::Name(n) => self.name(n),
            Expr::Member { target, name } => self.member(target.as_deref(), name),
            Expr::Bang { target, key } => {
                let t = self.target(target.as_deref())?;
                Ok(Py::new(
                    format!("{}[{}]", t.wrapped(prec::PRIMARY), string_literal(key)),
                    prec::PRIMARY,
                ))
            }
            Expr::Call { callee, args } => self.call(callee, args, false),
            Expr::Unary { op, expr } => self.unary(*op, expr),
            Expr::Binary { op, left, right } => self.binary(*op, left, right),
            Expr::New(type_name) => Ok(construct(type_name)),
            Expr::TypeOf { expr, type_name } => {
                let value = self.expr(expr)?;
                let class = match self.tables.type_mapping(type_name) {
                    Some(m) if m.python == "Any" => "object".to_string(),
                    Some(m) => m.python.to_string(),
                    None => short_name(type_name).to_string(),
                };
                Ok(Py::new(format!("isinstance({}, {class})", value.code), prec::PRIMARY))
            }
        }
    }

    pub(super) fn me(&self) -> Py {
        if self.is_class() {
            Py::atom("self")
        } else {
            Py::atom(self.module_name)
        }
    }

    /// An explicit target, or the innermost `With` target for `.member`.
    fn target(&mut self, target: Option<&Expr>) -> Tr<Py> {
        match target {
            Some(e) => self.expr(e),
            None => self
                .with_targets
                .last()
                .cloned()
                .ok_or_else(|| Untranslatable::Form("member access outside a `With` block".to_string())),
        }
    }

    /// A local or module variable, by lower-cased name.
    pub(super) fn lookup_var(&self, lower: &str) -> Option<VarInfo> {
        self.scope
            .as_ref()
            .and_then(|s| s.locals.get(lower))
            .or_else(|| self.symbols.module_vars.get(lower))
            .cloned()
    }

    pub(super) fn var_ref(&self, var: &VarInfo) -> Py {
        let code = if var.field {
            format!("self.{}", var.py)
        } else {
            var.py.clone()
        };
        Py::atom(code).with_str(var.is_str)
    }

    /// How calls to a procedure of this module are spelled.
    pub(super) fn proc_callee(&self, proc: &ProcInfo) -> String {
        if self.is_class() {
            format!("self.{}", escape_reserved(proc.name.clone()))
        } else {
            snake_case(&proc.name)
        }
    }

    fn name(&mut self, n: &str) -> Tr<Py> {
        let lower = n.to_ascii_lowercase();
        if let Some(scope) = &self.scope {
            if scope.result_name.as_deref() == Some(lower.as_str()) {
                return Ok(Py::atom("_result").with_str(scope.result_is_str));
            }
        }
        if let Some(var) = self.lookup_var(&lower) {
            return Ok(self.var_ref(&var));
        }
        if let Some(proc) = self.symbols.procedures.get(&lower).cloned() {
            let callee = self.proc_callee(&proc);
            if proc.kind.is_property() && self.is_class() {
                return Ok(Py::atom(callee).with_str(proc.returns_str));
            }
            return Ok(Py::new(format!("{callee}()"), prec::PRIMARY).with_str(proc.returns_str));
        }
        if let Some((owner, member)) = self.symbols.enum_members.get(&lower).cloned() {
            if self.current_enum.as_deref() == Some(owner.as_str()) {
                return Ok(Py::atom(member));
            }
            return Ok(Py::new(format!("{owner}.{member}"), prec::PRIMARY));
        }
        let tables = self.tables;
        if let Some(constant) = tables.constant(n) {
            self.use_imports(constant.imports);
            return Ok(Py::atom(constant.code.clone()).with_str(constant.is_str));
        }
        if let Some(builtin) = tables.builtin(n) {
            if builtin.form(0).is_some() {
                return self.render(builtin, None, Vec::new(), false);
            }
        }
        if tables.is_unmapped_builtin(n) {
            return Err(Untranslatable::Unmapped(n.to_string()));
        }
        if tables.is_object_model(n) {
            return Ok(Py::atom(n));
        }
        if let Some(name) = self.symbols.enums.get(&lower).or_else(|| self.symbols.user_types.get(&lower)) {
            return Ok(Py::atom(name.clone()));
        }
        Ok(Py::atom(snake_case(n)))
    }

    fn member(&mut self, target: Option<&Expr>, name: &str) -> Tr<Py> {
        if let Some(builtin) = self.qualified_builtin(target, name) {
            if builtin.form(0).is_some() {
                return self.render(builtin, None, Vec::new(), false);
            }
        }
        let t = self.target(target)?;
        if let Some(receiver) = self.receiver_of(target) {
            let tables = self.tables;
            if let Some(method) = tables.method(receiver, name) {
                if method.form(0).is_some() {
                    return self.render(method, Some(&t), Vec::new(), false);
                }
            }
        }
        Ok(Py::new(format!("{}.{name}", t.wrapped(prec::PRIMARY)), prec::PRIMARY))
    }

    /// `Err.Number`, `Debug.Print` and other receiver-qualified runtime members.
    fn qualified_builtin(&self, target: Option<&Expr>, name: &str) -> Option<&'a Builtin> {
        let Some(Expr::Name(owner)) = target else {
            return None;
        };
        if self.lookup_var(&owner.to_ascii_lowercase()).is_some() {
            return None;
        }
        let tables: &'a MappingTables = self.tables;
        tables.builtin(&format!("{owner}.{name}"))
    }

    /// Receiver family of a variable expression, when it was declared as one.
    pub(super) fn receiver_of(&self, target: Option<&Expr>) -> Option<Receiver> {
        match target? {
            Expr::Name(n) => self.lookup_var(&n.to_ascii_lowercase())?.receiver,
            Expr::Member { target: Some(me), name } if **me == Expr::Me && self.is_class() => {
                self.symbols.module_vars.get(&name.to_ascii_lowercase())?.receiver
            }
            _ => None,
        }
    }

    pub(super) fn call(&mut self, callee: &Expr, args: &[Arg], statement: bool) -> Tr<Py> {
        match callee {
            Expr::Name(n) => self.call_name(n, args, statement),
            Expr::Member { target, name } => self.call_member(target.as_deref(), name, args, statement),
            other => {
                let c = self.expr(other)?;
                let a = self.plain_args(args)?;
                Ok(Py::new(format!("{}({a})", c.wrapped(prec::PRIMARY)), prec::PRIMARY))
            }
        }
    }

    fn call_name(&mut self, n: &str, args: &[Arg], statement: bool) -> Tr<Py> {
        let lower = n.to_ascii_lowercase();
        if let Some(var) = self.lookup_var(&lower) {
            let base = self.var_ref(&var);
            let bases = match (&var.bases, var.receiver) {
                (Some(bases), _) => bases.clone(),
                (None, Some(Receiver::Collection)) => vec![1],
                _ => vec![0],
            };
            return self.subscript(base, args, &bases);
        }
        if let Some(proc) = self.symbols.procedures.get(&lower).cloned() {
            if args.is_empty() && proc.kind.is_property() && self.is_class() {
                return Ok(Py::atom(self.proc_callee(&proc)).with_str(proc.returns_str));
            }
            let callee = self.proc_callee(&proc);
            return self.user_call(callee, Some(&proc), args, proc.returns_str);
        }
        if lower == "ubound" || lower == "lbound" {
            if let Some(bound) = self.array_bound(lower == "ubound", args)? {
                return Ok(bound);
            }
        }
        let tables = self.tables;
        if let Some(builtin) = tables.builtin(n) {
            let values = self.builtin_args(args)?;
            return self.render(builtin, None, values, statement);
        }
        if tables.is_unmapped_builtin(n) {
            return Err(Untranslatable::Unmapped(n.to_string()));
        }
        if tables.is_object_model(n) {
            let a = self.plain_args(args)?;
            return Ok(Py::new(format!("{n}({a})"), prec::PRIMARY));
        }
        self.user_call(snake_case(n), None, args, false)
    }

    fn call_member(&mut self, target: Option<&Expr>, name: &str, args: &[Arg], statement: bool) -> Tr<Py> {
        if let Some(builtin) = self.qualified_builtin(target, name) {
            let values = self.builtin_args(args)?;
            return self.render(builtin, None, values, statement);
        }
        if matches!(target, Some(Expr::Me)) && self.is_class() {
            if let Some(proc) = self.symbols.procedures.get(&name.to_ascii_lowercase()).cloned() {
                let callee = self.proc_callee(&proc);
                return self.user_call(callee, Some(&proc), args, proc.returns_str);
            }
        }
        let t = self.target(target)?;
        if let Some(receiver) = self.receiver_of(target) {
            let tables = self.tables;
            if let Some(method) = tables.method(receiver, name) {
                let values = self.builtin_args(args)?;
                return self.render(method, Some(&t), values, statement);
            }
        }
        let a = self.plain_args(args)?;
        Ok(Py::new(format!("{}.{name}({a})", t.wrapped(prec::PRIMARY)), prec::PRIMARY))
    }

    /// Call to a procedure; named arguments become keywords.
    fn user_call(&mut self, callee: String, proc: Option<&ProcInfo>, args: &[Arg], returns_str: bool) -> Tr<Py> {
        let mut parts = Vec::with_capacity(args.len());
        for arg in args {
            let value = match &arg.value {
                Some(v) => self.expr(v)?.code,
                None => "None".to_string(),
            };
            match &arg.name {
                Some(name) => {
                    let known = proc.is_some_and(|p| p.params.contains(&name.to_ascii_lowercase()));
                    let keyword = if known || proc.is_none() {
                        snake_case(name)
                    } else {
                        return Err(Untranslatable::Form(format!("`{name}` is not a parameter of `{callee}`")));
                    };
                    parts.push(format!("{keyword}={value}"));
                }
                None => parts.push(value),
            }
        }
        Ok(Py::new(format!("{callee}({})", parts.join(", ")), prec::PRIMARY).with_str(returns_str))
    }

    /// Arguments of a call whose parameters are not known; named arguments keep their spelling.
    fn plain_args(&mut self, args: &[Arg]) -> Tr<String> {
        let mut parts = Vec::with_capacity(args.len());
        for arg in args {
            let value = match &arg.value {
                Some(v) => self.expr(v)?.code,
                None => "None".to_string(),
            };
            parts.push(match &arg.name {
                Some(name) => format!("{name}={value}"),
                None => value,
            });
        }
        Ok(parts.join(", "))
    }

    fn builtin_args(&mut self, args: &[Arg]) -> Tr<Vec<Option<Py>>> {
        args.iter()
            .map(|arg| arg.value.as_ref().map(|v| self.expr(v)).transpose())
            .collect()
    }

    /// Renders a table entry: the form for this argument count, its imports and helpers.
    pub(super) fn render(
        &mut self,
        builtin: &Builtin,
        receiver: Option<&Py>,
        args: Vec<Option<Py>>,
        statement: bool,
    ) -> Tr<Py> {
        if builtin.statement_only && !statement {
            return Err(Untranslatable::Form(format!(
                "`{}` can only be used as a statement",
                builtin.name
            )));
        }
        let form = builtin.form(args.len()).ok_or_else(|| Untranslatable::Arity {
            name: builtin.name.to_string(),
            argc: args.len(),
        })?;
        let rendered = form.render(receiver, &args);
        if rendered.adjusted {
            self.info(
                NoteCode::IndexAdjustment,
                format!("`{}` position is converted from 1-based at runtime", builtin.name),
            );
        }
        self.use_imports(builtin.imports);
        self.use_helpers(builtin.helpers);
        Ok(Py::new(rendered.code, builtin.prec).with_str(builtin.returns_str))
    }

    /// `base[i][j]`, with each index moved from its declared lower bound to 0.
    pub(super) fn subscript(&mut self, base: Py, args: &[Arg], bases: &[i64]) -> Tr<Py> {
        if args.is_empty() {
            return Ok(base);
        }
        let mut code = base.wrapped(prec::PRIMARY);
        for (i, arg) in args.iter().enumerate() {
            let value = arg
                .value
                .as_ref()
                .ok_or_else(|| Untranslatable::Form("missing array index".to_string()))?;
            let index = self.expr(value)?;
            let lower = bases.get(i).or(bases.last()).copied().unwrap_or(0);
            let (text, shifted) = offset(&index, -lower);
            if shifted {
                self.info(
                    NoteCode::IndexAdjustment,
                    format!("index into `{}` is shifted from base {lower} at runtime", base.code),
                );
            }
            code.push('[');
            code.push_str(&text);
            code.push(']');
        }
        Ok(Py::new(code, prec::PRIMARY))
    }

    /// `UBound`/`LBound` of an array whose lower bounds are known.
    fn array_bound(&mut self, upper: bool, args: &[Arg]) -> Tr<Option<Py>> {
        let Some(Some(Expr::Name(n))) = args.first().map(|a| a.value.as_ref()) else {
            return Ok(None);
        };
        let Some(var) = self.lookup_var(&n.to_ascii_lowercase()) else {
            return Ok(None);
        };
        let Some(bases) = var.bases.clone() else {
            return Ok(None);
        };
        let dim = match args.get(1).and_then(|a| a.value.as_ref()) {
            None => 1,
            Some(Expr::Int(d)) if *d >= 1 => *d as usize,
            Some(_) => return Ok(None),
        };
        let lower = bases.get(dim - 1).or(bases.last()).copied().unwrap_or(0);
        if !upper {
            return Ok(Some(Py::int(lower)));
        }
        let mut target = self.var_ref(&var).code;
        for _ in 1..dim {
            target.push_str("[0]");
        }
        let len = format!("len({target})");
        Ok(Some(match lower - 1 {
            0 => Py::new(len, prec::PRIMARY),
            d if d < 0 => Py::new(format!("{len} - {}", -d), prec::ADD),
            d => Py::new(format!("{len} + {d}"), prec::ADD),
        }))
    }

    fn unary(&mut self, op: UnaryOp, operand: &Expr) -> Tr<Py> {
        let value = self.expr(operand)?;
        Ok(match op {
            UnaryOp::Plus => value,
            UnaryOp::Neg => match value.int_value {
                Some(n) => Py::int(-n),
                None => Py::new(format!("-{}", value.wrapped(prec::UNARY)), prec::UNARY),
            },
            UnaryOp::Not => Py::new(format!("not {}", value.wrapped(prec::NOT)), prec::NOT),
        })
    }

    fn binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> Tr<Py> {
        let l = self.expr(left)?;
        let r = self.expr(right)?;
        let infix = |sym: &str, p: u8, l: &Py, r: &Py| {
            Py::new(format!("{} {sym} {}", l.wrapped(p), r.wrapped(p + 1)), p)
        };
        let compare = |sym: &str, l: &Py, r: &Py| {
            Py::new(
                format!("{} {sym} {}", l.wrapped(prec::CMP + 1), r.wrapped(prec::CMP + 1)),
                prec::CMP,
            )
        };
        Ok(match op {
            BinaryOp::Pow => Py::new(
                format!("{} ** {}", l.wrapped(prec::POW + 1), r.wrapped(prec::UNARY)),
                prec::POW,
            ),
            BinaryOp::Mul => infix("*", prec::MUL, &l, &r),
            BinaryOp::Div => infix("/", prec::MUL, &l, &r),
            BinaryOp::IntDiv => infix("//", prec::MUL, &l, &r),
            BinaryOp::Mod => infix("%", prec::MUL, &l, &r),
            BinaryOp::Add => {
                let is_str = l.is_str && r.is_str;
                infix("+", prec::ADD, &l, &r).with_str(is_str)
            }
            BinaryOp::Sub => infix("-", prec::ADD, &l, &r),
            BinaryOp::Concat => infix("+", prec::ADD, &l.into_str(), &r.into_str()).with_str(true),
            BinaryOp::Eq => compare("==", &l, &r),
            BinaryOp::Ne => compare("!=", &l, &r),
            BinaryOp::Lt => compare("<", &l, &r),
            BinaryOp::Gt => compare(">", &l, &r),
            BinaryOp::Le => compare("<=", &l, &r),
            BinaryOp::Ge => compare(">=", &l, &r),
            BinaryOp::Is => compare("is", &l, &r),
            BinaryOp::Like => {
                self.use_helper("_like");
                Py::new(format!("_like({}, {})", l.code, r.code), prec::PRIMARY)
            }
            BinaryOp::And => infix("and", prec::AND, &l, &r),
            BinaryOp::Or => infix("or", prec::OR, &l, &r),
            BinaryOp::Xor => Py::new(format!("bool({}) != bool({})", l.code, r.code), prec::CMP),
            BinaryOp::Eqv => Py::new(format!("bool({}) == bool({})", l.code, r.code), prec::CMP),
            BinaryOp::Imp => Py::new(
                format!("not {} or {}", l.wrapped(prec::NOT), r.wrapped(prec::OR + 1)),
                prec::OR,
            ),
        })
    }

    /// `#1/15/2024#`, `#2024-01-15#`, `#1/15/2024 10:30:00 PM#`, `#10:30#`.
    fn date_literal(&mut self, text: &str) -> Tr<Py> {
        let bad = || Untranslatable::Form(format!("unrecognized date literal `#{text}#`"));
        let mut words = text.split_whitespace();
        let first = words.next().ok_or_else(bad)?;
        let (date, time_words): (Option<(i64, i64, i64)>, Vec<&str>) = if first.contains(':') {
            (None, std::iter::once(first).chain(words).collect())
        } else {
            (Some(parse_date(first).ok_or_else(bad)?), words.collect())
        };
        let time = match time_words.as_slice() {
            [] => None,
            [clock] => Some(parse_time(clock, None).ok_or_else(bad)?),
            [clock, meridiem] => Some(parse_time(clock, Some(meridiem)).ok_or_else(bad)?),
            _ => return Err(bad()),
        };
        self.use_imports(DATETIME);
        let code = match (date, time) {
            (Some((y, m, d)), None) => format!("datetime.date({y}, {m}, {d})"),
            (Some((y, m, d)), Some((h, mi, s))) => format!("datetime.datetime({y}, {m}, {d}, {h}, {mi}, {s})"),
            (None, Some((h, mi, s))) => format!("datetime.time({h}, {mi}, {s})"),
            (None, None) => return Err(bad()),
        };
        Ok(Py::new(code, prec::PRIMARY))
    }

    /// Python target for an assignment; records `global` for rebound module variables.
    pub(super) fn lvalue(&mut self, target: &Expr) -> Tr<String> {
        match target {
            Expr::Name(n) => self.assign_name(n),
            Expr::Member { target, name } => {
                let t = self.target(target.as_deref())?;
                Ok(format!("{}.{name}", t.wrapped(prec::PRIMARY)))
            }
            Expr::Bang { target, key } => {
                let t = self.target(target.as_deref())?;
                Ok(format!("{}[{}]", t.wrapped(prec::PRIMARY), string_literal(key)))
            }
            Expr::Call { callee, args } => match callee.as_ref() {
                Expr::Name(n) => {
                    let lower = n.to_ascii_lowercase();
                    if self.lookup_var(&lower).is_some() {
                        return Ok(self.call_name(n, args, false)?.code);
                    }
                    if self.tables.is_object_model(n) {
                        let a = self.plain_args(args)?;
                        return Ok(format!("{n}({a}).Value"));
                    }
                    if self.symbols.procedures.contains_key(&lower)
                        || self.tables.builtin(n).is_some()
                        || self.tables.is_unmapped_builtin(n)
                    {
                        return Err(Untranslatable::Form(format!("cannot assign to a call of `{n}`")));
                    }
                    let base = Py::atom(snake_case(n));
                    Ok(self.subscript(base, args, &[0])?.code)
                }
                Expr::Member { target: t, name } => {
                    if let Some(receiver) = self.receiver_of(t.as_deref()) {
                        if self.tables.method(receiver, name).is_some() {
                            return Ok(self.call(callee, args, false)?.code);
                        }
                    }
                    Ok(format!("{}.Value", self.call(callee, args, false)?.code))
                }
                _ => Ok(self.expr(target)?.code),
            },
            _ => Err(Untranslatable::Form("not an assignable expression".to_string())),
        }
    }

    /// Target for rebinding a bare name.
    pub(super) fn assign_name(&mut self, n: &str) -> Tr<String> {
        let lower = n.to_ascii_lowercase();
        let is_class = self.is_class();
        if let Some(scope) = &self.scope {
            if scope.result_name.as_deref() == Some(lower.as_str()) {
                return Ok("_result".to_string());
            }
            if let Some(var) = scope.locals.get(&lower) {
                return Ok(var.py.clone());
            }
        }
        if let Some(var) = self.symbols.module_vars.get(&lower).cloned() {
            if var.is_const {
                return Err(Untranslatable::Form(format!("assignment to constant `{n}`")));
            }
            if var.field {
                return Ok(format!("self.{}", var.py));
            }
            if let Some(scope) = self.scope.as_mut() {
                scope.globals.insert(var.py.clone());
            }
            return Ok(var.py);
        }
        if let Some(proc) = self.symbols.procedures.get(&lower).cloned() {
            if is_class && proc.kind.is_property() {
                return Ok(self.proc_callee(&proc));
            }
            if proc.kind != ProcKind::Sub {
                return Err(Untranslatable::Form(format!(
                    "assignment to `{n}` outside its own procedure"
                )));
            }
        }
        if self.tables.is_object_model(n) {
            return Ok(format!("{n}.Value"));
        }
        let py = snake_case(n);
        if let Some(scope) = self.scope.as_mut() {
            scope.locals.insert(lower, VarInfo::scalar(py.clone()));
        }
        Ok(py)
    }
}

fn short_name(type_name: &str) -> &str {
    type_name.rsplit('.').next().unwrap_or(type_name)
}

/// `New T`: collections and dictionaries become literals, anything else a constructor call.
pub(super) fn construct(type_name: &str) -> Py {
    match type_name.to_ascii_lowercase().as_str() {
        "collection" | "vba.collection" => Py::atom("[]"),
        "dictionary" | "scripting.dictionary" => Py::atom("{}"),
        _ => Py::new(format!("{}()", short_name(type_name)), prec::PRIMARY),
    }
}

fn parse_date(text: &str) -> Option<(i64, i64, i64)> {
    let parts: Vec<i64> = text
        .split(['/', '-'])
        .map(|p| p.parse().ok())
        .collect::<Option<_>>()?;
    let (y, m, d) = match parts.as_slice() {
        [y, m, d] if text.contains('-') => (*y, *m, *d),
        [m, d, y] => (*y, *m, *d),
        _ => return None,
    };
    let y = match y {
        0..=29 => 2000 + y,
        30..=99 => 1900 + y,
        _ => y,
    };
    ((1..=12).contains(&m) && (1..=31).contains(&d)).then_some((y, m, d))
}

fn parse_time(text: &str, meridiem: Option<&str>) -> Option<(i64, i64, i64)> {
    let parts: Vec<i64> = text.split(':').map(|p| p.parse().ok()).collect::<Option<_>>()?;
    let (mut h, m, s) = match parts.as_slice() {
        [h, m] => (*h, *m, 0),
        [h, m, s] => (*h, *m, *s),
        _ => return None,
    };
    match meridiem.map(str::to_ascii_uppercase).as_deref() {
        None => {}
        Some("AM") if h == 12 => h = 0,
        Some("AM") => {}
        Some("PM") if h < 12 => h += 12,
        Some("PM") => {}
        Some(_) => return None,
    }
    (h < 24 && m < 60 && s < 60).then_some((h, m, s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_date_literal_shapes() {
        assert_eq!(parse_date("1/15/2024"), Some((2024, 1, 15)));
        assert_eq!(parse_date("2024-01-15"), Some((2024, 1, 15)));
        assert_eq!(parse_date("3/4/99"), Some((1999, 3, 4)));
        assert_eq!(parse_date("13/1/2024"), None);
        assert_eq!(parse_time("10:30", Some("PM")), Some((22, 30, 0)));
        assert_eq!(parse_time("12:05:09", Some("am")), Some((0, 5, 9)));
    }

    #[test]
    fn constructs_known_containers() {
        assert_eq!(construct("Collection").code, "[]");
        assert_eq!(construct("Scripting.Dictionary").code, "{}");
        assert_eq!(construct("Policy").code, "Policy()");
    }
}
