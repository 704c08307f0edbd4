use vba2py_syntax::{split_inline_if, Block, BlockKind, Node, NodeId, Statement, Token, TokenKind};

use super::{Emitter, Tr, Untranslatable, VarInfo};
use crate::expr::{parse_call_statement, parse_expression, parse_lvalue, split_top_level, top_level_eq, Expr};
use crate::py::{prec, Py};
use crate::tables::Receiver;
use crate::template::offset;

/// Statements that open a syntactic region of their own and are never wrapped in `suppress`.
fn wraps_in_suppress(stmt: &Statement) -> bool {
    let Some(first) = stmt.first() else {
        return false;
    };
    !(["dim", "const", "static", "private", "public", "on", "exit", "if", "option", "end"]
        .iter()
        .any(|kw| first.is_kw(kw))
        || stmt.label().is_some())
}

fn keyword_index(toks: &[Token], word: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, tok) in toks.iter().enumerate() {
        match tok.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => depth = depth.saturating_sub(1),
            _ if depth == 0 && tok.is_kw(word) => return Some(i),
            _ => {}
        }
    }
    None
}

fn expression(toks: &[Token]) -> Tr<Expr> {
    Ok(parse_expression(toks)?)
}

/// Condition of a `Do` loop in its source polarity.
enum LoopTest {
    While(Py),
    Until(Py),
}

impl LoopTest {
    fn keep_going(&self) -> String {
        match self {
            LoopTest::While(cond) => cond.code.clone(),
            LoopTest::Until(cond) => format!("not {}", cond.wrapped(prec::NOT)),
        }
    }

    fn stop(&self) -> String {
        match self {
            LoopTest::While(cond) => format!("not {}", cond.wrapped(prec::NOT)),
            LoopTest::Until(cond) => cond.code.clone(),
        }
    }
}

impl Emitter<'_> {
    /// Emits a block body. `On Error Resume Next` regions end with the enclosing block.
    pub(super) fn body(&mut self, nodes: &[NodeId]) {
        let saved = self.scope.as_ref().map(|s| s.suppress);
        for &id in nodes {
            self.node(id);
        }
        if let (Some(scope), Some(saved)) = (self.scope.as_mut(), saved) {
            scope.suppress = saved;
        }
    }

    fn node(&mut self, id: NodeId) {
        let tree = self.tree;
        match tree.node(id) {
            Node::Statement(stmt) => self.statement(stmt),
            Node::Block(block) => self.block(block),
        }
    }

    pub(super) fn statement(&mut self, stmt: &Statement) {
        if stmt.is_blank() {
            self.out.blank();
            return;
        }
        if let (true, Some(comment)) = (stmt.is_comment_only(), stmt.comment.as_deref()) {
            self.out.comment(comment);
            return;
        }
        self.line = stmt.line;
        if let Some(label) = stmt.label() {
            self.out.comment(&format!("{label}:"));
            return;
        }

        let mark = self.mark();
        let suppress = self.scope.as_ref().is_some_and(|s| s.suppress) && wraps_in_suppress(stmt);
        let result = if suppress {
            self.use_import("from contextlib import suppress");
            self.out.line("with suppress(Exception):");
            let block = self.out.open_block();
            let result = self.simple(stmt);
            self.out.close_block(block);
            result
        } else {
            self.simple(stmt)
        };
        match result {
            Ok(()) => {
                if let Some(comment) = &stmt.comment {
                    self.out.annotate(mark.lines, comment);
                }
            }
            Err(err) => {
                self.rollback(mark);
                self.give_up(&stmt.text, &err);
                if let Some(comment) = &stmt.comment {
                    self.out.comment(comment);
                }
            }
        }
    }

    /// One simple statement. Fallible work happens before any line is written.
    fn simple(&mut self, stmt: &Statement) -> Tr<()> {
        let toks = &stmt.tokens;
        let first = &toks[0];
        if first.is_kw("if") {
            return self.inline_if(stmt);
        }
        if first.kind == TokenKind::Keyword {
            let word = first.lexeme.to_ascii_lowercase();
            return match word.as_str() {
                "dim" | "static" | "private" | "public" | "global" | "friend" | "const" => self.declaration(stmt),
                "redim" => self.redim(&toks[1..]),
                "erase" => self.erase(&toks[1..]),
                "set" | "let" => self.assignment(&toks[1..], true),
                "call" => self.call_statement(&toks[1..]),
                "exit" => self.exit(toks),
                "on" => self.on_error(toks),
                "goto" | "gosub" | "return" => Err(Untranslatable::Unsupported(format!(
                    "`{}` jumps have no structured equivalent",
                    first.lexeme
                ))),
                "resume" => Err(Untranslatable::Unsupported("`Resume` is not translated".to_string())),
                "end" if toks.len() == 1 => {
                    self.out.line("raise SystemExit");
                    Ok(())
                }
                "stop" => {
                    self.out.line("breakpoint()");
                    Ok(())
                }
                "option" => Ok(()),
                "declare" => Err(Untranslatable::Unsupported("external library declarations".to_string())),
                "implements" | "event" | "raiseevent" => Err(Untranslatable::Unsupported(format!(
                    "`{}` has no Python counterpart",
                    first.lexeme
                ))),
                "me" | "error" | "input" => self.assignment_or_call(toks),
                _ => Err(Untranslatable::Form(format!("unrecognized statement `{}`", first.lexeme))),
            };
        }
        self.assignment_or_call(toks)
    }

    fn assignment_or_call(&mut self, toks: &[Token]) -> Tr<()> {
        if let Some(eq) = top_level_eq(toks) {
            if eq > 0 && parse_lvalue(&toks[..eq]).is_ok() {
                return self.assignment(toks, false);
            }
        }
        self.call_statement(toks)
    }

    fn assignment(&mut self, toks: &[Token], _is_set: bool) -> Tr<()> {
        let eq = top_level_eq(toks).ok_or_else(|| Untranslatable::Form("expected `=`".to_string()))?;
        let target = parse_lvalue(&toks[..eq])?;
        let value = expression(&toks[eq + 1..])?;
        let py_value = self.expr(&value)?;
        let py_target = self.lvalue(&target)?;
        if let Expr::Name(n) = &target {
            self.infer_receiver(n, &value);
        }
        self.out.line(format!("{py_target} = {}", py_value.code));
        Ok(())
    }

    /// `Set d = New Collection` or `CreateObject("Scripting.Dictionary")` gives an untyped
    /// variable a receiver family.
    fn infer_receiver(&mut self, name: &str, value: &Expr) {
        let receiver = match value {
            Expr::New(t) => match t.to_ascii_lowercase().as_str() {
                "collection" | "vba.collection" => Some(Receiver::Collection),
                "dictionary" | "scripting.dictionary" => Some(Receiver::Dictionary),
                _ => None,
            },
            Expr::Call { callee, args } => match (callee.as_ref(), args.as_slice()) {
                (Expr::Name(f), [arg]) if f.eq_ignore_ascii_case("createobject") => match &arg.value {
                    Some(Expr::Str(prog_id)) if prog_id.eq_ignore_ascii_case("scripting.dictionary") => {
                        Some(Receiver::Dictionary)
                    }
                    _ => None,
                },
                _ => None,
            },
            _ => None,
        };
        let Some(receiver) = receiver else {
            return;
        };
        let lower = name.to_ascii_lowercase();
        if let Some(var) = self.scope.as_mut().and_then(|s| s.locals.get_mut(&lower)) {
            var.receiver.get_or_insert(receiver);
        } else if let Some(var) = self.symbols.module_vars.get_mut(&lower) {
            var.receiver.get_or_insert(receiver);
        }
    }

    fn call_statement(&mut self, toks: &[Token]) -> Tr<()> {
        if toks.is_empty() {
            return Err(Untranslatable::Form("expected a procedure name".to_string()));
        }
        let (callee, args) = parse_call_statement(toks)?;
        let py = match &callee {
            Expr::Name(_) | Expr::Member { .. } => self.call(&callee, &args, true)?,
            other => {
                let py = self.expr(other)?;
                Py::new(format!("{}()", py.wrapped(prec::PRIMARY)), prec::PRIMARY)
            }
        };
        self.out.line(py.code);
        Ok(())
    }

    fn exit(&mut self, toks: &[Token]) -> Tr<()> {
        let what = toks.get(1).map(|t| t.lexeme.to_ascii_lowercase()).unwrap_or_default();
        let line = match what.as_str() {
            "for" | "do" => "break",
            "sub" | "function" | "property" => {
                self.scope
                    .as_ref()
                    .ok_or_else(|| Untranslatable::Form("`Exit` outside a procedure".to_string()))?
                    .exit
            }
            _ => return Err(Untranslatable::Form("unrecognized `Exit` statement".to_string())),
        };
        self.out.line(line);
        Ok(())
    }

    /// `On Error Resume Next` and `On Error GoTo 0`. Handler jumps are restructured at the
    /// procedure level; any other shape is unsupported.
    fn on_error(&mut self, toks: &[Token]) -> Tr<()> {
        let words: Vec<String> = toks.iter().map(|t| t.lexeme.to_ascii_lowercase()).collect();
        let words: Vec<&str> = words.iter().map(String::as_str).collect();
        let scope = self
            .scope
            .as_mut()
            .ok_or_else(|| Untranslatable::Form("`On Error` outside a procedure".to_string()))?;
        match words.as_slice() {
            ["on", "error", "resume", "next"] => {
                scope.suppress = true;
                Ok(())
            }
            ["on", "error", "goto", "0"] | ["on", "error", "goto", "-1"] => {
                scope.suppress = false;
                Ok(())
            }
            ["on", "error", "goto", _] => Err(Untranslatable::Unsupported(
                "error handler jumps are only translated at procedure level".to_string(),
            )),
            _ => Err(Untranslatable::Unsupported(
                "computed `On ... GoTo` has no structured equivalent".to_string(),
            )),
        }
    }

    /// `If cond Then a: b Else c` on one line.
    fn inline_if(&mut self, stmt: &Statement) -> Tr<()> {
        let parts = split_inline_if(self.source, stmt)
            .ok_or_else(|| Untranslatable::Form("incomplete `If` statement".to_string()))?;
        let cond = self.expr(&expression(&parts.condition)?)?;
        self.out.line(format!("if {}:", cond.code));
        let block = self.out.open_block();
        for s in &parts.then_branch {
            self.statement(s);
        }
        self.out.close_block(block);
        if !parts.else_branch.is_empty() {
            self.out.line("else:");
            let block = self.out.open_block();
            for s in &parts.else_branch {
                self.statement(s);
            }
            self.out.close_block(block);
        }
        Ok(())
    }

    pub(super) fn block(&mut self, block: &Block) {
        self.line = block.header().line;
        let mark = self.mark();
        let result = match block.kind {
            BlockKind::If => self.if_block(block),
            BlockKind::For => self.for_block(block),
            BlockKind::Do => self.do_block(block),
            BlockKind::While => self.while_block(block),
            BlockKind::SelectCase => self.select_block(block),
            BlockKind::With => self.with_block(block),
            BlockKind::Procedure | BlockKind::Enum | BlockKind::Type => Err(Untranslatable::Form(format!(
                "`{}` is only allowed at module level",
                block.kind
            ))),
        };
        if let Err(err) = result {
            self.rollback(mark);
            self.line = block.header().line;
            self.give_up(&block.header().text, &err);
            for (i, arm) in block.arms.iter().enumerate() {
                if i > 0 {
                    self.out.comment(&arm.header.text);
                }
                self.body(&arm.body);
            }
        }
    }

    fn if_block(&mut self, block: &Block) -> Tr<()> {
        let mut conditions = Vec::with_capacity(block.arms.len());
        for arm in &block.arms {
            let toks = &arm.header.tokens;
            if toks[0].is_kw("else") {
                conditions.push(None);
                continue;
            }
            let then = toks
                .iter()
                .rposition(|t| t.is_kw("then"))
                .ok_or_else(|| Untranslatable::Form("expected `Then`".to_string()))?;
            conditions.push(Some(self.expr(&expression(&toks[1..then])?)?));
        }
        for (i, (arm, cond)) in block.arms.iter().zip(conditions).enumerate() {
            let header = match (i, cond) {
                (0, Some(c)) => format!("if {}:", c.code),
                (_, Some(c)) => format!("elif {}:", c.code),
                (_, None) => "else:".to_string(),
            };
            self.out.line(header);
            if let Some(comment) = &arm.header.comment {
                self.out.annotate(self.out.len() - 1, comment);
            }
            let body = self.out.open_block();
            self.body(&arm.body);
            self.out.close_block(body);
        }
        Ok(())
    }

    fn for_block(&mut self, block: &Block) -> Tr<()> {
        let toks = &block.header().tokens;
        let header = if toks.get(1).is_some_and(|t| t.is_kw("each")) {
            let in_idx = keyword_index(toks, "in").ok_or_else(|| Untranslatable::Form("expected `In`".to_string()))?;
            let items = self.expr(&expression(&toks[in_idx + 1..])?)?;
            let var = self.lvalue(&parse_lvalue(&toks[2..in_idx])?)?;
            format!("for {var} in {}:", items.code)
        } else {
            let eq = top_level_eq(toks).ok_or_else(|| Untranslatable::Form("expected `=`".to_string()))?;
            let to = keyword_index(toks, "to").ok_or_else(|| Untranslatable::Form("expected `To`".to_string()))?;
            let step_idx = keyword_index(toks, "step");
            let start = self.expr(&expression(&toks[eq + 1..to])?)?;
            let end = self.expr(&expression(&toks[to + 1..step_idx.unwrap_or(toks.len())])?)?;
            let step = match step_idx {
                Some(s) => Some(self.expr(&expression(&toks[s + 1..])?)?),
                None => None,
            };
            let var = self.lvalue(&parse_lvalue(&toks[1..eq])?)?;
            format!("for {var} in {}:", self.range(start, end, step))
        };
        self.out.line(header);
        let body = self.out.open_block();
        self.body(&block.arms[0].body);
        self.out.close_block(body);
        Ok(())
    }

    /// Inclusive VBA bounds as a Python iterable.
    fn range(&mut self, start: Py, end: Py, step: Option<Py>) -> String {
        let is_float = |p: &Py| p.int_value.is_none() && p.code.parse::<f64>().is_ok();
        let float_bounds = is_float(&start) || is_float(&end);
        match step {
            None if !float_bounds => {
                let (stop, _) = offset(&end, 1);
                if start.int_value == Some(0) {
                    format!("range({stop})")
                } else {
                    format!("range({}, {stop})", start.code)
                }
            }
            Some(step) if !float_bounds && step.int_value.is_some_and(|s| s != 0) => {
                let delta = if step.int_value.unwrap_or(1) > 0 { 1 } else { -1 };
                let (stop, _) = offset(&end, delta);
                format!("range({}, {stop}, {})", start.code, step.code)
            }
            step => {
                self.use_helper("_frange");
                let step = step.map_or_else(|| "1".to_string(), |s| s.code);
                format!("_frange({}, {}, {step})", start.code, end.code)
            }
        }
    }

    fn do_block(&mut self, block: &Block) -> Tr<()> {
        let head = &block.header().tokens;
        let tail = &block.close.tokens;
        let head_cond = self.loop_condition(&head[1..])?;
        let tail_cond = self.loop_condition(&tail[1..])?;
        if head_cond.is_some() && tail_cond.is_some() {
            return Err(Untranslatable::Form("`Do` loop with two conditions".to_string()));
        }
        match &head_cond {
            Some(test) => self.out.line(format!("while {}:", test.keep_going())),
            None => self.out.line("while True:"),
        }
        let body = self.out.open_block();
        self.body(&block.arms[0].body);
        if let Some(test) = tail_cond {
            self.out.line(format!("if {}:", test.stop()));
            self.out.indent();
            self.out.line("break");
            self.out.dedent();
        }
        self.out.close_block(body);
        Ok(())
    }

    /// `While c` / `Until c` after `Do` or `Loop`.
    fn loop_condition(&mut self, toks: &[Token]) -> Tr<Option<LoopTest>> {
        let Some(first) = toks.first() else {
            return Ok(None);
        };
        let cond = self.expr(&expression(&toks[1..])?)?;
        if first.is_kw("while") {
            Ok(Some(LoopTest::While(cond)))
        } else if first.is_kw("until") {
            Ok(Some(LoopTest::Until(cond)))
        } else {
            Err(Untranslatable::Form("expected `While` or `Until`".to_string()))
        }
    }

    fn while_block(&mut self, block: &Block) -> Tr<()> {
        let cond = self.expr(&expression(&block.header().tokens[1..])?)?;
        self.out.line(format!("while {}:", cond.code));
        let body = self.out.open_block();
        self.body(&block.arms[0].body);
        self.out.close_block(body);
        Ok(())
    }

    fn select_block(&mut self, block: &Block) -> Tr<()> {
        let subject_expr = expression(&block.header().tokens[2..])?;
        let subject = self.expr(&subject_expr)?;
        let alias = (!is_simple_target(&subject_expr)).then(|| match self.select_depth {
            0 => "_select".to_string(),
            n => format!("_select{}", n + 1),
        });
        let operand = match &alias {
            Some(name) => Py::atom(name.clone()).with_str(subject.is_str),
            None => subject.clone(),
        };

        let mut conditions = Vec::new();
        for arm in &block.arms[1..] {
            conditions.push(self.case_condition(&operand, &arm.header.tokens[1..])?);
        }

        if let Some(name) = &alias {
            self.out.line(format!("{name} = {}", subject.code));
        }
        self.select_depth += 1;
        self.body(&block.arms[0].body);
        let mut first = true;
        for (arm, cond) in block.arms[1..].iter().zip(conditions) {
            let header = match cond {
                Some(c) if first => format!("if {}:", c.code),
                Some(c) => format!("elif {}:", c.code),
                None if first => {
                    self.body(&arm.body);
                    continue;
                }
                None => "else:".to_string(),
            };
            first = false;
            self.out.line(header);
            let body = self.out.open_block();
            self.body(&arm.body);
            self.out.close_block(body);
        }
        self.select_depth -= 1;
        Ok(())
    }

    /// Condition of one `Case` arm; `None` for `Case Else`.
    fn case_condition(&mut self, subject: &Py, toks: &[Token]) -> Tr<Option<Py>> {
        if toks.first().is_some_and(|t| t.is_kw("else")) {
            return Ok(None);
        }
        let operand = subject.wrapped(prec::CMP + 1);
        let mut equal = Vec::new();
        let mut tests = Vec::new();
        for item in split_top_level(toks, |t| t.kind == TokenKind::Comma) {
            if item.first().is_some_and(|t| t.is_kw("is")) {
                let op = match item.get(1).map(|t| t.kind) {
                    Some(TokenKind::Eq) => "==",
                    Some(TokenKind::Ne) => "!=",
                    Some(TokenKind::Lt) => "<",
                    Some(TokenKind::Gt) => ">",
                    Some(TokenKind::Le) => "<=",
                    Some(TokenKind::Ge) => ">=",
                    _ => return Err(Untranslatable::Form("expected a comparison after `Is`".to_string())),
                };
                let value = self.expr(&expression(&item[2..])?)?;
                tests.push(format!("{operand} {op} {}", value.wrapped(prec::CMP + 1)));
            } else if let Some(to) = keyword_index(item, "to") {
                let low = self.expr(&expression(&item[..to])?)?;
                let high = self.expr(&expression(&item[to + 1..])?)?;
                tests.push(format!(
                    "{} <= {operand} <= {}",
                    low.wrapped(prec::CMP + 1),
                    high.wrapped(prec::CMP + 1)
                ));
            } else {
                let value = self.expr(&expression(item)?)?;
                equal.push(value.wrapped(prec::CMP + 1));
            }
        }
        match equal.len() {
            0 => {}
            1 => tests.insert(0, format!("{operand} == {}", equal[0])),
            _ => tests.insert(0, format!("{operand} in ({})", equal.join(", "))),
        }
        Ok(Some(match tests.len() {
            1 => Py::new(tests.remove(0), prec::CMP),
            _ => Py::new(tests.join(" or "), prec::OR),
        }))
    }

    fn with_block(&mut self, block: &Block) -> Tr<()> {
        let target_expr = expression(&block.header().tokens[1..])?;
        let target = self.expr(&target_expr)?;
        let target = if is_simple_target(&target_expr) {
            target
        } else {
            let alias = match self.with_targets.iter().filter(|t| t.code.starts_with("_with")).count() {
                0 => "_with".to_string(),
                n => format!("_with{}", n + 1),
            };
            self.out.line(format!("{alias} = {}", target.code));
            Py::atom(alias)
        };
        self.with_targets.push(target);
        self.body(&block.arms[0].body);
        self.with_targets.pop();
        Ok(())
    }

    /// `ReDim [Preserve] a(1 To n) [As T], ...`
    fn redim(&mut self, toks: &[Token]) -> Tr<()> {
        let preserve = toks.first().is_some_and(|t| t.is_kw("preserve"));
        let decls = super::symbols::parse_declarators(&toks[usize::from(preserve)..])?;
        let mut lines = Vec::with_capacity(decls.len());
        for decl in &decls {
            let dims = decl
                .dims
                .as_ref()
                .filter(|d| !d.is_empty())
                .ok_or_else(|| Untranslatable::Form("`ReDim` needs bounds".to_string()))?;
            let lower = decl.name.to_ascii_lowercase();
            let existing = self.lookup_var(&lower);
            let type_ref = decl.type_ref.clone();
            let element = self.element_default(type_ref.as_ref(), decl.suffix);
            let (sizes, bases) = self.dimension_sizes(dims)?;
            let target = self.assign_name(&decl.name)?;
            let value = if preserve {
                if sizes.len() != 1 {
                    return Err(Untranslatable::Unsupported(
                        "`ReDim Preserve` of a multi-dimensional array".to_string(),
                    ));
                }
                let size = &sizes[0];
                format!("({target} + [{element}] * {}){}", size.wrapped(prec::MUL + 1), slice_to(size))
            } else {
                array_initializer(&element, &sizes)
            };
            lines.push(format!("{target} = {value}"));

            let info = match existing {
                Some(var) => VarInfo {
                    bases: Some(bases),
                    ..var
                },
                None => VarInfo {
                    bases: Some(bases),
                    ..VarInfo::scalar(target.clone())
                },
            };
            if let Some(var) = self.scope.as_mut().and_then(|s| s.locals.get_mut(&lower)) {
                *var = info;
            } else if let Some(var) = self.symbols.module_vars.get_mut(&lower) {
                *var = info;
            }
        }
        for line in lines {
            self.out.line(line);
        }
        Ok(())
    }

    fn erase(&mut self, toks: &[Token]) -> Tr<()> {
        let mut lines = Vec::new();
        for part in split_top_level(toks, |t| t.kind == TokenKind::Comma) {
            let name = match part {
                [t] if t.kind == TokenKind::Identifier => t.name().to_string(),
                _ => return Err(Untranslatable::Form("expected an array name".to_string())),
            };
            let target = self.assign_name(&name)?;
            lines.push(format!("{target} = []"));
        }
        for line in lines {
            self.out.line(line);
        }
        Ok(())
    }

    /// Element count and lower bound of every dimension.
    pub(super) fn dimension_sizes(&mut self, dims: &[super::symbols::DimBound]) -> Tr<(Vec<Py>, Vec<i64>)> {
        let option_base = self.symbols.option_base;
        let mut sizes = Vec::with_capacity(dims.len());
        let mut bases = Vec::with_capacity(dims.len());
        for dim in dims {
            let upper = self.expr(&expression(&dim.upper)?)?;
            let (size, base) = match &dim.lower {
                None => {
                    let (text, _) = offset(&upper, 1 - option_base);
                    (sized(text, &upper, 1 - option_base), option_base)
                }
                Some(lower_toks) => {
                    let lower = self.expr(&expression(lower_toks)?)?;
                    match lower.int_value {
                        Some(l) => {
                            let (text, _) = offset(&upper, 1 - l);
                            (sized(text, &upper, 1 - l), l)
                        }
                        None => (
                            Py::new(
                                format!("{} - {} + 1", upper.wrapped(prec::ADD), lower.wrapped(prec::ADD + 1)),
                                prec::ADD,
                            ),
                            option_base,
                        ),
                    }
                }
            };
            sizes.push(size);
            bases.push(base);
        }
        Ok((sizes, bases))
    }
}

fn sized(text: String, upper: &Py, delta: i64) -> Py {
    match upper.int_value {
        Some(v) => Py::int(v + delta),
        None if delta == 0 => upper.clone(),
        None => Py::new(text, prec::ADD),
    }
}

fn slice_to(size: &Py) -> String {
    format!("[:{}]", size.code)
}

/// `[d] * n`, or nested comprehensions for several dimensions. Mutable element defaults get a
/// comprehension so elements are not shared.
pub(super) fn array_initializer(element: &str, sizes: &[Py]) -> String {
    let mutable = element.ends_with(')') || element == "[]" || element == "{}";
    let Some((last, outer)) = sizes.split_last() else {
        return "[]".to_string();
    };
    let mut value = if mutable {
        format!("[{element} for _ in range({})]", last.code)
    } else {
        format!("[{element}] * {}", last.wrapped(prec::MUL + 1))
    };
    for size in outer.iter().rev() {
        value = format!("[{value} for _ in range({})]", size.code);
    }
    value
}

/// Names and member chains without calls can be repeated instead of aliased.
fn is_simple_target(expr: &Expr) -> bool {
    match expr {
        Expr::Name(_) | Expr::Me => true,
        Expr::Member { target: None, .. } => true,
        Expr::Member { target: Some(t), .. } => is_simple_target(t),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn builds_array_initializers() {
        assert_eq!(array_initializer("0", &[Py::int(5)]), "[0] * 5");
        assert_eq!(
            array_initializer("0.0", &[Py::int(3), Py::new("n + 1", prec::ADD)]),
            "[[0.0] * (n + 1) for _ in range(3)]"
        );
        assert_eq!(array_initializer("[]", &[Py::int(2)]), "[[] for _ in range(2)]");
    }
}
