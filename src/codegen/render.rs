use std::{collections::BTreeSet, fmt::Write};

use crate::{
    config::CodegenConfig,
    parser::{BinOpKind, Literal, Place, Type, UnaryOpKind},
};

use super::{Arg, Instr, Module, Op, Operand, Routine};

// Operands of a comparison are always parenthesised, which keeps chained
// comparisons from turning into Python's `a < b < c`.
const COMPARISON_PREC: u8 = 4;

// Runtime helpers, emitted only when the program needs them. Indented with
// four spaces per level, re-indented to the configured width.
const REF_CELL: &str = "\
class Ref:
    def __init__(self, value):
        self.value = value

    def __class_getitem__(cls, item):
        return cls
";

const INCLUSIVE_RANGE: &str = "\
def inclusive_range(start, end, step):
    return range(start, end + 1 if step > 0 else end - 1, step)
";

const WRITE: &str = "\
def _texto(value):
    if isinstance(value, bool):
        return \"VERDADERO\" if value else \"FALSO\"
    if isinstance(value, float):
        text = repr(value)
        if \"e\" in text:
            text = format(decimal.Decimal(text), \"f\")
        return text if \".\" in text or not text[-1].isdigit() else text + \".0\"
    if dataclasses.is_dataclass(value):
        fields = dataclasses.fields(value)
        values = \", \".join(f\"{f.name}={_texto(getattr(value, f.name))}\" for f in fields)
        return f\"{type(value).__name__}({values})\"
    return str(value)

def escribir(*values):
    print(\" \".join(_texto(value) for value in values))
";

const READ: &str = "\
def leer(current=None):
    line = input()
    text = line.strip()
    if isinstance(current, bool):
        return {\"VERDADERO\": True, \"FALSO\": False}[text.upper()]
    if isinstance(current, (int, float)):
        return type(current)(text)
    if current is not None:
        return line
    for kind in (int, float):
        try:
            return kind(text)
        except ValueError:
            pass
    return line
";

/// Renders a module as Python-flavoured source. The output depends on the
/// module alone: identical modules give byte-identical text.
pub(super) fn render(module: &Module, config: &CodegenConfig) -> String {
    let mut r = Renderer {
        out: String::new(),
        indent: " ".repeat(config.indent_width),
        depth: 0,
    };
    r.gen_module(module);
    r.out
}

struct Renderer {
    out: String,
    indent: String,
    depth: usize,
}

impl Renderer {
    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str(&self.indent);
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn gen_module(&mut self, module: &Module) {
        let routines: Vec<_> = module
            .routines
            .iter()
            .map(|routine| (routine, Usage::of(&routine.body)))
            .collect();
        let globals = Usage::of(&module.globals);
        let prelude = Usage::of(&module.prelude);
        let scope = ModuleScope::new(&globals, &prelude, &routines);

        let all = || [&globals, &prelude].into_iter().chain(routines.iter().map(|(_, u)| u));
        let prints = all().any(|u| u.prints);
        let reads = all().any(|u| u.reads);
        let open_ranges = all().any(|u| u.open_ranges);
        let refs = all().any(|u| !u.by_ref.is_empty())
            || module.routines.iter().any(|r| r.params.iter().any(|p| p.by_ref));

        if prints {
            self.line("import dataclasses");
            self.line("import decimal");
        }
        if !module.records.is_empty() {
            self.line("from dataclasses import dataclass, field");
        }
        if prints || !module.records.is_empty() {
            self.out.push('\n');
        }
        for (needed, helper) in [
            (refs, REF_CELL),
            (open_ranges, INCLUSIVE_RANGE),
            (prints, WRITE),
            (reads, READ),
        ] {
            if needed {
                self.gen_helper(helper);
                self.out.push('\n');
            }
        }

        for record in &module.records {
            self.line("@dataclass");
            self.line(&format!("class {}:", record.name));
            self.depth += 1;
            if record.fields.is_empty() {
                self.line("pass");
            }
            for (name, ty) in &record.fields {
                self.line(&format!("{name}: {} = {}", type_hint(ty), default_field(ty)));
            }
            self.depth -= 1;
            self.out.push('\n');
        }

        let ctx = scope.module_ctx();
        for cell in &scope.cells {
            self.line(&format!("{cell} = Ref(None)"));
        }
        self.gen_block(&module.globals, &ctx);
        if !scope.cells.is_empty() || !module.globals.is_empty() {
            self.out.push('\n');
        }

        for (routine, usage) in &routines {
            let (routine_ctx, prologue) = scope.routine_ctx(routine, usage);
            self.gen_routine(routine, &routine_ctx, &prologue);
            self.out.push('\n');
        }

        self.gen_block(&module.prelude, &ctx);
        if let Some(entry) = &module.entry {
            self.line(&format!("{entry}()"));
        }
    }

    fn gen_helper(&mut self, text: &str) {
        for line in text.lines() {
            let code = line.trim_start_matches("    ");
            if code.is_empty() {
                self.out.push('\n');
                continue;
            }
            let level = (line.len() - code.len()) / 4;
            self.depth += level;
            self.line(code);
            self.depth -= level;
        }
    }

    fn gen_routine(&mut self, routine: &Routine, ctx: &Ctx, prologue: &[String]) {
        let params = routine
            .params
            .iter()
            .map(|p| {
                let hint = p.ty.as_ref().map(type_hint).unwrap_or("object");
                if p.by_ref {
                    format!("{}: Ref[{hint}]", p.name)
                } else {
                    format!("{}: {hint}", p.name)
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        let returns = routine
            .returns
            .as_ref()
            .map(|t| format!(" -> {}", type_hint(t)))
            .unwrap_or_default();

        self.line(&format!("def {}({params}){returns}:", routine.name));
        self.depth += 1;
        if routine.body.is_empty() {
            self.line("pass");
        }
        for line in prologue {
            self.line(line);
        }
        self.gen_block(&routine.body, ctx);
        self.depth -= 1;
    }

    fn gen_block(&mut self, body: &[Instr], ctx: &Ctx) {
        for instr in body {
            self.gen_instr(instr, ctx);
        }
    }

    fn gen_body(&mut self, body: &[Instr], ctx: &Ctx) {
        self.depth += 1;
        if body.is_empty() {
            self.line("pass");
        }
        self.gen_block(body, ctx);
        self.depth -= 1;
    }

    fn gen_instr(&mut self, instr: &Instr, ctx: &Ctx) {
        match &instr.op {
            Op::Declare { names, ty } => {
                for name in names {
                    let text = if ctx.cells.contains(name) {
                        format!("{name}.value = {}", default_value(ty))
                    } else {
                        format!("{name}: {} = {}", type_hint(ty), default_value(ty))
                    };
                    self.line(&text);
                }
            }
            Op::Store { place, value } => {
                let text = format!("{} = {}", ctx.place(place), ctx.operand(value, 0));
                self.line(&text);
            }
            Op::Print(args) => {
                let args = args
                    .iter()
                    .map(|a| ctx.operand(a, 0))
                    .collect::<Vec<_>>()
                    .join(", ");
                self.line(&format!("escribir({args})"));
            }
            Op::Read(places) => {
                for place in places {
                    let target = ctx.place(place);
                    // the current value picks the conversion
                    let text = if ctx.declared.contains(&place.root) {
                        format!("{target} = leer({target})")
                    } else {
                        format!("{target} = leer()")
                    };
                    self.line(&text);
                }
            }
            Op::Branch {
                cond,
                then,
                otherwise,
            } => {
                let text = format!("if {}:", ctx.operand(cond, 0));
                self.line(&text);
                self.gen_body(then, ctx);
                self.gen_else(otherwise, ctx);
            }
            Op::Loop { cond, body } => {
                let text = format!("while {}:", ctx.operand(cond, 0));
                self.line(&text);
                self.gen_body(body, ctx);
            }
            Op::Range {
                var,
                start,
                end,
                step,
                body,
            } => {
                let start = ctx.operand(start, 0);
                let var = ctx.var(var);
                let header = match step.as_ref().map(|s| (s, const_step(s))) {
                    None => format!(
                        "for {var} in range({start}, {} + 1):",
                        ctx.operand(end, BinOpKind::Add.precedence())
                    ),
                    Some((_, Some(s))) if s > 0 => format!(
                        "for {var} in range({start}, {} + 1, {s}):",
                        ctx.operand(end, BinOpKind::Add.precedence())
                    ),
                    Some((_, Some(s))) if s < 0 => format!(
                        "for {var} in range({start}, {} - 1, {s}):",
                        ctx.operand(end, BinOpKind::Sub.precedence())
                    ),
                    Some((step, _)) => format!(
                        "for {var} in inclusive_range({start}, {}, {}):",
                        ctx.operand(end, 0),
                        ctx.operand(step, 0)
                    ),
                };
                self.line(&header);
                self.gen_body(body, ctx);
            }
            Op::Select {
                subject,
                arms,
                default,
            } => {
                let text = format!("match {}:", ctx.operand(subject, 0));
                self.line(&text);
                self.depth += 1;
                for arm in arms {
                    let labels = arm
                        .labels
                        .iter()
                        .map(literal)
                        .collect::<Vec<_>>()
                        .join(" | ");
                    self.line(&format!("case {labels}:"));
                    self.gen_body(&arm.body, ctx);
                }
                if let Some(default) = default {
                    self.line("case _:");
                    self.gen_body(default, ctx);
                }
                if arms.is_empty() && default.is_none() {
                    self.line("case _:");
                    self.gen_body(&[], ctx);
                }
                self.depth -= 1;
            }
            Op::Invoke { name, args } => {
                let text = format!("{name}({})", ctx.args(args));
                self.line(&text);
            }
            // module-level code has no routine to leave: the program ends
            Op::Return(_) if ctx.top_level => self.line("raise SystemExit"),
            Op::Return(None) => self.line("return"),
            Op::Return(Some(value)) => {
                let text = format!("return {}", ctx.operand(value, 0));
                self.line(&text);
            }
        }
    }

    /// A lone nested `if` in the else branch renders as `elif`.
    fn gen_else(&mut self, otherwise: &[Instr], ctx: &Ctx) {
        match otherwise {
            [] => {}
            [Instr {
                op:
                    Op::Branch {
                        cond,
                        then,
                        otherwise,
                    },
                ..
            }] => {
                let text = format!("elif {}:", ctx.operand(cond, 0));
                self.line(&text);
                self.gen_body(then, ctx);
                self.gen_else(otherwise, ctx);
            }
            _ => {
                self.line("else:");
                self.gen_body(otherwise, ctx);
            }
        }
    }
}

/// Names a block binds, declares or hands over by reference, nested blocks
/// and call arguments included, plus the runtime helpers it relies on.
#[derive(Default)]
struct Usage<'m> {
    assigned: BTreeSet<&'m str>,
    declared: BTreeSet<&'m str>,
    by_ref: BTreeSet<&'m str>,
    prints: bool,
    reads: bool,
    open_ranges: bool,
}

impl<'m> Usage<'m> {
    fn of(body: &'m [Instr]) -> Self {
        let mut usage = Self::default();
        usage.block(body);
        usage
    }

    fn block(&mut self, body: &'m [Instr]) {
        for instr in body {
            self.instr(instr);
        }
    }

    fn instr(&mut self, instr: &'m Instr) {
        match &instr.op {
            Op::Declare { names, .. } => self.declared.extend(names.iter().map(String::as_str)),
            Op::Store { place, value } => {
                self.assigned.insert(place.root.as_str());
                self.operand(value);
            }
            Op::Print(args) => {
                self.prints = true;
                args.iter().for_each(|arg| self.operand(arg));
            }
            Op::Read(places) => {
                self.reads = true;
                self.assigned
                    .extend(places.iter().map(|place| place.root.as_str()));
            }
            Op::Branch {
                cond,
                then,
                otherwise,
            } => {
                self.operand(cond);
                self.block(then);
                self.block(otherwise);
            }
            Op::Loop { cond, body } => {
                self.operand(cond);
                self.block(body);
            }
            Op::Range {
                var,
                start,
                end,
                step,
                body,
            } => {
                self.assigned.insert(var.as_str());
                self.operand(start);
                self.operand(end);
                if let Some(step) = step {
                    self.open_ranges |= !matches!(const_step(step), Some(s) if s != 0);
                    self.operand(step);
                }
                self.block(body);
            }
            Op::Select {
                subject,
                arms,
                default,
            } => {
                self.operand(subject);
                for arm in arms {
                    self.block(&arm.body);
                }
                if let Some(default) = default {
                    self.block(default);
                }
            }
            Op::Invoke { args, .. } => self.args(args),
            Op::Return(value) => {
                if let Some(value) = value {
                    self.operand(value);
                }
            }
        }
    }

    fn args(&mut self, args: &'m [Arg]) {
        for arg in args {
            match arg {
                Arg::Value(value) => self.operand(value),
                Arg::Ref(name) => {
                    self.by_ref.insert(name.as_str());
                }
            }
        }
    }

    fn operand(&mut self, operand: &'m Operand) {
        match operand {
            Operand::Const(_) | Operand::Load(_) => {}
            Operand::Field(inner, _) | Operand::Unary(_, inner) => self.operand(inner),
            Operand::Call(_, args) => self.args(args),
            Operand::Binary(_, l, r) => {
                self.operand(l);
                self.operand(r);
            }
        }
    }
}

/// Module-level names. Those handed over by reference anywhere live in
/// `Ref` cells for the whole program.
struct ModuleScope<'m> {
    names: BTreeSet<&'m str>,
    declared: BTreeSet<&'m str>,
    cells: BTreeSet<&'m str>,
}

impl<'m> ModuleScope<'m> {
    fn new(
        globals: &Usage<'m>,
        prelude: &Usage<'m>,
        routines: &[(&'m Routine, Usage<'m>)],
    ) -> Self {
        let declared: BTreeSet<&str> = globals.declared.union(&prelude.declared).copied().collect();
        let mut names = declared.clone();
        names.extend(&prelude.assigned);
        names.extend(&prelude.by_ref);

        let mut cells = prelude.by_ref.clone();
        for (routine, usage) in routines {
            let locals = locals(routine, usage);
            cells.extend(
                usage
                    .by_ref
                    .iter()
                    .filter(|name| names.contains(*name) && !locals.contains(*name)),
            );
        }

        Self {
            names,
            declared,
            cells,
        }
    }

    fn module_ctx(&self) -> Ctx {
        Ctx {
            cells: self.cells.iter().map(|name| name.to_string()).collect(),
            declared: self.declared.iter().map(|name| name.to_string()).collect(),
            top_level: true,
        }
    }

    /// Resolution of names inside `routine`, plus the lines that open its
    /// body: a `global` line for module variables it assigns and the cells
    /// of locals it hands over by reference.
    fn routine_ctx(&self, routine: &Routine, usage: &Usage) -> (Ctx, Vec<String>) {
        let locals = locals(routine, usage);
        let mut prologue = vec![];

        let globals: Vec<&str> = usage
            .assigned
            .iter()
            .copied()
            .filter(|name| {
                self.names.contains(name) && !self.cells.contains(name) && !locals.contains(name)
            })
            .collect();
        if !globals.is_empty() {
            prologue.push(format!("global {}", globals.join(", ")));
        }

        let mut cells: BTreeSet<String> = self
            .cells
            .iter()
            .filter(|name| !locals.contains(*name))
            .map(|name| name.to_string())
            .collect();
        cells.extend(routine.params.iter().filter(|p| p.by_ref).map(|p| p.name.clone()));
        for name in &usage.by_ref {
            if cells.contains(*name) {
                continue;
            }
            // a by-value parameter keeps its value inside the new cell
            let init = if routine.params.iter().any(|p| p.name == *name) {
                *name
            } else {
                "None"
            };
            prologue.push(format!("{name} = Ref({init})"));
            cells.insert(name.to_string());
        }

        let mut declared: BTreeSet<String> = locals.iter().map(|name| name.to_string()).collect();
        declared.extend(self.declared.iter().map(|name| name.to_string()));

        let ctx = Ctx {
            cells,
            declared,
            top_level: false,
        };
        (ctx, prologue)
    }
}

fn locals<'m>(routine: &'m Routine, usage: &Usage<'m>) -> BTreeSet<&'m str> {
    let mut locals = usage.declared.clone();
    locals.extend(routine.params.iter().map(|p| p.name.as_str()));
    locals
}

/// How names resolve in the routine or module-level code being rendered.
struct Ctx {
    /// Variables held in `Ref` cells, accessed through `.value`.
    cells: BTreeSet<String>,
    /// Declared variables, whose current value types a `LEER`.
    declared: BTreeSet<String>,
    top_level: bool,
}

impl Ctx {
    fn var(&self, name: &str) -> String {
        if self.cells.contains(name) {
            format!("{name}.value")
        } else {
            name.to_string()
        }
    }

    fn place(&self, place: &Place) -> String {
        let mut text = self.var(&place.root);
        for field in &place.fields {
            let _ = write!(text, ".{field}");
        }
        text
    }

    fn args(&self, args: &[Arg]) -> String {
        args.iter()
            .map(|arg| match arg {
                Arg::Value(v) => self.operand(v, 0),
                Arg::Ref(name) if self.cells.contains(name) => name.clone(),
                Arg::Ref(name) => format!("Ref({name})"),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Renders `operand`, parenthesised when it binds looser than `min_prec`.
    fn operand(&self, operand: &Operand, min_prec: u8) -> String {
        match operand {
            Operand::Const(l) => literal(l),
            Operand::Load(name) => self.var(name),
            Operand::Field(base, field) => format!("{}.{field}", self.operand(base, u8::MAX)),
            Operand::Call(name, args) => format!("{name}({})", self.args(args)),
            Operand::Binary(op, l, r) => {
                let prec = op.precedence();
                let (lp, rp) = if prec == COMPARISON_PREC {
                    (prec + 1, prec + 1)
                } else {
                    (prec, prec + 1)
                };
                let text = format!(
                    "{} {} {}",
                    self.operand(l, lp),
                    binop(*op),
                    self.operand(r, rp)
                );
                parenthesize(text, prec < min_prec)
            }
            Operand::Unary(op, e) => {
                let prec = op.precedence();
                let text = match op {
                    UnaryOpKind::Neg => format!("-{}", self.operand(e, prec)),
                    UnaryOpKind::Not => format!("not {}", self.operand(e, prec + 1)),
                };
                parenthesize(text, prec < min_prec)
            }
        }
    }
}

/// Integer step known before the loop runs, negated literals included.
fn const_step(step: &Operand) -> Option<i64> {
    match step {
        Operand::Const(Literal::Integer(n)) => Some(*n),
        Operand::Unary(UnaryOpKind::Neg, inner) => const_step(inner)?.checked_neg(),
        _ => None,
    }
}

fn parenthesize(text: String, wrap: bool) -> String {
    if wrap {
        format!("({text})")
    } else {
        text
    }
}

fn binop(op: BinOpKind) -> &'static str {
    match op {
        BinOpKind::Or => "or",
        BinOpKind::And => "and",
        BinOpKind::Equal => "==",
        BinOpKind::NotEqual => "!=",
        BinOpKind::LessThan => "<",
        BinOpKind::GreaterThan => ">",
        BinOpKind::LessEqual => "<=",
        BinOpKind::GreaterEqual => ">=",
        BinOpKind::Add => "+",
        BinOpKind::Sub => "-",
        BinOpKind::Mul => "*",
        BinOpKind::Div => "/",
        BinOpKind::Mod => "%",
    }
}

fn literal(l: &Literal) -> String {
    match l {
        Literal::Integer(n) => n.to_string(),
        Literal::Real(x) => format!("{x:?}"),
        Literal::Character(c) => format!("{:?}", c.to_string()),
        Literal::String(s) => format!("{s:?}"),
        Literal::Boolean(true) => "True".to_string(),
        Literal::Boolean(false) => "False".to_string(),
    }
}

fn type_hint(ty: &Type) -> &str {
    match ty {
        Type::Integer => "int",
        Type::Real => "float",
        Type::Character | Type::String => "str",
        Type::Boolean => "bool",
        Type::Record(name) => name,
    }
}

fn default_value(ty: &Type) -> String {
    match ty {
        Type::Integer => "0".to_string(),
        Type::Real => "0.0".to_string(),
        Type::Character => "' '".to_string(),
        Type::String => "\"\"".to_string(),
        Type::Boolean => "False".to_string(),
        Type::Record(name) => format!("{name}()"),
    }
}

fn default_field(ty: &Type) -> String {
    match ty {
        Type::Record(name) => format!("field(default_factory={name})"),
        _ => default_value(ty),
    }
}
