use std::{cmp::Ordering, collections::HashMap, panic, thread, time::Instant};

use log::{debug, warn};

use crate::{
    codegen::{Arg, GeneratedProgram, Instr, Module, Op, Operand, Routine},
    config::{RuntimeConfig, MAX_TEXT_BYTES},
    lexer::Position,
    parser::{BinOpKind, Place, Type, UnaryOpKind},
};

use super::{Environment, FailureKind, InputSource, Record, RuntimeFailure, Slot, Value};

type Exec<T> = Result<T, RuntimeFailure>;

// how often the wall clock is consulted, in executed steps
const CLOCK_CHECK_INTERVAL: u64 = 1024;

/// Lines printed by a run, plus the failure that stopped it early if any.
#[derive(Clone, Debug, PartialEq)]
pub enum ExecutionOutput {
    Completed(Vec<String>),
    Failed {
        lines: Vec<String>,
        failure: RuntimeFailure,
    },
}

impl ExecutionOutput {
    pub fn lines(&self) -> &[String] {
        match self {
            ExecutionOutput::Completed(lines) | ExecutionOutput::Failed { lines, .. } => lines,
        }
    }

    pub fn failure(&self) -> Option<&RuntimeFailure> {
        match self {
            ExecutionOutput::Completed(_) => None,
            ExecutionOutput::Failed { failure, .. } => Some(failure),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure().is_none()
    }
}

pub struct Executor {
    config: RuntimeConfig,
    input: Box<dyn InputSource>,
}

impl Executor {
    /// An executor without input: `LEER` fails with `InputExhausted`.
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            input: Box::new(std::iter::empty::<String>()),
        }
    }

    pub fn with_input(mut self, input: impl InputSource + 'static) -> Self {
        self.input = Box::new(input);
        self
    }

    /// Runs the globals, then the module-level blocks, then the entry
    /// routine. Failures never escape: they end up in the output.
    ///
    /// The program runs on a thread whose stack is sized for the configured
    /// call depth, so deep recursion ends in `CallDepthExceeded` rather than
    /// overflowing the caller's stack.
    pub fn run(&mut self, program: &GeneratedProgram) -> ExecutionOutput {
        let module = &program.module;
        let config = &self.config;
        let input = self.input.as_mut();
        let stack_size = config.run_stack_size();

        let run = thread::scope(|scope| {
            thread::Builder::new()
                .name("pseudocc-run".to_string())
                .stack_size(stack_size)
                .spawn_scoped(scope, || Machine::new(module, config, input).run())
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|payload| panic::resume_unwind(payload))
                })
        });
        let (result, steps, lines) = match run {
            Ok(run) => run,
            Err(err) => {
                warn!("cannot start a run thread with a {stack_size} byte stack: {err}");
                let failure = RuntimeFailure {
                    kind: FailureKind::CallDepthExceeded,
                    position: Position::new(1, 1),
                    message: format!("no room for a {stack_size} byte call stack: {err}"),
                };
                (Err(failure), 0, vec![])
            }
        };

        match result {
            Ok(()) => {
                debug!("run completed after {steps} steps, {} lines", lines.len());
                ExecutionOutput::Completed(lines)
            }
            Err(failure) => {
                debug!("run failed after {steps} steps: {failure}");
                ExecutionOutput::Failed { lines, failure }
            }
        }
    }
}

enum Flow {
    Next,
    Return(Option<Value>),
}

struct Machine<'a> {
    module: &'a Module,
    config: &'a RuntimeConfig,
    input: &'a mut dyn InputSource,
    env: Environment,
    output: Vec<String>,
    steps: u64,
    started: Instant,
    depth: usize,
    max_depth: usize,
    /// Statement being executed, reported by failures.
    position: Position,
}

impl<'a> Machine<'a> {
    fn new(
        module: &'a Module,
        config: &'a RuntimeConfig,
        input: &'a mut dyn InputSource,
    ) -> Self {
        Self {
            module,
            config,
            input,
            env: Environment::new(),
            output: vec![],
            steps: 0,
            started: Instant::now(),
            depth: 0,
            max_depth: config.effective_call_depth(),
            position: Position::new(1, 1),
        }
    }

    /// Runs the module and hands back the result, the steps taken and the
    /// printed lines.
    fn run(mut self) -> (Exec<()>, u64, Vec<String>) {
        let result = self.run_module();
        (result, self.steps, self.output)
    }

    fn fail(&self, kind: FailureKind, message: impl Into<String>) -> RuntimeFailure {
        RuntimeFailure {
            kind,
            position: self.position,
            message: message.into(),
        }
    }

    fn tick(&mut self) -> Exec<()> {
        self.steps += 1;
        if self.steps > self.config.max_steps {
            return Err(self.fail(
                FailureKind::Timeout,
                format!("step budget of {} exhausted", self.config.max_steps),
            ));
        }
        if self.steps % CLOCK_CHECK_INTERVAL == 0 && self.started.elapsed() > self.config.time_limit
        {
            return Err(self.fail(
                FailureKind::Timeout,
                format!("time limit of {:?} exceeded", self.config.time_limit),
            ));
        }
        Ok(())
    }

    fn run_module(&mut self) -> Exec<()> {
        let module = self.module;
        for instr in &module.globals {
            self.exec(instr)?;
        }
        // a `RETORNAR` in a top-level block ends the whole program
        if let Flow::Return(_) = self.exec_block(&module.prelude)? {
            debug!("module-level code returned, skipping the entry point");
            return Ok(());
        }

        if let Some(entry) = &module.entry {
            debug!("entering `{entry}`");
            self.call(entry, &[])?;
        }
        Ok(())
    }

    fn exec_block(&mut self, body: &[Instr]) -> Exec<Flow> {
        for instr in body {
            if let Flow::Return(value) = self.exec(instr)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Next)
    }

    fn exec(&mut self, instr: &Instr) -> Exec<Flow> {
        self.position = instr.position;
        self.tick()?;

        match &instr.op {
            Op::Declare { names, ty } => {
                for name in names {
                    let value = self.default_value(ty, 0)?;
                    self.env.define(name, value);
                }
            }
            Op::Store { place, value } => {
                let value = self.eval(value)?;
                self.store(place, value)?;
            }
            Op::Print(args) => {
                let mut parts = Vec::with_capacity(args.len());
                for arg in args {
                    parts.push(self.eval(arg)?.to_string());
                }
                self.output.push(parts.join(" "));
            }
            Op::Read(places) => {
                for place in places {
                    let Some(line) = self.input.read_line() else {
                        return Err(self.fail(
                            FailureKind::InputExhausted,
                            format!("no input left for `{place}`"),
                        ));
                    };
                    let current = self.load_place(place).ok();
                    let value = self.convert_input(&line, current.as_ref())?;
                    self.store(place, value)?;
                }
            }
            Op::Branch {
                cond,
                then,
                otherwise,
            } => {
                let branch = if self.condition(cond)? { then } else { otherwise };
                return self.exec_block(branch);
            }
            Op::Loop { cond, body } => loop {
                self.position = instr.position;
                if !self.condition(cond)? {
                    break;
                }
                if let Flow::Return(value) = self.exec_block(body)? {
                    return Ok(Flow::Return(value));
                }
                self.tick()?;
            },
            Op::Range {
                var,
                start,
                end,
                step,
                body,
            } => {
                let start = self.integer(start, "DESDE start")?;
                let end = self.integer(end, "HASTA bound")?;
                let step = match step {
                    Some(step) => self.integer(step, "PASO")?,
                    None => 1,
                };
                if step == 0 {
                    return Err(self.fail(FailureKind::TypeMismatch, "`PASO` must not be 0"));
                }

                let mut i = start;
                while (step > 0 && i <= end) || (step < 0 && i >= end) {
                    self.env.assign(var, Value::Integer(i));
                    if let Flow::Return(value) = self.exec_block(body)? {
                        return Ok(Flow::Return(value));
                    }
                    self.position = instr.position;
                    self.tick()?;
                    match i.checked_add(step) {
                        Some(next) => i = next,
                        None => break,
                    }
                }
            }
            Op::Select {
                subject,
                arms,
                default,
            } => {
                let subject = self.eval(subject)?;
                let arm = arms.iter().find(|arm| {
                    arm.labels
                        .iter()
                        .any(|label| subject.loosely_equals(&Value::from(label)))
                });
                match (arm, default) {
                    (Some(arm), _) => return self.exec_block(&arm.body),
                    (None, Some(default)) => return self.exec_block(default),
                    (None, None) => {}
                }
            }
            Op::Invoke { name, args } => {
                self.call(name, args)?;
            }
            Op::Return(value) => {
                let value = match value {
                    Some(value) => Some(self.eval(value)?),
                    None => None,
                };
                return Ok(Flow::Return(value));
            }
        }

        Ok(Flow::Next)
    }

    fn routine(&self, name: &str) -> Exec<&'a Routine> {
        let module: &'a Module = self.module;
        module.routine(name).ok_or_else(|| {
            self.fail(
                FailureKind::UndefinedVariable,
                format!("`{name}` is not a function or procedure"),
            )
        })
    }

    /// Calls a routine with arguments evaluated in the caller's frame.
    fn call(&mut self, name: &str, args: &[Arg]) -> Exec<Option<Value>> {
        let routine = self.routine(name)?;
        if routine.params.len() != args.len() {
            return Err(self.fail(
                FailureKind::TypeMismatch,
                format!(
                    "`{name}` takes {} arguments but {} were given",
                    routine.params.len(),
                    args.len()
                ),
            ));
        }
        if self.depth >= self.max_depth {
            return Err(self.fail(
                FailureKind::CallDepthExceeded,
                format!("calling `{name}` nests deeper than {} calls", self.max_depth),
            ));
        }

        let mut frame: HashMap<String, Slot> = HashMap::new();
        for (i, (param, arg)) in routine.params.iter().zip(args).enumerate() {
            let slot = match (param.by_ref, arg) {
                (true, Arg::Ref(var)) => match self.env.lookup(var) {
                    Some(slot) => slot,
                    None => {
                        let value = match &param.ty {
                            Some(ty) => self.default_value(ty, 0)?,
                            None => Value::Integer(0),
                        };
                        self.env.define(var, value)
                    }
                },
                (true, Arg::Value(_)) => {
                    return Err(self.fail(
                        FailureKind::TypeMismatch,
                        format!(
                            "argument {} of `{name}` is passed by reference and must be a variable",
                            i + 1
                        ),
                    ))
                }
                (false, Arg::Value(value)) => Slot::new(self.eval(value)?.into()),
                (false, Arg::Ref(var)) => Slot::new(self.load(var)?.into()),
            };
            frame.insert(param.name.clone(), slot);
        }

        let caller_position = self.position;
        self.env.push_frame(frame);
        self.depth += 1;
        let flow = self.exec_block(&routine.body);
        self.depth -= 1;
        self.env.pop_frame();
        let flow = flow?;
        self.position = caller_position;

        Ok(match flow {
            Flow::Return(value) => value,
            Flow::Next => None,
        })
    }

    /// Zero value of a type. `nesting` guards against records that contain
    /// themselves.
    fn default_value(&self, ty: &Type, nesting: usize) -> Exec<Value> {
        let name = match ty {
            Type::Integer => return Ok(Value::Integer(0)),
            Type::Real => return Ok(Value::Real(0.0)),
            Type::Character => return Ok(Value::Character(' ')),
            Type::String => return Ok(Value::String(String::new())),
            Type::Boolean => return Ok(Value::Boolean(false)),
            Type::Record(name) => name,
        };
        let Some(record) = self.module.record(name) else {
            return Err(self.fail(
                FailureKind::UndefinedVariable,
                format!("unknown type `{name}`"),
            ));
        };
        if nesting > self.module.records.len() {
            return Err(self.fail(
                FailureKind::TypeMismatch,
                format!("record `{name}` contains itself"),
            ));
        }

        let mut fields = Vec::with_capacity(record.fields.len());
        for (field, ty) in &record.fields {
            fields.push((field.clone(), self.default_value(ty, nesting + 1)?));
        }
        Ok(Value::Record(Record {
            name: name.clone(),
            fields,
        }))
    }

    fn load(&self, name: &str) -> Exec<Value> {
        self.env.get(name).ok_or_else(|| {
            self.fail(
                FailureKind::UndefinedVariable,
                format!("variable `{name}` is not defined"),
            )
        })
    }

    fn load_place(&self, place: &Place) -> Exec<Value> {
        let mut value = self.load(&place.root)?;
        for field in &place.fields {
            value = self.field(value, field)?;
        }
        Ok(value)
    }

    fn field(&self, value: Value, field: &str) -> Exec<Value> {
        match value {
            Value::Record(record) => record.get(field).cloned().ok_or_else(|| {
                self.fail(
                    FailureKind::UndefinedVariable,
                    format!("`{}` has no field `{field}`", record.name),
                )
            }),
            other => Err(self.fail(
                FailureKind::TypeMismatch,
                format!("{} value has no field `{field}`", other.type_name()),
            )),
        }
    }

    fn store(&mut self, place: &Place, value: Value) -> Exec<()> {
        if place.fields.is_empty() {
            self.env.assign(&place.root, value);
            return Ok(());
        }

        let slot = self.env.lookup(&place.root).ok_or_else(|| {
            self.fail(
                FailureKind::UndefinedVariable,
                format!("variable `{}` is not defined", place.root),
            )
        })?;
        let mut root = slot.borrow_mut();
        let mut target = &mut *root;
        for field in &place.fields {
            target = match target {
                Value::Record(record) => {
                    let name = record.name.clone();
                    record.get_mut(field).ok_or_else(|| {
                        self.fail(
                            FailureKind::UndefinedVariable,
                            format!("`{name}` has no field `{field}`"),
                        )
                    })?
                }
                other => {
                    return Err(self.fail(
                        FailureKind::TypeMismatch,
                        format!("{} value has no field `{field}`", other.type_name()),
                    ))
                }
            };
        }
        *target = value;
        Ok(())
    }

    /// Converts an input line to the type of the variable it is read into,
    /// or to the narrowest of integer, real and string for a new variable.
    fn convert_input(&self, line: &str, current: Option<&Value>) -> Exec<Value> {
        let text = line.trim();
        let mismatch = |ty: &str| {
            self.fail(
                FailureKind::TypeMismatch,
                format!("input `{line}` is not a valid {ty}"),
            )
        };

        match current {
            None => Ok(text
                .parse()
                .map(Value::Integer)
                .or_else(|_| text.parse().map(Value::Real))
                .unwrap_or_else(|_| Value::String(line.to_string()))),
            Some(Value::Integer(_)) => text
                .parse()
                .map(Value::Integer)
                .map_err(|_| mismatch("ENTERO")),
            Some(Value::Real(_)) => text
                .parse()
                .map(Value::Real)
                .map_err(|_| mismatch("REAL")),
            Some(Value::Character(_)) => {
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(Value::Character(c)),
                    (None, _) => Ok(Value::Character(' ')),
                    _ => Err(mismatch("CARACTER")),
                }
            }
            Some(Value::String(_)) => Ok(Value::String(line.to_string())),
            Some(Value::Boolean(_)) => match text.to_uppercase().as_str() {
                "VERDADERO" => Ok(Value::Boolean(true)),
                "FALSO" => Ok(Value::Boolean(false)),
                _ => Err(mismatch("BOOLEANO")),
            },
            Some(Value::Record(r)) => Err(mismatch(&r.name)),
        }
    }

    fn condition(&mut self, cond: &Operand) -> Exec<bool> {
        match self.eval(cond)? {
            Value::Boolean(b) => Ok(b),
            other => Err(self.fail(
                FailureKind::TypeMismatch,
                format!("condition is {}, expected BOOLEANO", other.type_name()),
            )),
        }
    }

    fn integer(&mut self, operand: &Operand, what: &str) -> Exec<i64> {
        match self.eval(operand)? {
            Value::Integer(n) => Ok(n),
            other => Err(self.fail(
                FailureKind::TypeMismatch,
                format!("{what} is {}, expected ENTERO", other.type_name()),
            )),
        }
    }

    fn eval(&mut self, operand: &Operand) -> Exec<Value> {
        match operand {
            Operand::Const(literal) => Ok(Value::from(literal)),
            Operand::Load(name) => self.load(name),
            Operand::Field(base, field) => {
                let base = self.eval(base)?;
                self.field(base, field)
            }
            Operand::Call(name, args) => self.call(name, args)?.ok_or_else(|| {
                self.fail(
                    FailureKind::TypeMismatch,
                    format!("`{name}` returns no value"),
                )
            }),
            Operand::Binary(BinOpKind::And, l, r) => {
                Ok(Value::Boolean(self.condition(l)? && self.condition(r)?))
            }
            Operand::Binary(BinOpKind::Or, l, r) => {
                Ok(Value::Boolean(self.condition(l)? || self.condition(r)?))
            }
            Operand::Binary(op, l, r) => {
                let l = self.eval(l)?;
                let r = self.eval(r)?;
                self.binary(*op, l, r)
            }
            Operand::Unary(UnaryOpKind::Not, e) => Ok(Value::Boolean(!self.condition(e)?)),
            Operand::Unary(UnaryOpKind::Neg, e) => match self.eval(e)? {
                Value::Integer(n) => n
                    .checked_neg()
                    .map(Value::Integer)
                    .ok_or_else(|| {
                        self.fail(FailureKind::Overflow, format!("-({n}) overflows"))
                    }),
                Value::Real(x) => Ok(Value::Real(-x)),
                other => Err(self.fail(
                    FailureKind::TypeMismatch,
                    format!("cannot negate {}", other.type_name()),
                )),
            },
        }
    }

    fn binary(&self, op: BinOpKind, l: Value, r: Value) -> Exec<Value> {
        let mismatch = || {
            self.fail(
                FailureKind::TypeMismatch,
                format!(
                    "unsupported operand types for `{}`: {} and {}",
                    symbol(op),
                    l.type_name(),
                    r.type_name()
                ),
            )
        };
        let overflow = || {
            self.fail(
                FailureKind::Overflow,
                format!("{l} {} {r} overflows", symbol(op)),
            )
        };

        match op {
            BinOpKind::Equal => Ok(Value::Boolean(l.loosely_equals(&r))),
            BinOpKind::NotEqual => Ok(Value::Boolean(!l.loosely_equals(&r))),
            BinOpKind::LessThan
            | BinOpKind::GreaterThan
            | BinOpKind::LessEqual
            | BinOpKind::GreaterEqual => {
                let ordering = match (&l, &r) {
                    (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
                    _ => match (l.as_number(), r.as_number()) {
                        (Some(a), Some(b)) => a.partial_cmp(&b),
                        _ => match (l.as_text(), r.as_text()) {
                            (Some(a), Some(b)) => Some(a.cmp(&b)),
                            _ => return Err(mismatch()),
                        },
                    },
                };
                let holds = ordering.is_some_and(|o| match op {
                    BinOpKind::LessThan => o == Ordering::Less,
                    BinOpKind::GreaterThan => o == Ordering::Greater,
                    BinOpKind::LessEqual => o != Ordering::Greater,
                    _ => o != Ordering::Less,
                });
                Ok(Value::Boolean(holds))
            }
            BinOpKind::Add | BinOpKind::Sub | BinOpKind::Mul => {
                if let (Value::Integer(a), Value::Integer(b)) = (&l, &r) {
                    let result = match op {
                        BinOpKind::Add => a.checked_add(*b),
                        BinOpKind::Sub => a.checked_sub(*b),
                        _ => a.checked_mul(*b),
                    };
                    return result.map(Value::Integer).ok_or_else(overflow);
                }
                if let (Some(a), Some(b)) = (l.as_number(), r.as_number()) {
                    return Ok(Value::Real(match op {
                        BinOpKind::Add => a + b,
                        BinOpKind::Sub => a - b,
                        _ => a * b,
                    }));
                }
                match (op, l.as_text(), r.as_text()) {
                    (BinOpKind::Add, Some(a), Some(b)) if a.len() + b.len() > MAX_TEXT_BYTES => {
                        Err(self.fail(
                            FailureKind::Overflow,
                            format!("text longer than {MAX_TEXT_BYTES} bytes"),
                        ))
                    }
                    (BinOpKind::Add, Some(a), Some(b)) => Ok(Value::String(a + &b)),
                    _ => Err(mismatch()),
                }
            }
            BinOpKind::Div => {
                let (Some(a), Some(b)) = (l.as_number(), r.as_number()) else {
                    return Err(mismatch());
                };
                if b == 0.0 {
                    return Err(self.fail(FailureKind::DivisionByZero, format!("{l} / {r}")));
                }
                Ok(Value::Real(a / b))
            }
            BinOpKind::Mod => match (&l, &r) {
                (Value::Integer(_), Value::Integer(0)) => {
                    Err(self.fail(FailureKind::DivisionByZero, format!("{l} MOD 0")))
                }
                (Value::Integer(a), Value::Integer(b)) => {
                    let rem = a.checked_rem(*b).ok_or_else(overflow)?;
                    // floored: the remainder takes the sign of the divisor
                    if rem != 0 && (rem < 0) != (*b < 0) {
                        Ok(Value::Integer(rem + b))
                    } else {
                        Ok(Value::Integer(rem))
                    }
                }
                _ => {
                    let (Some(a), Some(b)) = (l.as_number(), r.as_number()) else {
                        return Err(mismatch());
                    };
                    if b == 0.0 {
                        let message = format!("{l} MOD {r}");
                        return Err(self.fail(FailureKind::DivisionByZero, message));
                    }
                    let rem = a % b;
                    if rem != 0.0 && (rem < 0.0) != (b < 0.0) {
                        Ok(Value::Real(rem + b))
                    } else {
                        Ok(Value::Real(rem))
                    }
                }
            },
            BinOpKind::And | BinOpKind::Or => match (&l, &r) {
                (Value::Boolean(a), Value::Boolean(b)) => {
                    let holds = if op == BinOpKind::And {
                        *a && *b
                    } else {
                        *a || *b
                    };
                    Ok(Value::Boolean(holds))
                }
                _ => Err(mismatch()),
            },
        }
    }
}

fn symbol(op: BinOpKind) -> &'static str {
    match op {
        BinOpKind::Or => "O",
        BinOpKind::And => "Y",
        BinOpKind::Equal => "=",
        BinOpKind::NotEqual => "<>",
        BinOpKind::LessThan => "<",
        BinOpKind::GreaterThan => ">",
        BinOpKind::LessEqual => "<=",
        BinOpKind::GreaterEqual => ">=",
        BinOpKind::Add => "+",
        BinOpKind::Sub => "-",
        BinOpKind::Mul => "*",
        BinOpKind::Div => "/",
        BinOpKind::Mod => "MOD",
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{codegen::translate, lexer::Lexer, parser::Parser};

    fn program(input: &str) -> GeneratedProgram {
        let tree = Parser::new(Lexer::tokenize(input)).parse();
        let result = translate(&tree);
        assert!(result.is_ok(), "{:?}", result.diagnostics);
        result.generated.unwrap()
    }

    fn run(input: &str) -> ExecutionOutput {
        Executor::new(RuntimeConfig::default()).run(&program(input))
    }

    fn lines(input: &str) -> Vec<String> {
        let output = run(input);
        assert!(output.is_success(), "{:?}", output.failure());
        output.lines().to_vec()
    }

    fn failure(input: &str) -> RuntimeFailure {
        let output = run(input);
        let Some(failure) = output.failure() else {
            panic!("expected a failure, got {:?}", output.lines());
        };
        failure.clone()
    }

    #[test]
    fn arithmetic() {
        assert_eq!(
            lines("INICIO\n ESCRIBIR 1 + 2 * 3, 7 / 2, 6 / 3, -7 MOD 3, 7 MOD -3\nFIN"),
            vec!["7 3.5 2.0 2 -2"]
        );
    }

    #[test]
    fn text_concatenation_and_comparison() {
        assert_eq!(
            lines("INICIO\n ESCRIBIR \"ab\" + 'c', \"a\" < \"b\", 2 = 2.0, 1 = \"1\"\nFIN"),
            vec!["abc VERDADERO VERDADERO FALSO"]
        );
    }

    #[test]
    fn logical_operators_short_circuit() {
        // the right operand would divide by zero
        assert_eq!(
            lines("INICIO\n x <- 0\n SI x <> 0 Y 10 / x > 1 ENTONCES\n  ESCRIBIR \"no\"\n SI_NO\n  ESCRIBIR \"si\"\n FIN_SI\nFIN"),
            vec!["si"]
        );
    }

    #[test]
    fn for_loop_counts_down_and_keeps_its_variable() {
        assert_eq!(
            lines("INICIO\n DESDE i <- 5 HASTA 1 PASO -2\n  ESCRIBIR i\n FIN_DESDE\n ESCRIBIR i\nFIN"),
            vec!["5", "3", "1", "1"]
        );
    }

    #[test]
    fn zero_step_is_rejected() {
        let f = failure("INICIO\n DESDE i <- 1 HASTA 3 PASO 0\n FIN\nFIN");
        assert_eq!(f.kind, FailureKind::TypeMismatch);
        assert_eq!(f.position, Position::new(2, 2));
    }

    #[test]
    fn division_by_zero_points_at_the_statement() {
        let source = "INICIO\n ESCRIBIR \"antes\"\n x <- 0\n r <- 10 / x\n ESCRIBIR \"despues\"\nFIN";
        let output = run(source);
        assert_eq!(output.lines(), ["antes"]);
        let Some(f) = output.failure() else {
            panic!();
        };
        assert_eq!(f.kind, FailureKind::DivisionByZero);
        assert_eq!(f.position, Position::new(4, 2));
    }

    #[test]
    fn integer_overflow() {
        let f = failure("INICIO\n x <- 9223372036854775807\n x <- x + 1\nFIN");
        assert_eq!(f.kind, FailureKind::Overflow);
    }

    #[test]
    fn undefined_variable() {
        let f = failure("INICIO\n ESCRIBIR nada\nFIN");
        assert_eq!(f.kind, FailureKind::UndefinedVariable);
        assert!(f.message.contains("nada"));
    }

    #[test]
    fn non_boolean_condition() {
        let f = failure("INICIO\n MIENTRAS 1 HACER\n FIN\nFIN");
        assert_eq!(f.kind, FailureKind::TypeMismatch);
    }

    #[test]
    fn declarations_use_type_defaults() {
        assert_eq!(
            lines("INICIO\n a: ENTERO\n b: REAL\n c: BOOLEANO\n d: CADENA\n ESCRIBIR a, b, c, d\nFIN"),
            vec!["0 0.0 FALSO "]
        );
    }

    #[test]
    fn recursion_and_depth_limit() {
        let source = "FUNCION fact(n: ENTERO): ENTERO
  SI n <= 1 ENTONCES
    RETORNAR 1
  FIN_SI
  RETORNAR n * fact(n - 1)
FIN
INICIO
  ESCRIBIR fact(10)
FIN";
        assert_eq!(lines(source), vec!["3628800"]);

        let config = RuntimeConfig {
            max_call_depth: 5,
            ..RuntimeConfig::default()
        };
        let output = Executor::new(config).run(&program(source));
        assert_eq!(
            output.failure().map(|f| f.kind),
            Some(FailureKind::CallDepthExceeded)
        );
    }

    #[test]
    fn procedure_without_value_in_expression() {
        let f = failure("PROCEDIMIENTO p()\nFIN\nINICIO\n x <- p()\nFIN");
        assert_eq!(f.kind, FailureKind::TypeMismatch);
    }

    #[test]
    fn arity_mismatch() {
        let f = failure("PROCEDIMIENTO p(a)\nFIN\nINICIO\n p(1, 2)\nFIN");
        assert_eq!(f.kind, FailureKind::TypeMismatch);
    }

    #[test]
    fn unknown_routine() {
        let f = failure("INICIO\n nadie(1)\nFIN");
        assert_eq!(f.kind, FailureKind::UndefinedVariable);
    }

    #[test]
    fn by_ref_argument_must_be_a_variable() {
        let f = failure("PROCEDIMIENTO p(VAR a)\nFIN\nINICIO\n p(1 + 2)\nFIN");
        assert_eq!(f.kind, FailureKind::TypeMismatch);
    }

    #[test]
    fn by_ref_creates_undeclared_variables() {
        assert_eq!(
            lines("PROCEDIMIENTO uno(S a: ENTERO)\n a <- 1\nFIN\nINICIO\n uno(nuevo)\n ESCRIBIR nuevo\nFIN"),
            vec!["1"]
        );
    }

    #[test]
    fn globals_are_shared_with_routines() {
        assert_eq!(
            lines("total: ENTERO\nPROCEDIMIENTO sumar(n)\n total <- total + n\nFIN\nINICIO\n sumar(2)\n sumar(3)\n ESCRIBIR total\nFIN"),
            vec!["5"]
        );
    }

    #[test]
    fn records_are_copied_on_assignment() {
        let source = "REGISTRO Punto
  x, z: ENTERO
FIN
INICIO
  p: Punto
  p.x <- 3
  q <- p
  q.x <- 4
  ESCRIBIR p, q.x
FIN";
        assert_eq!(lines(source), vec!["Punto(x=3, z=0) 4"]);
    }

    #[test]
    fn input_is_converted_to_the_declared_type() {
        let source = "INICIO\n n: REAL\n LEER n, m, s\n ESCRIBIR n, m + 1, s\nFIN";
        let output = Executor::new(RuntimeConfig::default())
            .with_input(["2", "41", "hola"].map(String::from).into_iter())
            .run(&program(source));
        assert_eq!(
            output,
            ExecutionOutput::Completed(vec!["2.0 42 hola".to_string()])
        );

        let output = Executor::new(RuntimeConfig::default())
            .with_input(vec!["x".to_string()].into_iter())
            .run(&program("INICIO\n n: ENTERO\n LEER n\nFIN"));
        assert_eq!(
            output.failure().map(|f| f.kind),
            Some(FailureKind::TypeMismatch)
        );
    }

    #[test]
    fn step_budget() {
        let config = RuntimeConfig {
            max_steps: 100,
            time_limit: Duration::from_secs(60),
            ..RuntimeConfig::default()
        };
        let source = "INICIO\n MIENTRAS VERDADERO\n  x <- 1\n FIN\nFIN";
        let output = Executor::new(config).run(&program(source));
        assert_eq!(output.failure().map(|f| f.kind), Some(FailureKind::Timeout));
    }

    #[test]
    fn recursion_up_to_the_default_depth_limit() {
        // `principal` is one call, so `f(198)` nests 200 calls
        let source = "FUNCION f(n: ENTERO): ENTERO
  SI n <= 0 ENTONCES
    RETORNAR 0
  FIN_SI
  RETORNAR 1 + f(n - 1)
FIN_FUNCION
INICIO
  ESCRIBIR f(198)
FIN";
        assert_eq!(lines(source), vec!["198"]);

        let f = failure(&source.replace("f(198)", "f(199)"));
        assert_eq!(f.kind, FailureKind::CallDepthExceeded);
        assert_eq!(f.position, Position::new(5, 3));
    }

    #[test]
    fn recursion_inside_nested_blocks() {
        let source = "FUNCION g(n: ENTERO): ENTERO
  r <- 0
  SI n > 0 ENTONCES
    DESDE i <- 1 HASTA 1
      k <- 0
      MIENTRAS k < 1 HACER
        CASO i SEA
          1: r <- 1 + g(n - 1)
        FIN_CASO
        k <- k + 1
      FIN_MIENTRAS
    FIN_DESDE
  FIN_SI
  RETORNAR r
FIN_FUNCION
INICIO
  ESCRIBIR g(198)
FIN";
        assert_eq!(lines(source), vec!["198"]);

        let config = RuntimeConfig {
            max_call_depth: 1_000,
            ..RuntimeConfig::default()
        };
        let output = Executor::new(config).run(&program(&source.replace("g(198)", "g(5000)")));
        assert_eq!(
            output.failure().map(|f| f.kind),
            Some(FailureKind::CallDepthExceeded)
        );
    }

    #[test]
    fn text_growth_is_capped() {
        let source = "INICIO
  s <- \"ab\"
  MIENTRAS VERDADERO HACER
    s <- s + s
  FIN_MIENTRAS
FIN";
        let f = failure(source);
        assert_eq!(f.kind, FailureKind::Overflow);
        assert_eq!(f.position, Position::new(4, 5));
    }

    #[test]
    fn return_in_top_level_block_skips_the_entry() {
        let source = "DESDE i <- 1 HASTA 3
  ESCRIBIR i
  SI i = 2 ENTONCES
    RETORNAR
  FIN_SI
FIN_DESDE
INICIO
  ESCRIBIR \"principal\"
FIN";
        assert_eq!(lines(source), vec!["1", "2"]);
    }
}
