use std::collections::HashMap;

use log::{debug, warn};

use crate::{
    config::CodegenConfig,
    parser::{Callable, Expr, ParseError, ProgramTree, Statement, StmtKind},
};

use super::{
    render, Arg, Arm, Instr, Module, Op, Operand, ParamSlot, RecordDef, Routine, RoutineKind,
};

const ENTRY_POINT: &str = "principal";

/// A translated program: the rendered target source and the module it was
/// rendered from.
#[derive(Clone, Debug, PartialEq)]
pub struct GeneratedProgram {
    pub source: String,
    pub module: Module,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TranslationResult {
    pub generated: Option<GeneratedProgram>,
    pub diagnostics: Vec<ParseError>,
}

impl TranslationResult {
    pub fn is_ok(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn generated_source(&self) -> Option<&str> {
        self.generated.as_ref().map(|g| g.source.as_str())
    }
}

pub struct Codegen {
    config: CodegenConfig,
    // by-ref flag of every parameter, per callable name
    signatures: HashMap<String, Vec<bool>>,
}

impl Codegen {
    pub fn new(config: CodegenConfig) -> Self {
        Self {
            config,
            signatures: HashMap::new(),
        }
    }

    /// Translates a parsed program. Trees carrying diagnostics come back as
    /// those same diagnostics and no source at all.
    pub fn translate(&mut self, tree: &ProgramTree) -> TranslationResult {
        if !tree.is_valid() {
            return TranslationResult {
                generated: None,
                diagnostics: tree.diagnostics.clone(),
            };
        }

        let module = self.gen_program(&tree.statements);
        let source = render::render(&module, &self.config);
        debug!(
            "generated {} routines, entry point {:?}",
            module.routines.len(),
            module.entry
        );

        TranslationResult {
            generated: Some(GeneratedProgram { source, module }),
            diagnostics: vec![],
        }
    }

    fn collect_signatures(&mut self, statements: &[Statement]) {
        self.signatures.clear();
        for stmt in statements {
            if let StmtKind::FunctionDecl(c) | StmtKind::ProcedureDecl(c) = &stmt.kind {
                let by_ref = c.params.iter().map(|p| p.mode.is_by_ref()).collect();
                self.signatures.insert(c.name.clone(), by_ref);
            }
        }
    }

    fn gen_program(&mut self, statements: &[Statement]) -> Module {
        self.collect_signatures(statements);
        let mut module = Module::default();
        let mut main_body = None;

        for stmt in statements {
            match &stmt.kind {
                StmtKind::RecordDecl(r) => module.records.push(RecordDef {
                    name: r.name.clone(),
                    fields: r
                        .fields
                        .iter()
                        .map(|f| (f.name.clone(), f.ty.clone()))
                        .collect(),
                }),
                StmtKind::FunctionDecl(c) => {
                    module.routines.push(self.gen_routine(c, RoutineKind::Function))
                }
                StmtKind::ProcedureDecl(c) => {
                    module.routines.push(self.gen_routine(c, RoutineKind::Procedure))
                }
                StmtKind::MainBlock(body) => main_body = Some(self.gen_block(body)),
                StmtKind::Declaration { .. } => module.globals.extend(self.gen_stmt(stmt)),
                StmtKind::If { .. }
                | StmtKind::While { .. }
                | StmtKind::DoWhile { .. }
                | StmtKind::For { .. }
                | StmtKind::Match { .. } => module.prelude.extend(self.gen_stmt(stmt)),
                kind => warn!(
                    "dropping top-level `{}` at {}: statements outside a block never run",
                    kind.keyword(),
                    stmt.position
                ),
            }
        }

        if let Some(body) = main_body {
            let mut name = ENTRY_POINT.to_string();
            while module.routine(&name).is_some() {
                name.push('_');
            }
            module.routines.push(Routine {
                name: name.clone(),
                kind: RoutineKind::Entry,
                params: vec![],
                returns: None,
                body,
            });
            module.entry = Some(name);
        }

        module
    }

    fn gen_routine(&self, callable: &Callable, kind: RoutineKind) -> Routine {
        Routine {
            name: callable.name.clone(),
            kind,
            params: callable
                .params
                .iter()
                .map(|p| ParamSlot {
                    name: p.name.clone(),
                    by_ref: p.mode.is_by_ref(),
                    ty: p.ty.clone(),
                })
                .collect(),
            returns: callable.returns.clone(),
            body: self.gen_block(&callable.body),
        }
    }

    fn gen_block(&self, statements: &[Statement]) -> Vec<Instr> {
        statements.iter().flat_map(|s| self.gen_stmt(s)).collect()
    }

    /// Most statements become one instruction; a do-while becomes its body
    /// followed by a pre-condition loop over a copy of that body.
    fn gen_stmt(&self, stmt: &Statement) -> Vec<Instr> {
        let position = stmt.position;
        let op = match &stmt.kind {
            StmtKind::Assignment { target, value } => Op::Store {
                place: target.clone(),
                value: self.gen_expr(value),
            },
            StmtKind::Print(args) => Op::Print(args.iter().map(|a| self.gen_expr(a)).collect()),
            StmtKind::Input(places) => Op::Read(places.clone()),
            StmtKind::Declaration { names, ty } => Op::Declare {
                names: names.clone(),
                ty: ty.clone(),
            },
            StmtKind::Call { name, args } => Op::Invoke {
                name: name.clone(),
                args: self.gen_args(name, args),
            },
            StmtKind::Return(value) => Op::Return(value.as_ref().map(|v| self.gen_expr(v))),
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => Op::Branch {
                cond: self.gen_expr(cond),
                then: self.gen_block(then_branch),
                otherwise: else_branch
                    .as_deref()
                    .map(|b| self.gen_block(b))
                    .unwrap_or_default(),
            },
            StmtKind::While { cond, body } => Op::Loop {
                cond: self.gen_expr(cond),
                body: self.gen_block(body),
            },
            StmtKind::DoWhile { body, cond } => {
                let body = self.gen_block(body);
                let mut instrs = body.clone();
                instrs.push(Instr {
                    op: Op::Loop {
                        cond: self.gen_expr(cond),
                        body,
                    },
                    position,
                });
                return instrs;
            }
            StmtKind::For {
                var,
                start,
                end,
                step,
                body,
            } => Op::Range {
                var: var.clone(),
                start: self.gen_expr(start),
                end: self.gen_expr(end),
                step: step.as_ref().map(|s| self.gen_expr(s)),
                body: self.gen_block(body),
            },
            StmtKind::Match {
                subject,
                arms,
                default,
            } => Op::Select {
                subject: self.gen_expr(subject),
                arms: arms
                    .iter()
                    .map(|arm| Arm {
                        labels: arm.labels.clone(),
                        body: self.gen_block(&arm.body),
                    })
                    .collect(),
                default: default.as_deref().map(|b| self.gen_block(b)),
            },
            kind => {
                warn!(
                    "dropping nested `{}` at {}: only allowed at top level",
                    kind.keyword(),
                    position
                );
                return vec![];
            }
        };

        vec![Instr { op, position }]
    }

    /// Arguments in by-ref position pass the variable itself when they are
    /// a plain variable. Anything else goes by value and is rejected when
    /// the call runs.
    fn gen_args(&self, callee: &str, args: &[Expr]) -> Vec<Arg> {
        let by_ref = self.signatures.get(callee);
        args.iter()
            .enumerate()
            .map(|(i, arg)| {
                let is_ref = by_ref.and_then(|s| s.get(i)).copied().unwrap_or(false);
                match arg {
                    Expr::Variable(name) if is_ref => Arg::Ref(name.clone()),
                    _ => Arg::Value(self.gen_expr(arg)),
                }
            })
            .collect()
    }

    fn gen_expr(&self, expr: &Expr) -> Operand {
        match expr {
            Expr::Literal(l) => Operand::Const(l.clone()),
            Expr::Variable(name) => Operand::Load(name.clone()),
            Expr::Field(base, field) => {
                Operand::Field(Box::new(self.gen_expr(base)), field.clone())
            }
            Expr::Call(name, args) => Operand::Call(name.clone(), self.gen_args(name, args)),
            Expr::Binary(op, l, r) => Operand::Binary(
                *op,
                Box::new(self.gen_expr(l)),
                Box::new(self.gen_expr(r)),
            ),
            Expr::Unary(op, e) => Operand::Unary(*op, Box::new(self.gen_expr(e))),
        }
    }
}

/// Translates with the default configuration.
pub fn translate(tree: &ProgramTree) -> TranslationResult {
    Codegen::new(CodegenConfig::default()).translate(tree)
}
