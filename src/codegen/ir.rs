//! Lowered form of a program: what the executor runs and what the generated
//! source is rendered from.

use crate::{
    lexer::Position,
    parser::{BinOpKind, Literal, Place, Type, UnaryOpKind},
};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Module {
    pub records: Vec<RecordDef>,
    /// Top-level variable declarations, visible from every routine.
    pub globals: Vec<Instr>,
    pub routines: Vec<Routine>,
    /// Top-level blocks, run in source order before the entry point.
    pub prelude: Vec<Instr>,
    /// Routine invoked once after the prelude. `None` when the program has
    /// no `INICIO` block.
    pub entry: Option<String>,
}

impl Module {
    pub fn routine(&self, name: &str) -> Option<&Routine> {
        self.routines.iter().find(|r| r.name == name)
    }

    pub fn record(&self, name: &str) -> Option<&RecordDef> {
        self.records.iter().find(|r| r.name == name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordDef {
    pub name: String,
    pub fields: Vec<(String, Type)>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoutineKind {
    Function,
    Procedure,
    Entry,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Routine {
    pub name: String,
    pub kind: RoutineKind,
    pub params: Vec<ParamSlot>,
    pub returns: Option<Type>,
    pub body: Vec<Instr>,
}

/// A by-ref parameter shares the caller's variable cell instead of holding
/// a copy of its value.
#[derive(Clone, Debug, PartialEq)]
pub struct ParamSlot {
    pub name: String,
    pub by_ref: bool,
    pub ty: Option<Type>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Instr {
    pub op: Op,
    pub position: Position,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    Declare {
        names: Vec<String>,
        ty: Type,
    },
    Store {
        place: Place,
        value: Operand,
    },
    Print(Vec<Operand>),
    Read(Vec<Place>),
    Branch {
        cond: Operand,
        then: Vec<Instr>,
        otherwise: Vec<Instr>,
    },
    Loop {
        cond: Operand,
        body: Vec<Instr>,
    },
    Range {
        var: String,
        start: Operand,
        end: Operand,
        step: Option<Operand>,
        body: Vec<Instr>,
    },
    Select {
        subject: Operand,
        arms: Vec<Arm>,
        default: Option<Vec<Instr>>,
    },
    Invoke {
        name: String,
        args: Vec<Arg>,
    },
    Return(Option<Operand>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Arm {
    pub labels: Vec<Literal>,
    pub body: Vec<Instr>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Const(Literal),
    Load(String),
    Field(Box<Operand>, String),
    Call(String, Vec<Arg>),
    Binary(BinOpKind, Box<Operand>, Box<Operand>),
    Unary(UnaryOpKind, Box<Operand>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Arg {
    Value(Operand),
    /// Name of a caller variable handed over by reference.
    Ref(String),
}
