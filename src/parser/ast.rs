use std::fmt;

use crate::lexer::Position;

use super::{Expr, Literal, ParseError};

/// Output of the parser: the top-level statements in source order plus every
/// syntax problem found on the way. Statements are only meaningful when
/// `diagnostics` is empty.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProgramTree {
    pub statements: Vec<Statement>,
    pub diagnostics: Vec<ParseError>,
}

impl ProgramTree {
    pub fn is_valid(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
    pub kind: StmtKind,
    pub position: Position,
}

#[derive(Clone, Debug, PartialEq)]
pub enum StmtKind {
    Assignment {
        target: Place,
        value: Expr,
    },
    Print(Vec<Expr>),
    Input(Vec<Place>),
    Declaration {
        names: Vec<String>,
        ty: Type,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
    Return(Option<Expr>),

    If {
        cond: Expr,
        then_branch: Vec<Statement>,
        else_branch: Option<Vec<Statement>>,
    },
    While {
        cond: Expr,
        body: Vec<Statement>,
    },
    DoWhile {
        body: Vec<Statement>,
        cond: Expr,
    },
    For {
        var: String,
        start: Expr,
        end: Expr,
        step: Option<Expr>,
        body: Vec<Statement>,
    },
    Match {
        subject: Expr,
        arms: Vec<MatchArm>,
        default: Option<Vec<Statement>>,
    },

    FunctionDecl(Callable),
    ProcedureDecl(Callable),
    MainBlock(Vec<Statement>),
    RecordDecl(RecordDecl),
}

impl StmtKind {
    /// Keyword that introduces the statement, for logs and messages.
    pub fn keyword(&self) -> &'static str {
        match self {
            StmtKind::Assignment { .. } => "<-",
            StmtKind::Print(_) => "ESCRIBIR",
            StmtKind::Input(_) => "LEER",
            StmtKind::Declaration { .. } => ":",
            StmtKind::Call { .. } => "LLAMAR",
            StmtKind::Return(_) => "RETORNAR",
            StmtKind::If { .. } => "SI",
            StmtKind::While { .. } => "MIENTRAS",
            StmtKind::DoWhile { .. } => "HACER",
            StmtKind::For { .. } => "DESDE",
            StmtKind::Match { .. } => "CASO",
            StmtKind::FunctionDecl(_) => "FUNCION",
            StmtKind::ProcedureDecl(_) => "PROCEDIMIENTO",
            StmtKind::MainBlock(_) => "INICIO",
            StmtKind::RecordDecl(_) => "REGISTRO",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MatchArm {
    pub labels: Vec<Literal>,
    pub body: Vec<Statement>,
}

/// A `FUNCION` or `PROCEDIMIENTO`. Procedures never have a return type.
#[derive(Clone, Debug, PartialEq)]
pub struct Callable {
    pub name: String,
    pub params: Vec<Param>,
    pub returns: Option<Type>,
    pub body: Vec<Statement>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: String,
    pub mode: ParamMode,
    pub ty: Option<Type>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamMode {
    /// `E`, or no mode at all.
    In,
    /// `S`
    Out,
    /// `ES`, `REF`, `VAR`
    InOut,
}

impl ParamMode {
    pub fn from_word(word: &str) -> Option<Self> {
        match word.to_uppercase().as_str() {
            "E" => Some(ParamMode::In),
            "S" => Some(ParamMode::Out),
            "ES" | "REF" | "VAR" => Some(ParamMode::InOut),
            _ => None,
        }
    }

    pub fn is_by_ref(self) -> bool {
        self != ParamMode::In
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordDecl {
    pub name: String,
    pub fields: Vec<Field>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: Type,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Integer,
    Real,
    Character,
    String,
    Boolean,
    Record(String),
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Integer => write!(f, "ENTERO"),
            Type::Real => write!(f, "REAL"),
            Type::Character => write!(f, "CARACTER"),
            Type::String => write!(f, "CADENA"),
            Type::Boolean => write!(f, "BOOLEANO"),
            Type::Record(name) => write!(f, "{name}"),
        }
    }
}

/// Assignable location: a variable, optionally followed by record fields.
#[derive(Clone, Debug, PartialEq)]
pub struct Place {
    pub root: String,
    pub fields: Vec<String>,
}

impl Place {
    pub fn var(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            fields: vec![],
        }
    }
}

impl fmt::Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for field in &self.fields {
            write!(f, ".{field}")?;
        }
        Ok(())
    }
}
