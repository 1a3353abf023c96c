#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Variable(String),
    Field(Box<Expr>, String),
    Call(String, Vec<Expr>),
    Binary(BinOpKind, Box<Expr>, Box<Expr>),
    Unary(UnaryOpKind, Box<Expr>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Integer(i64),
    Real(f64),
    Character(char),
    String(String),
    Boolean(bool),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOpKind {
    Or,
    And,
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessEqual,
    GreaterEqual,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinOpKind {
    /// Binding power, higher binds tighter. Prefix `NO` sits between `Y` and
    /// the comparisons.
    pub fn precedence(self) -> u8 {
        match self {
            BinOpKind::Or => 1,
            BinOpKind::And => 2,
            BinOpKind::Equal
            | BinOpKind::NotEqual
            | BinOpKind::LessThan
            | BinOpKind::GreaterThan
            | BinOpKind::LessEqual
            | BinOpKind::GreaterEqual => 4,
            BinOpKind::Add | BinOpKind::Sub => 5,
            BinOpKind::Mul | BinOpKind::Div | BinOpKind::Mod => 6,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOpKind {
    Neg,
    Not,
}

impl UnaryOpKind {
    pub fn precedence(self) -> u8 {
        match self {
            UnaryOpKind::Not => 3,
            UnaryOpKind::Neg => 7,
        }
    }
}
