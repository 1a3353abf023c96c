use std::fmt;

use crate::parser::Literal;

/// Record instance. Fields stay in declaration order.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub name: String,
    pub fields: Vec<(String, Value)>,
}

impl Record {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == field).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, field: &str) -> Option<&mut Value> {
        self.fields
            .iter_mut()
            .find(|(n, _)| n == field)
            .map(|(_, v)| v)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Integer(i64),
    Real(f64),
    Character(char),
    String(String),
    Boolean(bool),
    Record(Record),
}

impl Value {
    pub fn type_name(&self) -> &str {
        match self {
            Value::Integer(_) => "ENTERO",
            Value::Real(_) => "REAL",
            Value::Character(_) => "CARACTER",
            Value::String(_) => "CADENA",
            Value::Boolean(_) => "BOOLEANO",
            Value::Record(r) => &r.name,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Real(x) => Some(*x),
            _ => None,
        }
    }

    /// Characters and strings both count as text.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Character(c) => Some(c.to_string()),
            Value::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Equality as `=` sees it: integers and reals compare numerically and
    /// values of unrelated types are unequal.
    pub fn loosely_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => {
                a.name == b.name
                    && a.fields.len() == b.fields.len()
                    && a.fields
                        .iter()
                        .zip(&b.fields)
                        .all(|((n1, v1), (n2, v2))| n1 == n2 && v1.loosely_equals(v2))
            }
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            _ => match (self.as_number(), other.as_number()) {
                (Some(a), Some(b)) => a == b,
                _ => match (self.as_text(), other.as_text()) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                },
            },
        }
    }
}

impl From<&Literal> for Value {
    fn from(literal: &Literal) -> Self {
        match literal {
            Literal::Integer(n) => Value::Integer(*n),
            Literal::Real(x) => Value::Real(*x),
            Literal::Character(c) => Value::Character(*c),
            Literal::String(s) => Value::String(s.clone()),
            Literal::Boolean(b) => Value::Boolean(*b),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{n}"),
            // positional notation with at least one decimal: 2.0, 1e16 as
            // 10000000000000000.0
            Value::Real(x) if x.is_finite() && x.fract() == 0.0 => write!(f, "{x}.0"),
            Value::Real(x) => write!(f, "{x}"),
            Value::Character(c) => write!(f, "{c}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Boolean(true) => write!(f, "VERDADERO"),
            Value::Boolean(false) => write!(f, "FALSO"),
            Value::Record(r) => {
                write!(f, "{}(", r.name)?;
                for (i, (name, value)) in r.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}={value}")?;
                }
                write!(f, ")")
            }
        }
    }
}
