use std::fmt;

use phf::phf_map;

pub(super) static KEYWORDS: phf::Map<&str, TokenKind> = phf_map! {
    "INICIO" => TokenKind::Inicio,
    "FIN" => TokenKind::Fin,
    "FUNCION" => TokenKind::Funcion,
    "FUNCIÓN" => TokenKind::Funcion,
    "FIN_FUNCION" => TokenKind::FinFuncion,
    "FIN_FUNCIÓN" => TokenKind::FinFuncion,
    "PROCEDIMIENTO" => TokenKind::Procedimiento,
    "FIN_PROCEDIMIENTO" => TokenKind::FinProcedimiento,
    "REGISTRO" => TokenKind::Registro,
    "FIN_REGISTRO" => TokenKind::FinRegistro,
    "TIPO" => TokenKind::Tipo,
    "FIN_TIPO" => TokenKind::FinTipo,
    "SI" => TokenKind::Si,
    "ENTONCES" => TokenKind::Entonces,
    "SI_NO" => TokenKind::SiNo,
    "SINO" => TokenKind::SiNo,
    "FIN_SI" => TokenKind::FinSi,
    "MIENTRAS" => TokenKind::Mientras,
    "FIN_MIENTRAS" => TokenKind::FinMientras,
    "HACER" => TokenKind::Hacer,
    "DESDE" => TokenKind::Desde,
    "HASTA" => TokenKind::Hasta,
    "PASO" => TokenKind::Paso,
    "FIN_DESDE" => TokenKind::FinDesde,
    "CASO" => TokenKind::Caso,
    "SEA" => TokenKind::Sea,
    "OTRO" => TokenKind::Otro,
    "FIN_CASO" => TokenKind::FinCaso,
    "ESCRIBIR" => TokenKind::Escribir,
    "LEER" => TokenKind::Leer,
    "LLAMAR" => TokenKind::Llamar,
    "RETORNAR" => TokenKind::Retornar,
    "DEVOLVER" => TokenKind::Retornar,
    "MOD" => TokenKind::Mod,
    "Y" => TokenKind::And,
    "O" => TokenKind::Or,
    "NO" => TokenKind::Not,
    "VERDADERO" => TokenKind::True,
    "FALSO" => TokenKind::False,
    "ENTERO" => TokenKind::IntegerType,
    "REAL" => TokenKind::RealType,
    "CARACTER" => TokenKind::CharacterType,
    "CARÁCTER" => TokenKind::CharacterType,
    "CADENA" => TokenKind::StringType,
    "BOOLEANO" => TokenKind::BooleanType,
    "LOGICO" => TokenKind::BooleanType,
    "LÓGICO" => TokenKind::BooleanType,
};

pub(super) static TWO_SYMBOLS_TOKENS: phf::Map<&str, TokenKind> = phf_map! {
    "<-" => TokenKind::Arrow,
    "<>" => TokenKind::NotEqual,
    "<=" => TokenKind::LessEqual,
    ">=" => TokenKind::GreaterEqual,
};

pub(super) static ONE_SYMBOL_TOKENS: phf::Map<char, TokenKind> = phf_map! {
    '+' => TokenKind::Plus,
    '-' => TokenKind::Minus,
    '*' => TokenKind::Star,
    '/' => TokenKind::Slash,
    '=' => TokenKind::Equal,
    '<' => TokenKind::LessThan,
    '>' => TokenKind::GreaterThan,
    '(' => TokenKind::LeftParen,
    ')' => TokenKind::RightParen,
    ',' => TokenKind::Comma,
    ':' => TokenKind::Colon,
    '.' => TokenKind::Dot,
};

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Integer(i64),
    Real(f64),
    Str(String),
    Char(char),
    True,
    False,

    Ident(String),

    Inicio,
    Fin,
    Funcion,
    FinFuncion,
    Procedimiento,
    FinProcedimiento,
    Registro,
    FinRegistro,
    Tipo,
    FinTipo,
    Si,
    Entonces,
    SiNo,
    FinSi,
    Mientras,
    FinMientras,
    Hacer,
    Desde,
    Hasta,
    Paso,
    FinDesde,
    Caso,
    Sea,
    Otro,
    FinCaso,
    Escribir,
    Leer,
    Llamar,
    Retornar,

    IntegerType,
    RealType,
    CharacterType,
    StringType,
    BooleanType,

    Arrow,
    Plus,
    Minus,
    Star,
    Slash,
    Mod,
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessEqual,
    GreaterEqual,
    And,
    Or,
    Not,

    LeftParen,
    RightParen,
    Comma,
    Colon,
    Dot,

    Unknown(String),
    Eof,
}

/// Coarse classification of a token, independent of its payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenCategory {
    Keyword,
    Identifier,
    Literal,
    Operator,
    Punctuation,
    Unknown,
    EndOfInput,
}

impl TokenKind {
    pub fn category(&self) -> TokenCategory {
        match self {
            TokenKind::Integer(_)
            | TokenKind::Real(_)
            | TokenKind::Str(_)
            | TokenKind::Char(_)
            | TokenKind::True
            | TokenKind::False => TokenCategory::Literal,
            TokenKind::Ident(_) => TokenCategory::Identifier,
            TokenKind::Arrow
            | TokenKind::Plus
            | TokenKind::Minus
            | TokenKind::Star
            | TokenKind::Slash
            | TokenKind::Equal
            | TokenKind::NotEqual
            | TokenKind::LessThan
            | TokenKind::GreaterThan
            | TokenKind::LessEqual
            | TokenKind::GreaterEqual => TokenCategory::Operator,
            TokenKind::LeftParen
            | TokenKind::RightParen
            | TokenKind::Comma
            | TokenKind::Colon
            | TokenKind::Dot => TokenCategory::Punctuation,
            TokenKind::Unknown(_) => TokenCategory::Unknown,
            TokenKind::Eof => TokenCategory::EndOfInput,
            // MOD, Y, O and NO are keyword-operators
            _ => TokenCategory::Keyword,
        }
    }
}

/// 1-indexed location of the first character of a token.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub position: Position,
}

impl Token {
    /// Text used when the token shows up in a diagnostic.
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Eof => "end of input".to_string(),
            TokenKind::Unknown(_) => format!("unrecognized `{}`", self.lexeme),
            _ => format!("`{}`", self.lexeme),
        }
    }
}
