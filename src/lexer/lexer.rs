use log::trace;

use super::{
    token::{KEYWORDS, ONE_SYMBOL_TOKENS, TWO_SYMBOLS_TOKENS},
    Position, Token, TokenKind,
};

/// Turns pseudo-code text into tokens. Never fails: characters it cannot
/// place become `TokenKind::Unknown` and are left for the parser to report.
#[derive(Debug)]
pub struct Lexer {
    chars: Vec<char>,
    tokens: Vec<Token>,
    index: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    fn new(s: &str) -> Self {
        Self {
            chars: s.chars().collect(),
            tokens: vec![],
            index: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.index + offset).copied()
    }

    fn advance(&mut self) {
        if self.chars[self.index] == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        self.index += 1;
    }

    fn new_token(&mut self, kind: TokenKind, len: usize) {
        let position = Position::new(self.line, self.column);
        let lexeme: String = self.chars[self.index..self.index + len].iter().collect();
        for _ in 0..len {
            self.advance();
        }
        self.tokens.push(Token {
            kind,
            lexeme,
            position,
        });
    }

    fn take_while(&self, f: impl Fn(char) -> bool) -> usize {
        self.chars[self.index..]
            .iter()
            .take_while(|&&c| f(c))
            .count()
    }

    fn parse_number(&mut self) {
        let mut len = self.take_while(|c| c.is_ascii_digit());
        let is_real = self.peek(len) == Some('.')
            && self.peek(len + 1).is_some_and(|c| c.is_ascii_digit());
        if is_real {
            len += 1;
            len += self.chars[self.index + len..]
                .iter()
                .take_while(|c| c.is_ascii_digit())
                .count();
        }

        let s: String = self.chars[self.index..self.index + len].iter().collect();
        let kind = if is_real {
            s.parse()
                .map(TokenKind::Real)
                .unwrap_or_else(|_| TokenKind::Unknown(s.clone()))
        } else {
            s.parse()
                .map(TokenKind::Integer)
                .unwrap_or_else(|_| TokenKind::Unknown(s.clone()))
        };
        self.new_token(kind, len);
    }

    fn parse_identifier(&mut self) {
        let len = self.take_while(|c| c.is_alphanumeric() || c == '_');
        let s: String = self.chars[self.index..self.index + len].iter().collect();

        if let Some(kind) = KEYWORDS.get(s.to_uppercase().as_str()) {
            self.new_token(kind.clone(), len);
        } else {
            self.new_token(TokenKind::Ident(s), len);
        }
    }

    /// Quoted text. A single character between single quotes is a
    /// `Char`, anything else a `Str`. Literals end at the closing quote and
    /// may not span lines.
    fn parse_quoted(&mut self, quote: char) {
        let body = self.chars[self.index + 1..]
            .iter()
            .take_while(|&&c| c != quote && c != '\n')
            .count();

        if self.peek(body + 1) != Some(quote) {
            let s: String = self.chars[self.index..self.index + 1 + body].iter().collect();
            self.new_token(TokenKind::Unknown(s), body + 1);
            return;
        }

        let text: String = self.chars[self.index + 1..self.index + 1 + body]
            .iter()
            .collect();
        let mut chars = text.chars();
        let kind = match (quote, chars.next(), chars.next()) {
            ('\'', Some(c), None) => TokenKind::Char(c),
            _ => TokenKind::Str(text),
        };
        self.new_token(kind, body + 2);
    }

    fn skip_comment(&mut self) {
        while self.index < self.chars.len() && self.chars[self.index] != '\n' {
            self.advance();
        }
    }

    fn _tokenize(&mut self) {
        while self.index < self.chars.len() {
            let c = self.chars[self.index];
            let c2 = self.chars[self.index..].iter().take(2).collect::<String>();

            if c.is_whitespace() {
                self.advance();
            } else if c2 == "//" {
                self.skip_comment();
            } else if c.is_ascii_digit() {
                self.parse_number();
            } else if c.is_alphabetic() || c == '_' {
                self.parse_identifier();
            } else if c == '"' || c == '\'' {
                self.parse_quoted(c);
            } else if let Some(kind) = TWO_SYMBOLS_TOKENS.get(c2.as_str()) {
                self.new_token(kind.clone(), 2);
            } else if let Some(kind) = ONE_SYMBOL_TOKENS.get(&c) {
                self.new_token(kind.clone(), 1);
            } else {
                self.new_token(TokenKind::Unknown(c.to_string()), 1);
            }
        }

        self.tokens.push(Token {
            kind: TokenKind::Eof,
            lexeme: String::new(),
            position: Position::new(self.line, self.column),
        });
    }

    /// Tokenizes the whole text. The last token is always `TokenKind::Eof`.
    pub fn tokenize(s: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(s);
        lexer._tokenize();
        trace!("lexed {} tokens", lexer.tokens.len());

        lexer.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::TokenCategory;

    fn kinds(s: &str) -> Vec<TokenKind> {
        Lexer::tokenize(s).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn operators_from_the_symbol_table() {
        assert_eq!(
            kinds("a <- b + c - d * e / f MOD g = h <> i < j > k <= l >= m"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Arrow,
                TokenKind::Ident("b".into()),
                TokenKind::Plus,
                TokenKind::Ident("c".into()),
                TokenKind::Minus,
                TokenKind::Ident("d".into()),
                TokenKind::Star,
                TokenKind::Ident("e".into()),
                TokenKind::Slash,
                TokenKind::Ident("f".into()),
                TokenKind::Mod,
                TokenKind::Ident("g".into()),
                TokenKind::Equal,
                TokenKind::Ident("h".into()),
                TokenKind::NotEqual,
                TokenKind::Ident("i".into()),
                TokenKind::LessThan,
                TokenKind::Ident("j".into()),
                TokenKind::GreaterThan,
                TokenKind::Ident("k".into()),
                TokenKind::LessEqual,
                TokenKind::Ident("l".into()),
                TokenKind::GreaterEqual,
                TokenKind::Ident("m".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn arrow_without_spaces() {
        assert_eq!(
            kinds("a_1<-2"),
            vec![
                TokenKind::Ident("a_1".into()),
                TokenKind::Arrow,
                TokenKind::Integer(2),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn keywords_ignore_case() {
        assert_eq!(
            kinds("desde Hasta FIN_desde mod"),
            vec![
                TokenKind::Desde,
                TokenKind::Hasta,
                TokenKind::FinDesde,
                TokenKind::Mod,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn numbers_are_integer_or_real() {
        assert_eq!(
            kinds("12 3.25 4."),
            vec![
                TokenKind::Integer(12),
                TokenKind::Real(3.25),
                TokenKind::Integer(4),
                TokenKind::Dot,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn quoted_literals() {
        assert_eq!(
            kinds(r#""hola mundo" 'x' 'xy'"#),
            vec![
                TokenKind::Str("hola mundo".into()),
                TokenKind::Char('x'),
                TokenKind::Str("xy".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn comments_and_whitespace_are_dropped() {
        assert_eq!(
            kinds("x // nada de esto\n\t z"),
            vec![
                TokenKind::Ident("x".into()),
                TokenKind::Ident("z".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn unknown_characters_do_not_abort() {
        let tokens = Lexer::tokenize("x ? \"abierta\nz");
        assert_eq!(tokens[1].kind, TokenKind::Unknown("?".into()));
        assert_eq!(tokens[1].kind.category(), TokenCategory::Unknown);
        assert_eq!(tokens[2].kind, TokenKind::Unknown("\"abierta".into()));
        assert_eq!(tokens[3].kind, TokenKind::Ident("z".into()));
    }

    #[test]
    fn positions_are_one_indexed() {
        let tokens = Lexer::tokenize("INICIO\n  ESCRIBIR x\nFIN");
        assert_eq!(tokens[0].position, Position::new(1, 1));
        assert_eq!(tokens[1].position, Position::new(2, 3));
        assert_eq!(tokens[1].lexeme, "ESCRIBIR");
        assert_eq!(tokens[2].position, Position::new(2, 12));
        assert_eq!(tokens[3].position, Position::new(3, 1));
        assert_eq!(tokens[4].kind, TokenKind::Eof);
    }
}
