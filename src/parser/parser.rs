use log::debug;

use crate::lexer::{Position, Token, TokenKind};

use super::{
    BinOpKind, Callable, Expr, Field, Literal, MatchArm, Param, ParamMode, ParseError, Place,
    ProgramTree, RecordDecl, Statement, StmtKind, SyntaxErrorKind, Type, UnaryOpKind,
};

type PResult<T> = Result<T, ParseError>;

const WHILE_CLOSERS: &[TokenKind] = &[TokenKind::FinMientras, TokenKind::Fin];
const FOR_CLOSERS: &[TokenKind] = &[TokenKind::FinDesde, TokenKind::Fin];
const FUNCTION_CLOSERS: &[TokenKind] = &[TokenKind::FinFuncion, TokenKind::Fin];
const PROCEDURE_CLOSERS: &[TokenKind] = &[TokenKind::FinProcedimiento, TokenKind::Fin];
const RECORD_CLOSERS: &[TokenKind] = &[TokenKind::FinRegistro, TokenKind::FinTipo, TokenKind::Fin];

#[derive(Debug)]
struct OpenBlock {
    construct: &'static str,
    opened_at: Position,
    closers: &'static str,
}

#[derive(Debug)]
pub struct Parser {
    tokens: Vec<Token>,
    index: usize,
    open_blocks: Vec<OpenBlock>,
    main_at: Option<Position>,
    diagnostics: Vec<ParseError>,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.last().map_or(true, |t| t.kind != TokenKind::Eof) {
            let position = tokens
                .last()
                .map(|t| t.position)
                .unwrap_or(Position::new(1, 1));
            tokens.push(Token {
                kind: TokenKind::Eof,
                lexeme: String::new(),
                position,
            });
        }

        Self {
            tokens,
            index: 0,
            open_blocks: vec![],
            main_at: None,
            diagnostics: vec![],
        }
    }

    pub fn parse(&mut self) -> ProgramTree {
        let statements = self.parse_program();
        debug!(
            "parsed {} top-level statements, {} diagnostics",
            statements.len(),
            self.diagnostics.len()
        );

        ProgramTree {
            statements,
            diagnostics: std::mem::take(&mut self.diagnostics),
        }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.index]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        let i = (self.index + offset).min(self.tokens.len() - 1);
        &self.tokens[i].kind
    }

    fn is_eof(&self) -> bool {
        self.peek_kind() == &TokenKind::Eof
    }

    fn bump(&mut self) -> Token {
        let t = self.tokens[self.index].clone();
        if !self.is_eof() {
            self.index += 1;
        }
        t
    }

    fn consume(&mut self, kind: &TokenKind) -> bool {
        if self.peek_kind() != kind {
            return false;
        }
        self.index += 1;
        true
    }

    fn expect(&mut self, kind: &TokenKind, expected: &str) -> PResult<Token> {
        if self.peek_kind() != kind {
            return Err(self.unexpected(expected));
        }
        Ok(self.bump())
    }

    /// `Y` and `O` double as names when they sit where a name is expected.
    fn is_name(kind: &TokenKind) -> bool {
        matches!(kind, TokenKind::Ident(_) | TokenKind::And | TokenKind::Or)
    }

    fn expect_name(&mut self, expected: &str) -> PResult<String> {
        if !Self::is_name(self.peek_kind()) {
            return Err(self.unexpected(expected));
        }
        Ok(self.bump().lexeme)
    }

    /// The current token sits on the same line as the one before it.
    fn continues_line(&self) -> bool {
        self.index > 0
            && !self.is_eof()
            && self.peek().position.line == self.tokens[self.index - 1].position.line
    }

    fn starts_line(&self) -> bool {
        self.index == 0 || self.peek().position.line > self.tokens[self.index - 1].position.line
    }

    fn unclosed(&self) -> Option<ParseError> {
        let block = self.open_blocks.last()?;
        let token = self.peek();
        Some(ParseError {
            kind: SyntaxErrorKind::UnclosedBlock {
                construct: block.construct.to_string(),
                opened_at: block.opened_at,
            },
            position: token.position,
            found: token.describe(),
            expected: block.closers.to_string(),
        })
    }

    /// Error for the current token. Running out of input inside a block is
    /// always reported as that block being unclosed.
    fn unexpected(&self, expected: impl Into<String>) -> ParseError {
        if self.is_eof() {
            if let Some(e) = self.unclosed() {
                return e;
            }
        }
        let token = self.peek();
        ParseError {
            kind: SyntaxErrorKind::UnexpectedToken,
            position: token.position,
            found: token.describe(),
            expected: expected.into(),
        }
    }

    /// Skips to the next statement boundary: the first token that starts a
    /// line. Always moves past the token a failed statement started at.
    fn synchronize(&mut self, start: usize) {
        if self.index == start {
            self.bump();
        }
        while !self.is_eof() && !self.starts_line() {
            self.bump();
        }
    }

    fn recover(&mut self, start: usize, e: ParseError) -> PResult<()> {
        if e.is_fatal() {
            return Err(e);
        }
        debug!("recovering from: {e}");
        self.diagnostics.push(e);
        self.synchronize(start);
        Ok(())
    }

    fn within<T>(
        &mut self,
        construct: &'static str,
        opened_at: Position,
        closers: &'static str,
        f: impl FnOnce(&mut Self) -> PResult<T>,
    ) -> PResult<T> {
        self.open_blocks.push(OpenBlock {
            construct,
            opened_at,
            closers,
        });
        let result = f(self);
        self.open_blocks.pop();
        result
    }

    fn ensure_top_level(&self) -> PResult<()> {
        if self.open_blocks.is_empty() {
            return Ok(());
        }
        Err(self.unexpected(format!(
            "a statement (`{}` is only allowed at top level)",
            self.peek().lexeme.to_uppercase()
        )))
    }

    /// program = statement* EOF
    fn parse_program(&mut self) -> Vec<Statement> {
        let mut stmts = vec![];

        while !self.is_eof() {
            if let Err(e) = self.parse_recovering(&mut stmts) {
                self.diagnostics.push(e);
                break;
            }
        }

        stmts
    }

    fn parse_recovering(&mut self, stmts: &mut Vec<Statement>) -> PResult<()> {
        let start = self.index;
        match self.parse_statement() {
            Ok(s) => {
                stmts.push(s);
                Ok(())
            }
            Err(e) => self.recover(start, e),
        }
    }

    /// Statements up to (not including) the first token accepted by `stop`.
    fn parse_block_until(&mut self, stop: impl Fn(&Self) -> bool) -> PResult<Vec<Statement>> {
        let mut stmts = vec![];
        loop {
            if stop(self) {
                return Ok(stmts);
            }
            if let Some(e) = self.is_eof().then(|| self.unclosed()).flatten() {
                return Err(e);
            }
            self.parse_recovering(&mut stmts)?;
        }
    }

    /// Statements up to one of `closers`, which is consumed.
    fn parse_body(&mut self, closers: &[TokenKind]) -> PResult<Vec<Statement>> {
        let body = self.parse_block_until(|p| closers.contains(p.peek_kind()))?;
        self.bump();
        Ok(body)
    }

    /// stmt = main | function | procedure | record
    ///      | if | while | do_while | for | match
    ///      | print | input | call | return | declaration | assignment
    fn parse_statement(&mut self) -> PResult<Statement> {
        let position = self.peek().position;
        let kind = match self.peek_kind() {
            TokenKind::Inicio => self.parse_main()?,
            TokenKind::Funcion | TokenKind::Procedimiento => self.parse_callable()?,
            TokenKind::Registro | TokenKind::Tipo => self.parse_record()?,
            TokenKind::Si => self.parse_if()?,
            TokenKind::Mientras => self.parse_while()?,
            TokenKind::Hacer => self.parse_do_while()?,
            TokenKind::Desde => self.parse_for()?,
            TokenKind::Caso => self.parse_match()?,
            TokenKind::Escribir => self.parse_print()?,
            TokenKind::Leer => self.parse_input()?,
            TokenKind::Llamar => {
                self.bump();
                let name = self.expect_name("a procedure name")?;
                let args = if self.peek_kind() == &TokenKind::LeftParen {
                    self.parse_args()?
                } else {
                    vec![]
                };
                StmtKind::Call { name, args }
            }
            TokenKind::Retornar => {
                self.bump();
                let value = if self.continues_line() {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                StmtKind::Return(value)
            }
            kind if Self::is_name(kind) => self.parse_simple()?,
            _ => return Err(self.unexpected("a statement")),
        };

        Ok(Statement { kind, position })
    }

    /// main = "INICIO" statement* "FIN"
    fn parse_main(&mut self) -> PResult<StmtKind> {
        self.ensure_top_level()?;
        let start = self.bump();

        if let Some(first) = self.main_at {
            self.diagnostics.push(ParseError {
                kind: SyntaxErrorKind::DuplicateMain { first },
                position: start.position,
                found: start.describe(),
                expected: "a single `INICIO` block".to_string(),
            });
        } else {
            self.main_at = Some(start.position);
        }

        let body = self.within("INICIO", start.position, "`FIN`", |p| {
            p.parse_body(&[TokenKind::Fin])
        })?;
        Ok(StmtKind::MainBlock(body))
    }

    /// function  = "FUNCION" ident "(" params? ")" (":" type)? stmt* ("FIN_FUNCION" | "FIN")
    /// procedure = "PROCEDIMIENTO" ident "(" params? ")" stmt* ("FIN_PROCEDIMIENTO" | "FIN")
    fn parse_callable(&mut self) -> PResult<StmtKind> {
        self.ensure_top_level()?;
        let start = self.bump();
        let is_function = start.kind == TokenKind::Funcion;
        let (construct, closers_desc, closers) = if is_function {
            ("FUNCION", "`FIN_FUNCION` or `FIN`", FUNCTION_CLOSERS)
        } else {
            (
                "PROCEDIMIENTO",
                "`FIN_PROCEDIMIENTO` or `FIN`",
                PROCEDURE_CLOSERS,
            )
        };

        let callable = self.within(construct, start.position, closers_desc, |p| {
            let name = p.expect_name("a name")?;
            p.expect(&TokenKind::LeftParen, "`(`")?;
            let mut params = vec![];
            if !p.consume(&TokenKind::RightParen) {
                params.push(p.parse_param()?);
                while p.consume(&TokenKind::Comma) {
                    params.push(p.parse_param()?);
                }
                p.expect(&TokenKind::RightParen, "`,` or `)`")?;
            }
            let returns = if is_function && p.consume(&TokenKind::Colon) {
                Some(p.parse_type()?)
            } else {
                None
            };
            let body = p.parse_body(closers)?;

            Ok(Callable {
                name,
                params,
                returns,
                body,
            })
        })?;

        if is_function {
            Ok(StmtKind::FunctionDecl(callable))
        } else {
            Ok(StmtKind::ProcedureDecl(callable))
        }
    }

    /// param = mode? ident (":" type)?
    fn parse_param(&mut self) -> PResult<Param> {
        let mode = match self.peek_kind() {
            TokenKind::Ident(word) if Self::is_name(self.peek_at(1)) => ParamMode::from_word(word),
            _ => None,
        };
        if mode.is_some() {
            self.bump();
        }

        let name = self.expect_name("a parameter name")?;
        let ty = if self.consume(&TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };

        Ok(Param {
            name,
            mode: mode.unwrap_or(ParamMode::In),
            ty,
        })
    }

    /// record = ("REGISTRO" ident | "TIPO" ident "=" "REGISTRO")
    ///          (ident ("," ident)* ":" type)* ("FIN_REGISTRO" | "FIN_TIPO" | "FIN")
    fn parse_record(&mut self) -> PResult<StmtKind> {
        self.ensure_top_level()?;
        let start = self.bump();

        let record = self.within(
            "REGISTRO",
            start.position,
            "`FIN_REGISTRO` or `FIN`",
            |p| {
                let name = p.expect_name("a record name")?;
                if start.kind == TokenKind::Tipo {
                    p.expect(&TokenKind::Equal, "`=`")?;
                    p.expect(&TokenKind::Registro, "`REGISTRO`")?;
                }

                let mut fields = vec![];
                loop {
                    if RECORD_CLOSERS.contains(p.peek_kind()) {
                        p.bump();
                        break;
                    }
                    if p.is_eof() {
                        return Err(p.unexpected(""));
                    }
                    let field_start = p.index;
                    match p.parse_fields() {
                        Ok(fs) => fields.extend(fs),
                        Err(e) => p.recover(field_start, e)?,
                    }
                }

                Ok(RecordDecl { name, fields })
            },
        )?;

        Ok(StmtKind::RecordDecl(record))
    }

    fn parse_fields(&mut self) -> PResult<Vec<Field>> {
        let mut names = vec![self.expect_name("a field name")?];
        while self.consume(&TokenKind::Comma) {
            names.push(self.expect_name("a field name")?);
        }
        self.expect(&TokenKind::Colon, "`:`")?;
        let ty = self.parse_type()?;

        Ok(names
            .into_iter()
            .map(|name| Field {
                name,
                ty: ty.clone(),
            })
            .collect())
    }

    /// type = "ENTERO" | "REAL" | "CARACTER" | "CADENA" | "BOOLEANO" | ident
    fn parse_type(&mut self) -> PResult<Type> {
        let ty = match self.peek_kind() {
            TokenKind::IntegerType => Type::Integer,
            TokenKind::RealType => Type::Real,
            TokenKind::CharacterType => Type::Character,
            TokenKind::StringType => Type::String,
            TokenKind::BooleanType => Type::Boolean,
            TokenKind::Ident(name) => Type::Record(name.clone()),
            _ => return Err(self.unexpected("a type")),
        };
        self.bump();
        Ok(ty)
    }

    /// if = "SI" expr ("ENTONCES" | "HACER")? stmt* ("SI_NO" stmt*)? ("FIN_SI" | "FIN")
    fn parse_if(&mut self) -> PResult<StmtKind> {
        let start = self.bump();

        self.within("SI", start.position, "`FIN_SI` or `FIN`", |p| {
            let cond = p.parse_expr()?;
            if matches!(p.peek_kind(), TokenKind::Entonces | TokenKind::Hacer) && p.continues_line()
            {
                p.bump();
            }

            let then_branch = p.parse_block_until(|p| {
                matches!(
                    p.peek_kind(),
                    TokenKind::SiNo | TokenKind::FinSi | TokenKind::Fin
                )
            })?;
            let else_branch = if p.consume(&TokenKind::SiNo) {
                Some(p.parse_block_until(|p| {
                    matches!(p.peek_kind(), TokenKind::FinSi | TokenKind::Fin)
                })?)
            } else {
                None
            };
            p.bump();

            Ok(StmtKind::If {
                cond,
                then_branch,
                else_branch,
            })
        })
    }

    /// while = "MIENTRAS" expr "HACER"? stmt* ("FIN_MIENTRAS" | "FIN")
    fn parse_while(&mut self) -> PResult<StmtKind> {
        let start = self.bump();

        self.within(
            "MIENTRAS",
            start.position,
            "`FIN_MIENTRAS` or `FIN`",
            |p| {
                let cond = p.parse_expr()?;
                if p.peek_kind() == &TokenKind::Hacer && p.continues_line() {
                    p.bump();
                }
                let body = p.parse_body(WHILE_CLOSERS)?;
                Ok(StmtKind::While { cond, body })
            },
        )
    }

    /// do_while = "HACER" stmt* "MIENTRAS" expr
    ///
    /// A `MIENTRAS cond HACER` line inside the body opens a nested loop
    /// instead of closing this one.
    fn parse_do_while(&mut self) -> PResult<StmtKind> {
        let start = self.bump();

        self.within(
            "HACER",
            start.position,
            "`MIENTRAS` and a condition",
            |p| {
                let mut body = vec![];
                loop {
                    body.extend(p.parse_block_until(|p| p.peek_kind() == &TokenKind::Mientras)?);
                    let keyword = p.bump();
                    let cond = p.parse_expr()?;

                    if p.peek_kind() == &TokenKind::Hacer && p.continues_line() {
                        p.bump();
                        let inner = p.within(
                            "MIENTRAS",
                            keyword.position,
                            "`FIN_MIENTRAS` or `FIN`",
                            |p| p.parse_body(WHILE_CLOSERS),
                        )?;
                        body.push(Statement {
                            kind: StmtKind::While { cond, body: inner },
                            position: keyword.position,
                        });
                        continue;
                    }

                    return Ok(StmtKind::DoWhile { body, cond });
                }
            },
        )
    }

    /// for = "DESDE" ident "<-" expr "HASTA" expr ("PASO" expr)? "HACER"? stmt*
    ///       ("FIN_DESDE" | "FIN")
    fn parse_for(&mut self) -> PResult<StmtKind> {
        let start = self.bump();

        self.within("DESDE", start.position, "`FIN_DESDE` or `FIN`", |p| {
            let var = p.expect_name("a loop variable")?;
            p.expect(&TokenKind::Arrow, "`<-`")?;
            let from = p.parse_expr()?;
            p.expect(&TokenKind::Hasta, "`HASTA`")?;
            let to = p.parse_expr()?;
            let step = if p.consume(&TokenKind::Paso) {
                Some(p.parse_expr()?)
            } else {
                None
            };
            if p.peek_kind() == &TokenKind::Hacer && p.continues_line() {
                p.bump();
            }
            let body = p.parse_body(FOR_CLOSERS)?;

            Ok(StmtKind::For {
                var,
                start: from,
                end: to,
                step,
                body,
            })
        })
    }

    fn at_default_arm(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Otro | TokenKind::SiNo)
            && self.peek_at(1) == &TokenKind::Colon
    }

    fn at_case_label(&self) -> bool {
        match self.peek_kind() {
            TokenKind::Integer(_)
            | TokenKind::Real(_)
            | TokenKind::Str(_)
            | TokenKind::Char(_)
            | TokenKind::True
            | TokenKind::False => true,
            TokenKind::Minus => matches!(
                self.peek_at(1),
                TokenKind::Integer(_) | TokenKind::Real(_)
            ),
            _ => false,
        }
    }

    fn at_arm_boundary(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::FinCaso | TokenKind::Fin)
            || self.at_case_label()
            || self.at_default_arm()
    }

    /// match   = "CASO" expr "SEA" arm* default? ("FIN_CASO" | "FIN")
    /// arm     = literal ("," literal)* ":" stmt*
    /// default = ("OTRO" | "SI_NO") ":" stmt*
    fn parse_match(&mut self) -> PResult<StmtKind> {
        let start = self.bump();

        self.within("CASO", start.position, "`FIN_CASO` or `FIN`", |p| {
            let subject = p.parse_expr()?;
            p.expect(&TokenKind::Sea, "`SEA`")?;

            let mut arms = vec![];
            let mut default = None;
            loop {
                if matches!(p.peek_kind(), TokenKind::FinCaso | TokenKind::Fin) {
                    p.bump();
                    break;
                }
                if p.is_eof() {
                    return Err(p.unexpected(""));
                }

                let arm_start = p.index;
                if p.at_default_arm() {
                    if default.is_some() {
                        let e = p.unexpected("a single default arm");
                        p.recover(arm_start, e)?;
                        continue;
                    }
                    p.bump();
                    p.bump();
                    default = Some(p.parse_block_until(Self::at_arm_boundary)?);
                } else if p.at_case_label() {
                    match p.parse_arm() {
                        Ok(arm) => arms.push(arm),
                        Err(e) => p.recover(arm_start, e)?,
                    }
                } else {
                    let e = p.unexpected("a case label, `OTRO:` or `FIN_CASO`");
                    p.recover(arm_start, e)?;
                }
            }

            Ok(StmtKind::Match {
                subject,
                arms,
                default,
            })
        })
    }

    fn parse_arm(&mut self) -> PResult<MatchArm> {
        let mut labels = vec![self.parse_label()?];
        while self.consume(&TokenKind::Comma) {
            labels.push(self.parse_label()?);
        }
        self.expect(&TokenKind::Colon, "`:`")?;
        let body = self.parse_block_until(Self::at_arm_boundary)?;

        Ok(MatchArm { labels, body })
    }

    fn parse_label(&mut self) -> PResult<Literal> {
        let negative = self.consume(&TokenKind::Minus);
        let literal = match (self.peek_kind(), negative) {
            (TokenKind::Integer(n), _) => Literal::Integer(if negative { -n } else { *n }),
            (TokenKind::Real(n), _) => Literal::Real(if negative { -n } else { *n }),
            (kind, false) => match Self::literal(kind) {
                Some(literal) => literal,
                None => return Err(self.unexpected("a literal case label")),
            },
            (_, true) => return Err(self.unexpected("a number")),
        };
        self.bump();
        Ok(literal)
    }

    fn literal(kind: &TokenKind) -> Option<Literal> {
        match kind {
            TokenKind::Integer(n) => Some(Literal::Integer(*n)),
            TokenKind::Real(n) => Some(Literal::Real(*n)),
            TokenKind::Str(s) => Some(Literal::String(s.clone())),
            TokenKind::Char(c) => Some(Literal::Character(*c)),
            TokenKind::True => Some(Literal::Boolean(true)),
            TokenKind::False => Some(Literal::Boolean(false)),
            _ => None,
        }
    }

    /// print = "ESCRIBIR" ( "(" expr ("," expr)* ")" | expr ("," expr)* )?
    fn parse_print(&mut self) -> PResult<StmtKind> {
        self.bump();
        if !self.continues_line() {
            return Ok(StmtKind::Print(vec![]));
        }

        if self.peek_kind() != &TokenKind::LeftParen {
            return Ok(StmtKind::Print(self.parse_expr_list()?));
        }

        let mut args = self.parse_args()?;
        // `ESCRIBIR (a + b) * 2`, `ESCRIBIR (p).x` or `ESCRIBIR (x), 2`: the
        // parentheses only grouped the first argument
        let continues = matches!(self.peek_kind(), TokenKind::Dot | TokenKind::Comma)
            && self.continues_line();
        if args.len() == 1 && (continues || self.binop_here().is_some()) {
            let first = self.parse_field_access(args.remove(0))?;
            args.push(self.parse_binary_rhs(first, 0)?);
            while self.consume(&TokenKind::Comma) {
                args.push(self.parse_expr()?);
            }
        }
        Ok(StmtKind::Print(args))
    }

    /// input = "LEER" ( "(" place ("," place)* ")" | place ("," place)* )
    fn parse_input(&mut self) -> PResult<StmtKind> {
        self.bump();
        let parenthesized = self.consume(&TokenKind::LeftParen);

        let mut places = vec![self.parse_place()?];
        while self.consume(&TokenKind::Comma) {
            places.push(self.parse_place()?);
        }
        if parenthesized {
            self.expect(&TokenKind::RightParen, "`,` or `)`")?;
        }

        Ok(StmtKind::Input(places))
    }

    /// place = ident ("." ident)*
    fn parse_place(&mut self) -> PResult<Place> {
        let root = self.expect_name("a variable")?;
        let mut fields = vec![];
        while self.consume(&TokenKind::Dot) {
            fields.push(self.expect_name("a field name")?);
        }
        Ok(Place { root, fields })
    }

    /// call        = ident "(" args? ")"
    /// declaration = ident ("," ident)* ":" type
    /// assignment  = place "<-" expr
    fn parse_simple(&mut self) -> PResult<StmtKind> {
        match self.peek_at(1) {
            TokenKind::LeftParen => {
                let name = self.bump().lexeme;
                let args = self.parse_args()?;
                Ok(StmtKind::Call { name, args })
            }
            TokenKind::Comma | TokenKind::Colon => {
                let mut names = vec![self.bump().lexeme];
                while self.consume(&TokenKind::Comma) {
                    names.push(self.expect_name("a variable name")?);
                }
                self.expect(&TokenKind::Colon, "`:`")?;
                let ty = self.parse_type()?;
                Ok(StmtKind::Declaration { names, ty })
            }
            _ => {
                let target = self.parse_place()?;
                self.expect(&TokenKind::Arrow, "`<-`")?;
                let value = self.parse_expr()?;
                Ok(StmtKind::Assignment { target, value })
            }
        }
    }

    /// args = "(" (expr ("," expr)*)? ")"
    fn parse_args(&mut self) -> PResult<Vec<Expr>> {
        self.expect(&TokenKind::LeftParen, "`(`")?;
        if self.consume(&TokenKind::RightParen) {
            return Ok(vec![]);
        }
        let args = self.parse_expr_list()?;
        self.expect(&TokenKind::RightParen, "`,` or `)`")?;
        Ok(args)
    }

    fn parse_expr_list(&mut self) -> PResult<Vec<Expr>> {
        let mut exprs = vec![self.parse_expr()?];
        while self.consume(&TokenKind::Comma) {
            exprs.push(self.parse_expr()?);
        }
        Ok(exprs)
    }

    /// Binary operator at the current token. Operators only continue an
    /// expression from the same line, so a statement ends with its line.
    fn binop_here(&self) -> Option<BinOpKind> {
        if !self.continues_line() {
            return None;
        }
        let op = match self.peek_kind() {
            TokenKind::Or => BinOpKind::Or,
            TokenKind::And => BinOpKind::And,
            TokenKind::Equal => BinOpKind::Equal,
            TokenKind::NotEqual => BinOpKind::NotEqual,
            TokenKind::LessThan => BinOpKind::LessThan,
            TokenKind::GreaterThan => BinOpKind::GreaterThan,
            TokenKind::LessEqual => BinOpKind::LessEqual,
            TokenKind::GreaterEqual => BinOpKind::GreaterEqual,
            TokenKind::Plus => BinOpKind::Add,
            TokenKind::Minus => BinOpKind::Sub,
            TokenKind::Star => BinOpKind::Mul,
            TokenKind::Slash => BinOpKind::Div,
            TokenKind::Mod => BinOpKind::Mod,
            _ => return None,
        };
        Some(op)
    }

    /// expr = unary (binop unary)*, by precedence climbing:
    ///   "O" < "Y" < "NO" < "= <> < > <= >=" < "+ -" < "* / MOD" < unary "-"
    fn parse_expr(&mut self) -> PResult<Expr> {
        let lhs = self.parse_unary()?;
        self.parse_binary_rhs(lhs, 0)
    }

    fn parse_binary_rhs(&mut self, mut lhs: Expr, min_prec: u8) -> PResult<Expr> {
        while let Some(op) = self.binop_here() {
            let prec = op.precedence();
            if prec < min_prec {
                break;
            }
            self.bump();

            let mut rhs = self.parse_unary()?;
            while let Some(next) = self.binop_here() {
                if next.precedence() <= prec {
                    break;
                }
                rhs = self.parse_binary_rhs(rhs, prec + 1)?;
            }
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    /// unary = "-" unary
    ///       | "NO" comparison
    ///       | postfix
    fn parse_unary(&mut self) -> PResult<Expr> {
        if self.consume(&TokenKind::Minus) {
            let operand = self.parse_unary()?;
            Ok(Expr::Unary(UnaryOpKind::Neg, Box::new(operand)))
        } else if self.consume(&TokenKind::Not) {
            let operand = self.parse_unary()?;
            let operand = self.parse_binary_rhs(operand, UnaryOpKind::Not.precedence() + 1)?;
            Ok(Expr::Unary(UnaryOpKind::Not, Box::new(operand)))
        } else {
            self.parse_postfix()
        }
    }

    /// postfix = primary ("." ident)*
    fn parse_postfix(&mut self) -> PResult<Expr> {
        let primary = self.parse_primary()?;
        self.parse_field_access(primary)
    }

    fn parse_field_access(&mut self, mut expr: Expr) -> PResult<Expr> {
        while self.peek_kind() == &TokenKind::Dot && self.continues_line() {
            self.bump();
            let field = self.expect_name("a field name")?;
            expr = Expr::Field(Box::new(expr), field);
        }
        Ok(expr)
    }

    /// primary = literal
    ///         | ident ("(" args? ")")?
    ///         | "(" expr ")"
    fn parse_primary(&mut self) -> PResult<Expr> {
        if let Some(literal) = Self::literal(self.peek_kind()) {
            self.bump();
            return Ok(Expr::Literal(literal));
        }

        match self.peek_kind() {
            TokenKind::LeftParen => {
                self.bump();
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::RightParen, "`)`")?;
                Ok(expr)
            }
            kind if Self::is_name(kind) => {
                let name = self.bump().lexeme;
                if self.peek_kind() == &TokenKind::LeftParen && self.continues_line() {
                    let args = self.parse_args()?;
                    Ok(Expr::Call(name, args))
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            _ => Err(self.unexpected("an expression")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(input: &str) -> ProgramTree {
        Parser::new(Lexer::tokenize(input)).parse()
    }

    fn parse_ok(input: &str) -> Vec<Statement> {
        let tree = parse(input);
        assert!(tree.diagnostics.is_empty(), "{:?}", tree.diagnostics);
        tree.statements
    }

    fn main_body(input: &str) -> Vec<Statement> {
        let mut stmts = parse_ok(input);
        let StmtKind::MainBlock(body) = stmts.remove(0).kind else {
            panic!("expected a main block");
        };
        body
    }

    fn var(name: &str) -> Box<Expr> {
        Box::new(Expr::Variable(name.to_string()))
    }

    fn int(n: i64) -> Box<Expr> {
        Box::new(Expr::Literal(Literal::Integer(n)))
    }

    #[test]
    fn assignment_respects_precedence() {
        let body = main_body("INICIO\n x <- a + b * c\nFIN");
        let StmtKind::Assignment { target, value } = &body[0].kind else {
            panic!();
        };
        assert_eq!(target, &Place::var("x"));
        assert_eq!(
            value,
            &Expr::Binary(
                BinOpKind::Add,
                var("a"),
                Box::new(Expr::Binary(BinOpKind::Mul, var("b"), var("c")))
            )
        );
    }

    #[test]
    fn subtraction_is_left_associative() {
        let body = main_body("INICIO\n x <- 10 - 4 - 3\nFIN");
        let StmtKind::Assignment { value, .. } = &body[0].kind else {
            panic!();
        };
        assert_eq!(
            value,
            &Expr::Binary(
                BinOpKind::Sub,
                Box::new(Expr::Binary(BinOpKind::Sub, int(10), int(4))),
                int(3)
            )
        );
    }

    #[test]
    fn logical_operators_bind_loosest() {
        let body = main_body("INICIO\n b <- NO x < 1 Y y MOD 2 = 0\nFIN");
        let StmtKind::Assignment { value, .. } = &body[0].kind else {
            panic!();
        };
        let Expr::Binary(BinOpKind::And, lhs, rhs) = value else {
            panic!("{value:?}");
        };
        assert_eq!(
            **lhs,
            Expr::Unary(
                UnaryOpKind::Not,
                Box::new(Expr::Binary(BinOpKind::LessThan, var("x"), int(1)))
            )
        );
        assert_eq!(
            **rhs,
            Expr::Binary(
                BinOpKind::Equal,
                Box::new(Expr::Binary(BinOpKind::Mod, var("y"), int(2))),
                int(0)
            )
        );
    }

    #[test]
    fn statements_end_with_their_line() {
        let body = main_body("INICIO\n x <- 1\n y <- 2\nFIN");
        assert_eq!(body.len(), 2);
        let StmtKind::Assignment { target, .. } = &body[1].kind else {
            panic!();
        };
        assert_eq!(target.root, "y");
    }

    #[test]
    fn if_with_else() {
        let body = main_body(
            "INICIO
  SI x > 0 ENTONCES
    ESCRIBIR \"positivo\"
  SI_NO
    ESCRIBIR \"no positivo\"
  FIN_SI
FIN",
        );
        let StmtKind::If {
            then_branch,
            else_branch: Some(else_branch),
            ..
        } = &body[0].kind
        else {
            panic!();
        };
        assert_eq!(then_branch.len(), 1);
        assert_eq!(else_branch.len(), 1);
    }

    #[test]
    fn nested_blocks_close_innermost_first() {
        let body = main_body(
            "INICIO
  DESDE i <- 1 HASTA 3
    DESDE j <- 1 HASTA 2 HACER
      ESCRIBIR i, j
    FIN
  FIN_DESDE
FIN",
        );
        let StmtKind::For { var, body: outer, .. } = &body[0].kind else {
            panic!();
        };
        assert_eq!(var, "i");
        let StmtKind::For { var, body: inner, step, .. } = &outer[0].kind else {
            panic!();
        };
        assert_eq!(var, "j");
        assert_eq!(step, &None);
        assert!(matches!(&inner[0].kind, StmtKind::Print(args) if args.len() == 2));
    }

    #[test]
    fn do_while_with_nested_while() {
        let body = main_body(
            "INICIO
  HACER
    MIENTRAS j < 3 HACER
      j <- j + 1
    FIN_MIENTRAS
    i <- i + 1
  MIENTRAS i < 10
  ESCRIBIR i
FIN",
        );
        assert_eq!(body.len(), 2);
        let StmtKind::DoWhile { body: inner, cond } = &body[0].kind else {
            panic!();
        };
        assert!(matches!(inner[0].kind, StmtKind::While { .. }));
        assert!(matches!(inner[1].kind, StmtKind::Assignment { .. }));
        assert_eq!(cond, &Expr::Binary(BinOpKind::LessThan, var("i"), int(10)));
    }

    #[test]
    fn match_arms_and_default() {
        let body = main_body(
            "INICIO
  CASO x SEA
    1, 2: ESCRIBIR \"bajo\"
    -1:
      ESCRIBIR \"negativo\"
    OTRO:
      ESCRIBIR \"otro\"
  FIN_CASO
FIN",
        );
        let StmtKind::Match { arms, default, .. } = &body[0].kind else {
            panic!();
        };
        assert_eq!(arms.len(), 2);
        assert_eq!(
            arms[0].labels,
            vec![Literal::Integer(1), Literal::Integer(2)]
        );
        assert_eq!(arms[1].labels, vec![Literal::Integer(-1)]);
        assert_eq!(default.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn callable_signatures() {
        let stmts = parse_ok(
            "FUNCION doble(n: ENTERO): ENTERO
  RETORNAR n * 2
FIN_FUNCION
PROCEDIMIENTO intercambiar(ES a: ENTERO, REF b, c)
  t <- a
FIN",
        );
        let StmtKind::FunctionDecl(f) = &stmts[0].kind else {
            panic!();
        };
        assert_eq!(f.returns, Some(Type::Integer));
        assert_eq!(f.params[0].mode, ParamMode::In);
        let StmtKind::ProcedureDecl(p) = &stmts[1].kind else {
            panic!();
        };
        let modes: Vec<_> = p.params.iter().map(|p| p.mode).collect();
        assert_eq!(modes, vec![ParamMode::InOut, ParamMode::InOut, ParamMode::In]);
        assert_eq!(p.params[2].name, "c");
    }

    #[test]
    fn record_fields_keep_declaration_order() {
        let stmts = parse_ok(
            "TIPO Punto = REGISTRO
  x, y: REAL
  nombre: CADENA
FIN_REGISTRO",
        );
        let StmtKind::RecordDecl(record) = &stmts[0].kind else {
            panic!();
        };
        let names: Vec<_> = record.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["x", "y", "nombre"]);
        assert_eq!(record.fields[2].ty, Type::String);
    }

    #[test]
    fn unclosed_for_is_reported() {
        let tree = parse("INICIO\nDESDE I <- 1 HASTA 3\n ESCRIBIR I\n");
        assert_eq!(tree.diagnostics.len(), 1);
        let e = &tree.diagnostics[0];
        let SyntaxErrorKind::UnclosedBlock {
            construct,
            opened_at,
        } = &e.kind
        else {
            panic!("{e:?}");
        };
        assert_eq!(construct, "DESDE");
        assert_eq!(*opened_at, Position::new(2, 1));
        assert_eq!(e.found, "end of input");
    }

    #[test]
    fn truncated_header_counts_as_unclosed() {
        let tree = parse("MIENTRAS x <");
        assert!(matches!(
            tree.diagnostics[0].kind,
            SyntaxErrorKind::UnclosedBlock { ref construct, .. } if construct == "MIENTRAS"
        ));
    }

    #[test]
    fn recovers_to_report_several_errors() {
        let tree = parse(
            "INICIO
  x <- * 2
  ESCRIBIR x
  y <- )
FIN",
        );
        assert_eq!(tree.diagnostics.len(), 2);
        assert_eq!(tree.diagnostics[0].position, Position::new(2, 8));
        assert_eq!(tree.diagnostics[1].position, Position::new(4, 8));
        let StmtKind::MainBlock(body) = &tree.statements[0].kind else {
            panic!();
        };
        assert_eq!(body.len(), 1);
    }

    #[test]
    fn second_main_block_is_an_error() {
        let tree = parse("INICIO\nFIN\nINICIO\nFIN");
        assert_eq!(tree.diagnostics.len(), 1);
        assert_eq!(
            tree.diagnostics[0].kind,
            SyntaxErrorKind::DuplicateMain {
                first: Position::new(1, 1)
            }
        );
    }

    #[test]
    fn functions_are_top_level_only() {
        let tree = parse("INICIO\n FUNCION f()\n FIN\nFIN");
        assert!(!tree.diagnostics.is_empty());
        assert!(tree.diagnostics[0].expected.contains("top level"));
    }

    #[test]
    fn y_is_also_a_name() {
        let body = main_body("INICIO\n y <- p.y + 1\nFIN");
        let StmtKind::Assignment { target, value } = &body[0].kind else {
            panic!();
        };
        assert_eq!(target.root, "y");
        assert_eq!(
            value,
            &Expr::Binary(
                BinOpKind::Add,
                Box::new(Expr::Field(var("p"), "y".to_string())),
                int(1)
            )
        );
    }

    #[test]
    fn print_with_grouping_parentheses() {
        let body = main_body("INICIO\n ESCRIBIR (1 + 2) * 3, \"fin\"\nFIN");
        let StmtKind::Print(args) = &body[0].kind else {
            panic!();
        };
        assert_eq!(args.len(), 2);
        assert!(matches!(args[0], Expr::Binary(BinOpKind::Mul, _, _)));
    }

    #[test]
    fn print_list_after_a_parenthesized_first_argument() {
        let body = main_body("INICIO\n x <- 1\n ESCRIBIR (x), 2\n ESCRIBIR (p).y, x\nFIN");
        let StmtKind::Print(args) = &body[1].kind else {
            panic!();
        };
        assert_eq!(args, &vec![*var("x"), *int(2)]);

        let StmtKind::Print(args) = &body[2].kind else {
            panic!();
        };
        assert_eq!(args, &vec![Expr::Field(var("p"), "y".to_string()), *var("x")]);
    }
}
