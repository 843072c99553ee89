use std::sync::Arc;

use crate::error::{Error, ErrorCode};
use crate::runtime::value::format_number;
use crate::syntax::cst::*;
use crate::syntax::lexer::{alternatives, Lexer, Transactional};
use crate::syntax::token::{Token, TokenKind};

/// Deepest nesting of statements and expressions the parser accepts.
pub const MAX_NESTING: usize = 64;

pub struct Parser {
    lexer: Lexer,
    loop_depth: usize,
    depth: usize,
}

impl Transactional for Parser {
    fn lexer(&mut self) -> &mut Lexer {
        &mut self.lexer
    }
}

/// The part of a `for` statement between the parentheses.
enum ForHead {
    Of { binding: Identifier, iterable: Expression },
    Classic { init: Option<Expression>, test: Option<Expression>, update: Option<Expression> },
}

type Parse<T> = fn(&mut Parser) -> Result<T, Error>;

impl Parser {
    pub fn new(source: &str) -> Self {
        let mut lexer = Lexer::new();
        lexer.set_input(source);
        Self { lexer, loop_depth: 0, depth: 0 }
    }

    /// Parse the whole input. Stops at the first error.
    pub fn parse(mut self) -> Result<Program, Error> {
        let mut body = Vec::new();
        while !self.at_end()? {
            body.push(self.parse_statement()?);
        }
        Ok(Program { body })
    }

    // ─── Statements ──────────────────────────────────────────────────────────

    fn parse_statement(&mut self) -> Result<Statement, Error> {
        self.nested(Self::parse_statement_at)
    }

    fn parse_statement_at(&mut self) -> Result<Statement, Error> {
        let tok = self.current()?;
        let span = Span::new(tok.line, tok.column);

        match tok.kind {
            TokenKind::LBrace => {
                let body = self.parse_block()?;
                Ok(Statement::Block { body, span })
            }
            TokenKind::Func if matches!(self.peek_kind(1)?, Some(TokenKind::Ident(_))) => {
                self.advance()?;
                let func = self.parse_function_rest(span)?;
                Ok(Statement::Function(Arc::new(func)))
            }
            TokenKind::If => self.parse_if(span),
            TokenKind::While => self.parse_while(span),
            TokenKind::For => self.parse_for(span),
            TokenKind::Return => {
                self.advance()?;
                let argument = if self.ends_statement()? { None } else { Some(self.parse_expression()?) };
                self.terminate()?;
                Ok(Statement::Return { argument, span })
            }
            TokenKind::Reply => {
                self.advance()?;
                let argument = if self.ends_statement()? { None } else { Some(self.parse_expression()?) };
                self.terminate()?;
                Ok(Statement::Reply { argument, span })
            }
            TokenKind::Sleep => {
                self.advance()?;
                let argument = self.parse_expression()?;
                self.terminate()?;
                Ok(Statement::Sleep { argument, span })
            }
            TokenKind::Break | TokenKind::Continue => {
                self.advance()?;
                if self.loop_depth == 0 {
                    return Err(Error::new(ErrorCode::P004, span.line, span.column, format!(
                        "`{}` is only allowed inside a loop", tok.text
                    ))
                    .spanning(tok.width()));
                }
                self.terminate()?;
                Ok(if tok.kind == TokenKind::Break { Statement::Break { span } } else { Statement::Continue { span } })
            }
            TokenKind::Semicolon => {
                self.advance()?;
                Ok(Statement::Empty { span })
            }
            _ => {
                let expression = self.parse_expression()?;
                self.terminate()?;
                Ok(Statement::Expression { expression, span })
            }
        }
    }

    fn parse_block(&mut self) -> Result<Vec<Statement>, Error> {
        self.expect(&TokenKind::LBrace)?;
        let mut body = Vec::new();
        while !self.check(&TokenKind::RBrace)? {
            if self.at_end()? {
                return Err(self.unexpected("`}`")?);
            }
            body.push(self.parse_statement()?);
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(body)
    }

    fn parse_if(&mut self, span: Span) -> Result<Statement, Error> {
        self.advance()?;
        let test = self.parse_condition()?;
        let consequent = Box::new(self.parse_statement()?);
        let alternate = if self.matches(&TokenKind::Else)? { Some(Box::new(self.parse_statement()?)) } else { None };
        Ok(Statement::If { test, consequent, alternate, span })
    }

    fn parse_while(&mut self, span: Span) -> Result<Statement, Error> {
        self.advance()?;
        let test = self.parse_condition()?;
        let body = self.parse_loop_body()?;
        Ok(Statement::While { test, body, span })
    }

    fn parse_for(&mut self, span: Span) -> Result<Statement, Error> {
        self.advance()?;
        self.expect(&TokenKind::LParen)?;
        let head = alternatives(self, &[Self::parse_for_of_head as Parse<ForHead>, Self::parse_classic_head])?;
        self.expect(&TokenKind::RParen)?;
        let body = self.parse_loop_body()?;

        Ok(match head {
            ForHead::Of { binding, iterable } => Statement::ForOf { binding, iterable, body, span },
            ForHead::Classic { init, test, update } => Statement::For { init, test, update, body, span },
        })
    }

    /// `x of expr`
    fn parse_for_of_head(&mut self) -> Result<ForHead, Error> {
        let tok = self.expect(&TokenKind::Ident(String::new()))?;
        let binding = Identifier { name: tok.text.clone(), declares: false, span: Span::new(tok.line, tok.column) };
        self.expect(&TokenKind::Of)?;
        let iterable = self.parse_expression()?;
        Ok(ForHead::Of { binding, iterable })
    }

    /// `init; test; update`. Every part is optional; no terminator insertion here.
    fn parse_classic_head(&mut self) -> Result<ForHead, Error> {
        let init = self.optional_expression(&TokenKind::Semicolon)?;
        self.expect(&TokenKind::Semicolon)?;
        let test = self.optional_expression(&TokenKind::Semicolon)?;
        self.expect(&TokenKind::Semicolon)?;
        let update = self.optional_expression(&TokenKind::RParen)?;
        Ok(ForHead::Classic { init, test, update })
    }

    fn parse_condition(&mut self) -> Result<Expression, Error> {
        self.expect(&TokenKind::LParen)?;
        let test = self.parse_expression()?;
        self.expect(&TokenKind::RParen)?;
        Ok(test)
    }

    fn parse_loop_body(&mut self) -> Result<Box<Statement>, Error> {
        self.loop_depth += 1;
        let body = self.parse_statement();
        self.loop_depth -= 1;
        Ok(Box::new(body?))
    }

    /// After `func`: optional name, parameter list, body.
    fn parse_function_rest(&mut self, span: Span) -> Result<FunctionLiteral, Error> {
        let name = match self.peek_kind(0)? {
            Some(TokenKind::Ident(name)) => {
                self.advance()?;
                Some(name)
            }
            _ => None,
        };
        self.expect(&TokenKind::LParen)?;
        let params = self.separated(&TokenKind::RParen, Self::parse_param)?;

        let outer_loops = std::mem::replace(&mut self.loop_depth, 0);
        let body = self.parse_block();
        self.loop_depth = outer_loops;

        Ok(FunctionLiteral { name, params, body: body?, span })
    }

    fn parse_param(&mut self) -> Result<String, Error> {
        Ok(self.expect(&TokenKind::Ident(String::new()))?.text)
    }

    // ─── Statement termination ───────────────────────────────────────────────

    /// Require a `;`, or insert one before a line break, a `}` or the end of input.
    fn terminate(&mut self) -> Result<(), Error> {
        match self.lexer.peek(0)?.cloned() {
            None => Ok(()),
            Some(tok) if tok.kind == TokenKind::Semicolon => self.lexer.skip(1),
            Some(tok) if tok.kind == TokenKind::RBrace || tok.newline_before => Ok(()),
            Some(tok) => Err(Error::new(ErrorCode::P002, tok.line, tok.column, format!(
                "expected `;` or a line break before {}", tok.kind.describe()
            ))
            .spanning(tok.width())),
        }
    }

    /// `return` / `reply` with nothing after them on the same line.
    fn ends_statement(&mut self) -> Result<bool, Error> {
        Ok(match self.lexer.peek(0)? {
            None => true,
            Some(tok) => tok.newline_before || matches!(tok.kind, TokenKind::Semicolon | TokenKind::RBrace),
        })
    }

    // ─── Expressions (precedence climbing) ───────────────────────────────────

    pub fn parse_expression(&mut self) -> Result<Expression, Error> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expression, Error> {
        self.nested(Self::parse_assignment_at)
    }

    fn parse_assignment_at(&mut self) -> Result<Expression, Error> {
        let target = self.parse_conditional()?;
        let op = match self.peek_kind(0)? {
            Some(TokenKind::Eq)        => AssignOp::Assign,
            Some(TokenKind::PlusEq)    => AssignOp::Add,
            Some(TokenKind::MinusEq)   => AssignOp::Sub,
            Some(TokenKind::StarEq)    => AssignOp::Mul,
            Some(TokenKind::SlashEq)   => AssignOp::Div,
            Some(TokenKind::PercentEq) => AssignOp::Rem,
            _ => return Ok(target),
        };
        if !target.is_assignable() {
            return Err(invalid_target(&target));
        }
        self.advance()?;
        let value = self.parse_assignment()?;
        let span = target.span();
        Ok(Expression::Assignment { op, target: Box::new(target), value: Box::new(value), span })
    }

    /// `test then a else b`
    fn parse_conditional(&mut self) -> Result<Expression, Error> {
        let test = self.parse_or()?;
        if !self.matches(&TokenKind::Then)? {
            return Ok(test);
        }
        let consequent = self.nested(Self::parse_conditional)?;
        self.expect(&TokenKind::Else)?;
        let alternate = self.nested(Self::parse_conditional)?;
        let span = test.span();
        Ok(Expression::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
            span,
        })
    }

    fn parse_or(&mut self) -> Result<Expression, Error> {
        self.logical_level(Self::parse_and, &TokenKind::Or, LogicalOp::Or)
    }

    fn parse_and(&mut self) -> Result<Expression, Error> {
        self.logical_level(Self::parse_equality, &TokenKind::And, LogicalOp::And)
    }

    fn parse_equality(&mut self) -> Result<Expression, Error> {
        self.binary_level(Self::parse_relational, |k| match k {
            TokenKind::EqEq   => Some(BinaryOp::Eq),
            TokenKind::BangEq => Some(BinaryOp::Ne),
            _ => None,
        })
    }

    fn parse_relational(&mut self) -> Result<Expression, Error> {
        self.binary_level(Self::parse_additive, |k| match k {
            TokenKind::Lt   => Some(BinaryOp::Lt),
            TokenKind::LtEq => Some(BinaryOp::Le),
            TokenKind::Gt   => Some(BinaryOp::Gt),
            TokenKind::GtEq => Some(BinaryOp::Ge),
            _ => None,
        })
    }

    fn parse_additive(&mut self) -> Result<Expression, Error> {
        self.binary_level(Self::parse_multiplicative, |k| match k {
            TokenKind::Plus  => Some(BinaryOp::Add),
            TokenKind::Minus => Some(BinaryOp::Sub),
            _ => None,
        })
    }

    fn parse_multiplicative(&mut self) -> Result<Expression, Error> {
        self.binary_level(Self::parse_unary, |k| match k {
            TokenKind::Star    => Some(BinaryOp::Mul),
            TokenKind::Slash   => Some(BinaryOp::Div),
            TokenKind::Percent => Some(BinaryOp::Rem),
            TokenKind::Caret   => Some(BinaryOp::Pow),
            _ => None,
        })
    }

    fn parse_unary(&mut self) -> Result<Expression, Error> {
        let op = match self.peek_kind(0)? {
            Some(TokenKind::Minus) => UnaryOp::Neg,
            Some(TokenKind::Plus)  => UnaryOp::Plus,
            Some(TokenKind::Bang)  => UnaryOp::Not,
            _ => return self.parse_postfix(),
        };
        let span = self.span()?;
        self.advance()?;
        let argument = self.nested(Self::parse_unary)?;
        Ok(Expression::Unary { op, argument: Box::new(argument), span })
    }

    /// `x++` / `x--`, only when no line break separates the operator.
    fn parse_postfix(&mut self) -> Result<Expression, Error> {
        let expr = self.parse_member_chain()?;
        let Some(tok) = self.lexer.peek(0)?.cloned() else { return Ok(expr) };
        let op = match tok.kind {
            TokenKind::PlusPlus   => UpdateOp::Increment,
            TokenKind::MinusMinus => UpdateOp::Decrement,
            _ => return Ok(expr),
        };
        if tok.newline_before {
            return Ok(expr);
        }
        if !expr.is_assignable() {
            return Err(invalid_target(&expr));
        }
        self.advance()?;
        let span = expr.span();
        Ok(Expression::Update { op, target: Box::new(expr), span })
    }

    /// `[expr]`, `.name` and `(args)` in any order and count.
    fn parse_member_chain(&mut self) -> Result<Expression, Error> {
        let mut expr = self.parse_primary()?;

        loop {
            match self.peek_kind(0)? {
                Some(TokenKind::LBracket) => {
                    let span = expr.span();
                    self.advance()?;
                    let index = self.parse_expression()?;
                    self.expect(&TokenKind::RBracket)?;
                    expr = Expression::Index { object: Box::new(expr), index: Box::new(index), span };
                }
                Some(TokenKind::Dot) => {
                    let span = expr.span();
                    self.advance()?;
                    let name = self.expect(&TokenKind::Ident(String::new()))?.text;
                    expr = Expression::Property { object: Box::new(expr), name, span };
                }
                Some(TokenKind::LParen) => {
                    let span = expr.span();
                    self.advance()?;
                    let arguments = self.separated(&TokenKind::RParen, Self::parse_expression)?;
                    expr = Expression::Call { callee: Box::new(expr), arguments, span };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expression, Error> {
        let tok = self.advance()?;
        let span = Span::new(tok.line, tok.column);

        match tok.kind {
            TokenKind::Number(value) => Ok(Expression::Number { value, span }),
            TokenKind::Str(value)    => Ok(Expression::String { value, span }),
            TokenKind::True          => Ok(Expression::Boolean { value: true, span }),
            TokenKind::False         => Ok(Expression::Boolean { value: false, span }),
            TokenKind::Null          => Ok(Expression::Null { span }),

            TokenKind::Ident(name) => {
                let declares = self.check(&TokenKind::Eq)?;
                Ok(Expression::Identifier(Identifier { name, declares, span }))
            }

            TokenKind::LParen => {
                let expr = self.parse_expression()?;
                self.expect(&TokenKind::RParen)?;
                Ok(expr)
            }

            TokenKind::LBracket => {
                let elements = self.separated(&TokenKind::RBracket, Self::parse_expression)?;
                Ok(Expression::Array { elements, span })
            }

            TokenKind::LBrace => {
                let properties = self.separated(&TokenKind::RBrace, Self::parse_property)?;
                Ok(Expression::Object { properties, span })
            }

            TokenKind::Func => {
                let func = self.parse_function_rest(span)?;
                Ok(Expression::Function(Arc::new(func)))
            }

            _ => Err(unexpected_token(&tok, "an expression")),
        }
    }

    /// `key: value` where key is a name, keyword, string or number.
    fn parse_property(&mut self) -> Result<ObjectProperty, Error> {
        let tok = self.advance()?;
        let key = match &tok.kind {
            TokenKind::Ident(s) | TokenKind::Str(s) => s.clone(),
            TokenKind::Number(n) => format_number(*n),
            kind if kind.is_keyword() => tok.text.clone(),
            _ => return Err(unexpected_token(&tok, "a property name")),
        };
        self.expect(&TokenKind::Colon)?;
        let value = self.parse_expression()?;
        Ok(ObjectProperty { key, value, span: Span::new(tok.line, tok.column) })
    }

    // ─── Combinators ─────────────────────────────────────────────────────────

    fn binary_level(
        &mut self,
        operand: Parse<Expression>,
        op_for: fn(&TokenKind) -> Option<BinaryOp>,
    ) -> Result<Expression, Error> {
        let mut left = operand(self)?;
        while let Some(op) = self.peek_kind(0)?.as_ref().and_then(op_for) {
            self.advance()?;
            let right = operand(self)?;
            let span = left.span();
            left = Expression::Binary { op, left: Box::new(left), right: Box::new(right), span };
        }
        Ok(left)
    }

    fn logical_level(&mut self, operand: Parse<Expression>, token: &TokenKind, op: LogicalOp) -> Result<Expression, Error> {
        let mut left = operand(self)?;
        while self.matches(token)? {
            let right = operand(self)?;
            let span = left.span();
            left = Expression::Logical { op, left: Box::new(left), right: Box::new(right), span };
        }
        Ok(left)
    }

    /// Comma-separated items up to and including `close`; a trailing comma is allowed.
    fn separated<T>(&mut self, close: &TokenKind, item: Parse<T>) -> Result<Vec<T>, Error> {
        let mut items = Vec::new();
        loop {
            if self.matches(close)? {
                return Ok(items);
            }
            items.push(item(self)?);
            if !self.matches(&TokenKind::Comma)? {
                self.expect(close)?;
                return Ok(items);
            }
        }
    }

    fn optional_expression(&mut self, until: &TokenKind) -> Result<Option<Expression>, Error> {
        if self.check(until)? { Ok(None) } else { self.parse_expression().map(Some) }
    }

    /// Run `inner` one nesting level deeper, failing with P006 past
    /// [`MAX_NESTING`].
    fn nested<T>(&mut self, inner: Parse<T>) -> Result<T, Error> {
        if self.depth >= MAX_NESTING {
            let tok = self.current()?;
            return Err(Error::new(ErrorCode::P006, tok.line, tok.column, format!(
                "nesting too deep, the limit is {MAX_NESTING} levels"
            ))
            .spanning(tok.width()));
        }
        self.depth += 1;
        let out = inner(self);
        self.depth -= 1;
        out
    }

    // ─── Token primitives ────────────────────────────────────────────────────

    fn peek_kind(&mut self, offset: usize) -> Result<Option<TokenKind>, Error> {
        Ok(self.lexer.peek(offset)?.map(|t| t.kind.clone()))
    }

    fn current(&mut self) -> Result<Token, Error> {
        match self.lexer.peek(0)? {
            Some(tok) => Ok(tok.clone()),
            None => Err(self.end_of_input()),
        }
    }

    fn advance(&mut self) -> Result<Token, Error> {
        match self.lexer.next_token()? {
            Some(tok) => Ok(tok),
            None => Err(self.end_of_input()),
        }
    }

    fn check(&mut self, kind: &TokenKind) -> Result<bool, Error> {
        Ok(self.lexer.peek(0)?.is_some_and(|t| &t.kind == kind))
    }

    fn matches(&mut self, kind: &TokenKind) -> Result<bool, Error> {
        let hit = self.check(kind)?;
        if hit {
            self.lexer.skip(1)?;
        }
        Ok(hit)
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<Token, Error> {
        self.lexer.consume(kind)
    }

    fn at_end(&mut self) -> Result<bool, Error> {
        Ok(self.lexer.peek(0)?.is_none())
    }

    fn span(&mut self) -> Result<Span, Error> {
        let tok = self.current()?;
        Ok(Span::new(tok.line, tok.column))
    }

    fn unexpected(&mut self, expected: &str) -> Result<Error, Error> {
        Ok(match self.lexer.peek(0)? {
            Some(tok) => unexpected_token(tok, expected),
            None => self.end_of_input(),
        })
    }

    fn end_of_input(&self) -> Error {
        let (line, column) = self.lexer.end_position();
        Error::new(ErrorCode::P005, line, column, "unexpected end of input")
    }
}

fn unexpected_token(tok: &Token, expected: &str) -> Error {
    Error::new(ErrorCode::P001, tok.line, tok.column, format!("expected {expected}, found {}", tok.kind.describe()))
        .spanning(tok.width())
}

fn invalid_target(expr: &Expression) -> Error {
    let span = expr.span();
    Error::new(ErrorCode::P003, span.line, span.column, "invalid assignment target")
}

/// Lex and parse `source` into a program.
pub fn parse(source: &str) -> Result<Program, Error> {
    Parser::new(source).parse()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> Program {
        parse(src).unwrap_or_else(|e| panic!("parse failed for {src:?}: {e}"))
    }

    fn parse_err(src: &str) -> Error {
        parse(src).expect_err("expected a parse error")
    }

    fn expr(src: &str) -> Expression {
        match parse_ok(src).body.into_iter().next() {
            Some(Statement::Expression { expression, .. }) => expression,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    fn ident_name(e: &Expression) -> &str {
        match e {
            Expression::Identifier(id) => &id.name,
            other => panic!("expected identifier, got {other:?}"),
        }
    }

    #[test]
    fn newline_terminates_statements() {
        let p = parse_ok("a = 1\nb = 2\nc");
        assert_eq!(p.body.len(), 3);
    }

    #[test]
    fn semicolons_and_closing_brace_terminate() {
        assert_eq!(parse_ok("a = 1; b = 2").body.len(), 2);
        assert_eq!(parse_ok("{ a = 1 }").body.len(), 1);
    }

    #[test]
    fn missing_terminator_on_one_line() {
        let e = parse_err("a = 1 b = 2");
        assert_eq!(e.code, ErrorCode::P002);
        assert_eq!((e.line, e.column), (1, 7));
    }

    #[test]
    fn empty_statements_are_kept() {
        let p = parse_ok(";;");
        assert!(matches!(p.body[..], [Statement::Empty { .. }, Statement::Empty { .. }]));
    }

    #[test]
    fn bare_assign_marks_declaration_site() {
        let Expression::Assignment { target, .. } = expr("x = 1") else { panic!() };
        let Expression::Identifier(id) = *target else { panic!() };
        assert!(id.declares);
    }

    #[test]
    fn compound_assign_and_comparison_do_not_declare() {
        for src in ["x += 1", "x == 1"] {
            let mut found = None;
            match expr(src) {
                Expression::Assignment { target, .. } => found = Some(*target),
                Expression::Binary { left, .. } => found = Some(*left),
                _ => {}
            }
            let Some(Expression::Identifier(id)) = found else { panic!("{src}") };
            assert!(!id.declares, "{src}");
        }
    }

    #[test]
    fn member_assignment_target() {
        let Expression::Assignment { target, .. } = expr("obj.a.b = 2") else { panic!() };
        let Expression::Property { object, name, .. } = *target else { panic!() };
        assert_eq!(name, "b");
        assert!(matches!(*object, Expression::Property { .. }));
    }

    #[test]
    fn invalid_assignment_targets() {
        assert_eq!(parse_err("1 = 2").code, ErrorCode::P003);
        assert_eq!(parse_err("f() = 2").code, ErrorCode::P003);
        assert_eq!(parse_err("(a + b)++").code, ErrorCode::P003);
    }

    #[test]
    fn break_outside_loop() {
        assert_eq!(parse_err("break").code, ErrorCode::P004);
        assert_eq!(parse_err("while (true) { func f() { continue } }").code, ErrorCode::P004);
        parse_ok("while (true) { if (x) break }");
    }

    #[test]
    fn return_newline_ends_statement() {
        let p = parse_ok("func f() {\n  return\n  1\n}");
        let Statement::Function(f) = &p.body[0] else { panic!() };
        assert!(matches!(f.body[0], Statement::Return { argument: None, .. }));
        assert_eq!(f.body.len(), 2);
    }

    #[test]
    fn reply_takes_expression_on_same_line() {
        let p = parse_ok("reply 'hi' + name");
        assert!(matches!(&p.body[0], Statement::Reply { argument: Some(Expression::Binary { .. }), .. }));
    }

    #[test]
    fn for_of_and_classic_forms() {
        let p = parse_ok("for (x of items) {}\nfor (i = 0; i < 3; i++) {}\nfor (;;) break");
        assert!(matches!(&p.body[0], Statement::ForOf { binding, .. } if binding.name == "x"));
        assert!(matches!(&p.body[1], Statement::For { init: Some(_), test: Some(_), update: Some(_), .. }));
        assert!(matches!(&p.body[2], Statement::For { init: None, test: None, update: None, .. }));
    }

    #[test]
    fn for_header_error_comes_from_deepest_form() {
        // `x of` gets further than `x;` before failing.
        let e = parse_err("for (x of ) {}");
        assert_eq!(e.code, ErrorCode::P001);
        assert_eq!(e.column, 11);
    }

    #[test]
    fn for_header_needs_explicit_semicolons() {
        assert!(parse("for (i = 0\n i < 3\n i++) {}").is_err());
    }

    #[test]
    fn precedence_mul_over_add_over_compare() {
        let Expression::Logical { op: LogicalOp::Or, right, .. } = expr("a < 1 + 2 * 3 or b") else { panic!() };
        assert_eq!(ident_name(&right), "b");
    }

    #[test]
    fn caret_shares_multiplicative_level() {
        let Expression::Binary { op, left, .. } = expr("2 * 3 ^ 2") else { panic!() };
        assert_eq!(op, BinaryOp::Pow);
        assert!(matches!(*left, Expression::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn conditional_expression() {
        let Expression::Assignment { value, .. } = expr("x = a then 1 else 2") else { panic!() };
        assert!(matches!(*value, Expression::Conditional { .. }));
    }

    #[test]
    fn symbol_aliases_for_logical() {
        assert!(matches!(expr("a && b"), Expression::Logical { op: LogicalOp::And, .. }));
        assert!(matches!(expr("a || b"), Expression::Logical { op: LogicalOp::Or, .. }));
    }

    #[test]
    fn chains_in_any_order() {
        let Expression::Call { callee, arguments, .. } = expr("a.b[0](1, 2).c()") else { panic!() };
        assert!(arguments.is_empty());
        assert!(matches!(*callee, Expression::Property { ref name, .. } if name == "c"));
    }

    #[test]
    fn keyword_property_names() {
        assert!(matches!(expr("msg.reply"), Expression::Property { ref name, .. } if name == "reply"));
    }

    #[test]
    fn postfix_requires_same_line() {
        assert!(matches!(expr("x++"), Expression::Update { op: UpdateOp::Increment, .. }));
        // `++` on the next line is not attached to `x`, and there is no prefix form.
        let e = parse_err("x\n++y");
        assert_eq!((e.code, e.line), (ErrorCode::P001, 2));
    }

    #[test]
    fn object_and_array_literals() {
        let Expression::Assignment { value, .. } = expr("o = { a: 1, 'b c': [1, 2,], if: null, 2: 3 }") else { panic!() };
        let Expression::Object { properties, .. } = *value else { panic!() };
        let keys: Vec<_> = properties.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, ["a", "b c", "if", "2"]);
    }

    #[test]
    fn brace_at_statement_start_is_block() {
        assert!(matches!(parse_ok("{}").body[0], Statement::Block { .. }));
    }

    #[test]
    fn function_expression_and_statement() {
        let p = parse_ok("func add(a, b) { return a + b }\nf = func(x) { return x }");
        let Statement::Function(f) = &p.body[0] else { panic!() };
        assert_eq!(f.name.as_deref(), Some("add"));
        assert_eq!(f.params, ["a", "b"]);
        assert!(matches!(&p.body[1], Statement::Expression { expression: Expression::Assignment { .. }, .. }));
    }

    #[test]
    fn if_else_across_lines() {
        let p = parse_ok("if (a) b = 1\nelse b = 2");
        assert!(matches!(&p.body[0], Statement::If { alternate: Some(_), .. }));
    }

    #[test]
    fn unclosed_block_reports_end_of_input() {
        let e = parse_err("func f() { a = 1");
        assert_eq!(e.code, ErrorCode::P005);
    }

    #[test]
    fn unexpected_token_in_expression() {
        let e = parse_err("x = )");
        assert_eq!(e.code, ErrorCode::P001);
        assert_eq!((e.line, e.column, e.end_column), (1, 5, 6));
    }

    #[test]
    fn deep_nesting_is_rejected_not_overflowed() {
        let parens = format!("reply {}1", "(".repeat(10_000));
        let brackets = format!("reply {}1", "[".repeat(10_000));
        let objects = format!("x = {}", "{a: ".repeat(10_000));
        let blocks = "{".repeat(10_000);
        let negations = format!("reply {}1", "!".repeat(10_000));
        for src in [parens, brackets, objects, blocks, negations] {
            assert_eq!(parse_err(&src).code, ErrorCode::P006, "{}", &src[..12]);
        }
    }

    #[test]
    fn moderate_nesting_still_parses() {
        let src = format!("reply {}1{}", "(".repeat(40), ")".repeat(40));
        parse_ok(&src);
        parse_ok(&format!("{}{}", "{".repeat(40), "}".repeat(40)));
    }

    #[test]
    fn lexical_errors_surface_through_parse() {
        assert_eq!(parse_err("x = 'open").code, ErrorCode::L002);
    }
}
