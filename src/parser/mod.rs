//=====================================================
// File: parser/mod.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: OhScript recursive descent parser implementation
// Objective: Transform token streams into module syntax trees consumed by
//            the analyzer, the forest linker, and the interpreter
//=====================================================

//=====================================================
//            Section 1: Imports
//=====================================================

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::ast::{
    ArmBody, AssignOp, AssignTarget, Ast, BindingKind, Block, Declarator, Expr, ExprKind,
    FunctionBody, FunctionDef, ImportItem, Literal, MatchArm, MemberInit, Pattern, Program, Stmt,
    StmtKind, TypeName, UnaryOp, UpdateOp, next_node_id,
};
use crate::tokenizer::{LexError, Position, Token, TokenKind, tokenize};

pub mod grammar;

use grammar::Infix;

//=====================================================
//            Section 2: Parse Errors
//=====================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("expected {expected} but found '{found}' at {position}")]
    UnexpectedToken {
        expected: String,
        found: String,
        position: Position,
    },
    #[error("unexpected end of input, expected {expected} at {position}")]
    UnexpectedEndOfInput { expected: String, position: Position },
    #[error("invalid syntax: {message} at {position}")]
    InvalidSyntax { message: String, position: Position },
}

impl ParseError {
    pub fn position(&self) -> Position {
        match self {
            ParseError::UnexpectedToken { position, .. }
            | ParseError::UnexpectedEndOfInput { position, .. }
            | ParseError::InvalidSyntax { position, .. } => *position,
        }
    }
}

/// Lexer or parser failure for one module. Fatal to that module's parse.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyntaxError {
    #[error("module '{module}': {source}")]
    Lex { module: String, source: LexError },
    #[error("module '{module}': {source}")]
    Parse { module: String, source: ParseError },
}

impl SyntaxError {
    pub fn module(&self) -> &str {
        match self {
            SyntaxError::Lex { module, .. } | SyntaxError::Parse { module, .. } => module,
        }
    }

    pub fn position(&self) -> Position {
        match self {
            SyntaxError::Lex { source, .. } => source.position(),
            SyntaxError::Parse { source, .. } => source.position(),
        }
    }
}

//Function: parse
//Purpose: Tokenize and parse one module into a syntax tree
//Inputs: module: &str, source: &str
//Returns: Result<Ast, SyntaxError>
pub fn parse(module: &str, source: &str) -> Result<Ast, SyntaxError> {
    let tokens = tokenize(source).map_err(|source| SyntaxError::Lex {
        module: module.to_string(),
        source,
    })?;
    let program = Parser::new(tokens)
        .parse()
        .map_err(|source| SyntaxError::Parse {
            module: module.to_string(),
            source,
        })?;
    debug!(
        module,
        statements = program.statements().len(),
        "parsed module"
    );
    Ok(Ast {
        module: module.to_string(),
        program,
    })
}

//=====================================================
//            Section 3: Parser State
//=====================================================

/// Context-sensitive switches; see the policies in [`grammar`].
#[derive(Debug, Clone, Copy, Default)]
struct Restrictions {
    no_construct: bool,
    in_arm: bool,
    /// A guard is followed by the arm's `=>`, so `(x) =>` is never a lambda there.
    no_lambda: bool,
}

const HEADER: Restrictions = Restrictions {
    no_construct: true,
    in_arm: false,
    no_lambda: false,
};

const ARM_BODY: Restrictions = Restrictions {
    no_construct: false,
    in_arm: true,
    no_lambda: false,
};

const GUARD: Restrictions = Restrictions {
    no_construct: true,
    in_arm: true,
    no_lambda: true,
};

/// Recursive descent parser for OhScript
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    expr_depth: usize,
    restrictions: Restrictions,
}

const MAX_EXPRESSION_DEPTH: usize = 256;

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if !matches!(tokens.last().map(|token| &token.kind), Some(TokenKind::Eof)) {
            let end = tokens.last().map(|token| token.end).unwrap_or(0);
            let position = tokens
                .last()
                .map(|token| token.position)
                .unwrap_or_default();
            tokens.push(Token::new(TokenKind::Eof, "", position, end));
        }
        Self {
            tokens,
            current: 0,
            expr_depth: 0,
            restrictions: Restrictions::default(),
        }
    }

    //=====================================================
    //            Section 4: Token Navigation
    //=====================================================

    fn peek(&self) -> &Token {
        let index = self.current.min(self.tokens.len() - 1);
        &self.tokens[index]
    }

    fn peek_kind_at(&self, offset: usize) -> &TokenKind {
        self.tokens
            .get(self.current + offset)
            .map(|token| &token.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if !self.is_at_end() {
            self.current += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, kind: &TokenKind, expected: &str) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn consume_identifier(&mut self, expected: &str) -> Result<String, ParseError> {
        match &self.peek().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let token = self.peek();
        if token.kind == TokenKind::Eof {
            ParseError::UnexpectedEndOfInput {
                expected: expected.to_string(),
                position: token.position,
            }
        } else {
            ParseError::UnexpectedToken {
                expected: expected.to_string(),
                found: token.lexeme.clone(),
                position: token.position,
            }
        }
    }

    fn invalid(&self, message: impl Into<String>, position: Position) -> ParseError {
        ParseError::InvalidSyntax {
            message: message.into(),
            position,
        }
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Semicolon | TokenKind::RightBrace | TokenKind::Eof
        )
    }

    fn restrict(&mut self, next: Restrictions) -> Restrictions {
        std::mem::replace(&mut self.restrictions, next)
    }

    fn with_restrictions<T>(
        &mut self,
        next: Restrictions,
        parse: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        let saved = self.restrict(next);
        let result = parse(self);
        self.restrictions = saved;
        result
    }

    fn descend(&mut self) -> Result<(), ParseError> {
        self.expr_depth += 1;
        if self.expr_depth > MAX_EXPRESSION_DEPTH {
            self.expr_depth -= 1;
            return Err(self.invalid("expression nesting too deep", self.peek().position));
        }
        Ok(())
    }

    /// Whether the parenthesised group starting at the current `(` is
    /// immediately followed by `follower`.
    fn paren_group_followed_by(&self, follower: &TokenKind) -> bool {
        if !self.check(&TokenKind::LeftParen) {
            return false;
        }
        let mut depth = 0usize;
        let mut index = self.current;
        while let Some(token) = self.tokens.get(index) {
            match token.kind {
                TokenKind::LeftParen | TokenKind::LeftBracket | TokenKind::LeftBrace => depth += 1,
                TokenKind::RightParen | TokenKind::RightBracket | TokenKind::RightBrace => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return self
                            .tokens
                            .get(index + 1)
                            .is_some_and(|next| &next.kind == follower);
                    }
                }
                TokenKind::Eof => return false,
                _ => {}
            }
            index += 1;
        }
        false
    }

    /// Entity-literal lookahead at a `{`: `{}` or `{ name :`.
    fn entity_literal_ahead(&self, allow_empty: bool) -> bool {
        if !self.check(&TokenKind::LeftBrace) {
            return false;
        }
        let key = &self.tokens[(self.current + 1).min(self.tokens.len() - 1)];
        match &key.kind {
            TokenKind::RightBrace => allow_empty,
            TokenKind::Identifier(_) | TokenKind::String(_) => {
                matches!(self.peek_kind_at(2), TokenKind::Colon)
            }
            kind if kind.is_keyword() => matches!(self.peek_kind_at(2), TokenKind::Colon),
            _ => false,
        }
    }

    //=====================================================
    //            Section 5: Statement Parsing
    //=====================================================

    //Function: parse
    //Purpose: Consume all tokens and produce the module program
    //Inputs: &mut self
    //Returns: Result<Program, ParseError>
    pub fn parse(&mut self) -> Result<Program, ParseError> {
        let position = self.peek().position;
        let mut statements = Vec::new();
        while !self.is_at_end() {
            statements.push(self.parse_statement()?);
        }
        Ok(Program {
            body: Block::new(statements, position),
        })
    }

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        let position = self.peek().position;
        let leading = self.peek().kind.clone();
        let kind = match leading {
            TokenKind::Let | TokenKind::Var => self.parse_declaration()?,
            TokenKind::Func if matches!(self.peek_kind_at(1), TokenKind::Identifier(_)) => {
                StmtKind::Function(Arc::new(self.parse_function()?))
            }
            TokenKind::If => self.parse_if()?,
            TokenKind::While => {
                self.advance();
                let condition = self.parse_header()?;
                let body = self.parse_block()?;
                StmtKind::While { condition, body }
            }
            TokenKind::Do => {
                self.advance();
                let body = self.parse_block()?;
                self.consume(&TokenKind::While, "'while' after do body")?;
                let condition = self.parse_header()?;
                StmtKind::DoWhile { body, condition }
            }
            TokenKind::For => self.parse_for()?,
            TokenKind::Each => self.parse_each()?,
            TokenKind::Match => {
                self.advance();
                let scrutinee = self.parse_header()?;
                let arms = self.parse_match_arms()?;
                StmtKind::Match { scrutinee, arms }
            }
            TokenKind::Return => {
                self.advance();
                let value = if self.at_statement_end() {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                StmtKind::Return(value)
            }
            TokenKind::Break => {
                self.advance();
                StmtKind::Break
            }
            TokenKind::Continue => {
                self.advance();
                StmtKind::Continue
            }
            TokenKind::Import => self.parse_import()?,
            TokenKind::Export => {
                self.advance();
                let mut names = vec![self.consume_identifier("exported name")?];
                while self.match_token(&TokenKind::Comma) {
                    names.push(self.consume_identifier("exported name")?);
                }
                StmtKind::Export(names)
            }
            TokenKind::Namespace => {
                self.advance();
                let name = self.consume_identifier("namespace name")?;
                let body = self.parse_block()?;
                StmtKind::Namespace { name, body }
            }
            _ => {
                let expr = self.parse_expression()?;
                let terminated = self.match_token(&TokenKind::Semicolon);
                return Ok(Stmt::new(StmtKind::Expression { expr, terminated }, position));
            }
        };
        self.match_token(&TokenKind::Semicolon);
        Ok(Stmt::new(kind, position))
    }

    fn parse_declaration(&mut self) -> Result<StmtKind, ParseError> {
        let kind = match self.advance().kind {
            TokenKind::Let => BindingKind::Let,
            _ => BindingKind::Var,
        };
        let mut declarators = Vec::new();
        loop {
            let position = self.peek().position;
            let target = if self.check(&TokenKind::LeftParen) {
                self.parse_pattern()?
            } else {
                Pattern::Bind(self.consume_identifier("variable name")?)
            };
            let value = if self.match_token(&TokenKind::Equal) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            if value.is_none() && !matches!(target, Pattern::Bind(_)) {
                return Err(self.invalid("destructuring declaration needs a value", position));
            }
            declarators.push(Declarator {
                target,
                value,
                position,
            });
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        Ok(StmtKind::Declare { kind, declarators })
    }

    fn parse_if(&mut self) -> Result<StmtKind, ParseError> {
        self.consume(&TokenKind::If, "'if'")?;
        let condition = self.parse_header()?;
        let then_branch = self.parse_block()?;
        let else_branch = if self.match_token(&TokenKind::Else) {
            if self.check(&TokenKind::If) {
                let position = self.peek().position;
                let nested = self.parse_if()?;
                Some(Block::new(vec![Stmt::new(nested, position)], position))
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(StmtKind::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn parse_for(&mut self) -> Result<StmtKind, ParseError> {
        self.advance();
        self.consume(&TokenKind::LeftParen, "'(' after for")?;
        let (init, condition, update) = self.with_restrictions(Restrictions::default(), |p| {
            let init = if p.check(&TokenKind::Semicolon) {
                None
            } else {
                let position = p.peek().position;
                let kind = if matches!(p.peek().kind, TokenKind::Let | TokenKind::Var) {
                    p.parse_declaration()?
                } else {
                    StmtKind::Expression {
                        expr: p.parse_expression()?,
                        terminated: true,
                    }
                };
                Some(Box::new(Stmt::new(kind, position)))
            };
            p.consume(&TokenKind::Semicolon, "';' after for initializer")?;
            let condition = if p.check(&TokenKind::Semicolon) {
                None
            } else {
                Some(p.parse_expression()?)
            };
            p.consume(&TokenKind::Semicolon, "';' after for condition")?;
            let update = if p.check(&TokenKind::RightParen) {
                None
            } else {
                Some(p.parse_expression()?)
            };
            Ok((init, condition, update))
        })?;
        self.consume(&TokenKind::RightParen, "')' after for clauses")?;
        let body = self.parse_block()?;
        Ok(StmtKind::For {
            init,
            condition,
            update,
            body,
        })
    }

    fn parse_each(&mut self) -> Result<StmtKind, ParseError> {
        self.advance();
        let (item, index) = if self.match_token(&TokenKind::LeftParen) {
            let item = self.consume_identifier("loop variable")?;
            self.consume(&TokenKind::Comma, "',' between item and index")?;
            let index = self.consume_identifier("index variable")?;
            self.consume(&TokenKind::RightParen, "')'")?;
            (item, Some(index))
        } else {
            (self.consume_identifier("loop variable")?, None)
        };
        self.consume(&TokenKind::In, "'in'")?;
        let iterable = self.parse_header()?;
        let body = self.parse_block()?;
        Ok(StmtKind::Each {
            item,
            index,
            iterable,
            body,
        })
    }

    fn parse_import(&mut self) -> Result<StmtKind, ParseError> {
        self.advance();
        let mut items = Vec::new();
        loop {
            let name = self.consume_identifier("imported name")?;
            let alias = if self.match_token(&TokenKind::As) {
                Some(self.consume_identifier("import alias")?)
            } else {
                None
            };
            items.push(ImportItem { name, alias });
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        self.consume(&TokenKind::From, "'from'")?;
        let module = match self.peek().kind.clone() {
            TokenKind::Identifier(name) | TokenKind::String(name) => {
                self.advance();
                name
            }
            _ => return Err(self.unexpected("module name")),
        };
        Ok(StmtKind::Import { items, module })
    }

    fn parse_block(&mut self) -> Result<Block, ParseError> {
        let position = self.consume(&TokenKind::LeftBrace, "'{'")?.position;
        let statements = self.with_restrictions(Restrictions::default(), |p| {
            let mut statements = Vec::new();
            while !p.check(&TokenKind::RightBrace) && !p.is_at_end() {
                statements.push(p.parse_statement()?);
            }
            Ok(statements)
        })?;
        self.consume(&TokenKind::RightBrace, "'}'")?;
        Ok(Block::new(statements, position))
    }

    fn parse_match_arms(&mut self) -> Result<Vec<MatchArm>, ParseError> {
        self.consume(&TokenKind::LeftBrace, "'{' after match subject")?;
        let mut arms = Vec::new();
        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            let position = self.peek().position;
            if !self.match_token(&TokenKind::Bar) && !arms.is_empty() {
                return Err(self.unexpected("'|' before match arm"));
            }
            let pattern = self.parse_pattern()?;
            let guard = if self.match_token(&TokenKind::If) {
                Some(self.with_restrictions(GUARD, |p| p.parse_expression())?)
            } else {
                None
            };
            self.consume(&TokenKind::FatArrow, "'=>' in match arm")?;
            let body = if self.check(&TokenKind::LeftBrace) && !self.entity_literal_ahead(false) {
                ArmBody::Block(self.parse_block()?)
            } else {
                ArmBody::Expr(self.with_restrictions(ARM_BODY, |p| p.parse_expression())?)
            };
            self.match_token(&TokenKind::Comma);
            arms.push(MatchArm {
                pattern,
                guard,
                body,
                position,
            });
        }
        self.consume(&TokenKind::RightBrace, "'}' after match arms")?;
        Ok(arms)
    }

    //=====================================================
    //            Section 6: Patterns
    //=====================================================

    fn parse_pattern(&mut self) -> Result<Pattern, ParseError> {
        let token = self.advance();
        let pattern = match token.kind {
            TokenKind::Identifier(name) if name == "_" => Pattern::Wildcard,
            TokenKind::Identifier(name) => Pattern::Bind(name),
            TokenKind::DotDot => Pattern::Rest,
            TokenKind::Number(n) => Pattern::Literal(Literal::Number(n)),
            TokenKind::Minus => match self.advance().kind {
                TokenKind::Number(n) => Pattern::Literal(Literal::Number(-n)),
                _ => return Err(self.invalid("expected number after '-'", token.position)),
            },
            TokenKind::String(s) => Pattern::Literal(Literal::String(s)),
            TokenKind::True => Pattern::Literal(Literal::Bool(true)),
            TokenKind::False => Pattern::Literal(Literal::Bool(false)),
            TokenKind::Null => Pattern::Literal(Literal::Null),
            TokenKind::LeftParen => {
                if self.match_token(&TokenKind::RightParen) {
                    return Ok(Pattern::Literal(Literal::Unit));
                }
                let mut items = self.parse_pattern_list(&TokenKind::RightParen)?;
                if items.len() == 1 && items[0] != Pattern::Rest {
                    items.remove(0)
                } else {
                    Pattern::Tuple(items)
                }
            }
            TokenKind::LeftBracket => {
                if self.match_token(&TokenKind::RightBracket) {
                    return Ok(Pattern::Array(Vec::new()));
                }
                Pattern::Array(self.parse_pattern_list(&TokenKind::RightBracket)?)
            }
            TokenKind::Eof => {
                return Err(ParseError::UnexpectedEndOfInput {
                    expected: "pattern".to_string(),
                    position: token.position,
                });
            }
            _ => {
                return Err(ParseError::UnexpectedToken {
                    expected: "pattern".to_string(),
                    found: token.lexeme,
                    position: token.position,
                });
            }
        };
        Ok(pattern)
    }

    fn parse_pattern_list(&mut self, close: &TokenKind) -> Result<Vec<Pattern>, ParseError> {
        let mut items = vec![self.parse_pattern()?];
        while self.match_token(&TokenKind::Comma) {
            if self.check(close) {
                break;
            }
            items.push(self.parse_pattern()?);
        }
        self.consume(close, "closing delimiter of pattern")?;
        if items.iter().filter(|item| **item == Pattern::Rest).count() > 1 {
            return Err(self.invalid("at most one '..' per pattern", self.peek().position));
        }
        Ok(items)
    }

    //=====================================================
    //            Section 7: Expression Parsing
    //=====================================================

    //Function: parse_expression
    //Purpose: Parse a full expression, assignment included
    //Inputs: &mut self
    //Returns: Result<Expr, ParseError>
    pub fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.descend()?;
        let result = self.parse_assignment();
        self.expr_depth -= 1;
        result
    }

    fn parse_header(&mut self) -> Result<Expr, ParseError> {
        self.with_restrictions(HEADER, |p| p.parse_expression())
    }

    fn parse_nested(&mut self) -> Result<Expr, ParseError> {
        self.with_restrictions(Restrictions::default(), |p| p.parse_expression())
    }

    fn parse_assignment(&mut self) -> Result<Expr, ParseError> {
        let position = self.peek().position;
        if self.paren_group_followed_by(&TokenKind::Equal) {
            let pattern = self.parse_pattern()?;
            self.consume(&TokenKind::Equal, "'='")?;
            let value = self.parse_assignment()?;
            return Ok(Expr::new(
                ExprKind::Assign {
                    op: AssignOp::Assign,
                    target: AssignTarget::Pattern(pattern),
                    value: Box::new(value),
                },
                position,
            ));
        }

        let expr = self.parse_conditional()?;
        let Some(op) = grammar::assignment(&self.peek().kind) else {
            return Ok(expr);
        };
        let op_position = self.advance().position;
        if !is_place(&expr) {
            return Err(self.invalid("invalid assignment target", op_position));
        }
        let value = self.parse_assignment()?;
        Ok(Expr::new(
            ExprKind::Assign {
                op,
                target: AssignTarget::Place(Box::new(expr)),
                value: Box::new(value),
            },
            position,
        ))
    }

    fn parse_conditional(&mut self) -> Result<Expr, ParseError> {
        let position = self.peek().position;
        let condition = self.parse_binary(grammar::PIPE)?;
        if !self.match_token(&TokenKind::Question) {
            return Ok(condition);
        }
        let then_branch = self.parse_expression()?;
        self.consume(&TokenKind::Colon, "':' in conditional expression")?;
        let else_branch = self.parse_conditional()?;
        Ok(Expr::new(
            ExprKind::Conditional {
                condition: Box::new(condition),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            },
            position,
        ))
    }

    fn parse_binary(&mut self, min_precedence: grammar::Precedence) -> Result<Expr, ParseError> {
        let position = self.peek().position;
        let mut left = self.parse_unary()?;
        loop {
            let Some((infix, precedence)) = grammar::infix(&self.peek().kind) else {
                break;
            };
            if precedence < min_precedence {
                break;
            }
            if infix == Infix::Binary(crate::ast::BinaryOp::BitOr) && self.restrictions.in_arm {
                break;
            }
            self.advance();
            let kind = match infix {
                Infix::TypeTest => ExprKind::TypeTest {
                    value: Box::new(left),
                    type_name: self.parse_type_name()?,
                },
                Infix::Pipe => ExprKind::Pipe {
                    value: Box::new(left),
                    function: Box::new(self.parse_binary(precedence + 1)?),
                },
                Infix::Binary(op) => ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(self.parse_binary(precedence + 1)?),
                },
            };
            left = Expr::new(kind, position);
        }
        Ok(left)
    }

    fn parse_type_name(&mut self) -> Result<TypeName, ParseError> {
        let token = self.advance();
        let name = match &token.kind {
            TokenKind::Identifier(name) => name.as_str(),
            TokenKind::Null => "null",
            _ => "",
        };
        TypeName::from_name(name)
            .ok_or_else(|| self.invalid(format!("unknown type name '{}'", token.lexeme), token.position))
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        self.descend()?;
        let result = self.parse_unary_inner();
        self.expr_depth -= 1;
        result
    }

    fn parse_unary_inner(&mut self) -> Result<Expr, ParseError> {
        let position = self.peek().position;
        let op = match self.peek().kind {
            TokenKind::Not => Some(UnaryOp::Not),
            TokenKind::Minus => Some(UnaryOp::Negate),
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::new(
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                position,
            ));
        }

        let update = match self.peek().kind {
            TokenKind::PlusPlus => Some(UpdateOp::Increment),
            TokenKind::MinusMinus => Some(UpdateOp::Decrement),
            _ => None,
        };
        if let Some(op) = update {
            self.advance();
            let target = self.parse_unary()?;
            if !is_place(&target) {
                return Err(self.invalid("increment target must be assignable", position));
            }
            return Ok(Expr::new(
                ExprKind::Update {
                    op,
                    prefix: true,
                    target: Box::new(target),
                },
                position,
            ));
        }

        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let position = self.peek().position;
        let mut expr = self.parse_primary()?;
        loop {
            let kind = match self.peek().kind.clone() {
                TokenKind::LeftParen => ExprKind::Call {
                    callee: Box::new(expr),
                    args: self.parse_arguments()?,
                },
                TokenKind::Dot => {
                    self.advance();
                    let token = self.advance();
                    match token.kind {
                        TokenKind::Number(n) if n >= 0.0 && n.fract() == 0.0 => {
                            ExprKind::TupleIndex {
                                object: Box::new(expr),
                                index: n as usize,
                            }
                        }
                        TokenKind::Identifier(name) => ExprKind::Member {
                            object: Box::new(expr),
                            name,
                        },
                        ref kind if kind.is_keyword() => ExprKind::Member {
                            object: Box::new(expr),
                            name: token.lexeme.clone(),
                        },
                        _ => {
                            return Err(ParseError::UnexpectedToken {
                                expected: "member name or tuple index".to_string(),
                                found: token.lexeme,
                                position: token.position,
                            });
                        }
                    }
                }
                TokenKind::LeftBracket => {
                    self.advance();
                    let index = self.parse_nested()?;
                    self.consume(&TokenKind::RightBracket, "']'")?;
                    ExprKind::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    }
                }
                TokenKind::ColonColon => {
                    self.advance();
                    if self.check(&TokenKind::LeftBrace) {
                        ExprKind::Extend {
                            base: Box::new(expr),
                            members: self.parse_entity_members()?,
                        }
                    } else {
                        ExprKind::Scoped {
                            namespace: Box::new(expr),
                            name: self.consume_identifier("name after '::'")?,
                        }
                    }
                }
                TokenKind::PlusPlus | TokenKind::MinusMinus if is_place(&expr) => {
                    let op = if self.advance().kind == TokenKind::PlusPlus {
                        UpdateOp::Increment
                    } else {
                        UpdateOp::Decrement
                    };
                    ExprKind::Update {
                        op,
                        prefix: false,
                        target: Box::new(expr),
                    }
                }
                _ => break,
            };
            expr = Expr::new(kind, position);
        }
        Ok(expr)
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.consume(&TokenKind::LeftParen, "'('")?;
        let args = self.with_restrictions(Restrictions::default(), |p| {
            let mut args = Vec::new();
            while !p.check(&TokenKind::RightParen) {
                args.push(p.parse_expression()?);
                if !p.match_token(&TokenKind::Comma) {
                    break;
                }
            }
            Ok(args)
        })?;
        self.consume(&TokenKind::RightParen, "')' after arguments")?;
        Ok(args)
    }

    //=====================================================
    //            Section 8: Primary Expressions
    //=====================================================

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.peek().clone();
        let position = token.position;
        let kind = match token.kind {
            TokenKind::Number(n) => {
                self.advance();
                ExprKind::Literal(Literal::Number(n))
            }
            TokenKind::String(s) => {
                self.advance();
                ExprKind::Literal(Literal::String(s))
            }
            TokenKind::True => {
                self.advance();
                ExprKind::Literal(Literal::Bool(true))
            }
            TokenKind::False => {
                self.advance();
                ExprKind::Literal(Literal::Bool(false))
            }
            TokenKind::Null => {
                self.advance();
                ExprKind::Literal(Literal::Null)
            }
            TokenKind::Identifier(name) => {
                if !self.restrictions.no_lambda
                    && matches!(self.peek_kind_at(1), TokenKind::FatArrow)
                {
                    self.advance();
                    self.advance();
                    let body = self.parse_lambda_body()?;
                    return Ok(self.lambda(vec![name], body, position));
                }
                self.advance();
                if !self.restrictions.no_construct
                    && grammar::is_class_name(&name)
                    && self.entity_literal_ahead(true)
                {
                    ExprKind::Construct {
                        class: name,
                        members: self.parse_entity_members()?,
                    }
                } else {
                    ExprKind::Identifier(name)
                }
            }
            TokenKind::This => {
                self.advance();
                ExprKind::This
            }
            TokenKind::Base => {
                self.advance();
                ExprKind::Base
            }
            TokenKind::Ext => {
                self.advance();
                self.consume(&TokenKind::ColonColon, "'::' after ext")?;
                ExprKind::External(self.consume_identifier("external name")?)
            }
            TokenKind::LeftParen => return self.parse_parenthesized(),
            TokenKind::LeftBracket => return self.parse_bracketed(),
            TokenKind::LeftBrace => {
                if self.entity_literal_ahead(true) {
                    ExprKind::Entity(self.parse_entity_members()?)
                } else {
                    ExprKind::Block(self.parse_block()?)
                }
            }
            TokenKind::Func => ExprKind::Function(Arc::new(self.parse_function()?)),
            TokenKind::Async => {
                self.advance();
                ExprKind::Async(self.parse_block()?)
            }
            TokenKind::Safe | TokenKind::Try => {
                self.advance();
                ExprKind::Safe(self.parse_block()?)
            }
            TokenKind::Lock => {
                self.advance();
                let key = if self.match_token(&TokenKind::LeftParen) {
                    let key = self.parse_nested()?;
                    self.consume(&TokenKind::RightParen, "')' after lock key")?;
                    Some(Box::new(key))
                } else {
                    None
                };
                ExprKind::Lock {
                    key,
                    body: self.parse_block()?,
                }
            }
            TokenKind::Match => {
                self.advance();
                let scrutinee = self.parse_header()?;
                let arms = self.parse_match_arms()?;
                ExprKind::Match {
                    scrutinee: Box::new(scrutinee),
                    arms,
                }
            }
            _ => return Err(self.unexpected("expression")),
        };
        Ok(Expr::new(kind, position))
    }

    fn lambda(&self, params: Vec<String>, body: FunctionBody, position: Position) -> Expr {
        Expr::new(
            ExprKind::Function(Arc::new(FunctionDef {
                id: next_node_id(),
                name: None,
                params,
                body,
                position,
            })),
            position,
        )
    }

    fn parse_parenthesized(&mut self) -> Result<Expr, ParseError> {
        let position = self.peek().position;
        if !self.restrictions.no_lambda && self.paren_group_followed_by(&TokenKind::FatArrow) {
            let params = self.parse_parameters()?;
            self.consume(&TokenKind::FatArrow, "'=>'")?;
            let body = self.parse_lambda_body()?;
            return Ok(self.lambda(params, body, position));
        }

        self.advance();
        if self.match_token(&TokenKind::RightParen) {
            return Ok(Expr::new(ExprKind::Literal(Literal::Unit), position));
        }
        let (mut elements, trailing_comma) =
            self.with_restrictions(Restrictions::default(), |p| {
                let mut elements = vec![p.parse_expression()?];
                let mut trailing_comma = false;
                while p.match_token(&TokenKind::Comma) {
                    if p.check(&TokenKind::RightParen) {
                        trailing_comma = true;
                        break;
                    }
                    elements.push(p.parse_expression()?);
                }
                Ok((elements, trailing_comma))
            })?;
        self.consume(&TokenKind::RightParen, "')'")?;

        // (x) is x; (x,) and (x, y) are tuples
        if elements.len() == 1 && !trailing_comma {
            return Ok(elements.remove(0));
        }
        Ok(Expr::new(ExprKind::Tuple(elements), position))
    }

    fn parse_bracketed(&mut self) -> Result<Expr, ParseError> {
        let position = self.advance().position;
        let kind = self.with_restrictions(Restrictions::default(), |p| {
            if p.check(&TokenKind::RightBracket) {
                return Ok(ExprKind::Array(Vec::new()));
            }
            if p.check(&TokenKind::Colon) && matches!(p.peek_kind_at(1), TokenKind::RightBracket) {
                p.advance();
                return Ok(ExprKind::Map(Vec::new()));
            }
            let first = p.parse_expression()?;
            if p.match_token(&TokenKind::Colon) {
                let mut entries = vec![(first, p.parse_expression()?)];
                while p.match_token(&TokenKind::Comma) {
                    if p.check(&TokenKind::RightBracket) {
                        break;
                    }
                    let key = p.parse_expression()?;
                    p.consume(&TokenKind::Colon, "':' in map literal")?;
                    entries.push((key, p.parse_expression()?));
                }
                return Ok(ExprKind::Map(entries));
            }
            let mut elements = vec![first];
            while p.match_token(&TokenKind::Comma) {
                if p.check(&TokenKind::RightBracket) {
                    break;
                }
                elements.push(p.parse_expression()?);
            }
            Ok(ExprKind::Array(elements))
        })?;
        self.consume(&TokenKind::RightBracket, "']'")?;
        Ok(Expr::new(kind, position))
    }

    fn parse_entity_members(&mut self) -> Result<Vec<MemberInit>, ParseError> {
        self.consume(&TokenKind::LeftBrace, "'{'")?;
        let members = self.with_restrictions(Restrictions::default(), |p| {
            let mut members: Vec<MemberInit> = Vec::new();
            while !p.check(&TokenKind::RightBrace) {
                let token = p.advance();
                let name = match token.kind {
                    TokenKind::Identifier(name) | TokenKind::String(name) => name,
                    ref kind if kind.is_keyword() => token.lexeme.clone(),
                    _ => {
                        return Err(ParseError::UnexpectedToken {
                            expected: "member name".to_string(),
                            found: token.lexeme,
                            position: token.position,
                        });
                    }
                };
                if members.iter().any(|member| member.name == name) {
                    return Err(p.invalid(format!("duplicate member '{}'", name), token.position));
                }
                p.consume(&TokenKind::Colon, "':' after member name")?;
                let value = p.parse_expression()?;
                members.push(MemberInit {
                    name,
                    value,
                    position: token.position,
                });
                if !p.match_token(&TokenKind::Comma) {
                    break;
                }
            }
            Ok(members)
        })?;
        self.consume(&TokenKind::RightBrace, "'}' after entity members")?;
        Ok(members)
    }

    //=====================================================
    //            Section 9: Functions
    //=====================================================

    fn parse_function(&mut self) -> Result<FunctionDef, ParseError> {
        let position = self.consume(&TokenKind::Func, "'func'")?.position;
        let name = match &self.peek().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Some(name)
            }
            _ => None,
        };
        let params = self.parse_parameters()?;
        let body = if self.match_token(&TokenKind::FatArrow) {
            self.parse_lambda_body()?
        } else {
            FunctionBody::Block(self.parse_block()?)
        };
        Ok(FunctionDef {
            id: next_node_id(),
            name,
            params,
            body,
            position,
        })
    }

    fn parse_parameters(&mut self) -> Result<Vec<String>, ParseError> {
        self.consume(&TokenKind::LeftParen, "'(' before parameters")?;
        let mut params: Vec<String> = Vec::new();
        while !self.check(&TokenKind::RightParen) {
            let position = self.peek().position;
            let name = self.consume_identifier("parameter name")?;
            if name != "_" && params.contains(&name) {
                return Err(self.invalid(format!("duplicate parameter '{}'", name), position));
            }
            params.push(name);
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        self.consume(&TokenKind::RightParen, "')' after parameters")?;
        Ok(params)
    }

    fn parse_lambda_body(&mut self) -> Result<FunctionBody, ParseError> {
        if self.check(&TokenKind::LeftBrace) && !self.entity_literal_ahead(false) {
            return Ok(FunctionBody::Block(self.parse_block()?));
        }
        Ok(FunctionBody::Expr(Box::new(self.parse_expression()?)))
    }
}

/// Expressions that may appear on the left of `=` or under `++`/`--`.
fn is_place(expr: &Expr) -> bool {
    matches!(
        expr.kind,
        ExprKind::Identifier(_)
            | ExprKind::Member { .. }
            | ExprKind::Index { .. }
            | ExprKind::TupleIndex { .. }
    )
}

//=====================================================
//            Section 10: Tests
//=====================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn program(source: &str) -> Program {
        parse("test", source).expect("source should parse").program
    }

    fn single_expr(source: &str) -> Expr {
        let program = program(source);
        match &program.statements()[0].kind {
            StmtKind::Expression { expr, .. } => expr.clone(),
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn single_parenthesised_element_unwraps() {
        let expr = single_expr("(10)");
        assert_eq!(expr.kind, ExprKind::Literal(Literal::Number(10.0)));
    }

    #[test]
    fn two_elements_make_a_tuple() {
        let expr = single_expr("(1, 2)");
        assert!(matches!(expr.kind, ExprKind::Tuple(ref items) if items.len() == 2));
        assert!(matches!(single_expr("()").kind, ExprKind::Literal(Literal::Unit)));
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let expr = single_expr("1 + 2 * 3");
        match expr.kind {
            ExprKind::Binary { op, right, .. } => {
                assert_eq!(op, crate::ast::BinaryOp::Add);
                assert!(matches!(
                    right.kind,
                    ExprKind::Binary {
                        op: crate::ast::BinaryOp::Multiply,
                        ..
                    }
                ));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn pipe_chains_left_to_right() {
        let expr = single_expr("3 >> f1 >> f2");
        match expr.kind {
            ExprKind::Pipe { value, function } => {
                assert_eq!(function.kind, ExprKind::Identifier("f2".into()));
                assert!(matches!(value.kind, ExprKind::Pipe { .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn braces_disambiguate_entity_and_block() {
        assert!(matches!(single_expr("{age: 1}").kind, ExprKind::Entity(_)));
        assert!(matches!(single_expr("{}").kind, ExprKind::Entity(_)));
        assert!(matches!(single_expr("{let a = 1; a}").kind, ExprKind::Block(_)));
    }

    #[test]
    fn lambdas_in_every_form() {
        for source in ["x => x + 1", "(x, y) => x", "() => {1}", "func(a) {a}", "func() => 2"] {
            assert!(
                matches!(single_expr(source).kind, ExprKind::Function(_)),
                "{source} should be a function"
            );
        }
    }

    #[test]
    fn extension_and_construction() {
        assert!(matches!(
            single_expr("will::{add: () => 1}").kind,
            ExprKind::Extend { .. }
        ));
        assert!(matches!(
            single_expr("Woman{name: \"ivy\"}").kind,
            ExprKind::Construct { ref class, .. } if class == "Woman"
        ));
        assert!(matches!(single_expr("ext::util").kind, ExprKind::External(_)));
        assert!(matches!(single_expr("ns::f").kind, ExprKind::Scoped { .. }));
    }

    #[test]
    fn destructuring_declaration_with_rest() {
        let program = program("let (age, .., (_, last)) = will;");
        match &program.statements()[0].kind {
            StmtKind::Declare { declarators, .. } => {
                assert_eq!(
                    declarators[0].target,
                    Pattern::Tuple(vec![
                        Pattern::Bind("age".into()),
                        Pattern::Rest,
                        Pattern::Tuple(vec![Pattern::Wildcard, Pattern::Bind("last".into())]),
                    ])
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn tuple_assignment_uses_pattern_target() {
        let expr = single_expr("(a, ..) = t");
        assert!(matches!(
            expr.kind,
            ExprKind::Assign {
                target: AssignTarget::Pattern(_),
                ..
            }
        ));
    }

    #[test]
    fn match_arms_stop_at_bar() {
        let program = program("match a{|(b,..,d)if(b>0)=>c=b |_=>c=100} c");
        match &program.statements()[0].kind {
            StmtKind::Match { arms, .. } => {
                assert_eq!(arms.len(), 2);
                assert!(arms[0].guard.is_some());
                assert_eq!(arms[1].pattern, Pattern::Wildcard);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(program.statements().len(), 2);
    }

    #[test]
    fn guards_end_at_the_arm_arrow() {
        let arms = |source: &str| match &program(source).statements()[0].kind {
            StmtKind::Match { arms, .. } => arms.clone(),
            other => panic!("unexpected {other:?}"),
        };
        let bare = arms("match n { |v if ready => v | _ => 0 }");
        assert!(matches!(
            bare[0].guard.as_ref().map(|guard| &guard.kind),
            Some(ExprKind::Identifier(_))
        ));
        let paren = arms("match n { |(a, b) if(a>b) => a | _ => 0 }");
        assert!(matches!(
            paren[0].guard.as_ref().map(|guard| &guard.kind),
            Some(ExprKind::Binary { .. })
        ));
        assert!(matches!(paren[0].body, ArmBody::Expr(_)));
        assert_eq!(program("let x = match n { |(a, b) if(a>b) => a | _ => 0 };").statements().len(), 1);
    }

    #[test]
    fn trailing_expression_is_unterminated() {
        let open = program("var a = 1; a");
        assert!(open.body.tail().is_some());
        let closed = program("var a = 1; a;");
        assert!(closed.body.tail().is_none());
    }

    #[test]
    fn statements_after_braces_need_no_semicolon() {
        let program = program("func f2(){a+=10} f3(); while(b>0){50} age");
        assert_eq!(program.statements().len(), 4);
    }

    #[test]
    fn imports_and_exports() {
        let program = program("import a as b, f3 from m3; export f1, f2;");
        let imports: Vec<_> = program.imports().collect();
        assert_eq!(imports[0].1, "m3");
        assert_eq!(imports[0].0[0].local_name(), "b");
        let exports: Vec<_> = program.exports().map(|(name, _)| name).collect();
        assert_eq!(exports, vec!["f1", "f2"]);
    }

    #[test]
    fn each_header_does_not_construct() {
        let program = program("each (b, i) in Items {c += b;}");
        assert!(matches!(program.statements()[0].kind, StmtKind::Each { .. }));
    }

    #[test]
    fn error_reports_offending_token() {
        let err = parse("m", "let a = ;").expect_err("should fail");
        assert_eq!(err.module(), "m");
        assert_eq!(err.position().column, 9);
        let err = parse("m", "let a = (1, 2").expect_err("should fail");
        assert!(matches!(
            err,
            SyntaxError::Parse {
                source: ParseError::UnexpectedEndOfInput { .. },
                ..
            }
        ));
    }

    #[test]
    fn invalid_assignment_target_rejected() {
        assert!(parse("m", "1 = 2").is_err());
        assert!(parse("m", "a + b = 2").is_err());
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let worker = std::thread::Builder::new()
            .stack_size(32 * 1024 * 1024)
            .spawn(|| {
                let source = format!("{}1{}", "(".repeat(400), ")".repeat(400));
                parse("m", &source).is_err()
            })
            .expect("spawn parser thread");
        assert!(worker.join().expect("parser thread"));
    }
}

//=====================================================
// End of file
//=====================================================
