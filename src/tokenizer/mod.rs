//=====================================================
// File: tokenizer/mod.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: OhScript lexical analysis
// Objective: Convert UTF-8 source text into a finite, position-tagged token
//            stream consumed by the parser
//=====================================================

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

//=====================================================
//            Section 1: Positions & Tokens
//=====================================================

/// Location of a token in the source text. `offset` counts chars, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl Position {
    pub fn new(line: usize, column: usize, offset: usize) -> Self {
        Self {
            line,
            column,
            offset,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// All terminal categories of OhScript.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Number(f64),
    String(String),
    Identifier(String),

    // Keywords
    Let,
    Var,
    Func,
    If,
    Else,
    While,
    Do,
    For,
    Each,
    In,
    Match,
    Return,
    Break,
    Continue,
    Import,
    Export,
    From,
    As,
    Namespace,
    Async,
    Safe,
    Try,
    Lock,
    This,
    Base,
    True,
    False,
    Null,
    Ext,

    // Arithmetic & assignment
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    PlusPlus,
    MinusMinus,
    Equal,
    PlusEqual,
    MinusEqual,
    StarEqual,
    SlashEqual,
    PercentEqual,

    // Comparison & logic
    EqualEqual,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Subtype,
    AndAnd,
    OrOr,
    Not,

    // Bitwise
    Amp,
    Bar,
    Caret,
    Tilde,
    ShiftLeft,

    // Structural
    PipeForward,
    ColonColon,
    DotDot,
    FatArrow,
    Question,
    Colon,
    Comma,
    Semicolon,
    Dot,
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,

    Eof,
}

impl TokenKind {
    pub fn is_keyword(&self) -> bool {
        KEYWORDS.values().any(|kind| kind == self)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Number(n) => write!(f, "{}", n),
            TokenKind::String(s) => write!(f, "\"{}\"", s),
            TokenKind::Identifier(s) => write!(f, "{}", s),
            TokenKind::Eof => write!(f, "end of input"),
            other => write!(f, "{:?}", other),
        }
    }
}

/// A token with its kind, raw lexeme, and start/end positions.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub position: Position,
    pub end: usize,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, position: Position, end: usize) -> Self {
        Self {
            kind,
            lexeme: lexeme.into(),
            position,
            end,
        }
    }

    pub fn line(&self) -> usize {
        self.position.line
    }

    pub fn start(&self) -> usize {
        self.position.offset
    }
}

//=====================================================
//            Section 2: Lexical Errors
//=====================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LexError {
    #[error("unterminated string literal starting at {0}")]
    UnterminatedString(Position),
    #[error("unterminated block comment starting at {0}")]
    UnterminatedComment(Position),
    #[error("illegal character '{ch}' at {position}")]
    IllegalCharacter { ch: char, position: Position },
    #[error("invalid escape sequence '\\{ch}' at {position}")]
    InvalidEscape { ch: char, position: Position },
    #[error("malformed number '{text}' at {position}")]
    InvalidNumber { text: String, position: Position },
}

impl LexError {
    pub fn position(&self) -> Position {
        match self {
            LexError::UnterminatedString(position) | LexError::UnterminatedComment(position) => {
                *position
            }
            LexError::IllegalCharacter { position, .. }
            | LexError::InvalidEscape { position, .. }
            | LexError::InvalidNumber { position, .. } => *position,
        }
    }
}

//=====================================================
//            Section 3: Keyword & Operator Tables
//=====================================================

static KEYWORDS: Lazy<HashMap<&'static str, TokenKind>> = Lazy::new(|| {
    HashMap::from([
        ("let", TokenKind::Let),
        ("var", TokenKind::Var),
        ("func", TokenKind::Func),
        ("if", TokenKind::If),
        ("else", TokenKind::Else),
        ("while", TokenKind::While),
        ("do", TokenKind::Do),
        ("for", TokenKind::For),
        ("each", TokenKind::Each),
        ("in", TokenKind::In),
        ("match", TokenKind::Match),
        ("return", TokenKind::Return),
        ("break", TokenKind::Break),
        ("continue", TokenKind::Continue),
        ("import", TokenKind::Import),
        ("export", TokenKind::Export),
        ("from", TokenKind::From),
        ("as", TokenKind::As),
        ("namespace", TokenKind::Namespace),
        ("async", TokenKind::Async),
        ("safe", TokenKind::Safe),
        ("try", TokenKind::Try),
        ("lock", TokenKind::Lock),
        ("this", TokenKind::This),
        ("base", TokenKind::Base),
        ("true", TokenKind::True),
        ("false", TokenKind::False),
        ("null", TokenKind::Null),
        ("ext", TokenKind::Ext),
    ])
});

// Longest match first within each leading character.
static OPERATORS: &[(&str, TokenKind)] = &[
    ("++", TokenKind::PlusPlus),
    ("+=", TokenKind::PlusEqual),
    ("+", TokenKind::Plus),
    ("--", TokenKind::MinusMinus),
    ("-=", TokenKind::MinusEqual),
    ("-", TokenKind::Minus),
    ("*=", TokenKind::StarEqual),
    ("*", TokenKind::Star),
    ("/=", TokenKind::SlashEqual),
    ("/", TokenKind::Slash),
    ("%=", TokenKind::PercentEqual),
    ("%", TokenKind::Percent),
    ("==", TokenKind::EqualEqual),
    ("=>", TokenKind::FatArrow),
    ("=", TokenKind::Equal),
    ("!=", TokenKind::NotEqual),
    ("!", TokenKind::Not),
    ("<=", TokenKind::LessEqual),
    ("<:", TokenKind::Subtype),
    ("<<", TokenKind::ShiftLeft),
    ("<", TokenKind::Less),
    (">=", TokenKind::GreaterEqual),
    (">>", TokenKind::PipeForward),
    (">", TokenKind::Greater),
    ("&&", TokenKind::AndAnd),
    ("&", TokenKind::Amp),
    ("||", TokenKind::OrOr),
    ("|", TokenKind::Bar),
    ("^", TokenKind::Caret),
    ("~", TokenKind::Tilde),
    ("::", TokenKind::ColonColon),
    (":", TokenKind::Colon),
    ("..", TokenKind::DotDot),
    (".", TokenKind::Dot),
    ("?", TokenKind::Question),
    (",", TokenKind::Comma),
    (";", TokenKind::Semicolon),
    ("(", TokenKind::LeftParen),
    (")", TokenKind::RightParen),
    ("[", TokenKind::LeftBracket),
    ("]", TokenKind::RightBracket),
    ("{", TokenKind::LeftBrace),
    ("}", TokenKind::RightBrace),
];

//=====================================================
//            Section 4: Tokenizer
//=====================================================

/// Tokenizer for OhScript. Each call to [`Tokenizer::tokenize`] restarts from
/// the beginning of the input.
pub struct Tokenizer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
}

/// Convenience wrapper over [`Tokenizer::tokenize`].
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    Tokenizer::new(source).tokenize()
}

impl Tokenizer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
        }
    }

    //Function: tokenize
    //Purpose: Scan the whole input into tokens terminated by Eof
    //Inputs: &mut self
    //Returns: Result<Vec<Token>, LexError>
    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexError> {
        self.position = 0;
        self.line = 1;
        self.column = 1;
        self.tokens.clear();

        loop {
            self.skip_trivia()?;
            if self.is_at_end() {
                break;
            }

            let ch = self.current_char();
            if ch == '"' || ch == '\'' {
                self.handle_string(ch)?;
            } else if ch.is_ascii_digit() {
                self.handle_number()?;
            } else if ch.is_alphabetic() || ch == '_' {
                self.handle_identifier();
            } else {
                self.handle_operator()?;
            }
        }

        let eof = self.current_position();
        self.tokens
            .push(Token::new(TokenKind::Eof, "", eof, self.position));
        Ok(std::mem::take(&mut self.tokens))
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    fn current_char(&self) -> char {
        self.input.get(self.position).copied().unwrap_or('\0')
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn advance(&mut self) -> char {
        let ch = self.current_char();
        self.position += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        ch
    }

    fn current_position(&self) -> Position {
        Position::new(self.line, self.column, self.position)
    }

    fn emit(&mut self, kind: TokenKind, start: Position) {
        let lexeme: String = self.input[start.offset..self.position].iter().collect();
        self.tokens
            .push(Token::new(kind, lexeme, start, self.position));
    }

    fn previous_kind(&self) -> Option<&TokenKind> {
        self.tokens.last().map(|token| &token.kind)
    }

    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            while !self.is_at_end() && self.current_char().is_whitespace() {
                self.advance();
            }
            if self.current_char() == '/' && self.peek_char() == Some('/') {
                while !self.is_at_end() && self.current_char() != '\n' {
                    self.advance();
                }
                continue;
            }
            if self.current_char() == '/' && self.peek_char() == Some('*') {
                let start = self.current_position();
                self.advance();
                self.advance();
                loop {
                    if self.is_at_end() {
                        return Err(LexError::UnterminatedComment(start));
                    }
                    if self.current_char() == '*' && self.peek_char() == Some('/') {
                        self.advance();
                        self.advance();
                        break;
                    }
                    self.advance();
                }
                continue;
            }
            return Ok(());
        }
    }

    fn handle_string(&mut self, quote: char) -> Result<(), LexError> {
        let start = self.current_position();
        self.advance();

        let mut value = String::new();
        loop {
            if self.is_at_end() {
                return Err(LexError::UnterminatedString(start));
            }
            let ch = self.advance();
            if ch == quote {
                break;
            }
            if ch != '\\' {
                value.push(ch);
                continue;
            }
            if self.is_at_end() {
                return Err(LexError::UnterminatedString(start));
            }
            let escape_position = self.current_position();
            let escaped = self.advance();
            match escaped {
                'n' => value.push('\n'),
                't' => value.push('\t'),
                'r' => value.push('\r'),
                '0' => value.push('\0'),
                '\\' => value.push('\\'),
                '"' => value.push('"'),
                '\'' => value.push('\''),
                'u' => value.push(self.handle_unicode_escape(escape_position)?),
                other => {
                    return Err(LexError::InvalidEscape {
                        ch: other,
                        position: escape_position,
                    });
                }
            }
        }

        self.emit(TokenKind::String(value), start);
        Ok(())
    }

    fn handle_unicode_escape(&mut self, position: Position) -> Result<char, LexError> {
        let invalid = LexError::InvalidEscape { ch: 'u', position };
        if self.current_char() != '{' {
            return Err(invalid);
        }
        self.advance();
        let mut digits = String::new();
        while !self.is_at_end() && self.current_char() != '}' {
            digits.push(self.advance());
        }
        if self.is_at_end() {
            return Err(invalid);
        }
        self.advance();
        u32::from_str_radix(&digits, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or(invalid)
    }

    fn handle_number(&mut self) -> Result<(), LexError> {
        let start = self.current_position();
        // `t.1.0` is two tuple accesses, not the float 1.0
        let integer_only = matches!(self.previous_kind(), Some(TokenKind::Dot));

        let mut text = String::new();
        while self.current_char().is_ascii_digit() {
            text.push(self.advance());
        }

        if !integer_only
            && self.current_char() == '.'
            && self.peek_char().is_some_and(|c| c.is_ascii_digit())
        {
            text.push(self.advance());
            while self.current_char().is_ascii_digit() {
                text.push(self.advance());
            }
        }

        if !integer_only && matches!(self.current_char(), 'e' | 'E') {
            let sign = self.peek_char();
            let exponent_follows = match sign {
                Some('+') | Some('-') => self
                    .input
                    .get(self.position + 2)
                    .is_some_and(|c| c.is_ascii_digit()),
                Some(c) => c.is_ascii_digit(),
                None => false,
            };
            if exponent_follows {
                text.push(self.advance());
                if matches!(self.current_char(), '+' | '-') {
                    text.push(self.advance());
                }
                while self.current_char().is_ascii_digit() {
                    text.push(self.advance());
                }
            }
        }

        let value: f64 = text.parse().map_err(|_| LexError::InvalidNumber {
            text: text.clone(),
            position: start,
        })?;
        self.emit(TokenKind::Number(value), start);
        Ok(())
    }

    fn handle_identifier(&mut self) {
        let start = self.current_position();
        let mut ident = String::new();
        while !self.is_at_end()
            && (self.current_char().is_alphanumeric() || self.current_char() == '_')
        {
            ident.push(self.advance());
        }

        let kind = KEYWORDS
            .get(ident.as_str())
            .cloned()
            .unwrap_or(TokenKind::Identifier(ident));
        self.emit(kind, start);
    }

    fn handle_operator(&mut self) -> Result<(), LexError> {
        let start = self.current_position();
        let rest = &self.input[self.position..];

        for (text, kind) in OPERATORS {
            let width = text.chars().count();
            if rest.len() >= width && text.chars().zip(rest.iter()).all(|(a, b)| a == *b) {
                for _ in 0..width {
                    self.advance();
                }
                self.emit(kind.clone(), start);
                return Ok(());
            }
        }

        Err(LexError::IllegalCharacter {
            ch: self.current_char(),
            position: start,
        })
    }
}

//=====================================================
//            Section 5: Tests
//=====================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .expect("source should tokenize")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn multi_character_operators_are_single_tokens() {
        assert_eq!(
            kinds("a++ >> b::c .. <: += => --"),
            vec![
                TokenKind::Identifier("a".into()),
                TokenKind::PlusPlus,
                TokenKind::PipeForward,
                TokenKind::Identifier("b".into()),
                TokenKind::ColonColon,
                TokenKind::Identifier("c".into()),
                TokenKind::DotDot,
                TokenKind::Subtype,
                TokenKind::PlusEqual,
                TokenKind::FatArrow,
                TokenKind::MinusMinus,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn numbers_and_tuple_indices() {
        assert_eq!(
            kinds("3.25 me.1.0 1e3"),
            vec![
                TokenKind::Number(3.25),
                TokenKind::Identifier("me".into()),
                TokenKind::Dot,
                TokenKind::Number(1.0),
                TokenKind::Dot,
                TokenKind::Number(0.0),
                TokenKind::Number(1000.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn strings_accept_both_quotes_and_escapes() {
        assert_eq!(
            kinds(r#""a\"b" 'it\'s' "\u{41}\n""#),
            vec![
                TokenKind::String("a\"b".into()),
                TokenKind::String("it's".into()),
                TokenKind::String("A\n".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            kinds("let /* inner */ a = 1; // trailing\n"),
            vec![
                TokenKind::Let,
                TokenKind::Identifier("a".into()),
                TokenKind::Equal,
                TokenKind::Number(1.0),
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn unterminated_string_reports_location() {
        let err = tokenize("let a = 1;\n  \"open").expect_err("should fail");
        assert_eq!(err, LexError::UnterminatedString(Position::new(2, 3, 13)));
    }

    #[test]
    fn illegal_character_reports_location() {
        let err = tokenize("a # b").expect_err("should fail");
        assert_eq!(err.position().column, 3);
    }

    #[test]
    fn tokens_carry_lexeme_and_span() {
        let tokens = tokenize("  foo").expect("tokenize");
        assert_eq!(tokens[0].lexeme, "foo");
        assert_eq!(tokens[0].start(), 2);
        assert_eq!(tokens[0].end, 5);
        assert_eq!(tokens[0].line(), 1);
    }
}

//=====================================================
// End of file
//=====================================================
