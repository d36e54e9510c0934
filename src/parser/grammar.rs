//=====================================================
// File: parser/grammar.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: OhScript operator table and grammar policies
// Objective: Keep precedence, associativity, and disambiguation rules in one
//            table the parser consults instead of scattering them through
//            the recursive-descent code
//=====================================================

//! Grammar policies
//!
//! * `(x)` is `x`: a single parenthesised element unwraps to that element.
//! * `(x, y)` is a 2-tuple; `()` is unit.
//! * `{` opens an entity literal when followed by `}` or by `name :`;
//!   anything else opens a block.
//! * `Name{...}` constructs a host class only when `Name` is capitalised, and
//!   never inside `each ... in <expr>` / `match <expr>` / loop headers.
//! * Inside a match arm body `|` starts the next arm, so bitwise-or is not
//!   available there without parentheses.
//! * `match` at the start of a statement is a match statement whose arms may
//!   complete the enclosing body; anywhere else it is a match expression.
//! * Assignment and `?:` are right-associative; every binary operator in
//!   [`INFIX_TABLE`] is left-associative.

use crate::ast::BinaryOp;
use crate::tokenizer::TokenKind;

/// Binding strength, higher binds tighter.
pub type Precedence = u8;

pub const PIPE: Precedence = 1;
pub const LOGICAL_OR: Precedence = 2;
pub const LOGICAL_AND: Precedence = 3;
pub const BIT_OR: Precedence = 4;
pub const BIT_XOR: Precedence = 5;
pub const BIT_AND: Precedence = 6;
pub const EQUALITY: Precedence = 7;
pub const COMPARISON: Precedence = 8;
pub const SHIFT: Precedence = 9;
pub const ADDITIVE: Precedence = 10;
pub const MULTIPLICATIVE: Precedence = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Infix {
    Binary(BinaryOp),
    /// `value >> function`
    Pipe,
    /// `value <: typename`
    TypeTest,
}

pub static INFIX_TABLE: &[(TokenKind, Infix, Precedence)] = &[
    (TokenKind::PipeForward, Infix::Pipe, PIPE),
    (TokenKind::OrOr, Infix::Binary(BinaryOp::Or), LOGICAL_OR),
    (TokenKind::AndAnd, Infix::Binary(BinaryOp::And), LOGICAL_AND),
    (TokenKind::Bar, Infix::Binary(BinaryOp::BitOr), BIT_OR),
    (TokenKind::Caret, Infix::Binary(BinaryOp::BitXor), BIT_XOR),
    (TokenKind::Amp, Infix::Binary(BinaryOp::BitAnd), BIT_AND),
    (TokenKind::EqualEqual, Infix::Binary(BinaryOp::Equal), EQUALITY),
    (TokenKind::NotEqual, Infix::Binary(BinaryOp::NotEqual), EQUALITY),
    (TokenKind::Less, Infix::Binary(BinaryOp::Less), COMPARISON),
    (TokenKind::LessEqual, Infix::Binary(BinaryOp::LessEqual), COMPARISON),
    (TokenKind::Greater, Infix::Binary(BinaryOp::Greater), COMPARISON),
    (TokenKind::GreaterEqual, Infix::Binary(BinaryOp::GreaterEqual), COMPARISON),
    (TokenKind::Subtype, Infix::TypeTest, COMPARISON),
    (TokenKind::ShiftLeft, Infix::Binary(BinaryOp::ShiftLeft), SHIFT),
    (TokenKind::Plus, Infix::Binary(BinaryOp::Add), ADDITIVE),
    (TokenKind::Minus, Infix::Binary(BinaryOp::Subtract), ADDITIVE),
    (TokenKind::Star, Infix::Binary(BinaryOp::Multiply), MULTIPLICATIVE),
    (TokenKind::Slash, Infix::Binary(BinaryOp::Divide), MULTIPLICATIVE),
    (TokenKind::Percent, Infix::Binary(BinaryOp::Modulo), MULTIPLICATIVE),
];

pub fn infix(kind: &TokenKind) -> Option<(Infix, Precedence)> {
    INFIX_TABLE
        .iter()
        .find(|(token, _, _)| token == kind)
        .map(|(_, infix, precedence)| (*infix, *precedence))
}

pub fn assignment(kind: &TokenKind) -> Option<crate::ast::AssignOp> {
    use crate::ast::AssignOp;
    Some(match kind {
        TokenKind::Equal => AssignOp::Assign,
        TokenKind::PlusEqual => AssignOp::Add,
        TokenKind::MinusEqual => AssignOp::Subtract,
        TokenKind::StarEqual => AssignOp::Multiply,
        TokenKind::SlashEqual => AssignOp::Divide,
        TokenKind::PercentEqual => AssignOp::Modulo,
        _ => return None,
    })
}

/// Whether `name` may start a `Name{...}` host-class construction.
pub fn is_class_name(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiplicative_binds_tighter_than_additive() {
        let (_, add) = infix(&TokenKind::Plus).expect("plus");
        let (_, mul) = infix(&TokenKind::Star).expect("star");
        assert!(mul > add);
    }

    #[test]
    fn pipe_is_loosest_infix() {
        let loosest = INFIX_TABLE.iter().map(|(_, _, p)| *p).min();
        assert_eq!(loosest, Some(PIPE));
        assert_eq!(infix(&TokenKind::PipeForward), Some((Infix::Pipe, PIPE)));
    }

    #[test]
    fn class_names_are_capitalised() {
        assert!(is_class_name("Woman"));
        assert!(!is_class_name("woman"));
        assert!(!is_class_name("_Woman"));
    }
}

//=====================================================
// End of file
//=====================================================
