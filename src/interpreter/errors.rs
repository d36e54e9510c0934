//=====================================================
// File: interpreter/errors.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: OhScript error taxonomy
// Objective: Define script panics with stable codes, the internal control
//            flow carrier, and the host-facing ScriptError with its codes
//=====================================================

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::value::Value;
use crate::analyzer::SemanticError;
use crate::config::ConfigError;
use crate::forest::LinkError;
use crate::parser::SyntaxError;

//=====================================================
//            Section 1: Panic Codes
//=====================================================

/// Stable numeric panic code visible to scripts through `safe{}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PanicCode(pub i64);

impl PanicCode {
    pub const EXPLICIT_PANIC: PanicCode = PanicCode(1);
    pub const TYPE_MISMATCH: PanicCode = PanicCode(101);
    pub const NULL_COMPARISON: PanicCode = PanicCode(102);
    pub const NOT_CALLABLE: PanicCode = PanicCode(103);
    pub const MEMBER_NOT_FOUND: PanicCode = PanicCode(104);
    pub const INDEX_OUT_OF_BOUNDS: PanicCode = PanicCode(105);
    pub const VAR_NOT_FOUND: PanicCode = PanicCode(106);
    pub const ENTITY_NOT_FOUND: PanicCode = PanicCode(107);
    pub const DIVIDE_BY_ZERO: PanicCode = PanicCode(108);
    pub const ARGUMENT_MISMATCH: PanicCode = PanicCode(109);
    pub const EXTERNAL_FAILURE: PanicCode = PanicCode(110);
    pub const STACK_OVERFLOW: PanicCode = PanicCode(111);
    pub const TASK_FAILED: PanicCode = PanicCode(112);
    pub const REMOTE_FAILURE: PanicCode = PanicCode(113);
    pub const PATTERN_MISMATCH: PanicCode = PanicCode(114);
    pub const INVALID_OPERATION: PanicCode = PanicCode(115);

    pub fn value(self) -> i64 {
        self.0
    }

    pub fn name(self) -> Option<&'static str> {
        Some(match self {
            PanicCode::EXPLICIT_PANIC => "EXPLICIT_PANIC",
            PanicCode::TYPE_MISMATCH => "TYPE_MISMATCH",
            PanicCode::NULL_COMPARISON => "NULL_COMPARISON",
            PanicCode::NOT_CALLABLE => "NOT_CALLABLE",
            PanicCode::MEMBER_NOT_FOUND => "MEMBER_NOT_FOUND",
            PanicCode::INDEX_OUT_OF_BOUNDS => "INDEX_OUT_OF_BOUNDS",
            PanicCode::VAR_NOT_FOUND => "VAR_NOT_FOUND",
            PanicCode::ENTITY_NOT_FOUND => "ENTITY_NOT_FOUND",
            PanicCode::DIVIDE_BY_ZERO => "DIVIDE_BY_ZERO",
            PanicCode::ARGUMENT_MISMATCH => "ARGUMENT_MISMATCH",
            PanicCode::EXTERNAL_FAILURE => "EXTERNAL_FAILURE",
            PanicCode::STACK_OVERFLOW => "STACK_OVERFLOW",
            PanicCode::TASK_FAILED => "TASK_FAILED",
            PanicCode::REMOTE_FAILURE => "REMOTE_FAILURE",
            PanicCode::PATTERN_MISMATCH => "PATTERN_MISMATCH",
            PanicCode::INVALID_OPERATION => "INVALID_OPERATION",
            _ => return None,
        })
    }
}

impl fmt::Display for PanicCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}:{}", self.0, name),
            None => write!(f, "{}", self.0),
        }
    }
}

/// A script-level failure. Recoverable with `safe{}`.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("panic {code}: {message}")]
pub struct OhPanic {
    pub code: PanicCode,
    pub message: String,
}

impl OhPanic {
    pub fn new(code: PanicCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> i64 {
        self.code.value()
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::new(PanicCode::TYPE_MISMATCH, message)
    }

    pub fn member_not_found(type_name: &str, member: &str) -> Self {
        Self::new(
            PanicCode::MEMBER_NOT_FOUND,
            format!("{} has no member '{}'", type_name, member),
        )
    }

    pub fn var_not_found(name: &str) -> Self {
        Self::new(PanicCode::VAR_NOT_FOUND, format!("'{}' is not defined", name))
    }

    pub fn argument_mismatch(message: impl Into<String>) -> Self {
        Self::new(PanicCode::ARGUMENT_MISMATCH, message)
    }

    pub fn external(message: impl Into<String>) -> Self {
        Self::new(PanicCode::EXTERNAL_FAILURE, message)
    }
}

//=====================================================
//            Section 2: Evaluation Control Flow
//=====================================================

/// Everything that unwinds evaluation. Only `Panic` escapes an execution.
#[derive(Debug, Clone)]
pub enum RuntimeError {
    Panic(OhPanic),
    Return(Value),
    Break,
    Continue,
}

impl From<OhPanic> for RuntimeError {
    fn from(value: OhPanic) -> Self {
        RuntimeError::Panic(value)
    }
}

impl RuntimeError {
    /// Collapse at a function boundary: stray loop control is an error there.
    pub fn into_panic(self) -> OhPanic {
        match self {
            RuntimeError::Panic(panic) => panic,
            RuntimeError::Return(_) => OhPanic::new(
                PanicCode::INVALID_OPERATION,
                "return escaped its body",
            ),
            RuntimeError::Break | RuntimeError::Continue => OhPanic::new(
                PanicCode::INVALID_OPERATION,
                "break or continue outside of a loop",
            ),
        }
    }
}

pub type EvalResult<T = Value> = Result<T, RuntimeError>;

//=====================================================
//            Section 3: Host-facing Errors
//=====================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Syntax,
    Semantic,
    Link,
    Panic,
    Io,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Syntax => "E001",
            ErrorCode::Semantic => "E002",
            ErrorCode::Link => "E003",
            ErrorCode::Panic => "E004",
            ErrorCode::Io => "E005",
        }
    }
}

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Semantic(#[from] SemanticError),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Panic(#[from] OhPanic),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("forest image could not be decoded: {0}")]
    Decode(#[from] bincode::Error),
}

impl ScriptError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ScriptError::Syntax(_) => ErrorCode::Syntax,
            ScriptError::Semantic(_) => ErrorCode::Semantic,
            ScriptError::Link(_) => ErrorCode::Link,
            ScriptError::Panic(_) => ErrorCode::Panic,
            ScriptError::Io { .. } | ScriptError::Config(_) | ScriptError::Decode(_) => {
                ErrorCode::Io
            }
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }

    pub fn as_panic(&self) -> Option<&OhPanic> {
        match self {
            ScriptError::Panic(panic) => Some(panic),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_codes_are_stable() {
        assert_eq!(PanicCode::VAR_NOT_FOUND.value(), 106);
        assert_eq!(PanicCode::PATTERN_MISMATCH.value(), 114);
        assert_eq!(PanicCode(42).name(), None);
        assert_eq!(PanicCode::DIVIDE_BY_ZERO.to_string(), "108:DIVIDE_BY_ZERO");
    }

    #[test]
    fn loop_control_collapses_to_invalid_operation() {
        let panic = RuntimeError::Break.into_panic();
        assert_eq!(panic.code, PanicCode::INVALID_OPERATION);
        let original = OhPanic::var_not_found("a");
        assert_eq!(RuntimeError::from(original.clone()).into_panic(), original);
    }

    #[test]
    fn script_errors_map_to_codes() {
        let err = ScriptError::from(OhPanic::new(PanicCode::EXPLICIT_PANIC, "boom"));
        assert_eq!(err.code_str(), "E004");
        assert_eq!(err.as_panic().map(OhPanic::code), Some(1));
    }
}

//=====================================================
// End of file
//=====================================================
