//=====================================================
// File: analyzer/types.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: OhScript type expressions
// Objective: Describe inferred static shapes and unify them, with Error as
//            an absorbing element that silences cascading diagnostics
//=====================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ast::{Literal, TypeName};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeExpr {
    Number,
    String,
    Bool,
    Unit,
    Null,
    Array(Box<TypeExpr>),
    Tuple(Vec<TypeExpr>),
    Map(Box<TypeExpr>),
    /// Members in declaration order.
    Entity(Vec<(String, TypeExpr)>),
    Function {
        params: Vec<TypeExpr>,
        ret: Box<TypeExpr>,
    },
    Promise(Box<TypeExpr>),
    Error,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot unify {left} with {right}")]
pub struct TypeMismatch {
    pub left: TypeExpr,
    pub right: TypeExpr,
}

impl TypeExpr {
    pub fn of_literal(literal: &Literal) -> Self {
        match literal {
            Literal::Number(_) => TypeExpr::Number,
            Literal::String(_) => TypeExpr::String,
            Literal::Bool(_) => TypeExpr::Bool,
            Literal::Null => TypeExpr::Null,
            Literal::Unit => TypeExpr::Unit,
        }
    }

    pub fn function(arity: usize, ret: TypeExpr) -> Self {
        TypeExpr::Function {
            params: vec![TypeExpr::Unknown; arity],
            ret: Box::new(ret),
        }
    }

    /// Dynamic or already-reported shapes that must not raise new warnings.
    pub fn is_indeterminate(&self) -> bool {
        matches!(self, TypeExpr::Unknown | TypeExpr::Error)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, TypeExpr::Number) || self.is_indeterminate()
    }

    pub fn member(&self, name: &str) -> Option<&TypeExpr> {
        match self {
            TypeExpr::Entity(members) => members
                .iter()
                .find(|(member, _)| member == name)
                .map(|(_, ty)| ty),
            _ => None,
        }
    }

    /// Result type of calling a value of this type with `argc` arguments.
    /// Fewer arguments than parameters yield the curried remainder.
    pub fn call_result(&self, argc: usize) -> Option<TypeExpr> {
        match self {
            TypeExpr::Function { params, ret } if argc < params.len() => {
                Some(TypeExpr::Function {
                    params: params[argc..].to_vec(),
                    ret: ret.clone(),
                })
            }
            TypeExpr::Function { params, ret } if argc == params.len() => Some((**ret).clone()),
            TypeExpr::Function { .. } => None,
            TypeExpr::Error => Some(TypeExpr::Error),
            _ => Some(TypeExpr::Unknown),
        }
    }

    /// Static counterpart of the `<:` test, when decidable.
    pub fn satisfies(&self, name: TypeName) -> Option<bool> {
        let verdict = match (self, name) {
            (TypeExpr::Unknown | TypeExpr::Error, _) => return None,
            (TypeExpr::Number, TypeName::Number)
            | (TypeExpr::String, TypeName::String)
            | (TypeExpr::Bool, TypeName::Bool)
            | (TypeExpr::Unit, TypeName::Unit)
            | (TypeExpr::Null, TypeName::Null)
            | (TypeExpr::Array(_), TypeName::Array)
            | (TypeExpr::Tuple(_), TypeName::Tuple)
            | (TypeExpr::Map(_), TypeName::Map)
            | (TypeExpr::Entity(_), TypeName::Object)
            | (TypeExpr::Function { .. }, TypeName::Function)
            | (TypeExpr::Promise(_), TypeName::Promise) => true,
            _ => false,
        };
        Some(verdict)
    }
}

//Function: unify
//Purpose: Compute the common shape of two type expressions
//Inputs: left: &TypeExpr, right: &TypeExpr
//Returns: Result<TypeExpr, TypeMismatch>
pub fn unify(left: &TypeExpr, right: &TypeExpr) -> Result<TypeExpr, TypeMismatch> {
    use TypeExpr::*;
    let mismatch = || TypeMismatch {
        left: left.clone(),
        right: right.clone(),
    };
    match (left, right) {
        (Error, _) | (_, Error) => Ok(Error),
        (Unknown, other) | (other, Unknown) => Ok(other.clone()),
        (Null, other) | (other, Null) => Ok(other.clone()),
        (Array(a), Array(b)) => Ok(Array(Box::new(unify(a, b)?))),
        (Map(a), Map(b)) => Ok(Map(Box::new(unify(a, b)?))),
        (Promise(a), Promise(b)) => Ok(Promise(Box::new(unify(a, b)?))),
        (Tuple(a), Tuple(b)) if a.len() == b.len() => a
            .iter()
            .zip(b)
            .map(|(x, y)| unify(x, y))
            .collect::<Result<Vec<_>, _>>()
            .map(Tuple),
        (Entity(a), Entity(b)) => {
            let mut members: Vec<_> = a
                .iter()
                .map(|(name, ty)| {
                    let merged = match right.member(name) {
                        Some(other) => unify(ty, other).unwrap_or(Unknown),
                        None => ty.clone(),
                    };
                    (name.clone(), merged)
                })
                .collect();
            for (name, ty) in b {
                if left.member(name).is_none() {
                    members.push((name.clone(), ty.clone()));
                }
            }
            Ok(Entity(members))
        }
        (
            Function {
                params: pa,
                ret: ra,
            },
            Function {
                params: pb,
                ret: rb,
            },
        ) if pa.len() == pb.len() => {
            let params = pa
                .iter()
                .zip(pb)
                .map(|(x, y)| unify(x, y))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Function {
                params,
                ret: Box::new(unify(ra, rb)?),
            })
        }
        (a, b) if a == b => Ok(a.clone()),
        _ => Err(mismatch()),
    }
}

/// Unify a sequence, widening to `Unknown` on the first mismatch.
pub fn unify_all<'a>(types: impl IntoIterator<Item = &'a TypeExpr>) -> TypeExpr {
    let mut result = TypeExpr::Unknown;
    for ty in types {
        match unify(&result, ty) {
            Ok(next) => result = next,
            Err(_) => return TypeExpr::Unknown,
        }
    }
    result
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Number => f.write_str("number"),
            TypeExpr::String => f.write_str("string"),
            TypeExpr::Bool => f.write_str("bool"),
            TypeExpr::Unit => f.write_str("unit"),
            TypeExpr::Null => f.write_str("null"),
            TypeExpr::Array(inner) => write!(f, "[{}]", inner),
            TypeExpr::Tuple(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "({})", parts.join(", "))
            }
            TypeExpr::Map(inner) => write!(f, "[string: {}]", inner),
            TypeExpr::Entity(members) => {
                let parts: Vec<String> = members
                    .iter()
                    .map(|(name, ty)| format!("{}: {}", name, ty))
                    .collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
            TypeExpr::Function { params, ret } => {
                let parts: Vec<String> = params.iter().map(ToString::to_string).collect();
                write!(f, "({}) -> {}", parts.join(", "), ret)
            }
            TypeExpr::Promise(inner) => write!(f, "promise<{}>", inner),
            TypeExpr::Error => f.write_str("<error>"),
            TypeExpr::Unknown => f.write_str("?"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_absorbs_everything() {
        assert_eq!(unify(&TypeExpr::Error, &TypeExpr::Number), Ok(TypeExpr::Error));
        assert_eq!(
            unify(&TypeExpr::Array(Box::new(TypeExpr::String)), &TypeExpr::Error),
            Ok(TypeExpr::Error)
        );
    }

    #[test]
    fn unknown_takes_the_other_side() {
        assert_eq!(unify(&TypeExpr::Unknown, &TypeExpr::Bool), Ok(TypeExpr::Bool));
        assert_eq!(
            unify(
                &TypeExpr::Array(Box::new(TypeExpr::Unknown)),
                &TypeExpr::Array(Box::new(TypeExpr::Number))
            ),
            Ok(TypeExpr::Array(Box::new(TypeExpr::Number)))
        );
    }

    #[test]
    fn mismatched_scalars_fail() {
        let err = unify(&TypeExpr::Number, &TypeExpr::String).expect_err("mismatch");
        assert_eq!(err.to_string(), "cannot unify number with string");
        assert_eq!(
            unify_all([&TypeExpr::Number, &TypeExpr::String]),
            TypeExpr::Unknown
        );
    }

    #[test]
    fn entities_merge_members() {
        let a = TypeExpr::Entity(vec![("age".into(), TypeExpr::Number)]);
        let b = TypeExpr::Entity(vec![
            ("age".into(), TypeExpr::Unknown),
            ("name".into(), TypeExpr::String),
        ]);
        let merged = unify(&a, &b).expect("entities unify");
        assert_eq!(merged.member("age"), Some(&TypeExpr::Number));
        assert_eq!(merged.member("name"), Some(&TypeExpr::String));
    }

    #[test]
    fn calls_curry_function_types() {
        let f = TypeExpr::Function {
            params: vec![TypeExpr::Number, TypeExpr::String],
            ret: Box::new(TypeExpr::String),
        };
        assert_eq!(
            f.call_result(1),
            Some(TypeExpr::Function {
                params: vec![TypeExpr::String],
                ret: Box::new(TypeExpr::String),
            })
        );
        assert_eq!(f.call_result(2), Some(TypeExpr::String));
        assert_eq!(f.call_result(3), None);
    }

    #[test]
    fn display_is_readable() {
        let ty = TypeExpr::Function {
            params: vec![TypeExpr::Tuple(vec![TypeExpr::Number, TypeExpr::Bool])],
            ret: Box::new(TypeExpr::Promise(Box::new(TypeExpr::Unit))),
        };
        assert_eq!(ty.to_string(), "((number, bool)) -> promise<unit>");
    }
}

//=====================================================
// End of file
//=====================================================
