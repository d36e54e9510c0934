//=====================================================
// File: interpreter/patterns.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Pattern matching
// Objective: Test values against tuple, array, and literal patterns and
//            collect the names they bind
//=====================================================

use crate::ast::{Literal, Pattern};

use super::value::Value;

pub type Bindings = Vec<(String, Value)>;

pub fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Number(n) => Value::Number(*n),
        Literal::String(s) => Value::string(s),
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Null => Value::Null,
        Literal::Unit => Value::Unit,
    }
}

//Function: match_pattern
//Purpose: Match `value` against `pattern`
//Inputs: pattern: &Pattern, value: &Value
//Returns: Option<Bindings> (None when the pattern does not fit)
pub fn match_pattern(pattern: &Pattern, value: &Value) -> Option<Bindings> {
    let mut bound = Vec::new();
    bind(pattern, value, &mut bound).then_some(bound)
}

fn bind(pattern: &Pattern, value: &Value, out: &mut Bindings) -> bool {
    match pattern {
        Pattern::Wildcard | Pattern::Rest => true,
        Pattern::Bind(name) => {
            out.push((name.clone(), value.clone()));
            true
        }
        Pattern::Literal(literal) => literal_value(literal).equals(value),
        Pattern::Tuple(items) => match value {
            Value::Tuple(_) | Value::Entity(_) | Value::Array(_) => {
                value.positional().is_some_and(|elements| bind_sequence(items, &elements, out))
            }
            _ => false,
        },
        Pattern::Array(items) => match value {
            Value::Array(_) | Value::Tuple(_) => {
                value.positional().is_some_and(|elements| bind_sequence(items, &elements, out))
            }
            _ => false,
        },
    }
}

/// Positional match where a single `..` absorbs the contiguous remainder.
fn bind_sequence(items: &[Pattern], elements: &[Value], out: &mut Bindings) -> bool {
    match items.iter().position(|item| matches!(item, Pattern::Rest)) {
        None => {
            items.len() == elements.len()
                && items.iter().zip(elements).all(|(item, element)| bind(item, element, out))
        }
        Some(rest) => {
            let head = &items[..rest];
            let tail = &items[rest + 1..];
            if head.len() + tail.len() > elements.len() {
                return false;
            }
            let tail_start = elements.len() - tail.len();
            head.iter().zip(elements).all(|(item, element)| bind(item, element, out))
                && tail
                    .iter()
                    .zip(&elements[tail_start..])
                    .all(|(item, element)| bind(item, element, out))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuple(items: Vec<Value>) -> Value {
        Value::tuple(items)
    }

    #[test]
    fn rest_skips_the_middle() {
        let pattern = Pattern::Tuple(vec![
            Pattern::Bind("age".into()),
            Pattern::Rest,
            Pattern::Tuple(vec![Pattern::Wildcard, Pattern::Bind("last".into())]),
        ]);
        let value = tuple(vec![
            47.into(),
            168.into(),
            "male".into(),
            tuple(vec!["will".into(), "zhang".into()]),
        ]);
        let bound = match_pattern(&pattern, &value).expect("matches");
        assert_eq!(bound[0], ("age".to_string(), Value::from(47)));
        assert_eq!(bound[1], ("last".to_string(), Value::from("zhang")));
    }

    #[test]
    fn arity_must_agree_without_rest() {
        let pattern = Pattern::Tuple(vec![Pattern::Wildcard, Pattern::Wildcard]);
        assert!(match_pattern(&pattern, &tuple(vec![1.into(), 2.into(), 3.into()])).is_none());
    }

    #[test]
    fn literals_compare_by_value() {
        let pattern = Pattern::Tuple(vec![
            Pattern::Literal(Literal::Number(1.0)),
            Pattern::Bind("b".into()),
            Pattern::Wildcard,
        ]);
        let hit = match_pattern(&pattern, &tuple(vec![1.into(), 2.into(), 3.into()]));
        assert_eq!(hit, Some(vec![("b".to_string(), Value::from(2))]));
        assert!(match_pattern(&pattern, &tuple(vec![2.into(), 2.into(), 3.into()])).is_none());
        assert!(match_pattern(&Pattern::Literal(Literal::String("2".into())), &"2".into()).is_some());
    }

    #[test]
    fn scalars_never_fit_positional_patterns() {
        let pattern = Pattern::Array(vec![Pattern::Rest]);
        assert!(match_pattern(&pattern, &Value::from(3)).is_none());
        assert!(match_pattern(&pattern, &Value::array(vec![])).is_some());
    }
}

//=====================================================
// End of file
//=====================================================
