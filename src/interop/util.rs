//=====================================================
// File: interop/util.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: JSON helpers for the interop bridge
// Objective: Parse lenient JSON text and convert between JSON documents and
//            host values
//=====================================================

use serde_json::Value as JsonValue;

use super::{HostError, HostValue};

/// Rewrite single-quoted strings as double-quoted ones so that
/// `{'name':'will'}` parses like `{"name":"will"}`.
fn normalize_quotes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut quote: Option<char> = None;
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        match quote {
            None => {
                if ch == '\'' {
                    quote = Some('\'');
                    out.push('"');
                } else {
                    if ch == '"' {
                        quote = Some('"');
                    }
                    out.push(ch);
                }
            }
            Some(open) => match ch {
                '\\' => {
                    match chars.next() {
                        Some('\'') if open == '\'' => out.push('\''),
                        Some(next) => {
                            out.push('\\');
                            out.push(next);
                        }
                        None => out.push('\\'),
                    }
                }
                '"' if open == '\'' => out.push_str("\\\""),
                c if c == open => {
                    quote = None;
                    out.push('"');
                }
                c => out.push(c),
            },
        }
    }
    out
}

//Function: parse_lenient
//Purpose: Parse JSON text, accepting single-quoted strings
//Inputs: text: &str
//Returns: Result<JsonValue, serde_json::Error>
pub fn parse_lenient(text: &str) -> Result<JsonValue, serde_json::Error> {
    match serde_json::from_str(text) {
        Ok(json) => Ok(json),
        Err(strict) => serde_json::from_str(&normalize_quotes(text)).map_err(|_| strict),
    }
}

pub fn json_to_host(json: &JsonValue) -> HostValue {
    match json {
        JsonValue::Null => HostValue::Null,
        JsonValue::Bool(b) => HostValue::Bool(*b),
        JsonValue::Number(num) => HostValue::Number(num.as_f64().unwrap_or_default()),
        JsonValue::String(s) => HostValue::String(s.clone()),
        JsonValue::Array(items) => HostValue::List(items.iter().map(json_to_host).collect()),
        JsonValue::Object(map) => HostValue::Map(
            map.iter()
                .map(|(key, value)| (key.clone(), json_to_host(value)))
                .collect(),
        ),
    }
}

pub fn host_to_json(value: &HostValue) -> Result<JsonValue, HostError> {
    Ok(match value {
        HostValue::Null => JsonValue::Null,
        HostValue::Bool(b) => JsonValue::Bool(*b),
        HostValue::Number(n) => {
            if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                JsonValue::Number((*n as i64).into())
            } else {
                serde_json::Number::from_f64(*n)
                    .map(JsonValue::Number)
                    .unwrap_or(JsonValue::Null)
            }
        }
        HostValue::String(s) => JsonValue::String(s.clone()),
        HostValue::List(items) => {
            JsonValue::Array(items.iter().map(host_to_json).collect::<Result<_, _>>()?)
        }
        HostValue::Map(entries) => {
            let mut map = serde_json::Map::new();
            for (key, value) in entries {
                map.insert(key.clone(), host_to_json(value)?);
            }
            JsonValue::Object(map)
        }
        HostValue::Object(object) => {
            return Err(HostError::Failed(format!(
                "{} cannot be written as JSON",
                object.type_name()
            )))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_quotes_are_accepted() {
        let json = parse_lenient("{'name':'will', 'age': 47}").expect("lenient");
        assert_eq!(json["name"], "will");
        assert_eq!(json["age"], 47);
    }

    #[test]
    fn double_quotes_inside_single_quoted_strings_survive() {
        let json = parse_lenient(r#"{'quote':'say "hi"', 'it':'it\'s'}"#).expect("lenient");
        assert_eq!(json["quote"], "say \"hi\"");
        assert_eq!(json["it"], "it's");
    }

    #[test]
    fn invalid_text_reports_the_strict_error() {
        assert!(parse_lenient("{name:}").is_err());
    }

    #[test]
    fn integral_numbers_serialize_without_fraction() {
        let json = host_to_json(&HostValue::map([("n", HostValue::Number(3.0))])).expect("json");
        assert_eq!(json.to_string(), r#"{"n":3}"#);
        assert_eq!(json_to_host(&json).get("n"), Some(&HostValue::Number(3.0)));
    }
}

//=====================================================
// End of file
//=====================================================
