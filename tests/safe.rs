mod util;

use ohscript::Value;
use util::{num, run, run_panic, text};

#[test]
fn test_safe_captures_panic_code() {
    assert_eq!(run("func f1(){ext::a()}; let result = safe{f1()}; result.panic_code()"), num(106));
}

#[test]
fn test_safe_get_ignores_failure() {
    assert_eq!(run("func f1(){ext::a()}; let result = safe{f1()}; result.get()"), Value::Null);
}

#[test]
fn test_safe_success() {
    let source = "func f1(){100}; let result = safe{f1()}; if(!result.panic_code()){result.get()}";
    assert_eq!(run(source), num(100));
}

#[test]
fn test_try_alias_and_message() {
    assert_eq!(run("let r = try{panic(\"bad input\")}; r.panic_message()"), text("bad input"));
    assert_eq!(run("let r = try{1/0}; r.panic_code()"), num(108));
}

#[test]
fn test_uncaught_panic_propagates() {
    let panic = run_panic("func f1(){ext::a()}; let result = f1();");
    assert_eq!(panic.code(), 106);
    assert!(panic.message.contains('a'), "{}", panic.message);
}
