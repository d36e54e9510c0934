mod util;

use ohscript::Value;
use util::{num, run, run_panic, text};

#[test]
fn test_await_returns_task_value() {
    let source = "let promise = async{log(\"before sleeping...\"); sleep(10); log(\"after sleeping...\"); 100}; \
log(\"main threading...\"); promise.await()";
    assert_eq!(run(source), num(100));
}

#[test]
fn test_then_runs_continuation() {
    let source = "let promise = async{sleep(100); 100}; var r = 0; \
promise.then(result=>{r = result}); while(r==0){sleep(10);} r";
    assert_eq!(run(source), num(100));
}

#[test]
fn test_then_continuation_runs_exactly_once() {
    let source = "var hits=0; let q = async{sleep(20); 5}; q.then(v=>{hits+=1}); \
q.await(); sleep(50); let first = hits; q.then(v=>{hits+=1}); first*10+hits";
    assert_eq!(run(source), num(12));
}

#[test]
fn test_then_chains_promises() {
    let source = "let first = async{20}; let second = first.then(x=>x+1); second.await()";
    assert_eq!(run(source), num(21));
}

#[test]
fn test_async_is_a_promise() {
    assert_eq!(run("let p = async{1}; p<:promise"), Value::Bool(true));
}

#[test]
fn test_task_panics_surface_on_await() {
    assert_eq!(run_panic("let p = async{panic(7, \"boom\")}; p.await()").code(), 7);
    let source = "let p = async{missing_name}; let s = safe{p.await()}; s.panic_code()";
    assert_eq!(run(source), num(106));
}

#[test]
fn test_parallel_with_lock() {
    let source = "let a=[1,2,3,4]; var c=0; warning(\"parallel starts....\"); \
a.parallel(i=>{lock{c+=i}}); warning(\"parallel ends....\"); c";
    assert_eq!(run(source), num(10));
}

#[test]
fn test_lock_serialises_read_sleep_write() {
    let global = "let a=[1,2,3,4]; var c=0; a.parallel(i=>{lock{let v=c; sleep(20); c=v+i}}); c";
    assert_eq!(run(global), num(10));
    let keyed = "let a=[1,2,3,4]; var c=0; a.parallel(i=>{lock(\"c\"){let v=c; sleep(20); c=v+i}}); c";
    assert_eq!(run(keyed), num(10));
}

#[test]
fn test_parallel_collects_results_in_order() {
    assert_eq!(run("[1,2,3].parallel(x=>{sleep(30-x*10); x*2}).join(\",\")"), text("2,4,6"));
}

#[test]
fn test_keyed_locks() {
    let source = "var total=0; let tasks=[1,2,3,4,5].map(i=>async{lock(\"total\"){total+=i}}); \
tasks.forEach(t=>t.await()); total";
    assert_eq!(run(source), num(15));
}

#[test]
fn test_lock_yields_body_value() {
    assert_eq!(run("let v = lock{let x = 2; x*21}; v"), num(42));
}
