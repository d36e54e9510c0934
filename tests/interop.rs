mod util;

use std::sync::Arc;

use parking_lot::Mutex;

use ohscript::{
    FitBroker, HostError, HostList, HostMap, HostObject, HostValue, InterfaceShape, Value,
};
use util::{engine, member, num, run, run_with, text, TicketClass, Woman, WomanClass};

fn context(entries: &[(&str, f64)]) -> HostMap {
    let map = HostMap::new();
    for (key, value) in entries {
        map.put(*key, HostValue::Number(*value));
    }
    map
}

fn human() -> InterfaceShape {
    InterfaceShape::new("Human", ["getName", "getAge"])
}

#[test]
fn test_environment_grants_shadow_forest_bindings() {
    let shared = context(&[("a", 1.0)]);
    let mut engine = engine();
    engine.grant_object("context", HostValue::object(shared.clone()));

    let env = engine
        .load("ext::context.put(\"b\",300); let a = ext::context.get(\"a\"); a")
        .expect("load");
    let custom = context(&[("a", 200.0)]);
    env.grant_object("context", HostValue::object(custom.clone()));
    assert_eq!(env.execute(Vec::new()).expect("run"), num(200));
    assert_eq!(custom.get("b"), Some(HostValue::Number(300.0)));

    let second = engine.environment(env.forest().clone(), None);
    let other = context(&[("a", 300.0)]);
    second.grant_object("context", HostValue::object(other.clone()));
    assert_eq!(second.execute(Vec::new()).expect("run"), num(300));
    assert_eq!(other.get("b"), Some(HostValue::Number(300.0)));

    let plain = engine.environment(env.forest().clone(), None);
    assert_eq!(plain.execute(Vec::new()).expect("run"), num(1));
    assert_eq!(shared.get("b"), Some(HostValue::Number(300.0)));
}

#[test]
fn test_host_methods_curry() {
    let shared = context(&[]);
    let mut engine = engine();
    engine.grant_object("context", HostValue::object(shared.clone()));
    let value = run_with(&engine, "let as1 = context.put(\"a\"); as1(150); context.get(\"a\")");
    assert_eq!(value, num(150));
    assert_eq!(shared.get("a"), Some(HostValue::Number(150.0)));
}

#[test]
fn test_host_lists_receive_mutations() {
    let source = HostList::from_items(vec!["will".into(), "zhang".into()]);
    let target = HostList::new();
    let mut engine = engine();
    engine.grant_object("source", HostValue::object(source));
    engine.grant_object("target", HostValue::object(target.clone()));
    let script = "let source = ext::source, target = ext::target; var i=0; \
while(i<source.size()){target.add(source.get(i)); i++;} target.get(1)";
    assert_eq!(run_with(&engine, script), text("zhang"));
    assert_eq!(target.len(), 2);
    assert_eq!(run_with(&engine, "ext::target.isEmpty()"), Value::Bool(false));
}

#[test]
fn test_util_object() {
    assert_eq!(
        run("let map = ext::util.newMap(); map.put(\"will\",{name:\"will\", age:47}); map.get(\"will\").name"),
        text("will")
    );
    assert_eq!(
        run("let list = util.newList(); list.add(1); list.add(2); list.size()"),
        num(2)
    );
    let source = "let json = ext::util.stringToJson(\"{'name':{'first':'will','last':'zhang'},'ok':true}\"); \
ext::util.jsonToEntity(json).name.last";
    assert_eq!(run(source), text("zhang"));
}

#[test]
fn test_json_values_from_host_strings() {
    let mut engine = engine();
    let data = HostMap::new();
    data.put(
        "businessData",
        HostValue::String("{\"key2\":{\"Key21\":\"123\"},\"n\":1.0,\"flag\":false,\"missing\":null}".into()),
    );
    engine.grant_object("userData", HostValue::object(data));
    let prefix = "let json = ext::util.stringToJson(ext::userData.get(\"businessData\")); ";
    let cases = [
        ("json.get(\"key2\").get(\"Key21\")", text("123")),
        ("json.get(\"n\") == 1", Value::Bool(true)),
        ("json.get(\"n\") != 1.1", Value::Bool(true)),
        ("json.get(\"flag\") == false", Value::Bool(true)),
        ("json.get(\"missing\") == null", Value::Bool(true)),
        ("json.get(\"key2\").get(\"Key21\").starts_with(\"12\")", Value::Bool(true)),
    ];
    for (suffix, expected) in cases {
        assert_eq!(run_with(&engine, &format!("{prefix}{suffix}")), expected, "{suffix}");
    }
    let panic = engine
        .execute(&format!("{prefix}3 > json.get(\"missing\")"), Vec::new())
        .expect_err("null comparison");
    assert_eq!(panic.as_panic().map(|panic| panic.code()), Some(102));
}

#[test]
fn test_host_class_construction() {
    let mut engine = engine();
    engine.grant_class("Woman", Arc::new(WomanClass)).expect("grant");
    assert_eq!(
        run_with(&engine, "let ivy = Woman{name:\"ivy\",age:47}; ivy.getName(\"zhao\")+ivy.getAge()"),
        text("ivy zhao47")
    );
    assert_eq!(
        run_with(&engine, "let ivy = Woman{name:\"ivy\",age:47,getAge:()=>88}; ivy.getName(\"zhao\")+ivy.getAge()"),
        text("ivy zhao88")
    );
    assert_eq!(run_with(&engine, "let ivy = Woman{name:\"ivy\",age:47}; ivy.age = 50; ivy.age"), num(50));
}

#[test]
fn test_class_aliases_must_be_capitalised() {
    let mut engine = engine();
    assert!(engine.grant_class("woman", Arc::new(WomanClass)).is_err());
}

#[test]
fn test_static_calls() {
    let mut engine = engine();
    engine.grant_class("Ticket", Arc::new(TicketClass)).expect("grant");
    let Value::External(ticket) = run_with(&engine, "let t = Ticket.create(300,\"static me\"); t") else {
        panic!("expected a host object");
    };
    assert_eq!(ticket.get_property("label"), Some(HostValue::String("static me".into())));
    assert_eq!(ticket.get_property("fix"), Some(HostValue::Number(300.0)));
    assert_eq!(run_with(&engine, "Ticket.create(1,\"x\").label()"), text("x"));
}

#[test]
fn test_host_values_cross_both_ways() {
    let source = "let m=[:]; m.put(\"me\",\"will\"); \
{_str:\"str\",_num:40,_tup:(\"will\",20),_entity:{name:\"will\",age:20},_arr:[1,2,3],_m:m,getName:first=>this._name+\" \"+first}";
    let result = run(source);
    assert_eq!(member(&result, "_num"), num(40));
    assert!(matches!(member(&result, "_tup"), Value::Tuple(_)));
    assert!(matches!(member(&result, "_m"), Value::Map(_)));
    assert!(matches!(member(&result, "_entity"), Value::Entity(_)));
    assert!(matches!(member(&result, "_arr"), Value::Array(_)));

    let host = result.to_host().expect("marshal");
    assert_eq!(host.get("_str"), Some(&HostValue::String("str".into())));
    assert!(host.get("getName").is_none());
    assert!(run("x=>x").to_host().is_err());
}

#[test]
fn test_implement_interface() {
    let engine = engine();
    let code = "let me = {_name:\"Will\",getName:first=>this._name+\"|\"+first,add:(x,y,z)=>x+y+z}; \
let x=1; me.add(x,2,3); me";
    let person = engine.implement(human(), code).expect("implement");
    assert_eq!(
        person.call_method("getName", vec!["Zhang".into()]).expect("getName"),
        HostValue::String("Will|Zhang".into())
    );
    assert!(matches!(
        person.call_method("getAge", vec![]),
        Err(HostError::NotImplemented(_))
    ));
    assert!(matches!(
        person.call_method("add", vec![1.into(), 2.into(), 3.into()]),
        Err(HostError::NoSuchMethod { .. })
    ));
}

#[test]
fn test_implement_over_host_instance() {
    let mut engine = engine();
    engine.grant_class("Woman", Arc::new(WomanClass)).expect("grant");
    let person = engine
        .implement(human(), "Woman{name:\"ivy\",age:47,getAge:()=>88}")
        .expect("implement");
    assert_eq!(
        person.call_method("getName", vec!["zhao".into()]).expect("getName"),
        HostValue::String("ivy zhao".into())
    );
    assert_eq!(person.call_method("getAge", vec![]).expect("getAge"), HostValue::Number(88.0));
}

#[test]
fn test_extend_host_object() {
    let engine = engine();
    let person = engine
        .extend(human(), Arc::new(Woman::new("Elsa", 100.0)), "{getAge:()=>300}")
        .expect("extend");
    assert_eq!(
        person.call_method("getName", vec!["Zhao".into()]).expect("getName"),
        HostValue::String("Elsa Zhao".into())
    );
    assert_eq!(person.call_method("getAge", vec![]).expect("getAge"), HostValue::Number(300.0));
    assert!(engine.implement(human(), "42").is_err());
}

struct Calculator {
    calls: Mutex<Vec<String>>,
}

impl FitBroker for Calculator {
    fn invoke(&self, genericable_id: &str, args: Vec<HostValue>) -> Result<HostValue, HostError> {
        self.calls.lock().push(genericable_id.to_string());
        let sum = args.iter().filter_map(HostValue::as_f64).sum::<f64>();
        Ok(HostValue::Number(sum))
    }
}

#[test]
fn test_fit_aliases_route_through_broker() {
    let broker = Arc::new(Calculator {
        calls: Mutex::new(Vec::new()),
    });
    let mut engine = engine();
    engine.grant_remote("add", "math.add", 2);
    engine.set_broker(broker.clone());
    assert_eq!(run_with(&engine, "let inc = add(1); inc(41)"), num(42));
    assert_eq!(broker.calls.lock().as_slice(), ["math.add".to_string()]);
}

#[test]
fn test_missing_broker_is_a_remote_failure() {
    let mut engine = engine();
    engine.grant_remote("add", "math.add", 2);
    let err = engine.execute("add(1,2)", Vec::new()).expect_err("no broker");
    assert_eq!(err.as_panic().map(|panic| panic.code()), Some(113));
}
