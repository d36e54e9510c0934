mod util;

use ohscript::Value;
use util::{member, num, run, run_panic, text};

#[test]
fn test_increments_and_negation() {
    assert_eq!(run("let a=true; !a"), Value::Bool(false));

    let result = run("var a=1,c=1; let b = a++, d=c--; {a:a, b:b, c:c, d:d}");
    assert_eq!(member(&result, "a"), num(2));
    assert_eq!(member(&result, "b"), num(1));
    assert_eq!(member(&result, "c"), num(0));
    assert_eq!(member(&result, "d"), num(1));

    let result = run("var a=1,c=1; let b = ++a, d=--c, e=-a; return {a:a, b:b, c:c, d:d, e:e};");
    assert_eq!(member(&result, "b"), num(2));
    assert_eq!(member(&result, "d"), num(0));
    assert_eq!(member(&result, "e"), num(-2));

    assert_eq!(run("let a=-100; -(a+1)"), num(99));
}

#[test]
fn test_arithmetic_results() {
    assert_eq!(run("return 10+30/5;"), num(16));
    assert_eq!(run("(10+30)/5"), num(8));
    assert_eq!(run("\"abc\"+30/5"), text("abc6"));
    assert_eq!(run("let x=10,y=x*3;let z=x+y; x*(10+y)+z+20.5"), num(460.5));
    assert_eq!(run("let x=10,y=5; x>y?x:y"), num(10));
    assert_eq!(run("30/5").to_string(), "6");
}

#[test]
fn test_if_while_do() {
    let source = "let a=4, b=6,c=3; var d; if(a>b){d=\"a\";}else if(a>c){d=\"c\";}else{d=\"b\";}\n d";
    assert_eq!(run(source), text("c"));

    assert_eq!(run("var a=4,b=0; while(a>0){b += 10;a--;}\n b"), num(40));
    assert_eq!(run("var a=4; while(a>0){a--;if(a==1){break;}}\n a"), num(1));
    assert_eq!(run("var a=4; while(a>0){a--;if(a>1){continue;}a=100; break;}\n a"), num(100));
    assert_eq!(run("var a=0, b=0; do{b+=1; a++;}while(a<10)\n a"), num(10));
}

#[test]
fn test_arrays() {
    assert_eq!(run("var a=[[10,20,30],[1,2],[100]]; a[0][0]+a[1][0]+a[2][0]"), num(111));
    assert_eq!(run("var a=[1,2,(3+5)]; a[2]+a[1]"), num(10));
    assert_eq!(run("let a=[{age:20}]; a[0].age"), num(20));
    assert_eq!(
        run("let a={books:[{name:\"book1\"}]}; a.books[0].name =\"my \" + a.books[0].name; a.books[0].name"),
        text("my book1")
    );
    assert_eq!(run("var a=[],b=[1,2,3]; a.push(5); b[1]+a[0]"), num(7));
    assert_eq!(run("var a=[]; a.isEmpty()"), Value::Bool(true));
    assert_eq!(run("let b = [1,2,3,4]; b.insert(1,6); b[1]"), num(6));
    assert_eq!(run("let b = [1,2,3,4]; b.remove(1); b.size()"), num(3));
    assert_eq!(run_panic("let b = [1,2]; b[2]").code(), 105);
}

#[test]
fn test_short_circuit() {
    let cases = [
        ("false==false && true==true", true),
        ("let a = null; false==true && true==a.b", false),
        ("let a = null; a==null || true==a.b", true),
        ("true && (false || true) && true", true),
        ("false || false && (false || false)", false),
        ("true && false || (true && true)", true),
    ];
    for (source, expected) in cases {
        assert_eq!(run(source), Value::Bool(expected), "{source}");
    }
    assert_eq!(run("if(true){1}else {2}"), num(1));
    assert_eq!(run("if(false){1}else {2}"), num(2));
}

#[test]
fn test_maps() {
    assert_eq!(run("var a=[:]; a.put(\"name\",\"wi\\\"1\\\"ll\"); a.get(\"name\")"), text("wi\"1\"ll"));
    assert_eq!(
        run("var a=[:]; a.put(\"will\",[:]); a.get(\"will\").put(\"age\",47); a.get(\"will\").get(\"age\")"),
        num(47)
    );
    assert_eq!(run("var a=[:]; a.put(\"people\",[\"will\",\"evan\"]); a.get(\"people\")[1]"), text("evan"));
    assert_eq!(
        run("var a=[]; a.push({map:[:]}); a[0].map.put(\"name\",\"will\"); a[0].map.get(\"name\")"),
        text("will")
    );
    assert_eq!(run("let a=[:]; a[\"name\"]=\"Will\"; a[\"name\"]"), text("Will"));

    let Value::Map(map) = run("[\"name\":\"Will\",\"age\":47]") else {
        panic!("expected a map");
    };
    assert_eq!(map.read().get("age"), Some(&num(47)));
}

#[test]
fn test_tuples_and_destructuring() {
    assert_eq!(run("let c=(10), d=(\"oh\"); c+d"), text("10oh"));
    assert_eq!(run("let a=(10,20,30,40), (_,b,_,d) = a; b+d"), num(60));
    assert_eq!(run("let will = {age:47, height:168}, (_,height) = will; height"), num(168));
    assert_eq!(
        run("let will = (47,168,\"male\",(\"will\",\"zhang\")), (age,..,(_,last)) = will; last+age"),
        text("zhang47")
    );
    let source = "func someone(last_name,first_name,birthday,calculate_age){
    let name = last_name+\" \"+first_name;
    let age = calculate_age(birthday);
    (name,age)
}
func birthday_to_age(year){2023-year}
let me = someone(\"will\",\"zhang\",1976,birthday_to_age); me.1";
    assert_eq!(run(source), num(47));
    assert_eq!(run_panic("let (a,b) = (1,2,3); a").code(), 114);
}

#[test]
fn test_each_and_for() {
    assert_eq!(run("let a=[1,2,3,4]; var c=0; each (b,i) in a {c+=b+i;} c"), num(16));
    assert_eq!(run("let a=[1,2,3,4]; var c=0; each (b,i) in a {c+=b+i;if(c==4) {i}}"), num(1));
    assert_eq!(run("var a=0; let b=\"will\"; for(var b=0; b<10; b++){a+=10;} a+b"), text("100will"));
    assert_eq!(
        run("let m=[\"x\":1,\"y\":2]; var keys=\"\"; each (e,i) in m {keys+=e.0+e.1+i;} keys"),
        text("x10y21")
    );
}

#[test]
fn test_array_callbacks() {
    assert_eq!(run("let a=[1,2,3,4]; var c=0; a.forEach(i=>{c+=i}); c"), num(10));
    assert_eq!(run("let a=[1,2,3,4]; var c = a.map(i=>i*10+\"abc\"); c[1]"), text("20abc"));
    assert_eq!(run("let a=[1,2,3,4]; var c = a.filter(i=>i>1); c.size()"), num(3));
    assert_eq!(run("[1,2,3,4].reduce((x,y)=>x+y)"), num(10));
    assert_eq!(run("[1,2,3].join(\"-\")"), text("1-2-3"));
}

#[test]
fn test_pipes_and_currying() {
    assert_eq!(run("func f1(x){x+1};func f2(x){x*2};func f3(x){x*3}; 3>>f1>>f2>>f3"), num(24));
    assert_eq!(run("func f1(x){x+1};func f2(x){x*2};func f3(x,y){x*3+y}; 3>>f1>>f2>>f3(10)"), num(38));
    assert_eq!(run("func f1(x){x+1};func f2(x){x*2};func f3(x,y){x*3+y}; (3>>f1>>f2>>f3)(10)"), num(34));

    assert_eq!(
        run("func func1(x,y,z,w){x+y+z+w};\n let r1 = func1(10,20), r2=r1(10), r3=r2(\"abc\"); r3"),
        text("40abc")
    );
    assert_eq!(
        run("func func1(x,y,z,w){x+y+z+w};\n let r1 = func1(20)(30), r2=r1(10), r3=r2(40); r3"),
        num(100)
    );
    assert_eq!(
        run("func func1(x){let x1=x+1; (y,z,w)=>x1+y+z+w};\n let r1 = func1(1)(10), r2=r1(100), r3=r2(1000); r3"),
        num(1112)
    );
    assert_eq!(run_panic("func f(x){x}; f(1,2)").code(), 109);
}

#[test]
fn test_functions_and_scopes() {
    assert_eq!(run("let x=50; func func1(x){x+10};\n func1(x+10)"), num(70));
    assert_eq!(run("let y=50; func func1(x){let y=40;x+y+10};\n func1(10)"), num(60));
    assert_eq!(run("let y=50; func func1(x){let y={let x=10;x};x+y+10};\n func1(10)"), num(30));
    assert_eq!(run("func func2(y){func1(y)+10};\n func func1(x){x+10};\n func2(10)"), num(30));
    assert_eq!(run("let f1 = {let w=10; return ()=>{w+1};}; f1()"), num(11));
    assert_eq!(run("let fun1 = f=>f(10,2,10)[0]+10; fun1((x,y,z)=>[x*y*10+z,1,1])"), num(220));
}

#[test]
fn test_tail_results() {
    assert_eq!(run("let age = {let age=10; age+10}; age"), num(20));
    assert_eq!(run("let age = {let age=10; }; age"), Value::Unit);
    assert_eq!(run("var age = 10; let b=1; if(b==1){age = 30;} age"), num(30));
    assert_eq!(run("var age = 10; let b=1; if(b==1){40}else{30} age"), num(40));
    assert_eq!(run("var age = 10; let b=2; if(b==1){40}else{30} age"), num(30));
    assert_eq!(run("var age = 10; let b=2; while(b>0){50} age"), num(50));
    assert_eq!(run("var age = 10; let b=2; while(b>0){break;} age"), num(10));
    assert_eq!(run("let b=2; let age = {while(b>0){30} 20}; age"), num(30));
    assert_eq!(run("let b=2; let age = {while(b>2){30} 20}; age"), num(20));
}

#[test]
fn test_entities() {
    let source = "let will = {age:{var age=47; age++; age},create:()=>{let age=this.age; {get:func(){age+2}}}};
 will.create().get()";
    assert_eq!(run(source), num(50));

    let source = "let will = {son:{ func born(){{age:2*8}}; born()}, age:48, run:()=>{this.age/2+this.son.age}};
 will.run()";
    assert_eq!(run(source), num(40));

    let source = "func human(age,height){let real_age = age+1;
return {_age: real_age, height:height, age:()=>{(_age+this._age)/2},run:()=>{this.height = this.height+10; this.height+height}};};
let will = human(47,168), evan = human(18,175);
will.age()+evan.age()+will.run()";
    assert_eq!(run(source), num(67 + 346));
}

#[test]
fn test_inheritance() {
    let source = "let will = {age:48, add:()=>this.age+2}; let son = will::{add:()=>this.base.add()+2}; \
let grand_son=son::{add:()=>base.base.add()+this.base.add()}; son.age+=2; grand_son.add()";
    assert_eq!(run(source), num(106));

    let source = "let will = {age:{old:10, young:20}}; let son = will::{add:()=>age}; \
let grand = son::{add:func()=>age}; grand.add().old";
    assert_eq!(run(source), num(10));
}

#[test]
fn test_private_members() {
    assert_eq!(
        run("let will = {_age : 48, age:()=>{this._age = _age+10; (_age+this._age)/2}};\n will.age()"),
        num(58)
    );
    assert_eq!(run_panic("let will = {_age : 48}; will._age").code(), 104);
}

#[test]
fn test_match() {
    let cases = [
        ("let a=(1,2,3); var c=0; match a{|(b,..,d) if(b>0)=>c=b |_=>c=100} c", num(1)),
        ("let a=(-1,2,3); var c=0; match a{|(b,..,d) if(b>0)=>c=b |_=>c=100} c", num(100)),
        ("let a=(4,2,5); var c=0; match a{|(_,2,d)=>{c=d;} |_=>c=100} c", num(5)),
        ("let a=(4,2,5); var c=0; match a{|(_,2,d)=>{c=d;500} |_=>c=100} c", num(500)),
        ("let a=(4,2,5); var c=0; match a{|(_,2,d)=>500 |_=>c=100} c", num(500)),
        ("let type=\"doc\"; match type{|\"doc\"=>\"word\" |\"xls\"=>\"excel\" |_=>\"unknown\"}", text("word")),
        ("let x = match 3 {|1=>\"one\" |3=>\"three\" |_=>\"many\"}; x", text("three")),
    ];
    for (source, expected) in cases {
        assert_eq!(run(source), expected, "{source}");
    }
    assert_eq!(run("let x = match 9 {|1=>\"one\"}; x"), Value::Unit);
}

#[test]
fn test_guarded_match_expression() {
    let source = |subject: &str| {
        format!("let x = match {subject} {{ |(b,..,d) if(b>0) => b | _ => 100 }}; x")
    };
    assert_eq!(run(&source("(1,2,3)")), num(1));
    assert_eq!(run(&source("(-1,2,3)")), num(100));
    assert_eq!(run("let ready = false; let y = match 5 { |n if ready => n | _ => 0 }; y"), num(0));
}

#[test]
fn test_type_tests() {
    let cases = [
        "10<:number",
        "\"a\"<:string",
        "true<:bool",
        "null<:null",
        "[1]<:array",
        "(1,2)<:tuple",
        "[:]<:map",
        "{name:\"will\"}<:object",
        "(x=>x)<:function",
        "func f1(){}; f1()<:unit",
    ];
    for source in cases {
        assert_eq!(run(source), Value::Bool(true), "{source}");
    }
    assert_eq!(run("10<:string"), Value::Bool(false));
}

#[test]
fn test_string_and_number_methods() {
    assert_eq!(
        run("let me = \"   will zhang   \"; me.trim().split(\" \")[0].upper().lower().ends_with(\"ill\")"),
        Value::Bool(true)
    );
    assert_eq!(run("let me = 10.111; me.ceil().to_str()"), text("11"));
    assert_eq!(run("\"testString\".contains(\"stStr\")"), Value::Bool(true));
    assert_eq!(run("\"testString\".len()"), num(10));
    assert_eq!(run("\"testString\".starts_with(\"estSt\")"), Value::Bool(false));
    assert_eq!(run("\"abc\".substring(1,3)"), text("bc"));
    assert_eq!(run("\"12.5\".to_num()+1"), num(13.5));
    assert_eq!(run("(-3.4).abs()"), num(3.4));
}

#[test]
fn test_comparisons() {
    assert_eq!(run("1 == 1.0"), Value::Bool(true));
    assert_eq!(run("null == null"), Value::Bool(true));
    assert_eq!(run("\"aa\" != null"), Value::Bool(true));
    assert_eq!(run("\"b\" > \"a\""), Value::Bool(true));
    assert_eq!(run_panic("let n = null; 3 > n").code(), 102);
    assert_eq!(run_panic("let n = null; n <= -3").code(), 102);
    assert_eq!(run_panic("3 > \"a\"").code(), 101);
    assert_eq!(run_panic("1/0").code(), 108);
}

#[test]
fn test_runtime_panics() {
    assert_eq!(run_panic("undefined_name + 1").code(), 106);
    assert_eq!(run_panic("let a = 1; a()").code(), 103);
    assert_eq!(run_panic("panic(\"stop\")").code(), 1);
    assert_eq!(run_panic("panic(42, \"custom\")").code(), 42);
    assert_eq!(run_panic("func f(n){f(n+1)}; f(0)").code(), 111);
}

#[test]
fn test_script_args() {
    let engine = util::engine();
    let env = engine.load("args[0] + args.size()").expect("load");
    assert_eq!(env.execute(vec![Value::from("n")]).expect("run"), text("n1"));
}
