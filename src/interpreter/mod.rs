//=====================================================
// File: interpreter/mod.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: OhScript tree-walking interpreter
// Objective: Execute linked syntax trees: statement and expression dispatch,
//            name resolution, calls and currying, entities, modules, tasks,
//            and host interop
//=====================================================

pub mod async_control;
pub mod builtins;
pub mod entity;
pub mod errors;
pub mod frame;
pub mod methods;
pub mod patterns;
pub mod value;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use tokio::runtime::Handle;
use tracing::{debug, trace};

use crate::ast::{
    ArmBody, AssignOp, AssignTarget, Ast, BinaryOp, Block, Expr, ExprKind, FunctionBody,
    FunctionDef, MatchArm, MemberInit, Pattern, Stmt, StmtKind, UnaryOp, UpdateOp,
};
use crate::config::EngineOptions;
use crate::forest::Forest;
use crate::interop::remote::HttpClient;
use crate::interop::{Binding, Bindings, FitBroker, HostError, HostObject, HostValue, RemoteSpec};

pub use async_control::{LockTable, Promise, TaskPool};
pub use entity::{EntityArena, EntityRef};
pub use errors::{ErrorCode, EvalResult, OhPanic, PanicCode, RuntimeError, ScriptError};
pub use frame::Frame;
pub use value::{Callable, NativeFn, OhMap, Value};

use patterns::{literal_value, match_pattern};

//=====================================================
//            Section 1: Runtime State
//=====================================================

/// State shared by every task of one execution environment.
pub struct Runtime {
    forest: Arc<Forest>,
    grants: RwLock<Bindings>,
    broker: RwLock<Option<Arc<dyn FitBroker>>>,
    arena: Arc<EntityArena>,
    handle: Handle,
    locks: LockTable,
    options: EngineOptions,
    http: HttpClient,
    modules: Mutex<HashMap<String, Arc<Frame>>>,
    module_init: ReentrantMutex<()>,
    util: OnceCell<EntityRef>,
}

impl Runtime {
    pub fn new(forest: Arc<Forest>, options: EngineOptions, handle: Handle) -> Arc<Self> {
        let http = HttpClient::new(Duration::from_millis(options.http_timeout_ms));
        Arc::new(Self {
            forest,
            grants: RwLock::new(Bindings::new()),
            broker: RwLock::new(None),
            arena: EntityArena::new(),
            handle,
            locks: LockTable::new(),
            options,
            http,
            modules: Mutex::new(HashMap::new()),
            module_init: ReentrantMutex::new(()),
            util: OnceCell::new(),
        })
    }

    pub fn forest(&self) -> &Arc<Forest> {
        &self.forest
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn arena(&self) -> &Arc<EntityArena> {
        &self.arena
    }

    pub fn grants(&self) -> &RwLock<Bindings> {
        &self.grants
    }

    pub fn set_broker(&self, broker: Option<Arc<dyn FitBroker>>) {
        *self.broker.write() = broker;
    }

    /// The lazily created `util` entity.
    pub fn util(&self) -> Value {
        let util = self.util.get_or_init(|| builtins::util_entity(&self.arena));
        Value::Entity(util.clone())
    }

    //Function: resolve_external
    //Purpose: Resolve a name through environment grants, then forest bindings
    //Inputs: name: &str
    //Returns: Option<Value>
    pub fn resolve_external(&self, name: &str) -> Option<Value> {
        if let Some(binding) = self.grants.read().resolve(name) {
            return Some(binding_value(name, binding));
        }
        self.forest
            .bindings()
            .resolve(name)
            .map(|binding| binding_value(name, binding))
    }

    //Function: spawn
    //Purpose: Run `job` on a pool worker and hand back its promise
    //Inputs: label, job
    //Returns: Arc<Promise>
    pub fn spawn<F>(self: &Arc<Self>, label: &str, job: F) -> Arc<Promise>
    where
        F: FnOnce(&mut Interpreter) -> EvalResult + Send + 'static,
    {
        let promise = Promise::new(label);
        let settler = Arc::clone(&promise);
        let runtime = Arc::clone(self);
        trace!(target: "ohscript::task", task = label, "spawn");
        drop(self.handle.spawn_blocking(move || {
            let mut interpreter = Interpreter::new(runtime);
            let result = job(&mut interpreter).map_err(RuntimeError::into_panic);
            settler.settle(result);
        }));
        promise
    }

    //Function: execute_module
    //Purpose: Run a module of the forest as the entry point
    //Inputs: name, args
    //Returns: Result<Value, OhPanic>
    pub fn execute_module(self: &Arc<Self>, name: &str, args: Vec<Value>) -> Result<Value, OhPanic> {
        let module = self.forest.module(name).ok_or_else(|| {
            OhPanic::new(PanicCode::INVALID_OPERATION, format!("no module named '{}'", name))
        })?;
        let ast = Arc::clone(&module.ast);
        debug!(target: "ohscript::interpreter", module = name, "execute");
        self.spawn(name, move |interpreter| interpreter.run_program(&ast, args))
            .wait()
    }

    //Function: invoke_method
    //Purpose: Call a method on an entity from the host side
    //Inputs: entity, name, args
    //Returns: Result<Value, OhPanic>
    pub fn invoke_method(self: &Arc<Self>, entity: EntityRef, name: &str, args: Vec<Value>) -> Result<Value, OhPanic> {
        let method = name.to_string();
        self.spawn(name, move |interpreter| {
            let viewer = entity.clone();
            interpreter.call_method(Value::Entity(entity), &method, args, Some(&viewer))
        })
        .wait()
    }
}

fn binding_value(alias: &str, binding: &Binding) -> Value {
    match binding {
        Binding::Object(value) => Value::from_host(value.clone()),
        Binding::Class(class) => Value::Class(Arc::clone(class)),
        Binding::Remote(spec) => Value::function(Callable::Remote {
            alias: alias.to_string(),
            spec: spec.clone(),
        }),
    }
}

pub(crate) fn host_error(error: HostError) -> OhPanic {
    let code = match error {
        HostError::NoSuchMethod { .. } | HostError::NoSuchProperty { .. } => PanicCode::MEMBER_NOT_FOUND,
        HostError::ArgumentMismatch { .. } => PanicCode::ARGUMENT_MISMATCH,
        HostError::NotImplemented(_) | HostError::Failed(_) => PanicCode::EXTERNAL_FAILURE,
    };
    OhPanic::new(code, error.to_string())
}

fn marshal_args(args: &[Value]) -> Result<Vec<HostValue>, OhPanic> {
    args.iter().map(Value::to_host).collect()
}

//=====================================================
//            Section 2: Interpreter
//=====================================================

enum Place {
    Name(String),
    Member(Value, String),
    Index(Value, Value),
    TupleIndex(Value, usize),
}

/// Evaluator bound to one task. Cheap to create per task.
pub struct Interpreter {
    runtime: Arc<Runtime>,
    depth: usize,
}

impl Interpreter {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self { runtime, depth: 0 }
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    pub fn run_program(&mut self, ast: &Ast, args: Vec<Value>) -> EvalResult {
        let frame = Frame::root();
        frame.declare(builtins::ARGS, Value::array(args));
        self.eval_boundary(&ast.program.body, &frame)
    }

    //Function: module_frame
    //Purpose: Initialise an imported module once and return its frame
    //Inputs: name: &str
    //Returns: EvalResult<Arc<Frame>>
    fn module_frame(&mut self, name: &str) -> EvalResult<Arc<Frame>> {
        let runtime = Arc::clone(&self.runtime);
        let _init = runtime.module_init.lock();
        if let Some(frame) = runtime.modules.lock().get(name) {
            return Ok(Arc::clone(frame));
        }
        let module = runtime.forest.module(name).ok_or_else(|| {
            OhPanic::new(PanicCode::INVALID_OPERATION, format!("no module named '{}'", name))
        })?;
        let ast = Arc::clone(&module.ast);
        debug!(target: "ohscript::interpreter", module = name, "initialise module");
        let frame = Frame::root();
        frame.declare(builtins::ARGS, Value::array(Vec::new()));
        match self.exec_block(&ast.program.body, &frame) {
            Ok(_) | Err(RuntimeError::Return(_)) => {}
            Err(other) => return Err(other.into_panic().into()),
        }
        runtime.modules.lock().insert(name.to_string(), Arc::clone(&frame));
        Ok(frame)
    }

    //=====================================================
    //            Section 3: Blocks & Statements
    //=====================================================

    fn hoist(&self, statements: &[Stmt], frame: &Arc<Frame>) {
        for stmt in statements {
            if let StmtKind::Function(def) = &stmt.kind {
                if let Some(name) = &def.name {
                    frame.declare(name.as_str(), closure(def, frame));
                }
            }
        }
    }

    /// Run a block in `frame`; its trailing expression is the value.
    fn exec_block(&mut self, block: &Block, frame: &Arc<Frame>) -> EvalResult {
        self.hoist(&block.statements, frame);
        let last = block.statements.len().saturating_sub(1);
        for (i, stmt) in block.statements.iter().enumerate() {
            if i == last {
                if let StmtKind::Expression { expr, terminated: false } = &stmt.kind {
                    return self.eval(expr, frame);
                }
            }
            self.exec_stmt(stmt, frame)?;
        }
        Ok(Value::Unit)
    }

    /// Block whose value completes the enclosing function, program, or block
    /// expression.
    fn eval_boundary(&mut self, block: &Block, frame: &Arc<Frame>) -> EvalResult {
        match self.exec_block(block, frame) {
            Err(RuntimeError::Return(value)) => Ok(value),
            other => other,
        }
    }

    /// Control-flow body: a non-assignment trailing expression returns from
    /// the nearest boundary.
    fn exec_transparent(&mut self, block: &Block, frame: &Arc<Frame>) -> EvalResult<()> {
        self.hoist(&block.statements, frame);
        let last = block.statements.len().saturating_sub(1);
        for (i, stmt) in block.statements.iter().enumerate() {
            if i == last {
                if let StmtKind::Expression { expr, terminated: false } = &stmt.kind {
                    return self.complete_with(expr, frame);
                }
            }
            self.exec_stmt(stmt, frame)?;
        }
        Ok(())
    }

    fn complete_with(&mut self, expr: &Expr, frame: &Arc<Frame>) -> EvalResult<()> {
        let value = self.eval(expr, frame)?;
        if expr.is_assignment_like() {
            return Ok(());
        }
        Err(RuntimeError::Return(value))
    }

    /// Loop body; Ok(false) means the loop should stop.
    fn loop_body(&mut self, body: &Block, frame: &Arc<Frame>) -> EvalResult<bool> {
        match self.exec_transparent(body, &Frame::child(frame)) {
            Ok(()) | Err(RuntimeError::Continue) => Ok(true),
            Err(RuntimeError::Break) => Ok(false),
            Err(other) => Err(other),
        }
    }

    fn exec_stmt(&mut self, stmt: &Stmt, frame: &Arc<Frame>) -> EvalResult<()> {
        match &stmt.kind {
            StmtKind::Declare { declarators, .. } => {
                for declarator in declarators {
                    let value = match &declarator.value {
                        Some(expr) => self.eval(expr, frame)?,
                        None => Value::Null,
                    };
                    declare_pattern(&declarator.target, value, frame)?;
                }
                Ok(())
            }
            StmtKind::Function(_) | StmtKind::Export(_) => Ok(()),
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.eval(condition, frame)?.is_truthy() {
                    self.exec_transparent(then_branch, &Frame::child(frame))
                } else if let Some(else_branch) = else_branch {
                    self.exec_transparent(else_branch, &Frame::child(frame))
                } else {
                    Ok(())
                }
            }
            StmtKind::While { condition, body } => {
                while self.eval(condition, frame)?.is_truthy() {
                    if !self.loop_body(body, frame)? {
                        break;
                    }
                }
                Ok(())
            }
            StmtKind::DoWhile { body, condition } => {
                loop {
                    if !self.loop_body(body, frame)? {
                        break;
                    }
                    if !self.eval(condition, frame)?.is_truthy() {
                        break;
                    }
                }
                Ok(())
            }
            StmtKind::For {
                init,
                condition,
                update,
                body,
            } => {
                let scope = Frame::child(frame);
                if let Some(init) = init {
                    self.exec_stmt(init, &scope)?;
                }
                loop {
                    if let Some(condition) = condition {
                        if !self.eval(condition, &scope)?.is_truthy() {
                            break;
                        }
                    }
                    if !self.loop_body(body, &scope)? {
                        break;
                    }
                    if let Some(update) = update {
                        self.eval(update, &scope)?;
                    }
                }
                Ok(())
            }
            StmtKind::Each {
                item,
                index,
                iterable,
                body,
            } => {
                let iterable = self.eval(iterable, frame)?;
                for (i, element) in iteration_items(&iterable)?.into_iter().enumerate() {
                    let scope = Frame::child(frame);
                    scope.declare(item.as_str(), element);
                    if let Some(index) = index {
                        scope.declare(index.as_str(), Value::from(i));
                    }
                    if !self.loop_body(body, &scope)? {
                        break;
                    }
                }
                Ok(())
            }
            StmtKind::Match { scrutinee, arms } => {
                let value = self.eval(scrutinee, frame)?;
                let Some((arm, scope)) = self.select_arm(arms, &value, frame)? else {
                    return Ok(());
                };
                match &arm.body {
                    ArmBody::Block(block) => self.exec_transparent(block, &Frame::child(&scope)),
                    ArmBody::Expr(expr) => self.complete_with(expr, &scope),
                }
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, frame)?,
                    None => Value::Unit,
                };
                Err(RuntimeError::Return(value))
            }
            StmtKind::Break => Err(RuntimeError::Break),
            StmtKind::Continue => Err(RuntimeError::Continue),
            StmtKind::Import { items, module } => {
                let exporter = self.module_frame(module)?;
                for item in items {
                    let slot = exporter.local_slot(&item.name).ok_or_else(|| {
                        OhPanic::var_not_found(&format!("{}::{}", module, item.name))
                    })?;
                    frame.link(item.local_name(), slot);
                }
                Ok(())
            }
            StmtKind::Namespace { name, body } => {
                let scope = Frame::child(frame);
                match self.exec_block(body, &scope) {
                    Ok(_) | Err(RuntimeError::Return(_)) => {}
                    Err(other) => return Err(other),
                }
                frame.declare(name.as_str(), Value::Namespace(scope));
                Ok(())
            }
            StmtKind::Expression { expr, .. } => {
                self.eval(expr, frame)?;
                Ok(())
            }
        }
    }

    /// First arm whose pattern and guard accept `value`, with its bindings.
    fn select_arm<'a>(
        &mut self,
        arms: &'a [MatchArm],
        value: &Value,
        frame: &Arc<Frame>,
    ) -> EvalResult<Option<(&'a MatchArm, Arc<Frame>)>> {
        for arm in arms {
            let Some(bound) = match_pattern(&arm.pattern, value) else {
                continue;
            };
            let scope = Frame::child(frame);
            for (name, bound_value) in bound {
                scope.declare(name, bound_value);
            }
            if let Some(guard) = &arm.guard {
                if !self.eval(guard, &scope)?.is_truthy() {
                    continue;
                }
            }
            return Ok(Some((arm, scope)));
        }
        Ok(None)
    }

    //=====================================================
    //            Section 4: Expressions
    //=====================================================

    pub fn eval(&mut self, expr: &Expr, frame: &Arc<Frame>) -> EvalResult {
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(literal_value(literal)),
            ExprKind::Identifier(name) => self.lookup(name, frame),
            ExprKind::This => frame
                .this()
                .cloned()
                .map(Value::Entity)
                .ok_or_else(|| OhPanic::new(PanicCode::ENTITY_NOT_FOUND, "'this' used outside an entity").into()),
            ExprKind::Base => frame
                .this()
                .and_then(EntityRef::base)
                .map(Value::Entity)
                .ok_or_else(|| OhPanic::new(PanicCode::ENTITY_NOT_FOUND, "no base entity in scope").into()),
            ExprKind::External(name) => self.lookup_global(name),
            ExprKind::Scoped { namespace, name } => match self.eval(namespace, frame)? {
                Value::Namespace(scope) => scope
                    .local(name)
                    .ok_or_else(|| OhPanic::var_not_found(name).into()),
                other => Err(OhPanic::member_not_found(other.type_name(), name).into()),
            },
            ExprKind::Array(items) => Ok(Value::array(self.eval_all(items, frame)?)),
            ExprKind::Map(entries) => {
                let mut map = OhMap::new();
                for (key, value) in entries {
                    let key = self.eval(key, frame)?.key_string();
                    let value = self.eval(value, frame)?;
                    map.insert(key, value);
                }
                Ok(Value::map(map))
            }
            ExprKind::Tuple(items) => Ok(Value::tuple(self.eval_all(items, frame)?)),
            ExprKind::Entity(members) => self.build_entity(None, members, frame),
            ExprKind::Extend { base, members } => match self.eval(base, frame)? {
                Value::Entity(base) => self.build_entity(Some(&base), members, frame),
                other => Err(OhPanic::type_mismatch(format!("cannot extend a {}", other.type_name())).into()),
            },
            ExprKind::Construct { class, members } => self.construct(class, members, frame),
            ExprKind::Unary { op, operand } => {
                let value = self.eval(operand, frame)?;
                unary_op(*op, &value).map_err(Into::into)
            }
            ExprKind::Binary { op, left, right } => match op {
                BinaryOp::And => {
                    if !self.eval(left, frame)?.is_truthy() {
                        return Ok(Value::Bool(false));
                    }
                    Ok(Value::Bool(self.eval(right, frame)?.is_truthy()))
                }
                BinaryOp::Or => {
                    if self.eval(left, frame)?.is_truthy() {
                        return Ok(Value::Bool(true));
                    }
                    Ok(Value::Bool(self.eval(right, frame)?.is_truthy()))
                }
                _ => {
                    let left = self.eval(left, frame)?;
                    let right = self.eval(right, frame)?;
                    binary_op(*op, &left, &right).map_err(Into::into)
                }
            },
            ExprKind::TypeTest { value, type_name } => {
                Ok(Value::Bool(self.eval(value, frame)?.satisfies(*type_name)))
            }
            ExprKind::Update { op, prefix, target } => {
                let place = self.place(target, frame)?;
                let current = match self.read_place(&place, frame)? {
                    Value::Number(n) => n,
                    other => {
                        return Err(OhPanic::type_mismatch(format!(
                            "cannot increment or decrement a {}",
                            other.type_name()
                        ))
                        .into())
                    }
                };
                let next = match op {
                    UpdateOp::Increment => current + 1.0,
                    UpdateOp::Decrement => current - 1.0,
                };
                self.write_place(place, Value::Number(next), frame)?;
                Ok(Value::Number(if *prefix { next } else { current }))
            }
            ExprKind::Assign { op, target, value } => self.assign(*op, target, value, frame),
            ExprKind::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.eval(condition, frame)?.is_truthy() {
                    self.eval(then_branch, frame)
                } else {
                    self.eval(else_branch, frame)
                }
            }
            ExprKind::Pipe { value, function } => {
                let value = self.eval(value, frame)?;
                let function = self.eval(function, frame)?;
                self.call_value(&function, vec![value], None)
            }
            ExprKind::Call { callee, args } => {
                if let ExprKind::Member { object, name } = &callee.kind {
                    let receiver = self.eval(object, frame)?;
                    let args = self.eval_all(args, frame)?;
                    return self.call_method(receiver, name, args, frame.this());
                }
                let function = self.eval(callee, frame)?;
                let args = self.eval_all(args, frame)?;
                self.call_value(&function, args, None)
            }
            ExprKind::Member { object, name } => {
                let object = self.eval(object, frame)?;
                self.get_member(&object, name, frame.this())
            }
            ExprKind::TupleIndex { object, index } => {
                let object = self.eval(object, frame)?;
                tuple_index(&object, *index).map_err(Into::into)
            }
            ExprKind::Index { object, index } => {
                let object = self.eval(object, frame)?;
                let index = self.eval(index, frame)?;
                self.index_value(&object, &index, frame.this())
            }
            ExprKind::Function(def) => Ok(closure(def, frame)),
            ExprKind::Block(block) => self.eval_boundary(block, &Frame::child(frame)),
            ExprKind::Async(block) => {
                let body = block.clone();
                let scope = Frame::child(frame);
                let promise = self
                    .runtime
                    .spawn("async", move |interpreter| interpreter.eval_boundary(&body, &scope));
                Ok(Value::Promise(promise))
            }
            ExprKind::Safe(block) => {
                let result = match self.eval_boundary(block, &Frame::child(frame)) {
                    Ok(value) => Ok(value),
                    Err(other) => Err(other.into_panic()),
                };
                if let Err(panic) = &result {
                    debug!(target: "ohscript::interpreter", %panic, "panic captured by safe block");
                }
                Ok(Value::Safe(Arc::new(result)))
            }
            ExprKind::Lock { key, body } => {
                let key = match key {
                    Some(key) => Some(self.eval(key, frame)?.key_string()),
                    None => None,
                };
                let mutex = self.runtime.locks.mutex(key.as_deref());
                let _guard = mutex.lock();
                self.eval_boundary(body, &Frame::child(frame))
            }
            ExprKind::Match { scrutinee, arms } => {
                let value = self.eval(scrutinee, frame)?;
                let Some((arm, scope)) = self.select_arm(arms, &value, frame)? else {
                    return Ok(Value::Unit);
                };
                match &arm.body {
                    ArmBody::Block(block) => self.eval_boundary(block, &Frame::child(&scope)),
                    ArmBody::Expr(expr) => self.eval(expr, &scope),
                }
            }
        }
    }

    fn eval_all(&mut self, exprs: &[Expr], frame: &Arc<Frame>) -> EvalResult<Vec<Value>> {
        exprs.iter().map(|expr| self.eval(expr, frame)).collect()
    }

    //=====================================================
    //            Section 5: Name Resolution
    //=====================================================

    //Function: lookup
    //Purpose: Resolve a bare identifier
    //Inputs: name, frame
    //Returns: EvalResult (frames, then `this` members, then externals and builtins)
    fn lookup(&mut self, name: &str, frame: &Arc<Frame>) -> EvalResult {
        if let Some(value) = frame.get(name) {
            return Ok(value);
        }
        if let Some(this) = frame.this() {
            if let Some(value) = this.get(name) {
                return Ok(value);
            }
            if let Some(value) = this.host().and_then(|host| host.get_property(name)) {
                return Ok(Value::from_host(value));
            }
        }
        self.lookup_global(name)
    }

    /// Grants, forest bindings, then builtins; `ext::name` starts here.
    fn lookup_global(&mut self, name: &str) -> EvalResult {
        if let Some(value) = self.runtime.resolve_external(name) {
            return Ok(value);
        }
        builtins::lookup(&self.runtime, name).ok_or_else(|| OhPanic::var_not_found(name).into())
    }

    fn assign_name(&mut self, name: &str, value: Value, frame: &Arc<Frame>) -> EvalResult<()> {
        if frame.assign(name, value.clone()) {
            return Ok(());
        }
        if let Some(this) = frame.this() {
            this.set(name, value);
            return Ok(());
        }
        Err(OhPanic::var_not_found(name).into())
    }

    fn assign(&mut self, op: AssignOp, target: &AssignTarget, value: &Expr, frame: &Arc<Frame>) -> EvalResult {
        match target {
            AssignTarget::Place(target) => {
                let place = self.place(target, frame)?;
                let value = self.eval(value, frame)?;
                let value = match op.binary() {
                    Some(op) => {
                        let current = self.read_place(&place, frame)?;
                        binary_op(op, &current, &value)?
                    }
                    None => value,
                };
                self.write_place(place, value.clone(), frame)?;
                Ok(value)
            }
            AssignTarget::Pattern(pattern) => {
                let value = self.eval(value, frame)?;
                let bound = match_pattern(pattern, &value).ok_or_else(|| pattern_mismatch(pattern, &value))?;
                for (name, bound_value) in bound {
                    self.assign_name(&name, bound_value, frame)?;
                }
                Ok(value)
            }
        }
    }

    fn place(&mut self, expr: &Expr, frame: &Arc<Frame>) -> EvalResult<Place> {
        Ok(match &expr.kind {
            ExprKind::Identifier(name) => Place::Name(name.clone()),
            ExprKind::Member { object, name } => Place::Member(self.eval(object, frame)?, name.clone()),
            ExprKind::Index { object, index } => {
                Place::Index(self.eval(object, frame)?, self.eval(index, frame)?)
            }
            ExprKind::TupleIndex { object, index } => Place::TupleIndex(self.eval(object, frame)?, *index),
            _ => {
                return Err(OhPanic::new(PanicCode::INVALID_OPERATION, "invalid assignment target").into())
            }
        })
    }

    fn read_place(&mut self, place: &Place, frame: &Arc<Frame>) -> EvalResult {
        match place {
            Place::Name(name) => self.lookup(name, frame),
            Place::Member(object, name) => self.get_member(object, name, frame.this()),
            Place::Index(object, index) => self.index_value(object, index, frame.this()),
            Place::TupleIndex(object, index) => tuple_index(object, *index).map_err(Into::into),
        }
    }

    fn write_place(&mut self, place: Place, value: Value, frame: &Arc<Frame>) -> EvalResult<()> {
        match place {
            Place::Name(name) => self.assign_name(&name, value, frame),
            Place::Member(object, name) => self.set_member(&object, &name, value, frame.this()),
            Place::Index(object, index) => self.set_index(&object, &index, value, frame.this()),
            Place::TupleIndex(Value::Array(items), index) => {
                let mut items = items.write();
                let len = items.len();
                let slot = items.get_mut(index).ok_or_else(|| out_of_bounds(index as f64, len))?;
                *slot = value;
                Ok(())
            }
            Place::TupleIndex(object, _) => Err(OhPanic::new(
                PanicCode::INVALID_OPERATION,
                format!("a {} cannot be assigned by position", object.type_name()),
            )
            .into()),
        }
    }

    //=====================================================
    //            Section 6: Entities & Members
    //=====================================================

    fn build_entity(&mut self, base: Option<&EntityRef>, members: &[MemberInit], frame: &Arc<Frame>) -> EvalResult {
        let entity = self.runtime.arena.alloc(base, None);
        let scope = Frame::with_this(frame, Some(entity.clone()));
        for member in members {
            let value = self.eval(&member.value, &scope)?;
            entity.define(member.name.as_str(), value);
        }
        Ok(Value::Entity(entity))
    }

    //Function: construct
    //Purpose: Build `Class{...}`: function members stay on the script
    //         entity, data members initialise the host instance
    //Inputs: class name, member initialisers, frame
    //Returns: EvalResult (an entity backed by the host instance)
    fn construct(&mut self, class: &str, members: &[MemberInit], frame: &Arc<Frame>) -> EvalResult {
        let Value::Class(host_class) = self.lookup(class, frame)? else {
            return Err(OhPanic::type_mismatch(format!("'{}' is not a host class", class)).into());
        };
        let entity = self.runtime.arena.alloc(None, None);
        let scope = Frame::with_this(frame, Some(entity.clone()));
        let mut fields = Vec::new();
        for member in members {
            match self.eval(&member.value, &scope)? {
                function @ Value::Function(_) => entity.define(member.name.as_str(), function),
                data => fields.push((member.name.clone(), data.to_host()?)),
            }
        }
        let host = host_class.construct(fields).map_err(host_error)?;
        entity.attach_host(host);
        Ok(Value::Entity(entity))
    }

    fn check_private(entity: &EntityRef, name: &str, viewer: Option<&EntityRef>) -> Result<(), OhPanic> {
        if !name.starts_with('_') || viewer.is_some_and(|viewer| viewer.is_related(entity)) {
            return Ok(());
        }
        Err(OhPanic::new(
            PanicCode::MEMBER_NOT_FOUND,
            format!("'{}' is private to its entity", name),
        ))
    }

    pub fn get_member(&mut self, object: &Value, name: &str, viewer: Option<&EntityRef>) -> EvalResult {
        let bound = || {
            Value::function(Callable::Method {
                receiver: object.clone(),
                name: name.to_string(),
            })
        };
        match object {
            Value::Entity(entity) => {
                Self::check_private(entity, name, viewer)?;
                if let Some(value) = entity.get(name) {
                    return Ok(value);
                }
                if name == "base" {
                    return Ok(entity.base().map(Value::Entity).unwrap_or(Value::Null));
                }
                if let Some(host) = entity.host() {
                    return Ok(match host.get_property(name) {
                        Some(value) => Value::from_host(value),
                        None => bound(),
                    });
                }
                if methods::has_method(object, name) {
                    return Ok(bound());
                }
                Err(OhPanic::member_not_found("entity", name).into())
            }
            Value::Map(map) => {
                if let Some(value) = map.read().get(name) {
                    return Ok(value.clone());
                }
                Ok(if methods::has_method(object, name) { bound() } else { Value::Null })
            }
            Value::External(host) => Ok(match host.get_property(name) {
                Some(value) => Value::from_host(value),
                None => bound(),
            }),
            Value::Class(_) => Ok(bound()),
            Value::Namespace(scope) => scope.local(name).ok_or_else(|| OhPanic::var_not_found(name).into()),
            other if methods::has_method(other, name) => Ok(bound()),
            other => Err(OhPanic::member_not_found(other.type_name(), name).into()),
        }
    }

    fn set_member(&mut self, object: &Value, name: &str, value: Value, viewer: Option<&EntityRef>) -> EvalResult<()> {
        match object {
            Value::Entity(entity) => {
                Self::check_private(entity, name, viewer)?;
                if !entity.contains(name) {
                    if let Some(host) = entity.host() {
                        return host.set_property(name, value.to_host()?).map_err(|err| host_error(err).into());
                    }
                }
                entity.set(name, value);
                Ok(())
            }
            Value::Map(map) => {
                map.write().insert(name, value);
                Ok(())
            }
            Value::External(host) => host
                .set_property(name, value.to_host()?)
                .map_err(|err| host_error(err).into()),
            other => Err(OhPanic::member_not_found(other.type_name(), name).into()),
        }
    }

    fn index_value(&mut self, object: &Value, index: &Value, viewer: Option<&EntityRef>) -> EvalResult {
        match (object, index) {
            (Value::Array(items), Value::Number(n)) => {
                let items = items.read();
                position(*n, items.len()).map(|at| items[at].clone()).map_err(Into::into)
            }
            (Value::Tuple(items), Value::Number(n)) => {
                position(*n, items.len()).map(|at| items[at].clone()).map_err(Into::into)
            }
            (Value::String(text), Value::Number(n)) => {
                let chars: Vec<char> = text.chars().collect();
                position(*n, chars.len())
                    .map(|at| Value::string(chars[at].to_string()))
                    .map_err(Into::into)
            }
            (Value::Map(map), key) => Ok(map.read().get(&key.key_string()).cloned().unwrap_or(Value::Null)),
            (Value::Entity(_), Value::String(name)) => self.get_member(object, name, viewer),
            (Value::External(_), _) => self.call_method(object.clone(), "get", vec![index.clone()], viewer),
            (object, index) => Err(OhPanic::type_mismatch(format!(
                "cannot index a {} with a {}",
                object.type_name(),
                index.type_name()
            ))
            .into()),
        }
    }

    fn set_index(&mut self, object: &Value, index: &Value, value: Value, viewer: Option<&EntityRef>) -> EvalResult<()> {
        match (object, index) {
            (Value::Array(items), Value::Number(n)) => {
                let mut items = items.write();
                let at = position(*n, items.len())?;
                items[at] = value;
                Ok(())
            }
            (Value::Map(map), key) => {
                map.write().insert(key.key_string(), value);
                Ok(())
            }
            (Value::Entity(_), Value::String(name)) => self.set_member(object, name, value, viewer),
            (object, index) => Err(OhPanic::type_mismatch(format!(
                "cannot assign into a {} by {}",
                object.type_name(),
                index.type_name()
            ))
            .into()),
        }
    }

    //=====================================================
    //            Section 7: Calls
    //=====================================================

    //Function: call_method
    //Purpose: Dispatch `receiver.name(args)`
    //Inputs: receiver, name, args, viewer (the caller's `this`)
    //Returns: EvalResult
    pub fn call_method(
        &mut self,
        receiver: Value,
        name: &str,
        args: Vec<Value>,
        viewer: Option<&EntityRef>,
    ) -> EvalResult {
        match &receiver {
            Value::Entity(entity) => {
                Self::check_private(entity, name, viewer)?;
                if let Some(member) = entity.get(name) {
                    return self.call_value(&member, args, Some(entity.clone()));
                }
                if let Some(host) = entity.host() {
                    if host.has_method(name) || !methods::has_method(&receiver, name) {
                        return self.call_host(&host, receiver.clone(), name, args);
                    }
                }
                methods::call_builtin(self, receiver, name, args)
            }
            Value::External(host) => self.call_host(host, receiver.clone(), name, args),
            Value::Class(class) => {
                let args = marshal_args(&args)?;
                class
                    .call_static(name, args)
                    .map(Value::from_host)
                    .map_err(|err| host_error(err).into())
            }
            Value::Namespace(scope) => {
                let function = scope.local(name).ok_or_else(|| OhPanic::var_not_found(name))?;
                self.call_value(&function, args, None)
            }
            Value::Map(map) if !methods::has_method(&receiver, name) => {
                let member = map.read().get(name).cloned();
                match member {
                    Some(function) => self.call_value(&function, args, None),
                    None => Err(OhPanic::member_not_found("map", name).into()),
                }
            }
            _ => methods::call_builtin(self, receiver, name, args),
        }
    }

    /// Host method call; fewer arguments than the declared arity curry.
    fn call_host(&mut self, host: &Arc<dyn HostObject>, receiver: Value, name: &str, args: Vec<Value>) -> EvalResult {
        if let Some(arity) = host.method_arity(name) {
            if args.len() < arity {
                return Ok(partial(
                    Arc::new(Callable::Method {
                        receiver,
                        name: name.to_string(),
                    }),
                    args,
                    None,
                ));
            }
        }
        let args = marshal_args(&args)?;
        host.call_method(name, args)
            .map(Value::from_host)
            .map_err(|err| host_error(err).into())
    }

    pub fn call_value(&mut self, function: &Value, args: Vec<Value>, this: Option<EntityRef>) -> EvalResult {
        match function {
            Value::Function(callable) => self.call_callable(callable, args, this),
            other => Err(OhPanic::new(
                PanicCode::NOT_CALLABLE,
                format!("a {} is not callable", other.type_name()),
            )
            .into()),
        }
    }

    fn call_callable(&mut self, callable: &Arc<Callable>, args: Vec<Value>, this: Option<EntityRef>) -> EvalResult {
        match callable.as_ref() {
            Callable::Closure { def, frame } => {
                let arity = def.params.len();
                if args.len() < arity {
                    return Ok(partial(Arc::clone(callable), args, this));
                }
                if args.len() > arity {
                    return Err(too_many_arguments(callable.name(), arity, args.len()).into());
                }
                self.invoke_closure(def, frame, args, this)
            }
            Callable::Partial {
                target,
                bound,
                this: bound_this,
            } => {
                let mut all = bound.clone();
                all.extend(args);
                self.call_callable(target, all, bound_this.clone().or(this))
            }
            Callable::Native(native) => {
                if let Some(arity) = native.arity {
                    if args.len() < arity {
                        return Ok(partial(Arc::clone(callable), args, this));
                    }
                    if args.len() > arity {
                        return Err(too_many_arguments(Some(native.name), arity, args.len()).into());
                    }
                }
                (native.body)(self, args)
            }
            Callable::Method { receiver, name } => {
                let viewer = receiver.as_entity().cloned();
                self.call_method(receiver.clone(), name, args, viewer.as_ref())
            }
            Callable::Remote { alias, spec } => {
                let arity = match spec {
                    RemoteSpec::Fit { arity, .. } => *arity,
                    RemoteSpec::Http { method, .. } => method.arity(),
                };
                if args.len() < arity {
                    return Ok(partial(Arc::clone(callable), args, this));
                }
                if args.len() > arity {
                    return Err(too_many_arguments(Some(alias.as_str()), arity, args.len()).into());
                }
                self.call_remote(alias, spec, &args)
            }
        }
    }

    fn invoke_closure(
        &mut self,
        def: &FunctionDef,
        captured: &Arc<Frame>,
        args: Vec<Value>,
        this: Option<EntityRef>,
    ) -> EvalResult {
        if self.depth >= self.runtime.options.max_call_depth {
            return Err(OhPanic::new(
                PanicCode::STACK_OVERFLOW,
                format!("call depth exceeded {}", self.runtime.options.max_call_depth),
            )
            .into());
        }
        let this = this.or_else(|| captured.this().cloned());
        let scope = Frame::with_this(captured, this);
        for (param, arg) in def.params.iter().zip(args) {
            scope.declare(param.as_str(), arg);
        }
        self.depth += 1;
        let result = match &def.body {
            FunctionBody::Block(block) => self.exec_block(block, &scope),
            FunctionBody::Expr(expr) => self.eval(expr, &scope),
        };
        self.depth -= 1;
        match result {
            Ok(value) | Err(RuntimeError::Return(value)) => Ok(value),
            Err(RuntimeError::Panic(panic)) => Err(RuntimeError::Panic(panic)),
            Err(other) => Err(other.into_panic().into()),
        }
    }

    fn call_remote(&mut self, alias: &str, spec: &RemoteSpec, args: &[Value]) -> EvalResult {
        let args = marshal_args(args)?;
        let remote_failure = |message: String| OhPanic::new(PanicCode::REMOTE_FAILURE, message);
        let result = match spec {
            RemoteSpec::Fit { genericable_id, .. } => {
                let broker = self
                    .runtime
                    .broker
                    .read()
                    .clone()
                    .ok_or_else(|| remote_failure(format!("no fit broker for '{}'", alias)))?;
                broker.invoke(genericable_id, args)
            }
            RemoteSpec::Http { url, method } => self.runtime.http.call(url, *method, &args),
        };
        result
            .map(Value::from_host)
            .map_err(|err| remote_failure(format!("{}: {}", alias, err)).into())
    }
}

//=====================================================
//            Section 8: Operators & Helpers
//=====================================================

fn closure(def: &Arc<FunctionDef>, frame: &Arc<Frame>) -> Value {
    Value::function(Callable::Closure {
        def: Arc::clone(def),
        frame: Arc::clone(frame),
    })
}

fn partial(target: Arc<Callable>, bound: Vec<Value>, this: Option<EntityRef>) -> Value {
    Value::function(Callable::Partial { target, bound, this })
}

fn too_many_arguments(name: Option<&str>, arity: usize, given: usize) -> OhPanic {
    OhPanic::argument_mismatch(format!(
        "{} takes {} arguments but {} were given",
        name.unwrap_or("function"),
        arity,
        given
    ))
}

fn pattern_mismatch(pattern: &Pattern, value: &Value) -> OhPanic {
    OhPanic::new(
        PanicCode::PATTERN_MISMATCH,
        format!("{:?} does not fit {}", value, crate::ast::printer::pattern_text(pattern)),
    )
}

fn declare_pattern(pattern: &Pattern, value: Value, frame: &Arc<Frame>) -> Result<(), OhPanic> {
    match pattern {
        Pattern::Bind(name) => frame.declare(name.as_str(), value),
        Pattern::Wildcard => {}
        _ => {
            let bound = match_pattern(pattern, &value).ok_or_else(|| pattern_mismatch(pattern, &value))?;
            for (name, bound_value) in bound {
                frame.declare(name, bound_value);
            }
        }
    }
    Ok(())
}

pub(crate) fn out_of_bounds(index: f64, len: usize) -> OhPanic {
    OhPanic::new(
        PanicCode::INDEX_OUT_OF_BOUNDS,
        format!("index {} out of bounds for length {}", value::format_number(index), len),
    )
}

pub(crate) fn position(index: f64, len: usize) -> Result<usize, OhPanic> {
    if index >= 0.0 && index.fract() == 0.0 && (index as usize) < len {
        Ok(index as usize)
    } else {
        Err(out_of_bounds(index, len))
    }
}

fn tuple_index(object: &Value, index: usize) -> Result<Value, OhPanic> {
    let elements = object.positional().ok_or_else(|| {
        OhPanic::type_mismatch(format!("a {} has no positional members", object.type_name()))
    })?;
    let len = elements.len();
    elements
        .into_iter()
        .nth(index)
        .ok_or_else(|| out_of_bounds(index as f64, len))
}

fn iteration_items(value: &Value) -> Result<Vec<Value>, OhPanic> {
    Ok(match value {
        Value::Array(items) => items.read().clone(),
        Value::Tuple(items) => items.to_vec(),
        Value::Map(map) => map
            .read()
            .iter()
            .map(|(key, value)| Value::tuple(vec![Value::string(key), value.clone()]))
            .collect(),
        Value::Entity(entity) => entity
            .members()
            .into_iter()
            .map(|(name, value)| Value::tuple(vec![Value::from(name), value]))
            .collect(),
        Value::String(text) => text.chars().map(|c| Value::string(c.to_string())).collect(),
        Value::External(host) => match host.call_method("size", Vec::new()) {
            Ok(HostValue::Number(len)) => (0..len as usize)
                .map(|i| host.call_method("get", vec![HostValue::from(i as f64)]).map(Value::from_host))
                .collect::<Result<_, _>>()
                .map_err(host_error)?,
            _ => return Err(OhPanic::type_mismatch(format!("{} is not iterable", host.type_name()))),
        },
        other => return Err(OhPanic::type_mismatch(format!("a {} is not iterable", other.type_name()))),
    })
}

fn unary_op(op: UnaryOp, value: &Value) -> Result<Value, OhPanic> {
    match (op, value) {
        (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
        (UnaryOp::Negate, Value::Number(n)) => Ok(Value::Number(-n)),
        (UnaryOp::Plus, Value::Number(n)) => Ok(Value::Number(*n)),
        (UnaryOp::BitNot, Value::Number(n)) => Ok(Value::Number(!(*n as i64) as f64)),
        (_, other) => Err(OhPanic::type_mismatch(format!(
            "unary operator needs a number, found {}",
            other.type_name()
        ))),
    }
}

//Function: binary_op
//Purpose: Apply a non-short-circuit binary operator
//Inputs: op, left, right
//Returns: Result<Value, OhPanic>
pub(crate) fn binary_op(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, OhPanic> {
    use crate::interpreter::value::Value::Number as N;
    let mismatch = || {
        OhPanic::type_mismatch(format!(
            "cannot apply '{}' to {} and {}",
            op.symbol(),
            left.type_name(),
            right.type_name()
        ))
    };
    match op {
        BinaryOp::Add => match (left, right) {
            (N(a), N(b)) => Ok(N(a + b)),
            (Value::String(_), _) | (_, Value::String(_)) => Ok(Value::from(format!("{}{}", left, right))),
            _ => Err(mismatch()),
        },
        BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo => {
            let (N(a), N(b)) = (left, right) else {
                return Err(mismatch());
            };
            if matches!(op, BinaryOp::Divide | BinaryOp::Modulo) && *b == 0.0 {
                return Err(OhPanic::new(PanicCode::DIVIDE_BY_ZERO, "division by zero"));
            }
            Ok(N(match op {
                BinaryOp::Subtract => a - b,
                BinaryOp::Multiply => a * b,
                BinaryOp::Divide => a / b,
                _ => a % b,
            }))
        }
        BinaryOp::Equal => Ok(Value::Bool(left.equals(right))),
        BinaryOp::NotEqual => Ok(Value::Bool(!left.equals(right))),
        BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => {
            if left.is_null() || right.is_null() {
                return Err(OhPanic::new(
                    PanicCode::NULL_COMPARISON,
                    format!("cannot compare null with '{}'", op.symbol()),
                ));
            }
            let ordering = match (left, right) {
                (N(a), N(b)) => a.partial_cmp(b),
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => return Err(mismatch()),
            };
            let Some(ordering) = ordering else {
                return Ok(Value::Bool(false));
            };
            Ok(Value::Bool(match op {
                BinaryOp::Less => ordering.is_lt(),
                BinaryOp::LessEqual => ordering.is_le(),
                BinaryOp::Greater => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
        BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::ShiftLeft => {
            let (N(a), N(b)) = (left, right) else {
                return Err(mismatch());
            };
            let (a, b) = (*a as i64, *b as i64);
            Ok(N(match op {
                BinaryOp::BitAnd => a & b,
                BinaryOp::BitOr => a | b,
                BinaryOp::BitXor => a ^ b,
                _ => a.wrapping_shl(b as u32),
            } as f64))
        }
        BinaryOp::And => Ok(Value::Bool(left.is_truthy() && right.is_truthy())),
        BinaryOp::Or => Ok(Value::Bool(left.is_truthy() || right.is_truthy())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addition_concatenates_with_strings() {
        let value = binary_op(BinaryOp::Add, &Value::from("abc"), &Value::from(6)).expect("concat");
        assert_eq!(value, Value::from("abc6"));
        let value = binary_op(BinaryOp::Add, &Value::from(10), &Value::from("oh")).expect("concat");
        assert_eq!(value, Value::from("10oh"));
    }

    #[test]
    fn null_ordering_panics() {
        let err = binary_op(BinaryOp::Less, &Value::Null, &Value::from(1)).expect_err("null");
        assert_eq!(err.code, PanicCode::NULL_COMPARISON);
        let err = binary_op(BinaryOp::Less, &Value::from(true), &Value::from(1)).expect_err("bool");
        assert_eq!(err.code, PanicCode::TYPE_MISMATCH);
    }

    #[test]
    fn division_by_zero_panics() {
        let err = binary_op(BinaryOp::Modulo, &Value::from(1), &Value::from(0)).expect_err("zero");
        assert_eq!(err.code, PanicCode::DIVIDE_BY_ZERO);
    }

    #[test]
    fn positions_are_checked() {
        assert_eq!(position(1.0, 2), Ok(1));
        assert!(position(2.0, 2).is_err());
        assert!(position(-1.0, 2).is_err());
        assert!(position(0.5, 2).is_err());
    }
}

//=====================================================
// End of file
//=====================================================
