//! Async tree-walking interpreter. Evaluates a CST against a scope chain.
//!
//! Every evaluation step returns a boxed future so host calls and `sleep`
//! suspend only the run that issued them. Built-in functions live in the
//! global registry and the per-type method tables; the interpreter holds no
//! hardcoded function implementations.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, FutureExt};

use crate::bridge::{BridgeError, HostBridge, HostRequest};
use crate::error::{ErrorCode, RuntimeError};
use crate::namespaces::GLOBALS;
use crate::runtime::member::{get_member, get_prop, Place};
use crate::runtime::scope::Scope;
use crate::runtime::value::{Closure, NativeCall, NativeFn, Value};
use crate::syntax::cst::{Expression, Identifier, LogicalOp, Program, Span, Statement, UpdateOp};
use crate::types::ops;
use crate::types::string::utf16_units;
use crate::types::time::{Clock, SystemClock};

pub const MAX_ITERATIONS: usize = 100_000;
pub const MAX_CALL_DEPTH: usize = 256;
pub const MAX_SLEEP_MS: f64 = 10_000.0;
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(5_000);
/// Loop iterations and calls between yields to the executor.
const YIELD_EVERY: u64 = 1024;

// ─── Control flow ─────────────────────────────────────────────────────────────

/// Local control transfer. Stops at the nearest loop or function boundary.
#[derive(Debug)]
pub enum Interrupt {
    Continue,
    Break,
    Return(Value),
}

/// Non-local exit. Crosses every function and loop up to the program root.
#[derive(Debug)]
pub enum Unwind {
    Reply(Value),
    Error(RuntimeError),
    /// Anything that is not the script's fault: transport, codec, host.
    Internal(String),
}

impl From<RuntimeError> for Unwind {
    fn from(e: RuntimeError) -> Self {
        Self::Error(e)
    }
}

type Flow = Result<Option<Interrupt>, Unwind>;

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    Reply(Value),
    /// Ran off the end or hit a top-level `return`.
    Fallthrough,
    Error(RuntimeError),
    Internal(String),
}

fn err(code: ErrorCode, span: Span, msg: impl Into<String>) -> Unwind {
    Unwind::Error(RuntimeError::new(code, span.line, span.column, msg))
}

// ─── Interpreter ──────────────────────────────────────────────────────────────

pub struct Interpreter {
    bridge: Arc<dyn HostBridge>,
    clock: Arc<dyn Clock>,
    call_timeout: Duration,
    depth: usize,
    steps: u64,
    guild_id: Option<String>,
    channel_id: Option<String>,
}

impl Interpreter {
    pub fn new(bridge: Arc<dyn HostBridge>) -> Self {
        Self {
            bridge,
            clock: Arc::new(SystemClock),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            depth: 0,
            steps: 0,
            guild_id: None,
            channel_id: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Guild and channel the triggering message came from. Host lookups
    /// that take a bare id resolve against these.
    pub fn with_context(mut self, guild_id: Option<String>, channel_id: Option<String>) -> Self {
        self.guild_id = guild_id;
        self.channel_id = channel_id;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn guild_id(&self) -> Option<&str> {
        self.guild_id.as_deref()
    }

    pub fn channel_id(&self) -> Option<&str> {
        self.channel_id.as_deref()
    }

    /// One round-trip to the host. A rejection is the script's problem;
    /// anything else is an internal fault.
    pub async fn host_call(&self, request: HostRequest, span: Span) -> Result<serde_json::Value, Unwind> {
        let method = request.method();
        tracing::trace!(method, "host call");
        match self.bridge.call(request, Some(self.call_timeout)).await {
            Ok(v) => Ok(v),
            Err(BridgeError::Rejected(msg)) => Err(err(ErrorCode::R010, span, format!("{method}: {msg}"))),
            Err(e) => {
                tracing::warn!(method, error = %e, "host call failed");
                Err(Unwind::Internal(format!("{method}: {e}")))
            }
        }
    }

    // ─── Entry point ──────────────────────────────────────────────────────────

    /// Execute `program` in a fresh frame below `globals`.
    pub async fn run(&mut self, program: &Program, globals: Arc<Scope>) -> RunOutcome {
        let root = Scope::child(&globals);
        match self.exec_list(&program.body, &root).await {
            Ok(_) => RunOutcome::Fallthrough,
            Err(Unwind::Reply(v)) => RunOutcome::Reply(v),
            Err(Unwind::Error(e)) => RunOutcome::Error(e),
            Err(Unwind::Internal(m)) => RunOutcome::Internal(m),
        }
    }

    // ─── Statement executor ───────────────────────────────────────────────────

    pub fn exec_list<'a>(&'a mut self, body: &'a [Statement], scope: &'a Arc<Scope>) -> BoxFuture<'a, Flow> {
        async move {
            for stmt in body {
                if let Some(interrupt) = self.exec(stmt, scope).await? {
                    return Ok(Some(interrupt));
                }
            }
            Ok(None)
        }
        .boxed()
    }

    pub fn exec<'a>(&'a mut self, stmt: &'a Statement, scope: &'a Arc<Scope>) -> BoxFuture<'a, Flow> {
        async move {
            match stmt {
                Statement::Block { body, .. } => {
                    let inner = Scope::child(scope);
                    self.exec_list(body, &inner).await
                }

                Statement::Function(func) => {
                    let name = func.name.clone().unwrap_or_default();
                    check_declarable(&name, func.span)?;
                    let closure = Closure { func: func.clone(), scope: scope.clone() };
                    scope.declare(name, Value::Function(Arc::new(closure)));
                    Ok(None)
                }

                Statement::If { test, consequent, alternate, .. } => {
                    if self.eval(test, scope).await?.truthy() {
                        self.exec(consequent, scope).await
                    } else if let Some(alt) = alternate {
                        self.exec(alt, scope).await
                    } else {
                        Ok(None)
                    }
                }

                Statement::While { test, body, span } => {
                    let mut iterations = 0;
                    while self.eval(test, scope).await?.truthy() {
                        iterations = tick(iterations, "while loop", *span)?;
                        self.step().await;
                        let inner = Scope::child(scope);
                        match self.exec(body, &inner).await? {
                            Some(Interrupt::Break) => break,
                            Some(ret @ Interrupt::Return(_)) => return Ok(Some(ret)),
                            Some(Interrupt::Continue) | None => {}
                        }
                    }
                    Ok(None)
                }

                Statement::For { init, test, update, body, span } => {
                    let header = Scope::child(scope);
                    if let Some(init) = init {
                        self.eval(init, &header).await?;
                    }
                    let mut iterations = 0;
                    loop {
                        if let Some(test) = test {
                            if !self.eval(test, &header).await?.truthy() {
                                break;
                            }
                        }
                        iterations = tick(iterations, "for loop", *span)?;
                        self.step().await;
                        let inner = Scope::child(&header);
                        match self.exec(body, &inner).await? {
                            Some(Interrupt::Break) => break,
                            Some(ret @ Interrupt::Return(_)) => return Ok(Some(ret)),
                            Some(Interrupt::Continue) | None => {}
                        }
                        if let Some(update) = update {
                            self.eval(update, &header).await?;
                        }
                    }
                    Ok(None)
                }

                Statement::ForOf { binding, iterable, body, span } => {
                    let source = self.eval(iterable, scope).await?;
                    let items = iterate(&source, *span)?;
                    check_declarable(&binding.name, binding.span)?;

                    // One cell in the header frame, reassigned per item.
                    let header = Scope::child(scope);
                    header.declare(binding.name.clone(), Value::Null);
                    let mut iterations = 0;
                    for item in items {
                        iterations = tick(iterations, "for...of loop", *span)?;
                        self.step().await;
                        header.declare(binding.name.clone(), item);
                        let inner = Scope::child(&header);
                        match self.exec(body, &inner).await? {
                            Some(Interrupt::Break) => break,
                            Some(ret @ Interrupt::Return(_)) => return Ok(Some(ret)),
                            Some(Interrupt::Continue) | None => {}
                        }
                    }
                    Ok(None)
                }

                Statement::Return { argument, .. } => {
                    let value = match argument {
                        Some(e) => self.eval(e, scope).await?,
                        None => Value::Null,
                    };
                    Ok(Some(Interrupt::Return(value)))
                }

                Statement::Reply { argument, .. } => {
                    let value = match argument {
                        Some(e) => self.eval(e, scope).await?,
                        None => Value::Null,
                    };
                    Err(Unwind::Reply(value))
                }

                Statement::Sleep { argument, span } => {
                    let ms = match self.eval(argument, scope).await? {
                        Value::Number(n) | Value::Duration(n) => n,
                        other => return Err(err(ErrorCode::R007, *span, format!(
                            "sleep expects a number of milliseconds, got {}", other.type_name()
                        ))),
                    };
                    let ms = if ms.is_nan() { 0.0 } else { ms.clamp(0.0, MAX_SLEEP_MS) };
                    tokio::time::sleep(Duration::from_millis(ms as u64)).await;
                    Ok(None)
                }

                Statement::Break { .. } => Ok(Some(Interrupt::Break)),
                Statement::Continue { .. } => Ok(Some(Interrupt::Continue)),
                Statement::Empty { .. } => Ok(None),

                Statement::Expression { expression, .. } => {
                    self.eval(expression, scope).await?;
                    Ok(None)
                }
            }
        }
        .boxed()
    }

    // ─── Expression evaluator ─────────────────────────────────────────────────

    pub fn eval<'a>(&'a mut self, expr: &'a Expression, scope: &'a Arc<Scope>) -> BoxFuture<'a, Result<Value, Unwind>> {
        async move {
            match expr {
                Expression::Number { value, .. }  => Ok(Value::Number(*value)),
                Expression::String { value, .. }  => Ok(Value::String(value.clone())),
                Expression::Boolean { value, .. } => Ok(Value::Boolean(*value)),
                Expression::Null { .. }           => Ok(Value::Null),

                Expression::Identifier(id) => scope
                    .lookup(&id.name)
                    .or_else(|| GLOBALS.get(&id.name))
                    .ok_or_else(|| undeclared(id)),

                Expression::Array { elements, .. } => {
                    let mut items = Vec::with_capacity(elements.len());
                    for e in elements {
                        items.push(self.eval(e, scope).await?);
                    }
                    Ok(Value::array(items))
                }

                Expression::Object { properties, .. } => {
                    let mut props = indexmap::IndexMap::with_capacity(properties.len());
                    for p in properties {
                        props.insert(p.key.clone(), self.eval(&p.value, scope).await?);
                    }
                    Ok(Value::object(props))
                }

                Expression::Function(func) => Ok(Value::Function(Arc::new(Closure {
                    func: func.clone(),
                    scope: scope.clone(),
                }))),

                Expression::Property { object, name, span } => {
                    let target = self.eval(object, scope).await?;
                    Ok(get_prop(&target, name, *span)?)
                }

                Expression::Index { object, index, span } => {
                    let target = self.eval(object, scope).await?;
                    let key = self.eval(index, scope).await?;
                    Ok(get_member(&target, &key, *span)?)
                }

                Expression::Call { callee, arguments, span } => {
                    let f = self.eval(callee, scope).await?;
                    let mut args = Vec::with_capacity(arguments.len());
                    for a in arguments {
                        args.push(self.eval(a, scope).await?);
                    }
                    self.call(f, args, *span).await
                }

                Expression::Unary { op, argument, span } => {
                    let v = self.eval(argument, scope).await?;
                    Ok(ops::unary(*op, &v, *span)?)
                }

                Expression::Binary { op, left, right, span } => {
                    let l = self.eval(left, scope).await?;
                    let r = self.eval(right, scope).await?;
                    Ok(ops::binary(*op, &l, &r, *span)?)
                }

                Expression::Logical { op, left, right, .. } => {
                    let l = self.eval(left, scope).await?;
                    match (op, l.truthy()) {
                        (LogicalOp::And, false) | (LogicalOp::Or, true) => Ok(l),
                        _ => self.eval(right, scope).await,
                    }
                }

                Expression::Conditional { test, consequent, alternate, .. } => {
                    if self.eval(test, scope).await?.truthy() {
                        self.eval(consequent, scope).await
                    } else {
                        self.eval(alternate, scope).await
                    }
                }

                Expression::Assignment { op, target, value, span } => {
                    let mut place = self.place(target, scope).await?;
                    let rhs = self.eval(value, scope).await?;
                    let new = match op.binary() {
                        None => rhs,
                        Some(bin) => ops::binary(bin, place.value(), &rhs, *span)?,
                    };
                    place.update(new.clone(), *span)?;
                    Ok(new)
                }

                Expression::Update { op, target, span } => {
                    let mut place = self.place(target, scope).await?;
                    let old = match place.value() {
                        Value::Number(n) => *n,
                        other => {
                            let symbol = if *op == UpdateOp::Increment { "++" } else { "--" };
                            return Err(err(ErrorCode::R006, *span, format!(
                                "cannot apply '{symbol}' to {}", other.type_name()
                            )));
                        }
                    };
                    let new = if *op == UpdateOp::Increment { old + 1.0 } else { old - 1.0 };
                    place.update(Value::Number(new), *span)?;
                    Ok(Value::Number(old))
                }
            }
        }
        .boxed()
    }

    /// Resolve an assignment target. A bare-`=` identifier that is not yet
    /// declared gets a Null cell in the current frame.
    fn place<'a>(&'a mut self, target: &'a Expression, scope: &'a Arc<Scope>) -> BoxFuture<'a, Result<Place, Unwind>> {
        async move {
            match target {
                Expression::Identifier(id) => {
                    if id.name.starts_with('$') || GLOBALS.is_reserved(&id.name) {
                        return Err(err(ErrorCode::R008, id.span, format!(
                            "'{}' is reserved and cannot be assigned", id.name
                        )));
                    }
                    if let Some(owner) = scope.owner(&id.name) {
                        let value = owner.lookup(&id.name).unwrap_or(Value::Null);
                        return Ok(Place::Variable { scope: owner, name: id.name.clone(), value });
                    }
                    if !id.declares {
                        return Err(undeclared(id));
                    }
                    scope.declare(id.name.clone(), Value::Null);
                    Ok(Place::Variable { scope: scope.clone(), name: id.name.clone(), value: Value::Null })
                }
                Expression::Property { object, name, span } => {
                    let parent = self.eval(object, scope).await?;
                    let value = get_prop(&parent, name, *span)?;
                    Ok(Place::Member { parent, key: Value::String(name.clone()), value })
                }
                Expression::Index { object, index, span } => {
                    let parent = self.eval(object, scope).await?;
                    let key = self.eval(index, scope).await?;
                    let value = get_member(&parent, &key, *span)?;
                    Ok(Place::Member { parent, key, value })
                }
                other => Err(err(ErrorCode::R011, other.span(), "invalid assignment target")),
            }
        }
        .boxed()
    }

    /// Count one unit of work. Every [`YIELD_EVERY`] units the run yields,
    /// so a run that never awaits the host can still be aborted.
    async fn step(&mut self) {
        self.steps += 1;
        if self.steps % YIELD_EVERY == 0 {
            tokio::task::yield_now().await;
        }
    }

    // ─── Call dispatch ────────────────────────────────────────────────────────

    /// Call a user function or built-in with already evaluated arguments.
    pub fn call(&mut self, callee: Value, args: Vec<Value>, span: Span) -> BoxFuture<'_, Result<Value, Unwind>> {
        async move {
            match callee {
                Value::Function(closure) => {
                    if self.depth >= MAX_CALL_DEPTH {
                        return Err(err(ErrorCode::R009, span, format!(
                            "maximum call depth of {MAX_CALL_DEPTH} exceeded"
                        )));
                    }
                    let frame = Scope::child(&closure.scope);
                    let mut args = args.into_iter();
                    for param in &closure.func.params {
                        frame.declare(param.clone(), args.next().unwrap_or(Value::Null));
                    }

                    self.step().await;
                    self.depth += 1;
                    let flow = self.exec_list(&closure.func.body, &frame).await;
                    self.depth -= 1;

                    match flow? {
                        Some(Interrupt::Return(v)) => Ok(v),
                        _ => Ok(Value::Null),
                    }
                }
                Value::NativeFunction(native) => match native.func {
                    NativeFn::Pure(f) => Ok(f(&native.this, &args, span)?),
                    NativeFn::Async(f) => f(self, NativeCall { this: native.this.clone(), args, span }).await,
                },
                other => Err(err(ErrorCode::R003, span, format!(
                    "value of type {} is not a function", other.type_name()
                ))),
            }
        }
        .boxed()
    }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

/// Count one loop iteration against the ceiling.
fn tick(count: usize, what: &str, span: Span) -> Result<usize, Unwind> {
    let count = count + 1;
    if count > MAX_ITERATIONS {
        return Err(err(ErrorCode::R002, span, format!(
            "{what} is iterating more than {MAX_ITERATIONS} times"
        )));
    }
    Ok(count)
}

fn undeclared(id: &Identifier) -> Unwind {
    err(ErrorCode::R001, id.span, format!("Variable '{}' not declared yet", id.name))
}

/// New variables may not shadow built-ins or context names.
fn check_declarable(name: &str, span: Span) -> Result<(), Unwind> {
    if name.starts_with('$') || GLOBALS.is_reserved(name) {
        return Err(err(ErrorCode::R008, span, format!("'{name}' is reserved and cannot be redeclared")));
    }
    Ok(())
}

/// The sequence a `for...of` walks. Arrays and objects are snapshotted.
fn iterate(source: &Value, span: Span) -> Result<Box<dyn Iterator<Item = Value> + Send>, Unwind> {
    Ok(match source {
        Value::Number(n) => {
            let n = *n;
            Box::new((0u64..).map(|i| i as f64).take_while(move |i| *i < n).map(Value::Number))
        }
        Value::String(s) => Box::new(utf16_units(s).into_iter().map(Value::String)),
        Value::Array(items) => {
            let snapshot = items.read().clone();
            Box::new(snapshot.into_iter())
        }
        Value::Object(o) => {
            let values: Vec<Value> = o.props.read().values().cloned().collect();
            Box::new(values.into_iter())
        }
        other => return Err(err(ErrorCode::R005, span, format!("cannot iterate over {}", other.type_name()))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::NoHost;
    use crate::syntax::parser::parse;

    async fn run(src: &str) -> RunOutcome {
        let program = parse(src).unwrap();
        let mut interp = Interpreter::new(Arc::new(NoHost));
        interp.run(&program, Scope::root()).await
    }

    async fn reply(src: &str) -> Value {
        match run(src).await {
            RunOutcome::Reply(v) => v,
            other => panic!("expected reply, got {other:?}"),
        }
    }

    async fn fails(src: &str) -> RuntimeError {
        match run(src).await {
            RunOutcome::Error(e) => e,
            other => panic!("expected runtime error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn arithmetic_and_precedence() {
        assert_eq!(reply("reply 1 + 2 * 3 ^ 2").await.as_number(), Some(19.0));
        assert_eq!(reply("reply (1 + 2) * 3").await.as_number(), Some(9.0));
    }

    #[tokio::test]
    async fn declare_by_assignment() {
        assert_eq!(reply("x = 4\nx += 1\nreply x").await.as_number(), Some(5.0));
        let e = fails("y += 1").await;
        assert_eq!(e.code, ErrorCode::R001);
        assert_eq!(e.message, "Variable 'y' not declared yet");
    }

    #[tokio::test]
    async fn block_scope_hides_inner_variables() {
        let e = fails("{ inner = 1 }\nreply inner").await;
        assert_eq!(e.code, ErrorCode::R001);
        assert_eq!(reply("outer = 1\n{ outer = 2 }\nreply outer").await.as_number(), Some(2.0));
    }

    #[tokio::test]
    async fn closures_capture_their_scope() {
        let src = "func counter() { n = 0\n return func() { n += 1\n return n } }\n\
                   c = counter()\nc()\nc()\nreply c()";
        assert_eq!(reply(src).await.as_number(), Some(3.0));
    }

    #[tokio::test]
    async fn recursion_and_missing_params() {
        let src = "func fib(n) { return n < 2 then n else fib(n - 1) + fib(n - 2) }\nreply fib(15)";
        assert_eq!(reply(src).await.as_number(), Some(610.0));
        assert!(reply("func f(a, b) { return b }\nreply f(1)").await.is_null());
    }

    #[tokio::test]
    async fn call_depth_is_capped() {
        let e = fails("func f() { return f() }\nf()").await;
        assert_eq!(e.code, ErrorCode::R009);
    }

    #[tokio::test]
    async fn busy_runs_can_be_aborted() {
        let program = parse("func spin() { for (i of 90000) {} }\nfor (j of 90000) spin()").unwrap();
        let job = tokio::spawn(async move {
            let mut interp = Interpreter::new(Arc::new(NoHost));
            interp.run(&program, Scope::root()).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        job.abort();
        assert!(job.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn reply_unwinds_through_loops_and_calls() {
        let src = "func f() { for (i of 10) { if (i == 3) reply i } }\nf()\nreply -1";
        assert_eq!(reply(src).await.as_number(), Some(3.0));
    }

    #[tokio::test]
    async fn top_level_return_falls_through() {
        assert!(matches!(run("return 5\nreply 1").await, RunOutcome::Fallthrough));
    }

    #[tokio::test]
    async fn loop_ceiling() {
        let e = fails("while (true) {}").await;
        assert_eq!(e.code, ErrorCode::R002);
        assert_eq!(e.message, "while loop is iterating more than 100000 times");
        let e = fails("for (i = 0; ; i++) {}").await;
        assert_eq!(e.message, "for loop is iterating more than 100000 times");
        let e = fails("for (i of 1e9) {}").await;
        assert_eq!(e.message, "for...of loop is iterating more than 100000 times");
    }

    #[tokio::test]
    async fn for_of_dispatch() {
        assert_eq!(reply("s = 0\nfor (i of 4) s += i\nreply s").await.as_number(), Some(6.0));
        assert_eq!(reply("s = ''\nfor (c of 'abc') { if (c == 'c') break\n s += c }\nreply s").await.as_str(), Some("ab"));
        assert_eq!(reply("s = 0\nfor (v of {a: 1, b: 2}) s += v\nreply s").await.as_number(), Some(3.0));
        assert_eq!(fails("for (x of null) {}").await.code, ErrorCode::R005);
    }

    #[tokio::test]
    async fn classic_for_with_continue() {
        let src = "s = 0\nfor (i = 0; i < 5; i++) { if (i % 2 == 0) continue\n s += i }\nreply s";
        assert_eq!(reply(src).await.as_number(), Some(4.0));
    }

    #[tokio::test]
    async fn member_mutation() {
        assert_eq!(reply("arr = [1, 2]\narr[0] = 9\nreply arr").await.stringify(), "9,2");
        assert_eq!(reply("obj = {a: {}}\nobj.a.b = 2\nreply obj.a.b").await.as_number(), Some(2.0));
        assert_eq!(reply("o = {n: 1}\no.n++\no['n'] *= 10\nreply o.n").await.as_number(), Some(20.0));
    }

    #[tokio::test]
    async fn update_returns_old_value() {
        assert_eq!(reply("i = 1\nj = i++\nreply [i, j]").await.stringify(), "2,1");
        assert_eq!(fails("s = 'a'\ns++").await.code, ErrorCode::R006);
    }

    #[tokio::test]
    async fn logical_operators_return_operands() {
        assert_eq!(reply("reply null or 'x'").await.as_str(), Some("x"));
        assert_eq!(reply("reply 0 && 'y'").await.as_str(), Some("y"));
        assert!(reply("reply false and missing()").await.as_str().is_none());
    }

    #[tokio::test]
    async fn reserved_names() {
        assert_eq!(fails("floor = 1").await.code, ErrorCode::R008);
        assert_eq!(fails("$msg = 1").await.code, ErrorCode::R008);
        assert_eq!(fails("func now() {}").await.code, ErrorCode::R008);
    }

    #[tokio::test]
    async fn calling_a_non_function() {
        let e = fails("x = 1\nx()").await;
        assert_eq!(e.code, ErrorCode::R003);
        assert_eq!((e.line, e.column), (2, 1));
    }

    #[tokio::test]
    async fn array_callbacks() {
        assert_eq!(reply("reply [1, 2, 3].map(func(x) { return x * 2 })").await.stringify(), "2,4,6");
        assert_eq!(reply("reply [3, 1, 2].sort(func(a, b) { return b - a })").await.stringify(), "3,2,1");
        assert_eq!(reply("reply [1, 2, 3].reduce(func(a, x) { return a + x }, 10)").await.as_number(), Some(16.0));
        assert_eq!(reply("reply [1, 2, 3].findIndex(func(x) { return x > 1 })").await.as_number(), Some(1.0));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_is_clamped() {
        let started = tokio::time::Instant::now();
        assert!(matches!(run("sleep 60000").await, RunOutcome::Fallthrough));
        let slept = started.elapsed();
        assert!(slept >= Duration::from_millis(MAX_SLEEP_MS as u64));
        assert!(slept < Duration::from_millis(MAX_SLEEP_MS as u64 + 1_000));
    }
}
