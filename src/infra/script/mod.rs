//! Rhai-backed execution runtime.
//!
//! Prepares a document by compiling its source to an AST; the AST is shared
//! by every later execution. Scripts talk back to the engine through host
//! functions bound to the current call's context:
//!
//! - `emit(text)` appends to the response body
//! - `cache_for(secs)` declares how long the output stays valid
//! - `content_type(mt)` overrides the response media type
//! - `var(name)` reads a request variable (empty string when absent)
//!
//! `run` evaluates the body with a throwaway scope; `initialize` evaluates
//! it into a retained scope; `call` dispatches a zero-argument script
//! function against that scope without re-evaluating the body.

use std::sync::Mutex;

use rhai::{AST, CallFnOptions, Dynamic, Engine, EvalAltResult, Scope};
use serde_json::Value;

use crate::domain::DocumentSource;
use crate::engine::{DocumentProgram, ProgramError, RunContext, ScriptRuntime};

const DIALECT: &str = "rhai";

#[derive(Clone, Copy)]
struct Limits {
    max_operations: u64,
}

pub struct RhaiRuntime {
    limits: Limits,
}

impl RhaiRuntime {
    /// `max_operations` bounds each evaluation; zero means unlimited.
    pub fn new(max_operations: u64) -> Self {
        Self {
            limits: Limits { max_operations },
        }
    }
}

impl ScriptRuntime for RhaiRuntime {
    fn prepare(&self, source: &DocumentSource) -> Result<Box<dyn DocumentProgram>, ProgramError> {
        if source.dialect != DIALECT {
            return Err(ProgramError::compile(format!(
                "unsupported dialect `{}`",
                source.dialect
            )));
        }

        let ast = Engine::new()
            .compile(&source.text)
            .map_err(|err| ProgramError::compile(err.to_string()))?;

        Ok(Box::new(RhaiProgram {
            limits: self.limits,
            ast,
            state: Mutex::new(Scope::new()),
        }))
    }
}

struct RhaiProgram {
    limits: Limits,
    ast: AST,
    // Module-level scope established by the one-time initializing run and
    // reused by every entry-point call.
    state: Mutex<Scope<'static>>,
}

impl DocumentProgram for RhaiProgram {
    fn run(&self, ctx: &RunContext) -> Result<(), ProgramError> {
        let engine = engine_for(self.limits, ctx);
        let mut scope = Scope::new();
        engine
            .run_ast_with_scope(&mut scope, &self.ast)
            .map_err(execution_error)
    }

    fn initialize(&self, ctx: &RunContext) -> Result<(), ProgramError> {
        let engine = engine_for(self.limits, ctx);
        let mut scope = lock_scope(&self.state);
        engine
            .run_ast_with_scope(&mut scope, &self.ast)
            .map_err(execution_error)
    }

    fn call(&self, entry: &str, ctx: &RunContext) -> Result<Value, ProgramError> {
        let engine = engine_for(self.limits, ctx);
        let mut scope = lock_scope(&self.state);
        let options = CallFnOptions::new().eval_ast(false).rewind_scope(false);

        let result: Dynamic = engine
            .call_fn_with_options(options, &mut scope, &self.ast, entry, ())
            .map_err(|err| match *err {
                EvalAltResult::ErrorFunctionNotFound(..) => ProgramError::missing_entry_point(entry),
                other => execution_error(other.into()),
            })?;

        Ok(dynamic_to_value(result))
    }

    fn has_entry(&self, entry: &str) -> bool {
        self.ast.iter_functions().any(|f| f.name == entry)
    }
}

fn lock_scope<'a>(state: &'a Mutex<Scope<'static>>) -> std::sync::MutexGuard<'a, Scope<'static>> {
    // Scope access panics only if a script host function panicked; treat the
    // retained state as still usable.
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn engine_for(limits: Limits, ctx: &RunContext) -> Engine {
    let mut engine = Engine::new();
    if limits.max_operations > 0 {
        engine.set_max_operations(limits.max_operations);
    }

    let handle = ctx.handle();
    {
        let handle = handle.clone();
        engine.register_fn("emit", move |text: &str| handle.emit(text));
    }
    {
        let handle = handle.clone();
        engine.register_fn("cache_for", move |secs: i64| handle.request_cache_for(secs));
    }
    {
        let handle = handle.clone();
        engine.register_fn("content_type", move |mt: &str| handle.set_media_type(mt));
    }
    engine.register_fn("var", move |name: &str| {
        handle.variable(name).unwrap_or_default()
    });

    engine
}

fn execution_error(err: Box<EvalAltResult>) -> ProgramError {
    ProgramError::execution(err.to_string())
}

fn dynamic_to_value(value: Dynamic) -> Value {
    if value.is_unit() {
        Value::Null
    } else if let Ok(int) = value.as_int() {
        Value::from(int)
    } else if let Ok(boolean) = value.as_bool() {
        Value::Bool(boolean)
    } else if let Ok(float) = value.as_float() {
        serde_json::Number::from_f64(float)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    } else if value.is_string() {
        Value::String(value.into_string().unwrap_or_default())
    } else {
        Value::Null
    }
}
