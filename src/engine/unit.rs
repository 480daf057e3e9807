//! Prepared document units.
//!
//! A unit wraps one prepared program and separates the two entry protocols:
//! `run` re-executes the full body every call, `invoke` initializes the
//! program once and then dispatches entry-point calls against it.

use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::domain::DocumentName;

use super::context::RunContext;
use super::error::EngineError;
use super::runtime::{DocumentProgram, ProgramError};

pub struct DocumentUnit {
    name: DocumentName,
    program: Box<dyn DocumentProgram>,
    init: OnceCell<()>,
}

impl DocumentUnit {
    pub(crate) fn new(name: DocumentName, program: Box<dyn DocumentProgram>) -> Self {
        Self {
            name,
            program,
            init: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &DocumentName {
        &self.name
    }

    /// Whether the one-time initializing run has completed.
    pub fn initialized(&self) -> bool {
        self.init.initialized()
    }

    /// Execute the full top-level body, unconditionally.
    ///
    /// Every call is an independent execution; nothing is cached here and
    /// nothing carries over between calls. Effects land on `ctx`.
    pub fn run(&self, ctx: &RunContext) -> Result<(), EngineError> {
        self.program.run(ctx).map_err(|err| self.execution_error(err))
    }

    /// Call a named entry point, initializing the unit first if needed.
    ///
    /// The first caller executes the top-level body exactly once; concurrent
    /// callers wait until that run has completed and its effects are visible
    /// before dispatching their entry points. A failed initialization is not
    /// remembered: the next `invoke` retries it from scratch.
    pub async fn invoke(&self, entry: &str, ctx: &RunContext) -> Result<Value, EngineError> {
        self.init
            .get_or_try_init(|| async {
                debug!(document = %self.name, "initializing document unit");
                self.program
                    .initialize(ctx)
                    .map_err(|err| self.execution_error(err))
            })
            .await?;

        if !self.program.has_entry(entry) {
            return Err(EngineError::entry_point_not_found(self.name.clone(), entry));
        }

        self.program.call(entry, ctx).map_err(|err| match err {
            ProgramError::MissingEntryPoint { entry } => {
                EngineError::entry_point_not_found(self.name.clone(), entry)
            }
            other => self.execution_error(other),
        })
    }

    fn execution_error(&self, err: ProgramError) -> EngineError {
        EngineError::execution(self.name.clone(), err.to_string())
    }
}
