// Result phase: result filters around the execution of the chosen result

use super::{InvokerCore, missing_executed_context};
use crate::action_result::{ActionResultRef, EmptyResult};
use crate::diagnostics::{DiagnosticEvent, FilterMethod};
use crate::error::Error;
use crate::filters::{
    AlwaysRunResultPhase, AsyncResultFilter, CursorItem, FilterCursor, FilterPhase, FilterRef,
    ResultExecutedContext, ResultExecutingContext, ResultExecutionDelegate, ResultFilter,
    ResultNext, ResultPhase,
};
use crate::logging::events;
use futures_util::future::BoxFuture;
use std::sync::Arc;

const INVALID_RESULT_SHORT_CIRCUIT: &str = "If an AsyncResultFilter cancels execution by setting the cancel flag of ResultExecutingContext to 'true', then it cannot call the next filter by invoking ResultExecutionDelegate.";

/// Which result filters take part in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResultKind {
    /// Every result filter; the normal path
    Result,
    /// Only always-run filters; after a short-circuit or a handled error
    AlwaysRun,
}

type ResultItem<'f> = CursorItem<'f, dyn ResultFilter, dyn AsyncResultFilter>;

impl ResultKind {
    fn label(self) -> &'static str {
        match self {
            ResultKind::Result => ResultPhase::KIND,
            ResultKind::AlwaysRun => AlwaysRunResultPhase::KIND,
        }
    }

    fn next_filter<'f>(self, cursor: &mut FilterCursor, filters: &'f [FilterRef]) -> Option<ResultItem<'f>> {
        match self {
            ResultKind::Result => cursor.next_filter::<ResultPhase>(filters),
            ResultKind::AlwaysRun => cursor.next_filter::<AlwaysRunResultPhase>(filters),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Scope {
    Invoker,
    Result,
}

#[derive(Clone, Copy)]
enum State<'f> {
    Begin,
    Next,
    AsyncBegin(&'f dyn AsyncResultFilter),
    AsyncEnd(&'f dyn AsyncResultFilter),
    SyncBegin(&'f dyn ResultFilter),
    SyncEnd(&'f dyn ResultFilter),
    Inside,
    End,
}

enum Step<'f> {
    Goto(State<'f>),
    /// Run the rest of the phase inside a sync filter
    Enter(&'f dyn ResultFilter, State<'f>),
    Return,
}

/// Run the result filters of `kind` and then the result in `core.result`.
///
/// An unhandled error from a filter or the result is returned.
pub(crate) async fn invoke_result_filters(core: &mut InvokerCore, kind: ResultKind) -> Result<(), Error> {
    let filters = Arc::clone(&core.filters);
    let mut executing = ResultExecutingContext::new(
        core.action_context.clone(),
        Arc::clone(&filters),
        core.result.clone(),
        core.instance.clone(),
    );
    core.result_executed = None;

    let mut pipeline = ResultPipeline {
        core,
        filters: &filters,
        kind,
    };
    pipeline.next(Scope::Invoker, State::Begin, &mut executing).await
}

struct ResultPipeline<'p> {
    core: &'p mut InvokerCore,
    filters: &'p [FilterRef],
    kind: ResultKind,
}

impl<'p> ResultPipeline<'p> {
    /// Sync filters wait on `pending` rather than on a nested future, so
    /// only async filters deepen the stack.
    fn next<'b>(
        &'b mut self,
        scope: Scope,
        mut state: State<'p>,
        executing: &'b mut ResultExecutingContext,
    ) -> BoxFuture<'b, Result<(), Error>> {
        Box::pin(async move {
            let mut pending: Vec<&'p dyn ResultFilter> = Vec::new();

            loop {
                let current = if pending.is_empty() { scope } else { Scope::Result };
                state = match self.step(current, state, executing).await {
                    Ok(Step::Goto(next)) => next,
                    Ok(Step::Enter(filter, next)) => {
                        pending.push(filter);
                        next
                    }
                    Ok(Step::Return) => match pending.pop() {
                        Some(filter) => State::SyncEnd(filter),
                        None => return Ok(()),
                    },
                    Err(error) => match pending.pop() {
                        Some(filter) => {
                            self.capture_error(error);
                            State::SyncEnd(filter)
                        }
                        None => return Err(error),
                    },
                };
            }
        })
    }

    async fn step(
        &mut self,
        scope: Scope,
        state: State<'p>,
        executing: &mut ResultExecutingContext,
    ) -> Result<Step<'p>, Error> {
        let filters = self.filters;
        let kind = self.kind.label();

        let next = match state {
            State::Begin => {
                self.core.cursor.reset();
                State::Next
            }

            State::Next => match self.kind.next_filter(&mut self.core.cursor, filters) {
                Some(CursorItem::Async(filter)) => State::AsyncBegin(filter),
                Some(CursorItem::Sync(filter)) => State::SyncBegin(filter),
                None => State::Inside,
            },

            State::AsyncBegin(filter) => {
                self.core
                    .before_filter(kind, FilterMethod::OnResultExecution, filter.name());
                filter
                    .on_result_execution(&mut *executing, ResultExecutionDelegate::new(&mut *self))
                    .await?;
                State::AsyncEnd(filter)
            }

            State::AsyncEnd(filter) => {
                // Not calling next and setting cancel both skip the result
                if self.core.result_executed.is_none() || executing.cancel {
                    events::result_filter_short_circuited(filter.name());
                    self.core.result_executed = Some(
                        ResultExecutedContext::new(
                            self.core.action_context.clone(),
                            Arc::clone(&self.core.filters),
                            executing.result.clone(),
                            self.core.instance.clone(),
                        )
                        .with_canceled(),
                    );
                }
                self.core
                    .after_filter(kind, FilterMethod::OnResultExecution, filter.name());
                State::End
            }

            State::SyncBegin(filter) => {
                self.core
                    .before_filter(kind, FilterMethod::OnResultExecuting, filter.name());
                filter.on_result_executing(executing)?;
                self.core
                    .after_filter(kind, FilterMethod::OnResultExecuting, filter.name());

                if !executing.cancel {
                    return Ok(Step::Enter(filter, State::Next));
                }
                events::result_filter_short_circuited(filter.name());
                self.core.result_executed = Some(
                    ResultExecutedContext::new(
                        self.core.action_context.clone(),
                        Arc::clone(&self.core.filters),
                        executing.result.clone(),
                        self.core.instance.clone(),
                    )
                    .with_canceled(),
                );
                State::End
            }

            State::SyncEnd(filter) => {
                self.core
                    .before_filter(kind, FilterMethod::OnResultExecuted, filter.name());
                if let Some(executed) = self.core.result_executed.as_mut() {
                    filter.on_result_executed(executed)?;
                }
                self.core
                    .after_filter(kind, FilterMethod::OnResultExecuted, filter.name());
                State::End
            }

            State::Inside => {
                // No result at this point still executes, as an empty one
                let result = executing.result.clone().unwrap_or_else(EmptyResult::shared);
                self.core.result = Some(Arc::clone(&result));
                invoke_result(&*self.core, &result).await?;
                State::End
            }

            State::End => {
                if scope == Scope::Result {
                    if self.core.result_executed.is_none() {
                        self.core.result_executed = Some(ResultExecutedContext::new(
                            self.core.action_context.clone(),
                            Arc::clone(&self.core.filters),
                            self.core.result.clone(),
                            self.core.instance.clone(),
                        ));
                    }
                } else if let Some(executed) = self.core.result_executed.as_mut() {
                    executed.rethrow()?;
                }
                return Ok(Step::Return);
            }
        };
        Ok(Step::Goto(next))
    }

    /// Record an error from the rest of the phase on the executed context.
    fn capture_error(&mut self, error: Error) {
        self.core.result_executed = Some(
            ResultExecutedContext::new(
                self.core.action_context.clone(),
                Arc::clone(&self.core.filters),
                self.core.result.clone(),
                self.core.instance.clone(),
            )
            .with_exception(error),
        );
    }
}

impl ResultNext for ResultPipeline<'_> {
    fn invoke_next<'s>(
        &'s mut self,
        context: &'s mut ResultExecutingContext,
    ) -> BoxFuture<'s, Result<(), Error>> {
        Box::pin(async move {
            if context.cancel {
                return Err(Error::InvalidOperation(INVALID_RESULT_SHORT_CIRCUIT.to_string()));
            }
            if let Err(error) = self.next(Scope::Result, State::Next, context).await {
                self.capture_error(error);
            }
            Ok(())
        })
    }

    fn executed(&mut self) -> Result<&mut ResultExecutedContext, Error> {
        self.core
            .result_executed
            .as_mut()
            .ok_or_else(|| missing_executed_context("result"))
    }
}

async fn invoke_result(core: &InvokerCore, result: &ActionResultRef) -> Result<(), Error> {
    let action = &core.action_context.action_descriptor;

    core.diagnose(DiagnosticEvent::BeforeActionResult {
        action,
        result: result.name(),
    });
    events::before_executing_action_result(result.name());

    let outcome = result.execute_result(&core.action_context).await;

    core.diagnose(DiagnosticEvent::AfterActionResult {
        action,
        result: result.name(),
    });
    events::after_executing_action_result(result.name());

    outcome
}
