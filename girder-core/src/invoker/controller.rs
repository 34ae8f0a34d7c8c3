// Action phase for controller actions: activation, binding, action filters

use super::cache::ControllerActionInvokerCacheEntry;
use super::{InnerInvoker, InvokerCore, ResourceInvoker, missing_executed_context};
use crate::action_context::ControllerContext;
use crate::action_result::ActionResultTypeMapper;
use crate::diagnostics::{DiagnosticEvent, FilterMethod};
use crate::error::Error;
use crate::filters::{
    ActionExecutedContext, ActionExecutingContext, ActionExecutionDelegate, ActionFilter,
    ActionNext, ActionPhase, AsyncActionFilter, CursorItem, FilterPhase, FilterRef,
};
use crate::logging::events;
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

const INVALID_ACTION_SHORT_CIRCUIT: &str = "If an AsyncActionFilter provides a result value by setting the result of ActionExecutingContext, then it cannot call the next filter by invoking ActionExecutionDelegate.";

/// Invoker for one controller action.
pub type ControllerActionInvoker = ResourceInvoker<ControllerStage>;

/// The action phase of a controller action.
///
/// Creates the controller, binds arguments when the action has any, runs the
/// action filters around the action method and releases the controller.
pub struct ControllerStage {
    controller_context: ControllerContext,
    entry: Arc<ControllerActionInvokerCacheEntry>,
    mapper: Arc<dyn ActionResultTypeMapper>,
    action_executed: Option<ActionExecutedContext>,
}

impl ControllerStage {
    pub fn new(
        controller_context: ControllerContext,
        entry: Arc<ControllerActionInvokerCacheEntry>,
        mapper: Arc<dyn ActionResultTypeMapper>,
    ) -> Self {
        Self {
            controller_context,
            entry,
            mapper,
            action_executed: None,
        }
    }

    pub fn controller_context(&self) -> &ControllerContext {
        &self.controller_context
    }

    pub fn entry(&self) -> &Arc<ControllerActionInvokerCacheEntry> {
        &self.entry
    }
}

impl std::fmt::Debug for ControllerStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerStage")
            .field("controller_context", &self.controller_context)
            .field("executor", &self.entry.strategy)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl InnerInvoker for ControllerStage {
    async fn invoke_inner_filter(&mut self, core: &mut InvokerCore) -> Result<(), Error> {
        let filters = Arc::clone(&core.filters);
        core.cursor.reset();

        let controller = self
            .entry
            .controller_factory
            .create_controller(&self.controller_context)?;
        core.instance = Some(Arc::clone(&controller));

        let mut arguments = HashMap::new();
        if let Some(binder) = &self.entry.binder {
            binder
                .bind(&self.controller_context, &controller, &mut arguments)
                .await?;
        }

        let mut executing = ActionExecutingContext::new(
            core.action_context.clone(),
            Arc::clone(&filters),
            arguments,
            controller,
        );
        self.action_executed = None;

        let mut pipeline = ActionPipeline {
            core,
            stage: self,
            filters: &filters,
        };
        pipeline
            .next(Scope::Invoker, State::Next, &mut executing)
            .await
    }

    async fn release_resources(&mut self, core: &mut InvokerCore) -> Result<(), Error> {
        // Nothing to release when the pipeline stopped before activation
        if let Some(controller) = core.take_instance() {
            self.entry
                .controller_factory
                .release_controller(&self.controller_context, controller);
        }
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Scope {
    Invoker,
    Action,
}

#[derive(Clone, Copy)]
enum State<'f> {
    Next,
    AsyncBegin(&'f dyn AsyncActionFilter),
    AsyncEnd(&'f dyn AsyncActionFilter),
    SyncBegin(&'f dyn ActionFilter),
    SyncEnd(&'f dyn ActionFilter),
    Inside,
    End,
}

enum Step<'f> {
    Goto(State<'f>),
    /// Run the remaining filters and the method inside a sync filter
    Enter(&'f dyn ActionFilter, State<'f>),
    Return,
}

struct ActionPipeline<'p> {
    core: &'p mut InvokerCore,
    stage: &'p mut ControllerStage,
    filters: &'p [FilterRef],
}

impl<'p> ActionPipeline<'p> {
    /// Sync filters wait on `pending`; only an async filter's continuation
    /// runs as a nested future.
    fn next<'b>(
        &'b mut self,
        scope: Scope,
        mut state: State<'p>,
        executing: &'b mut ActionExecutingContext,
    ) -> BoxFuture<'b, Result<(), Error>> {
        Box::pin(async move {
            let mut pending: Vec<&'p dyn ActionFilter> = Vec::new();

            loop {
                let current = if pending.is_empty() { scope } else { Scope::Action };
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
                            self.capture_error(error, executing);
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
        executing: &mut ActionExecutingContext,
    ) -> Result<Step<'p>, Error> {
        let filters = self.filters;
        let kind = ActionPhase::KIND;

        let next = match state {
            State::Next => match self.core.cursor.next_filter::<ActionPhase>(filters) {
                Some(CursorItem::Async(filter)) => State::AsyncBegin(filter),
                Some(CursorItem::Sync(filter)) => State::SyncBegin(filter),
                None => State::Inside,
            },

            State::AsyncBegin(filter) => {
                self.core
                    .before_filter(kind, FilterMethod::OnActionExecution, filter.name());
                filter
                    .on_action_execution(&mut *executing, ActionExecutionDelegate::new(&mut *self))
                    .await?;
                State::AsyncEnd(filter)
            }

            State::AsyncEnd(filter) => {
                // Returning without calling next cancels, with or without a result
                if self.stage.action_executed.is_none() {
                    events::action_filter_short_circuited(filter.name());
                    self.stage.action_executed = Some(
                        ActionExecutedContext::new(
                            self.core.action_context.clone(),
                            Arc::clone(&self.core.filters),
                            Arc::clone(&executing.controller),
                        )
                        .with_canceled()
                        .with_result(executing.result.clone()),
                    );
                }
                self.core
                    .after_filter(kind, FilterMethod::OnActionExecution, filter.name());
                State::End
            }

            State::SyncBegin(filter) => {
                self.core
                    .before_filter(kind, FilterMethod::OnActionExecuting, filter.name());
                filter.on_action_executing(executing)?;
                self.core
                    .after_filter(kind, FilterMethod::OnActionExecuting, filter.name());

                if executing.result.is_none() {
                    return Ok(Step::Enter(filter, State::Next));
                }
                events::action_filter_short_circuited(filter.name());
                self.stage.action_executed = Some(
                    ActionExecutedContext::new(
                        self.core.action_context.clone(),
                        Arc::clone(&self.core.filters),
                        Arc::clone(&executing.controller),
                    )
                    .with_canceled()
                    .with_result(executing.result.clone()),
                );
                State::End
            }

            State::SyncEnd(filter) => {
                self.core
                    .before_filter(kind, FilterMethod::OnActionExecuted, filter.name());
                if let Some(executed) = self.stage.action_executed.as_mut() {
                    filter.on_action_executed(executed)?;
                }
                self.core
                    .after_filter(kind, FilterMethod::OnActionExecuted, filter.name());
                State::End
            }

            State::Inside => {
                self.invoke_action_method(executing).await?;
                State::End
            }

            State::End => {
                if scope == Scope::Action {
                    if self.stage.action_executed.is_none() {
                        self.stage.action_executed = Some(
                            ActionExecutedContext::new(
                                self.core.action_context.clone(),
                                Arc::clone(&self.core.filters),
                                Arc::clone(&executing.controller),
                            )
                            .with_result(self.core.result.clone()),
                        );
                    }
                } else if let Some(executed) = self.stage.action_executed.as_mut() {
                    executed.rethrow()?;
                    self.core.result = executed.result.clone();
                }
                return Ok(Step::Return);
            }
        };
        Ok(Step::Goto(next))
    }

    /// Record an error from the remaining filters or the method on the
    /// executed context.
    fn capture_error(&mut self, error: Error, executing: &ActionExecutingContext) {
        self.stage.action_executed = Some(
            ActionExecutedContext::new(
                self.core.action_context.clone(),
                Arc::clone(&self.core.filters),
                Arc::clone(&executing.controller),
            )
            .with_exception(error),
        );
    }

    async fn invoke_action_method(&mut self, executing: &ActionExecutingContext) -> Result<(), Error> {
        let entry = Arc::clone(&self.stage.entry);
        let mapper = Arc::clone(&self.stage.mapper);
        let action = Arc::clone(&self.core.action_context.action_descriptor);

        let arguments = entry.executor.prepare_arguments(&executing.action_arguments);
        let shown: Vec<String> = (0..arguments.len())
            .filter_map(|index| arguments.value(index))
            .map(|value| value.to_string())
            .collect();

        self.core.diagnose(DiagnosticEvent::BeforeActionMethod {
            action: &action,
            arguments: &shown,
        });
        events::executing_action_method(&action, &shown);

        let started = Instant::now();
        let outcome = entry
            .strategy
            .execute(
                &*mapper,
                &entry.executor,
                Arc::clone(&executing.controller),
                arguments,
            )
            .await;

        self.core.diagnose(DiagnosticEvent::AfterActionMethod {
            action: &action,
            result: outcome.as_ref().ok().map(|result| result.name()),
        });

        let result = outcome?;
        events::executed_action_method(&action, result.name(), started.elapsed());
        self.core.result = Some(result);
        Ok(())
    }
}

impl ActionNext for ActionPipeline<'_> {
    fn invoke_next<'s>(
        &'s mut self,
        context: &'s mut ActionExecutingContext,
    ) -> BoxFuture<'s, Result<(), Error>> {
        Box::pin(async move {
            if context.result.is_some() {
                return Err(Error::InvalidOperation(INVALID_ACTION_SHORT_CIRCUIT.to_string()));
            }
            if let Err(error) = self.next(Scope::Action, State::Next, context).await {
                self.capture_error(error, context);
            }
            Ok(())
        })
    }

    fn executed(&mut self) -> Result<&mut ActionExecutedContext, Error> {
        self.stage
            .action_executed
            .as_mut()
            .ok_or_else(|| missing_executed_context("action"))
    }
}
