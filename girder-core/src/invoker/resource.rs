// Authorization, resource and exception phases, and the invocation wrapper

use super::result::{ResultKind, invoke_result_filters};
use super::{ActionInvoker, InnerInvoker, InvokerCore, missing_executed_context};
use crate::action_result::EmptyResult;
use crate::diagnostics::{DiagnosticEvent, FilterMethod};
use crate::error::Error;
use crate::filters::{
    ActionPhase, AsyncAuthorizationFilter, AsyncExceptionFilter, AsyncResourceFilter,
    AuthorizationFilter, AuthorizationPhase, CursorItem, ExceptionContext, ExceptionFilter,
    ExceptionPhase, FilterPhase, FilterRef, ResourceExecutedContext, ResourceExecutingContext,
    ResourceExecutionDelegate, ResourceFilter, ResourceNext, ResourcePhase, ResultPhase,
    filters_of_phase,
};
use crate::logging::events;
use futures_util::future::BoxFuture;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

const INVALID_RESOURCE_SHORT_CIRCUIT: &str = "If an AsyncResourceFilter provides a result value by setting the result of ResourceExecutingContext, then it cannot call the next filter by invoking ResourceExecutionDelegate.";

/// Runs the authorization, resource, exception and result phases around an
/// [`InnerInvoker`].
pub struct ResourceInvoker<I> {
    core: InvokerCore,
    inner: I,
}

impl<I: InnerInvoker> ResourceInvoker<I> {
    pub fn new(core: InvokerCore, inner: I) -> Self {
        Self { core, inner }
    }

    pub fn core(&self) -> &InvokerCore {
        &self.core
    }

    pub fn inner(&self) -> &I {
        &self.inner
    }

    /// Run the whole pipeline.
    ///
    /// Resources are released exactly once whatever the outcome. When both
    /// the pipeline and the release fail, the pipeline error is returned.
    pub async fn execute(mut self) -> Result<(), Error> {
        let action = Arc::clone(&self.core.action_context.action_descriptor);
        self.core.diagnose(DiagnosticEvent::BeforeAction { action: &action });

        let span = events::action_span(&action);
        let outcome = async {
            events::executing_action(&action);
            if self.core.log_execution_plans {
                log_execution_plans(&self.core.filters);
            }

            let started = Instant::now();
            let outcome = self.invoke_filter_pipeline().await;
            let released = self.inner.release_resources(&mut self.core).await;
            events::executed_action(&action, started.elapsed());

            match (outcome, released) {
                (Err(error), Err(release_error)) => {
                    tracing::warn!(
                        target: "girder::invoker",
                        error = %release_error,
                        "Releasing resources failed after the pipeline failed"
                    );
                    Err(error)
                }
                (outcome, released) => outcome.and(released),
            }
        }
        .instrument(span)
        .await;

        self.core.diagnose(DiagnosticEvent::AfterAction { action: &action });
        outcome
    }

    async fn invoke_filter_pipeline(&mut self) -> Result<(), Error> {
        let filters = Arc::clone(&self.core.filters);
        let mut executing = ResourceExecutingContext::new(
            self.core.action_context.clone(),
            Arc::clone(&filters),
            self.core.value_provider_factories.clone(),
        );

        let mut pipeline = ResourcePipeline {
            core: &mut self.core,
            inner: &mut self.inner,
            filters: &filters,
        };
        pipeline
            .next(Scope::Invoker, State::InvokeBegin, &mut executing)
            .await
    }
}

impl<I: InnerInvoker + 'static> ActionInvoker for ResourceInvoker<I> {
    fn invoke(self: Box<Self>) -> BoxFuture<'static, Result<(), Error>> {
        Box::pin((*self).execute())
    }
}

impl<I: std::fmt::Debug> std::fmt::Debug for ResourceInvoker<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceInvoker")
            .field("core", &self.core)
            .field("inner", &self.inner)
            .finish()
    }
}

fn log_execution_plans(filters: &[FilterRef]) {
    events::execution_plan(AuthorizationPhase::KIND, filters_of_phase::<AuthorizationPhase>(filters));
    events::execution_plan(ResourcePhase::KIND, filters_of_phase::<ResourcePhase>(filters));
    events::execution_plan(ActionPhase::KIND, filters_of_phase::<ActionPhase>(filters));
    events::execution_plan(ExceptionPhase::KIND, filters_of_phase::<ExceptionPhase>(filters));
    events::execution_plan(ResultPhase::KIND, filters_of_phase::<ResultPhase>(filters));
}

// ============================================================================
// State machine
// ============================================================================

/// Who started the current run of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// The invocation itself
    Invoker,
    /// A resource filter continuing the pipeline
    Resource,
    /// An exception filter wrapping the action phase
    Exception,
}

#[derive(Clone, Copy)]
enum State<'f> {
    InvokeBegin,
    AuthorizationBegin,
    AuthorizationNext,
    AuthorizationAsync(&'f dyn AsyncAuthorizationFilter),
    AuthorizationSync(&'f dyn AuthorizationFilter),
    AuthorizationShortCircuit(&'f str),
    AuthorizationEnd,
    ResourceBegin,
    ResourceNext,
    ResourceAsyncBegin(&'f dyn AsyncResourceFilter),
    ResourceAsyncEnd(&'f dyn AsyncResourceFilter),
    ResourceSyncBegin(&'f dyn ResourceFilter),
    ResourceSyncEnd(&'f dyn ResourceFilter),
    ResourceShortCircuit(&'f str),
    ResourceInside,
    ExceptionBegin,
    ExceptionNext,
    ExceptionAsyncBegin(&'f dyn AsyncExceptionFilter),
    ExceptionAsyncResume(&'f dyn AsyncExceptionFilter),
    ExceptionAsyncEnd(&'f dyn AsyncExceptionFilter),
    ExceptionSyncBegin(&'f dyn ExceptionFilter),
    ExceptionSyncEnd(&'f dyn ExceptionFilter),
    ExceptionInside,
    ExceptionHandled,
    ExceptionEnd,
    ActionBegin,
    ActionEnd,
    ResourceInsideEnd,
    ResourceEnd,
    InvokeEnd,
}

/// A sync resource filter or an exception filter waiting for the part of
/// the pipeline it wraps.
#[derive(Clone, Copy)]
enum Frame<'f> {
    Resource(&'f dyn ResourceFilter),
    Exception(CursorItem<'f, dyn ExceptionFilter, dyn AsyncExceptionFilter>),
}

impl<'f> Frame<'f> {
    fn scope(self) -> Scope {
        match self {
            Frame::Resource(_) => Scope::Resource,
            Frame::Exception(_) => Scope::Exception,
        }
    }

    fn resume(self) -> State<'f> {
        match self {
            Frame::Resource(filter) => State::ResourceSyncEnd(filter),
            Frame::Exception(CursorItem::Sync(filter)) => State::ExceptionSyncEnd(filter),
            Frame::Exception(CursorItem::Async(filter)) => State::ExceptionAsyncResume(filter),
        }
    }
}

enum Step<'f> {
    Goto(State<'f>),
    Enter(Frame<'f>, State<'f>),
    Return,
}

struct ResourcePipeline<'p, I> {
    core: &'p mut InvokerCore,
    inner: &'p mut I,
    filters: &'p [FilterRef],
}

impl<'p, I: InnerInvoker> ResourcePipeline<'p, I> {
    fn next<'b>(
        &'b mut self,
        scope: Scope,
        mut state: State<'p>,
        executing: &'b mut ResourceExecutingContext,
    ) -> BoxFuture<'b, Result<(), Error>> {
        Box::pin(async move {
            // Filters wrapping the current state, innermost last
            let mut frames: Vec<Frame<'p>> = Vec::new();

            loop {
                let current = frames.last().map_or(scope, |frame| frame.scope());
                state = match self.step(current, state, executing).await {
                    Ok(Step::Goto(next)) => next,
                    Ok(Step::Enter(frame, next)) => {
                        frames.push(frame);
                        next
                    }
                    Ok(Step::Return) => match frames.pop() {
                        Some(frame) => frame.resume(),
                        None => return Ok(()),
                    },
                    Err(error) => match frames.pop() {
                        Some(frame) => {
                            self.capture_error(frame, error);
                            frame.resume()
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
        executing: &mut ResourceExecutingContext,
    ) -> Result<Step<'p>, Error> {
        let filters = self.filters;

        let next = match state {
            State::InvokeBegin => State::AuthorizationBegin,

            // Authorization

            State::AuthorizationBegin => {
                self.core.cursor.reset();
                State::AuthorizationNext
            }

            State::AuthorizationNext => {
                match self.core.cursor.next_filter::<AuthorizationPhase>(filters) {
                    Some(CursorItem::Async(filter)) => State::AuthorizationAsync(filter),
                    Some(CursorItem::Sync(filter)) => State::AuthorizationSync(filter),
                    None => State::AuthorizationEnd,
                }
            }

            State::AuthorizationAsync(filter) => {
                let kind = AuthorizationPhase::KIND;
                self.core
                    .before_filter(kind, FilterMethod::OnAuthorization, filter.name());
                let context = self.core.authorization_context();
                filter.on_authorization(context).await?;
                let failed = context.result.is_some();
                self.core
                    .after_filter(kind, FilterMethod::OnAuthorization, filter.name());

                if failed {
                    State::AuthorizationShortCircuit(filter.name())
                } else {
                    State::AuthorizationNext
                }
            }

            State::AuthorizationSync(filter) => {
                let kind = AuthorizationPhase::KIND;
                self.core
                    .before_filter(kind, FilterMethod::OnAuthorization, filter.name());
                let context = self.core.authorization_context();
                filter.on_authorization(context)?;
                let failed = context.result.is_some();
                self.core
                    .after_filter(kind, FilterMethod::OnAuthorization, filter.name());

                if failed {
                    State::AuthorizationShortCircuit(filter.name())
                } else {
                    State::AuthorizationNext
                }
            }

            State::AuthorizationShortCircuit(filter) => {
                events::authorization_failure(filter);
                self.core.result = self
                    .core
                    .authorization_context
                    .as_ref()
                    .and_then(|context| context.result.clone());
                invoke_result_filters(self.core, ResultKind::AlwaysRun).await?;
                return Ok(Step::Return);
            }

            State::AuthorizationEnd => State::ResourceBegin,

            // Resource

            State::ResourceBegin => {
                self.core.cursor.reset();
                State::ResourceNext
            }

            State::ResourceNext => {
                match self.core.cursor.next_filter::<ResourcePhase>(filters) {
                    Some(CursorItem::Async(filter)) => State::ResourceAsyncBegin(filter),
                    Some(CursorItem::Sync(filter)) => State::ResourceSyncBegin(filter),
                    None => State::ResourceInside,
                }
            }

            State::ResourceAsyncBegin(filter) => {
                self.core.before_filter(
                    ResourcePhase::KIND,
                    FilterMethod::OnResourceExecution,
                    filter.name(),
                );
                filter
                    .on_resource_execution(
                        &mut *executing,
                        ResourceExecutionDelegate::new(&mut *self),
                    )
                    .await?;
                State::ResourceAsyncEnd(filter)
            }

            State::ResourceAsyncEnd(filter) => {
                // No executed context means the filter never called next
                let short_circuited = self.core.resource_executed.is_none();
                if short_circuited {
                    self.core.resource_executed = Some(ResourceExecutedContext::canceled(
                        self.core.action_context.clone(),
                        Arc::clone(&self.core.filters),
                        executing.result.clone(),
                    ));
                }
                self.core.after_filter(
                    ResourcePhase::KIND,
                    FilterMethod::OnResourceExecution,
                    filter.name(),
                );

                if short_circuited && executing.result.is_some() {
                    State::ResourceShortCircuit(filter.name())
                } else {
                    State::ResourceEnd
                }
            }

            State::ResourceSyncBegin(filter) => {
                let kind = ResourcePhase::KIND;
                self.core
                    .before_filter(kind, FilterMethod::OnResourceExecuting, filter.name());
                filter.on_resource_executing(executing)?;
                self.core
                    .after_filter(kind, FilterMethod::OnResourceExecuting, filter.name());

                if executing.result.is_none() {
                    return Ok(Step::Enter(Frame::Resource(filter), State::ResourceNext));
                }
                self.core.resource_executed = Some(ResourceExecutedContext::canceled(
                    self.core.action_context.clone(),
                    Arc::clone(&self.core.filters),
                    executing.result.clone(),
                ));
                State::ResourceShortCircuit(filter.name())
            }

            State::ResourceSyncEnd(filter) => {
                let kind = ResourcePhase::KIND;
                self.core
                    .before_filter(kind, FilterMethod::OnResourceExecuted, filter.name());
                if let Some(executed) = self.core.resource_executed.as_mut() {
                    filter.on_resource_executed(executed)?;
                }
                self.core
                    .after_filter(kind, FilterMethod::OnResourceExecuted, filter.name());
                State::ResourceEnd
            }

            State::ResourceShortCircuit(filter) => {
                events::resource_filter_short_circuited(filter);
                self.core.result = executing.result.clone();
                invoke_result_filters(self.core, ResultKind::AlwaysRun).await?;
                State::ResourceEnd
            }

            State::ResourceInside => State::ExceptionBegin,

            // Exception

            State::ExceptionBegin => {
                self.core.cursor.reset();
                State::ExceptionNext
            }

            State::ExceptionNext => {
                match self.core.cursor.next_filter::<ExceptionPhase>(filters) {
                    Some(CursorItem::Async(filter)) => State::ExceptionAsyncBegin(filter),
                    Some(CursorItem::Sync(filter)) => State::ExceptionSyncBegin(filter),
                    // Every exception filter is already wrapping us
                    None if scope == Scope::Exception => State::ExceptionInside,
                    // There are no exception filters at all
                    None => State::ActionBegin,
                }
            }

            State::ExceptionAsyncBegin(filter) => {
                let frame = Frame::Exception(CursorItem::Async(filter));
                return Ok(Step::Enter(frame, State::ExceptionNext));
            }

            State::ExceptionAsyncResume(filter) => {
                // Unwinding: only an unhandled error reaches the filter
                if self.core.exception_is_unhandled() {
                    self.core.before_filter(
                        ExceptionPhase::KIND,
                        FilterMethod::OnException,
                        filter.name(),
                    );
                    if let Some(context) = self.core.exception_context.as_mut() {
                        filter.on_exception(context).await?;
                    }
                    State::ExceptionAsyncEnd(filter)
                } else {
                    State::ExceptionEnd
                }
            }

            State::ExceptionAsyncEnd(filter) => {
                self.core.after_filter(
                    ExceptionPhase::KIND,
                    FilterMethod::OnException,
                    filter.name(),
                );
                if !self.core.exception_is_unhandled() {
                    events::exception_filter_short_circuited(filter.name());
                }
                State::ExceptionEnd
            }

            State::ExceptionSyncBegin(filter) => {
                let frame = Frame::Exception(CursorItem::Sync(filter));
                return Ok(Step::Enter(frame, State::ExceptionNext));
            }

            State::ExceptionSyncEnd(filter) => {
                if self.core.exception_is_unhandled() {
                    let kind = ExceptionPhase::KIND;
                    self.core
                        .before_filter(kind, FilterMethod::OnException, filter.name());
                    if let Some(context) = self.core.exception_context.as_mut() {
                        filter.on_exception(context)?;
                    }
                    self.core
                        .after_filter(kind, FilterMethod::OnException, filter.name());

                    if !self.core.exception_is_unhandled() {
                        events::exception_filter_short_circuited(filter.name());
                    }
                }
                State::ExceptionEnd
            }

            State::ExceptionInside => State::ActionBegin,

            State::ExceptionHandled => {
                let result = self.core.exception_context.as_mut().map(|context| {
                    Arc::clone(context.result.get_or_insert_with(EmptyResult::shared))
                });
                self.core.result = result;
                invoke_result_filters(self.core, ResultKind::AlwaysRun).await?;
                State::ResourceInsideEnd
            }

            State::ExceptionEnd => {
                if scope == Scope::Exception {
                    return Ok(Step::Return);
                }

                let unhandled = self.core.exception_context.as_mut().and_then(|context| {
                    if context.is_handled() {
                        None
                    } else {
                        context.exception.take()
                    }
                });
                if let Some(error) = unhandled {
                    return Err(error);
                }

                if self.core.exception_context.is_some() {
                    State::ExceptionHandled
                } else {
                    invoke_result_filters(self.core, ResultKind::Result).await?;
                    State::ResourceInsideEnd
                }
            }

            // Action

            State::ActionBegin => {
                self.inner.invoke_inner_filter(self.core).await?;
                State::ActionEnd
            }

            State::ActionEnd => {
                // Let the exception filters unwind before the result
                if scope == Scope::Exception {
                    return Ok(Step::Return);
                }
                invoke_result_filters(self.core, ResultKind::Result).await?;
                State::ResourceInsideEnd
            }

            // Unwinding

            State::ResourceInsideEnd => {
                if scope == Scope::Resource {
                    let mut executed = ResourceExecutedContext::new(
                        self.core.action_context.clone(),
                        Arc::clone(&self.core.filters),
                    );
                    executed.result = self.core.result.clone();
                    self.core.resource_executed = Some(executed);
                    State::ResourceEnd
                } else {
                    State::InvokeEnd
                }
            }

            State::ResourceEnd => {
                if scope == Scope::Resource {
                    return Ok(Step::Return);
                }
                if let Some(executed) = self.core.resource_executed.as_mut() {
                    executed.rethrow()?;
                }
                State::InvokeEnd
            }

            State::InvokeEnd => return Ok(Step::Return),
        };
        Ok(Step::Goto(next))
    }

    /// Record an error from the part of the pipeline `frame` wraps, where
    /// that filter will see it.
    fn capture_error(&mut self, frame: Frame<'_>, error: Error) {
        match frame {
            Frame::Resource(_) => {
                self.core.resource_executed = Some(ResourceExecutedContext::failed(
                    self.core.action_context.clone(),
                    Arc::clone(&self.core.filters),
                    error,
                ));
            }
            Frame::Exception(_) => {
                self.core.exception_context = Some(ExceptionContext::new(
                    self.core.action_context.clone(),
                    Arc::clone(&self.core.filters),
                    error,
                ));
            }
        }
    }
}

impl<I: InnerInvoker> ResourceNext for ResourcePipeline<'_, I> {
    fn invoke_next<'s>(
        &'s mut self,
        context: &'s mut ResourceExecutingContext,
    ) -> BoxFuture<'s, Result<(), Error>> {
        Box::pin(async move {
            if context.result.is_some() {
                return Err(Error::InvalidOperation(INVALID_RESOURCE_SHORT_CIRCUIT.to_string()));
            }
            if let Err(error) = self.next(Scope::Resource, State::ResourceNext, context).await {
                self.core.resource_executed = Some(ResourceExecutedContext::failed(
                    self.core.action_context.clone(),
                    Arc::clone(&self.core.filters),
                    error,
                ));
            }
            Ok(())
        })
    }

    fn executed(&mut self) -> Result<&mut ResourceExecutedContext, Error> {
        self.core
            .resource_executed
            .as_mut()
            .ok_or_else(|| missing_executed_context("resource"))
    }
}
