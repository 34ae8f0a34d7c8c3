// Filter contexts and the delegates async filters use to continue the pipeline

use super::FilterRef;
use crate::action_context::ActionContext;
use crate::action_result::ActionResultRef;
use crate::binding::ValueProviderFactories;
use crate::error::Error;
use crate::method_executor::ControllerInstance;
use futures_util::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

// ============================================================================
// Authorization
// ============================================================================

pub struct AuthorizationFilterContext {
    pub action_context: ActionContext,
    pub filters: Arc<[FilterRef]>,
    /// Setting a result short-circuits the request
    pub result: Option<ActionResultRef>,
}

impl AuthorizationFilterContext {
    pub fn new(action_context: ActionContext, filters: Arc<[FilterRef]>) -> Self {
        Self {
            action_context,
            filters,
            result: None,
        }
    }
}

// ============================================================================
// Resource
// ============================================================================

pub struct ResourceExecutingContext {
    pub action_context: ActionContext,
    pub filters: Arc<[FilterRef]>,
    pub value_provider_factories: ValueProviderFactories,
    /// Setting a result short-circuits the rest of the pipeline
    pub result: Option<ActionResultRef>,
}

impl ResourceExecutingContext {
    pub fn new(
        action_context: ActionContext,
        filters: Arc<[FilterRef]>,
        value_provider_factories: ValueProviderFactories,
    ) -> Self {
        Self {
            action_context,
            filters,
            value_provider_factories,
            result: None,
        }
    }
}

pub struct ResourceExecutedContext {
    pub action_context: ActionContext,
    pub filters: Arc<[FilterRef]>,
    pub canceled: bool,
    pub exception: Option<Error>,
    pub exception_handled: bool,
    pub result: Option<ActionResultRef>,
}

impl ResourceExecutedContext {
    pub fn new(action_context: ActionContext, filters: Arc<[FilterRef]>) -> Self {
        Self {
            action_context,
            filters,
            canceled: false,
            exception: None,
            exception_handled: false,
            result: None,
        }
    }

    pub(crate) fn canceled(
        action_context: ActionContext,
        filters: Arc<[FilterRef]>,
        result: Option<ActionResultRef>,
    ) -> Self {
        Self {
            canceled: true,
            result,
            ..Self::new(action_context, filters)
        }
    }

    pub(crate) fn failed(
        action_context: ActionContext,
        filters: Arc<[FilterRef]>,
        exception: Error,
    ) -> Self {
        Self {
            exception: Some(exception),
            ..Self::new(action_context, filters)
        }
    }

    pub(crate) fn rethrow(&mut self) -> Result<(), Error> {
        rethrow(self.exception_handled, &mut self.exception)
    }
}

// ============================================================================
// Exception
// ============================================================================

pub struct ExceptionContext {
    pub action_context: ActionContext,
    pub filters: Arc<[FilterRef]>,
    pub exception: Option<Error>,
    pub exception_handled: bool,
    pub result: Option<ActionResultRef>,
}

impl ExceptionContext {
    pub fn new(action_context: ActionContext, filters: Arc<[FilterRef]>, exception: Error) -> Self {
        Self {
            action_context,
            filters,
            exception: Some(exception),
            exception_handled: false,
            result: None,
        }
    }

    /// Still carries an error nobody has handled
    pub fn is_unhandled(&self) -> bool {
        self.exception.is_some() && !self.exception_handled
    }

    /// Handled by clearing the error, flagging it, or providing a result
    pub fn is_handled(&self) -> bool {
        self.result.is_some() || self.exception.is_none() || self.exception_handled
    }
}

// ============================================================================
// Action
// ============================================================================

pub struct ActionExecutingContext {
    pub action_context: ActionContext,
    pub filters: Arc<[FilterRef]>,
    /// Bound arguments by parameter name; filters may rewrite them
    pub action_arguments: HashMap<String, Value>,
    pub controller: ControllerInstance,
    /// Setting a result skips the action method
    pub result: Option<ActionResultRef>,
}

impl ActionExecutingContext {
    pub fn new(
        action_context: ActionContext,
        filters: Arc<[FilterRef]>,
        action_arguments: HashMap<String, Value>,
        controller: ControllerInstance,
    ) -> Self {
        Self {
            action_context,
            filters,
            action_arguments,
            controller,
            result: None,
        }
    }
}

pub struct ActionExecutedContext {
    pub action_context: ActionContext,
    pub filters: Arc<[FilterRef]>,
    pub controller: ControllerInstance,
    pub canceled: bool,
    pub exception: Option<Error>,
    pub exception_handled: bool,
    pub result: Option<ActionResultRef>,
}

impl ActionExecutedContext {
    pub fn new(
        action_context: ActionContext,
        filters: Arc<[FilterRef]>,
        controller: ControllerInstance,
    ) -> Self {
        Self {
            action_context,
            filters,
            controller,
            canceled: false,
            exception: None,
            exception_handled: false,
            result: None,
        }
    }

    pub(crate) fn with_result(mut self, result: Option<ActionResultRef>) -> Self {
        self.result = result;
        self
    }

    pub(crate) fn with_canceled(mut self) -> Self {
        self.canceled = true;
        self
    }

    pub(crate) fn with_exception(mut self, exception: Error) -> Self {
        self.exception = Some(exception);
        self
    }

    pub(crate) fn rethrow(&mut self) -> Result<(), Error> {
        rethrow(self.exception_handled, &mut self.exception)
    }
}

// ============================================================================
// Result
// ============================================================================

pub struct ResultExecutingContext {
    pub action_context: ActionContext,
    pub filters: Arc<[FilterRef]>,
    /// Result about to be executed; may be replaced
    pub result: Option<ActionResultRef>,
    /// `None` when no controller was created
    pub controller: Option<ControllerInstance>,
    /// Setting this skips the result and the remaining result filters
    pub cancel: bool,
}

impl ResultExecutingContext {
    pub fn new(
        action_context: ActionContext,
        filters: Arc<[FilterRef]>,
        result: Option<ActionResultRef>,
        controller: Option<ControllerInstance>,
    ) -> Self {
        Self {
            action_context,
            filters,
            result,
            controller,
            cancel: false,
        }
    }
}

pub struct ResultExecutedContext {
    pub action_context: ActionContext,
    pub filters: Arc<[FilterRef]>,
    pub result: Option<ActionResultRef>,
    pub controller: Option<ControllerInstance>,
    pub canceled: bool,
    pub exception: Option<Error>,
    pub exception_handled: bool,
}

impl ResultExecutedContext {
    pub fn new(
        action_context: ActionContext,
        filters: Arc<[FilterRef]>,
        result: Option<ActionResultRef>,
        controller: Option<ControllerInstance>,
    ) -> Self {
        Self {
            action_context,
            filters,
            result,
            controller,
            canceled: false,
            exception: None,
            exception_handled: false,
        }
    }

    pub(crate) fn with_canceled(mut self) -> Self {
        self.canceled = true;
        self
    }

    pub(crate) fn with_exception(mut self, exception: Error) -> Self {
        self.exception = Some(exception);
        self
    }

    pub(crate) fn rethrow(&mut self) -> Result<(), Error> {
        rethrow(self.exception_handled, &mut self.exception)
    }
}

fn rethrow(handled: bool, exception: &mut Option<Error>) -> Result<(), Error> {
    if handled {
        return Ok(());
    }
    match exception.take() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

// ============================================================================
// Delegates
// ============================================================================

/// Continuation handed to [`AsyncResourceFilter`](super::AsyncResourceFilter).
pub trait ResourceNext: Send {
    fn invoke_next<'s>(
        &'s mut self,
        context: &'s mut ResourceExecutingContext,
    ) -> BoxFuture<'s, Result<(), Error>>;

    fn executed(&mut self) -> Result<&mut ResourceExecutedContext, Error>;
}

/// Runs the rest of the pipeline below a resource filter.
pub struct ResourceExecutionDelegate<'a> {
    next: &'a mut (dyn ResourceNext + 'a),
}

impl<'a> ResourceExecutionDelegate<'a> {
    pub fn new(next: &'a mut (dyn ResourceNext + 'a)) -> Self {
        Self { next }
    }

    /// Errors from inside are captured on the returned context, not returned.
    pub async fn invoke(
        self,
        context: &mut ResourceExecutingContext,
    ) -> Result<&'a mut ResourceExecutedContext, Error> {
        let next = self.next;
        next.invoke_next(context).await?;
        next.executed()
    }
}

/// Continuation handed to [`AsyncActionFilter`](super::AsyncActionFilter).
pub trait ActionNext: Send {
    fn invoke_next<'s>(
        &'s mut self,
        context: &'s mut ActionExecutingContext,
    ) -> BoxFuture<'s, Result<(), Error>>;

    fn executed(&mut self) -> Result<&mut ActionExecutedContext, Error>;
}

/// Runs the remaining action filters and the action method.
pub struct ActionExecutionDelegate<'a> {
    next: &'a mut (dyn ActionNext + 'a),
}

impl<'a> ActionExecutionDelegate<'a> {
    pub fn new(next: &'a mut (dyn ActionNext + 'a)) -> Self {
        Self { next }
    }

    pub async fn invoke(
        self,
        context: &mut ActionExecutingContext,
    ) -> Result<&'a mut ActionExecutedContext, Error> {
        let next = self.next;
        next.invoke_next(context).await?;
        next.executed()
    }
}

/// Continuation handed to [`AsyncResultFilter`](super::AsyncResultFilter).
pub trait ResultNext: Send {
    fn invoke_next<'s>(
        &'s mut self,
        context: &'s mut ResultExecutingContext,
    ) -> BoxFuture<'s, Result<(), Error>>;

    fn executed(&mut self) -> Result<&mut ResultExecutedContext, Error>;
}

/// Runs the remaining result filters and the result.
pub struct ResultExecutionDelegate<'a> {
    next: &'a mut (dyn ResultNext + 'a),
}

impl<'a> ResultExecutionDelegate<'a> {
    pub fn new(next: &'a mut (dyn ResultNext + 'a)) -> Self {
        Self { next }
    }

    pub async fn invoke(
        self,
        context: &mut ResultExecutingContext,
    ) -> Result<&'a mut ResultExecutedContext, Error> {
        let next = self.next;
        next.invoke_next(context).await?;
        next.executed()
    }
}
