//! Action invocation
//!
//! An invoker runs one selected action through the filter pipeline:
//!
//! ```text
//! authorization -> resource -> exception -> action -> result
//! ```
//!
//! [`ResourceInvoker`] drives every phase except the action phase, which it
//! delegates to an [`InnerInvoker`]. [`ControllerActionInvoker`] is the
//! resource invoker specialised for controller actions.
//!
//! Each phase is a small state machine (`loop { state = match state { .. } }`).
//! A sync filter wrapping the rest of its phase waits on an explicit stack
//! inside that loop, so the stack depth does not grow with the number of sync
//! or exception filters. Only an async filter's `next` runs as a nested,
//! heap-allocated future.

mod cache;
mod controller;
mod provider;
mod resource;
mod result;

pub use cache::*;
pub use controller::*;
pub use provider::*;
pub use resource::*;

use crate::action_context::ActionContext;
use crate::action_result::ActionResultRef;
use crate::binding::ValueProviderFactories;
use crate::diagnostics::{DiagnosticEvent, DiagnosticSource, FilterMethod, NullDiagnosticSource};
use crate::error::Error;
use crate::filters::{
    AuthorizationFilterContext, ExceptionContext, FilterCursor, FilterRef, ResourceExecutedContext,
    ResultExecutedContext,
};
use crate::logging::events;
use crate::method_executor::ControllerInstance;
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::sync::Arc;

/// Entry point a host calls once an action has been selected.
///
/// Invoking consumes the invoker, so each one runs at most once.
pub trait ActionInvoker: Send {
    fn invoke(self: Box<Self>) -> BoxFuture<'static, Result<(), Error>>;
}

/// The action phase of a [`ResourceInvoker`].
#[async_trait]
pub trait InnerInvoker: Send {
    /// Run the action filters and the action itself, leaving the outcome in
    /// [`InvokerCore::result`].
    async fn invoke_inner_filter(&mut self, core: &mut InvokerCore) -> Result<(), Error>;

    /// Release whatever the action phase created.
    ///
    /// Called exactly once per invocation, after the pipeline finished
    /// whether it succeeded, short-circuited or failed.
    async fn release_resources(&mut self, core: &mut InvokerCore) -> Result<(), Error>;
}

/// Per-request state shared by every phase of one invocation.
pub struct InvokerCore {
    pub(crate) action_context: ActionContext,
    pub(crate) value_provider_factories: ValueProviderFactories,
    pub(crate) filters: Arc<[FilterRef]>,
    pub(crate) cursor: FilterCursor,
    pub(crate) diagnostics: Arc<dyn DiagnosticSource>,
    pub(crate) log_execution_plans: bool,
    pub(crate) result: Option<ActionResultRef>,
    pub(crate) instance: Option<ControllerInstance>,
    pub(crate) authorization_context: Option<AuthorizationFilterContext>,
    pub(crate) resource_executed: Option<ResourceExecutedContext>,
    pub(crate) exception_context: Option<ExceptionContext>,
    pub(crate) result_executed: Option<ResultExecutedContext>,
}

impl InvokerCore {
    /// `filters` must already be in execution order.
    pub fn new(
        action_context: ActionContext,
        filters: Arc<[FilterRef]>,
        value_provider_factories: ValueProviderFactories,
    ) -> Self {
        Self {
            action_context,
            value_provider_factories,
            filters,
            cursor: FilterCursor::new(),
            diagnostics: Arc::new(NullDiagnosticSource),
            log_execution_plans: true,
            result: None,
            instance: None,
            authorization_context: None,
            resource_executed: None,
            exception_context: None,
            result_executed: None,
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticSource>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn with_log_execution_plans(mut self, enabled: bool) -> Self {
        self.log_execution_plans = enabled;
        self
    }

    pub fn action_context(&self) -> &ActionContext {
        &self.action_context
    }

    pub fn filters(&self) -> &Arc<[FilterRef]> {
        &self.filters
    }

    pub fn value_provider_factories(&self) -> &ValueProviderFactories {
        &self.value_provider_factories
    }

    /// Result the pipeline will execute, once one is known
    pub fn result(&self) -> Option<&ActionResultRef> {
        self.result.as_ref()
    }

    pub fn set_result(&mut self, result: Option<ActionResultRef>) {
        self.result = result;
    }

    /// Instance created by the action phase, if it got that far
    pub fn instance(&self) -> Option<&ControllerInstance> {
        self.instance.as_ref()
    }

    pub fn set_instance(&mut self, instance: Option<ControllerInstance>) {
        self.instance = instance;
    }

    pub fn take_instance(&mut self) -> Option<ControllerInstance> {
        self.instance.take()
    }

    pub fn diagnostics(&self) -> &Arc<dyn DiagnosticSource> {
        &self.diagnostics
    }

    pub(crate) fn diagnose(&self, event: DiagnosticEvent<'_>) {
        if self.diagnostics.is_enabled(event.name()) {
            self.diagnostics.write(&event);
        }
    }

    pub(crate) fn before_filter(&self, kind: &'static str, method: FilterMethod, filter: &str) {
        self.diagnose(DiagnosticEvent::BeforeFilter {
            method,
            action: &self.action_context.action_descriptor,
            filter,
        });
        events::before_executing_method_on_filter(kind, method.as_str(), filter);
    }

    pub(crate) fn after_filter(&self, kind: &'static str, method: FilterMethod, filter: &str) {
        self.diagnose(DiagnosticEvent::AfterFilter {
            method,
            action: &self.action_context.action_descriptor,
            filter,
        });
        events::after_executing_method_on_filter(kind, method.as_str(), filter);
    }

    pub(crate) fn authorization_context(&mut self) -> &mut AuthorizationFilterContext {
        let action_context = &self.action_context;
        let filters = &self.filters;
        self.authorization_context.get_or_insert_with(|| {
            AuthorizationFilterContext::new(action_context.clone(), Arc::clone(filters))
        })
    }

    /// An exception was caught and no exception filter has dealt with it
    pub(crate) fn exception_is_unhandled(&self) -> bool {
        self.exception_context
            .as_ref()
            .is_some_and(ExceptionContext::is_unhandled)
    }
}

impl std::fmt::Debug for InvokerCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvokerCore")
            .field("action_context", &self.action_context)
            .field("filters", &self.filters.len())
            .field("result", &self.result.as_ref().map(|r| r.name().to_string()))
            .field("has_instance", &self.instance.is_some())
            .finish_non_exhaustive()
    }
}

pub(crate) fn missing_executed_context(phase: &str) -> Error {
    Error::InvalidOperation(format!(
        "The {} pipeline finished without an executed context.",
        phase
    ))
}
