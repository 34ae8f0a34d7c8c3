//! Diagnostic events
//!
//! The invoker reports every filter call, the action method call and the
//! result execution to a [`DiagnosticSource`]. Sources are observers only:
//! they must not panic and must return quickly.

use crate::action_descriptor::ActionDescriptor;
use std::fmt;

/// Filter method a [`DiagnosticEvent::BeforeFilter`] or
/// [`DiagnosticEvent::AfterFilter`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMethod {
    OnAuthorization,
    OnResourceExecution,
    OnResourceExecuting,
    OnResourceExecuted,
    OnException,
    OnActionExecution,
    OnActionExecuting,
    OnActionExecuted,
    OnResultExecution,
    OnResultExecuting,
    OnResultExecuted,
}

impl FilterMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterMethod::OnAuthorization => "OnAuthorization",
            FilterMethod::OnResourceExecution => "OnResourceExecution",
            FilterMethod::OnResourceExecuting => "OnResourceExecuting",
            FilterMethod::OnResourceExecuted => "OnResourceExecuted",
            FilterMethod::OnException => "OnException",
            FilterMethod::OnActionExecution => "OnActionExecution",
            FilterMethod::OnActionExecuting => "OnActionExecuting",
            FilterMethod::OnActionExecuted => "OnActionExecuted",
            FilterMethod::OnResultExecution => "OnResultExecution",
            FilterMethod::OnResultExecuting => "OnResultExecuting",
            FilterMethod::OnResultExecuted => "OnResultExecuted",
        }
    }

    fn before_event_name(&self) -> &'static str {
        match self {
            FilterMethod::OnAuthorization => "girder.mvc.BeforeOnAuthorization",
            FilterMethod::OnResourceExecution => "girder.mvc.BeforeOnResourceExecution",
            FilterMethod::OnResourceExecuting => "girder.mvc.BeforeOnResourceExecuting",
            FilterMethod::OnResourceExecuted => "girder.mvc.BeforeOnResourceExecuted",
            FilterMethod::OnException => "girder.mvc.BeforeOnException",
            FilterMethod::OnActionExecution => "girder.mvc.BeforeOnActionExecution",
            FilterMethod::OnActionExecuting => "girder.mvc.BeforeOnActionExecuting",
            FilterMethod::OnActionExecuted => "girder.mvc.BeforeOnActionExecuted",
            FilterMethod::OnResultExecution => "girder.mvc.BeforeOnResultExecution",
            FilterMethod::OnResultExecuting => "girder.mvc.BeforeOnResultExecuting",
            FilterMethod::OnResultExecuted => "girder.mvc.BeforeOnResultExecuted",
        }
    }

    fn after_event_name(&self) -> &'static str {
        match self {
            FilterMethod::OnAuthorization => "girder.mvc.AfterOnAuthorization",
            FilterMethod::OnResourceExecution => "girder.mvc.AfterOnResourceExecution",
            FilterMethod::OnResourceExecuting => "girder.mvc.AfterOnResourceExecuting",
            FilterMethod::OnResourceExecuted => "girder.mvc.AfterOnResourceExecuted",
            FilterMethod::OnException => "girder.mvc.AfterOnException",
            FilterMethod::OnActionExecution => "girder.mvc.AfterOnActionExecution",
            FilterMethod::OnActionExecuting => "girder.mvc.AfterOnActionExecuting",
            FilterMethod::OnActionExecuted => "girder.mvc.AfterOnActionExecuted",
            FilterMethod::OnResultExecution => "girder.mvc.AfterOnResultExecution",
            FilterMethod::OnResultExecuting => "girder.mvc.AfterOnResultExecuting",
            FilterMethod::OnResultExecuted => "girder.mvc.AfterOnResultExecuted",
        }
    }
}

impl fmt::Display for FilterMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observation of the pipeline.
#[derive(Debug, Clone, Copy)]
pub enum DiagnosticEvent<'a> {
    BeforeAction {
        action: &'a ActionDescriptor,
    },
    AfterAction {
        action: &'a ActionDescriptor,
    },
    BeforeFilter {
        method: FilterMethod,
        action: &'a ActionDescriptor,
        filter: &'a str,
    },
    AfterFilter {
        method: FilterMethod,
        action: &'a ActionDescriptor,
        filter: &'a str,
    },
    BeforeActionMethod {
        action: &'a ActionDescriptor,
        arguments: &'a [String],
    },
    AfterActionMethod {
        action: &'a ActionDescriptor,
        result: Option<&'a str>,
    },
    BeforeActionResult {
        action: &'a ActionDescriptor,
        result: &'a str,
    },
    AfterActionResult {
        action: &'a ActionDescriptor,
        result: &'a str,
    },
}

impl<'a> DiagnosticEvent<'a> {
    /// Stable dotted event name
    pub fn name(&self) -> &'static str {
        match self {
            DiagnosticEvent::BeforeAction { .. } => "girder.mvc.BeforeAction",
            DiagnosticEvent::AfterAction { .. } => "girder.mvc.AfterAction",
            DiagnosticEvent::BeforeFilter { method, .. } => method.before_event_name(),
            DiagnosticEvent::AfterFilter { method, .. } => method.after_event_name(),
            DiagnosticEvent::BeforeActionMethod { .. } => "girder.mvc.BeforeActionMethod",
            DiagnosticEvent::AfterActionMethod { .. } => "girder.mvc.AfterActionMethod",
            DiagnosticEvent::BeforeActionResult { .. } => "girder.mvc.BeforeActionResult",
            DiagnosticEvent::AfterActionResult { .. } => "girder.mvc.AfterActionResult",
        }
    }

    pub fn action(&self) -> &'a ActionDescriptor {
        match *self {
            DiagnosticEvent::BeforeAction { action }
            | DiagnosticEvent::AfterAction { action }
            | DiagnosticEvent::BeforeFilter { action, .. }
            | DiagnosticEvent::AfterFilter { action, .. }
            | DiagnosticEvent::BeforeActionMethod { action, .. }
            | DiagnosticEvent::AfterActionMethod { action, .. }
            | DiagnosticEvent::BeforeActionResult { action, .. }
            | DiagnosticEvent::AfterActionResult { action, .. } => action,
        }
    }

    /// Filter name for filter events
    pub fn filter(&self) -> Option<&'a str> {
        match *self {
            DiagnosticEvent::BeforeFilter { filter, .. }
            | DiagnosticEvent::AfterFilter { filter, .. } => Some(filter),
            _ => None,
        }
    }
}

/// Receives diagnostic events.
pub trait DiagnosticSource: Send + Sync {
    /// Whether events named `name` should be built and written at all
    fn is_enabled(&self, _name: &str) -> bool {
        true
    }

    fn write(&self, event: &DiagnosticEvent<'_>);
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDiagnosticSource;

impl DiagnosticSource for NullDiagnosticSource {
    fn is_enabled(&self, _name: &str) -> bool {
        false
    }

    fn write(&self, _event: &DiagnosticEvent<'_>) {}
}

/// Forwards events to `tracing` at TRACE level under `girder::diagnostics`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnosticSource;

impl DiagnosticSource for TracingDiagnosticSource {
    fn is_enabled(&self, _name: &str) -> bool {
        tracing::enabled!(target: "girder::diagnostics", tracing::Level::TRACE)
    }

    fn write(&self, event: &DiagnosticEvent<'_>) {
        tracing::trace!(
            target: "girder::diagnostics",
            event = event.name(),
            action = %event.action().display_name,
            filter = event.filter().unwrap_or(""),
        );
    }
}
