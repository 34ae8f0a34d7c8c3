//! Recording filters
//!
//! Each filter writes its steps to a [`CallLog`] so tests can assert the
//! order the pipeline ran them in. Entries use the filter's name as prefix.

use crate::CallLog;
use async_trait::async_trait;
use girder_core::{
    ActionExecutedContext, ActionExecutingContext, ActionExecutionDelegate, ActionFilter,
    ActionResultRef, AsyncActionFilter, AsyncResourceFilter, AsyncResultFilter,
    AuthorizationFilter, AuthorizationFilterContext, Error, ExceptionContext, ExceptionFilter,
    FilterMetadata, ResourceExecutedContext, ResourceExecutingContext, ResourceExecutionDelegate,
    ResourceFilter, ResultExecutedContext, ResultExecutingContext, ResultExecutionDelegate,
    ResultFilter,
};

/// Fields every recording filter carries.
struct Recorder {
    name: String,
    log: CallLog,
    order: Option<i32>,
}

impl Recorder {
    fn new(name: &str, log: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            order: None,
        }
    }

    fn record(&self, event: impl std::fmt::Display) {
        self.log.record(&self.name, event);
    }
}

macro_rules! recording_filter {
    ($filter:ident, $($accessor:ident -> $capability:ident),+) => {
        impl $filter {
            /// Declared order, overriding the registration order
            pub fn with_order(mut self, order: i32) -> Self {
                self.recorder.order = Some(order);
                self
            }
        }

        impl FilterMetadata for $filter {
            fn name(&self) -> &str {
                &self.recorder.name
            }

            fn order(&self) -> Option<i32> {
                self.recorder.order
            }

            $(
                fn $accessor(&self) -> Option<&dyn $capability> {
                    Some(self)
                }
            )+
        }
    };
}

// ============================================================================
// Authorization
// ============================================================================

/// Records `authorize`; optionally denies with a result.
pub struct RecordingAuthorizationFilter {
    recorder: Recorder,
    deny_with: Option<ActionResultRef>,
}

impl RecordingAuthorizationFilter {
    pub fn new(name: &str, log: &CallLog) -> Self {
        Self {
            recorder: Recorder::new(name, log),
            deny_with: None,
        }
    }

    pub fn deny_with(mut self, result: ActionResultRef) -> Self {
        self.deny_with = Some(result);
        self
    }
}

recording_filter!(RecordingAuthorizationFilter, as_authorization_filter -> AuthorizationFilter);

impl AuthorizationFilter for RecordingAuthorizationFilter {
    fn on_authorization(&self, context: &mut AuthorizationFilterContext) -> Result<(), Error> {
        self.recorder.record("authorize");
        if let Some(result) = &self.deny_with {
            context.result = Some(result.clone());
        }
        Ok(())
    }
}

// ============================================================================
// Resource
// ============================================================================

/// Records `before` and `after canceled=..`; optionally short-circuits.
pub struct RecordingResourceFilter {
    recorder: Recorder,
    short_circuit: Option<ActionResultRef>,
}

impl RecordingResourceFilter {
    pub fn new(name: &str, log: &CallLog) -> Self {
        Self {
            recorder: Recorder::new(name, log),
            short_circuit: None,
        }
    }

    pub fn short_circuit(mut self, result: ActionResultRef) -> Self {
        self.short_circuit = Some(result);
        self
    }
}

recording_filter!(RecordingResourceFilter, as_resource_filter -> ResourceFilter);

impl ResourceFilter for RecordingResourceFilter {
    fn on_resource_executing(&self, context: &mut ResourceExecutingContext) -> Result<(), Error> {
        self.recorder.record("before");
        if let Some(result) = &self.short_circuit {
            context.result = Some(result.clone());
        }
        Ok(())
    }

    fn on_resource_executed(&self, context: &mut ResourceExecutedContext) -> Result<(), Error> {
        self.recorder
            .record(format_args!("after canceled={}", context.canceled));
        Ok(())
    }
}

/// Async resource filter recording around `next`.
pub struct AsyncRecordingResourceFilter {
    recorder: Recorder,
    short_circuit: Option<ActionResultRef>,
}

impl AsyncRecordingResourceFilter {
    pub fn new(name: &str, log: &CallLog) -> Self {
        Self {
            recorder: Recorder::new(name, log),
            short_circuit: None,
        }
    }

    /// Set a result instead of calling `next`
    pub fn short_circuit(mut self, result: ActionResultRef) -> Self {
        self.short_circuit = Some(result);
        self
    }
}

recording_filter!(AsyncRecordingResourceFilter, as_async_resource_filter -> AsyncResourceFilter);

#[async_trait]
impl AsyncResourceFilter for AsyncRecordingResourceFilter {
    async fn on_resource_execution(
        &self,
        context: &mut ResourceExecutingContext,
        next: ResourceExecutionDelegate<'_>,
    ) -> Result<(), Error> {
        self.recorder.record("before");
        if let Some(result) = &self.short_circuit {
            context.result = Some(result.clone());
            return Ok(());
        }

        let executed = next.invoke(context).await?;
        self.recorder
            .record(format_args!("after canceled={}", executed.canceled));
        Ok(())
    }
}

// ============================================================================
// Exception
// ============================================================================

/// Records `exception:{message}`; optionally handles the error.
pub struct RecordingExceptionFilter {
    recorder: Recorder,
    handle_with: Option<Option<ActionResultRef>>,
}

impl RecordingExceptionFilter {
    pub fn new(name: &str, log: &CallLog) -> Self {
        Self {
            recorder: Recorder::new(name, log),
            handle_with: None,
        }
    }

    /// Mark errors handled, leaving the result unset
    pub fn handle(mut self) -> Self {
        self.handle_with = Some(None);
        self
    }

    /// Handle errors by replacing them with `result`
    pub fn handle_with(mut self, result: ActionResultRef) -> Self {
        self.handle_with = Some(Some(result));
        self
    }
}

recording_filter!(RecordingExceptionFilter, as_exception_filter -> ExceptionFilter);

impl ExceptionFilter for RecordingExceptionFilter {
    fn on_exception(&self, context: &mut ExceptionContext) -> Result<(), Error> {
        let message = context
            .exception
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        self.recorder.record(format_args!("exception {}", message));

        match &self.handle_with {
            Some(Some(result)) => context.result = Some(result.clone()),
            Some(None) => context.exception_handled = true,
            None => {}
        }
        Ok(())
    }
}

// ============================================================================
// Action
// ============================================================================

/// Records `before` and `after canceled=..`; optionally short-circuits.
pub struct RecordingActionFilter {
    recorder: Recorder,
    short_circuit: Option<ActionResultRef>,
}

impl RecordingActionFilter {
    pub fn new(name: &str, log: &CallLog) -> Self {
        Self {
            recorder: Recorder::new(name, log),
            short_circuit: None,
        }
    }

    pub fn short_circuit(mut self, result: ActionResultRef) -> Self {
        self.short_circuit = Some(result);
        self
    }
}

recording_filter!(RecordingActionFilter, as_action_filter -> ActionFilter);

impl ActionFilter for RecordingActionFilter {
    fn on_action_executing(&self, context: &mut ActionExecutingContext) -> Result<(), Error> {
        self.recorder.record("before");
        if let Some(result) = &self.short_circuit {
            context.result = Some(result.clone());
        }
        Ok(())
    }

    fn on_action_executed(&self, context: &mut ActionExecutedContext) -> Result<(), Error> {
        self.recorder
            .record(format_args!("after canceled={}", context.canceled));
        Ok(())
    }
}

/// Async action filter recording around `next`.
pub struct AsyncRecordingActionFilter {
    recorder: Recorder,
    short_circuit: Option<ActionResultRef>,
}

impl AsyncRecordingActionFilter {
    pub fn new(name: &str, log: &CallLog) -> Self {
        Self {
            recorder: Recorder::new(name, log),
            short_circuit: None,
        }
    }

    pub fn short_circuit(mut self, result: ActionResultRef) -> Self {
        self.short_circuit = Some(result);
        self
    }
}

recording_filter!(AsyncRecordingActionFilter, as_async_action_filter -> AsyncActionFilter);

#[async_trait]
impl AsyncActionFilter for AsyncRecordingActionFilter {
    async fn on_action_execution(
        &self,
        context: &mut ActionExecutingContext,
        next: ActionExecutionDelegate<'_>,
    ) -> Result<(), Error> {
        self.recorder.record("before");
        if let Some(result) = &self.short_circuit {
            context.result = Some(result.clone());
            return Ok(());
        }

        let executed = next.invoke(context).await?;
        let failed = executed.exception.is_some();
        self.recorder
            .record(format_args!("after canceled={} failed={}", executed.canceled, failed));
        Ok(())
    }
}

// ============================================================================
// Result
// ============================================================================

/// Records `before` and `after`; optionally cancels or always runs.
pub struct RecordingResultFilter {
    recorder: Recorder,
    cancel: bool,
    always_run: bool,
}

impl RecordingResultFilter {
    pub fn new(name: &str, log: &CallLog) -> Self {
        Self {
            recorder: Recorder::new(name, log),
            cancel: false,
            always_run: false,
        }
    }

    /// Cancel result execution from `on_result_executing`
    pub fn cancel(mut self) -> Self {
        self.cancel = true;
        self
    }

    /// Also run for short-circuit results of authorization and resource filters
    pub fn always_run(mut self) -> Self {
        self.always_run = true;
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.recorder.order = Some(order);
        self
    }
}

impl FilterMetadata for RecordingResultFilter {
    fn name(&self) -> &str {
        &self.recorder.name
    }

    fn order(&self) -> Option<i32> {
        self.recorder.order
    }

    fn as_result_filter(&self) -> Option<&dyn ResultFilter> {
        Some(self)
    }

    fn as_always_run_result_filter(&self) -> Option<&dyn ResultFilter> {
        self.always_run.then_some(self as &dyn ResultFilter)
    }
}

impl ResultFilter for RecordingResultFilter {
    fn on_result_executing(&self, context: &mut ResultExecutingContext) -> Result<(), Error> {
        let result = context.result.as_ref().map(|r| r.name().to_string()).unwrap_or_default();
        self.recorder.record(format_args!("before {}", result));
        if self.cancel {
            context.cancel = true;
        }
        Ok(())
    }

    fn on_result_executed(&self, context: &mut ResultExecutedContext) -> Result<(), Error> {
        self.recorder
            .record(format_args!("after canceled={}", context.canceled));
        Ok(())
    }
}

/// Async result filter recording around `next`.
pub struct AsyncRecordingResultFilter {
    recorder: Recorder,
    cancel: bool,
}

impl AsyncRecordingResultFilter {
    pub fn new(name: &str, log: &CallLog) -> Self {
        Self {
            recorder: Recorder::new(name, log),
            cancel: false,
        }
    }

    /// Set `cancel` instead of calling `next`
    pub fn cancel(mut self) -> Self {
        self.cancel = true;
        self
    }
}

recording_filter!(AsyncRecordingResultFilter, as_async_result_filter -> AsyncResultFilter);

#[async_trait]
impl AsyncResultFilter for AsyncRecordingResultFilter {
    async fn on_result_execution(
        &self,
        context: &mut ResultExecutingContext,
        next: ResultExecutionDelegate<'_>,
    ) -> Result<(), Error> {
        self.recorder.record("before");
        if self.cancel {
            context.cancel = true;
            return Ok(());
        }

        let executed = next.invoke(context).await?;
        self.recorder
            .record(format_args!("after canceled={}", executed.canceled));
        Ok(())
    }
}
