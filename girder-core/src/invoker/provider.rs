// Builds a ready-to-run invoker for a selected controller action

use super::{ControllerActionInvoker, ControllerActionInvokerCache, ControllerStage, InvokerCore};
use crate::action_context::{ActionContext, ControllerContext};
use crate::action_result::{ActionResultTypeMapper, DefaultActionResultTypeMapper};
use crate::binding::ValueProviderFactories;
use crate::diagnostics::{DiagnosticSource, NullDiagnosticSource, TracingDiagnosticSource};
use crate::error::Error;
use crate::options::MvcOptions;
use std::sync::Arc;

/// Creates one [`ControllerActionInvoker`] per request.
pub struct ControllerActionInvokerProvider {
    cache: Arc<ControllerActionInvokerCache>,
    value_provider_factories: ValueProviderFactories,
    max_model_validation_errors: usize,
    log_execution_plans: bool,
    diagnostics: Arc<dyn DiagnosticSource>,
    mapper: Arc<dyn ActionResultTypeMapper>,
}

impl ControllerActionInvokerProvider {
    pub fn new(cache: Arc<ControllerActionInvokerCache>, options: &MvcOptions) -> Self {
        let diagnostics: Arc<dyn DiagnosticSource> = if options.enable_diagnostics {
            Arc::new(TracingDiagnosticSource)
        } else {
            Arc::new(NullDiagnosticSource)
        };

        Self {
            cache,
            value_provider_factories: options.value_provider_factories.clone(),
            max_model_validation_errors: options.max_model_validation_errors,
            log_execution_plans: options.log_execution_plans,
            diagnostics,
            mapper: Arc::new(DefaultActionResultTypeMapper),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticSource>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn with_mapper(mut self, mapper: Arc<dyn ActionResultTypeMapper>) -> Self {
        self.mapper = mapper;
        self
    }

    pub fn cache(&self) -> &Arc<ControllerActionInvokerCache> {
        &self.cache
    }

    pub fn create_invoker(&self, action_context: ActionContext) -> Result<ControllerActionInvoker, Error> {
        action_context
            .model_state()
            .set_max_allowed_errors(self.max_model_validation_errors);

        let controller_context =
            ControllerContext::new(action_context.clone(), self.value_provider_factories.clone());
        let (entry, filters) = self.cache.get_state(&controller_context)?;

        let core = InvokerCore::new(action_context, filters, self.value_provider_factories.clone())
            .with_diagnostics(Arc::clone(&self.diagnostics))
            .with_log_execution_plans(self.log_execution_plans);
        let stage = ControllerStage::new(controller_context, entry, Arc::clone(&self.mapper));

        Ok(ControllerActionInvoker::new(core, stage))
    }
}

impl std::fmt::Debug for ControllerActionInvokerProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerActionInvokerProvider")
            .field("value_provider_factories", &self.value_provider_factories)
            .field("max_model_validation_errors", &self.max_model_validation_errors)
            .field("log_execution_plans", &self.log_execution_plans)
            .finish_non_exhaustive()
    }
}
