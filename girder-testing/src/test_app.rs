// Test application builder around MvcHandler

use girder_core::{
    ActionDescriptor, ActionDescriptorCollectionProvider, ActionSelector, ControllerActionInvokerCache,
    ControllerActionInvokerProvider, DiagnosticSource, Error, FilterRef, HttpRequest, HttpResponse,
    MvcHandler, MvcOptions, RouteValues,
};
use std::sync::Arc;

/// A handler over a fixed set of actions, for integration tests.
pub struct TestApp {
    pub handler: MvcHandler,
    pub actions: Arc<ActionDescriptorCollectionProvider>,
}

impl TestApp {
    /// Run `controller.action` for a `method` request to `/`
    pub async fn request(&self, method: &str, controller: &str, action: &str) -> Result<HttpResponse, Error> {
        self.send(HttpRequest::new(method, "/"), controller, action).await
    }

    /// Run `controller.action` for `request`
    pub async fn send(
        &self,
        request: HttpRequest,
        controller: &str,
        action: &str,
    ) -> Result<HttpResponse, Error> {
        let route_values = RouteValues::new()
            .with("controller", controller)
            .with("action", action);
        self.handler.respond(request, route_values).await
    }

    /// Replace every action, bumping the collection version
    pub fn replace_actions(&self, actions: Vec<ActionDescriptor>) -> Result<u64, Error> {
        self.actions.update(actions)
    }

    pub fn invoker_cache(&self) -> &Arc<ControllerActionInvokerCache> {
        self.handler.invoker_provider().cache()
    }
}

/// Builder for test applications
pub struct TestAppBuilder {
    actions: Vec<ActionDescriptor>,
    options: MvcOptions,
    diagnostics: Option<Arc<dyn DiagnosticSource>>,
}

impl TestAppBuilder {
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
            options: MvcOptions::default().log_execution_plans(false),
            diagnostics: None,
        }
    }

    pub fn with_action(mut self, action: ActionDescriptor) -> Self {
        self.actions.push(action);
        self
    }

    /// Register a global filter
    pub fn with_filter(mut self, filter: FilterRef, order: i32) -> Self {
        self.options = self.options.add_filter(filter, order);
        self
    }

    pub fn with_options(self, options: MvcOptions) -> Self {
        Self { options, ..self }
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticSource>) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    pub fn build(self) -> Result<TestApp, Error> {
        self.options.validate()?;

        let actions = Arc::new(ActionDescriptorCollectionProvider::with_actions(self.actions)?);
        let cache = ControllerActionInvokerCache::new(Arc::clone(&actions))
            .with_global_filters(self.options.filters.clone());
        let mut invoker_provider = ControllerActionInvokerProvider::new(Arc::new(cache), &self.options);
        if let Some(diagnostics) = self.diagnostics {
            invoker_provider = invoker_provider.with_diagnostics(diagnostics);
        }

        Ok(TestApp {
            handler: MvcHandler::from_parts(ActionSelector::new(Arc::clone(&actions)), invoker_provider),
            actions,
        })
    }
}

impl Default for TestAppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_app_builds() {
        let app = TestAppBuilder::new().build().unwrap();
        assert!(app.actions.collection().is_empty());
    }

    #[test]
    fn test_invalid_options_fail_the_build() {
        let result = TestAppBuilder::new()
            .with_options(MvcOptions::new().max_model_validation_errors(0))
            .build();
        assert!(matches!(result, Err(Error::Configuration(_))));
    }
}
