//! Request handling
//!
//! [`MvcHandler`] ties selection and invocation together: it picks the
//! action for the route values of a request, builds its invoker and runs it.

use crate::action_context::ActionContext;
use crate::action_descriptor::ActionDescriptorCollectionProvider;
use crate::error::Error;
use crate::http::{HttpContext, HttpRequest, HttpResponse};
use crate::invoker::{ActionInvoker, ControllerActionInvokerCache, ControllerActionInvokerProvider};
use crate::logging::events;
use crate::options::MvcOptions;
use crate::route::{RouteData, RouteValues};
use crate::selection::ActionSelector;
use std::sync::Arc;

/// Selects and invokes the action for each request.
pub struct MvcHandler {
    selector: ActionSelector,
    invoker_provider: ControllerActionInvokerProvider,
}

impl MvcHandler {
    /// Handler over `collection_provider` with the default constraint and
    /// filter providers.
    ///
    /// Fails with every configuration problem of `options` at once.
    pub fn new(
        collection_provider: Arc<ActionDescriptorCollectionProvider>,
        options: MvcOptions,
    ) -> Result<Self, Error> {
        options.validate()?;

        let cache = ControllerActionInvokerCache::new(Arc::clone(&collection_provider))
            .with_global_filters(options.filters.clone());
        Ok(Self {
            selector: ActionSelector::new(collection_provider),
            invoker_provider: ControllerActionInvokerProvider::new(Arc::new(cache), &options),
        })
    }

    pub fn from_parts(selector: ActionSelector, invoker_provider: ControllerActionInvokerProvider) -> Self {
        Self {
            selector,
            invoker_provider,
        }
    }

    pub fn selector(&self) -> &ActionSelector {
        &self.selector
    }

    pub fn invoker_provider(&self) -> &ControllerActionInvokerProvider {
        &self.invoker_provider
    }

    /// Run the action matching `route_values`, writing to the response of
    /// `http_context`.
    pub async fn handle(&self, http_context: Arc<HttpContext>, route_values: RouteValues) -> Result<(), Error> {
        let candidates = self.selector.select_candidates(&route_values);
        let selected =
            self.selector
                .select_best_candidate(&http_context, &route_values, &candidates)?;

        let Some(action) = selected else {
            events::no_actions_matched(&route_values);
            return Err(Error::ActionNotFound(format!(
                "No action matched the route values {:?}",
                route_values
            )));
        };

        let action_context = ActionContext::new(http_context, RouteData::new(route_values), action);
        let invoker: Box<dyn ActionInvoker> =
            Box::new(self.invoker_provider.create_invoker(action_context)?);
        invoker.invoke().await
    }

    /// Handle `request` and return the response it produced.
    pub async fn respond(&self, request: HttpRequest, route_values: RouteValues) -> Result<HttpResponse, Error> {
        let http_context = Arc::new(HttpContext::new(request));
        self.handle(Arc::clone(&http_context), route_values).await?;
        Ok(http_context.take_response())
    }
}
