//! Per-request contexts shared by the pipeline phases

use crate::action_descriptor::ActionDescriptor;
use crate::binding::ValueProviderFactories;
use crate::http::HttpContext;
use crate::route::RouteData;
use parking_lot::{Mutex, MutexGuard};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Default cap on recorded model errors
pub const DEFAULT_MAX_MODEL_ERRORS: usize = 200;

/// Key under which the "too many errors" marker is recorded
pub const TOO_MANY_MODEL_ERRORS_KEY: &str = "";

/// Everything known about the action being executed for one request.
///
/// Cloning is cheap and every clone refers to the same request.
#[derive(Clone)]
pub struct ActionContext {
    pub http_context: Arc<HttpContext>,
    pub route_data: Arc<RouteData>,
    pub action_descriptor: Arc<ActionDescriptor>,
    model_state: Arc<Mutex<ModelStateDictionary>>,
}

impl ActionContext {
    pub fn new(
        http_context: Arc<HttpContext>,
        route_data: RouteData,
        action_descriptor: Arc<ActionDescriptor>,
    ) -> Self {
        Self {
            http_context,
            route_data: Arc::new(route_data),
            action_descriptor,
            model_state: Arc::new(Mutex::new(ModelStateDictionary::default())),
        }
    }

    /// Lock the model state of this request
    pub fn model_state(&self) -> MutexGuard<'_, ModelStateDictionary> {
        self.model_state.lock()
    }
}

impl std::fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionContext")
            .field("action", &self.action_descriptor.display_name)
            .field("route_values", &self.route_data.values)
            .finish()
    }
}

/// Action context of a controller action plus its value provider factories.
#[derive(Clone, Debug)]
pub struct ControllerContext {
    pub action_context: ActionContext,
    pub value_provider_factories: ValueProviderFactories,
}

impl ControllerContext {
    pub fn new(action_context: ActionContext, value_provider_factories: ValueProviderFactories) -> Self {
        Self {
            action_context,
            value_provider_factories,
        }
    }

    pub fn action_descriptor(&self) -> &Arc<ActionDescriptor> {
        &self.action_context.action_descriptor
    }
}

/// Model errors collected while binding one request
#[derive(Debug, Clone)]
pub struct ModelStateDictionary {
    errors: BTreeMap<String, Vec<String>>,
    error_count: usize,
    max_allowed_errors: usize,
    has_reached_max_errors: bool,
}

impl ModelStateDictionary {
    pub fn new(max_allowed_errors: usize) -> Self {
        Self {
            errors: BTreeMap::new(),
            error_count: 0,
            max_allowed_errors,
            has_reached_max_errors: false,
        }
    }

    pub fn max_allowed_errors(&self) -> usize {
        self.max_allowed_errors
    }

    pub fn set_max_allowed_errors(&mut self, max: usize) {
        self.max_allowed_errors = max;
    }

    /// Record an error for `key`.
    ///
    /// Returns `false` once the limit is reached; the first rejected error
    /// leaves a single marker under [`TOO_MANY_MODEL_ERRORS_KEY`].
    pub fn add_model_error(&mut self, key: impl Into<String>, message: impl Into<String>) -> bool {
        if self.error_count >= self.max_allowed_errors {
            if !self.has_reached_max_errors {
                self.has_reached_max_errors = true;
                self.errors
                    .entry(TOO_MANY_MODEL_ERRORS_KEY.to_string())
                    .or_default()
                    .push(format!(
                        "The maximum number of allowed model errors ({}) has been reached.",
                        self.max_allowed_errors
                    ));
            }
            return false;
        }

        self.error_count += 1;
        self.errors.entry(key.into()).or_default().push(message.into());
        true
    }

    pub fn errors(&self, key: &str) -> &[String] {
        self.errors.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn has_reached_max_errors(&self) -> bool {
        self.has_reached_max_errors
    }

    pub fn is_valid(&self) -> bool {
        self.error_count == 0 && !self.has_reached_max_errors
    }
}

impl Default for ModelStateDictionary {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MODEL_ERRORS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_state_valid_by_default() {
        let state = ModelStateDictionary::default();
        assert!(state.is_valid());
        assert_eq!(state.max_allowed_errors(), DEFAULT_MAX_MODEL_ERRORS);
    }

    #[test]
    fn test_model_state_caps_errors() {
        let mut state = ModelStateDictionary::new(2);

        assert!(state.add_model_error("id", "not a number"));
        assert!(state.add_model_error("name", "required"));
        assert!(!state.add_model_error("age", "too old"));
        assert!(!state.add_model_error("age", "too old again"));

        assert_eq!(state.error_count(), 2);
        assert!(state.has_reached_max_errors());
        assert_eq!(state.errors(TOO_MANY_MODEL_ERRORS_KEY).len(), 1);
        assert!(state.errors("age").is_empty());
        assert!(!state.is_valid());
    }
}
