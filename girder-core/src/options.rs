//! Pipeline options
//!
//! ```
//! use girder_core::options::MvcOptions;
//!
//! let options = MvcOptions::new()
//!     .max_model_validation_errors(50)
//!     .log_execution_plans(false);
//! assert!(options.validate().is_ok());
//! ```

use crate::action_context::DEFAULT_MAX_MODEL_ERRORS;
use crate::binding::{ValueProviderFactories, ValueProviderFactory};
use crate::error::Error;
use crate::filters::{FilterDescriptor, FilterRef, FilterScope};
use std::collections::HashSet;
use std::sync::Arc;

/// Options shared by every request.
#[derive(Clone)]
pub struct MvcOptions {
    /// Filters applied to every action
    pub filters: Vec<FilterDescriptor>,
    /// Value providers consulted by the binder, in order
    pub value_provider_factories: ValueProviderFactories,
    /// Model errors recorded per request before the overflow marker
    pub max_model_validation_errors: usize,
    /// Log the filters of each kind once per invocation at DEBUG
    pub log_execution_plans: bool,
    /// Forward diagnostic events to `tracing`
    pub enable_diagnostics: bool,
}

impl Default for MvcOptions {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            value_provider_factories: ValueProviderFactories::default_factories(),
            max_model_validation_errors: DEFAULT_MAX_MODEL_ERRORS,
            log_execution_plans: true,
            enable_diagnostics: false,
        }
    }
}

impl MvcOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `GIRDER_MAX_MODEL_ERRORS`,
    /// `GIRDER_LOG_EXECUTION_PLANS` and `GIRDER_ENABLE_DIAGNOSTICS`.
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Some(max) = env_parse::<usize>("GIRDER_MAX_MODEL_ERRORS") {
            options.max_model_validation_errors = max;
        }
        if let Some(enabled) = env_flag("GIRDER_LOG_EXECUTION_PLANS") {
            options.log_execution_plans = enabled;
        }
        if let Some(enabled) = env_flag("GIRDER_ENABLE_DIAGNOSTICS") {
            options.enable_diagnostics = enabled;
        }
        options
    }

    /// Register a global filter with an explicit order.
    pub fn add_filter(mut self, filter: FilterRef, order: i32) -> Self {
        self.filters
            .push(FilterDescriptor::new(filter, FilterScope::Global).with_order(order));
        self
    }

    pub fn value_provider_factories(mut self, factories: Vec<Arc<dyn ValueProviderFactory>>) -> Self {
        self.value_provider_factories = ValueProviderFactories::new(factories);
        self
    }

    pub fn max_model_validation_errors(mut self, max: usize) -> Self {
        self.max_model_validation_errors = max;
        self
    }

    pub fn log_execution_plans(mut self, enabled: bool) -> Self {
        self.log_execution_plans = enabled;
        self
    }

    pub fn enable_diagnostics(mut self, enabled: bool) -> Self {
        self.enable_diagnostics = enabled;
        self
    }

    /// Every problem found, reported together.
    pub fn validate(&self) -> Result<(), Error> {
        let mut errors = Vec::new();

        if self.max_model_validation_errors == 0 {
            errors.push("max_model_validation_errors must be greater than zero".to_string());
        }

        let mut seen = HashSet::new();
        for name in self.value_provider_factories.names() {
            if !seen.insert(name) {
                errors.push(format!("value provider factory '{}' is registered twice", name));
            }
        }

        Error::from_configuration_errors(errors)
    }
}

impl std::fmt::Debug for MvcOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MvcOptions")
            .field("filters", &self.filters)
            .field("value_provider_factories", &self.value_provider_factories.names())
            .field("max_model_validation_errors", &self.max_model_validation_errors)
            .field("log_execution_plans", &self.log_execution_plans)
            .field("enable_diagnostics", &self.enable_diagnostics)
            .finish()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_flag(key: &str) -> Option<bool> {
    let value = std::env::var(key).ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
