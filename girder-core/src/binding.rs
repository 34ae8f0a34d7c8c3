//! Argument binding
//!
//! Value providers expose raw request values by key. The argument binder
//! reads them for every declared parameter and bound property and converts
//! them into JSON values the method executor understands.

use crate::action_context::{ActionContext, ControllerContext};
use crate::error::Error;
use crate::method_executor::ControllerInstance;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Source of raw values for one request.
pub trait ValueProvider: Send + Sync {
    /// Whether any value is stored under `prefix` or `prefix.*`
    fn contains_prefix(&self, prefix: &str) -> bool;

    fn get_value(&self, key: &str) -> Option<String>;
}

/// Creates a [`ValueProvider`] per request.
pub trait ValueProviderFactory: Send + Sync {
    /// Unique name, used to detect duplicate registrations
    fn name(&self) -> &str;

    fn create_value_provider(&self, context: &ActionContext) -> Box<dyn ValueProvider>;
}

/// Ordered set of value provider factories; the first one that has a value
/// for a key wins.
#[derive(Clone)]
pub struct ValueProviderFactories(Arc<[Arc<dyn ValueProviderFactory>]>);

impl ValueProviderFactories {
    pub fn new(factories: Vec<Arc<dyn ValueProviderFactory>>) -> Self {
        Self(factories.into())
    }

    /// Route values first, then the query string
    pub fn default_factories() -> Self {
        Self::new(vec![
            Arc::new(RouteValueProviderFactory),
            Arc::new(QueryStringValueProviderFactory),
        ])
    }

    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|f| f.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ValueProviderFactory>> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// One provider over every factory for this request
    pub fn create_value_provider(&self, context: &ActionContext) -> CompositeValueProvider {
        CompositeValueProvider::new(
            self.0
                .iter()
                .map(|factory| factory.create_value_provider(context))
                .collect(),
        )
    }
}

impl Default for ValueProviderFactories {
    fn default() -> Self {
        Self::default_factories()
    }
}

impl fmt::Debug for ValueProviderFactories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

fn has_prefix<'a>(mut keys: impl Iterator<Item = &'a str>, prefix: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    keys.any(|key| {
        key.get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
            && matches!(key.as_bytes().get(prefix.len()), None | Some(b'.') | Some(b'['))
    })
}

// ============================================================================
// Route values
// ============================================================================

pub struct RouteValueProvider {
    values: crate::route::RouteValues,
}

impl ValueProvider for RouteValueProvider {
    fn contains_prefix(&self, prefix: &str) -> bool {
        has_prefix(self.values.iter().map(|(key, _)| key), prefix)
    }

    fn get_value(&self, key: &str) -> Option<String> {
        self.values.get(key).map(str::to_string)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RouteValueProviderFactory;

impl ValueProviderFactory for RouteValueProviderFactory {
    fn name(&self) -> &str {
        "route"
    }

    fn create_value_provider(&self, context: &ActionContext) -> Box<dyn ValueProvider> {
        Box::new(RouteValueProvider {
            values: context.route_data.values.clone(),
        })
    }
}

// ============================================================================
// Query string
// ============================================================================

pub struct QueryStringValueProvider {
    values: HashMap<String, String>,
}

impl ValueProvider for QueryStringValueProvider {
    fn contains_prefix(&self, prefix: &str) -> bool {
        has_prefix(self.values.keys().map(String::as_str), prefix)
    }

    fn get_value(&self, key: &str) -> Option<String> {
        self.values
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.clone())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QueryStringValueProviderFactory;

impl ValueProviderFactory for QueryStringValueProviderFactory {
    fn name(&self) -> &str {
        "query"
    }

    fn create_value_provider(&self, context: &ActionContext) -> Box<dyn ValueProvider> {
        Box::new(QueryStringValueProvider {
            values: context.http_context.request.query_params.clone(),
        })
    }
}

/// Asks each provider in turn.
pub struct CompositeValueProvider {
    providers: Vec<Box<dyn ValueProvider>>,
}

impl CompositeValueProvider {
    pub fn new(providers: Vec<Box<dyn ValueProvider>>) -> Self {
        Self { providers }
    }
}

impl ValueProvider for CompositeValueProvider {
    fn contains_prefix(&self, prefix: &str) -> bool {
        self.providers.iter().any(|p| p.contains_prefix(prefix))
    }

    fn get_value(&self, key: &str) -> Option<String> {
        self.providers.iter().find_map(|p| p.get_value(key))
    }
}

// ============================================================================
// Binder
// ============================================================================

/// Fills the argument map of one request and sets bound properties.
#[async_trait]
pub trait ArgumentBinder: Send + Sync {
    async fn bind(
        &self,
        context: &ControllerContext,
        controller: &ControllerInstance,
        arguments: &mut HashMap<String, Value>,
    ) -> Result<(), Error>;
}

/// Binds parameters and properties by name from the value providers.
///
/// Values that do not convert to the declared type are recorded in model
/// state and left unbound.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultArgumentBinder;

#[async_trait]
impl ArgumentBinder for DefaultArgumentBinder {
    async fn bind(
        &self,
        context: &ControllerContext,
        controller: &ControllerInstance,
        arguments: &mut HashMap<String, Value>,
    ) -> Result<(), Error> {
        let action_context = &context.action_context;
        let descriptor = &action_context.action_descriptor;
        let provider = context
            .value_provider_factories
            .create_value_provider(action_context);

        for parameter in &descriptor.parameters {
            let key = parameter.model_name();
            let Some(raw) = provider.get_value(key) else {
                continue;
            };
            match convert_value(&raw, &parameter.parameter_type) {
                Some(value) => {
                    arguments.insert(parameter.name.clone(), value);
                }
                None => {
                    action_context.model_state().add_model_error(
                        key,
                        format!("The value '{}' is not valid for {}.", raw, parameter.name),
                    );
                }
            }
        }

        for property in &descriptor.bound_properties {
            if let Some(raw) = provider.get_value(&property.name) {
                property.set(controller, convert_value(&raw, "").unwrap_or(Value::String(raw)))?;
            }
        }

        Ok(())
    }
}

/// Convert a raw string to the JSON shape of `parameter_type`.
///
/// Unknown types get the closest scalar: integer, float, bool, else string.
pub(crate) fn convert_value(raw: &str, parameter_type: &str) -> Option<Value> {
    let ty = parameter_type.rsplit("::").next().unwrap_or(parameter_type);
    match ty {
        "i8" | "i16" | "i32" | "i64" | "isize" => raw.trim().parse::<i64>().ok().map(Value::from),
        "u8" | "u16" | "u32" | "u64" | "usize" => raw.trim().parse::<u64>().ok().map(Value::from),
        "f32" | "f64" => raw.trim().parse::<f64>().ok().map(Value::from),
        "bool" => raw.trim().to_ascii_lowercase().parse::<bool>().ok().map(Value::from),
        "String" | "&str" | "str" => Some(Value::String(raw.to_string())),
        _ => Some(guess_scalar(raw)),
    }
}

fn guess_scalar(raw: &str) -> Value {
    if let Ok(value) = raw.parse::<i64>() {
        return Value::from(value);
    }
    if let Ok(value) = raw.parse::<f64>() {
        return Value::from(value);
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}
