//! Action methods and their executors
//!
//! An [`ActionMethod`] is registered once per controller method with a typed
//! closure. Registration erases the controller type, the argument
//! conversion and the return shape, so invoking the method later is a
//! single indirect call with no per-call type inspection.
//!
//! ```ignore
//! let list = ActionMethod::new("list", |c: &OrdersController, args| {
//!     let page: u32 = args.get(0)?;
//!     Ok(Json(c.list(page)))
//! })
//! .parameter::<u32>("page");
//! ```

use crate::action_result::ActionResultRef;
use crate::error::Error;
use crate::http::Json;
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::{Any, type_name};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A controller instance as seen by the pipeline
pub type ControllerInstance = Arc<dyn Any + Send + Sync>;

// ============================================================================
// Arguments and outputs
// ============================================================================

/// Positional arguments handed to an action method.
#[derive(Debug, Clone, Default)]
pub struct MethodArguments {
    values: Vec<Value>,
}

impl MethodArguments {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Convert the argument at `index` to `T`.
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> Result<T, Error> {
        let value = self.values.get(index).cloned().ok_or_else(|| {
            Error::Argument(format!(
                "Argument index {} is out of range ({} arguments).",
                index,
                self.values.len()
            ))
        })?;
        serde_json::from_value(value).map_err(|e| {
            Error::Argument(format!(
                "Argument {} cannot be converted to '{}': {}",
                index,
                type_name::<T>(),
                e
            ))
        })
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Shape of a method's return value once awaited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    /// Nothing
    Void,
    /// A result handle, which must not be null
    ActionResult,
    /// Any other value
    Object,
}

/// Raw value produced by one invocation.
pub enum MethodOutput {
    Void,
    ActionResult(Option<ActionResultRef>),
    Object(Value),
}

/// Return types an action method may have.
pub trait IntoMethodOutput: Send + 'static {
    const KIND: ReturnKind;

    fn into_output(self) -> Result<MethodOutput, Error>;

    /// Declared type reported with object results
    fn declared_type() -> &'static str {
        type_name::<Self>()
    }
}

impl IntoMethodOutput for () {
    const KIND: ReturnKind = ReturnKind::Void;

    fn into_output(self) -> Result<MethodOutput, Error> {
        Ok(MethodOutput::Void)
    }
}

impl IntoMethodOutput for ActionResultRef {
    const KIND: ReturnKind = ReturnKind::ActionResult;

    fn into_output(self) -> Result<MethodOutput, Error> {
        Ok(MethodOutput::ActionResult(Some(self)))
    }
}

impl IntoMethodOutput for Option<ActionResultRef> {
    const KIND: ReturnKind = ReturnKind::ActionResult;

    fn into_output(self) -> Result<MethodOutput, Error> {
        Ok(MethodOutput::ActionResult(self))
    }
}

impl IntoMethodOutput for Value {
    const KIND: ReturnKind = ReturnKind::Object;

    fn into_output(self) -> Result<MethodOutput, Error> {
        Ok(MethodOutput::Object(self))
    }
}

impl<T: Serialize + Send + 'static> IntoMethodOutput for Json<T> {
    const KIND: ReturnKind = ReturnKind::Object;

    fn into_output(self) -> Result<MethodOutput, Error> {
        serde_json::to_value(&self.0)
            .map(MethodOutput::Object)
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    fn declared_type() -> &'static str {
        type_name::<T>()
    }
}

impl<T: IntoMethodOutput> IntoMethodOutput for Result<T, Error> {
    const KIND: ReturnKind = T::KIND;

    fn into_output(self) -> Result<MethodOutput, Error> {
        self?.into_output()
    }

    fn declared_type() -> &'static str {
        T::declared_type()
    }
}

// ============================================================================
// Action methods
// ============================================================================

/// Process-wide identity of a registered method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(u64);

static NEXT_METHOD_ID: AtomicU64 = AtomicU64::new(1);

impl MethodId {
    fn next() -> Self {
        MethodId(NEXT_METHOD_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A declared method parameter.
#[derive(Debug, Clone)]
pub struct ParameterInfo {
    pub name: String,
    pub parameter_type: &'static str,
    pub default_value: Option<Value>,
}

type SyncInvoker =
    dyn Fn(&ControllerInstance, MethodArguments) -> Result<MethodOutput, Error> + Send + Sync;
type AsyncInvoker = dyn Fn(ControllerInstance, MethodArguments) -> BoxFuture<'static, Result<MethodOutput, Error>>
    + Send
    + Sync;

pub(crate) enum MethodInvoker {
    Sync(Box<SyncInvoker>),
    Async(Box<AsyncInvoker>),
}

/// A controller method registered with the framework.
pub struct ActionMethod {
    id: MethodId,
    name: String,
    controller_type: &'static str,
    parameters: Vec<ParameterInfo>,
    return_kind: ReturnKind,
    return_type: String,
    declared_type: &'static str,
    invoker: MethodInvoker,
}

impl ActionMethod {
    /// Register a synchronous method.
    pub fn new<C, R, F>(name: impl Into<String>, method: F) -> Self
    where
        C: Any + Send + Sync,
        R: IntoMethodOutput,
        F: Fn(&C, MethodArguments) -> R + Send + Sync + 'static,
    {
        let invoker = move |instance: &ControllerInstance, arguments: MethodArguments| {
            let controller = instance
                .downcast_ref::<C>()
                .ok_or_else(|| controller_type_mismatch::<C>())?;
            method(controller, arguments).into_output()
        };

        Self {
            id: MethodId::next(),
            name: name.into(),
            controller_type: type_name::<C>(),
            parameters: Vec::new(),
            return_kind: R::KIND,
            return_type: type_name::<R>().to_string(),
            declared_type: R::declared_type(),
            invoker: MethodInvoker::Sync(Box::new(invoker)),
        }
    }

    /// Register an asynchronous method.
    pub fn new_async<C, R, Fut, F>(name: impl Into<String>, method: F) -> Self
    where
        C: Any + Send + Sync,
        R: IntoMethodOutput,
        Fut: Future<Output = R> + Send + 'static,
        F: Fn(Arc<C>, MethodArguments) -> Fut + Send + Sync + 'static,
    {
        let invoker = move |instance: ControllerInstance,
                            arguments: MethodArguments|
              -> BoxFuture<'static, Result<MethodOutput, Error>> {
            match instance.downcast::<C>() {
                Ok(controller) => {
                    let pending = method(controller, arguments);
                    Box::pin(async move { pending.await.into_output() })
                }
                Err(_) => Box::pin(futures_util::future::ready(Err(
                    controller_type_mismatch::<C>(),
                ))),
            }
        };

        Self {
            id: MethodId::next(),
            name: name.into(),
            controller_type: type_name::<C>(),
            parameters: Vec::new(),
            return_kind: R::KIND,
            return_type: format!("impl Future<Output = {}>", type_name::<R>()),
            declared_type: R::declared_type(),
            invoker: MethodInvoker::Async(Box::new(invoker)),
        }
    }

    /// Declare a parameter without a default value.
    pub fn parameter<T: 'static>(mut self, name: impl Into<String>) -> Self {
        self.parameters.push(ParameterInfo {
            name: name.into(),
            parameter_type: type_name::<T>(),
            default_value: None,
        });
        self
    }

    /// Declare a parameter with an explicit default value.
    pub fn parameter_with_default<T: Serialize + 'static>(
        mut self,
        name: impl Into<String>,
        default: T,
    ) -> Self {
        self.parameters.push(ParameterInfo {
            name: name.into(),
            parameter_type: type_name::<T>(),
            default_value: serde_json::to_value(default).ok(),
        });
        self
    }

    pub fn id(&self) -> MethodId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn controller_type(&self) -> &'static str {
        self.controller_type
    }

    pub fn parameters(&self) -> &[ParameterInfo] {
        &self.parameters
    }

    pub fn is_async(&self) -> bool {
        matches!(self.invoker, MethodInvoker::Async(_))
    }

    pub fn return_kind(&self) -> ReturnKind {
        self.return_kind
    }

    pub fn return_type(&self) -> &str {
        &self.return_type
    }
}

impl std::fmt::Debug for ActionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionMethod")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("controller_type", &self.controller_type)
            .field("return_type", &self.return_type)
            .finish()
    }
}

fn controller_type_mismatch<C>() -> Error {
    Error::InvalidOperation(format!(
        "The controller instance is not of type '{}'.",
        type_name::<C>()
    ))
}

// ============================================================================
// Object method executor
// ============================================================================

/// Prepared invocation of one [`ActionMethod`].
pub struct ObjectMethodExecutor {
    method: Arc<ActionMethod>,
    parameter_defaults: Vec<Value>,
}

impl ObjectMethodExecutor {
    /// Prepare `method`, computing the fallback value of every parameter.
    pub fn create(method: Arc<ActionMethod>) -> Self {
        let parameter_defaults = method
            .parameters
            .iter()
            .map(|p| p.default_value.clone().unwrap_or(Value::Null))
            .collect();

        Self {
            method,
            parameter_defaults,
        }
    }

    pub fn method(&self) -> &Arc<ActionMethod> {
        &self.method
    }

    pub fn method_id(&self) -> MethodId {
        self.method.id
    }

    pub fn is_method_async(&self) -> bool {
        self.method.is_async()
    }

    pub fn return_kind(&self) -> ReturnKind {
        self.method.return_kind
    }

    /// Return type as declared, including any future wrapper
    pub fn method_return_type(&self) -> &str {
        &self.method.return_type
    }

    /// Type carried by object results
    pub fn declared_result_type(&self) -> &'static str {
        self.method.declared_type
    }

    pub fn parameters(&self) -> &[ParameterInfo] {
        &self.method.parameters
    }

    pub fn get_default_value_for_parameter(&self, index: usize) -> Result<&Value, Error> {
        self.parameter_defaults.get(index).ok_or_else(|| {
            Error::Argument(format!(
                "Method '{}' has no parameter at index {}.",
                self.method.name, index
            ))
        })
    }

    /// Order bound arguments by parameter position, falling back to defaults.
    pub fn prepare_arguments(
        &self,
        bound: &std::collections::HashMap<String, Value>,
    ) -> MethodArguments {
        let values = self
            .method
            .parameters
            .iter()
            .zip(&self.parameter_defaults)
            .map(|(parameter, default)| {
                bound
                    .get(&parameter.name)
                    .cloned()
                    .unwrap_or_else(|| default.clone())
            })
            .collect();
        MethodArguments::new(values)
    }

    /// Invoke a synchronous method.
    pub fn execute(
        &self,
        target: &ControllerInstance,
        arguments: MethodArguments,
    ) -> Result<MethodOutput, Error> {
        match &self.method.invoker {
            MethodInvoker::Sync(invoke) => invoke(target, arguments),
            MethodInvoker::Async(_) => Err(Error::InvalidOperation(format!(
                "The method '{}' is asynchronous and must be awaited.",
                self.method.name
            ))),
        }
    }

    /// Invoke the method, awaiting it when it is asynchronous.
    pub async fn execute_async(
        &self,
        target: ControllerInstance,
        arguments: MethodArguments,
    ) -> Result<MethodOutput, Error> {
        match &self.method.invoker {
            MethodInvoker::Sync(invoke) => invoke(&target, arguments),
            MethodInvoker::Async(invoke) => invoke(target, arguments).await,
        }
    }
}

/// Executors keyed by method identity, shared for the life of the process.
#[derive(Default)]
pub struct ObjectMethodExecutorCache {
    executors: DashMap<MethodId, Arc<ObjectMethodExecutor>>,
}

impl ObjectMethodExecutorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the executor for `method`, creating it on first use.
    ///
    /// Racing callers may both build an executor; only the first one
    /// published is ever returned.
    pub fn get_or_create(&self, method: &Arc<ActionMethod>) -> Arc<ObjectMethodExecutor> {
        if let Some(existing) = self.executors.get(&method.id) {
            return Arc::clone(existing.value());
        }

        let created = Arc::new(ObjectMethodExecutor::create(Arc::clone(method)));
        Arc::clone(self.executors.entry(method.id).or_insert(created).value())
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Calculator {
        offset: i64,
    }

    fn controller() -> ControllerInstance {
        Arc::new(Calculator { offset: 10 })
    }

    #[test]
    fn test_sync_method_executes() {
        let method = ActionMethod::new("add", |c: &Calculator, args: MethodArguments| {
            let value: i64 = args.get(0)?;
            Ok(Json(value + c.offset))
        })
        .parameter::<i64>("value");

        let executor = ObjectMethodExecutor::create(Arc::new(method));
        assert!(!executor.is_method_async());
        assert_eq!(executor.return_kind(), ReturnKind::Object);
        assert_eq!(executor.declared_result_type(), "i64");

        let output = executor
            .execute(&controller(), MethodArguments::new(vec![serde_json::json!(5)]))
            .unwrap();
        match output {
            MethodOutput::Object(value) => assert_eq!(value, serde_json::json!(15)),
            _ => panic!("expected an object output"),
        }
    }

    #[tokio::test]
    async fn test_async_method_executes() {
        let method = ActionMethod::new_async(
            "double",
            |c: Arc<Calculator>, _args: MethodArguments| async move {
                serde_json::json!(c.offset * 2)
            },
        );

        let executor = ObjectMethodExecutor::create(Arc::new(method));
        assert!(executor.is_method_async());
        assert!(executor.method_return_type().starts_with("impl Future"));

        let output = executor
            .execute_async(controller(), MethodArguments::default())
            .await
            .unwrap();
        assert!(matches!(output, MethodOutput::Object(v) if v == serde_json::json!(20)));

        assert!(executor
            .execute(&controller(), MethodArguments::default())
            .is_err());
    }

    #[test]
    fn test_wrong_controller_type_is_rejected() {
        let method = ActionMethod::new("noop", |_c: &Calculator, _args: MethodArguments| ());
        let executor = ObjectMethodExecutor::create(Arc::new(method));

        let other: ControllerInstance = Arc::new(String::from("not a calculator"));
        let err = executor
            .execute(&other, MethodArguments::default())
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidOperation(_)));
    }

    #[test]
    fn test_prepare_arguments_uses_defaults() {
        let method = ActionMethod::new("page", |_c: &Calculator, _args: MethodArguments| ())
            .parameter::<String>("filter")
            .parameter_with_default("page", 1u32);
        let executor = ObjectMethodExecutor::create(Arc::new(method));

        let mut bound = HashMap::new();
        bound.insert("filter".to_string(), serde_json::json!("open"));

        let arguments = executor.prepare_arguments(&bound);
        assert_eq!(arguments.len(), 2);
        assert_eq!(arguments.get::<String>(0).unwrap(), "open");
        assert_eq!(arguments.get::<u32>(1).unwrap(), 1);

        let empty = executor.prepare_arguments(&HashMap::new());
        assert_eq!(empty.value(0), Some(&Value::Null));
        assert!(executor.get_default_value_for_parameter(2).is_err());
    }

    #[test]
    fn test_argument_conversion_errors() {
        let arguments = MethodArguments::new(vec![serde_json::json!("abc")]);
        assert!(matches!(arguments.get::<u32>(0), Err(Error::Argument(_))));
        assert!(matches!(arguments.get::<u32>(3), Err(Error::Argument(_))));
    }

    #[test]
    fn test_executor_cache_is_keyed_by_method() {
        let cache = ObjectMethodExecutorCache::new();
        let first = Arc::new(ActionMethod::new("a", |_c: &Calculator, _args: MethodArguments| ()));
        let second = Arc::new(ActionMethod::new("b", |_c: &Calculator, _args: MethodArguments| ()));

        let a1 = cache.get_or_create(&first);
        let a2 = cache.get_or_create(&first);
        let b = cache.get_or_create(&second);

        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b));
        assert_eq!(cache.len(), 2);
        assert_ne!(first.id(), second.id());
    }
}
