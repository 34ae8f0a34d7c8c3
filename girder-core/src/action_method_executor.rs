//! Action method executors
//!
//! Each executor handles one return shape of an action method and turns the
//! value it produced into an [`ActionResult`](crate::action_result::ActionResult).
//! The executor for a method is picked once, when the invoker cache entry is
//! built, from a fixed ordered table.

use crate::action_result::{ActionResultRef, ActionResultTypeMapper, EmptyResult};
use crate::error::Error;
use crate::method_executor::{
    ControllerInstance, MethodArguments, MethodOutput, ObjectMethodExecutor, ReturnKind,
};
use futures_util::future::BoxFuture;

/// Strategy for invoking one shape of action method.
pub trait ActionMethodExecutor: Send + Sync {
    fn name(&self) -> &'static str;

    fn can_execute(&self, executor: &ObjectMethodExecutor) -> bool;

    fn execute<'a>(
        &'a self,
        mapper: &'a dyn ActionResultTypeMapper,
        executor: &'a ObjectMethodExecutor,
        controller: ControllerInstance,
        arguments: MethodArguments,
    ) -> BoxFuture<'a, Result<ActionResultRef, Error>>;
}

impl std::fmt::Debug for dyn ActionMethodExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

static EXECUTORS: [&dyn ActionMethodExecutor; 6] = [
    &VoidResultExecutor,
    &SyncActionResultExecutor,
    &SyncObjectResultExecutor,
    &TaskResultExecutor,
    &TaskOfActionResultExecutor,
    &AwaitableObjectResultExecutor,
];

/// The first executor in the table that can run `executor`'s method.
pub fn get_executor(
    executor: &ObjectMethodExecutor,
) -> Result<&'static dyn ActionMethodExecutor, Error> {
    EXECUTORS
        .iter()
        .copied()
        .find(|candidate| candidate.can_execute(executor))
        .ok_or_else(|| {
            Error::InvalidOperation(format!(
                "No action method executor can run a method returning '{}'.",
                executor.method_return_type()
            ))
        })
}

fn expects(executor: &ObjectMethodExecutor, is_async: bool, kind: ReturnKind) -> bool {
    executor.is_method_async() == is_async && executor.return_kind() == kind
}

fn unexpected_output(executor: &ObjectMethodExecutor) -> Error {
    Error::InvalidOperation(format!(
        "The method '{}' returned a value that does not match its declared return type '{}'.",
        executor.method().name(),
        executor.method_return_type()
    ))
}

fn void_result(executor: &ObjectMethodExecutor, output: MethodOutput) -> Result<ActionResultRef, Error> {
    match output {
        MethodOutput::Void => Ok(EmptyResult::shared()),
        _ => Err(unexpected_output(executor)),
    }
}

fn action_result(
    executor: &ObjectMethodExecutor,
    output: MethodOutput,
) -> Result<ActionResultRef, Error> {
    match output {
        MethodOutput::ActionResult(Some(result)) => Ok(result),
        MethodOutput::ActionResult(None) => Err(Error::InvalidOperation(format!(
            "Cannot return null from an action method with a return type of '{}'.",
            executor.method_return_type()
        ))),
        _ => Err(unexpected_output(executor)),
    }
}

fn object_result(
    mapper: &dyn ActionResultTypeMapper,
    executor: &ObjectMethodExecutor,
    output: MethodOutput,
) -> Result<ActionResultRef, Error> {
    match output {
        MethodOutput::Object(value) => Ok(mapper.convert(value, executor.declared_result_type())),
        _ => Err(unexpected_output(executor)),
    }
}

// void Method()
struct VoidResultExecutor;

impl ActionMethodExecutor for VoidResultExecutor {
    fn name(&self) -> &'static str {
        "VoidResultExecutor"
    }

    fn can_execute(&self, executor: &ObjectMethodExecutor) -> bool {
        expects(executor, false, ReturnKind::Void)
    }

    fn execute<'a>(
        &'a self,
        _mapper: &'a dyn ActionResultTypeMapper,
        executor: &'a ObjectMethodExecutor,
        controller: ControllerInstance,
        arguments: MethodArguments,
    ) -> BoxFuture<'a, Result<ActionResultRef, Error>> {
        Box::pin(async move {
            let output = executor.execute(&controller, arguments)?;
            void_result(executor, output)
        })
    }
}

// ActionResultRef Method()
struct SyncActionResultExecutor;

impl ActionMethodExecutor for SyncActionResultExecutor {
    fn name(&self) -> &'static str {
        "SyncActionResultExecutor"
    }

    fn can_execute(&self, executor: &ObjectMethodExecutor) -> bool {
        expects(executor, false, ReturnKind::ActionResult)
    }

    fn execute<'a>(
        &'a self,
        _mapper: &'a dyn ActionResultTypeMapper,
        executor: &'a ObjectMethodExecutor,
        controller: ControllerInstance,
        arguments: MethodArguments,
    ) -> BoxFuture<'a, Result<ActionResultRef, Error>> {
        Box::pin(async move {
            let output = executor.execute(&controller, arguments)?;
            action_result(executor, output)
        })
    }
}

// T Method()
struct SyncObjectResultExecutor;

impl ActionMethodExecutor for SyncObjectResultExecutor {
    fn name(&self) -> &'static str {
        "SyncObjectResultExecutor"
    }

    fn can_execute(&self, executor: &ObjectMethodExecutor) -> bool {
        expects(executor, false, ReturnKind::Object)
    }

    fn execute<'a>(
        &'a self,
        mapper: &'a dyn ActionResultTypeMapper,
        executor: &'a ObjectMethodExecutor,
        controller: ControllerInstance,
        arguments: MethodArguments,
    ) -> BoxFuture<'a, Result<ActionResultRef, Error>> {
        Box::pin(async move {
            let output = executor.execute(&controller, arguments)?;
            object_result(mapper, executor, output)
        })
    }
}

// async fn Method()
struct TaskResultExecutor;

impl ActionMethodExecutor for TaskResultExecutor {
    fn name(&self) -> &'static str {
        "TaskResultExecutor"
    }

    fn can_execute(&self, executor: &ObjectMethodExecutor) -> bool {
        expects(executor, true, ReturnKind::Void)
    }

    fn execute<'a>(
        &'a self,
        _mapper: &'a dyn ActionResultTypeMapper,
        executor: &'a ObjectMethodExecutor,
        controller: ControllerInstance,
        arguments: MethodArguments,
    ) -> BoxFuture<'a, Result<ActionResultRef, Error>> {
        Box::pin(async move {
            let output = executor.execute_async(controller, arguments).await?;
            void_result(executor, output)
        })
    }
}

// async fn Method() -> ActionResultRef
struct TaskOfActionResultExecutor;

impl ActionMethodExecutor for TaskOfActionResultExecutor {
    fn name(&self) -> &'static str {
        "TaskOfActionResultExecutor"
    }

    fn can_execute(&self, executor: &ObjectMethodExecutor) -> bool {
        expects(executor, true, ReturnKind::ActionResult)
    }

    fn execute<'a>(
        &'a self,
        _mapper: &'a dyn ActionResultTypeMapper,
        executor: &'a ObjectMethodExecutor,
        controller: ControllerInstance,
        arguments: MethodArguments,
    ) -> BoxFuture<'a, Result<ActionResultRef, Error>> {
        Box::pin(async move {
            let output = executor.execute_async(controller, arguments).await?;
            action_result(executor, output)
        })
    }
}

// async fn Method() -> T
struct AwaitableObjectResultExecutor;

impl ActionMethodExecutor for AwaitableObjectResultExecutor {
    fn name(&self) -> &'static str {
        "AwaitableObjectResultExecutor"
    }

    fn can_execute(&self, executor: &ObjectMethodExecutor) -> bool {
        expects(executor, true, ReturnKind::Object)
    }

    fn execute<'a>(
        &'a self,
        mapper: &'a dyn ActionResultTypeMapper,
        executor: &'a ObjectMethodExecutor,
        controller: ControllerInstance,
        arguments: MethodArguments,
    ) -> BoxFuture<'a, Result<ActionResultRef, Error>> {
        Box::pin(async move {
            let output = executor.execute_async(controller, arguments).await?;
            object_result(mapper, executor, output)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action_result::{DefaultActionResultTypeMapper, StatusCodeResult};
    use crate::http::Json;
    use crate::method_executor::ActionMethod;
    use std::sync::Arc;

    struct Widgets;

    fn controller() -> ControllerInstance {
        Arc::new(Widgets)
    }

    async fn run(method: ActionMethod) -> (&'static str, Result<ActionResultRef, Error>) {
        let executor = ObjectMethodExecutor::create(Arc::new(method));
        let strategy = get_executor(&executor).unwrap();
        let result = strategy
            .execute(
                &DefaultActionResultTypeMapper,
                &executor,
                controller(),
                MethodArguments::default(),
            )
            .await;
        (strategy.name(), result)
    }

    #[tokio::test]
    async fn test_sync_shapes() {
        let (name, result) = run(ActionMethod::new("void", |_: &Widgets, _| ())).await;
        assert_eq!(name, "VoidResultExecutor");
        assert_eq!(result.unwrap().name(), "EmptyResult");

        let (name, result) = run(ActionMethod::new("status", |_: &Widgets, _| {
            StatusCodeResult::shared(204)
        }))
        .await;
        assert_eq!(name, "SyncActionResultExecutor");
        assert_eq!(result.unwrap().name(), "StatusCodeResult");

        let (name, result) = run(ActionMethod::new("count", |_: &Widgets, _| Json(3))).await;
        assert_eq!(name, "SyncObjectResultExecutor");
        assert_eq!(result.unwrap().name(), "ObjectResult");
    }

    #[tokio::test]
    async fn test_async_shapes() {
        let (name, _) = run(ActionMethod::new_async(
            "void",
            |_: Arc<Widgets>, _| async {},
        ))
        .await;
        assert_eq!(name, "TaskResultExecutor");

        let (name, result) = run(ActionMethod::new_async(
            "status",
            |_: Arc<Widgets>, _| async { StatusCodeResult::shared(202) },
        ))
        .await;
        assert_eq!(name, "TaskOfActionResultExecutor");
        assert!(result.is_ok());

        let (name, result) = run(ActionMethod::new_async(
            "list",
            |_: Arc<Widgets>, _| async { Ok::<_, Error>(Json(vec![1, 2])) },
        ))
        .await;
        assert_eq!(name, "AwaitableObjectResultExecutor");
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_null_action_result_is_an_error() {
        let (_, result) = run(ActionMethod::new_async(
            "missing",
            |_: Arc<Widgets>, _| async { None::<ActionResultRef> },
        ))
        .await;

        match result {
            Err(Error::InvalidOperation(message)) => {
                assert!(message.starts_with("Cannot return null from an action method"));
                assert!(message.contains("ActionResult"));
            }
            _ => panic!("expected an invalid operation error"),
        }
    }

    #[tokio::test]
    async fn test_method_errors_pass_through() {
        let (_, result) = run(ActionMethod::new("fails", |_: &Widgets, _| {
            Err::<Json<u8>, _>(Error::NotFound("widget".into()))
        }))
        .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }
}
