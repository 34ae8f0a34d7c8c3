//! Integration tests for method executors and the executor table.

use girder_core::*;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

struct Catalog {
    currency: &'static str,
}

#[derive(Serialize)]
struct Price {
    amount: i64,
    currency: &'static str,
}

fn catalog() -> ControllerInstance {
    Arc::new(Catalog { currency: "EUR" })
}

fn executor(method: ActionMethod) -> Arc<ObjectMethodExecutor> {
    ObjectMethodExecutorCache::new().get_or_create(&Arc::new(method))
}

#[tokio::test]
async fn test_object_return_keeps_declared_type() {
    let method = ActionMethod::new("price", |c: &Catalog, args| -> Result<Json<Price>, Error> {
        Ok(Json(Price {
            amount: args.get(0)?,
            currency: c.currency,
        }))
    })
    .parameter::<i64>("amount");
    let executor = executor(method);
    let strategy = get_executor(&executor).unwrap();

    let mut bound = HashMap::new();
    bound.insert("amount".to_string(), serde_json::json!(12));
    let arguments = executor.prepare_arguments(&bound);

    let result = strategy
        .execute(&DefaultActionResultTypeMapper, &executor, catalog(), arguments)
        .await
        .unwrap();

    assert_eq!(strategy.name(), "SyncObjectResultExecutor");
    assert_eq!(result.name(), "ObjectResult");
    assert!(executor.declared_result_type().ends_with("Price"));
}

#[tokio::test]
async fn test_async_void_becomes_empty_result() {
    let method = ActionMethod::new_async("touch", |_: Arc<Catalog>, _| async {});
    let executor = executor(method);
    let strategy = get_executor(&executor).unwrap();

    let result = strategy
        .execute(
            &DefaultActionResultTypeMapper,
            &executor,
            catalog(),
            MethodArguments::default(),
        )
        .await
        .unwrap();

    assert_eq!(strategy.name(), "TaskResultExecutor");
    assert_eq!(result.name(), "EmptyResult");
}

#[tokio::test]
async fn test_defaults_fill_missing_arguments() {
    let method = ActionMethod::new("page", |_: &Catalog, args| -> Result<serde_json::Value, Error> {
        let page: u32 = args.get(0)?;
        Ok(serde_json::json!({ "page": page }))
    })
    .parameter_with_default("page", 1u32);
    let executor = executor(method);

    let arguments = executor.prepare_arguments(&HashMap::new());
    assert_eq!(arguments.value(0), Some(&serde_json::json!(1)));
    assert_eq!(executor.get_default_value_for_parameter(0).unwrap(), &serde_json::json!(1));
    assert!(executor.get_default_value_for_parameter(1).is_err());
}

#[test]
fn test_same_method_shares_an_executor() {
    let cache = ObjectMethodExecutorCache::new();
    let method = Arc::new(ActionMethod::new("noop", |_: &Catalog, _| ()));

    let first = cache.get_or_create(&method);
    let second = cache.get_or_create(&method);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cache.len(), 1);
}
