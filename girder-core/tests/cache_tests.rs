//! Integration tests for the version-stamped caches.

use girder_core::*;
use std::sync::Arc;

#[derive(Default)]
struct Orders;

struct Audit;

impl FilterMetadata for Audit {}

struct Tenant;

impl ActionConstraint for Tenant {
    fn order(&self) -> i32 {
        0
    }

    fn accept(&self, _context: &ActionConstraintContext<'_>) -> bool {
        true
    }
}

impl ActionConstraintMetadata for Tenant {
    fn as_constraint(self: Arc<Self>) -> Option<ActionConstraintRef> {
        Some(self)
    }
}

fn list(id: &str) -> ActionDescriptor {
    ActionDescriptor::builder("Orders", "List", ActionMethod::new("list", |_: &Orders, _| ()))
        .id(id)
        .filter(Arc::new(Audit))
        .constraint(Arc::new(HttpMethodActionConstraint::new(["GET"])))
        .controller_factory(Arc::new(FnControllerFactory::of_default::<Orders>()))
        .build()
}

fn controller_context(provider: &ActionDescriptorCollectionProvider, id: &str) -> ControllerContext {
    let action = provider.collection().find(id).cloned().unwrap();
    ControllerContext::new(
        ActionContext::new(
            Arc::new(HttpContext::new(HttpRequest::new("GET", "/orders"))),
            RouteData::default(),
            action,
        ),
        ValueProviderFactories::default(),
    )
}

// =============================================================================
// Invoker cache
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_lookups_share_one_filter_list() {
    let provider = Arc::new(ActionDescriptorCollectionProvider::with_actions(vec![list("orders.list")]).unwrap());
    let cache = Arc::new(ControllerActionInvokerCache::new(Arc::clone(&provider)));

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let cache = Arc::clone(&cache);
        let provider = Arc::clone(&provider);
        tasks.push(tokio::spawn(async move {
            let (_, filters) = cache
                .get_state(&controller_context(&provider, "orders.list"))
                .unwrap();
            filters
        }));
    }

    let mut lists = Vec::new();
    for task in tasks {
        lists.push(task.await.unwrap());
    }

    let first = &lists[0];
    assert!(lists.iter().all(|filters| Arc::ptr_eq(filters, first)));
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_new_version_drops_old_entries() {
    let provider = Arc::new(ActionDescriptorCollectionProvider::with_actions(vec![list("orders.list")]).unwrap());
    let cache = ControllerActionInvokerCache::new(Arc::clone(&provider));

    let (before, _) = cache.get_state(&controller_context(&provider, "orders.list")).unwrap();
    assert_eq!(cache.len(), 1);

    provider.update(vec![list("orders.list"), list("orders.all")]).unwrap();
    assert_eq!(cache.len(), 0);

    let (after, _) = cache.get_state(&controller_context(&provider, "orders.list")).unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
}

// =============================================================================
// Constraint cache
// =============================================================================

#[test]
fn test_constraints_are_reference_stable_per_version() {
    let provider = Arc::new(ActionDescriptorCollectionProvider::with_actions(vec![list("orders.list")]).unwrap());
    let cache = ActionConstraintCache::new(Arc::clone(&provider));
    let http_context = HttpContext::new(HttpRequest::new("GET", "/orders"));

    let action = provider.collection().find("orders.list").cloned().unwrap();
    let first = cache.get_action_constraints(&http_context, &action).unwrap().unwrap();
    let second = cache.get_action_constraints(&http_context, &action).unwrap().unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    provider.update(vec![list("orders.list")]).unwrap();
    let action = provider.collection().find("orders.list").cloned().unwrap();
    let third = cache.get_action_constraints(&http_context, &action).unwrap().unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
}

#[test]
fn test_only_custom_constraints_count() {
    let provider = Arc::new(ActionDescriptorCollectionProvider::with_actions(vec![list("orders.list")]).unwrap());
    let cache = ActionConstraintCache::new(Arc::clone(&provider));
    assert!(!cache.has_action_constraints());

    let tenant_scoped = ActionDescriptor::builder(
        "Orders",
        "Export",
        ActionMethod::new("export", |_: &Orders, _| ()),
    )
    .constraint(Arc::new(Tenant))
    .build();
    provider.update(vec![list("orders.list"), tenant_scoped]).unwrap();

    assert!(cache.has_action_constraints());
}
