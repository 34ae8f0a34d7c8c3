// Per-action constraint cache, rebuilt whenever the action collection changes

use super::{
    ActionConstraintItem, ActionConstraintProvider, ActionConstraintProviderContext,
    ActionConstraintRef, DefaultActionConstraintProvider,
};
use crate::action_descriptor::{
    ActionDescriptor, ActionDescriptorCollection, ActionDescriptorCollectionProvider,
};
use crate::error::Error;
use crate::http::HttpContext;
use arc_swap::ArcSwap;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

const UNKNOWN: u8 = 0;
const ABSENT: u8 = 1;
const PRESENT: u8 = 2;

#[derive(Clone)]
enum CacheEntry {
    /// Every constraint was reusable
    Resolved(Option<Arc<[ActionConstraintRef]>>),
    /// Non-reusable constraints are recreated per request
    Items(Arc<[ActionConstraintItem]>),
}

/// One generation of the cache, tied to a collection version.
struct InnerCache {
    collection: Arc<ActionDescriptorCollection>,
    entries: DashMap<String, CacheEntry>,
    has_constraints: AtomicU8,
}

impl InnerCache {
    fn new(collection: Arc<ActionDescriptorCollection>) -> Self {
        Self {
            collection,
            entries: DashMap::new(),
            has_constraints: AtomicU8::new(UNKNOWN),
        }
    }

    fn version(&self) -> u64 {
        self.collection.version
    }
}

/// Resolves and caches the constraints of each action.
pub struct ActionConstraintCache {
    collection_provider: Arc<ActionDescriptorCollectionProvider>,
    providers: Vec<Arc<dyn ActionConstraintProvider>>,
    current: ArcSwap<InnerCache>,
}

impl ActionConstraintCache {
    /// Cache using only the default provider
    pub fn new(collection_provider: Arc<ActionDescriptorCollectionProvider>) -> Self {
        Self::with_providers(collection_provider, vec![Arc::new(DefaultActionConstraintProvider)])
    }

    pub fn with_providers(
        collection_provider: Arc<ActionDescriptorCollectionProvider>,
        mut providers: Vec<Arc<dyn ActionConstraintProvider>>,
    ) -> Self {
        providers.sort_by_key(|p| p.order());
        let current = ArcSwap::from_pointee(InnerCache::new(collection_provider.collection()));
        Self {
            collection_provider,
            providers,
            current,
        }
    }

    /// Generation matching the current collection, replacing a stale one.
    fn current_cache(&self) -> Arc<InnerCache> {
        let collection = self.collection_provider.collection();
        let cache = self.current.load_full();
        if cache.version() == collection.version {
            return cache;
        }

        let version = collection.version;
        let fresh = Arc::new(InnerCache::new(collection));
        let previous = self.current.compare_and_swap(&cache, Arc::clone(&fresh));
        if Arc::ptr_eq(&*previous, &cache) {
            tracing::debug!(version, "Rebuilt action constraint cache");
            return fresh;
        }

        // Another caller replaced it first
        let winner = self.current.load_full();
        if winner.version() == version {
            winner
        } else {
            fresh
        }
    }

    /// Whether any action carries a constraint routing does not already
    /// enforce. Hosts can skip constraint evaluation when this is false.
    pub fn has_action_constraints(&self) -> bool {
        let cache = self.current_cache();
        match cache.has_constraints.load(Ordering::Acquire) {
            PRESENT => true,
            ABSENT => false,
            _ => {
                let present = cache.collection.items.iter().any(|action| {
                    action
                        .action_constraints
                        .iter()
                        .any(|metadata| !metadata.is_routing_subsumed())
                });
                cache
                    .has_constraints
                    .store(if present { PRESENT } else { ABSENT }, Ordering::Release);
                present
            }
        }
    }

    /// Constraints of `action` in registration order, or `None` when it has
    /// none.
    pub fn get_action_constraints(
        &self,
        http_context: &HttpContext,
        action: &ActionDescriptor,
    ) -> Result<Option<Arc<[ActionConstraintRef]>>, Error> {
        let cache = self.current_cache();

        if action.action_constraints.is_empty() {
            return Ok(None);
        }

        let cached = cache.entries.get(&action.id).map(|entry| entry.value().clone());
        if let Some(entry) = cached {
            return match entry {
                CacheEntry::Resolved(constraints) => Ok(constraints),
                CacheEntry::Items(items) => {
                    let items = self.execute_providers(http_context, action, items.to_vec())?;
                    Ok(extract_constraints(&items))
                }
            };
        }

        let items = action
            .action_constraints
            .iter()
            .cloned()
            .map(ActionConstraintItem::new)
            .collect();
        let items = self.execute_providers(http_context, action, items)?;
        let constraints = extract_constraints(&items);

        let entry = if items.iter().all(|item| item.is_reusable) {
            CacheEntry::Resolved(constraints.clone())
        } else {
            let template: Vec<ActionConstraintItem> = items
                .into_iter()
                .map(|mut item| {
                    if !item.is_reusable {
                        item.constraint = None;
                    }
                    item
                })
                .collect();
            CacheEntry::Items(template.into())
        };

        // Racing callers may both get here; the first insert wins
        let winner = cache
            .entries
            .entry(action.id.clone())
            .or_insert(entry)
            .value()
            .clone();
        match winner {
            CacheEntry::Resolved(resolved) => Ok(resolved),
            CacheEntry::Items(_) => Ok(constraints),
        }
    }

    fn execute_providers(
        &self,
        http_context: &HttpContext,
        action: &ActionDescriptor,
        items: Vec<ActionConstraintItem>,
    ) -> Result<Vec<ActionConstraintItem>, Error> {
        let mut context = ActionConstraintProviderContext {
            http_context,
            action,
            results: items,
        };

        for provider in &self.providers {
            provider.on_providers_executing(&mut context)?;
        }
        for provider in self.providers.iter().rev() {
            provider.on_providers_executed(&mut context)?;
        }

        Ok(context.results)
    }
}

fn extract_constraints(items: &[ActionConstraintItem]) -> Option<Arc<[ActionConstraintRef]>> {
    let constraints: Vec<ActionConstraintRef> = items
        .iter()
        .filter_map(|item| item.constraint.clone())
        .collect();
    if constraints.is_empty() {
        None
    } else {
        Some(constraints.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{
        ActionConstraint, ActionConstraintContext, ActionConstraintFactory,
        ActionConstraintMetadata, HttpMethodActionConstraint,
    };
    use crate::controller::FnControllerFactory;
    use crate::http::HttpRequest;
    use crate::method_executor::{ActionMethod, ControllerInstance};

    struct Custom;

    impl ActionConstraint for Custom {
        fn order(&self) -> i32 {
            0
        }

        fn accept(&self, _: &ActionConstraintContext<'_>) -> bool {
            true
        }
    }

    impl ActionConstraintMetadata for Custom {
        fn as_constraint(self: Arc<Self>) -> Option<ActionConstraintRef> {
            Some(self)
        }
    }

    struct PerRequest;

    impl ActionConstraintMetadata for PerRequest {
        fn as_factory(&self) -> Option<&dyn ActionConstraintFactory> {
            Some(self)
        }
    }

    impl ActionConstraintFactory for PerRequest {
        fn is_reusable(&self) -> bool {
            false
        }

        fn create_instance(&self, _: &HttpContext) -> Result<ActionConstraintRef, Error> {
            Ok(Arc::new(Custom))
        }
    }

    struct Home;

    fn action(name: &str) -> crate::action_descriptor::ActionDescriptorBuilder {
        ActionDescriptor::builder("Home", name, ActionMethod::new(name, |_: &Home, _| ()))
            .controller_factory(Arc::new(FnControllerFactory::new(|_| {
                Ok(Arc::new(Home) as ControllerInstance)
            })))
    }

    fn http_context() -> HttpContext {
        HttpContext::new(HttpRequest::new("GET", "/"))
    }

    #[test]
    fn test_reusable_constraints_are_reference_stable() {
        let provider = Arc::new(
            ActionDescriptorCollectionProvider::with_actions(vec![action("Index")
                .constraint(Arc::new(HttpMethodActionConstraint::new(["GET"])))
                .build()])
            .unwrap(),
        );
        let cache = ActionConstraintCache::new(Arc::clone(&provider));
        let descriptor = Arc::clone(&provider.collection().items[0]);

        let first = cache
            .get_action_constraints(&http_context(), &descriptor)
            .unwrap()
            .unwrap();
        let second = cache
            .get_action_constraints(&http_context(), &descriptor)
            .unwrap()
            .unwrap();

        assert_eq!(first.len(), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_version_change_rebuilds() {
        let provider = Arc::new(ActionDescriptorCollectionProvider::new());
        provider
            .update(vec![action("Index")
                .id("index")
                .constraint(Arc::new(Custom))
                .build()])
            .unwrap();
        let cache = ActionConstraintCache::new(Arc::clone(&provider));

        let before = cache
            .get_action_constraints(&http_context(), &provider.collection().items[0])
            .unwrap()
            .unwrap();

        provider
            .update(vec![action("Index")
                .id("index")
                .constraint(Arc::new(Custom))
                .build()])
            .unwrap();
        let after = cache
            .get_action_constraints(&http_context(), &provider.collection().items[0])
            .unwrap()
            .unwrap();

        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_non_reusable_constraints_are_recreated() {
        let shared: Arc<Custom> = Arc::new(Custom);
        let provider = Arc::new(
            ActionDescriptorCollectionProvider::with_actions(vec![action("Index")
                .constraint(shared.clone())
                .constraint(Arc::new(PerRequest))
                .build()])
            .unwrap(),
        );
        let cache = ActionConstraintCache::new(Arc::clone(&provider));
        let descriptor = Arc::clone(&provider.collection().items[0]);

        let first = cache
            .get_action_constraints(&http_context(), &descriptor)
            .unwrap()
            .unwrap();
        let second = cache
            .get_action_constraints(&http_context(), &descriptor)
            .unwrap()
            .unwrap();

        assert_eq!(first.len(), 2);
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first[0], &second[0]));
        assert!(!Arc::ptr_eq(&first[1], &second[1]));
    }

    #[test]
    fn test_actions_without_constraints() {
        let provider = Arc::new(
            ActionDescriptorCollectionProvider::with_actions(vec![action("Index")
                .constraint(Arc::new(HttpMethodActionConstraint::new(["GET"])))
                .build(), action("About").build()])
            .unwrap(),
        );
        let cache = ActionConstraintCache::new(Arc::clone(&provider));

        let about = Arc::clone(&provider.collection().items[1]);
        assert!(cache
            .get_action_constraints(&http_context(), &about)
            .unwrap()
            .is_none());
        // HTTP method constraints are enforced by routing already
        assert!(!cache.has_action_constraints());

        provider
            .update(vec![action("Index").constraint(Arc::new(Custom)).build()])
            .unwrap();
        assert!(cache.has_action_constraints());
    }
}
