// Per-action invoker state, rebuilt whenever the action collection changes

use crate::action_context::ControllerContext;
use crate::action_descriptor::ActionDescriptorCollectionProvider;
use crate::action_method_executor::{ActionMethodExecutor, get_executor};
use crate::binding::ArgumentBinder;
use crate::controller::{ControllerBinderDelegateProvider, ControllerFactory};
use crate::error::Error;
use crate::filters::{
    CachedFilters, DefaultFilterProvider, FilterDescriptor, FilterFactoryResult, FilterProvider,
    FilterRef, create_uncached_filters, get_all_filters, sort_filter_descriptors,
};
use crate::method_executor::{ObjectMethodExecutor, ObjectMethodExecutorCache};
use arc_swap::ArcSwap;
use dashmap::DashMap;
use std::sync::Arc;

/// Everything about one action that outlives a single request.
pub struct ControllerActionInvokerCacheEntry {
    pub cached_filters: CachedFilters,
    pub controller_factory: Arc<dyn ControllerFactory>,
    /// `None` when the action has nothing to bind
    pub binder: Option<Arc<dyn ArgumentBinder>>,
    pub executor: Arc<ObjectMethodExecutor>,
    pub strategy: &'static dyn ActionMethodExecutor,
}

impl std::fmt::Debug for ControllerActionInvokerCacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerActionInvokerCacheEntry")
            .field("cached_filters", &self.cached_filters)
            .field("has_binder", &self.binder.is_some())
            .field("method", &self.executor.method().name())
            .field("strategy", &self.strategy)
            .finish()
    }
}

struct InnerCache {
    version: u64,
    entries: DashMap<String, Arc<ControllerActionInvokerCacheEntry>>,
}

impl InnerCache {
    fn new(version: u64) -> Self {
        Self {
            version,
            entries: DashMap::new(),
        }
    }
}

/// Resolves filters and method executors per action, sharing whatever can be
/// shared between requests.
///
/// A new collection version drops every entry. Method executors survive,
/// since they only depend on the method itself.
pub struct ControllerActionInvokerCache {
    collection_provider: Arc<ActionDescriptorCollectionProvider>,
    filter_providers: Vec<Arc<dyn FilterProvider>>,
    global_filters: Vec<FilterDescriptor>,
    binder_provider: ControllerBinderDelegateProvider,
    controller_factory: Option<Arc<dyn ControllerFactory>>,
    executors: ObjectMethodExecutorCache,
    current: ArcSwap<InnerCache>,
}

impl ControllerActionInvokerCache {
    pub fn new(collection_provider: Arc<ActionDescriptorCollectionProvider>) -> Self {
        let version = collection_provider.collection().version;
        Self {
            collection_provider,
            filter_providers: vec![Arc::new(DefaultFilterProvider)],
            global_filters: Vec::new(),
            binder_provider: ControllerBinderDelegateProvider::default(),
            controller_factory: None,
            executors: ObjectMethodExecutorCache::new(),
            current: ArcSwap::from_pointee(InnerCache::new(version)),
        }
    }

    /// Filters applied to every action, ahead of its own in sort order ties
    pub fn with_global_filters(mut self, filters: Vec<FilterDescriptor>) -> Self {
        self.global_filters = filters;
        self
    }

    pub fn with_filter_providers(mut self, mut providers: Vec<Arc<dyn FilterProvider>>) -> Self {
        providers.sort_by_key(|p| p.order());
        self.filter_providers = providers;
        self
    }

    pub fn with_binder_provider(mut self, provider: ControllerBinderDelegateProvider) -> Self {
        self.binder_provider = provider;
        self
    }

    /// Factory for actions that do not bring their own
    pub fn with_controller_factory(mut self, factory: Arc<dyn ControllerFactory>) -> Self {
        self.controller_factory = Some(factory);
        self
    }

    pub fn collection_provider(&self) -> &Arc<ActionDescriptorCollectionProvider> {
        &self.collection_provider
    }

    fn current_cache(&self) -> Arc<InnerCache> {
        let version = self.collection_provider.collection().version;
        let cache = self.current.load_full();
        if cache.version == version {
            return cache;
        }

        let fresh = Arc::new(InnerCache::new(version));
        let previous = self.current.compare_and_swap(&cache, Arc::clone(&fresh));
        if Arc::ptr_eq(&*previous, &cache) {
            tracing::debug!(version, "Rebuilt controller action invoker cache");
            return fresh;
        }

        let winner = self.current.load_full();
        if winner.version == version {
            winner
        } else {
            fresh
        }
    }

    /// The cache entry of the context's action and the filters for this
    /// request, in execution order.
    ///
    /// When every filter is reusable the same filter list is returned for
    /// every request until the collection changes.
    pub fn get_state(
        &self,
        controller_context: &ControllerContext,
    ) -> Result<(Arc<ControllerActionInvokerCacheEntry>, Arc<[FilterRef]>), Error> {
        let cache = self.current_cache();
        let action_context = &controller_context.action_context;
        let action = &action_context.action_descriptor;

        let cached = cache.entries.get(&action.id).map(|entry| Arc::clone(entry.value()));
        if let Some(entry) = cached {
            let filters =
                create_uncached_filters(&self.filter_providers, action_context, &entry.cached_filters)?;
            return Ok((entry, filters));
        }

        let mut descriptors: Vec<FilterDescriptor> = self
            .global_filters
            .iter()
            .chain(&action.filter_descriptors)
            .cloned()
            .collect();
        sort_filter_descriptors(&mut descriptors);
        let FilterFactoryResult { cache: cached_filters, filters } =
            get_all_filters(&self.filter_providers, action_context, &descriptors)?;

        let executor = self.executors.get_or_create(&action.method);
        let strategy = get_executor(&executor)?;

        let controller_factory = action
            .controller_factory
            .clone()
            .or_else(|| self.controller_factory.clone())
            .ok_or_else(|| {
                Error::InvalidOperation(format!(
                    "No controller factory is registered for action '{}'.",
                    action.display_name
                ))
            })?;

        let entry = Arc::new(ControllerActionInvokerCacheEntry {
            cached_filters,
            controller_factory,
            binder: self.binder_provider.create_binder_delegate(action),
            executor,
            strategy,
        });

        // Racing callers may both get here; the first insert wins
        let winner = Arc::clone(
            cache
                .entries
                .entry(action.id.clone())
                .or_insert(entry)
                .value(),
        );
        let filters = match &winner.cached_filters {
            CachedFilters::Resolved(shared) => Arc::clone(shared),
            CachedFilters::Items(_) => filters,
        };
        Ok((winner, filters))
    }

    /// Entries in the current generation
    pub fn len(&self) -> usize {
        self.current_cache().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action_context::ActionContext;
    use crate::action_descriptor::ActionDescriptor;
    use crate::binding::ValueProviderFactories;
    use crate::controller::FnControllerFactory;
    use crate::filters::{FilterFactory, FilterMetadata, FilterScope};
    use crate::http::{HttpContext, HttpRequest};
    use crate::method_executor::{ActionMethod, ControllerInstance};
    use crate::route::RouteData;

    #[derive(Default)]
    struct Home;

    struct Shared(&'static str);

    impl FilterMetadata for Shared {
        fn name(&self) -> &str {
            self.0
        }
    }

    struct PerRequest;

    impl FilterMetadata for PerRequest {
        fn as_filter_factory(&self) -> Option<&dyn FilterFactory> {
            Some(self)
        }
    }

    impl FilterFactory for PerRequest {
        fn is_reusable(&self) -> bool {
            false
        }

        fn create_instance(&self, _: &ActionContext) -> Result<FilterRef, Error> {
            Ok(Arc::new(Shared("created")))
        }
    }

    fn index() -> crate::action_descriptor::ActionDescriptorBuilder {
        ActionDescriptor::builder("Home", "Index", ActionMethod::new("index", |_: &Home, _| ()))
            .id("home.index")
            .controller_factory(Arc::new(FnControllerFactory::of_default::<Home>()))
    }

    fn context(provider: &ActionDescriptorCollectionProvider) -> ControllerContext {
        let collection = provider.collection();
        let action = collection.find("home.index").cloned().unwrap();
        ControllerContext::new(
            ActionContext::new(
                Arc::new(HttpContext::new(HttpRequest::new("GET", "/"))),
                RouteData::default(),
                action,
            ),
            ValueProviderFactories::default_factories(),
        )
    }

    #[test]
    fn test_reusable_filters_are_shared_until_version_changes() {
        let provider = Arc::new(
            ActionDescriptorCollectionProvider::with_actions(vec![
                index().filter(Arc::new(Shared("a"))).build(),
            ])
            .unwrap(),
        );
        let cache = ControllerActionInvokerCache::new(Arc::clone(&provider));

        let (first_entry, first) = cache.get_state(&context(&provider)).unwrap();
        let (second_entry, second) = cache.get_state(&context(&provider)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first_entry, &second_entry));
        assert_eq!(cache.len(), 1);

        provider
            .update(vec![index().filter(Arc::new(Shared("a"))).build()])
            .unwrap();
        let (third_entry, third) = cache.get_state(&context(&provider)).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert!(!Arc::ptr_eq(&first_entry, &third_entry));
        // The executor only depends on the method
        assert!(Arc::ptr_eq(&first_entry.executor, &third_entry.executor));
    }

    #[test]
    fn test_non_reusable_filters_are_created_per_request() {
        let provider = Arc::new(
            ActionDescriptorCollectionProvider::with_actions(vec![
                index()
                    .filter(Arc::new(Shared("shared")))
                    .filter(Arc::new(PerRequest))
                    .build(),
            ])
            .unwrap(),
        );
        let cache = ControllerActionInvokerCache::new(Arc::clone(&provider));

        let (_, first) = cache.get_state(&context(&provider)).unwrap();
        let (_, second) = cache.get_state(&context(&provider)).unwrap();

        assert_eq!(first.len(), 2);
        assert!(Arc::ptr_eq(&first[0], &second[0]));
        assert!(!Arc::ptr_eq(&first[1], &second[1]));
        assert_eq!(second[1].name(), "created");
    }

    #[test]
    fn test_global_filters_sort_with_action_filters() {
        let provider = Arc::new(
            ActionDescriptorCollectionProvider::with_actions(vec![
                index()
                    .filter(Arc::new(Shared("action")))
                    .filter_descriptor(
                        FilterDescriptor::new(Arc::new(Shared("early")), FilterScope::Action)
                            .with_order(-1),
                    )
                    .build(),
            ])
            .unwrap(),
        );
        let cache = ControllerActionInvokerCache::new(Arc::clone(&provider)).with_global_filters(
            vec![FilterDescriptor::new(Arc::new(Shared("global")), FilterScope::Global)],
        );

        let (_, filters) = cache.get_state(&context(&provider)).unwrap();
        let names: Vec<&str> = filters.iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["early", "global", "action"]);
    }

    #[test]
    fn test_binder_only_for_actions_with_parameters() {
        let provider = Arc::new(
            ActionDescriptorCollectionProvider::with_actions(vec![index().build()]).unwrap(),
        );
        let cache = ControllerActionInvokerCache::new(Arc::clone(&provider));
        let (entry, _) = cache.get_state(&context(&provider)).unwrap();
        assert!(entry.binder.is_none());
        assert_eq!(entry.strategy.name(), "VoidResultExecutor");
    }

    #[test]
    fn test_missing_controller_factory() {
        let action =
            ActionDescriptor::builder("Home", "Index", ActionMethod::new("index", |_: &Home, _| ()))
                .id("home.index")
                .build();
        let provider =
            Arc::new(ActionDescriptorCollectionProvider::with_actions(vec![action]).unwrap());

        let cache = ControllerActionInvokerCache::new(Arc::clone(&provider));
        assert!(matches!(
            cache.get_state(&context(&provider)),
            Err(Error::InvalidOperation(_))
        ));

        let cache = ControllerActionInvokerCache::new(Arc::clone(&provider)).with_controller_factory(
            Arc::new(FnControllerFactory::new(|_| Ok(Arc::new(Home) as ControllerInstance))),
        );
        assert!(cache.get_state(&context(&provider)).is_ok());
    }
}
