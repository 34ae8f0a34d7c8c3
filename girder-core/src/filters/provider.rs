// Filter providers turn filter descriptors into filter instances

use super::{FilterDescriptor, FilterRef};
use crate::action_context::ActionContext;
use crate::error::Error;
use std::sync::Arc;

/// A descriptor and the instance resolved for it.
#[derive(Clone)]
pub struct FilterItem {
    pub descriptor: FilterDescriptor,
    /// Filled in by a provider; unresolved items are dropped
    pub filter: Option<FilterRef>,
    /// Whether `filter` may be kept across requests
    pub is_reusable: bool,
}

impl FilterItem {
    pub fn new(descriptor: FilterDescriptor) -> Self {
        Self {
            descriptor,
            filter: None,
            is_reusable: false,
        }
    }

    pub fn with_filter(descriptor: FilterDescriptor, filter: FilterRef) -> Self {
        Self {
            descriptor,
            filter: Some(filter),
            is_reusable: false,
        }
    }
}

impl std::fmt::Debug for FilterItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterItem")
            .field("descriptor", &self.descriptor)
            .field("resolved", &self.filter.is_some())
            .field("is_reusable", &self.is_reusable)
            .finish()
    }
}

pub struct FilterProviderContext<'a> {
    pub action_context: &'a ActionContext,
    pub results: Vec<FilterItem>,
}

impl<'a> FilterProviderContext<'a> {
    pub fn new(action_context: &'a ActionContext, results: Vec<FilterItem>) -> Self {
        Self {
            action_context,
            results,
        }
    }
}

/// Resolves filter items.
///
/// Providers run `on_providers_executing` in ascending order and
/// `on_providers_executed` in descending order.
pub trait FilterProvider: Send + Sync {
    fn order(&self) -> i32;

    fn on_providers_executing(&self, context: &mut FilterProviderContext<'_>) -> Result<(), Error>;

    fn on_providers_executed(&self, _context: &mut FilterProviderContext<'_>) -> Result<(), Error> {
        Ok(())
    }
}

/// Uses each registered filter as-is, or asks it for an instance when it is
/// a [`FilterFactory`](super::FilterFactory).
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultFilterProvider;

impl DefaultFilterProvider {
    pub fn new() -> Self {
        Self
    }

    fn provide_filter(&self, context: &ActionContext, item: &mut FilterItem) -> Result<(), Error> {
        if item.filter.is_some() {
            return Ok(());
        }

        let filter = &item.descriptor.filter;
        match filter.as_filter_factory() {
            Some(factory) => {
                item.filter = Some(factory.create_instance(context)?);
                item.is_reusable = factory.is_reusable();
            }
            None => {
                item.filter = Some(Arc::clone(filter));
                item.is_reusable = true;
            }
        }
        Ok(())
    }
}

impl FilterProvider for DefaultFilterProvider {
    fn order(&self) -> i32 {
        -1000
    }

    fn on_providers_executing(&self, context: &mut FilterProviderContext<'_>) -> Result<(), Error> {
        let action_context = context.action_context;
        for item in context.results.iter_mut() {
            self.provide_filter(action_context, item)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action_descriptor::ActionDescriptor;
    use crate::filters::{FilterFactory, FilterMetadata, FilterScope};
    use crate::http::{HttpContext, HttpRequest};
    use crate::route::RouteData;

    struct Plain;

    impl FilterMetadata for Plain {}

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

        fn create_instance(&self, _context: &ActionContext) -> Result<FilterRef, Error> {
            Ok(Arc::new(Plain))
        }
    }

    fn action_context() -> ActionContext {
        ActionContext::new(
            Arc::new(HttpContext::new(HttpRequest::new("GET", "/"))),
            RouteData::default(),
            Arc::new(ActionDescriptor::test_descriptor("Home", "Index")),
        )
    }

    #[test]
    fn test_default_provider_resolves_instances_and_factories() {
        let plain: FilterRef = Arc::new(Plain);
        let factory: FilterRef = Arc::new(PerRequest);
        let context = action_context();
        let mut provider_context = FilterProviderContext::new(
            &context,
            vec![
                FilterItem::new(FilterDescriptor::new(Arc::clone(&plain), FilterScope::Global)),
                FilterItem::new(FilterDescriptor::new(Arc::clone(&factory), FilterScope::Action)),
            ],
        );

        DefaultFilterProvider
            .on_providers_executing(&mut provider_context)
            .unwrap();

        let items = provider_context.results;
        assert!(Arc::ptr_eq(items[0].filter.as_ref().unwrap(), &plain));
        assert!(items[0].is_reusable);
        assert!(!Arc::ptr_eq(items[1].filter.as_ref().unwrap(), &factory));
        assert!(!items[1].is_reusable);
    }

    #[test]
    fn test_default_provider_keeps_resolved_items() {
        let existing: FilterRef = Arc::new(Plain);
        let context = action_context();
        let mut provider_context = FilterProviderContext::new(
            &context,
            vec![FilterItem::with_filter(
                FilterDescriptor::new(Arc::new(PerRequest), FilterScope::Action),
                Arc::clone(&existing),
            )],
        );

        DefaultFilterProvider
            .on_providers_executing(&mut provider_context)
            .unwrap();

        assert!(Arc::ptr_eq(
            provider_context.results[0].filter.as_ref().unwrap(),
            &existing
        ));
    }
}
