// Builds the per-request filter list, caching what can be shared

use super::{FilterDescriptor, FilterItem, FilterProvider, FilterProviderContext, FilterRef};
use crate::action_context::ActionContext;
use crate::error::Error;
use std::sync::Arc;

/// Filters kept between requests for one action.
#[derive(Clone)]
pub enum CachedFilters {
    /// Every filter is reusable; this list is handed out as-is.
    Resolved(Arc<[FilterRef]>),
    /// Some filters must be created per request; their slots are empty.
    Items(Arc<[FilterItem]>),
}

impl CachedFilters {
    pub fn is_fully_resolved(&self) -> bool {
        matches!(self, CachedFilters::Resolved(_))
    }
}

impl std::fmt::Debug for CachedFilters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CachedFilters::Resolved(filters) => {
                f.debug_tuple("Resolved").field(&filters.len()).finish()
            }
            CachedFilters::Items(items) => f.debug_tuple("Items").field(items).finish(),
        }
    }
}

pub struct FilterFactoryResult {
    pub cache: CachedFilters,
    pub filters: Arc<[FilterRef]>,
}

/// Resolve `descriptors` for the first request of an action.
///
/// Providers must already be sorted by ascending order.
pub fn get_all_filters(
    providers: &[Arc<dyn FilterProvider>],
    action_context: &ActionContext,
    descriptors: &[FilterDescriptor],
) -> Result<FilterFactoryResult, Error> {
    let items: Vec<FilterItem> = descriptors.iter().cloned().map(FilterItem::new).collect();
    let items = create_filter_items(providers, action_context, items)?;

    if items.iter().all(|item| item.is_reusable) {
        let filters = extract_filters(&items);
        return Ok(FilterFactoryResult {
            cache: CachedFilters::Resolved(Arc::clone(&filters)),
            filters,
        });
    }

    let filters = extract_filters(&items);
    let cached: Vec<FilterItem> = items
        .into_iter()
        .map(|mut item| {
            if !item.is_reusable {
                item.filter = None;
            }
            item
        })
        .collect();

    Ok(FilterFactoryResult {
        cache: CachedFilters::Items(cached.into()),
        filters,
    })
}

/// Filters for a later request, recreating only what is not reusable.
pub fn create_uncached_filters(
    providers: &[Arc<dyn FilterProvider>],
    action_context: &ActionContext,
    cached: &CachedFilters,
) -> Result<Arc<[FilterRef]>, Error> {
    match cached {
        CachedFilters::Resolved(filters) => Ok(Arc::clone(filters)),
        CachedFilters::Items(items) => {
            let items = create_filter_items(providers, action_context, items.to_vec())?;
            Ok(extract_filters(&items))
        }
    }
}

fn create_filter_items(
    providers: &[Arc<dyn FilterProvider>],
    action_context: &ActionContext,
    items: Vec<FilterItem>,
) -> Result<Vec<FilterItem>, Error> {
    let mut context = FilterProviderContext::new(action_context, items);

    for provider in providers {
        provider.on_providers_executing(&mut context)?;
    }
    for provider in providers.iter().rev() {
        provider.on_providers_executed(&mut context)?;
    }

    Ok(context.results)
}

fn extract_filters(items: &[FilterItem]) -> Arc<[FilterRef]> {
    items
        .iter()
        .filter_map(|item| item.filter.as_ref().map(Arc::clone))
        .collect()
}
