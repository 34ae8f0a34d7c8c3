//! Filters
//!
//! A filter is any value implementing [`FilterMetadata`]. What it does in the
//! pipeline is decided by which capability accessors it overrides: a type
//! that returns `Some(self)` from `as_action_filter` runs in the action
//! phase, one that overrides several runs in several phases.
//!
//! ```ignore
//! struct Audit;
//!
//! impl FilterMetadata for Audit {
//!     fn as_action_filter(&self) -> Option<&dyn ActionFilter> {
//!         Some(self)
//!     }
//! }
//!
//! impl ActionFilter for Audit {
//!     fn on_action_executing(&self, context: &mut ActionExecutingContext) -> Result<(), Error> {
//!         tracing::info!(action = %context.action_context.action_descriptor.display_name);
//!         Ok(())
//!     }
//!
//!     fn on_action_executed(&self, _context: &mut ActionExecutedContext) -> Result<(), Error> {
//!         Ok(())
//!     }
//! }
//! ```

mod context;
mod cursor;
mod factory;
mod provider;

pub use context::*;
pub use cursor::*;
pub use factory::*;
pub use provider::*;

use crate::action_context::ActionContext;
use crate::error::Error;
use async_trait::async_trait;
use std::cmp::Ordering;
use std::sync::Arc;

/// Shared handle to a filter
pub type FilterRef = Arc<dyn FilterMetadata>;

/// Marker and capability surface of every filter.
pub trait FilterMetadata: Send + Sync + 'static {
    /// Name used in logs, diagnostics and execution plans
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Explicit order; `None` means 0
    fn order(&self) -> Option<i32> {
        None
    }

    fn as_filter_factory(&self) -> Option<&dyn FilterFactory> {
        None
    }

    fn as_authorization_filter(&self) -> Option<&dyn AuthorizationFilter> {
        None
    }

    fn as_async_authorization_filter(&self) -> Option<&dyn AsyncAuthorizationFilter> {
        None
    }

    fn as_resource_filter(&self) -> Option<&dyn ResourceFilter> {
        None
    }

    fn as_async_resource_filter(&self) -> Option<&dyn AsyncResourceFilter> {
        None
    }

    fn as_exception_filter(&self) -> Option<&dyn ExceptionFilter> {
        None
    }

    fn as_async_exception_filter(&self) -> Option<&dyn AsyncExceptionFilter> {
        None
    }

    fn as_action_filter(&self) -> Option<&dyn ActionFilter> {
        None
    }

    fn as_async_action_filter(&self) -> Option<&dyn AsyncActionFilter> {
        None
    }

    /// Always-run result filters are result filters too.
    fn as_result_filter(&self) -> Option<&dyn ResultFilter> {
        self.as_always_run_result_filter()
    }

    fn as_async_result_filter(&self) -> Option<&dyn AsyncResultFilter> {
        self.as_async_always_run_result_filter()
    }

    /// Result filter that also runs when authorization or a resource filter
    /// short-circuits, and after an exception filter handled an error
    fn as_always_run_result_filter(&self) -> Option<&dyn ResultFilter> {
        None
    }

    fn as_async_always_run_result_filter(&self) -> Option<&dyn AsyncResultFilter> {
        None
    }
}

/// Produces filter instances; registered in place of a filter.
pub trait FilterFactory: Send + Sync {
    /// Whether one instance may serve every request
    fn is_reusable(&self) -> bool;

    fn create_instance(&self, context: &ActionContext) -> Result<FilterRef, Error>;
}

// ============================================================================
// Phase traits
// ============================================================================

pub trait AuthorizationFilter: FilterMetadata {
    fn on_authorization(&self, context: &mut AuthorizationFilterContext) -> Result<(), Error>;
}

#[async_trait]
pub trait AsyncAuthorizationFilter: FilterMetadata {
    async fn on_authorization(&self, context: &mut AuthorizationFilterContext) -> Result<(), Error>;
}

pub trait ResourceFilter: FilterMetadata {
    fn on_resource_executing(&self, context: &mut ResourceExecutingContext) -> Result<(), Error>;

    fn on_resource_executed(&self, context: &mut ResourceExecutedContext) -> Result<(), Error>;
}

/// Wraps everything after it in one call.
///
/// Either call `next.invoke(context)` or set `context.result`, never both.
#[async_trait]
pub trait AsyncResourceFilter: FilterMetadata {
    async fn on_resource_execution(
        &self,
        context: &mut ResourceExecutingContext,
        next: ResourceExecutionDelegate<'_>,
    ) -> Result<(), Error>;
}

/// Observes errors from the action phase.
///
/// Called only while the error is unhandled; clearing `exception`, setting
/// `exception_handled` or setting `result` handles it.
pub trait ExceptionFilter: FilterMetadata {
    fn on_exception(&self, context: &mut ExceptionContext) -> Result<(), Error>;
}

#[async_trait]
pub trait AsyncExceptionFilter: FilterMetadata {
    async fn on_exception(&self, context: &mut ExceptionContext) -> Result<(), Error>;
}

pub trait ActionFilter: FilterMetadata {
    fn on_action_executing(&self, context: &mut ActionExecutingContext) -> Result<(), Error>;

    fn on_action_executed(&self, context: &mut ActionExecutedContext) -> Result<(), Error>;
}

/// Either call `next.invoke(context)` or set `context.result`, never both.
#[async_trait]
pub trait AsyncActionFilter: FilterMetadata {
    async fn on_action_execution(
        &self,
        context: &mut ActionExecutingContext,
        next: ActionExecutionDelegate<'_>,
    ) -> Result<(), Error>;
}

pub trait ResultFilter: FilterMetadata {
    fn on_result_executing(&self, context: &mut ResultExecutingContext) -> Result<(), Error>;

    fn on_result_executed(&self, context: &mut ResultExecutedContext) -> Result<(), Error>;
}

/// Either call `next.invoke(context)` or set `context.cancel`, never both.
#[async_trait]
pub trait AsyncResultFilter: FilterMetadata {
    async fn on_result_execution(
        &self,
        context: &mut ResultExecutingContext,
        next: ResultExecutionDelegate<'_>,
    ) -> Result<(), Error>;
}

// ============================================================================
// Descriptors
// ============================================================================

/// Where a filter was registered. Closer to the action sorts later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i32)]
pub enum FilterScope {
    First = 0,
    Global = 10,
    Controller = 20,
    Action = 30,
    Last = 100,
}

/// A filter registration together with its order and scope.
#[derive(Clone)]
pub struct FilterDescriptor {
    pub filter: FilterRef,
    pub order: i32,
    pub scope: FilterScope,
}

impl FilterDescriptor {
    /// Order is taken from the filter when it declares one.
    pub fn new(filter: FilterRef, scope: FilterScope) -> Self {
        let order = filter.order().unwrap_or(0);
        Self {
            filter,
            order,
            scope,
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }
}

impl std::fmt::Debug for FilterDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterDescriptor")
            .field("filter", &self.filter.name())
            .field("order", &self.order)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Ascending order, ties broken by ascending scope.
pub fn compare_filter_descriptors(a: &FilterDescriptor, b: &FilterDescriptor) -> Ordering {
    a.order.cmp(&b.order).then(a.scope.cmp(&b.scope))
}

/// Stable sort into execution order.
pub fn sort_filter_descriptors(descriptors: &mut [FilterDescriptor]) {
    descriptors.sort_by(compare_filter_descriptors);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str, Option<i32>);

    impl FilterMetadata for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn order(&self) -> Option<i32> {
            self.1
        }
    }

    fn descriptor(name: &'static str, order: i32, scope: FilterScope) -> FilterDescriptor {
        FilterDescriptor::new(Arc::new(Named(name, None)), scope).with_order(order)
    }

    #[test]
    fn test_sort_by_order_then_scope() {
        let mut descriptors = vec![
            descriptor("global", 0, FilterScope::Global),
            descriptor("action", 0, FilterScope::Action),
            descriptor("early", -1, FilterScope::Action),
        ];

        sort_filter_descriptors(&mut descriptors);

        let names: Vec<&str> = descriptors.iter().map(|d| d.filter.name()).collect();
        assert_eq!(names, vec!["early", "global", "action"]);
    }

    #[test]
    fn test_sort_is_stable() {
        let mut descriptors = vec![
            descriptor("a", 1, FilterScope::Controller),
            descriptor("b", 1, FilterScope::Controller),
            descriptor("c", 1, FilterScope::Controller),
        ];

        sort_filter_descriptors(&mut descriptors);

        let names: Vec<&str> = descriptors.iter().map(|d| d.filter.name()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_descriptor_takes_declared_order() {
        let d = FilterDescriptor::new(Arc::new(Named("ordered", Some(7))), FilterScope::Global);
        assert_eq!(d.order, 7);
        assert!(FilterScope::Global < FilterScope::Controller);
        assert_eq!(FilterScope::Last as i32, 100);
    }

    #[test]
    fn test_plain_metadata_has_no_capabilities() {
        let filter = Named("plain", None);
        assert!(filter.as_action_filter().is_none());
        assert!(filter.as_result_filter().is_none());
        assert!(filter.as_filter_factory().is_none());
    }
}
