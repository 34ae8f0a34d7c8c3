//! Action constraints
//!
//! Constraints decide, per request, whether an action that matched the route
//! values may handle the request. They are registered on descriptors as
//! [`ActionConstraintMetadata`]: either the constraint itself or a factory
//! producing it. Providers resolve the metadata into instances, and
//! [`ActionConstraintCache`] keeps the results that can be shared.

mod builtin;
mod cache;

pub use builtin::*;
pub use cache::*;

use crate::action_descriptor::ActionDescriptor;
use crate::error::Error;
use crate::http::HttpContext;
use crate::route::RouteValues;
use std::sync::Arc;

pub type ActionConstraintRef = Arc<dyn ActionConstraint>;
pub type ActionConstraintMetadataRef = Arc<dyn ActionConstraintMetadata>;

/// What gets registered on an action.
pub trait ActionConstraintMetadata: Send + Sync + 'static {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// The metadata used directly as a constraint
    fn as_constraint(self: Arc<Self>) -> Option<ActionConstraintRef> {
        None
    }

    fn as_factory(&self) -> Option<&dyn ActionConstraintFactory> {
        None
    }

    /// Constraints routing already enforces on its own. They do not count
    /// for [`ActionConstraintCache::has_action_constraints`].
    fn is_routing_subsumed(&self) -> bool {
        false
    }
}

/// Decides whether a candidate action may handle the request.
pub trait ActionConstraint: Send + Sync {
    /// Constraints are evaluated in stages of ascending order
    fn order(&self) -> i32;

    fn accept(&self, context: &ActionConstraintContext<'_>) -> bool;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Media types accepted, for constraints restricting the request body
    fn consumes_media_types(&self) -> Option<&[String]> {
        None
    }
}

pub trait ActionConstraintFactory: Send + Sync {
    fn is_reusable(&self) -> bool;

    fn create_instance(&self, http_context: &HttpContext) -> Result<ActionConstraintRef, Error>;
}

/// A metadata entry and the constraint resolved for it.
#[derive(Clone)]
pub struct ActionConstraintItem {
    pub metadata: ActionConstraintMetadataRef,
    pub constraint: Option<ActionConstraintRef>,
    pub is_reusable: bool,
}

impl ActionConstraintItem {
    pub fn new(metadata: ActionConstraintMetadataRef) -> Self {
        Self {
            metadata,
            constraint: None,
            is_reusable: false,
        }
    }
}

impl std::fmt::Debug for ActionConstraintItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionConstraintItem")
            .field("metadata", &self.metadata.name())
            .field("resolved", &self.constraint.is_some())
            .field("is_reusable", &self.is_reusable)
            .finish()
    }
}

pub struct ActionConstraintProviderContext<'a> {
    pub http_context: &'a HttpContext,
    pub action: &'a ActionDescriptor,
    pub results: Vec<ActionConstraintItem>,
}

/// Resolves constraint items; same ordering contract as filter providers.
pub trait ActionConstraintProvider: Send + Sync {
    fn order(&self) -> i32;

    fn on_providers_executing(
        &self,
        context: &mut ActionConstraintProviderContext<'_>,
    ) -> Result<(), Error>;

    fn on_providers_executed(
        &self,
        _context: &mut ActionConstraintProviderContext<'_>,
    ) -> Result<(), Error> {
        Ok(())
    }
}

/// Uses metadata that is a constraint as-is and asks factories for the rest.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultActionConstraintProvider;

impl ActionConstraintProvider for DefaultActionConstraintProvider {
    fn order(&self) -> i32 {
        -1000
    }

    fn on_providers_executing(
        &self,
        context: &mut ActionConstraintProviderContext<'_>,
    ) -> Result<(), Error> {
        let http_context = context.http_context;
        for item in context.results.iter_mut() {
            if item.constraint.is_some() {
                continue;
            }
            if let Some(constraint) = Arc::clone(&item.metadata).as_constraint() {
                item.constraint = Some(constraint);
                item.is_reusable = true;
            } else if let Some(factory) = item.metadata.as_factory() {
                item.constraint = Some(factory.create_instance(http_context)?);
                item.is_reusable = factory.is_reusable();
            }
        }
        Ok(())
    }
}

/// An action considered during selection, with its resolved constraints.
#[derive(Clone)]
pub struct ActionSelectorCandidate {
    pub action: Arc<ActionDescriptor>,
    pub constraints: Option<Arc<[ActionConstraintRef]>>,
}

impl ActionSelectorCandidate {
    pub fn new(
        action: Arc<ActionDescriptor>,
        constraints: Option<Arc<[ActionConstraintRef]>>,
    ) -> Self {
        Self {
            action,
            constraints,
        }
    }

    pub fn constraints(&self) -> &[ActionConstraintRef] {
        self.constraints.as_deref().unwrap_or(&[])
    }
}

impl std::fmt::Debug for ActionSelectorCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionSelectorCandidate")
            .field("action", &self.action.display_name)
            .field("constraints", &self.constraints().len())
            .finish()
    }
}

/// What a constraint sees while deciding.
pub struct ActionConstraintContext<'a> {
    /// Every candidate of the current evaluation stage
    pub candidates: &'a [ActionSelectorCandidate],
    pub current_candidate: &'a ActionSelectorCandidate,
    pub route_values: &'a RouteValues,
    pub http_context: &'a HttpContext,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpRequest;

    struct Always;

    impl ActionConstraint for Always {
        fn order(&self) -> i32 {
            0
        }

        fn accept(&self, _context: &ActionConstraintContext<'_>) -> bool {
            true
        }
    }

    impl ActionConstraintMetadata for Always {
        fn as_constraint(self: Arc<Self>) -> Option<ActionConstraintRef> {
            Some(self)
        }
    }

    struct Fresh;

    impl ActionConstraintMetadata for Fresh {
        fn as_factory(&self) -> Option<&dyn ActionConstraintFactory> {
            Some(self)
        }
    }

    impl ActionConstraintFactory for Fresh {
        fn is_reusable(&self) -> bool {
            false
        }

        fn create_instance(&self, _: &HttpContext) -> Result<ActionConstraintRef, Error> {
            Ok(Arc::new(Always))
        }
    }

    struct Inert;

    impl ActionConstraintMetadata for Inert {}

    #[test]
    fn test_default_provider_resolves_items() {
        let http_context = HttpContext::new(HttpRequest::new("GET", "/"));
        let action = ActionDescriptor::test_descriptor("Home", "Index");
        let mut context = ActionConstraintProviderContext {
            http_context: &http_context,
            action: &action,
            results: vec![
                ActionConstraintItem::new(Arc::new(Always)),
                ActionConstraintItem::new(Arc::new(Fresh)),
                ActionConstraintItem::new(Arc::new(Inert)),
            ],
        };

        DefaultActionConstraintProvider
            .on_providers_executing(&mut context)
            .unwrap();

        let items = &context.results;
        assert!(items[0].constraint.is_some() && items[0].is_reusable);
        assert!(items[1].constraint.is_some() && !items[1].is_reusable);
        assert!(items[2].constraint.is_none());
    }
}
