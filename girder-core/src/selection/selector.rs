// Picks the action for a request from route values and action constraints

use super::ActionSelectorDecisionTreeProvider;
use crate::action_descriptor::{ActionDescriptor, ActionDescriptorCollectionProvider};
use crate::constraints::{
    ActionConstraintCache, ActionConstraintContext, ActionConstraintProvider,
    ActionSelectorCandidate,
};
use crate::error::Error;
use crate::http::HttpContext;
use crate::logging::events;
use crate::route::RouteValues;
use std::sync::Arc;

/// Two-step action selection: route values narrow the actions down to
/// candidates, then action constraints pick the best one.
pub struct ActionSelector {
    tree_provider: ActionSelectorDecisionTreeProvider,
    constraint_cache: ActionConstraintCache,
}

impl ActionSelector {
    pub fn new(collection_provider: Arc<ActionDescriptorCollectionProvider>) -> Self {
        Self {
            tree_provider: ActionSelectorDecisionTreeProvider::new(Arc::clone(&collection_provider)),
            constraint_cache: ActionConstraintCache::new(collection_provider),
        }
    }

    pub fn with_constraint_providers(
        collection_provider: Arc<ActionDescriptorCollectionProvider>,
        providers: Vec<Arc<dyn ActionConstraintProvider>>,
    ) -> Self {
        Self {
            tree_provider: ActionSelectorDecisionTreeProvider::new(Arc::clone(&collection_provider)),
            constraint_cache: ActionConstraintCache::with_providers(collection_provider, providers),
        }
    }

    pub fn constraint_cache(&self) -> &ActionConstraintCache {
        &self.constraint_cache
    }

    /// Conventionally routed actions whose route values match.
    pub fn select_candidates(&self, route_values: &RouteValues) -> Vec<Arc<ActionDescriptor>> {
        self.tree_provider.decision_tree().select(route_values)
    }

    /// The single candidate satisfying its constraints best.
    ///
    /// Returns `Ok(None)` when no candidate survives and
    /// [`Error::AmbiguousAction`] when several do.
    pub fn select_best_candidate(
        &self,
        http_context: &HttpContext,
        route_values: &RouteValues,
        candidates: &[Arc<ActionDescriptor>],
    ) -> Result<Option<Arc<ActionDescriptor>>, Error> {
        if candidates.is_empty() {
            return Ok(None);
        }

        let mut with_constraints = Vec::with_capacity(candidates.len());
        for action in candidates {
            let constraints = self
                .constraint_cache
                .get_action_constraints(http_context, action)?;
            with_constraints.push(ActionSelectorCandidate::new(Arc::clone(action), constraints));
        }

        let mut matches =
            evaluate_action_constraints(http_context, route_values, with_constraints, None);

        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop().map(|candidate| candidate.action)),
            _ => {
                let names = matches
                    .iter()
                    .map(|candidate| candidate.action.display_name.as_str())
                    .collect::<Vec<_>>()
                    .join("\n");
                events::ambiguous_actions(&names);
                Err(Error::AmbiguousAction(format!(
                    "Multiple actions matched. The following actions matched route data and had all constraints satisfied:\n\n{}",
                    names
                )))
            }
        }
    }
}

/// Evaluate the lowest constraint order above `starting_order`, preferring
/// candidates that have a constraint of that order over those that do not.
fn evaluate_action_constraints(
    http_context: &HttpContext,
    route_values: &RouteValues,
    candidates: Vec<ActionSelectorCandidate>,
    starting_order: Option<i32>,
) -> Vec<ActionSelectorCandidate> {
    let order = candidates
        .iter()
        .flat_map(|candidate| candidate.constraints().iter())
        .map(|constraint| constraint.order())
        .filter(|order| starting_order.is_none_or(|start| *order > start))
        .min();

    let Some(order) = order else {
        return candidates;
    };

    let mut with_constraint = Vec::new();
    let mut without_constraint = Vec::new();

    for candidate in &candidates {
        let context = ActionConstraintContext {
            candidates: &candidates,
            current_candidate: candidate,
            route_values,
            http_context,
        };

        let mut is_match = true;
        let mut found_matching_constraint = false;
        for constraint in candidate.constraints() {
            if constraint.order() != order {
                continue;
            }
            found_matching_constraint = true;
            if !constraint.accept(&context) {
                is_match = false;
                events::constraint_mismatch(&candidate.action, constraint.name());
                break;
            }
        }

        if is_match && found_matching_constraint {
            with_constraint.push(candidate.clone());
        } else if is_match {
            without_constraint.push(candidate.clone());
        }
    }

    if !with_constraint.is_empty() {
        let matches =
            evaluate_action_constraints(http_context, route_values, with_constraint, Some(order));
        if !matches.is_empty() {
            return matches;
        }
    }

    if without_constraint.is_empty() {
        Vec::new()
    } else {
        evaluate_action_constraints(http_context, route_values, without_constraint, Some(order))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{ConsumesConstraint, HttpMethodActionConstraint};
    use crate::controller::FnControllerFactory;
    use crate::http::HttpRequest;
    use crate::method_executor::{ActionMethod, ControllerInstance};

    struct Orders;

    fn action(name: &str) -> crate::action_descriptor::ActionDescriptorBuilder {
        ActionDescriptor::builder("Orders", name, ActionMethod::new(name, |_: &Orders, _| ()))
            .display_name(format!("Orders.{}", name))
            .controller_factory(Arc::new(FnControllerFactory::new(|_| {
                Ok(Arc::new(Orders) as ControllerInstance)
            })))
    }

    fn selector(actions: Vec<ActionDescriptor>) -> ActionSelector {
        ActionSelector::new(Arc::new(
            ActionDescriptorCollectionProvider::with_actions(actions).unwrap(),
        ))
    }

    fn select(
        selector: &ActionSelector,
        request: HttpRequest,
        route_values: RouteValues,
    ) -> Result<Option<Arc<ActionDescriptor>>, Error> {
        let candidates = selector.select_candidates(&route_values);
        selector.select_best_candidate(&HttpContext::new(request), &route_values, &candidates)
    }

    fn route(action: &str) -> RouteValues {
        RouteValues::new()
            .with("controller", "orders")
            .with("action", action)
    }

    #[test]
    fn test_constrained_action_is_preferred() {
        let selector = selector(vec![
            action("Save").display_name("any").build(),
            action("Save")
                .display_name("post")
                .constraint(Arc::new(HttpMethodActionConstraint::new(["POST"])))
                .build(),
        ]);

        let chosen = select(&selector, HttpRequest::new("POST", "/"), route("save"))
            .unwrap()
            .unwrap();
        assert_eq!(chosen.display_name, "post");

        let fallback = select(&selector, HttpRequest::new("GET", "/"), route("save"))
            .unwrap()
            .unwrap();
        assert_eq!(fallback.display_name, "any");
    }

    #[test]
    fn test_ambiguity_lists_every_survivor() {
        let selector = selector(vec![action("List").build(), action("List").build()]);

        let err = select(&selector, HttpRequest::new("GET", "/"), route("list")).unwrap_err();
        match err {
            Error::AmbiguousAction(message) => {
                assert!(message.ends_with("Orders.List\nOrders.List"));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_no_surviving_candidate() {
        let selector = selector(vec![action("Delete")
            .constraint(Arc::new(HttpMethodActionConstraint::new(["DELETE"])))
            .build()]);

        assert!(select(&selector, HttpRequest::new("GET", "/"), route("delete"))
            .unwrap()
            .is_none());
        assert!(select(&selector, HttpRequest::new("GET", "/"), route("missing"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_later_stages_break_ties() {
        let selector = selector(vec![
            action("Upload")
                .display_name("json")
                .constraint(Arc::new(HttpMethodActionConstraint::new(["POST"])))
                .constraint(Arc::new(ConsumesConstraint::new(["application/json"])))
                .build(),
            action("Upload")
                .display_name("form")
                .constraint(Arc::new(HttpMethodActionConstraint::new(["POST"])))
                .constraint(Arc::new(ConsumesConstraint::new(["multipart/form-data"])))
                .build(),
        ]);

        let request =
            HttpRequest::new("POST", "/").with_header("Content-Type", "multipart/form-data");
        let chosen = select(&selector, request, route("upload")).unwrap().unwrap();
        assert_eq!(chosen.display_name, "form");
    }

    #[test]
    fn test_attribute_routed_actions_are_not_candidates() {
        let selector = selector(vec![action("Show")
            .attribute_route(crate::action_descriptor::AttributeRouteInfo::new("orders/{id}"))
            .build()]);

        assert!(selector.select_candidates(&route("show")).is_empty());
    }
}
