//! Integration tests for action selection.

use girder_core::*;
use std::sync::Arc;

#[derive(Default)]
struct Products;

fn action(controller: &str, name: &str) -> ActionDescriptorBuilder {
    ActionDescriptor::builder(controller, name, ActionMethod::new(name, |_: &Products, _| ()))
        .display_name(format!("{}.{}", controller, name))
        .controller_factory(Arc::new(FnControllerFactory::of_default::<Products>()))
}

fn select(
    selector: &ActionSelector,
    method: &str,
    route_values: RouteValues,
) -> Result<Option<Arc<ActionDescriptor>>, Error> {
    let http_context = HttpContext::new(HttpRequest::new(method, "/"));
    let candidates = selector.select_candidates(&route_values);
    selector.select_best_candidate(&http_context, &route_values, &candidates)
}

#[test]
fn test_null_and_empty_area_select_the_same_actions() {
    let provider = Arc::new(
        ActionDescriptorCollectionProvider::with_actions(vec![
            action("Products", "Index").build(),
            action("Products", "Index")
                .display_name("admin")
                .route_value("area", "Admin")
                .build(),
        ])
        .unwrap(),
    );
    let tree = ActionSelectionDecisionTree::new(&provider.collection());

    let base = RouteValues::new()
        .with("controller", "Products")
        .with("action", "Index");
    let null = tree.select(&base.clone().with_optional("area", None::<String>));
    let empty = tree.select(&base.clone().with("area", ""));

    let ids = |actions: &[Arc<ActionDescriptor>]| -> Vec<String> {
        actions.iter().map(|a| a.id.clone()).collect()
    };
    assert_eq!(ids(&null), ids(&empty));
    assert_eq!(null.len(), 1);
}

#[test]
fn test_tree_follows_collection_updates() {
    let provider = Arc::new(
        ActionDescriptorCollectionProvider::with_actions(vec![action("Products", "Index").build()])
            .unwrap(),
    );
    let selector = ActionSelector::new(Arc::clone(&provider));
    let route = RouteValues::new()
        .with("controller", "products")
        .with("action", "details");

    assert!(select(&selector, "GET", route.clone()).unwrap().is_none());

    provider
        .update(vec![
            action("Products", "Index").build(),
            action("Products", "Details").build(),
        ])
        .unwrap();

    let chosen = select(&selector, "GET", route).unwrap().unwrap();
    assert_eq!(chosen.display_name, "Products.Details");
}

#[test]
fn test_http_method_picks_between_overloads() {
    let provider = Arc::new(
        ActionDescriptorCollectionProvider::with_actions(vec![
            action("Products", "Edit")
                .display_name("edit-form")
                .constraint(Arc::new(HttpMethodActionConstraint::new(["GET"])))
                .build(),
            action("Products", "Edit")
                .display_name("edit-save")
                .constraint(Arc::new(HttpMethodActionConstraint::new(["POST", "PUT"])))
                .build(),
        ])
        .unwrap(),
    );
    let selector = ActionSelector::new(provider);
    let route = || {
        RouteValues::new()
            .with("controller", "products")
            .with("action", "edit")
    };

    assert_eq!(select(&selector, "get", route()).unwrap().unwrap().display_name, "edit-form");
    assert_eq!(select(&selector, "PUT", route()).unwrap().unwrap().display_name, "edit-save");
    assert!(select(&selector, "DELETE", route()).unwrap().is_none());
}

#[test]
fn test_cors_preflight_selects_by_requested_method() {
    let provider = Arc::new(
        ActionDescriptorCollectionProvider::with_actions(vec![
            action("Products", "Save")
                .constraint(Arc::new(CorsHttpMethodActionConstraint::new(["POST"])))
                .build(),
        ])
        .unwrap(),
    );
    let selector = ActionSelector::new(provider);
    let route = RouteValues::new()
        .with("controller", "products")
        .with("action", "save");

    let preflight = HttpContext::new(
        HttpRequest::new("OPTIONS", "/products/save")
            .with_header("Origin", "https://shop.example")
            .with_header("Access-Control-Request-Method", "POST"),
    );
    let candidates = selector.select_candidates(&route);
    let chosen = selector
        .select_best_candidate(&preflight, &route, &candidates)
        .unwrap();
    assert!(chosen.is_some());
}

#[test]
fn test_ambiguity_is_reported() {
    let provider = Arc::new(
        ActionDescriptorCollectionProvider::with_actions(vec![
            action("Products", "Index").build(),
            action("Products", "Index").build(),
        ])
        .unwrap(),
    );
    let selector = ActionSelector::new(provider);
    let route = RouteValues::new()
        .with("controller", "products")
        .with("action", "index");

    let err = select(&selector, "GET", route).unwrap_err();
    assert!(matches!(err, Error::AmbiguousAction(_)));
    assert_eq!(err.status_code().as_u16(), 500);
}
