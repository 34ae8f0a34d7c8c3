// Built-in constraints: HTTP method, CORS preflight aware HTTP method, and
// request content type

use super::{ActionConstraint, ActionConstraintContext, ActionConstraintMetadata, ActionConstraintRef};
use std::sync::Arc;

pub const HTTP_METHOD_CONSTRAINT_ORDER: i32 = 100;
pub const CONSUMES_CONSTRAINT_ORDER: i32 = 200;

/// Accepts requests whose method is one of `http_methods`.
///
/// An empty list accepts every method.
#[derive(Debug, Clone)]
pub struct HttpMethodActionConstraint {
    http_methods: Vec<String>,
}

impl HttpMethodActionConstraint {
    pub fn new<I, S>(http_methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            http_methods: http_methods
                .into_iter()
                .map(|m| m.as_ref().to_ascii_uppercase())
                .collect(),
        }
    }

    pub fn http_methods(&self) -> &[String] {
        &self.http_methods
    }

    fn allows(&self, method: &str) -> bool {
        self.http_methods.is_empty()
            || self
                .http_methods
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(method))
    }
}

impl ActionConstraint for HttpMethodActionConstraint {
    fn order(&self) -> i32 {
        HTTP_METHOD_CONSTRAINT_ORDER
    }

    fn accept(&self, context: &ActionConstraintContext<'_>) -> bool {
        self.allows(&context.http_context.request.method)
    }

    fn name(&self) -> &str {
        "HttpMethodActionConstraint"
    }
}

impl ActionConstraintMetadata for HttpMethodActionConstraint {
    fn name(&self) -> &str {
        "HttpMethodActionConstraint"
    }

    fn as_constraint(self: Arc<Self>) -> Option<ActionConstraintRef> {
        Some(self)
    }

    fn is_routing_subsumed(&self) -> bool {
        true
    }
}

/// Like [`HttpMethodActionConstraint`], but a CORS preflight is judged by
/// the method it asks permission for.
#[derive(Debug, Clone)]
pub struct CorsHttpMethodActionConstraint {
    inner: HttpMethodActionConstraint,
}

impl CorsHttpMethodActionConstraint {
    pub fn new<I, S>(http_methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            inner: HttpMethodActionConstraint::new(http_methods),
        }
    }
}

impl ActionConstraint for CorsHttpMethodActionConstraint {
    fn order(&self) -> i32 {
        HTTP_METHOD_CONSTRAINT_ORDER
    }

    fn accept(&self, context: &ActionConstraintContext<'_>) -> bool {
        let request = &context.http_context.request;
        if request.method.eq_ignore_ascii_case("OPTIONS") && request.header("Origin").is_some() {
            if let Some(requested) = request.header("Access-Control-Request-Method") {
                return self.inner.allows(requested);
            }
        }
        self.inner.allows(&request.method)
    }

    fn name(&self) -> &str {
        "CorsHttpMethodActionConstraint"
    }
}

impl ActionConstraintMetadata for CorsHttpMethodActionConstraint {
    fn name(&self) -> &str {
        "CorsHttpMethodActionConstraint"
    }

    fn as_constraint(self: Arc<Self>) -> Option<ActionConstraintRef> {
        Some(self)
    }

    fn is_routing_subsumed(&self) -> bool {
        true
    }
}

/// Restricts the request content type.
///
/// `type/*` entries match every subtype. A request without a content type
/// is accepted only when every competing candidate restricts content types
/// too, so an unrestricted action wins.
#[derive(Debug, Clone)]
pub struct ConsumesConstraint {
    content_types: Vec<String>,
}

impl ConsumesConstraint {
    pub fn new<I, S>(content_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            content_types: content_types
                .into_iter()
                .map(|t| t.as_ref().trim().to_ascii_lowercase())
                .collect(),
        }
    }

    fn matches(&self, content_type: &str) -> bool {
        let content_type = content_type.to_ascii_lowercase();
        self.content_types.iter().any(|accepted| {
            match accepted.strip_suffix("/*") {
                Some(main) => content_type
                    .split_once('/')
                    .is_some_and(|(ty, _)| ty == main),
                None => *accepted == content_type,
            }
        })
    }
}

impl ActionConstraint for ConsumesConstraint {
    fn order(&self) -> i32 {
        CONSUMES_CONSTRAINT_ORDER
    }

    fn accept(&self, context: &ActionConstraintContext<'_>) -> bool {
        match context.http_context.request.content_type() {
            Some(content_type) => self.matches(content_type),
            None => context.candidates.iter().all(|candidate| {
                candidate
                    .constraints()
                    .iter()
                    .any(|c| c.consumes_media_types().is_some())
            }),
        }
    }

    fn name(&self) -> &str {
        "ConsumesConstraint"
    }

    fn consumes_media_types(&self) -> Option<&[String]> {
        Some(&self.content_types)
    }
}

impl ActionConstraintMetadata for ConsumesConstraint {
    fn name(&self) -> &str {
        "ConsumesConstraint"
    }

    fn as_constraint(self: Arc<Self>) -> Option<ActionConstraintRef> {
        Some(self)
    }

    fn is_routing_subsumed(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action_descriptor::ActionDescriptor;
    use crate::constraints::ActionSelectorCandidate;
    use crate::http::{HttpContext, HttpRequest};
    use crate::route::RouteValues;

    fn candidate(constraints: Vec<ActionConstraintRef>) -> ActionSelectorCandidate {
        ActionSelectorCandidate::new(
            Arc::new(ActionDescriptor::test_descriptor("Home", "Index")),
            Some(constraints.into()),
        )
    }

    fn accepts(
        constraint: &dyn ActionConstraint,
        request: HttpRequest,
        candidates: &[ActionSelectorCandidate],
    ) -> bool {
        let http_context = HttpContext::new(request);
        let route_values = RouteValues::new();
        let context = ActionConstraintContext {
            candidates,
            current_candidate: &candidates[0],
            route_values: &route_values,
            http_context: &http_context,
        };
        constraint.accept(&context)
    }

    #[test]
    fn test_http_method_ignores_case() {
        let constraint = HttpMethodActionConstraint::new(["get", "HEAD"]);
        let candidates = [candidate(vec![])];

        assert!(accepts(&constraint, HttpRequest::new("GET", "/"), &candidates));
        assert!(accepts(&constraint, HttpRequest::new("head", "/"), &candidates));
        assert!(!accepts(&constraint, HttpRequest::new("POST", "/"), &candidates));
        assert!(accepts(
            &HttpMethodActionConstraint::new(Vec::<String>::new()),
            HttpRequest::new("DELETE", "/"),
            &candidates
        ));
    }

    #[test]
    fn test_cors_preflight_uses_requested_method() {
        let constraint = CorsHttpMethodActionConstraint::new(["PUT"]);
        let candidates = [candidate(vec![])];
        let preflight = HttpRequest::new("OPTIONS", "/")
            .with_header("Origin", "https://example.com")
            .with_header("Access-Control-Request-Method", "PUT");

        assert!(accepts(&constraint, preflight, &candidates));
        assert!(!accepts(&constraint, HttpRequest::new("OPTIONS", "/"), &candidates));
        assert!(!accepts(
            &HttpMethodActionConstraint::new(["PUT"]),
            HttpRequest::new("OPTIONS", "/")
                .with_header("Origin", "https://example.com")
                .with_header("Access-Control-Request-Method", "PUT"),
            &candidates
        ));
    }

    #[test]
    fn test_consumes_matches_content_type() {
        let constraint = ConsumesConstraint::new(["application/json", "text/*"]);
        let candidates = [candidate(vec![Arc::new(constraint.clone()) as ActionConstraintRef])];
        let with_type = |t: &str| HttpRequest::new("POST", "/").with_header("Content-Type", t);

        assert!(accepts(&constraint, with_type("application/json; charset=utf-8"), &candidates));
        assert!(accepts(&constraint, with_type("text/csv"), &candidates));
        assert!(!accepts(&constraint, with_type("application/xml"), &candidates));
    }

    #[test]
    fn test_consumes_without_content_type_defers_to_unrestricted_actions() {
        let constraint = ConsumesConstraint::new(["application/json"]);
        let restricted = candidate(vec![Arc::new(constraint.clone()) as ActionConstraintRef]);

        assert!(accepts(
            &constraint,
            HttpRequest::new("POST", "/"),
            std::slice::from_ref(&restricted)
        ));
        assert!(!accepts(
            &constraint,
            HttpRequest::new("POST", "/"),
            &[restricted, candidate(vec![])]
        ));
    }

    #[test]
    fn test_builtins_are_routing_subsumed() {
        assert!(ActionConstraintMetadata::is_routing_subsumed(
            &HttpMethodActionConstraint::new(["GET"])
        ));
        assert!(ActionConstraintMetadata::is_routing_subsumed(&ConsumesConstraint::new([
            "text/plain"
        ])));
    }
}
