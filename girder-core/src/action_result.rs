//! Action results
//!
//! An [`ActionResult`] is the value an action (or a short-circuiting filter)
//! hands to the pipeline. The pipeline executes exactly one result per
//! request, after the result filters have had their say.

use crate::action_context::ActionContext;
use crate::error::Error;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Writes the outcome of an action to the response.
#[async_trait]
pub trait ActionResult: Send + Sync {
    async fn execute_result(&self, context: &ActionContext) -> Result<(), Error>;

    /// Name used in logs and diagnostics
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Shared handle to a result
pub type ActionResultRef = Arc<dyn ActionResult>;

/// Result that writes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyResult;

impl EmptyResult {
    pub fn shared() -> ActionResultRef {
        Arc::new(EmptyResult)
    }
}

#[async_trait]
impl ActionResult for EmptyResult {
    async fn execute_result(&self, _context: &ActionContext) -> Result<(), Error> {
        Ok(())
    }

    fn name(&self) -> &str {
        "EmptyResult"
    }
}

/// Result that only sets a status code.
#[derive(Debug, Clone, Copy)]
pub struct StatusCodeResult {
    pub status: u16,
}

impl StatusCodeResult {
    pub fn new(status: u16) -> Self {
        Self { status }
    }

    pub fn shared(status: u16) -> ActionResultRef {
        Arc::new(Self::new(status))
    }
}

#[async_trait]
impl ActionResult for StatusCodeResult {
    async fn execute_result(&self, context: &ActionContext) -> Result<(), Error> {
        context.http_context.response().status = self.status;
        Ok(())
    }

    fn name(&self) -> &str {
        "StatusCodeResult"
    }
}

/// Result that writes a string body.
#[derive(Debug, Clone)]
pub struct ContentResult {
    pub content: String,
    pub content_type: Option<String>,
    pub status: Option<u16>,
}

impl ContentResult {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            content_type: None,
            status: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

#[async_trait]
impl ActionResult for ContentResult {
    async fn execute_result(&self, context: &ActionContext) -> Result<(), Error> {
        let mut response = context.http_context.response();
        if let Some(status) = self.status {
            response.status = status;
        }
        let content_type = self
            .content_type
            .clone()
            .unwrap_or_else(|| "text/plain; charset=utf-8".to_string());
        response
            .headers
            .insert(http::header::CONTENT_TYPE.as_str().to_string(), content_type);
        response.body = self.content.clone().into_bytes();
        Ok(())
    }

    fn name(&self) -> &str {
        "ContentResult"
    }
}

/// Result carrying an object value and the type the action declared for it.
///
/// The value is written as JSON; the declared type is kept for formatters
/// that pick a representation by static type.
#[derive(Debug, Clone)]
pub struct ObjectResult {
    pub value: Value,
    pub declared_type: Option<String>,
    pub status: Option<u16>,
}

impl ObjectResult {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            declared_type: None,
            status: None,
        }
    }

    pub fn with_declared_type(mut self, declared_type: impl Into<String>) -> Self {
        self.declared_type = Some(declared_type.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

#[async_trait]
impl ActionResult for ObjectResult {
    async fn execute_result(&self, context: &ActionContext) -> Result<(), Error> {
        let mut response = context.http_context.response();
        if let Some(status) = self.status {
            response.status = status;
        }
        response.write_json(&self.value)
    }

    fn name(&self) -> &str {
        "ObjectResult"
    }
}

/// Turns plain values returned by actions into results.
pub trait ActionResultTypeMapper: Send + Sync {
    fn convert(&self, value: Value, declared_type: &str) -> ActionResultRef;
}

/// Wraps every value in an [`ObjectResult`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultActionResultTypeMapper;

impl ActionResultTypeMapper for DefaultActionResultTypeMapper {
    fn convert(&self, value: Value, declared_type: &str) -> ActionResultRef {
        Arc::new(ObjectResult::new(value).with_declared_type(declared_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action_descriptor::ActionDescriptor;
    use crate::http::{HttpContext, HttpRequest};
    use crate::route::RouteData;

    fn action_context() -> ActionContext {
        ActionContext::new(
            Arc::new(HttpContext::new(HttpRequest::new("GET", "/"))),
            RouteData::default(),
            Arc::new(ActionDescriptor::test_descriptor("Home", "Index")),
        )
    }

    #[tokio::test]
    async fn test_object_result_writes_json() {
        let context = action_context();
        let result = ObjectResult::new(serde_json::json!({ "id": 1 })).with_status(201);

        result.execute_result(&context).await.unwrap();

        let response = context.http_context.take_response();
        assert_eq!(response.status, 201);
        assert_eq!(response.body, br#"{"id":1}"#);
    }

    #[tokio::test]
    async fn test_empty_result_leaves_response_alone() {
        let context = action_context();
        EmptyResult.execute_result(&context).await.unwrap();

        let response = context.http_context.take_response();
        assert_eq!(response.status, 200);
        assert!(response.body.is_empty());
    }

    #[tokio::test]
    async fn test_content_result() {
        let context = action_context();
        ContentResult::new("hello")
            .with_status(202)
            .execute_result(&context)
            .await
            .unwrap();

        let response = context.http_context.take_response();
        assert_eq!(response.status, 202);
        assert_eq!(response.body, b"hello");
    }

    #[test]
    fn test_mapper_keeps_declared_type() {
        let mapper = DefaultActionResultTypeMapper;
        let result = mapper.convert(serde_json::json!(5), "i32");
        assert_eq!(result.name(), "ObjectResult");
    }
}
