// HTTP request, response and per-request context types

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// HTTP request wrapper
#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub query_params: HashMap<String, String>,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Get a header value, ignoring the case of the name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Media type of the body without parameters
    pub fn content_type(&self) -> Option<&str> {
        self.header(http::header::CONTENT_TYPE.as_str())
            .map(|value| value.split(';').next().unwrap_or(value).trim())
            .filter(|value| !value.is_empty())
    }

    /// Get a query parameter by name
    pub fn query(&self, name: &str) -> Option<&String> {
        self.query_params.get(name)
    }

    /// Parse the request body as JSON
    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, crate::Error> {
        serde_json::from_slice(&self.body).map_err(|e| crate::Error::ModelBinding(e.to_string()))
    }
}

/// HTTP response wrapper
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn with_json<T: Serialize>(mut self, value: &T) -> Result<Self, crate::Error> {
        self.write_json(value)?;
        Ok(self)
    }

    /// Serialize `value` into the body and set the JSON content type.
    pub fn write_json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), crate::Error> {
        self.body =
            serde_json::to_vec(value).map_err(|e| crate::Error::Serialization(e.to_string()))?;
        self.headers.insert(
            http::header::CONTENT_TYPE.as_str().to_string(),
            "application/json".to_string(),
        );
        Ok(())
    }

    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.headers.insert(key, value);
        self
    }

    /// Parse the body as JSON
    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, crate::Error> {
        serde_json::from_slice(&self.body).map_err(|e| crate::Error::Serialization(e.to_string()))
    }
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::ok()
    }
}

/// The request being served together with the response being built.
///
/// Shared by every context of one invocation; the response sits behind a
/// lock so results and filters can write to it through `&HttpContext`.
#[derive(Debug, Default)]
pub struct HttpContext {
    pub request: HttpRequest,
    response: Mutex<HttpResponse>,
    items: Mutex<HashMap<String, serde_json::Value>>,
}

impl HttpContext {
    pub fn new(request: HttpRequest) -> Self {
        Self {
            request,
            response: Mutex::new(HttpResponse::ok()),
            items: Mutex::new(HashMap::new()),
        }
    }

    /// Lock the response for writing
    pub fn response(&self) -> MutexGuard<'_, HttpResponse> {
        self.response.lock()
    }

    /// Take the finished response, leaving a fresh 200 in its place
    pub fn take_response(&self) -> HttpResponse {
        std::mem::take(&mut *self.response.lock())
    }

    /// Store a per-request value
    pub fn set_item(&self, key: impl Into<String>, value: serde_json::Value) {
        self.items.lock().insert(key.into(), value);
    }

    pub fn item(&self, key: &str) -> Option<serde_json::Value> {
        self.items.lock().get(key).cloned()
    }
}

/// JSON return value helper
#[derive(Debug, Clone)]
pub struct Json<T: Serialize>(pub T);

impl<T: Serialize> Json<T> {
    pub fn into_response(self) -> Result<HttpResponse, crate::Error> {
        HttpResponse::ok().with_json(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_ignores_case() {
        let request = HttpRequest::new("POST", "/orders")
            .with_header("Content-Type", "application/json; charset=utf-8");

        assert_eq!(
            request.header("content-type"),
            Some("application/json; charset=utf-8")
        );
        assert_eq!(request.content_type(), Some("application/json"));
        assert_eq!(request.header("accept"), None);
    }

    #[test]
    fn test_response_json() {
        let response = HttpResponse::ok()
            .with_json(&serde_json::json!({ "id": 3 }))
            .unwrap();

        assert_eq!(
            response.headers.get("content-type").map(String::as_str),
            Some("application/json")
        );
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["id"], 3);
    }

    #[test]
    fn test_take_response_resets() {
        let context = HttpContext::new(HttpRequest::new("GET", "/"));
        context.response().status = 418;

        assert_eq!(context.take_response().status, 418);
        assert_eq!(context.response().status, 200);
    }
}
