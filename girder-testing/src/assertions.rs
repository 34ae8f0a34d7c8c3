// Assertions for responses and call logs

use crate::CallLog;
use girder_core::HttpResponse;

/// Assert that a response has a specific status code
pub fn assert_status(response: &HttpResponse, expected: u16) {
    assert_eq!(
        response.status, expected,
        "Expected status {}, got {}",
        expected, response.status
    );
}

/// Assert that the body is exactly `expected`
pub fn assert_body(response: &HttpResponse, expected: &str) {
    let body = String::from_utf8_lossy(&response.body);
    assert_eq!(body, expected, "Response bodies do not match");
}

/// Assert that a response body contains JSON matching expected value
pub fn assert_json<T>(response: &HttpResponse, expected: &T)
where
    T: serde::de::DeserializeOwned + PartialEq + std::fmt::Debug,
{
    let actual: T = response
        .json()
        .expect("Failed to deserialize response body");
    assert_eq!(actual, *expected, "JSON bodies do not match");
}

/// Assert that a response has a specific header
pub fn assert_header(response: &HttpResponse, key: &str, expected: &str) {
    let actual = response.headers.get(key).map(|s| s.as_str());
    assert_eq!(
        actual,
        Some(expected),
        "Expected header '{}' to be '{}', got {:?}",
        key,
        expected,
        actual
    );
}

/// Assert the exact sequence of recorded calls
pub fn assert_calls(log: &CallLog, expected: &[&str]) {
    let actual = log.get_calls();
    assert_eq!(actual, expected, "Recorded calls do not match");
}
