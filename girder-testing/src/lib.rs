//! Testing utilities for Girder action pipelines.
//!
//! ## Features
//!
//! - **CallLog** - Ordered record of pipeline steps
//! - **Recording filters** - One double per filter kind, writing to a `CallLog`
//! - **RecordingControllerFactory** - Counts controller creation and release
//! - **RecordingDiagnosticSource** - Captures diagnostic events
//! - **TestApp** - Handler over a fixed set of actions
//! - **Assertions** - Response and call log checks
//!
//! ## Quick Start
//!
//! ```
//! use girder_core::{ActionDescriptor, ActionMethod, ActionResultRef, ContentResult};
//! use girder_testing::*;
//! use std::sync::Arc;
//!
//! #[derive(Default)]
//! struct Home;
//!
//! # tokio_test::block_on(async {
//! let log = CallLog::new();
//! let factory = Arc::new(RecordingControllerFactory::of_default::<Home>());
//!
//! let index = ActionDescriptor::builder(
//!     "Home",
//!     "Index",
//!     ActionMethod::new("index", |_: &Home, _| -> ActionResultRef {
//!         Arc::new(ContentResult::new("home"))
//!     }),
//! )
//! .filter(Arc::new(RecordingActionFilter::new("audit", &log)))
//! .controller_factory(factory.clone())
//! .build();
//!
//! let app = TestAppBuilder::new().with_action(index).build().unwrap();
//! let response = app.request("GET", "home", "index").await.unwrap();
//!
//! assert_status(&response, 200);
//! assert_body(&response, "home");
//! assert_calls(&log, &["audit:before", "audit:after canceled=false"]);
//! assert_eq!(factory.released(), 1);
//! # });
//! ```

mod assertions;
mod diagnostics;
mod filters;
mod mock;
mod test_app;

pub use assertions::{assert_body, assert_calls, assert_header, assert_json, assert_status};
pub use diagnostics::{RecordedEvent, RecordingDiagnosticSource};
pub use filters::{
    AsyncRecordingActionFilter, AsyncRecordingResourceFilter, AsyncRecordingResultFilter,
    RecordingActionFilter, RecordingAuthorizationFilter, RecordingExceptionFilter,
    RecordingResourceFilter, RecordingResultFilter,
};
pub use mock::{CallLog, RecordingControllerFactory};
pub use test_app::{TestApp, TestAppBuilder};

// Re-export common testing utilities
pub use tokio::test as tokio_test;
