// Core library for the Girder MVC action pipeline
// Action selection, the invoker caches and the filter pipeline state machine

pub mod action_context;
pub mod action_descriptor;
pub mod action_method_executor;
pub mod action_result;
pub mod binding;
pub mod constraints;
pub mod controller;
pub mod diagnostics;
pub mod error;
pub mod filters;
pub mod handler;
pub mod http;
pub mod invoker;
pub mod logging;
pub mod method_executor;
pub mod options;
pub mod route;
pub mod selection;

// Re-export commonly used types
pub use action_context::*;
pub use action_descriptor::*;
pub use action_method_executor::{ActionMethodExecutor, get_executor};
pub use action_result::*;
pub use binding::*;
pub use constraints::*;
pub use controller::*;
pub use diagnostics::*;
pub use error::*;
pub use filters::*;
pub use handler::*;
pub use self::http::*;
pub use invoker::*;
pub use logging::{LogConfig, LogFormat, LogLevel, LogOutput, Rotation, events};
pub use method_executor::*;
pub use options::*;
pub use route::*;
pub use selection::*;
