// Girder - an MVC action invocation pipeline for Rust
//
// Selects the controller action for a request's route values, then runs it
// inside authorization, resource, exception, action and result filters.

// Re-export core functionality
pub use girder_core::*;

// Re-export optional crates
#[cfg(feature = "testing")]
pub use girder_testing;
