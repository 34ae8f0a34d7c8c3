//! Action selection
//!
//! Selection happens in two steps. The decision tree finds the
//! conventionally routed actions whose required route values are present
//! in the request, then [`ActionSelector`] evaluates their constraints in
//! stages of ascending order to pick exactly one.

mod selector;
mod tree;

pub use selector::*;
pub use tree::*;
