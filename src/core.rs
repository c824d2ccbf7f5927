//! Provides types that represent the user's declarations: targets, roles, and resources.

pub mod graph;
pub mod resource;
pub mod role;

#[doc(inline)]
pub use graph::{Target, TargetRegistry};

#[doc(inline)]
pub use resource::Resource;

#[doc(inline)]
pub use role::Role;
