pub mod resource;

pub use resource::{format_group_kind, Resource, ResourceKind};
