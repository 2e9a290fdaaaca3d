//! Core value types and configuration for the trawl crawler.

pub mod config;
mod resource;

pub use config::Config;
pub use resource::{ProtocolKind, Reference, ReferencedResource, References, Resource, ResourceType};
