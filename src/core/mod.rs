//! Core logic: fields, templates, registry, resources, compilation, execution.

pub mod error;
pub mod executor;
pub mod fields;
pub mod parser;
pub mod planner;
pub mod registry;
pub mod resolver;
pub mod resource;
pub mod types;
