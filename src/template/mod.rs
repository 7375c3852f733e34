//! Infrastructure templates for the Halldyll function deployment system.
//!
//! This module provides:
//! - A typed template document serialized once
//! - The route compiler producing the API resource graph
//! - Trigger resource emission
//! - Synthesis of the base, full and staged templates

mod document;
mod routes;
mod synth;
mod triggers;

pub use document::{FORMAT_VERSION, Resource, Template, attribute, kinds, reference};
pub use routes::{
    CORS_ALLOWED_HEADERS, MethodNode, MethodTarget, NodeId, ROOT, ResourceGraph, ResourceNode,
    compile_routes,
};
pub use synth::{API_ID, ROLE_ID, STAGE_ID, TemplateSynthesizer};
