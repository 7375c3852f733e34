// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Halldyll Deploy Functions
//!
//! A versioned, interruptible deployment orchestrator for serverless
//! functions and their HTTP routes.
//!
//! ## Overview
//!
//! Halldyll turns a declarative project file into a live application:
//!
//! - Hash the function sources and configuration and deploy only on change
//! - Package every function and publish it as a numbered version (`v1`, `v2`, ...)
//! - Compile URL routes into a tree of API resources with CORS preflights
//! - Smoke-test every function before the new version goes live
//! - Cancel or undo an in-flight update on Ctrl-C
//! - Roll back to any stored version
//!
//! ## Architecture
//!
//! A deploy is a sequence of stages over one **deployment session**:
//!
//! 1. **Bucket and stack**: created on first deploy, checked for ownership after
//! 2. **Checksum**: the digest is compared with the active version in the manifest
//! 3. **Package and apply**: archives are built and the full template applied
//! 4. **Upload and ping**: archives are uploaded and every function smoke-tested
//! 5. **Publish**: the API stage is deployed and the manifest persisted
//!
//! ## Modules
//!
//! - [`config`]: Configuration parsing and validation
//! - [`package`]: Source checksums and function archives
//! - [`template`]: Route compilation and template synthesis
//! - [`state`]: Manifest and blob stores (local, S3)
//! - [`remote`]: Control plane client, stack waiter and logs
//! - [`pipeline`]: Deploy pipeline, interrupts, rollback and destroy
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! project:
//!   name: shop
//!   region: eu-west-1
//!   bucket: shop-deploys
//!
//! functions:
//!   default:
//!     memory: 256
//!   users:
//!     handler: index.handler
//!
//! routes:
//!   default:
//!     cors: true
//!   paths:
//!     /users/{id}:
//!       GET:
//!         handler: users
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod package;
pub mod pipeline;
pub mod remote;
pub mod state;
pub mod template;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigParser, ConfigValidator, DeployConfig};
pub use error::{HalldyllError, Result};
pub use pipeline::{
    DeploymentSession, Destroy, InterruptController, Pipeline, PipelineState, Rollback,
};
pub use remote::{ControlPlane, HttpControlPlane, LogReader, StackWaiter};
pub use state::{BlobStore, DeploymentRepository, FsBlobStore, Manifest, S3BlobStore};
pub use template::TemplateSynthesizer;
