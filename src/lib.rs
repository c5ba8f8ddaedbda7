// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![forbid(unsafe_code)]               // Unsafe code is forbidden
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
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Halldyll Infra
//!
//! Session-scoped infrastructure provisioning driven by an external
//! Terraform-compatible tool.
//!
//! ## Overview
//!
//! A caller describes an application's infrastructure needs in a small
//! descriptor. The orchestrator:
//!
//! - Validates the descriptor and renders it into configuration text
//! - Gives every session its own working directory
//! - Runs `init`, `plan`, `apply` and `destroy` in that directory
//! - Streams the tool's output live while recording it per session
//!
//! ## Architecture
//!
//! 1. **Descriptor**: JSON or YAML, rendered deterministically to `main.tf`
//! 2. **Session**: identifier, working directory, status, captured logs
//! 3. **Lifecycle controller**: enforces operation order and runs the tool
//! 4. **Feed**: per-operation event stream ending in one terminal event
//!
//! ## Modules
//!
//! - [`config`]: Descriptor parsing, validation, rendering and settings
//! - [`session`]: Session registry and working directory layout
//! - [`process`]: External tool supervision
//! - [`stream`]: Operation feeds
//! - [`lifecycle`]: State machine and controller
//! - [`server`]: HTTP surface with server-sent event feeds
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! name: orders
//! environment:
//!   region: eu-west-1
//!   target: container
//! services:
//!   database: true
//!   cache: true
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod process;
pub mod server;
pub mod session;
pub mod stream;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigHasher, ConfigRenderer, Descriptor, DescriptorParser, DescriptorValidator, Settings};
pub use error::{ErrorKind, InfraError, Result};
pub use lifecycle::{InitRequest, LifecycleController};
pub use process::{CommandRunner, OutputSink, ProcessSupervisor};
pub use server::{router, serve, AppState};
pub use session::{Operation, SessionSnapshot, SessionStatus, SessionStore};
pub use stream::{EventFeed, FeedEvent};
