//! `scopebridge-registry` – the command surface of the bridge.
//!
//! # Modules
//!
//! - [`descriptor`] – [`CommandDescriptor`] and its constructors.
//! - [`dispatcher`] – per-command invocation with correlation ids.
//! - [`registry`] – the command table and name lookup.

pub mod descriptor;
pub mod dispatcher;
pub mod registry;

pub use descriptor::{CommandDescriptor, Route, classify_raw};
pub use dispatcher::CommandDispatcher;
pub use registry::{CommandRegistry, command_table};
