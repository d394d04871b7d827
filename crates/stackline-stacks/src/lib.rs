//! # stackline-stacks
//!
//! Declares stacks and turns them into a provisioning plan.
//!
//! Provides the main entry points:
//! - [`App`](app::App): Root provisioning context every stack is added to.
//! - [`RegistryStack`](registry_stack::RegistryStack): Owns the image registry.
//! - [`ServiceStack`](service_stack::ServiceStack): Builds the task topology and the
//!   load-balanced service around it.
//! - [`synthesize`](synth::synthesize): Resolves cross-stack references and emits a
//!   [`Plan`](synth::Plan).
//!
//! # Example
//!
//! ```rust,no_run
//! use stackline_common::config::StacklineConfig;
//! use stackline_stacks::app::App;
//! use stackline_stacks::registry_stack::{RegistryStack, RegistryStackProps};
//! use stackline_stacks::service_stack::{ServiceStack, ServiceStackProps};
//!
//! # fn main() -> stackline_common::error::Result<()> {
//! let config = StacklineConfig::default();
//! let mut app = App::from_config(&config);
//! let props = RegistryStackProps::from(&config.registry);
//! let registry = RegistryStack::new(&mut app, "ECRStack", props)?;
//! let _service = ServiceStack::new(
//!     &mut app,
//!     "AppStack",
//!     ServiceStackProps::from_config(registry.repository(), &config),
//! )?;
//! let plan = stackline_stacks::synth::synthesize(&app)?;
//! # let _ = plan;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod app;
pub mod builder;
pub mod registry_stack;
pub mod service_stack;
pub mod stack;
pub mod stack_graph;
pub mod synth;
pub mod topology;
