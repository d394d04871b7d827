//! Simulated deploy-time collaborators for Stackline.
//!
//! Nothing here talks to a cloud provider. The collaborators model the
//! behavior a deployed plan relies on, so the runtime contracts of the
//! task topology can be exercised in tests:
//!
//! - [`ImageRepository`](registry::ImageRepository): pushes and lifecycle expiry.
//! - [`ParameterStore`](parameters::ParameterStore): deploy-time secret values.
//! - [`TaskRunner`](task::TaskRunner): starts containers along the start graph.
//! - [`ServiceScheduler`](service::ServiceScheduler): keeps healthy instances running.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod backend;
pub mod logs;
pub mod parameters;
pub mod registry;
pub mod service;
pub mod task;
