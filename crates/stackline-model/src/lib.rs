//! # stackline-model
//!
//! Typed resource nodes and the rules that hold between them.
//!
//! Handles:
//! - **Reference**: Late-bound handles to resources owned by other stacks.
//! - **Registry**: Image registries and their lifecycle (retention) rules.
//! - **IAM**: Execution and task roles with managed policies.
//! - **Logs**: Log sinks and per-container log routing.
//! - **Container / Task**: Container specs, shared volumes and task specs.
//! - **Graph**: The start-dependency DAG over a task's containers.
//! - **Validator**: Referential integrity checks before synthesis.
//! - **Service**: The load-balanced wrapper that runs a task spec.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod container;
pub mod graph;
pub mod iam;
pub mod logs;
pub mod reference;
pub mod registry;
pub mod resource;
pub mod service;
pub mod task;
pub mod validator;
