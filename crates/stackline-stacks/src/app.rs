//! Root provisioning context.
//!
//! Stacks are constructed with an explicit `&mut App` rather than
//! registering themselves in an implicit global tree.

use stackline_common::config::{EnvironmentConfig, StacklineConfig};
use stackline_common::constants::APP_NAME;
use stackline_common::error::{Result, StacklineError};
use stackline_common::types::StackId;

use crate::stack::Stack;

/// Every stack of one deployment, plus the target environment.
#[derive(Debug, Clone)]
pub struct App {
    name: String,
    environment: EnvironmentConfig,
    stacks: Vec<Stack>,
}

impl App {
    /// Creates an app without stacks.
    #[must_use]
    pub fn new(name: impl Into<String>, environment: EnvironmentConfig) -> Self {
        Self {
            name: name.into(),
            environment,
            stacks: Vec::new(),
        }
    }

    /// Creates an app targeting the configured environment.
    #[must_use]
    pub fn from_config(config: &StacklineConfig) -> Self {
        Self::new(APP_NAME, config.environment.clone())
    }

    /// App name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Target account and region.
    #[must_use]
    pub const fn environment(&self) -> &EnvironmentConfig {
        &self.environment
    }

    /// Adds a fully constructed stack.
    ///
    /// # Errors
    ///
    /// Returns `StacklineError::Duplicate` if a stack with the same name
    /// exists.
    pub fn add_stack(&mut self, stack: Stack) -> Result<StackId> {
        if self.stack(stack.id()).is_some() {
            return Err(StacklineError::Duplicate {
                kind: "stack",
                name: stack.id().to_string(),
            });
        }
        let id = stack.id().clone();
        tracing::info!(stack = %id, resources = stack.resources().len(), "stack added");
        self.stacks.push(stack);
        Ok(id)
    }

    /// Looks up a stack by name.
    #[must_use]
    pub fn stack(&self, id: &StackId) -> Option<&Stack> {
        self.stacks.iter().find(|s| s.id() == id)
    }

    /// Stacks in the order they were added.
    #[must_use]
    pub fn stacks(&self) -> &[Stack] {
        &self.stacks
    }
}
