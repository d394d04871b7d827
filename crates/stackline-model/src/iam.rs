//! Roles assumed by the container runtime and by running containers.

use std::fmt;

use serde::{Deserialize, Serialize};
use stackline_common::error::{Result, StacklineError};

/// Service allowed to assume a role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServicePrincipal(String);

impl ServicePrincipal {
    /// Creates a principal from its service host name.
    #[must_use]
    pub fn new(service: impl Into<String>) -> Self {
        Self(service.into())
    }

    /// Returns the service host name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A provider-managed policy referenced by name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ManagedPolicy(String);

impl ManagedPolicy {
    /// References a managed policy by its name (including any path).
    #[must_use]
    pub fn from_managed_name(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the policy name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Returns the policy's resource identifier.
    #[must_use]
    pub fn arn(&self) -> String {
        format!("arn:aws:iam::aws:policy/{}", self.0)
    }
}

impl fmt::Display for ManagedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An identity with a trust principal and attached managed policies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Service trusted to assume the role.
    pub assumed_by: ServicePrincipal,
    /// Attached policies, in attachment order, without duplicates.
    pub managed_policies: Vec<ManagedPolicy>,
}

impl Role {
    /// Creates a role without policies.
    #[must_use]
    pub const fn new(assumed_by: ServicePrincipal) -> Self {
        Self {
            assumed_by,
            managed_policies: Vec::new(),
        }
    }

    /// Attaches a policy; attaching the same policy twice is a no-op.
    #[must_use]
    pub fn with_managed_policy(mut self, policy: ManagedPolicy) -> Self {
        if !self.has_policy(&policy) {
            self.managed_policies.push(policy);
        }
        self
    }

    /// Returns `true` if `policy` is attached.
    #[must_use]
    pub fn has_policy(&self, policy: &ManagedPolicy) -> bool {
        self.managed_policies.contains(policy)
    }
}

/// Checks that the execution and task roles share no policy.
///
/// # Errors
///
/// Returns `StacklineError::Config` naming the shared policies.
pub fn ensure_disjoint(execution: &Role, task: &Role) -> Result<()> {
    let shared: Vec<String> = task
        .managed_policies
        .iter()
        .filter(|p| execution.has_policy(p))
        .map(ToString::to_string)
        .collect();
    if shared.is_empty() {
        Ok(())
    } else {
        Err(StacklineError::Config {
            message: format!(
                "execution and task roles must not share policies: {}",
                shared.join(", ")
            ),
        })
    }
}
