//! Domain primitive types used across the Stackline workspace.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::constants::LOGICAL_ID_HASH_BYTES;

/// Name of a stack inside an app.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StackId(String);

impl StackId {
    /// Creates a stack ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable identifier of a resource within its stack.
///
/// Derived from the stack name and the resource's local name, so the same
/// declaration always yields the same identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LogicalId(String);

impl LogicalId {
    /// Wraps an already-derived logical ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derives the logical ID of `local` declared in `stack`.
    ///
    /// The result is `<Stack><Local><HASH>` where non-alphanumeric
    /// characters are dropped and `HASH` is the leading bytes of
    /// SHA-256 over `stack/local`, rendered as uppercase hex.
    #[must_use]
    pub fn derive(stack: &StackId, local: &str) -> Self {
        let digest = Sha256::digest(format!("{}/{local}", stack.as_str()).as_bytes());
        let hash: String = digest
            .iter()
            .take(LOGICAL_ID_HASH_BYTES)
            .map(|b| format!("{b:02X}"))
            .collect();
        Self(format!(
            "{}{}{hash}",
            alphanumeric(stack.as_str()),
            alphanumeric(local)
        ))
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn alphanumeric(s: &str) -> String {
    s.chars().filter(char::is_ascii_alphanumeric).collect()
}

/// Whether image tags in a registry may be overwritten.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagMutability {
    /// A tag can be moved to a newer image.
    #[default]
    Mutable,
    /// A tag, once pushed, always names the same image.
    Immutable,
}

impl fmt::Display for TagMutability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mutable => write!(f, "MUTABLE"),
            Self::Immutable => write!(f, "IMMUTABLE"),
        }
    }
}

/// What happens to a resource when its owning stack is destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalPolicy {
    /// The resource is deleted together with the stack.
    Destroy,
    /// The resource outlives the stack and must be removed by hand.
    Retain,
}

impl fmt::Display for RemovalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Destroy => write!(f, "destroy"),
            Self::Retain => write!(f, "retain"),
        }
    }
}

/// Lifecycle state of a container inside a simulated task instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerState {
    /// Waiting for its start dependencies.
    Pending,
    /// Container is actively running.
    Running,
    /// Container process exited with the given code.
    Exited {
        /// Process exit code.
        code: i32,
    },
    /// Container was never started.
    Skipped,
}

impl ContainerState {
    /// Returns `true` if the container exited with code zero.
    #[must_use]
    pub const fn succeeded(self) -> bool {
        matches!(self, Self::Exited { code: 0 })
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Exited { code } => write!(f, "exited({code})"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logical_id_is_stable() {
        let stack = StackId::new("AppStack");
        let a = LogicalId::derive(&stack, "TaskDef");
        let b = LogicalId::derive(&stack, "TaskDef");
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("AppStackTaskDef"), "got: {a}");
        assert_eq!(a.as_str().len(), "AppStackTaskDef".len() + 8);
    }

    #[test]
    fn logical_id_differs_per_stack() {
        let a = LogicalId::derive(&StackId::new("One"), "Role");
        let b = LogicalId::derive(&StackId::new("Two"), "Role");
        assert_ne!(a.as_str()[a.as_str().len() - 8..], b.as_str()[b.as_str().len() - 8..]);
    }

    #[test]
    fn logical_id_strips_separators() {
        let id = LogicalId::derive(&StackId::new("my-stack"), "log/group");
        assert!(id.as_str().starts_with("mystackloggroup"), "got: {id}");
    }

    #[test]
    fn container_state_success_only_for_zero_exit() {
        assert!(ContainerState::Exited { code: 0 }.succeeded());
        assert!(!ContainerState::Exited { code: 1 }.succeeded());
        assert!(!ContainerState::Running.succeeded());
    }

    #[test]
    fn tag_mutability_deserializes_lowercase() {
        let m: TagMutability = serde_json::from_str("\"immutable\"").expect("parse");
        assert_eq!(m, TagMutability::Immutable);
        assert_eq!(m.to_string(), "IMMUTABLE");
    }
}
