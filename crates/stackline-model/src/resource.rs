//! Typed resource nodes and the references between them.

use std::fmt;

use serde::{Deserialize, Serialize};
use stackline_common::types::{LogicalId, RemovalPolicy};

use crate::container::ImageRef;
use crate::iam::Role;
use crate::logs::LogSink;
use crate::reference::ResourceRef;
use crate::registry::Registry;
use crate::service::ServiceWrapper;
use crate::task::TaskSpec;

/// A declared unit of infrastructure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resource {
    /// Image registry.
    Registry(Registry),
    /// Identity with managed policies.
    Role(Role),
    /// Log group.
    LogSink(LogSink),
    /// Task specification.
    TaskSpec(TaskSpec),
    /// Load-balanced service.
    Service(ServiceWrapper),
}

/// Kind tag of a [`Resource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// See [`Resource::Registry`].
    Registry,
    /// See [`Resource::Role`].
    Role,
    /// See [`Resource::LogSink`].
    LogSink,
    /// See [`Resource::TaskSpec`].
    TaskSpec,
    /// See [`Resource::Service`].
    Service,
}

impl ResourceKind {
    /// Human-readable kind name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Registry => "registry",
            Self::Role => "role",
            Self::LogSink => "log sink",
            Self::TaskSpec => "task spec",
            Self::Service => "service",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Model types that can be declared as a [`Resource`].
///
/// Lets typed handles check the kind of the resource they point at.
pub trait ResourceType {
    /// Kind tag of resources of this type.
    const KIND: ResourceKind;
}

impl ResourceType for Registry {
    const KIND: ResourceKind = ResourceKind::Registry;
}

impl ResourceType for Role {
    const KIND: ResourceKind = ResourceKind::Role;
}

impl ResourceType for LogSink {
    const KIND: ResourceKind = ResourceKind::LogSink;
}

impl ResourceType for TaskSpec {
    const KIND: ResourceKind = ResourceKind::TaskSpec;
}

impl ResourceType for ServiceWrapper {
    const KIND: ResourceKind = ResourceKind::Service;
}

/// An edge from one resource to another.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Reference {
    /// A resource in the same stack.
    Local(LogicalId),
    /// A resource owned by another stack.
    Imported(ResourceRef),
}

impl Resource {
    /// Kind tag.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::Registry(_) => ResourceKind::Registry,
            Self::Role(_) => ResourceKind::Role,
            Self::LogSink(_) => ResourceKind::LogSink,
            Self::TaskSpec(_) => ResourceKind::TaskSpec,
            Self::Service(_) => ResourceKind::Service,
        }
    }

    /// What happens to the resource when its stack is destroyed.
    ///
    /// Registries outlive redeploys; everything else is recreated.
    #[must_use]
    pub const fn removal_policy(&self) -> RemovalPolicy {
        match self {
            Self::Registry(_) => RemovalPolicy::Retain,
            Self::LogSink(sink) => sink.removal_policy,
            Self::Role(_) | Self::TaskSpec(_) | Self::Service(_) => RemovalPolicy::Destroy,
        }
    }

    /// Every resource this one refers to, deduplicated and sorted.
    #[must_use]
    pub fn references(&self) -> Vec<Reference> {
        let mut refs = match self {
            Self::Registry(_) | Self::Role(_) | Self::LogSink(_) => Vec::new(),
            Self::Service(service) => vec![Reference::Local(service.task.clone())],
            Self::TaskSpec(task) => {
                let mut refs = vec![
                    Reference::Local(task.execution_role.clone()),
                    Reference::Local(task.task_role.clone()),
                ];
                for container in &task.containers {
                    refs.push(Reference::Local(container.logging.sink.clone()));
                    if let ImageRef::Registry { repository, .. } = &container.image {
                        refs.push(Reference::Imported(repository.clone()));
                    }
                }
                refs
            }
        };
        refs.sort();
        refs.dedup();
        refs
    }
}

/// A resource declared in a stack under a stable logical ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceNode {
    /// Stable identifier within the stack.
    pub logical_id: LogicalId,
    /// Name the resource was declared with.
    pub local_name: String,
    /// The resource itself.
    pub resource: Resource,
}
