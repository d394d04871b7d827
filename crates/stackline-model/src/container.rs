//! Container specifications.
//!
//! `essential` only controls failure tolerance: when an essential
//! container exits, the task stops. Start ordering is expressed
//! separately through [`ContainerDependency`] edges.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::logs::LogConfiguration;
use crate::reference::ResourceRef;

/// Where a container image comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageRef {
    /// A tag in a registry declared by some stack.
    Registry {
        /// Registry resource.
        repository: ResourceRef,
        /// Image tag.
        tag: String,
    },
    /// A fully qualified image URI.
    Uri {
        /// Image URI including tag.
        uri: String,
    },
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registry { repository, tag } => write!(f, "{repository}:{tag}"),
            Self::Uri { uri } => write!(f, "{uri}"),
        }
    }
}

/// A value injected into the container at deploy time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretRef {
    /// An entry of the external parameter store.
    Parameter {
        /// Parameter name.
        name: String,
    },
}

impl SecretRef {
    /// References a parameter store entry.
    #[must_use]
    pub fn parameter(name: impl Into<String>) -> Self {
        Self::Parameter { name: name.into() }
    }
}

/// Transport protocol of a port mapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP.
    #[default]
    Tcp,
    /// UDP.
    Udp,
}

/// A port the container accepts traffic on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortMapping {
    /// Port inside the container.
    pub container_port: u16,
    /// Transport protocol.
    pub protocol: Protocol,
}

impl PortMapping {
    /// A TCP mapping.
    #[must_use]
    pub const fn tcp(container_port: u16) -> Self {
        Self {
            container_port,
            protocol: Protocol::Tcp,
        }
    }
}

/// A task volume mounted into a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountPoint {
    /// Name of a volume declared on the task.
    pub source_volume: String,
    /// Path inside the container.
    pub container_path: String,
    /// Whether the container may only read the volume.
    pub read_only: bool,
}

/// State a dependency must reach before the dependent container starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DependencyCondition {
    /// The dependency has been started.
    Start,
    /// The dependency ran to completion, whatever its exit code.
    Complete,
    /// The dependency exited with code zero.
    Success,
    /// The dependency passed its health check.
    Healthy,
}

impl DependencyCondition {
    /// Returns `true` if the condition waits for the dependency to exit.
    #[must_use]
    pub const fn requires_exit(self) -> bool {
        matches!(self, Self::Complete | Self::Success)
    }
}

impl fmt::Display for DependencyCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "START"),
            Self::Complete => write!(f, "COMPLETE"),
            Self::Success => write!(f, "SUCCESS"),
            Self::Healthy => write!(f, "HEALTHY"),
        }
    }
}

/// A start-dependency edge from the owning container to `container`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerDependency {
    /// Container that must reach `condition` first.
    pub container: String,
    /// Required state.
    pub condition: DependencyCondition,
}

/// One container of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Name, unique within the task.
    pub name: String,
    /// Image to run.
    pub image: ImageRef,
    /// Whether the task stops when this container exits.
    pub essential: bool,
    /// Command override; empty keeps the image default.
    pub command: Vec<String>,
    /// Literal environment variables.
    pub environment: BTreeMap<String, String>,
    /// Environment variables resolved from external stores at deploy time.
    pub secrets: BTreeMap<String, SecretRef>,
    /// Exposed ports.
    pub port_mappings: Vec<PortMapping>,
    /// Mounted task volumes.
    pub mount_points: Vec<MountPoint>,
    /// Log routing.
    pub logging: LogConfiguration,
    /// Containers that must reach a state before this one starts.
    pub depends_on: Vec<ContainerDependency>,
}

impl ContainerSpec {
    /// Creates an essential container with no overrides.
    #[must_use]
    pub fn new(name: impl Into<String>, image: ImageRef, logging: LogConfiguration) -> Self {
        Self {
            name: name.into(),
            image,
            essential: true,
            command: Vec::new(),
            environment: BTreeMap::new(),
            secrets: BTreeMap::new(),
            port_mappings: Vec::new(),
            mount_points: Vec::new(),
            logging,
            depends_on: Vec::new(),
        }
    }

    /// First declared port, used as the load balancer target.
    #[must_use]
    pub fn primary_port(&self) -> Option<u16> {
        self.port_mappings.first().map(|p| p.container_port)
    }

    /// Mount of `volume`, if the container mounts it.
    #[must_use]
    pub fn mount_of(&self, volume: &str) -> Option<&MountPoint> {
        self.mount_points.iter().find(|m| m.source_volume == volume)
    }

    /// Condition this container waits for on `other`, if any.
    #[must_use]
    pub fn dependency_on(&self, other: &str) -> Option<DependencyCondition> {
        self.depends_on
            .iter()
            .find(|d| d.container == other)
            .map(|d| d.condition)
    }
}

#[cfg(test)]
mod tests {
    use stackline_common::types::LogicalId;

    use super::*;

    fn spec() -> ContainerSpec {
        ContainerSpec::new(
            "web",
            ImageRef::Uri {
                uri: "nginx:1".into(),
            },
            LogConfiguration::new(LogicalId::new("Logs"), "Web"),
        )
    }

    #[test]
    fn new_container_is_essential_without_overrides() {
        let c = spec();
        assert!(c.essential);
        assert!(c.command.is_empty());
        assert!(c.primary_port().is_none());
    }

    #[test]
    fn primary_port_is_first_mapping() {
        let mut c = spec();
        c.port_mappings.push(PortMapping::tcp(80));
        c.port_mappings.push(PortMapping::tcp(8080));
        assert_eq!(c.primary_port(), Some(80));
    }

    #[test]
    fn dependency_lookup() {
        let mut c = spec();
        c.depends_on.push(ContainerDependency {
            container: "init".into(),
            condition: DependencyCondition::Success,
        });
        assert_eq!(c.dependency_on("init"), Some(DependencyCondition::Success));
        assert_eq!(c.dependency_on("sidecar"), None);
    }

    #[test]
    fn condition_serializes_uppercase() {
        let json = serde_json::to_string(&DependencyCondition::Success).expect("serialize");
        assert_eq!(json, "\"SUCCESS\"");
        assert!(DependencyCondition::Success.requires_exit());
        assert!(!DependencyCondition::Start.requires_exit());
    }
}
