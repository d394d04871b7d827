//! Task specifications: containers that are scheduled together.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use stackline_common::error::{Result, StacklineError};
use stackline_common::types::LogicalId;

use crate::container::ContainerSpec;
use crate::graph::StartGraph;

/// CPU architecture the task runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CpuArchitecture {
    /// 64-bit ARM.
    Arm64,
    /// 64-bit x86.
    X86_64,
}

/// Operating system family of the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperatingSystem {
    /// Linux.
    Linux,
}

/// Platform the task is scheduled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuntimePlatform {
    /// CPU architecture.
    pub architecture: CpuArchitecture,
    /// Operating system family.
    pub os: OperatingSystem,
}

impl RuntimePlatform {
    /// Linux on 64-bit ARM.
    pub const LINUX_ARM64: Self = Self {
        architecture: CpuArchitecture::Arm64,
        os: OperatingSystem::Linux,
    };
}

/// A task-local volume, created empty for every task instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    /// Name referenced by mount points.
    pub name: String,
}

impl Volume {
    /// Declares an ephemeral volume.
    #[must_use]
    pub fn ephemeral(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A group of containers scheduled together with shared volumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Task family name.
    pub family: String,
    /// CPU units.
    pub cpu: u32,
    /// Memory limit in MiB.
    pub memory_mib: u32,
    /// Scheduling platform.
    pub runtime_platform: RuntimePlatform,
    /// Role the runtime uses to pull images and write logs.
    pub execution_role: LogicalId,
    /// Role the running containers use.
    pub task_role: LogicalId,
    /// Containers, in declaration order.
    pub containers: Vec<ContainerSpec>,
    /// Declared volumes.
    pub volumes: Vec<Volume>,
}

impl TaskSpec {
    /// Creates an empty task spec.
    ///
    /// # Errors
    ///
    /// Returns `StacklineError::Config` if `cpu` and `memory_mib` are not
    /// a supported combination.
    pub fn new(
        family: impl Into<String>,
        cpu: u32,
        memory_mib: u32,
        runtime_platform: RuntimePlatform,
        execution_role: LogicalId,
        task_role: LogicalId,
    ) -> Result<Self> {
        check_cpu_memory(cpu, memory_mib)?;
        Ok(Self {
            family: family.into(),
            cpu,
            memory_mib,
            runtime_platform,
            execution_role,
            task_role,
            containers: Vec::new(),
            volumes: Vec::new(),
        })
    }

    /// Declares a volume.
    ///
    /// # Errors
    ///
    /// Returns `StacklineError::Duplicate` if the name is taken.
    pub fn add_volume(&mut self, volume: Volume) -> Result<()> {
        if self.volume(&volume.name).is_some() {
            return Err(StacklineError::Duplicate {
                kind: "volume",
                name: volume.name,
            });
        }
        self.volumes.push(volume);
        Ok(())
    }

    /// Appends a container.
    ///
    /// # Errors
    ///
    /// Returns `StacklineError::Duplicate` if the name is taken.
    pub fn add_container(&mut self, container: ContainerSpec) -> Result<()> {
        if self.container(&container.name).is_some() {
            return Err(StacklineError::Duplicate {
                kind: "container",
                name: container.name,
            });
        }
        tracing::debug!(family = %self.family, container = %container.name, "container added");
        self.containers.push(container);
        Ok(())
    }

    /// Looks up a container by name.
    #[must_use]
    pub fn container(&self, name: &str) -> Option<&ContainerSpec> {
        self.containers.iter().find(|c| c.name == name)
    }

    /// Looks up a volume by name.
    #[must_use]
    pub fn volume(&self, name: &str) -> Option<&Volume> {
        self.volumes.iter().find(|v| v.name == name)
    }

    /// Containers whose exit does not stop the task.
    pub fn non_essential(&self) -> impl Iterator<Item = &ContainerSpec> {
        self.containers.iter().filter(|c| !c.essential)
    }

    /// The first essential container exposing a port.
    #[must_use]
    pub fn main_container(&self) -> Option<&ContainerSpec> {
        self.containers
            .iter()
            .find(|c| c.essential && c.primary_port().is_some())
    }

    /// Log sinks written by any container.
    #[must_use]
    pub fn log_sinks(&self) -> BTreeSet<&LogicalId> {
        self.containers.iter().map(|c| &c.logging.sink).collect()
    }

    /// Start-dependency graph of the containers.
    ///
    /// # Errors
    ///
    /// Returns an error if a dependency names an unknown container.
    pub fn start_graph(&self) -> Result<StartGraph> {
        StartGraph::from_containers(&self.containers)
    }

    /// Order in which containers may be started.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown dependencies or cycles.
    pub fn start_order(&self) -> Result<Vec<String>> {
        self.start_graph()?.resolve_order()
    }
}

impl fmt::Display for TaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} cpu, {} MiB, {} container(s))",
            self.family,
            self.cpu,
            self.memory_mib,
            self.containers.len()
        )
    }
}

/// Checks a cpu / memory pair against the serverless task sizes.
///
/// # Errors
///
/// Returns `StacklineError::Config` for unsupported pairs.
pub fn check_cpu_memory(cpu: u32, memory_mib: u32) -> Result<()> {
    let allowed = match cpu {
        256 => matches!(memory_mib, 512 | 1024 | 2048),
        512 => (1024..=4096).contains(&memory_mib) && memory_mib % 1024 == 0,
        1024 => (2048..=8192).contains(&memory_mib) && memory_mib % 1024 == 0,
        2048 => (4096..=16384).contains(&memory_mib) && memory_mib % 1024 == 0,
        4096 => (8192..=30720).contains(&memory_mib) && memory_mib % 1024 == 0,
        8192 => (16384..=61440).contains(&memory_mib) && memory_mib % 4096 == 0,
        16384 => (32768..=122_880).contains(&memory_mib) && memory_mib % 8192 == 0,
        _ => false,
    };
    if allowed {
        Ok(())
    } else {
        Err(StacklineError::Config {
            message: format!("unsupported task size: {cpu} cpu units with {memory_mib} MiB"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ImageRef;
    use crate::logs::LogConfiguration;

    fn task() -> TaskSpec {
        TaskSpec::new(
            "web",
            256,
            512,
            RuntimePlatform::LINUX_ARM64,
            LogicalId::new("ExecRole"),
            LogicalId::new("TaskRole"),
        )
        .expect("valid size")
    }

    fn container(name: &str) -> ContainerSpec {
        ContainerSpec::new(
            name,
            ImageRef::Uri {
                uri: "busybox".into(),
            },
            LogConfiguration::new(LogicalId::new("Logs"), name),
        )
    }

    #[test]
    fn supported_sizes_pass() {
        assert!(check_cpu_memory(256, 512).is_ok());
        assert!(check_cpu_memory(1024, 3072).is_ok());
        assert!(check_cpu_memory(16384, 122_880).is_ok());
    }

    #[test]
    fn unsupported_sizes_fail() {
        assert!(check_cpu_memory(256, 4096).is_err());
        assert!(check_cpu_memory(300, 512).is_err());
        assert!(check_cpu_memory(512, 1500).is_err());
    }

    #[test]
    fn duplicate_container_is_rejected() {
        let mut t = task();
        t.add_container(container("web")).expect("first");
        let msg = t.add_container(container("web")).unwrap_err().to_string();
        assert!(msg.contains("duplicate container name"), "got: {msg}");
    }

    #[test]
    fn duplicate_volume_is_rejected() {
        let mut t = task();
        t.add_volume(Volume::ephemeral("data")).expect("first");
        assert!(t.add_volume(Volume::ephemeral("data")).is_err());
    }

    #[test]
    fn main_container_needs_port_and_essential() {
        let mut t = task();
        let mut helper = container("helper");
        helper.essential = false;
        helper.port_mappings.push(crate::container::PortMapping::tcp(9000));
        t.add_container(helper).expect("helper");
        assert!(t.main_container().is_none());

        let mut web = container("web");
        web.port_mappings.push(crate::container::PortMapping::tcp(80));
        t.add_container(web).expect("web");
        assert_eq!(t.main_container().map(|c| c.name.as_str()), Some("web"));
        assert_eq!(t.non_essential().count(), 1);
    }
}
