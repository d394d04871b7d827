//! Static analysis of task specs and registries.
//!
//! Checks for dangling references, duplicate names, and broken start
//! dependencies before a stack is synthesized.

use std::collections::{BTreeSet, HashSet};

use stackline_common::error::{Result, StacklineError};
use stackline_common::types::LogicalId;

use crate::registry::Registry;
use crate::task::TaskSpec;

/// Validates a task spec for semantic correctness.
///
/// # Checks performed
///
/// 1. No duplicate container or volume names.
/// 2. At least one container is essential.
/// 3. Every mount point names a volume declared on the task, and no
///    container mounts two volumes at the same path.
/// 4. Every container logs to a sink in `known_sinks`.
/// 5. No two containers expose the same port.
/// 6. Start dependencies name existing containers, are acyclic, and only
///    wait for an exit (`COMPLETE`/`SUCCESS`) on non-essential containers.
///
/// # Errors
///
/// Returns an error if any semantic check fails.
pub fn validate_task(task: &TaskSpec, known_sinks: &BTreeSet<LogicalId>) -> Result<()> {
    tracing::info!(family = %task.family, "validating task spec");
    check_duplicate_names(task)?;
    check_essential_present(task)?;
    check_mount_points(task)?;
    check_log_sinks(task, known_sinks)?;
    check_ports(task)?;
    check_start_dependencies(task)?;
    Ok(())
}

/// Validates a registry's lifecycle configuration.
///
/// # Errors
///
/// Returns `StacklineError::Config` if no rule bounds every image.
pub fn validate_registry(registry: &Registry) -> Result<()> {
    if registry.has_terminal_rule() {
        Ok(())
    } else {
        Err(StacklineError::Config {
            message: format!(
                "registry \"{}\" has no lifecycle rule bounding every image",
                registry.name
            ),
        })
    }
}

fn check_duplicate_names(task: &TaskSpec) -> Result<()> {
    let mut seen = HashSet::new();
    for container in &task.containers {
        if !seen.insert(container.name.as_str()) {
            return Err(StacklineError::Duplicate {
                kind: "container",
                name: container.name.clone(),
            });
        }
    }
    let mut seen = HashSet::new();
    for volume in &task.volumes {
        if !seen.insert(volume.name.as_str()) {
            return Err(StacklineError::Duplicate {
                kind: "volume",
                name: volume.name.clone(),
            });
        }
    }
    Ok(())
}

fn check_essential_present(task: &TaskSpec) -> Result<()> {
    if task.containers.iter().any(|c| c.essential) {
        Ok(())
    } else {
        Err(StacklineError::Config {
            message: format!("task \"{}\" has no essential container", task.family),
        })
    }
}

fn check_mount_points(task: &TaskSpec) -> Result<()> {
    for container in &task.containers {
        let mut paths = HashSet::new();
        for mount in &container.mount_points {
            if task.volume(&mount.source_volume).is_none() {
                return Err(StacklineError::DanglingReference {
                    owner: format!("container \"{}\"", container.name),
                    kind: "volume",
                    target: mount.source_volume.clone(),
                });
            }
            if !paths.insert(mount.container_path.as_str()) {
                return Err(StacklineError::Config {
                    message: format!(
                        "container \"{}\" mounts more than one volume at \"{}\"",
                        container.name, mount.container_path
                    ),
                });
            }
        }
    }
    Ok(())
}

fn check_log_sinks(task: &TaskSpec, known_sinks: &BTreeSet<LogicalId>) -> Result<()> {
    for container in &task.containers {
        if !known_sinks.contains(&container.logging.sink) {
            return Err(StacklineError::DanglingReference {
                owner: format!("container \"{}\"", container.name),
                kind: "log sink",
                target: container.logging.sink.to_string(),
            });
        }
    }
    Ok(())
}

fn check_ports(task: &TaskSpec) -> Result<()> {
    let mut seen = HashSet::new();
    for container in &task.containers {
        for mapping in &container.port_mappings {
            if !seen.insert((mapping.container_port, mapping.protocol)) {
                return Err(StacklineError::Config {
                    message: format!(
                        "port {} is exposed by more than one container (second: \"{}\")",
                        mapping.container_port, container.name
                    ),
                });
            }
        }
    }
    Ok(())
}

fn check_start_dependencies(task: &TaskSpec) -> Result<()> {
    for container in &task.containers {
        for dep in &container.depends_on {
            if dep.container == container.name {
                return Err(StacklineError::Config {
                    message: format!("container \"{}\" depends on itself", container.name),
                });
            }
            let Some(target) = task.container(&dep.container) else {
                return Err(StacklineError::DanglingReference {
                    owner: format!("container \"{}\"", container.name),
                    kind: "container",
                    target: dep.container.clone(),
                });
            };
            if dep.condition.requires_exit() && target.essential {
                return Err(StacklineError::Config {
                    message: format!(
                        "container \"{}\" waits for {} of essential container \"{}\"",
                        container.name, dep.condition, target.name
                    ),
                });
            }
        }
    }
    let _ = task.start_order()?;
    Ok(())
}
