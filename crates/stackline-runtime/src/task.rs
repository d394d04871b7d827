//! Task instances and the runner that starts their containers.
//!
//! The runner resolves images and secrets before anything starts, then
//! walks the start graph: a container starts only once every dependency
//! has reached its condition. A dependency that can no longer reach its
//! condition (for example an init container that exited non-zero under a
//! `SUCCESS` edge) marks the dependent as skipped. When an essential
//! container exits or is skipped the task stops.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stackline_common::error::{Result, StacklineError};
use stackline_common::types::ContainerState;
use stackline_model::container::{ContainerSpec, DependencyCondition, ImageRef};
use stackline_model::reference::ResourceRef;
use stackline_model::task::TaskSpec;
use uuid::Uuid;

use crate::backend::{ContainerBackend, ContainerLaunch};
use crate::logs::{self, LogStore};
use crate::parameters::ParameterStore;
use crate::registry::ImageRepository;

/// Exit code recorded for containers the backend refused to start.
pub const START_FAILURE_EXIT_CODE: i32 = -1;

/// Deploy-time collaborators a task launch reads from.
#[derive(Debug, Clone, Copy)]
pub struct DeployContext<'a> {
    /// Repositories by the registry resource they implement.
    pub repositories: &'a BTreeMap<ResourceRef, ImageRepository>,
    /// Store backing container secrets.
    pub parameters: &'a ParameterStore,
}

/// Lifecycle status of a task instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Some essential container has not started yet.
    Provisioning,
    /// Every essential container is running.
    Running,
    /// The task stopped.
    Stopped {
        /// Why the task stopped.
        reason: String,
    },
}

/// Something that happened to a task instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskEventKind {
    /// Container started.
    Started,
    /// Container exited.
    Exited {
        /// Exit code.
        code: i32,
    },
    /// Backend refused to start the container.
    StartFailed {
        /// Backend message.
        message: String,
    },
    /// Container will never start.
    Skipped {
        /// Unsatisfiable dependency.
        dependency: String,
        /// Condition it could not reach.
        condition: DependencyCondition,
    },
    /// Task stopped.
    TaskStopped {
        /// Why the task stopped.
        reason: String,
    },
}

/// A timestamped [`TaskEventKind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEvent {
    /// When the event happened.
    pub at: DateTime<Utc>,
    /// Container concerned, if any.
    pub container: Option<String>,
    /// What happened.
    pub kind: TaskEventKind,
}

/// One running copy of a task spec.
#[derive(Debug, Clone)]
pub struct TaskInstance {
    id: Uuid,
    family: String,
    status: TaskStatus,
    states: BTreeMap<String, ContainerState>,
    events: Vec<TaskEvent>,
    launches: HashMap<String, ContainerLaunch>,
}

impl TaskInstance {
    /// Instance ID.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Family of the task spec this instance runs.
    #[must_use]
    pub fn family(&self) -> &str {
        &self.family
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> &TaskStatus {
        &self.status
    }

    /// Returns `true` while the task has not stopped.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !matches!(self.status, TaskStatus::Stopped { .. })
    }

    /// Current state of `container`.
    #[must_use]
    pub fn state(&self, container: &str) -> Option<ContainerState> {
        self.states.get(container).copied()
    }

    /// Every event, oldest first.
    #[must_use]
    pub fn events(&self) -> &[TaskEvent] {
        &self.events
    }

    /// Returns `true` if `container` was ever started.
    #[must_use]
    pub fn ever_started(&self, container: &str) -> bool {
        self.events
            .iter()
            .any(|e| e.kind == TaskEventKind::Started && e.container.as_deref() == Some(container))
    }

    /// Names of containers in the order they started.
    #[must_use]
    pub fn start_sequence(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter(|e| e.kind == TaskEventKind::Started)
            .filter_map(|e| e.container.as_deref())
            .collect()
    }

    fn record(&mut self, container: Option<&str>, kind: TaskEventKind) {
        self.events.push(TaskEvent {
            at: Utc::now(),
            container: container.map(str::to_string),
            kind,
        });
    }
}

enum Readiness {
    Ready,
    Waiting,
    Never {
        dependency: String,
        condition: DependencyCondition,
    },
}

/// Starts and supervises task instances on a [`ContainerBackend`].
#[derive(Debug)]
pub struct TaskRunner<B> {
    backend: B,
    logs: LogStore,
}

impl<B: ContainerBackend> TaskRunner<B> {
    /// Creates a runner on `backend`.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            logs: LogStore::new(),
        }
    }

    /// The backend.
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Log events written so far.
    pub const fn logs(&self) -> &LogStore {
        &self.logs
    }

    /// Launches an instance of `spec` and advances it as far as possible.
    ///
    /// # Errors
    ///
    /// Returns `StacklineError::Deploy` if an image tag or a secret cannot
    /// be resolved, and a structural error if the start graph is invalid.
    /// Nothing is started in either case.
    pub fn launch(&mut self, spec: &TaskSpec, ctx: DeployContext<'_>) -> Result<TaskInstance> {
        let _ = spec.start_order()?;
        let id = Uuid::new_v4();
        let launches = spec
            .containers
            .iter()
            .map(|c| Ok((c.name.clone(), prepare(id, c, ctx)?)))
            .collect::<Result<HashMap<_, _>>>()?;

        let mut instance = TaskInstance {
            id,
            family: spec.family.clone(),
            status: TaskStatus::Provisioning,
            states: spec
                .containers
                .iter()
                .map(|c| (c.name.clone(), ContainerState::Pending))
                .collect(),
            events: Vec::new(),
            launches,
        };
        tracing::info!(task = %id, family = %spec.family, "task launched");
        self.advance(&mut instance, spec)?;
        Ok(instance)
    }

    /// Polls running containers and starts every container whose
    /// dependencies are met, until nothing changes.
    ///
    /// # Errors
    ///
    /// Returns an error if the start graph of `spec` is invalid.
    pub fn advance(&mut self, instance: &mut TaskInstance, spec: &TaskSpec) -> Result<()> {
        if !instance.is_active() {
            return Ok(());
        }
        let order = spec.start_order()?;
        loop {
            let mut changed = self.poll_running(instance, spec);
            if let Some(reason) = essential_ended(instance, spec) {
                self.stop(instance, &reason);
                return Ok(());
            }
            for name in &order {
                if instance.state(name) != Some(ContainerState::Pending) {
                    continue;
                }
                let Some(container) = spec.container(name) else {
                    continue;
                };
                match readiness(container, instance) {
                    Readiness::Waiting => continue,
                    Readiness::Ready => self.start_container(instance, container),
                    Readiness::Never {
                        dependency,
                        condition,
                    } => {
                        tracing::debug!(
                            task = %instance.id,
                            container = %name,
                            %dependency,
                            %condition,
                            "container skipped"
                        );
                        let _ = instance.states.insert(name.clone(), ContainerState::Skipped);
                        instance.record(
                            Some(name),
                            TaskEventKind::Skipped {
                                dependency,
                                condition,
                            },
                        );
                    }
                }
                changed = true;
                if container.essential && has_ended(instance, name) {
                    break;
                }
            }
            if !changed {
                break;
            }
        }
        self.update_status(instance, spec);
        Ok(())
    }

    /// Stops every running container of `instance`.
    pub fn stop(&mut self, instance: &mut TaskInstance, reason: &str) {
        if !instance.is_active() {
            return;
        }
        let running: Vec<String> = instance
            .states
            .iter()
            .filter(|(_, s)| **s == ContainerState::Running)
            .map(|(n, _)| n.clone())
            .collect();
        for name in running {
            self.backend.stop(instance.id, &name);
            let state = self.backend.poll(instance.id, &name);
            let _ = instance.states.insert(name, state);
        }
        instance.status = TaskStatus::Stopped {
            reason: reason.to_string(),
        };
        instance.record(
            None,
            TaskEventKind::TaskStopped {
                reason: reason.to_string(),
            },
        );
        tracing::info!(task = %instance.id, reason, "task stopped");
    }

    fn poll_running(&mut self, instance: &mut TaskInstance, spec: &TaskSpec) -> bool {
        let mut changed = false;
        for container in &spec.containers {
            if instance.state(&container.name) != Some(ContainerState::Running) {
                continue;
            }
            let state = self.backend.poll(instance.id, &container.name);
            if let ContainerState::Exited { code } = state {
                let _ = instance.states.insert(container.name.clone(), state);
                instance.record(Some(&container.name), TaskEventKind::Exited { code });
                self.write_log(instance, container, &format!("exited with code {code}"));
                changed = true;
            }
        }
        changed
    }

    fn start_container(&mut self, instance: &mut TaskInstance, container: &ContainerSpec) {
        let Some(launch) = instance.launches.get(&container.name).cloned() else {
            return;
        };
        match self.backend.start(&launch) {
            Ok(()) => {
                let _ = instance
                    .states
                    .insert(container.name.clone(), ContainerState::Running);
                instance.record(Some(&container.name), TaskEventKind::Started);
                self.write_log(instance, container, &format!("started from {}", launch.image));
            }
            Err(err) => {
                tracing::warn!(
                    task = %instance.id,
                    container = %container.name,
                    error = %err,
                    "start failed"
                );
                let _ = instance.states.insert(
                    container.name.clone(),
                    ContainerState::Exited {
                        code: START_FAILURE_EXIT_CODE,
                    },
                );
                instance.record(
                    Some(&container.name),
                    TaskEventKind::StartFailed {
                        message: err.to_string(),
                    },
                );
            }
        }
    }

    fn update_status(&mut self, instance: &mut TaskInstance, spec: &TaskSpec) {
        if let Some(reason) = essential_ended(instance, spec) {
            self.stop(instance, &reason);
            return;
        }
        if spec
            .containers
            .iter()
            .filter(|c| c.essential)
            .all(|c| instance.state(&c.name) == Some(ContainerState::Running))
        {
            instance.status = TaskStatus::Running;
        }
    }

    fn write_log(&mut self, instance: &TaskInstance, container: &ContainerSpec, message: &str) {
        let stream = logs::stream_name(
            &container.logging.stream_prefix,
            &container.name,
            &instance.id.to_string(),
        );
        self.logs
            .append(container.logging.sink.as_str(), &stream, message);
    }
}

fn has_ended(instance: &TaskInstance, container: &str) -> bool {
    matches!(
        instance.state(container),
        Some(ContainerState::Exited { .. } | ContainerState::Skipped)
    )
}

/// Stop reason for the first essential container that exited or was
/// skipped.
fn essential_ended(instance: &TaskInstance, spec: &TaskSpec) -> Option<String> {
    let container = spec
        .containers
        .iter()
        .find(|c| c.essential && has_ended(instance, &c.name))?;
    Some(match instance.state(&container.name) {
        Some(ContainerState::Skipped) => {
            format!("essential container \"{}\" could not start", container.name)
        }
        state => format!(
            "essential container \"{}\" {}",
            container.name,
            state.map_or_else(|| "is unknown".to_string(), |s| s.to_string())
        ),
    })
}

fn readiness(container: &ContainerSpec, instance: &TaskInstance) -> Readiness {
    use ContainerState::{Exited, Pending, Running, Skipped};
    use DependencyCondition::{Complete, Healthy, Start, Success};

    let mut ready = true;
    for dep in &container.depends_on {
        let state = instance.state(&dep.container).unwrap_or(Skipped);
        let (met, possible) = match (dep.condition, state) {
            (_, Skipped) | (Healthy, Exited { .. }) => (false, false),
            (_, Pending) | (Complete | Success, Running) => (false, true),
            (Start | Healthy, Running) | (Start | Complete, Exited { .. }) => (true, true),
            (Success, Exited { code }) => (code == 0, code == 0),
        };
        if !possible {
            return Readiness::Never {
                dependency: dep.container.clone(),
                condition: dep.condition,
            };
        }
        ready &= met;
    }
    if ready {
        Readiness::Ready
    } else {
        Readiness::Waiting
    }
}

fn prepare(
    task_id: Uuid,
    container: &ContainerSpec,
    ctx: DeployContext<'_>,
) -> Result<ContainerLaunch> {
    let image = match &container.image {
        ImageRef::Uri { uri } => uri.clone(),
        ImageRef::Registry { repository, tag } => {
            let repo = ctx
                .repositories
                .get(repository)
                .ok_or_else(|| StacklineError::Deploy {
                    message: format!(
                        "container \"{}\" pulls from unknown repository {repository}",
                        container.name
                    ),
                })?;
            let image = repo.resolve(tag).ok_or_else(|| StacklineError::Deploy {
                message: format!(
                    "container \"{}\": tag \"{tag}\" not found in repository \"{}\"",
                    container.name,
                    repo.name()
                ),
            })?;
            format!("{}@{}", repo.name(), image.digest)
        }
    };
    let mut environment = container.environment.clone();
    for (key, secret) in &container.secrets {
        let value = ctx.parameters.resolve(secret)?;
        let _ = environment.insert(key.clone(), value.to_string());
    }
    Ok(ContainerLaunch {
        task_id,
        name: container.name.clone(),
        image,
        command: container.command.clone(),
        environment,
        mounts: container
            .mount_points
            .iter()
            .map(|m| (m.source_volume.clone(), m.container_path.clone()))
            .collect(),
    })
}
