//! Container backend abstraction.
//!
//! The task runner drives containers only through [`ContainerBackend`].
//! [`ScriptedBackend`] replays a fixed behavior per container name and is
//! what the simulation and the tests run against.

use std::collections::{BTreeMap, HashMap, VecDeque};

use stackline_common::error::{Result, StacklineError};
use stackline_common::types::ContainerState;
use uuid::Uuid;

/// Everything the backend needs to start one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerLaunch {
    /// Task instance the container belongs to.
    pub task_id: Uuid,
    /// Container name.
    pub name: String,
    /// Resolved image reference.
    pub image: String,
    /// Command override.
    pub command: Vec<String>,
    /// Environment, secrets included.
    pub environment: BTreeMap<String, String>,
    /// `(volume, path)` pairs mounted into the container.
    pub mounts: Vec<(String, String)>,
}

/// Platform-agnostic container backend.
pub trait ContainerBackend {
    /// Starts a container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be started.
    fn start(&mut self, launch: &ContainerLaunch) -> Result<()>;

    /// Current state of a started container.
    fn poll(&mut self, task_id: Uuid, name: &str) -> ContainerState;

    /// Stops a running container.
    fn stop(&mut self, task_id: Uuid, name: &str);
}

/// Scripted behavior of one container start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Behavior {
    /// Runs until stopped.
    KeepRunning,
    /// Exits immediately with the code.
    Exit(i32),
    /// Fails to start with the message.
    FailToStart(String),
}

/// Backend replaying scripted behaviors.
///
/// Each container name has a queue of behaviors; every start consumes
/// the front entry, and the last entry repeats. Unscripted containers
/// keep running.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    scripts: HashMap<String, VecDeque<Behavior>>,
    running: HashMap<(Uuid, String), ContainerState>,
    launches: Vec<ContainerLaunch>,
}

impl ScriptedBackend {
    /// Creates a backend where every container keeps running.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts every start of `name` to behave the same way.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, behavior: Behavior) -> Self {
        self.script(name, [behavior]);
        self
    }

    /// Scripts successive starts of `name`.
    pub fn script(
        &mut self,
        name: impl Into<String>,
        behaviors: impl IntoIterator<Item = Behavior>,
    ) {
        let _ = self.scripts.insert(name.into(), behaviors.into_iter().collect());
    }

    /// Every accepted start, in order.
    #[must_use]
    pub fn launches(&self) -> &[ContainerLaunch] {
        &self.launches
    }

    /// Number of accepted starts of `name`.
    #[must_use]
    pub fn starts_of(&self, name: &str) -> usize {
        self.launches.iter().filter(|l| l.name == name).count()
    }

    fn next_behavior(&mut self, name: &str) -> Behavior {
        match self.scripts.get_mut(name) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(Behavior::KeepRunning),
            Some(queue) => queue.front().cloned().unwrap_or(Behavior::KeepRunning),
            None => Behavior::KeepRunning,
        }
    }
}

impl ContainerBackend for ScriptedBackend {
    fn start(&mut self, launch: &ContainerLaunch) -> Result<()> {
        let state = match self.next_behavior(&launch.name) {
            Behavior::KeepRunning => ContainerState::Running,
            Behavior::Exit(code) => ContainerState::Exited { code },
            Behavior::FailToStart(message) => {
                return Err(StacklineError::Deploy {
                    message: format!("container \"{}\" failed to start: {message}", launch.name),
                });
            }
        };
        tracing::debug!(task = %launch.task_id, container = %launch.name, %state, "scripted start");
        let _ = self
            .running
            .insert((launch.task_id, launch.name.clone()), state);
        self.launches.push(launch.clone());
        Ok(())
    }

    fn poll(&mut self, task_id: Uuid, name: &str) -> ContainerState {
        self.running
            .get(&(task_id, name.to_string()))
            .copied()
            .unwrap_or(ContainerState::Pending)
    }

    fn stop(&mut self, task_id: Uuid, name: &str) {
        if let Some(state) = self.running.get_mut(&(task_id, name.to_string())) {
            if *state == ContainerState::Running {
                *state = ContainerState::Exited { code: 0 };
            }
        }
    }
}
