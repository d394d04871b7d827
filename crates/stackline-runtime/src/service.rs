//! Service scheduler keeping the desired number of healthy tasks.
//!
//! A task is healthy when it is running and the container behind the
//! target group is running. Each reconcile advances every task and runs
//! one health check against the tasks launched before it. A task that
//! stopped, or that failed `unhealthy_threshold` consecutive checks while
//! still provisioning or with its target container down, is stopped and
//! replaced within a launch budget.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use stackline_common::error::Result;
use stackline_common::types::ContainerState;
use stackline_model::service::ServiceWrapper;
use stackline_model::task::TaskSpec;
use uuid::Uuid;

use crate::backend::ContainerBackend;
use crate::task::{DeployContext, TaskInstance, TaskRunner, TaskStatus};

/// Outcome of one [`ServiceScheduler::reconcile`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Tasks launched.
    pub launched: u32,
    /// Unhealthy tasks stopped and replaced.
    pub replaced: u32,
    /// Healthy tasks after the reconcile.
    pub healthy: u32,
}

/// Runs a service's tasks.
#[derive(Debug)]
pub struct ServiceScheduler<B> {
    service: ServiceWrapper,
    spec: TaskSpec,
    runner: TaskRunner<B>,
    tasks: Vec<TaskInstance>,
    retired: Vec<TaskInstance>,
    failed_checks: HashMap<Uuid, u32>,
    launch_budget: u32,
}

impl<B: ContainerBackend> ServiceScheduler<B> {
    /// Creates a scheduler running `spec` for `service`.
    ///
    /// At most twice the desired count of tasks are launched per
    /// reconcile.
    pub fn new(service: ServiceWrapper, spec: TaskSpec, backend: B) -> Self {
        let launch_budget = service.desired_count.max(1).saturating_mul(2);
        Self {
            service,
            spec,
            runner: TaskRunner::new(backend),
            tasks: Vec::new(),
            retired: Vec::new(),
            failed_checks: HashMap::new(),
            launch_budget,
        }
    }

    /// Overrides the number of launches allowed per reconcile.
    #[must_use]
    pub const fn with_launch_budget(mut self, budget: u32) -> Self {
        self.launch_budget = budget;
        self
    }

    /// Returns `true` if `task` is serving traffic.
    #[must_use]
    pub fn is_healthy(&self, task: &TaskInstance) -> bool {
        task.status() == &TaskStatus::Running
            && task.state(&self.service.target_group.container_name)
                == Some(ContainerState::Running)
    }

    /// Consecutive failed health checks of the task `id`.
    #[must_use]
    pub fn failed_checks(&self, id: Uuid) -> u32 {
        self.failed_checks.get(&id).copied().unwrap_or(0)
    }

    /// Advances every task, replaces unhealthy ones and launches up to the
    /// desired count.
    ///
    /// # Errors
    ///
    /// Returns `StacklineError::Deploy` if a launch cannot resolve its
    /// images or secrets.
    pub fn reconcile(&mut self, ctx: DeployContext<'_>) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        for task in &mut self.tasks {
            self.runner.advance(task, &self.spec)?;
        }

        let threshold = self
            .service
            .target_group
            .health_check
            .unhealthy_threshold
            .max(1);
        for mut task in std::mem::take(&mut self.tasks) {
            let failures = if self.is_healthy(&task) {
                0
            } else {
                self.failed_checks(task.id()).saturating_add(1)
            };
            if task.is_active() && failures < threshold {
                let _ = self.failed_checks.insert(task.id(), failures);
                self.tasks.push(task);
                continue;
            }
            tracing::warn!(
                task = %task.id(),
                status = ?task.status(),
                failures,
                "replacing unhealthy task"
            );
            let _ = self.failed_checks.remove(&task.id());
            self.runner.stop(
                &mut task,
                &format!("failed {failures} consecutive health checks"),
            );
            self.retired.push(task);
            report.replaced += 1;
        }

        while self.tasks.len() < self.desired() && report.launched < self.launch_budget {
            let task = self.runner.launch(&self.spec, ctx)?;
            report.launched += 1;
            self.tasks.push(task);
        }

        let healthy = self.tasks.iter().filter(|t| self.is_healthy(t)).count();
        report.healthy = u32::try_from(healthy).unwrap_or(u32::MAX);
        tracing::info!(
            family = %self.spec.family,
            desired = self.service.desired_count,
            healthy = report.healthy,
            launched = report.launched,
            replaced = report.replaced,
            "service reconciled"
        );
        Ok(report)
    }

    /// Current tasks.
    #[must_use]
    pub fn tasks(&self) -> &[TaskInstance] {
        &self.tasks
    }

    /// Tasks stopped and replaced so far.
    #[must_use]
    pub fn retired(&self) -> &[TaskInstance] {
        &self.retired
    }

    /// Every task ever launched, retired first.
    pub fn all_tasks(&self) -> impl Iterator<Item = &TaskInstance> {
        self.retired.iter().chain(&self.tasks)
    }

    /// The underlying task runner.
    pub const fn runner(&self) -> &TaskRunner<B> {
        &self.runner
    }

    /// The service being scheduled.
    pub const fn service(&self) -> &ServiceWrapper {
        &self.service
    }

    fn desired(&self) -> usize {
        usize::try_from(self.service.desired_count).unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use stackline_common::types::LogicalId;
    use stackline_model::container::{
        ContainerDependency, ContainerSpec, DependencyCondition, ImageRef, PortMapping,
    };
    use stackline_model::logs::LogConfiguration;
    use stackline_model::service;
    use stackline_model::task::RuntimePlatform;

    use super::*;
    use crate::backend::{Behavior, ScriptedBackend};
    use crate::parameters::ParameterStore;

    fn container(name: &str, essential: bool) -> ContainerSpec {
        let mut c = ContainerSpec::new(
            name,
            ImageRef::Uri {
                uri: format!("{name}:1"),
            },
            LogConfiguration::new(LogicalId::new("Logs"), "Prefix"),
        );
        c.essential = essential;
        c
    }

    fn spec() -> TaskSpec {
        let mut task = TaskSpec::new(
            "web",
            256,
            512,
            RuntimePlatform::LINUX_ARM64,
            LogicalId::new("Exec"),
            LogicalId::new("Task"),
        )
        .expect("size");
        let mut main = container("main", true);
        main.port_mappings.push(PortMapping::tcp(80));
        main.depends_on.push(ContainerDependency {
            container: "init".into(),
            condition: DependencyCondition::Success,
        });
        task.containers = vec![main, container("init", false)];
        task
    }

    fn scheduler(backend: ScriptedBackend, desired: u32) -> ServiceScheduler<ScriptedBackend> {
        let spec = spec();
        let wrapper =
            service::publish(&spec, LogicalId::new("TaskDef"), desired, true).expect("publish");
        ServiceScheduler::new(wrapper, spec, backend)
    }

    #[test]
    fn launches_desired_count() {
        let repos = BTreeMap::new();
        let params = ParameterStore::new();
        let ctx = DeployContext {
            repositories: &repos,
            parameters: &params,
        };
        let mut sched = scheduler(ScriptedBackend::new().with("init", Behavior::Exit(0)), 2);
        let report = sched.reconcile(ctx).expect("reconcile");
        assert_eq!(report.launched, 2);
        assert_eq!(report.healthy, 2);

        let again = sched.reconcile(ctx).expect("reconcile");
        assert_eq!(again, ReconcileReport { launched: 0, replaced: 0, healthy: 2 });
    }

    #[test]
    fn failed_task_is_replaced() {
        let repos = BTreeMap::new();
        let params = ParameterStore::new();
        let ctx = DeployContext {
            repositories: &repos,
            parameters: &params,
        };
        let mut backend = ScriptedBackend::new();
        backend.script("init", [Behavior::Exit(1), Behavior::Exit(0)]);
        let mut sched = scheduler(backend, 1);

        let first = sched.reconcile(ctx).expect("reconcile");
        assert_eq!(first.healthy, 0);
        let second = sched.reconcile(ctx).expect("reconcile");
        assert_eq!(second.replaced, 1);
        assert_eq!(second.healthy, 1);
        assert_eq!(sched.retired().len(), 1);
        assert!(!sched.retired()[0].ever_started("main"));
    }

    #[test]
    fn launch_budget_bounds_relaunches() {
        let repos = BTreeMap::new();
        let params = ParameterStore::new();
        let ctx = DeployContext {
            repositories: &repos,
            parameters: &params,
        };
        let backend = ScriptedBackend::new().with("init", Behavior::Exit(1));
        let mut sched = scheduler(backend, 3).with_launch_budget(1);
        let report = sched.reconcile(ctx).expect("reconcile");
        assert_eq!(report.launched, 1);
        assert_eq!(sched.tasks().len(), 1);
    }

    #[test]
    fn stuck_provisioning_task_is_cycled_after_threshold() {
        let repos = BTreeMap::new();
        let params = ParameterStore::new();
        let ctx = DeployContext {
            repositories: &repos,
            parameters: &params,
        };
        let mut sched = scheduler(ScriptedBackend::new(), 1);

        let first = sched.reconcile(ctx).expect("reconcile");
        assert_eq!(first.launched, 1);
        let stuck = sched.tasks()[0].id();
        assert_eq!(sched.tasks()[0].status(), &TaskStatus::Provisioning);

        let second = sched.reconcile(ctx).expect("reconcile");
        assert_eq!(second.replaced, 0);
        assert_eq!(sched.failed_checks(stuck), 1);

        let third = sched.reconcile(ctx).expect("reconcile");
        assert_eq!(third.replaced, 1);
        assert_eq!(third.launched, 1);
        assert_eq!(sched.failed_checks(stuck), 0);
        let retired = &sched.retired()[0];
        assert_eq!(retired.id(), stuck);
        assert!(!retired.is_active());
        assert!(!retired.ever_started("main"));
        assert_ne!(sched.tasks()[0].id(), stuck);
    }

    #[test]
    fn healthy_check_resets_failure_count() {
        let repos = BTreeMap::new();
        let params = ParameterStore::new();
        let ctx = DeployContext {
            repositories: &repos,
            parameters: &params,
        };
        let mut sched = scheduler(ScriptedBackend::new().with("init", Behavior::Exit(0)), 1);
        for _ in 0..5 {
            let report = sched.reconcile(ctx).expect("reconcile");
            assert_eq!(report.replaced, 0);
            assert_eq!(report.healthy, 1);
        }
        assert_eq!(sched.failed_checks(sched.tasks()[0].id()), 0);
    }
}
