//! Load-balanced service wrapping a task spec.

use serde::{Deserialize, Serialize};
use stackline_common::constants::HEALTH_CHECK_PATH;
use stackline_common::error::{Result, StacklineError};
use stackline_common::types::LogicalId;

use crate::task::TaskSpec;

const LISTENER_PORT: u16 = 80;
const HEALTH_CHECK_INTERVAL_SECS: u32 = 30;
const HEALTHY_THRESHOLD: u32 = 2;
const UNHEALTHY_THRESHOLD: u32 = 2;

/// Load balancer listener in front of the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listener {
    /// Port the load balancer accepts traffic on.
    pub port: u16,
    /// Whether the load balancer is internet-facing.
    pub public: bool,
}

/// Health probe run by the load balancer against each task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    /// HTTP path probed.
    pub path: String,
    /// Seconds between probes.
    pub interval_secs: u32,
    /// Consecutive successes before a target is healthy.
    pub healthy_threshold: u32,
    /// Consecutive failures before a target is unhealthy.
    pub unhealthy_threshold: u32,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            path: HEALTH_CHECK_PATH.into(),
            interval_secs: HEALTH_CHECK_INTERVAL_SECS,
            healthy_threshold: HEALTHY_THRESHOLD,
            unhealthy_threshold: UNHEALTHY_THRESHOLD,
        }
    }
}

/// Binds listener traffic to one container port of each task instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetGroup {
    /// Container receiving traffic.
    pub container_name: String,
    /// Port on that container.
    pub container_port: u16,
    /// Probe deciding instance health.
    pub health_check: HealthCheck,
}

/// A running, load-balanced, externally addressable service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceWrapper {
    /// Number of task instances kept running.
    pub desired_count: u32,
    /// Task spec the instances run.
    pub task: LogicalId,
    /// Whether the service is reachable from the internet.
    pub public: bool,
    /// Load balancer listener.
    pub listener: Listener,
    /// Target group bound to the main container.
    pub target_group: TargetGroup,
}

/// Wraps `task` into a load-balanced service.
///
/// The target group is bound to the main container: the first essential
/// container that exposes a port.
///
/// # Errors
///
/// Returns `StacklineError::Config` if the task exposes no port on an
/// essential container.
pub fn publish(
    task: &TaskSpec,
    task_id: LogicalId,
    desired_count: u32,
    public: bool,
) -> Result<ServiceWrapper> {
    let Some((main, port)) = task
        .main_container()
        .and_then(|c| c.primary_port().map(|p| (c, p)))
    else {
        return Err(StacklineError::Config {
            message: format!(
                "task \"{}\" has no essential container exposing a port to publish",
                task.family
            ),
        });
    };
    tracing::info!(
        task = %task_id,
        container = %main.name,
        port,
        desired_count,
        public,
        "publishing service"
    );
    Ok(ServiceWrapper {
        desired_count,
        task: task_id,
        public,
        listener: Listener {
            port: LISTENER_PORT,
            public,
        },
        target_group: TargetGroup {
            container_name: main.name.clone(),
            container_port: port,
            health_check: HealthCheck::default(),
        },
    })
}
