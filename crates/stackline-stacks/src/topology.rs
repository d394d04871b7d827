//! Task topology builder.
//!
//! Assembles the roles, log sinks, shared volume and three containers of
//! the web task:
//!
//! - **main**: the application image from the registry, essential, serves
//!   the only inbound port and loads instrumentation from the shared
//!   volume.
//! - **sidecar**: the monitoring agent, configured from a parameter store
//!   entry at deploy time.
//! - **init**: copies the instrumentation distribution onto the shared
//!   volume and exits.
//!
//! The main container declares an explicit `SUCCESS` dependency on the
//! init container, so it never starts before the volume is populated,
//! whatever ordering conventions the scheduler has for non-essential
//! containers.

use std::collections::BTreeMap;

use stackline_common::config::{AgentConfig, StacklineConfig};
use stackline_common::constants::{
    AGENT_CONFIG_ENV, AGENT_IMAGE, AGENT_LOG_GROUP, APP_LOG_RETENTION_DAYS, APP_SOURCE_DIR,
    DEFAULT_CONTAINER_PORT, DEFAULT_IMAGE_TAG, DEFAULT_TASK_CPU, DEFAULT_TASK_MEMORY_MIB,
    ECS_TASKS_PRINCIPAL, EXECUTION_ROLE_POLICY, INIT_LOG_GROUP, INSTRUMENTATION_IMAGE,
    INSTRUMENTATION_MOUNT_PATH, INSTRUMENTATION_SOURCE_DIR, INSTRUMENTATION_VOLUME,
    OTLP_METRICS_ENDPOINT, OTLP_TRACES_ENDPOINT, TASK_ROLE_AGENT_POLICY,
    TASK_ROLE_PARAMETER_POLICY,
};
use stackline_common::error::Result;
use stackline_common::types::{LogicalId, RemovalPolicy};
use stackline_model::container::{DependencyCondition, ImageRef, SecretRef};
use stackline_model::iam::{self, ManagedPolicy, Role, ServicePrincipal};
use stackline_model::logs::{LogConfiguration, LogSink};
use stackline_model::reference::{self, CrossStackRef};
use stackline_model::registry::Registry;
use stackline_model::resource::{Resource, ResourceKind};
use stackline_model::task::{RuntimePlatform, TaskSpec, Volume};
use stackline_model::validator;

use crate::builder::ContainerBuilder;
use crate::stack::Stack;

const AUTO_INSTRUMENTATION_SUBDIR: &str = "opentelemetry/instrumentation/auto_instrumentation";

/// Tunables of the task topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyOptions {
    /// Task CPU units.
    pub cpu: u32,
    /// Task memory limit in MiB.
    pub memory_mib: u32,
    /// Tag the main image is pulled at.
    pub image_tag: String,
    /// Port the main container listens on.
    pub container_port: u16,
    /// Whether a sidecar exit stops the task.
    pub sidecar_essential: bool,
    /// Observability agent settings.
    pub agent: AgentConfig,
}

impl Default for TopologyOptions {
    fn default() -> Self {
        Self {
            cpu: DEFAULT_TASK_CPU,
            memory_mib: DEFAULT_TASK_MEMORY_MIB,
            image_tag: DEFAULT_IMAGE_TAG.into(),
            container_port: DEFAULT_CONTAINER_PORT,
            sidecar_essential: true,
            agent: AgentConfig::default(),
        }
    }
}

impl From<&StacklineConfig> for TopologyOptions {
    fn from(config: &StacklineConfig) -> Self {
        Self {
            cpu: config.service.cpu,
            memory_mib: config.service.memory_mib,
            image_tag: config.service.image_tag.clone(),
            container_port: config.service.container_port,
            sidecar_essential: config.service.sidecar_essential,
            agent: config.agent.clone(),
        }
    }
}

/// Everything [`build_topology`] declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    /// Logical ID of the task spec.
    pub task_id: LogicalId,
    /// The task spec, as declared in the stack.
    pub task: TaskSpec,
    /// Role used by the runtime.
    pub execution_role: LogicalId,
    /// Role used by the running containers.
    pub task_role: LogicalId,
    /// Sink of the main container.
    pub app_log_sink: LogicalId,
    /// Sink of the sidecar.
    pub agent_log_sink: LogicalId,
    /// Sink of the init container.
    pub init_log_sink: LogicalId,
    /// Name of the main container.
    pub main_container: String,
    /// Name of the sidecar container.
    pub sidecar_container: String,
    /// Name of the init container.
    pub init_container: String,
}

/// Declares the web task in `stack`, pulling the main image from `registry`.
///
/// # Errors
///
/// Returns an error if the handle points into `stack`, a resource name is
/// already taken, the task size is unsupported, or the assembled task
/// fails validation.
pub fn build_topology(
    stack: &mut Stack,
    registry: &CrossStackRef<Registry>,
    options: &TopologyOptions,
) -> Result<Topology> {
    let prefix = stack.id().to_string();
    tracing::info!(stack = %prefix, registry = %registry.logical_id(), "building task topology");
    let repository = stack.import(registry)?;

    let principal = ServicePrincipal::new(ECS_TASKS_PRINCIPAL);
    let execution = Role::new(principal.clone())
        .with_managed_policy(ManagedPolicy::from_managed_name(EXECUTION_ROLE_POLICY));
    let task_role = Role::new(principal)
        .with_managed_policy(ManagedPolicy::from_managed_name(TASK_ROLE_PARAMETER_POLICY))
        .with_managed_policy(ManagedPolicy::from_managed_name(TASK_ROLE_AGENT_POLICY));
    iam::ensure_disjoint(&execution, &task_role)?;
    let execution_role = stack.add("EcsExecutionRole", Resource::Role(execution))?;
    let task_role = stack.add("EcsTaskRole", Resource::Role(task_role))?;

    let app_log_sink = stack.add(
        "LogGroup",
        Resource::LogSink(
            LogSink::new()
                .with_retention(APP_LOG_RETENTION_DAYS)?
                .with_removal_policy(RemovalPolicy::Destroy),
        ),
    )?;
    let agent_log_sink = stack.add(
        "CwAgentLogGroup",
        Resource::LogSink(LogSink::new().named(AGENT_LOG_GROUP)),
    )?;
    let init_log_sink = stack.add(
        "InitLogGroup",
        Resource::LogSink(LogSink::new().named(INIT_LOG_GROUP)),
    )?;

    let mut task = TaskSpec::new(
        format!("{prefix}TaskDef"),
        options.cpu,
        options.memory_mib,
        RuntimePlatform::LINUX_ARM64,
        execution_role.clone(),
        task_role.clone(),
    )?;
    task.add_volume(Volume::ephemeral(INSTRUMENTATION_VOLUME))?;

    let main_container = format!("{prefix}Container");
    let sidecar_container = format!("{prefix}CwAgentContainer");
    let init_container = "InitContainer".to_string();

    let mut main = ContainerBuilder::new(&main_container)
        .image(ImageRef::Registry {
            repository,
            tag: options.image_tag.clone(),
        })
        .port(options.container_port)
        .mount(INSTRUMENTATION_VOLUME, INSTRUMENTATION_MOUNT_PATH, false)
        .logging(LogConfiguration::new(app_log_sink.clone(), "FlaskApp"))
        .depends_on(&init_container, DependencyCondition::Success);
    for (key, value) in instrumentation_environment(&options.agent, &app_log_sink) {
        main = main.env(key, value);
    }
    task.add_container(main.build()?)?;

    let sidecar = ContainerBuilder::new(&sidecar_container)
        .image(ImageRef::Uri {
            uri: AGENT_IMAGE.into(),
        })
        .essential(options.sidecar_essential)
        .secret(AGENT_CONFIG_ENV, SecretRef::parameter(&options.agent.parameter_name))
        .logging(LogConfiguration::new(agent_log_sink.clone(), "FlaskCwAgent"))
        .build()?;
    task.add_container(sidecar)?;

    let init = ContainerBuilder::new(&init_container)
        .image(ImageRef::Uri {
            uri: INSTRUMENTATION_IMAGE.into(),
        })
        .essential(false)
        .command(["cp", "-a", INSTRUMENTATION_SOURCE_DIR, INSTRUMENTATION_MOUNT_PATH])
        .mount(INSTRUMENTATION_VOLUME, INSTRUMENTATION_MOUNT_PATH, false)
        .logging(LogConfiguration::new(init_log_sink.clone(), "FlaskInit"))
        .build()?;
    task.add_container(init)?;

    validator::validate_task(&task, &stack.ids_of_kind(ResourceKind::LogSink))?;
    let task_id = stack.add("TaskDef", Resource::TaskSpec(task.clone()))?;
    tracing::debug!(stack = %prefix, %task_id, "task topology declared");

    Ok(Topology {
        task_id,
        task,
        execution_role,
        task_role,
        app_log_sink,
        agent_log_sink,
        init_log_sink,
        main_container,
        sidecar_container,
        init_container,
    })
}

/// Environment of the main container's embedded observability agent.
///
/// The log group name is a token resolved at synthesis.
#[must_use]
pub fn instrumentation_environment(
    agent: &AgentConfig,
    app_log_sink: &LogicalId,
) -> BTreeMap<String, String> {
    let mount = INSTRUMENTATION_MOUNT_PATH;
    let entries = [
        (
            "OTEL_RESOURCE_ATTRIBUTES",
            format!(
                "service.name={},aws.log.group.names={}",
                agent.service_name,
                reference::name_token(app_log_sink)
            ),
        ),
        ("OTEL_AWS_APPLICATION_SIGNALS_ENABLED", "true".into()),
        ("OTEL_METRICS_EXPORTER", "none".into()),
        ("OTEL_EXPORTER_OTLP_PROTOCOL", "http/protobuf".into()),
        (
            "OTEL_AWS_APPLICATION_SIGNALS_EXPORTER_ENDPOINT",
            OTLP_METRICS_ENDPOINT.into(),
        ),
        ("OTEL_EXPORTER_OTLP_TRACES_ENDPOINT", OTLP_TRACES_ENDPOINT.into()),
        ("OTEL_TRACES_SAMPLER", "parentbased_traceidratio".into()),
        ("OTEL_TRACES_SAMPLER_ARG", agent.sampler_ratio.clone()),
        ("OTEL_PYTHON_DISTRO", "aws_distro".into()),
        ("OTEL_PYTHON_CONFIGURATOR", "aws_configurator".into()),
        (
            "PYTHONPATH",
            format!("{mount}/{AUTO_INSTRUMENTATION_SUBDIR}:{APP_SOURCE_DIR}:{mount}"),
        ),
        ("OTEL_PYTHON_LOG_LEVEL", agent.log_level.clone()),
    ];
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

#[cfg(test)]
mod tests {
    use stackline_common::types::StackId;
    use stackline_model::resource::ResourceNode;

    use super::*;

    fn registry_handle() -> CrossStackRef<Registry> {
        CrossStackRef::new(StackId::new("ECRStack"), LogicalId::new("ECRStackFlaskApp00000000"))
    }

    fn build() -> (Stack, Topology) {
        let mut stack = Stack::new("AppStack");
        let topology = build_topology(&mut stack, &registry_handle(), &TopologyOptions::default())
            .expect("topology");
        (stack, topology)
    }

    fn role<'a>(stack: &'a Stack, id: &LogicalId) -> &'a Role {
        match stack.resource(id).map(|n: &ResourceNode| &n.resource) {
            Some(Resource::Role(role)) => role,
            other => panic!("expected role, got {other:?}"),
        }
    }

    #[test]
    fn three_containers_one_non_essential() {
        let (_, topology) = build();
        assert_eq!(topology.task.containers.len(), 3);
        let non_essential: Vec<&str> = topology
            .task
            .non_essential()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(non_essential, vec![topology.init_container.as_str()]);
    }

    #[test]
    fn init_and_main_share_mount_path() {
        let (_, topology) = build();
        let main = topology.task.container(&topology.main_container).expect("main");
        let init = topology.task.container(&topology.init_container).expect("init");
        let main_mount = main.mount_of(INSTRUMENTATION_VOLUME).expect("main mount");
        let init_mount = init.mount_of(INSTRUMENTATION_VOLUME).expect("init mount");
        assert_eq!(main_mount.container_path, init_mount.container_path);
        assert!(!init_mount.read_only);
        assert_eq!(init.command.last().map(String::as_str), Some(INSTRUMENTATION_MOUNT_PATH));
    }

    #[test]
    fn every_mount_names_a_declared_volume() {
        let (_, topology) = build();
        for container in &topology.task.containers {
            for mount in &container.mount_points {
                assert!(
                    topology.task.volume(&mount.source_volume).is_some(),
                    "{} mounts undeclared {}",
                    container.name,
                    mount.source_volume
                );
            }
        }
    }

    #[test]
    fn roles_are_disjoint_and_trusted_by_tasks() {
        let (stack, topology) = build();
        let execution = role(&stack, &topology.execution_role);
        let task = role(&stack, &topology.task_role);
        assert_ne!(topology.execution_role, topology.task_role);
        assert!(iam::ensure_disjoint(execution, task).is_ok());
        assert_eq!(execution.assumed_by.as_str(), ECS_TASKS_PRINCIPAL);
        assert_eq!(task.managed_policies.len(), 2);
    }

    #[test]
    fn main_waits_for_init_success() {
        let (_, topology) = build();
        let main = topology.task.container(&topology.main_container).expect("main");
        assert_eq!(
            main.dependency_on(&topology.init_container),
            Some(DependencyCondition::Success)
        );
        let order = topology.task.start_order().expect("order");
        let pos = |name: &str| order.iter().position(|n| n == name).expect(name);
        assert!(pos(&topology.init_container) < pos(&topology.main_container));
    }

    #[test]
    fn sidecar_reads_config_from_parameter() {
        let (_, topology) = build();
        let sidecar = topology
            .task
            .container(&topology.sidecar_container)
            .expect("sidecar");
        assert!(sidecar.essential);
        assert_eq!(
            sidecar.secrets.get(AGENT_CONFIG_ENV),
            Some(&SecretRef::parameter("flask-cw-agent"))
        );
        assert!(!sidecar.environment.contains_key(AGENT_CONFIG_ENV));
        assert_eq!(sidecar.logging.sink, topology.agent_log_sink);
    }

    #[test]
    fn each_container_has_its_own_sink() {
        let (_, topology) = build();
        assert_eq!(topology.task.log_sinks().len(), 3);
    }

    #[test]
    fn main_environment_points_into_volume() {
        let (_, topology) = build();
        let main = topology.task.container(&topology.main_container).expect("main");
        let path = main.environment.get("PYTHONPATH").expect("PYTHONPATH");
        assert!(path.starts_with(INSTRUMENTATION_MOUNT_PATH), "got: {path}");
        assert_eq!(
            main.environment.get("OTEL_TRACES_SAMPLER_ARG").map(String::as_str),
            Some("0.05")
        );
        assert_eq!(main.environment.len(), 12);
        let attrs = &main.environment["OTEL_RESOURCE_ATTRIBUTES"];
        assert!(attrs.contains(&reference::name_token(&topology.app_log_sink)), "got: {attrs}");
    }

    #[test]
    fn registry_is_imported() {
        let (stack, _) = build();
        assert_eq!(stack.imports().len(), 1);
    }

    #[test]
    fn identical_inputs_give_identical_topology() {
        let (stack_a, a) = build();
        let (stack_b, b) = build();
        assert_eq!(a, b);
        assert_eq!(stack_a, stack_b);
    }

    #[test]
    fn unsupported_size_fails() {
        let mut stack = Stack::new("AppStack");
        let options = TopologyOptions {
            memory_mib: 100,
            ..TopologyOptions::default()
        };
        assert!(build_topology(&mut stack, &registry_handle(), &options).is_err());
    }

    #[test]
    fn registry_in_same_stack_fails() {
        let mut stack = Stack::new("ECRStack");
        let options = TopologyOptions::default();
        assert!(build_topology(&mut stack, &registry_handle(), &options).is_err());
    }
}
