//! End-to-end tests for declaring and synthesizing the default deployment.
//!
//! These tests drive the public API the way the CLI does:
//! 1. Load configuration
//! 2. Declare the registry stack and the service stack
//! 3. Synthesize a plan and inspect it

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::io::Write;

use stackline_common::config::StacklineConfig;
use stackline_common::error::StacklineError;
use stackline_common::types::{RemovalPolicy, TagMutability};
use stackline_model::container::DependencyCondition;
use stackline_model::resource::ResourceKind;
use stackline_stacks::app::App;
use stackline_stacks::registry_stack::{RegistryStack, RegistryStackProps};
use stackline_stacks::service_stack::{ServiceStack, ServiceStackProps};
use stackline_stacks::stack::Stack;
use stackline_stacks::synth::{self, Plan};

fn declare(config: &StacklineConfig) -> (App, ServiceStack) {
    let mut app = App::from_config(config);
    let registry = RegistryStack::new(
        &mut app,
        &config.registry.stack_name,
        RegistryStackProps::from(&config.registry),
    )
    .expect("registry stack");
    let service = ServiceStack::new(
        &mut app,
        &config.service.stack_name,
        ServiceStackProps::from_config(registry.repository(), config),
    )
    .expect("service stack");
    (app, service)
}

fn default_plan() -> Plan {
    let (app, _) = declare(&StacklineConfig::default());
    synth::synthesize(&app).expect("synthesize")
}

// ── Registry ─────────────────────────────────────────────────────────

#[test]
fn default_registry_keeps_three_mutable_images() {
    let plan = default_plan();
    let stack = plan.stack("ECRStack").expect("registry stack");
    let registries: Vec<_> = stack.resources_of_kind(ResourceKind::Registry).collect();
    assert_eq!(registries.len(), 1);

    let registry = registries[0];
    assert_eq!(registry.physical_name, "flask-app");
    assert_eq!(registry.removal_policy, RemovalPolicy::Retain);
    assert_eq!(registry.properties["tag_mutability"], "mutable");
    let rules = registry.properties["lifecycle_rules"].as_array().expect("rules");
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0]["max_image_count"], 3);
}

// ── Service ──────────────────────────────────────────────────────────

#[test]
fn default_service_is_one_public_instance_on_main_port() {
    let (app, service) = declare(&StacklineConfig::default());
    let wrapper = service.service();
    assert_eq!(wrapper.desired_count, 1);
    assert!(wrapper.listener.public);
    assert_eq!(wrapper.target_group.container_name, service.topology().main_container);
    let main = service
        .topology()
        .task
        .container(&service.topology().main_container)
        .expect("main");
    assert_eq!(main.primary_port(), Some(wrapper.target_group.container_port));

    let plan = synth::synthesize(&app).expect("synthesize");
    let stack = plan.stack("AppStack").expect("service stack");
    let planned = stack.resource("FlaskServer").expect("service");
    let task = stack.resource("TaskDef").expect("task");
    assert_eq!(planned.references, vec![task.physical_id.clone()]);
}

// ── Topology ─────────────────────────────────────────────────────────

#[test]
fn task_has_three_containers_and_one_shared_volume() {
    let (_, service) = declare(&StacklineConfig::default());
    let topology = service.topology();
    assert_eq!(topology.task.containers.len(), 3);
    assert_eq!(topology.task.volumes.len(), 1);
    assert_eq!(topology.task.non_essential().count(), 1);

    let main = topology.task.container(&topology.main_container).expect("main");
    let init = topology.task.container(&topology.init_container).expect("init");
    let volume = &topology.task.volumes[0].name;
    assert_eq!(
        main.mount_of(volume).map(|m| &m.container_path),
        init.mount_of(volume).map(|m| &m.container_path)
    );
    assert_eq!(
        main.dependency_on(&topology.init_container),
        Some(DependencyCondition::Success)
    );
}

#[test]
fn synthesized_task_references_roles_sinks_and_registry() {
    let plan = default_plan();
    let stack = plan.stack("AppStack").expect("service stack");
    let task = stack.resource("TaskDef").expect("task");
    // two roles, three sinks, one registry
    assert_eq!(task.references.len(), 6);
    assert_eq!(task.properties["runtime_platform"]["architecture"], "ARM64");
    assert_eq!(task.properties["cpu"], 256);
    assert_eq!(task.properties["memory_mib"], 512);

    let roles: Vec<_> = stack.resources_of_kind(ResourceKind::Role).collect();
    assert_eq!(roles.len(), 2);
    assert_ne!(roles[0].properties, roles[1].properties);
}

#[test]
fn fixed_log_group_names_survive_synthesis() {
    let plan = default_plan();
    let stack = plan.stack("AppStack").expect("service stack");
    let names: Vec<&str> = stack
        .resources_of_kind(ResourceKind::LogSink)
        .map(|r| r.physical_name.as_str())
        .collect();
    assert!(names.contains(&"/ecs/ecs-cw-agent"), "got: {names:?}");
    assert!(names.contains(&"/ecs/ecs-init"), "got: {names:?}");
    let app_sink = stack.resource("LogGroup").expect("app sink");
    assert_eq!(app_sink.properties["retention_days"], 7);
}

// ── Determinism ──────────────────────────────────────────────────────

#[test]
fn identical_config_gives_identical_json() {
    let first = default_plan().to_json().expect("json");
    let second = default_plan().to_json().expect("json");
    assert_eq!(first, second);
}

#[test]
fn different_environment_changes_arns() {
    let mut config = StacklineConfig::default();
    config.environment.account = "123456789012".into();
    config.environment.region = "eu-west-1".into();
    let (app, _) = declare(&config);
    let plan = synth::synthesize(&app).expect("synthesize");
    let registry = plan
        .stack("ECRStack")
        .and_then(|s| s.resource("FlaskApp"))
        .expect("registry");
    assert_eq!(
        registry.physical_id,
        "arn:aws:ecr:eu-west-1:123456789012:repository/flask-app"
    );
}

// ── Configuration ────────────────────────────────────────────────────

#[test]
fn yaml_config_drives_declaration() {
    let mut file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .expect("tempfile");
    writeln!(
        file,
        "registry:\n  repository_name: orders\n  tag_mutability: immutable\n  \
         max_image_count: 5\nservice:\n  desired_count: 2\n  public: false\n"
    )
    .expect("write");

    let config = StacklineConfig::load(file.path()).expect("load");
    assert_eq!(config.registry.tag_mutability, TagMutability::Immutable);
    let (app, service) = declare(&config);
    assert_eq!(service.service().desired_count, 2);
    assert!(!service.service().public);

    let plan = synth::synthesize(&app).expect("synthesize");
    let registry = plan
        .stack("ECRStack")
        .and_then(|s| s.resource("FlaskApp"))
        .expect("registry");
    assert_eq!(registry.physical_name, "orders");
    assert_eq!(registry.properties["lifecycle_rules"][0]["max_image_count"], 5);
}

#[test]
fn duplicate_stack_names_are_rejected() {
    let mut app = App::from_config(&StacklineConfig::default());
    let _ = app.add_stack(Stack::new("Shared")).expect("first stack");
    let err = app.add_stack(Stack::new("Shared")).unwrap_err();
    assert!(
        matches!(err, StacklineError::Duplicate { kind: "stack", ref name } if name == "Shared"),
        "got: {err}"
    );
    assert_eq!(app.stacks().len(), 1);
}

#[test]
fn service_stack_cannot_reuse_registry_stack_name() {
    let config = StacklineConfig::default();
    let mut app = App::from_config(&config);
    let props = RegistryStackProps::from(&config.registry);
    let registry = RegistryStack::new(&mut app, "Shared", props).expect("registry stack");
    let err = ServiceStack::new(
        &mut app,
        "Shared",
        ServiceStackProps::from_config(registry.repository(), &config),
    )
    .unwrap_err();
    assert!(matches!(err, StacklineError::CrossStack { .. }), "got: {err}");
}
