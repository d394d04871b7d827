//! Synthesis of an [`App`] into a provisioning [`Plan`].
//!
//! Synthesis runs in three passes:
//!
//! 1. Build the stack graph from imports and order stacks producers first.
//! 2. Validate every stack: registries, task specs and local references.
//! 3. Assign each resource a physical name and ARN, then resolve every
//!    reference, image and name token against them.
//!
//! The plan only contains ordered vectors and `serde_json` objects with
//! sorted keys, so identical apps serialize to identical bytes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use stackline_common::config::EnvironmentConfig;
use stackline_common::error::{Result, StacklineError};
use stackline_common::types::{LogicalId, RemovalPolicy, StackId};
use stackline_model::container::ImageRef;
use stackline_model::iam::ManagedPolicy;
use stackline_model::reference::{self, ResourceRef};
use stackline_model::resource::{Reference, Resource, ResourceKind, ResourceNode};
use stackline_model::task::TaskSpec;
use stackline_model::validator;

use crate::app::App;
use crate::stack::Stack;
use crate::stack_graph::StackGraph;

/// Fully resolved deployment plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// App name.
    pub app: String,
    /// Target account and region.
    pub environment: EnvironmentConfig,
    /// Stacks in deployment order.
    pub stacks: Vec<StackPlan>,
}

/// One stack of a [`Plan`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackPlan {
    /// Stack name.
    pub name: StackId,
    /// Stacks that must be deployed first.
    pub depends_on: Vec<StackId>,
    /// Resources in declaration order.
    pub resources: Vec<PlannedResource>,
}

/// One resource of a [`StackPlan`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedResource {
    /// Stable logical ID.
    pub logical_id: LogicalId,
    /// Name the resource was declared with.
    pub local_name: String,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Physical name.
    pub physical_name: String,
    /// Physical identifier (ARN).
    pub physical_id: String,
    /// Behavior on stack deletion.
    pub removal_policy: RemovalPolicy,
    /// ARNs of referenced resources, sorted.
    pub references: Vec<String>,
    /// Resolved resource attributes.
    pub properties: serde_json::Value,
}

impl Plan {
    /// Serializes the plan as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns `StacklineError::Serialization` if encoding fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Looks up a stack by name.
    #[must_use]
    pub fn stack(&self, name: &str) -> Option<&StackPlan> {
        self.stacks.iter().find(|s| s.name.as_str() == name)
    }
}

impl StackPlan {
    /// Looks up a resource by the name it was declared with.
    #[must_use]
    pub fn resource(&self, local_name: &str) -> Option<&PlannedResource> {
        self.resources.iter().find(|r| r.local_name == local_name)
    }

    /// Resources of `kind`, in declaration order.
    pub fn resources_of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &PlannedResource> {
        self.resources.iter().filter(move |r| r.kind == kind)
    }
}

/// Physical identity assigned to one resource.
#[derive(Debug, Clone)]
struct Physical {
    kind: ResourceKind,
    name: String,
    arn: String,
}

type PhysicalIndex = BTreeMap<ResourceRef, Physical>;

/// Synthesizes `app` into a plan.
///
/// # Errors
///
/// Returns `StacklineError::CrossStack` for unresolvable or cyclic
/// imports, a structural error for invalid stacks, and
/// `StacklineError::Duplicate` if two resources share a physical ARN.
pub fn synthesize(app: &App) -> Result<Plan> {
    tracing::info!(app = app.name(), stacks = app.stacks().len(), "synthesizing");
    let graph = StackGraph::from_app(app)?;
    let order = graph.deploy_order()?;
    for stack in app.stacks() {
        validate_stack(app, stack)?;
    }
    let physical = assign_physical(app)?;

    let mut stacks = Vec::with_capacity(order.len());
    for id in &order {
        let stack = app.stack(id).ok_or_else(|| StacklineError::NotFound {
            kind: "stack",
            id: id.to_string(),
        })?;
        let resources = stack
            .resources()
            .iter()
            .map(|node| plan_resource(app.environment(), stack, node, &physical))
            .collect::<Result<Vec<_>>>()?;
        tracing::info!(stack = %id, resources = resources.len(), "stack synthesized");
        stacks.push(StackPlan {
            name: id.clone(),
            depends_on: graph.producers_of(id).into_iter().collect(),
            resources,
        });
    }

    Ok(Plan {
        app: app.name().to_string(),
        environment: app.environment().clone(),
        stacks,
    })
}

/// URI of `tag` in the registry named `repository`.
#[must_use]
pub fn image_uri(environment: &EnvironmentConfig, repository: &str, tag: &str) -> String {
    format!(
        "{}.dkr.ecr.{}.amazonaws.com/{repository}:{tag}",
        environment.account, environment.region
    )
}

fn validate_stack(app: &App, stack: &Stack) -> Result<()> {
    let sinks = stack.ids_of_kind(ResourceKind::LogSink);
    for node in stack.resources() {
        match &node.resource {
            Resource::Registry(registry) => validator::validate_registry(registry)?,
            Resource::TaskSpec(task) => {
                validator::validate_task(task, &sinks)?;
                expect_local_kind(stack, node, &task.execution_role, ResourceKind::Role)?;
                expect_local_kind(stack, node, &task.task_role, ResourceKind::Role)?;
            }
            Resource::Service(service) => {
                expect_local_kind(stack, node, &service.task, ResourceKind::TaskSpec)?;
            }
            Resource::Role(_) | Resource::LogSink(_) => {}
        }
        for reference in node.resource.references() {
            match reference {
                Reference::Local(id) => {
                    if stack.resource(&id).is_none() {
                        return Err(dangling(stack, node, "resource", id.as_str()));
                    }
                }
                Reference::Imported(target) => check_import(app, stack, &target)?,
            }
        }
    }
    Ok(())
}

fn check_import(app: &App, stack: &Stack, target: &ResourceRef) -> Result<()> {
    if !stack.imports().contains(target) {
        return Err(StacklineError::CrossStack {
            message: format!("stack \"{}\" uses {target} without importing it", stack.id()),
        });
    }
    let kind = app
        .stack(&target.stack)
        .and_then(|s| s.resource(&target.logical_id))
        .map(|n| n.resource.kind());
    match kind {
        Some(ResourceKind::Registry) => Ok(()),
        Some(other) => Err(StacklineError::CrossStack {
            message: format!("{target} is a {other}, expected a registry"),
        }),
        None => Err(StacklineError::CrossStack {
            message: format!("{target} is not declared"),
        }),
    }
}

fn expect_local_kind(
    stack: &Stack,
    owner: &ResourceNode,
    target: &LogicalId,
    kind: ResourceKind,
) -> Result<()> {
    match stack.resource(target) {
        Some(node) if node.resource.kind() == kind => Ok(()),
        _ => Err(dangling(stack, owner, kind.as_str(), target.as_str())),
    }
}

fn dangling(
    stack: &Stack,
    owner: &ResourceNode,
    kind: &'static str,
    target: &str,
) -> StacklineError {
    StacklineError::DanglingReference {
        owner: format!("{} {}/{}", owner.resource.kind(), stack.id(), owner.logical_id),
        kind,
        target: target.to_string(),
    }
}

fn assign_physical(app: &App) -> Result<PhysicalIndex> {
    let env = app.environment();
    let mut index = PhysicalIndex::new();
    let mut by_arn: BTreeMap<String, ResourceRef> = BTreeMap::new();
    for stack in app.stacks() {
        for node in stack.resources() {
            let physical = physical_of(env, stack.id(), node);
            let address = ResourceRef {
                stack: stack.id().clone(),
                logical_id: node.logical_id.clone(),
            };
            if let Some(existing) = by_arn.insert(physical.arn.clone(), address.clone()) {
                return Err(StacklineError::Duplicate {
                    kind: "physical resource",
                    name: format!("{} (declared by {existing} and {address})", physical.arn),
                });
            }
            tracing::debug!(resource = %address, arn = %physical.arn, "physical id assigned");
            let _ = index.insert(address, physical);
        }
    }
    Ok(index)
}

fn physical_of(env: &EnvironmentConfig, stack: &StackId, node: &ResourceNode) -> Physical {
    let derived = || format!("{stack}-{}", node.logical_id);
    let (region, account) = (&env.region, &env.account);
    let (name, arn) = match &node.resource {
        Resource::Registry(registry) => {
            let name = registry.name.clone();
            let arn = format!("arn:aws:ecr:{region}:{account}:repository/{name}");
            (name, arn)
        }
        Resource::Role(_) => {
            let name = derived();
            let arn = format!("arn:aws:iam::{account}:role/{name}");
            (name, arn)
        }
        Resource::LogSink(sink) => {
            let name = sink.name.clone().unwrap_or_else(derived);
            let arn = format!("arn:aws:logs:{region}:{account}:log-group:{name}");
            (name, arn)
        }
        Resource::TaskSpec(task) => {
            let name = task.family.clone();
            let arn = format!("arn:aws:ecs:{region}:{account}:task-definition/{name}");
            (name, arn)
        }
        Resource::Service(_) => {
            let name = derived();
            let arn = format!("arn:aws:ecs:{region}:{account}:service/{stack}/{name}");
            (name, arn)
        }
    };
    Physical {
        kind: node.resource.kind(),
        name,
        arn,
    }
}

fn plan_resource(
    env: &EnvironmentConfig,
    stack: &Stack,
    node: &ResourceNode,
    physical: &PhysicalIndex,
) -> Result<PlannedResource> {
    let address = |id: &LogicalId| ResourceRef {
        stack: stack.id().clone(),
        logical_id: id.clone(),
    };
    let lookup = |target: &ResourceRef| {
        physical.get(target).ok_or_else(|| StacklineError::CrossStack {
            message: format!("{target} has no physical identity"),
        })
    };

    let mut references = node
        .resource
        .references()
        .into_iter()
        .map(|reference| {
            let target = match reference {
                Reference::Local(id) => address(&id),
                Reference::Imported(target) => target,
            };
            lookup(&target).map(|p| p.arn.clone())
        })
        .collect::<Result<Vec<_>>>()?;
    references.sort();

    let properties = match &node.resource {
        Resource::Registry(registry) => serde_json::to_value(registry)?,
        Resource::Role(role) => {
            let mut value = serde_json::to_value(role)?;
            let arns: Vec<String> = role.managed_policies.iter().map(ManagedPolicy::arn).collect();
            if let Some(fields) = value.as_object_mut() {
                let _ = fields.insert("managed_policy_arns".into(), arns.into());
            }
            value
        }
        Resource::LogSink(sink) => serde_json::to_value(sink)?,
        Resource::TaskSpec(task) => {
            let resolved = resolve_task(env, stack, task, physical)?;
            serde_json::to_value(resolved)?
        }
        Resource::Service(service) => serde_json::to_value(service)?,
    };

    let own = lookup(&address(&node.logical_id))?;
    Ok(PlannedResource {
        logical_id: node.logical_id.clone(),
        local_name: node.local_name.clone(),
        kind: node.resource.kind(),
        physical_name: own.name.clone(),
        physical_id: own.arn.clone(),
        removal_policy: node.resource.removal_policy(),
        references,
        properties,
    })
}

/// Copy of `task` with registry images turned into URIs and name tokens
/// in environment values rendered.
fn resolve_task(
    env: &EnvironmentConfig,
    stack: &Stack,
    task: &TaskSpec,
    physical: &PhysicalIndex,
) -> Result<TaskSpec> {
    let mut resolved = task.clone();
    for container in &mut resolved.containers {
        if let ImageRef::Registry { repository, tag } = &container.image {
            let registry = physical
                .get(repository)
                .filter(|p| p.kind == ResourceKind::Registry)
                .ok_or_else(|| StacklineError::CrossStack {
                    message: format!(
                        "container \"{}\" pulls from unresolvable registry {repository}",
                        container.name
                    ),
                })?;
            container.image = ImageRef::Uri {
                uri: image_uri(env, &registry.name, tag),
            };
        }
        for value in container.environment.values_mut() {
            let rendered = reference::render_name_tokens(value, |id| {
                physical
                    .get(&ResourceRef {
                        stack: stack.id().clone(),
                        logical_id: id.clone(),
                    })
                    .map(|p| p.name.clone())
            })
            .map_err(|id| StacklineError::DanglingReference {
                owner: format!("container \"{}\"", container.name),
                kind: "resource",
                target: id.to_string(),
            })?;
            *value = rendered;
        }
    }
    Ok(resolved)
}
