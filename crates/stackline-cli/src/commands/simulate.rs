//! `stackline simulate` — Run the declared service on the simulated runtime.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use stackline_common::config::StacklineConfig;
use stackline_common::constants::DEFAULT_IMAGE_TAG;
use stackline_model::resource::Resource;
use stackline_runtime::backend::{Behavior, ScriptedBackend};
use stackline_runtime::parameters::ParameterStore;
use stackline_runtime::registry::ImageRepository;
use stackline_runtime::service::ServiceScheduler;
use stackline_runtime::task::DeployContext;
use stackline_stacks::synth;

use crate::output;

/// Arguments for the `simulate` command.
#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Number of images pushed before the service starts.
    #[arg(long, default_value_t = 1)]
    pub pushes: u32,

    /// Make the init container exit non-zero.
    #[arg(long)]
    pub fail_init: bool,

    /// Leave the agent configuration parameter unset.
    #[arg(long)]
    pub missing_secret: bool,

    /// Number of reconcile rounds.
    #[arg(long, default_value_t = 3)]
    pub rounds: u32,

    /// Maximum task launches per reconcile round (defaults to twice the
    /// desired count).
    #[arg(long)]
    pub launch_budget: Option<u32>,

    /// Export container logs under this directory.
    #[arg(long)]
    pub logs_dir: Option<PathBuf>,

    /// Print reconcile reports as JSON lines.
    #[arg(long)]
    pub json: bool,
}

/// Executes the `simulate` command.
///
/// Pushes images into a repository governed by the declared registry,
/// stores the agent configuration, then reconciles the service on a
/// scripted backend and reports task health.
///
/// # Errors
///
/// Returns an error if declaration or synthesis fails, or a deploy-time
/// collaborator rejects the launch.
pub fn execute(args: SimulateArgs, config: &StacklineConfig) -> anyhow::Result<()> {
    let declared = super::declare(config)?;
    let _ = synth::synthesize(&declared.app).context("synthesizing")?;

    let handle = declared.registry.repository();
    let model = declared
        .app
        .stack(handle.stack())
        .and_then(|s| s.resource(handle.logical_id()))
        .and_then(|node| match &node.resource {
            Resource::Registry(registry) => Some(registry.clone()),
            _ => None,
        })
        .context("registry stack declares no registry")?;

    let mut repository = ImageRepository::new(model);
    println!("Repository {}", repository.name());
    for n in 1..=args.pushes {
        let receipt = repository.push(DEFAULT_IMAGE_TAG, format!("build {n}").as_bytes())?;
        println!(
            "  push #{:<3} {}  expired {}",
            receipt.pushed_seq,
            output::short_digest(&receipt.digest),
            receipt.expired.len()
        );
    }
    println!("  {} image(s) retained", repository.images().len());
    println!();

    let mut parameters = ParameterStore::new();
    if !args.missing_secret {
        parameters.put(&config.agent.parameter_name, "{}");
    }
    let mut repositories = BTreeMap::new();
    let _ = repositories.insert(handle.target().clone(), repository);
    let ctx = DeployContext {
        repositories: &repositories,
        parameters: &parameters,
    };

    let topology = declared.service.topology();
    let init_exit = i32::from(args.fail_init);
    let backend = ScriptedBackend::new().with(&topology.init_container, Behavior::Exit(init_exit));
    let mut scheduler = ServiceScheduler::new(
        declared.service.service().clone(),
        topology.task.clone(),
        backend,
    );
    if let Some(budget) = args.launch_budget {
        scheduler = scheduler.with_launch_budget(budget);
    }

    println!(
        "Service {} (desired {})",
        topology.task.family, config.service.desired_count
    );
    for round in 1..=args.rounds {
        let report = scheduler.reconcile(ctx)?;
        if args.json {
            println!("{}", serde_json::to_string(&report)?);
        } else {
            println!(
                "  round {round}: launched {} replaced {} healthy {}",
                report.launched, report.replaced, report.healthy
            );
        }
    }
    println!();

    for task in scheduler.all_tasks() {
        println!("  task {} {}", task.id(), output::task_status(task.status()));
        for container in &topology.task.containers {
            let state = task
                .state(&container.name)
                .map_or_else(|| "-".to_string(), |s| s.to_string());
            println!("    {:<24} {state}", container.name);
        }
    }

    if let Some(dir) = args.logs_dir {
        let written = scheduler.runner().logs().export(&dir)?;
        println!();
        println!("  {} log stream(s) written to {}", written.len(), dir.display());
    }
    Ok(())
}
