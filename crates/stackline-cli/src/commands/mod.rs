//! CLI command definitions and dispatch.

pub mod plan;
pub mod simulate;
pub mod synth;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use stackline_common::config::StacklineConfig;
use stackline_stacks::app::App;
use stackline_stacks::registry_stack::{RegistryStack, RegistryStackProps};
use stackline_stacks::service_stack::{ServiceStack, ServiceStackProps};

/// Declarative provisioning of a registry and a load-balanced web service.
#[derive(Parser, Debug)]
#[command(name = stackline_common::constants::BIN_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Path to a YAML or JSON configuration file.
    #[arg(long, short, global = true, env = "STACKLINE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Synthesize the stacks and emit the plan as JSON.
    Synth(synth::SynthArgs),
    /// Display the plan in deployment order.
    Plan(plan::PlanArgs),
    /// Run the plan on the simulated runtime.
    Simulate(simulate::SimulateArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or the command
/// fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Synth(args) => synth::execute(args, &config),
        Command::Plan(args) => plan::execute(args, &config),
        Command::Simulate(args) => simulate::execute(args, &config),
    }
}

/// The stacks declared from one configuration.
pub struct Declared {
    /// App holding every stack.
    pub app: App,
    /// The registry stack.
    pub registry: RegistryStack,
    /// The service stack.
    pub service: ServiceStack,
}

/// Declares the registry and service stacks described by `config`.
///
/// # Errors
///
/// Returns an error if either stack cannot be declared.
pub fn declare(config: &StacklineConfig) -> anyhow::Result<Declared> {
    let mut app = App::from_config(config);
    let registry = RegistryStack::new(
        &mut app,
        &config.registry.stack_name,
        RegistryStackProps::from(&config.registry),
    )
    .context("declaring registry stack")?;
    let service = ServiceStack::new(
        &mut app,
        &config.service.stack_name,
        ServiceStackProps::from_config(registry.repository(), config),
    )
    .context("declaring service stack")?;
    Ok(Declared {
        app,
        registry,
        service,
    })
}

fn load_config(path: Option<&Path>) -> anyhow::Result<StacklineConfig> {
    match path {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading configuration");
            StacklineConfig::load(path).with_context(|| format!("loading {}", path.display()))
        }
        None => Ok(StacklineConfig::default()),
    }
}
