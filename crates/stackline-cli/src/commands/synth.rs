//! `stackline synth` — Synthesize the stacks into a JSON plan.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use stackline_common::config::StacklineConfig;
use stackline_stacks::synth;

/// Arguments for the `synth` command.
#[derive(Args, Debug)]
pub struct SynthArgs {
    /// Write the plan to this file instead of stdout.
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

/// Executes the `synth` command.
///
/// # Errors
///
/// Returns an error if declaration or synthesis fails, or the plan
/// cannot be written.
pub fn execute(args: SynthArgs, config: &StacklineConfig) -> anyhow::Result<()> {
    let declared = super::declare(config)?;
    let plan = synth::synthesize(&declared.app).context("synthesizing")?;
    let json = plan.to_json()?;
    match args.out {
        Some(path) => {
            std::fs::write(&path, format!("{json}\n"))
                .with_context(|| format!("writing {}", path.display()))?;
            tracing::info!(path = %path.display(), stacks = plan.stacks.len(), "plan written");
        }
        None => println!("{json}"),
    }
    Ok(())
}
