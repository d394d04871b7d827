//! # stackline: the Stackline CLI
//!
//! Declares the registry and service stacks, synthesizes them into a
//! provisioning plan, and runs the plan on a simulated runtime.

mod commands;
mod output;

use clap::Parser;

use crate::commands::Cli;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    commands::execute(cli)
}
