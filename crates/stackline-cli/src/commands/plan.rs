//! `stackline plan` — Display the synthesized plan before deploying.

use clap::Args;
use stackline_common::config::StacklineConfig;
use stackline_stacks::synth;

use crate::output;

/// Arguments for the `plan` command.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Also list the references of each resource.
    #[arg(long)]
    pub references: bool,
}

/// Executes the `plan` command.
///
/// Synthesizes the stacks and prints each one in deployment order with
/// its resources and their physical identifiers.
///
/// # Errors
///
/// Returns an error if declaration or synthesis fails.
pub fn execute(args: PlanArgs, config: &StacklineConfig) -> anyhow::Result<()> {
    let declared = super::declare(config)?;
    let plan = synth::synthesize(&declared.app)?;

    println!(
        "Deployment Plan for: {} ({}/{})",
        plan.app, plan.environment.account, plan.environment.region
    );
    println!("{}", output::rule(48));
    println!();

    let mut total = 0;
    for stack in &plan.stacks {
        if stack.depends_on.is_empty() {
            println!("  Stack {}", stack.name);
        } else {
            let deps: Vec<&str> = stack.depends_on.iter().map(|d| d.as_str()).collect();
            println!("  Stack {} (after {})", stack.name, deps.join(", "));
        }
        for resource in &stack.resources {
            println!(
                "    + {:<10} {}",
                output::kind_label(resource.kind),
                resource.logical_id
            );
            println!("        {}", resource.physical_id);
            if args.references {
                for reference in &resource.references {
                    println!("        -> {reference}");
                }
            }
        }
        total += stack.resources.len();
        println!();
    }

    println!(
        "  {total} resource(s) in {} stack(s) will be deployed.",
        plan.stacks.len()
    );

    let topology = declared.service.topology();
    let graph = topology.task.start_graph()?;
    println!();
    println!("  Start order of {}:", topology.task.family);
    for name in graph.resolve_order()? {
        let essential = topology
            .task
            .container(&name)
            .is_some_and(|c| c.essential);
        let waits: Vec<String> = graph
            .dependencies_of(&name)
            .into_iter()
            .map(|(dependency, condition)| format!("{dependency} {condition}"))
            .collect();
        println!(
            "    {name}{}{}",
            if essential { "" } else { " (non-essential)" },
            if waits.is_empty() {
                String::new()
            } else {
                format!(" after {}", waits.join(", "))
            }
        );
    }
    Ok(())
}
