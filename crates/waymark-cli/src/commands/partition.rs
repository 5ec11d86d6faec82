//! Show the initial layout and what the scripted faults turn it into.

use anyhow::Result;
use colored::Colorize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use waymark::prelude::*;

use crate::commands::id_set;
use crate::config::Config;

pub fn run(config_path: Option<&Path>) -> Result<()> {
    let config = Config::load(config_path)?;
    let graph = config.graph.build()?;
    let layout = config.initial_layout(&graph)?;

    println!("{}", "Waymark Partitions".white().bold());
    println!("{}", "═".repeat(40).dimmed());
    println!();
    println!("{}", "Initial layout".blue().bold());
    print_layout(&layout);

    let lost = config.lost_agents();
    if lost.is_empty() {
        return Ok(());
    }

    let policy = config.redistribution.policy.build(&graph);
    let after = policy.redistribute(&layout, &lost)?;
    let vertices: BTreeSet<VertexId> = graph.vertices().into_iter().collect();
    PartitionAssigner::check_partition(&after, &vertices)?;

    println!();
    println!(
        "{} ({} policy, lost {})",
        "After scripted faults".blue().bold(),
        policy.name(),
        id_set(&lost).red()
    );
    print_layout(&after);

    Ok(())
}

fn print_layout(layout: &BTreeMap<AgentId, PartitionInfo>) {
    for (agent, partition) in layout {
        println!(
            "  {:<10} {} ({} vertices)",
            agent.to_string().cyan(),
            partition,
            partition.len()
        );
    }
}
