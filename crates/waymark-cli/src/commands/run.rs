//! Run the fleet simulation.

use anyhow::Result;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use waymark::prelude::*;

use crate::commands::id_set;
use crate::config::Config;

pub fn run(config_path: Option<&Path>, ticks: Option<u64>, json: bool) -> Result<()> {
    let config = Config::load(config_path)?;
    let ticks = ticks.unwrap_or(config.run.ticks);
    let mut fleet = config.build_fleet()?;

    if !json {
        println!(
            "{} Running {} agents on {} vertices for {} ticks...",
            "→".blue(),
            config.agents.len().to_string().cyan(),
            config.graph.vertices.len().to_string().cyan(),
            ticks.to_string().cyan()
        );
    }

    let pb = if json {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(ticks)
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ticks")?
            .progress_chars("#>-"),
    );

    for _ in 0..ticks {
        let tick = fleet.current_tick();
        for event in fleet.tick()? {
            if let Some(line) = describe_event(tick, &event) {
                pb.println(line);
            }
        }
        pb.inc(1);
    }
    pb.finish_with_message("done");

    if json {
        println!("{}", serde_json::to_string_pretty(&fleet.snapshot())?);
        return Ok(());
    }

    let stats = fleet.stats();
    println!();
    println!("{} Simulation complete!", "✓".green().bold());
    println!(
        "  Agents:          {} active, {} removed",
        stats.agents_active.to_string().green(),
        stats.agents_removed.to_string().yellow()
    );
    println!(
        "  Meetings:        {} held, {} partially missed, {} missed",
        stats.meetings_held.to_string().green(),
        stats.meetings_partially_missed.to_string().yellow(),
        stats.meetings_missed.to_string().red()
    );
    println!("  Redistributions: {}", stats.redistributions.to_string().cyan());
    println!("  Gossip:          {}", stats.gossip_exchanges);
    println!(
        "  Replicas:        {}",
        if stats.converged {
            "converged".green()
        } else {
            "diverged".red()
        }
    );
    println!();
    for line in fleet.describe() {
        println!("  {}", line);
    }

    Ok(())
}

/// The events worth a line above the progress bar.
fn describe_event(tick: Tick, event: &FleetEvent) -> Option<String> {
    let at = format!("[{:>4}]", tick).dimmed();
    let line = match event {
        FleetEvent::AgentRemoved { id } => format!("{} {} removed", at, id.to_string().red()),
        FleetEvent::Blocked { id, target } => {
            format!("{} {} cannot reach {}", at, id, target.to_string().yellow())
        }
        FleetEvent::Agent { id, event } => match event {
            AgentEvent::AssignmentPublished { partitions } => {
                format!("{} {} published {} partitions", at, id, partitions)
            }
            AgentEvent::PartitionAdopted { partition, .. } => {
                format!("{} {} patrols {}", at, id, partition.to_string().cyan())
            }
            AgentEvent::MeetingPartiallyMissed { vertex, absent, .. } => format!(
                "{} {} at {}: {} absent",
                at,
                id,
                vertex,
                id_set(absent).yellow()
            ),
            AgentEvent::RedistributionPublished { excluded } => format!(
                "{} {} published layout without {}",
                at,
                id,
                id_set(excluded).red()
            ),
            _ => return None,
        },
        FleetEvent::Moved { .. } | FleetEvent::TickComplete { .. } => return None,
    };
    Some(line)
}
