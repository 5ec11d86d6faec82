//! Show the meeting points the fleet will use.

use anyhow::Result;
use colored::Colorize;
use std::path::Path;
use waymark::prelude::*;

use crate::commands::id_set;
use crate::config::Config;

pub fn run(config_path: Option<&Path>, count: usize) -> Result<()> {
    let config = Config::load(config_path)?;
    let fleet = config.build_fleet()?;
    let meetings = fleet.meetings();

    println!("{}", "Waymark Meeting Schedule".white().bold());
    println!("{}", "═".repeat(40).dimmed());
    println!("  Policy: {:?}", config.schedule.policy);
    println!();

    if meetings.is_empty() {
        println!("  {} No two partitions share an edge", "•".yellow());
        return Ok(());
    }

    for meeting in meetings {
        let ticks: Vec<String> = calendar(meeting, count).iter().map(Tick::to_string).collect();
        println!(
            "  {} agents {} every {} ticks",
            meeting.vertex.to_string().cyan(),
            id_set(&meeting.participants),
            meeting.schedule.interval()
        );
        println!("      at {}", ticks.join(", ").dimmed());
    }

    Ok(())
}
