//! Configuration management for Waymark CLI.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::debug;
use waymark::prelude::*;

pub const CONFIG_FILE: &str = "waymark.toml";

/// Waymark project configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default = "default_agents")]
    pub agents: Vec<AgentConfig>,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub comm: CommConfig,
    #[serde(default)]
    pub redistribution: RedistributionConfig,
    #[serde(default)]
    pub faults: Vec<FaultConfig>,
    #[serde(default)]
    pub run: RunConfig,
}

/// Explicit patrol graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphConfig {
    pub vertices: Vec<u32>,
    #[serde(default)]
    pub edges: Vec<[u32; 2]>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: u32,
    pub start: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RedistributionConfig {
    #[serde(default)]
    pub policy: PolicyKind,
}

/// Scripted removal: the agent stops being scheduled at `tick`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultConfig {
    pub agent: u32,
    pub tick: Tick,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_ticks")]
    pub ticks: u64,
}

// Default value functions
fn default_line_length() -> u32 { 9 }
fn default_ticks() -> u64 { 120 }

fn default_agents() -> Vec<AgentConfig> {
    [(1, 0), (2, 4), (3, 8)]
        .into_iter()
        .map(|(id, start)| AgentConfig { id, start })
        .collect()
}

impl Default for Config {
    /// Nine-vertex line, three agents, agent 2 vanishing at tick 5.
    fn default() -> Self {
        Self {
            graph: GraphConfig::default(),
            agents: default_agents(),
            schedule: ScheduleConfig::default(),
            comm: CommConfig::default(),
            redistribution: RedistributionConfig::default(),
            faults: vec![FaultConfig { agent: 2, tick: 5 }],
            run: RunConfig::default(),
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        GraphConfig::line(default_line_length())
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            ticks: default_ticks(),
        }
    }
}

impl GraphConfig {
    pub fn line(n: u32) -> Self {
        Self {
            vertices: (0..n).collect(),
            edges: (1..n).map(|i| [i - 1, i]).collect(),
        }
    }

    pub fn build(&self) -> Result<PetPatrolGraph> {
        if self.vertices.is_empty() {
            bail!("[graph] has no vertices");
        }
        PetPatrolGraph::from_edges(
            self.vertices.iter().copied().map(VertexId),
            self.edges.iter().map(|[a, b]| (VertexId(*a), VertexId(*b))),
        )
        .context("Invalid [graph] edges")
    }
}

impl Config {
    /// Load config from an explicit path, or from waymark.toml in the
    /// current or parent directories. Falls back to the default.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit.map(Path::to_path_buf).or_else(find_config_file) {
            Some(path) => Self::load_from(&path),
            None => Ok(Config::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading config");
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    /// Save config to the specified path.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    pub fn fleet_config(&self) -> FleetConfig {
        FleetConfig {
            comm: self.comm,
            schedule: self.schedule.clone(),
            redistribution: self.redistribution.policy,
        }
    }

    pub fn roster(&self) -> BTreeSet<AgentId> {
        self.agents.iter().map(|a| AgentId(a.id)).collect()
    }

    /// Agents removed by the scripted faults, in any order.
    pub fn lost_agents(&self) -> BTreeSet<AgentId> {
        self.faults.iter().map(|f| AgentId(f.agent)).collect()
    }

    /// The layout the assigner will publish at tick 0.
    pub fn initial_layout(&self, graph: &PetPatrolGraph) -> Result<BTreeMap<AgentId, PartitionInfo>> {
        let vertices: BTreeSet<VertexId> = graph.vertices().into_iter().collect();
        Ok(PartitionAssigner::new().assign(&self.roster(), &vertices)?)
    }

    /// Validate everything and build the fleet.
    pub fn build_fleet(&self) -> Result<Fleet> {
        let mut builder = FleetBuilder::new()
            .with_graph(self.graph.build()?)
            .with_config(self.fleet_config());
        for agent in &self.agents {
            builder = builder.agent(AgentId(agent.id), VertexId(agent.start));
        }
        for fault in &self.faults {
            builder = builder.remove_at(AgentId(fault.agent), fault.tick);
        }
        Ok(builder.build()?)
    }
}

/// Find waymark.toml in current or parent directories.
fn find_config_file() -> Option<PathBuf> {
    let mut dir = std::env::current_dir().ok()?;
    loop {
        let config_path = dir.join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }
        if !dir.pop() {
            break;
        }
    }
    None
}
