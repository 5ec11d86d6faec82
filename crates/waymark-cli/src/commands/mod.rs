//! CLI command implementations.

pub mod init;
pub mod run;
pub mod schedule;
pub mod partition;

use std::collections::BTreeSet;
use waymark::prelude::AgentId;

/// `{1,3}` style listing of agent ids.
pub(crate) fn id_set(ids: &BTreeSet<AgentId>) -> String {
    let ids: Vec<String> = ids.iter().map(|a| a.0.to_string()).collect();
    format!("{{{}}}", ids.join(","))
}
