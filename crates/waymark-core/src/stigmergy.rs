//! Virtual stigmergy: a gossip-replicated key/value store.
//!
//! Every agent owns one replica. Nothing is shared in memory: replicas
//! meet only when an agent piggybacks its entries on a message and the
//! receiver merges them. Merging is commutative, associative and
//! idempotent, so replicas that see the same set of entries agree
//! regardless of delivery order or relay path.
//!
//! The conflict rule is a plain function pointer. The default,
//! [`lowest_owner_wins`], is static priority by identity: the entry
//! written by the numerically smallest agent id wins.

use crate::types::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

/// One versioned value in a replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StigmergyEntry<K, V> {
    pub key: K,
    pub value: V,
    /// The agent that wrote this value with `put`.
    pub owner_agent_id: AgentId,
    /// The owner's write counter at the time of the write.
    pub local_version: u64,
}

/// Verdict of a conflict resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    KeepLocal,
    AdoptIncoming,
}

/// What a merge did to the replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The key was unknown; the remote entry was adopted.
    Adopted,
    /// The remote entry won the conflict and replaced the local one.
    Replaced,
    /// The local entry won (or the entries were identical).
    Kept,
}

impl MergeOutcome {
    pub fn changed(&self) -> bool {
        !matches!(self, MergeOutcome::Kept)
    }
}

/// Pure conflict rule: `(key, local, incoming) -> winner`.
pub type ConflictResolver<K, V> =
    fn(&K, &StigmergyEntry<K, V>, &StigmergyEntry<K, V>) -> Resolution;

/// Lowest owner id wins; versions only order two writes of the same owner.
pub fn lowest_owner_wins<K, V>(
    _key: &K,
    local: &StigmergyEntry<K, V>,
    incoming: &StigmergyEntry<K, V>,
) -> Resolution {
    match incoming.owner_agent_id.cmp(&local.owner_agent_id) {
        Ordering::Less => Resolution::AdoptIncoming,
        Ordering::Greater => Resolution::KeepLocal,
        Ordering::Equal if incoming.local_version > local.local_version => {
            Resolution::AdoptIncoming
        }
        Ordering::Equal => Resolution::KeepLocal,
    }
}

/// One agent's replica of the shared store.
#[derive(Debug, Clone)]
pub struct StigmergyStore<K, V> {
    owner: AgentId,
    entries: BTreeMap<K, StigmergyEntry<K, V>>,
    /// Highest version this owner has written (or seen for itself).
    clock: u64,
    resolver: ConflictResolver<K, V>,
}

impl<K, V> StigmergyStore<K, V>
where
    K: Ord + Clone,
    V: Clone + PartialEq,
{
    /// Create an empty replica using the lowest-owner-wins rule.
    pub fn new(owner: AgentId) -> Self {
        Self::with_resolver(owner, lowest_owner_wins::<K, V>)
    }

    /// Create an empty replica with a custom conflict rule.
    pub fn with_resolver(owner: AgentId, resolver: ConflictResolver<K, V>) -> Self {
        Self {
            owner,
            entries: BTreeMap::new(),
            clock: 0,
            resolver,
        }
    }

    /// The agent owning this replica.
    pub fn owner(&self) -> AgentId {
        self.owner
    }

    /// Write a value as this replica's owner.
    ///
    /// Unconditionally replaces whatever the replica holds for `key`. A
    /// later merge may still bring back a lower-id owner's value, so a
    /// local write is not durable against the conflict rule.
    pub fn put(&mut self, key: K, value: V) -> u64 {
        self.clock += 1;
        let entry = StigmergyEntry {
            key: key.clone(),
            value,
            owner_agent_id: self.owner,
            local_version: self.clock,
        };
        self.entries.insert(key, entry);
        self.clock
    }

    /// Current local value for `key`, or `None` if never observed.
    ///
    /// `None` means "not yet synchronized"; callers poll again later.
    pub fn try_get(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|e| &e.value)
    }

    /// Full entry for `key`.
    pub fn get_entry(&self, key: &K) -> Option<&StigmergyEntry<K, V>> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Merge one remote entry into the replica.
    pub fn merge(&mut self, remote: StigmergyEntry<K, V>) -> MergeOutcome {
        if remote.owner_agent_id == self.owner {
            self.clock = self.clock.max(remote.local_version);
        }

        let Some(local) = self.entries.get(&remote.key) else {
            self.entries.insert(remote.key.clone(), remote);
            return MergeOutcome::Adopted;
        };

        if *local == remote {
            return MergeOutcome::Kept;
        }

        match (self.resolver)(&remote.key, local, &remote) {
            Resolution::KeepLocal => MergeOutcome::Kept,
            Resolution::AdoptIncoming => {
                trace!(
                    owner = %self.owner,
                    from = %local.owner_agent_id,
                    to = %remote.owner_agent_id,
                    "replacing local entry"
                );
                self.entries.insert(remote.key.clone(), remote);
                MergeOutcome::Replaced
            }
        }
    }

    /// Merge a batch of remote entries. Returns how many keys changed.
    pub fn merge_all(&mut self, remote: impl IntoIterator<Item = StigmergyEntry<K, V>>) -> usize {
        remote
            .into_iter()
            .map(|entry| self.merge(entry))
            .filter(MergeOutcome::changed)
            .count()
    }

    /// Copy of every entry, ordered by key, for piggybacking on messages.
    pub fn snapshot(&self) -> Vec<StigmergyEntry<K, V>> {
        self.entries.values().cloned().collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = &StigmergyEntry<K, V>> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether two replicas hold exactly the same entries.
    pub fn same_contents(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self.entries.values().eq(other.entries.values())
    }
}

/// The store every patrol agent carries.
pub type FleetStore = StigmergyStore<SharedKey, SharedValue>;

/// An entry of the fleet store.
pub type FleetEntry = StigmergyEntry<SharedKey, SharedValue>;

impl StigmergyStore<SharedKey, SharedValue> {
    /// Agents this replica knows to be lost.
    pub fn loss_set(&self) -> BTreeSet<AgentId> {
        self.entries
            .keys()
            .filter_map(|key| match key {
                SharedKey::Absence(agent) => Some(*agent),
                SharedKey::Partition(_) => None,
            })
            .collect()
    }

    /// Partition of `agent` for an explicit loss set.
    pub fn partition_under(&self, agent: AgentId, excluded: &BTreeSet<AgentId>) -> Option<&PartitionInfo> {
        let key = SharedKey::Partition(PartitionKey::excluding(agent, excluded.clone()));
        self.try_get(&key).and_then(SharedValue::as_partition)
    }

    /// Partition of `agent` under this replica's current loss set.
    pub fn partition_for(&self, agent: AgentId) -> Option<&PartitionInfo> {
        self.partition_under(agent, &self.loss_set())
    }

    /// Every published partition for an explicit loss set, or `None` while
    /// any surviving member of `roster` is still missing. A loss set that
    /// leaves no survivors has no layout at all.
    pub fn partitions_under(
        &self,
        roster: &BTreeSet<AgentId>,
        excluded: &BTreeSet<AgentId>,
    ) -> Option<BTreeMap<AgentId, PartitionInfo>> {
        let layout: BTreeMap<AgentId, PartitionInfo> = roster
            .iter()
            .filter(|agent| !excluded.contains(agent))
            .map(|agent| {
                self.partition_under(*agent, excluded)
                    .map(|p| (*agent, p.clone()))
            })
            .collect::<Option<_>>()?;
        (!layout.is_empty()).then_some(layout)
    }

    /// The initial layout, once every partition of it has replicated here.
    pub fn base_partitions(&self, roster: &BTreeSet<AgentId>) -> Option<BTreeMap<AgentId, PartitionInfo>> {
        self.partitions_under(roster, &BTreeSet::new())
    }

    /// Partitions keyed by the current loss set that are visible here.
    ///
    /// Lost agents never appear: their keys belong to an older loss set.
    pub fn live_partitions(&self, roster: &BTreeSet<AgentId>) -> BTreeMap<AgentId, PartitionInfo> {
        let lost = self.loss_set();
        roster
            .iter()
            .filter(|agent| !lost.contains(agent))
            .filter_map(|agent| {
                self.partition_under(*agent, &lost)
                    .map(|p| (*agent, p.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: u32, value: &str, owner: u32, version: u64) -> StigmergyEntry<u32, String> {
        StigmergyEntry {
            key,
            value: value.to_string(),
            owner_agent_id: AgentId(owner),
            local_version: version,
        }
    }

    #[test]
    fn unknown_key_is_none() {
        let store: StigmergyStore<u32, String> = StigmergyStore::new(AgentId(1));
        assert!(store.try_get(&7).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn put_versions_strictly_increase() {
        let mut store = StigmergyStore::new(AgentId(4));
        let v1 = store.put(1u32, "a".to_string());
        let v2 = store.put(2u32, "b".to_string());
        let v3 = store.put(1u32, "c".to_string());
        assert!(v1 < v2 && v2 < v3);
        assert_eq!(store.try_get(&1).map(String::as_str), Some("c"));
        assert_eq!(store.get_entry(&1).map(|e| e.owner_agent_id), Some(AgentId(4)));
    }

    #[test]
    fn merge_adopts_unknown_key() {
        let mut store = StigmergyStore::new(AgentId(5));
        assert_eq!(store.merge(entry(1, "remote", 9, 3)), MergeOutcome::Adopted);
        assert_eq!(store.try_get(&1).map(String::as_str), Some("remote"));
    }

    #[test]
    fn lower_owner_wins_regardless_of_version() {
        let mut store = StigmergyStore::new(AgentId(5));
        store.put(1u32, "mine".to_string());
        store.put(1u32, "mine-again".to_string());

        // Higher owner id never wins, even with a huge version.
        assert_eq!(store.merge(entry(1, "big", 9, 1000)), MergeOutcome::Kept);
        assert_eq!(store.try_get(&1).map(String::as_str), Some("mine-again"));

        // Lower owner id wins even with version 1.
        assert_eq!(store.merge(entry(1, "low", 2, 1)), MergeOutcome::Replaced);
        assert_eq!(store.try_get(&1).map(String::as_str), Some("low"));

        // A local put still overwrites the replica.
        store.put(1u32, "override".to_string());
        assert_eq!(store.try_get(&1).map(String::as_str), Some("override"));
        // ...until the lower owner's value arrives again.
        assert_eq!(store.merge(entry(1, "low", 2, 1)), MergeOutcome::Replaced);
    }

    #[test]
    fn same_owner_later_write_wins() {
        let mut store = StigmergyStore::new(AgentId(5));
        store.merge(entry(1, "old", 3, 1));
        assert_eq!(store.merge(entry(1, "new", 3, 2)), MergeOutcome::Replaced);
        assert_eq!(store.merge(entry(1, "old", 3, 1)), MergeOutcome::Kept);
        assert_eq!(store.try_get(&1).map(String::as_str), Some("new"));
    }

    #[test]
    fn merge_is_idempotent() {
        let mut store = StigmergyStore::new(AgentId(5));
        let e = entry(1, "x", 2, 1);
        assert!(store.merge(e.clone()).changed());
        assert!(!store.merge(e.clone()).changed());
        assert_eq!(store.merge_all(vec![e.clone(), e]), 0);
    }

    #[test]
    fn custom_resolver_is_used() {
        fn highest_owner_wins(
            _key: &u32,
            local: &StigmergyEntry<u32, String>,
            incoming: &StigmergyEntry<u32, String>,
        ) -> Resolution {
            if incoming.owner_agent_id > local.owner_agent_id {
                Resolution::AdoptIncoming
            } else {
                Resolution::KeepLocal
            }
        }

        let mut store = StigmergyStore::with_resolver(AgentId(5), highest_owner_wins);
        store.merge(entry(1, "two", 2, 1));
        store.merge(entry(1, "nine", 9, 1));
        store.merge(entry(1, "three", 3, 1));
        assert_eq!(store.try_get(&1).map(String::as_str), Some("nine"));
    }

    #[test]
    fn own_entries_relayed_back_advance_the_clock() {
        let mut store = StigmergyStore::new(AgentId(1));
        store.merge(entry(1, "from-a-previous-life", 1, 40));
        let v = store.put(2u32, "fresh".to_string());
        assert!(v > 40);
    }

    #[test]
    fn fleet_helpers_follow_the_loss_set() {
        let roster: BTreeSet<AgentId> = [AgentId(1), AgentId(2)].into_iter().collect();
        let mut store = FleetStore::new(AgentId(1));
        for agent in &roster {
            store.put(
                SharedKey::Partition(PartitionKey::initial(*agent)),
                SharedValue::Partition(PartitionInfo::new(agent.0, [VertexId(agent.0)])),
            );
        }
        assert!(store.base_partitions(&roster).is_some());
        assert_eq!(store.live_partitions(&roster).len(), 2);

        store.put(
            SharedKey::Absence(AgentId(2)),
            SharedValue::Absence(AbsenceReport {
                meeting_vertex: VertexId(1),
                tick: 10,
                reported_by: AgentId(1),
            }),
        );
        assert_eq!(store.loss_set().len(), 1);
        // Nothing published for the new loss set yet.
        assert!(store.partition_for(AgentId(1)).is_none());
        assert!(store.live_partitions(&roster).is_empty());
    }

    #[test]
    fn no_layout_without_survivors() {
        let roster: BTreeSet<AgentId> = [AgentId(1), AgentId(2)].into_iter().collect();
        let store = FleetStore::new(AgentId(1));
        assert_eq!(store.partitions_under(&roster, &roster), None);
        assert_eq!(store.base_partitions(&BTreeSet::new()), None);
    }
}
