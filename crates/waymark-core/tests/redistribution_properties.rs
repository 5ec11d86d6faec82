//! Coverage, disjointness and idempotence of every redistribution policy
//! over random rosters, graphs and loss sets.

use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use waymark_core::prelude::*;

const POLICIES: [PolicyKind; 3] = [
    PolicyKind::EvenSplit,
    PolicyKind::NearestNeighbor,
    PolicyKind::GlobalRepartition,
];

/// Undirected graph as an adjacency map.
#[derive(Debug, Clone)]
struct Adjacency(BTreeMap<VertexId, BTreeSet<VertexId>>);

impl Adjacency {
    fn distances(&self, from: VertexId) -> BTreeMap<VertexId, u32> {
        let mut dist: BTreeMap<VertexId, u32> = [(from, 0)].into_iter().collect();
        let mut queue: VecDeque<VertexId> = [from].into_iter().collect();
        while let Some(v) = queue.pop_front() {
            let d = dist[&v];
            for n in self.0.get(&v).into_iter().flatten() {
                if !dist.contains_key(n) {
                    dist.insert(*n, d + 1);
                    queue.push_back(*n);
                }
            }
        }
        dist
    }

    fn vertex_set(&self) -> BTreeSet<VertexId> {
        self.0.keys().copied().collect()
    }
}

impl PatrolGraph for Adjacency {
    fn vertices(&self) -> Vec<VertexId> {
        self.0.keys().copied().collect()
    }
    fn contains(&self, v: &VertexId) -> bool {
        self.0.contains_key(v)
    }
    fn neighbors(&self, v: &VertexId) -> Vec<VertexId> {
        self.0.get(v).map(|n| n.iter().copied().collect()).unwrap_or_default()
    }
    fn edges(&self) -> Vec<(VertexId, VertexId)> {
        self.0
            .iter()
            .flat_map(|(a, ns)| ns.iter().filter(move |b| a < *b).map(move |b| (*a, *b)))
            .collect()
    }
    fn hop_distance(&self, from: &VertexId, to: &VertexId) -> Option<u32> {
        self.distances(*from).get(to).copied()
    }
    fn next_hop(&self, from: &VertexId, to: &VertexId) -> Option<VertexId> {
        if from == to {
            return Some(*from);
        }
        let dist = self.distances(*to);
        self.neighbors(from)
            .into_iter()
            .filter_map(|n| dist.get(&n).map(|d| (*d, n)))
            .min()
            .map(|(_, n)| n)
    }
}

/// A random spanning tree on `0..n` plus a few extra edges.
fn connected_graph() -> impl Strategy<Value = Adjacency> {
    (6u32..30)
        .prop_flat_map(|n| {
            (
                Just(n),
                prop::collection::vec(any::<u32>(), (n - 1) as usize),
                prop::collection::vec((0..n, 0..n), 0..12),
            )
        })
        .prop_map(|(n, parents, extra)| {
            let mut adjacency: BTreeMap<VertexId, BTreeSet<VertexId>> =
                (0..n).map(|v| (VertexId(v), BTreeSet::new())).collect();
            let tree = (1..n).zip(parents).map(|(v, r)| (v, r % v));
            for (a, b) in tree.chain(extra).filter(|(a, b)| a != b) {
                adjacency.entry(VertexId(a)).or_default().insert(VertexId(b));
                adjacency.entry(VertexId(b)).or_default().insert(VertexId(a));
            }
            Adjacency(adjacency)
        })
}

/// Roster plus a loss set that leaves at least one survivor.
fn roster_and_losses() -> impl Strategy<Value = (BTreeSet<AgentId>, BTreeSet<AgentId>)> {
    (
        prop::collection::btree_set(1u32..40, 1..6),
        prop::collection::vec(any::<bool>(), 6),
    )
        .prop_filter_map("someone has to survive", |(ids, mask)| {
            let roster: BTreeSet<AgentId> = ids.into_iter().map(AgentId).collect();
            let lost: BTreeSet<AgentId> = roster
                .iter()
                .zip(mask)
                .filter(|(_, gone)| *gone)
                .map(|(a, _)| *a)
                .collect();
            (lost.len() < roster.len()).then_some((roster, lost))
        })
}

fn base_layout(roster: &BTreeSet<AgentId>, graph: &Adjacency) -> BTreeMap<AgentId, PartitionInfo> {
    PartitionAssigner::new().assign(roster, &graph.vertex_set()).unwrap()
}

fn seeded(owner: AgentId, layout: &BTreeMap<AgentId, PartitionInfo>) -> FleetStore {
    let mut store = FleetStore::new(owner);
    PartitionAssigner::publish(&mut store, layout);
    store
}

fn meeting() -> MeetingPoint {
    MeetingPoint::new(VertexId(0), [AgentId(1), AgentId(2)], MeetingSchedule::fixed(10, 20).unwrap())
}

proptest! {
    #[test]
    fn every_policy_covers_the_graph_disjointly(
        graph in connected_graph(),
        (roster, lost) in roster_and_losses(),
    ) {
        let base = base_layout(&roster, &graph);
        let survivors: BTreeSet<AgentId> = roster.difference(&lost).copied().collect();
        for kind in POLICIES {
            let policy = kind.build(&graph);
            let result = policy.redistribute(&base, &lost).unwrap();

            prop_assert_eq!(result.keys().copied().collect::<BTreeSet<_>>(), survivors.clone());
            prop_assert!(
                PartitionAssigner::check_partition(&result, &graph.vertex_set()).is_ok(),
                "{} broke the layout", policy.name()
            );
            prop_assert_eq!(&policy.redistribute(&base, &lost).unwrap(), &result);

            if kind != PolicyKind::GlobalRepartition {
                for agent in &survivors {
                    prop_assert!(base[agent].vertex_ids.is_subset(&result[agent].vertex_ids));
                    prop_assert_eq!(base[agent].partition_id, result[agent].partition_id);
                }
            }
        }
    }

    #[test]
    fn nearest_neighbor_hands_orphans_to_the_closest_survivor(
        graph in connected_graph(),
        (roster, lost) in roster_and_losses(),
    ) {
        let base = base_layout(&roster, &graph);
        let result = NearestNeighbor::from_graph(&graph).redistribute(&base, &lost).unwrap();
        let survivors: Vec<AgentId> = roster.difference(&lost).copied().collect();

        for vertex in lost.iter().flat_map(|a| base[a].vertex_ids.iter().copied()) {
            let dist = graph.distances(vertex);
            let reach = |agent: &AgentId| {
                base[agent].vertex_ids.iter().filter_map(|v| dist.get(v).copied()).min()
            };
            let closest = survivors.iter().filter_map(reach).min();
            let expected = survivors
                .iter()
                .find(|a| reach(a) == closest)
                .copied();
            let owner = result
                .iter()
                .find(|(_, p)| p.contains(&vertex))
                .map(|(a, _)| *a);
            prop_assert_eq!(owner, expected);
        }
    }

    #[test]
    fn reporting_is_idempotent_and_order_independent(
        graph in connected_graph(),
        (roster, lost) in roster_and_losses(),
        policy in 0usize..3,
        split in any::<prop::sample::Index>(),
    ) {
        let policy = POLICIES[policy].build(&graph);
        let base = base_layout(&roster, &graph);
        let reporter = roster.difference(&lost).next().copied().unwrap();
        let vertices = graph.vertex_set();
        let coordinator = || {
            RedistributionCoordinator::new(reporter, roster.clone(), vertices.clone(), Arc::clone(&policy))
        };

        // Two batches of losses, reported in both orders.
        let ordered: Vec<AgentId> = lost.iter().copied().collect();
        let cut = if ordered.is_empty() { 0 } else { split.index(ordered.len() + 1) };
        let first: BTreeSet<AgentId> = ordered[..cut].iter().copied().collect();
        let second: BTreeSet<AgentId> = ordered[cut..].iter().copied().collect();

        let mut forward = seeded(reporter, &base);
        let mut c = coordinator();
        c.on_missing_agents_at_meeting(&meeting(), &first, 10, &mut forward).unwrap();
        let outcome = c.on_missing_agents_at_meeting(&meeting(), &second, 30, &mut forward).unwrap();

        let mut backward = seeded(reporter, &base);
        let mut c = coordinator();
        c.on_missing_agents_at_meeting(&meeting(), &second, 10, &mut backward).unwrap();
        c.on_missing_agents_at_meeting(&meeting(), &first, 30, &mut backward).unwrap();

        let expected = policy.redistribute(&base, &lost).unwrap();
        prop_assert_eq!(outcome.partitions(), Some(&expected));
        prop_assert_eq!(forward.partitions_under(&roster, &lost), Some(expected.clone()));
        prop_assert_eq!(backward.partitions_under(&roster, &lost), Some(expected.clone()));

        // Repeating the full report changes nothing.
        let entries = forward.len();
        let again = coordinator()
            .on_missing_agents_at_meeting(&meeting(), &lost, 50, &mut forward)
            .unwrap();
        let already_published = matches!(again, RedistributionOutcome::AlreadyPublished { .. });
        prop_assert!(already_published);
        prop_assert_eq!(again.partitions(), Some(&expected));
        prop_assert_eq!(forward.len(), entries);
    }
}
