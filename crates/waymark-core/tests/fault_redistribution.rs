//! Three agents, nine vertices, agent 2 vanishes before its rendezvous.
//!
//! Drives the core components by hand, without a fleet: replicas are
//! synchronised by explicit snapshot merges.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use waymark_core::prelude::*;

fn ids(raw: &[u32]) -> BTreeSet<AgentId> {
    raw.iter().copied().map(AgentId).collect()
}

fn sync(a: &mut FleetStore, b: &mut FleetStore) {
    let (sa, sb) = (a.snapshot(), b.snapshot());
    a.merge_all(sb);
    b.merge_all(sa);
}

#[test]
fn lost_agent_partition_goes_to_survivors() {
    let roster = ids(&[1, 2, 3]);
    let vertices: BTreeSet<VertexId> = (0..9).map(VertexId).collect();

    let mut one = FleetStore::new(AgentId(1));
    let mut two = FleetStore::new(AgentId(2));
    let mut three = FleetStore::new(AgentId(3));

    let layout = PartitionAssigner::new().assign(&roster, &vertices).unwrap();
    assert!(layout.values().all(|p| p.len() == 3));
    PartitionAssigner::publish(&mut one, &layout);
    sync(&mut one, &mut two);
    sync(&mut two, &mut three);
    for s in [&one, &two, &three] {
        assert_eq!(s.base_partitions(&roster).as_ref(), Some(&layout));
    }

    // Agent 2 drops out here; nothing from `two` is ever merged again.
    drop(two);

    let meeting = MeetingPoint::new(VertexId(2), ids(&[1, 2]), MeetingSchedule::fixed(10, 20).unwrap());
    let mut tracker = MeetingTracker::new(AgentId(1));
    assert!(tracker.arrive(&meeting, VertexId(2), 10));
    let outcome = tracker.conclude(&meeting, 10, &one.loss_set()).unwrap();
    let MeetingOutcome::PartiallyMissed { absent, reporter, .. } = outcome else {
        panic!("agent 2 should have been absent");
    };
    assert_eq!(reporter, AgentId(1));
    assert_eq!(absent, ids(&[2]));

    let mut coordinator =
        RedistributionCoordinator::new(AgentId(1), roster.clone(), vertices.clone(), Arc::new(EvenSplit));
    let published = coordinator
        .on_missing_agents_at_meeting(&meeting, &absent, 10, &mut one)
        .unwrap();
    assert!(matches!(published, RedistributionOutcome::Published { .. }));

    let mut tracker3 = MeetingTracker::new(AgentId(3));
    let report = TrackInfo::MissingRobotsAtMeeting {
        meeting: meeting.clone(),
        exchange_at_tick: 10,
        sender_agent_id: AgentId(1),
        missing_agent_ids: absent.clone(),
        reported_by_agent_id: AgentId(1),
    };
    let mut ctx = TrackContext {
        receiver: AgentId(3),
        tick: 10,
        tracker: &mut tracker3,
    };
    // Agent 3 is not a participant of this meeting: the report itself is
    // ignored, the replica is what carries the loss.
    assert!(report.process(&mut ctx).is_none());
    sync(&mut one, &mut three);

    let expected: BTreeMap<AgentId, PartitionInfo> = [
        (AgentId(1), PartitionInfo::new(0, (0..5).map(VertexId))),
        (AgentId(3), PartitionInfo::new(2, [5, 6, 7, 8].map(VertexId))),
    ]
    .into_iter()
    .collect();

    for store in [&one, &three] {
        let live = store.live_partitions(&roster);
        assert_eq!(live, expected);
        PartitionAssigner::check_partition(&live, &vertices).unwrap();
        assert!(store.partition_for(AgentId(2)).is_none());
        assert_eq!(store.loss_set(), ids(&[2]));
    }
    assert!(one.same_contents(&three));

    // Re-running the redistribution on the synced replica is a no-op.
    let again = coordinator
        .on_missing_agents_at_meeting(&meeting, &absent, 30, &mut three)
        .unwrap();
    assert_eq!(again.partitions(), Some(&expected));
    assert!(one.same_contents(&three));
}

#[test]
fn second_loss_reported_elsewhere_is_reconciled() {
    let roster = ids(&[1, 2, 3, 4]);
    let vertices: BTreeSet<VertexId> = (0..12).map(VertexId).collect();
    let layout = PartitionAssigner::new().assign(&roster, &vertices).unwrap();

    let mut one = FleetStore::new(AgentId(1));
    PartitionAssigner::publish(&mut one, &layout);
    let mut four = FleetStore::new(AgentId(4));
    four.merge_all(one.snapshot());

    let policy: Arc<dyn RedistributionPolicy> = Arc::new(EvenSplit);
    let near = MeetingPoint::new(VertexId(2), ids(&[1, 2]), MeetingSchedule::fixed(10, 20).unwrap());
    let far = MeetingPoint::new(VertexId(8), ids(&[3, 4]), MeetingSchedule::fixed(20, 20).unwrap());

    RedistributionCoordinator::new(AgentId(1), roster.clone(), vertices.clone(), policy.clone())
        .on_missing_agents_at_meeting(&near, &ids(&[2]), 10, &mut one)
        .unwrap();
    RedistributionCoordinator::new(AgentId(4), roster.clone(), vertices.clone(), policy.clone())
        .on_missing_agents_at_meeting(&far, &ids(&[3]), 20, &mut four)
        .unwrap();

    let (s1, s4) = (one.snapshot(), four.snapshot());
    one.merge_all(s4);
    four.merge_all(s1);
    assert_eq!(one.loss_set(), ids(&[2, 3]));
    assert!(one.live_partitions(&roster).is_empty());

    let mut c1 = RedistributionCoordinator::new(AgentId(1), roster.clone(), vertices.clone(), policy.clone());
    let mut c4 = RedistributionCoordinator::new(AgentId(4), roster.clone(), vertices.clone(), policy);
    let r1 = c1.reconcile(&mut one).unwrap().unwrap();
    let r4 = c4.reconcile(&mut four).unwrap().unwrap();
    assert_eq!(r1.partitions(), r4.partitions());

    let (s1, s4) = (one.snapshot(), four.snapshot());
    one.merge_all(s4);
    four.merge_all(s1);
    let live = one.live_partitions(&roster);
    assert_eq!(live.len(), 2);
    PartitionAssigner::check_partition(&live, &vertices).unwrap();
    assert_eq!(live, four.live_partitions(&roster));
}
