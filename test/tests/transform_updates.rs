use std::sync::Arc;

use visync_server::VisualTracker;
use visync_shared::{LodConfig, Rotation, TrackerConfig, VisualHandle, VisualId};
use visync_test::{
    at, frame, identity, inline_config, started_tracker, view, viewer, RecordingPacketFactory,
    TestPacket, TestVisual,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn teleports_of(tracker: &VisualTracker<RecordingPacketFactory>, id: u32) -> Vec<TestPacket> {
    tracker
        .factory()
        .sent_to(viewer(1))
        .into_iter()
        .filter(|packet| packet.is_teleport_of(VisualId::new(id)))
        .collect()
}

/// Default distance tiers: NEAR up to 24 blocks, MID up to 56, FAR beyond.
fn tiered_config() -> TrackerConfig {
    TrackerConfig {
        lod: LodConfig::default(),
        ..inline_config()
    }
}

#[test]
fn rotation_only_change_is_teleported() {
    init_logger();
    let tracker = started_tracker(inline_config());
    let visual = TestVisual::handle(1);
    tracker.register(visual.clone(), at(0.0, 0.0), identity());
    tracker.tick(vec![frame(1, 0.0, 0.0)], view(64.0));
    tracker.factory().clear();

    let quarter_turn = Rotation::new(0.0, 0.7071, 0.0, 0.7071);
    tracker.update_state(&visual, at(0.0, 0.0), quarter_turn);
    tracker.tick(vec![frame(1, 0.0, 0.0)], view(64.0));

    assert_eq!(
        teleports_of(&tracker, 1),
        vec![TestPacket::Teleport {
            id: VisualId::new(1),
            position: [0.0, 64.0, 0.0],
            rotation: quarter_turn,
            on_ground: false,
        }]
    );
}

#[test]
fn teleport_reports_ground_contact_from_the_visual() {
    let tracker = started_tracker(inline_config());
    let visual = Arc::new(TestVisual::new(1));
    let handle: VisualHandle = visual.clone();
    tracker.register(handle.clone(), at(1.0, 1.0), identity());
    tracker.tick(vec![frame(1, 0.0, 0.0)], view(64.0));
    tracker.factory().clear();

    visual.set_grounded(true);
    tracker.update_state(&handle, at(2.0, 1.0), identity());
    tracker.tick(vec![frame(1, 0.0, 0.0)], view(64.0));

    let teleports = teleports_of(&tracker, 1);
    assert_eq!(teleports.len(), 1);
    assert!(matches!(teleports[0], TestPacket::Teleport { on_ground: true, .. }));
}

#[test]
fn mid_tier_moves_are_thinned_and_the_last_pose_arrives() {
    init_logger();
    let tracker = started_tracker(tiered_config());
    let visual = TestVisual::handle(1);
    tracker.register(visual.clone(), at(30.0, 0.0), identity());
    // spawned at tick 1
    tracker.tick(vec![frame(1, 0.0, 0.0)], view(64.0));
    tracker.factory().clear();

    for step in 2..=6 {
        tracker.update_state(&visual, at(30.0 + f64::from(step), 0.0), identity());
        tracker.tick(vec![frame(1, 0.0, 0.0)], view(64.0));
    }
    // ticks 3 and 5 send, 2, 4 and 6 wait
    assert_eq!(teleports_of(&tracker, 1).len(), 2);
    assert_eq!(tracker.stats().lod_skipped_updates, 3);

    tracker.tick(vec![frame(1, 0.0, 0.0)], view(64.0));
    let teleports = teleports_of(&tracker, 1);
    assert_eq!(teleports.len(), 3);
    assert!(matches!(
        teleports.last(),
        Some(TestPacket::Teleport { position, .. }) if *position == [36.0, 64.0, 0.0]
    ));

    // settled, nothing more is owed
    tracker.tick(vec![frame(1, 0.0, 0.0)], view(64.0));
    tracker.tick(vec![frame(1, 0.0, 0.0)], view(64.0));
    assert_eq!(teleports_of(&tracker, 1).len(), 3);
}

#[test]
fn near_tier_ignores_tiny_moves() {
    let tracker = started_tracker(tiered_config());
    let visual = TestVisual::handle(1);
    tracker.register(visual.clone(), at(5.0, 0.0), identity());
    tracker.tick(vec![frame(1, 0.0, 0.0)], view(64.0));
    tracker.factory().clear();

    tracker.update_state(&visual, at(5.005, 0.0), identity());
    tracker.tick(vec![frame(1, 0.0, 0.0)], view(64.0));
    assert!(teleports_of(&tracker, 1).is_empty());

    tracker.update_state(&visual, at(6.0, 0.0), identity());
    tracker.tick(vec![frame(1, 0.0, 0.0)], view(64.0));
    assert_eq!(teleports_of(&tracker, 1).len(), 1);
}

#[test]
fn far_metadata_is_owed_until_the_visual_comes_near() {
    let tracker = started_tracker(tiered_config());
    let visual = TestVisual::handle(1);
    tracker.register(visual.clone(), at(60.0, 0.0), identity());
    tracker.tick(vec![frame(1, 0.0, 0.0)], view(64.0));
    tracker.factory().clear();

    tracker.update_metadata(&visual, false);
    tracker.tick(vec![frame(1, 0.0, 0.0)], view(64.0));
    tracker.tick(vec![frame(1, 0.0, 0.0)], view(64.0));
    assert_eq!(tracker.factory().metadata_count(viewer(1), VisualId::new(1)), 0);
    assert_eq!(tracker.stats().lod_skipped_metadata_updates, 2);

    tracker.update_state(&visual, at(10.0, 0.0), identity());
    tracker.tick(vec![frame(1, 0.0, 0.0)], view(64.0));
    assert_eq!(tracker.factory().metadata_count(viewer(1), VisualId::new(1)), 1);
    assert_eq!(tracker.factory().teleport_count(viewer(1), VisualId::new(1)), 1);
}

#[test]
fn critical_metadata_reaches_far_viewers() {
    let tracker = started_tracker(tiered_config());
    let visual = TestVisual::handle(1);
    tracker.register(visual.clone(), at(60.0, 0.0), identity());
    tracker.tick(vec![frame(1, 0.0, 0.0)], view(64.0));
    tracker.factory().clear();

    tracker.update_metadata(&visual, true);
    tracker.tick(vec![frame(1, 0.0, 0.0)], view(64.0));
    assert_eq!(tracker.factory().metadata_count(viewer(1), VisualId::new(1)), 1);
    assert_eq!(tracker.stats().lod_skipped_metadata_updates, 0);
}

#[test]
fn batch_registration_spawns_all_and_respawns_replaced() {
    init_logger();
    let tracker = started_tracker(inline_config());
    let tokens = tracker.register_batch(
        (1..=3).map(|id| (TestVisual::handle(id), at(f64::from(id), 0.0), identity())),
    );
    assert_eq!(tokens, vec![1, 1, 1]);
    tracker.tick(vec![frame(1, 0.0, 0.0)], view(64.0));
    assert_eq!(
        tracker.visible_ids(viewer(1)),
        vec![VisualId::new(1), VisualId::new(2), VisualId::new(3)]
    );
    tracker.factory().clear();

    let tokens = tracker.register_batch(
        (2..=3).map(|id| (TestVisual::handle(id), at(f64::from(id), 1.0), identity())),
    );
    assert_eq!(tokens, vec![2, 2]);
    tracker.tick(vec![frame(1, 0.0, 0.0)], view(64.0));

    let factory = tracker.factory();
    assert_eq!(factory.spawn_count(viewer(1), VisualId::new(1)), 0);
    for id in [2, 3] {
        assert_eq!(factory.destroy_count(viewer(1), VisualId::new(id)), 1);
        assert_eq!(factory.spawn_count(viewer(1), VisualId::new(id)), 1);
    }
    assert_eq!(tracker.visible_ids(viewer(1)).len(), 3);
}
