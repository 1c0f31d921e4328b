use std::sync::Arc;

use visync_server::{
    ChunkGridIndex, StateUpdate, VisualRegistry, VisualTokenService, VisualTombstoneService,
};
use visync_shared::VisualId;
use visync_test::{at, identity, inline_config, started_tracker, TestVisual};

fn registry() -> VisualRegistry {
    VisualRegistry::new(
        Arc::new(ChunkGridIndex::new()),
        Arc::new(VisualTokenService::new()),
        Arc::new(VisualTombstoneService::new()),
    )
}

#[test]
fn update_inside_tombstone_window_is_ignored() {
    let registry = registry();
    let visual = TestVisual::handle(7);
    registry.register(visual.clone(), at(1.0, 1.0), identity());

    assert!(registry.unregister(VisualId::new(7), 40).is_some());
    assert_eq!(
        registry.update_state(&visual, at(2.0, 2.0), identity(), 10),
        StateUpdate::Suppressed
    );
    assert!(!registry.contains(VisualId::new(7)));
    assert!(registry.chunk_grid().get(at(2.0, 2.0).chunk_key()).is_empty());
}

#[test]
fn tombstone_expires_after_its_tick() {
    let tombstones = VisualTombstoneService::new();
    let id = VisualId::new(7);
    tombstones.add(id, 40);
    assert!(tombstones.is_tombstoned(id, 39));
    assert!(tombstones.is_tombstoned(id, 40));
    assert!(!tombstones.is_tombstoned(id, 41));
    // lazily evicted on the read above
    assert!(tombstones.is_empty());
}

#[test]
fn prune_expired_sweeps_unread_tombstones() {
    let tombstones = VisualTombstoneService::new();
    tombstones.add(VisualId::new(1), 5);
    tombstones.add(VisualId::new(2), 50);
    assert_eq!(tombstones.prune_expired(10), 1);
    assert_eq!(tombstones.len(), 1);
}

#[test]
fn update_after_expiry_registers_again() {
    let registry = registry();
    let visual = TestVisual::handle(7);
    registry.register(visual.clone(), at(1.0, 1.0), identity());
    registry.unregister(VisualId::new(7), 40);

    match registry.update_state(&visual, at(3.0, 3.0), identity(), 41) {
        StateUpdate::Registered(registration) => {
            assert!(!registration.replaced);
            assert_eq!(registration.token, 2);
        }
        other => panic!("expected implicit register, got {:?}", other),
    }
    assert!(registry.contains(VisualId::new(7)));
}

#[test]
fn tracker_reports_closed_ids_until_expiry() {
    let mut config = inline_config();
    config.tombstone_ttl_ticks = 3;
    let tracker = started_tracker(config);
    let visual = TestVisual::handle(7);
    tracker.register(visual.clone(), at(1.0, 1.0), identity());

    assert!(tracker.unregister(&visual));
    assert!(!tracker.unregister(&visual));
    assert!(tracker.is_visual_closed(VisualId::new(7)));
    assert_eq!(
        tracker.update_state(&visual, at(2.0, 2.0), identity()),
        StateUpdate::Suppressed
    );
    assert!(!tracker.update_metadata(&visual, true));

    for _ in 0..4 {
        tracker.tick(Vec::new(), 0.0);
    }
    assert!(!tracker.is_visual_closed(VisualId::new(7)));

    tracker.register(visual.clone(), at(2.0, 2.0), identity());
    assert!(tracker.registry().contains(VisualId::new(7)));
}

#[test]
fn register_reopens_a_tombstoned_id_immediately() {
    let tracker = started_tracker(inline_config());
    let visual = TestVisual::handle(7);
    tracker.register(visual.clone(), at(1.0, 1.0), identity());
    tracker.unregister(&visual);

    tracker.register(visual.clone(), at(1.0, 1.0), identity());
    assert!(!tracker.is_visual_closed(VisualId::new(7)));
    assert!(matches!(
        tracker.update_state(&visual, at(1.5, 1.0), identity()),
        StateUpdate::Moved { chunk_changed: false }
    ));
}
