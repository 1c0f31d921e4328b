use visync_server::{drain_queue, DrainBudget, EnqueueResult, PlayerPacketQueue, QueuedPacket, VisualTokenService};
use visync_shared::{PacketPriority, VisualId};
use visync_test::{at, frame, identity, inline_config, started_tracker, view, viewer, TestPacket, TestVisual};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn flush_drops_packets_built_against_an_old_token() {
    init_logger();
    let tokens = VisualTokenService::new();
    let id = VisualId::new(42);
    let queue = PlayerPacketQueue::new();
    let validator = |id, token| tokens.is_current(Some(id), Some(token));

    let first = tokens.bump(id);
    assert_eq!(first, 1);
    queue.add(
        QueuedPacket::new("before", PacketPriority::Spawn, 10).for_visual(id, first),
        validator,
    );

    let second = tokens.bump(id);
    assert_eq!(second, 2);
    queue.add(
        QueuedPacket::new("after", PacketPriority::Spawn, 10).for_visual(id, second),
        validator,
    );

    let drain = drain_queue(&queue, &DrainBudget::unlimited(), None, validator);
    assert_eq!(drain.payloads, vec!["after"]);
    assert_eq!(drain.dropped_stale, 1);
}

#[test]
fn stale_packet_is_rejected_at_enqueue() {
    let tokens = VisualTokenService::new();
    let id = VisualId::new(42);
    let stale = tokens.bump(id);
    tokens.bump(id);

    let queue = PlayerPacketQueue::new();
    let result = queue.add(
        QueuedPacket::new((), PacketPriority::Teleport, 10).for_visual(id, stale),
        |id, token| tokens.is_current(Some(id), Some(token)),
    );
    assert_eq!(result, EnqueueResult::Rejected);
    assert!(queue.is_empty());
}

#[test]
fn untracked_packets_are_always_current() {
    let tokens = VisualTokenService::new();
    assert!(tokens.is_current(None, Some(3)));
    assert!(tokens.is_current(Some(VisualId::new(1)), None));
    assert!(!tokens.is_current(Some(VisualId::new(1)), Some(3)));
}

#[test]
fn invalidate_visual_removes_only_mismatched_tokens() {
    let queue = PlayerPacketQueue::new();
    let id = VisualId::new(9);
    let ok = |_: VisualId, _: u64| true;
    queue.add(QueuedPacket::new("old-spawn", PacketPriority::Spawn, 10).for_visual(id, 1), ok);
    queue.add(QueuedPacket::new("old-meta", PacketPriority::Metadata, 10).for_visual(id, 1), ok);
    queue.add(QueuedPacket::new("new-spawn", PacketPriority::Spawn, 10).for_visual(id, 2), ok);
    queue.add(QueuedPacket::new("untracked", PacketPriority::Teleport, 10).for_untracked_visual(id), ok);
    queue.add(QueuedPacket::new("destroy", PacketPriority::Destroy, 10).for_visual(id, 1), ok);

    assert_eq!(queue.invalidate_visual(id, 2), 2);
    let payloads: Vec<&str> = std::iter::from_fn(|| queue.poll().map(|packet| *packet.payload())).collect();
    assert_eq!(payloads, vec!["destroy", "new-spawn", "untracked"]);
}

#[test]
fn re_registration_respawns_with_fresh_token() {
    init_logger();
    let tracker = started_tracker(inline_config());
    let visual = TestVisual::handle(42);
    let first = tracker.register(visual.clone(), at(4.0, 4.0), identity());

    tracker.tick(vec![frame(1, 0.0, 0.0)], view(64.0));
    let factory = tracker.factory();
    assert_eq!(factory.spawn_count(viewer(1), VisualId::new(42)), 1);
    factory.clear();

    let second = tracker.register(visual.clone(), at(6.0, 6.0), identity());
    assert!(second > first);

    tracker.tick(vec![frame(1, 0.0, 0.0)], view(64.0));
    let sent = factory.sent_to(viewer(1));
    assert_eq!(
        sent,
        vec![
            TestPacket::Destroy { ids: vec![VisualId::new(42)] },
            TestPacket::Spawn { id: VisualId::new(42) },
            TestPacket::Metadata { id: VisualId::new(42), entries: 2 },
        ]
    );
    assert_eq!(tracker.visible_ids(viewer(1)), vec![VisualId::new(42)]);
}
