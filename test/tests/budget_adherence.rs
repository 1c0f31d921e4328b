use std::time::Duration;

use visync_server::{drain_queue, DestroyBurst, DrainBudget, PlayerPacketQueue, QueuedPacket};
use visync_shared::PacketPriority;
use visync_test::{
    at, frame, identity, inline_config, started_tracker_with, view, viewer, RecordingPacketFactory,
    TestVisual,
};

fn byte_budget(max_bytes: usize) -> DrainBudget {
    DrainBudget {
        time_budget: Duration::from_secs(60),
        max_bytes,
        max_packets: 0,
        destroy_extra_packets: 0,
        burst: DestroyBurst::default(),
    }
}

#[test]
fn drain_takes_exact_prefix_in_priority_order() {
    let queue = PlayerPacketQueue::new();
    queue.add(QueuedPacket::new("metadata", PacketPriority::Metadata, 30), |_, _| true);
    queue.add(QueuedPacket::new("teleport", PacketPriority::Teleport, 30), |_, _| true);
    queue.add(QueuedPacket::new("spawn", PacketPriority::Spawn, 50), |_, _| true);
    queue.add(QueuedPacket::new("destroy", PacketPriority::Destroy, 10), |_, _| true);

    let drain = drain_queue(&queue, &byte_budget(90), None, |_, _| true);
    assert_eq!(drain.payloads, vec!["destroy", "spawn", "teleport"]);
    assert_eq!(drain.bytes, 90);
    assert_eq!(queue.len(), 1);

    let drain = drain_queue(&queue, &byte_budget(90), None, |_, _| true);
    assert_eq!(drain.payloads, vec!["metadata"]);
}

#[test]
fn drain_stops_at_first_packet_that_does_not_fit() {
    let queue = PlayerPacketQueue::new();
    for (payload, size) in [("a", 40), ("b", 70), ("c", 10)] {
        queue.add(QueuedPacket::new(payload, PacketPriority::Teleport, size), |_, _| true);
    }
    let drain = drain_queue(&queue, &byte_budget(100), None, |_, _| true);
    // "c" would fit, but the drain never skips ahead of the lane head
    assert_eq!(drain.payloads, vec!["a"]);
    assert_eq!(queue.len(), 2);
}

#[test]
fn tracker_carries_remainder_over_to_next_tick() {
    let mut config = inline_config();
    config.max_bytes_per_tick = 48;
    let tracker = started_tracker_with(config, RecordingPacketFactory::with_packet_size(16));
    for id in 1..=4 {
        tracker.register(TestVisual::handle(id), at(f64::from(id), 0.0), identity());
    }

    let report = tracker.tick(vec![frame(1, 0.0, 0.0)], view(64.0));
    assert_eq!(report.sent_packets, 3);
    assert_eq!(report.sent_bytes, 48);
    assert_eq!(report.deferred, 5);
    assert_eq!(tracker.queued_packets(viewer(1)), 5);
    assert_eq!(tracker.stats().deferred_packets, 5);

    let report = tracker.tick(vec![frame(1, 0.0, 0.0)], view(64.0));
    assert_eq!(report.sent_packets, 3);
    let report = tracker.tick(vec![frame(1, 0.0, 0.0)], view(64.0));
    assert_eq!(report.sent_packets, 2);
    assert_eq!(report.deferred, 0);

    // every spawn went out before any metadata
    let sent = tracker.factory().sent_to(viewer(1));
    assert_eq!(sent.len(), 8);
    assert!(sent[..4].iter().all(|packet| matches!(packet, visync_test::TestPacket::Spawn { .. })));
}

#[test]
fn packet_cap_limits_each_viewer_independently() {
    let mut config = inline_config();
    config.max_packets_per_tick = 1;
    let tracker = started_tracker_with(config, RecordingPacketFactory::new());
    tracker.register(TestVisual::handle(1), at(1.0, 1.0), identity());

    let report = tracker.tick(vec![frame(1, 0.0, 0.0), frame(2, 2.0, 2.0)], view(64.0));
    assert_eq!(report.viewers_drained, 2);
    assert_eq!(report.sent_packets, 2);
    assert_eq!(tracker.queued_packets(viewer(1)), 1);
    assert_eq!(tracker.queued_packets(viewer(2)), 1);
}

#[test]
fn oversized_packet_does_not_starve_its_queue() {
    let mut config = inline_config();
    config.max_bytes_per_tick = 10;
    let tracker = started_tracker_with(config, RecordingPacketFactory::with_packet_size(64));
    tracker.register(TestVisual::handle(1), at(1.0, 1.0), identity());

    let first = tracker.tick(vec![frame(1, 0.0, 0.0)], view(64.0));
    let second = tracker.tick(vec![frame(1, 0.0, 0.0)], view(64.0));
    assert_eq!(first.sent_packets, 1);
    assert_eq!(second.sent_packets, 1);
    assert_eq!(tracker.queued_packets(viewer(1)), 0);
}

#[test]
fn tiny_time_budget_still_respects_minimum_config() {
    let mut config = inline_config();
    config.flush_time_budget_nanos = 10;
    let result = visync_server::VisualTracker::new(config, RecordingPacketFactory::new());
    assert!(matches!(result, Err(visync_server::TrackerError::InvalidConfig(_))));
}
