use std::{collections::HashSet, sync::Arc};

use proptest::prelude::*;

use visync_server::{
    drain_queue, ChunkGridIndex, DrainBudget, PlayerPacketQueue, QueuedPacket, VisualRegistry,
    VisualTokenService, VisualTombstoneService,
};
use visync_shared::{ChunkKey, Location, PacketPriority, VisualId, VisualKind};
use visync_test::{identity, TestVisual, OVERWORLD};

fn always_current(_: VisualId, _: u64) -> bool {
    true
}

proptest! {
    #[test]
    fn at_most_one_queued_teleport_per_visual(ids in prop::collection::vec(0u32..6, 1..64)) {
        let queue: PlayerPacketQueue<(u32, usize)> = PlayerPacketQueue::new();
        for (step, id) in ids.iter().enumerate() {
            let packet = QueuedPacket::new((*id, step), PacketPriority::Teleport, 8)
                .for_visual(VisualId::new(*id), 1)
                .coalescible();
            queue.add(packet, always_current);
        }

        let distinct: HashSet<u32> = ids.iter().copied().collect();
        prop_assert_eq!(queue.lane_len(PacketPriority::Teleport), distinct.len());

        // each survivor is the newest teleport for its visual
        let mut seen = HashSet::new();
        while let Some(packet) = queue.poll() {
            let (id, step) = *packet.payload();
            prop_assert!(seen.insert(id));
            let newest = ids.iter().rposition(|candidate| *candidate == id);
            prop_assert_eq!(newest, Some(step));
        }
    }

    #[test]
    fn drain_takes_longest_prefix_within_byte_cap(
        sizes in prop::collection::vec(1usize..200, 1..32),
        max_bytes in 1usize..600,
    ) {
        let queue: PlayerPacketQueue<usize> = PlayerPacketQueue::new();
        for size in &sizes {
            queue.add(QueuedPacket::new(*size, PacketPriority::Metadata, *size), always_current);
        }
        let budget = DrainBudget {
            max_bytes,
            ..DrainBudget::unlimited()
        };

        let drain = drain_queue(&queue, &budget, None, always_current);

        let taken = drain.payloads.len();
        prop_assert!(taken >= 1);
        prop_assert_eq!(&drain.payloads[..], &sizes[..taken]);
        prop_assert!(drain.bytes <= max_bytes || taken == 1);
        if let Some(next) = sizes.get(taken) {
            prop_assert!(drain.bytes + next > max_bytes);
        }
        prop_assert_eq!(queue.len(), sizes.len() - taken);
    }

    #[test]
    fn grid_holds_each_visual_exactly_once(
        moves in prop::collection::vec((0u32..4, -80.0f64..80.0, -80.0f64..80.0), 1..48),
    ) {
        let registry = VisualRegistry::new(
            Arc::new(ChunkGridIndex::new()),
            Arc::new(VisualTokenService::new()),
            Arc::new(VisualTombstoneService::new()),
        );
        let handles: Vec<_> = (0u32..4).map(TestVisual::handle).collect();
        let mut visited: HashSet<ChunkKey> = HashSet::new();
        for handle in &handles {
            let location = Location::new(OVERWORLD, 0.0, 64.0, 0.0);
            visited.insert(location.chunk_key());
            registry.register(handle.clone(), location, identity());
        }

        for (index, x, z) in moves {
            let location = Location::new(OVERWORLD, x, 64.0, z);
            visited.insert(location.chunk_key());
            registry.update_state(&handles[index as usize], location, identity(), 1);
        }

        let grid = registry.chunk_grid();
        for handle in &handles {
            let id = handle.id();
            let buckets = visited.iter().filter(|key| grid.contains(id, **key)).count();
            prop_assert_eq!(buckets, 1);
            let location = registry.location(id);
            prop_assert!(location.map_or(false, |location| grid.contains(id, location.chunk_key())));
        }
    }
}
