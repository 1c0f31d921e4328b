use std::collections::HashSet;

use dashmap::{mapref::entry::Entry, DashMap};

use visync_shared::{ChunkCoord, ChunkKey, Location, VisualId};

/// Spatial bucket index: chunk key -> ids of the Visuals standing in that chunk.
///
/// Buckets live in a sharded concurrent map, so producers may relocate Visuals
/// while the async phase reads neighbourhoods. Every mutation of a bucket
/// happens under its shard lock, and empty buckets are dropped in the same
/// critical section that emptied them.
pub struct ChunkGridIndex {
    buckets: DashMap<ChunkKey, HashSet<VisualId>>,
}

impl ChunkGridIndex {
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
        }
    }

    pub fn add(&self, id: VisualId, location: &Location) {
        self.add_to_chunk(id, location.chunk_key());
    }

    pub fn add_to_chunk(&self, id: VisualId, chunk_key: ChunkKey) {
        self.buckets.entry(chunk_key).or_default().insert(id);
    }

    /// Returns true if the id was present in the bucket.
    pub fn remove(&self, id: VisualId, chunk_key: ChunkKey) -> bool {
        match self.buckets.entry(chunk_key) {
            Entry::Occupied(mut bucket) => {
                let removed = bucket.get_mut().remove(&id);
                if bucket.get().is_empty() {
                    bucket.remove();
                }
                removed
            }
            Entry::Vacant(_) => false,
        }
    }

    /// Moves an id between buckets. The id is inserted into its new bucket
    /// before it leaves the old one, so a concurrent reader may briefly see it
    /// twice but never misses it.
    pub fn relocate(&self, id: VisualId, from: ChunkKey, to: ChunkKey) {
        if from == to {
            return;
        }
        self.add_to_chunk(id, to);
        self.remove(id, from);
    }

    /// Snapshot of the ids in one chunk. Empty if the chunk has no bucket.
    pub fn get(&self, chunk_key: ChunkKey) -> Vec<VisualId> {
        self.buckets
            .get(&chunk_key)
            .map(|bucket| bucket.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, id: VisualId, chunk_key: ChunkKey) -> bool {
        self.buckets
            .get(&chunk_key)
            .map(|bucket| bucket.contains(&id))
            .unwrap_or(false)
    }

    /// Appends the ids of every chunk within `radius` chunks of `center`
    /// (a square neighbourhood) to `output`, skipping ids already in `seen`.
    pub fn collect_neighbourhood(
        &self,
        center: ChunkCoord,
        radius: u32,
        seen: &mut HashSet<VisualId>,
        output: &mut Vec<VisualId>,
    ) {
        let radius = i32::try_from(radius).unwrap_or(i32::MAX);
        for dx in -radius..=radius {
            for dz in -radius..=radius {
                let key = center.offset(dx, dz).key();
                let Some(bucket) = self.buckets.get(&key) else {
                    continue;
                };
                for id in bucket.iter() {
                    if seen.insert(*id) {
                        output.push(*id);
                    }
                }
            }
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.buckets.len()
    }

    /// Entries over all buckets. An id sitting in two buckets counts twice.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(|bucket| bucket.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn clear(&self) {
        self.buckets.clear();
    }
}

impl Default for ChunkGridIndex {
    fn default() -> Self {
        Self::new()
    }
}
