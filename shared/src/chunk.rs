//! Chunk coordinates and their packed 64-bit key.
//!
//! A chunk is a 16x16 column of blocks on the X/Z plane. Keys pack the chunk X
//! coordinate into the low 32 bits and the chunk Z coordinate into the high 32
//! bits, each masked so negative coordinates do not sign-extend into the other half.

const MASK_32_BITS: u64 = 0xFFFF_FFFF;

/// Number of block coordinate bits covered by one chunk.
pub const CHUNK_SHIFT: u32 = 4;
pub const CHUNK_SIZE_BLOCKS: f64 = (1u32 << CHUNK_SHIFT) as f64;

#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, PartialOrd, Ord)]
pub struct ChunkKey(u64);

impl ChunkKey {
    pub fn new(chunk_x: i32, chunk_z: i32) -> Self {
        let low = u64::from(chunk_x as u32) & MASK_32_BITS;
        let high = (u64::from(chunk_z as u32) & MASK_32_BITS) << 32;
        Self(low | high)
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }

    pub fn chunk_x(&self) -> i32 {
        (self.0 & MASK_32_BITS) as u32 as i32
    }

    pub fn chunk_z(&self) -> i32 {
        ((self.0 >> 32) & MASK_32_BITS) as u32 as i32
    }

    pub fn coord(&self) -> ChunkCoord {
        ChunkCoord::new(self.chunk_x(), self.chunk_z())
    }
}

#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
pub struct ChunkCoord {
    pub x: i32,
    pub z: i32,
}

impl ChunkCoord {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Chunk containing the given world-space X/Z position.
    pub fn from_position(x: f64, z: f64) -> Self {
        Self {
            x: block_coord(x) >> CHUNK_SHIFT,
            z: block_coord(z) >> CHUNK_SHIFT,
        }
    }

    pub fn key(&self) -> ChunkKey {
        ChunkKey::new(self.x, self.z)
    }

    pub fn offset(&self, dx: i32, dz: i32) -> Self {
        Self {
            x: self.x.wrapping_add(dx),
            z: self.z.wrapping_add(dz),
        }
    }
}

/// Block coordinate of a world-space axis value (floor, saturating at the i32 range).
pub fn block_coord(value: f64) -> i32 {
    value.floor() as i32
}

/// Radius in chunks needed to cover a squared view distance expressed in blocks.
pub fn view_distance_chunks(view_distance_squared: f64) -> u32 {
    if view_distance_squared <= 0.0 || !view_distance_squared.is_finite() {
        return 0;
    }
    (view_distance_squared.sqrt() / CHUNK_SIZE_BLOCKS).ceil() as u32
}
