mod chunk_grid_index;

pub use chunk_grid_index::ChunkGridIndex;
