pub mod recording_factory;

pub use frames::{at, frame, frame_in, identity, view, viewer, NETHER, OVERWORLD};
pub use recording_factory::{RecordingPacketFactory, TestPacket};
pub use test_visual::{TestVisual, TEST_SPAWN_KIND};
pub use tracker_builder::{inline_config, started_tracker, started_tracker_with};
