mod tracker_core;
mod visual_tracker;

pub use visual_tracker::VisualTracker;
