//! The decoded track metadata used to seed the course parameter file.
use glam::Vec3;

use crate::ctd::TrackInfoRecord;

/// Which side of the finish line the pole position sits on.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum StartSide {
    Left,
    Right,
}

/// Track metadata with the start transform in radians.
#[derive(Debug, PartialEq, Clone)]
pub struct TrackInfo {
    pub lap_count: u8,
    pub start_side: StartSide,
    pub start_position: Vec3,
    pub start_rotation: Vec3,
}

pub fn assemble_track_info(record: &TrackInfoRecord) -> TrackInfo {
    TrackInfo {
        lap_count: record.lap_count,
        // Only zero means left. The authoring tool writes 1 for right but
        // older exports have been seen with other nonzero values.
        start_side: if record.start_side == 0 {
            StartSide::Left
        } else {
            StartSide::Right
        },
        start_position: Vec3::from_array(record.start_position),
        start_rotation: Vec3::from_array(record.start_rotation),
    }
}
