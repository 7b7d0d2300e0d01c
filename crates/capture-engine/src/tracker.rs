//! Wrist trajectory extraction.
//!
//! Frames are read strictly in order. Each one is converted to the
//! detector's pixel layout and stamped with the accumulated frame clock.
//! When at least one hand is found, the first hand's wrist `y` is recorded.
//! Frames without a hand are dropped silently; detector I/O failures are
//! errors.

use tremor_common::{Deadline, FrameClock, TremorResult};
use tremor_model::WristTrajectory;

use crate::landmarks::LandmarkSession;
use crate::video::VideoSource;

/// Track the wrist through a clip.
///
/// The video is released whether tracking completes or fails.
pub fn track_wrist(
    video: &mut dyn VideoSource,
    session: &mut dyn LandmarkSession,
    deadline: &Deadline,
) -> TremorResult<WristTrajectory> {
    let result = track_frames(video, session, deadline);
    video.release();
    result
}

fn track_frames(
    video: &mut dyn VideoSource,
    session: &mut dyn LandmarkSession,
    deadline: &Deadline,
) -> TremorResult<WristTrajectory> {
    let fps = video.fps();
    let mut clock = FrameClock::new(fps)?;
    let mut trajectory = WristTrajectory::new(fps);
    let format = session.input_format();

    while let Some(mut frame) = video.next_frame()? {
        deadline.check("frame tracking")?;

        frame.convert_to(format);
        let timestamp_ms = clock.tick();
        let wrist_y = session
            .detect(&frame, timestamp_ms)?
            .and_then(|hands| hands.first().and_then(|hand| hand.wrist()).map(|p| p.y));
        trajectory.push_frame(wrist_y);
    }

    tracing::info!(
        frames = trajectory.frames_read(),
        samples = trajectory.len(),
        tracking_ratio = trajectory.tracking_ratio(),
        fps,
        "Wrist tracking finished"
    );
    Ok(trajectory)
}
