pub mod bbox;
pub mod compensator;
pub mod config;
pub mod correspondence;
pub mod descriptor;
pub mod emitter;
pub mod error;
pub mod features;
pub mod flow;
pub mod frame;
pub mod homography;
pub mod image;
pub mod mask;
pub mod pyramid;
pub mod sampler;
pub mod source;
pub mod store;
pub mod trajectory;
pub mod tracker;
pub mod validator;

#[cfg(feature = "opencv")]
pub mod cv;

pub use config::TrackerConfig;
pub use emitter::{Emitter, Record, SeqInfo};
pub use error::Error;
pub use frame::Frame;
pub use source::{FrameSource, MemorySource};
pub use trajectory::Trajectory;
pub use tracker::{DenseTracker, FrameObserver, RunStats};

use std::io::Write;

/// Runs the default pure Rust pipeline over `source`, writing features to
/// `idt` and trajectory positions to `tra`.
pub fn extract<S, W, T>(
    cfg: TrackerConfig,
    source: &mut S,
    boxes: Option<mask::BoxList>,
    idt: W,
    tra: T,
) -> Result<(RunStats, (W, T)), Error>
where
    S: FrameSource + ?Sized,
    W: Write,
    T: Write,
{
    let (width, height) = source.dims();
    let seq = SeqInfo {
        width,
        height,
        length: source.len().max(1),
        start_frame: cfg.start_frame,
    };

    let mut tracker = DenseTracker::with_defaults(cfg)?;
    if let Some(boxes) = boxes {
        tracker = tracker.with_boxes(boxes);
    }

    let mut emitter = Emitter::new(idt, tra, seq);
    let stats = tracker.run(source, &mut emitter, None)?;

    Ok((stats, emitter.into_inner()))
}
