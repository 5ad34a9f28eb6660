use crate::error::Error;
use crate::frame::Frame;
use crate::image::{self, GreyImage};
use std::collections::VecDeque;

/// Sequential supplier of video frames.
pub trait FrameSource {
    /// `(width, height)` of every frame.
    fn dims(&self) -> (usize, usize);

    /// Number of frames in the whole video, `0` when unknown.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Next frame, or `None` at the end of the stream.
    fn next_frame(&mut self) -> Result<Option<Frame>, Error>;
}

/// Frames held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    dims: (usize, usize),
    total: usize,
    frames: VecDeque<GreyImage>,
}

impl MemorySource {
    pub fn new<I: IntoIterator<Item = GreyImage>>(frames: I) -> Self {
        let frames: VecDeque<_> = frames.into_iter().collect();

        Self {
            dims: frames.front().map(image::dims).unwrap_or((0, 0)),
            total: frames.len(),
            frames,
        }
    }
}

impl FrameSource for MemorySource {
    #[inline]
    fn dims(&self) -> (usize, usize) {
        self.dims
    }

    #[inline]
    fn len(&self) -> usize {
        self.total
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, Error> {
        Ok(self.frames.pop_front().map(Frame::from_grey))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn yields_frames_in_order() {
        let mut src = MemorySource::new((0..3).map(|i| Array2::from_elem((4, 6), i as f32)));

        assert_eq!(src.dims(), (6, 4));
        assert_eq!(src.len(), 3);

        for i in 0..3 {
            let frame = src.next_frame().unwrap().unwrap();
            assert_eq!(frame.dims, (6, 4));
            assert_eq!(frame.grey[[0, 0]], i as f32);
        }

        assert!(src.next_frame().unwrap().is_none());
        assert_eq!(src.len(), 3);
    }
}
