use crate::bbox::{BBox, Ltrb};
use crate::error::Error;
use nalgebra as na;
use ndarray::{s, Array2};
use std::io::BufRead;

/// Per-pixel permission map at full frame resolution; `true` means the pixel
/// may be used for sampling and correspondences.
#[derive(Debug, Clone)]
pub struct RegionMask {
    allowed: Array2<bool>,
}

impl RegionMask {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            allowed: Array2::from_elem((height, width), true),
        }
    }

    /// Re-opens every pixel and then blocks the area of each box.
    pub fn reset_with_boxes(&mut self, boxes: &[BBox<Ltrb>]) {
        self.allowed.fill(true);
        let (h, w) = self.allowed.dim();

        for b in boxes {
            if let Some((x0, y0, x1, y1)) = b.pixel_span(w, h) {
                self.allowed.slice_mut(s![y0..y1, x0..x1]).fill(false);
            }
        }
    }

    #[inline]
    pub fn allows(&self, x: usize, y: usize) -> bool {
        self.allowed.get((y, x)).copied().unwrap_or(false)
    }

    /// Tests a point given in the coordinates of a pyramid level with factor `scale`.
    #[inline]
    pub fn allows_scaled(&self, p: na::Point2<f32>, scale: f32) -> bool {
        let x = (p.x * scale).round();
        let y = (p.y * scale).round();

        x >= 0.0 && y >= 0.0 && self.allows(x as usize, y as usize)
    }

    pub fn dims(&self) -> (usize, usize) {
        let (h, w) = self.allowed.dim();
        (w, h)
    }
}

/// Bounding boxes to mask out, one list per video frame.
#[derive(Debug, Clone, Default)]
pub struct BoxList {
    frames: Vec<Vec<BBox<Ltrb>>>,
}

impl BoxList {
    /// Reads one JSON array of `[left, top, right, bottom]` boxes per line.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, Error> {
        let mut frames = Vec::new();

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();

            let boxes = if line.is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(line).map_err(|source| Error::BoxParse {
                    line: idx + 1,
                    source,
                })?
            };

            frames.push(boxes);
        }

        Ok(Self { frames })
    }

    pub fn from_frames(frames: Vec<Vec<BBox<Ltrb>>>) -> Self {
        Self { frames }
    }

    /// Fails unless there is exactly one entry per video frame.
    pub fn check_length(&self, video_frames: usize) -> Result<(), Error> {
        if self.frames.len() != video_frames {
            return Err(Error::BoxCountMismatch {
                boxes: self.frames.len(),
                frames: video_frames,
            });
        }

        Ok(())
    }

    #[inline]
    pub fn frame(&self, idx: usize) -> &[BBox<Ltrb>] {
        self.frames.get(idx).map(Vec::as_slice).unwrap_or(&[])
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boxes_block_their_area_only() {
        let mut mask = RegionMask::new(40, 30);
        mask.reset_with_boxes(&[BBox::ltrb(10.0, 5.0, 20.0, 15.0)]);

        assert!(!mask.allows(10, 5));
        assert!(!mask.allows(19, 14));
        assert!(mask.allows(20, 15));
        assert!(mask.allows(0, 0));
        assert!(!mask.allows(40, 0));

        mask.reset_with_boxes(&[]);
        assert!(mask.allows(10, 5));
    }

    #[test]
    fn scaled_lookup_maps_back_to_frame_pixels() {
        let mut mask = RegionMask::new(40, 40);
        mask.reset_with_boxes(&[BBox::ltrb(20.0, 20.0, 40.0, 40.0)]);

        assert!(!mask.allows_scaled(na::Point2::new(12.0, 12.0), 2.0));
        assert!(mask.allows_scaled(na::Point2::new(8.0, 8.0), 2.0));
    }

    #[test]
    fn reads_one_line_per_frame() {
        let text = "[[0, 0, 10, 10]]\n\n[[1, 2, 3, 4], [5, 6, 7, 8]]\n";
        let list = BoxList::from_reader(text.as_bytes()).unwrap();

        assert_eq!(list.len(), 3);
        assert!(list.frame(1).is_empty());
        assert_eq!(list.frame(2).len(), 2);
        assert!(list.frame(7).is_empty());

        assert!(list.check_length(3).is_ok());
        assert!(matches!(
            list.check_length(4),
            Err(Error::BoxCountMismatch { boxes: 3, frames: 4 })
        ));
    }

    #[test]
    fn malformed_lines_report_their_position() {
        let text = "[]\n[[1, 2, 3]]\n";
        let err = BoxList::from_reader(text.as_bytes()).unwrap_err();

        assert!(matches!(err, Error::BoxParse { line: 2, .. }));
    }
}
