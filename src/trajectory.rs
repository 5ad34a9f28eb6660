use crate::descriptor::{DescLayout, Rect, ScaleDescriptors};
use nalgebra as na;

/// One tracked point: `L + 1` positions, `L` compensated displacements and
/// `L` readings of each descriptor kind, filled up to `index`.
#[derive(Debug, Clone)]
pub struct Trajectory {
    pub points: Vec<na::Point2<f32>>,
    pub disp: Vec<na::Vector2<f32>>,
    pub hog: Vec<f32>,
    pub hof: Vec<f32>,
    pub mbhx: Vec<f32>,
    pub mbhy: Vec<f32>,
    pub index: usize,
}

impl Trajectory {
    pub fn new(start: na::Point2<f32>, length: usize, layout: &DescLayout) -> Self {
        let mut points = vec![na::Point2::origin(); length + 1];
        points[0] = start;

        Self {
            points,
            disp: vec![na::Vector2::zeros(); length],
            hog: vec![0.0; length * layout.hog.dim],
            hof: vec![0.0; length * layout.hof.dim],
            mbhx: vec![0.0; length * layout.mbh.dim],
            mbhy: vec![0.0; length * layout.mbh.dim],
            index: 0,
        }
    }

    #[inline]
    pub fn length(&self) -> usize {
        self.disp.len()
    }

    #[inline]
    pub fn cursor(&self) -> na::Point2<f32> {
        self.points[self.index]
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.index >= self.length()
    }

    /// Stores the four descriptor readings of `rect` in the current slot.
    pub fn record_descriptors(&mut self, descs: &ScaleDescriptors, layout: &DescLayout, rect: &Rect) {
        let i = self.index;

        let d = layout.hog.dim;
        descs.hog.read(rect, &layout.hog, &mut self.hog[i * d..(i + 1) * d]);

        let d = layout.hof.dim;
        descs.hof.read(rect, &layout.hof, &mut self.hof[i * d..(i + 1) * d]);

        let d = layout.mbh.dim;
        descs.mbhx.read(rect, &layout.mbh, &mut self.mbhx[i * d..(i + 1) * d]);
        descs.mbhy.read(rect, &layout.mbh, &mut self.mbhy[i * d..(i + 1) * d]);
    }

    /// Records the displacement of the current slot and moves the cursor to `next`.
    #[inline]
    pub fn push(&mut self, next: na::Point2<f32>, disp: na::Vector2<f32>) {
        self.disp[self.index] = disp;
        self.index += 1;
        self.points[self.index] = next;
    }

    /// Positions rescaled to full frame coordinates.
    pub fn scaled_points(&self, scale: f32) -> Vec<na::Point2<f32>> {
        self.points.iter().map(|p| *p * scale).collect()
    }

    pub fn scaled_disp(&self, scale: f32) -> Vec<na::Vector2<f32>> {
        self.disp.iter().map(|d| *d * scale).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;

    #[test]
    fn push_fills_slots_until_complete() {
        let layout = DescLayout::from_config(&TrackerConfig::default());
        let mut t = Trajectory::new(na::Point2::new(1.0, 2.0), 3, &layout);

        assert_eq!(t.hog.len(), 3 * 32);
        assert_eq!(t.hof.len(), 3 * 36);
        assert_eq!(t.cursor(), na::Point2::new(1.0, 2.0));

        for i in 0..3 {
            assert!(!t.is_complete());
            t.push(na::Point2::new(2.0 + i as f32, 2.0), na::Vector2::new(1.0, 0.0));
        }

        assert!(t.is_complete());
        assert_eq!(t.index, 3);
        assert_eq!(t.cursor(), na::Point2::new(4.0, 2.0));
        assert_eq!(t.scaled_points(2.0)[3], na::Point2::new(8.0, 4.0));
    }
}
