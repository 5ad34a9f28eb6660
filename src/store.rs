use crate::descriptor::{DescLayout, Rect, ScaleDescriptors};
use crate::flow::{self, FlowField};
use crate::image;
use crate::trajectory::Trajectory;
use nalgebra as na;

/// Per-frame inputs of one scale needed to move its trajectories forward.
pub struct StepInputs<'a> {
    pub flow: &'a FlowField,
    pub flow_warp: &'a FlowField,
    pub descs: &'a ScaleDescriptors,
    pub layout: &'a DescLayout,
}

/// Outcome of one advancement pass.
#[derive(Debug, Default)]
pub struct Advance {
    // reached full length, still to be validated
    pub finished: Vec<Trajectory>,
    // left the frame
    pub discarded: usize,
}

/// Active trajectories of one scale.
#[derive(Debug)]
pub struct TrackStore {
    length: usize,
    layout: DescLayout,
    tracks: Vec<Trajectory>,
}

impl TrackStore {
    pub fn new(length: usize, layout: DescLayout) -> Self {
        Self {
            length,
            layout,
            tracks: Vec::new(),
        }
    }

    pub fn seed<I: IntoIterator<Item = na::Point2<f32>>>(&mut self, points: I) {
        let (length, layout) = (self.length, &self.layout);

        self.tracks
            .extend(points.into_iter().map(|p| Trajectory::new(p, length, layout)));
    }

    /// Current positions of all active trajectories.
    pub fn cursors(&self) -> Vec<na::Point2<f32>> {
        self.tracks.iter().map(Trajectory::cursor).collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Moves every trajectory one frame along the flow. Trajectories leaving
    /// the image are dropped, those reaching full length are handed out.
    pub fn advance(&mut self, inputs: &StepInputs) -> Advance {
        let (h, w, _) = inputs.flow.dim();
        let mut out = Advance::default();
        let mut active = Vec::with_capacity(self.tracks.len());

        for mut track in std::mem::take(&mut self.tracks) {
            let prev = track.cursor();
            let (x, y) = image::clamp_pixel(prev, w, h);
            let next = prev + flow::flow_at(inputs.flow, x, y);

            if next.x <= 0.0 || next.x >= w as f32 || next.y <= 0.0 || next.y >= h as f32 {
                out.discarded += 1;
                continue;
            }

            let rect = Rect::around(x, y, w, h, &inputs.layout.hog);
            track.record_descriptors(inputs.descs, inputs.layout, &rect);
            track.push(next, flow::flow_at(inputs.flow_warp, x, y));

            if track.is_complete() {
                out.finished.push(track);
            } else {
                active.push(track);
            }
        }

        self.tracks = active;
        out
    }
}
