//! Point pairs between the previous and the current frame, gathered from the
//! dense flow field and from descriptor matching, merged into one set for
//! transform estimation.

use crate::features::{self, CornerParams, Features};
use crate::flow::{self, FlowField};
use crate::image::{self, GreyImage};
use crate::mask::RegionMask;
use nalgebra as na;

pub const MERGE_RADIUS: f32 = 2.0;

#[derive(Debug, Clone, Default)]
pub struct CorrespondenceSet {
    pub prev: Vec<na::Point2<f32>>,
    pub curr: Vec<na::Point2<f32>>,
}

impl CorrespondenceSet {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            prev: Vec::with_capacity(cap),
            curr: Vec::with_capacity(cap),
        }
    }

    #[inline]
    pub fn push(&mut self, prev: na::Point2<f32>, curr: na::Point2<f32>) {
        self.prev.push(prev);
        self.curr.push(curr);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.prev.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.prev.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&na::Point2<f32>, &na::Point2<f32>)> {
        self.prev.iter().zip(self.curr.iter())
    }
}

/// Descriptor matching parameters.
#[derive(Debug, Clone, Copy)]
pub struct MatchParams {
    // candidates must lie within +-window px on both axes
    pub window: f32,
    pub max_ratio: f32,
}

impl Default for MatchParams {
    fn default() -> Self {
        Self {
            window: 25.0,
            max_ratio: 0.8,
        }
    }
}

/// Displaces strong corners of the previous frame by the dense flow.
pub fn match_from_flow(
    prev_grey: &GreyImage,
    flow: &FlowField,
    params: &CornerParams,
    mask: Option<&RegionMask>,
) -> CorrespondenceSet {
    let (w, h) = image::dims(prev_grey);
    let corners = features::good_features(prev_grey, params, mask);
    let mut set = CorrespondenceSet::with_capacity(corners.len());

    for p in corners {
        let (x, y) = image::clamp_pixel(p, w, h);
        let q = p + flow::flow_at(flow, x, y);

        if q.x < 0.0 || q.y < 0.0 || q.x >= w as f32 || q.y >= h as f32 {
            continue;
        }

        set.push(p, q);
    }

    set
}

#[inline]
fn distance2(a: ndarray::ArrayView1<f32>, b: ndarray::ArrayView1<f32>) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Nearest-neighbour descriptor matching of every current keypoint against
/// previous keypoints inside the search window, gated by the distance ratio.
pub fn match_descriptors(prev: &Features, curr: &Features, params: &MatchParams) -> CorrespondenceSet {
    let mut set = CorrespondenceSet::default();

    if prev.is_empty() || curr.is_empty() || prev.descriptors.ncols() != curr.descriptors.ncols() {
        return set;
    }

    let ratio2 = params.max_ratio * params.max_ratio;

    for (ci, cp) in curr.points.iter().enumerate() {
        let query = curr.descriptors.row(ci);
        let mut best: Option<(f32, usize)> = None;
        let mut second = f32::INFINITY;

        for (pi, pp) in prev.points.iter().enumerate() {
            if (pp.x - cp.x).abs() > params.window || (pp.y - cp.y).abs() > params.window {
                continue;
            }

            let d = distance2(query, prev.descriptors.row(pi));
            match best {
                Some((bd, _)) if d >= bd => second = second.min(d),
                Some((bd, _)) => {
                    second = bd;
                    best = Some((d, pi));
                }
                None => best = Some((d, pi)),
            }
        }

        if let Some((bd, pi)) = best {
            if second.is_infinite() || bd < ratio2 * second {
                set.push(prev.points[pi], *cp);
            }
        }
    }

    set
}

/// Keeps every flow pair and adds descriptor pairs whose previous point is
/// farther than `radius` from all kept previous points.
pub fn merge(flow_pairs: CorrespondenceSet, desc_pairs: &CorrespondenceSet, radius: f32) -> CorrespondenceSet {
    let mut merged = flow_pairs;
    let r2 = radius * radius;

    for (p, q) in desc_pairs.iter() {
        let duplicate = merged
            .prev
            .iter()
            .any(|kept| na::distance_squared(kept, p) <= r2);

        if !duplicate {
            merged.push(*p, *q);
        }
    }

    merged
}
