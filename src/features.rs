use crate::error::Error;
use crate::image::{self, GreyImage};
use crate::mask::RegionMask;
use nalgebra as na;
use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Keypoints with one descriptor row per point.
#[derive(Debug, Clone)]
pub struct Features {
    pub points: Vec<na::Point2<f32>>,
    pub descriptors: Array2<f32>,
}

impl Features {
    pub fn empty(dim: usize) -> Self {
        Self {
            points: Vec::new(),
            descriptors: Array2::zeros((0, dim)),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Keypoint detection and description restricted to the allowed area of a mask.
pub trait FeatureDetector {
    fn detect(&mut self, grey: &GreyImage, mask: Option<&RegionMask>) -> Result<Features, Error>;
}

#[derive(Debug, Clone, Copy)]
pub struct CornerParams {
    pub max_corners: usize,
    pub quality: f32,
    pub min_distance: f32,
}

impl Default for CornerParams {
    fn default() -> Self {
        Self {
            max_corners: 1000,
            quality: 0.001,
            min_distance: 3.0,
        }
    }
}

/// Strongest min-eigenvalue corners, at least `min_distance` apart.
pub fn good_features(
    grey: &GreyImage,
    params: &CornerParams,
    mask: Option<&RegionMask>,
) -> Vec<na::Point2<f32>> {
    let (h, w) = grey.dim();
    let resp = image::min_eigen_response(grey);

    let max = resp.iter().cloned().fold(0.0f32, f32::max);
    if max <= 0.0 {
        return Vec::new();
    }
    let threshold = max * params.quality;

    let mut candidates = Vec::new();
    for y in 1..h.saturating_sub(1) {
        for x in 1..w.saturating_sub(1) {
            let v = resp[[y, x]];
            if v <= threshold {
                continue;
            }

            if let Some(mask) = mask {
                if !mask.allows(x, y) {
                    continue;
                }
            }

            let mut is_max = true;
            'nms: for dy in 0..3 {
                for dx in 0..3 {
                    if resp[[y + dy - 1, x + dx - 1]] > v {
                        is_max = false;
                        break 'nms;
                    }
                }
            }

            if is_max {
                candidates.push((v, x, y));
            }
        }
    }

    // strongest first, ties broken by raster order
    candidates.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then((a.2, a.1).cmp(&(b.2, b.1)))
    });

    let cell = params.min_distance.max(1.0);
    let cols = (w as f32 / cell).ceil() as usize + 1;
    let rows = (h as f32 / cell).ceil() as usize + 1;
    let mut grid: Vec<Vec<na::Point2<f32>>> = vec![Vec::new(); cols * rows];
    let min_dist2 = params.min_distance * params.min_distance;

    let mut corners = Vec::new();
    for (_, x, y) in candidates {
        if corners.len() >= params.max_corners {
            break;
        }

        let p = na::Point2::new(x as f32, y as f32);
        let cx = (p.x / cell) as usize;
        let cy = (p.y / cell) as usize;

        let mut close = false;
        for gy in cy.saturating_sub(1)..=(cy + 1).min(rows - 1) {
            for gx in cx.saturating_sub(1)..=(cx + 1).min(cols - 1) {
                close |= grid[gy * cols + gx]
                    .iter()
                    .any(|q| na::distance_squared(q, &p) < min_dist2);
            }
        }

        if !close {
            grid[cy * cols + cx].push(p);
            corners.push(p);
        }
    }

    corners
}

const BRIEF_BITS: usize = 256;
const BRIEF_PATCH_RADIUS: i32 = 12;
const BRIEF_SMOOTH_RADIUS: usize = 2;

/// Corner keypoints described by binary intensity comparisons on a smoothed
/// patch. Bits are stored as `0.0`/`1.0`, so squared L2 equals Hamming distance.
#[derive(Debug, Clone)]
pub struct BriefDetector {
    pub corners: CornerParams,
    pattern: Vec<(i32, i32, i32, i32)>,
}

impl Default for BriefDetector {
    fn default() -> Self {
        Self::new(
            CornerParams {
                max_corners: 500,
                quality: 0.01,
                min_distance: 5.0,
            },
            0x1d7,
        )
    }
}

impl BriefDetector {
    pub fn new(corners: CornerParams, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let r = BRIEF_PATCH_RADIUS;

        let pattern = (0..BRIEF_BITS)
            .map(|_| {
                (
                    rng.gen_range(-r..=r),
                    rng.gen_range(-r..=r),
                    rng.gen_range(-r..=r),
                    rng.gen_range(-r..=r),
                )
            })
            .collect();

        Self { corners, pattern }
    }

    fn smooth(grey: &GreyImage) -> GreyImage {
        let (h, w) = grey.dim();
        let r = BRIEF_SMOOTH_RADIUS as isize;

        Array2::from_shape_fn((h, w), |(y, x)| {
            let mut sum = 0.0;
            let mut n = 0.0;
            for dy in -r..=r {
                for dx in -r..=r {
                    let (sx, sy) = (x as isize + dx, y as isize + dy);
                    if sx >= 0 && sy >= 0 && (sx as usize) < w && (sy as usize) < h {
                        sum += grey[[sy as usize, sx as usize]];
                        n += 1.0;
                    }
                }
            }
            sum / n
        })
    }
}

impl FeatureDetector for BriefDetector {
    fn detect(&mut self, grey: &GreyImage, mask: Option<&RegionMask>) -> Result<Features, Error> {
        let (h, w) = grey.dim();
        let border = (BRIEF_PATCH_RADIUS + 1) as f32;

        let points: Vec<_> = good_features(grey, &self.corners, mask)
            .into_iter()
            .filter(|p| {
                p.x >= border && p.y >= border && p.x < w as f32 - border && p.y < h as f32 - border
            })
            .collect();

        if points.is_empty() {
            return Ok(Features::empty(BRIEF_BITS));
        }

        let smooth = Self::smooth(grey);
        let mut descriptors = Array2::zeros((points.len(), BRIEF_BITS));

        for (row, p) in points.iter().enumerate() {
            let (x, y) = (p.x as i32, p.y as i32);

            for (bit, &(x1, y1, x2, y2)) in self.pattern.iter().enumerate() {
                let a = smooth[[(y + y1) as usize, (x + x1) as usize]];
                let b = smooth[[(y + y2) as usize, (x + x2) as usize]];

                if a < b {
                    descriptors[[row, bit]] = 1.0;
                }
            }
        }

        Ok(Features {
            points,
            descriptors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs(w: usize, h: usize) -> GreyImage {
        Array2::from_shape_fn((h, w), |(y, x)| {
            128.0 + 60.0 * (x as f32 * 0.5).sin() * (y as f32 * 0.4).cos()
        })
    }

    #[test]
    fn corners_respect_the_minimum_distance() {
        let params = CornerParams {
            max_corners: 1000,
            quality: 0.01,
            min_distance: 6.0,
        };
        let corners = good_features(&blobs(64, 64), &params, None);

        assert!(!corners.is_empty());
        for (i, a) in corners.iter().enumerate() {
            for b in &corners[i + 1..] {
                assert!(na::distance(a, b) >= 6.0);
            }
        }
    }

    #[test]
    fn flat_images_have_no_corners() {
        let flat = Array2::from_elem((32, 32), 90.0f32);
        assert!(good_features(&flat, &CornerParams::default(), None).is_empty());
    }

    #[test]
    fn masked_corners_are_skipped() {
        let img = blobs(64, 64);
        let mut mask = RegionMask::new(64, 64);
        mask.reset_with_boxes(&[crate::bbox::BBox::ltrb(0.0, 0.0, 32.0, 64.0)]);

        let corners = good_features(&img, &CornerParams::default(), Some(&mask));
        assert!(!corners.is_empty());
        assert!(corners.iter().all(|p| p.x >= 32.0));
    }

    #[test]
    fn brief_is_deterministic_and_binary() {
        let img = blobs(80, 80);
        let a = BriefDetector::default().detect(&img, None).unwrap();
        let b = BriefDetector::default().detect(&img, None).unwrap();

        assert!(!a.is_empty());
        assert_eq!(a.points, b.points);
        assert_eq!(a.descriptors, b.descriptors);
        assert_eq!(a.descriptors.ncols(), BRIEF_BITS);
        assert!(a.descriptors.iter().all(|&v| v == 0.0 || v == 1.0));
    }
}
