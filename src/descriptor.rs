//! Integral orientation histograms (HOG, HOF, MBH) and their per-patch readout.

use crate::config::TrackerConfig;
use crate::flow::FlowField;
use crate::image::{self, GreyImage};
use ndarray::{Array3, ArrayView2, Axis};

// added to every cell before normalization
pub const EPSILON: f32 = 0.05;
// flow magnitudes up to this go to the HOF zero bin
pub const MIN_FLOW: f32 = 0.4;

const FULL_ANGLE: f32 = 360.0;

/// Geometry of one descriptor kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DescInfo {
    // histogram channels, including the HOF zero bin
    pub bins: usize,
    pub is_hof: bool,
    pub nxy: usize,
    pub nt: usize,
    // values per reading: nxy * nxy * bins
    pub dim: usize,
    pub patch: usize,
}

impl DescInfo {
    pub fn new(bins: usize, is_hof: bool, patch: usize, nxy: usize, nt: usize) -> Self {
        Self {
            bins,
            is_hof,
            nxy,
            nt,
            dim: nxy * nxy * bins,
            patch,
        }
    }

    /// Pooled output size: `nt` temporal cells of `dim` values.
    #[inline]
    pub fn pooled_len(&self) -> usize {
        self.nt * self.dim
    }
}

/// The three descriptor geometries shared by every scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DescLayout {
    pub hog: DescInfo,
    pub hof: DescInfo,
    pub mbh: DescInfo,
}

impl DescLayout {
    pub fn from_config(cfg: &TrackerConfig) -> Self {
        let (p, s, t) = (cfg.patch_size, cfg.nxy_cell, cfg.nt_cell);

        Self {
            hog: DescInfo::new(8, false, p, s, t),
            hof: DescInfo::new(9, true, p, s, t),
            mbh: DescInfo::new(8, false, p, s, t),
        }
    }

    /// Floats per emitted record spent on the four pooled descriptors.
    #[inline]
    pub fn pooled_len(&self) -> usize {
        self.hog.pooled_len() + self.hof.pooled_len() + 2 * self.mbh.pooled_len()
    }
}

/// Readout window in pixels of one scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Rect {
    /// `patch x patch` window centred on pixel `(x, y)`, shifted to stay inside
    /// a `w x h` image.
    pub fn around(x: usize, y: usize, w: usize, h: usize, info: &DescInfo) -> Self {
        let half = info.patch / 2;

        Self {
            x: x.saturating_sub(half).min(w.saturating_sub(info.patch)),
            y: y.saturating_sub(half).min(h.saturating_sub(info.patch)),
            width: info.patch,
            height: info.patch,
        }
    }
}

/// Integral histogram of shape `(height + 1, width + 1, bins)`; entry
/// `[y, x, b]` holds the bin `b` mass of all pixels above and left of `(x, y)`.
#[derive(Debug, Clone)]
pub struct DescMat {
    data: Array3<f32>,
}

impl DescMat {
    pub fn new(width: usize, height: usize, bins: usize) -> Self {
        Self {
            data: Array3::zeros((height + 1, width + 1, bins)),
        }
    }

    #[inline]
    pub fn dims(&self) -> (usize, usize) {
        let (h, w, _) = self.data.dim();
        (w - 1, h - 1)
    }

    /// Accumulates the orientation histogram of the vector field `(xc, yc)`.
    /// Each magnitude is split linearly between the two nearest orientation
    /// bins; for HOF, short vectors add a unit to the last (zero) bin instead.
    pub fn build(&mut self, xc: ArrayView2<f32>, yc: ArrayView2<f32>, info: &DescInfo) {
        let (h, w) = xc.dim();
        let dims = info.bins;
        let nbins = if info.is_hof { dims - 1 } else { dims };
        let angle_base = nbins as f32 / FULL_ANGLE;

        if self.data.dim() != (h + 1, w + 1, dims) {
            self.data = Array3::zeros((h + 1, w + 1, dims));
        }

        let mut sum = vec![0.0f32; dims];
        for y in 0..h {
            sum.iter_mut().for_each(|v| *v = 0.0);

            for x in 0..w {
                let (dx, dy) = (xc[[y, x]], yc[[y, x]]);
                let mut mag0 = (dx * dx + dy * dy).sqrt();

                let (bin0, bin1, mag1) = if info.is_hof && mag0 <= MIN_FLOW {
                    mag0 = 1.0;
                    (nbins, 0, 0.0)
                } else {
                    let mut angle = dy.atan2(dx).to_degrees();
                    if angle < 0.0 {
                        angle += FULL_ANGLE;
                    }
                    if angle >= FULL_ANGLE {
                        angle -= FULL_ANGLE;
                    }

                    let fbin = angle * angle_base;
                    let bin0 = (fbin.floor() as usize).min(nbins - 1);
                    let mag1 = (fbin - bin0 as f32) * mag0;
                    mag0 -= mag1;

                    (bin0, (bin0 + 1) % nbins, mag1)
                };

                sum[bin0] += mag0;
                sum[bin1] += mag1;

                for (m, s) in sum.iter().enumerate() {
                    self.data[[y + 1, x + 1, m]] = self.data[[y, x + 1, m]] + s;
                }
            }
        }
    }

    /// Reads the `nxy x nxy` cells of `rect` (x-major) into `out`, which must
    /// hold `info.dim` values. The result is L1-normalized and square-rooted.
    pub fn read(&self, rect: &Rect, info: &DescInfo, out: &mut [f32]) {
        let (w, h) = self.dims();
        let bins = info.bins;
        let x_stride = rect.width / info.nxy;
        let y_stride = rect.height / info.nxy;

        let mut i = 0;
        for ix in 0..info.nxy {
            for iy in 0..info.nxy {
                let x0 = (rect.x + ix * x_stride).min(w);
                let y0 = (rect.y + iy * y_stride).min(h);
                let x1 = (x0 + x_stride).min(w);
                let y1 = (y0 + y_stride).min(h);

                for b in 0..bins {
                    let sum = self.data[[y1, x1, b]] + self.data[[y0, x0, b]]
                        - self.data[[y1, x0, b]]
                        - self.data[[y0, x1, b]];

                    out[i] = sum.max(0.0) + EPSILON;
                    i += 1;
                }
            }
        }

        let norm: f32 = out[..i].iter().sum();
        for v in &mut out[..i] {
            *v = (*v / norm).sqrt();
        }
    }
}

/// The four histograms of one scale, rebuilt every frame in place.
#[derive(Debug, Clone)]
pub struct ScaleDescriptors {
    pub hog: DescMat,
    pub hof: DescMat,
    pub mbhx: DescMat,
    pub mbhy: DescMat,
}

impl ScaleDescriptors {
    pub fn new(width: usize, height: usize, layout: &DescLayout) -> Self {
        Self {
            hog: DescMat::new(width, height, layout.hog.bins),
            hof: DescMat::new(width, height, layout.hof.bins),
            mbhx: DescMat::new(width, height, layout.mbh.bins),
            mbhy: DescMat::new(width, height, layout.mbh.bins),
        }
    }

    /// HOG from the previous image of the scale, HOF and MBH from its
    /// motion-compensated flow.
    pub fn rebuild(&mut self, prev: &GreyImage, flow_warp: &FlowField, layout: &DescLayout) {
        let (gx, gy) = image::derivatives(prev);
        self.hog.build(gx.view(), gy.view(), &layout.hog);

        let fx = flow_warp.index_axis(Axis(2), 0);
        let fy = flow_warp.index_axis(Axis(2), 1);
        self.hof.build(fx, fy, &layout.hof);

        let (fxx, fxy) = image::derivatives(&fx.to_owned());
        self.mbhx.build(fxx.view(), fxy.view(), &layout.mbh);

        let (fyx, fyy) = image::derivatives(&fy.to_owned());
        self.mbhy.build(fyx.view(), fyy.view(), &layout.mbh);
    }
}

/// Averages `L` per-frame readings over `nt` temporal cells of
/// `floor(L / nt)` frames each.
pub fn pool(readings: &[f32], info: &DescInfo, length: usize) -> Vec<f32> {
    let t_stride = (length / info.nt).max(1);
    let norm = 1.0 / t_stride as f32;
    let mut out = vec![0.0f32; info.pooled_len()];

    for (cell, chunk) in out.chunks_mut(info.dim).enumerate() {
        for t in 0..t_stride {
            let start = (cell * t_stride + t) * info.dim;
            if let Some(reading) = readings.get(start..start + info.dim) {
                for (acc, v) in chunk.iter_mut().zip(reading) {
                    *acc += v;
                }
            }
        }

        chunk.iter_mut().for_each(|v| *v *= norm);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn info(bins: usize, is_hof: bool) -> DescInfo {
        DescInfo::new(bins, is_hof, 4, 2, 3)
    }

    #[test]
    fn rect_stays_inside_the_image() {
        let i = DescInfo::new(8, false, 32, 2, 3);

        assert_eq!(Rect::around(3, 40, 100, 80, &i), Rect { x: 0, y: 24, width: 32, height: 32 });
        assert_eq!(Rect::around(99, 79, 100, 80, &i).x, 68);
        assert_eq!(Rect::around(99, 79, 100, 80, &i).y, 48);
        // smaller than the patch
        assert_eq!(Rect::around(10, 10, 20, 20, &i).x, 0);
    }

    #[test]
    fn orientation_is_split_between_adjacent_bins() {
        // 22.5 degrees lies halfway between bins 0 and 1 of 8
        let a = 22.5f32.to_radians();
        let xc = Array2::from_elem((2, 2), 2.0 * a.cos());
        let yc = Array2::from_elem((2, 2), 2.0 * a.sin());

        let mut mat = DescMat::new(2, 2, 8);
        mat.build(xc.view(), yc.view(), &info(8, false));

        assert!((mat.data[[2, 2, 0]] - 4.0).abs() < 1e-4);
        assert!((mat.data[[2, 2, 1]] - 4.0).abs() < 1e-4);
        assert!(mat.data[[2, 2, 2]].abs() < 1e-6);
        // first row and column stay empty
        assert!(mat.data.index_axis(Axis(0), 0).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn slow_flow_goes_to_the_zero_bin() {
        let xc = Array2::from_elem((3, 3), 0.1f32);
        let yc = Array2::zeros((3, 3));

        let mut mat = DescMat::new(3, 3, 9);
        mat.build(xc.view(), yc.view(), &info(9, true));

        assert_eq!(mat.data[[3, 3, 8]], 9.0);
        assert!((0..8).all(|b| mat.data[[3, 3, b]] == 0.0));
    }

    #[test]
    fn readout_is_normalized() {
        let xc = Array2::from_shape_fn((8, 8), |(y, x)| (x as f32 - 3.5) * (y as f32 + 1.0));
        let yc = Array2::from_shape_fn((8, 8), |(y, x)| (y as f32 - 3.5) - x as f32);
        let i = info(8, false);

        let mut mat = DescMat::new(8, 8, 8);
        mat.build(xc.view(), yc.view(), &i);

        let mut out = vec![0.0; i.dim];
        mat.read(&Rect::around(4, 4, 8, 8, &i), &i, &mut out);

        let squares: f32 = out.iter().map(|v| v * v).sum();
        assert!((squares - 1.0).abs() < 1e-4);
        assert!(out.iter().all(|&v| v > 0.0));
    }

    #[test]
    fn empty_cells_read_uniform() {
        let zero = Array2::zeros((6, 6));
        let i = info(8, false);

        let mut mat = DescMat::new(6, 6, 8);
        mat.build(zero.view(), zero.view(), &i);

        let mut out = vec![0.0; i.dim];
        mat.read(&Rect::around(5, 5, 6, 6, &i), &i, &mut out);

        let expected = (1.0 / i.dim as f32).sqrt();
        assert!(out.iter().all(|&v| (v - expected).abs() < 1e-6));
    }

    #[test]
    fn pooling_averages_temporal_cells() {
        let i = DescInfo::new(1, false, 4, 1, 2);
        // five readings, stride two: the last one is left out
        let readings = [1.0, 3.0, 10.0, 20.0, 99.0];

        assert_eq!(pool(&readings, &i, 5), vec![2.0, 15.0]);
    }
}
