use crate::error::Error;
use crate::image::{self, GreyImage};
use nalgebra as na;
use ndarray::{Array2, Array3};

/// Per-pixel displacement, shape `(height, width, 2)` with `[dx, dy]` in the last axis.
pub type FlowField = Array3<f32>;

pub fn allocate(width: usize, height: usize) -> FlowField {
    Array3::zeros((height, width, 2))
}

#[inline]
pub fn flow_at(flow: &FlowField, x: usize, y: usize) -> na::Vector2<f32> {
    na::Vector2::new(flow[[y, x, 0]], flow[[y, x, 1]])
}

/// Dense correspondence field between two greyscale images of equal size.
pub trait DenseFlow {
    fn compute(
        &mut self,
        prev: &GreyImage,
        next: &GreyImage,
        flow: &mut FlowField,
    ) -> Result<(), Error>;
}

/// Coarse-to-fine dense Lucas-Kanade: every pixel solves its own
/// translational window problem, seeded by the upsampled coarser estimate.
#[derive(Debug, Clone)]
pub struct LucasKanadeFlow {
    // window half size
    pub radius: usize,
    pub levels: usize,
    pub iterations: usize,
    // smallest normalized structure tensor eigenvalue that gets solved
    pub min_eigen: f32,
    pub epsilon: f32,
}

impl Default for LucasKanadeFlow {
    fn default() -> Self {
        Self {
            radius: 2,
            levels: 3,
            iterations: 5,
            min_eigen: 1e-2,
            epsilon: 0.01,
        }
    }
}

impl LucasKanadeFlow {
    fn level_count(&self, w: usize, h: usize) -> usize {
        let window = 2 * self.radius + 1;
        let mut count = 1;
        let (mut w, mut h) = (w, h);

        while count < self.levels.max(1) && w / 2 >= window && h / 2 >= window {
            w /= 2;
            h /= 2;
            count += 1;
        }

        count
    }

    fn refine_level(&self, prev: &GreyImage, next: &GreyImage, disp: &mut FlowField) {
        let (h, w) = prev.dim();
        let (gx, gy) = image::derivatives(prev);
        let r = self.radius as isize;

        for y in 0..h {
            for x in 0..w {
                let mut h00 = 0.0f32;
                let mut h01 = 0.0f32;
                let mut h11 = 0.0f32;
                let mut count = 0.0f32;

                for wy in -r..=r {
                    for wx in -r..=r {
                        let (px, py) = (x as isize + wx, y as isize + wy);
                        if px < 0 || py < 0 || px >= w as isize || py >= h as isize {
                            continue;
                        }

                        let ix = gx[[py as usize, px as usize]] * 0.5;
                        let iy = gy[[py as usize, px as usize]] * 0.5;
                        h00 += ix * ix;
                        h01 += ix * iy;
                        h11 += iy * iy;
                        count += 1.0;
                    }
                }

                let half_trace = (h00 + h11) * 0.5;
                let lambda_min =
                    half_trace - (((h00 - h11) * 0.5).powi(2) + h01 * h01).sqrt();
                if count == 0.0 || lambda_min / count < self.min_eigen {
                    continue;
                }

                let det = h00 * h11 - h01 * h01;
                let inv_det = 1.0 / det;

                let mut dx = disp[[y, x, 0]];
                let mut dy = disp[[y, x, 1]];

                for _ in 0..self.iterations {
                    let mut b0 = 0.0f32;
                    let mut b1 = 0.0f32;

                    for wy in -r..=r {
                        for wx in -r..=r {
                            let (px, py) = (x as isize + wx, y as isize + wy);
                            if px < 0 || py < 0 || px >= w as isize || py >= h as isize {
                                continue;
                            }

                            let (px, py) = (px as usize, py as usize);
                            let t = prev[[py, px]];
                            let i = image::bilinear(next, px as f32 + dx, py as f32 + dy);
                            let e = t - i;

                            b0 += gx[[py, px]] * 0.5 * e;
                            b1 += gy[[py, px]] * 0.5 * e;
                        }
                    }

                    let delta_x = inv_det * (h11 * b0 - h01 * b1);
                    let delta_y = inv_det * (h00 * b1 - h01 * b0);

                    dx += delta_x;
                    dy += delta_y;

                    if delta_x * delta_x + delta_y * delta_y < self.epsilon * self.epsilon {
                        break;
                    }
                }

                disp[[y, x, 0]] = dx;
                disp[[y, x, 1]] = dy;
            }
        }
    }
}

fn upsample_flow(coarse: &FlowField, width: usize, height: usize) -> FlowField {
    let (ch, cw, _) = coarse.dim();
    let fx = cw as f32 / width as f32;
    let fy = ch as f32 / height as f32;

    let mut channels = [Array2::zeros((ch, cw)), Array2::zeros((ch, cw))];
    for (c, plane) in channels.iter_mut().enumerate() {
        plane.assign(&coarse.index_axis(ndarray::Axis(2), c));
    }

    Array3::from_shape_fn((height, width, 2), |(y, x, c)| {
        let sx = (x as f32 + 0.5) * fx - 0.5;
        let sy = (y as f32 + 0.5) * fy - 0.5;
        let scale = if c == 0 { 1.0 / fx } else { 1.0 / fy };

        image::bilinear(&channels[c], sx, sy) * scale
    })
}

impl DenseFlow for LucasKanadeFlow {
    fn compute(
        &mut self,
        prev: &GreyImage,
        next: &GreyImage,
        flow: &mut FlowField,
    ) -> Result<(), Error> {
        let (h, w) = prev.dim();
        if next.dim() != (h, w) {
            return Err(Error::FrameSize {
                got: image::dims(next),
                expected: (w, h),
            });
        }

        let count = self.level_count(w, h);

        let mut prev_levels = vec![prev.clone()];
        let mut next_levels = vec![next.clone()];
        for l in 1..count {
            let (lw, lh) = ((w >> l).max(1), (h >> l).max(1));
            let p = image::resize(&prev_levels[l - 1], lw, lh);
            let n = image::resize(&next_levels[l - 1], lw, lh);
            prev_levels.push(p);
            next_levels.push(n);
        }

        let mut disp: Option<FlowField> = None;
        for l in (0..count).rev() {
            let (lh, lw) = prev_levels[l].dim();
            let mut current = match disp.take() {
                Some(coarse) => upsample_flow(&coarse, lw, lh),
                None => Array3::zeros((lh, lw, 2)),
            };

            self.refine_level(&prev_levels[l], &next_levels[l], &mut current);
            disp = Some(current);
        }

        if let Some(result) = disp {
            if flow.dim() == result.dim() {
                flow.assign(&result);
            } else {
                *flow = result;
            }
        }

        Ok(())
    }
}
