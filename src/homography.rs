use crate::error::Error;
use nalgebra as na;
use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

#[derive(Debug, Clone)]
pub struct HomographyFit {
    pub transform: na::Matrix3<f64>,
    pub inliers: Vec<bool>,
}

impl HomographyFit {
    #[inline]
    pub fn inlier_count(&self) -> usize {
        self.inliers.iter().filter(|&&v| v).count()
    }
}

/// Robust projective fit `dst ~ H * src` with an inlier mask.
pub trait HomographyEstimator {
    fn estimate(
        &mut self,
        src: &[na::Point2<f32>],
        dst: &[na::Point2<f32>],
        threshold: f64,
    ) -> Result<Option<HomographyFit>, Error>;
}

/// RANSAC over minimal four-point solutions followed by a normalized DLT
/// refit on the consensus set. The sampler is reseeded on every call, so
/// equal inputs give equal transforms.
#[derive(Debug, Clone)]
pub struct RansacHomography {
    pub max_iterations: usize,
    pub confidence: f64,
    pub seed: u64,
}

impl Default for RansacHomography {
    fn default() -> Self {
        Self {
            max_iterations: 2000,
            confidence: 0.995,
            seed: 0x5eed,
        }
    }
}

#[inline]
fn to_f64(p: &na::Point2<f32>) -> na::Point2<f64> {
    na::Point2::new(p.x as f64, p.y as f64)
}

#[inline]
pub fn project(h: &na::Matrix3<f64>, p: &na::Point2<f64>) -> Option<na::Point2<f64>> {
    let v = h * na::Vector3::new(p.x, p.y, 1.0);
    if v.z.abs() < f64::EPSILON {
        return None;
    }

    Some(na::Point2::new(v.x / v.z, v.y / v.z))
}

fn collinear(a: &na::Point2<f64>, b: &na::Point2<f64>, c: &na::Point2<f64>) -> bool {
    let area = (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x);
    area.abs() < 1e-6
}

fn degenerate(pts: &[na::Point2<f64>; 4]) -> bool {
    (0..4).any(|skip| {
        let rest: Vec<_> = (0..4).filter(|&i| i != skip).map(|i| pts[i]).collect();
        collinear(&rest[0], &rest[1], &rest[2])
    })
}

fn normalize(h: na::Matrix3<f64>) -> na::Matrix3<f64> {
    let s = h[(2, 2)];
    if s.abs() > f64::EPSILON {
        h / s
    } else {
        h
    }
}

/// Exact homography through four correspondences with `h33 = 1`.
fn solve_four(src: &[na::Point2<f64>; 4], dst: &[na::Point2<f64>; 4]) -> Option<na::Matrix3<f64>> {
    let mut a = na::SMatrix::<f64, 8, 8>::zeros();
    let mut b = na::SVector::<f64, 8>::zeros();

    for i in 0..4 {
        let (x, y) = (src[i].x, src[i].y);
        let (u, v) = (dst[i].x, dst[i].y);
        let r = 2 * i;

        a[(r, 0)] = x;
        a[(r, 1)] = y;
        a[(r, 2)] = 1.0;
        a[(r, 6)] = -u * x;
        a[(r, 7)] = -u * y;
        b[r] = u;

        a[(r + 1, 3)] = x;
        a[(r + 1, 4)] = y;
        a[(r + 1, 5)] = 1.0;
        a[(r + 1, 6)] = -v * x;
        a[(r + 1, 7)] = -v * y;
        b[r + 1] = v;
    }

    let h = a.lu().solve(&b)?;

    Some(na::Matrix3::new(
        h[0], h[1], h[2], //
        h[3], h[4], h[5], //
        h[6], h[7], 1.0,
    ))
}

/// Similarity that moves the centroid to the origin and the mean distance to sqrt(2).
fn conditioner(pts: &[na::Point2<f64>]) -> na::Matrix3<f64> {
    let n = pts.len() as f64;
    let cx = pts.iter().map(|p| p.x).sum::<f64>() / n;
    let cy = pts.iter().map(|p| p.y).sum::<f64>() / n;
    let mean = pts
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    let s = if mean > f64::EPSILON {
        std::f64::consts::SQRT_2 / mean
    } else {
        1.0
    };

    na::Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

/// Least-squares DLT over all given correspondences.
fn solve_dlt(src: &[na::Point2<f64>], dst: &[na::Point2<f64>]) -> Option<na::Matrix3<f64>> {
    let ts = conditioner(src);
    let td = conditioner(dst);
    let mut ata = na::SMatrix::<f64, 9, 9>::zeros();

    for (p, q) in src.iter().zip(dst) {
        let p = ts * na::Vector3::new(p.x, p.y, 1.0);
        let q = td * na::Vector3::new(q.x, q.y, 1.0);
        let (x, y, u, v) = (p.x, p.y, q.x, q.y);

        let r1 = na::SVector::<f64, 9>::from_column_slice(&[
            x, y, 1.0, 0.0, 0.0, 0.0, -u * x, -u * y, -u,
        ]);
        let r2 = na::SVector::<f64, 9>::from_column_slice(&[
            0.0, 0.0, 0.0, x, y, 1.0, -v * x, -v * y, -v,
        ]);

        ata += r1 * r1.transpose() + r2 * r2.transpose();
    }

    let eigen = na::SymmetricEigen::new(ata);
    let (smallest, _) = eigen
        .eigenvalues
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))?;
    let h = eigen.eigenvectors.column(smallest);

    let hn = na::Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);
    let denorm = td.try_inverse()? * hn * ts;

    Some(normalize(denorm))
}

fn score(
    h: &na::Matrix3<f64>,
    src: &[na::Point2<f64>],
    dst: &[na::Point2<f64>],
    threshold2: f64,
    mask: &mut [bool],
) -> usize {
    let mut count = 0;
    for ((p, q), m) in src.iter().zip(dst).zip(mask.iter_mut()) {
        *m = match project(h, p) {
            Some(r) => na::distance_squared(&r, q) <= threshold2,
            None => false,
        };
        count += *m as usize;
    }

    count
}

impl HomographyEstimator for RansacHomography {
    fn estimate(
        &mut self,
        src: &[na::Point2<f32>],
        dst: &[na::Point2<f32>],
        threshold: f64,
    ) -> Result<Option<HomographyFit>, Error> {
        let n = src.len().min(dst.len());
        if n < 4 {
            return Ok(None);
        }

        let src: Vec<_> = src[..n].iter().map(to_f64).collect();
        let dst: Vec<_> = dst[..n].iter().map(to_f64).collect();
        let threshold2 = threshold * threshold;

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut mask = vec![false; n];
        let mut best: Option<(na::Matrix3<f64>, usize)> = None;
        let mut iterations = self.max_iterations;
        let mut iter = 0;

        while iter < iterations {
            iter += 1;

            let sample = index::sample(&mut rng, n, 4);
            let s = [src[sample.index(0)], src[sample.index(1)], src[sample.index(2)], src[sample.index(3)]];
            let d = [dst[sample.index(0)], dst[sample.index(1)], dst[sample.index(2)], dst[sample.index(3)]];

            if degenerate(&s) || degenerate(&d) {
                continue;
            }

            let h = match solve_four(&s, &d) {
                Some(h) => h,
                None => continue,
            };

            let count = score(&h, &src, &dst, threshold2, &mut mask);
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((h, count));

                let w = count as f64 / n as f64;
                if w >= 1.0 {
                    break;
                }

                let denom = (1.0 - w.powi(4)).ln();
                if denom < 0.0 {
                    let needed = ((1.0 - self.confidence).ln() / denom).ceil();
                    if needed.is_finite() && needed >= 0.0 {
                        iterations = iterations.min(needed as usize);
                    }
                }
            }
        }

        let (mut h, count) = match best {
            Some(b) => b,
            None => return Ok(None),
        };
        score(&h, &src, &dst, threshold2, &mut mask);

        if count >= 4 {
            let (s, d): (Vec<_>, Vec<_>) = src
                .iter()
                .zip(&dst)
                .zip(&mask)
                .filter(|(_, m)| **m)
                .map(|((p, q), _)| (*p, *q))
                .unzip();

            if let Some(refined) = solve_dlt(&s, &d) {
                let mut refined_mask = vec![false; n];
                if score(&refined, &src, &dst, threshold2, &mut refined_mask) >= count {
                    h = refined;
                    mask = refined_mask;
                }
            }
        }

        Ok(Some(HomographyFit {
            transform: normalize(h),
            inliers: mask,
        }))
    }
}
