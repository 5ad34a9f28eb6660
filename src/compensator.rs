//! Camera motion estimation and the warp that removes it.

use crate::correspondence::CorrespondenceSet;
use crate::error::Error;
use crate::homography::{self, HomographyEstimator};
use crate::image::{self, GreyImage};
use crate::pyramid::ImagePyramid;
use nalgebra as na;
use ndarray::Zip;

#[derive(Debug, Clone, Copy)]
pub struct CompensatorParams {
    pub min_matches: usize,
    pub min_inliers: usize,
    // RANSAC reprojection tolerance in pixels
    pub reproj_threshold: f64,
}

impl Default for CompensatorParams {
    fn default() -> Self {
        Self {
            min_matches: 50,
            min_inliers: 25,
            reproj_threshold: 1.0,
        }
    }
}

/// Where the transform used for a frame came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransformSource {
    Estimated { inliers: usize },
    TooFewMatches { matches: usize },
    TooFewInliers { inliers: usize },
    NoFit,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraMotion {
    // previous frame -> current frame
    pub transform: na::Matrix3<f64>,
    pub source: TransformSource,
}

impl CameraMotion {
    #[inline]
    pub fn identity(source: TransformSource) -> Self {
        Self {
            transform: na::Matrix3::identity(),
            source,
        }
    }

    #[inline]
    pub fn is_identity(&self) -> bool {
        self.transform == na::Matrix3::identity()
    }
}

pub struct MotionCompensator {
    estimator: Box<dyn HomographyEstimator>,
    params: CompensatorParams,
}

impl MotionCompensator {
    pub fn new(estimator: Box<dyn HomographyEstimator>, params: CompensatorParams) -> Self {
        Self { estimator, params }
    }

    /// Robust background transform, falling back to identity when the
    /// correspondences or the consensus are too thin.
    pub fn estimate(&mut self, matches: &CorrespondenceSet) -> Result<CameraMotion, Error> {
        if matches.len() < self.params.min_matches {
            return Ok(CameraMotion::identity(TransformSource::TooFewMatches {
                matches: matches.len(),
            }));
        }

        let fit = self
            .estimator
            .estimate(&matches.prev, &matches.curr, self.params.reproj_threshold)?;

        Ok(match fit {
            Some(fit) => {
                let inliers = fit.inlier_count();
                if inliers < self.params.min_inliers {
                    CameraMotion::identity(TransformSource::TooFewInliers { inliers })
                } else {
                    CameraMotion {
                        transform: fit.transform,
                        source: TransformSource::Estimated { inliers },
                    }
                }
            }
            None => CameraMotion::identity(TransformSource::NoFit),
        })
    }

    /// Warps the current frame into the previous geometry and rebuilds the
    /// warped pyramid from it.
    pub fn warp(
        &self,
        motion: &CameraMotion,
        prev_grey: &GreyImage,
        curr_grey: &GreyImage,
        warped_grey: &mut GreyImage,
        warped: &mut ImagePyramid,
    ) {
        warp_to_previous(prev_grey, curr_grey, &motion.transform, warped_grey);
        warped.rebuild(warped_grey);
    }
}

/// Resamples `curr` into the geometry of `prev`: `dst(p) = curr(H p)`, where
/// `H` maps previous to current coordinates. Pixels whose source falls outside
/// the frame keep the previous frame's value.
pub fn warp_to_previous(
    prev: &GreyImage,
    curr: &GreyImage,
    h: &na::Matrix3<f64>,
    dst: &mut GreyImage,
) {
    let (height, width) = curr.dim();
    let (max_x, max_y) = ((width - 1) as f64, (height - 1) as f64);

    if dst.dim() != (height, width) {
        *dst = GreyImage::zeros((height, width));
    }

    Zip::indexed(dst).for_each(|(y, x), v| {
        let src = homography::project(h, &na::Point2::new(x as f64, y as f64));

        *v = match src {
            Some(s) if s.x >= 0.0 && s.y >= 0.0 && s.x <= max_x && s.y <= max_y => {
                image::bilinear(curr, s.x as f32, s.y as f32)
            }
            _ => prev[[y, x]],
        };
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::homography::HomographyFit;
    use ndarray::Array2;

    struct Fixed {
        transform: na::Matrix3<f64>,
        inliers: usize,
    }

    impl HomographyEstimator for Fixed {
        fn estimate(
            &mut self,
            src: &[na::Point2<f32>],
            _dst: &[na::Point2<f32>],
            _threshold: f64,
        ) -> Result<Option<HomographyFit>, Error> {
            let inliers = (0..src.len()).map(|i| i < self.inliers).collect();

            Ok(Some(HomographyFit {
                transform: self.transform,
                inliers,
            }))
        }
    }

    fn shifted() -> na::Matrix3<f64> {
        na::Matrix3::new(1.0, 0.0, 2.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0)
    }

    fn pairs(n: usize) -> CorrespondenceSet {
        let mut set = CorrespondenceSet::default();
        for i in 0..n {
            let p = na::Point2::new(i as f32, (i * 7 % 13) as f32);
            set.push(p, p + na::Vector2::new(2.0, 0.0));
        }
        set
    }

    fn compensator(inliers: usize) -> MotionCompensator {
        MotionCompensator::new(
            Box::new(Fixed {
                transform: shifted(),
                inliers,
            }),
            CompensatorParams::default(),
        )
    }

    #[test]
    fn few_matches_give_exact_identity() {
        let motion = compensator(1000).estimate(&pairs(49)).unwrap();

        assert!(motion.is_identity());
        assert_eq!(motion.source, TransformSource::TooFewMatches { matches: 49 });
    }

    #[test]
    fn few_inliers_give_exact_identity() {
        let motion = compensator(24).estimate(&pairs(80)).unwrap();

        assert!(motion.is_identity());
        assert_eq!(motion.source, TransformSource::TooFewInliers { inliers: 24 });
    }

    #[test]
    fn enough_support_keeps_the_estimate() {
        let motion = compensator(25).estimate(&pairs(50)).unwrap();

        assert_eq!(motion.transform, shifted());
        assert_eq!(motion.source, TransformSource::Estimated { inliers: 25 });
    }

    #[test]
    fn warp_undoes_a_pan_and_fills_from_the_previous_frame() {
        let prev = Array2::from_shape_fn((10, 12), |(y, x)| (x * 10 + y) as f32);
        // content moved right by two pixels
        let curr = Array2::from_shape_fn((10, 12), |(y, x)| {
            (x.saturating_sub(2) * 10 + y) as f32
        });

        let mut dst = Array2::zeros((10, 12));
        warp_to_previous(&prev, &curr, &shifted(), &mut dst);

        for y in 0..10 {
            for x in 0..12 {
                assert_eq!(dst[[y, x]], prev[[y, x]], "at {} {}", x, y);
            }
        }
    }
}
