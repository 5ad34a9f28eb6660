//! OpenCV-backed collaborators: video decoding, Farneback flow, SIFT
//! keypoints, RANSAC homography and the track display window.

use crate::emitter::Record;
use crate::error::Error;
use crate::features::{FeatureDetector, Features};
use crate::flow::{DenseFlow, FlowField};
use crate::frame::Frame;
use crate::homography::{HomographyEstimator, HomographyFit};
use crate::image::{self, GreyImage};
use crate::mask::RegionMask;
use crate::source::FrameSource;
use crate::tracker::FrameObserver;
use nalgebra as na;
use ndarray::Array2;
use opencv::{
    calib3d,
    core::{self, Mat},
    features2d, highgui, imgproc,
    prelude::*,
    video, videoio,
};

fn grey_to_mat(grey: &GreyImage) -> Result<Mat, Error> {
    let (h, w) = grey.dim();
    let mut mat =
        Mat::new_rows_cols_with_default(h as i32, w as i32, core::CV_8UC1, core::Scalar::all(0.0))?;

    for (dst, src) in mat.data_typed_mut::<u8>()?.iter_mut().zip(grey.iter()) {
        *dst = src.round().clamp(0.0, 255.0) as u8;
    }

    Ok(mat)
}

fn mask_to_mat(mask: Option<&RegionMask>) -> Result<Mat, Error> {
    let mask = match mask {
        Some(m) => m,
        None => return Ok(Mat::default()),
    };

    let (w, h) = mask.dims();
    let mut mat =
        Mat::new_rows_cols_with_default(h as i32, w as i32, core::CV_8UC1, core::Scalar::all(0.0))?;

    for (i, v) in mat.data_typed_mut::<u8>()?.iter_mut().enumerate() {
        if mask.allows(i % w, i / w) {
            *v = 255;
        }
    }

    Ok(mat)
}

/// Frames decoded from a video file.
pub struct VideoFileSource {
    cam: videoio::VideoCapture,
    dims: (usize, usize),
    total: usize,
}

impl VideoFileSource {
    pub fn open(path: &str) -> Result<Self, Error> {
        let cam = videoio::VideoCapture::from_file(path, videoio::CAP_ANY)
            .map_err(|_| Error::VideoOpen(path.to_string()))?;

        if !videoio::VideoCapture::is_opened(&cam)? {
            return Err(Error::VideoOpen(path.to_string()));
        }

        let width = cam.get(videoio::CAP_PROP_FRAME_WIDTH)?.max(0.0) as usize;
        let height = cam.get(videoio::CAP_PROP_FRAME_HEIGHT)?.max(0.0) as usize;
        let total = cam.get(videoio::CAP_PROP_FRAME_COUNT)?.max(0.0) as usize;

        Ok(Self {
            cam,
            dims: (width, height),
            total,
        })
    }
}

impl FrameSource for VideoFileSource {
    #[inline]
    fn dims(&self) -> (usize, usize) {
        self.dims
    }

    #[inline]
    fn len(&self) -> usize {
        self.total
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, Error> {
        let mut mat = Mat::default();
        if !self.cam.read(&mut mat)? || mat.rows() == 0 || mat.cols() == 0 {
            return Ok(None);
        }

        let mut grey = Mat::default();
        imgproc::cvt_color(&mat, &mut grey, imgproc::COLOR_BGR2GRAY, 0)?;

        let (w, h) = (grey.cols() as usize, grey.rows() as usize);
        let mut frame = Frame::from_grey(image::from_raw(w, h, grey.data_typed::<u8>()?));
        frame.image = Some(mat);

        Ok(Some(frame))
    }
}

/// Gunnar Farneback's polynomial-expansion flow on 8-bit copies of the images.
#[derive(Debug, Clone)]
pub struct FarnebackFlow {
    pub pyr_scale: f64,
    pub levels: i32,
    pub win_size: i32,
    pub iterations: i32,
    pub poly_n: i32,
    pub poly_sigma: f64,
}

impl Default for FarnebackFlow {
    fn default() -> Self {
        Self {
            pyr_scale: std::f64::consts::FRAC_1_SQRT_2,
            levels: 3,
            win_size: 10,
            iterations: 2,
            poly_n: 7,
            poly_sigma: 1.5,
        }
    }
}

impl DenseFlow for FarnebackFlow {
    fn compute(&mut self, prev: &GreyImage, next: &GreyImage, out: &mut FlowField) -> Result<(), Error> {
        if prev.dim() != next.dim() {
            return Err(Error::FrameSize {
                got: image::dims(next),
                expected: image::dims(prev),
            });
        }

        let (h, w) = prev.dim();
        let mut flow = Mat::default();
        video::calc_optical_flow_farneback(
            &grey_to_mat(prev)?,
            &grey_to_mat(next)?,
            &mut flow,
            self.pyr_scale,
            self.levels,
            self.win_size,
            self.iterations,
            self.poly_n,
            self.poly_sigma,
            0,
        )?;

        if out.dim() != (h, w, 2) {
            *out = FlowField::zeros((h, w, 2));
        }

        for (i, v) in flow.data_typed::<core::Vec2f>()?.iter().enumerate() {
            let (y, x) = (i / w, i % w);
            out[[y, x, 0]] = v[0];
            out[[y, x, 1]] = v[1];
        }

        Ok(())
    }
}

/// SIFT keypoints and 128-float descriptors.
pub struct SiftDetector {
    sift: core::Ptr<features2d::SIFT>,
}

impl SiftDetector {
    pub fn new(max_features: i32) -> Result<Self, Error> {
        Ok(Self {
            sift: features2d::SIFT::create(max_features, 3, 0.04, 10.0, 1.6)?,
        })
    }
}

impl FeatureDetector for SiftDetector {
    fn detect(&mut self, grey: &GreyImage, mask: Option<&RegionMask>) -> Result<Features, Error> {
        let mut keypoints = core::Vector::<core::KeyPoint>::new();
        let mut desc = Mat::default();

        self.sift.detect_and_compute(
            &grey_to_mat(grey)?,
            &mask_to_mat(mask)?,
            &mut keypoints,
            &mut desc,
            false,
        )?;

        if keypoints.is_empty() || desc.rows() == 0 {
            return Ok(Features::empty(128));
        }

        let cols = desc.cols() as usize;
        let mut descriptors = Array2::zeros((keypoints.len(), cols));
        for (i, mut row) in descriptors.outer_iter_mut().enumerate() {
            for (dst, src) in row.iter_mut().zip(desc.at_row::<f32>(i as i32)?) {
                *dst = *src;
            }
        }

        let points = keypoints
            .iter()
            .map(|kp| {
                let pt = kp.pt();
                na::Point2::new(pt.x, pt.y)
            })
            .collect();

        Ok(Features {
            points,
            descriptors,
        })
    }
}

/// `calib3d::find_homography` with RANSAC.
#[derive(Debug, Clone)]
pub struct OpenCvHomography {
    pub max_iterations: i32,
    pub confidence: f64,
}

impl Default for OpenCvHomography {
    fn default() -> Self {
        Self {
            max_iterations: 2000,
            confidence: 0.995,
        }
    }
}

impl HomographyEstimator for OpenCvHomography {
    fn estimate(
        &mut self,
        src: &[na::Point2<f32>],
        dst: &[na::Point2<f32>],
        threshold: f64,
    ) -> Result<Option<HomographyFit>, Error> {
        if src.len() < 4 || src.len() != dst.len() {
            return Ok(None);
        }

        let a: core::Vector<core::Point2f> = src.iter().map(|p| core::Point2f::new(p.x, p.y)).collect();
        let b: core::Vector<core::Point2f> = dst.iter().map(|p| core::Point2f::new(p.x, p.y)).collect();

        let mut mask = Mat::default();
        let h = calib3d::find_homography_ext(
            &a,
            &b,
            calib3d::RANSAC,
            threshold,
            &mut mask,
            self.max_iterations,
            self.confidence,
        )?;

        if h.rows() != 3 || h.cols() != 3 {
            return Ok(None);
        }

        let mut transform = na::Matrix3::zeros();
        for r in 0..3 {
            for c in 0..3 {
                transform[(r, c)] = *h.at_2d::<f64>(r as i32, c as i32)?;
            }
        }

        let inliers = mask.data_typed::<u8>()?.iter().map(|&m| m != 0).collect();

        Ok(Some(HomographyFit { transform, inliers }))
    }
}

const ESC: i32 = 27;

/// Draws accepted trajectories on the colour frame; ESC stops the run.
pub struct TrackWindow {
    name: String,
}

impl TrackWindow {
    pub fn open(name: &str) -> Result<Self, Error> {
        highgui::named_window(name, highgui::WINDOW_NORMAL)?;

        Ok(Self { name: name.to_string() })
    }

    fn draw(img: &mut Mat, rec: &Record) -> Result<(), Error> {
        let n = rec.points.len();

        for (j, w) in rec.points.windows(2).enumerate() {
            let shade = 255.0 * (j + 1) as f64 / n as f64;
            imgproc::line(
                img,
                core::Point::new(w[0].x.round() as i32, w[0].y.round() as i32),
                core::Point::new(w[1].x.round() as i32, w[1].y.round() as i32),
                core::Scalar::new(0.0, shade, 0.0, 0.0),
                2,
                imgproc::LINE_AA,
                0,
            )?;
        }

        if let Some(last) = rec.points.last() {
            imgproc::circle(
                img,
                core::Point::new(last.x.round() as i32, last.y.round() as i32),
                2,
                core::Scalar::new(0.0, 0.0, 255.0, 0.0),
                imgproc::FILLED,
                imgproc::LINE_8,
                0,
            )?;
        }

        Ok(())
    }
}

impl FrameObserver for TrackWindow {
    fn observe(&mut self, frame: &Frame, accepted: &[Record]) -> Result<bool, Error> {
        let mut img = match &frame.image {
            Some(img) => img.clone(),
            None => return Ok(true),
        };

        for rec in accepted {
            Self::draw(&mut img, rec)?;
        }

        highgui::imshow(&self.name, &img)?;
        let key = highgui::wait_key(3)?;

        Ok(key & 0xff != ESC)
    }
}

impl Drop for TrackWindow {
    fn drop(&mut self) {
        let _ = highgui::destroy_window(&self.name);
    }
}
