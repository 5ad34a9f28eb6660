//! The frame loop: camera-motion compensated multi-scale point tracking with
//! descriptor accumulation.

use crate::compensator::{CompensatorParams, MotionCompensator, TransformSource};
use crate::config::TrackerConfig;
use crate::correspondence::{self, MatchParams, MERGE_RADIUS};
use crate::descriptor::{DescLayout, ScaleDescriptors};
use crate::emitter::{Emitter, Record};
use crate::error::Error;
use crate::features::{BriefDetector, CornerParams, FeatureDetector, Features};
use crate::flow::{self, DenseFlow, FlowField, LucasKanadeFlow};
use crate::frame::Frame;
use crate::homography::{HomographyEstimator, RansacHomography};
use crate::image::GreyImage;
use crate::mask::{BoxList, RegionMask};
use crate::pyramid::{ImagePyramid, ScaleSet};
use crate::sampler::DenseSampler;
use crate::source::FrameSource;
use crate::store::{StepInputs, TrackStore};
use crate::validator::ValidatorParams;
use serde_derive::Serialize;
use std::io::Write;

/// Counters of one scale over a whole run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScaleStats {
    pub seeded: usize,
    pub emitted: usize,
    pub rejected: usize,
    pub discarded: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    pub frames: usize,
    pub identity_frames: usize,
    pub scales: Vec<ScaleStats>,
}

impl RunStats {
    pub fn emitted(&self) -> usize {
        self.scales.iter().map(|s| s.emitted).sum()
    }

    pub fn discarded(&self) -> usize {
        self.scales.iter().map(|s| s.discarded).sum()
    }
}

/// Receives every tracked frame with the records accepted on scale 0.
pub trait FrameObserver {
    /// Returning `false` stops the run.
    fn observe(&mut self, frame: &Frame, accepted: &[Record]) -> Result<bool, Error>;
}

/// Per-scale buffers, overwritten every frame.
struct ScaleState {
    scale: f32,
    flow: FlowField,
    flow_warp: FlowField,
    descs: ScaleDescriptors,
    store: TrackStore,
}

/// Everything that exists once the first frame fixed the geometry.
struct State {
    dims: (usize, usize),
    scales: Vec<ScaleState>,
    prev_grey: GreyImage,
    grey: GreyImage,
    warped_grey: GreyImage,
    prev_pyr: ImagePyramid,
    pyr: ImagePyramid,
    warped_pyr: ImagePyramid,
    prev_features: Features,
    mask: Option<RegionMask>,
}

pub struct DenseTracker {
    cfg: TrackerConfig,
    layout: DescLayout,
    sampler: DenseSampler,
    validator: ValidatorParams,
    corners: CornerParams,
    matching: MatchParams,
    flow: Box<dyn DenseFlow>,
    detector: Box<dyn FeatureDetector>,
    compensator: MotionCompensator,
    boxes: Option<BoxList>,
    state: Option<State>,
    frame_num: usize,
    init_counter: usize,
    stats: RunStats,
}

impl DenseTracker {
    pub fn new(
        cfg: TrackerConfig,
        flow: Box<dyn DenseFlow>,
        detector: Box<dyn FeatureDetector>,
        estimator: Box<dyn HomographyEstimator>,
    ) -> Result<Self, Error> {
        cfg.validate()?;

        Ok(Self {
            layout: DescLayout::from_config(&cfg),
            sampler: DenseSampler::new(cfg.min_distance),
            validator: ValidatorParams::default(),
            corners: CornerParams::default(),
            matching: MatchParams::default(),
            flow,
            detector,
            compensator: MotionCompensator::new(estimator, CompensatorParams::default()),
            boxes: None,
            state: None,
            frame_num: 0,
            init_counter: 0,
            stats: RunStats::default(),
            cfg,
        })
    }

    /// Pure Rust collaborators: dense Lucas-Kanade, BRIEF keypoints, RANSAC.
    pub fn with_defaults(cfg: TrackerConfig) -> Result<Self, Error> {
        Self::new(
            cfg,
            Box::new(LucasKanadeFlow::default()),
            Box::new(BriefDetector::default()),
            Box::new(RansacHomography::default()),
        )
    }

    /// Masks the given boxes out of sampling and correspondences.
    pub fn with_boxes(mut self, boxes: BoxList) -> Self {
        self.boxes = Some(boxes);
        self
    }

    /// Processes the whole stream, honouring the start/end window.
    pub fn run<S, W, T>(
        &mut self,
        source: &mut S,
        emitter: &mut Emitter<W, T>,
        mut observer: Option<&mut dyn FrameObserver>,
    ) -> Result<RunStats, Error>
    where
        S: FrameSource + ?Sized,
        W: Write,
        T: Write,
    {
        if let Some(boxes) = &self.boxes {
            boxes.check_length(source.len())?;
        }

        while let Some(frame) = source.next_frame()? {
            if self.frame_num > self.cfg.end_frame {
                break;
            }

            if self.frame_num < self.cfg.start_frame {
                self.frame_num += 1;
                continue;
            }

            let accepted = self.process(&frame, emitter)?;
            self.frame_num += 1;

            if let Some(obs) = observer.as_mut() {
                if !obs.observe(&frame, &accepted)? {
                    log::info!("stopped by observer at frame {}", self.frame_num - 1);
                    break;
                }
            }
        }

        emitter.flush()?;

        log::info!(
            "processed {} frames: {} trajectories emitted, {} left the frame, {} identity transforms",
            self.stats.frames,
            self.stats.emitted(),
            self.stats.discarded(),
            self.stats.identity_frames,
        );

        Ok(self.stats.clone())
    }

    fn update_mask(&mut self, dims: (usize, usize)) -> Option<RegionMask> {
        let boxes = self.boxes.as_ref()?;

        let mut mask = self
            .state
            .as_mut()
            .and_then(|s| s.mask.take())
            .unwrap_or_else(|| RegionMask::new(dims.0, dims.1));

        mask.reset_with_boxes(boxes.frame(self.frame_num));
        Some(mask)
    }

    /// Tracks one frame. The first frame only initializes. Returns the records
    /// accepted on scale 0.
    fn process<W: Write, T: Write>(
        &mut self,
        frame: &Frame,
        emitter: &mut Emitter<W, T>,
    ) -> Result<Vec<Record>, Error> {
        let mask = self.update_mask(frame.dims);

        if self.state.is_none() {
            self.initialize(frame, mask)?;
            return Ok(Vec::new());
        }

        let Self {
            cfg,
            layout,
            sampler,
            validator,
            corners,
            matching,
            flow,
            detector,
            compensator,
            state,
            frame_num,
            init_counter,
            stats,
            ..
        } = self;

        let st = match state.as_mut() {
            Some(st) => st,
            None => return Ok(Vec::new()),
        };

        if frame.dims != st.dims {
            return Err(Error::FrameSize {
                got: frame.dims,
                expected: st.dims,
            });
        }

        st.mask = mask;
        *init_counter += 1;
        stats.frames += 1;

        st.grey.assign(&frame.grey);
        st.pyr.rebuild(&st.grey);

        let features = detector.detect(&st.grey, st.mask.as_ref())?;
        let desc_pairs = correspondence::match_descriptors(&st.prev_features, &features, matching);

        for (i, sc) in st.scales.iter_mut().enumerate() {
            flow.compute(st.prev_pyr.level(i), st.pyr.level(i), &mut sc.flow)?;
        }

        let flow_pairs =
            correspondence::match_from_flow(&st.prev_grey, &st.scales[0].flow, corners, st.mask.as_ref());
        let flow_count = flow_pairs.len();
        let merged = correspondence::merge(flow_pairs, &desc_pairs, MERGE_RADIUS);

        let motion = compensator.estimate(&merged)?;
        match motion.source {
            TransformSource::Estimated { inliers } => log::debug!(
                "frame {}: {} matches ({} flow, {} descriptor), {} inliers",
                frame_num,
                merged.len(),
                flow_count,
                desc_pairs.len(),
                inliers
            ),
            other => {
                stats.identity_frames += 1;
                log::warn!("frame {}: identity camera motion ({:?})", frame_num, other);
            }
        }

        compensator.warp(
            &motion,
            &st.prev_grey,
            &st.grey,
            &mut st.warped_grey,
            &mut st.warped_pyr,
        );
        for (i, sc) in st.scales.iter_mut().enumerate() {
            flow.compute(st.prev_pyr.level(i), st.warped_pyr.level(i), &mut sc.flow_warp)?;
        }

        if stats.scales.len() < st.scales.len() {
            stats.scales.resize(st.scales.len(), ScaleStats::default());
        }

        let mut accepted = Vec::new();
        for (i, sc) in st.scales.iter_mut().enumerate() {
            sc.descs.rebuild(st.prev_pyr.level(i), &sc.flow_warp, layout);

            let step = sc.store.advance(&StepInputs {
                flow: &sc.flow,
                flow_warp: &sc.flow_warp,
                descs: &sc.descs,
                layout,
            });

            let counters = &mut stats.scales[i];
            counters.discarded += step.discarded;

            for track in &step.finished {
                match Record::accept(track, sc.scale, *frame_num, layout, validator) {
                    Ok(rec) => {
                        emitter.write(&rec)?;
                        counters.emitted += 1;
                        if i == 0 {
                            accepted.push(rec);
                        }
                    }
                    Err(reason) => {
                        counters.rejected += 1;
                        log::trace!("scale {}: trajectory rejected as {:?}", i, reason);
                    }
                }
            }
        }

        if *init_counter == cfg.init_gap {
            *init_counter = 0;

            for (i, sc) in st.scales.iter_mut().enumerate() {
                let occupied = sc.store.cursors();
                let seeds = sampler.sample(st.pyr.level(i), &occupied, st.mask.as_ref(), sc.scale);

                stats.scales[i].seeded += seeds.len();
                sc.store.seed(seeds);
            }
        }

        log::debug!(
            "frame {}: active {:?}",
            frame_num,
            st.scales.iter().map(|sc| sc.store.len()).collect::<Vec<_>>()
        );

        std::mem::swap(&mut st.prev_grey, &mut st.grey);
        std::mem::swap(&mut st.prev_pyr, &mut st.pyr);
        st.prev_features = features;

        Ok(accepted)
    }

    fn initialize(&mut self, frame: &Frame, mask: Option<RegionMask>) -> Result<(), Error> {
        let (w, h) = frame.dims;
        let set = ScaleSet::new(w, h, self.cfg.scale_num, self.cfg.patch_size);

        log::info!(
            "video size {}x{}, {} scales {:?}",
            w,
            h,
            set.len(),
            set.sizes
        );

        let mut prev_pyr = ImagePyramid::allocate(&set);
        prev_pyr.rebuild(&frame.grey);

        let mut scales = Vec::with_capacity(set.len());
        let mut seeded = Vec::with_capacity(set.len());
        for (i, (&scale, &(sw, sh))) in set.scales.iter().zip(&set.sizes).enumerate() {
            let mut store = TrackStore::new(self.cfg.track_length, self.layout);
            let seeds = self
                .sampler
                .sample(prev_pyr.level(i), &[], mask.as_ref(), scale);

            seeded.push(ScaleStats {
                seeded: seeds.len(),
                ..Default::default()
            });
            store.seed(seeds);

            scales.push(ScaleState {
                scale,
                flow: flow::allocate(sw, sh),
                flow_warp: flow::allocate(sw, sh),
                descs: ScaleDescriptors::new(sw, sh, &self.layout),
                store,
            });
        }

        let prev_features = self.detector.detect(&frame.grey, mask.as_ref())?;

        self.stats.scales = seeded;
        self.state = Some(State {
            dims: (w, h),
            scales,
            prev_grey: frame.grey.clone(),
            grey: frame.grey.clone(),
            warped_grey: frame.grey.clone(),
            pyr: ImagePyramid::allocate(&set),
            warped_pyr: ImagePyramid::allocate(&set),
            prev_pyr,
            prev_features,
            mask,
        });
        self.init_counter = 0;

        Ok(())
    }
}
