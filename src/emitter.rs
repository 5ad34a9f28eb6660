//! Binary output of accepted trajectories.
//!
//! Every record is a run of little-endian `f32` values with no framing:
//!
//! | field                                   | floats            |
//! |-----------------------------------------|-------------------|
//! | frame index                             | 1                 |
//! | mean x, mean y, std x, std y, length    | 5                 |
//! | scale factor                            | 1                 |
//! | normalized mean x, mean y, time         | 3                 |
//! | positions `(x, y)`                      | 2 L               |
//! | normalized displacements `(dx, dy)`     | 2 L               |
//! | HOG, HOF, MBHx, MBHy                    | nt * dim each     |
//!
//! The positions are also written, alone, to the trajectory stream.

use crate::descriptor::{self, DescLayout};
use crate::error::Error;
use crate::trajectory::Trajectory;
use crate::validator::{self, Rejection, ShapeStats, ValidatorParams};
use nalgebra as na;
use std::io::Write;

const MAX_NORMALIZED: f32 = 0.999;

/// Video properties used to normalize record positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeqInfo {
    pub width: usize,
    pub height: usize,
    pub length: usize,
    pub start_frame: usize,
}

/// A validated trajectory in full frame coordinates, ready to be written.
#[derive(Debug, Clone)]
pub struct Record {
    pub frame_num: usize,
    pub stats: ShapeStats,
    pub scale: f32,
    pub points: Vec<na::Point2<f32>>,
    pub disp: Vec<na::Vector2<f32>>,
    pub hog: Vec<f32>,
    pub hof: Vec<f32>,
    pub mbhx: Vec<f32>,
    pub mbhy: Vec<f32>,
}

impl Record {
    /// Rescales a complete trajectory of scale `scale`, validates it and pools
    /// its descriptors.
    pub fn accept(
        track: &Trajectory,
        scale: f32,
        frame_num: usize,
        layout: &DescLayout,
        params: &ValidatorParams,
    ) -> Result<Self, Rejection> {
        let length = track.length();
        let points = track.scaled_points(scale);

        let stats = validator::check_shape(&points, params)?;
        let disp = validator::check_camera_motion(&track.scaled_disp(scale), params)?;

        Ok(Self {
            frame_num,
            stats,
            scale,
            points,
            disp,
            hog: descriptor::pool(&track.hog, &layout.hog, length),
            hof: descriptor::pool(&track.hof, &layout.hof, length),
            mbhx: descriptor::pool(&track.mbhx, &layout.mbh, length),
            mbhy: descriptor::pool(&track.mbhy, &layout.mbh, length),
        })
    }

    #[inline]
    pub fn length(&self) -> usize {
        self.disp.len()
    }
}

/// Floats written per record for trajectories of `length` steps.
pub fn record_len(length: usize, layout: &DescLayout) -> usize {
    10 + 4 * length + layout.pooled_len()
}

#[inline]
fn normalized(v: f32) -> f32 {
    v.max(0.0).min(MAX_NORMALIZED)
}

#[inline]
fn put(buf: &mut Vec<u8>, v: f32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

/// Writes records to the feature stream and their positions to the
/// trajectory stream, one record at a time.
pub struct Emitter<W: Write, T: Write> {
    idt: W,
    tra: T,
    seq: SeqInfo,
    buf: Vec<u8>,
}

impl<W: Write, T: Write> Emitter<W, T> {
    pub fn new(idt: W, tra: T, seq: SeqInfo) -> Self {
        Self {
            idt,
            tra,
            seq,
            buf: Vec::new(),
        }
    }

    pub fn write(&mut self, rec: &Record) -> Result<(), Error> {
        let seq = &self.seq;
        let length = rec.length();
        let s = &rec.stats;

        self.buf.clear();
        let buf = &mut self.buf;

        put(buf, rec.frame_num as f32);
        for v in [s.mean_x, s.mean_y, s.var_x, s.var_y, s.length, rec.scale] {
            put(buf, v);
        }

        let t = (rec.frame_num as f32 - length as f32 / 2.0 - seq.start_frame as f32)
            / seq.length.max(1) as f32;
        put(buf, normalized(s.mean_x / seq.width as f32));
        put(buf, normalized(s.mean_y / seq.height as f32));
        put(buf, normalized(t));

        let pos_start = buf.len();
        for p in &rec.points[..length] {
            put(buf, p.x);
            put(buf, p.y);
        }
        let pos_end = buf.len();

        for d in &rec.disp {
            put(buf, d.x);
            put(buf, d.y);
        }

        for desc in [&rec.hog, &rec.hof, &rec.mbhx, &rec.mbhy] {
            for &v in desc.iter() {
                put(buf, v);
            }
        }

        self.idt.write_all(&self.buf)?;
        self.tra.write_all(&self.buf[pos_start..pos_end])?;

        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), Error> {
        self.idt.flush()?;
        self.tra.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> (W, T) {
        (self.idt, self.tra)
    }
}
