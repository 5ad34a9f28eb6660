use clap::Parser;
use densetrack::cv::{FarnebackFlow, OpenCvHomography, SiftDetector, TrackWindow, VideoFileSource};
use densetrack::error::Error;
use densetrack::mask::BoxList;
use densetrack::{DenseTracker, Emitter, FrameObserver, FrameSource, SeqInfo, TrackerConfig};
use log::LevelFilter;
use std::fs::File;
use std::io::{BufReader, BufWriter};

/// Improved dense trajectory extraction
#[derive(Debug, Parser)]
#[command(version)]
struct Opts {
    /// Input video
    #[arg(short = 'f', long, default_value = "test.avi")]
    video_file: String,

    /// Output of trajectory features
    #[arg(short = 'o', long, default_value = "test.bin")]
    idt_file: String,

    /// Output of trajectory positions
    #[arg(short = 'r', long, default_value = "tra.bin")]
    tra_file: String,

    /// Bounding boxes to mask out, one JSON line per frame
    #[arg(short = 'b', long)]
    bb_file: Option<String>,

    #[arg(short = 'L', long, default_value_t = 15)]
    track_length: usize,

    #[arg(short = 'S', long, default_value_t = 0)]
    start_frame: usize,

    #[arg(short = 'E', long, default_value_t = 1_000_000)]
    end_frame: usize,

    /// Dense sampling step
    #[arg(short = 'W', long, default_value_t = 5)]
    min_distance: usize,

    #[arg(short = 'N', long, default_value_t = 32)]
    patch_size: usize,

    #[arg(short = 's', long, default_value_t = 2)]
    nxy_cell: usize,

    #[arg(short = 't', long, default_value_t = 3)]
    nt_cell: usize,

    #[arg(short = 'A', long, default_value_t = 8)]
    scale_num: usize,

    /// Frames between resampling
    #[arg(short = 'I', long, default_value_t = 1)]
    init_gap: usize,

    /// Show accepted trajectories in a window
    #[arg(short = 'T', long)]
    show_track: bool,
}

impl From<Opts> for TrackerConfig {
    fn from(o: Opts) -> Self {
        Self {
            video_file: o.video_file,
            idt_file: o.idt_file,
            tra_file: o.tra_file,
            bb_file: o.bb_file,
            track_length: o.track_length,
            start_frame: o.start_frame,
            end_frame: o.end_frame,
            min_distance: o.min_distance,
            patch_size: o.patch_size,
            nxy_cell: o.nxy_cell,
            nt_cell: o.nt_cell,
            scale_num: o.scale_num,
            init_gap: o.init_gap,
            show_track: o.show_track,
        }
    }
}

fn create(path: &str) -> Result<BufWriter<File>, Error> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|source| Error::OutputOpen {
            path: path.to_string(),
            source,
        })
}

fn main() -> Result<(), Error> {
    env_logger::builder()
        .filter_level(LevelFilter::Warn)
        .parse_default_env()
        .init();

    let cfg: TrackerConfig = Opts::parse().into();
    cfg.validate()?;

    let idt = create(&cfg.idt_file)?;
    let tra = create(&cfg.tra_file)?;

    let mut source = VideoFileSource::open(&cfg.video_file)?;
    let (width, height) = source.dims();
    log::info!(
        "video size, length: {}, width: {}, height: {}",
        source.len(),
        width,
        height
    );

    let boxes = match &cfg.bb_file {
        Some(path) => {
            let list = BoxList::from_reader(BufReader::new(File::open(path)?))?;
            list.check_length(source.len())?;
            Some(list)
        }
        None => None,
    };

    let seq = SeqInfo {
        width,
        height,
        length: source.len().max(1),
        start_frame: cfg.start_frame,
    };

    let mut window = if cfg.show_track {
        Some(TrackWindow::open("densetrack")?)
    } else {
        None
    };

    let mut tracker = DenseTracker::new(
        cfg,
        Box::new(FarnebackFlow::default()),
        Box::new(SiftDetector::new(1000)?),
        Box::new(OpenCvHomography::default()),
    )?;
    if let Some(boxes) = boxes {
        tracker = tracker.with_boxes(boxes);
    }

    let mut emitter = Emitter::new(idt, tra, seq);
    let stats = tracker.run(
        &mut source,
        &mut emitter,
        window.as_mut().map(|w| w as &mut dyn FrameObserver),
    )?;

    for (i, s) in stats.scales.iter().enumerate() {
        log::info!(
            "scale {}: {} seeded, {} emitted, {} rejected, {} left the frame",
            i,
            s.seeded,
            s.emitted,
            s.rejected,
            s.discarded
        );
    }

    Ok(())
}
