use densetrack::descriptor::DescLayout;
use densetrack::emitter::record_len;
use densetrack::image::GreyImage;
use densetrack::{extract, MemorySource, TrackerConfig};
use ndarray::Array2;

const W: usize = 128;
const H: usize = 96;
const FRAMES: usize = 20;
const SIDE: usize = 32;

fn background(x: f32, y: f32) -> f32 {
    128.0 + 50.0 * (x * 0.45).sin() * (y * 0.35).cos() + 30.0 * (0.2 * x + 0.3 * y).sin()
}

fn patch(u: f32, v: f32) -> f32 {
    128.0 + 60.0 * (0.7 * u + 0.3).sin() * (0.6 * v).cos() + 25.0 * (0.4 * u - 0.5 * v).cos()
}

/// Static textured background with a textured square moving right by 2 px per frame.
fn moving_square() -> Vec<GreyImage> {
    (0..FRAMES)
        .map(|t| {
            let (sx, sy) = (10 + 2 * t, 32);
            Array2::from_shape_fn((H, W), |(y, x)| {
                if x >= sx && x < sx + SIDE && y >= sy && y < sy + SIDE {
                    patch((x - sx) as f32, (y - sy) as f32)
                } else {
                    background(x as f32, y as f32)
                }
            })
        })
        .collect()
}

/// The whole scene shifted right by 2 px per frame.
fn camera_pan() -> Vec<GreyImage> {
    (0..FRAMES)
        .map(|t| {
            Array2::from_shape_fn((H, W), |(y, x)| background(x as f32 - 2.0 * t as f32, y as f32))
        })
        .collect()
}

fn config() -> TrackerConfig {
    TrackerConfig {
        scale_num: 1,
        ..Default::default()
    }
}

fn floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn run(frames: Vec<GreyImage>, cfg: TrackerConfig) -> (densetrack::RunStats, Vec<u8>, Vec<u8>) {
    let mut source = MemorySource::new(frames);
    let (stats, (idt, tra)) = extract(cfg, &mut source, None, Vec::new(), Vec::new()).unwrap();

    (stats, idt, tra)
}

#[test]
fn moving_square_yields_uniform_trajectories() {
    let cfg = config();
    let len = cfg.track_length;
    let rec = record_len(len, &DescLayout::from_config(&cfg));

    let (stats, idt, tra) = run(moving_square(), cfg);
    let idt = floats(&idt);
    let tra = floats(&tra);

    assert_eq!(stats.frames, FRAMES - 1);
    assert!(stats.emitted() > 0);
    assert_eq!(idt.len(), stats.emitted() * rec);
    assert_eq!(tra.len(), stats.emitted() * 2 * len);

    let uniform = tra.chunks(2 * len).filter(|t| {
        let steps: Vec<(f32, f32)> = (1..len)
            .map(|i| (t[2 * i] - t[2 * i - 2], t[2 * i + 1] - t[2 * i - 1]))
            .collect();
        let n = steps.len() as f32;
        let mean_dx = steps.iter().map(|s| s.0).sum::<f32>() / n;
        let mean_dy = steps.iter().map(|s| s.1).sum::<f32>() / n;

        (mean_dx - 2.0).abs() < 0.5 && mean_dy.abs() < 0.5
    });
    assert!(uniform.count() > 0);

    for r in idt.chunks(rec) {
        // completed after at least `len` tracked frames
        assert!(r[0] >= len as f32);
        assert_eq!(r[6], 1.0);
        for &v in &r[7..10] {
            assert!((0.0..=0.999).contains(&v), "{}", v);
        }
        // trajectory positions are copied verbatim
        assert!(tra.chunks(2 * len).any(|t| t == &r[10..10 + 2 * len]));
    }

    let on_square: Vec<&[f32]> = idt
        .chunks(rec)
        .filter(|r| {
            let pos = &r[10..10 + 2 * len];
            (1..len).all(|i| {
                let (dx, dy) = (pos[2 * i] - pos[2 * i - 2], pos[2 * i + 1] - pos[2 * i - 1]);
                (dx - 2.0).abs() < 0.5 && dy.abs() < 0.5
            })
        })
        .collect();
    assert!(!on_square.is_empty());

    let l = len as f32;
    for r in on_square {
        // path length over L steps of about 2 px
        assert!((r[5] - 2.0 * l).abs() < 0.25 * 2.0 * l, "{}", r[5]);

        // displacements normalized by their total magnitude, uniformly about (1/L, 0)
        let disp = &r[10 + 2 * len..10 + 4 * len];
        for d in disp.chunks(2) {
            assert!((d[0] * l - 1.0).abs() < 0.35, "{:?}", d);
            assert!((d[1] * l).abs() < 0.3, "{:?}", d);
        }
    }
}

#[test]
fn camera_pan_is_rejected_everywhere() {
    let (stats, idt, tra) = run(camera_pan(), config());

    assert_eq!(stats.frames, FRAMES - 1);
    assert_eq!(stats.identity_frames, 0);
    assert!(stats.scales[0].seeded > 0);
    assert_eq!(stats.emitted(), 0);
    assert!(idt.is_empty());
    assert!(tra.is_empty());
}

#[test]
fn repeated_runs_are_byte_identical() {
    let (_, a_idt, a_tra) = run(moving_square(), config());
    let (_, b_idt, b_tra) = run(moving_square(), config());

    assert!(!a_idt.is_empty());
    assert_eq!(a_idt, b_idt);
    assert_eq!(a_tra, b_tra);
}

#[test]
fn frames_outside_the_window_are_skipped() {
    let cfg = TrackerConfig {
        start_frame: 3,
        end_frame: 10,
        ..config()
    };

    let (stats, idt, _) = run(moving_square(), cfg);

    // frame 3 initializes, 4..=10 are tracked
    assert_eq!(stats.frames, 7);
    assert!(idt.is_empty());
}

#[test]
fn several_scales_report_separately() {
    let cfg = TrackerConfig {
        scale_num: 3,
        ..Default::default()
    };

    let (stats, _, _) = run(moving_square(), cfg);

    // 96 / sqrt(2)^2 = 48 is still at least one patch
    assert_eq!(stats.scales.len(), 3);
    assert!(stats.scales.iter().all(|s| s.seeded > 0));
}
