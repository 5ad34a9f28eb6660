//! Acceptance checks run on a trajectory once it reaches full length.

use nalgebra as na;

#[derive(Debug, Clone, Copy)]
pub struct ValidatorParams {
    // std below this on both axes: static
    pub min_var: f32,
    // std above this on either axis: random
    pub max_var: f32,
    // a single step longer than this and than 0.7 of the path: erratic
    pub max_dis: f32,
    // largest compensated step must exceed this
    pub min_motion: f32,
}

impl Default for ValidatorParams {
    fn default() -> Self {
        Self {
            min_var: 3.0f32.sqrt(),
            max_var: 50.0,
            max_dis: 20.0,
            min_motion: 1.0,
        }
    }
}

/// Summary of a trajectory's shape; `var_*` hold standard deviations.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ShapeStats {
    pub mean_x: f32,
    pub mean_y: f32,
    pub var_x: f32,
    pub var_y: f32,
    pub length: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Static,
    Random,
    Erratic,
    CameraMotion,
}

/// Shape statistics of `points`, or why the trajectory is rejected.
pub fn check_shape(points: &[na::Point2<f32>], params: &ValidatorParams) -> Result<ShapeStats, Rejection> {
    let n = points.len().max(1) as f32;

    let mean_x = points.iter().map(|p| p.x).sum::<f32>() / n;
    let mean_y = points.iter().map(|p| p.y).sum::<f32>() / n;

    let var_x = (points.iter().map(|p| (p.x - mean_x).powi(2)).sum::<f32>() / n).sqrt();
    let var_y = (points.iter().map(|p| (p.y - mean_y).powi(2)).sum::<f32>() / n).sqrt();

    if var_x < params.min_var && var_y < params.min_var {
        return Err(Rejection::Static);
    }

    if var_x > params.max_var || var_y > params.max_var {
        return Err(Rejection::Random);
    }

    let mut length = 0.0f32;
    let mut max_step = 0.0f32;
    for w in points.windows(2) {
        let step = na::distance(&w[0], &w[1]);
        length += step;
        max_step = max_step.max(step);
    }

    if max_step > params.max_dis && max_step > length * 0.7 {
        return Err(Rejection::Erratic);
    }

    Ok(ShapeStats {
        mean_x,
        mean_y,
        var_x,
        var_y,
        length,
    })
}

/// Rejects trajectories whose compensated motion never exceeds one step of
/// `min_motion`; otherwise returns the displacements divided by their total
/// magnitude.
pub fn check_camera_motion(
    disp: &[na::Vector2<f32>],
    params: &ValidatorParams,
) -> Result<Vec<na::Vector2<f32>>, Rejection> {
    let mut sum = 0.0f32;
    let mut max = 0.0f32;

    for d in disp {
        let m = d.norm();
        sum += m;
        max = max.max(m);
    }

    if max <= params.min_motion {
        return Err(Rejection::CameraMotion);
    }

    Ok(disp.iter().map(|d| *d / sum).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(step: (f32, f32), n: usize) -> Vec<na::Point2<f32>> {
        (0..n)
            .map(|i| na::Point2::new(10.0 + step.0 * i as f32, 20.0 + step.1 * i as f32))
            .collect()
    }

    #[test]
    fn uniform_motion_is_accepted() {
        let stats = check_shape(&line((2.0, 0.0), 16), &ValidatorParams::default()).unwrap();

        assert!((stats.mean_x - 25.0).abs() < 1e-4);
        assert!((stats.mean_y - 20.0).abs() < 1e-4);
        assert!((stats.length - 30.0).abs() < 1e-4);
        assert_eq!(stats.var_y, 0.0);
        assert!(stats.var_x > 3.0f32.sqrt());
    }

    #[test]
    fn static_random_and_erratic_are_rejected() {
        let p = ValidatorParams::default();

        assert_eq!(check_shape(&line((0.1, 0.1), 16), &p), Err(Rejection::Static));
        assert_eq!(check_shape(&line((15.0, 0.0), 16), &p), Err(Rejection::Random));

        let mut jump = line((0.5, 0.0), 16);
        for q in jump.iter_mut().skip(8) {
            q.y += 25.0;
        }
        assert_eq!(check_shape(&jump, &p), Err(Rejection::Erratic));
    }

    #[test]
    fn small_compensated_motion_is_camera_motion() {
        let p = ValidatorParams::default();
        let still = vec![na::Vector2::new(0.3, 0.4); 15];

        assert_eq!(check_camera_motion(&still, &p), Err(Rejection::CameraMotion));

        let moving = vec![na::Vector2::new(2.0, 0.0); 15];
        let norm = check_camera_motion(&moving, &p).unwrap();
        let total: f32 = norm.iter().map(|d| d.norm()).sum();

        assert!((total - 1.0).abs() < 1e-5);
        assert!((norm[0].x - 1.0 / 15.0).abs() < 1e-6);
    }
}
