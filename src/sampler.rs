use crate::image::{self, GreyImage};
use crate::mask::RegionMask;
use nalgebra as na;

/// Grid sampler: one candidate per free `min_distance` cell, taken at the
/// cell centre when its corner response is strong enough.
#[derive(Debug, Clone, Copy)]
pub struct DenseSampler {
    pub quality: f32,
    pub min_distance: usize,
}

impl DenseSampler {
    pub fn new(min_distance: usize) -> Self {
        Self {
            quality: 0.001,
            min_distance,
        }
    }

    /// Samples `grey` avoiding the cells that already hold one of `occupied`
    /// and any candidate closer than `min_distance` to one of them. `mask` is
    /// checked at full frame resolution, `scale` being the factor of the level
    /// `grey` belongs to.
    pub fn sample(
        &self,
        grey: &GreyImage,
        occupied: &[na::Point2<f32>],
        mask: Option<&RegionMask>,
        scale: f32,
    ) -> Vec<na::Point2<f32>> {
        let md = self.min_distance.max(1);
        let (w, h) = image::dims(grey);
        let (cols, rows) = (w / md, h / md);

        if cols == 0 || rows == 0 {
            return Vec::new();
        }

        let eig = image::min_eigen_response(grey);
        let max = eig.iter().cloned().fold(0.0f32, f32::max);
        let threshold = max * self.quality;

        // points past the grid are bucketed into the edge cells without taking them
        let mut taken = vec![false; cols * rows];
        let mut cells: Vec<Vec<na::Point2<f32>>> = vec![Vec::new(); cols * rows];
        for p in occupied {
            if p.x < 0.0 || p.y < 0.0 {
                continue;
            }

            let (cx, cy) = (p.x.floor() as usize / md, p.y.floor() as usize / md);
            if cx < cols && cy < rows {
                taken[cy * cols + cx] = true;
            }
            cells[cy.min(rows - 1) * cols + cx.min(cols - 1)].push(*p);
        }

        let md_f = md as f32;
        let crowded = |i: usize, j: usize, p: &na::Point2<f32>| {
            (i.saturating_sub(1)..(i + 2).min(rows)).any(|ni| {
                (j.saturating_sub(1)..(j + 2).min(cols))
                    .any(|nj| cells[ni * cols + nj].iter().any(|q| na::distance(p, q) < md_f))
            })
        };

        let mut points = Vec::new();
        for i in 0..rows {
            for j in 0..cols {
                if taken[i * cols + j] {
                    continue;
                }

                let (x, y) = (j * md + md / 2, i * md + md / 2);
                if eig[[y, x]] <= threshold {
                    continue;
                }

                let p = na::Point2::new(x as f32, y as f32);
                if crowded(i, j, &p) {
                    continue;
                }
                if let Some(mask) = mask {
                    if !mask.allows_scaled(p, scale) {
                        continue;
                    }
                }

                points.push(p);
            }
        }

        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn texture(w: usize, h: usize) -> GreyImage {
        Array2::from_shape_fn((h, w), |(y, x)| {
            let (x, y) = (x as f32, y as f32);
            128.0 + 50.0 * (x * 0.45).sin() * (y * 0.35).cos() + 30.0 * (0.2 * x + 0.3 * y).sin()
        })
    }

    #[test]
    fn samples_cell_centres_at_most_once() {
        let sampler = DenseSampler::new(5);
        let pts = sampler.sample(&texture(40, 30), &[], None, 1.0);

        assert!(!pts.is_empty());
        assert!(pts.len() <= 8 * 6);
        for p in &pts {
            assert_eq!(p.x as usize % 5, 2);
            assert_eq!(p.y as usize % 5, 2);
        }
    }

    #[test]
    fn occupied_cells_are_not_resampled() {
        let sampler = DenseSampler::new(5);
        let img = texture(40, 30);
        let first = sampler.sample(&img, &[], None, 1.0);
        let second = sampler.sample(&img, &first, None, 1.0);

        assert!(second.is_empty());

        let kept = &first[..first.len() / 2];
        let mut all = kept.to_vec();
        all.extend(sampler.sample(&img, kept, None, 1.0));

        assert_eq!(all.len(), first.len());
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert!(na::distance(a, b) >= 5.0);
            }
        }
    }

    #[test]
    fn seeds_keep_their_distance_from_off_centre_points() {
        let sampler = DenseSampler::new(5);
        let img = texture(40, 30);
        let occupied = [
            na::Point2::new(4.9, 2.0),
            na::Point2::new(20.1, 14.9),
            na::Point2::new(33.0, 27.5),
        ];

        let pts = sampler.sample(&img, &occupied, None, 1.0);
        assert!(!pts.is_empty());

        for p in &pts {
            for q in &occupied {
                assert!(na::distance(p, q) >= 5.0, "{} too close to {}", p, q);
            }
        }
    }

    #[test]
    fn flat_areas_and_masked_areas_are_skipped() {
        let sampler = DenseSampler::new(5);
        let flat = Array2::from_elem((30, 30), 10.0f32);
        assert!(sampler.sample(&flat, &[], None, 1.0).is_empty());

        let mut mask = RegionMask::new(80, 60);
        mask.reset_with_boxes(&[crate::bbox::BBox::ltrb(0.0, 0.0, 40.0, 60.0)]);

        // level with factor 2 over an 80x60 frame
        let pts = sampler.sample(&texture(40, 30), &[], Some(&mask), 2.0);
        assert!(!pts.is_empty());
        assert!(pts.iter().all(|p| p.x * 2.0 >= 40.0));
    }
}
