use crate::image::{self, GreyImage};
use ndarray::Array2;

pub const SCALE_STRIDE: f32 = std::f32::consts::SQRT_2;

/// Scale factors and image sizes of every pyramid level, derived once from
/// the first frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleSet {
    pub scales: Vec<f32>,
    // (width, height)
    pub sizes: Vec<(usize, usize)>,
}

impl ScaleSet {
    pub fn new(width: usize, height: usize, scale_num: usize, min_size: usize) -> Self {
        let mut smallest = width.min(height) as f32;
        let mut nlayers = 0;

        while smallest >= min_size as f32 {
            smallest /= SCALE_STRIDE;
            nlayers += 1;
        }

        let count = scale_num.min(nlayers.max(1)).max(1);

        let mut scales = Vec::with_capacity(count);
        let mut sizes = Vec::with_capacity(count);

        scales.push(1.0f32);
        sizes.push((width, height));

        for i in 1..count {
            let scale = scales[i - 1] * SCALE_STRIDE;
            let w = ((width as f32 / scale).round() as usize).max(1);
            let h = ((height as f32 / scale).round() as usize).max(1);

            scales.push(scale);
            sizes.push((w, h));
        }

        Self { scales, sizes }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.scales.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.scales.is_empty()
    }
}

/// Greyscale image per scale. Allocated once, refreshed in place.
#[derive(Debug, Clone)]
pub struct ImagePyramid {
    levels: Vec<GreyImage>,
}

impl ImagePyramid {
    pub fn allocate(scales: &ScaleSet) -> Self {
        Self {
            levels: scales
                .sizes
                .iter()
                .map(|&(w, h)| Array2::zeros((h, w)))
                .collect(),
        }
    }

    /// Copies `grey` into level 0 and resizes each next level from its predecessor.
    pub fn rebuild(&mut self, grey: &GreyImage) {
        if let Some(first) = self.levels.first_mut() {
            image::resize_into(grey, first);
        }

        for i in 1..self.levels.len() {
            let (done, rest) = self.levels.split_at_mut(i);
            image::resize_into(&done[i - 1], &mut rest[0]);
        }
    }

    #[inline]
    pub fn level(&self, idx: usize) -> &GreyImage {
        &self.levels[idx]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_count_is_bounded_by_the_patch_size() {
        let set = ScaleSet::new(320, 240, 8, 32);
        // 240 / sqrt(2)^k stays >= 32 for k = 0..=5
        assert_eq!(set.len(), 6);
        assert_eq!(set.sizes[0], (320, 240));
        assert_eq!(set.sizes[2], (160, 120));
        assert!((set.scales[2] - 2.0).abs() < 1e-5);

        let set = ScaleSet::new(320, 240, 3, 32);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn tiny_frames_keep_a_single_scale() {
        let set = ScaleSet::new(20, 10, 8, 32);
        assert_eq!(set.len(), 1);
        assert_eq!(set.scales, vec![1.0]);
    }

    #[test]
    fn rebuild_reuses_level_buffers() {
        let set = ScaleSet::new(64, 64, 8, 32);
        let mut pyr = ImagePyramid::allocate(&set);
        let grey = Array2::from_elem((64, 64), 12.0f32);

        pyr.rebuild(&grey);
        let ptr = pyr.level(1).as_ptr();
        pyr.rebuild(&grey);

        assert_eq!(pyr.level(1).as_ptr(), ptr);
        assert_eq!(pyr.level(1).dim(), (45, 45));
        assert!(pyr.level(1).iter().all(|&v| (v - 12.0).abs() < 1e-4));
    }
}
