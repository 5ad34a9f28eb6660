//! Greyscale image helpers over `ndarray`.
//!
//! Images are `Array2<f32>` indexed `[[y, x]]` holding intensities in the
//! `0..=255` range. Border handling follows the usual reflect-101 rule for
//! derivatives and clamp-to-edge for interpolation.

use nalgebra as na;
use ndarray::{Array2, Zip};
use num_traits::ToPrimitive;

pub type GreyImage = Array2<f32>;

/// Builds a greyscale image from a row-major buffer of any numeric pixel type.
pub fn from_raw<T: ToPrimitive + Copy>(width: usize, height: usize, data: &[T]) -> GreyImage {
    Array2::from_shape_fn((height, width), |(y, x)| {
        data.get(y * width + x)
            .and_then(|v| v.to_f32())
            .unwrap_or(0.0)
    })
}

#[inline]
pub fn dims(img: &GreyImage) -> (usize, usize) {
    let (h, w) = img.dim();
    (w, h)
}

/// Rounds a sub-pixel position and clamps it to a valid pixel of a `w x h` plane.
#[inline]
pub fn clamp_pixel(p: na::Point2<f32>, w: usize, h: usize) -> (usize, usize) {
    let x = (p.x.round() as i64).clamp(0, w as i64 - 1);
    let y = (p.y.round() as i64).clamp(0, h as i64 - 1);

    (x as usize, y as usize)
}

#[inline]
fn reflect101(i: isize, n: usize) -> usize {
    let n = n as isize;
    if n == 1 {
        return 0;
    }

    let mut i = i;
    loop {
        if i < 0 {
            i = -i;
        } else if i >= n {
            i = 2 * n - 2 - i;
        } else {
            return i as usize;
        }
    }
}

/// Bilinear sample with clamp-to-edge borders.
#[inline]
pub fn bilinear(img: &GreyImage, x: f32, y: f32) -> f32 {
    let (h, w) = img.dim();
    let x = x.clamp(0.0, (w - 1) as f32);
    let y = y.clamp(0.0, (h - 1) as f32);

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let ax = x - x0 as f32;
    let ay = y - y0 as f32;

    let top = img[[y0, x0]] * (1.0 - ax) + img[[y0, x1]] * ax;
    let bottom = img[[y1, x0]] * (1.0 - ax) + img[[y1, x1]] * ax;

    top * (1.0 - ay) + bottom * ay
}

/// Bilinear resize of `src` into the already allocated `dst`, pixel-centre aligned.
pub fn resize_into(src: &GreyImage, dst: &mut GreyImage) {
    let (sh, sw) = src.dim();
    let (dh, dw) = dst.dim();

    if (sh, sw) == (dh, dw) {
        dst.assign(src);
        return;
    }

    let fx = sw as f32 / dw as f32;
    let fy = sh as f32 / dh as f32;

    Zip::indexed(dst).for_each(|(y, x), v| {
        let sx = (x as f32 + 0.5) * fx - 0.5;
        let sy = (y as f32 + 0.5) * fy - 0.5;
        *v = bilinear(src, sx, sy);
    });
}

pub fn resize(src: &GreyImage, width: usize, height: usize) -> GreyImage {
    let mut dst = Array2::zeros((height, width));
    resize_into(src, &mut dst);
    dst
}

/// Central `[-1, 0, 1]` derivatives along x and y.
pub fn derivatives(img: &GreyImage) -> (GreyImage, GreyImage) {
    let (h, w) = img.dim();

    let dx = Array2::from_shape_fn((h, w), |(y, x)| {
        let l = reflect101(x as isize - 1, w);
        let r = reflect101(x as isize + 1, w);
        img[[y, r]] - img[[y, l]]
    });

    let dy = Array2::from_shape_fn((h, w), |(y, x)| {
        let t = reflect101(y as isize - 1, h);
        let b = reflect101(y as isize + 1, h);
        img[[b, x]] - img[[t, x]]
    });

    (dx, dy)
}

/// 3x3 Sobel derivatives.
pub fn sobel(img: &GreyImage) -> (GreyImage, GreyImage) {
    let (h, w) = img.dim();
    let at = |y: isize, x: isize| img[[reflect101(y, h), reflect101(x, w)]];

    let gx = Array2::from_shape_fn((h, w), |(y, x)| {
        let (y, x) = (y as isize, x as isize);
        (at(y - 1, x + 1) + 2.0 * at(y, x + 1) + at(y + 1, x + 1))
            - (at(y - 1, x - 1) + 2.0 * at(y, x - 1) + at(y + 1, x - 1))
    });

    let gy = Array2::from_shape_fn((h, w), |(y, x)| {
        let (y, x) = (y as isize, x as isize);
        (at(y + 1, x - 1) + 2.0 * at(y + 1, x) + at(y + 1, x + 1))
            - (at(y - 1, x - 1) + 2.0 * at(y - 1, x) + at(y - 1, x + 1))
    });

    (gx, gy)
}

/// Smallest eigenvalue of the 3x3-block structure tensor at every pixel.
pub fn min_eigen_response(img: &GreyImage) -> GreyImage {
    let (h, w) = img.dim();
    let (gx, gy) = sobel(img);

    let xx = &gx * &gx;
    let xy = &gx * &gy;
    let yy = &gy * &gy;

    let block = |m: &GreyImage, y: usize, x: usize| {
        let mut sum = 0.0;
        for dy in -1..=1 {
            for dx in -1..=1 {
                sum += m[[
                    reflect101(y as isize + dy, h),
                    reflect101(x as isize + dx, w),
                ]];
            }
        }
        sum / 9.0
    };

    Array2::from_shape_fn((h, w), |(y, x)| {
        let a = block(&xx, y, x) * 0.5;
        let b = block(&xy, y, x);
        let c = block(&yy, y, x) * 0.5;

        (a + c) - ((a - c) * (a - c) + b * b).sqrt()
    })
}
