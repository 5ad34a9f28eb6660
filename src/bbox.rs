use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::marker::PhantomData;

pub trait BBoxFormat: std::fmt::Debug {}

/// Left-top-right-bottom format, contains left top and right bottom corners
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ltrb;
impl BBoxFormat for Ltrb {}

/// Four coordinates tagged with their layout. Serialized as a plain `[f32; 4]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox<F: BBoxFormat>([f32; 4], PhantomData<F>);

impl<F: BBoxFormat> Serialize for BBox<F> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de, F: BBoxFormat> Deserialize<'de> for BBox<F> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        <[f32; 4]>::deserialize(deserializer).map(|raw| BBox(raw, PhantomData))
    }
}

impl BBox<Ltrb> {
    #[inline]
    pub fn ltrb(x1: f32, x2: f32, x3: f32, x4: f32) -> Self {
        BBox([x1, x2, x3, x4], PhantomData)
    }

    #[inline(always)]
    pub fn left(&self) -> f32 {
        self.0[0]
    }

    #[inline(always)]
    pub fn top(&self) -> f32 {
        self.0[1]
    }

    #[inline(always)]
    pub fn right(&self) -> f32 {
        self.0[2]
    }

    #[inline(always)]
    pub fn bottom(&self) -> f32 {
        self.0[3]
    }

    /// Integer pixel span `[x0, x1) x [y0, y1)` clipped to a `w x h` frame.
    pub fn pixel_span(&self, w: usize, h: usize) -> Option<(usize, usize, usize, usize)> {
        let clip = |v: f32, max: usize| (v.round().max(0.0) as usize).min(max);

        let x0 = clip(self.left().min(self.right()), w);
        let x1 = clip(self.left().max(self.right()), w);
        let y0 = clip(self.top().min(self.bottom()), h);
        let y1 = clip(self.top().max(self.bottom()), h);

        if x0 < x1 && y0 < y1 {
            Some((x0, y0, x1, y1))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_is_a_plain_array() {
        let b: BBox<Ltrb> = serde_json::from_str("[1.0, 2.0, 11.0, 22.0]").unwrap();
        assert_eq!(b.right() - b.left(), 10.0);
        assert_eq!(serde_json::to_string(&b).unwrap(), "[1.0,2.0,11.0,22.0]");
    }

    #[test]
    fn pixel_span_is_clipped_to_the_frame() {
        let b = BBox::ltrb(-5.0, 10.0, 15.0, 110.0);
        assert_eq!(b.pixel_span(64, 48), Some((0, 10, 15, 48)));

        let outside = BBox::ltrb(70.0, 0.0, 90.0, 10.0);
        assert_eq!(outside.pixel_span(64, 48), None);
    }
}
