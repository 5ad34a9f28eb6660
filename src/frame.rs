use crate::image::{self, GreyImage};

/// One decoded video frame.
pub struct Frame {
    pub dims: (usize, usize),
    pub grey: GreyImage,
    // colour picture kept for display
    #[cfg(feature = "opencv")]
    pub image: Option<opencv::core::Mat>,
}

impl Frame {
    pub fn from_grey(grey: GreyImage) -> Self {
        Self {
            dims: image::dims(&grey),
            grey,
            #[cfg(feature = "opencv")]
            image: None,
        }
    }
}
