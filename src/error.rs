use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not initialize capturing {0}")]
    VideoOpen(String),

    #[error("Could not open output {path}: {source}")]
    OutputOpen {
        path: String,
        source: std::io::Error,
    },

    #[error("Bounding box parse error at line {line}: {source}")]
    BoxParse {
        line: usize,
        source: serde_json::Error,
    },

    #[error("Bounding box list has {boxes} frames, video has {frames}")]
    BoxCountMismatch { boxes: usize, frames: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Frame size {got:?} does not match the first frame {expected:?}")]
    FrameSize {
        got: (usize, usize),
        expected: (usize, usize),
    },

    #[cfg(feature = "opencv")]
    #[error("OpenCV Error: {0}")]
    OpenCv(#[from] opencv::Error),
}
