use crate::error::Error;
use serde_derive::{Deserialize, Serialize};

/// Run parameters of the trajectory extractor.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TrackerConfig {
    pub video_file: String,
    pub idt_file: String,
    pub tra_file: String,
    pub bb_file: Option<String>,

    pub track_length: usize,
    pub start_frame: usize,
    pub end_frame: usize,

    // dense sampling step in pixels
    pub min_distance: usize,

    pub patch_size: usize,
    pub nxy_cell: usize,
    pub nt_cell: usize,
    pub scale_num: usize,
    pub init_gap: usize,
    pub show_track: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            video_file: "test.avi".into(),
            idt_file: "test.bin".into(),
            tra_file: "tra.bin".into(),
            bb_file: None,
            track_length: 15,
            start_frame: 0,
            end_frame: 1_000_000,
            min_distance: 5,
            patch_size: 32,
            nxy_cell: 2,
            nt_cell: 3,
            scale_num: 8,
            init_gap: 1,
            show_track: false,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), Error> {
        let positive = [
            ("track_length", self.track_length),
            ("min_distance", self.min_distance),
            ("patch_size", self.patch_size),
            ("nxy_cell", self.nxy_cell),
            ("nt_cell", self.nt_cell),
            ("scale_num", self.scale_num),
            ("init_gap", self.init_gap),
        ];

        for (name, value) in positive {
            if value == 0 {
                return Err(Error::InvalidConfig(format!("{} must be positive", name)));
            }
        }

        if self.nt_cell > self.track_length {
            return Err(Error::InvalidConfig(format!(
                "nt_cell ({}) exceeds track_length ({})",
                self.nt_cell, self.track_length
            )));
        }

        if self.patch_size < self.nxy_cell {
            return Err(Error::InvalidConfig(format!(
                "patch_size ({}) is smaller than nxy_cell ({})",
                self.patch_size, self.nxy_cell
            )));
        }

        if self.end_frame < self.start_frame {
            return Err(Error::InvalidConfig(format!(
                "end_frame ({}) precedes start_frame ({})",
                self.end_frame, self.start_frame
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = TrackerConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.track_length, 15);
        assert_eq!(cfg.scale_num, 8);
    }

    #[test]
    fn rejects_zero_gap_and_oversized_temporal_cells() {
        let cfg = TrackerConfig {
            init_gap: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));

        let cfg = TrackerConfig {
            track_length: 2,
            nt_cell: 3,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg: TrackerConfig =
            serde_json::from_str(r#"{"track_length": 10, "bb_file": "boxes.json"}"#).unwrap();

        assert_eq!(cfg.track_length, 10);
        assert_eq!(cfg.bb_file.as_deref(), Some("boxes.json"));
        assert_eq!(cfg.min_distance, 5);
    }
}
