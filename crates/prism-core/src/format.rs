use serde::{Deserialize, Serialize};
use std::fmt;

/// Describes the video format a channel runs at. The stage is driven by an
/// external tick; the format only supplies geometry and the frame budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoFormat {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

impl VideoFormat {
    pub fn new(name: impl Into<String>, width: u32, height: u32, fps: f64) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            fps,
        }
    }

    pub fn pal() -> Self {
        Self::new("PAL", 720, 576, 25.0)
    }

    pub fn hd720p60() -> Self {
        Self::new("720p6000", 1280, 720, 60.0)
    }

    pub fn hd1080p50() -> Self {
        Self::new("1080p5000", 1920, 1080, 50.0)
    }

    /// Seconds available to produce one frame.
    pub fn frame_budget(&self) -> f64 {
        1.0 / self.fps
    }
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}x{}@{})", self.name, self.width, self.height, self.fps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_budget() {
        assert!((VideoFormat::pal().frame_budget() - 0.04).abs() < 1e-9);
        assert!((VideoFormat::hd1080p50().frame_budget() - 0.02).abs() < 1e-9);
    }
}
