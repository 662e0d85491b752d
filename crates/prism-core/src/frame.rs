use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::transform::Transform;

/// Pixel format of a frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8-bit RGBA (4 bytes per pixel).
    Rgba8,
    /// 8-bit RGB (3 bytes per pixel, no alpha).
    Rgb8,
}

impl PixelFormat {
    /// Bytes per pixel for this format.
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgba8 => 4,
            PixelFormat::Rgb8 => 3,
        }
    }
}

/// A single video frame as a raw pixel buffer, produced by a media producer
/// and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBuffer {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl FrameBuffer {
    /// Create a new frame buffer filled with zeros (transparent black).
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let size = (width as usize) * (height as usize) * format.bytes_per_pixel();
        Self {
            data: vec![0u8; size],
            width,
            height,
            format,
        }
    }

    /// Total number of pixels.
    pub fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }
}

/// A lightweight handle to frame content plus the transform to apply when
/// compositing it. Cloning shares the underlying buffer.
///
/// The empty frame (no content) is what a vacant layer or a route-only slot
/// yields each tick.
#[derive(Debug, Clone)]
pub struct Frame {
    buffer: Option<Arc<FrameBuffer>>,
    transform: Transform,
}

impl Frame {
    /// The empty frame: no content, identity transform.
    pub fn empty() -> Self {
        Self {
            buffer: None,
            transform: Transform::identity(),
        }
    }

    /// Wrap produced content in a frame with an identity transform.
    pub fn from_buffer(buffer: Arc<FrameBuffer>) -> Self {
        Self {
            buffer: Some(buffer),
            transform: Transform::identity(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_none()
    }

    pub fn buffer(&self) -> Option<&Arc<FrameBuffer>> {
        self.buffer.as_ref()
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    /// The frame with `outer` composed on top of the transform it already
    /// carries. The content stays shared.
    pub fn transformed(&self, outer: &Transform) -> Frame {
        Frame {
            buffer: self.buffer.clone(),
            transform: Transform::combine(outer, &self.transform),
        }
    }
}

impl Default for Frame {
    fn default() -> Self {
        Frame::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Point2D;

    #[test]
    fn test_empty_frame() {
        let f = Frame::empty();
        assert!(f.is_empty());
        assert_eq!(*f.transform(), Transform::identity());
    }

    #[test]
    fn test_transformed_shares_content() {
        let buf = Arc::new(FrameBuffer::new(2, 2, PixelFormat::Rgba8));
        let f = Frame::from_buffer(buf.clone());
        let mut t = Transform::identity();
        t.opacity = 0.5;
        t.position = Point2D::new(0.1, 0.0);
        let out = f.transformed(&t);
        assert!(Arc::ptr_eq(out.buffer().unwrap(), &buf));
        assert!((out.transform().opacity - 0.5).abs() < 1e-9);
    }
}
