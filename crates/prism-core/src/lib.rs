//! # prism-core
//!
//! Core value types for the Prism playout engine.
//! This crate contains the foundational types shared across all Prism crates:
//! frames, colors, transforms, easing curves, video formats, and error types.

pub mod color;
pub mod easing;
pub mod error;
pub mod format;
pub mod frame;
pub mod math;
pub mod transform;

pub use color::Color;
pub use easing::Easing;
pub use error::{PrismError, PrismResult};
pub use format::VideoFormat;
pub use frame::{Frame, FrameBuffer, PixelFormat};
pub use math::{Point2D, Quad, Rect};
pub use transform::{ChromaKey, Transform};
