use serde::{Deserialize, Serialize};

/// A 2D point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn zero() -> Self {
        Self { x: 0.0, y: 0.0 }
    }

    /// Linear interpolation between two points.
    pub fn lerp(&self, other: &Point2D, t: f64) -> Point2D {
        Point2D {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }
}

impl Default for Point2D {
    fn default() -> Self {
        Self::zero()
    }
}

/// An axis-aligned rectangle in normalized coordinates, upper-left to
/// lower-right. Used for clipping and cropping regions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub ul: Point2D,
    pub lr: Point2D,
}

impl Rect {
    pub fn new(ul: Point2D, lr: Point2D) -> Self {
        Self { ul, lr }
    }

    /// The full unit rectangle (0,0)–(1,1).
    pub fn unit() -> Self {
        Self {
            ul: Point2D::zero(),
            lr: Point2D::new(1.0, 1.0),
        }
    }

    /// Corner-wise linear interpolation.
    pub fn lerp(&self, other: &Rect, t: f64) -> Rect {
        Rect {
            ul: self.ul.lerp(&other.ul, t),
            lr: self.lr.lerp(&other.lr, t),
        }
    }

    /// Intersection of two rectangles.
    pub fn intersect(&self, other: &Rect) -> Rect {
        Rect {
            ul: Point2D::new(self.ul.x.max(other.ul.x), self.ul.y.max(other.ul.y)),
            lr: Point2D::new(self.lr.x.min(other.lr.x), self.lr.y.min(other.lr.y)),
        }
    }
}

impl Default for Rect {
    fn default() -> Self {
        Self::unit()
    }
}

/// A quadrilateral given by its four corners. Used for perspective
/// distortion of the fill.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quad {
    pub ul: Point2D,
    pub ur: Point2D,
    pub lr: Point2D,
    pub ll: Point2D,
}

impl Quad {
    /// The undistorted unit quad.
    pub fn unit() -> Self {
        Self {
            ul: Point2D::new(0.0, 0.0),
            ur: Point2D::new(1.0, 0.0),
            lr: Point2D::new(1.0, 1.0),
            ll: Point2D::new(0.0, 1.0),
        }
    }

    /// Corner-wise linear interpolation.
    pub fn lerp(&self, other: &Quad, t: f64) -> Quad {
        Quad {
            ul: self.ul.lerp(&other.ul, t),
            ur: self.ur.lerp(&other.ur, t),
            lr: self.lr.lerp(&other.lr, t),
            ll: self.ll.lerp(&other.ll, t),
        }
    }
}

impl Default for Quad {
    fn default() -> Self {
        Self::unit()
    }
}
