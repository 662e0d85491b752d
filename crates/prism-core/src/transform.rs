use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::math::{Point2D, Quad, Rect};

/// Chroma key descriptor. `target` is the key color; the scalar fields are
/// normalized [0,1] amounts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChromaKey {
    pub enabled: bool,
    pub target: Color,
    pub tolerance: f64,
    pub softness: f64,
    pub spill: f64,
}

impl ChromaKey {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            target: Color::GREEN,
            tolerance: 0.0,
            softness: 0.0,
            spill: 0.0,
        }
    }

    /// Interpolate the key. Color channels and amounts move linearly; the
    /// on/off flag steps to the destination as soon as the tween leaves
    /// its source (t > 0).
    pub fn lerp(&self, other: &ChromaKey, t: f64) -> ChromaKey {
        ChromaKey {
            enabled: if t > 0.0 { other.enabled } else { self.enabled },
            target: self.target.lerp(&other.target, t as f32),
            tolerance: self.tolerance + (other.tolerance - self.tolerance) * t,
            softness: self.softness + (other.softness - self.softness) * t,
            spill: self.spill + (other.spill - self.spill) * t,
        }
    }
}

impl Default for ChromaKey {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Geometric and color modifications applied to a frame before compositing.
///
/// The fill mapping places the unit square of source content on the output:
/// translate local coordinates by `-anchor`, scale, rotate by `rotation`
/// degrees, then translate by `anchor + position`. `screen_to_local` is the
/// exact inverse of the same mapping, so drawing and hit-testing can never
/// disagree on where a layer is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub anchor: Point2D,
    pub position: Point2D,
    pub scale: Point2D,
    /// Fill rotation around the anchor, in degrees.
    pub rotation: f64,
    pub clip: Rect,
    pub crop: Rect,
    pub perspective: Quad,
    pub opacity: f64,
    pub brightness: f64,
    pub contrast: f64,
    pub saturation: f64,
    pub volume: f64,
    /// Hue rotation, in degrees.
    pub angle: f64,
    pub chroma: ChromaKey,
}

impl Transform {
    /// The identity element: leaves a frame untouched.
    pub fn identity() -> Self {
        Self {
            anchor: Point2D::zero(),
            position: Point2D::zero(),
            scale: Point2D::new(1.0, 1.0),
            rotation: 0.0,
            clip: Rect::unit(),
            crop: Rect::unit(),
            perspective: Quad::unit(),
            opacity: 1.0,
            brightness: 1.0,
            contrast: 1.0,
            saturation: 1.0,
            volume: 1.0,
            angle: 0.0,
            chroma: ChromaKey::disabled(),
        }
    }

    /// Component-wise interpolation; rectangles and the perspective quad
    /// interpolate corner-wise.
    pub fn lerp(a: &Transform, b: &Transform, t: f64) -> Transform {
        let n = |x: f64, y: f64| x + (y - x) * t;
        Transform {
            anchor: a.anchor.lerp(&b.anchor, t),
            position: a.position.lerp(&b.position, t),
            scale: a.scale.lerp(&b.scale, t),
            rotation: n(a.rotation, b.rotation),
            clip: a.clip.lerp(&b.clip, t),
            crop: a.crop.lerp(&b.crop, t),
            perspective: a.perspective.lerp(&b.perspective, t),
            opacity: n(a.opacity, b.opacity),
            brightness: n(a.brightness, b.brightness),
            contrast: n(a.contrast, b.contrast),
            saturation: n(a.saturation, b.saturation),
            volume: n(a.volume, b.volume),
            angle: n(a.angle, b.angle),
            chroma: a.chroma.lerp(&b.chroma, t),
        }
    }

    /// Compose `child` under `parent`. Multiplicative fields multiply,
    /// rotations add, the child's fill is placed through the parent's fill,
    /// clips intersect, perspective corners offset-sum. Associative with
    /// `identity` as the unit.
    pub fn combine(parent: &Transform, child: &Transform) -> Transform {
        let unit = Quad::unit();
        let off = |p: Point2D, c: Point2D, u: Point2D| Point2D::new(p.x + (c.x - u.x), p.y + (c.y - u.y));
        Transform {
            anchor: parent.anchor,
            position: Point2D::new(
                parent.position.x + parent.scale.x * child.position.x,
                parent.position.y + parent.scale.y * child.position.y,
            ),
            scale: Point2D::new(parent.scale.x * child.scale.x, parent.scale.y * child.scale.y),
            rotation: parent.rotation + child.rotation,
            clip: parent.clip.intersect(&child.clip),
            crop: parent.crop.intersect(&child.crop),
            perspective: Quad {
                ul: off(parent.perspective.ul, child.perspective.ul, unit.ul),
                ur: off(parent.perspective.ur, child.perspective.ur, unit.ur),
                lr: off(parent.perspective.lr, child.perspective.lr, unit.lr),
                ll: off(parent.perspective.ll, child.perspective.ll, unit.ll),
            },
            opacity: parent.opacity * child.opacity,
            brightness: parent.brightness * child.brightness,
            contrast: parent.contrast * child.contrast,
            saturation: parent.saturation * child.saturation,
            volume: parent.volume * child.volume,
            angle: parent.angle + child.angle,
            chroma: if child.chroma.enabled { child.chroma } else { parent.chroma },
        }
    }

    /// Map a point in layer-local space ([0,1]²) to screen space.
    pub fn local_to_screen(&self, x: f64, y: f64) -> (f64, f64) {
        let dx = (x - self.anchor.x) * self.scale.x;
        let dy = (y - self.anchor.y) * self.scale.y;
        let rad = self.rotation.to_radians();
        let (sin, cos) = rad.sin_cos();
        (
            dx * cos - dy * sin + self.anchor.x + self.position.x,
            dx * sin + dy * cos + self.anchor.y + self.position.y,
        )
    }

    /// Map a screen-space point into layer-local space. Returns `None`
    /// when the fill is degenerate (zero scale) and has no inverse.
    pub fn screen_to_local(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        if self.scale.x == 0.0 || self.scale.y == 0.0 {
            return None;
        }
        let dx = x - self.anchor.x - self.position.x;
        let dy = y - self.anchor.y - self.position.y;
        let rad = (-self.rotation).to_radians();
        let (sin, cos) = rad.sin_cos();
        Some((
            (dx * cos - dy * sin) / self.scale.x + self.anchor.x,
            (dx * sin + dy * cos) / self.scale.y + self.anchor.y,
        ))
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}
