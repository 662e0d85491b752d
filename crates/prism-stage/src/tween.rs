use prism_core::{Easing, Transform};

/// An in-progress animation of a layer's transform from `source` to `dest`
/// over `duration` frames. The layer advances it once per tick; sampling
/// and advancing are separate so one tick uses one consistent value.
#[derive(Debug, Clone, PartialEq)]
pub struct TweenedTransform {
    source: Transform,
    dest: Transform,
    duration: u32,
    elapsed: u32,
    easing: Easing,
}

impl TweenedTransform {
    pub fn new(source: Transform, dest: Transform, duration: u32, easing: Easing) -> Self {
        Self {
            source,
            dest,
            duration,
            elapsed: 0,
            easing,
        }
    }

    /// Sample the transform at the current elapsed count. Equals `source`
    /// at elapsed 0 and `dest` once elapsed reaches `duration`.
    pub fn fetch(&self) -> Transform {
        if self.duration == 0 || self.elapsed >= self.duration {
            return self.dest;
        }
        let t = self.easing.apply(self.elapsed as f64 / self.duration as f64);
        Transform::lerp(&self.source, &self.dest, t)
    }

    /// The committed destination.
    pub fn dest(&self) -> &Transform {
        &self.dest
    }

    /// Advance one frame, saturating at the duration.
    pub fn tick(&mut self) {
        if self.elapsed < self.duration {
            self.elapsed += 1;
        }
    }

    pub fn done(&self) -> bool {
        self.elapsed >= self.duration
    }

    pub fn duration(&self) -> u32 {
        self.duration
    }

    pub fn elapsed(&self) -> u32 {
        self.elapsed
    }
}

impl Default for TweenedTransform {
    /// source = dest = identity over zero frames.
    fn default() -> Self {
        Self::new(Transform::identity(), Transform::identity(), 0, Easing::Linear)
    }
}
