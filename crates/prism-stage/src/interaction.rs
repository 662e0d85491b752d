use serde::{Deserialize, Serialize};

use prism_core::Transform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

/// A pointer event in normalized device coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InteractionEvent {
    MouseMove {
        x: f64,
        y: f64,
    },
    MouseButton {
        x: f64,
        y: f64,
        button: MouseButton,
        pressed: bool,
    },
    MouseWheel {
        x: f64,
        y: f64,
        ticks: f64,
    },
}

impl InteractionEvent {
    pub fn position(&self) -> (f64, f64) {
        match *self {
            InteractionEvent::MouseMove { x, y } => (x, y),
            InteractionEvent::MouseButton { x, y, .. } => (x, y),
            InteractionEvent::MouseWheel { x, y, .. } => (x, y),
        }
    }

    /// The same event re-addressed to another coordinate space.
    pub fn with_position(&self, x: f64, y: f64) -> InteractionEvent {
        let mut event = self.clone();
        match &mut event {
            InteractionEvent::MouseMove { x: ex, y: ey }
            | InteractionEvent::MouseButton { x: ex, y: ey, .. }
            | InteractionEvent::MouseWheel { x: ex, y: ey, .. } => {
                *ex = x;
                *ey = y;
            }
        }
        event
    }
}

/// The layer an event resolved to, with the transform that resolved it.
/// The transform is the exact value the tick draws with, so routing and
/// drawing can never disagree.
#[derive(Debug, Clone)]
pub struct InteractionTarget {
    pub transform: Transform,
    pub layer: i32,
}

/// Buffers pointer events for one tick and resolves them against layer
/// geometry on flush.
#[derive(Debug, Default)]
pub struct InteractionAggregator {
    buffer: Vec<InteractionEvent>,
}

impl InteractionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event to the per-tick buffer.
    pub fn offer(&mut self, event: InteractionEvent) {
        self.buffer.push(event);
    }

    /// Resolve and deliver every buffered event, in arrival order. Called
    /// exactly once per tick, before the draw fan-out. Events that resolve
    /// to no layer are dropped; the buffer is cleared either way.
    pub fn translate_and_send<H, D>(&mut self, mut hit_test: H, mut deliver: D)
    where
        H: FnMut(f64, f64) -> Option<InteractionTarget>,
        D: FnMut(i32, InteractionEvent),
    {
        for event in self.buffer.drain(..) {
            let (x, y) = event.position();
            let Some(target) = hit_test(x, y) else {
                continue;
            };
            if let Some((lx, ly)) = target.transform.screen_to_local(x, y) {
                deliver(target.layer, event.with_position(lx, ly));
            }
        }
    }
}
