use serde_json::Value;

use prism_core::{Frame, PrismError, PrismResult, VideoFormat};

use crate::interaction::InteractionEvent;

/// Result of driving a producer one frame forward. End-of-content is part
/// of the type so the auto-play seam can promote a staged background in the
/// same tick without an error round-trip.
#[derive(Debug, Clone)]
pub enum FramePull {
    /// The next frame of content.
    Frame(Frame),
    /// The producer has no more content.
    Exhausted,
}

/// A source of successive frames with preview/play/pause/stop semantics.
///
/// Producers are shared handles (`Arc<dyn Producer>`): the stage, a staging
/// slot and a route on another channel may all hold one concurrently.
/// `receive` is never called concurrently on the same producer, but must be
/// safe to call while a *different* producer is being driven in parallel.
pub trait Producer: Send + Sync {
    /// Drive the producer one frame forward.
    fn receive(&self, format: &VideoFormat) -> PrismResult<FramePull>;

    /// The producer's own staged upcoming content, if it has any (transition
    /// producers stage their target). Driven without consuming.
    fn receive_background(&self, _format: &VideoFormat) -> PrismResult<Frame> {
        Ok(Frame::empty())
    }

    /// Forward a command-layer call to the producer.
    fn call(&self, _params: &[String]) -> PrismResult<String> {
        Err(PrismError::invalid_op(format!(
            "producer {} accepts no calls",
            self.name()
        )))
    }

    /// Hit-test a point in the producer's local space.
    fn collides(&self, _x: f64, _y: f64) -> bool {
        false
    }

    /// Deliver a pointer event already translated into local space.
    fn on_interaction(&self, _event: &InteractionEvent) {}

    fn info(&self) -> Value {
        serde_json::json!({ "producer": self.name() })
    }

    fn delay_info(&self) -> Value {
        Value::Null
    }

    fn name(&self) -> &str;
}

/// A sink receiving one layer's per-tick frame (a route or recorder).
/// `send` is fire-and-forget from the stage's point of view; back-pressure
/// is the sink's problem. Must be safe for parallel delivery alongside
/// other sinks.
pub trait Consumer: Send + Sync {
    /// Returns false when the sink could not accept the frame.
    fn send(&self, frame: Frame) -> PrismResult<bool>;

    fn name(&self) -> &str;
}

/// What a registered layer consumer receives each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerMode {
    /// The layer's current foreground output.
    Foreground,
    /// The staged background output.
    Background,
    /// The background when one is staged, otherwise the foreground.
    NextProducer,
}

/// Opaque identity for a registered route entry; compared only for
/// equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConsumerToken(pub u64);
