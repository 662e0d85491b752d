//! # prism-stage
//!
//! The per-channel orchestrator of the Prism playout engine. A [`Stage`]
//! holds an ordered collection of independently controllable layers,
//! applies tweened transforms to them, pulls one composited frame per layer
//! per tick, fans each layer's output to registered routes, and resolves
//! pointer events against layer geometry. Every mutation is serialized
//! against frame production, so a produced tick always reflects one
//! consistent snapshot of layer state.

pub mod batch;
pub mod diag;
pub mod executor;
pub mod interaction;
pub mod layer;
pub mod monitor;
pub mod producer;
pub mod stage;
pub mod tween;

pub use batch::{BatchLock, StageDelayed};
pub use diag::Graph;
pub use executor::{Executor, Pending, Priority};
pub use interaction::{InteractionAggregator, InteractionEvent, InteractionTarget, MouseButton};
pub use layer::{Layer, LayerFrames, LayerMode};
pub use monitor::{Message, MonitorSink, Subject};
pub use producer::{Consumer, ConsumerMode, ConsumerToken, FramePull, Producer};
pub use stage::{Stage, TransformUpdate};
pub use tween::TweenedTransform;
