use serde_json::{json, Value};
use std::sync::Arc;

use prism_core::{Frame, PrismResult, VideoFormat};

use crate::interaction::InteractionEvent;
use crate::monitor::Subject;
use crate::producer::{FramePull, Producer};
use crate::tween::TweenedTransform;

/// Playback state of a layer's foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerMode {
    Playing,
    Paused,
    Stopped,
}

impl LayerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayerMode::Playing => "playing",
            LayerMode::Paused => "paused",
            LayerMode::Stopped => "stopped",
        }
    }
}

/// One tick's output of a layer: the raw producer frame (what routes in
/// foreground mode receive) and the same content with the tween's current
/// transform applied (what the mixer composites).
#[derive(Debug, Clone)]
pub struct LayerFrames {
    pub raw: Frame,
    pub transformed: Frame,
}

/// An indexed slot in a stage: at most one foreground producer, one staged
/// background producer, a transform tween, and a playback mode.
pub struct Layer {
    index: i32,
    foreground: Option<Arc<dyn Producer>>,
    background: Option<Arc<dyn Producer>>,
    mode: LayerMode,
    auto_play: bool,
    tween: TweenedTransform,
    last_frame: Frame,
    monitor: Arc<Subject>,
}

impl Layer {
    pub fn new(index: i32) -> Self {
        Self {
            index,
            foreground: None,
            background: None,
            mode: LayerMode::Stopped,
            auto_play: false,
            tween: TweenedTransform::default(),
            last_frame: Frame::empty(),
            monitor: Subject::new(format!("/layer/{index}")),
        }
    }

    pub fn index(&self) -> i32 {
        self.index
    }

    pub fn monitor(&self) -> &Arc<Subject> {
        &self.monitor
    }

    /// Stage a producer as background. `preview` promotes it paused and
    /// immediately renders one validating frame; `auto_play` with no
    /// current foreground promotes it playing immediately, otherwise arms
    /// promotion on foreground exhaustion. A producer that fails the
    /// validating pull surfaces the error here, not at the next tick.
    pub fn load(
        &mut self,
        producer: Arc<dyn Producer>,
        preview: bool,
        auto_play: bool,
        format: &VideoFormat,
    ) -> PrismResult<()> {
        tracing::debug!(layer = self.index, producer = producer.name(), "load");
        self.background = Some(producer);
        self.auto_play = auto_play;
        if preview {
            self.preview(format)?;
        } else if auto_play && self.foreground.is_none() {
            self.play();
        }
        Ok(())
    }

    /// Promote the staged background, or resume a paused foreground. With
    /// nothing loaded this is a no-op monitoring event, not an error.
    pub fn play(&mut self) {
        if self.background.is_some() {
            self.promote_background();
            self.mode = LayerMode::Playing;
        } else if self.foreground.is_some() {
            self.mode = LayerMode::Playing;
        } else {
            self.monitor.emit("/event/play", vec![json!("no-op")]);
        }
    }

    /// Promote the staged background paused at its first frame. One frame
    /// is pulled here to validate the producer; paused ticks replay it.
    /// A producer that fails the pull is released rather than left armed
    /// for the next tick.
    pub fn preview(&mut self, format: &VideoFormat) -> PrismResult<()> {
        if self.background.is_some() {
            self.promote_background();
        }
        if let Some(fg) = self.foreground.clone() {
            self.mode = LayerMode::Paused;
            self.last_frame = match fg.receive(format) {
                Ok(FramePull::Frame(frame)) => frame,
                Ok(FramePull::Exhausted) => Frame::empty(),
                Err(error) => {
                    self.foreground = None;
                    self.mode = LayerMode::Stopped;
                    return Err(error);
                }
            };
        }
        Ok(())
    }

    pub fn pause(&mut self) {
        if self.foreground.is_some() {
            self.mode = LayerMode::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.mode == LayerMode::Paused {
            self.mode = LayerMode::Playing;
        }
    }

    /// Release the foreground; the staged background is retained.
    pub fn stop(&mut self) {
        self.foreground = None;
        self.last_frame = Frame::empty();
        self.mode = LayerMode::Stopped;
    }

    /// Drive the layer one frame. A foreground that reports exhaustion
    /// promotes the staged background within the same call when auto-play
    /// is armed, so no empty frame is emitted at the seam. The tween is
    /// sampled once for the transformed output and then advanced.
    pub fn receive(&mut self, format: &VideoFormat) -> PrismResult<LayerFrames> {
        let raw = match self.mode {
            LayerMode::Stopped => Frame::empty(),
            LayerMode::Paused => {
                if self.last_frame.is_empty() {
                    if let Some(fg) = self.foreground.clone() {
                        if let FramePull::Frame(frame) = fg.receive(format)? {
                            self.last_frame = frame;
                        }
                    }
                }
                self.last_frame.clone()
            }
            LayerMode::Playing => match self.foreground.clone() {
                None => Frame::empty(),
                Some(fg) => match fg.receive(format)? {
                    FramePull::Frame(frame) => frame,
                    FramePull::Exhausted => {
                        if self.auto_play && self.background.is_some() {
                            let next = self.promote_background();
                            self.monitor.emit("/event/play", vec![json!("auto")]);
                            match next {
                                Some(next) => match next.receive(format)? {
                                    FramePull::Frame(frame) => frame,
                                    FramePull::Exhausted => Frame::empty(),
                                },
                                None => Frame::empty(),
                            }
                        } else {
                            // The producer may resume later; stay playing.
                            Frame::empty()
                        }
                    }
                },
            },
        };

        if !raw.is_empty() {
            self.last_frame = raw.clone();
        }

        let transform = self.tween.fetch();
        let transformed = raw.transformed(&transform);
        self.tween.tick();

        Ok(LayerFrames { raw, transformed })
    }

    /// Drive the staged background one frame without promoting it. With no
    /// background staged, the foreground's own upcoming content (if any)
    /// answers instead.
    pub fn receive_background(&mut self, format: &VideoFormat) -> PrismResult<Frame> {
        if let Some(bg) = self.background.clone() {
            return match bg.receive(format)? {
                FramePull::Frame(frame) => Ok(frame),
                FramePull::Exhausted => Ok(Frame::empty()),
            };
        }
        if let Some(fg) = self.foreground.clone() {
            return fg.receive_background(format);
        }
        Ok(Frame::empty())
    }

    fn promote_background(&mut self) -> Option<Arc<dyn Producer>> {
        let next = self.background.take()?;
        self.foreground = Some(next.clone());
        self.mode = LayerMode::Playing;
        self.last_frame = Frame::empty();
        Some(next)
    }

    pub fn has_background(&self) -> bool {
        self.background.is_some()
    }

    pub fn foreground(&self) -> Option<Arc<dyn Producer>> {
        self.foreground.clone()
    }

    pub fn background(&self) -> Option<Arc<dyn Producer>> {
        self.background.clone()
    }

    pub fn mode(&self) -> LayerMode {
        self.mode
    }

    pub fn tween(&self) -> &TweenedTransform {
        &self.tween
    }

    pub fn tween_mut(&mut self) -> &mut TweenedTransform {
        &mut self.tween
    }

    pub fn set_tween(&mut self, tween: TweenedTransform) {
        self.tween = tween;
    }

    /// Hit-test a point already translated into this layer's local space.
    pub fn collides(&self, x: f64, y: f64) -> bool {
        self.foreground.as_ref().is_some_and(|fg| fg.collides(x, y))
    }

    /// Deliver a pointer event to the foreground producer.
    pub fn on_interaction(&self, event: &InteractionEvent) {
        if let Some(fg) = &self.foreground {
            fg.on_interaction(event);
        }
    }

    pub fn info(&self) -> Value {
        let name = |p: &Option<Arc<dyn Producer>>| {
            p.as_ref().map_or(json!("empty"), |p| json!(p.name()))
        };
        json!({
            "status": self.mode.as_str(),
            "auto_play": self.auto_play,
            "foreground": name(&self.foreground),
            "background": name(&self.background),
            "transform": {
                "elapsed": self.tween.elapsed(),
                "duration": self.tween.duration(),
            },
        })
    }

    pub fn delay_info(&self) -> Value {
        json!({
            "foreground": self.foreground.as_ref().map_or(Value::Null, |fg| fg.delay_info()),
        })
    }
}
