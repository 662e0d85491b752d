use parking_lot::Mutex;
use std::sync::Arc;

use prism_core::{
    Easing, Frame, FrameBuffer, PixelFormat, PrismError, PrismResult, Transform, VideoFormat,
};
use prism_stage::{
    BatchLock, ConsumerMode, ConsumerToken, Consumer, FramePull, Graph, InteractionEvent, Message,
    MonitorSink, MouseButton, Producer, Stage, StageDelayed,
};

// ──────────────────────────────────────────────────────────────────────────────
// Test doubles
// ──────────────────────────────────────────────────────────────────────────────

/// Emits frames tagged with a byte, optionally a limited number of them.
struct ScriptedProducer {
    name: String,
    tag: u8,
    frames_left: Mutex<Option<u32>>,
    hit: bool,
    interactions: Mutex<Vec<InteractionEvent>>,
}

impl ScriptedProducer {
    fn new(name: &str, tag: u8, frames: Option<u32>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            tag,
            frames_left: Mutex::new(frames),
            hit: false,
            interactions: Mutex::new(Vec::new()),
        })
    }

    fn interactive(name: &str, tag: u8) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            tag,
            frames_left: Mutex::new(None),
            hit: true,
            interactions: Mutex::new(Vec::new()),
        })
    }
}

impl Producer for ScriptedProducer {
    fn receive(&self, _format: &VideoFormat) -> PrismResult<FramePull> {
        let mut left = self.frames_left.lock();
        if let Some(remaining) = left.as_mut() {
            if *remaining == 0 {
                return Ok(FramePull::Exhausted);
            }
            *remaining -= 1;
        }
        let mut buffer = FrameBuffer::new(1, 1, PixelFormat::Rgba8);
        buffer.data[0] = self.tag;
        Ok(FramePull::Frame(Frame::from_buffer(Arc::new(buffer))))
    }

    fn call(&self, params: &[String]) -> PrismResult<String> {
        Ok(format!("{}:{}", self.name, params.join(",")))
    }

    fn collides(&self, _x: f64, _y: f64) -> bool {
        self.hit
    }

    fn on_interaction(&self, event: &InteractionEvent) {
        self.interactions.lock().push(event.clone());
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Fails every receive.
struct FailingProducer;

impl Producer for FailingProducer {
    fn receive(&self, _format: &VideoFormat) -> PrismResult<FramePull> {
        Err(PrismError::producer("decoder gave up"))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Records every frame it is sent.
struct RecordingConsumer {
    name: String,
    frames: Mutex<Vec<Frame>>,
}

impl RecordingConsumer {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            frames: Mutex::new(Vec::new()),
        })
    }

    fn tags(&self) -> Vec<Option<u8>> {
        self.frames
            .lock()
            .iter()
            .map(|frame| frame.buffer().map(|b| b.data[0]))
            .collect()
    }
}

impl Consumer for RecordingConsumer {
    fn send(&self, frame: Frame) -> PrismResult<bool> {
        self.frames.lock().push(frame);
        Ok(true)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Fails every send.
struct FailingConsumer;

impl Consumer for FailingConsumer {
    fn send(&self, _frame: Frame) -> PrismResult<bool> {
        Err(PrismError::consumer("socket closed"))
    }

    fn name(&self) -> &str {
        "broken"
    }
}

#[derive(Default)]
struct MonitorRecorder {
    paths: Mutex<Vec<String>>,
}

impl MonitorSink for MonitorRecorder {
    fn receive(&self, message: &Message) {
        self.paths.lock().push(message.path.clone());
    }
}

fn stage(channel: i32) -> Stage {
    Stage::new(channel, VideoFormat::pal(), Arc::new(Graph::new()))
}

fn format() -> VideoFormat {
    VideoFormat::pal()
}

fn tag_of(frame: &Frame) -> Option<u8> {
    frame.buffer().map(|b| b.data[0])
}

// ──────────────────────────────────────────────────────────────────────────────
// Scenarios
// ──────────────────────────────────────────────────────────────────────────────

#[test]
fn seamless_auto_play_seam() {
    let stage = stage(1);
    stage
        .load(1, ScriptedProducer::new("a", b'a', Some(3)), false, false)
        .get()
        .unwrap();
    stage.play(1).get().unwrap();
    stage
        .load(1, ScriptedProducer::new("b", b'b', Some(3)), false, true)
        .get()
        .unwrap();

    let mut tags = Vec::new();
    for tick in 0..6 {
        let frames = stage.produce(&format());
        let frame = &frames[&1];
        assert!(!frame.is_empty(), "empty frame at tick {tick}");
        tags.push(tag_of(frame).unwrap());
    }
    assert_eq!(tags, [b'a', b'a', b'a', b'b', b'b', b'b']);
}

#[test]
fn tween_mid_ramp() {
    let stage = stage(1);
    stage
        .load(1, ScriptedProducer::new("a", b'a', None), false, true)
        .get()
        .unwrap();
    stage
        .apply_transform(
            1,
            |mut t: Transform| {
                t.opacity = 0.0;
                t
            },
            10,
            Easing::Linear,
        )
        .get()
        .unwrap();

    for _ in 0..5 {
        stage.produce(&format());
    }
    let current = stage.get_current_transform(1).get().unwrap();
    assert!((current.opacity - 0.5).abs() < 1e-6);
}

#[test]
fn route_fan_out_modes() {
    let stage = stage(1);
    stage
        .load(1, ScriptedProducer::new("fg", b'f', None), false, false)
        .get()
        .unwrap();
    stage.play(1).get().unwrap();
    stage
        .load(1, ScriptedProducer::new("bg", b'g', None), false, false)
        .get()
        .unwrap();

    let t1 = RecordingConsumer::new("t1");
    let t2 = RecordingConsumer::new("t2");
    let t3 = RecordingConsumer::new("t3");
    stage
        .add_layer_consumer(ConsumerToken(1), 1, ConsumerMode::Foreground, t1.clone())
        .get()
        .unwrap();
    stage
        .add_layer_consumer(ConsumerToken(2), 1, ConsumerMode::Background, t2.clone())
        .get()
        .unwrap();
    stage
        .add_layer_consumer(ConsumerToken(3), 1, ConsumerMode::NextProducer, t3.clone())
        .get()
        .unwrap();

    stage.produce(&format());
    assert_eq!(t1.tags(), [Some(b'f')]);
    assert_eq!(t2.tags(), [Some(b'g')]);
    assert_eq!(t3.tags(), [Some(b'g')]);
}

#[test]
fn next_producer_falls_back_to_foreground_without_background() {
    let stage = stage(1);
    stage
        .load(1, ScriptedProducer::new("fg", b'f', None), false, true)
        .get()
        .unwrap();

    let t3 = RecordingConsumer::new("t3");
    stage
        .add_layer_consumer(ConsumerToken(3), 1, ConsumerMode::NextProducer, t3.clone())
        .get()
        .unwrap();

    stage.produce(&format());
    assert_eq!(t3.tags(), [Some(b'f')]);
}

#[test]
fn cross_channel_swap_keeps_tweens_with_index() {
    let one = stage(1);
    let two = stage(2);
    let a = ScriptedProducer::new("a", b'a', None);
    let b = ScriptedProducer::new("b", b'b', None);
    one.load(0, a.clone(), false, true).get().unwrap();
    two.load(0, b.clone(), false, true).get().unwrap();

    one.apply_transform(
        0,
        |mut t: Transform| {
            t.opacity = 0.25;
            t
        },
        0,
        Easing::Linear,
    )
    .get()
    .unwrap();
    two.apply_transform(
        0,
        |mut t: Transform| {
            t.opacity = 0.75;
            t
        },
        0,
        Easing::Linear,
    )
    .get()
    .unwrap();

    two.swap_layers(&one, false).get().unwrap();

    let one_fg = one.foreground(0).get().unwrap().unwrap();
    let two_fg = two.foreground(0).get().unwrap().unwrap();
    assert_eq!(one_fg.name(), "b");
    assert_eq!(two_fg.name(), "a");

    // swap_transforms=false pins the tween to the index.
    let one_t = one.get_current_transform(0).get().unwrap();
    let two_t = two.get_current_transform(0).get().unwrap();
    assert!((one_t.opacity - 0.25).abs() < 1e-9);
    assert!((two_t.opacity - 0.75).abs() < 1e-9);
}

#[test]
fn swap_layers_twice_is_identity() {
    let one = stage(1);
    let two = stage(2);
    one.load(0, ScriptedProducer::new("a", b'a', None), false, true)
        .get()
        .unwrap();
    two.load(5, ScriptedProducer::new("b", b'b', None), false, true)
        .get()
        .unwrap();

    for _ in 0..2 {
        two.swap_layers(&one, true).get().unwrap();
    }
    assert_eq!(one.foreground(0).get().unwrap().unwrap().name(), "a");
    assert_eq!(two.foreground(5).get().unwrap().unwrap().name(), "b");
}

#[test]
fn swap_during_produce_serializes() {
    let one = Arc::new(stage(1));
    let two = Arc::new(stage(2));
    one.load(0, ScriptedProducer::new("a", b'a', None), false, true)
        .get()
        .unwrap();
    two.load(0, ScriptedProducer::new("b", b'b', None), false, true)
        .get()
        .unwrap();

    let producer_side = one.clone();
    let ticker = std::thread::spawn(move || {
        for _ in 0..50 {
            producer_side.produce(&format());
        }
    });
    two.swap_layers(&one, false).get().unwrap();
    ticker.join().unwrap();

    assert_eq!(one.foreground(0).get().unwrap().unwrap().name(), "b");
    assert_eq!(two.foreground(0).get().unwrap().unwrap().name(), "a");
}

#[test]
fn producer_crash_clears_channel_and_recovers() {
    let stage = stage(1);
    for index in [1, 3] {
        stage
            .load(index, ScriptedProducer::new("ok", b'o', None), false, true)
            .get()
            .unwrap();
    }
    stage.load(2, Arc::new(FailingProducer), false, true).get().unwrap();

    let sink = RecordingConsumer::new("route");
    stage
        .add_layer_consumer(ConsumerToken(9), 1, ConsumerMode::Foreground, sink.clone())
        .get()
        .unwrap();

    // Tick N: empty mapping, layers cleared.
    let frames = stage.produce(&format());
    assert!(frames.is_empty());
    let info = stage.info().get().unwrap();
    assert!(info["layers"].as_array().unwrap().is_empty());

    // Tick N+1: still sane; the route-only slot fans out empty frames.
    let frames = stage.produce(&format());
    assert_eq!(frames.keys().copied().collect::<Vec<_>>(), [1]);
    assert!(frames[&1].is_empty());

    // Recovery: reloaded producers reach their consumers again.
    stage
        .load(1, ScriptedProducer::new("ok", b'o', None), false, true)
        .get()
        .unwrap();
    stage.produce(&format());
    assert_eq!(sink.tags().last().unwrap(), &Some(b'o'));
}

#[test]
fn preview_load_validates_producer_without_clearing_channel() {
    let stage = stage(1);
    stage
        .load(1, ScriptedProducer::new("ok", b'o', None), false, true)
        .get()
        .unwrap();

    // The validating pull fails inside the load future; the channel is
    // untouched.
    let result = stage.load(2, Arc::new(FailingProducer), true, false).get();
    assert!(matches!(result, Err(PrismError::Producer(_))));

    let frames = stage.produce(&format());
    assert_eq!(tag_of(&frames[&1]), Some(b'o'));
}

#[test]
fn batched_commit_releases_in_submission_order() {
    let target = Arc::new(stage(1));
    let recorder = Arc::new(MonitorRecorder::default());
    target.monitor().subscribe(recorder.clone());

    let lock = BatchLock::new();
    let delayed = StageDelayed::new(target.clone(), lock);

    let queued_load = delayed.load(1, ScriptedProducer::new("a", b'a', None), false, false);
    let queued_play = delayed.play(1);
    let queued_ramp = delayed.apply_transform(
        1,
        |mut t: Transform| {
            t.opacity = 0.0;
            t
        },
        10,
        Easing::Linear,
    );

    // Nothing runs before commit.
    assert!(target.foreground(1).get().unwrap().is_none());
    assert!(recorder.paths.lock().is_empty());

    delayed.commit();
    queued_load.get().unwrap();
    queued_play.get().unwrap();
    queued_ramp.get().unwrap();

    assert_eq!(target.foreground(1).get().unwrap().unwrap().name(), "a");
    let info = target.info_layer(1).get().unwrap();
    assert_eq!(info["status"], "playing");
    assert_eq!(info["transform"]["duration"], 10);

    let paths = recorder.paths.lock().clone();
    assert_eq!(
        paths,
        ["/stage/layer/1/event/load", "/stage/layer/1/event/play"]
    );
}

#[test]
fn cross_stage_batch_requires_shared_lock() {
    let one = Arc::new(stage(1));
    let two = Arc::new(stage(2));
    let delayed_one = StageDelayed::new(one, BatchLock::new());
    let delayed_two = StageDelayed::new(two, BatchLock::new());
    let result = delayed_one.swap_layers(&delayed_two, false).get();
    assert!(matches!(result, Err(PrismError::Batch(_))));
}

// ──────────────────────────────────────────────────────────────────────────────
// Invariants
// ──────────────────────────────────────────────────────────────────────────────

#[test]
fn produce_covers_layers_and_routed_slots() {
    let stage = stage(1);
    stage
        .load(0, ScriptedProducer::new("a", b'a', None), false, true)
        .get()
        .unwrap();

    let sink = RecordingConsumer::new("route");
    stage
        .add_layer_consumer(ConsumerToken(1), 5, ConsumerMode::Foreground, sink.clone())
        .get()
        .unwrap();
    // Registered and removed again: slot 7 must not be produced.
    stage
        .add_layer_consumer(ConsumerToken(2), 7, ConsumerMode::Foreground, sink.clone())
        .get()
        .unwrap();
    stage.remove_layer_consumer(ConsumerToken(2), 7).get().unwrap();

    let frames = stage.produce(&format());
    assert_eq!(frames.keys().copied().collect::<Vec<_>>(), [0, 5]);
    assert!(frames[&5].is_empty());
    // The route-only slot still fans out (an empty frame).
    assert_eq!(sink.tags(), [None]);
}

#[test]
fn mutators_apply_in_issue_order() {
    let stage = stage(1);
    // Issue without waiting on any future; effects must land in order.
    let _ = stage.load(1, ScriptedProducer::new("a", b'a', None), false, false);
    let _ = stage.play(1);
    let _ = stage.pause(1);
    let _ = stage.resume(1);
    let _ = stage.stop(1);
    let info = stage.info_layer(1).get().unwrap();
    assert_eq!(info["status"], "stopped");
}

#[test]
fn clear_resets_layer_state() {
    let stage = stage(1);
    stage
        .load(1, ScriptedProducer::new("a", b'a', None), false, true)
        .get()
        .unwrap();
    stage
        .apply_transform(
            1,
            |mut t: Transform| {
                t.opacity = 0.0;
                t
            },
            0,
            Easing::Linear,
        )
        .get()
        .unwrap();

    stage.clear(1).get().unwrap();
    let current = stage.get_current_transform(1).get().unwrap();
    assert_eq!(current, Transform::identity());
    assert!(stage.foreground(1).get().unwrap().is_none());
}

#[test]
fn consumer_failure_is_isolated_and_entry_retained() {
    let stage = stage(1);
    stage
        .load(1, ScriptedProducer::new("a", b'a', None), false, true)
        .get()
        .unwrap();

    let good = RecordingConsumer::new("good");
    stage
        .add_layer_consumer(ConsumerToken(1), 1, ConsumerMode::Foreground, Arc::new(FailingConsumer))
        .get()
        .unwrap();
    stage
        .add_layer_consumer(ConsumerToken(2), 1, ConsumerMode::Foreground, good.clone())
        .get()
        .unwrap();

    let frames = stage.produce(&format());
    assert!(!frames[&1].is_empty());
    assert_eq!(good.tags(), [Some(b'a')]);

    // The broken sink is still registered and fails again next tick.
    stage.produce(&format());
    assert_eq!(good.tags(), [Some(b'a'), Some(b'a')]);
}

#[test]
fn interaction_resolves_to_topmost_layer_in_local_space() {
    let stage = stage(1);
    let below = ScriptedProducer::interactive("below", b'l');
    let above = ScriptedProducer::interactive("above", b'u');
    stage.load(1, below.clone(), false, true).get().unwrap();
    stage.load(2, above.clone(), false, true).get().unwrap();

    // Scale the top layer to the lower-right quadrant.
    stage
        .apply_transform(
            2,
            |mut t: Transform| {
                t.position = prism_core::Point2D::new(0.5, 0.5);
                t.scale = prism_core::Point2D::new(0.5, 0.5);
                t
            },
            0,
            Easing::Linear,
        )
        .get()
        .unwrap();

    stage.on_interaction(InteractionEvent::MouseButton {
        x: 0.75,
        y: 0.75,
        button: MouseButton::Left,
        pressed: true,
    });
    stage.produce(&format());

    assert!(below.interactions.lock().is_empty());
    let delivered = above.interactions.lock();
    assert_eq!(delivered.len(), 1);
    let (x, y) = delivered[0].position();
    assert!((x - 0.5).abs() < 1e-9);
    assert!((y - 0.5).abs() < 1e-9);
}

#[test]
fn interaction_buffer_flushes_every_tick() {
    let stage = stage(1);
    let target = ScriptedProducer::interactive("t", b't');
    stage.load(1, target.clone(), false, true).get().unwrap();

    stage.on_interaction(InteractionEvent::MouseMove { x: 0.5, y: 0.5 });
    stage.produce(&format());
    assert_eq!(target.interactions.lock().len(), 1);

    // Nothing buffered: flush is a no-op, not a replay.
    stage.produce(&format());
    assert_eq!(target.interactions.lock().len(), 1);
}

#[test]
fn transform_snapshot_matches_last_tick() {
    let stage = stage(1);
    stage
        .load(1, ScriptedProducer::new("a", b'a', None), false, true)
        .get()
        .unwrap();
    stage
        .apply_transform(
            1,
            |mut t: Transform| {
                t.opacity = 0.0;
                t
            },
            2,
            Easing::Linear,
        )
        .get()
        .unwrap();

    stage.produce(&format());
    let snapshot = stage.transform_snapshot();
    assert!((snapshot[&1].opacity - 1.0).abs() < 1e-9);

    stage.produce(&format());
    let snapshot = stage.transform_snapshot();
    assert!((snapshot[&1].opacity - 0.5).abs() < 1e-9);
}

#[test]
fn call_forwards_to_foreground_producer() {
    let stage = stage(1);
    stage
        .load(1, ScriptedProducer::new("clip", b'c', None), false, true)
        .get()
        .unwrap();
    let reply = stage
        .call(1, vec!["seek".into(), "42".into()])
        .get()
        .unwrap();
    assert_eq!(reply, "clip:seek,42");

    let err = stage.call(9, vec!["seek".into()]).get();
    assert!(matches!(err, Err(PrismError::InvalidOperation(_))));
}

#[test]
fn produce_time_gauge_is_published() {
    let graph = Arc::new(Graph::new());
    let stage = Stage::new(1, VideoFormat::pal(), graph.clone());
    stage
        .load(1, ScriptedProducer::new("a", b'a', None), false, true)
        .get()
        .unwrap();
    stage.produce(&format());
    assert!(graph.value("produce-time").is_some());
}
