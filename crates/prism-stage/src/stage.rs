//! The per-channel stage: an ordered map of layers, their routes, and the
//! per-tick frame production.
//!
//! Every mutation and every tick goes through the stage's serialized
//! executor, so one channel's observable operations form a total order.
//! Inside a tick the per-index draws fan out on the rayon pool; this is
//! safe because each index works on a disjoint layer and writes a disjoint
//! result slot.

use parking_lot::{Mutex, MutexGuard};
use rayon::prelude::*;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use prism_core::{Easing, Frame, PrismError, PrismResult, Transform, VideoFormat};

use crate::diag::Graph;
use crate::executor::{Executor, Pending, Priority};
use crate::interaction::{InteractionAggregator, InteractionEvent, InteractionTarget};
use crate::layer::Layer;
use crate::monitor::Subject;
use crate::producer::{Consumer, ConsumerMode, ConsumerToken, Producer};
use crate::tween::TweenedTransform;

/// A batched transform update: fetch the current value as the new source,
/// apply `update` to the committed destination, tween over `duration`.
pub struct TransformUpdate {
    pub index: i32,
    pub update: Box<dyn FnOnce(Transform) -> Transform + Send>,
    pub duration: u32,
    pub easing: Easing,
}

type ConsumerEntry = (ConsumerMode, Arc<dyn Consumer>);

struct StageState {
    layers: BTreeMap<i32, Layer>,
    layer_consumers: BTreeMap<i32, HashMap<ConsumerToken, ConsumerEntry>>,
    aggregator: InteractionAggregator,
    /// Transform values the last tick drew with, for the mixer snapshot.
    last_transforms: HashMap<i32, Transform>,
}

impl StageState {
    fn new() -> Self {
        Self {
            layers: BTreeMap::new(),
            layer_consumers: BTreeMap::new(),
            aggregator: InteractionAggregator::new(),
            last_transforms: HashMap::new(),
        }
    }
}

/// Layers are created on demand; a freshly created layer's monitor hangs
/// off the owning stage.
fn get_layer<'a>(state: &'a mut StageState, monitor: &Arc<Subject>, index: i32) -> &'a mut Layer {
    state.layers.entry(index).or_insert_with(|| {
        let layer = Layer::new(index);
        layer.monitor().attach_parent(monitor.clone());
        layer
    })
}

/// The outward surface of one channel's compositing state.
pub struct Stage {
    channel_index: i32,
    /// The channel's configured format; validating pulls at load/preview
    /// time use it, the external tick supplies its own to `produce`.
    format: VideoFormat,
    state: Arc<Mutex<StageState>>,
    executor: Arc<Executor>,
    monitor: Arc<Subject>,
    graph: Arc<Graph>,
    /// Serializes whole ticks against transform-snapshot readers.
    tick_lock: Arc<Mutex<()>>,
}

impl Stage {
    pub fn new(channel_index: i32, format: VideoFormat, graph: Arc<Graph>) -> Self {
        graph.set_color("produce-time", [0.0, 1.0, 0.0]);
        Self {
            channel_index,
            format,
            state: Arc::new(Mutex::new(StageState::new())),
            executor: Arc::new(Executor::new(format!("stage {channel_index}"))),
            monitor: Subject::new("/stage"),
            graph,
            tick_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn channel_index(&self) -> i32 {
        self.channel_index
    }

    pub fn format(&self) -> &VideoFormat {
        &self.format
    }

    pub fn monitor(&self) -> &Arc<Subject> {
        &self.monitor
    }

    // ──────────────────────────────────────────────────────────────────
    // Tick production
    // ──────────────────────────────────────────────────────────────────

    /// Produce one frame for every index that has a layer or a registered
    /// route. Runs on the executor at `Normal` priority so queued
    /// mutations land between ticks, never inside one.
    pub fn produce(&self, format: &VideoFormat) -> BTreeMap<i32, Frame> {
        let tick_guard = self.tick_lock.lock();
        let timer = Instant::now();

        let state = self.state.clone();
        let tick_format = format.clone();
        let produced = self.executor.invoke(Priority::Normal, move || {
            let mut state = state.lock();
            Ok(Self::tick(&mut state, &tick_format))
        });
        let frames = match produced {
            Ok(frames) => frames,
            Err(error) => {
                tracing::error!(channel = self.channel_index, %error, "produce failed");
                BTreeMap::new()
            }
        };

        let elapsed = timer.elapsed().as_secs_f64();
        self.graph.set_value("produce-time", elapsed * format.fps * 0.5);
        self.monitor.emit(
            "/profiler/time",
            vec![json!(elapsed), json!(format.frame_budget())],
        );
        if elapsed > format.frame_budget() {
            tracing::warn!(
                channel = self.channel_index,
                elapsed,
                "performance warning: produce blocked"
            );
        }

        drop(tick_guard);
        frames
    }

    fn tick(state: &mut StageState, format: &VideoFormat) -> BTreeMap<i32, Frame> {
        // Pre-populate one slot per drawn index so the parallel draws
        // write disjoint, already-existing keys.
        let mut frames: BTreeMap<i32, Frame> = BTreeMap::new();
        for &index in state.layers.keys() {
            frames.insert(index, Frame::empty());
        }
        for (&index, sinks) in &state.layer_consumers {
            if !sinks.is_empty() {
                frames.entry(index).or_insert_with(Frame::empty);
            }
        }

        Self::flush_interaction(state);

        let StageState {
            layers,
            layer_consumers,
            last_transforms,
            ..
        } = state;

        let route_only: Vec<i32> = frames
            .keys()
            .copied()
            .filter(|index| !layers.contains_key(index))
            .collect();

        let drawn: PrismResult<Vec<(i32, Frame, Option<Transform>)>> = {
            let consumers = &*layer_consumers;
            let mut jobs: Vec<(i32, Option<&mut Layer>)> =
                layers.iter_mut().map(|(index, layer)| (*index, Some(layer))).collect();
            jobs.extend(route_only.into_iter().map(|index| (index, None)));

            jobs.into_par_iter()
                .map(|(index, layer)| Self::draw(index, layer, consumers.get(&index), format))
                .collect()
        };

        match drawn {
            Ok(results) => {
                for (index, frame, used_transform) in results {
                    if let Some(transform) = used_transform {
                        last_transforms.insert(index, transform);
                    }
                    frames.insert(index, frame);
                }
                last_transforms.retain(|index, _| layers.contains_key(index));
                frames
            }
            Err(error) => {
                // Fail safe: reset the channel rather than wedge it.
                tracing::error!(%error, "tick failed; clearing all layers");
                layers.clear();
                last_transforms.clear();
                BTreeMap::new()
            }
        }
    }

    fn draw(
        index: i32,
        layer: Option<&mut Layer>,
        consumers: Option<&HashMap<ConsumerToken, ConsumerEntry>>,
        format: &VideoFormat,
    ) -> PrismResult<(i32, Frame, Option<Transform>)> {
        let consumers = consumers.filter(|sinks| !sinks.is_empty());

        let Some(layer) = layer else {
            // Route-only slot: consumers exist but no source.
            if let Some(sinks) = consumers {
                Self::fan_out(sinks, &Frame::empty(), &Frame::empty(), false);
            }
            return Ok((index, Frame::empty(), None));
        };

        let used_transform = layer.tween().fetch();
        let output = layer.receive(format)?;

        if let Some(sinks) = consumers {
            let wants_background = sinks
                .values()
                .any(|(mode, _)| *mode != ConsumerMode::Foreground);
            let (bg_frame, has_background) = if wants_background {
                (layer.receive_background(format)?, layer.has_background())
            } else {
                (Frame::empty(), false)
            };
            Self::fan_out(sinks, &output.raw, &bg_frame, has_background);
        }

        Ok((index, output.transformed, Some(used_transform)))
    }

    /// Deliver a layer's tick to its registered sinks, in parallel. A
    /// failing sink is isolated: logged and left registered, the rest
    /// unaffected. Foreground routes get the raw frame so downstream
    /// channels can apply their own transforms.
    fn fan_out(
        sinks: &HashMap<ConsumerToken, ConsumerEntry>,
        raw: &Frame,
        bg_frame: &Frame,
        has_background: bool,
    ) {
        sinks.par_iter().for_each(|(_, (mode, sink))| {
            let frame = match mode {
                ConsumerMode::Background => bg_frame.clone(),
                ConsumerMode::NextProducer if has_background => bg_frame.clone(),
                _ => raw.clone(),
            };
            match sink.send(frame) {
                Ok(true) => {}
                Ok(false) => tracing::debug!(consumer = sink.name(), "consumer refused frame"),
                Err(error) => {
                    tracing::warn!(consumer = sink.name(), %error, "consumer send failed")
                }
            }
        });
    }

    fn flush_interaction(state: &mut StageState) {
        let StageState {
            layers, aggregator, ..
        } = state;
        let layers = &*layers;
        aggregator.translate_and_send(
            |x, y| Self::collision_detect(layers, x, y),
            |index, event| {
                if let Some(layer) = layers.get(&index) {
                    layer.on_interaction(&event);
                }
            },
        );
    }

    /// Topmost layer (highest index) whose fill contains the point and
    /// whose producer reports a hit. Uses the same `tween.fetch()` value
    /// the tick draws with, so routing and drawing agree.
    fn collision_detect(layers: &BTreeMap<i32, Layer>, x: f64, y: f64) -> Option<InteractionTarget> {
        for (index, layer) in layers.iter().rev() {
            let transform = layer.tween().fetch();
            if let Some((lx, ly)) = transform.screen_to_local(x, y) {
                if (0.0..=1.0).contains(&lx)
                    && (0.0..=1.0).contains(&ly)
                    && layer.collides(lx, ly)
                {
                    return Some(InteractionTarget {
                        transform,
                        layer: *index,
                    });
                }
            }
        }
        None
    }

    /// Buffer a pointer event for the next tick's flush.
    pub fn on_interaction(&self, event: InteractionEvent) {
        let state = self.state.clone();
        let _ = self.executor.begin_invoke(Priority::High, move || {
            state.lock().aggregator.offer(event);
            Ok(())
        });
    }

    /// The transform values the last tick actually drew with, taken under
    /// the tick lock so a mixer never reads a half-produced tick.
    pub fn transform_snapshot(&self) -> HashMap<i32, Transform> {
        let _tick_guard = self.tick_lock.lock();
        self.state.lock().last_transforms.clone()
    }

    // ──────────────────────────────────────────────────────────────────
    // Mutators (all posted at High priority)
    // ──────────────────────────────────────────────────────────────────

    fn run_high<T, F>(&self, f: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut StageState, &Arc<Subject>) -> PrismResult<T> + Send + 'static,
    {
        let state = self.state.clone();
        let monitor = self.monitor.clone();
        self.executor.begin_invoke(Priority::High, move || {
            let mut state = state.lock();
            f(&mut state, &monitor)
        })
    }

    pub fn apply_transform<F>(
        &self,
        index: i32,
        update: F,
        duration: u32,
        easing: Easing,
    ) -> Pending<()>
    where
        F: FnOnce(Transform) -> Transform + Send + 'static,
    {
        self.run_high(move |state, monitor| {
            let layer = get_layer(state, monitor, index);
            let source = layer.tween().fetch();
            let dest = update(*layer.tween().dest());
            layer.set_tween(TweenedTransform::new(source, dest, duration, easing));
            Ok(())
        })
    }

    /// Apply a list of transform updates atomically within one executor
    /// task.
    pub fn apply_transforms(&self, updates: Vec<TransformUpdate>) -> Pending<()> {
        self.run_high(move |state, monitor| {
            for TransformUpdate {
                index,
                update,
                duration,
                easing,
            } in updates
            {
                let layer = get_layer(state, monitor, index);
                let source = layer.tween().fetch();
                let dest = update(*layer.tween().dest());
                layer.set_tween(TweenedTransform::new(source, dest, duration, easing));
            }
            Ok(())
        })
    }

    pub fn clear_transforms(&self, index: i32) -> Pending<()> {
        self.run_high(move |state, monitor| {
            get_layer(state, monitor, index).set_tween(TweenedTransform::default());
            Ok(())
        })
    }

    pub fn clear_all_transforms(&self) -> Pending<()> {
        self.run_high(|state, _| {
            for layer in state.layers.values_mut() {
                layer.set_tween(TweenedTransform::default());
            }
            Ok(())
        })
    }

    pub fn get_current_transform(&self, index: i32) -> Pending<Transform> {
        self.run_high(move |state, monitor| Ok(get_layer(state, monitor, index).tween().fetch()))
    }

    /// Stage a producer on a layer. With `preview`, one paused frame is
    /// rendered inside this mutator to validate the producer; a failing
    /// pull surfaces through the returned future rather than tripping the
    /// tick fail-safe later.
    pub fn load(
        &self,
        index: i32,
        producer: Arc<dyn Producer>,
        preview: bool,
        auto_play: bool,
    ) -> Pending<()> {
        self.monitor
            .emit(&format!("/layer/{index}/event/load"), vec![json!(true)]);
        let format = self.format.clone();
        self.run_high(move |state, monitor| {
            get_layer(state, monitor, index).load(producer, preview, auto_play, &format)
        })
    }

    pub fn play(&self, index: i32) -> Pending<()> {
        self.monitor
            .emit(&format!("/layer/{index}/event/play"), vec![json!(true)]);
        self.run_high(move |state, monitor| {
            get_layer(state, monitor, index).play();
            Ok(())
        })
    }

    pub fn preview(&self, index: i32) -> Pending<()> {
        let format = self.format.clone();
        self.run_high(move |state, monitor| {
            get_layer(state, monitor, index).preview(&format)
        })
    }

    pub fn pause(&self, index: i32) -> Pending<()> {
        self.monitor
            .emit(&format!("/layer/{index}/event/pause"), vec![json!(true)]);
        self.run_high(move |state, monitor| {
            get_layer(state, monitor, index).pause();
            Ok(())
        })
    }

    pub fn resume(&self, index: i32) -> Pending<()> {
        self.monitor
            .emit(&format!("/layer/{index}/event/resume"), vec![json!(true)]);
        self.run_high(move |state, monitor| {
            get_layer(state, monitor, index).resume();
            Ok(())
        })
    }

    pub fn stop(&self, index: i32) -> Pending<()> {
        self.monitor
            .emit(&format!("/layer/{index}/event/stop"), vec![json!(true)]);
        self.run_high(move |state, monitor| {
            get_layer(state, monitor, index).stop();
            Ok(())
        })
    }

    /// Remove a layer entirely; its producers are released. A mutator on
    /// the same index afterwards sees a fresh layer.
    pub fn clear(&self, index: i32) -> Pending<()> {
        self.monitor
            .emit(&format!("/layer/{index}/event/clear"), vec![json!(true)]);
        self.run_high(move |state, _| {
            state.layers.remove(&index);
            state.last_transforms.remove(&index);
            Ok(())
        })
    }

    pub fn clear_all(&self) -> Pending<()> {
        self.monitor.emit("/event/clear", vec![json!(true)]);
        self.run_high(|state, _| {
            state.layers.clear();
            state.last_transforms.clear();
            Ok(())
        })
    }

    // ──────────────────────────────────────────────────────────────────
    // Routes
    // ──────────────────────────────────────────────────────────────────

    pub fn add_layer_consumer(
        &self,
        token: ConsumerToken,
        layer: i32,
        mode: ConsumerMode,
        sink: Arc<dyn Consumer>,
    ) -> Pending<()> {
        self.monitor.emit("/event/add", vec![json!(true)]);
        self.run_high(move |state, _| {
            state
                .layer_consumers
                .entry(layer)
                .or_default()
                .insert(token, (mode, sink));
            Ok(())
        })
    }

    pub fn remove_layer_consumer(&self, token: ConsumerToken, layer: i32) -> Pending<()> {
        self.monitor.emit("/event/remove", vec![json!(true)]);
        self.run_high(move |state, _| {
            if let Some(sinks) = state.layer_consumers.get_mut(&layer) {
                sinks.remove(&token);
                if sinks.is_empty() {
                    state.layer_consumers.remove(&layer);
                }
            }
            Ok(())
        })
    }

    // ──────────────────────────────────────────────────────────────────
    // Introspection
    // ──────────────────────────────────────────────────────────────────

    pub fn foreground(&self, index: i32) -> Pending<Option<Arc<dyn Producer>>> {
        self.run_high(move |state, monitor| Ok(get_layer(state, monitor, index).foreground()))
    }

    pub fn background(&self, index: i32) -> Pending<Option<Arc<dyn Producer>>> {
        self.run_high(move |state, monitor| Ok(get_layer(state, monitor, index).background()))
    }

    pub fn info(&self) -> Pending<Value> {
        self.run_high(|state, _| {
            let layers: Vec<Value> = state
                .layers
                .iter()
                .map(|(index, layer)| {
                    let mut info = layer.info();
                    info["index"] = json!(index);
                    info
                })
                .collect();
            Ok(json!({ "layers": layers }))
        })
    }

    pub fn info_layer(&self, index: i32) -> Pending<Value> {
        self.run_high(move |state, monitor| Ok(get_layer(state, monitor, index).info()))
    }

    pub fn delay_info(&self) -> Pending<Value> {
        self.run_high(|state, _| {
            let layers: Vec<Value> = state
                .layers
                .iter()
                .map(|(index, layer)| {
                    let mut info = layer.delay_info();
                    info["index"] = json!(index);
                    info
                })
                .collect();
            Ok(json!({ "layers": layers }))
        })
    }

    pub fn delay_info_layer(&self, index: i32) -> Pending<Value> {
        self.run_high(move |state, monitor| Ok(get_layer(state, monitor, index).delay_info()))
    }

    /// Forward a command-layer call to the layer's foreground producer.
    pub fn call(&self, index: i32, params: Vec<String>) -> Pending<String> {
        self.run_high(move |state, monitor| {
            let layer = get_layer(state, monitor, index);
            let foreground = layer.foreground().ok_or_else(|| {
                PrismError::invalid_op(format!("layer {index} has no foreground"))
            })?;
            foreground.call(&params)
        })
    }

    // ──────────────────────────────────────────────────────────────────
    // Swaps
    // ──────────────────────────────────────────────────────────────────

    /// Swap two layers of this stage. With `swap_transforms` unset the
    /// tweens are swapped back afterwards, pinning visual state to the
    /// index rather than the producer.
    pub fn swap_layer(&self, index: i32, other_index: i32, swap_transforms: bool) -> Pending<()> {
        self.monitor.emit(
            &format!("/layer/{index}/event/swap"),
            vec![json!(index), json!(other_index)],
        );
        self.run_high(move |state, monitor| {
            if index == other_index {
                return Ok(());
            }
            get_layer(state, monitor, index);
            get_layer(state, monitor, other_index);
            let (mut a, mut b) = match (state.layers.remove(&index), state.layers.remove(&other_index)) {
                (Some(a), Some(b)) => (a, b),
                _ => return Err(PrismError::invalid_op("layer vanished during swap")),
            };
            if !swap_transforms {
                std::mem::swap(a.tween_mut(), b.tween_mut());
            }
            state.layers.insert(index, b);
            state.layers.insert(other_index, a);
            Ok(())
        })
    }

    /// Swap the full layer maps of two stages.
    pub fn swap_layers(&self, other: &Stage, swap_transforms: bool) -> Pending<()> {
        self.monitor.emit("/event/swap", vec![json!(true)]);
        if Arc::ptr_eq(&self.state, &other.state) {
            return Pending::ready(Ok(()));
        }

        let mine = self.handle();
        let theirs = other.handle();
        self.invoke_both(other, move || {
            let (mut a, mut b) = lock_pair(&mine, &theirs);

            for layer in a.layers.values().chain(b.layers.values()) {
                layer.monitor().detach_parent();
            }

            std::mem::swap(&mut a.layers, &mut b.layers);
            std::mem::swap(&mut a.last_transforms, &mut b.last_transforms);

            for layer in a.layers.values() {
                layer.monitor().attach_parent(mine.monitor.clone());
            }
            for layer in b.layers.values() {
                layer.monitor().attach_parent(theirs.monitor.clone());
            }

            if !swap_transforms {
                let indices: BTreeSet<i32> = a
                    .layers
                    .keys()
                    .chain(b.layers.keys())
                    .copied()
                    .collect();
                for index in indices {
                    let la = get_layer(&mut a, &mine.monitor, index);
                    let lb = get_layer(&mut b, &theirs.monitor, index);
                    std::mem::swap(la.tween_mut(), lb.tween_mut());
                }
            }
            Ok(())
        })
    }

    /// Swap one layer of this stage with one layer of another stage.
    pub fn swap_layer_with(
        &self,
        index: i32,
        other_index: i32,
        other: &Stage,
        swap_transforms: bool,
    ) -> Pending<()> {
        if Arc::ptr_eq(&self.state, &other.state) {
            return self.swap_layer(index, other_index, swap_transforms);
        }
        self.monitor.emit(
            &format!("/layer/{index}/event/swaptransforms"),
            vec![json!(index), json!(other_index)],
        );

        let mine = self.handle();
        let theirs = other.handle();
        self.invoke_both(other, move || {
            let (mut a, mut b) = lock_pair(&mine, &theirs);

            get_layer(&mut a, &mine.monitor, index);
            get_layer(&mut b, &theirs.monitor, other_index);
            let (mut mine_layer, mut other_layer) =
                match (a.layers.remove(&index), b.layers.remove(&other_index)) {
                    (Some(x), Some(y)) => (x, y),
                    _ => return Err(PrismError::invalid_op("layer vanished during swap")),
                };

            mine_layer.monitor().detach_parent();
            other_layer.monitor().detach_parent();

            if !swap_transforms {
                std::mem::swap(mine_layer.tween_mut(), other_layer.tween_mut());
            }

            other_layer.monitor().attach_parent(mine.monitor.clone());
            mine_layer.monitor().attach_parent(theirs.monitor.clone());

            a.layers.insert(index, other_layer);
            b.layers.insert(other_index, mine_layer);
            Ok(())
        })
    }

    fn handle(&self) -> StageHandle {
        StageHandle {
            channel: self.channel_index,
            state: self.state.clone(),
            monitor: self.monitor.clone(),
        }
    }

    /// Run `func` holding both stages' executors: the stage with the lower
    /// channel index takes its executor first, then re-enters the other's.
    /// Deterministic pairing order is what makes concurrent cross-stage
    /// swaps deadlock-free.
    fn invoke_both<F>(&self, other: &Stage, func: F) -> Pending<()>
    where
        F: FnOnce() -> PrismResult<()> + Send + 'static,
    {
        let (outer, inner) = if other.channel_index < self.channel_index {
            (other.executor.clone(), self.executor.clone())
        } else {
            (self.executor.clone(), other.executor.clone())
        };
        outer.begin_invoke(Priority::High, move || inner.invoke(Priority::High, func))
    }
}

#[derive(Clone)]
struct StageHandle {
    channel: i32,
    state: Arc<Mutex<StageState>>,
    monitor: Arc<Subject>,
}

/// Lock two stage states in channel order.
fn lock_pair<'a>(
    a: &'a StageHandle,
    b: &'a StageHandle,
) -> (MutexGuard<'a, StageState>, MutexGuard<'a, StageState>) {
    if a.channel <= b.channel {
        let ga = a.state.lock();
        let gb = b.state.lock();
        (ga, gb)
    } else {
        let gb = b.state.lock();
        let ga = a.state.lock();
        (ga, gb)
    }
}
