//! Transactional batching of stage operations.
//!
//! A [`StageDelayed`] mirrors the stage surface onto its own executor,
//! whose first task blocks on a [`BatchLock`]. Everything queued behind it
//! executes on the target stage, in submission order, only once the lock is
//! released. The command layer builds every façade participating in one
//! transaction against the same lock before any operation runs, which is
//! what makes multi-channel batches atomic.

use parking_lot::{Condvar, Mutex};
use serde_json::Value;
use std::sync::Arc;

use prism_core::{Easing, PrismError, PrismResult, Transform};

use crate::executor::{Executor, Pending, Priority};
use crate::producer::Producer;
use crate::stage::{Stage, TransformUpdate};

/// A latch shared by every façade of one transaction.
pub struct BatchLock {
    released: Mutex<bool>,
    cvar: Condvar,
}

impl BatchLock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            released: Mutex::new(false),
            cvar: Condvar::new(),
        })
    }

    pub fn release(&self) {
        *self.released.lock() = true;
        self.cvar.notify_all();
    }

    pub fn wait(&self) {
        let mut released = self.released.lock();
        while !*released {
            self.cvar.wait(&mut released);
        }
    }
}

/// A batching façade over one stage.
pub struct StageDelayed {
    stage: Arc<Stage>,
    lock: Arc<BatchLock>,
    executor: Arc<Executor>,
}

impl StageDelayed {
    pub fn new(stage: Arc<Stage>, lock: Arc<BatchLock>) -> Self {
        let executor = Arc::new(Executor::new(format!(
            "batch stage {}",
            stage.channel_index()
        )));
        let waiter = lock.clone();
        let _ = executor.begin_invoke(Priority::Normal, move || {
            waiter.wait();
            Ok(())
        });
        Self {
            stage,
            lock,
            executor,
        }
    }

    /// Release the batch; queued operations run on the target stage in
    /// their original submission order.
    pub fn commit(&self) {
        self.lock.release();
    }

    fn defer<T, F>(&self, f: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(&Stage) -> PrismResult<T> + Send + 'static,
    {
        let stage = self.stage.clone();
        self.executor
            .begin_invoke(Priority::Normal, move || f(&stage))
    }

    pub fn load(
        &self,
        index: i32,
        producer: Arc<dyn Producer>,
        preview: bool,
        auto_play: bool,
    ) -> Pending<()> {
        self.defer(move |stage| stage.load(index, producer, preview, auto_play).get())
    }

    pub fn play(&self, index: i32) -> Pending<()> {
        self.defer(move |stage| stage.play(index).get())
    }

    pub fn preview(&self, index: i32) -> Pending<()> {
        self.defer(move |stage| stage.preview(index).get())
    }

    pub fn pause(&self, index: i32) -> Pending<()> {
        self.defer(move |stage| stage.pause(index).get())
    }

    pub fn resume(&self, index: i32) -> Pending<()> {
        self.defer(move |stage| stage.resume(index).get())
    }

    pub fn stop(&self, index: i32) -> Pending<()> {
        self.defer(move |stage| stage.stop(index).get())
    }

    pub fn clear(&self, index: i32) -> Pending<()> {
        self.defer(move |stage| stage.clear(index).get())
    }

    pub fn clear_all(&self) -> Pending<()> {
        self.defer(move |stage| stage.clear_all().get())
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
        self.defer(move |stage| stage.apply_transform(index, update, duration, easing).get())
    }

    pub fn apply_transforms(&self, updates: Vec<TransformUpdate>) -> Pending<()> {
        self.defer(move |stage| stage.apply_transforms(updates).get())
    }

    pub fn clear_transforms(&self, index: i32) -> Pending<()> {
        self.defer(move |stage| stage.clear_transforms(index).get())
    }

    pub fn clear_all_transforms(&self) -> Pending<()> {
        self.defer(move |stage| stage.clear_all_transforms().get())
    }

    pub fn get_current_transform(&self, index: i32) -> Pending<Transform> {
        self.defer(move |stage| stage.get_current_transform(index).get())
    }

    pub fn foreground(&self, index: i32) -> Pending<Option<Arc<dyn Producer>>> {
        self.defer(move |stage| stage.foreground(index).get())
    }

    pub fn background(&self, index: i32) -> Pending<Option<Arc<dyn Producer>>> {
        self.defer(move |stage| stage.background(index).get())
    }

    pub fn info(&self) -> Pending<Value> {
        self.defer(move |stage| stage.info().get())
    }

    pub fn info_layer(&self, index: i32) -> Pending<Value> {
        self.defer(move |stage| stage.info_layer(index).get())
    }

    pub fn delay_info(&self) -> Pending<Value> {
        self.defer(move |stage| stage.delay_info().get())
    }

    pub fn delay_info_layer(&self, index: i32) -> Pending<Value> {
        self.defer(move |stage| stage.delay_info_layer(index).get())
    }

    pub fn call(&self, index: i32, params: Vec<String>) -> Pending<String> {
        self.defer(move |stage| stage.call(index, params).get())
    }

    pub fn swap_layer(&self, index: i32, other_index: i32, swap_transforms: bool) -> Pending<()> {
        self.defer(move |stage| stage.swap_layer(index, other_index, swap_transforms).get())
    }

    /// Swap full layer maps with another batched stage. Both façades must
    /// share one batch lock, otherwise the two queues could release at
    /// different times and the swap would not be part of either batch.
    pub fn swap_layers(&self, other: &StageDelayed, swap_transforms: bool) -> Pending<()> {
        if !Arc::ptr_eq(&self.lock, &other.lock) {
            return Pending::ready(Err(PrismError::Batch(
                "cross-stage batch operations require a shared batch lock".into(),
            )));
        }
        let other_stage = other.stage.clone();
        self.defer(move |stage| stage.swap_layers(&other_stage, swap_transforms).get())
    }

    pub fn swap_layer_with(
        &self,
        index: i32,
        other_index: i32,
        other: &StageDelayed,
        swap_transforms: bool,
    ) -> Pending<()> {
        if !Arc::ptr_eq(&self.lock, &other.lock) {
            return Pending::ready(Err(PrismError::Batch(
                "cross-stage batch operations require a shared batch lock".into(),
            )));
        }
        let other_stage = other.stage.clone();
        self.defer(move |stage| {
            stage
                .swap_layer_with(index, other_index, &other_stage, swap_transforms)
                .get()
        })
    }
}

impl Drop for StageDelayed {
    /// An uncommitted batch releases on drop so the worker can drain and
    /// join; queued operations still execute (there is no cancellation).
    fn drop(&mut self) {
        self.lock.release();
    }
}
