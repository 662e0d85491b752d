//! Hierarchical OSC-style monitor subjects.
//!
//! A [`Subject`] owns a path fragment and an optional parent. Emitting on a
//! subject delivers the message to its local sinks, then climbs the parent
//! chain with each level prefixing its own path, so a layer event emitted as
//! `/event/play` on `/layer/3` under `/stage` reaches stage-level sinks as
//! `/stage/layer/3/event/play`. Layers are re-parented when they move
//! between stages, which is how monitor output follows a swap.

use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

/// One monitor event: a path plus positional parameters.
#[derive(Debug, Clone)]
pub struct Message {
    pub path: String,
    pub params: Vec<Value>,
}

impl Message {
    pub fn new(path: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            path: path.into(),
            params,
        }
    }
}

/// Receives monitor messages. Implementations must tolerate delivery from
/// the stage executor and from produce worker threads.
pub trait MonitorSink: Send + Sync {
    fn receive(&self, message: &Message);
}

/// A node in the monitor hierarchy.
pub struct Subject {
    path: String,
    parent: Mutex<Option<Arc<Subject>>>,
    sinks: Mutex<Vec<Arc<dyn MonitorSink>>>,
}

impl Subject {
    pub fn new(path: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            path: path.into(),
            parent: Mutex::new(None),
            sinks: Mutex::new(Vec::new()),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn attach_parent(&self, parent: Arc<Subject>) {
        *self.parent.lock() = Some(parent);
    }

    pub fn detach_parent(&self) {
        *self.parent.lock() = None;
    }

    pub fn subscribe(&self, sink: Arc<dyn MonitorSink>) {
        self.sinks.lock().push(sink);
    }

    /// Emit a message at `rel_path` below this subject.
    pub fn emit(&self, rel_path: &str, params: Vec<Value>) {
        self.deliver(Message::new(format!("{}{}", self.path, rel_path), params));
    }

    fn deliver(&self, message: Message) {
        let sinks = self.sinks.lock().clone();
        for sink in sinks {
            sink.receive(&message);
        }
        let parent = self.parent.lock().clone();
        if let Some(parent) = parent {
            let prefixed = Message::new(format!("{}{}", parent.path, message.path), message.params);
            parent.deliver(prefixed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl MonitorSink for Recorder {
        fn receive(&self, message: &Message) {
            self.seen.lock().push(message.path.clone());
        }
    }

    #[test]
    fn test_parent_prefixes_path() {
        let stage = Subject::new("/stage");
        let layer = Subject::new("/layer/3");
        layer.attach_parent(stage.clone());

        let at_stage = Arc::new(Recorder::default());
        stage.subscribe(at_stage.clone());

        layer.emit("/event/play", vec![Value::Bool(true)]);
        assert_eq!(at_stage.seen.lock().as_slice(), ["/stage/layer/3/event/play"]);
    }

    #[test]
    fn test_detached_subject_stops_forwarding() {
        let stage = Subject::new("/stage");
        let layer = Subject::new("/layer/0");
        layer.attach_parent(stage.clone());
        layer.detach_parent();

        let at_stage = Arc::new(Recorder::default());
        stage.subscribe(at_stage.clone());

        layer.emit("/event/stop", vec![]);
        assert!(at_stage.seen.lock().is_empty());
    }
}
