use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

/// Event names emitted by the viewer.
pub mod names {
    pub const MODEL_LOADED: &str = "model.loaded";
    pub const ENVIRONMENT_LOADED: &str = "environment.loaded";
    pub const ASSET_FAILED: &str = "asset.failed";
    pub const PART_ASSIGNED: &str = "part.assigned";
    pub const PART_UNASSIGNED: &str = "part.unassigned";
    pub const BINDINGS_CLEARED: &str = "bindings.cleared";
    pub const JUMP_STARTED: &str = "jump.started";
    pub const JUMP_LANDED: &str = "jump.landed";
    pub const BOW_STARTED: &str = "bow.started";
    pub const BOW_FINISHED: &str = "bow.finished";
    pub const REVERSE_TOGGLED: &str = "reverse.toggled";
    pub const TELEPORT_STARTED: &str = "teleport.started";
    pub const TELEPORT_FINISHED: &str = "teleport.finished";
    pub const FADE_FINISHED: &str = "fade.finished";
    pub const POSITION_RESET: &str = "position.reset";
}

/// A viewer event with a name and an arbitrary JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerEvent {
    pub event_type: String,
    pub data: HashMap<String, serde_json::Value>,
    /// Frame number the event was emitted on.
    pub frame: u64,
}

/// Event bus: events queue during a frame and move into the log on `flush`.
pub struct EventBus {
    /// Ring buffer of recently flushed events.
    log: VecDeque<ViewerEvent>,
    log_capacity: usize,
    frame: u64,
    pending: Vec<ViewerEvent>,
}

impl EventBus {
    pub fn new(log_capacity: usize) -> Self {
        Self {
            log: VecDeque::with_capacity(log_capacity),
            log_capacity,
            frame: 0,
            pending: Vec::new(),
        }
    }

    pub fn emit(&mut self, event_type: &str, data: HashMap<String, serde_json::Value>) {
        tracing::debug!("event {} at frame {}", event_type, self.frame);
        self.pending.push(ViewerEvent {
            event_type: event_type.to_string(),
            data,
            frame: self.frame,
        });
    }

    pub fn emit_simple(&mut self, event_type: &str) {
        self.emit(event_type, HashMap::new());
    }

    /// Emit with a single payload field.
    pub fn emit_with(&mut self, event_type: &str, key: &str, value: serde_json::Value) {
        let mut data = HashMap::new();
        data.insert(key.to_string(), value);
        self.emit(event_type, data);
    }

    /// Move pending events into the log, dropping the oldest past capacity.
    pub fn flush(&mut self) {
        for event in self.pending.drain(..) {
            if self.log.len() >= self.log_capacity {
                self.log.pop_front();
            }
            self.log.push_back(event);
        }
    }

    pub fn advance_frame(&mut self) {
        self.frame += 1;
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Logged events, optionally filtered by name and by minimum frame.
    pub fn query(&self, event_type: Option<&str>, since_frame: Option<u64>) -> Vec<ViewerEvent> {
        self.log
            .iter()
            .filter(|e| event_type.map_or(true, |t| e.event_type == t))
            .filter(|e| since_frame.map_or(true, |f| e.frame >= f))
            .cloned()
            .collect()
    }
}
