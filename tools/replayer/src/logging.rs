use crate::errors::ReplayError;
use crate::replay::recording::{EventSink, RecorderEvent};
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 4096;

#[derive(Debug, Clone)]
pub struct JsonlLogger {
    pub path: PathBuf,
    pub max_payload_bytes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEvent<'a> {
    pub level: &'a str,
    pub event_type: &'a str,
    pub payload: Value,
}

impl JsonlLogger {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }

    pub fn append(&self, event: &LogEvent<'_>) -> Result<(), ReplayError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| ReplayError::Io(e.to_string()))?;
        }
        let truncated = truncate_json(event.payload.clone(), self.max_payload_bytes);
        let line = serde_json::to_string(&LogEvent {
            level: event.level,
            event_type: event.event_type,
            payload: truncated,
        })
        .map_err(|e| ReplayError::Io(e.to_string()))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| ReplayError::Io(e.to_string()))?;
        file.write_all(line.as_bytes())
            .map_err(|e| ReplayError::Io(e.to_string()))?;
        file.write_all(b"\n")
            .map_err(|e| ReplayError::Io(e.to_string()))?;

        Ok(())
    }
}

impl EventSink for JsonlLogger {
    fn record(&self, event: &RecorderEvent) {
        let payload = serde_json::to_value(event).unwrap_or(Value::Null);
        // Logging never fails a traversal.
        let _ = self.append(&LogEvent {
            level: event.level(),
            event_type: event.event_type(),
            payload,
        });
    }
}

fn truncate_json(value: Value, max_bytes: usize) -> Value {
    let rendered = serde_json::to_string(&value).unwrap_or_default();
    if rendered.len() <= max_bytes {
        return value;
    }
    let mut end = max_bytes.saturating_sub(3);
    while !rendered.is_char_boundary(end) {
        end -= 1;
    }
    Value::String(format!("{}...", &rendered[..end]))
}
