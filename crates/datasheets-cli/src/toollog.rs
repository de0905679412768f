use chrono::{DateTime, Utc};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolLogKind {
    Call,
    Result,
}

impl ToolLogKind {
    pub fn label(&self) -> &'static str {
        match self {
            ToolLogKind::Call => "Tool Call",
            ToolLogKind::Result => "Tool Result",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolLogEntry {
    pub kind: ToolLogKind,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

/// Append-only record of tool traffic, kept apart from the transcript so it
/// can be cleared without touching conversation state.
#[derive(Default)]
pub struct ToolLog {
    entries: Vec<ToolLogEntry>,
}

impl ToolLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_call(&mut self, id: &str, name: &str, args: &Value) {
        self.entries.push(ToolLogEntry {
            kind: ToolLogKind::Call,
            data: json!({ "toolCallId": id, "toolName": name, "args": args }),
            timestamp: Utc::now(),
        });
    }

    pub fn record_result(&mut self, id: &str, result: &Value) {
        self.entries.push(ToolLogEntry {
            kind: ToolLogKind::Result,
            data: json!({ "toolCallId": id, "result": result }),
            timestamp: Utc::now(),
        });
    }

    pub fn entries(&self) -> &[ToolLogEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
