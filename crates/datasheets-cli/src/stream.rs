use anyhow::{anyhow, Result};
use serde_json::Value;

/// One event decoded from the data-stream wire format: newline-delimited
/// frames of the form `<prefix>:<json payload>`.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// `0:` a text fragment
    Text(String),
    /// `b:` a tool call has started streaming; arguments follow as deltas
    ToolCallStart { id: String, name: String },
    /// `c:` a fragment of a streaming tool call's arguments
    ToolCallDelta { id: String, delta: String },
    /// `9:` a complete tool call
    ToolCall { id: String, name: String, args: Value },
    /// `a:` the result for an earlier tool call
    ToolResult { id: String, result: Value },
    /// `3:` a stream-level error
    Error(String),
    /// `d:` the stream is done
    Finish { reason: String },
}

/// Incremental decoder. Chunks may split frames at arbitrary byte
/// boundaries, so input is buffered until a full line is available.
#[derive(Default)]
pub struct StreamParser {
    buffer: String,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &str) -> Result<Vec<StreamEvent>> {
        self.buffer.push_str(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            if let Some(event) = parse_line(line.trim_end_matches('\n'))? {
                events.push(event);
            }
        }
        Ok(events)
    }
}

fn parse_line(line: &str) -> Result<Option<StreamEvent>> {
    if line.is_empty() {
        return Ok(None);
    }

    let (prefix, payload) = line
        .split_once(':')
        .ok_or_else(|| anyhow!("malformed stream line: {}", line))?;

    let event = match prefix {
        "0" => Some(StreamEvent::Text(serde_json::from_str(payload)?)),
        "9" => {
            let value: Value = serde_json::from_str(payload)?;
            Some(StreamEvent::ToolCall {
                id: field_str(&value, "toolCallId")?,
                name: field_str(&value, "toolName")?,
                args: value.get("args").cloned().unwrap_or(Value::Null),
            })
        }
        "a" => {
            let value: Value = serde_json::from_str(payload)?;
            Some(StreamEvent::ToolResult {
                id: field_str(&value, "toolCallId")?,
                result: value.get("result").cloned().unwrap_or(Value::Null),
            })
        }
        "b" => {
            let value: Value = serde_json::from_str(payload)?;
            Some(StreamEvent::ToolCallStart {
                id: field_str(&value, "toolCallId")?,
                name: field_str(&value, "toolName")?,
            })
        }
        "c" => {
            let value: Value = serde_json::from_str(payload)?;
            Some(StreamEvent::ToolCallDelta {
                id: field_str(&value, "toolCallId")?,
                delta: field_str(&value, "argsTextDelta")?,
            })
        }
        "3" => Some(StreamEvent::Error(serde_json::from_str(payload)?)),
        "d" => {
            let value: Value = serde_json::from_str(payload)?;
            Some(StreamEvent::Finish {
                reason: value
                    .get("finishReason")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string(),
            })
        }
        // Frame kinds this client has no use for (step markers etc.)
        _ => None,
    };

    Ok(event)
}

fn field_str(value: &Value, key: &str) -> Result<String> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| anyhow!("stream frame missing '{}'", key))
}
