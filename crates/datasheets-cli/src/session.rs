use anyhow::{bail, Result};
use futures::StreamExt;
use serde_json::json;

use crate::prompt::{InputType, Prompt};
use crate::stream::{StreamEvent, StreamParser};
use crate::toollog::ToolLog;
use crate::transcript::Transcript;
use datasheets::models::role::Role;

/// Results the confirmation buttons produce.
const CONFIRMED: &str = "Yes, confirmed.";
const DENIED: &str = "No, denied";

pub struct Session<'a> {
    client: reqwest::Client,
    chat_url: String,
    transcript: Transcript,
    tool_log: ToolLog,
    prompt: Box<dyn Prompt + 'a>,
    debug: bool,
}

impl<'a> Session<'a> {
    pub fn new(server_url: &str, prompt: Box<dyn Prompt + 'a>, debug: bool) -> Self {
        Session {
            client: reqwest::Client::new(),
            chat_url: format!("{}/api/chat", server_url.trim_end_matches('/')),
            transcript: Transcript::new(),
            tool_log: ToolLog::new(),
            prompt,
            debug,
        }
    }

    pub async fn start(&mut self) -> Result<()> {
        loop {
            let input = self.prompt.get_input()?;
            match input.input_type {
                InputType::Exit => break,
                InputType::ToggleDebug => {
                    self.debug = !self.debug;
                    self.prompt.render_notice(if self.debug {
                        "Debug panel on"
                    } else {
                        "Debug panel off"
                    });
                    continue;
                }
                InputType::ClearLog => {
                    self.tool_log.clear();
                    self.prompt.render_notice("Tool log cleared");
                    continue;
                }
                InputType::Message => {
                    if let Some(content) = input.content {
                        self.transcript.push_user(content);
                    }
                }
            }

            if let Err(e) = self.reply().await {
                self.prompt.render_notice(&format!("Error: {}", e));
            }

            if self.debug {
                self.prompt.render_tool_log(&self.tool_log);
            }
        }
        self.prompt.close();
        Ok(())
    }

    /// One round-trip to the server, repeated while the model is blocked on
    /// a confirmation only the user can answer.
    async fn reply(&mut self) -> Result<()> {
        loop {
            self.transcript.begin_reply();
            self.prompt.show_busy();
            let outcome = self.stream_reply().await;
            self.prompt.hide_busy();

            if let Err(e) = outcome {
                self.transcript.abort_reply();
                return Err(e);
            }

            let Some(pending) = self.transcript.pending_confirmation() else {
                break;
            };
            let id = pending.id.clone();
            let message = pending
                .args
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("The assistant asks for confirmation.")
                .to_string();

            // The whole exchange is blocked on this answer; there is no
            // timeout on a human.
            let confirmed = self.prompt.confirm(&message)?;
            let result = json!(if confirmed { CONFIRMED } else { DENIED });
            self.transcript.supply_result(&id, result.clone())?;
            self.tool_log.record_result(&id, &result);
            // Resubmit so the model sees the answer.
        }
        Ok(())
    }

    async fn stream_reply(&mut self) -> Result<()> {
        let response = self
            .client
            .post(&self.chat_url)
            .json(&self.transcript.to_request())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("server returned {}: {}", status, body);
        }

        let mut parser = StreamParser::new();
        let mut stream = response.bytes_stream();
        let mut pending_text = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            for event in parser.feed(&String::from_utf8_lossy(&chunk))? {
                self.handle_event(event, &mut pending_text)?;
            }
        }
        self.flush_text(&mut pending_text);
        Ok(())
    }

    fn handle_event(&mut self, event: StreamEvent, pending_text: &mut String) -> Result<()> {
        match &event {
            StreamEvent::Text(delta) => pending_text.push_str(delta),
            StreamEvent::ToolCallStart { .. } => self.flush_text(pending_text),
            StreamEvent::ToolCall { id, name, args } => {
                self.flush_text(pending_text);
                self.tool_log.record_call(id, name, args);
            }
            StreamEvent::ToolResult { id, result } => {
                self.tool_log.record_result(id, result);
            }
            StreamEvent::Finish { .. } => self.flush_text(pending_text),
            StreamEvent::Error(message) => bail!("stream error: {}", message),
            StreamEvent::ToolCallDelta { .. } => {}
        }

        let rendered = match &event {
            StreamEvent::ToolCallStart { id, .. } | StreamEvent::ToolCall { id, .. } => {
                Some((id.clone(), false))
            }
            StreamEvent::ToolResult { id, .. } => Some((id.clone(), true)),
            _ => None,
        };

        self.transcript.apply(event)?;

        // Render from the transcript so output always reflects applied state
        if let Some((id, is_result)) = rendered {
            if let Some(invocation) = self.transcript.invocation(&id) {
                if is_result {
                    self.prompt.render_tool_result(invocation);
                } else {
                    self.prompt.render_tool_call(invocation);
                }
            }
        }
        Ok(())
    }

    fn flush_text(&mut self, pending_text: &mut String) {
        if pending_text.is_empty() {
            return;
        }
        self.prompt.render_text(Role::Assistant, pending_text);
        pending_text.clear();
    }
}
