use anyhow::{anyhow, bail, Result};
use serde_json::{json, Value};

use datasheets::models::role::Role;
use datasheets::tools::ASK_FOR_CONFIRMATION;

use crate::stream::StreamEvent;

/// Lifecycle of a tool invocation as the stream reveals it. Transitions only
/// move forward; a frame that would move an invocation backwards is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InvocationState {
    PartialCall,
    Call,
    Result,
}

impl InvocationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvocationState::PartialCall => "partial-call",
            InvocationState::Call => "call",
            InvocationState::Result => "result",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub state: InvocationState,
    pub args: Value,
    /// Raw argument text accumulated while the call is still streaming
    pub args_text: String,
    pub result: Option<Value>,
}

#[derive(Debug, Clone)]
pub enum Part {
    Text(String),
    ToolInvocation(ToolInvocation),
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub parts: Vec<Part>,
}

/// The client-held conversation. There is no server-side session: the full
/// transcript round-trips with every submission.
#[derive(Default)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn push_user<S: Into<String>>(&mut self, text: S) {
        self.messages.push(ChatMessage {
            role: Role::User,
            parts: vec![Part::Text(text.into())],
        });
    }

    /// Opens the assistant message the next stream will fill in.
    pub fn begin_reply(&mut self) {
        self.messages.push(ChatMessage {
            role: Role::Assistant,
            parts: Vec::new(),
        });
    }

    /// Drops a reply message that never received any content.
    pub fn abort_reply(&mut self) {
        if let Some(last) = self.messages.last() {
            if last.role == Role::Assistant && last.parts.is_empty() {
                self.messages.pop();
            }
        }
    }

    /// Folds one stream event into the transcript.
    pub fn apply(&mut self, event: StreamEvent) -> Result<()> {
        match event {
            StreamEvent::Text(delta) => {
                let message = self.current_reply()?;
                if let Some(Part::Text(text)) = message.parts.last_mut() {
                    text.push_str(&delta);
                } else {
                    message.parts.push(Part::Text(delta));
                }
            }
            StreamEvent::ToolCallStart { id, name } => {
                let message = self.current_reply()?;
                message.parts.push(Part::ToolInvocation(ToolInvocation {
                    id,
                    name,
                    state: InvocationState::PartialCall,
                    args: Value::Null,
                    args_text: String::new(),
                    result: None,
                }));
            }
            StreamEvent::ToolCallDelta { id, delta } => {
                let invocation = self
                    .find_invocation_mut(&id)
                    .ok_or_else(|| anyhow!("arguments for unknown tool call '{}'", id))?;
                if invocation.state != InvocationState::PartialCall {
                    bail!(
                        "arguments for tool call '{}' arrived in state '{}'",
                        id,
                        invocation.state.as_str()
                    );
                }
                invocation.args_text.push_str(&delta);
            }
            StreamEvent::ToolCall { id, name, args } => {
                if let Some(invocation) = self.find_invocation_mut(&id) {
                    if invocation.state != InvocationState::PartialCall {
                        bail!(
                            "tool call '{}' cannot move from '{}' back to 'call'",
                            id,
                            invocation.state.as_str()
                        );
                    }
                    invocation.state = InvocationState::Call;
                    invocation.name = name;
                    invocation.args = args;
                } else {
                    let message = self.current_reply()?;
                    message.parts.push(Part::ToolInvocation(ToolInvocation {
                        id,
                        name,
                        state: InvocationState::Call,
                        args,
                        args_text: String::new(),
                        result: None,
                    }));
                }
            }
            StreamEvent::ToolResult { id, result } => {
                let invocation = self
                    .find_invocation_mut(&id)
                    .ok_or_else(|| anyhow!("result for unknown tool call '{}'", id))?;
                if invocation.state != InvocationState::Call {
                    bail!(
                        "result for tool call '{}' arrived in state '{}'",
                        id,
                        invocation.state.as_str()
                    );
                }
                if invocation.name == ASK_FOR_CONFIRMATION {
                    // Only this client can answer a confirmation
                    bail!("stream-supplied confirmation result refused");
                }
                invocation.state = InvocationState::Result;
                invocation.result = Some(result);
            }
            StreamEvent::Error(_) | StreamEvent::Finish { .. } => {}
        }
        Ok(())
    }

    pub fn invocation(&self, id: &str) -> Option<&ToolInvocation> {
        self.messages
            .iter()
            .rev()
            .flat_map(|message| message.parts.iter())
            .find_map(|part| match part {
                Part::ToolInvocation(invocation) if invocation.id == id => Some(invocation),
                _ => None,
            })
    }

    /// The confirmation the model is currently waiting on, if any.
    pub fn pending_confirmation(&self) -> Option<&ToolInvocation> {
        self.messages
            .iter()
            .rev()
            .flat_map(|message| message.parts.iter())
            .find_map(|part| match part {
                Part::ToolInvocation(invocation)
                    if invocation.name == ASK_FOR_CONFIRMATION
                        && invocation.state == InvocationState::Call =>
                {
                    Some(invocation)
                }
                _ => None,
            })
    }

    /// Supplies the human's answer for a pending confirmation. This is the
    /// only way an invocation of the confirmation tool reaches `result`.
    pub fn supply_result(&mut self, id: &str, result: Value) -> Result<()> {
        let invocation = self
            .find_invocation_mut(id)
            .ok_or_else(|| anyhow!("unknown tool call '{}'", id))?;
        if invocation.name != ASK_FOR_CONFIRMATION {
            bail!("only confirmation results can be supplied by the client");
        }
        if invocation.state != InvocationState::Call {
            bail!("confirmation '{}' is not awaiting an answer", id);
        }
        invocation.state = InvocationState::Result;
        invocation.result = Some(result);
        Ok(())
    }

    /// Serializes the conversation into the request body the server expects.
    pub fn to_request(&self) -> Value {
        let messages: Vec<Value> = self
            .messages
            .iter()
            .map(|message| {
                let role = match message.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };

                let mut text_parts: Vec<&str> = Vec::new();
                let mut invocations: Vec<Value> = Vec::new();
                for part in &message.parts {
                    match part {
                        Part::Text(text) => text_parts.push(text),
                        Part::ToolInvocation(invocation) => {
                            let mut entry = json!({
                                "state": invocation.state.as_str(),
                                "toolCallId": invocation.id,
                                "toolName": invocation.name,
                                "args": invocation.args,
                            });
                            if let Some(result) = &invocation.result {
                                entry
                                    .as_object_mut()
                                    .unwrap()
                                    .insert("result".to_string(), result.clone());
                            }
                            invocations.push(entry);
                        }
                    }
                }

                let mut value = json!({
                    "role": role,
                    "content": text_parts.join("\n"),
                });
                if !invocations.is_empty() {
                    value
                        .as_object_mut()
                        .unwrap()
                        .insert("toolInvocations".to_string(), json!(invocations));
                }
                value
            })
            .collect();

        json!({ "messages": messages })
    }

    fn current_reply(&mut self) -> Result<&mut ChatMessage> {
        match self.messages.last_mut() {
            Some(message) if message.role == Role::Assistant => Ok(message),
            _ => Err(anyhow!("no reply in progress")),
        }
    }

    fn find_invocation_mut(&mut self, id: &str) -> Option<&mut ToolInvocation> {
        self.messages
            .iter_mut()
            .rev()
            .flat_map(|message| message.parts.iter_mut())
            .find_map(|part| match part {
                Part::ToolInvocation(invocation) if invocation.id == id => Some(invocation),
                _ => None,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call_event(id: &str, name: &str) -> StreamEvent {
        StreamEvent::ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            args: json!({"query": "adc"}),
        }
    }

    fn result_event(id: &str) -> StreamEvent {
        StreamEvent::ToolResult {
            id: id.to_string(),
            result: json!({"documents": []}),
        }
    }

    #[test]
    fn test_text_deltas_accumulate_into_one_part() {
        let mut transcript = Transcript::new();
        transcript.push_user("hi");
        transcript.begin_reply();

        transcript
            .apply(StreamEvent::Text("Hello ".to_string()))
            .unwrap();
        transcript
            .apply(StreamEvent::Text("world".to_string()))
            .unwrap();

        let reply = &transcript.messages()[1];
        assert_eq!(reply.parts.len(), 1);
        match &reply.parts[0] {
            Part::Text(text) => assert_eq!(text, "Hello world"),
            _ => panic!("expected text part"),
        }
    }

    #[test]
    fn test_full_invocation_lifecycle() {
        let mut transcript = Transcript::new();
        transcript.push_user("find adcs");
        transcript.begin_reply();

        transcript
            .apply(StreamEvent::ToolCallStart {
                id: "call-1".to_string(),
                name: "searchAllDocuments".to_string(),
            })
            .unwrap();
        assert_eq!(
            transcript.invocation("call-1").unwrap().state,
            InvocationState::PartialCall
        );

        transcript
            .apply(StreamEvent::ToolCallDelta {
                id: "call-1".to_string(),
                delta: "{\"query\":\"adc\"}".to_string(),
            })
            .unwrap();

        transcript.apply(call_event("call-1", "searchAllDocuments")).unwrap();
        assert_eq!(
            transcript.invocation("call-1").unwrap().state,
            InvocationState::Call
        );

        transcript.apply(result_event("call-1")).unwrap();
        let invocation = transcript.invocation("call-1").unwrap();
        assert_eq!(invocation.state, InvocationState::Result);
        assert_eq!(invocation.result, Some(json!({"documents": []})));
    }

    #[test]
    fn test_result_before_call_is_rejected() {
        let mut transcript = Transcript::new();
        transcript.push_user("find adcs");
        transcript.begin_reply();

        let err = transcript.apply(result_event("call-1")).unwrap_err();
        assert!(err.to_string().contains("unknown tool call"));
    }

    #[test]
    fn test_state_never_regresses() {
        let mut transcript = Transcript::new();
        transcript.push_user("find adcs");
        transcript.begin_reply();

        transcript.apply(call_event("call-1", "searchAllDocuments")).unwrap();
        transcript.apply(result_event("call-1")).unwrap();

        // A second call frame for a finished invocation must be refused
        let err = transcript
            .apply(call_event("call-1", "searchAllDocuments"))
            .unwrap_err();
        assert!(err.to_string().contains("back to 'call'"));

        // And so must argument deltas
        let err = transcript
            .apply(StreamEvent::ToolCallDelta {
                id: "call-1".to_string(),
                delta: "{".to_string(),
            })
            .unwrap_err();
        assert!(err.to_string().contains("arrived in state"));
    }

    #[test]
    fn test_stream_cannot_answer_confirmation() {
        let mut transcript = Transcript::new();
        transcript.push_user("search everything");
        transcript.begin_reply();

        transcript
            .apply(StreamEvent::ToolCall {
                id: "call-1".to_string(),
                name: ASK_FOR_CONFIRMATION.to_string(),
                args: json!({"message": "Proceed?"}),
            })
            .unwrap();

        let err = transcript.apply(result_event("call-1")).unwrap_err();
        assert!(err.to_string().contains("refused"));
        assert_eq!(
            transcript.invocation("call-1").unwrap().state,
            InvocationState::Call
        );
    }

    #[test]
    fn test_supply_result_answers_pending_confirmation() {
        let mut transcript = Transcript::new();
        transcript.push_user("search everything");
        transcript.begin_reply();
        transcript
            .apply(StreamEvent::ToolCall {
                id: "call-1".to_string(),
                name: ASK_FOR_CONFIRMATION.to_string(),
                args: json!({"message": "Proceed?"}),
            })
            .unwrap();

        assert!(transcript.pending_confirmation().is_some());
        transcript
            .supply_result("call-1", json!("Yes, confirmed."))
            .unwrap();

        assert!(transcript.pending_confirmation().is_none());
        let invocation = transcript.invocation("call-1").unwrap();
        assert_eq!(invocation.state, InvocationState::Result);
        assert_eq!(invocation.result, Some(json!("Yes, confirmed.")));

        // Answering twice is refused
        assert!(transcript
            .supply_result("call-1", json!("No, denied"))
            .is_err());
    }

    #[test]
    fn test_supply_result_refused_for_search_tools() {
        let mut transcript = Transcript::new();
        transcript.push_user("find adcs");
        transcript.begin_reply();
        transcript.apply(call_event("call-1", "searchAllDocuments")).unwrap();

        let err = transcript
            .supply_result("call-1", json!("Yes, confirmed."))
            .unwrap_err();
        assert!(err.to_string().contains("only confirmation results"));
    }

    #[test]
    fn test_to_request_serializes_completed_invocations() {
        let mut transcript = Transcript::new();
        transcript.push_user("find adcs");
        transcript.begin_reply();
        transcript.apply(call_event("call-1", "searchAllDocuments")).unwrap();
        transcript.apply(result_event("call-1")).unwrap();
        transcript
            .apply(StreamEvent::Text("Found nothing.".to_string()))
            .unwrap();

        let request = transcript.to_request();
        let messages = request["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"], "find adcs");

        let reply = &messages[1];
        assert_eq!(reply["role"], "assistant");
        assert_eq!(reply["content"], "Found nothing.");
        let invocations = reply["toolInvocations"].as_array().unwrap();
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0]["state"], "result");
        assert_eq!(invocations[0]["toolCallId"], "call-1");
        assert_eq!(invocations[0]["result"], json!({"documents": []}));
    }

    #[test]
    fn test_abort_reply_drops_only_empty_replies() {
        let mut transcript = Transcript::new();
        transcript.push_user("hi");
        transcript.begin_reply();
        transcript.abort_reply();
        assert_eq!(transcript.messages().len(), 1);

        transcript.begin_reply();
        transcript
            .apply(StreamEvent::Text("partial".to_string()))
            .unwrap();
        transcript.abort_reply();
        assert_eq!(transcript.messages().len(), 2);
    }
}
