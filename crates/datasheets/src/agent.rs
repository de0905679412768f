use anyhow::Result;
use futures::stream::BoxStream;
use indoc::indoc;
use serde_json::Value;

use crate::errors::AgentResult;
use crate::models::message::{Message, ToolRequest};
use crate::models::tool::ToolCall;
use crate::providers::base::Provider;
use crate::tools::SearchTools;

/// Fixed instructions sent with every completion: the model must always go
/// through a retrieval tool rather than answer from memory.
pub const SYSTEM_PROMPT: &str = indoc! {r#"
    You are an electronics component search assistant.

    You have access to a database of electronic components. USE YOUR TOOLS to help users find components.

    IMPORTANT: ALWAYS use the search tools provided to you when the user asks about electronic components. Do not try to answer from memory.

    - Use 'searchAllDocuments' for general searches across all component types.
    - Use 'searchByComponentType' for specific searches about particular component types.
    - Use 'searchByManufacturer' for searches related to specific manufacturers.
    - Use 'searchBySpecifications' for searches based on technical specifications like voltage, current, frequency, etc.
    - Use 'searchByPartNumber' when the user names an exact part.

    YOU MUST ALWAYS USE TOOLS. If you're not sure which tool to use, start with searchAllDocuments.

    Examples:
    - If user asks "what ADCs do you have?", use searchByComponentType with componentType="adc"
    - If user asks "show me components from 3PEAK", use searchByManufacturer with manufacturer="3PEAK"
    - If user asks "what op amps do you have?", use searchByComponentType with componentType="op_amp"
    - If user asks "find op amps with supply voltage above 30V", use searchBySpecifications
"#};

/// Upper bound on tool rounds within a single reply.
const MAX_TOOL_ROUNDS: usize = 5;

/// Agent pairs the hosted model with the component search tools
pub struct Agent {
    provider: Box<dyn Provider>,
    tools: SearchTools,
}

impl Agent {
    pub fn new(provider: Box<dyn Provider>, tools: SearchTools) -> Self {
        Self { provider, tools }
    }

    /// Dispatch a single tool call against the search toolkit
    async fn dispatch_tool_call(&self, tool_call: AgentResult<ToolCall>) -> AgentResult<Value> {
        let call = tool_call?;
        self.tools.call(call).await
    }

    /// Create a stream that yields each message as it's generated by the agent.
    /// This includes both the assistant's responses and any tool responses.
    pub async fn reply(&self, messages: &[Message]) -> Result<BoxStream<'_, Result<Message>>> {
        let mut messages = messages.to_vec();
        let tools = self.tools.tools().to_vec();

        Ok(Box::pin(async_stream::try_stream! {
            for _round in 0..MAX_TOOL_ROUNDS {
                let (response, _usage) = self.provider.complete(
                    SYSTEM_PROMPT,
                    &messages,
                    &tools,
                ).await?;

                yield response.clone();

                // Ensure the response is delivered before potentially
                // long-running tool calls start processing
                tokio::task::yield_now().await;

                let tool_requests: Vec<ToolRequest> = response.content
                    .iter()
                    .filter_map(|content| content.as_tool_request().cloned())
                    .collect();

                if tool_requests.is_empty() {
                    // No more tool calls, end the reply loop
                    break;
                }

                // Executor-less tools are answered by the client; when one is
                // pending the loop stops and the result arrives with the next
                // request. Search tools run sequentially, one retrieval call
                // in flight at a time.
                let mut awaiting_client = false;
                let mut tool_response = Message::user();
                for request in &tool_requests {
                    let client_side = matches!(
                        &request.tool_call,
                        Ok(call) if !SearchTools::has_executor(&call.name)
                    );
                    if client_side {
                        awaiting_client = true;
                        continue;
                    }

                    let output = self.dispatch_tool_call(request.tool_call.clone()).await;
                    tool_response = tool_response.with_tool_response(request.id.clone(), output);
                }

                if !tool_response.content.is_empty() {
                    yield tool_response.clone();
                }

                if awaiting_client {
                    break;
                }

                messages.push(response);
                messages.push(tool_response);
            }
        }))
    }
}
