//! These models represent the objects passed around by the agent
//!
//! Several wire formats meet in this crate:
//! - useChat messages and tool invocations, sent from the chat client to the server
//! - the data-stream framing, sent from the server back to the client
//! - openai messages/tools, sent from the agent to the LLM
//! - retrieval requests/documents, sent from the search tools to the pipeline
//!
//! These all overlap to varying degrees. We always immediately convert those
//! data models into the internal structs using to/from helpers. Because of the
//! need for compatibility, the internal models are not an exact match to any
//! of these formats.
pub mod message;
pub mod role;
pub mod tool;
