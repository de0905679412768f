use anyhow::Result;

use datasheets::models::role::Role;

use crate::toollog::ToolLog;
use crate::transcript::ToolInvocation;

pub mod cliclack;

pub trait Prompt {
    fn get_input(&mut self) -> Result<Input>;
    fn render_text(&mut self, role: Role, text: &str);
    fn render_tool_call(&mut self, invocation: &ToolInvocation);
    fn render_tool_result(&mut self, invocation: &ToolInvocation);
    fn confirm(&mut self, message: &str) -> Result<bool>;
    fn render_tool_log(&mut self, log: &ToolLog);
    fn render_notice(&mut self, text: &str);
    fn show_busy(&mut self);
    fn hide_busy(&mut self);
    fn close(&self);
}

pub struct Input {
    pub input_type: InputType,
    pub content: Option<String>, // Optional content as sometimes the user may be issuing a command eg. (Exit)
}

pub enum InputType {
    Message,     // User sent a message
    ToggleDebug, // Toggle the tool debug panel
    ClearLog,    // Clear the tool debug log
    Exit,        // User wants to exit the session
}

pub enum Theme {
    Light,
    Dark,
}
