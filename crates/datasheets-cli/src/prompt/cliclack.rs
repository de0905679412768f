use std::io::{self, Write};

use anyhow::Result;
use bat::WrappingMode;
use cliclack::{confirm, input, spinner};
use console::style;

use datasheets::models::role::Role;
use datasheets::tools::{
    ASK_FOR_CONFIRMATION, SEARCH_ALL_DOCUMENTS, SEARCH_BY_COMPONENT_TYPE, SEARCH_BY_MANUFACTURER,
    SEARCH_BY_PART_NUMBER, SEARCH_BY_SPECIFICATIONS,
};

use super::{Input, InputType, Prompt, Theme};
use crate::toollog::ToolLog;
use crate::transcript::{InvocationState, ToolInvocation};

pub struct CliclackPrompt {
    spinner: cliclack::ProgressBar,
    theme: Theme,
}

impl CliclackPrompt {
    pub fn new() -> Self {
        CliclackPrompt {
            spinner: spinner(),
            theme: Theme::Dark,
        }
    }

    fn theme_name(&self) -> &'static str {
        match self.theme {
            Theme::Light => "GitHub",
            Theme::Dark => "zenburn",
        }
    }
}

fn print_markdown(content: &str, theme: &str) {
    bat::PrettyPrinter::new()
        .input(bat::Input::from_bytes(content.as_bytes()))
        .theme(theme)
        .language("Markdown")
        .wrapping_mode(WrappingMode::Character)
        .print()
        .unwrap();
}

fn print_log_entry(content: &str, theme: &str, title: &str) {
    bat::PrettyPrinter::new()
        .input(bat::Input::from_bytes(content.as_bytes()).name(title))
        .theme(theme)
        .language("JSON")
        .grid(true)
        .header(true)
        .wrapping_mode(WrappingMode::Character)
        .print()
        .unwrap();
}

/// Tool-specific one-glance summary of a call's arguments.
fn call_summary(invocation: &ToolInvocation) -> String {
    let args = &invocation.args;
    let query = args.get("query").and_then(|v| v.as_str()).unwrap_or("");

    match invocation.name.as_str() {
        SEARCH_ALL_DOCUMENTS => format!("Searching for: \"{}\"", query),
        SEARCH_BY_COMPONENT_TYPE => format!(
            "Searching for: \"{}\"\nComponent type: {}",
            query,
            args.get("componentType").and_then(|v| v.as_str()).unwrap_or("?"),
        ),
        SEARCH_BY_MANUFACTURER => format!(
            "Searching for: \"{}\"\nManufacturer: {}",
            query,
            args.get("manufacturer").and_then(|v| v.as_str()).unwrap_or("?"),
        ),
        SEARCH_BY_SPECIFICATIONS => {
            let mut lines = vec![format!("Searching for: \"{}\"", query)];
            if let Some(component_type) = args.get("componentType").and_then(|v| v.as_str()) {
                lines.push(format!("Component type: {}", component_type));
            }
            if let Some(specifications) = args.get("specifications") {
                lines.push(format!("With specifications: {}", specifications));
            }
            lines.join("\n")
        }
        SEARCH_BY_PART_NUMBER => format!(
            "Searching for part number: \"{}\"",
            args.get("partNumber").and_then(|v| v.as_str()).unwrap_or("?"),
        ),
        _ => format!("Arguments: {}", args),
    }
}

impl Prompt for CliclackPrompt {
    fn get_input(&mut self) -> Result<Input> {
        let mut message_text: String =
            input("Datasheets Chat >         [Help: /?]").placeholder("").interact()?;
        message_text = message_text.trim().to_string();

        if message_text.eq_ignore_ascii_case("/exit") || message_text.eq_ignore_ascii_case("/quit")
        {
            Ok(Input {
                input_type: InputType::Exit,
                content: None,
            })
        } else if message_text.eq_ignore_ascii_case("/debug") {
            Ok(Input {
                input_type: InputType::ToggleDebug,
                content: None,
            })
        } else if message_text.eq_ignore_ascii_case("/clear") {
            Ok(Input {
                input_type: InputType::ClearLog,
                content: None,
            })
        } else if message_text.eq_ignore_ascii_case("/t") {
            self.theme = match self.theme {
                Theme::Light => {
                    println!("Switching to Dark theme");
                    Theme::Dark
                }
                Theme::Dark => {
                    println!("Switching to Light theme");
                    Theme::Light
                }
            };
            self.get_input()
        } else if message_text.eq_ignore_ascii_case("/?") {
            println!("Commands:");
            println!("/exit - Exit the session");
            println!("/debug - Toggle the tool debug panel");
            println!("/clear - Clear the tool debug log");
            println!("/t - Toggle Light/Dark theme");
            println!("/? - Display this help message");
            self.get_input()
        } else {
            Ok(Input {
                input_type: InputType::Message,
                content: Some(message_text),
            })
        }
    }

    fn render_text(&mut self, role: Role, text: &str) {
        match role {
            // User text is echoed plain; assistant text is markdown
            Role::User => println!("{}", text),
            Role::Assistant => print_markdown(text, self.theme_name()),
        }
        io::stdout().flush().expect("Failed to flush stdout");
    }

    fn render_tool_call(&mut self, invocation: &ToolInvocation) {
        match invocation.state {
            InvocationState::PartialCall => {
                println!(
                    "{} {}",
                    style("Running:").yellow().bold(),
                    invocation.name
                );
                if !invocation.args_text.is_empty() {
                    println!("Arguments: {}", invocation.args_text);
                }
            }
            _ => {
                if invocation.name == ASK_FOR_CONFIRMATION {
                    let message = invocation
                        .args
                        .get("message")
                        .and_then(|v| v.as_str())
                        .unwrap_or("The assistant asks for confirmation.");
                    println!(
                        "{} {}",
                        style("Confirmation requested:").yellow().bold(),
                        message
                    );
                } else {
                    println!("{} {}", style("Search:").cyan().bold(), invocation.name);
                    println!("{}", call_summary(invocation));
                }
            }
        }
        io::stdout().flush().expect("Failed to flush stdout");
    }

    fn render_tool_result(&mut self, invocation: &ToolInvocation) {
        let Some(result) = &invocation.result else {
            return;
        };

        if invocation.name == ASK_FOR_CONFIRMATION {
            println!(
                "Confirmation result: {}",
                result.as_str().unwrap_or_default()
            );
        } else if result.get("error").and_then(|v| v.as_bool()).unwrap_or(false) {
            println!(
                "{} {}",
                style("Search failed:").red().bold(),
                result
                    .get("message")
                    .and_then(|v| v.as_str())
                    .unwrap_or("Unknown error")
            );
        } else {
            let count = result
                .get("documents")
                .and_then(|v| v.as_array())
                .map(|documents| documents.len())
                .unwrap_or(0);
            println!(
                "{} Found {} results",
                style("Search complete:").green().bold(),
                count
            );
        }
        io::stdout().flush().expect("Failed to flush stdout");
    }

    fn confirm(&mut self, message: &str) -> Result<bool> {
        Ok(confirm(message).initial_value(true).interact()?)
    }

    fn render_tool_log(&mut self, log: &ToolLog) {
        if log.is_empty() {
            println!("No tool calls yet");
            return;
        }

        for entry in log.entries() {
            let title = format!(
                "{} {}",
                entry.kind.label(),
                entry.timestamp.format("%H:%M:%S"),
            );
            let content = serde_json::to_string_pretty(&entry.data)
                .unwrap_or_else(|_| "Error formatting JSON".to_string());
            print_log_entry(&content, self.theme_name(), &title);
        }
    }

    fn render_notice(&mut self, text: &str) {
        println!("{}", style(text).dim());
    }

    fn show_busy(&mut self) {
        self.spinner = spinner();
        self.spinner.start("awaiting reply");
    }

    fn hide_busy(&mut self) {
        self.spinner.stop("");
    }

    fn close(&self) {
        // No cleanup required
    }
}
