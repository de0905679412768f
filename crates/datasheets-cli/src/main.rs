mod prompt;
mod session;
mod stream;
mod toollog;
mod transcript;

use anyhow::Result;
use clap::Parser;

use prompt::cliclack::CliclackPrompt;
use session::Session;

#[derive(Parser)]
#[command(author, version, about = "Chat with the datasheets search assistant", long_about = None)]
struct Cli {
    /// Base URL of the datasheets server
    #[arg(long, default_value = "http://127.0.0.1:3000")]
    server: String,

    /// Start with the tool debug panel enabled
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let prompt = CliclackPrompt::new();
    let mut session = Session::new(&cli.server, Box::new(prompt), cli.debug);
    session.start().await
}
