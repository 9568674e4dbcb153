use stepwise::{Command, Conversation, Reason, Settings};

use clap::Parser;
use sipper::Sipper;

use std::io::{self, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(about = "Chat with a model in your terminal")]
struct Args {
    /// Address of an OpenAI-compatible completion server
    #[arg(long)]
    host: Option<String>,

    /// The model to chat with
    #[arg(short, long)]
    model: Option<String>,

    /// System prompt lines, replacing the configured ones
    #[arg(short, long)]
    system: Vec<String>,

    #[arg(long)]
    max_new_tokens: Option<u32>,

    #[arg(long)]
    temperature: Option<f32>,

    /// A TOML settings file (defaults to ./chat-config.toml, if present)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

const HELP: &str = "
  /help - Show this help message.
  /exit - Exit the chat.
  /clear - Forget the conversation so far.
  /save [file] - Save the chat history to a file.
  /load [file] - Load a chat history from a file.";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(tracing::Level::WARN)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Settings::load(path).await?,
        None => Settings::discover().await?,
    }
    .config;

    if let Some(host) = args.host {
        config.host = host;
    }

    if let Some(model) = args.model {
        config.model = model;
    }

    if !args.system.is_empty() {
        config.system = args.system;
    }

    if let Some(max_new_tokens) = args.max_new_tokens {
        config.max_new_tokens = max_new_tokens;
    }

    if let Some(temperature) = args.temperature {
        config.temperature = temperature;
    }

    let reason = Reason::connect(&config.host, &config.model).await?;
    let options = config.options();

    println!("-------------------");
    println!("Model: {model}", model = reason.name());
    println!("'/exit' or ctrl+c to quit, '/help' for a list of commands.");
    println!("-------------------");

    let mut conversation = Conversation::new(config.system);
    let mut line = String::new();

    loop {
        print!("\n> ");
        io::stdout().flush()?;

        line.clear();

        if io::stdin().read_line(&mut line)? == 0 {
            return Ok(());
        }

        let message = line.trim();

        if message.is_empty() {
            continue;
        }

        if let Some(command) = Command::parse(message) {
            match command {
                Command::Help => println!("{HELP}"),
                Command::Exit => return Ok(()),
                Command::Clear => {
                    conversation.clear();
                    println!("Conversation cleared.");
                }
                Command::Save(file) => {
                    conversation.save(&file).await?;
                    println!("Chat history saved to {}.", file.display());
                }
                Command::Load(file) => {
                    let loaded = conversation.load(&file).await?;
                    println!("Loaded {loaded} messages from {}.", file.display());
                }
                Command::MissingFile => println!("Please provide a file name."),
                Command::Unknown(command) => println!("Unknown command: {command}"),
            }

            continue;
        }

        conversation.push_user(message);

        let mut reply = reason.complete(conversation.messages(), options).pin();

        println!();

        while let Some(token) = reply.sip().await {
            print!("{token}");
            io::stdout().flush()?;
        }

        let reply = reply.await?;
        conversation.push_assistant(reply);

        println!();
    }
}
