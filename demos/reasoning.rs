use stepwise::{Chain, Reason, Settings};

use clap::Parser;
use sipper::Sipper;

use std::io::{self, Write};
use std::path::PathBuf;

const CLEAR: &str = "\x1B[2J\x1B[1;1H";

#[derive(Parser, Debug)]
#[command(about = "Reason step by step about your prompts")]
struct Args {
    /// Address of an OpenAI-compatible completion server
    #[arg(long)]
    host: Option<String>,

    /// The model to reason with
    #[arg(short, long)]
    model: Option<String>,

    /// A TOML settings file (defaults to ./chat-config.toml, if present)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(tracing::Level::WARN)
        .init();

    let args = Args::parse();

    let mut settings = match &args.config {
        Some(path) => Settings::load(path).await?,
        None => Settings::discover().await?,
    };

    if let Some(host) = args.host {
        settings.config.host = host;
    }

    if let Some(model) = args.model {
        settings.config.model = model;
    }

    let Settings { config, reasoning } = settings;

    println!("Connecting to {host}...", host = config.host);

    let reason = Reason::connect(&config.host, &config.model).await?;
    let chain = Chain::new(reason, reasoning);

    let mut line = String::new();

    loop {
        println!("\n\n════════════════");
        print!("Enter a message ▪ ");
        io::stdout().flush()?;

        line.clear();

        if io::stdin().read_line(&mut line)? == 0 {
            return Ok(());
        }

        let prompt = line.trim();

        if prompt.is_empty() {
            continue;
        }

        if prompt == "/exit" {
            return Ok(());
        }

        println!("Generating response...");

        let mut session = chain.run(prompt).pin();

        while let Some(snapshot) = session.sip().await {
            print!("{CLEAR}{}", snapshot.render());
            io::stdout().flush()?;
        }

        let snapshot = session.await;
        print!("{CLEAR}{}", snapshot.render());
    }
}
