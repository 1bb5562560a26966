use clap::{CommandFactory, Parser, Subcommand};
use tracing::info;
use voicerelay::config::Config;
use voicerelay::error::RelayError;
use voicerelay::logging::{self, LogTarget};
use voicerelay::{llm, runtime};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(
    name = "voicerelay",
    version = VERSION,
    about = "Relay recorded audio through Whisper transcription into a chat completion"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<MainCommand>,
}

#[derive(Debug, Subcommand)]
enum MainCommand {
    /// Start the HTTP server
    Start {
        /// Write hourly log files under <data_dir>/logs instead of stderr
        #[arg(long)]
        log_to_file: bool,
    },
    /// List models available to the configured API key
    Models,
    /// Show version
    Version,
}

fn load_config() -> anyhow::Result<Config> {
    match Config::load() {
        Ok(config) => Ok(config),
        Err(RelayError::StartupConfig(e)) => {
            eprintln!("Config missing/invalid: {e}");
            eprintln!("Set OPENAI_API_KEY in the environment or a .env file.");
            Err(anyhow::anyhow!("startup configuration error: {e}"))
        }
        Err(e) => Err(e.into()),
    }
}

async fn print_models() -> anyhow::Result<()> {
    let config = load_config()?;
    let provider = llm::create_provider(&config)?;
    let models = provider.list_models().await?;
    let mut ids: Vec<String> = models.data.into_iter().map(|m| m.id).collect();
    ids.sort();
    for id in ids {
        println!("{id}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_to_file = match cli.command {
        Some(MainCommand::Start { log_to_file }) => log_to_file,
        Some(MainCommand::Models) => return print_models().await,
        Some(MainCommand::Version) => {
            println!("voicerelay {VERSION}");
            return Ok(());
        }
        None => {
            let mut cmd = Cli::command();
            cmd.print_help()?;
            println!();
            return Ok(());
        }
    };

    let config = load_config()?;

    let target = if log_to_file {
        LogTarget::HourlyFiles {
            dir: config.log_dir(),
            retention_days: config.log_retention(),
        }
    } else {
        LogTarget::from_env()
    };
    logging::init_logging(&target)?;
    info!("Starting voicerelay v{VERSION}...");

    runtime::run(config).await
}
