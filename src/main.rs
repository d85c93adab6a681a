use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use apiminer::llm::LlmClient;
use apiminer::normalize::{CleanMode, LogNormalizer};
use apiminer::pipeline::{DataDir, Workflow};

#[derive(Parser)]
#[command(name = "apiminer")]
#[command(about = "Mines captured HTTP traffic into endpoint descriptions and test-step mappings")]
struct Cli {
    /// Base URL of the OpenAI-compatible reasoning service
    #[arg(long, default_value = "https://api.openai.com/v1")]
    api_base: String,
    /// Model the reasoning service should run
    #[arg(long, default_value = "gpt-4o-mini")]
    model: String,
    /// Request timeout in seconds for reasoning-service calls
    #[arg(long, default_value_t = 120)]
    timeout: u64,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize a raw capture into the origin and cleaned tables
    Clean {
        #[arg(short, long)]
        data_dir: PathBuf,
        /// Host the captured service lives on; rows from other hosts are dropped
        #[arg(long)]
        domain: String,
        #[arg(long, value_enum, default_value_t = ModeArg::UrlAndPayload)]
        mode: ModeArg,
    },
    /// Describe every endpoint in the cleaned table into the catalog
    Describe {
        #[arg(short, long)]
        data_dir: PathBuf,
    },
    /// Correlate the test narrative against the catalog
    Correlate {
        #[arg(short, long)]
        data_dir: PathBuf,
    },
    /// Run the full pipeline over one or more data directories
    Run {
        data_dirs: Vec<PathBuf>,
        #[arg(long)]
        domain: String,
        #[arg(long, value_enum, default_value_t = ModeArg::UrlAndPayload)]
        mode: ModeArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Url,
    Payload,
    UrlAndPayload,
}

impl From<ModeArg> for CleanMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Url => CleanMode::UrlOnly,
            ModeArg::Payload => CleanMode::PayloadOnly,
            ModeArg::UrlAndPayload => CleanMode::UrlAndPayload,
        }
    }
}

fn reasoning_client(cli: &Cli) -> Result<LlmClient> {
    let api_key = std::env::var("OPENAI_API_KEY")
        .context("OPENAI_API_KEY is not set; the reasoning service needs a credential")?;
    Ok(LlmClient::new(
        api_key,
        cli.api_base.clone(),
        cli.model.clone(),
        Duration::from_secs(cli.timeout),
    )?)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Clean {
            data_dir,
            domain,
            mode,
        } => {
            let dir = DataDir::new(data_dir);
            let normalizer = LogNormalizer::new(
                dir.input(),
                dir.origin(),
                dir.cleaned(),
                domain.clone(),
                (*mode).into(),
            );
            let records = normalizer.process()?;
            println!("cleaned {} rows into {}", records.len(), dir.cleaned().display());
        }
        Commands::Describe { data_dir } => {
            let llm = reasoning_client(&cli)?;
            let flow = Workflow::new(&llm, DataDir::new(data_dir));
            flow.describe_cleaned().await?;
        }
        Commands::Correlate { data_dir } => {
            let llm = reasoning_client(&cli)?;
            let flow = Workflow::new(&llm, DataDir::new(data_dir));
            flow.correlate().await?;
        }
        Commands::Run {
            data_dirs,
            domain,
            mode,
        } => {
            let llm = reasoning_client(&cli)?;
            for data_dir in data_dirs {
                println!("processing {}", data_dir.display());
                let flow = Workflow::new(&llm, DataDir::new(data_dir));
                match flow.run(domain, (*mode).into()).await {
                    Ok(_) => {}
                    Err(err) => {
                        tracing::error!(dir = %data_dir.display(), error = %err, "pipeline run failed")
                    }
                }
            }
        }
    }

    Ok(())
}
