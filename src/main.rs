// OpenCERN Agent - main entry point

use anyhow::Result;
use clap::Parser;

use opencern_agent::cli::Repl;
use opencern_agent::config::load_config;

#[derive(Debug, Parser)]
#[command(name = "opencern-agent", version, about = "OpenCERN analysis assistant")]
struct Args {
    /// Model id override
    #[arg(long)]
    model: Option<String>,

    /// Maximum model round-trips per user request
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Approve every tool call without prompting
    #[arg(long)]
    auto_approve: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so they never interleave with streamed tokens
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = load_config()?;
    if let Some(model) = args.model {
        config.model = model;
    }
    if let Some(max_iterations) = args.max_iterations {
        config.max_iterations = max_iterations;
    }
    if args.auto_approve {
        config.features.auto_approve_tools = true;
    }

    let mut repl = Repl::new(config)?;
    repl.run().await
}
