use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use mp_backend::{Registry, Transport};
use mp_core::config::Config;
use mp_core::query::{cancel_signal, run_query, usage_line};
use mp_core::init_logging;
use mp_protocol::QueryRequest;
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Ask a configured model provider one question.
#[derive(Parser, Debug)]
#[command(name = "mpq", version, about)]
struct Args {
    /// Question to ask. Read from stdin when omitted.
    question: Option<String>,

    /// Provider name from the config file
    #[arg(short = 'p', long, value_name = "NAME")]
    provider: Option<String>,

    /// System prompt sent with the question
    #[arg(short = 's', long, value_name = "TEXT")]
    system: Option<String>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "MODELPROV_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Give up after this many seconds
    #[arg(short = 't', long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Print the provider's pricing and exit
    #[arg(long)]
    pricing: bool,

    /// Print usage as JSON on stderr
    #[arg(long)]
    usage_json: bool,
}

async fn read_question(arg: Option<String>) -> Result<String> {
    let question = match arg {
        Some(question) => question,
        None => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .context("failed to read question from stdin")?;
            buf
        }
    };

    let question = question.trim().to_string();
    if question.is_empty() {
        bail!("no question given");
    }
    Ok(question)
}

async fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(),
    };

    let section = config.select(args.provider.as_deref())?;
    debug!(provider = ?section, "selected provider");
    let transport = Transport::new(&config.transport)?;
    let registry = Registry::new(transport);
    let name = section.name.clone();
    let provider_config = section.resolve().await?;
    let provider = registry
        .build(&provider_config)
        .with_context(|| format!("failed to construct provider '{name}'"))?;

    if args.pricing {
        let pricing = provider.pricing();
        println!("{}\t{}", pricing.tier, pricing.detail);
        return Ok(());
    }

    let mut request = QueryRequest::new(read_question(args.question).await?);
    if let Some(system) = args.system {
        request = request.with_system_prompt(system);
    }

    let cancel = cancel_signal(args.timeout.map(Duration::from_secs));
    let mut stdout = tokio::io::stdout();
    let result = run_query(provider.as_ref(), &request, &mut stdout, &cancel).await?;
    println!();

    if args.usage_json {
        eprintln!("{}", serde_json::to_string(&result)?);
    } else {
        eprintln!("{}", usage_line(&result));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
