use tinker::agent_loop::{LoopOptions, Outcome, run_agent_loop};
use tinker::config::Config;
use tinker::dispatch::Dispatcher;
use tinker::llm::GeminiProvider;
use tinker::logging;
use tinker::prompt::SYSTEM_PROMPT;
use tinker::sandbox::WorkingRoot;
use tinker::tools::ToolContext;

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Tinker - a sandboxed coding agent backed by Gemini", long_about = None)]
struct Cli {
    /// The instruction to send to the agent
    prompt: String,

    /// Model to use (default: gemini-2.0-flash)
    #[arg(long)]
    model: Option<String>,

    /// Show each function call, its raw result, and token usage
    #[arg(long)]
    verbose: bool,

    /// Directory the agent is confined to (default: runtime.working_dir)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Config file (default: ./tinker.yml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum number of model calls before giving up
    #[arg(long)]
    max_rounds: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let args = Cli::parse();

    // 1. Load configuration, then let flags win
    let mut config = Config::discover(args.config.as_deref())?;
    if let Some(model) = args.model {
        config.gemini.model = model;
    }
    if let Some(root) = args.root {
        config.runtime.working_dir = root;
    }
    if let Some(max_rounds) = args.max_rounds {
        config.runtime.max_rounds = max_rounds;
    }

    let api_key = config.api_key()?;

    // 2. Fix the sandbox root for the whole run
    let root = WorkingRoot::new(&config.runtime.working_dir).with_context(|| {
        format!(
            "Working directory {:?} is not an accessible directory",
            config.runtime.working_dir
        )
    })?;
    let dispatcher = Dispatcher::new(ToolContext::new(root, config.tool_settings()));
    let provider = GeminiProvider::new(api_key, config.request_timeout())?;

    if args.verbose {
        println!("User prompt: {}", args.prompt);
        println!("Working directory: {}", dispatcher.context().root.path().display());
    }

    // 3. Run the conversation
    let options = LoopOptions {
        model: &config.gemini.model,
        system_instruction: SYSTEM_PROMPT,
        max_rounds: config.runtime.max_rounds.max(1),
        verbose: args.verbose,
    };
    let report = run_agent_loop(&provider, &dispatcher, &args.prompt, &options)
        .await
        .context("Error generating content")?;

    match &report.outcome {
        Outcome::Answered(text) => {
            println!("Final response:");
            println!("{}", text);
        }
        Outcome::RoundBudgetExhausted { rounds } => {
            eprintln!(
                "⚠️ Round budget exhausted after {} rounds without a final answer.",
                rounds
            );
        }
    }

    if args.verbose {
        println!("Prompt tokens: {}", report.usage.prompt_tokens);
        println!("Response tokens: {}", report.usage.response_tokens);
    }

    Ok(())
}
