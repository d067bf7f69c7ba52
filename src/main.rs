use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use judigpt::agent::{Agent, AgentKind};
use judigpt::check_code::check_code;
use judigpt::code::code_from_response;
use judigpt::config::{Config, HumanInteraction};
use judigpt::console::Console;
use judigpt::julia::JuliaRunner;
use judigpt::llm::LLMClient;
use judigpt::review::{AutoReviewer, ConsoleReviewer, Reviewer};
use judigpt::state::{AskInput, State};
use judigpt::tools::ToolContext;

/// JUDIGPT - AI assistant for JUDI.jl
#[derive(Parser, Debug)]
#[command(name = "judigpt", version, about)]
struct Args {
    /// Configuration file (defaults to ./judigpt.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive session (default)
    Chat {
        /// Let the agent run code and terminal commands itself
        #[arg(long)]
        autonomous: bool,
    },
    /// Answer one question and print the result as JSON
    Ask {
        #[arg(short, long)]
        question: String,

        /// File the question is about
        #[arg(short, long)]
        file: Option<String>,
    },
    /// Lint and run a Julia file the way generated code is checked
    Check { file: PathBuf },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let default_filter = if args.verbose { "judigpt=debug" } else { "judigpt=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .init();

    let config = Config::load(args.config.as_deref())?;
    let command = args.command.unwrap_or(Command::Chat { autonomous: false });

    match command {
        Command::Chat { autonomous } => {
            let console = Console::new();
            let reviewer: Arc<dyn Reviewer> = Arc::new(ConsoleReviewer::stdin(console.clone()));
            let kind = if autonomous { AgentKind::Autonomous } else { AgentKind::Default };
            let agent = build_agent(config, kind, reviewer, console)?;
            info!(agent = %agent.name(), "starting interactive session");
            agent.chat().await?;
        }
        Command::Ask { question, file } => {
            let mut config = config;
            config.human_interaction = HumanInteraction::none();
            let reviewer: Arc<dyn Reviewer> = Arc::new(AutoReviewer::new());
            let agent = build_agent(config, AgentKind::Default, reviewer, Console::quiet())?;
            let input = AskInput {
                question,
                current_filepath: file,
            };
            let output = agent.ask(&input).await?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Check { file } => {
            let mut config = config;
            config.human_interaction = HumanInteraction::none();
            let code = std::fs::read_to_string(&file)?;
            let runner = JuliaRunner::from_config(&config.julia)?;
            let ctx = ToolContext::new(config, runner, Arc::new(AutoReviewer::new()), Console::new());

            let state = State {
                code_block: code_from_response(&code, false),
                ..State::default()
            };
            let update = check_code(&state, &ctx).await;
            for message in &update.messages {
                println!("{}", message.content);
            }
            if update.error == Some(true) {
                error!(file = %file.display(), "check failed");
                std::process::exit(1);
            }
            info!(file = %file.display(), "check passed");
        }
    }

    Ok(())
}

fn build_agent(
    config: Config,
    kind: AgentKind,
    reviewer: Arc<dyn Reviewer>,
    console: Console,
) -> Result<Agent, Box<dyn std::error::Error>> {
    let model_name = match kind {
        AgentKind::Default => config.model.agent_model.clone(),
        AgentKind::Autonomous => config.model.autonomous_agent_model.clone(),
    };
    let client = LLMClient::from_config(&config.model, &model_name)?;
    let runner = JuliaRunner::from_config(&config.julia)?;
    let ctx = ToolContext::new(config, runner, reviewer, console);
    Ok(Agent::new(kind, Arc::new(client), ctx)?)
}
