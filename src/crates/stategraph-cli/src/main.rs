//! stategraph - run and inspect stategraph agents from the command line

use clap::{Parser, Subcommand};
use stategraph_cli::{commands, open_checkpointer, AgentKind, CliConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stategraph")]
#[command(about = "Run stategraph agents and inspect their threads", long_about = None)]
#[command(version)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true, env = "STATEGRAPH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the mock model, one turn per stdin line
    Chat {
        /// Conversation thread
        #[arg(short, long)]
        thread: String,

        /// Checkpoint database URL (e.g. sqlite:stategraph.db)
        #[arg(long)]
        db: Option<String>,
    },

    /// Run the worker/evaluator loop on a task
    Task {
        /// What the worker should do
        #[arg(long)]
        task: String,

        /// When the evaluator should accept the answer
        #[arg(long)]
        criteria: String,

        #[arg(short, long, default_value = "task")]
        thread: String,

        /// Evaluator call that first accepts (mock evaluator)
        #[arg(long, default_value_t = 1)]
        accept_after: usize,

        #[arg(long)]
        db: Option<String>,
    },

    /// List threads with at least one checkpoint
    Threads {
        #[arg(long)]
        db: Option<String>,
    },

    /// Show the checkpoints of a thread
    History {
        #[arg(short, long)]
        thread: String,

        #[arg(long)]
        db: Option<String>,
    },

    /// Print an agent's graph as Mermaid
    Graph {
        #[arg(short, long, value_enum, default_value = "chat")]
        agent: AgentKind,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.as_deref())?;
    let mut stdout = std::io::stdout();

    match cli.command {
        Commands::Chat { thread, db } => {
            let saver = open_checkpointer(config.database_url(db.as_deref())).await?;
            let agent = commands::build_agent(AgentKind::Chat, config.engine.clone(), 1)?
                .with_checkpointer(saver);
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            commands::chat(&agent, &thread, stdin, &mut stdout).await?;
        }
        Commands::Task {
            task,
            criteria,
            thread,
            accept_after,
            db,
        } => {
            let saver = open_checkpointer(config.database_url(db.as_deref())).await?;
            let agent = commands::build_agent(AgentKind::Worker, config.engine.clone(), accept_after)?
                .with_checkpointer(saver);
            commands::task(&agent, &thread, &task, &criteria, &mut stdout).await?;
        }
        Commands::Threads { db } => {
            let saver = open_checkpointer(config.database_url(db.as_deref())).await?;
            commands::threads(saver.as_ref(), &mut stdout).await?;
        }
        Commands::History { thread, db } => {
            let saver = open_checkpointer(config.database_url(db.as_deref())).await?;
            commands::history(saver.as_ref(), &thread, &mut stdout).await?;
        }
        Commands::Graph { agent } => {
            commands::graph(agent, &mut stdout)?;
        }
    }

    Ok(())
}
