mod commands;
#[cfg(feature = "mcp")]
mod mcp;

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use chat_archive_search::{BackendChoice, DataPaths, EngineOptions};

#[derive(Parser)]
#[command(name = "chatsearch")]
#[command(about = "Exact and semantic search over an exported chat archive", long_about = None)]
#[command(version)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "CHATSEARCH_DATA_DIR",
        default_value = "data",
        help = "Directory holding the archive, secrets and embedding store"
    )]
    data_dir: PathBuf,

    #[arg(long, global = true, help = "Override path to conversations.json")]
    archive: Option<PathBuf>,

    #[arg(long, global = true, help = "Override path to the embedding store")]
    store: Option<PathBuf>,

    #[arg(long, global = true, help = "Override path to secrets.toml")]
    secrets: Option<PathBuf>,

    #[arg(long, global = true, value_enum, default_value_t = Backend::Auto, help = "Embedding backend")]
    backend: Backend,

    #[arg(long, global = true, help = "Texts per embedding request")]
    batch_size: Option<usize>,

    #[arg(short, long, global = true, action = ArgAction::Count, help = "More log output (-v debug, -vv trace)")]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    /// OpenAI when secrets are present, otherwise exact search only
    Auto,
    Openai,
    /// Offline deterministic embeddings
    Harmonic,
    None,
}

impl From<Backend> for BackendChoice {
    fn from(b: Backend) -> Self {
        match b {
            Backend::Auto => BackendChoice::Auto,
            Backend::Openai => BackendChoice::OpenAi,
            Backend::Harmonic => BackendChoice::Harmonic,
            Backend::None => BackendChoice::None,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Search conversations and messages ("quoted" for exact match)
    Search {
        query: String,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Build the embedding store incrementally
    Index {
        #[arg(long, help = "Show index status")]
        status: bool,
        #[arg(long, help = "Delete the store and embed everything again")]
        rebuild: bool,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// List conversations grouped by age
    Conversations {
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Show every message of one conversation
    Messages {
        conversation_id: String,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Messages per day
    Activity {
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Archive statistics
    Stats {
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Run as MCP server over stdio
    #[cfg(feature = "mcp")]
    Serve,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let paths = DataPaths::from_root(cli.data_dir)
        .with_archive(cli.archive)
        .with_store(cli.store)
        .with_secrets(cli.secrets);
    let mut options = EngineOptions::new(paths);
    options.backend = cli.backend.into();
    if let Some(batch_size) = cli.batch_size {
        options.batch_size = batch_size;
    }

    match cli.command {
        Commands::Search { query, json } => commands::search::run(&options, &query, json),
        Commands::Index {
            status,
            rebuild,
            json,
        } => commands::index::run(&options, status, rebuild, json),
        Commands::Conversations { json } => {
            commands::conversations::run_list(&options.paths.archive, json)
        }
        Commands::Messages {
            conversation_id,
            json,
        } => commands::conversations::run_messages(&options.paths.archive, &conversation_id, json),
        Commands::Activity { json } => commands::activity::run(&options.paths.archive, json),
        Commands::Stats { json } => commands::stats::run(&options.paths.archive, json),

        #[cfg(feature = "mcp")]
        Commands::Serve => run_mcp_server(&options),
    }
}

/// Logs go to stderr; stdout carries command output and the MCP transport
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "chat_archive_search=info,chatsearch=info",
        1 => "chat_archive_search=debug,chatsearch=debug",
        _ => "chat_archive_search=trace,chatsearch=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(feature = "mcp")]
fn run_mcp_server(options: &EngineOptions) -> anyhow::Result<()> {
    use std::sync::Arc;

    // Embedding happens here, before any async context exists
    let engine = Arc::new(chat_archive_search::SearchEngine::start(options)?);
    tracing::info!(
        conversations = engine.archive().len(),
        semantic = engine.semantic_enabled(),
        "archive loaded, serving MCP over stdio"
    );
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(mcp::run_mcp_server(engine))
}
