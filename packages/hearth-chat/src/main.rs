//! Hearth chat server binary.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use hearth_chat::{router, server, ChatConfig, ChatState, Directory, MessageStore};

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "hearth-chat", version, about = "Hearth family chat server")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 8080, env = "CHAT_PORT")]
    port: u16,

    /// Directory for the SQLite database. Messages are kept in memory if unset.
    #[arg(long, env = "CHAT_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Family roster JSON file
    #[arg(long, env = "CHAT_DIRECTORY_FILE")]
    directory_file: Option<PathBuf>,

    /// Messages per history page when no limit is given
    #[arg(long, default_value_t = 50, env = "CHAT_DEFAULT_PAGE_SIZE")]
    default_page_size: usize,

    /// Largest history page a client may ask for
    #[arg(long, default_value_t = 100, env = "CHAT_MAX_PAGE_SIZE")]
    max_page_size: usize,

    /// Window in which a repeated clientMessageId is treated as a duplicate
    #[arg(long, default_value_t = 30, env = "CHAT_DEDUPE_WINDOW_SECS")]
    dedupe_window_secs: i64,

    /// Maximum message length in characters
    #[arg(long, default_value_t = 1000, env = "CHAT_MAX_BODY_CHARS")]
    max_body_chars: usize,

    /// Cleanup interval in seconds
    #[arg(long, default_value_t = 300, env = "CHAT_CLEANUP_INTERVAL_SECS")]
    cleanup_interval_secs: u64,

    /// Emit logs as JSON
    #[arg(long, env = "CHAT_LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn config(&self) -> ChatConfig {
        ChatConfig {
            port: self.port,
            data_dir: self.data_dir.clone(),
            directory_file: self.directory_file.clone(),
            default_page_size: self.default_page_size,
            max_page_size: self.max_page_size,
            dedupe_window_secs: self.dedupe_window_secs,
            max_body_chars: self.max_body_chars,
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "hearth_chat=info,tower_http=info".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

// ── Entry Point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing(args.log_json);
    let config = args.config();

    let directory = Directory::new();
    match config.directory_file {
        Some(ref path) => {
            directory.load_from_file(path)?;
        }
        None => tracing::warn!("No roster file configured; every request will be rejected"),
    }

    let store = match config.data_dir {
        Some(ref dir) => {
            std::fs::create_dir_all(dir)?;
            let path = dir.join("chat.db");
            tracing::info!(path = %path.display(), "Opening message store");
            MessageStore::open(Some(&path))?
        }
        None => {
            tracing::info!("Using in-memory message store");
            MessageStore::in_memory()?
        }
    };

    let state = ChatState::new(config, store, directory);
    server::spawn_cleanup(state.clone(), Duration::from_secs(args.cleanup_interval_secs.max(1)));

    let addr = format!("0.0.0.0:{}", state.config.port);
    let app = router(state);

    tracing::info!("Hearth chat server starting on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
