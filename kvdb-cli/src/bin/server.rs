use std::panic;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;

use kvdb_cli::config::ConfigLoad;
use kvdb_cli::server;
use kvdb_cli::trace;

/// `kvdb-server` — the TTDB-style storage engine's socket front end.
#[derive(Debug, Parser)]
#[command(author, version, about = "In-memory timestamped transactional key/value store server")]
struct Args {
    /// Location of the Unix socket to listen on.
    #[clap(long, help = "location of Unix socket to listen on")]
    socket: Option<PathBuf>,

    /// Minimum number of seconds between purge sweeps.
    #[clap(long = "pp", help = "minimum time (in seconds) to wait before purging outdated entries")]
    purge_period: Option<u64>,

    #[clap(short = 'l', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_panic_hooks();

    let args = Args::parse();
    let mut cfg = ConfigLoad::load("kvdb-server");
    if let Some(socket) = args.socket {
        cfg.socket = socket;
    }
    if let Some(pp) = args.purge_period {
        cfg.purge_period_secs = pp;
    }
    cfg.log_level = args.log_level;

    let log_dir = format!(
        "{}/.kvdb-server",
        std::env::var("HOME").unwrap_or_else(|_| ".".to_string())
    );
    let _guards = trace::init_logging(&log_dir, &cfg.log_level).await?;
    info!("kvdb-server starting with config: {:?}", &cfg);

    let running = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("received Ctrl+C, shutting down");
        r.store(false, std::sync::atomic::Ordering::SeqCst);
        std::process::exit(0);
    })
    .expect("error setting Ctrl-C handler");

    server::serve(&cfg.socket, cfg.purge_period()).await
}

fn setup_panic_hooks() {
    let meta = human_panic::Metadata {
        version: env!("CARGO_PKG_VERSION").into(),
        name: env!("CARGO_PKG_NAME").into(),
        authors: env!("CARGO_PKG_AUTHORS").replace(':', ", ").into(),
        homepage: env!("CARGO_PKG_HOMEPAGE").into(),
    };

    let default_hook = panic::take_hook();
    if std::env::var("RUST_BACKTRACE").is_err() {
        panic::set_hook(Box::new(move |info: &panic::PanicInfo| {
            default_hook(info);
            let file_path = human_panic::handle_dump(&meta, info);
            human_panic::print_msg(file_path, &meta)
                .expect("human-panic: printing error message to console failed");
        }));
    }
}
