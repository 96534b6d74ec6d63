use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rustyline::config::Builder;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{CompletionType, Editor};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use kvdb_cli::config::ConfigLoad;
use kvdb_cli::rusty::CliHelper;

const KEYWORDS: &[&str] = &[
    "SET", "GET", "UNSET", "NUMEQUALTO", "BEGIN", "COMMIT", "ROLLBACK", "RESET", "DEBUG", "END",
];

/// `kvdb-cli` — the REPL/batch client for `kvdb-server`, the Rust analogue
/// of `original_source/TTDBClient.py`.
#[derive(Debug, Parser)]
#[command(author, version, about = "REPL client for kvdb-server")]
struct Args {
    /// Location of the Unix socket to connect to.
    #[clap(long, help = "location of Unix socket to connect to")]
    socket: Option<PathBuf>,

    /// Force non-interactive (batch) mode even when stdin is a terminal.
    #[clap(short = 'n', long, default_value = "false")]
    non_interactive: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = ConfigLoad::load("kvdb-cli");
    let socket_path = args.socket.unwrap_or(cfg.socket.clone());

    let stream = UnixStream::connect(&socket_path)
        .await
        .with_context(|| format!("connecting to {}", socket_path.display()))?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let is_repl = io::stdin().is_terminal() && !args.non_interactive;
    if is_repl {
        println!("Welcome to {}.", cfg.prompt());
        println!("Connecting to server at {}.", socket_path.display());
        println!();
        run_repl(&mut writer, &mut reader, cfg.prompt()).await
    } else {
        run_batch(&mut writer, &mut reader).await
    }
}

/// Sends one raw command line to the server and prints back one reply line
/// per `|`-delimited command it contained.
async fn send_and_print<W, R>(writer: &mut W, reader: &mut R, command: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
    R: AsyncBufReadExt + Unpin,
{
    writer.write_all(command.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;

    let command_count = command.split('|').filter(|s| !s.trim().is_empty()).count().max(1);
    for _ in 0..command_count {
        let mut reply = String::new();
        if reader.read_line(&mut reply).await? == 0 {
            break;
        }
        print!("{reply}");
    }
    Ok(())
}

async fn run_repl<W, R>(writer: &mut W, reader: &mut R, prompt: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
    R: AsyncBufReadExt + Unpin,
{
    let config = Builder::new()
        .completion_prompt_limit(5)
        .completion_type(CompletionType::Circular)
        .build();
    let mut rl = Editor::<CliHelper, DefaultHistory>::with_config(config)?;
    let keywords = Arc::new(KEYWORDS.iter().map(|s| s.to_string()).collect());
    rl.set_helper(Some(CliHelper::with_keywords(keywords)));

    loop {
        match rl.readline(&format!("{prompt} > ")) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(trimmed);
                if trimmed.eq_ignore_ascii_case("END") {
                    break;
                }
                if let Err(e) = send_and_print(writer, reader, trimmed).await {
                    eprintln!("error: {e}");
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("readline error: {e}");
                break;
            }
        }
    }
    Ok(())
}

async fn run_batch<W, R>(writer: &mut W, reader: &mut R) -> Result<()>
where
    W: AsyncWrite + Unpin,
    R: AsyncBufReadExt + Unpin,
{
    let stdin = tokio::io::stdin();
    let mut input = BufReader::new(stdin);
    loop {
        let mut line = String::new();
        if input.read_line(&mut line).await? == 0 {
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.eq_ignore_ascii_case("END") {
            break;
        }
        send_and_print(writer, reader, trimmed).await?;
    }
    Ok(())
}
